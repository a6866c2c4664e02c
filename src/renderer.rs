//! Software canvas surface
//!
//! Every effect draws into its own `PixelCanvas`. The stage composites those
//! canvases into one output canvas, which a host then presents (a Wayland shm
//! buffer, or a PPM file when running headless).
//!
//! Pixels are `u32` ARGB8888 (`0xAARRGGBB`), which matches `wl_shm`'s
//! `Argb8888` byte order on little-endian machines.

use glam::Vec2;
use serde::Deserialize;
use std::fmt;
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::Path;
use std::str::FromStr;

/// Largest width or height a canvas may be allocated with
pub const MAX_CANVAS_DIMENSION: u32 = 16384;

/// Pixel dimensions of a surface
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
pub struct Extent {
    pub width: u32,
    pub height: u32,
}

impl Extent {
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    pub fn area(&self) -> u64 {
        self.width as u64 * self.height as u64
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }
}

impl fmt::Display for Extent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

impl FromStr for Extent {
    type Err = String;

    /// Parse `WIDTHxHEIGHT`, e.g. `1920x1080`
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (w, h) = s
            .trim()
            .split_once(['x', 'X'])
            .ok_or_else(|| format!("expected WIDTHxHEIGHT, got '{}'", s))?;
        let parse = |v: &str| {
            v.trim()
                .parse::<u32>()
                .map_err(|e| format!("bad dimension '{}': {}", v, e))
        };
        let extent = Extent::new(parse(w)?, parse(h)?);
        if extent.is_empty() {
            return Err(format!("extent {} has no area", extent));
        }
        Ok(extent)
    }
}

/// An opaque 8-bit RGB color
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rgb {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Rgb {
    pub const WHITE: Rgb = Rgb::new(255, 255, 255);
    pub const BLACK: Rgb = Rgb::new(0, 0, 0);

    pub const fn new(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }

    /// Parse `#rgb` or `#rrggbb` (the `#` is optional)
    pub fn from_hex(value: &str) -> Option<Self> {
        let hex = value.trim();
        let hex = hex.strip_prefix('#').unwrap_or(hex);
        if !hex.chars().all(|c| c.is_ascii_hexdigit()) {
            return None;
        }
        match hex.len() {
            3 => {
                let digit = |i: usize| u8::from_str_radix(&hex[i..i + 1], 16).ok().map(|d| d * 17);
                Some(Self::new(digit(0)?, digit(1)?, digit(2)?))
            }
            6 => {
                let byte = |i: usize| u8::from_str_radix(&hex[i..i + 2], 16).ok();
                Some(Self::new(byte(0)?, byte(2)?, byte(4)?))
            }
            _ => None,
        }
    }

    pub fn to_argb(self, alpha: u8) -> u32 {
        u32::from_be_bytes([alpha, self.r, self.g, self.b])
    }
}

/// The canvas could not be allocated
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CanvasError {
    TooLarge { width: u32, height: u32 },
}

impl fmt::Display for CanvasError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CanvasError::TooLarge { width, height } => write!(
                f,
                "canvas {}x{} exceeds the {}px limit",
                width, height, MAX_CANVAS_DIMENSION
            ),
        }
    }
}

impl std::error::Error for CanvasError {}

/// Source-over blend of `color` at `alpha` onto a straight-alpha pixel
#[inline]
fn blend(dst: u32, color: Rgb, alpha: f32) -> u32 {
    let sa = alpha.clamp(0.0, 1.0);
    if sa <= 0.0 {
        return dst;
    }
    let [da, dr, dg, db] = dst.to_be_bytes();
    let da = da as f32 / 255.0;
    let out_a = sa + da * (1.0 - sa);
    if out_a <= 0.0 {
        return 0;
    }
    let mix = |s: u8, d: u8| -> u8 {
        let c = (s as f32 * sa + d as f32 * da * (1.0 - sa)) / out_a;
        c.round().clamp(0.0, 255.0) as u8
    };
    u32::from_be_bytes([
        (out_a * 255.0).round() as u8,
        mix(color.r, dr),
        mix(color.g, dg),
        mix(color.b, db),
    ])
}

/// RGBA software surface owned by a single effect
#[derive(Debug, Clone)]
pub struct PixelCanvas {
    pixels: Vec<u32>,
    extent: Extent,
}

impl PixelCanvas {
    /// Allocate a fully transparent canvas
    pub fn with_size(extent: Extent) -> Result<Self, CanvasError> {
        check_extent(extent)?;
        Ok(Self {
            pixels: vec![0; extent.area() as usize],
            extent,
        })
    }

    /// Reallocate to a new extent. Contents are cleared.
    pub fn resize(&mut self, extent: Extent) -> Result<(), CanvasError> {
        check_extent(extent)?;
        self.extent = extent;
        self.pixels.clear();
        self.pixels.resize(extent.area() as usize, 0);
        Ok(())
    }

    pub fn extent(&self) -> Extent {
        self.extent
    }

    #[cfg(test)]
    pub fn pixels(&self) -> &[u32] {
        &self.pixels
    }

    #[cfg(test)]
    pub fn pixel(&self, x: u32, y: u32) -> Option<u32> {
        if x >= self.extent.width || y >= self.extent.height {
            return None;
        }
        self.pixels.get((y * self.extent.width + x) as usize).copied()
    }

    /// Raw bytes in host order, ready for an ARGB8888 shm buffer
    pub fn as_bytes(&self) -> &[u8] {
        bytemuck::cast_slice(&self.pixels)
    }

    /// Make every pixel fully transparent
    pub fn clear(&mut self) {
        self.pixels.fill(0);
    }

    /// Flood with an opaque color
    pub fn fill(&mut self, color: Rgb) {
        self.pixels.fill(color.to_argb(255));
    }

    /// Anti-aliased filled circle, clipped to the canvas
    pub fn fill_circle(&mut self, center: Vec2, radius: f32, color: Rgb, alpha: f32) {
        if !center.is_finite()
            || radius.is_nan()
            || radius <= 0.0
            || alpha <= 0.0
            || self.extent.is_empty()
        {
            return;
        }

        let reach = radius + 1.0;
        let x0 = (center.x - reach).floor().max(0.0);
        let y0 = (center.y - reach).floor().max(0.0);
        let x1 = (center.x + reach).ceil().min(self.extent.width as f32 - 1.0);
        let y1 = (center.y + reach).ceil().min(self.extent.height as f32 - 1.0);
        if x0 > x1 || y0 > y1 {
            return;
        }

        let width = self.extent.width as usize;
        for py in y0 as u32..=y1 as u32 {
            for px in x0 as u32..=x1 as u32 {
                let pixel_center = Vec2::new(px as f32 + 0.5, py as f32 + 0.5);
                let coverage = (radius + 0.5 - pixel_center.distance(center)).clamp(0.0, 1.0);
                if coverage > 0.0 {
                    let idx = py as usize * width + px as usize;
                    self.pixels[idx] = blend(self.pixels[idx], color, alpha * coverage);
                }
            }
        }
    }

    /// Repeat `tile` across the whole canvas starting at the origin
    pub fn fill_pattern(&mut self, tile: &[u32], tile_width: u32, tile_height: u32) {
        if tile_width == 0 || tile_height == 0 || tile.len() < (tile_width * tile_height) as usize {
            return;
        }
        let width = self.extent.width as usize;
        let tw = tile_width as usize;
        for (y, row) in self.pixels.chunks_exact_mut(width.max(1)).enumerate() {
            let tile_row = (y % tile_height as usize) * tw;
            let source = &tile[tile_row..tile_row + tw];
            for (x, pixel) in row.iter_mut().enumerate() {
                *pixel = source[x % tw];
            }
        }
    }

    /// Source-over composite of another canvas, scaled by `opacity`.
    /// Only the overlapping region is touched.
    pub fn composite(&mut self, src: &PixelCanvas, opacity: f32) {
        if opacity <= 0.0 {
            return;
        }
        let width = self.extent.width.min(src.extent.width) as usize;
        let height = self.extent.height.min(src.extent.height) as usize;
        for y in 0..height {
            let dst_row = y * self.extent.width as usize;
            let src_row = y * src.extent.width as usize;
            for x in 0..width {
                let [a, r, g, b] = src.pixels[src_row + x].to_be_bytes();
                if a == 0 {
                    continue;
                }
                let idx = dst_row + x;
                let alpha = a as f32 / 255.0 * opacity;
                self.pixels[idx] = blend(self.pixels[idx], Rgb::new(r, g, b), alpha);
            }
        }
    }

    /// Write the canvas as a binary PPM (alpha is dropped)
    pub fn write_ppm(&self, path: &Path) -> io::Result<()> {
        let mut out = BufWriter::new(File::create(path)?);
        write!(out, "P6\n{} {}\n255\n", self.extent.width, self.extent.height)?;
        for pixel in &self.pixels {
            let [_, r, g, b] = pixel.to_be_bytes();
            out.write_all(&[r, g, b])?;
        }
        out.flush()
    }
}

fn check_extent(extent: Extent) -> Result<(), CanvasError> {
    if extent.width > MAX_CANVAS_DIMENSION || extent.height > MAX_CANVAS_DIMENSION {
        return Err(CanvasError::TooLarge {
            width: extent.width,
            height: extent.height,
        });
    }
    Ok(())
}
