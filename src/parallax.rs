//! Per-frame parallax math
//!
//! Everything here is a pure function of the star set, one snapshot of the
//! smoothed signals and the current time, so frames can be computed and
//! checked without a surface or a clock.

use crate::device::DeviceClass;
use crate::renderer::Extent;
use crate::stars::Star;
use glam::Vec2;

/// Fraction of the virtual band, at each end, whose stars get a ghost copy
const GHOST_BAND: f32 = 0.2;

/// How much weaker the scroll response gets as the parallax factor grows
const SCROLL_DAMPING: f32 = 0.8;

/// Eased signal values read once at the start of a frame
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct SignalSnapshot {
    pub pointer: Vec2,
    pub scroll_y: f32,
}

/// One circle to draw
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DrawCommand {
    pub position: Vec2,
    pub radius: f32,
    pub opacity: f32,
    pub ghost: bool,
}

/// Map a client-space pointer position to `[-1, 1]` on both axes relative to
/// the canvas rectangle. Degenerate rectangles map to the centre.
pub fn normalize_pointer(client: Vec2, origin: Vec2, extent: Extent) -> Vec2 {
    let axis = |c: f32, o: f32, len: u32| {
        if len == 0 {
            0.0
        } else {
            (c - o) / len as f32 * 2.0 - 1.0
        }
    };
    Vec2::new(
        axis(client.x, origin.x, extent.width),
        axis(client.y, origin.y, extent.height),
    )
}

/// Height of the looping virtual band
pub fn band_height(canvas_height: u32, device: DeviceClass) -> f32 {
    let scale = match device {
        DeviceClass::Mobile => 2.5,
        DeviceClass::Desktop => 1.5,
    };
    canvas_height as f32 * scale
}

/// True modulo into `[0, total)`. A zero band keeps everything at 0.
pub fn wrap_y(raw: f32, total: f32) -> f32 {
    if total.is_nan() || total <= 0.0 || !raw.is_finite() {
        return 0.0;
    }
    let wrapped = raw.rem_euclid(total);
    // rem_euclid may round up to `total` for tiny negative inputs
    if wrapped >= total { 0.0 } else { wrapped }
}

/// Vertical position of the ghost copy for a star already wrapped into the band
pub fn ghost_y(wrapped: f32, total: f32) -> Option<f32> {
    if wrapped > total * (1.0 - GHOST_BAND) {
        Some(wrapped - total)
    } else if wrapped < total * GHOST_BAND {
        Some(wrapped + total)
    } else {
        None
    }
}

/// Twinkle opacity: a smooth oscillation between 0.5 and 1.0
pub fn twinkle_opacity(now_ms: f64, twinkle_speed: f32) -> f32 {
    if twinkle_speed.is_nan() || twinkle_speed <= 0.0 {
        return 1.0;
    }
    let phase = now_ms / 1000.0 / twinkle_speed as f64;
    (0.5 + phase.sin().abs() * 0.5) as f32
}

/// Pointer and scroll displacement for one star
pub fn star_offset(
    star: &Star,
    signals: SignalSnapshot,
    extent: Extent,
    intensity: f32,
    device: DeviceClass,
) -> Vec2 {
    if device == DeviceClass::Mobile {
        return Vec2::ZERO;
    }
    let size = Vec2::new(extent.width as f32, extent.height as f32);
    let pointer = signals.pointer * star.parallax * intensity * size;
    let scroll_y = -signals.scroll_y * (1.0 - star.parallax * SCROLL_DAMPING);
    Vec2::new(pointer.x, pointer.y + scroll_y)
}

/// Draw commands for one star: its wrapped position plus any ghost copy
pub fn star_draws(
    star: &Star,
    signals: SignalSnapshot,
    extent: Extent,
    intensity: f32,
    device: DeviceClass,
    out: &mut Vec<DrawCommand>,
) {
    let offset = star_offset(star, signals, extent, intensity, device);
    let x = star.position.x + offset.x;
    let total = band_height(extent.height, device);
    let y = wrap_y(star.position.y + offset.y, total);

    let draw = |y: f32, ghost: bool| DrawCommand {
        position: Vec2::new(x, y),
        radius: star.radius,
        opacity: star.opacity,
        ghost,
    };

    out.push(draw(y, false));
    if let Some(mirrored) = ghost_y(y, total) {
        out.push(draw(mirrored, true));
    }
}

/// Draw commands for a whole frame. Every star sees the same snapshot.
pub fn frame_draws(
    stars: &[Star],
    signals: SignalSnapshot,
    extent: Extent,
    intensity: f32,
    device: DeviceClass,
) -> Vec<DrawCommand> {
    let mut out = Vec::with_capacity(stars.len() * 2);
    for star in stars {
        star_draws(star, signals, extent, intensity, device, &mut out);
    }
    out
}

/// Recompute opacity for every twinkling star
pub fn update_twinkle(stars: &mut [Star], now_ms: f64) {
    for star in stars.iter_mut() {
        if let Some(speed) = star.twinkle_speed {
            star.opacity = twinkle_opacity(now_ms, speed);
        }
    }
}
