//! Tiled procedural noise overlay
//!
//! A 256×256 tile of random-intensity pixels is generated once and cached.
//! Resizing or rotating only re-tiles the cached pattern across the new
//! bounds; the tile is regenerated only when the target color changes.

use super::{Effect, EffectEnv, Layer, Task};
use crate::config::NoiseConfig;
use crate::input::{InputEvent, ListenerId, ListenerKind};
use crate::renderer::{Extent, PixelCanvas, Rgb};
use crate::scheduler::{Debouncer, Millis, TaskId};
use log::{debug, info, warn};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

pub const TILE_SIZE: u32 = 256;
pub const RESIZE_DEBOUNCE_MS: Millis = 100.0;
pub const ORIENTATION_SETTLE_MS: Millis = 200.0;

/// Build one noise tile: every pixel is `color` scaled by its own uniform
/// sample in `[0, 1)`, alpha is opaque
pub fn generate_tile<R: Rng + ?Sized>(color: Rgb, rng: &mut R) -> Vec<u32> {
    (0..TILE_SIZE * TILE_SIZE)
        .map(|_| {
            let value: f32 = rng.random();
            let scale = |c: u8| (c as f32 * value) as u8;
            Rgb::new(scale(color.r), scale(color.g), scale(color.b)).to_argb(255)
        })
        .collect()
}

pub struct NoiseTexture {
    color: Rgb,
    opacity: f32,
    rng: StdRng,
    tile: Option<Vec<u32>>,
    tiles_generated: u64,
    canvas: Option<PixelCanvas>,
    listeners: Vec<ListenerId>,
    resize: Debouncer,
    retile: Option<TaskId>,
}

impl NoiseTexture {
    pub fn new(config: &NoiseConfig) -> Self {
        let rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_os_rng(),
        };
        Self {
            color: config.color_rgb(),
            opacity: config.opacity.clamp(0.0, 1.0),
            rng,
            tile: None,
            tiles_generated: 0,
            canvas: None,
            listeners: Vec::new(),
            resize: Debouncer::new(RESIZE_DEBOUNCE_MS),
            retile: None,
        }
    }

    #[cfg(test)]
    pub fn tile(&self) -> Option<&[u32]> {
        self.tile.as_deref()
    }

    #[cfg(test)]
    pub fn tiles_generated(&self) -> u64 {
        self.tiles_generated
    }

    #[cfg(test)]
    pub fn canvas(&self) -> Option<&PixelCanvas> {
        self.canvas.as_ref()
    }

    fn regenerate_tile(&mut self) {
        self.tile = Some(generate_tile(self.color, &mut self.rng));
        self.tiles_generated += 1;
        debug!("Noise tile #{} generated for {:?}", self.tiles_generated, self.color);
    }

    /// Fit the canvas to `extent` and repeat the cached tile across it
    fn draw(&mut self, extent: Extent) {
        let (Some(canvas), Some(tile)) = (self.canvas.as_mut(), self.tile.as_ref()) else {
            return;
        };
        if canvas.extent() != extent
            && let Err(e) = canvas.resize(extent)
        {
            warn!("Noise overlay keeps its {} canvas: {}", canvas.extent(), e);
        }
        canvas.fill_pattern(tile, TILE_SIZE, TILE_SIZE);
    }

    /// Drop every pending timer and frame
    fn cancel_pending(&mut self, env: &mut EffectEnv<'_>) {
        self.resize.cancel(env.scheduler);
        if let Some(id) = self.retile.take() {
            env.scheduler.cancel(id);
        }
    }
}

impl Effect for NoiseTexture {
    fn name(&self) -> &str {
        "noise"
    }

    fn description(&self) -> &str {
        "Tiled procedural noise overlay"
    }

    fn mount(&mut self, env: &mut EffectEnv<'_>) {
        if self.canvas.is_some() {
            return;
        }
        let extent = env.metrics.viewport;
        match PixelCanvas::with_size(extent) {
            Ok(canvas) => self.canvas = Some(canvas),
            Err(e) => {
                warn!("Noise overlay disabled, no drawing surface: {}", e);
                return;
            }
        }
        if self.tile.is_none() {
            self.regenerate_tile();
        }
        self.draw(extent);
        self.listeners = vec![
            env.port.attach(ListenerKind::Resize),
            env.port.attach(ListenerKind::OrientationChange),
        ];
        info!("Noise overlay mounted ({} canvas)", extent);
    }

    fn unmount(&mut self, env: &mut EffectEnv<'_>) {
        self.cancel_pending(env);
        for id in self.listeners.drain(..) {
            env.port.detach(id);
        }
        if self.canvas.take().is_some() {
            info!("Noise overlay unmounted");
        }
        self.tile = None;
    }

    fn handle_event(&mut self, event: &InputEvent, env: &mut EffectEnv<'_>) {
        if self.canvas.is_none() {
            return;
        }
        let delay = match event {
            InputEvent::Resize { .. } => RESIZE_DEBOUNCE_MS,
            InputEvent::OrientationChange { .. } => ORIENTATION_SETTLE_MS,
            _ => return,
        };
        // A newer resize supersedes both the timer and any queued retile
        self.cancel_pending(env);
        self.resize
            .trigger_after(env.scheduler, env.now, delay, Task::NoiseResizeSettled);
    }

    fn run_task(&mut self, id: TaskId, task: Task, env: &mut EffectEnv<'_>) {
        match task {
            Task::NoiseResizeSettled => {
                // At most one retile pending per frame
                if self.resize.settle(id) && self.retile.is_none() {
                    self.retile = Some(env.scheduler.request_frame(Task::NoiseRetile));
                }
            }
            Task::NoiseRetile => {
                if self.retile == Some(id) {
                    self.retile = None;
                    self.draw(env.metrics.viewport);
                }
            }
            _ => {}
        }
    }

    fn set_color(&mut self, color: Rgb, env: &mut EffectEnv<'_>) {
        if color == self.color {
            return;
        }
        self.color = color;
        self.cancel_pending(env);
        if self.canvas.is_some() {
            self.regenerate_tile();
            let extent = self.canvas.as_ref().map(|c| c.extent()).unwrap_or(env.metrics.viewport);
            self.draw(extent);
        } else {
            self.tile = None;
        }
    }

    fn layer(&self) -> Option<Layer<'_>> {
        self.canvas.as_ref().map(|canvas| Layer {
            canvas,
            opacity: self.opacity,
        })
    }
}
