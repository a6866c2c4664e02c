//! Background effects
//!
//! Each effect implements the `Effect` trait: it is mounted onto a stage,
//! attaches the input listeners it needs, schedules its own timers and
//! frames, and exposes a canvas layer for composition. Unmounting must
//! release everything mounting acquired.

pub mod noise;
pub mod starfield;

use crate::config::Config;
use crate::device::HostMetrics;
use crate::input::{InputEvent, InputPort};
use crate::renderer::{PixelCanvas, Rgb};
use crate::scheduler::{Millis, Scheduler, TaskId};

/// Work an effect schedules for later
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Task {
    /// Draw one starfield frame
    StarFrame,
    /// Desktop resize debounce elapsed
    StarResizeSettled,
    /// Mobile rotation settle delay elapsed
    StarOrientationSettled,
    /// Noise resize or rotation debounce elapsed
    NoiseResizeSettled,
    /// Coalesced noise retile on the next frame
    NoiseRetile,
}

/// What an effect may touch while handling a callback
pub struct EffectEnv<'a> {
    pub now: Millis,
    pub metrics: &'a HostMetrics,
    pub scheduler: &'a mut Scheduler<Task>,
    pub port: &'a mut dyn InputPort,
}

/// A canvas ready to be composited
pub struct Layer<'a> {
    pub canvas: &'a PixelCanvas,
    pub opacity: f32,
}

/// Trait that all background effects implement
pub trait Effect {
    /// Human-readable name
    fn name(&self) -> &str;

    /// Short description
    fn description(&self) -> &str;

    /// Acquire the canvas, listeners and timers. A missing surface leaves the
    /// effect inert.
    fn mount(&mut self, env: &mut EffectEnv<'_>);

    /// Release everything `mount` acquired
    fn unmount(&mut self, env: &mut EffectEnv<'_>);

    /// An event for a kind this effect attached a listener for
    fn handle_event(&mut self, event: &InputEvent, env: &mut EffectEnv<'_>);

    /// A scheduled task came due
    fn run_task(&mut self, id: TaskId, task: Task, env: &mut EffectEnv<'_>);

    /// Change the effect's target color
    fn set_color(&mut self, _color: Rgb, _env: &mut EffectEnv<'_>) {}

    /// Current layer, if the effect has a surface
    fn layer(&self) -> Option<Layer<'_>>;
}

/// Every name `get` resolves
pub const AVAILABLE: &[&str] = &["starfield", "noise"];

/// List all available effects
pub fn list_available() {
    let config = Config::default();
    println!("Available effects:");
    println!();
    for effect in AVAILABLE.iter().filter_map(|name| get(name, &config)) {
        println!("  {:<16} {}", effect.name(), effect.description());
    }
    println!();
    println!("Choose the layers in ~/.config/hypr/hyprstars.toml:");
    println!("  [general]");
    println!("  layers = [\"starfield\", \"noise\"]");
}

/// Get an effect instance by name
pub fn get(name: &str, config: &Config) -> Option<Box<dyn Effect>> {
    match name {
        "starfield" => Some(Box::new(starfield::Starfield::new(
            &config.starfield,
            config.general.device,
        ))),
        "noise" => Some(Box::new(noise::NoiseTexture::new(&config.noise))),
        _ => None,
    }
}

/// Drives a single effect the way a stage would, on a manual clock
#[cfg(test)]
pub(crate) mod harness {
    use super::{Effect, EffectEnv, Task};
    use crate::device::HostMetrics;
    use crate::input::{EventBus, InputEvent};
    use crate::renderer::Extent;
    use crate::scheduler::{Clock, ManualClock, Scheduler};

    pub struct Harness {
        pub bus: EventBus,
        pub scheduler: Scheduler<Task>,
        pub metrics: HostMetrics,
        pub clock: ManualClock,
    }

    impl Harness {
        pub fn new(user_agent: &str, viewport: Extent, screen: Extent) -> Self {
            Self {
                bus: EventBus::new(),
                scheduler: Scheduler::new(),
                metrics: HostMetrics::new(user_agent, viewport, screen),
                clock: ManualClock::new(0.0),
            }
        }

        pub fn with<R>(&mut self, f: impl FnOnce(&mut EffectEnv<'_>) -> R) -> R {
            let mut port = self.bus.scoped(0);
            let mut env = EffectEnv {
                now: self.clock.now_ms(),
                metrics: &self.metrics,
                scheduler: &mut self.scheduler,
                port: &mut port,
            };
            f(&mut env)
        }

        /// Update metrics, then deliver only if a listener is attached
        pub fn dispatch(&mut self, effect: &mut dyn Effect, event: InputEvent) {
            match event {
                InputEvent::Resize { viewport } => self.metrics.viewport = viewport,
                InputEvent::OrientationChange { screen } => self.metrics.screen = screen,
                InputEvent::Scroll { y } => self.metrics.scroll_y = y,
                InputEvent::PointerMove { .. } => {}
            }
            if !self.bus.deliver(&event).is_empty() {
                self.with(|env| effect.handle_event(&event, env));
            }
        }

        pub fn pump(&mut self, effect: &mut dyn Effect) {
            let due = self.scheduler.take_due(self.clock.now_ms());
            for (id, task) in due {
                self.with(|env| effect.run_task(id, task, env));
            }
        }
    }
}
