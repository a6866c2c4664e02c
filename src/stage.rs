//! Effect stack
//!
//! The stage is what a host talks to. It owns the effects, one scheduler per
//! effect, the shared input bus and the host metrics, and flattens all layers
//! into a single output canvas.

use crate::config::Config;
use crate::device::HostMetrics;
use crate::effects::{self, Effect, EffectEnv, Task};
use crate::input::{EventBus, InputEvent};
use crate::renderer::{PixelCanvas, Rgb};
use crate::scheduler::{Millis, Scheduler};
use log::{debug, info, warn};

struct Slot {
    effect: Box<dyn Effect>,
    scheduler: Scheduler<Task>,
}

pub struct Stage {
    slots: Vec<Slot>,
    bus: EventBus,
    metrics: HostMetrics,
    background: Rgb,
    mounted: bool,
}

impl Stage {
    pub fn new(effects: Vec<Box<dyn Effect>>, metrics: HostMetrics, background: Rgb) -> Self {
        let slots = effects
            .into_iter()
            .map(|effect| Slot {
                effect,
                scheduler: Scheduler::new(),
            })
            .collect();
        Self {
            slots,
            bus: EventBus::new(),
            metrics,
            background,
            mounted: false,
        }
    }

    /// Build the layer stack named in `config.general.layers`
    pub fn from_config(config: &Config, metrics: HostMetrics) -> Self {
        let effects = config
            .general
            .layers
            .iter()
            .filter_map(|name| {
                let effect = effects::get(name, config);
                if effect.is_none() {
                    warn!("Unknown effect '{}' in layers, skipping", name);
                }
                effect
            })
            .collect();
        Self::new(effects, metrics, config.general.background_rgb())
    }

    pub fn metrics(&self) -> &HostMetrics {
        &self.metrics
    }

    pub fn effect_names(&self) -> Vec<&str> {
        self.slots.iter().map(|s| s.effect.name()).collect()
    }

    /// Run `f` for slot `owner` with a fully wired environment
    fn with_env<R>(
        &mut self,
        owner: usize,
        now: Millis,
        f: impl FnOnce(&mut dyn Effect, &mut EffectEnv<'_>) -> R,
    ) -> R {
        let slot = &mut self.slots[owner];
        let mut port = self.bus.scoped(owner);
        let mut env = EffectEnv {
            now,
            metrics: &self.metrics,
            scheduler: &mut slot.scheduler,
            port: &mut port,
        };
        f(slot.effect.as_mut(), &mut env)
    }

    pub fn mount(&mut self, now: Millis) {
        if self.mounted {
            return;
        }
        for owner in 0..self.slots.len() {
            self.with_env(owner, now, |effect, env| effect.mount(env));
        }
        self.mounted = true;
        info!("Stage mounted: {}", self.effect_names().join(", "));
    }

    pub fn unmount(&mut self, now: Millis) {
        if !self.mounted {
            return;
        }
        for owner in (0..self.slots.len()).rev() {
            self.with_env(owner, now, |effect, env| effect.unmount(env));
        }
        self.mounted = false;
        info!(
            "Stage unmounted ({} listeners, {} tasks left)",
            self.listener_count(),
            self.pending_tasks()
        );
    }

    /// Record what the event says about the host, then hand it to every
    /// effect listening for its kind
    pub fn dispatch(&mut self, event: InputEvent, now: Millis) {
        match event {
            InputEvent::Resize { viewport } => self.metrics.viewport = viewport,
            InputEvent::OrientationChange { screen } => self.metrics.screen = screen,
            InputEvent::Scroll { y } => self.metrics.scroll_y = y,
            InputEvent::PointerMove { .. } => {}
        }
        for owner in self.bus.deliver(&event) {
            self.with_env(owner, now, |effect, env| effect.handle_event(&event, env));
        }
    }

    /// Run every task due at `now`. Returns how many ran.
    pub fn pump(&mut self, now: Millis) -> usize {
        let mut ran = 0;
        for owner in 0..self.slots.len() {
            let due = self.slots[owner].scheduler.take_due(now);
            ran += due.len();
            for (id, task) in due {
                self.with_env(owner, now, |effect, env| effect.run_task(id, task, env));
            }
        }
        ran
    }

    /// Recolor the named layer. Returns false when no such layer exists.
    pub fn set_color(&mut self, layer: &str, color: Rgb, now: Millis) -> bool {
        let Some(owner) = self.slots.iter().position(|s| s.effect.name() == layer) else {
            warn!("No layer named '{}' to recolor", layer);
            return false;
        };
        debug!("Recoloring {} to {:?}", layer, color);
        self.with_env(owner, now, |effect, env| effect.set_color(color, env));
        true
    }

    /// Background fill, then every layer bottom-up
    pub fn composite(&self, out: &mut PixelCanvas) {
        out.fill(self.background);
        for slot in &self.slots {
            if let Some(layer) = slot.effect.layer() {
                out.composite(layer.canvas, layer.opacity);
            }
        }
    }

    pub fn pending_tasks(&self) -> usize {
        self.slots.iter().map(|s| s.scheduler.pending()).sum()
    }

    pub fn listener_count(&self) -> usize {
        self.bus.listener_count()
    }

    /// Earliest timeout across all effects
    #[cfg(test)]
    pub fn next_deadline(&self) -> Option<Millis> {
        self.slots
            .iter()
            .filter_map(|s| s.scheduler.next_deadline())
            .reduce(f64::min)
    }
}
