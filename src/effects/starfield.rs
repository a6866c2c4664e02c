//! Parallax starfield
//!
//! Stars are spawned over the canvas and redrawn every frame at their spawn
//! position plus a pointer and scroll offset read from three smoothed
//! signals. Vertical positions wrap inside a virtual band taller than the
//! canvas, with ghost copies near the seams, so scrolling loops forever.
//!
//! Desktop: resize is debounced 200ms, then the whole star set is
//! regenerated. Mobile: resize is ignored (browser chrome fires it
//! constantly); an orientation change regenerates after a 300ms settle
//! delay using the screen extent. Pointer and scroll parallax are desktop
//! only.

use super::{Effect, EffectEnv, Layer, Task};
use crate::config::StarfieldConfig;
use crate::device::{self, DeviceClass, DeviceMode};
use crate::input::{InputEvent, ListenerId, ListenerKind};
use crate::parallax::{self, SignalSnapshot};
use crate::renderer::{Extent, PixelCanvas, Rgb};
use crate::scheduler::{Debouncer, FrameLoop, Millis, TaskId};
use crate::spring::SmoothedSignal;
use crate::stars::{self, Star, StarConfig};
use glam::Vec2;
use log::{debug, info, warn};
use rand::SeedableRng;
use rand::rngs::StdRng;

pub const RESIZE_DEBOUNCE_MS: Millis = 200.0;
pub const ORIENTATION_SETTLE_MS: Millis = 300.0;

/// Longest frame delta fed to the springs, in seconds
const MAX_FRAME_DT: f64 = 0.1;

pub struct Starfield {
    star_config: StarConfig,
    intensity: f32,
    color: Rgb,
    mode: DeviceMode,
    rng: StdRng,

    device: DeviceClass,
    canvas: Option<PixelCanvas>,
    stars: Vec<Star>,

    pointer_x: SmoothedSignal,
    pointer_y: SmoothedSignal,
    scroll_y: SmoothedSignal,

    listeners: Vec<ListenerId>,
    resize: Debouncer,
    orientation: Debouncer,
    frames: FrameLoop,
    last_frame: Option<Millis>,
    frames_drawn: u64,
}

impl Starfield {
    pub fn new(config: &StarfieldConfig, mode: DeviceMode) -> Self {
        let rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_os_rng(),
        };
        Self {
            star_config: config.star_config(),
            intensity: config.parallax_intensity,
            color: config.color_rgb(),
            mode,
            rng,
            device: DeviceClass::Desktop,
            canvas: None,
            stars: Vec::new(),
            pointer_x: SmoothedSignal::new(config.pointer_spring),
            pointer_y: SmoothedSignal::new(config.pointer_spring),
            scroll_y: SmoothedSignal::new(config.scroll_spring),
            listeners: Vec::new(),
            resize: Debouncer::new(RESIZE_DEBOUNCE_MS),
            orientation: Debouncer::new(ORIENTATION_SETTLE_MS),
            frames: FrameLoop::new(),
            last_frame: None,
            frames_drawn: 0,
        }
    }

    #[cfg(test)]
    pub fn stars(&self) -> &[Star] {
        &self.stars
    }

    #[cfg(test)]
    pub fn device(&self) -> DeviceClass {
        self.device
    }

    pub fn is_mounted(&self) -> bool {
        self.canvas.is_some()
    }

    #[cfg(test)]
    pub fn frames_drawn(&self) -> u64 {
        self.frames_drawn
    }

    #[cfg(test)]
    pub fn canvas(&self) -> Option<&PixelCanvas> {
        self.canvas.as_ref()
    }

    /// Current eased signal values
    pub fn snapshot(&self) -> SignalSnapshot {
        SignalSnapshot {
            pointer: Vec2::new(self.pointer_x.get(), self.pointer_y.get()),
            scroll_y: self.scroll_y.get(),
        }
    }

    fn reset_signals(&mut self) {
        self.pointer_x.reset();
        self.pointer_y.reset();
        self.scroll_y.reset();
    }

    fn regenerate(&mut self, extent: Extent) {
        let (width, height) = (extent.width, extent.height);
        self.stars = stars::generate(width, height, &self.star_config, &mut self.rng);
        info!("Starfield regenerated: {} stars for {}", self.stars.len(), extent);
    }

    /// Resize the canvas and start over with a fresh star set
    fn apply_extent(&mut self, extent: Extent) {
        let Some(canvas) = self.canvas.as_mut() else {
            return;
        };
        if let Err(e) = canvas.resize(extent) {
            warn!("Starfield keeps its {} canvas: {}", canvas.extent(), e);
            return;
        }
        self.regenerate(extent);
    }

    fn render_frame(&mut self, now: Millis) {
        let dt = match self.last_frame {
            Some(prev) => ((now - prev) / 1000.0).clamp(0.0, MAX_FRAME_DT) as f32,
            None => 0.0,
        };
        self.last_frame = Some(now);

        if !self.device.is_mobile() {
            self.pointer_x.step(dt);
            self.pointer_y.step(dt);
            self.scroll_y.step(dt);
        }
        // One snapshot for the whole frame
        let signals = self.snapshot();

        let Some(canvas) = self.canvas.as_mut() else {
            return;
        };
        canvas.clear();
        let extent = canvas.extent();
        let (intensity, device) = (self.intensity, self.device);
        for draw in parallax::frame_draws(&self.stars, signals, extent, intensity, device) {
            canvas.fill_circle(draw.position, draw.radius, self.color, draw.opacity);
        }
        parallax::update_twinkle(&mut self.stars, now);
        self.frames_drawn += 1;
    }
}

impl Effect for Starfield {
    fn name(&self) -> &str {
        "starfield"
    }

    fn description(&self) -> &str {
        "Parallax starfield with twinkle and scroll wrap-around"
    }

    fn mount(&mut self, env: &mut EffectEnv<'_>) {
        if self.is_mounted() {
            return;
        }

        self.device = device::classify(env.metrics, self.mode);
        let extent = env.metrics.canvas_extent(self.device);
        let canvas = match PixelCanvas::with_size(extent) {
            Ok(c) => c,
            Err(e) => {
                warn!("Starfield disabled, no drawing surface: {}", e);
                return;
            }
        };
        self.canvas = Some(canvas);
        self.regenerate(extent);
        self.reset_signals();
        self.last_frame = None;

        let kinds: &[ListenerKind] = match self.device {
            DeviceClass::Desktop => &[
                ListenerKind::Resize,
                ListenerKind::PointerMove,
                ListenerKind::Scroll,
            ],
            DeviceClass::Mobile => &[ListenerKind::OrientationChange],
        };
        self.listeners = kinds.iter().map(|&kind| env.port.attach(kind)).collect();

        // The host may already be scrolled
        if !self.device.is_mobile() {
            self.scroll_y.jump(env.metrics.scroll_y);
        }

        self.frames.start(env.scheduler, Task::StarFrame);
        info!(
            "Starfield mounted ({:?}, {} canvas, {} stars)",
            self.device,
            extent,
            self.stars.len()
        );
    }

    fn unmount(&mut self, env: &mut EffectEnv<'_>) {
        self.frames.stop(env.scheduler);
        self.resize.cancel(env.scheduler);
        self.orientation.cancel(env.scheduler);
        for id in self.listeners.drain(..) {
            env.port.detach(id);
        }
        if self.canvas.take().is_some() {
            info!("Starfield unmounted after {} frames", self.frames_drawn);
        }
        self.stars.clear();
        self.reset_signals();
        self.last_frame = None;
    }

    fn handle_event(&mut self, event: &InputEvent, env: &mut EffectEnv<'_>) {
        let Some(canvas) = self.canvas.as_ref() else {
            return;
        };
        let mobile = self.device.is_mobile();

        match *event {
            InputEvent::Resize { .. } if !mobile => {
                self.resize.trigger(env.scheduler, env.now, Task::StarResizeSettled);
            }
            InputEvent::OrientationChange { .. } if mobile => {
                self.orientation
                    .trigger(env.scheduler, env.now, Task::StarOrientationSettled);
            }
            InputEvent::PointerMove { client_x, client_y } if !mobile => {
                let client = Vec2::new(client_x, client_y);
                let n = parallax::normalize_pointer(client, Vec2::ZERO, canvas.extent());
                self.pointer_x.set_target(n.x);
                self.pointer_y.set_target(n.y);
            }
            InputEvent::Scroll { y } if !mobile => {
                self.scroll_y.set_target(y);
            }
            _ => {}
        }
    }

    fn run_task(&mut self, id: TaskId, task: Task, env: &mut EffectEnv<'_>) {
        match task {
            Task::StarFrame => {
                if self.frames.fire(id) {
                    self.render_frame(env.now);
                    self.frames.reschedule(env.scheduler, Task::StarFrame);
                }
            }
            Task::StarResizeSettled => {
                if self.resize.settle(id) {
                    debug!("Resize settled at {}", env.metrics.viewport);
                    self.apply_extent(env.metrics.viewport);
                }
            }
            Task::StarOrientationSettled => {
                if self.orientation.settle(id) {
                    debug!("Orientation settled at {}", env.metrics.screen);
                    self.apply_extent(env.metrics.screen);
                }
            }
            _ => {}
        }
    }

    fn set_color(&mut self, color: Rgb, _env: &mut EffectEnv<'_>) {
        self.color = color;
    }

    fn layer(&self) -> Option<Layer<'_>> {
        self.canvas.as_ref().map(|canvas| Layer { canvas, opacity: 1.0 })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::effects::harness::Harness;
    use crate::renderer::MAX_CANVAS_DIMENSION;

    const DESKTOP_UA: &str = "Mozilla/5.0 (X11; Linux x86_64) Firefox/128.0";
    const PHONE_UA: &str = "Mozilla/5.0 (Linux; Android 14; Pixel 8) Mobile Safari/537.36";

    fn seeded() -> Starfield {
        let config = StarfieldConfig {
            seed: Some(5),
            ..StarfieldConfig::default()
        };
        Starfield::new(&config, DeviceMode::Auto)
    }

    #[test]
    fn desktop_mount_generates_and_listens() {
        let mut h = Harness::new(DESKTOP_UA, Extent::new(1920, 1080), Extent::new(1920, 1200));
        let mut fx = seeded();
        h.with(|env| fx.mount(env));

        assert_eq!(fx.device(), DeviceClass::Desktop);
        assert_eq!(fx.stars().len(), stars::star_count(1920, 1080, 0.00015));
        assert_eq!(h.bus.listener_count(), 3);
        assert!(h.scheduler.has_frame_request());
    }

    #[test]
    fn mobile_mount_uses_screen_and_orientation_only() {
        let mut h = Harness::new(PHONE_UA, Extent::new(390, 700), Extent::new(390, 844));
        let mut fx = seeded();
        h.with(|env| fx.mount(env));

        assert_eq!(fx.device(), DeviceClass::Mobile);
        assert_eq!(fx.canvas().unwrap().extent(), Extent::new(390, 844));
        assert_eq!(h.bus.listener_count(), 1);
        assert_eq!(
            h.bus.deliver(&InputEvent::OrientationChange {
                screen: Extent::new(844, 390)
            }),
            vec![0]
        );
    }

    #[test]
    fn unmount_releases_everything() {
        let mut h = Harness::new(DESKTOP_UA, Extent::new(800, 600), Extent::new(800, 600));
        let mut fx = seeded();
        h.with(|env| fx.mount(env));
        h.pump(&mut fx);
        h.dispatch(&mut fx, InputEvent::Resize {
            viewport: Extent::new(900, 600),
        });
        assert!(h.scheduler.pending() >= 2);

        h.with(|env| fx.unmount(env));
        assert_eq!(h.scheduler.pending(), 0);
        assert_eq!(h.bus.listener_count(), 0);
        assert!(fx.layer().is_none());

        let drawn = fx.frames_drawn();
        h.clock.advance(1000.0);
        h.pump(&mut fx);
        assert_eq!(fx.frames_drawn(), drawn);
    }

    #[test]
    fn resize_is_debounced_then_regenerates() {
        let mut h = Harness::new(DESKTOP_UA, Extent::new(1000, 1000), Extent::new(1000, 1000));
        let mut fx = seeded();
        h.with(|env| fx.mount(env));
        // Opacity twinkles every frame, so compare spawn positions
        let positions = |fx: &Starfield| fx.stars().iter().map(|s| s.position).collect::<Vec<_>>();
        let before = positions(&fx);

        for width in [1100, 1200, 1300] {
            h.dispatch(&mut fx, InputEvent::Resize {
                viewport: Extent::new(width, 1000),
            });
            h.clock.advance(100.0);
            h.pump(&mut fx);
            assert_eq!(positions(&fx), before, "regenerated before the debounce elapsed");
        }

        h.clock.advance(150.0);
        h.pump(&mut fx);
        assert_eq!(fx.canvas().unwrap().extent(), Extent::new(1300, 1000));
        assert_eq!(fx.stars().len(), stars::star_count(1300, 1000, 0.00015));
        assert_ne!(positions(&fx), before);
    }

    #[test]
    fn mobile_ignores_resize_and_settles_orientation() {
        let mut h = Harness::new(PHONE_UA, Extent::new(390, 700), Extent::new(390, 844));
        let mut fx = seeded();
        h.with(|env| fx.mount(env));

        h.dispatch(&mut fx, InputEvent::Resize {
            viewport: Extent::new(390, 760),
        });
        h.clock.advance(500.0);
        h.pump(&mut fx);
        assert_eq!(fx.canvas().unwrap().extent(), Extent::new(390, 844));

        h.dispatch(&mut fx, InputEvent::OrientationChange {
            screen: Extent::new(844, 390),
        });
        h.clock.advance(299.0);
        h.pump(&mut fx);
        assert_eq!(fx.canvas().unwrap().extent(), Extent::new(390, 844));

        h.clock.advance(1.0);
        h.pump(&mut fx);
        assert_eq!(fx.canvas().unwrap().extent(), Extent::new(844, 390));
    }

    #[test]
    fn orientation_settle_keeps_only_the_last_rotation() {
        let mut h = Harness::new(PHONE_UA, Extent::new(390, 700), Extent::new(390, 844));
        let mut fx = seeded();
        h.with(|env| fx.mount(env));
        let positions = |fx: &Starfield| fx.stars().iter().map(|s| s.position).collect::<Vec<_>>();
        let first = positions(&fx);

        h.dispatch(&mut fx, InputEvent::OrientationChange {
            screen: Extent::new(844, 390),
        });
        h.clock.advance(100.0);
        h.pump(&mut fx);
        h.dispatch(&mut fx, InputEvent::OrientationChange {
            screen: Extent::new(600, 390),
        });

        // The first rotation's settle time passes without a regenerate
        h.clock.advance(250.0);
        h.pump(&mut fx);
        assert_eq!(fx.canvas().unwrap().extent(), Extent::new(390, 844));
        assert_eq!(positions(&fx), first);

        h.clock.advance(50.0);
        h.pump(&mut fx);
        assert_eq!(fx.canvas().unwrap().extent(), Extent::new(600, 390));
        assert_eq!(fx.stars().len(), stars::star_count(600, 390, 0.00015));
        let settled = positions(&fx);
        assert_ne!(settled, first);

        // Nothing else is queued behind it
        h.clock.advance(1000.0);
        h.pump(&mut fx);
        assert_eq!(positions(&fx), settled);
        assert_eq!(h.scheduler.pending(), 1);
    }

    #[test]
    fn mobile_signals_stay_zero() {
        let mut h = Harness::new(PHONE_UA, Extent::new(390, 700), Extent::new(390, 844));
        h.metrics.scroll_y = 1500.0;
        let mut fx = seeded();
        h.with(|env| fx.mount(env));

        // Deliver directly, bypassing the bus, to prove the effect itself ignores them
        h.with(|env| {
            fx.handle_event(&InputEvent::PointerMove { client_x: 10.0, client_y: 10.0 }, env);
            fx.handle_event(&InputEvent::Scroll { y: 900.0 }, env);
        });
        for _ in 0..30 {
            h.clock.advance(16.0);
            h.pump(&mut fx);
        }
        assert_eq!(fx.snapshot(), SignalSnapshot::default());
    }

    #[test]
    fn pointer_and_scroll_are_eased() {
        let mut h = Harness::new(DESKTOP_UA, Extent::new(1000, 800), Extent::new(1000, 800));
        let mut fx = seeded();
        h.with(|env| fx.mount(env));
        h.pump(&mut fx);

        h.dispatch(&mut fx, InputEvent::PointerMove {
            client_x: 1000.0,
            client_y: 0.0,
        });
        h.dispatch(&mut fx, InputEvent::Scroll { y: 500.0 });
        h.clock.advance(16.0);
        h.pump(&mut fx);
        let early = fx.snapshot();
        assert!(early.pointer.x > 0.0 && early.pointer.x < 1.0);
        assert!(early.pointer.y < 0.0 && early.pointer.y > -1.0);
        assert!(early.scroll_y > 0.0 && early.scroll_y < 500.0);

        for _ in 0..400 {
            h.clock.advance(16.0);
            h.pump(&mut fx);
        }
        let settled = fx.snapshot();
        assert!((settled.pointer.x - 1.0).abs() < 1e-3);
        assert!((settled.pointer.y + 1.0).abs() < 1e-3);
        assert!((settled.scroll_y - 500.0).abs() < 0.01);
    }

    #[test]
    fn initial_scroll_is_read_at_mount() {
        let mut h = Harness::new(DESKTOP_UA, Extent::new(1000, 800), Extent::new(1000, 800));
        h.metrics.scroll_y = 320.0;
        let mut fx = seeded();
        h.with(|env| fx.mount(env));
        assert_eq!(fx.snapshot().scroll_y, 320.0);
    }

    #[test]
    fn frames_draw_and_reschedule() {
        let mut h = Harness::new(DESKTOP_UA, Extent::new(400, 400), Extent::new(400, 400));
        let mut fx = seeded();
        h.with(|env| fx.mount(env));
        for _ in 0..5 {
            h.clock.advance(16.0);
            h.pump(&mut fx);
        }
        assert_eq!(fx.frames_drawn(), 5);
        assert_eq!(h.scheduler.pending(), 1);
        let lit = fx.canvas().unwrap().pixels().iter().filter(|&&p| p != 0).count();
        assert!(lit > 0);
    }

    #[test]
    fn recolor_applies_from_the_next_frame() {
        let mut h = Harness::new(DESKTOP_UA, Extent::new(400, 400), Extent::new(400, 400));
        let mut fx = seeded();
        h.with(|env| fx.mount(env));
        h.clock.advance(16.0);
        h.pump(&mut fx);
        let lit = |fx: &Starfield| -> Vec<[u8; 4]> {
            let canvas = fx.canvas().unwrap();
            canvas.pixels().iter().filter(|&&p| p != 0).map(|p| p.to_be_bytes()).collect()
        };
        assert!(lit(&fx).iter().all(|&[_, r, g, b]| r == g && g == b));

        let red = Rgb::new(255, 0, 0);
        h.with(|env| fx.set_color(red, env));
        h.clock.advance(16.0);
        h.pump(&mut fx);
        let pixels = lit(&fx);
        assert!(!pixels.is_empty());
        assert!(pixels.iter().all(|&[_, r, g, b]| r == 255 && g == 0 && b == 0));
    }

    #[test]
    fn runaway_density_is_capped() {
        let config = StarfieldConfig {
            density: 1e15,
            seed: Some(1),
            ..StarfieldConfig::default()
        };
        let mut fx = Starfield::new(&config, DeviceMode::Desktop);
        let mut h = Harness::new(DESKTOP_UA, Extent::new(64, 64), Extent::new(64, 64));
        h.with(|env| fx.mount(env));
        assert!(fx.is_mounted());
        assert!(fx.stars().len() <= 64 * 64);
        h.clock.advance(16.0);
        h.pump(&mut fx);
        assert_eq!(fx.frames_drawn(), 1);
    }

    #[test]
    fn non_twinkling_stars_keep_their_opacity() {
        let config = StarfieldConfig {
            seed: Some(2),
            all_twinkle: false,
            twinkle_probability: 0.0,
            ..StarfieldConfig::default()
        };
        let mut fx = Starfield::new(&config, DeviceMode::Desktop);
        let mut h = Harness::new(DESKTOP_UA, Extent::new(800, 800), Extent::new(800, 800));
        h.with(|env| fx.mount(env));
        let before: Vec<f32> = fx.stars().iter().map(|s| s.opacity).collect();
        for _ in 0..10 {
            h.clock.advance(33.0);
            h.pump(&mut fx);
        }
        let after: Vec<f32> = fx.stars().iter().map(|s| s.opacity).collect();
        assert_eq!(before, after);
    }

    #[test]
    fn twinkling_stars_stay_in_range() {
        let mut h = Harness::new(DESKTOP_UA, Extent::new(800, 800), Extent::new(800, 800));
        let mut fx = seeded();
        h.with(|env| fx.mount(env));
        for _ in 0..50 {
            h.clock.advance(47.0);
            h.pump(&mut fx);
            assert!(fx.stars().iter().all(|s| (0.5..=1.0).contains(&s.opacity)));
        }
    }

    #[test]
    fn missing_surface_leaves_effect_inert() {
        let huge = Extent::new(MAX_CANVAS_DIMENSION * 2, 1000);
        let mut h = Harness::new(DESKTOP_UA, huge, huge);
        let mut fx = seeded();
        h.with(|env| fx.mount(env));

        assert!(!fx.is_mounted());
        assert_eq!(h.scheduler.pending(), 0);
        assert_eq!(h.bus.listener_count(), 0);
        h.with(|env| fx.handle_event(&InputEvent::Scroll { y: 10.0 }, env));
        assert_eq!(h.scheduler.pending(), 0);
    }

    #[test]
    fn tiny_canvas_runs_with_no_stars() {
        let mut h = Harness::new(DESKTOP_UA, Extent::new(3, 3), Extent::new(3, 3));
        let mut fx = seeded();
        h.with(|env| fx.mount(env));
        assert!(fx.stars().is_empty());
        h.clock.advance(16.0);
        h.pump(&mut fx);
        assert_eq!(fx.frames_drawn(), 1);
        assert!(fx.canvas().unwrap().pixels().iter().all(|&p| p == 0));
    }
}
