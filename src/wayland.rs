//! Wayland host
//!
//! Puts one wlr layer-shell surface on the background layer, anchored to all
//! edges with no exclusive zone, and presents the stage's composite through a
//! shared-memory ARGB8888 buffer. A calloop timer at the configured frame rate
//! pumps the stage; Wayland events feed its input bus:
//!
//! - layer configure becomes `Resize`
//! - a logical size change on our output becomes `OrientationChange`
//! - pointer enter and motion become `PointerMove`
//! - vertical axis steps accumulate into an absolute `Scroll` offset
//!
//! Pointer input only reaches a background surface where no window covers it.

use crate::config::Config;
use crate::device::HostMetrics;
use crate::input::InputEvent;
use crate::renderer::{Extent, PixelCanvas};
use crate::scheduler::{Clock, SystemClock};
use crate::stage::Stage;
use log::{debug, error, info, warn};
use smithay_client_toolkit::reexports::calloop::EventLoop;
use smithay_client_toolkit::reexports::calloop::timer::{TimeoutAction, Timer};
use smithay_client_toolkit::reexports::calloop_wayland_source::WaylandSource;
use smithay_client_toolkit::{
    compositor::{CompositorHandler, CompositorState},
    delegate_compositor, delegate_layer, delegate_output, delegate_pointer, delegate_registry,
    delegate_seat, delegate_shm,
    output::{OutputHandler, OutputState},
    registry::{ProvidesRegistryState, RegistryState},
    registry_handlers,
    seat::{
        Capability, SeatHandler, SeatState,
        pointer::{PointerEvent, PointerEventKind, PointerHandler},
    },
    shell::{
        WaylandSurface,
        wlr_layer::{
            Anchor, KeyboardInteractivity, Layer, LayerShell, LayerShellHandler, LayerSurface,
            LayerSurfaceConfigure,
        },
    },
    shm::{
        Shm, ShmHandler,
        slot::{Buffer, SlotPool},
    },
};
use std::time::Duration;
use wayland_client::{
    Connection, QueueHandle,
    globals::registry_queue_init,
    protocol::{wl_output, wl_pointer, wl_seat, wl_shm, wl_surface},
};

/// Layer-shell namespace, visible to compositor layer rules
const NAMESPACE: &str = "hyprstars";

/// Starting shm pool size; the pool grows on demand
const INITIAL_POOL_BYTES: usize = 1920 * 1080 * 4;

pub struct WaylandHost {
    registry_state: RegistryState,
    seat_state: SeatState,
    output_state: OutputState,
    shm: Shm,

    pool: SlotPool,
    buffer: Option<Buffer>,
    layer: Option<LayerSurface>,
    output: Option<wl_output::WlOutput>,
    pointer: Option<wl_pointer::WlPointer>,

    stage: Stage,
    clock: SystemClock,
    frame: PixelCanvas,
    extent: Extent,
    scroll_y: f32,
    configured: bool,
    exit: bool,
}

impl WaylandHost {
    /// Logical size of the output our surface lives on
    fn output_extent(&self) -> Option<Extent> {
        let output = self.output.as_ref()?;
        let (w, h) = self.output_state.info(output)?.logical_size?;
        let extent = Extent::new(w.max(0) as u32, h.max(0) as u32);
        (!extent.is_empty()).then_some(extent)
    }

    fn tick(&mut self) {
        let now = self.clock.now_ms();
        self.stage.pump(now);
        if !self.configured {
            return;
        }
        if let Err(e) = self.present() {
            warn!("Failed to present frame: {}", e);
        }
    }

    /// Composite the stage and hand the result to the compositor
    fn present(&mut self) -> Result<(), Box<dyn std::error::Error>> {
        let Some(layer) = self.layer.as_ref() else {
            return Ok(());
        };
        let extent = self.extent;
        if extent.is_empty() {
            return Ok(());
        }
        if self.frame.extent() != extent {
            self.frame.resize(extent)?;
            self.buffer = None;
        }
        self.stage.composite(&mut self.frame);

        let (width, height) = (extent.width as i32, extent.height as i32);
        let stride = width * 4;
        let mut buffer = match self.buffer.take() {
            Some(buffer) => buffer,
            None => {
                self.pool
                    .create_buffer(width, height, stride, wl_shm::Format::Argb8888)?
                    .0
            }
        };
        if self.pool.canvas(&buffer).is_none() {
            // Compositor still holds the previous buffer
            buffer = self
                .pool
                .create_buffer(width, height, stride, wl_shm::Format::Argb8888)?
                .0;
        }
        let canvas = self.pool.canvas(&buffer).ok_or("shm buffer not writable")?;
        canvas.copy_from_slice(self.frame.as_bytes());

        let surface = layer.wl_surface();
        surface.damage_buffer(0, 0, width, height);
        buffer.attach_to(surface)?;
        layer.commit();
        self.buffer = Some(buffer);
        Ok(())
    }
}

/// Find the output named `wanted`, if one was asked for
fn pick_output(outputs: &OutputState, wanted: Option<&str>) -> Option<wl_output::WlOutput> {
    let wanted = wanted?;
    let found = outputs
        .outputs()
        .find(|o| outputs.info(o).and_then(|i| i.name).as_deref() == Some(wanted));
    if found.is_none() {
        let names: Vec<String> = outputs
            .outputs()
            .filter_map(|o| outputs.info(&o).and_then(|i| i.name))
            .collect();
        warn!(
            "Output '{}' not found (have: {}), letting the compositor choose",
            wanted,
            names.join(", ")
        );
    }
    found
}

/// Run the stage on a background layer surface until the compositor closes it
pub fn run(config: &Config, metrics: HostMetrics) -> Result<(), Box<dyn std::error::Error>> {
    let conn = Connection::connect_to_env()?;
    let (globals, mut event_queue) = registry_queue_init(&conn)?;
    let qh = event_queue.handle();

    let compositor = CompositorState::bind(&globals, &qh)?;
    let layer_shell = LayerShell::bind(&globals, &qh)?;
    let shm = Shm::bind(&globals, &qh)?;
    let pool = SlotPool::new(INITIAL_POOL_BYTES, &shm)?;
    let frame = PixelCanvas::with_size(metrics.viewport)?;
    let extent = metrics.viewport;

    let mut host = WaylandHost {
        registry_state: RegistryState::new(&globals),
        seat_state: SeatState::new(&globals, &qh),
        output_state: OutputState::new(&globals, &qh),
        shm,
        pool,
        buffer: None,
        layer: None,
        output: None,
        pointer: None,
        stage: Stage::from_config(config, metrics),
        clock: SystemClock::new(),
        frame,
        extent,
        scroll_y: 0.0,
        configured: false,
        exit: false,
    };

    // Output names arrive with the first roundtrip
    event_queue.roundtrip(&mut host)?;
    host.output = pick_output(&host.output_state, config.general.output.as_deref());

    let surface = compositor.create_surface(&qh);
    let layer = layer_shell.create_layer_surface(
        &qh,
        surface,
        Layer::Background,
        Some(NAMESPACE),
        host.output.as_ref(),
    );
    layer.set_anchor(Anchor::TOP | Anchor::BOTTOM | Anchor::LEFT | Anchor::RIGHT);
    layer.set_exclusive_zone(-1);
    layer.set_keyboard_interactivity(KeyboardInteractivity::None);
    layer.set_size(0, 0);
    layer.commit();
    host.layer = Some(layer);

    let mut event_loop: EventLoop<WaylandHost> = EventLoop::try_new()?;
    let loop_handle = event_loop.handle();

    WaylandSource::new(conn, event_queue)
        .insert(loop_handle.clone())
        .map_err(|e| e.error)?;

    let interval = Duration::from_millis(config.general.frame_interval_ms());
    loop_handle
        .insert_source(Timer::immediate(), move |_, _, host: &mut WaylandHost| {
            host.tick();
            TimeoutAction::ToDuration(interval)
        })
        .map_err(|e| e.error)?;

    info!("Starting Wayland event loop at {}ms per frame", interval.as_millis());
    while !host.exit {
        if let Err(e) = event_loop.dispatch(interval, &mut host) {
            error!("Event loop error: {}", e);
            break;
        }
    }

    let now = host.clock.now_ms();
    host.stage.unmount(now);
    info!("HyprStars shutting down");
    Ok(())
}

impl CompositorHandler for WaylandHost {
    fn scale_factor_changed(
        &mut self,
        _conn: &Connection,
        _qh: &QueueHandle<Self>,
        _surface: &wl_surface::WlSurface,
        new_factor: i32,
    ) {
        debug!("Scale factor changed to {}, drawing at buffer scale 1", new_factor);
    }

    fn transform_changed(
        &mut self,
        _conn: &Connection,
        _qh: &QueueHandle<Self>,
        _surface: &wl_surface::WlSurface,
        _new_transform: wl_output::Transform,
    ) {
    }

    fn frame(
        &mut self,
        _conn: &Connection,
        _qh: &QueueHandle<Self>,
        _surface: &wl_surface::WlSurface,
        _time: u32,
    ) {
    }

    fn surface_enter(
        &mut self,
        _conn: &Connection,
        _qh: &QueueHandle<Self>,
        _surface: &wl_surface::WlSurface,
        output: &wl_output::WlOutput,
    ) {
        if self.output.is_none() {
            self.output = Some(output.clone());
        }
    }

    fn surface_leave(
        &mut self,
        _conn: &Connection,
        _qh: &QueueHandle<Self>,
        _surface: &wl_surface::WlSurface,
        _output: &wl_output::WlOutput,
    ) {
    }
}

impl OutputHandler for WaylandHost {
    fn output_state(&mut self) -> &mut OutputState {
        &mut self.output_state
    }

    fn new_output(
        &mut self,
        _conn: &Connection,
        _qh: &QueueHandle<Self>,
        output: wl_output::WlOutput,
    ) {
        if let Some(info) = self.output_state.info(&output) {
            debug!("New output: {:?}", info.name);
        }
    }

    fn update_output(
        &mut self,
        _conn: &Connection,
        _qh: &QueueHandle<Self>,
        output: wl_output::WlOutput,
    ) {
        if self.output.as_ref() != Some(&output) || !self.configured {
            return;
        }
        let Some(screen) = self.output_extent() else {
            return;
        };
        if screen != self.stage.metrics().screen {
            info!("Output now {}", screen);
            let now = self.clock.now_ms();
            self.stage.dispatch(InputEvent::OrientationChange { screen }, now);
        }
    }

    fn output_destroyed(
        &mut self,
        _conn: &Connection,
        _qh: &QueueHandle<Self>,
        output: wl_output::WlOutput,
    ) {
        if self.output.as_ref() == Some(&output) {
            warn!("Our output went away");
            self.output = None;
        }
    }
}

impl LayerShellHandler for WaylandHost {
    fn closed(&mut self, _conn: &Connection, _qh: &QueueHandle<Self>, _layer: &LayerSurface) {
        info!("Layer surface closed by compositor");
        self.exit = true;
    }

    fn configure(
        &mut self,
        _conn: &Connection,
        _qh: &QueueHandle<Self>,
        _layer: &LayerSurface,
        configure: LayerSurfaceConfigure,
        _serial: u32,
    ) {
        let (w, h) = configure.new_size;
        let extent = if w == 0 || h == 0 {
            self.output_extent().unwrap_or(self.extent)
        } else {
            Extent::new(w, h)
        };
        let now = self.clock.now_ms();

        if !self.configured {
            self.configured = true;
            self.extent = extent;
            let screen = self.output_extent().unwrap_or(extent);
            // Not mounted yet, so these only seed the host metrics
            self.stage.dispatch(InputEvent::Resize { viewport: extent }, now);
            self.stage.dispatch(InputEvent::OrientationChange { screen }, now);
            self.stage.mount(now);
            info!("Configured {} background surface", extent);
        } else if extent != self.extent {
            debug!("Surface resized {} -> {}", self.extent, extent);
            self.extent = extent;
            self.stage.dispatch(InputEvent::Resize { viewport: extent }, now);
        }
        self.tick();
    }
}

impl SeatHandler for WaylandHost {
    fn seat_state(&mut self) -> &mut SeatState {
        &mut self.seat_state
    }

    fn new_seat(&mut self, _conn: &Connection, _qh: &QueueHandle<Self>, _seat: wl_seat::WlSeat) {}

    fn new_capability(
        &mut self,
        _conn: &Connection,
        qh: &QueueHandle<Self>,
        seat: wl_seat::WlSeat,
        capability: Capability,
    ) {
        if capability == Capability::Pointer && self.pointer.is_none() {
            match self.seat_state.get_pointer(qh, &seat) {
                Ok(pointer) => self.pointer = Some(pointer),
                Err(e) => warn!("Failed to get pointer: {}", e),
            }
        }
    }

    fn remove_capability(
        &mut self,
        _conn: &Connection,
        _qh: &QueueHandle<Self>,
        _seat: wl_seat::WlSeat,
        capability: Capability,
    ) {
        if capability == Capability::Pointer
            && let Some(pointer) = self.pointer.take()
        {
            pointer.release();
        }
    }

    fn remove_seat(
        &mut self,
        _conn: &Connection,
        _qh: &QueueHandle<Self>,
        _seat: wl_seat::WlSeat,
    ) {
    }
}

impl PointerHandler for WaylandHost {
    fn pointer_frame(
        &mut self,
        _conn: &Connection,
        _qh: &QueueHandle<Self>,
        _pointer: &wl_pointer::WlPointer,
        events: &[PointerEvent],
    ) {
        let Some(surface) = self.layer.as_ref().map(|l| l.wl_surface().clone()) else {
            return;
        };
        let now = self.clock.now_ms();
        for event in events.iter().filter(|e| e.surface == surface) {
            match &event.kind {
                PointerEventKind::Enter { .. } | PointerEventKind::Motion { .. } => {
                    let (x, y) = event.position;
                    self.stage.dispatch(
                        InputEvent::PointerMove {
                            client_x: x as f32,
                            client_y: y as f32,
                        },
                        now,
                    );
                }
                PointerEventKind::Axis { vertical, .. } if vertical.absolute != 0.0 => {
                    self.scroll_y = (self.scroll_y + vertical.absolute as f32).max(0.0);
                    self.stage.dispatch(InputEvent::Scroll { y: self.scroll_y }, now);
                }
                _ => {}
            }
        }
    }
}

impl ShmHandler for WaylandHost {
    fn shm_state(&mut self) -> &mut Shm {
        &mut self.shm
    }
}

impl ProvidesRegistryState for WaylandHost {
    fn registry(&mut self) -> &mut RegistryState {
        &mut self.registry_state
    }

    registry_handlers![OutputState, SeatState];
}

delegate_compositor!(WaylandHost);
delegate_output!(WaylandHost);
delegate_shm!(WaylandHost);
delegate_seat!(WaylandHost);
delegate_pointer!(WaylandHost);
delegate_layer!(WaylandHost);
delegate_registry!(WaylandHost);

