//! Display-less host
//!
//! Runs the same stage as the Wayland host on a calloop event loop, with no
//! compositor. Input comes from an optional JSON-lines trace, each line
//! scheduled as a calloop timer at its offset. After the requested number of
//! frames the final composite can be written out as a PPM image.

use crate::config::{self, Config};
use crate::device::HostMetrics;
use crate::input::InputEvent;
use crate::renderer::{PixelCanvas, Rgb};
use crate::scheduler::{Clock, SystemClock};
use crate::stage::Stage;
use calloop::EventLoop;
use calloop::timer::{TimeoutAction, Timer};
use log::{debug, info, warn};
use serde::Deserialize;
use std::fs;
use std::path::PathBuf;
use std::time::Duration;

/// One scripted step of a trace file
#[derive(Debug, Clone, Deserialize)]
pub struct TraceEntry {
    /// Offset from start in milliseconds
    pub at_ms: u64,

    #[serde(default)]
    pub event: Option<InputEvent>,

    #[serde(default)]
    pub recolor: Option<Recolor>,
}

/// Change a layer's target color mid-run
#[derive(Debug, Clone, Deserialize)]
pub struct Recolor {
    pub layer: String,
    pub color: String,
}

/// Parse a JSON-lines trace. Blank lines and `#` comments are skipped.
pub fn parse_trace(text: &str) -> Result<Vec<TraceEntry>, Box<dyn std::error::Error>> {
    let mut entries = Vec::new();
    for (n, line) in text.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let entry: TraceEntry =
            serde_json::from_str(line).map_err(|e| format!("trace line {}: {}", n + 1, e))?;
        entries.push(entry);
    }
    entries.sort_by_key(|e| e.at_ms);
    Ok(entries)
}

pub struct HeadlessOptions {
    pub frames: u32,
    pub output: Option<PathBuf>,
    pub trace: Option<PathBuf>,
}

struct HeadlessState {
    stage: Stage,
    clock: SystemClock,
    frames_left: u32,
    exit: bool,
}

impl HeadlessState {
    fn tick(&mut self) {
        let now = self.clock.now_ms();
        let ran = self.stage.pump(now);
        debug!("Tick at {:.1}ms ran {} task(s)", now, ran);

        self.frames_left = self.frames_left.saturating_sub(1);
        if self.frames_left == 0 {
            self.exit = true;
        }
    }

    fn apply(&mut self, entry: &TraceEntry) {
        let now = self.clock.now_ms();
        if let Some(event) = entry.event {
            debug!("Trace event at {}ms: {:?}", entry.at_ms, event);
            self.stage.dispatch(event, now);
        }
        if let Some(ref recolor) = entry.recolor {
            let color = config::color_or(&recolor.color, Rgb::WHITE, &recolor.layer);
            self.stage.set_color(&recolor.layer, color, now);
        }
    }
}

/// Run the stage headless until `opts.frames` frames have been pumped
pub fn run(
    config: &Config,
    metrics: HostMetrics,
    opts: HeadlessOptions,
) -> Result<(), Box<dyn std::error::Error>> {
    let trace = match opts.trace {
        Some(ref path) => parse_trace(&fs::read_to_string(path)?)?,
        None => Vec::new(),
    };

    let mut event_loop: EventLoop<HeadlessState> = EventLoop::try_new()?;
    let handle = event_loop.handle();

    let mut state = HeadlessState {
        stage: Stage::from_config(config, metrics),
        clock: SystemClock::new(),
        frames_left: opts.frames.max(1),
        exit: false,
    };
    state.stage.mount(state.clock.now_ms());

    info!("Replaying {} trace entries", trace.len());
    for entry in trace {
        handle
            .insert_source(
                Timer::from_duration(Duration::from_millis(entry.at_ms)),
                move |_, _, state: &mut HeadlessState| {
                    state.apply(&entry);
                    TimeoutAction::Drop
                },
            )
            .map_err(|e| e.error)?;
    }

    let interval = Duration::from_millis(config.general.frame_interval_ms());
    handle
        .insert_source(Timer::immediate(), move |_, _, state: &mut HeadlessState| {
            state.tick();
            if state.exit {
                TimeoutAction::Drop
            } else {
                TimeoutAction::ToDuration(interval)
            }
        })
        .map_err(|e| e.error)?;

    while !state.exit {
        event_loop.dispatch(Some(interval), &mut state)?;
    }

    if let Some(ref path) = opts.output {
        let mut out = PixelCanvas::with_size(state.stage.metrics().viewport)?;
        state.stage.composite(&mut out);
        out.write_ppm(path)?;
        info!("Wrote {} frame to {}", out.extent(), path.display());
    }

    let now = state.clock.now_ms();
    state.stage.unmount(now);
    if state.stage.pending_tasks() > 0 || state.stage.listener_count() > 0 {
        warn!(
            "Stage left {} task(s) and {} listener(s) behind",
            state.stage.pending_tasks(),
            state.stage.listener_count()
        );
    }
    Ok(())
}
