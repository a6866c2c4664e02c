//! Timers and animation frames
//!
//! A cooperative stand-in for `setTimeout`/`requestAnimationFrame`. Nothing
//! here owns a thread or a real timer: the host calls `take_due` once per
//! tick with the current time, and whatever is due comes back as plain task
//! values. Tests drive it with a `ManualClock`.

#[cfg(test)]
use std::cell::Cell;
use std::collections::BTreeMap;
use std::time::Instant;

/// Milliseconds on the host's monotonic timeline
pub type Millis = f64;

/// Source of the current time
pub trait Clock {
    fn now_ms(&self) -> Millis;
}

/// Wall-clock time since the clock was created
#[derive(Debug, Clone, Copy)]
pub struct SystemClock {
    origin: Instant,
}

impl SystemClock {
    pub fn new() -> Self {
        Self { origin: Instant::now() }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for SystemClock {
    fn now_ms(&self) -> Millis {
        self.origin.elapsed().as_secs_f64() * 1000.0
    }
}

/// Hand-advanced clock for tests
#[cfg(test)]
#[derive(Debug, Default)]
pub struct ManualClock {
    now: Cell<Millis>,
}

#[cfg(test)]
impl ManualClock {
    pub fn new(start: Millis) -> Self {
        Self { now: Cell::new(start) }
    }

    pub fn advance(&self, ms: Millis) -> Millis {
        self.now.set(self.now.get() + ms);
        self.now.get()
    }
}

#[cfg(test)]
impl Clock for ManualClock {
    fn now_ms(&self) -> Millis {
        self.now.get()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TaskId(u64);

#[derive(Debug, Clone, Copy, PartialEq)]
enum Trigger {
    At(Millis),
    NextFrame,
}

#[derive(Debug)]
struct Pending<T> {
    trigger: Trigger,
    task: T,
}

/// Pending timeouts and frame callbacks for one owner
#[derive(Debug)]
pub struct Scheduler<T> {
    next_id: u64,
    pending: BTreeMap<TaskId, Pending<T>>,
}

impl<T> Default for Scheduler<T> {
    fn default() -> Self {
        Self {
            next_id: 0,
            pending: BTreeMap::new(),
        }
    }
}

impl<T> Scheduler<T> {
    pub fn new() -> Self {
        Self::default()
    }

    fn insert(&mut self, trigger: Trigger, task: T) -> TaskId {
        let id = TaskId(self.next_id);
        self.next_id += 1;
        self.pending.insert(id, Pending { trigger, task });
        id
    }

    /// Run `task` once `delay_ms` has elapsed after `now`
    pub fn set_timeout(&mut self, now: Millis, delay_ms: Millis, task: T) -> TaskId {
        self.insert(Trigger::At(now + delay_ms.max(0.0)), task)
    }

    /// Run `task` on the next frame
    pub fn request_frame(&mut self, task: T) -> TaskId {
        self.insert(Trigger::NextFrame, task)
    }

    /// Cancel a pending task. Returns false if it already ran or was cancelled.
    pub fn cancel(&mut self, id: TaskId) -> bool {
        self.pending.remove(&id).is_some()
    }

    pub fn pending(&self) -> usize {
        self.pending.len()
    }

    /// Earliest timeout deadline, if any
    #[cfg(test)]
    pub fn next_deadline(&self) -> Option<Millis> {
        self.pending
            .values()
            .filter_map(|p| match p.trigger {
                Trigger::At(at) => Some(at),
                Trigger::NextFrame => None,
            })
            .reduce(f64::min)
    }

    #[cfg(test)]
    pub fn has_frame_request(&self) -> bool {
        self.pending.values().any(|p| p.trigger == Trigger::NextFrame)
    }

    /// Remove and return everything due at `now`: expired timeouts ordered by
    /// deadline, then every frame requested before this call. Tasks scheduled
    /// while the returned ones run wait for the next call.
    pub fn take_due(&mut self, now: Millis) -> Vec<(TaskId, T)> {
        let mut timeouts: Vec<(Millis, TaskId)> = Vec::new();
        let mut frames: Vec<TaskId> = Vec::new();
        for (id, p) in &self.pending {
            match p.trigger {
                Trigger::At(at) if at <= now => timeouts.push((at, *id)),
                Trigger::At(_) => {}
                Trigger::NextFrame => frames.push(*id),
            }
        }
        timeouts.sort_by(|a, b| a.0.total_cmp(&b.0).then(a.1.cmp(&b.1)));

        timeouts
            .into_iter()
            .map(|(_, id)| id)
            .chain(frames)
            .filter_map(|id| self.pending.remove(&id).map(|p| (id, p.task)))
            .collect()
    }
}

/// Last-write-wins delayed callback
#[derive(Debug, Clone)]
pub struct Debouncer {
    delay_ms: Millis,
    pending: Option<TaskId>,
}

impl Debouncer {
    pub fn new(delay_ms: Millis) -> Self {
        Self {
            delay_ms,
            pending: None,
        }
    }

    /// Cancel any pending invocation and schedule a fresh one
    pub fn trigger<T>(&mut self, scheduler: &mut Scheduler<T>, now: Millis, task: T) -> TaskId {
        self.trigger_after(scheduler, now, self.delay_ms, task)
    }

    /// Like `trigger`, with a one-off delay. The pending slot is shared, so
    /// this still replaces whatever `trigger` scheduled.
    pub fn trigger_after<T>(
        &mut self,
        scheduler: &mut Scheduler<T>,
        now: Millis,
        delay_ms: Millis,
        task: T,
    ) -> TaskId {
        self.cancel(scheduler);
        let id = scheduler.set_timeout(now, delay_ms, task);
        self.pending = Some(id);
        id
    }

    /// Called when a task fires: true only for the invocation that is still current
    pub fn settle(&mut self, id: TaskId) -> bool {
        if self.pending == Some(id) {
            self.pending = None;
            true
        } else {
            false
        }
    }

    pub fn cancel<T>(&mut self, scheduler: &mut Scheduler<T>) {
        if let Some(id) = self.pending.take() {
            scheduler.cancel(id);
        }
    }

    #[cfg(test)]
    pub fn is_pending(&self) -> bool {
        self.pending.is_some()
    }
}

/// A self-rescheduling animation loop
#[derive(Debug, Clone, Default)]
pub struct FrameLoop {
    pending: Option<TaskId>,
    running: bool,
}

impl FrameLoop {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn start<T>(&mut self, scheduler: &mut Scheduler<T>, task: T) {
        if self.running {
            return;
        }
        self.running = true;
        self.pending = Some(scheduler.request_frame(task));
    }

    pub fn stop<T>(&mut self, scheduler: &mut Scheduler<T>) {
        self.running = false;
        if let Some(id) = self.pending.take() {
            scheduler.cancel(id);
        }
    }

    /// True when `id` is this loop's current frame; the caller then draws and
    /// calls `reschedule`
    pub fn fire(&mut self, id: TaskId) -> bool {
        if self.running && self.pending == Some(id) {
            self.pending = None;
            true
        } else {
            false
        }
    }

    pub fn reschedule<T>(&mut self, scheduler: &mut Scheduler<T>, task: T) {
        if self.running && self.pending.is_none() {
            self.pending = Some(scheduler.request_frame(task));
        }
    }

    #[cfg(test)]
    pub fn is_running(&self) -> bool {
        self.running
    }
}
