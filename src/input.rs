//! Input port
//!
//! Hosts turn their native events (Wayland pointer frames, layer configure,
//! replayed traces) into `InputEvent`s. Effects never see an event unless
//! they attached a listener for its kind, and they detach exactly what they
//! attached when unmounted.

use crate::renderer::Extent;
use log::debug;
use serde::Deserialize;
use std::collections::BTreeMap;

/// A host-level input notification
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum InputEvent {
    /// Pointer position in client (surface) coordinates
    PointerMove { client_x: f32, client_y: f32 },
    /// Absolute vertical scroll offset
    Scroll { y: f32 },
    /// The visible area changed size
    Resize { viewport: Extent },
    /// The device rotated; `screen` is the new physical extent
    OrientationChange { screen: Extent },
}

impl InputEvent {
    pub fn kind(&self) -> ListenerKind {
        match self {
            InputEvent::PointerMove { .. } => ListenerKind::PointerMove,
            InputEvent::Scroll { .. } => ListenerKind::Scroll,
            InputEvent::Resize { .. } => ListenerKind::Resize,
            InputEvent::OrientationChange { .. } => ListenerKind::OrientationChange,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ListenerKind {
    PointerMove,
    Scroll,
    Resize,
    OrientationChange,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ListenerId(u64);

/// Something listeners can be attached to and detached from
pub trait InputPort {
    fn attach(&mut self, kind: ListenerKind) -> ListenerId;
    fn detach(&mut self, id: ListenerId);
}

/// Index of the effect that owns a listener
pub type Owner = usize;

#[derive(Debug, Clone, Copy)]
struct Registration {
    owner: Owner,
    kind: ListenerKind,
}

/// Concrete port shared by every effect on a stage
#[derive(Debug, Default)]
pub struct EventBus {
    next_id: u64,
    listeners: BTreeMap<ListenerId, Registration>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn attach(&mut self, owner: Owner, kind: ListenerKind) -> ListenerId {
        let id = ListenerId(self.next_id);
        self.next_id += 1;
        self.listeners.insert(id, Registration { owner, kind });
        debug!("Listener {:?} attached for {:?} (owner {})", id, kind, owner);
        id
    }

    pub fn detach(&mut self, id: ListenerId) {
        if let Some(reg) = self.listeners.remove(&id) {
            debug!("Listener {:?} detached for {:?} (owner {})", id, reg.kind, reg.owner);
        }
    }

    /// Owners that should receive `event`, in ascending order, each once
    pub fn deliver(&self, event: &InputEvent) -> Vec<Owner> {
        let kind = event.kind();
        let mut owners: Vec<Owner> = self
            .listeners
            .values()
            .filter(|reg| reg.kind == kind)
            .map(|reg| reg.owner)
            .collect();
        owners.sort_unstable();
        owners.dedup();
        owners
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.len()
    }

    #[cfg(test)]
    pub fn listeners_of(&self, owner: Owner) -> usize {
        self.listeners.values().filter(|reg| reg.owner == owner).count()
    }

    /// A port view that attaches everything on behalf of `owner`
    pub fn scoped(&mut self, owner: Owner) -> ScopedPort<'_> {
        ScopedPort { bus: self, owner }
    }
}

/// `InputPort` bound to a single owner
pub struct ScopedPort<'a> {
    bus: &'a mut EventBus,
    owner: Owner,
}

impl InputPort for ScopedPort<'_> {
    fn attach(&mut self, kind: ListenerKind) -> ListenerId {
        self.bus.attach(self.owner, kind)
    }

    fn detach(&mut self, id: ListenerId) {
        self.bus.detach(id);
    }
}
