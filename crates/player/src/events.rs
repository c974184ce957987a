//! Player events and the listener registry.

use std::collections::HashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::str::FromStr;
use std::sync::Arc;

use alphaplay_common::error::PlayerError;
use alphaplay_render::ResolvedSize;

/// Event names accepted by `on`/`off`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    Ready,
    Play,
    Pause,
    TimeUpdate,
    Ended,
    Seeked,
    Error,
    Warning,
    SizeChange,
}

impl EventKind {
    pub const ALL: [EventKind; 9] = [
        EventKind::Ready,
        EventKind::Play,
        EventKind::Pause,
        EventKind::TimeUpdate,
        EventKind::Ended,
        EventKind::Seeked,
        EventKind::Error,
        EventKind::Warning,
        EventKind::SizeChange,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            EventKind::Ready => "ready",
            EventKind::Play => "play",
            EventKind::Pause => "pause",
            EventKind::TimeUpdate => "timeupdate",
            EventKind::Ended => "ended",
            EventKind::Seeked => "seeked",
            EventKind::Error => "error",
            EventKind::Warning => "warning",
            EventKind::SizeChange => "sizechange",
        }
    }
}

impl std::fmt::Display for EventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for EventKind {
    type Err = PlayerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        EventKind::ALL
            .into_iter()
            .find(|kind| kind.name() == s)
            .ok_or_else(|| PlayerError::invalid_input(format!("unknown event '{s}'")))
    }
}

/// A notification delivered to listeners.
#[derive(Debug, Clone)]
pub enum PlayerEvent {
    Ready,
    Play,
    Pause,
    TimeUpdate { position: f64 },
    Ended,
    Seeked { position: f64 },
    Error(Arc<PlayerError>),
    Warning(Arc<PlayerError>),
    SizeChange(ResolvedSize),
}

impl PlayerEvent {
    pub fn kind(&self) -> EventKind {
        match self {
            PlayerEvent::Ready => EventKind::Ready,
            PlayerEvent::Play => EventKind::Play,
            PlayerEvent::Pause => EventKind::Pause,
            PlayerEvent::TimeUpdate { .. } => EventKind::TimeUpdate,
            PlayerEvent::Ended => EventKind::Ended,
            PlayerEvent::Seeked { .. } => EventKind::Seeked,
            PlayerEvent::Error(_) => EventKind::Error,
            PlayerEvent::Warning(_) => EventKind::Warning,
            PlayerEvent::SizeChange(_) => EventKind::SizeChange,
        }
    }
}

/// Handle returned by [`EventBus::on`], used to unsubscribe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

pub type Listener = Box<dyn FnMut(&PlayerEvent)>;

/// Ordered listeners per event kind.
///
/// Each listener runs in isolation: a panicking listener is logged and the
/// remaining listeners still run.
#[derive(Default)]
pub struct EventBus {
    next_id: u64,
    listeners: HashMap<EventKind, Vec<(ListenerId, Listener)>>,
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let counts: HashMap<_, _> = self
            .listeners
            .iter()
            .map(|(kind, list)| (*kind, list.len()))
            .collect();
        f.debug_struct("EventBus").field("listeners", &counts).finish()
    }
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on(&mut self, kind: EventKind, listener: impl FnMut(&PlayerEvent) + 'static) -> ListenerId {
        self.next_id += 1;
        let id = ListenerId(self.next_id);
        self.listeners
            .entry(kind)
            .or_default()
            .push((id, Box::new(listener)));
        id
    }

    /// Remove a listener. Returns whether it was registered.
    pub fn off(&mut self, kind: EventKind, id: ListenerId) -> bool {
        let Some(list) = self.listeners.get_mut(&kind) else {
            return false;
        };
        let before = list.len();
        list.retain(|(existing, _)| *existing != id);
        before != list.len()
    }

    pub fn listener_count(&self, kind: EventKind) -> usize {
        self.listeners.get(&kind).map_or(0, Vec::len)
    }

    /// Deliver an event. Returns how many listeners panicked.
    pub fn emit(&mut self, event: &PlayerEvent) -> usize {
        let kind = event.kind();
        let Some(list) = self.listeners.get_mut(&kind) else {
            return 0;
        };
        let mut failures = 0;
        for (id, listener) in list.iter_mut() {
            if catch_unwind(AssertUnwindSafe(|| listener(event))).is_err() {
                failures += 1;
                tracing::error!(event = %kind, listener = id.0, "Event listener panicked");
            }
        }
        failures
    }

    pub fn clear(&mut self) {
        self.listeners.clear();
    }
}
