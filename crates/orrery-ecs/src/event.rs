//! Lifecycle notifications published by the [`World`](crate::world::World).
//!
//! The emitter is deliberately small: listeners subscribe to one
//! [`EventKind`] and are invoked synchronously, in subscription order, every
//! time the world dispatches an event of that kind.
//!
//! | Event       | Payload                    |
//! |-------------|----------------------------|
//! | `spawned`   | `entity`                   |
//! | `destroyed` | `entity`                   |
//! | `added`     | `entity`, `component`      |
//! | `removed`   | `entity`, `component`      |
//! | `updated`   | `system`, `delta_time`     |
//! | `error`     | `system`, `error`          |

use std::error::Error as StdError;
use std::fmt;

use crate::component::Component;
use crate::entity::Entity;
use crate::system::System;

// ---------------------------------------------------------------------------
// EventKind
// ---------------------------------------------------------------------------

/// Name of a world event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    Spawned,
    Destroyed,
    Added,
    Removed,
    Updated,
    Error,
}

impl EventKind {
    /// Every event kind, in table order.
    pub const ALL: [EventKind; 6] = [
        EventKind::Spawned,
        EventKind::Destroyed,
        EventKind::Added,
        EventKind::Removed,
        EventKind::Updated,
        EventKind::Error,
    ];

    /// The event name as used in logs.
    pub fn name(self) -> &'static str {
        match self {
            EventKind::Spawned => "spawned",
            EventKind::Destroyed => "destroyed",
            EventKind::Added => "added",
            EventKind::Removed => "removed",
            EventKind::Updated => "updated",
            EventKind::Error => "error",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

// ---------------------------------------------------------------------------
// WorldEvent
// ---------------------------------------------------------------------------

/// A dispatched event with its payload.
///
/// Payload references only live for the duration of the dispatch.
#[derive(Clone, Copy)]
pub enum WorldEvent<'a> {
    Spawned {
        entity: Entity,
    },
    Destroyed {
        entity: Entity,
    },
    Added {
        entity: Entity,
        component: &'a dyn Component,
    },
    Removed {
        entity: Entity,
        component: &'a dyn Component,
    },
    Updated {
        system: &'a dyn System,
        delta_time: f64,
    },
    Error {
        system: &'a dyn System,
        error: &'a (dyn StdError + Send + Sync),
    },
}

impl<'a> WorldEvent<'a> {
    pub fn kind(&self) -> EventKind {
        match self {
            WorldEvent::Spawned { .. } => EventKind::Spawned,
            WorldEvent::Destroyed { .. } => EventKind::Destroyed,
            WorldEvent::Added { .. } => EventKind::Added,
            WorldEvent::Removed { .. } => EventKind::Removed,
            WorldEvent::Updated { .. } => EventKind::Updated,
            WorldEvent::Error { .. } => EventKind::Error,
        }
    }

    /// The entity the event is about, for entity and component events.
    pub fn entity(&self) -> Option<Entity> {
        match *self {
            WorldEvent::Spawned { entity }
            | WorldEvent::Destroyed { entity }
            | WorldEvent::Added { entity, .. }
            | WorldEvent::Removed { entity, .. } => Some(entity),
            WorldEvent::Updated { .. } | WorldEvent::Error { .. } => None,
        }
    }

    /// The component carried by `added` / `removed`.
    pub fn component(&self) -> Option<&'a dyn Component> {
        match *self {
            WorldEvent::Added { component, .. } | WorldEvent::Removed { component, .. } => {
                Some(component)
            }
            _ => None,
        }
    }

    /// The component carried by `added` / `removed`, if it is a `C`.
    pub fn component_as<C: Component>(&self) -> Option<&'a C> {
        self.component()?.as_any().downcast_ref::<C>()
    }

    /// The system carried by `updated` / `error`.
    pub fn system(&self) -> Option<&'a dyn System> {
        match *self {
            WorldEvent::Updated { system, .. } | WorldEvent::Error { system, .. } => Some(system),
            _ => None,
        }
    }
}

impl fmt::Debug for WorldEvent<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            WorldEvent::Spawned { entity } | WorldEvent::Destroyed { entity } => f
                .debug_struct(self.kind().name())
                .field("entity", &entity)
                .finish(),
            WorldEvent::Added { entity, component } | WorldEvent::Removed { entity, component } => f
                .debug_struct(self.kind().name())
                .field("entity", &entity)
                .field("component", &component.type_name())
                .finish(),
            WorldEvent::Updated { system, delta_time } => f
                .debug_struct("updated")
                .field("system", &system.type_name())
                .field("delta_time", &delta_time)
                .finish(),
            WorldEvent::Error { system, error } => f
                .debug_struct("error")
                .field("system", &system.type_name())
                .field("error", &error.to_string())
                .finish(),
        }
    }
}

// ---------------------------------------------------------------------------
// EventEmitter
// ---------------------------------------------------------------------------

/// Handle returned by [`EventEmitter::on`], used to unsubscribe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

/// A subscribed callback.
pub type Listener = Box<dyn FnMut(&WorldEvent<'_>) + Send>;

struct Subscription {
    id: ListenerId,
    kind: EventKind,
    once: bool,
    listener: Listener,
}

/// Synchronous, single-threaded publish/subscribe keyed by [`EventKind`].
#[derive(Default)]
pub struct EventEmitter {
    subscriptions: Vec<Subscription>,
    next_id: u64,
}

impl EventEmitter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribe `listener` to every event of `kind`.
    pub fn on<F>(&mut self, kind: EventKind, listener: F) -> ListenerId
    where
        F: FnMut(&WorldEvent<'_>) + Send + 'static,
    {
        self.subscribe(kind, false, Box::new(listener))
    }

    /// Subscribe `listener` to the next event of `kind` only.
    pub fn once<F>(&mut self, kind: EventKind, listener: F) -> ListenerId
    where
        F: FnMut(&WorldEvent<'_>) + Send + 'static,
    {
        self.subscribe(kind, true, Box::new(listener))
    }

    fn subscribe(&mut self, kind: EventKind, once: bool, listener: Listener) -> ListenerId {
        let id = ListenerId(self.next_id);
        self.next_id += 1;
        self.subscriptions.push(Subscription {
            id,
            kind,
            once,
            listener,
        });
        id
    }

    /// Unsubscribe. Returns `false` if the listener was already gone.
    pub fn off(&mut self, id: ListenerId) -> bool {
        let before = self.subscriptions.len();
        self.subscriptions.retain(|s| s.id != id);
        self.subscriptions.len() != before
    }

    /// Drop every subscription.
    pub fn clear(&mut self) {
        self.subscriptions.clear();
    }

    /// Number of listeners subscribed to `kind`.
    pub fn listener_count(&self, kind: EventKind) -> usize {
        self.subscriptions.iter().filter(|s| s.kind == kind).count()
    }

    /// Invoke every listener subscribed to the event's kind.
    pub fn dispatch(&mut self, event: &WorldEvent<'_>) {
        let kind = event.kind();
        let mut fired_once = false;
        for subscription in self.subscriptions.iter_mut().filter(|s| s.kind == kind) {
            (subscription.listener)(event);
            fired_once |= subscription.once;
        }
        if fired_once {
            self.subscriptions.retain(|s| !(s.once && s.kind == kind));
        }
    }
}

impl fmt::Debug for EventEmitter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventEmitter")
            .field("listeners", &self.subscriptions.len())
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
