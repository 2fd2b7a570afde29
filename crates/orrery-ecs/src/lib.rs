//! Orrery ECS -- a small, data-oriented Entity Component System runtime.
//!
//! A [`World`](world::World) stores entities, typed components, singleton
//! resources, ordered systems and composable plugins, and offers a query
//! engine to iterate entities by component shape. Everything is
//! single-threaded and synchronous; lifecycle changes are published as
//! events.
//!
//! # Quick Start
//!
//! ```
//! use orrery_ecs::prelude::*;
//!
//! #[derive(Debug, PartialEq)]
//! struct Position { x: f32, y: f32 }
//! impl Component for Position {}
//!
//! #[derive(Debug, PartialEq)]
//! struct Velocity { dx: f32, dy: f32 }
//! impl Component for Velocity {}
//!
//! struct Movement;
//! impl System for Movement {
//!     fn on_update(&mut self, world: &mut World, delta_time: f64) -> HookResult {
//!         let dt = delta_time as f32;
//!         for (_, (pos, vel)) in world.query_all_mut::<(Position, Velocity)>() {
//!             pos.x += vel.dx * dt;
//!             pos.y += vel.dy * dt;
//!         }
//!         Ok(())
//!     }
//! }
//!
//! let mut world = World::new();
//! let entity = world
//!     .spawn((Position { x: 0.0, y: 0.0 }, Velocity { dx: 1.0, dy: 2.0 }))
//!     .unwrap();
//! world.add_system(Movement).unwrap();
//! world.update(1.0).unwrap();
//!
//! assert_eq!(world.get_component::<Position>(entity), Some(&Position { x: 1.0, y: 2.0 }));
//! ```

#![deny(unsafe_code)]

pub mod component;
pub mod entity;
pub mod event;
pub mod plugin;
pub mod query;
pub mod registry;
pub mod resource;
pub mod system;
pub mod world;

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

/// Error returned from system and plugin hooks.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Result of a system or plugin hook.
pub type HookResult = Result<(), BoxError>;

/// Broad category of an [`EcsError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// A looked-up entity, component, resource, system or plugin is absent.
    NotFound,
    /// A resource of the same type is already present.
    DuplicateResource,
    /// An unregistered component type was used in strict mode.
    Registration,
    /// Ordering or dependency declarations form a cycle.
    Cycle,
    /// A system or plugin hook returned an error.
    Lifecycle,
}

/// Errors produced by ECS operations.
#[derive(Debug, thiserror::Error)]
pub enum EcsError {
    #[error("entity {entity} does not exist")]
    EntityNotFound { entity: entity::Entity },

    #[error("entity {entity} does not have component of type {component}")]
    ComponentNotFound {
        entity: entity::Entity,
        component: &'static str,
    },

    #[error("resource of type {resource} not found")]
    ResourceNotFound { resource: &'static str },

    #[error(
        "could not find any entity with component of type {component}{}",
        query::filter_suffix(.filtered)
    )]
    NoQueryMatch {
        component: &'static str,
        filtered: bool,
    },

    #[error("system of type {system} is not registered")]
    SystemNotFound { system: &'static str },

    #[error("a resource of type {resource} already exists")]
    DuplicateResource { resource: &'static str },

    #[error(
        "component type {component} is not registered; register it with \
         World::register_component or disable strict mode"
    )]
    UnregisteredComponent { component: &'static str },

    #[error("circular dependency detected among systems: {}", .systems.join(", "))]
    SystemCycle { systems: Vec<&'static str> },

    #[error("circular dependency detected among plugins: {}", .plugins.join(" -> "))]
    PluginCycle { plugins: Vec<&'static str> },

    #[error("{hook} hook of system {system} failed")]
    SystemHook {
        system: &'static str,
        hook: &'static str,
        #[source]
        source: BoxError,
    },

    #[error("{hook} hook of plugin {plugin} failed")]
    PluginHook {
        plugin: &'static str,
        hook: &'static str,
        #[source]
        source: BoxError,
    },
}

impl EcsError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            EcsError::EntityNotFound { .. }
            | EcsError::ComponentNotFound { .. }
            | EcsError::ResourceNotFound { .. }
            | EcsError::NoQueryMatch { .. }
            | EcsError::SystemNotFound { .. } => ErrorKind::NotFound,
            EcsError::DuplicateResource { .. } => ErrorKind::DuplicateResource,
            EcsError::UnregisteredComponent { .. } => ErrorKind::Registration,
            EcsError::SystemCycle { .. } | EcsError::PluginCycle { .. } => ErrorKind::Cycle,
            EcsError::SystemHook { .. } | EcsError::PluginHook { .. } => ErrorKind::Lifecycle,
        }
    }
}

// ---------------------------------------------------------------------------
// Prelude
// ---------------------------------------------------------------------------

/// Convenience re-exports for common usage.
pub mod prelude {
    pub use crate::component::{Component, ErasedComponent};
    pub use crate::entity::Entity;
    pub use crate::event::{EventKind, ListenerId, WorldEvent};
    pub use crate::plugin::{Plugin, PluginDependency};
    pub use crate::query::{
        ComponentSet, Query, QueryAll, QueryAllItem, QueryAllMut, QueryAny, QueryAnyItem,
        QueryItem, QueryMut,
    };
    pub use crate::registry::{ComponentKey, PluginKey, ResourceKey, SystemKey, TypeKey};
    pub use crate::resource::Resource;
    pub use crate::system::{System, SystemOrdering};
    pub use crate::world::{
        ComponentBundle, PluginBundle, ResourceBundle, SystemBundle, World, WorldConfig,
    };
    pub use crate::{BoxError, EcsError, ErrorKind, HookResult};
}

// ---------------------------------------------------------------------------
// Integration Tests
// ---------------------------------------------------------------------------
