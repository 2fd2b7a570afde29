//! Orrery Engine -- frame loop, configuration and logging setup around
//! [`orrery_ecs`].
//!
//! The ECS runtime is driven by repeated `World::update(delta)` calls. This
//! crate provides the driver: a [`FrameLoop`](frame::FrameLoop) that requests
//! frames from an injected [`FrameScheduler`](frame::FrameScheduler), measures
//! the time between them and advances the world once per frame.
//!
//! # Quick Start
//!
//! ```
//! use orrery_engine::prelude::*;
//!
//! #[derive(Default)]
//! struct Elapsed(f64);
//! impl Resource for Elapsed {}
//!
//! struct Clock;
//! impl System for Clock {
//!     fn on_update(&mut self, world: &mut World, delta_time: f64) -> HookResult {
//!         world.get_resource_mut::<Elapsed>()?.0 += delta_time;
//!         Ok(())
//!     }
//! }
//!
//! let mut world = World::new();
//! world.add_resource(Elapsed::default()).unwrap();
//! world.add_system(Clock).unwrap();
//!
//! let mut frames = FrameLoop::new(world, HeadlessScheduler::new(10.0));
//! frames.start(None).unwrap();
//! frames.run_frames(6).unwrap();
//!
//! assert_eq!(frames.world().get_resource::<Elapsed>().unwrap().0, 60.0);
//! ```

#![deny(unsafe_code)]

pub mod config;
pub mod frame;
pub mod telemetry;

use orrery_ecs::EcsError;

/// Re-export the ECS crate for convenience.
pub use orrery_ecs;

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

/// Errors produced by the engine layer.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("frame loop is already running")]
    AlreadyRunning,

    #[error(transparent)]
    Ecs(#[from] EcsError),

    #[error("invalid engine configuration: {reason}")]
    InvalidConfig { reason: String },

    #[error("malformed engine configuration: {0}")]
    Json(#[from] serde_json::Error),

    #[error("failed to read engine configuration: {0}")]
    Io(#[from] std::io::Error),
}

// ---------------------------------------------------------------------------
// Prelude
// ---------------------------------------------------------------------------

/// Convenience re-exports for common engine usage.
pub mod prelude {
    pub use orrery_ecs::prelude::*;

    pub use crate::config::{EngineConfig, FrameConfig};
    pub use crate::frame::{FrameCallback, FrameHandle, FrameLoop, FrameScheduler, HeadlessScheduler};
    pub use crate::telemetry::init_tracing;
    pub use crate::EngineError;
}
