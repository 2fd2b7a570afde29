//! Frame loop driving [`World::update`] through an injected scheduler.
//!
//! A [`FrameLoop`] owns the world and a [`FrameScheduler`]. Starting the loop
//! requests one frame; each time the scheduler fires it, the loop:
//!
//! 1. computes `delta = time - last_time` (clamped by `max_delta_ms`),
//! 2. runs `World::update(delta)`,
//! 3. invokes the optional per-frame callback,
//! 4. requests the next frame.
//!
//! The scheduler decides *when* frames fire: a display-synced callback in an
//! interactive host, or [`HeadlessScheduler`] which advances a virtual clock
//! by a fixed step for tests and servers.
//!
//! # Example
//!
//! ```
//! use orrery_engine::frame::{FrameLoop, HeadlessScheduler};
//! use orrery_ecs::prelude::*;
//!
//! let mut frames = FrameLoop::new(World::new(), HeadlessScheduler::new(16.0));
//! frames.start(None).unwrap();
//! assert_eq!(frames.run_frames(10).unwrap(), 10);
//! assert_eq!(frames.frame_count(), 10);
//!
//! frames.stop();
//! assert_eq!(frames.run_frames(10).unwrap(), 0);
//! ```

use std::fmt;

use orrery_ecs::world::World;
use tracing::{debug, warn};

use crate::config::{EngineConfig, FrameConfig};
use crate::EngineError;

// ---------------------------------------------------------------------------
// FrameScheduler
// ---------------------------------------------------------------------------

/// Identifies one requested frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FrameHandle(u64);

impl FrameHandle {
    pub fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    pub fn to_raw(self) -> u64 {
        self.0
    }
}

/// Source of frame timing.
///
/// Implementations record requests and later report them back through
/// [`FrameLoop::on_frame_fired`] with the time the frame fired.
pub trait FrameScheduler {
    /// Current time in milliseconds.
    fn now(&self) -> f64;

    /// Ask for one frame callback.
    fn request_frame(&mut self) -> FrameHandle;

    /// Withdraw a pending request. Unknown handles are ignored.
    fn cancel_frame(&mut self, handle: FrameHandle);
}

// ---------------------------------------------------------------------------
// HeadlessScheduler
// ---------------------------------------------------------------------------

/// Fixed-step virtual clock with at most one pending frame.
#[derive(Debug, Clone)]
pub struct HeadlessScheduler {
    step_ms: f64,
    time_ms: f64,
    next_handle: u64,
    pending: Option<FrameHandle>,
}

impl HeadlessScheduler {
    /// A clock starting at zero that advances `step_ms` per fired frame.
    pub fn new(step_ms: f64) -> Self {
        Self {
            step_ms,
            time_ms: 0.0,
            next_handle: 1,
            pending: None,
        }
    }

    pub fn from_config(config: &FrameConfig) -> Self {
        Self::new(config.fixed_dt_ms)
    }

    pub fn step_ms(&self) -> f64 {
        self.step_ms
    }

    pub fn pending(&self) -> Option<FrameHandle> {
        self.pending
    }

    /// Advance the clock by `ms` without firing a frame.
    pub fn advance(&mut self, ms: f64) {
        self.time_ms += ms;
    }

    /// Fire the pending request, if any: advance by one step and return the
    /// handle with the new time.
    pub fn fire(&mut self) -> Option<(FrameHandle, f64)> {
        let handle = self.pending.take()?;
        self.time_ms += self.step_ms;
        Some((handle, self.time_ms))
    }
}

impl FrameScheduler for HeadlessScheduler {
    fn now(&self) -> f64 {
        self.time_ms
    }

    fn request_frame(&mut self) -> FrameHandle {
        let handle = FrameHandle(self.next_handle);
        self.next_handle += 1;
        self.pending = Some(handle);
        handle
    }

    fn cancel_frame(&mut self, handle: FrameHandle) {
        if self.pending == Some(handle) {
            self.pending = None;
        }
    }
}

// ---------------------------------------------------------------------------
// FrameLoop
// ---------------------------------------------------------------------------

/// Per-frame callback, invoked after `World::update` with the frame delta.
pub type FrameCallback = Box<dyn FnMut(&mut World, f64) + Send>;

struct Running {
    handle: FrameHandle,
    last_time: f64,
    on_frame: Option<FrameCallback>,
}

/// Drives a [`World`] once per scheduled frame.
pub struct FrameLoop<S> {
    world: World,
    scheduler: S,
    max_delta_ms: Option<f64>,
    running: Option<Running>,
    frame_count: u64,
}

impl<S: FrameScheduler> FrameLoop<S> {
    pub fn new(world: World, scheduler: S) -> Self {
        Self {
            world,
            scheduler,
            max_delta_ms: None,
            running: None,
            frame_count: 0,
        }
    }

    /// A loop over a fresh world configured from `config`.
    pub fn from_config(config: &EngineConfig, scheduler: S) -> Result<Self, EngineError> {
        config.validate()?;
        let world = World::with_config(config.world.clone());
        Ok(Self::new(world, scheduler).with_max_delta(config.frame.max_delta_ms))
    }

    /// Clamp every frame delta to at most `max_delta_ms`.
    pub fn with_max_delta(mut self, max_delta_ms: Option<f64>) -> Self {
        self.max_delta_ms = max_delta_ms;
        self
    }

    // -- control ------------------------------------------------------------

    /// Request the first frame.
    ///
    /// Fails with [`EngineError::AlreadyRunning`] if the loop is running.
    pub fn start(&mut self, on_frame: Option<FrameCallback>) -> Result<(), EngineError> {
        if self.running.is_some() {
            return Err(EngineError::AlreadyRunning);
        }
        let last_time = self.scheduler.now();
        let handle = self.scheduler.request_frame();
        self.running = Some(Running {
            handle,
            last_time,
            on_frame,
        });
        debug!(handle = handle.0, last_time, "frame loop started");
        Ok(())
    }

    /// Cancel the pending frame. Does nothing if the loop is not running.
    pub fn stop(&mut self) {
        if let Some(running) = self.running.take() {
            self.scheduler.cancel_frame(running.handle);
            debug!(frames = self.frame_count, "frame loop stopped");
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.is_some()
    }

    /// Stop the loop, then dispose the world.
    pub fn dispose(&mut self) -> Result<(), EngineError> {
        self.stop();
        self.world.dispose()?;
        Ok(())
    }

    /// Run the frame for `handle`, fired at `time` milliseconds.
    ///
    /// Returns `Ok(false)` if `handle` is not the pending request (stale or
    /// cancelled). If `World::update` fails the loop stops and the error is
    /// returned; no further frame is requested.
    pub fn on_frame_fired(&mut self, handle: FrameHandle, time: f64) -> Result<bool, EngineError> {
        let Some(running) = self.running.as_mut() else {
            return Ok(false);
        };
        if running.handle != handle {
            debug!(
                handle = handle.0,
                pending = running.handle.0,
                "ignoring stale frame"
            );
            return Ok(false);
        }

        let mut delta = time - running.last_time;
        if let Some(max) = self.max_delta_ms {
            delta = delta.min(max);
        }
        running.last_time = time;

        if let Err(err) = self.world.update(delta) {
            warn!(error = %err, "frame update failed, stopping loop");
            self.running = None;
            return Err(err.into());
        }
        self.frame_count += 1;

        if let Some(running) = self.running.as_mut() {
            if let Some(on_frame) = running.on_frame.as_mut() {
                on_frame(&mut self.world, delta);
            }
            running.handle = self.scheduler.request_frame();
        }
        Ok(true)
    }

    // -- accessors ----------------------------------------------------------

    /// Frames run since the loop was created.
    pub fn frame_count(&self) -> u64 {
        self.frame_count
    }

    pub fn world(&self) -> &World {
        &self.world
    }

    pub fn world_mut(&mut self) -> &mut World {
        &mut self.world
    }

    pub fn scheduler(&self) -> &S {
        &self.scheduler
    }

    pub fn scheduler_mut(&mut self) -> &mut S {
        &mut self.scheduler
    }

    /// Stop the loop and hand back the world.
    pub fn into_world(mut self) -> World {
        self.stop();
        self.world
    }
}

impl FrameLoop<HeadlessScheduler> {
    /// Fire up to `frames` pending frames, returning how many ran.
    ///
    /// Returns early when the loop is not running.
    pub fn run_frames(&mut self, frames: usize) -> Result<usize, EngineError> {
        let mut ran = 0;
        for _ in 0..frames {
            let Some((handle, time)) = self.scheduler.fire() else {
                break;
            };
            if self.on_frame_fired(handle, time)? {
                ran += 1;
            }
        }
        Ok(ran)
    }
}

impl<S: fmt::Debug> fmt::Debug for FrameLoop<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FrameLoop")
            .field("world", &self.world)
            .field("scheduler", &self.scheduler)
            .field("max_delta_ms", &self.max_delta_ms)
            .field("running", &self.running.as_ref().map(|r| r.handle))
            .field("frame_count", &self.frame_count)
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use orrery_ecs::prelude::*;
    use std::sync::{Arc, Mutex};

    #[derive(Debug, Default)]
    struct Deltas(Vec<f64>);
    impl Resource for Deltas {}

    struct RecordDelta;
    impl System for RecordDelta {
        fn on_update(&mut self, world: &mut World, delta_time: f64) -> HookResult {
            world.get_resource_mut::<Deltas>()?.0.push(delta_time);
            Ok(())
        }
    }

    fn recording_world() -> World {
        let mut world = World::new();
        world.add_resource(Deltas::default()).unwrap();
        world.add_system(RecordDelta).unwrap();
        world
    }

    fn deltas<S: FrameScheduler>(frames: &FrameLoop<S>) -> Vec<f64> {
        frames.world().get_resource::<Deltas>().unwrap().0.clone()
    }

    #[test]
    fn start_twice_fails() {
        let mut frames = FrameLoop::new(World::new(), HeadlessScheduler::new(16.0));
        frames.start(None).unwrap();
        assert!(matches!(
            frames.start(None),
            Err(EngineError::AlreadyRunning)
        ));
        assert!(frames.is_running());
    }

    #[test]
    fn stop_is_idempotent_and_cancels_pending() {
        let mut frames = FrameLoop::new(World::new(), HeadlessScheduler::new(16.0));
        frames.stop();
        frames.start(None).unwrap();
        assert!(frames.scheduler().pending().is_some());

        frames.stop();
        frames.stop();
        assert!(!frames.is_running());
        assert!(frames.scheduler().pending().is_none());

        // Restartable after stop.
        frames.start(None).unwrap();
        assert_eq!(frames.run_frames(2).unwrap(), 2);
    }

    #[test]
    fn delta_is_time_between_frames() {
        let mut frames = FrameLoop::new(recording_world(), HeadlessScheduler::new(16.0));
        frames.start(None).unwrap();
        frames.run_frames(3).unwrap();
        assert_eq!(deltas(&frames), vec![16.0, 16.0, 16.0]);

        // Time spent between frames counts towards the next delta.
        frames.scheduler_mut().advance(4.0);
        frames.run_frames(1).unwrap();
        assert_eq!(deltas(&frames)[3], 20.0);
    }

    #[test]
    fn max_delta_clamps_long_frames() {
        let mut frames = FrameLoop::new(recording_world(), HeadlessScheduler::new(16.0))
            .with_max_delta(Some(10.0));
        frames.start(None).unwrap();
        frames.scheduler_mut().advance(1000.0);
        frames.run_frames(2).unwrap();
        assert_eq!(deltas(&frames), vec![10.0, 10.0]);
    }

    #[test]
    fn stale_handles_are_ignored() {
        let mut frames = FrameLoop::new(recording_world(), HeadlessScheduler::new(16.0));
        frames.start(None).unwrap();
        let (first, time) = frames.scheduler_mut().fire().unwrap();
        assert!(frames.on_frame_fired(first, time).unwrap());

        // `first` has been consumed; firing it again does nothing.
        assert!(!frames.on_frame_fired(first, time + 16.0).unwrap());
        assert!(!frames.on_frame_fired(FrameHandle::from_raw(999), time).unwrap());
        assert_eq!(frames.frame_count(), 1);
        assert_eq!(deltas(&frames).len(), 1);
    }

    #[test]
    fn callback_runs_after_update() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let callback: FrameCallback = Box::new(move |world, delta| {
            let recorded = world.get_resource::<Deltas>().map(|d| d.0.len()).unwrap_or(0);
            sink.lock().unwrap().push((recorded, delta));
        });

        let mut frames = FrameLoop::new(recording_world(), HeadlessScheduler::new(8.0));
        frames.start(Some(callback)).unwrap();
        frames.run_frames(2).unwrap();
        assert_eq!(*seen.lock().unwrap(), vec![(1, 8.0), (2, 8.0)]);
    }

    #[test]
    fn update_failure_stops_the_loop() {
        struct A;
        impl System for A {
            fn ordering(order: &mut SystemOrdering) {
                order.after::<B>();
            }
        }
        struct B;
        impl System for B {
            fn ordering(order: &mut SystemOrdering) {
                order.after::<A>();
            }
        }

        let mut world = World::new();
        world.add_system(A).unwrap();
        world.add_system(B).unwrap();

        let mut frames = FrameLoop::new(world, HeadlessScheduler::new(16.0));
        frames.start(None).unwrap();
        let err = frames.run_frames(3).unwrap_err();
        assert!(matches!(err, EngineError::Ecs(ref e) if e.kind() == ErrorKind::Cycle));
        assert!(!frames.is_running());
        assert_eq!(frames.frame_count(), 0);
    }

    #[test]
    fn dispose_stops_and_clears_the_world() {
        let mut frames = FrameLoop::new(recording_world(), HeadlessScheduler::new(16.0));
        frames.start(None).unwrap();
        frames.world_mut().spawn_empty();

        frames.dispose().unwrap();
        assert!(!frames.is_running());
        assert_eq!(frames.world().entity_count(), 0);
        assert_eq!(frames.world().system_count(), 0);
        assert!(!frames.world().has_resource::<Deltas>());
    }
}
