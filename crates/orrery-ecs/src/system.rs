//! Systems and their execution order.
//!
//! A [`System`] is per-frame logic registered on the [`World`]. At most one
//! instance of each system type is registered. Ordering between system types
//! is declared through [`SystemOrdering`] and resolved with Kahn's algorithm
//! into a topological order that is cached until the set of registered
//! systems changes.
//!
//! While one of its hooks runs, a system is *checked out* of the schedule so
//! the hook can borrow the world mutably. The slot stays registered (it keeps
//! its place in the order) but [`World::get_system`] returns `None` for it.

use std::collections::VecDeque;
use std::sync::Arc;

use tracing::warn;

use crate::registry::{AsAny, SystemKey, TypeKey};
use crate::world::World;
use crate::{EcsError, HookResult};

// ---------------------------------------------------------------------------
// System
// ---------------------------------------------------------------------------

/// Per-frame logic attached to a [`World`].
///
/// Every hook is optional. Errors returned from [`on_create`](Self::on_create)
/// and [`on_destroy`](Self::on_destroy) reach the caller of the world method
/// that triggered them; errors from [`on_update`](Self::on_update) are caught
/// by [`World::update`] and published as `error` events.
///
/// A system that does not override [`on_update`](Self::on_update) only takes
/// part in the lifecycle: [`World::update`] skips it and publishes no
/// `updated` event for it.
///
/// ```
/// use orrery_ecs::prelude::*;
///
/// struct Input;
/// impl System for Input {}
///
/// struct Physics;
/// impl System for Physics {
///     fn ordering(order: &mut SystemOrdering) {
///         order.after::<Input>();
///     }
///
///     fn on_update(&mut self, _world: &mut World, _delta_time: f64) -> HookResult {
///         Ok(())
///     }
/// }
///
/// let mut world = World::new();
/// world.add_system(Physics).unwrap();
/// world.add_system(Input).unwrap();
/// assert_eq!(world.system_order().unwrap().len(), 2);
/// ```
pub trait System: AsAny {
    /// Declare ordering constraints relative to other system types.
    ///
    /// Called once each time an instance of the type is registered.
    fn ordering(_order: &mut SystemOrdering)
    where
        Self: Sized,
    {
    }

    /// Called right after the system is registered.
    fn on_create(&mut self, _world: &mut World) -> HookResult {
        Ok(())
    }

    /// Called before the system is removed, replaced, or the world disposed.
    fn on_destroy(&mut self, _world: &mut World) -> HookResult {
        Ok(())
    }

    /// Called once per [`World::update`], in dependency order.
    ///
    /// The default body marks the system as having no update hook.
    fn on_update(&mut self, _world: &mut World, _delta_time: f64) -> HookResult {
        Err(Box::new(NoUpdateHook))
    }
}

/// Returned by the default [`System::on_update`].
#[derive(Debug, thiserror::Error)]
#[error("system has no update hook")]
pub(crate) struct NoUpdateHook;

impl NoUpdateHook {
    pub(crate) fn matches(error: &crate::BoxError) -> bool {
        error.is::<NoUpdateHook>()
    }
}

// ---------------------------------------------------------------------------
// SystemOrdering
// ---------------------------------------------------------------------------

/// Ordering constraints of one system type.
///
/// Constraints that mention a type which is not registered are ignored.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SystemOrdering {
    run_after: Vec<SystemKey>,
    run_before: Vec<SystemKey>,
}

impl SystemOrdering {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run after `S`.
    pub fn after<S: System>(&mut self) -> &mut Self {
        self.after_key(TypeKey::of::<S>())
    }

    /// Run before `S`.
    pub fn before<S: System>(&mut self) -> &mut Self {
        self.before_key(TypeKey::of::<S>())
    }

    pub fn after_key(&mut self, key: SystemKey) -> &mut Self {
        if !self.run_after.contains(&key) {
            self.run_after.push(key);
        }
        self
    }

    pub fn before_key(&mut self, key: SystemKey) -> &mut Self {
        if !self.run_before.contains(&key) {
            self.run_before.push(key);
        }
        self
    }

    pub fn run_after(&self) -> &[SystemKey] {
        &self.run_after
    }

    pub fn run_before(&self) -> &[SystemKey] {
        &self.run_before
    }
}

// ---------------------------------------------------------------------------
// SystemSchedule
// ---------------------------------------------------------------------------

struct RegisteredSystem {
    key: SystemKey,
    ordering: SystemOrdering,
    /// Cleared once the instance turns out to have no update hook.
    updates: bool,
    /// `None` while checked out.
    instance: Option<Box<dyn System>>,
}

/// Registered systems in registration order, plus the cached execution order.
#[derive(Default)]
pub(crate) struct SystemSchedule {
    systems: Vec<RegisteredSystem>,
    order: Option<Arc<[SystemKey]>>,
}

impl SystemSchedule {
    fn position(&self, key: SystemKey) -> Option<usize> {
        self.systems.iter().position(|s| s.key == key)
    }

    /// Whether a system of this type is registered (checked out or not).
    pub(crate) fn contains(&self, key: SystemKey) -> bool {
        self.position(key).is_some()
    }

    pub(crate) fn len(&self) -> usize {
        self.systems.len()
    }

    /// Registered keys, in registration order.
    pub(crate) fn keys(&self) -> Vec<SystemKey> {
        self.systems.iter().map(|s| s.key).collect()
    }

    /// Register an empty (checked out) slot for `key`.
    ///
    /// An existing slot keeps its position and loses its instance, so the
    /// caller must have taken that instance first.
    pub(crate) fn install(&mut self, key: SystemKey, ordering: SystemOrdering) {
        match self.position(key) {
            Some(index) => {
                let slot = &mut self.systems[index];
                slot.ordering = ordering;
                slot.updates = true;
                slot.instance = None;
            }
            None => self.systems.push(RegisteredSystem {
                key,
                ordering,
                updates: true,
                instance: None,
            }),
        }
        self.order = None;
    }

    /// Remove the slot for `key`. Returns whether it existed.
    pub(crate) fn unregister(&mut self, key: SystemKey) -> bool {
        let Some(index) = self.position(key) else {
            return false;
        };
        self.systems.remove(index);
        self.order = None;
        true
    }

    /// Whether [`World::update`] still runs the system of this type.
    pub(crate) fn updates(&self, key: SystemKey) -> bool {
        self.position(key)
            .is_some_and(|index| self.systems[index].updates)
    }

    /// Stop running the update hook of `key`. Reset when the slot is
    /// reinstalled.
    pub(crate) fn skip_updates(&mut self, key: SystemKey) {
        if let Some(index) = self.position(key) {
            self.systems[index].updates = false;
        }
    }

    /// Check a system out of its slot.
    pub(crate) fn take(&mut self, key: SystemKey) -> Option<Box<dyn System>> {
        let index = self.position(key)?;
        self.systems[index].instance.take()
    }

    /// Return a checked-out system to its slot.
    ///
    /// Fails, handing the system back, when the slot was removed or refilled
    /// while the system was out.
    pub(crate) fn restore(
        &mut self,
        key: SystemKey,
        system: Box<dyn System>,
    ) -> Result<(), Box<dyn System>> {
        match self.position(key) {
            Some(index) if self.systems[index].instance.is_none() => {
                self.systems[index].instance = Some(system);
                Ok(())
            }
            _ => Err(system),
        }
    }

    pub(crate) fn get(&self, key: SystemKey) -> Option<&dyn System> {
        let index = self.position(key)?;
        self.systems[index].instance.as_deref()
    }

    pub(crate) fn get_mut(&mut self, key: SystemKey) -> Option<&mut dyn System> {
        let index = self.position(key)?;
        match &mut self.systems[index].instance {
            Some(system) => Some(&mut **system),
            None => None,
        }
    }

    pub(crate) fn ordering_mut(&mut self, key: SystemKey) -> Option<&mut SystemOrdering> {
        let index = self.position(key)?;
        self.order = None;
        Some(&mut self.systems[index].ordering)
    }

    pub(crate) fn clear(&mut self) {
        self.systems.clear();
        self.order = None;
    }

    /// The execution order, computing and caching it if needed.
    pub(crate) fn sorted(&mut self) -> Result<Arc<[SystemKey]>, EcsError> {
        if let Some(order) = &self.order {
            return Ok(Arc::clone(order));
        }
        let order: Arc<[SystemKey]> = self.topological_order()?.into();
        self.order = Some(Arc::clone(&order));
        Ok(order)
    }

    /// Kahn's algorithm over the registered types.
    ///
    /// An edge `a -> b` means `a` runs before `b`. Each distinct edge counts
    /// once towards the in-degree of `b`, however many declarations imply it.
    fn topological_order(&self) -> Result<Vec<SystemKey>, EcsError> {
        let count = self.systems.len();
        let mut successors: Vec<Vec<usize>> = vec![Vec::new(); count];
        let mut in_degree = vec![0usize; count];
        let mut add_edge = |from: usize, to: usize| {
            if !successors[from].contains(&to) {
                successors[from].push(to);
                in_degree[to] += 1;
            }
        };

        for (index, system) in self.systems.iter().enumerate() {
            for key in system.ordering.run_after() {
                if let Some(from) = self.position(*key) {
                    add_edge(from, index);
                }
            }
        }
        for (index, system) in self.systems.iter().enumerate() {
            for key in system.ordering.run_before() {
                if let Some(to) = self.position(*key) {
                    add_edge(index, to);
                }
            }
        }

        let mut queue: VecDeque<usize> = (0..count).filter(|&i| in_degree[i] == 0).collect();
        let mut sorted = Vec::with_capacity(count);
        while let Some(current) = queue.pop_front() {
            sorted.push(self.systems[current].key);
            for &next in &successors[current] {
                in_degree[next] -= 1;
                if in_degree[next] == 0 {
                    queue.push_back(next);
                }
            }
        }

        if sorted.len() != count {
            let systems: Vec<&'static str> = (0..count)
                .filter(|&i| in_degree[i] > 0)
                .map(|i| self.systems[i].key.name())
                .collect();
            warn!(systems = ?systems, "system ordering contains a cycle");
            return Err(EcsError::SystemCycle { systems });
        }
        Ok(sorted)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
