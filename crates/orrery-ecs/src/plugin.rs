//! Plugins: bundles of systems and resources with declared dependencies.
//!
//! Adding a plugin first materializes every dependency that is not present
//! yet (depth first, constructing it with `Default`), then registers the
//! plugin and calls its [`build`](Plugin::build) hook. Each plugin type is
//! built at most once per world. Plugins are torn down in reverse
//! registration order when the world is disposed.

use std::fmt;

use crate::registry::{AsAny, PluginKey, TypeKey};
use crate::world::World;
use crate::{EcsError, HookResult};

// ---------------------------------------------------------------------------
// Plugin
// ---------------------------------------------------------------------------

/// A self-contained module that configures a [`World`].
///
/// ```
/// use orrery_ecs::prelude::*;
///
/// #[derive(Default)]
/// struct CorePlugin;
/// impl Plugin for CorePlugin {
///     fn build(&mut self, _world: &mut World) -> HookResult {
///         Ok(())
///     }
/// }
///
/// #[derive(Default)]
/// struct PhysicsPlugin;
/// impl Plugin for PhysicsPlugin {
///     fn dependencies(&self) -> Vec<PluginDependency> {
///         vec![PluginDependency::of::<CorePlugin>()]
///     }
///
///     fn build(&mut self, _world: &mut World) -> HookResult {
///         Ok(())
///     }
/// }
///
/// let mut world = World::new();
/// world.add_plugin(PhysicsPlugin).unwrap();
/// assert!(world.has_plugin::<CorePlugin>());
/// ```
pub trait Plugin: AsAny {
    /// Plugins that must be built before this one.
    fn dependencies(&self) -> Vec<PluginDependency> {
        Vec::new()
    }

    /// Add systems, resources and configuration to the world.
    fn build(&mut self, world: &mut World) -> HookResult;

    /// Undo what [`build`](Self::build) set up that the world would not
    /// clear by itself.
    fn cleanup(&mut self, _world: &mut World) -> HookResult {
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// PluginDependency
// ---------------------------------------------------------------------------

/// A dependency on another plugin type, constructible with `Default`.
#[derive(Clone, Copy)]
pub struct PluginDependency {
    key: PluginKey,
    install: fn(&mut World) -> Result<(), EcsError>,
}

impl PluginDependency {
    pub fn of<P: Plugin + Default>() -> Self {
        Self {
            key: TypeKey::of::<P>(),
            install: install_default::<P>,
        }
    }

    pub fn key(&self) -> PluginKey {
        self.key
    }

    /// Construct the plugin with `Default` and add it to `world`.
    pub(crate) fn install(&self, world: &mut World) -> Result<(), EcsError> {
        (self.install)(world)
    }
}

impl fmt::Debug for PluginDependency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("PluginDependency").field(&self.key).finish()
    }
}

fn install_default<P: Plugin + Default>(world: &mut World) -> Result<(), EcsError> {
    world.add_plugin(P::default()).map(|_| ())
}

// ---------------------------------------------------------------------------
// PluginRegistry
// ---------------------------------------------------------------------------

struct RegisteredPlugin {
    key: PluginKey,
    /// `None` while checked out for a hook.
    instance: Option<Box<dyn Plugin>>,
}

/// Plugins in registration order, plus the chain currently being resolved.
#[derive(Default)]
pub(crate) struct PluginRegistry {
    plugins: Vec<RegisteredPlugin>,
    resolving: Vec<PluginKey>,
}

impl PluginRegistry {
    fn position(&self, key: PluginKey) -> Option<usize> {
        self.plugins.iter().position(|p| p.key == key)
    }

    pub(crate) fn contains(&self, key: PluginKey) -> bool {
        self.position(key).is_some()
    }

    pub(crate) fn len(&self) -> usize {
        self.plugins.len()
    }

    /// Registered keys, in registration order.
    pub(crate) fn keys(&self) -> Vec<PluginKey> {
        self.plugins.iter().map(|p| p.key).collect()
    }

    /// Mark `key` as being resolved.
    ///
    /// Fails with `PluginCycle` if `key` is already on the resolution chain.
    pub(crate) fn begin_resolving(&mut self, key: PluginKey) -> Result<(), EcsError> {
        if let Some(start) = self.resolving.iter().position(|k| *k == key) {
            let mut plugins: Vec<&'static str> =
                self.resolving[start..].iter().map(|k| k.name()).collect();
            plugins.push(key.name());
            return Err(EcsError::PluginCycle { plugins });
        }
        self.resolving.push(key);
        Ok(())
    }

    pub(crate) fn finish_resolving(&mut self, key: PluginKey) {
        if let Some(index) = self.resolving.iter().rposition(|k| *k == key) {
            self.resolving.remove(index);
        }
    }

    /// Register an empty (checked out) slot for `key`.
    pub(crate) fn register(&mut self, key: PluginKey) {
        if !self.contains(key) {
            self.plugins.push(RegisteredPlugin {
                key,
                instance: None,
            });
        }
    }

    pub(crate) fn unregister(&mut self, key: PluginKey) -> bool {
        let Some(index) = self.position(key) else {
            return false;
        };
        self.plugins.remove(index);
        true
    }

    pub(crate) fn take(&mut self, key: PluginKey) -> Option<Box<dyn Plugin>> {
        let index = self.position(key)?;
        self.plugins[index].instance.take()
    }

    /// Return a checked-out plugin; fails if its slot is gone or refilled.
    pub(crate) fn restore(
        &mut self,
        key: PluginKey,
        plugin: Box<dyn Plugin>,
    ) -> Result<(), Box<dyn Plugin>> {
        match self.position(key) {
            Some(index) if self.plugins[index].instance.is_none() => {
                self.plugins[index].instance = Some(plugin);
                Ok(())
            }
            _ => Err(plugin),
        }
    }

    pub(crate) fn get(&self, key: PluginKey) -> Option<&dyn Plugin> {
        let index = self.position(key)?;
        self.plugins[index].instance.as_deref()
    }

    pub(crate) fn get_mut(&mut self, key: PluginKey) -> Option<&mut dyn Plugin> {
        let index = self.position(key)?;
        match &mut self.plugins[index].instance {
            Some(plugin) => Some(&mut **plugin),
            None => None,
        }
    }

    pub(crate) fn clear(&mut self) {
        self.plugins.clear();
        self.resolving.clear();
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
