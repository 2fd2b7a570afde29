//! The [`World`] is the top-level container for the ECS. It owns the entity
//! allocator, the component, resource, system and plugin stores, and the event
//! emitter, and it is the only entry point application code talks to.

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::component::{downcast_mut, downcast_ref, Component, ComponentStore};
use crate::entity::{Entity, EntityAllocator};
use crate::event::{EventEmitter, EventKind, ListenerId, WorldEvent};
use crate::plugin::{Plugin, PluginRegistry};
use crate::query::ComponentSet;
use crate::registry::{ComponentKey, ComponentRegistry, PluginKey, SystemKey, TypeKey};
use crate::resource::{Resource, ResourceStore};
use crate::system::{NoUpdateHook, System, SystemOrdering, SystemSchedule};
use crate::EcsError;

// ---------------------------------------------------------------------------
// WorldConfig
// ---------------------------------------------------------------------------

/// Construction-time settings of a [`World`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct WorldConfig {
    /// Only allow component types registered with
    /// [`World::register_component`].
    pub strict_components: bool,
}

// ---------------------------------------------------------------------------
// ComponentBundle -- tuples of components passed to spawn
// ---------------------------------------------------------------------------

/// A tuple of components added together, `()` through eight elements.
pub trait ComponentBundle: Send + 'static {
    /// The type handles of the bundled components, in tuple order.
    fn component_keys() -> Vec<ComponentKey>;

    /// Add every component to `entity`, in tuple order.
    fn insert_into(self, world: &mut World, entity: Entity) -> Result<(), EcsError>;
}

impl ComponentBundle for () {
    fn component_keys() -> Vec<ComponentKey> {
        Vec::new()
    }

    fn insert_into(self, _world: &mut World, _entity: Entity) -> Result<(), EcsError> {
        Ok(())
    }
}

macro_rules! impl_component_bundle {
    ($($name:ident $index:tt),+) => {
        impl<$($name: Component),+> ComponentBundle for ($($name,)+) {
            fn component_keys() -> Vec<ComponentKey> {
                vec![$(TypeKey::of::<$name>()),+]
            }

            fn insert_into(self, world: &mut World, entity: Entity) -> Result<(), EcsError> {
                $(world.add_component(entity, self.$index)?;)+
                Ok(())
            }
        }
    };
}

impl_component_bundle!(A 0);
impl_component_bundle!(A 0, B 1);
impl_component_bundle!(A 0, B 1, C 2);
impl_component_bundle!(A 0, B 1, C 2, D 3);
impl_component_bundle!(A 0, B 1, C 2, D 3, E 4);
impl_component_bundle!(A 0, B 1, C 2, D 3, E 4, F 5);
impl_component_bundle!(A 0, B 1, C 2, D 3, E 4, F 5, G 6);
impl_component_bundle!(A 0, B 1, C 2, D 3, E 4, F 5, G 6, H 7);

// ---------------------------------------------------------------------------
// Batches -- tuples of systems, resources and plugins
// ---------------------------------------------------------------------------

/// A tuple of systems added or removed together.
pub trait SystemBundle: Send + 'static {
    /// Add every system, in tuple order.
    fn add_to(self, world: &mut World) -> Result<(), EcsError>;

    /// Remove every system type, in tuple order.
    fn remove_from(world: &mut World) -> Result<(), EcsError>;
}

/// A tuple of resources added or removed together.
pub trait ResourceBundle: Send + 'static {
    fn insert_into(self, world: &mut World) -> Result<(), EcsError>;

    fn remove_from(world: &mut World);
}

/// A tuple of plugins added together.
pub trait PluginBundle: Send + 'static {
    fn add_to(self, world: &mut World) -> Result<(), EcsError>;
}

impl SystemBundle for () {
    fn add_to(self, _world: &mut World) -> Result<(), EcsError> {
        Ok(())
    }

    fn remove_from(_world: &mut World) -> Result<(), EcsError> {
        Ok(())
    }
}

impl ResourceBundle for () {
    fn insert_into(self, _world: &mut World) -> Result<(), EcsError> {
        Ok(())
    }

    fn remove_from(_world: &mut World) {}
}

impl PluginBundle for () {
    fn add_to(self, _world: &mut World) -> Result<(), EcsError> {
        Ok(())
    }
}

macro_rules! impl_batches {
    ($($name:ident $index:tt),+) => {
        impl<$($name: System),+> SystemBundle for ($($name,)+) {
            fn add_to(self, world: &mut World) -> Result<(), EcsError> {
                $(world.add_system(self.$index)?;)+
                Ok(())
            }

            fn remove_from(world: &mut World) -> Result<(), EcsError> {
                $(world.remove_system::<$name>()?;)+
                Ok(())
            }
        }

        impl<$($name: Resource),+> ResourceBundle for ($($name,)+) {
            fn insert_into(self, world: &mut World) -> Result<(), EcsError> {
                $(world.add_resource(self.$index)?;)+
                Ok(())
            }

            fn remove_from(world: &mut World) {
                $(world.remove_resource::<$name>();)+
            }
        }

        impl<$($name: Plugin),+> PluginBundle for ($($name,)+) {
            fn add_to(self, world: &mut World) -> Result<(), EcsError> {
                $(world.add_plugin(self.$index)?;)+
                Ok(())
            }
        }
    };
}

impl_batches!(A 0);
impl_batches!(A 0, B 1);
impl_batches!(A 0, B 1, C 2);
impl_batches!(A 0, B 1, C 2, D 3);
impl_batches!(A 0, B 1, C 2, D 3, E 4);
impl_batches!(A 0, B 1, C 2, D 3, E 4, F 5);
impl_batches!(A 0, B 1, C 2, D 3, E 4, F 5, G 6);
impl_batches!(A 0, B 1, C 2, D 3, E 4, F 5, G 6, H 7);

// ---------------------------------------------------------------------------
// World
// ---------------------------------------------------------------------------

/// The ECS world.
///
/// Every store is scoped to the instance; there is no global world.
pub struct World {
    allocator: EntityAllocator,
    pub(crate) components: ComponentStore,
    registry: ComponentRegistry,
    strict_components: bool,
    resources: ResourceStore,
    systems: SystemSchedule,
    plugins: PluginRegistry,
    events: EventEmitter,
}

impl World {
    /// Create an empty world in non-strict mode.
    pub fn new() -> Self {
        Self::with_config(WorldConfig::default())
    }

    /// Create an empty world from `config`.
    pub fn with_config(config: WorldConfig) -> Self {
        Self {
            allocator: EntityAllocator::new(),
            components: ComponentStore::default(),
            registry: ComponentRegistry::new(),
            strict_components: config.strict_components,
            resources: ResourceStore::default(),
            systems: SystemSchedule::default(),
            plugins: PluginRegistry::default(),
            events: EventEmitter::new(),
        }
    }

    // -- component registration ---------------------------------------------

    /// Register a component type. Idempotent.
    ///
    /// Also creates the type's column, so queries over a registered but
    /// unused type are empty rather than absent.
    pub fn register_component<C: Component>(&mut self) -> &mut Self {
        self.register_key(TypeKey::of::<C>());
        self
    }

    /// Register every type of a component set, e.g. `(Position, Velocity)`.
    pub fn register_components<S: ComponentSet>(&mut self) -> &mut Self {
        for key in S::keys() {
            self.register_key(key);
        }
        self
    }

    fn register_key(&mut self, key: ComponentKey) {
        if self.registry.register(key) {
            debug!(component = key.name(), "registered component type");
        }
        self.components.ensure_column(key);
    }

    /// Whether `C` was registered with [`register_component`](Self::register_component).
    pub fn is_component_registered<C: Component>(&self) -> bool {
        self.registry.contains(TypeKey::of::<C>())
    }

    /// Registered component types, in registration order.
    pub fn registered_components(&self) -> Vec<ComponentKey> {
        self.registry.registered().to_vec()
    }

    /// Enable or disable strict mode.
    pub fn set_strict_components(&mut self, enabled: bool) -> &mut Self {
        self.strict_components = enabled;
        self
    }

    /// Whether strict mode is on.
    pub fn is_strict_components(&self) -> bool {
        self.strict_components
    }

    fn check_registered(&self, key: ComponentKey) -> Result<(), EcsError> {
        if self.strict_components && !self.registry.contains(key) {
            return Err(EcsError::UnregisteredComponent {
                component: key.name(),
            });
        }
        Ok(())
    }

    // -- entities -----------------------------------------------------------

    /// Spawn an entity with the components of `bundle`.
    ///
    /// In strict mode every bundled type is checked before the entity is
    /// created, so a rejected bundle spawns nothing.
    pub fn spawn<B: ComponentBundle>(&mut self, bundle: B) -> Result<Entity, EcsError> {
        for key in B::component_keys() {
            self.check_registered(key)?;
        }
        let entity = self.spawn_empty();
        bundle.insert_into(self, entity)?;
        Ok(entity)
    }

    /// Spawn an entity without components.
    pub fn spawn_empty(&mut self) -> Entity {
        let entity = self.allocator.allocate();
        self.components.insert_entity(entity);
        self.events.dispatch(&WorldEvent::Spawned { entity });
        entity
    }

    /// Destroy `entity` and every component it holds.
    ///
    /// Dispatches one `removed` event per component, then `destroyed`. The
    /// `destroyed` event is dispatched even if the entity does not exist.
    pub fn destroy(&mut self, entity: Entity) {
        if let Some(keys) = self.components.forget_entity(entity) {
            for key in keys {
                if let Some(component) = self.components.take(entity, key) {
                    self.events.dispatch(&WorldEvent::Removed {
                        entity,
                        component: &*component,
                    });
                }
            }
        }
        self.events.dispatch(&WorldEvent::Destroyed { entity });
    }

    /// Whether `entity` is alive.
    pub fn exists(&self, entity: Entity) -> bool {
        self.components.contains_entity(entity)
    }

    /// Number of live entities.
    pub fn entity_count(&self) -> usize {
        self.components.entity_count()
    }

    /// Live entities, in id order.
    pub fn entities(&self) -> impl Iterator<Item = Entity> + '_ {
        self.components.entity_index().keys().copied()
    }

    // -- components ---------------------------------------------------------

    /// Attach `component` to `entity`, replacing any component of the same
    /// type. Returns the stored component.
    pub fn add_component<C: Component>(
        &mut self,
        entity: Entity,
        component: C,
    ) -> Result<&mut C, EcsError> {
        let key = TypeKey::of::<C>();
        self.check_registered(key)?;
        if !self.components.contains_entity(entity) {
            return Err(EcsError::EntityNotFound { entity });
        }

        let stored = self.components.insert(entity, key, Box::new(component));
        self.events.dispatch(&WorldEvent::Added {
            entity,
            component: &**stored,
        });
        downcast_mut::<C>(&mut **stored).ok_or(EcsError::ComponentNotFound {
            entity,
            component: key.name(),
        })
    }

    /// Attach every component of `bundle` to `entity`.
    pub fn add_components<B: ComponentBundle>(
        &mut self,
        entity: Entity,
        bundle: B,
    ) -> Result<(), EcsError> {
        bundle.insert_into(self, entity)
    }

    /// The `C` component of `entity`, if any.
    pub fn get_component<C: Component>(&self, entity: Entity) -> Option<&C> {
        self.components
            .get(entity, TypeKey::of::<C>())
            .and_then(downcast_ref::<C>)
    }

    /// Mutable access to the `C` component of `entity`, if any.
    pub fn get_component_mut<C: Component>(&mut self, entity: Entity) -> Option<&mut C> {
        self.components
            .get_mut(entity, TypeKey::of::<C>())
            .and_then(downcast_mut::<C>)
    }

    /// Like [`get_component`](Self::get_component), failing with
    /// `ComponentNotFound` when absent.
    pub fn get_component_or_fail<C: Component>(&self, entity: Entity) -> Result<&C, EcsError> {
        self.get_component::<C>(entity)
            .ok_or(EcsError::ComponentNotFound {
                entity,
                component: std::any::type_name::<C>(),
            })
    }

    /// Mutable counterpart of [`get_component_or_fail`](Self::get_component_or_fail).
    pub fn get_component_or_fail_mut<C: Component>(
        &mut self,
        entity: Entity,
    ) -> Result<&mut C, EcsError> {
        self.get_component_mut::<C>(entity)
            .ok_or(EcsError::ComponentNotFound {
                entity,
                component: std::any::type_name::<C>(),
            })
    }

    /// Whether `entity` holds a `C` component.
    pub fn has_component<C: Component>(&self, entity: Entity) -> bool {
        self.components.contains(entity, TypeKey::of::<C>())
    }

    /// Detach and return the component. No-op if absent.
    pub fn remove_component<C: Component>(&mut self, entity: Entity) -> Option<C> {
        let removed = self.components.remove(entity, TypeKey::of::<C>())?;
        self.events.dispatch(&WorldEvent::Removed {
            entity,
            component: &*removed,
        });
        removed.into_any().downcast::<C>().ok().map(|component| *component)
    }

    // -- systems ------------------------------------------------------------

    /// Register `system`, calling its `on_create` hook, and return the stored
    /// instance.
    ///
    /// A system of the same type that is already registered is destroyed
    /// first; the new instance takes over its place in registration order.
    /// Returns `Ok(None)` when the system removed itself during `on_create`;
    /// it has then already been destroyed.
    pub fn add_system<S: System>(&mut self, system: S) -> Result<Option<&mut S>, EcsError> {
        let key = TypeKey::of::<S>();
        if let Some(mut previous) = self.systems.take(key) {
            debug!(system = key.name(), "replacing system");
            if let Err(source) = previous.on_destroy(self) {
                let _ = self.systems.restore(key, previous);
                return Err(system_hook(key, "on_destroy", source));
            }
        }

        let mut ordering = SystemOrdering::new();
        S::ordering(&mut ordering);
        self.systems.install(key, ordering);
        debug!(system = key.name(), "added system");

        let mut system: Box<dyn System> = Box::new(system);
        let created = system.on_create(self);
        self.check_in_system(key, system)?;
        created.map_err(|source| system_hook(key, "on_create", source))?;
        Ok(self.get_system_mut::<S>())
    }

    /// Add every system of `systems`, in tuple order. Stops at the first
    /// failure; the systems added before it stay registered.
    pub fn add_systems<B: SystemBundle>(&mut self, systems: B) -> Result<(), EcsError> {
        systems.add_to(self)
    }

    /// Unregister the system of type `S`, calling its `on_destroy` hook.
    /// No-op if absent.
    ///
    /// A system that removes itself from one of its own hooks is destroyed
    /// once that hook returns.
    pub fn remove_system<S: System>(&mut self) -> Result<(), EcsError> {
        let key = TypeKey::of::<S>();
        if !self.systems.contains(key) {
            return Ok(());
        }
        if let Some(mut system) = self.systems.take(key) {
            if let Err(source) = system.on_destroy(self) {
                let _ = self.systems.restore(key, system);
                return Err(system_hook(key, "on_destroy", source));
            }
        }
        self.systems.unregister(key);
        debug!(system = key.name(), "removed system");
        Ok(())
    }

    /// Remove every system type of the set, e.g. `remove_systems::<(Input, Physics)>()`.
    pub fn remove_systems<B: SystemBundle>(&mut self) -> Result<(), EcsError> {
        B::remove_from(self)
    }

    /// Whether a system of type `S` is registered, checked out or not.
    pub fn has_system<S: System>(&self) -> bool {
        self.systems.contains(TypeKey::of::<S>())
    }

    /// The registered system of type `S`. `None` while one of its own hooks
    /// is running.
    pub fn get_system<S: System>(&self) -> Option<&S> {
        self.systems
            .get(TypeKey::of::<S>())
            .and_then(|system| system.as_any().downcast_ref::<S>())
    }

    /// Mutable counterpart of [`get_system`](Self::get_system).
    pub fn get_system_mut<S: System>(&mut self) -> Option<&mut S> {
        self.systems
            .get_mut(TypeKey::of::<S>())
            .and_then(|system| system.as_any_mut().downcast_mut::<S>())
    }

    /// Number of registered systems.
    pub fn system_count(&self) -> usize {
        self.systems.len()
    }

    /// Add ordering constraints to the registered system `S` after the fact.
    ///
    /// Useful when the types involved are defined in different crates.
    pub fn configure_system_order<S: System>(
        &mut self,
        configure: impl FnOnce(&mut SystemOrdering),
    ) -> Result<(), EcsError> {
        let key = TypeKey::of::<S>();
        let ordering = self
            .systems
            .ordering_mut(key)
            .ok_or(EcsError::SystemNotFound { system: key.name() })?;
        configure(ordering);
        Ok(())
    }

    /// Names of the registered systems in execution order.
    pub fn system_order(&mut self) -> Result<Vec<&'static str>, EcsError> {
        Ok(self.systems.sorted()?.iter().map(|key| key.name()).collect())
    }

    /// Run every system's `on_update` hook once, in dependency order.
    ///
    /// Systems without an update hook are skipped and publish no `updated`
    /// event. A failing hook does not stop the frame: the error is published
    /// as an `error` event and the next system runs. Only an ordering cycle,
    /// or a failing `on_destroy` of a system removed during its own update,
    /// makes `update` itself fail.
    pub fn update(&mut self, delta_time: f64) -> Result<(), EcsError> {
        let order = self.systems.sorted()?;
        for &key in order.iter() {
            if !self.systems.updates(key) {
                continue;
            }
            let Some(mut system) = self.systems.take(key) else {
                continue;
            };
            match system.on_update(self, delta_time) {
                Ok(()) => self.events.dispatch(&WorldEvent::Updated {
                    system: &*system,
                    delta_time,
                }),
                Err(error) if NoUpdateHook::matches(&error) => {
                    debug!(system = key.name(), "system has no update hook");
                    self.systems.skip_updates(key);
                }
                Err(error) => {
                    warn!(system = key.name(), error = %error, "system update failed");
                    self.events.dispatch(&WorldEvent::Error {
                        system: &*system,
                        error: &*error,
                    });
                }
            }
            self.check_in_system(key, system)?;
        }
        Ok(())
    }

    /// Return a system to the schedule after one of its hooks ran. A system
    /// that was removed or replaced meanwhile is destroyed instead.
    fn check_in_system(&mut self, key: SystemKey, system: Box<dyn System>) -> Result<(), EcsError> {
        let Err(mut orphan) = self.systems.restore(key, system) else {
            return Ok(());
        };
        debug!(system = key.name(), "destroying system detached during its own hook");
        orphan
            .on_destroy(self)
            .map_err(|source| system_hook(key, "on_destroy", source))
    }

    // -- resources ----------------------------------------------------------

    /// Add a resource. Fails with `DuplicateResource` if one of the same type
    /// is present.
    pub fn add_resource<R: Resource>(&mut self, resource: R) -> Result<&mut R, EcsError> {
        debug!(resource = std::any::type_name::<R>(), "adding resource");
        self.resources.insert(resource)
    }

    /// Add every resource of `resources`, in tuple order. Stops at the first
    /// duplicate; the resources added before it stay.
    pub fn add_resources<B: ResourceBundle>(&mut self, resources: B) -> Result<(), EcsError> {
        resources.insert_into(self)
    }

    /// The resource of type `R`. Fails with `ResourceNotFound` if absent.
    pub fn get_resource<R: Resource>(&self) -> Result<&R, EcsError> {
        self.resources.get::<R>()
    }

    /// Mutable access to the resource of type `R`.
    pub fn get_resource_mut<R: Resource>(&mut self) -> Result<&mut R, EcsError> {
        self.resources.get_mut::<R>()
    }

    /// Whether a resource of type `R` is present.
    pub fn has_resource<R: Resource>(&self) -> bool {
        self.resources.contains(TypeKey::of::<R>())
    }

    /// Remove and return the resource. No-op if absent.
    pub fn remove_resource<R: Resource>(&mut self) -> Option<R> {
        self.resources.remove::<R>()
    }

    /// Remove every resource type of the set. Absent types are skipped.
    pub fn remove_resources<B: ResourceBundle>(&mut self) {
        B::remove_from(self);
    }

    /// Number of resources present.
    pub fn resource_count(&self) -> usize {
        self.resources.len()
    }

    // -- plugins ------------------------------------------------------------

    /// Add a plugin, resolving its dependencies first, then call `build`.
    ///
    /// If a plugin of the same type is already present, `plugin` is dropped
    /// unbuilt and the existing instance is returned. The result is
    /// `Ok(None)` when that instance is checked out, i.e. when a plugin adds
    /// itself again from its own `build`, or when the plugin removed itself
    /// during `build`.
    pub fn add_plugin<P: Plugin>(&mut self, plugin: P) -> Result<Option<&mut P>, EcsError> {
        let key = TypeKey::of::<P>();
        if self.plugins.contains(key) {
            debug!(plugin = key.name(), "plugin already present");
            return Ok(self.get_plugin_mut::<P>());
        }

        self.plugins.begin_resolving(key)?;
        let resolved = self.resolve_dependencies(&plugin);
        self.plugins.finish_resolving(key);
        resolved?;

        self.plugins.register(key);
        info!(plugin = key.name(), "building plugin");
        let mut plugin: Box<dyn Plugin> = Box::new(plugin);
        let built = plugin.build(self);
        self.check_in_plugin(key, plugin)?;
        built.map_err(|source| plugin_hook(key, "build", source))?;
        Ok(self.get_plugin_mut::<P>())
    }

    /// Add every plugin of `plugins`, in tuple order, as
    /// [`add_plugin`](Self::add_plugin) does.
    pub fn add_plugins<B: PluginBundle>(&mut self, plugins: B) -> Result<(), EcsError> {
        plugins.add_to(self)
    }

    fn resolve_dependencies(&mut self, plugin: &dyn Plugin) -> Result<(), EcsError> {
        for dependency in plugin.dependencies() {
            if self.plugins.contains(dependency.key()) {
                continue;
            }
            debug!(
                plugin = plugin.type_name(),
                dependency = dependency.key().name(),
                "resolving plugin dependency"
            );
            dependency.install(self)?;
        }
        Ok(())
    }

    /// Call `cleanup` on the plugin of type `P`, then remove it. No-op if
    /// absent.
    pub fn remove_plugin<P: Plugin>(&mut self) -> Result<(), EcsError> {
        let key = TypeKey::of::<P>();
        if !self.plugins.contains(key) {
            return Ok(());
        }
        if let Some(mut plugin) = self.plugins.take(key) {
            info!(plugin = key.name(), "cleaning up plugin");
            if let Err(source) = plugin.cleanup(self) {
                let _ = self.plugins.restore(key, plugin);
                return Err(plugin_hook(key, "cleanup", source));
            }
        }
        self.plugins.unregister(key);
        Ok(())
    }

    /// Whether a plugin of type `P` is registered, checked out or not.
    pub fn has_plugin<P: Plugin>(&self) -> bool {
        self.plugins.contains(TypeKey::of::<P>())
    }

    /// The plugin of type `P`. `None` while its own `build` or `cleanup` runs.
    pub fn get_plugin<P: Plugin>(&self) -> Option<&P> {
        self.plugins
            .get(TypeKey::of::<P>())
            .and_then(|plugin| plugin.as_any().downcast_ref::<P>())
    }

    /// Mutable counterpart of [`get_plugin`](Self::get_plugin).
    pub fn get_plugin_mut<P: Plugin>(&mut self) -> Option<&mut P> {
        self.plugins
            .get_mut(TypeKey::of::<P>())
            .and_then(|plugin| plugin.as_any_mut().downcast_mut::<P>())
    }

    /// Number of registered plugins.
    pub fn plugin_count(&self) -> usize {
        self.plugins.len()
    }

    fn check_in_plugin(&mut self, key: PluginKey, plugin: Box<dyn Plugin>) -> Result<(), EcsError> {
        let Err(mut orphan) = self.plugins.restore(key, plugin) else {
            return Ok(());
        };
        orphan
            .cleanup(self)
            .map_err(|source| plugin_hook(key, "cleanup", source))
    }

    // -- events -------------------------------------------------------------

    /// Subscribe to every event of `kind`.
    pub fn on<F>(&mut self, kind: EventKind, listener: F) -> ListenerId
    where
        F: FnMut(&WorldEvent<'_>) + Send + 'static,
    {
        self.events.on(kind, listener)
    }

    /// Subscribe to the next event of `kind` only.
    pub fn once<F>(&mut self, kind: EventKind, listener: F) -> ListenerId
    where
        F: FnMut(&WorldEvent<'_>) + Send + 'static,
    {
        self.events.once(kind, listener)
    }

    /// Unsubscribe a listener. Returns whether it was subscribed.
    pub fn off(&mut self, listener: ListenerId) -> bool {
        self.events.off(listener)
    }

    /// Drop every listener of every kind.
    pub fn clear_listeners(&mut self) {
        self.events.clear();
    }

    /// Number of listeners subscribed to `kind`.
    pub fn listener_count(&self, kind: EventKind) -> usize {
        self.events.listener_count(kind)
    }

    // -- teardown -----------------------------------------------------------

    /// Tear the world down.
    ///
    /// Calls `on_destroy` on every system (registration order), then
    /// `cleanup` on every plugin (reverse registration order), then clears
    /// every store, rewinds entity ids and resets strict mode. Event
    /// listeners are kept. A failing hook aborts the teardown and leaves the
    /// stores untouched.
    pub fn dispose(&mut self) -> Result<(), EcsError> {
        info!(
            entities = self.entity_count(),
            systems = self.system_count(),
            plugins = self.plugin_count(),
            "disposing world"
        );

        for key in self.systems.keys() {
            let Some(mut system) = self.systems.take(key) else {
                continue;
            };
            let destroyed = system.on_destroy(self);
            let _ = self.systems.restore(key, system);
            destroyed.map_err(|source| system_hook(key, "on_destroy", source))?;
        }

        for key in self.plugins.keys().into_iter().rev() {
            let Some(mut plugin) = self.plugins.take(key) else {
                continue;
            };
            let cleaned = plugin.cleanup(self);
            let _ = self.plugins.restore(key, plugin);
            cleaned.map_err(|source| plugin_hook(key, "cleanup", source))?;
        }

        self.allocator.reset();
        self.components.clear();
        self.registry.clear();
        self.resources.clear();
        self.systems.clear();
        self.plugins.clear();
        self.strict_components = false;
        Ok(())
    }
}

impl Default for World {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for World {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("World")
            .field("entities", &self.entity_count())
            .field("registered_components", &self.registry.len())
            .field("strict_components", &self.strict_components)
            .field("resources", &self.resources.len())
            .field("systems", &self.systems.len())
            .field("plugins", &self.plugins.len())
            .field("events", &self.events)
            .finish()
    }
}

fn system_hook(key: SystemKey, hook: &'static str, source: crate::BoxError) -> EcsError {
    EcsError::SystemHook {
        system: key.name(),
        hook,
        source,
    }
}

fn plugin_hook(key: PluginKey, hook: &'static str, source: crate::BoxError) -> EcsError {
    EcsError::PluginHook {
        plugin: key.name(),
        hook,
        source,
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{ErrorKind, HookResult};
    use std::sync::{Arc, Mutex};

    #[derive(Debug, Clone, PartialEq)]
    struct Position {
        x: f32,
        y: f32,
    }
    impl Component for Position {}

    #[derive(Debug, Clone, PartialEq)]
    struct Velocity {
        dx: f32,
        dy: f32,
    }
    impl Component for Velocity {}

    type Log = Arc<Mutex<Vec<String>>>;

    fn record_events(world: &mut World) -> Log {
        let log: Log = Arc::default();
        for kind in EventKind::ALL {
            let log = Arc::clone(&log);
            world.on(kind, move |event| {
                let subject = match *event {
                    WorldEvent::Added { component, .. } | WorldEvent::Removed { component, .. } => {
                        short(component.type_name())
                    }
                    WorldEvent::Updated { system, .. } | WorldEvent::Error { system, .. } => {
                        short(system.type_name())
                    }
                    _ => String::new(),
                };
                log.lock().unwrap().push(format!("{} {}", event.kind(), subject).trim().to_string());
            });
        }
        log
    }

    fn short(name: &str) -> String {
        name.rsplit("::").next().unwrap_or(name).to_string()
    }

    // -- entities and components ----------------------------------------------

    #[test]
    fn spawn_assigns_increasing_ids() {
        let mut world = World::new();
        let a = world.spawn_empty();
        let b = world.spawn(()).unwrap();
        assert!(b > a);
        assert_eq!(world.entity_count(), 2);
        assert_eq!(world.entities().collect::<Vec<_>>(), vec![a, b]);
    }

    #[test]
    fn destroyed_ids_are_not_reused() {
        let mut world = World::new();
        let a = world.spawn_empty();
        world.destroy(a);
        let b = world.spawn_empty();
        assert_ne!(a, b);
        assert!(!world.exists(a));
        assert!(world.exists(b));
    }

    #[test]
    fn add_component_replaces_same_type() {
        let mut world = World::new();
        let e = world.spawn((Position { x: 1.0, y: 1.0 },)).unwrap();
        world.add_component(e, Position { x: 5.0, y: 6.0 }).unwrap();
        assert_eq!(
            world.get_component::<Position>(e),
            Some(&Position { x: 5.0, y: 6.0 })
        );
        assert_eq!(world.query::<Position>().count(), 1);
    }

    #[test]
    fn add_component_returns_stored_instance() {
        let mut world = World::new();
        let e = world.spawn_empty();
        let stored = world.add_component(e, Velocity { dx: 1.0, dy: 0.0 }).unwrap();
        stored.dx = 3.0;
        assert_eq!(world.get_component::<Velocity>(e).map(|v| v.dx), Some(3.0));
    }

    #[test]
    fn add_component_to_missing_entity_fails() {
        let mut world = World::new();
        let err = world
            .add_component(Entity::from_raw(99), Position { x: 0.0, y: 0.0 })
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
        assert_eq!(world.query::<Position>().count(), 0);
    }

    #[test]
    fn get_component_or_fail_names_entity_and_type() {
        let mut world = World::new();
        let e = world.spawn_empty();
        let err = world.get_component_or_fail::<Position>(e).unwrap_err();
        let message = err.to_string();
        assert!(message.contains(&e.to_string()));
        assert!(message.contains("Position"));
    }

    #[test]
    fn remove_component_hands_back_value() {
        let mut world = World::new();
        let e = world.spawn((Position { x: 1.0, y: 2.0 }, Velocity { dx: 0.0, dy: 0.0 })).unwrap();
        assert_eq!(
            world.remove_component::<Position>(e),
            Some(Position { x: 1.0, y: 2.0 })
        );
        assert!(!world.has_component::<Position>(e));
        assert!(world.has_component::<Velocity>(e));
        assert_eq!(world.remove_component::<Position>(e), None);
    }

    #[test]
    fn component_events_are_dispatched_in_order() {
        let mut world = World::new();
        let log = record_events(&mut world);

        let e = world.spawn((Position { x: 0.0, y: 0.0 }, Velocity { dx: 0.0, dy: 0.0 })).unwrap();
        world.remove_component::<Velocity>(e);
        world.destroy(e);

        assert_eq!(
            *log.lock().unwrap(),
            vec![
                "spawned",
                "added Position",
                "added Velocity",
                "removed Velocity",
                "removed Position",
                "destroyed",
            ]
        );
    }

    #[test]
    fn destroy_missing_entity_still_dispatches_destroyed() {
        let mut world = World::new();
        let log = record_events(&mut world);
        world.destroy(Entity::from_raw(7));
        assert_eq!(*log.lock().unwrap(), vec!["destroyed"]);
    }

    #[test]
    fn added_event_carries_component() {
        let mut world = World::new();
        let seen = Arc::new(Mutex::new(None));
        let sink = Arc::clone(&seen);
        world.on(EventKind::Added, move |event| {
            *sink.lock().unwrap() = event.component_as::<Position>().cloned();
        });
        let e = world.spawn_empty();
        world.add_component(e, Position { x: 4.0, y: 2.0 }).unwrap();
        assert_eq!(*seen.lock().unwrap(), Some(Position { x: 4.0, y: 2.0 }));
    }

    // -- strict mode ----------------------------------------------------------

    #[test]
    fn strict_mode_rejects_unregistered_types() {
        let mut world = World::with_config(WorldConfig {
            strict_components: true,
        });
        world.register_component::<Position>();
        let e = world.spawn_empty();

        let err = world.add_component(e, Velocity { dx: 1.0, dy: 1.0 }).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Registration);
        assert!(world.add_component(e, Position { x: 0.0, y: 0.0 }).is_ok());
    }

    #[test]
    fn world_config_deserializes_with_defaults() {
        let config: WorldConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(config, WorldConfig::default());

        let config: WorldConfig = serde_json::from_str(r#"{"strict_components":true}"#).unwrap();
        assert!(World::with_config(config).is_strict_components());

        assert!(serde_json::from_str::<WorldConfig>(r#"{"strict":true}"#).is_err());
    }

    #[test]
    fn strict_spawn_is_validated_up_front() {
        let mut world = World::new();
        world.register_component::<Position>().set_strict_components(true);
        let before = world.entity_count();
        let result = world.spawn((Position { x: 0.0, y: 0.0 }, Velocity { dx: 0.0, dy: 0.0 }));
        assert!(result.is_err());
        assert_eq!(world.entity_count(), before);
    }

    #[test]
    fn registration_is_idempotent() {
        let mut world = World::new();
        world.register_component::<Position>();
        world.register_components::<(Position, Velocity)>();
        assert_eq!(
            world.registered_components(),
            vec![TypeKey::of::<Position>(), TypeKey::of::<Velocity>()]
        );
        assert!(world.is_component_registered::<Velocity>());
    }

    // -- resources ------------------------------------------------------------

    #[derive(Debug, PartialEq)]
    struct Score(u32);
    impl Resource for Score {}

    #[test]
    fn resources_are_singletons() {
        let mut world = World::new();
        world.add_resource(Score(1)).unwrap();
        assert_eq!(
            world.add_resource(Score(2)).unwrap_err().kind(),
            ErrorKind::DuplicateResource
        );
        world.get_resource_mut::<Score>().unwrap().0 += 1;
        assert_eq!(world.get_resource::<Score>().unwrap(), &Score(2));
        assert_eq!(world.remove_resource::<Score>(), Some(Score(2)));
        assert!(!world.has_resource::<Score>());
        assert_eq!(world.get_resource::<Score>().unwrap_err().kind(), ErrorKind::NotFound);
    }

    // -- systems --------------------------------------------------------------

    struct Lifecycle {
        tag: &'static str,
        log: Log,
    }

    impl System for Lifecycle {
        fn on_create(&mut self, _world: &mut World) -> HookResult {
            self.log.lock().unwrap().push(format!("create {}", self.tag));
            Ok(())
        }

        fn on_destroy(&mut self, _world: &mut World) -> HookResult {
            self.log.lock().unwrap().push(format!("destroy {}", self.tag));
            Ok(())
        }
    }

    #[test]
    fn re_adding_a_system_destroys_the_previous_instance() {
        let mut world = World::new();
        let log: Log = Arc::default();
        world
            .add_system(Lifecycle { tag: "a", log: Arc::clone(&log) })
            .unwrap();
        world
            .add_system(Lifecycle { tag: "b", log: Arc::clone(&log) })
            .unwrap();

        assert_eq!(world.system_count(), 1);
        assert_eq!(world.get_system::<Lifecycle>().map(|s| s.tag), Some("b"));
        assert_eq!(*log.lock().unwrap(), vec!["create a", "destroy a", "create b"]);

        world.remove_system::<Lifecycle>().unwrap();
        world.remove_system::<Lifecycle>().unwrap();
        assert!(!world.has_system::<Lifecycle>());
        assert_eq!(log.lock().unwrap().last().map(String::as_str), Some("destroy b"));
    }

    struct Counter(u32);
    impl System for Counter {
        fn on_update(&mut self, world: &mut World, _delta_time: f64) -> HookResult {
            self.0 += 1;
            world.get_resource_mut::<Score>()?.0 += 1;
            Ok(())
        }
    }

    #[test]
    fn update_hands_the_world_to_systems() {
        let mut world = World::new();
        world.add_resource(Score(0)).unwrap();
        world.add_system(Counter(0)).unwrap();
        world.update(16.0).unwrap();
        world.update(16.0).unwrap();
        assert_eq!(world.get_resource::<Score>().unwrap(), &Score(2));
        assert_eq!(world.get_system::<Counter>().map(|c| c.0), Some(2));
    }

    #[test]
    fn failing_update_becomes_error_event() {
        let mut world = World::new();
        // No Score resource: Counter fails every frame.
        world.add_system(Counter(0)).unwrap();
        let log = record_events(&mut world);

        world.update(1.0).unwrap();
        assert_eq!(*log.lock().unwrap(), vec!["error Counter"]);
    }

    struct SelfRemoving {
        log: Log,
    }

    impl System for SelfRemoving {
        fn on_update(&mut self, world: &mut World, _delta_time: f64) -> HookResult {
            world.remove_system::<SelfRemoving>()?;
            Ok(())
        }

        fn on_destroy(&mut self, _world: &mut World) -> HookResult {
            self.log.lock().unwrap().push("destroyed".into());
            Ok(())
        }
    }

    #[test]
    fn system_removing_itself_is_destroyed_after_its_hook() {
        let mut world = World::new();
        let log: Log = Arc::default();
        world.add_system(SelfRemoving { log: Arc::clone(&log) }).unwrap();

        world.update(1.0).unwrap();
        assert!(!world.has_system::<SelfRemoving>());
        assert_eq!(*log.lock().unwrap(), vec!["destroyed"]);

        world.update(1.0).unwrap();
        assert_eq!(log.lock().unwrap().len(), 1);
    }

    struct Transient {
        log: Log,
    }

    impl System for Transient {
        fn on_create(&mut self, world: &mut World) -> HookResult {
            world.remove_system::<Transient>()?;
            Ok(())
        }

        fn on_destroy(&mut self, _world: &mut World) -> HookResult {
            self.log.lock().unwrap().push("destroyed".into());
            Ok(())
        }
    }

    #[test]
    fn system_removing_itself_on_create_is_added_and_gone() {
        let mut world = World::new();
        let log: Log = Arc::default();
        let added = world.add_system(Transient { log: Arc::clone(&log) }).unwrap();
        assert!(added.is_none());
        assert!(!world.has_system::<Transient>());
        assert_eq!(*log.lock().unwrap(), vec!["destroyed"]);
    }

    struct Idle;
    impl System for Idle {}

    #[test]
    fn system_without_update_hook_publishes_nothing() {
        let mut world = World::new();
        world.add_resource(Score(0)).unwrap();
        world.add_system(Idle).unwrap();
        world.add_system(Counter(0)).unwrap();
        let log = record_events(&mut world);

        world.update(1.0).unwrap();
        world.update(1.0).unwrap();
        assert_eq!(*log.lock().unwrap(), vec!["updated Counter", "updated Counter"]);
        assert!(world.get_system::<Idle>().is_some());
        assert_eq!(world.system_order().unwrap().len(), 2);
    }

    #[test]
    fn configure_system_order_requires_registration() {
        let mut world = World::new();
        let err = world
            .configure_system_order::<Counter>(|order| {
                order.after::<SelfRemoving>();
            })
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    // -- plugins --------------------------------------------------------------

    #[derive(Default)]
    struct ScorePlugin;
    impl Plugin for ScorePlugin {
        fn build(&mut self, world: &mut World) -> HookResult {
            world.add_resource(Score(0))?;
            Ok(())
        }

        fn cleanup(&mut self, world: &mut World) -> HookResult {
            world.remove_resource::<Score>();
            Ok(())
        }
    }

    #[test]
    fn plugin_is_built_once() {
        let mut world = World::new();
        world.add_plugin(ScorePlugin).unwrap();
        // A second build would fail with DuplicateResource.
        world.add_plugin(ScorePlugin).unwrap();
        assert_eq!(world.plugin_count(), 1);
        assert!(world.has_resource::<Score>());
    }

    #[test]
    fn remove_plugin_runs_cleanup() {
        let mut world = World::new();
        world.add_plugin(ScorePlugin).unwrap();
        world.remove_plugin::<ScorePlugin>().unwrap();
        assert!(!world.has_plugin::<ScorePlugin>());
        assert!(!world.has_resource::<Score>());
        world.remove_plugin::<ScorePlugin>().unwrap();
    }

    #[derive(Default, Debug)]
    struct Ping;
    impl Plugin for Ping {
        fn dependencies(&self) -> Vec<crate::plugin::PluginDependency> {
            vec![crate::plugin::PluginDependency::of::<Pong>()]
        }
        fn build(&mut self, _world: &mut World) -> HookResult {
            Ok(())
        }
    }

    #[derive(Default)]
    struct Pong;
    impl Plugin for Pong {
        fn dependencies(&self) -> Vec<crate::plugin::PluginDependency> {
            vec![crate::plugin::PluginDependency::of::<Ping>()]
        }
        fn build(&mut self, _world: &mut World) -> HookResult {
            Ok(())
        }
    }

    #[test]
    fn plugin_dependency_cycle_is_reported() {
        let mut world = World::new();
        let err = world.add_plugin(Ping).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Cycle);
        assert_eq!(world.plugin_count(), 0);
    }

    /// Adds itself again from its own build.
    struct Echo;
    impl Plugin for Echo {
        fn build(&mut self, world: &mut World) -> HookResult {
            world.add_plugin(Echo)?;
            world.get_resource_mut::<Score>()?.0 += 1;
            Ok(())
        }
    }

    #[test]
    fn plugin_adding_itself_during_build_is_a_no_op() {
        let mut world = World::new();
        world.add_resource(Score(0)).unwrap();
        assert!(world.add_plugin(Echo).unwrap().is_some());
        assert_eq!(world.plugin_count(), 1);
        assert_eq!(world.get_resource::<Score>().unwrap(), &Score(1));
    }

    struct Host;
    impl Plugin for Host {
        fn build(&mut self, world: &mut World) -> HookResult {
            world.add_plugin(Guest)?;
            world.get_resource_mut::<Score>()?.0 += 1;
            Ok(())
        }
    }

    struct Guest;
    impl Plugin for Guest {
        fn build(&mut self, world: &mut World) -> HookResult {
            // Host is registered but still building.
            let host = world.add_plugin(Host)?;
            if host.is_some() {
                return Err("host should be checked out".into());
            }
            world.get_resource_mut::<Score>()?.0 += 1;
            Ok(())
        }
    }

    #[test]
    fn plugins_adding_each_other_during_build_are_built_once() {
        let mut world = World::new();
        world.add_resource(Score(0)).unwrap();
        world.add_plugin(Host).unwrap();

        assert!(world.has_plugin::<Host>());
        assert!(world.has_plugin::<Guest>());
        assert_eq!(world.plugin_count(), 2);
        assert_eq!(world.get_resource::<Score>().unwrap(), &Score(2));
    }

    // -- batches --------------------------------------------------------------

    #[derive(Debug, PartialEq)]
    struct Level(u8);
    impl Resource for Level {}

    #[derive(Debug, PartialEq)]
    struct Bonus(u8);
    impl Resource for Bonus {}

    #[test]
    fn systems_are_added_and_removed_together() {
        let mut world = World::new();
        let log: Log = Arc::default();
        world.add_resource(Score(0)).unwrap();
        world
            .add_systems((Counter(0), Lifecycle { tag: "a", log: Arc::clone(&log) }))
            .unwrap();
        assert_eq!(world.system_count(), 2);

        world.update(1.0).unwrap();
        assert_eq!(world.get_resource::<Score>().unwrap(), &Score(1));

        world.remove_systems::<(Counter, Lifecycle)>().unwrap();
        assert_eq!(world.system_count(), 0);
        assert_eq!(*log.lock().unwrap(), vec!["create a", "destroy a"]);
        world.remove_systems::<(Counter,)>().unwrap();
    }

    #[test]
    fn resources_are_added_in_order_until_a_duplicate() {
        let mut world = World::new();
        world.add_resources((Score(0),)).unwrap();

        let err = world.add_resources((Level(1), Score(5), Bonus(2))).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::DuplicateResource);
        assert_eq!(world.get_resource::<Level>().unwrap(), &Level(1));
        assert_eq!(world.get_resource::<Score>().unwrap(), &Score(0));
        assert!(!world.has_resource::<Bonus>());

        world.remove_resources::<(Score, Level, Bonus)>();
        assert_eq!(world.resource_count(), 0);
    }

    #[derive(Default)]
    struct LevelPlugin;
    impl Plugin for LevelPlugin {
        fn build(&mut self, world: &mut World) -> HookResult {
            world.add_resource(Level(1))?;
            Ok(())
        }
    }

    #[test]
    fn plugins_are_added_together() {
        let mut world = World::new();
        world.add_plugins((ScorePlugin, LevelPlugin, ScorePlugin)).unwrap();
        assert_eq!(world.plugin_count(), 2);
        assert!(world.has_resource::<Score>());
        assert!(world.has_resource::<Level>());
    }

    // -- dispose --------------------------------------------------------------

    #[test]
    fn dispose_resets_everything_but_listeners() {
        let mut world = World::with_config(WorldConfig {
            strict_components: true,
        });
        world.register_component::<Position>();
        world.spawn((Position { x: 0.0, y: 0.0 },)).unwrap();
        world.add_plugin(ScorePlugin).unwrap();
        world.add_system(Counter(0)).unwrap();
        let log = record_events(&mut world);

        world.dispose().unwrap();

        assert_eq!(world.entity_count(), 0);
        assert_eq!(world.system_count(), 0);
        assert_eq!(world.plugin_count(), 0);
        assert_eq!(world.resource_count(), 0);
        assert!(world.registered_components().is_empty());
        assert!(!world.is_strict_components());
        assert_eq!(world.spawn_empty(), Entity::from_raw(0));
        assert_eq!(*log.lock().unwrap(), vec!["spawned"]);
    }
}
