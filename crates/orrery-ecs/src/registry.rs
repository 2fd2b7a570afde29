//! Type handles and component registration.
//!
//! Every component, resource, system and plugin is keyed by its concrete Rust
//! type. A [`TypeKey`] wraps the type's `TypeId` together with its name so it
//! can be used as a map key and still produce readable diagnostics.
//!
//! The [`ComponentRegistry`] records which component types were registered
//! ahead of time. It backs strict mode, where only registered component types
//! may be attached to entities.

use std::any::{Any, TypeId};
use std::cmp::Ordering;
use std::collections::HashMap;
use std::fmt;
use std::hash::{Hash, Hasher};

// ---------------------------------------------------------------------------
// TypeKey
// ---------------------------------------------------------------------------

/// Unique handle for a concrete Rust type.
///
/// Equality, hashing and ordering only consider the `TypeId`; the name is
/// carried along for error messages and logs.
#[derive(Clone, Copy)]
pub struct TypeKey {
    id: TypeId,
    name: &'static str,
}

impl TypeKey {
    /// The handle for `T`.
    #[inline]
    pub fn of<T: Any>() -> Self {
        Self {
            id: TypeId::of::<T>(),
            name: std::any::type_name::<T>(),
        }
    }

    /// The fully qualified type name.
    #[inline]
    pub fn name(self) -> &'static str {
        self.name
    }

    /// The underlying `TypeId`.
    #[inline]
    pub fn type_id(self) -> TypeId {
        self.id
    }
}

impl PartialEq for TypeKey {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for TypeKey {}

impl Hash for TypeKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl PartialOrd for TypeKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for TypeKey {
    fn cmp(&self, other: &Self) -> Ordering {
        self.id.cmp(&other.id)
    }
}

impl fmt::Debug for TypeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TypeKey({})", self.name)
    }
}

impl fmt::Display for TypeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name)
    }
}

/// Handle of a component type.
pub type ComponentKey = TypeKey;
/// Handle of a resource type.
pub type ResourceKey = TypeKey;
/// Handle of a system type.
pub type SystemKey = TypeKey;
/// Handle of a plugin type.
pub type PluginKey = TypeKey;

// ---------------------------------------------------------------------------
// AsAny
// ---------------------------------------------------------------------------

/// Type-erasure helpers shared by every stored value.
///
/// Implemented for all `'static + Send` types; the [`Component`],
/// [`Resource`], [`System`] and [`Plugin`] traits build on it so their trait
/// objects can be downcast back to the concrete type.
///
/// Call these through a trait object (`&dyn Component`), never on a `Box`
/// directly: `Box<dyn Component>` is itself `Any` and would erase the box.
///
/// [`Component`]: crate::component::Component
/// [`Resource`]: crate::resource::Resource
/// [`System`]: crate::system::System
/// [`Plugin`]: crate::plugin::Plugin
pub trait AsAny: Any + Send {
    fn as_any(&self) -> &dyn Any;
    fn as_any_mut(&mut self) -> &mut dyn Any;
    fn into_any(self: Box<Self>) -> Box<dyn Any>;
    /// Name of the concrete type behind the trait object.
    fn type_name(&self) -> &'static str;
}

impl<T: Any + Send> AsAny for T {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }

    fn into_any(self: Box<Self>) -> Box<dyn Any> {
        self
    }

    fn type_name(&self) -> &'static str {
        std::any::type_name::<T>()
    }
}

// ---------------------------------------------------------------------------
// ComponentRegistry
// ---------------------------------------------------------------------------

/// Set of component types registered ahead of use.
///
/// Registration is idempotent. Types are remembered in registration order.
#[derive(Debug, Default)]
pub struct ComponentRegistry {
    /// ComponentKey -> index into `registered`.
    by_type: HashMap<ComponentKey, usize>,
    registered: Vec<ComponentKey>,
}

impl ComponentRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a component type. Returns `true` if it was not registered yet.
    pub fn register(&mut self, key: ComponentKey) -> bool {
        if self.by_type.contains_key(&key) {
            return false;
        }
        self.by_type.insert(key, self.registered.len());
        self.registered.push(key);
        true
    }

    /// Whether `key` has been registered.
    pub fn contains(&self, key: ComponentKey) -> bool {
        self.by_type.contains_key(&key)
    }

    /// Registered component types, in registration order.
    pub fn registered(&self) -> &[ComponentKey] {
        &self.registered
    }

    /// Returns the names of all registered component types, sorted.
    pub fn registered_names(&self) -> Vec<&'static str> {
        let mut names: Vec<&'static str> = self.registered.iter().map(|k| k.name()).collect();
        names.sort_unstable();
        names
    }

    /// Total number of registered component types.
    pub fn len(&self) -> usize {
        self.registered.len()
    }

    /// Whether any component types have been registered.
    pub fn is_empty(&self) -> bool {
        self.registered.is_empty()
    }

    /// Forget every registration.
    pub fn clear(&mut self) {
        self.by_type.clear();
        self.registered.clear();
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
