//! Component trait and per-type component storage.
//!
//! Components live in one map per component type (`entity -> component`).
//! Alongside those columns the store keeps a reverse index
//! `entity -> component types`, so destroying an entity only touches the
//! columns it actually has a component in.
//!
//! Both maps are ordered by entity id, which makes iteration order (and thus
//! event order) deterministic.

use std::collections::btree_map;
use std::collections::{BTreeMap, HashMap};

use crate::entity::Entity;
use crate::registry::{AsAny, ComponentKey};

// ---------------------------------------------------------------------------
// Component
// ---------------------------------------------------------------------------

/// Marker trait for data attached to entities.
///
/// ```
/// use orrery_ecs::prelude::*;
///
/// struct Position { x: f32, y: f32 }
/// impl Component for Position {}
/// ```
pub trait Component: AsAny {}

/// A type-erased component as stored in a column.
pub type ErasedComponent = dyn Component;

/// Downcast an erased component to `C`.
#[inline]
pub(crate) fn downcast_ref<C: Component>(component: &ErasedComponent) -> Option<&C> {
    component.as_any().downcast_ref::<C>()
}

/// Mutable counterpart of [`downcast_ref`].
#[inline]
pub(crate) fn downcast_mut<C: Component>(component: &mut ErasedComponent) -> Option<&mut C> {
    component.as_any_mut().downcast_mut::<C>()
}

/// Storage for every component of one type.
pub(crate) type Column = BTreeMap<Entity, Box<dyn Component>>;

// ---------------------------------------------------------------------------
// ComponentStore
// ---------------------------------------------------------------------------

/// Columns of components keyed by type, plus the entity reverse index.
///
/// The reverse index is also the registry of live entities: an entity exists
/// exactly when it has an entry there, even if that entry is empty.
#[derive(Default)]
pub(crate) struct ComponentStore {
    columns: HashMap<ComponentKey, Column>,
    /// Entity -> component types it holds, in insertion order. Entities
    /// rarely carry more than a handful of types, so a vector beats a set.
    entities: BTreeMap<Entity, Vec<ComponentKey>>,
}

impl ComponentStore {
    // -- entities -----------------------------------------------------------

    /// Start tracking a freshly spawned entity.
    pub(crate) fn insert_entity(&mut self, entity: Entity) {
        self.entities.entry(entity).or_default();
    }

    /// Stop tracking `entity`, returning the component types it held.
    ///
    /// The components themselves stay in their columns until they are taken
    /// with [`take`](Self::take).
    pub(crate) fn forget_entity(&mut self, entity: Entity) -> Option<Vec<ComponentKey>> {
        self.entities.remove(&entity)
    }

    pub(crate) fn contains_entity(&self, entity: Entity) -> bool {
        self.entities.contains_key(&entity)
    }

    pub(crate) fn entity_count(&self) -> usize {
        self.entities.len()
    }

    /// The entity reverse index.
    pub(crate) fn entity_index(&self) -> &BTreeMap<Entity, Vec<ComponentKey>> {
        &self.entities
    }

    // -- columns ------------------------------------------------------------

    /// Create the column for `key` if it does not exist yet.
    pub(crate) fn ensure_column(&mut self, key: ComponentKey) {
        self.columns.entry(key).or_default();
    }

    pub(crate) fn column(&self, key: ComponentKey) -> Option<&Column> {
        self.columns.get(&key)
    }

    pub(crate) fn column_mut(&mut self, key: ComponentKey) -> Option<&mut Column> {
        self.columns.get_mut(&key)
    }

    pub(crate) fn columns_mut(&mut self) -> &mut HashMap<ComponentKey, Column> {
        &mut self.columns
    }

    // -- components ---------------------------------------------------------

    /// Store `component` under `(entity, key)`, replacing any previous value.
    ///
    /// The caller must have checked that `entity` exists. Returns the stored
    /// component.
    pub(crate) fn insert(
        &mut self,
        entity: Entity,
        key: ComponentKey,
        component: Box<dyn Component>,
    ) -> &mut Box<dyn Component> {
        if let Some(keys) = self.entities.get_mut(&entity) {
            if !keys.contains(&key) {
                keys.push(key);
            }
        }
        match self.columns.entry(key).or_default().entry(entity) {
            btree_map::Entry::Occupied(mut slot) => {
                slot.insert(component);
                slot.into_mut()
            }
            btree_map::Entry::Vacant(slot) => slot.insert(component),
        }
    }

    pub(crate) fn get(&self, entity: Entity, key: ComponentKey) -> Option<&ErasedComponent> {
        self.columns.get(&key)?.get(&entity).map(|c| &**c)
    }

    pub(crate) fn get_mut(
        &mut self,
        entity: Entity,
        key: ComponentKey,
    ) -> Option<&mut ErasedComponent> {
        self.columns
            .get_mut(&key)?
            .get_mut(&entity)
            .map(|c| &mut **c)
    }

    pub(crate) fn contains(&self, entity: Entity, key: ComponentKey) -> bool {
        self.columns
            .get(&key)
            .is_some_and(|column| column.contains_key(&entity))
    }

    /// Remove the component and update the reverse index.
    pub(crate) fn remove(&mut self, entity: Entity, key: ComponentKey) -> Option<Box<dyn Component>> {
        let component = self.take(entity, key)?;
        if let Some(keys) = self.entities.get_mut(&entity) {
            keys.retain(|k| *k != key);
        }
        Some(component)
    }

    /// Remove the component from its column without touching the reverse
    /// index. Used while tearing down an entity already forgotten.
    pub(crate) fn take(&mut self, entity: Entity, key: ComponentKey) -> Option<Box<dyn Component>> {
        self.columns.get_mut(&key)?.remove(&entity)
    }

    /// Drop every column and every entity.
    pub(crate) fn clear(&mut self) {
        self.columns.clear();
        self.entities.clear();
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
