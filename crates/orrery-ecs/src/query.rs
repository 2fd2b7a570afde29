//! Query engine: iterate entities by component shape.
//!
//! Three shapes are supported:
//!
//! - [`World::query`] walks the column of a single component type.
//! - [`World::query_all`] yields entities holding *every* type of a
//!   [`ComponentSet`] (intersection). The smallest column drives the
//!   iteration; every other column is probed by entity.
//! - [`World::query_any`] yields entities holding *at least one* type of the
//!   set (union), walking the entity index.
//!
//! ## Reused results
//!
//! [`QueryAll`] and [`QueryAny`] are lending cursors rather than iterators.
//! Each cursor allocates one slot buffer when it is created and overwrites
//! it on every step, so advancing never allocates. The item handed out by
//! `next()` borrows that buffer and is invalidated by the following call;
//! copy out what you need ([`QueryAllItem::entity`],
//! [`QueryAllItem::components`]) before advancing:
//!
//! ```
//! use orrery_ecs::prelude::*;
//!
//! struct Position(f32);
//! impl Component for Position {}
//! struct Velocity(f32);
//! impl Component for Velocity {}
//!
//! let mut world = World::new();
//! world.spawn((Position(0.0), Velocity(1.0))).unwrap();
//! world.spawn((Position(5.0),)).unwrap();
//!
//! let mut moving = Vec::new();
//! let mut cursor = world.query_all::<(Position, Velocity)>();
//! while let Some(item) = cursor.next() {
//!     moving.push(item.entity());
//! }
//! assert_eq!(moving.len(), 1);
//! ```
//!
//! Structural changes to the world while a cursor is alive are rejected by
//! the borrow checker.

use std::collections::btree_map;
use std::iter::Peekable;
use std::marker::PhantomData;

use crate::component::{downcast_mut, downcast_ref, Column, Component, ErasedComponent};
use crate::entity::Entity;
use crate::registry::{ComponentKey, TypeKey};
use crate::world::World;
use crate::EcsError;

/// Largest tuple arity accepted by [`ComponentSet`].
pub const MAX_SET_LEN: usize = 8;

// ---------------------------------------------------------------------------
// ComponentSet
// ---------------------------------------------------------------------------

/// A tuple of component types, `(A,)` through `(A, B, C, D, E, F, G, H)`.
///
/// The empty tuple `()` is a valid, empty set: queries over it yield nothing.
pub trait ComponentSet: 'static {
    /// `(&A, &B, ..)`
    type Refs<'w>: Copy;
    /// `(Option<&A>, Option<&B>, ..)`
    type Options<'w>: Copy;
    /// `(&mut A, &mut B, ..)`
    type Muts<'w>;

    /// Number of types in the set.
    const LEN: usize;

    /// The type handles, in tuple order.
    fn keys() -> Vec<ComponentKey>;

    /// Typed view over a fully populated slot buffer.
    fn refs<'w>(slots: &[Option<&'w ErasedComponent>]) -> Option<Self::Refs<'w>>;

    /// Typed view over a partially populated slot buffer.
    fn options<'w>(slots: &[Option<&'w ErasedComponent>]) -> Self::Options<'w>;

    /// Move the mutable borrows out of a fully populated slot buffer.
    fn muts<'w>(slots: &mut [Option<&'w mut ErasedComponent>]) -> Option<Self::Muts<'w>>;
}

impl ComponentSet for () {
    type Refs<'w> = ();
    type Options<'w> = ();
    type Muts<'w> = ();

    const LEN: usize = 0;

    fn keys() -> Vec<ComponentKey> {
        Vec::new()
    }

    fn refs<'w>(_slots: &[Option<&'w ErasedComponent>]) -> Option<Self::Refs<'w>> {
        Some(())
    }

    fn options<'w>(_slots: &[Option<&'w ErasedComponent>]) -> Self::Options<'w> {}

    fn muts<'w>(_slots: &mut [Option<&'w mut ErasedComponent>]) -> Option<Self::Muts<'w>> {
        Some(())
    }
}

macro_rules! impl_component_set {
    ($len:expr; $($name:ident $index:tt),+) => {
        impl<$($name: Component),+> ComponentSet for ($($name,)+) {
            type Refs<'w> = ($(&'w $name,)+);
            type Options<'w> = ($(Option<&'w $name>,)+);
            type Muts<'w> = ($(&'w mut $name,)+);

            const LEN: usize = $len;

            fn keys() -> Vec<ComponentKey> {
                vec![$(TypeKey::of::<$name>()),+]
            }

            fn refs<'w>(slots: &[Option<&'w ErasedComponent>]) -> Option<Self::Refs<'w>> {
                Some(($(downcast_ref::<$name>(slots[$index]?)?,)+))
            }

            fn options<'w>(slots: &[Option<&'w ErasedComponent>]) -> Self::Options<'w> {
                ($(slots[$index].and_then(downcast_ref::<$name>),)+)
            }

            fn muts<'w>(
                slots: &mut [Option<&'w mut ErasedComponent>],
            ) -> Option<Self::Muts<'w>> {
                Some(($(downcast_mut::<$name>(slots[$index].take()?)?,)+))
            }
        }
    };
}

impl_component_set!(1; A 0);
impl_component_set!(2; A 0, B 1);
impl_component_set!(3; A 0, B 1, C 2);
impl_component_set!(4; A 0, B 1, C 2, D 3);
impl_component_set!(5; A 0, B 1, C 2, D 3, E 4);
impl_component_set!(6; A 0, B 1, C 2, D 3, E 4, F 5);
impl_component_set!(7; A 0, B 1, C 2, D 3, E 4, F 5, G 6);
impl_component_set!(8; A 0, B 1, C 2, D 3, E 4, F 5, G 6, H 7);

/// Resolve `C` by its position in `keys`.
fn lookup<'w, C: Component>(
    keys: &[ComponentKey],
    slots: &[Option<&'w ErasedComponent>],
) -> Option<&'w C> {
    let index = keys.iter().position(|key| *key == TypeKey::of::<C>())?;
    slots[index].and_then(downcast_ref::<C>)
}

/// Tail of the `NoQueryMatch` message.
pub(crate) fn filter_suffix(filtered: &bool) -> &'static str {
    if *filtered {
        " matching the filter"
    } else {
        ""
    }
}

// ---------------------------------------------------------------------------
// Single-type query
// ---------------------------------------------------------------------------

/// One result of a single-type query.
#[derive(Debug)]
pub struct QueryItem<'w, C> {
    pub entity: Entity,
    pub component: &'w C,
}

impl<C> Clone for QueryItem<'_, C> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<C> Copy for QueryItem<'_, C> {}

/// Iterator over every entity holding a `C`, in entity order.
pub struct Query<'w, C> {
    inner: Option<btree_map::Iter<'w, Entity, Box<dyn Component>>>,
    _marker: PhantomData<fn() -> C>,
}

impl<'w, C: Component> Query<'w, C> {
    fn new(column: Option<&'w Column>) -> Self {
        Self {
            inner: column.map(|column| column.iter()),
            _marker: PhantomData,
        }
    }
}

impl<'w, C: Component> Iterator for Query<'w, C> {
    type Item = QueryItem<'w, C>;

    fn next(&mut self) -> Option<Self::Item> {
        let inner = self.inner.as_mut()?;
        for (&entity, component) in inner.by_ref() {
            if let Some(component) = downcast_ref::<C>(&**component) {
                return Some(QueryItem { entity, component });
            }
        }
        None
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        match &self.inner {
            Some(inner) => (0, Some(inner.len())),
            None => (0, Some(0)),
        }
    }
}

/// Mutable iterator over every entity holding a `C`.
pub struct QueryMut<'w, C> {
    inner: Option<btree_map::IterMut<'w, Entity, Box<dyn Component>>>,
    _marker: PhantomData<fn() -> C>,
}

impl<'w, C: Component> Iterator for QueryMut<'w, C> {
    type Item = (Entity, &'w mut C);

    fn next(&mut self) -> Option<Self::Item> {
        let inner = self.inner.as_mut()?;
        for (&entity, component) in inner.by_ref() {
            if let Some(component) = downcast_mut::<C>(&mut **component) {
                return Some((entity, component));
            }
        }
        None
    }
}

// ---------------------------------------------------------------------------
// Intersection query
// ---------------------------------------------------------------------------

/// The reused result of a [`QueryAll`] step.
pub struct QueryAllItem<'q, 'w, S: ComponentSet> {
    entity: Entity,
    refs: S::Refs<'w>,
    keys: &'q [ComponentKey],
    slots: &'q [Option<&'w ErasedComponent>],
}

impl<'q, 'w, S: ComponentSet> QueryAllItem<'q, 'w, S> {
    pub fn entity(&self) -> Entity {
        self.entity
    }

    /// The matched components as a typed tuple. The references outlive the
    /// item itself.
    pub fn components(&self) -> S::Refs<'w> {
        self.refs
    }

    /// The component of type `C`, looked up by its position in `S`.
    ///
    /// Returns `None` only when `C` is not part of the set.
    pub fn get<C: Component>(&self) -> Option<&'w C> {
        lookup::<C>(self.keys, self.slots)
    }

    /// Like [`get`](Self::get), failing with `ComponentNotFound` instead.
    pub fn get_or_fail<C: Component>(&self) -> Result<&'w C, EcsError> {
        self.get::<C>().ok_or(EcsError::ComponentNotFound {
            entity: self.entity,
            component: std::any::type_name::<C>(),
        })
    }
}

/// Predicate type of an unfiltered [`QueryAll`].
pub type AcceptAll<'w, S> = fn(&QueryAllItem<'_, 'w, S>) -> bool;

fn accept_all<S: ComponentSet>(_: &QueryAllItem<'_, '_, S>) -> bool {
    true
}

/// Lending cursor over the entities holding every type of `S`.
pub struct QueryAll<'w, S: ComponentSet, F> {
    /// Iterator over the smallest column, `None` when nothing can match.
    base: Option<btree_map::Iter<'w, Entity, Box<dyn Component>>>,
    base_index: usize,
    columns: Vec<&'w Column>,
    keys: Vec<ComponentKey>,
    slots: Vec<Option<&'w ErasedComponent>>,
    filter: F,
    _marker: PhantomData<fn() -> S>,
}

impl<'w, S, F> QueryAll<'w, S, F>
where
    S: ComponentSet,
    F: FnMut(&QueryAllItem<'_, 'w, S>) -> bool,
{
    fn new(world: &'w World, filter: F) -> Self {
        let keys = S::keys();
        let columns: Option<Vec<&'w Column>> = keys
            .iter()
            .map(|key| world.components.column(*key))
            .collect();
        // An empty set or a column that was never created: nothing matches.
        let columns = columns.filter(|columns| !columns.is_empty()).unwrap_or_default();
        let base_index = columns
            .iter()
            .enumerate()
            .min_by_key(|(_, column)| column.len())
            .map(|(index, _)| index)
            .unwrap_or(0);
        let base = columns.get(base_index).map(|column| column.iter());

        Self {
            base,
            base_index,
            slots: vec![None; keys.len()],
            columns,
            keys,
            filter,
            _marker: PhantomData,
        }
    }

    /// Advance to the next matching entity.
    ///
    /// The returned item borrows the cursor's slot buffer and is overwritten
    /// by the next call.
    #[allow(clippy::should_implement_trait)]
    pub fn next(&mut self) -> Option<QueryAllItem<'_, 'w, S>> {
        let base = self.base.as_mut()?;
        let (entity, refs) = 'search: loop {
            let (&entity, component) = base.next()?;
            self.slots[self.base_index] = Some(&**component);
            for (index, column) in self.columns.iter().enumerate() {
                if index == self.base_index {
                    continue;
                }
                match column.get(&entity) {
                    Some(component) => self.slots[index] = Some(&**component),
                    None => continue 'search,
                }
            }
            let Some(refs) = S::refs(&self.slots) else {
                continue;
            };
            let candidate = QueryAllItem::<S> {
                entity,
                refs,
                keys: &self.keys,
                slots: &self.slots,
            };
            if (self.filter)(&candidate) {
                break (entity, refs);
            }
        };
        Some(QueryAllItem {
            entity,
            refs,
            keys: &self.keys,
            slots: &self.slots,
        })
    }

    /// Visit every remaining match.
    pub fn for_each(mut self, mut visit: impl FnMut(QueryAllItem<'_, 'w, S>)) {
        while let Some(item) = self.next() {
            visit(item);
        }
    }

    /// Consume the cursor, counting the remaining matches.
    pub fn count(mut self) -> usize {
        let mut count = 0;
        while self.next().is_some() {
            count += 1;
        }
        count
    }
}

/// Iterator over the entities holding every type of `S`, with mutable access.
///
/// Columns are walked in lockstep by entity order, driven by the smallest
/// one, so every yielded borrow is disjoint.
pub struct QueryAllMut<'w, S: ComponentSet> {
    base: Option<(usize, btree_map::IterMut<'w, Entity, Box<dyn Component>>)>,
    others: Vec<(usize, Peekable<btree_map::IterMut<'w, Entity, Box<dyn Component>>>)>,
    _marker: PhantomData<fn() -> S>,
}

impl<'w, S: ComponentSet> QueryAllMut<'w, S> {
    fn new(world: &'w mut World) -> Self {
        let keys = S::keys();
        assert!(
            keys.len() <= MAX_SET_LEN,
            "component sets hold at most {MAX_SET_LEN} types"
        );
        for (index, key) in keys.iter().enumerate() {
            assert!(
                !keys[..index].contains(key),
                "component type {key} requested twice in a mutable query"
            );
        }

        let mut slots: Vec<Option<&'w mut Column>> = keys.iter().map(|_| None).collect();
        for (key, column) in world.components.columns_mut().iter_mut() {
            if let Some(index) = keys.iter().position(|k| k == key) {
                slots[index] = Some(column);
            }
        }
        let columns: Option<Vec<&'w mut Column>> = slots.into_iter().collect();
        let Some(columns) = columns.filter(|columns| !columns.is_empty()) else {
            return Self {
                base: None,
                others: Vec::new(),
                _marker: PhantomData,
            };
        };

        let base_index = columns
            .iter()
            .enumerate()
            .min_by_key(|(_, column)| column.len())
            .map(|(index, _)| index)
            .unwrap_or(0);
        let mut base = None;
        let mut others = Vec::with_capacity(columns.len() - 1);
        for (index, column) in columns.into_iter().enumerate() {
            if index == base_index {
                base = Some((index, column.iter_mut()));
            } else {
                others.push((index, column.iter_mut().peekable()));
            }
        }

        Self {
            base,
            others,
            _marker: PhantomData,
        }
    }
}

impl<'w, S: ComponentSet> Iterator for QueryAllMut<'w, S> {
    type Item = (Entity, S::Muts<'w>);

    fn next(&mut self) -> Option<Self::Item> {
        let (base_index, base) = self.base.as_mut()?;
        'search: for (&entity, component) in base.by_ref() {
            let mut row: [Option<&'w mut ErasedComponent>; MAX_SET_LEN] = Default::default();
            row[*base_index] = Some(&mut **component);
            for (index, column) in self.others.iter_mut() {
                while column.next_if(|(other, _)| **other < entity).is_some() {}
                match column.next_if(|(other, _)| **other == entity) {
                    Some((_, component)) => row[*index] = Some(&mut **component),
                    None => continue 'search,
                }
            }
            if let Some(muts) = S::muts(&mut row) {
                return Some((entity, muts));
            }
        }
        None
    }
}

// ---------------------------------------------------------------------------
// Union query
// ---------------------------------------------------------------------------

/// The reused result of a [`QueryAny`] step.
pub struct QueryAnyItem<'q, 'w, S: ComponentSet> {
    entity: Entity,
    options: S::Options<'w>,
    keys: &'q [ComponentKey],
    slots: &'q [Option<&'w ErasedComponent>],
}

impl<'q, 'w, S: ComponentSet> QueryAnyItem<'q, 'w, S> {
    pub fn entity(&self) -> Entity {
        self.entity
    }

    /// One `Option` per type of `S`; `None` where the entity lacks the type.
    pub fn components(&self) -> S::Options<'w> {
        self.options
    }

    pub fn get<C: Component>(&self) -> Option<&'w C> {
        lookup::<C>(self.keys, self.slots)
    }

    pub fn get_or_fail<C: Component>(&self) -> Result<&'w C, EcsError> {
        self.get::<C>().ok_or(EcsError::ComponentNotFound {
            entity: self.entity,
            component: std::any::type_name::<C>(),
        })
    }
}

/// Predicate type of an unfiltered [`QueryAny`].
pub type AcceptAny<'w, S> = fn(&QueryAnyItem<'_, 'w, S>) -> bool;

fn accept_any<S: ComponentSet>(_: &QueryAnyItem<'_, '_, S>) -> bool {
    true
}

/// Lending cursor over the entities holding at least one type of `S`.
pub struct QueryAny<'w, S: ComponentSet, F> {
    entities: btree_map::Iter<'w, Entity, Vec<ComponentKey>>,
    columns: Vec<Option<&'w Column>>,
    keys: Vec<ComponentKey>,
    slots: Vec<Option<&'w ErasedComponent>>,
    filter: F,
    _marker: PhantomData<fn() -> S>,
}

impl<'w, S, F> QueryAny<'w, S, F>
where
    S: ComponentSet,
    F: FnMut(&QueryAnyItem<'_, 'w, S>) -> bool,
{
    fn new(world: &'w World, filter: F) -> Self {
        let keys = S::keys();
        Self {
            entities: world.components.entity_index().iter(),
            columns: keys.iter().map(|key| world.components.column(*key)).collect(),
            slots: vec![None; keys.len()],
            keys,
            filter,
            _marker: PhantomData,
        }
    }

    /// Advance to the next entity holding any type of `S`.
    #[allow(clippy::should_implement_trait)]
    pub fn next(&mut self) -> Option<QueryAnyItem<'_, 'w, S>> {
        if self.keys.is_empty() {
            return None;
        }
        let (entity, options) = loop {
            let (&entity, held) = self.entities.next()?;
            let mut any = false;
            for (index, key) in self.keys.iter().enumerate() {
                self.slots[index] = if held.contains(key) {
                    self.columns[index]
                        .and_then(|column| column.get(&entity))
                        .map(|component| &**component)
                } else {
                    None
                };
                any |= self.slots[index].is_some();
            }
            if !any {
                continue;
            }
            let options = S::options(&self.slots);
            let candidate = QueryAnyItem::<S> {
                entity,
                options,
                keys: &self.keys,
                slots: &self.slots,
            };
            if (self.filter)(&candidate) {
                break (entity, options);
            }
        };
        Some(QueryAnyItem {
            entity,
            options,
            keys: &self.keys,
            slots: &self.slots,
        })
    }

    pub fn for_each(mut self, mut visit: impl FnMut(QueryAnyItem<'_, 'w, S>)) {
        while let Some(item) = self.next() {
            visit(item);
        }
    }

    pub fn count(mut self) -> usize {
        let mut count = 0;
        while self.next().is_some() {
            count += 1;
        }
        count
    }
}

// ---------------------------------------------------------------------------
// World query methods
// ---------------------------------------------------------------------------

impl World {
    /// Iterate every entity holding a `C`.
    ///
    /// A type that was never added nor registered yields nothing.
    pub fn query<C: Component>(&self) -> Query<'_, C> {
        Query::new(self.components.column(TypeKey::of::<C>()))
    }

    /// [`query`](Self::query) restricted to items accepted by `filter`.
    pub fn query_filtered<'w, C, F>(&'w self, filter: F) -> std::iter::Filter<Query<'w, C>, F>
    where
        C: Component,
        F: FnMut(&QueryItem<'w, C>) -> bool,
    {
        self.query::<C>().filter(filter)
    }

    /// Iterate every entity holding a `C`, with mutable access.
    pub fn query_mut<C: Component>(&mut self) -> QueryMut<'_, C> {
        QueryMut {
            inner: self
                .components
                .column_mut(TypeKey::of::<C>())
                .map(|column| column.iter_mut()),
            _marker: PhantomData,
        }
    }

    /// Cursor over the entities holding every type of `S`.
    pub fn query_all<S: ComponentSet>(&self) -> QueryAll<'_, S, AcceptAll<'_, S>> {
        QueryAll::new(self, accept_all::<S> as AcceptAll<'_, S>)
    }

    /// [`query_all`](Self::query_all) restricted to items accepted by
    /// `filter`. The filter runs after the intersection test.
    pub fn query_all_filtered<'w, S, F>(&'w self, filter: F) -> QueryAll<'w, S, F>
    where
        S: ComponentSet,
        F: FnMut(&QueryAllItem<'_, 'w, S>) -> bool,
    {
        QueryAll::new(self, filter)
    }

    /// Iterate the entities holding every type of `S`, with mutable access.
    ///
    /// ```
    /// use orrery_ecs::prelude::*;
    ///
    /// struct Position(f32);
    /// impl Component for Position {}
    /// struct Velocity(f32);
    /// impl Component for Velocity {}
    ///
    /// let mut world = World::new();
    /// let e = world.spawn((Position(0.0), Velocity(2.0))).unwrap();
    /// for (_, (pos, vel)) in world.query_all_mut::<(Position, Velocity)>() {
    ///     pos.0 += vel.0;
    /// }
    /// assert_eq!(world.get_component::<Position>(e).map(|p| p.0), Some(2.0));
    /// ```
    ///
    /// # Panics
    ///
    /// Panics if `S` names the same component type twice.
    pub fn query_all_mut<S: ComponentSet>(&mut self) -> QueryAllMut<'_, S> {
        QueryAllMut::new(self)
    }

    /// Cursor over the entities holding at least one type of `S`.
    pub fn query_any<S: ComponentSet>(&self) -> QueryAny<'_, S, AcceptAny<'_, S>> {
        QueryAny::new(self, accept_any::<S> as AcceptAny<'_, S>)
    }

    /// [`query_any`](Self::query_any) restricted to items accepted by `filter`.
    pub fn query_any_filtered<'w, S, F>(&'w self, filter: F) -> QueryAny<'w, S, F>
    where
        S: ComponentSet,
        F: FnMut(&QueryAnyItem<'_, 'w, S>) -> bool,
    {
        QueryAny::new(self, filter)
    }

    /// The first entity holding a `C`, if any.
    pub fn query_one<C: Component>(&self) -> Option<QueryItem<'_, C>> {
        self.query::<C>().next()
    }

    pub fn query_one_filtered<'w, C, F>(&'w self, mut filter: F) -> Option<QueryItem<'w, C>>
    where
        C: Component,
        F: FnMut(&QueryItem<'w, C>) -> bool,
    {
        self.query::<C>().find(|item| filter(item))
    }

    /// Like [`query_one`](Self::query_one), failing with `NoQueryMatch`.
    pub fn query_one_or_fail<C: Component>(&self) -> Result<QueryItem<'_, C>, EcsError> {
        self.query_one::<C>().ok_or(EcsError::NoQueryMatch {
            component: std::any::type_name::<C>(),
            filtered: false,
        })
    }

    pub fn query_one_filtered_or_fail<'w, C, F>(
        &'w self,
        filter: F,
    ) -> Result<QueryItem<'w, C>, EcsError>
    where
        C: Component,
        F: FnMut(&QueryItem<'w, C>) -> bool,
    {
        self.query_one_filtered(filter)
            .ok_or(EcsError::NoQueryMatch {
                component: std::any::type_name::<C>(),
                filtered: true,
            })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use crate::prelude::*;

    #[derive(Debug, Clone, Copy, PartialEq)]
    struct Pos(i32);
    impl Component for Pos {}

    #[derive(Debug, Clone, Copy, PartialEq)]
    struct Vel(i32);
    impl Component for Vel {}

    #[derive(Debug, Clone, Copy, PartialEq)]
    struct Tag;
    impl Component for Tag {}

    /// e0: Pos, e1: Pos+Vel, e2: Vel, e3: Pos+Vel+Tag
    fn sample() -> (World, Vec<Entity>) {
        let mut world = World::new();
        let entities = vec![
            world.spawn((Pos(0),)).unwrap(),
            world.spawn((Pos(1), Vel(10))).unwrap(),
            world.spawn((Vel(20),)).unwrap(),
            world.spawn((Pos(3), Vel(30), Tag)).unwrap(),
        ];
        (world, entities)
    }

    // -- single type ---------------------------------------------------------

    #[test]
    fn query_yields_every_holder() {
        let (world, e) = sample();
        let found: Vec<_> = world.query::<Pos>().map(|item| item.entity).collect();
        assert_eq!(found, vec![e[0], e[1], e[3]]);
    }

    #[test]
    fn query_unknown_type_is_empty() {
        let (world, _) = sample();
        #[derive(Debug)]
        struct Unused;
        impl Component for Unused {}
        assert_eq!(world.query::<Unused>().count(), 0);
    }

    #[test]
    fn query_filtered_applies_predicate() {
        let (world, e) = sample();
        let found: Vec<_> = world
            .query_filtered::<Pos, _>(|item| item.component.0 > 0)
            .map(|item| item.entity)
            .collect();
        assert_eq!(found, vec![e[1], e[3]]);
    }

    #[test]
    fn query_mut_edits_in_place() {
        let (mut world, e) = sample();
        for (_, pos) in world.query_mut::<Pos>() {
            pos.0 += 100;
        }
        assert_eq!(world.get_component::<Pos>(e[3]), Some(&Pos(103)));
    }

    // -- intersection --------------------------------------------------------

    #[test]
    fn query_all_is_intersection() {
        let (world, e) = sample();
        let mut found = Vec::new();
        let mut cursor = world.query_all::<(Pos, Vel)>();
        while let Some(item) = cursor.next() {
            let (pos, vel) = item.components();
            found.push((item.entity(), pos.0, vel.0));
        }
        assert_eq!(found, vec![(e[1], 1, 10), (e[3], 3, 30)]);
    }

    #[test]
    fn query_all_order_of_types_does_not_matter() {
        let (world, _) = sample();
        let a = world.query_all::<(Pos, Tag)>().count();
        let b = world.query_all::<(Tag, Pos)>().count();
        assert_eq!(a, 1);
        assert_eq!(b, 1);
    }

    #[test]
    fn query_all_missing_column_yields_nothing() {
        let (world, _) = sample();
        #[derive(Debug)]
        struct Unused;
        impl Component for Unused {}
        assert_eq!(world.query_all::<(Pos, Unused)>().count(), 0);
    }

    #[test]
    fn query_all_registered_but_unused_is_empty() {
        let (mut world, _) = sample();
        #[derive(Debug)]
        struct Later;
        impl Component for Later {}
        world.register_component::<Later>();
        assert_eq!(world.query_all::<(Later,)>().count(), 0);
        assert_eq!(world.query::<Later>().count(), 0);
    }

    #[test]
    fn query_all_empty_set_yields_nothing() {
        let (world, _) = sample();
        assert_eq!(world.query_all::<()>().count(), 0);
        assert_eq!(world.query_any::<()>().count(), 0);
    }

    #[test]
    fn query_all_get_resolves_by_type() {
        let (world, e) = sample();
        let mut cursor = world.query_all::<(Pos, Vel, Tag)>();
        let item = cursor.next().expect("one match");
        assert_eq!(item.entity(), e[3]);
        assert_eq!(item.get::<Vel>(), Some(&Vel(30)));
        assert_eq!(item.get::<Pos>(), Some(&Pos(3)));
        assert!(cursor.next().is_none());
    }

    #[test]
    fn query_all_filter_runs_last() {
        let (world, e) = sample();
        let mut cursor =
            world.query_all_filtered::<(Pos, Vel), _>(|item| item.components().1 .0 > 15);
        let item = cursor.next().expect("filtered match");
        assert_eq!(item.entity(), e[3]);
        assert!(cursor.next().is_none());
    }

    #[test]
    fn query_all_reuses_slot_buffer() {
        let (world, _) = sample();
        let mut cursor = world.query_all::<(Pos, Vel)>();
        let first = cursor.next().map(|item| item.slots.as_ptr());
        let second = cursor.next().map(|item| item.slots.as_ptr());
        assert!(first.is_some());
        assert_eq!(first, second);
    }

    #[test]
    fn query_all_mut_updates_matching_entities() {
        let (mut world, e) = sample();
        let mut visited = Vec::new();
        for (entity, (pos, vel)) in world.query_all_mut::<(Pos, Vel)>() {
            pos.0 += vel.0;
            visited.push(entity);
        }
        assert_eq!(visited, vec![e[1], e[3]]);
        assert_eq!(world.get_component::<Pos>(e[1]), Some(&Pos(11)));
        assert_eq!(world.get_component::<Pos>(e[0]), Some(&Pos(0)));
    }

    #[test]
    #[should_panic(expected = "requested twice")]
    fn query_all_mut_rejects_duplicate_types() {
        let (mut world, _) = sample();
        let _ = world.query_all_mut::<(Pos, Pos)>().count();
    }

    // -- union ---------------------------------------------------------------

    #[test]
    fn query_any_is_union() {
        let (world, e) = sample();
        let mut found = Vec::new();
        let mut cursor = world.query_any::<(Pos, Tag)>();
        while let Some(item) = cursor.next() {
            let (pos, tag) = item.components();
            found.push((item.entity(), pos.copied(), tag.is_some()));
        }
        assert_eq!(
            found,
            vec![
                (e[0], Some(Pos(0)), false),
                (e[1], Some(Pos(1)), false),
                (e[3], Some(Pos(3)), true),
            ]
        );
    }

    #[test]
    fn query_any_get_or_fail_reports_missing() {
        let (world, e) = sample();
        let mut cursor = world.query_any_filtered::<(Pos, Vel), _>(|item| item.entity() == e[2]);
        let item = cursor.next().expect("e2 holds Vel");
        assert_eq!(item.get::<Pos>(), None);
        assert_eq!(item.get_or_fail::<Vel>().unwrap(), &Vel(20));
        let err = item.get_or_fail::<Pos>().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
        assert!(err.to_string().contains("Pos"));
    }

    // -- single result -------------------------------------------------------

    #[test]
    fn query_one_returns_first_match() {
        let (world, e) = sample();
        assert_eq!(world.query_one::<Vel>().map(|item| item.entity), Some(e[1]));
        let found = world.query_one_filtered::<Vel, _>(|item| item.component.0 == 20);
        assert_eq!(found.map(|item| item.entity), Some(e[2]));
    }

    #[test]
    fn query_one_or_fail_names_type_and_filter() {
        let world = World::new();
        let plain = world.query_one_or_fail::<Pos>().unwrap_err();
        assert!(plain.to_string().contains("Pos"));
        assert!(!plain.to_string().contains("matching the filter"));

        let filtered = world
            .query_one_filtered_or_fail::<Pos, _>(|_| true)
            .unwrap_err();
        assert!(filtered.to_string().contains("matching the filter"));
        assert_eq!(filtered.kind(), ErrorKind::NotFound);
    }
}
