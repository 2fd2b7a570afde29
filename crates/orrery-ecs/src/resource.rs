//! World resources: typed singletons that live outside the entity model.
//!
//! Unlike components, resources are never replaced implicitly. Adding a
//! second resource of a type that is already present is an error, and
//! looking up a missing resource fails instead of returning `None`.

use std::collections::hash_map::Entry;
use std::collections::HashMap;

use crate::registry::{AsAny, ResourceKey, TypeKey};
use crate::EcsError;

/// Marker trait for world singletons (asset caches, configuration, clocks).
pub trait Resource: AsAny {}

/// One boxed value per resource type.
#[derive(Default)]
pub(crate) struct ResourceStore {
    resources: HashMap<ResourceKey, Box<dyn Resource>>,
}

impl ResourceStore {
    /// Insert `resource`, failing if one of the same type already exists.
    pub(crate) fn insert<R: Resource>(&mut self, resource: R) -> Result<&mut R, EcsError> {
        let key = TypeKey::of::<R>();
        match self.resources.entry(key) {
            Entry::Occupied(_) => Err(EcsError::DuplicateResource {
                resource: key.name(),
            }),
            Entry::Vacant(slot) => {
                let stored = slot.insert(Box::new(resource));
                downcast_mut::<R>(&mut **stored).ok_or(EcsError::ResourceNotFound {
                    resource: key.name(),
                })
            }
        }
    }

    pub(crate) fn get<R: Resource>(&self) -> Result<&R, EcsError> {
        self.resources
            .get(&TypeKey::of::<R>())
            .and_then(|r| (**r).as_any().downcast_ref::<R>())
            .ok_or(EcsError::ResourceNotFound {
                resource: std::any::type_name::<R>(),
            })
    }

    pub(crate) fn get_mut<R: Resource>(&mut self) -> Result<&mut R, EcsError> {
        self.resources
            .get_mut(&TypeKey::of::<R>())
            .and_then(|r| downcast_mut::<R>(&mut **r))
            .ok_or(EcsError::ResourceNotFound {
                resource: std::any::type_name::<R>(),
            })
    }

    pub(crate) fn contains(&self, key: ResourceKey) -> bool {
        self.resources.contains_key(&key)
    }

    /// Remove the resource, handing it back to the caller.
    pub(crate) fn remove<R: Resource>(&mut self) -> Option<R> {
        let boxed = self.resources.remove(&TypeKey::of::<R>())?;
        boxed.into_any().downcast::<R>().ok().map(|r| *r)
    }

    pub(crate) fn len(&self) -> usize {
        self.resources.len()
    }

    pub(crate) fn clear(&mut self) {
        self.resources.clear();
    }
}

fn downcast_mut<R: Resource>(resource: &mut dyn Resource) -> Option<&mut R> {
    resource.as_any_mut().downcast_mut::<R>()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
