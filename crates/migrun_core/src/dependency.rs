//! Typed dependencies available to change units.
//!
//! The registry maps a type to one live instance. Change units look
//! dependencies up by type through [`crate::ChangeContext::dependency`];
//! the transaction coordinator registers the in-flight
//! [`crate::TransactionBatch`] here for exactly as long as it is live.

use parking_lot::RwLock;
use std::any::{type_name, Any, TypeId};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// A registered instance together with its type tag.
#[derive(Clone)]
pub struct Dependency {
    type_id: TypeId,
    type_name: &'static str,
    instance: Arc<dyn Any + Send + Sync>,
    proxyable: bool,
}

impl Dependency {
    /// Wraps an instance of `T`.
    pub fn new<T: Any + Send + Sync>(instance: Arc<T>, proxyable: bool) -> Self {
        Self {
            type_id: TypeId::of::<T>(),
            type_name: type_name::<T>(),
            instance,
            proxyable,
        }
    }

    /// Returns the type tag.
    #[must_use]
    pub fn type_id(&self) -> TypeId {
        self.type_id
    }

    /// Returns the type name, for diagnostics.
    #[must_use]
    pub fn type_name(&self) -> &'static str {
        self.type_name
    }

    /// Returns whether the instance may be handed out behind a proxy.
    #[must_use]
    pub fn is_proxyable(&self) -> bool {
        self.proxyable
    }

    /// Returns true if this dependency holds a `T`.
    #[must_use]
    pub fn is<T: Any>(&self) -> bool {
        self.type_id == TypeId::of::<T>()
    }

    /// Returns the instance as a `T`, if it is one.
    #[must_use]
    pub fn downcast<T: Any + Send + Sync>(&self) -> Option<Arc<T>> {
        Arc::clone(&self.instance).downcast::<T>().ok()
    }
}

impl fmt::Debug for Dependency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Dependency")
            .field("type_name", &self.type_name)
            .field("proxyable", &self.proxyable)
            .finish_non_exhaustive()
    }
}

/// A mutable set of dependencies keyed by type.
///
/// At most one instance per type is live; `set` replaces and `unset` is a
/// no-op for types that were never set.
#[derive(Debug, Default)]
pub struct DependencyRegistry {
    entries: RwLock<HashMap<TypeId, Dependency>>,
}

impl DependencyRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `instance` as the `T` dependency, returning the one it
    /// replaced.
    pub fn set<T: Any + Send + Sync>(&self, instance: Arc<T>, proxyable: bool) -> Option<Dependency> {
        self.insert(Dependency::new(instance, proxyable))
    }

    /// Registers a prepared dependency, returning the one it replaced.
    pub fn insert(&self, dependency: Dependency) -> Option<Dependency> {
        self.entries.write().insert(dependency.type_id, dependency)
    }

    /// Removes the `T` dependency, if any.
    pub fn unset<T: Any>(&self) -> Option<Dependency> {
        self.entries.write().remove(&TypeId::of::<T>())
    }

    /// Returns the `T` dependency, if registered.
    #[must_use]
    pub fn get<T: Any + Send + Sync>(&self) -> Option<Arc<T>> {
        self.entries
            .read()
            .get(&TypeId::of::<T>())
            .and_then(Dependency::downcast::<T>)
    }

    /// Returns true if a `T` dependency is registered.
    #[must_use]
    pub fn contains<T: Any>(&self) -> bool {
        self.entries.read().contains_key(&TypeId::of::<T>())
    }

    /// Returns every registered dependency, ordered by type name.
    #[must_use]
    pub fn snapshot(&self) -> Vec<Dependency> {
        let mut all: Vec<_> = self.entries.read().values().cloned().collect();
        all.sort_by_key(|d| d.type_name);
        all
    }

    /// Returns the number of registered dependencies.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    /// Returns true if nothing is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, PartialEq)]
    struct Mailer(&'static str);

    #[derive(Debug)]
    struct Auditor;

    #[test]
    fn set_and_get_by_type() {
        let registry = DependencyRegistry::new();
        registry.set(Arc::new(Mailer("smtp")), false);

        assert_eq!(registry.get::<Mailer>().as_deref(), Some(&Mailer("smtp")));
        assert!(registry.get::<Auditor>().is_none());
    }

    #[test]
    fn set_replaces_previous_instance() {
        let registry = DependencyRegistry::new();
        assert!(registry.set(Arc::new(Mailer("a")), false).is_none());
        let previous = registry.set(Arc::new(Mailer("b")), true).unwrap();

        assert_eq!(previous.downcast::<Mailer>().as_deref(), Some(&Mailer("a")));
        assert_eq!(registry.len(), 1);
        assert!(registry.snapshot()[0].is_proxyable());
    }

    #[test]
    fn unset_is_idempotent() {
        let registry = DependencyRegistry::new();
        assert!(registry.unset::<Mailer>().is_none());

        registry.set(Arc::new(Mailer("a")), false);
        assert!(registry.unset::<Mailer>().is_some());
        assert!(registry.unset::<Mailer>().is_none());
        assert!(registry.is_empty());
    }

    #[test]
    fn snapshot_lists_all_entries() {
        let registry = DependencyRegistry::new();
        registry.set(Arc::new(Mailer("a")), false);
        registry.set(Arc::new(Auditor), true);

        let snapshot = registry.snapshot();
        assert_eq!(snapshot.len(), 2);
        assert!(snapshot.iter().any(|d| d.is::<Mailer>() && !d.is_proxyable()));
        assert!(snapshot.iter().any(|d| d.is::<Auditor>() && d.is_proxyable()));
    }
}
