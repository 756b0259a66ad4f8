//! # Dependency Container (§4.1)
//!
//! Components are singletons, created lazily on first [`Container::resolve`]
//! and cached forever afterward. Construction happens through a type-erased
//! constructor registered at boot; cycles are caught via a thread-local
//! resolution stack rather than a mutex-guarded one, since resolution is not
//! meant to cross an await point (constructors run synchronously over
//! already-resolved dependencies) and never happens concurrently with
//! mutation (§4.1: "mutation ceases before the first request").

use std::any::{Any, TypeId};
use std::cell::RefCell;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use tracing::trace;

use crate::error::ContainerError;

type Constructor = Arc<dyn Fn(&Container) -> Result<Arc<dyn Any + Send + Sync>, ContainerError> + Send + Sync>;

thread_local! {
    static RESOLUTION_STACK: RefCell<Vec<TypeId>> = const { RefCell::new(Vec::new()) };
}

/// The dependency container (§4.1). Cheap to clone: the instance cache and
/// constructor table live behind `Arc`, so every clone shares the same
/// singletons.
#[derive(Clone, Default)]
pub struct Container {
    constructors: Arc<RwLock<HashMap<TypeId, (Constructor, &'static str)>>>,
    instances: Arc<RwLock<HashMap<TypeId, Arc<dyn Any + Send + Sync>>>>,
}

impl Container {
    /// An empty container with no registered constructors.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a constructor for `T`. `build` receives the container so it
    /// can recursively resolve its own dependencies. Overwrites any prior
    /// registration for `T` (last registration wins, matching the boot-time
    /// `Constructor(fn...)` append semantics of §6).
    pub fn register<T, F>(&self, build: F)
    where
        T: Any + Send + Sync + 'static,
        F: Fn(&Container) -> Result<T, ContainerError> + Send + Sync + 'static,
    {
        let type_id = TypeId::of::<T>();
        let ctor: Constructor = Arc::new(move |container| {
            let value = build(container)?;
            Ok(Arc::new(value) as Arc<dyn Any + Send + Sync>)
        });
        self.constructors
            .write()
            .expect("container constructor table poisoned")
            .insert(type_id, (ctor, std::any::type_name::<T>()));
    }

    /// Resolve `T`, constructing and caching it on first use (§4.1).
    ///
    /// Fails with [`ContainerError::NoConstructor`] if nothing is registered
    /// for `T`, or [`ContainerError::Cycle`] if `T` is already on the
    /// current thread's resolution path.
    pub fn resolve<T: Any + Send + Sync + 'static>(&self) -> Result<Arc<T>, ContainerError> {
        let type_id = TypeId::of::<T>();

        if let Some(existing) = self.instances.read().expect("container instance cache poisoned").get(&type_id) {
            return downcast(existing.clone());
        }

        let on_stack = RESOLUTION_STACK.with(|stack| stack.borrow().contains(&type_id));
        if on_stack {
            return Err(ContainerError::Cycle {
                type_name: std::any::type_name::<T>(),
            });
        }

        let (ctor, type_name) = self
            .constructors
            .read()
            .expect("container constructor table poisoned")
            .get(&type_id)
            .cloned()
            .ok_or(ContainerError::NoConstructor {
                type_name: std::any::type_name::<T>(),
            })?;

        RESOLUTION_STACK.with(|stack| stack.borrow_mut().push(type_id));
        trace!(component = type_name, "resolving component");
        let built = ctor(self);
        RESOLUTION_STACK.with(|stack| {
            let mut stack = stack.borrow_mut();
            debug_assert_eq!(stack.last().copied(), Some(type_id));
            stack.pop();
        });

        let instance = built?;
        self.instances
            .write()
            .expect("container instance cache poisoned")
            .entry(type_id)
            .or_insert(instance);

        downcast(
            self.instances
                .read()
                .expect("container instance cache poisoned")[&type_id]
                .clone(),
        )
    }

    /// Eagerly resolve every registered component, surfacing boot-time
    /// errors (cycles, missing dependencies) before traffic is accepted
    /// (§8: "Boot errors ... fatal"). Components with no meaningful
    /// "warm-up" beyond resolution itself are unaffected by calling this.
    pub fn warm_up(&self) -> Result<(), ContainerError> {
        let registered: Vec<TypeId> = self
            .constructors
            .read()
            .expect("container constructor table poisoned")
            .keys()
            .copied()
            .collect();
        for type_id in registered {
            if self.instances.read().expect("container instance cache poisoned").contains_key(&type_id) {
                continue;
            }
            let (ctor, _) = self
                .constructors
                .read()
                .expect("container constructor table poisoned")
                .get(&type_id)
                .cloned()
                .expect("type_id came from this same table");
            let instance = ctor(self)?;
            self.instances
                .write()
                .expect("container instance cache poisoned")
                .entry(type_id)
                .or_insert(instance);
        }
        Ok(())
    }
}

fn downcast<T: Any + Send + Sync + 'static>(value: Arc<dyn Any + Send + Sync>) -> Result<Arc<T>, ContainerError> {
    value.downcast::<T>().map_err(|_| ContainerError::InvalidConstructor {
        type_name: std::any::type_name::<T>(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    struct A(u32);
    struct B(u32);

    #[test]
    fn resolves_and_caches_singleton() {
        let container = Container::new();
        container.register::<A, _>(|_| Ok(A(1)));
        let first = container.resolve::<A>().unwrap();
        let second = container.resolve::<A>().unwrap();
        assert!(Arc::ptr_eq(&first, &second));
    }

    #[test]
    fn resolves_transitive_dependency() {
        let container = Container::new();
        container.register::<A, _>(|_| Ok(A(7)));
        container.register::<B, _>(|c| {
            let a = c.resolve::<A>()?;
            Ok(B(a.0 * 2))
        });
        let b = container.resolve::<B>().unwrap();
        assert_eq!(b.0, 14);
    }

    #[test]
    fn missing_constructor_errors() {
        let container = Container::new();
        let err = container.resolve::<A>().unwrap_err();
        assert!(matches!(err, ContainerError::NoConstructor { .. }));
    }

    #[test]
    fn cyclic_constructors_error() {
        let container = Container::new();
        container.register::<A, _>(|c| {
            let _ = c.resolve::<B>()?;
            Ok(A(0))
        });
        container.register::<B, _>(|c| {
            let _ = c.resolve::<A>()?;
            Ok(B(0))
        });
        let err = container.resolve::<A>().unwrap_err();
        assert!(matches!(err, ContainerError::Cycle { .. }));
    }
}
