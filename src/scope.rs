use parking_lot::{Mutex, ReentrantMutex, RwLock};
use std::{
    cell::RefCell,
    collections::{HashMap, HashSet},
    sync::Arc,
};
use tracing::debug;

use crate::{
    any::BeanRef,
    errors::{RegistrationErrorKind, ResolveErrorKind},
};

/// One shared instance per container, kept by the singleton registry
pub const SINGLETON: &str = "singleton";
/// New instance on every lookup, never cached
pub const PROTOTYPE: &str = "prototype";

pub type DestructionCallback = Box<dyn FnOnce() + Send>;

/// Storage strategy of a custom scope, e.g. per request or per session.
pub trait Scope: Send + Sync + 'static {
    /// Returns the scoped instance, calling `producer` to create it if the scope has none.
    ///
    /// # Errors
    /// - Returns [`ResolveErrorKind::ScopeNotActive`] if the scope can't hold instances right now
    /// - Returns the error of the producer
    fn get(&self, name: &str, producer: &mut dyn FnMut() -> Result<BeanRef, ResolveErrorKind>) -> Result<BeanRef, ResolveErrorKind>;

    /// Removes the instance along with its destruction callback, without calling it
    fn remove(&self, name: &str) -> Option<BeanRef>;

    /// Registers a callback to run when the scope ends
    fn register_destruction_callback(&self, name: &str, callback: DestructionCallback);
}

struct MapScopeState {
    active: bool,
    objects: HashMap<String, BeanRef>,
    callbacks: Vec<(String, DestructionCallback)>,
}

/// Map-backed custom scope, usable as a request or session store.
///
/// The scope ends with [`MapScope::close`] and holds no instances until [`MapScope::activate`].
/// Instances are created one at a time, so each name is produced once per scope lifetime.
pub struct MapScope {
    name: String,
    state: Mutex<MapScopeState>,
    // Reentrant: producing a bean may look up other beans of this scope on the same thread
    creation: ReentrantMutex<()>,
}

impl MapScope {
    #[inline]
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            state: Mutex::new(MapScopeState {
                active: true,
                objects: HashMap::new(),
                callbacks: Vec::new(),
            }),
            creation: ReentrantMutex::new(()),
        }
    }

    #[inline]
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[inline]
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.state.lock().active
    }

    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.state.lock().objects.len()
    }

    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Ends the scope: drops its instances and runs destruction callbacks in reverse registration order
    pub fn close(&self) {
        let callbacks = {
            let mut state = self.state.lock();
            state.active = false;
            state.objects.clear();
            std::mem::take(&mut state.callbacks)
        };
        debug!(scope = %self.name, count = callbacks.len(), "Closing scope");

        for (_, callback) in callbacks.into_iter().rev() {
            callback();
        }
    }

    #[inline]
    pub fn activate(&self) {
        self.state.lock().active = true;
    }
}

impl MapScope {
    fn lookup(&self, name: &str) -> Result<Option<BeanRef>, ResolveErrorKind> {
        let state = self.state.lock();
        if !state.active {
            return Err(ResolveErrorKind::ScopeNotActive {
                scope: self.name.clone(),
                name: name.to_owned(),
            });
        }
        Ok(state.objects.get(name).cloned())
    }
}

impl Scope for MapScope {
    fn get(&self, name: &str, producer: &mut dyn FnMut() -> Result<BeanRef, ResolveErrorKind>) -> Result<BeanRef, ResolveErrorKind> {
        if let Some(bean) = self.lookup(name)? {
            debug!(scope = %self.name, name, "Found in scope");
            return Ok(bean);
        }

        let _creation = self.creation.lock();
        // Another thread may have produced it while we waited
        if let Some(bean) = self.lookup(name)? {
            debug!(scope = %self.name, name, "Found in scope");
            return Ok(bean);
        }

        let bean = producer()?;
        self.state.lock().objects.insert(name.to_owned(), bean.clone());
        Ok(bean)
    }

    fn remove(&self, name: &str) -> Option<BeanRef> {
        let mut state = self.state.lock();
        state.callbacks.retain(|(registered, _)| registered != name);
        state.objects.remove(name)
    }

    fn register_destruction_callback(&self, name: &str, callback: DestructionCallback) {
        let mut state = self.state.lock();
        match state.callbacks.iter_mut().find(|(registered, _)| registered == name) {
            Some((_, registered)) => *registered = callback,
            None => state.callbacks.push((name.to_owned(), callback)),
        }
    }
}

/// Custom scopes of a container by name
#[derive(Default)]
pub(crate) struct ScopeRegistry {
    scopes: RwLock<HashMap<String, Arc<dyn Scope>>>,
}

impl ScopeRegistry {
    pub(crate) fn register(&self, name: &str, scope: Arc<dyn Scope>) -> Result<Option<Arc<dyn Scope>>, RegistrationErrorKind> {
        if name == SINGLETON || name == PROTOTYPE {
            return Err(RegistrationErrorKind::ReservedScope { name: name.to_owned() });
        }
        debug!(scope = name, "Scope registered");
        Ok(self.scopes.write().insert(name.to_owned(), scope))
    }

    #[inline]
    #[must_use]
    pub(crate) fn get(&self, name: &str) -> Option<Arc<dyn Scope>> {
        self.scopes.read().get(name).cloned()
    }

    #[must_use]
    pub(crate) fn names(&self) -> Vec<String> {
        let mut names: Vec<_> = self.scopes.read().keys().cloned().collect();
        names.sort_unstable();
        names
    }
}

thread_local! {
    /// Prototypes in creation on this thread, by container id and name
    static PROTOTYPES_IN_CREATION: RefCell<HashSet<(u64, String)>> = RefCell::new(HashSet::new());
}

/// Marks a prototype in creation on the current thread until dropped.
///
/// Creations on other threads are independent, so only same-thread cycles are rejected.
pub(crate) struct PrototypeCreationGuard {
    container: u64,
    name: String,
}

impl PrototypeCreationGuard {
    /// # Errors
    /// Returns [`ResolveErrorKind::CurrentlyInCreation`] if the prototype is already in creation on this thread
    pub(crate) fn enter(container: u64, name: &str) -> Result<Self, ResolveErrorKind> {
        let inserted = PROTOTYPES_IN_CREATION.with(|in_creation| in_creation.borrow_mut().insert((container, name.to_owned())));
        if !inserted {
            return Err(ResolveErrorKind::in_creation(name));
        }
        Ok(Self {
            container,
            name: name.to_owned(),
        })
    }

    #[must_use]
    pub(crate) fn is_in_creation(container: u64, name: &str) -> bool {
        PROTOTYPES_IN_CREATION.with(|in_creation| in_creation.borrow().contains(&(container, name.to_owned())))
    }
}

impl Drop for PrototypeCreationGuard {
    fn drop(&mut self) {
        let key = (self.container, std::mem::take(&mut self.name));
        PROTOTYPES_IN_CREATION.with(|in_creation| in_creation.borrow_mut().remove(&key));
    }
}
