use parking_lot::RwLock;
use std::collections::{HashMap, HashSet};
use tracing::debug;

use crate::{
    any::BeanRef,
    errors::{RegistrationErrorKind, ResolveErrorKind},
    lifecycle::DisposableAdapter,
    lock::ReentrantCell,
};

/// Deferred producer of an early reference to a singleton in creation
pub type EarlyReferenceFactory = Box<dyn FnOnce() -> Result<BeanRef, ResolveErrorKind> + Send>;

#[derive(Default)]
pub(crate) struct SingletonState {
    /// Raw instances exposed to break cycles
    early: HashMap<String, BeanRef>,
    /// Producers of early references, drained into `early` on first lookup
    factories: HashMap<String, EarlyReferenceFactory>,
    registered: Vec<String>,
    in_creation: HashSet<String>,
    suppressed: Option<Vec<ResolveErrorKind>>,
    in_destruction: bool,
    disposables: Vec<(String, DisposableAdapter)>,
    /// Containing bean -> inner beans
    contained: HashMap<String, Vec<String>>,
    /// Bean -> beans depending on it
    dependents: HashMap<String, Vec<String>>,
    /// Bean -> beans it depends on
    dependencies: HashMap<String, Vec<String>>,
    /// Objects made by singleton producers, keyed by the producer's name
    pub(crate) factory_objects: HashMap<String, BeanRef>,
}

enum EarlyLookup {
    Found(BeanRef),
    Factory(EarlyReferenceFactory),
    Absent,
}

fn push_unique(names: &mut Vec<String>, name: &str) {
    if !names.iter().any(|registered| registered == name) {
        names.push(name.to_owned());
    }
}

/// Three-tier singleton cache with creation tracking, the dependency graph and destruction order.
///
/// Finished singletons are read without the creation lock.
/// Everything else goes through one reentrant lock, held by a creating thread for the whole creation,
/// including the nested creations of the dependencies.
pub struct SingletonRegistry {
    objects: RwLock<HashMap<String, BeanRef>>,
    pub(crate) state: ReentrantCell<SingletonState>,
    suppressed_errors_limit: usize,
}

impl SingletonRegistry {
    #[inline]
    #[must_use]
    pub fn new(suppressed_errors_limit: usize) -> Self {
        Self {
            objects: RwLock::new(HashMap::new()),
            state: ReentrantCell::new(SingletonState::default()),
            suppressed_errors_limit,
        }
    }

    /// # Errors
    /// Returns [`RegistrationErrorKind::AlreadyRegistered`] if a finished singleton with the name already exists
    pub fn register_singleton(&self, name: &str, bean: BeanRef) -> Result<(), RegistrationErrorKind> {
        let _guard = self.state.lock();
        if self.objects.read().contains_key(name) {
            return Err(RegistrationErrorKind::AlreadyRegistered { name: name.to_owned() });
        }
        self.add_singleton(name, bean);
        Ok(())
    }

    /// Returns the finished singleton or, while it's in creation, its early reference.
    /// With `allow_early_reference`, a registered early reference factory is called and drained into the early references.
    ///
    /// # Errors
    /// Returns the error of the early reference factory
    pub fn get_singleton(&self, name: &str, allow_early_reference: bool) -> Result<Option<BeanRef>, ResolveErrorKind> {
        if let Some(bean) = self.objects.read().get(name) {
            return Ok(Some(bean.clone()));
        }

        let _guard = self.state.lock();
        if let Some(bean) = self.objects.read().get(name) {
            return Ok(Some(bean.clone()));
        }

        let lookup = self.state.with(|state| {
            if !state.in_creation.contains(name) {
                return EarlyLookup::Absent;
            }
            if let Some(bean) = state.early.get(name) {
                return EarlyLookup::Found(bean.clone());
            }
            if !allow_early_reference {
                return EarlyLookup::Absent;
            }
            state.factories.remove(name).map_or(EarlyLookup::Absent, EarlyLookup::Factory)
        });

        match lookup {
            EarlyLookup::Found(bean) => Ok(Some(bean)),
            EarlyLookup::Absent => Ok(None),
            EarlyLookup::Factory(factory) => {
                let bean = factory()?;
                self.state.with(|state| state.early.insert(name.to_owned(), bean.clone()));

                debug!(name, "Early reference exposed");
                Ok(Some(bean))
            }
        }
    }

    /// Returns the finished singleton, creating it with `producer` first if needed.
    ///
    /// The name is marked in creation while the producer runs.
    /// If the producer fails, the name is evicted from every tier and
    /// errors suppressed during the creation are attached to the returned one.
    ///
    /// # Errors
    /// - Returns [`ResolveErrorKind::SingletonsInDestruction`] if singletons are being destroyed
    /// - Returns [`ResolveErrorKind::CurrentlyInCreation`] if the name is already in creation
    /// - Returns the error of the producer
    pub fn get_singleton_with(
        &self,
        name: &str,
        producer: impl FnOnce() -> Result<BeanRef, ResolveErrorKind>,
    ) -> Result<BeanRef, ResolveErrorKind> {
        let _guard = self.state.lock();
        if let Some(bean) = self.objects.read().get(name) {
            return Ok(bean.clone());
        }

        let record_suppressed = self.state.with(|state| {
            if state.in_destruction {
                return Err(ResolveErrorKind::SingletonsInDestruction { name: name.to_owned() });
            }
            if !state.in_creation.insert(name.to_owned()) {
                return Err(ResolveErrorKind::in_creation(name));
            }
            let record_suppressed = state.suppressed.is_none();
            if record_suppressed {
                state.suppressed = Some(Vec::new());
            }
            Ok(record_suppressed)
        })?;

        debug!(name, "Creating singleton");
        let result = producer();

        let suppressed = self.state.with(|state| {
            state.in_creation.remove(name);
            if record_suppressed {
                state.suppressed.take()
            } else {
                None
            }
        });

        match result {
            Ok(bean) => {
                self.add_singleton(name, bean.clone());
                debug!(name, "Singleton created");
                Ok(bean)
            }
            Err(mut err) => {
                self.remove_singleton(name);
                if let Some(suppressed) = suppressed {
                    err.attach_related(suppressed);
                }
                Err(err)
            }
        }
    }

    /// Runs `f` holding the registry lock, like a singleton creation does
    pub(crate) fn with_creation_lock<R>(&self, f: impl FnOnce() -> R) -> R {
        let _guard = self.state.lock();
        f()
    }

    /// Registers a producer of the early reference, unless the singleton is already finished
    pub fn add_singleton_factory(&self, name: &str, factory: impl FnOnce() -> Result<BeanRef, ResolveErrorKind> + Send + 'static) {
        let _guard = self.state.lock();
        if self.objects.read().contains_key(name) {
            return;
        }
        self.state.with(|state| {
            state.factories.insert(name.to_owned(), Box::new(factory));
            state.early.remove(name);
        });
    }

    #[inline]
    #[must_use]
    pub fn contains_singleton(&self, name: &str) -> bool {
        self.objects.read().contains_key(name)
    }

    /// Names of finished singletons in registration order
    #[must_use]
    pub fn singleton_names(&self) -> Vec<String> {
        self.state.with(|state| state.registered.clone())
    }

    #[must_use]
    pub fn is_currently_in_creation(&self, name: &str) -> bool {
        self.state.with(|state| state.in_creation.contains(name))
    }

    /// Records an error that didn't fail the current creation,
    /// to be attached to the creation failure if one follows.
    pub fn on_suppressed_error(&self, err: ResolveErrorKind) {
        self.state.with(|state| {
            if let Some(suppressed) = state.suppressed.as_mut() {
                if suppressed.len() < self.suppressed_errors_limit {
                    suppressed.push(err);
                }
            }
        });
    }

    /// Records that `dependent` depends on `name`, so `dependent` is destroyed before it
    pub fn register_dependent(&self, name: &str, dependent: &str) {
        self.state.with(|state| {
            push_unique(state.dependents.entry(name.to_owned()).or_default(), dependent);
            push_unique(state.dependencies.entry(dependent.to_owned()).or_default(), name);
        });
    }

    /// Records `contained` as an inner bean of `containing`, destroyed along with it
    pub fn register_contained(&self, contained: &str, containing: &str) {
        self.state.with(|state| {
            push_unique(state.contained.entry(containing.to_owned()).or_default(), contained);
        });
        self.register_dependent(contained, containing);
    }

    /// Whether `dependent` depends on `name`, directly or transitively
    #[must_use]
    pub fn is_dependent(&self, name: &str, dependent: &str) -> bool {
        self.state.with(|state| {
            let mut seen = HashSet::new();
            let mut pending = vec![name];
            while let Some(current) = pending.pop() {
                if !seen.insert(current) {
                    continue;
                }
                let Some(dependents) = state.dependents.get(current) else {
                    continue;
                };
                if dependents.iter().any(|registered| registered == dependent) {
                    return true;
                }
                pending.extend(dependents.iter().map(String::as_str));
            }
            false
        })
    }

    #[must_use]
    pub fn dependents_of(&self, name: &str) -> Vec<String> {
        self.state.with(|state| state.dependents.get(name).cloned().unwrap_or_default())
    }

    #[must_use]
    pub fn dependencies_of(&self, name: &str) -> Vec<String> {
        self.state.with(|state| state.dependencies.get(name).cloned().unwrap_or_default())
    }

    /// Destroys the singleton after every bean depending on it, then its inner beans
    pub fn destroy_singleton(&self, name: &str) {
        self.remove_singleton(name);
        let adapter = self.state.with(|state| {
            let index = state.disposables.iter().position(|(registered, _)| registered == name)?;
            Some(state.disposables.remove(index).1)
        });
        self.destroy_bean(name, adapter);
    }

    /// Destroys all singletons in reverse registration order of their destruction callbacks and clears every tier.
    /// Creating singletons meanwhile fails with [`ResolveErrorKind::SingletonsInDestruction`].
    pub fn destroy_singletons(&self) {
        let names: Vec<String> = self.state.with(|state| {
            state.in_destruction = true;
            state.disposables.iter().map(|(name, _)| name.clone()).collect()
        });
        debug!(count = names.len(), "Destroying singletons");

        for name in names.iter().rev() {
            self.destroy_singleton(name);
        }

        let _guard = self.state.lock();
        self.objects.write().clear();
        self.state.with(|state| {
            state.early.clear();
            state.factories.clear();
            state.registered.clear();
            state.contained.clear();
            state.dependents.clear();
            state.dependencies.clear();
            state.factory_objects.clear();
            state.in_destruction = false;
        });
    }
}

impl SingletonRegistry {
    pub(crate) fn add_singleton(&self, name: &str, bean: BeanRef) {
        let _guard = self.state.lock();
        self.objects.write().insert(name.to_owned(), bean);
        self.state.with(|state| {
            state.early.remove(name);
            state.factories.remove(name);
            push_unique(&mut state.registered, name);
        });
    }

    pub(crate) fn remove_singleton(&self, name: &str) {
        let _guard = self.state.lock();
        self.objects.write().remove(name);
        self.state.with(|state| {
            state.early.remove(name);
            state.factories.remove(name);
            state.registered.retain(|registered| registered != name);
            state.factory_objects.remove(name);
        });
    }

    pub(crate) fn register_disposable(&self, adapter: DisposableAdapter) {
        let name = adapter.name().to_owned();
        self.state.with(|state| match state.disposables.iter_mut().find(|(registered, _)| *registered == name) {
            Some((_, registered)) => *registered = adapter,
            None => state.disposables.push((name, adapter)),
        });
    }

    /// # Errors
    /// Returns [`ResolveErrorKind::CurrentlyInCreation`] if the name is already in creation
    pub(crate) fn before_creation(&self, name: &str) -> Result<(), ResolveErrorKind> {
        self.state.with(|state| {
            if state.in_creation.insert(name.to_owned()) {
                Ok(())
            } else {
                Err(ResolveErrorKind::in_creation(name))
            }
        })
    }

    pub(crate) fn after_creation(&self, name: &str) {
        self.state.with(|state| state.in_creation.remove(name));
    }

    #[inline]
    #[must_use]
    pub(crate) fn has_dependents(&self, name: &str) -> bool {
        self.state.with(|state| state.dependents.get(name).is_some_and(|dependents| !dependents.is_empty()))
    }

    fn destroy_bean(&self, name: &str, adapter: Option<DisposableAdapter>) {
        // Removed before recursing, so dependency cycles end
        let dependents = self.state.with(|state| state.dependents.remove(name)).unwrap_or_default();
        for dependent in &dependents {
            self.destroy_singleton(dependent);
        }

        if let Some(adapter) = adapter {
            debug!(name, "Destroying bean");
            adapter.destroy();
        }

        let contained = self.state.with(|state| state.contained.remove(name)).unwrap_or_default();
        for inner in &contained {
            self.destroy_singleton(inner);
        }

        self.state.with(|state| {
            state.dependents.retain(|_, dependents| {
                dependents.retain(|dependent| dependent != name);
                !dependents.is_empty()
            });
            state.dependencies.remove(name);
        });
    }
}
