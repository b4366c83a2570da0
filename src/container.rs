use parking_lot::RwLock;
use std::{
    any::type_name,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
};
use tracing::{debug, error, info_span};

use crate::{
    any::{BeanRef, NullBean, TypeInfo},
    config::Config,
    definition::{BeanDefinition, BeanKind},
    dependency_resolver::{DependencyDescriptor, DependencyResolver, TypeMatchingResolver},
    errors::{DefinitionErrorKind, RegistrationErrorKind, ResolveErrorKind},
    factory_bean::PostProcess,
    instantiator::Args,
    lifecycle::DisposableAdapter,
    merged::{MergeContext, MergedDefinition, MergedDefinitions},
    processor::{BeanPostProcessor, Processors},
    registry::{DefinitionSource as _, Registry},
    scope::{PrototypeCreationGuard, Scope, ScopeRegistry},
    singleton::SingletonRegistry,
};

static NEXT_CONTAINER_ID: AtomicU64 = AtomicU64::new(0);

/// Prefix of a name that asks for a factory bean itself instead of the object it produces
pub const FACTORY_BEAN_PREFIX: char = '&';

#[inline]
#[must_use]
fn is_factory_dereference(name: &str) -> bool {
    name.starts_with(FACTORY_BEAN_PREFIX)
}

/// Bean container: looks beans up by name or type, creating and caching them according to their definitions.
///
/// Clones share the same state. Singletons are destroyed when the last clone is dropped.
#[derive(Clone)]
pub struct Container {
    pub(crate) inner: Arc<ContainerInner>,
}

pub(crate) struct ContainerInner {
    pub(crate) id: u64,
    pub(crate) config: Config,
    pub(crate) registry: RwLock<Registry>,
    pub(crate) merged: MergedDefinitions,
    pub(crate) singletons: SingletonRegistry,
    pub(crate) scopes: ScopeRegistry,
    pub(crate) processors: RwLock<Processors>,
    pub(crate) resolver: RwLock<Arc<dyn DependencyResolver>>,
    pub(crate) parent: Option<Container>,
}

impl Container {
    #[inline]
    #[must_use]
    pub fn new(registry: Registry) -> Self {
        Self::new_with_config(registry, Config::default())
    }

    #[inline]
    #[must_use]
    pub fn new_with_config(registry: Registry, config: Config) -> Self {
        Self::build(registry, config, None)
    }

    /// Creates a container whose lookups fall back to `parent` for names it doesn't define.
    /// Child definitions may also inherit from definitions of the parent.
    #[inline]
    #[must_use]
    pub fn new_with_parent(registry: Registry, config: Config, parent: Container) -> Self {
        Self::build(registry, config, Some(parent))
    }

    fn build(mut registry: Registry, config: Config, parent: Option<Container>) -> Self {
        registry.set_allow_overriding(config.allow_definition_overriding);
        Self {
            inner: Arc::new(ContainerInner {
                id: NEXT_CONTAINER_ID.fetch_add(1, Ordering::Relaxed),
                config,
                registry: RwLock::new(registry),
                merged: MergedDefinitions::default(),
                singletons: SingletonRegistry::new(config.suppressed_errors_limit),
                scopes: ScopeRegistry::default(),
                processors: RwLock::new(Processors::default()),
                resolver: RwLock::new(Arc::new(TypeMatchingResolver) as Arc<dyn DependencyResolver>),
                parent,
            }),
        }
    }

    /// Gets a bean by name or alias.
    ///
    /// A name prefixed with `&` returns the factory bean itself instead of its product.
    ///
    /// # Errors
    /// - Returns [`ResolveErrorKind::NoSuchDefinition`] if neither this container nor its parents define the name
    /// - Returns [`ResolveErrorKind::CurrentlyInCreation`] if the lookup closes an unresolvable cycle
    /// - Returns [`ResolveErrorKind::Creation`] if the bean or one of its dependencies can't be created
    /// - Returns [`ResolveErrorKind::UnknownScope`] or [`ResolveErrorKind::ScopeNotActive`] for unavailable custom scopes
    /// - Returns [`ResolveErrorKind::NotAFactory`] if a `&` name isn't a factory bean
    #[inline]
    pub fn get_bean(&self, name: &str) -> Result<BeanRef, ResolveErrorKind> {
        self.do_get_bean(name, None)
    }

    /// Gets a bean created with explicit constructor arguments.
    /// An existing singleton is returned as is, the arguments only apply to a new instance.
    ///
    /// # Errors
    /// Same as [`Container::get_bean`]
    #[inline]
    pub fn get_bean_with_args(&self, name: &str, args: Args) -> Result<BeanRef, ResolveErrorKind> {
        self.do_get_bean(name, Some(&args))
    }

    /// Gets a bean by name, downcast to `T`.
    ///
    /// # Errors
    /// - Returns [`ResolveErrorKind::NullBean`] if the bean was produced as null
    /// - Returns [`ResolveErrorKind::NotOfRequiredType`] if the bean isn't a `T`
    /// - Otherwise same as [`Container::get_bean`]
    pub fn get<T: Send + Sync + 'static>(&self, name: &str) -> Result<Arc<T>, ResolveErrorKind> {
        match self.get_optional(name)? {
            Some(bean) => Ok(bean),
            None => Err(ResolveErrorKind::NullBean { name: name.to_owned() }),
        }
    }

    /// Like [`Container::get`], but a bean produced as null is `None`
    ///
    /// # Errors
    /// Same as [`Container::get`]
    pub fn get_optional<T: Send + Sync + 'static>(&self, name: &str) -> Result<Option<Arc<T>>, ResolveErrorKind> {
        let bean = self.get_bean(name)?;
        if NullBean::is(&bean) {
            return Ok(None);
        }
        bean.downcast::<T>().map(Some).map_err(|_| {
            let err = ResolveErrorKind::NotOfRequiredType {
                name: name.to_owned(),
                expected: type_name::<T>(),
            };
            error!("{}", err);
            err
        })
    }

    /// Gets the single bean of type `T`, picked by the dependency resolver.
    ///
    /// # Errors
    /// - Returns [`ResolveErrorKind::NoCandidate`] or [`ResolveErrorKind::NoUniqueCandidate`] if no single bean matches
    /// - Otherwise same as [`Container::get`]
    pub fn get_by_type<T: Send + Sync + 'static>(&self) -> Result<Arc<T>, ResolveErrorKind> {
        let resolver = self.inner.resolver.read().clone();
        match resolver.resolve_candidate(&DependencyDescriptor::of::<T>(), None, self)? {
            Some(name) => self.get(&name),
            None => Err(ResolveErrorKind::NoCandidate { expected: type_name::<T>() }),
        }
    }

    /// Whether the name is known here or in a parent, as a definition or a registered singleton
    #[must_use]
    pub fn contains_bean(&self, name: &str) -> bool {
        let canonical = self.transformed_name(name);
        if self.inner.singletons.contains_singleton(&canonical) || self.contains_definition(&canonical) {
            return !is_factory_dereference(name) || self.is_factory_bean(&canonical);
        }
        self.inner.parent.as_ref().is_some_and(|parent| parent.contains_bean(name))
    }

    /// Whether this container itself holds a definition registered under the name, aliases aren't resolved
    #[inline]
    #[must_use]
    pub fn contains_definition(&self, name: &str) -> bool {
        self.inner.registry.read().contains_definition(name)
    }

    /// # Errors
    /// - Returns [`ResolveErrorKind::NoSuchDefinition`] if the name is unknown
    /// - Returns the error of creating the factory bean if it has to be looked up
    pub fn is_singleton(&self, name: &str) -> Result<bool, ResolveErrorKind> {
        let canonical = self.transformed_name(name);
        let deref = is_factory_dereference(name);

        if let Some(bean) = self.inner.singletons.get_singleton(&canonical, false)? {
            return match self.local_merged_if_defined(&canonical)?.as_deref().map(|merged| &merged.kind) {
                Some(BeanKind::Producer(access)) if !deref => Ok(access.is_singleton(&bean)?),
                _ => Ok(true),
            };
        }
        if let Some(parent) = self.delegating_parent(&canonical) {
            return parent.is_singleton(name);
        }

        let merged = self.local_merged_definition(&canonical)?;
        if !merged.is_singleton() {
            return Ok(false);
        }
        match &merged.kind {
            BeanKind::Producer(access) if !deref => {
                let producer = self.get_bean(&format!("{FACTORY_BEAN_PREFIX}{canonical}"))?;
                Ok(access.is_singleton(&producer)?)
            }
            _ => Ok(true),
        }
    }

    /// # Errors
    /// Same as [`Container::is_singleton`]
    pub fn is_prototype(&self, name: &str) -> Result<bool, ResolveErrorKind> {
        let canonical = self.transformed_name(name);
        let deref = is_factory_dereference(name);

        if let Some(parent) = self.delegating_parent(&canonical) {
            return parent.is_prototype(name);
        }

        let merged = self.local_merged_definition(&canonical)?;
        if merged.is_prototype() {
            return Ok(!deref || merged.is_factory_bean());
        }
        if deref {
            return Ok(false);
        }
        match &merged.kind {
            BeanKind::Producer(access) => {
                let producer = self.get_bean(&format!("{FACTORY_BEAN_PREFIX}{canonical}"))?;
                Ok(!access.is_singleton(&producer)?)
            }
            BeanKind::Plain => Ok(false),
        }
    }

    /// Whether the bean looked up by the name would be a `T`, without creating it
    ///
    /// # Errors
    /// - Returns [`ResolveErrorKind::NoSuchDefinition`] if the name is unknown
    pub fn is_type_match<T: ?Sized + 'static>(&self, name: &str) -> Result<bool, ResolveErrorKind> {
        self.is_type_match_info(name, TypeInfo::of::<T>())
    }

    fn is_type_match_info(&self, name: &str, type_info: TypeInfo) -> Result<bool, ResolveErrorKind> {
        let canonical = self.transformed_name(name);

        if let Some(bean) = self.inner.singletons.get_singleton(&canonical, false)? {
            if NullBean::is(&bean) {
                return Ok(false);
            }
            if let Some(BeanKind::Producer(access)) = self.local_merged_if_defined(&canonical)?.as_deref().map(|merged| &merged.kind) {
                if !is_factory_dereference(name) {
                    return Ok(access.object_type() == type_info);
                }
            }
            return Ok(type_info.matches(&bean));
        }
        Ok(self.type_of(name)? == Some(type_info))
    }

    /// Type of the bean looked up by the name, as declared by its definition.
    /// Singletons registered without definition have no known type.
    ///
    /// # Errors
    /// Returns [`ResolveErrorKind::NoSuchDefinition`] if the name is unknown
    pub fn type_of(&self, name: &str) -> Result<Option<TypeInfo>, ResolveErrorKind> {
        let canonical = self.transformed_name(name);

        if self.contains_definition(&canonical) {
            let merged = self.local_merged_definition(&canonical)?;
            return Ok(match &merged.kind {
                BeanKind::Producer(access) if !is_factory_dereference(name) => Some(access.object_type()),
                _ => merged.bean_type,
            });
        }
        if let Some(parent) = self.delegating_parent(&canonical) {
            return parent.type_of(name);
        }
        if self.inner.singletons.contains_singleton(&canonical) {
            return Ok(None);
        }
        Err(ResolveErrorKind::NoSuchDefinition { name: canonical })
    }

    /// Names of the beans of type `T`, in registration order, including those of parent containers
    #[inline]
    #[must_use]
    pub fn bean_names_for_type<T: ?Sized + 'static>(&self) -> Vec<String> {
        self.bean_names_for_type_info(TypeInfo::of::<T>(), true)
    }

    /// Factory beans match by their product under their name, and by their own type under the `&` name.
    /// Abstract definitions and definitions that fail to merge are skipped.
    /// A name defined here hides the same name of a parent.
    pub(crate) fn bean_names_for_type_info(&self, type_info: TypeInfo, include_ancestors: bool) -> Vec<String> {
        let mut names = Vec::new();

        for name in self.definition_names() {
            let Ok(merged) = self.local_merged_definition(&name) else {
                continue;
            };
            if merged.is_abstract() {
                continue;
            }
            match &merged.kind {
                BeanKind::Producer(access) if access.object_type() == type_info => names.push(name),
                BeanKind::Producer(_) if merged.bean_type == Some(type_info) => names.push(format!("{FACTORY_BEAN_PREFIX}{name}")),
                BeanKind::Plain if merged.bean_type == Some(type_info) => names.push(name),
                _ => {}
            }
        }

        for name in self.inner.singletons.singleton_names() {
            if self.contains_definition(&name) {
                continue;
            }
            if let Ok(Some(bean)) = self.inner.singletons.get_singleton(&name, false) {
                if type_info.matches(&bean) {
                    names.push(name);
                }
            }
        }

        if include_ancestors {
            if let Some(parent) = &self.inner.parent {
                for name in parent.bean_names_for_type_info(type_info, true) {
                    let local = name.trim_start_matches(FACTORY_BEAN_PREFIX);
                    if !self.contains_definition(local) && !self.inner.singletons.contains_singleton(local) {
                        names.push(name);
                    }
                }
            }
        }
        names
    }

    #[must_use]
    pub(crate) fn is_primary(&self, name: &str) -> bool {
        let canonical = self.transformed_name(name);
        if let Some(parent) = self.delegating_parent(&canonical) {
            return parent.is_primary(name);
        }
        self.local_merged_definition(&canonical).is_ok_and(|merged| merged.is_primary())
    }

    #[must_use]
    pub(crate) fn is_autowire_candidate(&self, name: &str) -> bool {
        let canonical = self.transformed_name(name);
        if let Some(parent) = self.delegating_parent(&canonical) {
            return parent.is_autowire_candidate(name);
        }
        self.local_merged_definition(&canonical).map_or(true, |merged| merged.is_autowire_candidate())
    }

    /// Names of the definitions of this container, in registration order
    #[inline]
    #[must_use]
    pub fn definition_names(&self) -> Vec<String> {
        self.inner.registry.read().definition_names()
    }

    /// Aliases of the name, local to this container
    #[inline]
    #[must_use]
    pub fn aliases(&self, name: &str) -> Vec<String> {
        self.inner.registry.read().aliases(name.trim_start_matches(FACTORY_BEAN_PREFIX))
    }

    /// Name the alias chain of `name` ends at. The `&` prefix is kept.
    #[must_use]
    pub fn canonical_name(&self, name: &str) -> String {
        let canonical = self.transformed_name(name);
        if name.starts_with(FACTORY_BEAN_PREFIX) {
            return format!("{FACTORY_BEAN_PREFIX}{canonical}");
        }
        canonical
    }

    /// Registers or replaces a definition.
    /// A replaced definition's merged view is dropped and its singleton destroyed, along with beans depending on it.
    ///
    /// # Errors
    /// - Returns [`RegistrationErrorKind::Frozen`] if the configuration is frozen
    /// - Returns [`RegistrationErrorKind::DefinitionOverride`] if the name is taken and overriding is disabled
    pub fn register_definition(&self, name: impl Into<String>, definition: BeanDefinition) -> Result<(), RegistrationErrorKind> {
        let name = name.into();
        let replaced = self.inner.registry.write().register_definition(name.clone(), definition)?;
        debug!(%name, "Definition registered");

        if replaced.is_some() || self.inner.singletons.contains_singleton(&name) {
            self.reset_bean_definition(&name);
        }
        Ok(())
    }

    /// # Errors
    /// - Returns [`ResolveErrorKind::NoSuchDefinition`] if there is no definition with the name
    /// - Returns [`RegistrationErrorKind::Frozen`] if the configuration is frozen
    pub fn remove_definition(&self, name: &str) -> Result<(), ResolveErrorKind> {
        if self.inner.registry.write().remove_definition(name)?.is_none() {
            return Err(ResolveErrorKind::NoSuchDefinition { name: name.to_owned() });
        }
        debug!(name, "Definition removed");

        self.reset_bean_definition(name);
        Ok(())
    }

    fn reset_bean_definition(&self, name: &str) {
        self.inner.merged.invalidate(name);
        self.inner.singletons.destroy_singleton(name);
    }

    /// # Errors
    /// - Returns [`RegistrationErrorKind::AliasCycle`] if the alias would resolve back to itself
    /// - Returns [`RegistrationErrorKind::AliasOverride`] if the alias is taken and overriding is disabled
    #[inline]
    pub fn register_alias(&self, name: impl Into<String>, alias: impl Into<String>) -> Result<(), RegistrationErrorKind> {
        self.inner.registry.write().register_alias(name, alias)
    }

    /// Registers a ready-made singleton, bypassing the creation pipeline.
    ///
    /// # Errors
    /// Returns [`RegistrationErrorKind::AlreadyRegistered`] if a singleton with the name exists
    #[inline]
    pub fn register_singleton(&self, name: &str, bean: BeanRef) -> Result<(), RegistrationErrorKind> {
        self.inner.singletons.register_singleton(name, bean)
    }

    /// # Errors
    /// Returns [`RegistrationErrorKind::ReservedScope`] for the built-in scope names
    pub fn register_scope(&self, name: &str, scope: Arc<dyn Scope>) -> Result<(), RegistrationErrorKind> {
        if self.inner.scopes.register(name, scope)?.is_some() {
            debug!(scope = name, "Scope replaced");
        }
        Ok(())
    }

    #[inline]
    #[must_use]
    pub fn registered_scope_names(&self) -> Vec<String> {
        self.inner.scopes.names()
    }

    /// Adds a post-processor applied to beans created from now on
    pub fn add_post_processor(&self, processor: impl BeanPostProcessor) {
        let mut processors = self.inner.processors.write();
        *processors = processors.with(Arc::new(processor));
    }

    /// Replaces the resolver used for autowired values and [`Container::get_by_type`]
    pub fn set_dependency_resolver(&self, resolver: impl DependencyResolver) {
        *self.inner.resolver.write() = Arc::new(resolver);
    }

    /// Rejects further definition changes
    #[inline]
    pub fn freeze_configuration(&self) {
        self.inner.registry.write().freeze();
    }

    #[inline]
    #[must_use]
    pub fn is_configuration_frozen(&self) -> bool {
        self.inner.registry.read().is_frozen()
    }

    /// Creates every non-abstract, non-lazy singleton in registration order.
    /// Objects of factory beans are created only if the factory asks for eager init.
    ///
    /// # Errors
    /// Returns the first creation error
    pub fn preinstantiate_singletons(&self) -> Result<(), ResolveErrorKind> {
        let span = info_span!("preinstantiate_singletons");
        let _guard = span.enter();

        for name in self.definition_names() {
            let merged = self.local_merged_definition(&name)?;
            if merged.is_abstract() || !merged.is_singleton() || merged.is_lazy_init() {
                continue;
            }

            match &merged.kind {
                BeanKind::Producer(access) => {
                    let producer = self.get_bean(&format!("{FACTORY_BEAN_PREFIX}{name}"))?;
                    if access.is_eager_init(&producer)? {
                        self.get_bean(&name)?;
                    }
                }
                BeanKind::Plain => {
                    self.get_bean(&name)?;
                }
            }
        }
        debug!("Singletons pre-instantiated");
        Ok(())
    }

    /// Destroys all singletons of this container, dependents before their dependencies.
    /// The container stays usable and creates singletons anew on lookup.
    #[inline]
    pub fn destroy_singletons(&self) {
        self.inner.singletons.destroy_singletons();
    }

    /// Runs the destruction callbacks of the definition on a bean, usually a prototype instance
    ///
    /// # Errors
    /// Returns [`ResolveErrorKind::NoSuchDefinition`] if the name is unknown
    pub fn destroy_bean(&self, name: &str, bean: BeanRef) -> Result<(), ResolveErrorKind> {
        let canonical = self.transformed_name(name);
        let merged = self.merged_definition(&canonical)?;
        self.destroy_bean_instance(&canonical, bean, &merged);
        Ok(())
    }

    /// Removes the bean from its custom scope and destroys it
    ///
    /// # Errors
    /// - Returns [`ResolveErrorKind::IllegalState`] if the bean isn't in a custom scope
    /// - Returns [`ResolveErrorKind::UnknownScope`] if its scope isn't registered
    pub fn destroy_scoped_bean(&self, name: &str) -> Result<(), ResolveErrorKind> {
        let canonical = self.transformed_name(name);
        let merged = self.merged_definition(&canonical)?;
        if merged.is_singleton() || merged.is_prototype() {
            return Err(ResolveErrorKind::IllegalState(format!(
                "Bean `{canonical}` has scope `{}` instead of a custom one",
                merged.scope()
            )));
        }

        let scope = self.inner.scopes.get(merged.scope()).ok_or_else(|| ResolveErrorKind::UnknownScope {
            scope: merged.scope().to_owned(),
            name: canonical.clone(),
        })?;
        if let Some(bean) = scope.remove(&canonical) {
            self.destroy_bean_instance(&canonical, bean, &merged);
        }
        Ok(())
    }

    fn destroy_bean_instance(&self, name: &str, bean: BeanRef, merged: &MergedDefinition) {
        let processors = self.inner.processors.read().clone();
        if let Some(adapter) = DisposableAdapter::new(
            name,
            bean,
            merged.destroy.clone(),
            merged.destroy_method.clone(),
            processors.as_slice(),
        ) {
            adapter.destroy();
        }
    }

    /// Definition of the name merged with its parent chain. Names unknown here are looked up in the parent container.
    ///
    /// # Errors
    /// - Returns [`ResolveErrorKind::NoSuchDefinition`] if the name is unknown
    /// - Returns [`ResolveErrorKind::Definition`] if its parent chain can't be resolved
    pub fn merged_definition(&self, name: &str) -> Result<Arc<MergedDefinition>, ResolveErrorKind> {
        let canonical = self.transformed_name(name);
        if let Some(parent) = self.delegating_parent(&canonical) {
            return parent.merged_definition(&canonical);
        }
        self.local_merged_definition(&canonical)
    }

    /// Drops the cached merge of the name, picking up changes of its parent definitions on next use
    #[inline]
    pub fn invalidate_merged_definition(&self, name: &str) {
        self.inner.merged.invalidate(&self.transformed_name(name));
    }

    #[inline]
    #[must_use]
    pub fn is_currently_in_creation(&self, name: &str) -> bool {
        let canonical = self.transformed_name(name);
        self.inner.singletons.is_currently_in_creation(&canonical) || PrototypeCreationGuard::is_in_creation(self.inner.id, &canonical)
    }

    #[inline]
    #[must_use]
    pub fn singleton_registry(&self) -> &SingletonRegistry {
        &self.inner.singletons
    }

    #[inline]
    #[must_use]
    pub fn parent(&self) -> Option<&Container> {
        self.inner.parent.as_ref()
    }

    #[inline]
    #[must_use]
    pub fn config(&self) -> &Config {
        &self.inner.config
    }
}

impl Container {
    fn do_get_bean(&self, requested: &str, args: Option<&Args>) -> Result<BeanRef, ResolveErrorKind> {
        let span = info_span!("get_bean", name = requested);
        let _guard = span.enter();

        let name = self.transformed_name(requested);

        if args.is_none() {
            if let Some(bean) = self.inner.singletons.get_singleton(&name, true)? {
                if self.inner.singletons.is_currently_in_creation(&name) {
                    debug!("Early reference of singleton in creation returned");
                } else {
                    debug!("Found in cache");
                }
                let merged = self.local_merged_if_defined(&name)?;
                return self
                    .object_for_bean_instance(bean, requested, &name, merged.as_deref())
                    .inspect_err(|err| error!("{}", err));
            }
        }

        if PrototypeCreationGuard::is_in_creation(self.inner.id, &name) {
            let err = ResolveErrorKind::in_creation(&name);
            error!("{}", err);
            return Err(err);
        }

        if let Some(parent) = self.delegating_parent(&name) {
            debug!("Delegated to parent container");
            let parent_name = if is_factory_dereference(requested) {
                format!("{FACTORY_BEAN_PREFIX}{name}")
            } else {
                name
            };
            return match args {
                Some(args) => parent.get_bean_with_args(&parent_name, args.clone()),
                None => parent.get_bean(&parent_name),
            };
        }

        self.inner.merged.mark_as_created(&name);
        match self.get_or_create(requested, &name, args) {
            Ok(bean) => Ok(bean),
            Err(err) => {
                self.inner.merged.unmark_as_created(&name);
                error!("{}", err);
                Err(err)
            }
        }
    }

    fn get_or_create(&self, requested: &str, name: &str, args: Option<&Args>) -> Result<BeanRef, ResolveErrorKind> {
        let merged = self.local_merged_definition(name)?;
        if merged.is_abstract() {
            return Err(DefinitionErrorKind::AbstractBean { name: name.to_owned() }.into());
        }

        for dependency in merged.depends_on() {
            let dependency = self.transformed_name(dependency);
            if self.inner.singletons.is_dependent(name, &dependency) {
                return Err(DefinitionErrorKind::CircularDependsOn {
                    name: name.to_owned(),
                    dependency,
                }
                .into());
            }
            self.inner.singletons.register_dependent(&dependency, name);
            self.get_bean(&dependency)
                .map_err(|err| ResolveErrorKind::creation(name, format!("Depends-on bean `{dependency}` couldn't be resolved"), err))?;
        }

        let bean = if merged.is_singleton() {
            self.inner.singletons.get_singleton_with(name, || {
                self.create_bean(name, &merged, args).inspect_err(|_| {
                    // Beans which got an early reference of the failed singleton are destroyed with it
                    self.inner.singletons.destroy_singleton(name);
                })
            })?
        } else if merged.is_prototype() {
            let _guard = PrototypeCreationGuard::enter(self.inner.id, name)?;
            self.create_bean(name, &merged, args)?
        } else {
            let scope = self.inner.scopes.get(merged.scope()).ok_or_else(|| ResolveErrorKind::UnknownScope {
                scope: merged.scope().to_owned(),
                name: name.to_owned(),
            })?;
            // Ordered after the singleton lock, as singleton creations reach scopes while holding it
            self.inner.singletons.with_creation_lock(|| {
                scope.get(name, &mut || {
                    let _guard = PrototypeCreationGuard::enter(self.inner.id, name)?;
                    self.create_bean(name, &merged, args)
                })
            })?
        };

        self.object_for_bean_instance(bean, requested, name, Some(&merged))
    }

    /// Returns the bean itself, or the object it produces if it's a factory bean looked up without `&`
    pub(crate) fn object_for_bean_instance(
        &self,
        bean: BeanRef,
        requested: &str,
        name: &str,
        merged: Option<&MergedDefinition>,
    ) -> Result<BeanRef, ResolveErrorKind> {
        let producer = merged.and_then(|merged| match &merged.kind {
            BeanKind::Producer(access) => Some((access, merged.synthetic)),
            BeanKind::Plain => None,
        });

        if is_factory_dereference(requested) {
            if NullBean::is(&bean) || producer.is_some() {
                return Ok(bean);
            }
            return Err(ResolveErrorKind::NotAFactory { name: name.to_owned() });
        }

        let Some((access, synthetic)) = producer else {
            return Ok(bean);
        };
        if NullBean::is(&bean) {
            return Ok(bean);
        }

        let post_process = |object: BeanRef| self.post_process_object_from_factory(object, name);
        let post_process: Option<PostProcess<'_>> = if synthetic { None } else { Some(&post_process) };
        self.inner
            .singletons
            .get_object_from_factory(name, &bean, access.as_ref(), post_process)
    }

    fn post_process_object_from_factory(&self, object: BeanRef, name: &str) -> Result<BeanRef, ResolveErrorKind> {
        let processors = self.inner.processors.read().clone();
        let object = processors.before_init(object, name)?;
        Ok(processors.after_init(object, name)?)
    }

    fn is_factory_bean(&self, name: &str) -> bool {
        if self.contains_definition(name) {
            return self.local_merged_definition(name).is_ok_and(|merged| merged.is_factory_bean());
        }
        match &self.inner.parent {
            Some(parent) if !self.inner.singletons.contains_singleton(name) => parent.is_factory_bean(name),
            _ => false,
        }
    }

    /// Parent container to ask for a name this container neither defines nor holds as a singleton
    fn delegating_parent(&self, name: &str) -> Option<&Container> {
        self.inner
            .parent
            .as_ref()
            .filter(|_| !self.contains_definition(name) && !self.inner.singletons.contains_singleton(name))
    }

    /// Strips the `&` prefix and resolves aliases
    pub(crate) fn transformed_name(&self, name: &str) -> String {
        let name = name.trim_start_matches(FACTORY_BEAN_PREFIX);
        self.inner.registry.read().canonical_name(name).to_owned()
    }

    pub(crate) fn with_merge_context<R>(&self, f: impl FnOnce(&MergeContext<'_>) -> R) -> R {
        let registry = self.inner.registry.read();
        let canonical_name = |name: &str| registry.canonical_name(name).to_owned();
        f(&MergeContext {
            source: &*registry,
            canonical_name: &canonical_name,
            parent: self.inner.parent.as_ref(),
            cache_metadata: self.inner.config.cache_bean_metadata,
        })
    }

    pub(crate) fn local_merged_definition(&self, name: &str) -> Result<Arc<MergedDefinition>, ResolveErrorKind> {
        if let Some(merged) = self.inner.merged.cached(name) {
            return Ok(merged);
        }
        self.with_merge_context(|ctx| self.inner.merged.get(name, ctx))
    }

    fn local_merged_if_defined(&self, name: &str) -> Result<Option<Arc<MergedDefinition>>, ResolveErrorKind> {
        if let Some(merged) = self.inner.merged.cached(name) {
            return Ok(Some(merged));
        }
        if !self.contains_definition(name) {
            return Ok(None);
        }
        self.local_merged_definition(name).map(Some)
    }
}

impl Drop for ContainerInner {
    fn drop(&mut self) {
        self.singletons.destroy_singletons();
        debug!("Container closed on drop");
    }
}
