use std::sync::Arc;
use tracing::{debug, error, info_span};

use crate::{
    any::{BeanList, BeanRef, NullBean},
    container::Container,
    definition::{BeanDefinition, Instantiation, PropertyValue, Value},
    dependency_resolver::DependencyDescriptor,
    errors::{DefinitionErrorKind, ResolveErrorKind},
    instantiator::Args,
    lifecycle::DisposableAdapter,
    merged::MergedDefinition,
    processor::Processors,
};

impl Container {
    /// Creates a new instance of the bean, running the whole creation pipeline.
    ///
    /// Explicit `args` replace the constructor arguments of the definition.
    pub(crate) fn create_bean(&self, name: &str, merged: &MergedDefinition, args: Option<&Args>) -> Result<BeanRef, ResolveErrorKind> {
        let span = info_span!("create_bean", name);
        let _guard = span.enter();

        let processors = self.inner.processors.read().clone();

        match self.resolve_before_instantiation(name, merged, &processors) {
            Ok(Some(bean)) => {
                debug!("Substituted before instantiation");
                return Ok(bean);
            }
            Ok(None) => {}
            Err(err) => {
                error!("{}", err);
                return Err(err);
            }
        }

        match self.do_create_bean(name, merged, args, &processors) {
            Ok(bean) => {
                debug!("Created");
                Ok(bean)
            }
            Err(err) => {
                let err = err.into_creation(name, "Unexpected failure during bean creation");
                error!("{}", err);
                Err(err)
            }
        }
    }

    /// A substitute returned by a post-processor skips the pipeline, only the after-init hooks are applied
    fn resolve_before_instantiation(
        &self,
        name: &str,
        merged: &MergedDefinition,
        processors: &Processors,
    ) -> Result<Option<BeanRef>, ResolveErrorKind> {
        if merged.synthetic || processors.is_empty() {
            return Ok(None);
        }

        let Some(bean) = processors
            .before_instantiation(merged.bean_type, name)
            .map_err(|err| ResolveErrorKind::creation(name, "Post-processing before instantiation failed", err))?
        else {
            return Ok(None);
        };
        processors
            .after_init(bean, name)
            .map(Some)
            .map_err(|err| ResolveErrorKind::creation(name, "Post-processing after initialization failed", err))
    }

    fn do_create_bean(
        &self,
        name: &str,
        merged: &MergedDefinition,
        args: Option<&Args>,
        processors: &Processors,
    ) -> Result<BeanRef, ResolveErrorKind> {
        let raw = self.create_bean_instance(name, merged, args)?;

        let early_exposure =
            merged.is_singleton() && self.inner.config.allow_circular_references && self.inner.singletons.is_currently_in_creation(name);
        if early_exposure {
            debug!("Raw instance exposed for circular references");
            let processors = processors.clone();
            let raw = raw.clone();
            let exposed_name = name.to_owned();
            self.inner.singletons.add_singleton_factory(name, move || {
                processors
                    .early_bean_reference(raw, &exposed_name)
                    .map_err(|err| ResolveErrorKind::creation(&exposed_name, "Post-processing of early reference failed", err))
            });
        }

        let mut exposed = self
            .populate_bean(name, merged, &raw, processors)
            .and_then(|()| self.initialize_bean(name, merged, raw.clone(), processors))
            .map_err(|err| err.into_creation(name, "Initialization of bean failed"))?;

        if early_exposure {
            if let Some(early) = self.inner.singletons.get_singleton(name, false)? {
                if Arc::ptr_eq(&exposed, &raw) {
                    exposed = early;
                } else if !self.inner.config.allow_raw_injection_despite_wrapping && self.inner.singletons.has_dependents(name) {
                    let dependents = self.inner.singletons.dependents_of(name);
                    return Err(ResolveErrorKind::CurrentlyInCreation {
                        name: name.to_owned(),
                        reason: format!(
                            "Bean has been injected into other beans [{}] in its raw version as part of a circular reference, \
                             but has eventually been wrapped",
                            dependents.join(", ")
                        ),
                    });
                }
            }
        }

        self.register_disposable_if_necessary(name, merged, raw, processors)?;
        Ok(exposed)
    }

    fn create_bean_instance(&self, name: &str, merged: &MergedDefinition, args: Option<&Args>) -> Result<BeanRef, ResolveErrorKind> {
        match &merged.instantiation {
            None => Err(DefinitionErrorKind::NoInstantiation { name: name.to_owned() }.into()),
            Some(Instantiation::Constructor(instantiator)) => {
                let args = match args {
                    Some(args) => args.clone(),
                    None => self.resolve_constructor_args(name, merged)?,
                };
                let bean = instantiator
                    .clone()
                    .call(args)
                    .map_err(|err| ResolveErrorKind::creation(name, "Instantiation of bean failed", err))?;
                debug!("Instantiated");
                Ok(bean)
            }
            Some(Instantiation::FactoryMethod { factory_bean, method }) => {
                let factory_name = self.transformed_name(factory_bean);
                if factory_name == name {
                    return Err(DefinitionErrorKind::SelfReferencingFactory { name: name.to_owned() }.into());
                }

                let factory = self
                    .get_bean(factory_bean)
                    .map_err(|err| ResolveErrorKind::creation(name, format!("Factory bean `{factory_bean}` couldn't be resolved"), err))?;
                self.inner.singletons.register_dependent(&factory_name, name);

                let args = match args {
                    Some(args) => args.clone(),
                    None => self.resolve_constructor_args(name, merged)?,
                };
                let bean = method
                    .clone()
                    .call((factory, args))
                    .map_err(|err| ResolveErrorKind::creation(name, "Factory method failed", err))?;
                debug!(factory = %factory_name, "Instantiated by factory method");
                Ok(bean)
            }
        }
    }

    /// Arguments must be declared contiguously from index zero
    fn resolve_constructor_args(&self, name: &str, merged: &MergedDefinition) -> Result<Args, ResolveErrorKind> {
        let count = merged.constructor_args.keys().next_back().map_or(0, |index| index + 1);
        let mut values = Vec::with_capacity(count);

        for index in 0..count {
            let Some(value) = merged.constructor_args.get(&index) else {
                return Err(DefinitionErrorKind::MissingConstructorArgument {
                    name: name.to_owned(),
                    index,
                }
                .into());
            };
            let value = self
                .resolve_value(name, merged, &format!("arg{index}"), value)
                .map_err(|err| ResolveErrorKind::creation(name, format!("Couldn't resolve constructor argument {index}"), err))?;
            values.push(value);
        }
        Ok(Args::new(values))
    }

    /// Resolves a declared value for the bean `name`, registering it as a dependent of every bean it gets.
    /// `site` names the argument index or property the value is declared at.
    pub(crate) fn resolve_value(
        &self,
        name: &str,
        merged: &MergedDefinition,
        site: &str,
        value: &Value,
    ) -> Result<BeanRef, ResolveErrorKind> {
        match value {
            Value::Literal(value) => Ok(value.clone()),
            Value::Ref(reference) => {
                let bean = self.get_bean(reference)?;
                self.inner.singletons.register_dependent(&self.transformed_name(reference), name);
                Ok(bean)
            }
            Value::Autowired(descriptor) => self.resolve_autowired(name, descriptor),
            Value::Inner(definition) => self.resolve_inner_bean(name, merged, site, definition),
            Value::List(values) => {
                let list = values
                    .iter()
                    .enumerate()
                    .map(|(index, value)| self.resolve_value(name, merged, &format!("{site}[{index}]"), value))
                    .collect::<Result<BeanList, _>>()?;
                Ok(Arc::new(list))
            }
        }
    }

    /// A failed optional dependency is suppressed and injected as a [`NullBean`]
    fn resolve_autowired(&self, name: &str, descriptor: &DependencyDescriptor) -> Result<BeanRef, ResolveErrorKind> {
        let resolver = self.inner.resolver.read().clone();

        let result = resolver
            .resolve_candidate(descriptor, Some(name), self)
            .and_then(|candidate| match candidate {
                Some(candidate) => {
                    let bean = self.get_bean(&candidate)?;
                    self.inner.singletons.register_dependent(&candidate, name);
                    debug!(%candidate, "Autowired");
                    Ok(bean)
                }
                None => Ok(NullBean::bean()),
            });

        match result {
            Err(err) if !descriptor.required => {
                debug!(%err, "Optional dependency unavailable");
                self.inner.singletons.on_suppressed_error(err);
                Ok(NullBean::bean())
            }
            result => result,
        }
    }

    /// Inner beans are named after their use site, so repeated creations of the outer bean reuse the name.
    /// Only singleton outers track their inner beans, other outers are never destroyed by the container.
    fn resolve_inner_bean(
        &self,
        outer_name: &str,
        outer: &MergedDefinition,
        site: &str,
        definition: &BeanDefinition,
    ) -> Result<BeanRef, ResolveErrorKind> {
        let name = format!("(inner bean)#{outer_name}.{site}");
        let merged = self.with_merge_context(|ctx| self.inner.merged.get_inner(outer, &name, definition, ctx))?;

        let bean = self
            .create_bean(&name, &merged, None)
            .map_err(|err| ResolveErrorKind::creation(outer_name, format!("Couldn't create inner bean `{name}`"), err))?;
        if outer.is_singleton() {
            self.inner.singletons.register_contained(&name, outer_name);
        }

        self.object_for_bean_instance(bean, &name, &name, Some(&merged))
    }

    fn populate_bean(&self, name: &str, merged: &MergedDefinition, bean: &BeanRef, processors: &Processors) -> Result<(), ResolveErrorKind> {
        if !merged.synthetic
            && !processors
                .after_instantiation(bean, name)
                .map_err(|err| ResolveErrorKind::creation(name, "Post-processing after instantiation failed", err))?
        {
            debug!("Property population skipped by post-processor");
            return Ok(());
        }

        let mut properties = merged.properties.clone();
        if !merged.synthetic && !processors.is_empty() {
            properties = processors
                .before_property_population(properties, bean, name)
                .map_err(|err| ResolveErrorKind::creation(name, "Post-processing of property values failed", err))?;
        }
        if properties.is_empty() {
            return Ok(());
        }
        let Some(writer) = &merged.property_writer else {
            return Err(DefinitionErrorKind::NoPropertyWriter { name: name.to_owned() }.into());
        };

        let mut resolved = Vec::with_capacity(properties.len());
        for PropertyValue { name: property, value } in properties {
            let value = self
                .resolve_value(name, merged, &property, &value)
                .map_err(|err| ResolveErrorKind::creation(name, format!("Couldn't resolve property `{property}`"), err))?;
            resolved.push((property, value));
        }

        let mut writer = writer.clone();
        for (property, value) in resolved {
            writer
                .call((bean.clone(), property.clone(), value))
                .map_err(|err| ResolveErrorKind::creation(name, format!("Couldn't set property `{property}`"), err))?;
        }
        debug!("Properties populated");
        Ok(())
    }

    fn initialize_bean(&self, name: &str, merged: &MergedDefinition, bean: BeanRef, processors: &Processors) -> Result<BeanRef, ResolveErrorKind> {
        let mut bean = bean;
        if !merged.synthetic {
            bean = processors
                .before_init(bean, name)
                .map_err(|err| ResolveErrorKind::creation(name, "Post-processing before initialization failed", err))?;
        }

        if let Some(init) = &merged.init {
            init.clone()
                .call(bean.clone())
                .map_err(|err| ResolveErrorKind::creation(name, "Invocation of `after_properties_set` failed", err))?;
            debug!("Properties set callback called");
        }
        if let Some((method, init)) = &merged.init_method {
            init.clone()
                .call(bean.clone())
                .map_err(|err| ResolveErrorKind::creation(name, format!("Invocation of init method `{method}` failed"), err))?;
            debug!(%method, "Init method called");
        }

        if !merged.synthetic {
            bean = processors
                .after_init(bean, name)
                .map_err(|err| ResolveErrorKind::creation(name, "Post-processing after initialization failed", err))?;
        }
        Ok(bean)
    }

    /// Singletons are destroyed with the registry, custom-scoped beans when their scope ends. Prototypes aren't tracked.
    fn register_disposable_if_necessary(
        &self,
        name: &str,
        merged: &MergedDefinition,
        bean: BeanRef,
        processors: &Processors,
    ) -> Result<(), ResolveErrorKind> {
        if merged.is_prototype() {
            return Ok(());
        }
        let Some(adapter) = DisposableAdapter::new(
            name,
            bean,
            merged.destroy.clone(),
            merged.destroy_method.clone(),
            processors.as_slice(),
        ) else {
            return Ok(());
        };

        if merged.is_singleton() {
            self.inner.singletons.register_disposable(adapter);
            return Ok(());
        }

        let scope = self.inner.scopes.get(merged.scope()).ok_or_else(|| ResolveErrorKind::UnknownScope {
            scope: merged.scope().to_owned(),
            name: name.to_owned(),
        })?;
        scope.register_destruction_callback(name, Box::new(move || adapter.destroy()));
        Ok(())
    }
}
