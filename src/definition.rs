use std::{collections::BTreeMap, sync::Arc};

use crate::{
    any::{downcast, BeanRef, TypeInfo},
    dependency_resolver::DependencyDescriptor,
    errors::InstantiateErrorKind,
    factory_bean::{producer_access, FactoryBean, ProducerAccess},
    finalizer::{boxed_finalizer_factory, Finalizer},
    instantiator::{boxed_factory_method, boxed_instantiator, Args, BoxedCloneFactoryMethod, BoxedCloneInstantiator, Instantiator},
    lifecycle::{boxed_disposable_bean, boxed_initializer, boxed_initializing_bean, BoxedCloneCallback, DisposableBean, InitializingBean, Initializer},
    service::{service_fn, BoxCloneService},
};

pub(crate) type BoxedClonePropertyWriter = BoxCloneService<(BeanRef, String, BeanRef)>;

/// Value of a constructor argument or a property
#[derive(Clone)]
pub enum Value {
    /// Bean looked up by name
    Ref(String),
    /// Bean looked up by type through the container's dependency resolver
    Autowired(DependencyDescriptor),
    /// Bean built from the nested definition for this use site only
    Inner(Box<BeanDefinition>),
    Literal(BeanRef),
    /// Resolves to a [`crate::BeanList`]
    List(Vec<Value>),
}

impl Value {
    #[inline]
    #[must_use]
    pub fn reference(name: impl Into<String>) -> Self {
        Self::Ref(name.into())
    }

    #[inline]
    #[must_use]
    pub fn autowired<T: ?Sized + 'static>() -> Self {
        Self::Autowired(DependencyDescriptor::of::<T>())
    }

    #[inline]
    #[must_use]
    pub fn inner(definition: BeanDefinition) -> Self {
        Self::Inner(Box::new(definition))
    }

    #[inline]
    #[must_use]
    pub fn literal<T: Send + Sync + 'static>(value: T) -> Self {
        Self::Literal(Arc::new(value))
    }

    #[inline]
    #[must_use]
    pub fn list(values: impl IntoIterator<Item = Value>) -> Self {
        Self::List(values.into_iter().collect())
    }
}

#[derive(Clone)]
pub struct PropertyValue {
    pub name: String,
    pub value: Value,
}

/// Ordered property values, unique by name
#[derive(Clone, Default)]
pub struct PropertyValues(Vec<PropertyValue>);

impl PropertyValues {
    #[inline]
    #[must_use]
    pub const fn new() -> Self {
        Self(Vec::new())
    }

    /// Adds the value, replacing an existing value of the same property in place.
    pub fn add(&mut self, name: impl Into<String>, value: Value) {
        let name = name.into();
        match self.0.iter_mut().find(|property| property.name == name) {
            Some(property) => property.value = value,
            None => self.0.push(PropertyValue { name, value }),
        }
    }

    pub fn remove(&mut self, name: &str) -> Option<Value> {
        let index = self.0.iter().position(|property| property.name == name)?;
        Some(self.0.remove(index).value)
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.0.iter().find(|property| property.name == name).map(|property| &property.value)
    }

    #[inline]
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    #[inline]
    pub fn iter(&self) -> impl Iterator<Item = &PropertyValue> {
        self.0.iter()
    }

    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Overlays `self` on top of `parent` values
    #[must_use]
    pub(crate) fn overlay(&self, parent: &PropertyValues) -> PropertyValues {
        let mut merged = parent.clone();
        for PropertyValue { name, value } in &self.0 {
            merged.add(name.clone(), value.clone());
        }
        merged
    }
}

impl IntoIterator for PropertyValues {
    type Item = PropertyValue;
    type IntoIter = std::vec::IntoIter<PropertyValue>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

/// How a raw instance of a bean is obtained
#[derive(Clone)]
pub(crate) enum Instantiation {
    Constructor(BoxedCloneInstantiator),
    /// Method called on another named bean
    FactoryMethod {
        factory_bean: String,
        method: BoxedCloneFactoryMethod,
    },
}

/// Whether the instance is exposed itself or produces the object consumers get
#[derive(Clone)]
pub(crate) enum BeanKind {
    Plain,
    Producer(Arc<dyn ProducerAccess>),
}

/// Recipe of one named bean.
///
/// A definition either carries its own instantiation or inherits one from its parent definition
/// (see [`BeanDefinition::child`]). Values a child leaves unset are inherited when the definition is merged.
#[derive(Clone)]
pub struct BeanDefinition {
    pub(crate) bean_type: Option<TypeInfo>,
    pub(crate) instantiation: Option<Instantiation>,
    pub(crate) kind: Option<BeanKind>,
    pub(crate) scope: Option<String>,
    pub(crate) lazy_init: Option<bool>,
    pub(crate) abstract_flag: bool,
    pub(crate) primary: bool,
    pub(crate) autowire_candidate: bool,
    pub(crate) synthetic: bool,
    pub(crate) depends_on: Vec<String>,
    pub(crate) parent: Option<String>,
    pub(crate) constructor_args: BTreeMap<usize, Value>,
    pub(crate) properties: PropertyValues,
    pub(crate) property_writer: Option<BoxedClonePropertyWriter>,
    pub(crate) init: Option<BoxedCloneCallback>,
    pub(crate) init_method: Option<(String, BoxedCloneCallback)>,
    pub(crate) destroy: Option<BoxedCloneCallback>,
    pub(crate) destroy_method: Option<(String, BoxedCloneCallback)>,
}

impl Default for BeanDefinition {
    fn default() -> Self {
        Self {
            bean_type: None,
            instantiation: None,
            kind: None,
            scope: None,
            lazy_init: None,
            abstract_flag: false,
            primary: false,
            autowire_candidate: true,
            synthetic: false,
            depends_on: Vec::new(),
            parent: None,
            constructor_args: BTreeMap::new(),
            properties: PropertyValues::new(),
            property_writer: None,
            init: None,
            init_method: None,
            destroy: None,
            destroy_method: None,
        }
    }
}

impl BeanDefinition {
    /// Definition of a bean built by the instantiator from its resolved constructor arguments
    #[inline]
    #[must_use]
    pub fn of<Inst: Instantiator>(instantiator: Inst) -> Self {
        Self {
            bean_type: Some(TypeInfo::of::<Inst::Provides>()),
            instantiation: Some(Instantiation::Constructor(boxed_instantiator(instantiator))),
            kind: Some(BeanKind::Plain),
            ..Self::default()
        }
    }

    /// Definition of a producer bean: the instantiator builds the [`FactoryBean`],
    /// consumers looking the name up get the object it produces.
    #[inline]
    #[must_use]
    pub fn factory_bean<Inst>(instantiator: Inst) -> Self
    where
        Inst: Instantiator,
        Inst::Provides: FactoryBean,
    {
        Self {
            bean_type: Some(TypeInfo::of::<Inst::Provides>()),
            instantiation: Some(Instantiation::Constructor(boxed_instantiator(instantiator))),
            kind: Some(BeanKind::Producer(producer_access::<Inst::Provides>())),
            ..Self::default()
        }
    }

    /// Definition of a bean built by calling `method` on the bean named `factory_bean`
    #[inline]
    #[must_use]
    pub fn factory_method<Factory, Provides, M>(factory_bean: impl Into<String>, method: M) -> Self
    where
        Factory: Send + Sync + 'static,
        Provides: Send + Sync + 'static,
        M: FnMut(&Factory, Args) -> Result<Provides, InstantiateErrorKind> + Clone + Send + Sync + 'static,
    {
        Self {
            bean_type: Some(TypeInfo::of::<Provides>()),
            instantiation: Some(Instantiation::FactoryMethod {
                factory_bean: factory_bean.into(),
                method: boxed_factory_method(method),
            }),
            kind: Some(BeanKind::Plain),
            ..Self::default()
        }
    }

    /// Definition inheriting everything it leaves unset from the `parent` definition
    #[inline]
    #[must_use]
    pub fn child(parent: impl Into<String>) -> Self {
        Self {
            parent: Some(parent.into()),
            ..Self::default()
        }
    }

    /// Sets scope name, e.g. [`crate::scope::SINGLETON`], [`crate::scope::PROTOTYPE`] or a registered custom scope
    #[inline]
    #[must_use]
    pub fn with_scope(mut self, scope: impl Into<String>) -> Self {
        self.scope = Some(scope.into());
        self
    }

    #[inline]
    #[must_use]
    pub fn lazy(mut self, lazy_init: bool) -> Self {
        self.lazy_init = Some(lazy_init);
        self
    }

    /// Marks the definition as a template that is only inherited from
    #[inline]
    #[must_use]
    pub fn abstract_bean(mut self) -> Self {
        self.abstract_flag = true;
        self
    }

    #[inline]
    #[must_use]
    pub fn primary(mut self) -> Self {
        self.primary = true;
        self
    }

    /// Excludes the bean from autowiring by type
    #[inline]
    #[must_use]
    pub fn not_autowire_candidate(mut self) -> Self {
        self.autowire_candidate = false;
        self
    }

    /// Marks the bean as container infrastructure: post-processors don't touch objects it produces
    #[inline]
    #[must_use]
    pub fn synthetic(mut self) -> Self {
        self.synthetic = true;
        self
    }

    #[inline]
    #[must_use]
    pub fn depends_on(mut self, name: impl Into<String>) -> Self {
        self.depends_on.push(name.into());
        self
    }

    #[inline]
    #[must_use]
    pub fn constructor_arg(mut self, index: usize, value: Value) -> Self {
        self.constructor_args.insert(index, value);
        self
    }

    /// Adds a property value, written to the bean by its property writer
    #[inline]
    #[must_use]
    pub fn property(mut self, name: impl Into<String>, value: Value) -> Self {
        self.properties.add(name, value);
        self
    }

    /// Sets the writer applying resolved property values to the bean.
    /// Beans are shared, so writers set properties through interior mutability (e.g. [`std::sync::OnceLock`]).
    #[inline]
    #[must_use]
    pub fn property_writer<T, W>(mut self, mut writer: W) -> Self
    where
        T: Send + Sync + 'static,
        W: FnMut(&T, &str, BeanRef) -> Result<(), InstantiateErrorKind> + Clone + Send + Sync + 'static,
    {
        self.property_writer = Some(service_fn(
            move |(bean, name, value): (BeanRef, String, BeanRef)| {
                let bean = downcast::<T>(bean)?;
                writer(&bean, &name, value)
            },
        ));
        self
    }

    /// Calls [`InitializingBean::after_properties_set`] once properties are set
    #[inline]
    #[must_use]
    pub fn initializing<T: InitializingBean>(mut self) -> Self {
        self.init = Some(boxed_initializing_bean::<T>());
        self
    }

    /// Calls [`DisposableBean::destroy`] when the bean's scope ends
    #[inline]
    #[must_use]
    pub fn disposable<T: DisposableBean>(mut self) -> Self {
        self.destroy = Some(boxed_disposable_bean::<T>());
        self
    }

    #[inline]
    #[must_use]
    pub fn init_method<T, Init>(mut self, name: impl Into<String>, initializer: Init) -> Self
    where
        T: Send + Sync + 'static,
        Init: Initializer<T> + Send + Sync,
    {
        self.init_method = Some((name.into(), boxed_initializer(initializer)));
        self
    }

    #[inline]
    #[must_use]
    pub fn destroy_method<T, Fin>(mut self, name: impl Into<String>, finalizer: Fin) -> Self
    where
        T: Send + Sync + 'static,
        Fin: Finalizer<T> + Send + Sync,
    {
        self.destroy_method = Some((name.into(), boxed_finalizer_factory(finalizer)));
        self
    }

    #[inline]
    #[must_use]
    pub fn parent_name(&self) -> Option<&str> {
        self.parent.as_deref()
    }

    #[inline]
    #[must_use]
    pub fn scope(&self) -> Option<&str> {
        self.scope.as_deref()
    }

    #[inline]
    #[must_use]
    pub fn is_abstract(&self) -> bool {
        self.abstract_flag
    }

    #[inline]
    #[must_use]
    pub fn bean_type(&self) -> Option<TypeInfo> {
        self.bean_type
    }

    #[inline]
    #[must_use]
    pub fn property_values(&self) -> &PropertyValues {
        &self.properties
    }

    #[inline]
    #[must_use]
    pub fn depends_on_names(&self) -> &[String] {
        &self.depends_on
    }
}
