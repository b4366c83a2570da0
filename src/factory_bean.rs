use std::{any::type_name, marker::PhantomData, sync::Arc};
use tracing::debug;

use crate::{
    any::{BeanRef, NullBean, TypeInfo},
    errors::{InstantiateErrorKind, ResolveErrorKind},
    singleton::SingletonRegistry,
};

/// Bean producing the object consumers get when they look its name up.
///
/// The producer itself is still available under the name prefixed with `&`.
pub trait FactoryBean: Send + Sync + 'static {
    type Object: Send + Sync + 'static;

    /// Returns `None` when there is nothing to produce; lookups then get a [`NullBean`].
    fn get_object(&self) -> Result<Option<Self::Object>, InstantiateErrorKind>;

    /// Singleton producers are called once, their object is cached along with the producer
    fn is_singleton(&self) -> bool {
        true
    }

    /// Whether the object is produced eagerly when singletons are pre-instantiated
    fn is_eager_init(&self) -> bool {
        false
    }
}

/// Type-erased access to a [`FactoryBean`] instance
pub(crate) trait ProducerAccess: Send + Sync {
    fn object_type(&self) -> TypeInfo;

    fn get_object(&self, producer: &BeanRef) -> Result<Option<BeanRef>, InstantiateErrorKind>;

    fn is_singleton(&self, producer: &BeanRef) -> Result<bool, InstantiateErrorKind>;

    fn is_eager_init(&self, producer: &BeanRef) -> Result<bool, InstantiateErrorKind>;
}

struct TypedProducer<F>(PhantomData<fn() -> F>);

impl<F: FactoryBean> TypedProducer<F> {
    #[inline]
    fn producer(producer: &BeanRef) -> Result<&F, InstantiateErrorKind> {
        producer
            .downcast_ref::<F>()
            .ok_or(InstantiateErrorKind::IncorrectType { expected: type_name::<F>() })
    }
}

impl<F: FactoryBean> ProducerAccess for TypedProducer<F> {
    #[inline]
    fn object_type(&self) -> TypeInfo {
        TypeInfo::of::<F::Object>()
    }

    fn get_object(&self, producer: &BeanRef) -> Result<Option<BeanRef>, InstantiateErrorKind> {
        Ok(Self::producer(producer)?.get_object()?.map(|object| Arc::new(object) as BeanRef))
    }

    #[inline]
    fn is_singleton(&self, producer: &BeanRef) -> Result<bool, InstantiateErrorKind> {
        Ok(Self::producer(producer)?.is_singleton())
    }

    #[inline]
    fn is_eager_init(&self, producer: &BeanRef) -> Result<bool, InstantiateErrorKind> {
        Ok(Self::producer(producer)?.is_eager_init())
    }
}

#[inline]
#[must_use]
pub(crate) fn producer_access<F: FactoryBean>() -> Arc<dyn ProducerAccess> {
    Arc::new(TypedProducer::<F>(PhantomData))
}

/// Post-processing applied to produced objects
pub(crate) type PostProcess<'a> = &'a dyn Fn(BeanRef) -> Result<BeanRef, ResolveErrorKind>;

impl SingletonRegistry {
    #[must_use]
    pub(crate) fn cached_factory_object(&self, name: &str) -> Option<BeanRef> {
        self.state.with(|state| state.factory_objects.get(name).cloned())
    }

    /// Returns the object made by the producer bean named `name`.
    ///
    /// Objects of a finished singleton producer are made and post-processed once under the registry lock,
    /// then cached until the producer is removed. Other producers are called on every lookup.
    pub(crate) fn get_object_from_factory(
        &self,
        name: &str,
        producer: &BeanRef,
        access: &dyn ProducerAccess,
        post_process: Option<PostProcess<'_>>,
    ) -> Result<BeanRef, ResolveErrorKind> {
        if !(access.is_singleton(producer)? && self.contains_singleton(name)) {
            let object = self.produce(name, producer, access)?;
            return match post_process {
                Some(post_process) => post_process(object)
                    .map_err(|err| err.into_creation(name, "Post-processing of object produced by factory bean failed")),
                None => Ok(object),
            };
        }

        let _guard = self.state.lock();
        if let Some(object) = self.cached_factory_object(name) {
            return Ok(object);
        }

        let mut object = self.produce(name, producer, access)?;
        // The producer may have looked itself up while producing
        if let Some(object) = self.cached_factory_object(name) {
            return Ok(object);
        }

        if let Some(post_process) = post_process {
            if self.is_currently_in_creation(name) {
                // Handed out as is, without caching, while the object is post-processed
                return Ok(object);
            }

            self.before_creation(name)?;
            let result = post_process(object);
            self.after_creation(name);
            object = result.map_err(|err| err.into_creation(name, "Post-processing of object produced by factory bean failed"))?;
        }

        if self.contains_singleton(name) {
            self.state.with(|state| state.factory_objects.insert(name.to_owned(), object.clone()));
            debug!(name, "Produced object cached");
        }
        Ok(object)
    }

    fn produce(&self, name: &str, producer: &BeanRef, access: &dyn ProducerAccess) -> Result<BeanRef, ResolveErrorKind> {
        let object = access
            .get_object(producer)
            .map_err(|err| ResolveErrorKind::creation(name, "Factory bean failed on object creation", err))?;
        debug!(name, "Object produced");

        match object {
            Some(object) => Ok(object),
            None if self.is_currently_in_creation(name) => Err(ResolveErrorKind::CurrentlyInCreation {
                name: name.to_owned(),
                reason: "Factory bean which is currently in creation returned null from `get_object`".to_owned(),
            }),
            None => Ok(NullBean::bean()),
        }
    }
}
