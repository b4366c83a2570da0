use std::{any::type_name, sync::Arc};
use tracing::debug;

use crate::{
    any::{downcast, BeanRef, NullBean},
    errors::InstantiateErrorKind,
    service::{service_fn, BoxCloneService},
};

/// Raw instantiation of a bean from its resolved constructor arguments.
pub trait Instantiator: Clone + Send + Sync + 'static {
    type Provides: Send + Sync + 'static;

    fn instantiate(&mut self, args: Args) -> Result<Self::Provides, InstantiateErrorKind>;
}

impl<F, Response> Instantiator for F
where
    F: FnMut(Args) -> Result<Response, InstantiateErrorKind> + Clone + Send + Sync + 'static,
    Response: Send + Sync + 'static,
{
    type Provides = Response;

    #[inline]
    fn instantiate(&mut self, args: Args) -> Result<Self::Provides, InstantiateErrorKind> {
        self(args)
    }
}

/// Resolved constructor arguments, ordered by index
#[derive(Clone, Default)]
pub struct Args(Vec<BeanRef>);

impl Args {
    #[inline]
    #[must_use]
    pub const fn new(values: Vec<BeanRef>) -> Self {
        Self(values)
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

    #[inline]
    #[must_use]
    pub fn raw(&self, index: usize) -> Option<&BeanRef> {
        self.0.get(index)
    }

    /// # Errors
    /// - Returns [`InstantiateErrorKind::MissingArgument`] if there is no argument at `index` or it was resolved as null
    /// - Returns [`InstantiateErrorKind::IncorrectType`] if the argument isn't a `T`
    pub fn get<T: Send + Sync + 'static>(&self, index: usize) -> Result<Arc<T>, InstantiateErrorKind> {
        match self.get_optional(index)? {
            Some(value) => Ok(value),
            None => Err(InstantiateErrorKind::MissingArgument { index }),
        }
    }

    /// Same as [`Self::get`], but an argument resolved as null (e.g. a missing optional dependency) is `None`.
    ///
    /// # Errors
    /// - Returns [`InstantiateErrorKind::MissingArgument`] if there is no argument at `index`
    /// - Returns [`InstantiateErrorKind::IncorrectType`] if the argument isn't a `T`
    pub fn get_optional<T: Send + Sync + 'static>(&self, index: usize) -> Result<Option<Arc<T>>, InstantiateErrorKind> {
        let value = self.raw(index).ok_or(InstantiateErrorKind::MissingArgument { index })?;
        if NullBean::is(value) {
            return Ok(None);
        }
        downcast(value.clone()).map(Some)
    }
}

impl From<Vec<BeanRef>> for Args {
    #[inline]
    fn from(values: Vec<BeanRef>) -> Self {
        Self(values)
    }
}

pub(crate) type BoxedCloneInstantiator = BoxCloneService<Args, BeanRef>;

pub(crate) type BoxedCloneFactoryMethod = BoxCloneService<(BeanRef, Args), BeanRef>;

#[must_use]
pub(crate) fn boxed_instantiator<Inst>(mut instantiator: Inst) -> BoxedCloneInstantiator
where
    Inst: Instantiator,
{
    service_fn(move |args: Args| {
        let instance = instantiator.instantiate(args)?;

        debug!(provides = type_name::<Inst::Provides>(), "Instantiated");

        Ok(Arc::new(instance) as BeanRef)
    })
}

#[must_use]
pub(crate) fn boxed_factory_method<Factory, Provides, M>(mut method: M) -> BoxedCloneFactoryMethod
where
    Factory: Send + Sync + 'static,
    Provides: Send + Sync + 'static,
    M: FnMut(&Factory, Args) -> Result<Provides, InstantiateErrorKind> + Clone + Send + Sync + 'static,
{
    service_fn(move |(factory, args): (BeanRef, Args)| {
        let factory = downcast::<Factory>(factory)?;
        let instance = method(&factory, args)?;

        debug!(provides = type_name::<Provides>(), "Instantiated by factory method");

        Ok(Arc::new(instance) as BeanRef)
    })
}

/// Wrapper to create an instantiator that just returns passed value.
/// It can be used when the value was created outside the container.
#[inline]
#[must_use]
pub fn instance<T: Clone + Send + Sync + 'static>(val: T) -> impl Instantiator<Provides = T> {
    move |_: Args| Ok::<_, InstantiateErrorKind>(val.clone())
}
