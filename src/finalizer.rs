use std::sync::Arc;

use crate::{
    any::{downcast, BeanRef},
    errors::InstantiateErrorKind,
    lifecycle::BoxedCloneCallback,
    service::service_fn,
};

/// Custom destroy method of a bean.
///
/// Finalizers run when the bean's scope ends (container shutdown for singletons),
/// after every bean that depends on it is already destroyed.
pub trait Finalizer<Dep>: Clone + 'static {
    fn finalize(&mut self, dependency: Arc<Dep>) -> Result<(), InstantiateErrorKind>;
}

#[must_use]
pub(crate) fn boxed_finalizer_factory<Dep, Fin>(mut finalizer: Fin) -> BoxedCloneCallback
where
    Dep: Send + Sync + 'static,
    Fin: Finalizer<Dep> + Send + Sync,
{
    service_fn(move |dependency: BeanRef| {
        let dependency = downcast::<Dep>(dependency)?;
        finalizer.finalize(dependency)
    })
}

impl<F, Dep> Finalizer<Dep> for F
where
    F: FnMut(Arc<Dep>) -> Result<(), InstantiateErrorKind> + Clone + 'static,
{
    #[inline]
    fn finalize(&mut self, dependency: Arc<Dep>) -> Result<(), InstantiateErrorKind> {
        self(dependency)
    }
}

#[cfg(test)]
mod tests {
    use super::boxed_finalizer_factory;
    use crate::{any::BeanRef, errors::InstantiateErrorKind};

    use std::sync::{
        atomic::{AtomicU8, Ordering},
        Arc,
    };

    struct Pool(AtomicU8);

    #[test]
    fn test_boxed_finalizer() {
        let pool = Arc::new(Pool(AtomicU8::new(0)));

        let finalizer = boxed_finalizer_factory(|pool: Arc<Pool>| -> Result<(), InstantiateErrorKind> {
            pool.0.fetch_add(1, Ordering::SeqCst);
            Ok(())
        });

        finalizer.clone().call(pool.clone() as BeanRef).unwrap();
        assert_eq!(pool.0.load(Ordering::SeqCst), 1);

        assert!(matches!(
            finalizer.clone().call(Arc::new(1u8) as BeanRef),
            Err(InstantiateErrorKind::IncorrectType { .. })
        ));
    }
}
