use std::sync::Arc;
use tracing::{debug, warn};

use crate::{
    any::{downcast, BeanRef},
    errors::InstantiateErrorKind,
    processor::BeanPostProcessor,
    service::{service_fn, BoxCloneService},
};

pub(crate) type BoxedCloneCallback = BoxCloneService<BeanRef>;

/// Bean that wants to run its own initialization once all its properties are set.
pub trait InitializingBean: Send + Sync + 'static {
    fn after_properties_set(&self) -> Result<(), InstantiateErrorKind>;
}

/// Bean that releases resources when its scope ends.
pub trait DisposableBean: Send + Sync + 'static {
    fn destroy(&self) -> Result<(), InstantiateErrorKind>;
}

/// Custom init method of a bean, run after [`InitializingBean::after_properties_set`].
pub trait Initializer<Dep>: Clone + 'static {
    fn initialize(&mut self, dependency: Arc<Dep>) -> Result<(), InstantiateErrorKind>;
}

impl<F, Dep> Initializer<Dep> for F
where
    F: FnMut(Arc<Dep>) -> Result<(), InstantiateErrorKind> + Clone + 'static,
{
    #[inline]
    fn initialize(&mut self, dependency: Arc<Dep>) -> Result<(), InstantiateErrorKind> {
        self(dependency)
    }
}

#[must_use]
pub(crate) fn boxed_initializer<Dep, Init>(mut initializer: Init) -> BoxedCloneCallback
where
    Dep: Send + Sync + 'static,
    Init: Initializer<Dep> + Send + Sync,
{
    service_fn(move |dependency: BeanRef| {
        initializer.initialize(downcast::<Dep>(dependency)?)
    })
}

#[must_use]
pub(crate) fn boxed_initializing_bean<Dep: InitializingBean>() -> BoxedCloneCallback {
    service_fn(|dependency: BeanRef| {
        downcast::<Dep>(dependency)?.after_properties_set()
    })
}

#[must_use]
pub(crate) fn boxed_disposable_bean<Dep: DisposableBean>() -> BoxedCloneCallback {
    service_fn(|dependency: BeanRef| downcast::<Dep>(dependency)?.destroy())
}

/// Destruction contract of one bean instance:
/// destruction-aware post-processors, then [`DisposableBean::destroy`], then the custom destroy method.
pub(crate) struct DisposableAdapter {
    name: String,
    bean: BeanRef,
    destroy: Option<BoxedCloneCallback>,
    destroy_method: Option<(String, BoxedCloneCallback)>,
    processors: Vec<Arc<dyn BeanPostProcessor>>,
}

impl DisposableAdapter {
    /// Returns `None` if the bean has nothing to run on destruction.
    #[must_use]
    pub(crate) fn new(
        name: &str,
        bean: BeanRef,
        destroy: Option<BoxedCloneCallback>,
        destroy_method: Option<(String, BoxedCloneCallback)>,
        processors: &[Arc<dyn BeanPostProcessor>],
    ) -> Option<Self> {
        let processors: Vec<_> = processors
            .iter()
            .filter(|processor| processor.requires_destruction(&bean))
            .cloned()
            .collect();
        if destroy.is_none() && destroy_method.is_none() && processors.is_empty() {
            return None;
        }

        Some(Self {
            name: name.to_owned(),
            bean,
            destroy,
            destroy_method,
            processors,
        })
    }

    #[inline]
    #[must_use]
    pub(crate) fn name(&self) -> &str {
        &self.name
    }

    /// Runs the whole contract. Failures are logged and don't stop later steps.
    pub(crate) fn destroy(self) {
        for processor in &self.processors {
            if let Err(err) = processor.before_destruction(&self.bean, &self.name) {
                warn!(bean = %self.name, %err, "Destruction post-processor failed");
            }
        }

        if let Some(mut destroy) = self.destroy {
            match destroy.call(self.bean.clone()) {
                Ok(()) => debug!(bean = %self.name, "Disposable bean destroyed"),
                Err(err) => warn!(bean = %self.name, %err, "Destroy callback failed"),
            }
        }

        if let Some((method, mut destroy_method)) = self.destroy_method {
            match destroy_method.call(self.bean) {
                Ok(()) => debug!(bean = %self.name, %method, "Destroy method called"),
                Err(err) => warn!(bean = %self.name, %method, %err, "Destroy method failed"),
            }
        }
    }
}
