use std::sync::Arc;

use crate::{
    any::{BeanRef, TypeInfo},
    definition::PropertyValues,
    errors::InstantiateErrorKind,
};

/// Extensibility hooks around bean creation and destruction.
///
/// Every method has a pass-through default, so a processor implements only the hooks it needs.
/// Processors are called in ascending [`BeanPostProcessor::order`], registration order breaking ties.
pub trait BeanPostProcessor: Send + Sync + 'static {
    /// Called before the bean is instantiated.
    /// Returning a substitute skips instantiation, population and init callbacks of the bean,
    /// only [`BeanPostProcessor::after_init`] hooks are applied to the substitute.
    #[allow(unused_variables)]
    fn before_instantiation(&self, bean_type: Option<TypeInfo>, name: &str) -> Result<Option<BeanRef>, InstantiateErrorKind> {
        Ok(None)
    }

    /// Called right after raw instantiation. Returning `false` skips property population.
    #[allow(unused_variables)]
    fn after_instantiation(&self, bean: &BeanRef, name: &str) -> Result<bool, InstantiateErrorKind> {
        Ok(true)
    }

    /// Adjusts the property values before they're written to the bean.
    #[allow(unused_variables)]
    fn before_property_population(
        &self,
        values: PropertyValues,
        bean: &BeanRef,
        name: &str,
    ) -> Result<PropertyValues, InstantiateErrorKind> {
        Ok(values)
    }

    /// Reference handed out to beans that resolve a cycle through this bean while it's still in creation.
    #[allow(unused_variables)]
    fn early_bean_reference(&self, bean: BeanRef, name: &str) -> Result<BeanRef, InstantiateErrorKind> {
        Ok(bean)
    }

    #[allow(unused_variables)]
    fn before_init(&self, bean: BeanRef, name: &str) -> Result<BeanRef, InstantiateErrorKind> {
        Ok(bean)
    }

    #[allow(unused_variables)]
    fn after_init(&self, bean: BeanRef, name: &str) -> Result<BeanRef, InstantiateErrorKind> {
        Ok(bean)
    }

    /// Called for processors whose [`BeanPostProcessor::requires_destruction`] is `true` for the bean.
    #[allow(unused_variables)]
    fn before_destruction(&self, bean: &BeanRef, name: &str) -> Result<(), InstantiateErrorKind> {
        Ok(())
    }

    #[allow(unused_variables)]
    fn requires_destruction(&self, bean: &BeanRef) -> bool {
        false
    }

    fn order(&self) -> i32 {
        0
    }
}

/// Ordered, cheaply clonable snapshot of the registered processors.
///
/// Adding a processor builds a new snapshot, so beans in creation keep using the one they started with.
#[derive(Clone, Default)]
pub(crate) struct Processors {
    inner: Arc<[Arc<dyn BeanPostProcessor>]>,
}

impl Processors {
    #[must_use]
    pub(crate) fn with(&self, processor: Arc<dyn BeanPostProcessor>) -> Self {
        let mut processors = self.inner.to_vec();
        processors.push(processor);
        // Stable sort keeps registration order between equal orders
        processors.sort_by_key(|processor| processor.order());

        Self { inner: processors.into() }
    }

    #[inline]
    #[must_use]
    pub(crate) fn as_slice(&self) -> &[Arc<dyn BeanPostProcessor>] {
        &self.inner
    }

    #[inline]
    #[must_use]
    pub(crate) fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    pub(crate) fn before_instantiation(&self, bean_type: Option<TypeInfo>, name: &str) -> Result<Option<BeanRef>, InstantiateErrorKind> {
        for processor in self.as_slice() {
            if let Some(bean) = processor.before_instantiation(bean_type, name)? {
                return Ok(Some(bean));
            }
        }
        Ok(None)
    }

    pub(crate) fn after_instantiation(&self, bean: &BeanRef, name: &str) -> Result<bool, InstantiateErrorKind> {
        for processor in self.as_slice() {
            if !processor.after_instantiation(bean, name)? {
                return Ok(false);
            }
        }
        Ok(true)
    }

    pub(crate) fn before_property_population(
        &self,
        mut values: PropertyValues,
        bean: &BeanRef,
        name: &str,
    ) -> Result<PropertyValues, InstantiateErrorKind> {
        for processor in self.as_slice() {
            values = processor.before_property_population(values, bean, name)?;
        }
        Ok(values)
    }

    pub(crate) fn early_bean_reference(&self, mut bean: BeanRef, name: &str) -> Result<BeanRef, InstantiateErrorKind> {
        for processor in self.as_slice() {
            bean = processor.early_bean_reference(bean, name)?;
        }
        Ok(bean)
    }

    pub(crate) fn before_init(&self, mut bean: BeanRef, name: &str) -> Result<BeanRef, InstantiateErrorKind> {
        for processor in self.as_slice() {
            bean = processor.before_init(bean, name)?;
        }
        Ok(bean)
    }

    pub(crate) fn after_init(&self, mut bean: BeanRef, name: &str) -> Result<BeanRef, InstantiateErrorKind> {
        for processor in self.as_slice() {
            bean = processor.after_init(bean, name)?;
        }
        Ok(bean)
    }
}

#[cfg(test)]
mod tests {
    use super::{BeanPostProcessor, Processors};
    use crate::{
        any::{BeanRef, TypeInfo},
        errors::InstantiateErrorKind,
    };

    use std::sync::{Arc, Mutex};

    struct Recorder {
        label: &'static str,
        order: i32,
        calls: Arc<Mutex<Vec<&'static str>>>,
    }

    impl BeanPostProcessor for Recorder {
        fn before_init(&self, bean: BeanRef, _name: &str) -> Result<BeanRef, InstantiateErrorKind> {
            self.calls.lock().unwrap().push(self.label);
            Ok(bean)
        }

        fn order(&self) -> i32 {
            self.order
        }
    }

    struct Substitute;

    impl BeanPostProcessor for Substitute {
        fn before_instantiation(&self, _bean_type: Option<TypeInfo>, name: &str) -> Result<Option<BeanRef>, InstantiateErrorKind> {
            Ok((name == "substituted").then(|| Arc::new(0u8) as BeanRef))
        }
    }

    #[test]
    fn test_processors_order() {
        let calls = Arc::new(Mutex::new(Vec::new()));
        let recorder = |label, order| -> Arc<dyn BeanPostProcessor> {
            Arc::new(Recorder {
                label,
                order,
                calls: calls.clone(),
            })
        };

        let processors = Processors::default()
            .with(recorder("late", 10))
            .with(recorder("first", -1))
            .with(recorder("default_1", 0))
            .with(recorder("default_2", 0));

        processors.before_init(Arc::new(()), "bean").unwrap();

        assert_eq!(*calls.lock().unwrap(), ["first", "default_1", "default_2", "late"]);
    }

    #[test]
    fn test_before_instantiation_short_circuit() {
        let processors = Processors::default().with(Arc::new(Substitute));

        assert!(processors.before_instantiation(None, "substituted").unwrap().is_some());
        assert!(processors.before_instantiation(None, "other").unwrap().is_none());
        assert!(Processors::default().is_empty());
    }
}
