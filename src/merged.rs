use parking_lot::Mutex;
use std::{
    collections::{BTreeMap, HashMap, HashSet},
    sync::Arc,
};
use tracing::debug;

use crate::{
    any::TypeInfo,
    container::Container,
    definition::{BeanDefinition, BeanKind, BoxedClonePropertyWriter, Instantiation, PropertyValues, Value},
    errors::{DefinitionErrorKind, ResolveErrorKind},
    lifecycle::BoxedCloneCallback,
    registry::DefinitionSource,
    scope::SINGLETON,
};

/// Definition flattened through its whole parent chain.
///
/// Unlike [`BeanDefinition`], every inheritable value is resolved:
/// the scope defaults to [`SINGLETON`] and the bean kind to a plain bean.
#[derive(Clone)]
pub struct MergedDefinition {
    pub(crate) bean_type: Option<TypeInfo>,
    pub(crate) instantiation: Option<Instantiation>,
    pub(crate) kind: BeanKind,
    pub(crate) scope: String,
    pub(crate) lazy_init: bool,
    pub(crate) abstract_flag: bool,
    pub(crate) primary: bool,
    pub(crate) autowire_candidate: bool,
    pub(crate) synthetic: bool,
    pub(crate) depends_on: Vec<String>,
    pub(crate) constructor_args: BTreeMap<usize, Value>,
    pub(crate) properties: PropertyValues,
    pub(crate) property_writer: Option<BoxedClonePropertyWriter>,
    pub(crate) init: Option<BoxedCloneCallback>,
    pub(crate) init_method: Option<(String, BoxedCloneCallback)>,
    pub(crate) destroy: Option<BoxedCloneCallback>,
    pub(crate) destroy_method: Option<(String, BoxedCloneCallback)>,
}

impl MergedDefinition {
    /// Merged form of a definition without a parent
    #[must_use]
    pub(crate) fn root(definition: &BeanDefinition) -> Self {
        Self {
            bean_type: definition.bean_type,
            instantiation: definition.instantiation.clone(),
            kind: definition.kind.clone().unwrap_or(BeanKind::Plain),
            scope: definition.scope.clone().unwrap_or_else(|| SINGLETON.to_owned()),
            lazy_init: definition.lazy_init.unwrap_or(false),
            abstract_flag: definition.abstract_flag,
            primary: definition.primary,
            autowire_candidate: definition.autowire_candidate,
            synthetic: definition.synthetic,
            depends_on: definition.depends_on.clone(),
            constructor_args: definition.constructor_args.clone(),
            properties: definition.properties.clone(),
            property_writer: definition.property_writer.clone(),
            init: definition.init.clone(),
            init_method: definition.init_method.clone(),
            destroy: definition.destroy.clone(),
            destroy_method: definition.destroy_method.clone(),
        }
    }

    /// Deep copy of `parent` with everything `child` sets laid over it
    #[must_use]
    pub(crate) fn overlay(parent: &MergedDefinition, child: &BeanDefinition) -> Self {
        let mut constructor_args = parent.constructor_args.clone();
        constructor_args.extend(child.constructor_args.iter().map(|(index, value)| (*index, value.clone())));

        Self {
            bean_type: child.bean_type.or(parent.bean_type),
            instantiation: child.instantiation.clone().or_else(|| parent.instantiation.clone()),
            kind: child.kind.clone().unwrap_or_else(|| parent.kind.clone()),
            scope: child.scope.clone().unwrap_or_else(|| parent.scope.clone()),
            lazy_init: child.lazy_init.unwrap_or(parent.lazy_init),
            abstract_flag: child.abstract_flag,
            primary: child.primary,
            autowire_candidate: child.autowire_candidate,
            synthetic: child.synthetic,
            depends_on: if child.depends_on.is_empty() {
                parent.depends_on.clone()
            } else {
                child.depends_on.clone()
            },
            constructor_args,
            properties: child.properties.overlay(&parent.properties),
            property_writer: child.property_writer.clone().or_else(|| parent.property_writer.clone()),
            init: child.init.clone().or_else(|| parent.init.clone()),
            init_method: child.init_method.clone().or_else(|| parent.init_method.clone()),
            destroy: child.destroy.clone().or_else(|| parent.destroy.clone()),
            destroy_method: child.destroy_method.clone().or_else(|| parent.destroy_method.clone()),
        }
    }

    #[inline]
    #[must_use]
    pub fn scope(&self) -> &str {
        &self.scope
    }

    #[inline]
    #[must_use]
    pub fn is_singleton(&self) -> bool {
        self.scope == SINGLETON
    }

    #[inline]
    #[must_use]
    pub fn is_prototype(&self) -> bool {
        self.scope == crate::scope::PROTOTYPE
    }

    #[inline]
    #[must_use]
    pub fn is_lazy_init(&self) -> bool {
        self.lazy_init
    }

    #[inline]
    #[must_use]
    pub fn is_abstract(&self) -> bool {
        self.abstract_flag
    }

    #[inline]
    #[must_use]
    pub fn is_primary(&self) -> bool {
        self.primary
    }

    #[inline]
    #[must_use]
    pub fn is_autowire_candidate(&self) -> bool {
        self.autowire_candidate
    }

    /// Whether the bean is a producer whose product consumers get instead of the bean itself
    #[inline]
    #[must_use]
    pub fn is_factory_bean(&self) -> bool {
        matches!(self.kind, BeanKind::Producer(_))
    }

    /// Type of the raw bean instance
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
    pub fn depends_on(&self) -> &[String] {
        &self.depends_on
    }
}

/// Where a merge looks up definitions
pub(crate) struct MergeContext<'a> {
    pub(crate) source: &'a dyn DefinitionSource,
    /// Canonical form of a (possibly aliased) parent name
    pub(crate) canonical_name: &'a dyn Fn(&str) -> String,
    pub(crate) parent: Option<&'a Container>,
    pub(crate) cache_metadata: bool,
}

/// Merged definitions cache, owned by one container.
///
/// The lock is never held while merging, so concurrent first merges of one name may both compute it;
/// the first stored result wins.
#[derive(Default)]
pub(crate) struct MergedDefinitions {
    cache: Mutex<HashMap<String, Arc<MergedDefinition>>>,
    already_created: Mutex<HashSet<String>>,
}

impl MergedDefinitions {
    /// # Errors
    /// - Returns [`ResolveErrorKind::NoSuchDefinition`] if there is no definition with the name
    /// - Returns [`DefinitionErrorKind::ParentNotFound`] or [`DefinitionErrorKind::ParentCycle`] if its parent chain can't be resolved
    pub(crate) fn get(&self, name: &str, ctx: &MergeContext<'_>) -> Result<Arc<MergedDefinition>, ResolveErrorKind> {
        self.resolve(name, ctx, &mut vec![name.to_owned()])
    }

    /// Merges a nested definition against the bean containing it. The result is never cached.
    pub(crate) fn get_inner(
        &self,
        outer: &MergedDefinition,
        name: &str,
        definition: &BeanDefinition,
        ctx: &MergeContext<'_>,
    ) -> Result<MergedDefinition, ResolveErrorKind> {
        let mut merged = self.merge(name, definition, ctx, &mut vec![name.to_owned()])?;
        // A bean contained in a non-singleton can't outlive it as a singleton
        if merged.is_singleton() && !outer.is_singleton() {
            merged.scope.clone_from(&outer.scope);
        }
        Ok(merged)
    }

    #[inline]
    #[must_use]
    pub(crate) fn cached(&self, name: &str) -> Option<Arc<MergedDefinition>> {
        self.cache.lock().get(name).cloned()
    }

    /// Drops the cached merge of the name, so the next lookup merges from the current definitions
    pub(crate) fn invalidate(&self, name: &str) {
        if self.cache.lock().remove(name).is_some() {
            debug!(name, "Merged definition invalidated");
        }
    }

    /// Marks the name as created. The first time, the merge is invalidated to pick up late metadata changes.
    pub(crate) fn mark_as_created(&self, name: &str) {
        if self.already_created.lock().insert(name.to_owned()) {
            self.invalidate(name);
        }
    }

    #[inline]
    pub(crate) fn unmark_as_created(&self, name: &str) {
        self.already_created.lock().remove(name);
    }

    #[inline]
    #[must_use]
    pub(crate) fn is_created(&self, name: &str) -> bool {
        self.already_created.lock().contains(name)
    }
}

impl MergedDefinitions {
    fn resolve(&self, name: &str, ctx: &MergeContext<'_>, path: &mut Vec<String>) -> Result<Arc<MergedDefinition>, ResolveErrorKind> {
        if let Some(merged) = self.cached(name) {
            return Ok(merged);
        }

        let Some(definition) = ctx.source.definition(name) else {
            return Err(ResolveErrorKind::NoSuchDefinition { name: name.to_owned() });
        };
        let merged = Arc::new(self.merge(name, &definition, ctx, path)?);

        if ctx.cache_metadata || self.is_created(name) {
            let mut cache = self.cache.lock();
            let merged = cache.entry(name.to_owned()).or_insert(merged).clone();
            debug!(name, "Merged definition cached");
            return Ok(merged);
        }
        Ok(merged)
    }

    fn merge(
        &self,
        name: &str,
        definition: &BeanDefinition,
        ctx: &MergeContext<'_>,
        path: &mut Vec<String>,
    ) -> Result<MergedDefinition, ResolveErrorKind> {
        let Some(parent_name) = definition.parent.as_deref() else {
            return Ok(MergedDefinition::root(definition));
        };
        let parent_name = (ctx.canonical_name)(parent_name);

        let parent = if parent_name != name && ctx.source.definition(&parent_name).is_some() {
            if path.contains(&parent_name) {
                let mut chain = path.clone();
                chain.push(parent_name);
                return Err(DefinitionErrorKind::ParentCycle { chain }.into());
            }

            path.push(parent_name.clone());
            let parent = self.resolve(&parent_name, ctx, path);
            path.pop();
            parent?
        } else {
            // A parent named like the child itself, or unknown here, can only live in the parent container
            let parent_not_found = || DefinitionErrorKind::ParentNotFound {
                name: name.to_owned(),
                parent: parent_name.clone(),
            };
            let Some(parent_container) = ctx.parent else {
                return Err(parent_not_found().into());
            };
            match parent_container.merged_definition(&parent_name) {
                Ok(parent) => parent,
                Err(ResolveErrorKind::NoSuchDefinition { .. }) => return Err(parent_not_found().into()),
                Err(err) => return Err(err),
            }
        };

        Ok(MergedDefinition::overlay(&parent, definition))
    }
}

#[cfg(test)]
mod tests {
    use super::{MergeContext, MergedDefinitions};
    use crate::{
        definition::{BeanDefinition, Value},
        errors::{DefinitionErrorKind, ResolveErrorKind},
        instantiator::instance,
        registry::Registry,
        scope::{PROTOTYPE, SINGLETON},
    };

    use tracing_test::traced_test;

    fn literal_u8(value: Option<&Value>) -> Option<u8> {
        match value {
            Some(Value::Literal(value)) => value.downcast_ref::<u8>().copied(),
            _ => None,
        }
    }

    fn merge_with(registry: &Registry, merged: &MergedDefinitions, name: &str, cache_metadata: bool) -> Result<std::sync::Arc<super::MergedDefinition>, ResolveErrorKind> {
        let canonical_name = |name: &str| registry.canonical_name(name).to_owned();
        let ctx = MergeContext {
            source: registry,
            canonical_name: &canonical_name,
            parent: None,
            cache_metadata,
        };
        merged.get(name, &ctx)
    }

    #[test]
    #[traced_test]
    fn test_child_overlays_parent() {
        let registry = Registry::new()
            .provide(
                "parent",
                BeanDefinition::of(instance(0u8))
                    .with_scope(PROTOTYPE)
                    .lazy(true)
                    .property("x", Value::literal(0u8))
                    .property("y", Value::literal(2u8))
                    .constructor_arg(0, Value::literal(10u8))
                    .constructor_arg(1, Value::literal(11u8)),
            )
            .provide(
                "child",
                BeanDefinition::child("parent")
                    .property("x", Value::literal(1u8))
                    .constructor_arg(1, Value::literal(21u8)),
            );
        let merged = MergedDefinitions::default();

        let child = merge_with(&registry, &merged, "child", true).unwrap();

        assert_eq!(child.scope(), PROTOTYPE);
        assert!(child.is_lazy_init());
        assert!(child.instantiation.is_some());
        assert_eq!(literal_u8(child.property_values().get("x")), Some(1));
        assert_eq!(literal_u8(child.property_values().get("y")), Some(2));
        assert_eq!(literal_u8(child.constructor_args.get(&0)), Some(10));
        assert_eq!(literal_u8(child.constructor_args.get(&1)), Some(21));
        assert!(merged.cached("parent").is_some());
        assert!(logs_contain("Merged definition cached"));
    }

    #[test]
    fn test_scope_defaults_to_singleton() {
        let registry = Registry::new().provide("bean", BeanDefinition::of(instance(0u8)));
        let merged = MergedDefinitions::default();

        let bean = merge_with(&registry, &merged, "bean", true).unwrap();

        assert_eq!(bean.scope(), SINGLETON);
        assert!(bean.is_singleton() && !bean.is_lazy_init() && !bean.is_factory_bean());
    }

    #[test]
    fn test_cache_is_not_retroactive() {
        let mut registry = Registry::new()
            .provide("parent", BeanDefinition::of(instance(0u8)).property("y", Value::literal(2u8)))
            .provide("child", BeanDefinition::child("parent").property("x", Value::literal(1u8)));
        let merged = MergedDefinitions::default();

        let before = merge_with(&registry, &merged, "child", true).unwrap();
        registry
            .register_definition("parent", BeanDefinition::of(instance(0u8)).property("y", Value::literal(5u8)))
            .unwrap();
        merged.invalidate("parent");

        let cached = merge_with(&registry, &merged, "child", true).unwrap();
        assert_eq!(literal_u8(before.property_values().get("y")), Some(2));
        assert_eq!(literal_u8(cached.property_values().get("y")), Some(2));

        merged.invalidate("child");
        let remerged = merge_with(&registry, &merged, "child", true).unwrap();
        assert_eq!(literal_u8(remerged.property_values().get("y")), Some(5));
        assert_eq!(literal_u8(remerged.property_values().get("x")), Some(1));
    }

    #[test]
    fn test_no_metadata_caching_before_creation() {
        let registry = Registry::new().provide("bean", BeanDefinition::of(instance(0u8)));
        let merged = MergedDefinitions::default();

        merge_with(&registry, &merged, "bean", false).unwrap();
        assert!(merged.cached("bean").is_none());

        merged.mark_as_created("bean");
        merge_with(&registry, &merged, "bean", false).unwrap();
        assert!(merged.cached("bean").is_some());
        assert!(merged.is_created("bean"));
    }

    #[test]
    fn test_parent_errors() {
        let registry = Registry::new()
            .provide("orphan", BeanDefinition::child("missing"))
            .provide("a", BeanDefinition::child("b"))
            .provide("b", BeanDefinition::child("a"))
            .provide("self", BeanDefinition::child("self"));
        let merged = MergedDefinitions::default();

        assert!(matches!(
            merge_with(&registry, &merged, "orphan", true),
            Err(ResolveErrorKind::Definition(DefinitionErrorKind::ParentNotFound { .. }))
        ));
        match merge_with(&registry, &merged, "a", true) {
            Err(ResolveErrorKind::Definition(DefinitionErrorKind::ParentCycle { chain })) => assert_eq!(chain, ["a", "b", "a"]),
            _ => panic!("expected parent cycle"),
        }
        assert!(matches!(
            merge_with(&registry, &merged, "self", true),
            Err(ResolveErrorKind::Definition(DefinitionErrorKind::ParentNotFound { .. }))
        ));
        assert!(matches!(
            merge_with(&registry, &merged, "unknown", true),
            Err(ResolveErrorKind::NoSuchDefinition { .. })
        ));
    }

    #[test]
    fn test_inner_bean_inherits_non_singleton_scope() {
        let registry = Registry::new();
        let merged = MergedDefinitions::default();
        let canonical_name = |name: &str| name.to_owned();
        let ctx = MergeContext {
            source: &registry,
            canonical_name: &canonical_name,
            parent: None,
            cache_metadata: true,
        };
        let outer = super::MergedDefinition::root(&BeanDefinition::of(instance(0u8)).with_scope(PROTOTYPE));

        let inner = merged
            .get_inner(&outer, "(inner bean)#outer.arg0", &BeanDefinition::of(instance(1u8)), &ctx)
            .unwrap();

        assert_eq!(inner.scope(), PROTOTYPE);
        assert!(merged.cached("(inner bean)#outer.arg0").is_none());
    }
}
