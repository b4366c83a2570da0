use std::{
    any::{type_name, Any, TypeId},
    cmp::Ordering,
    sync::Arc,
};

use crate::errors::InstantiateErrorKind;

/// Shared, type-erased bean instance.
pub type BeanRef = Arc<dyn Any + Send + Sync>;

/// A list value resolved from [`crate::Value::List`].
pub type BeanList = Vec<BeanRef>;

#[derive(Debug, Clone, Copy)]
pub struct TypeInfo {
    pub name: &'static str,
    pub id: TypeId,
}

impl PartialEq for TypeInfo {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for TypeInfo {}

impl PartialOrd for TypeInfo {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for TypeInfo {
    fn cmp(&self, other: &Self) -> Ordering {
        self.id.cmp(&other.id)
    }
}

impl TypeInfo {
    #[inline]
    #[must_use]
    pub fn of<T>() -> Self
    where
        T: ?Sized + 'static,
    {
        Self {
            name: type_name::<T>(),
            id: TypeId::of::<T>(),
        }
    }

    #[inline]
    #[must_use]
    pub fn short_name(&self) -> &'static str {
        self.name.rsplit_once("::").map_or(self.name, |(_, name)| name)
    }

    /// Checks the concrete type behind a type-erased bean.
    #[inline]
    #[must_use]
    pub fn matches(&self, bean: &BeanRef) -> bool {
        (**bean).type_id() == self.id
    }
}

/// Marker cached and returned in place of an object a producer declined to make.
///
/// Use [`NullBean::is`] to compare a looked up bean against "nothing".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct NullBean;

impl NullBean {
    #[inline]
    #[must_use]
    pub fn bean() -> BeanRef {
        Arc::new(NullBean)
    }

    #[inline]
    #[must_use]
    pub fn is(bean: &BeanRef) -> bool {
        bean.is::<NullBean>()
    }
}

/// Downcasts a type-erased bean to its concrete type.
///
/// # Errors
/// Returns [`InstantiateErrorKind::IncorrectType`] if the bean isn't a `T`
pub fn downcast<T: Send + Sync + 'static>(bean: BeanRef) -> Result<Arc<T>, InstantiateErrorKind> {
    bean.downcast::<T>().map_err(|_| InstantiateErrorKind::IncorrectType {
        expected: type_name::<T>(),
    })
}
