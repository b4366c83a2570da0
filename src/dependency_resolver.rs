use tracing::debug;

use crate::{any::TypeInfo, container::Container, errors::ResolveErrorKind};

/// Injection point resolved by type
#[derive(Clone, Debug)]
pub struct DependencyDescriptor {
    pub type_info: TypeInfo,
    /// A missing optional dependency is injected as a [`crate::NullBean`]
    pub required: bool,
    /// Name of the injection point, picks among several candidates of the type
    pub name: Option<String>,
}

impl DependencyDescriptor {
    #[inline]
    #[must_use]
    pub fn of<T: ?Sized + 'static>() -> Self {
        Self {
            type_info: TypeInfo::of::<T>(),
            required: true,
            name: None,
        }
    }

    #[inline]
    #[must_use]
    pub fn optional(mut self) -> Self {
        self.required = false;
        self
    }

    #[inline]
    #[must_use]
    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }
}

/// Picks the bean to inject for an injection point.
/// The container then looks the picked name up as usual, creating the bean if needed.
pub trait DependencyResolver: Send + Sync + 'static {
    /// Returns the name of the bean to inject, `None` for a missing optional dependency.
    ///
    /// # Errors
    /// - Returns [`ResolveErrorKind::NoCandidate`] if a required dependency has no candidate
    /// - Returns [`ResolveErrorKind::NoUniqueCandidate`] if there are several equally good candidates
    fn resolve_candidate(
        &self,
        descriptor: &DependencyDescriptor,
        requesting: Option<&str>,
        container: &Container,
    ) -> Result<Option<String>, ResolveErrorKind>;
}

/// Matches candidates by type.
///
/// The requesting bean and beans that aren't autowire candidates are skipped.
/// Among several candidates, a single primary one wins, then the one named like the injection point.
#[derive(Clone, Copy, Debug, Default)]
pub struct TypeMatchingResolver;

impl DependencyResolver for TypeMatchingResolver {
    fn resolve_candidate(
        &self,
        descriptor: &DependencyDescriptor,
        requesting: Option<&str>,
        container: &Container,
    ) -> Result<Option<String>, ResolveErrorKind> {
        let expected = descriptor.type_info.name;
        let mut candidates: Vec<String> = container
            .bean_names_for_type_info(descriptor.type_info, true)
            .into_iter()
            .filter(|candidate| Some(candidate.as_str()) != requesting && container.is_autowire_candidate(candidate))
            .collect();

        match candidates.len() {
            0 if descriptor.required => Err(ResolveErrorKind::NoCandidate { expected }),
            0 => Ok(None),
            1 => Ok(candidates.pop()),
            _ => {
                let mut primary: Vec<_> = candidates.iter().filter(|candidate| container.is_primary(candidate)).cloned().collect();
                match primary.len() {
                    1 => {
                        debug!(expected, candidate = %primary[0], "Primary candidate picked");
                        return Ok(primary.pop());
                    }
                    0 => {}
                    _ => return Err(ResolveErrorKind::NoUniqueCandidate { expected, candidates: primary }),
                }

                if let Some(name) = descriptor.name.as_deref() {
                    if let Some(candidate) = candidates
                        .iter()
                        .find(|candidate| *candidate == name || container.aliases(candidate).iter().any(|alias| alias == name))
                    {
                        return Ok(Some(candidate.clone()));
                    }
                }
                Err(ResolveErrorKind::NoUniqueCandidate { expected, candidates })
            }
        }
    }
}
