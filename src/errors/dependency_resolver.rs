use super::{definition::DefinitionErrorKind, instantiator::InstantiateErrorKind, registry::RegistrationErrorKind};

#[derive(thiserror::Error, Debug)]
pub enum ResolveErrorKind {
    #[error("No bean named `{name}` is defined")]
    NoSuchDefinition { name: String },
    #[error("Bean `{name}` is currently in creation: {reason}")]
    CurrentlyInCreation { name: String, reason: String },
    #[error("Error creating bean `{name}`: {message}: {source}")]
    Creation {
        name: String,
        message: String,
        source: Box<ResolveErrorKind>,
        related: Vec<ResolveErrorKind>,
    },
    #[error(transparent)]
    Definition(#[from] DefinitionErrorKind),
    #[error(transparent)]
    Registration(#[from] RegistrationErrorKind),
    #[error("No scope registered for name `{scope}` (bean `{name}`)")]
    UnknownScope { scope: String, name: String },
    #[error("Scope `{scope}` is not active for bean `{name}`")]
    ScopeNotActive { scope: String, name: String },
    #[error("Creation of singleton `{name}` isn't allowed while singletons are in destruction")]
    SingletonsInDestruction { name: String },
    #[error("Bean `{name}` isn't of required type {expected}")]
    NotOfRequiredType { name: String, expected: &'static str },
    #[error("Bean `{name}` isn't a factory bean")]
    NotAFactory { name: String },
    #[error("Bean `{name}` was produced as null")]
    NullBean { name: String },
    #[error("No qualifying bean of type {expected}")]
    NoCandidate { expected: &'static str },
    #[error("No unique bean of type {expected}, found {}: {}", candidates.len(), candidates.join(", "))]
    NoUniqueCandidate { expected: &'static str, candidates: Vec<String> },
    #[error("Illegal state: {0}")]
    IllegalState(String),
    #[error(transparent)]
    Instantiate(#[from] InstantiateErrorKind),
}

impl ResolveErrorKind {
    #[inline]
    #[must_use]
    pub(crate) fn creation(name: &str, message: impl Into<String>, source: impl Into<ResolveErrorKind>) -> Self {
        Self::Creation {
            name: name.to_owned(),
            message: message.into(),
            source: Box::new(source.into()),
            related: Vec::new(),
        }
    }

    #[inline]
    #[must_use]
    pub(crate) fn in_creation(name: &str) -> Self {
        Self::CurrentlyInCreation {
            name: name.to_owned(),
            reason: "Requested bean is currently in creation: Is there an unresolvable circular reference?".to_owned(),
        }
    }

    /// Wraps the error into a creation failure of `name`, unless it already is one.
    #[must_use]
    pub(crate) fn into_creation(self, name: &str, message: &str) -> Self {
        if matches!(&self, Self::Creation { name: failed, .. } if failed == name) {
            return self;
        }
        Self::creation(name, message, self)
    }

    /// Innermost error of a chain of creation failures
    #[must_use]
    pub fn root_cause(&self) -> &ResolveErrorKind {
        let mut err = self;
        while let Self::Creation { source, .. } = err {
            err = source;
        }
        err
    }

    #[inline]
    #[must_use]
    pub fn is_currently_in_creation(&self) -> bool {
        matches!(self.root_cause(), Self::CurrentlyInCreation { .. })
    }

    /// Errors observed and suppressed while this creation attempt was running
    #[must_use]
    pub fn related(&self) -> &[ResolveErrorKind] {
        match self {
            Self::Creation { related, .. } => related,
            _ => &[],
        }
    }

    pub(crate) fn attach_related(&mut self, suppressed: Vec<ResolveErrorKind>) {
        if let Self::Creation { related, .. } = self {
            related.extend(suppressed);
        }
    }
}
