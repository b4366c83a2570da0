mod definition;
mod dependency_resolver;
mod instantiator;
mod registry;

pub use definition::DefinitionErrorKind;
pub use dependency_resolver::ResolveErrorKind;
pub use instantiator::InstantiateErrorKind;
pub use registry::RegistrationErrorKind;
