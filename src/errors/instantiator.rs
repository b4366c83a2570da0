/// Errors raised by user code run by the container:
/// instantiators, factory methods, property writers, lifecycle callbacks, post-processors and producers.
#[derive(thiserror::Error, Debug)]
pub enum InstantiateErrorKind {
    #[error("Incorrect value type, expected: {expected}")]
    IncorrectType { expected: &'static str },
    #[error("Missing argument at index {index}")]
    MissingArgument { index: usize },
    #[error("Unknown property `{name}`")]
    UnknownProperty { name: String },
    #[error(transparent)]
    Custom(#[from] anyhow::Error),
}
