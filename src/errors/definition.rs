/// Invalid or unresolvable definition metadata.
#[derive(thiserror::Error, Debug)]
pub enum DefinitionErrorKind {
    #[error("Could not resolve parent definition `{parent}` of `{name}`")]
    ParentNotFound { name: String, parent: String },
    #[error("Circular parent chain: {}", chain.join(" -> "))]
    ParentCycle { chain: Vec<String> },
    #[error("Definition `{name}` is abstract and can't be instantiated")]
    AbstractBean { name: String },
    #[error("Definition `{name}` has neither an instantiator nor a factory method")]
    NoInstantiation { name: String },
    #[error("Definition `{name}` has no constructor argument at index {index}")]
    MissingConstructorArgument { name: String, index: usize },
    #[error("Factory method of `{name}` refers to the definition itself as its factory bean")]
    SelfReferencingFactory { name: String },
    #[error("Definition `{name}` declares property values but no property writer")]
    NoPropertyWriter { name: String },
    #[error("Circular depends-on relationship between `{name}` and `{dependency}`")]
    CircularDependsOn { name: String, dependency: String },
}
