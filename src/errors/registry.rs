#[derive(thiserror::Error, Debug)]
pub enum RegistrationErrorKind {
    #[error("Singleton `{name}` is already registered")]
    AlreadyRegistered { name: String },
    #[error("Definition `{name}` is already registered and overriding is disabled")]
    DefinitionOverride { name: String },
    #[error("Can't register alias `{alias}` for `{name}`: circular alias reference")]
    AliasCycle { name: String, alias: String },
    #[error("Alias `{alias}` is already registered for `{existing}` and overriding is disabled")]
    AliasOverride { alias: String, existing: String },
    #[error("Configuration is frozen, can't register `{name}`")]
    Frozen { name: String },
    #[error("Scope `{name}` is built in and can't be replaced")]
    ReservedScope { name: String },
}
