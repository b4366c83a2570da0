pub(crate) mod any;
pub(crate) mod config;
pub(crate) mod container;
pub(crate) mod creation;
pub(crate) mod definition;
pub(crate) mod dependency_resolver;
pub(crate) mod errors;
pub(crate) mod factory_bean;
pub(crate) mod finalizer;
pub(crate) mod instantiator;
pub(crate) mod lifecycle;
pub(crate) mod lock;
pub(crate) mod merged;
pub(crate) mod processor;
pub(crate) mod registry;
pub(crate) mod scope;
pub(crate) mod service;
pub(crate) mod singleton;

pub use any::{downcast, BeanList, BeanRef, NullBean, TypeInfo};
pub use config::Config;
pub use container::{Container, FACTORY_BEAN_PREFIX};
pub use definition::{BeanDefinition, PropertyValue, PropertyValues, Value};
pub use dependency_resolver::{DependencyDescriptor, DependencyResolver, TypeMatchingResolver};
pub use errors::{DefinitionErrorKind, InstantiateErrorKind, RegistrationErrorKind, ResolveErrorKind};
pub use factory_bean::FactoryBean;
pub use finalizer::Finalizer;
pub use instantiator::{instance, Args, Instantiator};
pub use lifecycle::{DisposableBean, InitializingBean, Initializer};
pub use merged::MergedDefinition;
pub use processor::BeanPostProcessor;
pub use registry::{DefinitionSource, Registry};
pub use scope::{DestructionCallback, MapScope, Scope, PROTOTYPE, SINGLETON};
pub use singleton::{EarlyReferenceFactory, SingletonRegistry};
