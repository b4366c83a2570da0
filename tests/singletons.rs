use beanstalk::{
    downcast, Args, BeanDefinition, BeanPostProcessor, BeanRef, Config, Container, DependencyDescriptor, InstantiateErrorKind, Registry,
    ResolveErrorKind, Value,
};
use std::{
    sync::{
        atomic::{AtomicBool, AtomicU8, Ordering},
        Arc, Barrier, OnceLock,
    },
    thread,
    time::Duration,
};

struct A {
    b: OnceLock<Arc<B>>,
}

struct B {
    a: OnceLock<BeanRef>,
}

struct Wrapped(BeanRef);

fn setter_cycle() -> Registry {
    Registry::new()
        .provide(
            "a",
            BeanDefinition::of(|_: Args| -> Result<A, InstantiateErrorKind> { Ok(A { b: OnceLock::new() }) })
                .property("b", Value::reference("b"))
                .property_writer(|a: &A, _: &str, value: BeanRef| -> Result<(), InstantiateErrorKind> {
                    let _ = a.b.set(downcast(value)?);
                    Ok(())
                }),
        )
        .provide(
            "b",
            BeanDefinition::of(|_: Args| -> Result<B, InstantiateErrorKind> { Ok(B { a: OnceLock::new() }) })
                .property("a", Value::reference("a"))
                .property_writer(|b: &B, _: &str, value: BeanRef| -> Result<(), InstantiateErrorKind> {
                    let _ = b.a.set(value);
                    Ok(())
                }),
        )
}

#[test]
fn test_created_once_under_concurrency() {
    let instantiated = Arc::new(AtomicU8::new(0));
    let container = Container::new(Registry::new().provide(
        "pool",
        BeanDefinition::of({
            let instantiated = instantiated.clone();
            move |_: Args| -> Result<u8, InstantiateErrorKind> {
                thread::sleep(Duration::from_millis(10));
                Ok(instantiated.fetch_add(1, Ordering::SeqCst))
            }
        }),
    ));
    let barrier = Barrier::new(8);

    let beans: Vec<BeanRef> = thread::scope(|scope| {
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let container = &container;
                let barrier = &barrier;
                scope.spawn(move || {
                    barrier.wait();
                    container.get_bean("pool").unwrap()
                })
            })
            .collect();
        handles.into_iter().map(|handle| handle.join().unwrap()).collect()
    });

    assert_eq!(instantiated.load(Ordering::SeqCst), 1);
    assert!(beans.iter().all(|bean| Arc::ptr_eq(bean, &beans[0])));
}

#[test]
fn test_lookup_is_idempotent() {
    let container = Container::new(Registry::new().provide("value", BeanDefinition::of(beanstalk::instance(5u8))));

    let value_1 = container.get::<u8>("value").unwrap();
    let value_2 = container.get::<u8>("value").unwrap();

    assert!(Arc::ptr_eq(&value_1, &value_2));
    assert!(container.is_singleton("value").unwrap());
    assert!(matches!(
        container.get::<u16>("value"),
        Err(ResolveErrorKind::NotOfRequiredType { .. })
    ));
}

#[test]
fn test_setter_cycle_resolved() {
    let container = Container::new(setter_cycle());

    let a = container.get::<A>("a").unwrap();
    let b = container.get::<B>("b").unwrap();

    assert!(Arc::ptr_eq(a.b.get().unwrap(), &b));
    assert!(Arc::ptr_eq(b.a.get().unwrap(), &container.get_bean("a").unwrap()));
    assert!(!container.is_currently_in_creation("a"));
    assert_eq!(container.singleton_registry().dependents_of("a"), ["b"]);
}

#[test]
fn test_setter_cycle_rejected_without_circular_references() {
    let container = Container::new_with_config(
        setter_cycle(),
        Config {
            allow_circular_references: false,
            ..Config::default()
        },
    );

    let err = container.get_bean("a").unwrap_err();

    assert!(err.is_currently_in_creation());
    assert!(!container.singleton_registry().contains_singleton("a"));
    assert!(!container.singleton_registry().contains_singleton("b"));
}

#[test]
fn test_constructor_cycle_rejected() {
    struct CtorA(#[allow(dead_code)] Arc<CtorB>);
    struct CtorB(#[allow(dead_code)] Arc<CtorA>);

    let container = Container::new(
        Registry::new()
            .provide(
                "a",
                BeanDefinition::of(|args: Args| -> Result<CtorA, InstantiateErrorKind> { Ok(CtorA(args.get(0)?)) })
                    .constructor_arg(0, Value::reference("b")),
            )
            .provide(
                "b",
                BeanDefinition::of(|args: Args| -> Result<CtorB, InstantiateErrorKind> { Ok(CtorB(args.get(0)?)) })
                    .constructor_arg(0, Value::reference("a")),
            ),
    );

    let err = container.get_bean("a").unwrap_err();

    assert!(err.is_currently_in_creation());
    assert!(matches!(err, ResolveErrorKind::Creation { ref name, .. } if name == "a"));
    assert!(!container.is_currently_in_creation("a"));
    assert!(!container.is_currently_in_creation("b"));
}

struct WrapAfterInit;

impl BeanPostProcessor for WrapAfterInit {
    fn after_init(&self, bean: BeanRef, name: &str) -> Result<BeanRef, InstantiateErrorKind> {
        if name == "a" {
            return Ok(Arc::new(Wrapped(bean)));
        }
        Ok(bean)
    }
}

#[test]
fn test_raw_injection_despite_wrapping_rejected() {
    let container = Container::new(setter_cycle());
    container.add_post_processor(WrapAfterInit);

    let err = container.get_bean("a").unwrap_err();

    match err.root_cause() {
        ResolveErrorKind::CurrentlyInCreation { name, reason } => {
            assert_eq!(name, "a");
            assert!(reason.contains("[b]"));
        }
        err => panic!("unexpected error: {err}"),
    }
    assert!(!container.singleton_registry().contains_singleton("a"));
    assert!(!container.singleton_registry().contains_singleton("b"));
}

#[test]
fn test_raw_injection_despite_wrapping_allowed() {
    let container = Container::new_with_config(
        setter_cycle(),
        Config {
            allow_raw_injection_despite_wrapping: true,
            ..Config::default()
        },
    );
    container.add_post_processor(WrapAfterInit);

    let wrapped = container.get::<Wrapped>("a").unwrap();
    let b = container.get::<B>("b").unwrap();

    assert!(wrapped.0.downcast_ref::<A>().is_some());
    assert!(b.a.get().unwrap().downcast_ref::<A>().is_some());
}

struct WrapEarly;

impl BeanPostProcessor for WrapEarly {
    fn early_bean_reference(&self, bean: BeanRef, name: &str) -> Result<BeanRef, InstantiateErrorKind> {
        if name == "a" {
            return Ok(Arc::new(Wrapped(bean)));
        }
        Ok(bean)
    }
}

#[test]
fn test_early_reference_post_processed() {
    let container = Container::new(setter_cycle());
    container.add_post_processor(WrapEarly);

    let a = container.get_bean("a").unwrap();
    let b = container.get::<B>("b").unwrap();

    assert!(a.downcast_ref::<Wrapped>().is_some());
    assert!(Arc::ptr_eq(b.a.get().unwrap(), &a));
}

#[test]
fn test_failure_cleans_up_and_retries() {
    let fail = Arc::new(AtomicBool::new(true));
    let container = Container::new(Registry::new().provide(
        "flaky",
        BeanDefinition::of({
            let fail = fail.clone();
            move |_: Args| -> Result<u8, InstantiateErrorKind> {
                if fail.swap(false, Ordering::SeqCst) {
                    return Err(anyhow::anyhow!("connection refused").into());
                }
                Ok(1)
            }
        }),
    ));

    let err = container.get_bean("flaky").unwrap_err();
    assert!(matches!(
        err.root_cause(),
        ResolveErrorKind::Instantiate(InstantiateErrorKind::Custom(_))
    ));
    assert!(!container.singleton_registry().contains_singleton("flaky"));
    assert!(!container.is_currently_in_creation("flaky"));

    assert_eq!(*container.get::<u8>("flaky").unwrap(), 1);
}

#[test]
fn test_suppressed_errors_attached() {
    struct Metrics;
    struct Service;

    let container = Container::new(
        Registry::new()
            .provide(
                "metrics",
                BeanDefinition::of(|_: Args| -> Result<Metrics, InstantiateErrorKind> { Err(anyhow::anyhow!("exporter unreachable").into()) }),
            )
            .provide(
                "service",
                BeanDefinition::of(|args: Args| -> Result<Service, InstantiateErrorKind> {
                    match args.get_optional::<Metrics>(0)? {
                        Some(_) => Ok(Service),
                        None => Err(anyhow::anyhow!("metrics are required after all").into()),
                    }
                })
                .constructor_arg(0, Value::Autowired(DependencyDescriptor::of::<Metrics>().optional())),
            ),
    );

    let err = container.get_bean("service").unwrap_err();

    assert_eq!(err.related().len(), 1);
    assert!(matches!(&err.related()[0], ResolveErrorKind::Creation { name, .. } if name == "metrics"));
}

#[test]
fn test_optional_dependency_injected_as_null() {
    struct Metrics;
    struct Service(Option<Arc<Metrics>>);

    let container = Container::new(Registry::new().provide(
        "service",
        BeanDefinition::of(|args: Args| -> Result<Service, InstantiateErrorKind> { Ok(Service(args.get_optional(0)?)) })
            .constructor_arg(0, Value::Autowired(DependencyDescriptor::of::<Metrics>().optional())),
    ));

    assert!(container.get::<Service>("service").unwrap().0.is_none());
}

#[test]
fn test_registered_singleton() {
    let container = Container::new(Registry::new());
    container.register_singleton("answer", Arc::new(42u32)).unwrap();

    assert_eq!(*container.get::<u32>("answer").unwrap(), 42);
    assert!(container.contains_bean("answer"));
    assert!(container.is_type_match::<u32>("answer").unwrap());
    assert_eq!(container.bean_names_for_type::<u32>(), ["answer"]);
    assert!(container.register_singleton("answer", Arc::new(0u32)).is_err());
}

#[test]
fn test_rejected_reentrant_request_keeps_bean_in_creation() {
    #[derive(Clone)]
    struct Database;
    struct Cache(#[allow(dead_code)] Arc<Repository>);
    struct Repository(#[allow(dead_code)] Arc<Database>, Option<Arc<Cache>>);

    let container = Container::new(
        Registry::new()
            .provide("db", BeanDefinition::of(beanstalk::instance(Database)))
            .provide(
                "a",
                BeanDefinition::of(|args: Args| -> Result<Repository, InstantiateErrorKind> { Ok(Repository(args.get(0)?, args.get_optional(1)?)) })
                    .constructor_arg(0, Value::reference("db"))
                    .constructor_arg(1, Value::Autowired(DependencyDescriptor::of::<Cache>().optional())),
            )
            .provide(
                "cache",
                BeanDefinition::of(|args: Args| -> Result<Cache, InstantiateErrorKind> { Ok(Cache(args.get(0)?)) })
                    .constructor_arg(0, Value::reference("a")),
            ),
    );

    let a = container.get::<Repository>("a").unwrap();

    assert!(a.1.is_none());
    assert_eq!(container.singleton_registry().dependents_of("db"), ["a"]);
    assert_eq!(container.singleton_registry().dependencies_of("a"), ["db"]);
    assert!(!container.singleton_registry().contains_singleton("cache"));
}
