use beanstalk::{
    downcast, Args, BeanDefinition, BeanPostProcessor, BeanRef, Container, DisposableBean, InitializingBean, InstantiateErrorKind,
    PropertyValues, Registry, TypeInfo, Value,
};
use std::sync::{Arc, Mutex, OnceLock};

type Log = Arc<Mutex<Vec<String>>>;

struct Pool {
    log: Log,
    size: OnceLock<usize>,
}

impl InitializingBean for Pool {
    fn after_properties_set(&self) -> Result<(), InstantiateErrorKind> {
        self.log.lock().unwrap().push(format!("after_properties_set size={:?}", self.size.get()));
        Ok(())
    }
}

impl DisposableBean for Pool {
    fn destroy(&self) -> Result<(), InstantiateErrorKind> {
        self.log.lock().unwrap().push("destroy".to_owned());
        Ok(())
    }
}

fn pool_definition(log: &Log) -> BeanDefinition {
    let log = log.clone();
    BeanDefinition::of(move |_: Args| -> Result<Pool, InstantiateErrorKind> {
        log.lock().unwrap().push("instantiate".to_owned());
        Ok(Pool {
            log: log.clone(),
            size: OnceLock::new(),
        })
    })
    .property("size", Value::literal(4usize))
    .property_writer(|pool: &Pool, _: &str, value: BeanRef| -> Result<(), InstantiateErrorKind> {
        pool.log.lock().unwrap().push("populate".to_owned());
        let _ = pool.size.set(*downcast::<usize>(value)?);
        Ok(())
    })
    .initializing::<Pool>()
    .init_method("start", |pool: Arc<Pool>| -> Result<(), InstantiateErrorKind> {
        pool.log.lock().unwrap().push("start".to_owned());
        Ok(())
    })
    .disposable::<Pool>()
    .destroy_method("close", |pool: Arc<Pool>| -> Result<(), InstantiateErrorKind> {
        pool.log.lock().unwrap().push("close".to_owned());
        Ok(())
    })
}

struct Recorder {
    log: Log,
}

impl BeanPostProcessor for Recorder {
    fn before_init(&self, bean: BeanRef, name: &str) -> Result<BeanRef, InstantiateErrorKind> {
        self.log.lock().unwrap().push(format!("before_init {name}"));
        Ok(bean)
    }

    fn after_init(&self, bean: BeanRef, name: &str) -> Result<BeanRef, InstantiateErrorKind> {
        self.log.lock().unwrap().push(format!("after_init {name}"));
        Ok(bean)
    }

    fn before_destruction(&self, _bean: &BeanRef, name: &str) -> Result<(), InstantiateErrorKind> {
        self.log.lock().unwrap().push(format!("before_destruction {name}"));
        Ok(())
    }

    fn requires_destruction(&self, bean: &BeanRef) -> bool {
        bean.is::<Pool>()
    }
}

#[test]
fn test_init_and_destroy_order() {
    let log = Log::default();
    let container = Container::new(Registry::new().provide("pool", pool_definition(&log)));
    container.add_post_processor(Recorder { log: log.clone() });

    let pool = container.get::<Pool>("pool").unwrap();
    assert_eq!(pool.size.get(), Some(&4));

    container.destroy_singletons();

    assert_eq!(
        *log.lock().unwrap(),
        [
            "instantiate",
            "populate",
            "before_init pool",
            "after_properties_set size=Some(4)",
            "start",
            "after_init pool",
            "before_destruction pool",
            "destroy",
            "close",
        ]
    );
}

#[test]
fn test_failed_init_method_destroys_nothing() {
    let log = Log::default();
    let container = Container::new(Registry::new().provide(
        "pool",
        pool_definition(&log).init_method("start", |_: Arc<Pool>| -> Result<(), InstantiateErrorKind> {
            Err(anyhow::anyhow!("port in use").into())
        }),
    ));

    let err = container.get_bean("pool").unwrap_err();

    assert!(matches!(
        err.root_cause(),
        beanstalk::ResolveErrorKind::Instantiate(InstantiateErrorKind::Custom(_))
    ));
    assert!(!container.singleton_registry().contains_singleton("pool"));

    container.destroy_singletons();
    assert!(!log.lock().unwrap().iter().any(|event| event == "destroy"));
}

#[test]
fn test_dependents_destroyed_first() {
    struct Repository(#[allow(dead_code)] Arc<Pool>);

    let log = Log::default();
    let container = Container::new(
        Registry::new().provide("pool", pool_definition(&log)).provide(
            "repository",
            BeanDefinition::of(|args: Args| -> Result<Repository, InstantiateErrorKind> { Ok(Repository(args.get(0)?)) })
                .constructor_arg(0, Value::reference("pool"))
                .destroy_method("close", {
                    let log = log.clone();
                    move |_: Arc<Repository>| -> Result<(), InstantiateErrorKind> {
                        log.lock().unwrap().push("close repository".to_owned());
                        Ok(())
                    }
                }),
        ),
    );

    container.get_bean("repository").unwrap();
    log.lock().unwrap().clear();

    container.destroy_singletons();

    assert_eq!(*log.lock().unwrap(), ["close repository", "destroy", "close"]);
    assert!(container.singleton_registry().singleton_names().is_empty());
}

#[test]
fn test_drop_closes_container() {
    let log = Log::default();
    {
        let container = Container::new(Registry::new().provide("pool", pool_definition(&log)));
        container.get_bean("pool").unwrap();
    }

    let log = log.lock().unwrap();
    assert_eq!(log[log.len() - 2..], ["destroy", "close"]);
}

struct Substitute;

impl BeanPostProcessor for Substitute {
    fn before_instantiation(&self, bean_type: Option<TypeInfo>, _name: &str) -> Result<Option<BeanRef>, InstantiateErrorKind> {
        if bean_type == Some(TypeInfo::of::<Pool>()) {
            return Ok(Some(Arc::new(Pool {
                log: Log::default(),
                size: OnceLock::from(16),
            })));
        }
        Ok(None)
    }
}

#[test]
fn test_substitute_before_instantiation() {
    let log = Log::default();
    let container = Container::new(Registry::new().provide("pool", pool_definition(&log)));
    container.add_post_processor(Substitute);
    container.add_post_processor(Recorder { log: log.clone() });

    let pool = container.get::<Pool>("pool").unwrap();
    container.destroy_singletons();

    assert_eq!(pool.size.get(), Some(&16));
    assert_eq!(*log.lock().unwrap(), ["after_init pool"]);
}

struct SkipPopulation;

impl BeanPostProcessor for SkipPopulation {
    fn after_instantiation(&self, _bean: &BeanRef, name: &str) -> Result<bool, InstantiateErrorKind> {
        Ok(name != "pool")
    }
}

#[test]
fn test_population_skipped() {
    let log = Log::default();
    let container = Container::new(Registry::new().provide("pool", pool_definition(&log)));
    container.add_post_processor(SkipPopulation);

    let pool = container.get::<Pool>("pool").unwrap();

    assert!(pool.size.get().is_none());
    assert!(!log.lock().unwrap().iter().any(|event| event == "populate"));
}

struct OverrideSize;

impl BeanPostProcessor for OverrideSize {
    fn before_property_population(
        &self,
        mut values: PropertyValues,
        _bean: &BeanRef,
        _name: &str,
    ) -> Result<PropertyValues, InstantiateErrorKind> {
        values.add("size", Value::literal(32usize));
        Ok(values)
    }
}

#[test]
fn test_property_values_adjusted() {
    let log = Log::default();
    let container = Container::new(Registry::new().provide("pool", pool_definition(&log)));
    container.add_post_processor(OverrideSize);

    assert_eq!(container.get::<Pool>("pool").unwrap().size.get(), Some(&32));
}

struct Ordered {
    log: Log,
    label: &'static str,
    order: i32,
}

impl BeanPostProcessor for Ordered {
    fn after_init(&self, bean: BeanRef, _name: &str) -> Result<BeanRef, InstantiateErrorKind> {
        self.log.lock().unwrap().push(self.label.to_owned());
        Ok(bean)
    }

    fn order(&self) -> i32 {
        self.order
    }
}

#[test]
fn test_processors_run_in_order() {
    let log = Log::default();
    let container = Container::new(Registry::new().provide("value", BeanDefinition::of(beanstalk::instance(1u8))));
    for (label, order) in [("late", 10), ("early", -10), ("default", 0), ("default_2", 0)] {
        container.add_post_processor(Ordered {
            log: log.clone(),
            label,
            order,
        });
    }

    container.get_bean("value").unwrap();

    assert_eq!(*log.lock().unwrap(), ["early", "default", "default_2", "late"]);
}
