//! 构建流水线的集成测试：播种键、执行顺序、晚登记、构建器释放语义与装配日志。

use std::sync::{
    Arc,
    atomic::{AtomicUsize, Ordering},
};

use parking_lot::Mutex;
use spark_bootstrap::{
    BootstrapError, Configuration, ConfigurationAccess, FromServices, HostBuilder,
    HostingEnvironment, LoggerFactory, ResolutionError, Resolver, ResolverExt, Stage,
    builder::{CONTENT_ROOT_PATH_KEY, ENVIRONMENT_NAME_KEY},
    configuration::MemorySource,
};
use tracing::{
    Event, Subscriber,
    field::{Field, Visit},
};
use tracing_subscriber::{Layer, layer::Context};

struct PlainHost;

impl FromServices for PlainHost {
    fn from_services(_resolver: &dyn Resolver) -> Result<Self, ResolutionError> {
        Ok(PlainHost)
    }
}

fn environment(name: &str) -> HostingEnvironment {
    HostingEnvironment::new(name, "pipeline-tests", "/srv/pipeline").expect("合法环境描述")
}

fn configuration_of<T>(context: &spark_bootstrap::RunContext<T>) -> Arc<Configuration>
where
    T: Send + Sync + 'static,
{
    context
        .resolver()
        .expect("上下文未释放")
        .get_required::<Configuration>()
        .expect("配置为核心单例")
}

#[test]
fn empty_builder_seeds_exactly_two_keys() {
    let mut builder = HostBuilder::new(environment("Staging"));
    let mut context = builder
        .build_run_context::<PlainHost>()
        .expect("零处理器时构建成功");

    let configuration = configuration_of(&context);
    assert_eq!(configuration.keys().len(), 2, "仅包含两个播种键");
    assert_eq!(
        configuration.get(ENVIRONMENT_NAME_KEY).as_deref(),
        Some("Staging")
    );
    assert_eq!(
        configuration.get(CONTENT_ROOT_PATH_KEY).as_deref(),
        Some("/srv/pipeline")
    );
    assert!(context.host().is_ok(), "宿主类型被自动注册为作用域服务");

    context.dispose();
    builder.dispose();
}

#[test]
fn core_services_are_resolvable() {
    let mut builder = HostBuilder::new(environment("Development"));
    let mut context = builder.build_run_context::<PlainHost>().expect("构建成功");
    let resolver = context.resolver().expect("上下文未释放");

    let access = resolver
        .get_required::<dyn ConfigurationAccess>()
        .expect("配置接口已注册");
    assert_eq!(access.get("environment:name").as_deref(), Some("Development"));
    let factory = resolver
        .get_required::<LoggerFactory>()
        .expect("日志工厂已注册");
    assert!(Arc::ptr_eq(&factory, builder.logger_factory()));
    let described = resolver
        .get_required::<HostingEnvironment>()
        .expect("环境描述已注册");
    assert!(described.is_development());
    assert_eq!(
        resolver
            .get_required::<spark_bootstrap::Logger>()
            .expect("通用日志器已注册")
            .category(),
        "pipeline-tests"
    );

    context.dispose();
    builder.dispose();
}

#[test]
fn source_handlers_observe_cumulative_mutations_in_order() {
    let observed: Arc<Mutex<Vec<Vec<String>>>> = Arc::default();
    let mut builder = HostBuilder::new(environment("Production"));

    for marker in ["first", "second", "third"] {
        let observed = Arc::clone(&observed);
        builder
            .add_configuration_source_handler(move |param| {
                observed.lock().push(param.builder.source_names());
                param
                    .builder
                    .add(MemorySource::named(marker, [("marker", marker)]));
                Ok(())
            })
            .expect("登记成功");
    }

    let mut context = builder.build_run_context::<PlainHost>().expect("构建成功");
    let snapshots = observed.lock().clone();
    assert_eq!(
        snapshots,
        vec![
            vec!["environment".to_owned()],
            vec!["environment".to_owned(), "first".to_owned()],
            vec!["environment".to_owned(), "first".to_owned(), "second".to_owned()],
        ],
        "后登记的处理器观察到此前全部修改"
    );
    assert_eq!(
        configuration_of(&context).get("marker").as_deref(),
        Some("third"),
        "最后添加的源优先"
    );

    context.dispose();
    builder.dispose();
}

#[test]
fn stages_run_in_fixed_order() {
    let trail: Arc<Mutex<Vec<&'static str>>> = Arc::default();
    let mut builder = HostBuilder::new(environment("Production"));

    let t = Arc::clone(&trail);
    builder
        .add_post_resolution_handler(move |_| {
            t.lock().push("post-resolution");
            Ok(())
        })
        .expect("登记成功");
    let t = Arc::clone(&trail);
    builder
        .add_registration_handler(move |_| {
            t.lock().push("registration");
            Ok(())
        })
        .expect("登记成功");
    let t = Arc::clone(&trail);
    builder
        .add_logging_handler(move |_| {
            t.lock().push("logging");
            Ok(())
        })
        .expect("登记成功");
    let t = Arc::clone(&trail);
    builder
        .add_configuration_handler(move |_| {
            t.lock().push("configuration");
            Ok(())
        })
        .expect("登记成功");
    let t = Arc::clone(&trail);
    builder
        .add_configuration_source_handler(move |_| {
            t.lock().push("source");
            Ok(())
        })
        .expect("登记成功");

    let mut context = builder.build_run_context::<PlainHost>().expect("构建成功");
    assert_eq!(
        *trail.lock(),
        [
            "source",
            "configuration",
            "logging",
            "registration",
            "post-resolution"
        ]
    );

    context.dispose();
    builder.dispose();
}

#[test]
fn late_registration_only_affects_next_build() {
    let mut builder = HostBuilder::new(environment("Production"));
    let mut first = builder.build_run_context::<PlainHost>().expect("首次构建成功");

    builder
        .add_configuration_handler(|param| {
            param.configuration.set("late", "yes");
            Ok(())
        })
        .expect("登记成功");
    let mut second = builder.build_run_context::<PlainHost>().expect("再次构建成功");

    assert_eq!(configuration_of(&first).get("late"), None, "已产出的上下文不受影响");
    assert_eq!(configuration_of(&second).get("late").as_deref(), Some("yes"));

    first.dispose();
    second.dispose();
    builder.dispose();
}

struct LeftHost;

impl FromServices for LeftHost {
    fn from_services(_resolver: &dyn Resolver) -> Result<Self, ResolutionError> {
        Ok(LeftHost)
    }
}

struct RightHost;

impl FromServices for RightHost {
    fn from_services(_resolver: &dyn Resolver) -> Result<Self, ResolutionError> {
        Ok(RightHost)
    }
}

/// 在线程中构建、解析宿主并写入一个只属于本次构建的键，返回该次构建的配置。
fn build_on_thread<THost>(builder: &HostBuilder, marker: &str) -> Arc<Configuration>
where
    THost: FromServices,
{
    let mut context = builder.build_run_context::<THost>().expect("并发构建成功");
    assert!(context.host().is_ok(), "各自的宿主类型均可解析");
    let configuration = configuration_of(&context);
    configuration.set("Concurrent:Marker", marker);
    context.dispose();
    configuration
}

#[test]
fn concurrent_builds_with_different_hosts_are_isolated() {
    let registrations = Arc::new(AtomicUsize::new(0));
    let mut builder = HostBuilder::new(environment("Production"));
    let counter = Arc::clone(&registrations);
    builder
        .add_configuration_source_handler(|param| {
            param
                .builder
                .add(MemorySource::new([("Concurrent:Marker", "unset")]));
            Ok(())
        })
        .expect("登记成功")
        .add_registration_handler(move |_param| {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(())
        })
        .expect("登记成功");

    for _ in 0..8 {
        let shared = &builder;
        let (left, right) = std::thread::scope(|scope| {
            let left = scope.spawn(|| build_on_thread::<LeftHost>(shared, "left"));
            let right = scope.spawn(|| build_on_thread::<RightHost>(shared, "right"));
            (
                left.join().expect("左侧构建线程不应 panic"),
                right.join().expect("右侧构建线程不应 panic"),
            )
        });

        assert!(!Arc::ptr_eq(&left, &right), "每次构建产出独立的配置");
        assert_eq!(left.get("Concurrent:Marker").as_deref(), Some("left"));
        assert_eq!(right.get("Concurrent:Marker").as_deref(), Some("right"));
    }

    assert_eq!(registrations.load(Ordering::SeqCst), 16, "每次构建各执行一次注册处理器");
    builder.dispose();
}

#[test]
fn disposed_builder_rejects_every_operation() {
    let mut builder = HostBuilder::new(environment("Production"));
    builder.dispose();
    builder.dispose();
    assert!(builder.is_disposed());

    let errors = [
        builder
            .add_configuration_source_handler(|_| Ok(()))
            .map(|_| ())
            .expect_err("释放后拒绝登记"),
        builder
            .add_configuration_handler(|_| Ok(()))
            .map(|_| ())
            .expect_err("释放后拒绝登记"),
        builder
            .add_logging_handler(|_| Ok(()))
            .map(|_| ())
            .expect_err("释放后拒绝登记"),
        builder
            .add_registration_handler(|_| Ok(()))
            .map(|_| ())
            .expect_err("释放后拒绝登记"),
        builder
            .add_post_resolution_handler(|_| Ok(()))
            .map(|_| ())
            .expect_err("释放后拒绝登记"),
        builder
            .build_run_context::<PlainHost>()
            .map(|_| ())
            .expect_err("释放后拒绝构建"),
    ];
    assert!(errors.iter().all(BootstrapError::is_disposed));
    assert!(builder.logger_factory().is_disposed(), "自有工厂随构建器释放");
}

#[test]
fn failing_stage_stops_the_pipeline() {
    let registrations = Arc::new(AtomicUsize::new(0));
    let mut builder = HostBuilder::new(environment("Production"));
    builder
        .add_logging_handler(|_| Err("sink unavailable".into()))
        .expect("登记成功");
    let counter = Arc::clone(&registrations);
    builder
        .add_registration_handler(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(())
        })
        .expect("登记成功");

    let error = builder
        .build_run_context::<PlainHost>()
        .expect_err("日志阶段失败");
    assert_eq!(error.stage(), Some(Stage::Logging));
    assert_eq!(error.to_string(), "logging handler failed: sink unavailable");
    assert_eq!(registrations.load(Ordering::SeqCst), 0, "后续阶段不执行");

    builder.dispose();
}

#[test]
fn root_factory_failure_is_reported() {
    let mut builder = HostBuilder::new(environment("Production"));
    builder
        .set_resolution_root_factory(|_| Err("container offline".into()))
        .expect("登记成功");

    let error = builder
        .build_run_context::<PlainHost>()
        .expect_err("根工厂失败");
    assert!(matches!(error, BootstrapError::RootFactory { .. }));
    let source = error.into_handler_error().expect("可取回原始错误");
    assert_eq!(source.to_string(), "container offline");

    builder.dispose();
}

#[test]
fn post_resolution_can_replace_the_root() {
    let mut builder = HostBuilder::new(environment("Production"));
    builder
        .add_post_resolution_handler(|param| {
            let mut services = spark_bootstrap::ServiceCollection::new();
            services.add_instance(Arc::new(String::from("replaced")));
            services.add_activated::<PlainHost>(spark_bootstrap::Lifetime::Scoped);
            *param.root = Arc::new(services.build());
            Ok(())
        })
        .expect("登记成功");

    let mut context = builder.build_run_context::<PlainHost>().expect("构建成功");
    let resolver = context.resolver().expect("上下文未释放");
    assert_eq!(
        *resolver.get_required::<String>().expect("替换后的根可解析"),
        "replaced"
    );
    assert!(
        resolver.get::<Configuration>().expect("可选解析不报错").is_none(),
        "替换后的根不再包含核心服务"
    );

    context.dispose();
    builder.dispose();
}

#[derive(Default)]
struct MessageLayer {
    messages: Arc<Mutex<Vec<String>>>,
}

struct MessageVisitor<'a>(&'a mut Option<String>);

impl Visit for MessageVisitor<'_> {
    fn record_debug(&mut self, field: &Field, value: &dyn std::fmt::Debug) {
        if field.name() == "message" {
            *self.0 = Some(format!("{value:?}"));
        }
    }
}

impl<S: Subscriber> Layer<S> for MessageLayer {
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        let mut message = None;
        event.record(&mut MessageVisitor(&mut message));
        if let Some(message) = message {
            self.messages.lock().push(message);
        }
    }
}

#[test]
fn empty_registration_stage_is_reported_through_the_factory() {
    let messages: Arc<Mutex<Vec<String>>> = Arc::default();
    let mut builder = HostBuilder::new(environment("Production"));
    let shared = Arc::clone(&messages);
    builder
        .add_logging_handler(move |param| {
            let shared = Arc::clone(&shared);
            param.logger_factory.add_layer("capture", move || {
                MessageLayer {
                    messages: Arc::clone(&shared),
                }
                .boxed()
            })?;
            Ok(())
        })
        .expect("登记成功");

    let mut context = builder.build_run_context::<PlainHost>().expect("构建成功");
    let captured = messages.lock().clone();
    assert!(
        captured
            .iter()
            .any(|message| message.contains("registration handlers collection is empty")),
        "空注册阶段需要告警: {captured:?}"
    );
    assert!(captured.iter().any(|message| message == "building resolution root"));

    context.dispose();
    builder.dispose();
}
