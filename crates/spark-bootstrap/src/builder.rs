use std::{fmt, sync::Arc};

use crate::{
    cancellation::Cancellation,
    configuration::{Configuration, ConfigurationAccess, ConfigurationBuilder, MemorySource},
    environment::{DEFAULT_ENVIRONMENT_KEY, HostingEnvironment},
    error::{BootstrapError, BoxError, HandlerResult},
    handlers::{HandlerRegistry, ResolutionRootFactory, Stage, default_resolution_root_factory},
    host::Host,
    logging::{Logger, LoggerFactory},
    params::{
        ConfigurationParam, ConfigurationSourceParam, LoggingParam, PostResolutionParam,
        RegistrationParam, RootFactoryParam,
    },
    run_context::RunContext,
    services::{FromServices, Lifetime, ResolutionRoot, ServiceCollection},
    startup::HostStartup,
};

/// 播种配置中环境名所在的键。
pub const ENVIRONMENT_NAME_KEY: &str = "environment:name";

/// 播种配置中内容根所在的键。
pub const CONTENT_ROOT_PATH_KEY: &str = "environment:contentRootPath";

/// 播种配置源的名称。
pub const ENVIRONMENT_SOURCE_NAME: &str = "environment";

/// 日志工厂的归属：决定构建器释放时是否一并释放工厂。
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Ownership {
    /// 由构建器负责释放。
    Owned,
    /// 由外部负责释放。
    External,
}

/// `HostBuilder` 按固定顺序重放各阶段处理器，产出运行上下文。
///
/// # 教案级注释
/// - **设计目标 (Why)**
///   - 为应用提供统一的引导入口：配置源 → 配置值 → 日志 → 服务注册 → 解析根与后解析，
///     每个阶段只消费前一阶段的产物；
///   - 处理器以声明式方式登记，构建时按阶段一次性重放。
/// - **体系位置 (Where)**
///   - 应用启动时由调用方创建；[`build_run_context`](Self::build_run_context) 可多次调用，
///     每次都基于新建的配置源列表、注册表与解析根独立执行。
/// - **关键流程 (How)**
///   1. 以环境名与内容根播种配置源，依序执行配置源处理器；
///   2. 物化配置并执行配置值处理器；
///   3. 在当前日志工厂上执行日志处理器（原地修改，不替换工厂）；
///   4. 新建注册表，播种核心单例后执行注册处理器，宿主类型缺失注册时补充作用域注册；
///   5. 调用根工厂得到解析根，再执行后解析处理器（可整体替换解析根）；
///   6. 从最终解析根派生作用域，包装为 [`RunContext`]。
/// - **契约说明 (What)**
///   - 所有登记方法返回 `Result<&mut Self, BootstrapError>`，释放后返回 [`BootstrapError::Disposed`]；
///   - 任一处理器失败立即终止后续阶段，错误以 [`BootstrapError::Handler`] 原样携带；
///   - 宿主类型的解析延迟到首次访问 [`RunContext::host`]。
/// - **风险提示 (Trade-offs)**
///   - 日志工厂在多次构建之间共享，处理器若重复挂接后端会在每次构建时叠加；
///   - 处理器失败时，本次构建中已创建的对象不会被特别回收，处理器应尽量无副作用。
pub struct HostBuilder {
    environment: Arc<HostingEnvironment>,
    handlers: HandlerRegistry,
    root_factory: ResolutionRootFactory,
    logger_factory: Arc<LoggerFactory>,
    logger_ownership: Ownership,
    /// 被替换下来、仍由构建器持有的工厂；已产出的运行上下文可能仍在使用，释放构建器时一并释放。
    retired_factories: Vec<Arc<LoggerFactory>>,
    disposed: bool,
}

impl HostBuilder {
    /// 以环境描述创建构建器，并持有一个新建的日志工厂。
    pub fn new(environment: HostingEnvironment) -> Self {
        Self::with_shared_environment(Arc::new(environment))
    }

    /// 以外部共享的环境描述创建构建器。
    pub fn with_shared_environment(environment: Arc<HostingEnvironment>) -> Self {
        Self {
            environment,
            handlers: HandlerRegistry::new(),
            root_factory: default_resolution_root_factory(),
            logger_factory: Arc::new(LoggerFactory::new()),
            logger_ownership: Ownership::Owned,
            retired_factories: Vec::new(),
            disposed: false,
        }
    }

    /// 以进程环境推导的默认描述创建构建器，环境名取自环境变量 `name_key`。
    pub fn from_environment_key(name_key: &str) -> Result<Self, BootstrapError> {
        HostingEnvironment::from_process(name_key).map(Self::new)
    }

    /// 等价于 `from_environment_key(DEFAULT_ENVIRONMENT_KEY)`。
    pub fn from_process() -> Result<Self, BootstrapError> {
        Self::from_environment_key(DEFAULT_ENVIRONMENT_KEY)
    }

    pub fn environment(&self) -> &Arc<HostingEnvironment> {
        &self.environment
    }

    /// 当前日志工厂。
    pub fn logger_factory(&self) -> &Arc<LoggerFactory> {
        &self.logger_factory
    }

    pub fn logger_ownership(&self) -> Ownership {
        self.logger_ownership
    }

    /// 指定阶段已登记的处理器数量。
    ///
    /// [`Stage::RootFactory`] 不是处理器序列而是单一槽位，始终报告 1（默认工厂或替换后的工厂）。
    pub fn handler_count(&self, stage: Stage) -> usize {
        self.handlers.count(stage)
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed
    }

    pub fn add_configuration_source_handler<F>(
        &mut self,
        handler: F,
    ) -> Result<&mut Self, BootstrapError>
    where
        F: Fn(ConfigurationSourceParam<'_>) -> HandlerResult + Send + Sync + 'static,
    {
        self.ensure_live()?;
        self.handlers.source.push(Arc::new(handler));
        Ok(self)
    }

    pub fn add_configuration_handler<F>(&mut self, handler: F) -> Result<&mut Self, BootstrapError>
    where
        F: Fn(ConfigurationParam<'_>) -> HandlerResult + Send + Sync + 'static,
    {
        self.ensure_live()?;
        self.handlers.configuration.push(Arc::new(handler));
        Ok(self)
    }

    pub fn add_logging_handler<F>(&mut self, handler: F) -> Result<&mut Self, BootstrapError>
    where
        F: Fn(LoggingParam<'_>) -> HandlerResult + Send + Sync + 'static,
    {
        self.ensure_live()?;
        self.handlers.logging.push(Arc::new(handler));
        Ok(self)
    }

    pub fn add_registration_handler<F>(&mut self, handler: F) -> Result<&mut Self, BootstrapError>
    where
        F: Fn(RegistrationParam<'_>) -> HandlerResult + Send + Sync + 'static,
    {
        self.ensure_live()?;
        self.handlers.registration.push(Arc::new(handler));
        Ok(self)
    }

    pub fn add_post_resolution_handler<F>(
        &mut self,
        handler: F,
    ) -> Result<&mut Self, BootstrapError>
    where
        F: Fn(PostResolutionParam<'_>) -> HandlerResult + Send + Sync + 'static,
    {
        self.ensure_live()?;
        self.handlers.post_resolution.push(Arc::new(handler));
        Ok(self)
    }

    /// 替换解析根工厂。
    pub fn set_resolution_root_factory<F>(
        &mut self,
        factory: F,
    ) -> Result<&mut Self, BootstrapError>
    where
        F: Fn(RootFactoryParam<'_>) -> Result<Arc<dyn ResolutionRoot>, BoxError>
            + Send
            + Sync
            + 'static,
    {
        self.ensure_live()?;
        self.root_factory = Arc::new(factory);
        Ok(self)
    }

    /// 应用启动适配器：五个回调分别追加到对应序列，根工厂被替换。
    pub fn apply_startup(&mut self, startup: HostStartup) -> Result<&mut Self, BootstrapError> {
        self.ensure_live()?;
        let HostStartup {
            configuration_sources,
            configuration,
            logging,
            registration,
            post_resolution,
            resolution_root,
        } = startup;
        self.handlers.source.push(configuration_sources);
        self.handlers.configuration.push(configuration);
        self.handlers.logging.push(logging);
        self.handlers.registration.push(registration);
        self.handlers.post_resolution.push(post_resolution);
        self.root_factory = resolution_root;
        Ok(self)
    }

    /// 使用外部持有的日志工厂，构建器释放时不会释放它。
    pub fn use_logger_factory(
        &mut self,
        factory: Arc<LoggerFactory>,
    ) -> Result<&mut Self, BootstrapError> {
        self.set_logger_factory(factory, Ownership::External)
    }

    /// 替换日志工厂。
    ///
    /// 只替换引用：已产出的运行上下文把旧工厂登记为核心单例，仍可继续使用；
    /// 旧工厂若由构建器持有，则延迟到 [`dispose`](Self::dispose) 时释放。
    pub fn set_logger_factory(
        &mut self,
        factory: Arc<LoggerFactory>,
        ownership: Ownership,
    ) -> Result<&mut Self, BootstrapError> {
        self.ensure_live()?;
        let previous = std::mem::replace(&mut self.logger_factory, factory);
        if self.logger_ownership == Ownership::Owned && !Arc::ptr_eq(&previous, &self.logger_factory)
        {
            self.retired_factories.push(previous);
        }
        self.logger_ownership = ownership;
        Ok(self)
    }

    /// 执行完整流水线，产出宿主类型为 `THost` 的运行上下文。
    ///
    /// # 教案式说明
    /// - **前置条件**：构建器未释放；
    /// - **后置条件**：成功时返回的上下文独占一个新作用域，宿主尚未解析；
    /// - **错误 (What)**：
    ///   - 释放后调用返回 [`BootstrapError::Disposed`]；
    ///   - 配置源加载失败返回 [`BootstrapError::Configuration`]；
    ///   - 处理器失败返回 [`BootstrapError::Handler`]，根工厂失败返回 [`BootstrapError::RootFactory`]。
    pub fn build_run_context<THost>(&self) -> Result<RunContext<THost>, BootstrapError>
    where
        THost: FromServices,
    {
        self.ensure_live()?;
        let environment = &*self.environment;
        let logger = self.logger_factory.create_logger_for::<HostBuilder>();

        let configuration = self.build_configuration(&logger)?;

        logger.debug(format_args!(
            "running {} logging handlers",
            self.handlers.logging.len()
        ));
        for handler in &self.handlers.logging {
            handler(LoggingParam {
                logger_factory: &self.logger_factory,
                configuration: &configuration,
                environment,
            })
            .map_err(stage_failed(Stage::Logging))?;
        }

        let mut services = self.build_services(&logger, &configuration)?;
        if !services.contains::<THost>() {
            services.add_activated::<THost>(Lifetime::Scoped);
        }

        logger.debug("building resolution root");
        let mut root = (self.root_factory)(RootFactoryParam {
            services: &services,
            logger_factory: &self.logger_factory,
            configuration: &configuration,
            environment,
        })
        .map_err(|source| BootstrapError::RootFactory { source })?;

        if self.handlers.post_resolution.is_empty() {
            logger.debug("post-resolution handlers collection is empty");
        } else {
            logger.debug(format_args!(
                "configuring the resolution root using a total of {} handlers",
                self.handlers.post_resolution.len()
            ));
        }
        for handler in &self.handlers.post_resolution {
            handler(PostResolutionParam {
                root: &mut root,
                logger_factory: &self.logger_factory,
                configuration: &configuration,
                environment,
            })
            .map_err(stage_failed(Stage::PostResolution))?;
        }

        let scope = root.create_scope();
        Ok(RunContext::new(
            scope,
            self.logger_factory.create_logger_for::<RunContext<THost>>(),
        ))
    }

    /// 构建运行上下文、运行宿主并在结束后释放上下文。
    pub async fn run_host<THost>(&self, cancellation: Cancellation) -> Result<(), BootstrapError>
    where
        THost: Host + FromServices,
    {
        let mut context = self.build_run_context::<THost>()?;
        let outcome = context.run(cancellation).await;
        context.dispose();
        outcome
    }

    /// 释放构建器：清空全部处理器，并释放自身持有的日志工厂（含被替换下来的旧工厂）。幂等。
    pub fn dispose(&mut self) {
        if self.disposed {
            return;
        }
        self.disposed = true;
        self.handlers.clear();
        let current_owned = self.logger_ownership == Ownership::Owned;
        for factory in self.retired_factories.drain(..) {
            // 旧工厂若又以外部归属被设回，则交还外部释放。
            if current_owned || !Arc::ptr_eq(&factory, &self.logger_factory) {
                factory.dispose();
            }
        }
        if current_owned {
            self.logger_factory.dispose();
        }
    }

    fn ensure_live(&self) -> Result<(), BootstrapError> {
        if self.disposed {
            return Err(BootstrapError::Disposed {
                object: "HostBuilder",
            });
        }
        Ok(())
    }

    fn build_configuration(&self, logger: &Logger) -> Result<Arc<Configuration>, BootstrapError> {
        let environment = &*self.environment;

        let mut sources = ConfigurationBuilder::new();
        sources.add(MemorySource::named(
            ENVIRONMENT_SOURCE_NAME,
            [
                (ENVIRONMENT_NAME_KEY, environment.name().to_owned()),
                (
                    CONTENT_ROOT_PATH_KEY,
                    environment.content_root_path().to_string_lossy().into_owned(),
                ),
            ],
        ));

        logger.debug(format_args!(
            "running {} configuration source handlers",
            self.handlers.source.len()
        ));
        for handler in &self.handlers.source {
            handler(ConfigurationSourceParam {
                builder: &mut sources,
                environment,
            })
            .map_err(stage_failed(Stage::Source))?;
        }

        let configuration = Arc::new(sources.build()?);
        logger.debug(format_args!(
            "running {} configuration handlers",
            self.handlers.configuration.len()
        ));
        for handler in &self.handlers.configuration {
            handler(ConfigurationParam {
                configuration: &configuration,
                environment,
            })
            .map_err(stage_failed(Stage::Configuration))?;
        }
        Ok(configuration)
    }

    fn build_services(
        &self,
        logger: &Logger,
        configuration: &Arc<Configuration>,
    ) -> Result<ServiceCollection, BootstrapError> {
        let environment = &*self.environment;

        logger.debug("configuring core services");
        let mut services = ServiceCollection::new();
        let application_logger = self
            .logger_factory
            .create_logger(environment.application_name());
        let access: Arc<dyn ConfigurationAccess> = Arc::clone(configuration) as _;
        services
            .add_instance(Arc::clone(&self.logger_factory))
            .add_instance(Arc::new(application_logger))
            .add_instance(Arc::clone(configuration))
            .add_instance(access)
            .add_instance(Arc::clone(&self.environment));

        if self.handlers.registration.is_empty() {
            logger.warn(
                "service registration handlers collection is empty; the host will only have access to core services",
            );
            return Ok(services);
        }

        logger.debug(format_args!(
            "configuring the host services using a total of {} handlers",
            self.handlers.registration.len()
        ));
        for handler in &self.handlers.registration {
            handler(RegistrationParam {
                services: &mut services,
                logger_factory: &self.logger_factory,
                configuration,
                environment,
            })
            .map_err(stage_failed(Stage::Registration))?;
        }
        Ok(services)
    }
}

impl Drop for HostBuilder {
    fn drop(&mut self) {
        if !self.disposed {
            tracing::warn!(
                environment = self.environment.name(),
                "HostBuilder dropped without dispose; releasing handlers"
            );
            self.dispose();
        }
    }
}

impl fmt::Debug for HostBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HostBuilder")
            .field("environment", &self.environment.name())
            .field("handlers", &self.handlers)
            .field("logger_factory", &self.logger_factory)
            .field("logger_ownership", &self.logger_ownership)
            .field("retired_factories", &self.retired_factories.len())
            .field("disposed", &self.disposed)
            .finish()
    }
}

fn stage_failed(stage: Stage) -> impl FnOnce(BoxError) -> BootstrapError {
    move |source| BootstrapError::Handler { stage, source }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::{Resolver, ResolverExt};

    struct Marker;

    impl FromServices for Marker {
        fn from_services(_resolver: &dyn Resolver) -> Result<Self, crate::error::ResolutionError> {
            Ok(Marker)
        }
    }

    fn builder() -> HostBuilder {
        let environment =
            HostingEnvironment::new("Development", "marker", "/srv/marker").expect("合法环境");
        HostBuilder::new(environment)
    }

    #[test]
    fn replaced_owned_factory_lives_until_dispose() {
        let mut builder = builder();
        let original = Arc::clone(builder.logger_factory());
        let mut context = builder.build_run_context::<Marker>().expect("构建成功");

        let external = Arc::new(LoggerFactory::new());
        builder
            .use_logger_factory(Arc::clone(&external))
            .expect("未释放的构建器可替换工厂");
        assert_eq!(builder.logger_ownership(), Ownership::External);

        let in_use = context
            .resolver()
            .expect("上下文未释放")
            .get_required::<LoggerFactory>()
            .expect("工厂为核心单例");
        assert!(Arc::ptr_eq(&in_use, &original));
        assert!(!in_use.is_disposed(), "已产出的上下文仍在使用旧工厂");
        assert!(in_use.add_console("info").is_ok());

        context.dispose();
        builder.dispose();
        assert!(original.is_disposed(), "构建器持有的旧工厂随构建器释放");
        assert!(!external.is_disposed(), "外部工厂不随构建器释放");
    }

    #[test]
    fn startup_registers_every_stage() {
        let mut builder = builder();
        for stage in Stage::ALL {
            let expected = usize::from(stage == Stage::RootFactory);
            assert_eq!(builder.handler_count(stage), expected, "根工厂槽位始终计为 1");
        }

        builder
            .apply_startup(HostStartup::new())
            .expect("未释放的构建器可应用适配器");
        for stage in Stage::ALL {
            assert_eq!(builder.handler_count(stage), 1, "阶段 {stage} 应登记一项");
        }
        builder.dispose();
    }

    #[test]
    fn explicit_host_registration_is_kept() {
        let observed = Arc::new(parking_lot::Mutex::new(None));
        let mut builder = builder();
        let seen = Arc::clone(&observed);
        builder
            .add_registration_handler(|param| {
                param.services.add_singleton(|_: &dyn Resolver| Ok(Arc::new(Marker)));
                Ok(())
            })
            .expect("登记成功")
            .set_resolution_root_factory(move |param| {
                *seen.lock() = param.services.lifetime_of::<Marker>();
                let root: Arc<dyn ResolutionRoot> = Arc::new(param.services.build());
                Ok(root)
            })
            .expect("登记成功");

        let mut context = builder.build_run_context::<Marker>().expect("构建成功");
        assert_eq!(
            *observed.lock(),
            Some(Lifetime::Singleton),
            "显式单例注册不应被作用域注册覆盖"
        );
        let host = context.host().expect("可解析");
        let resolved = context
            .resolver()
            .expect("上下文未释放")
            .get_required::<Marker>()
            .expect("可解析");
        assert!(Arc::ptr_eq(&host, &resolved));

        context.dispose();
        builder.dispose();
    }
}
