//! 启动适配器：把五个阶段回调与根工厂打包为一个对象。

use std::{fmt, sync::Arc};

use crate::{
    error::{BoxError, HandlerResult},
    handlers::{
        ConfigurationHandler, ConfigurationSourceHandler, LoggingHandler, PostResolutionHandler,
        RegistrationHandler, ResolutionRootFactory, default_resolution_root_factory,
    },
    params::{
        ConfigurationParam, ConfigurationSourceParam, LoggingParam, PostResolutionParam,
        RegistrationParam, RootFactoryParam,
    },
    services::ResolutionRoot,
};

/// 启动适配器（Startup Adapter）。
///
/// # 教案级注释
/// - **意图 (Why)**：应用可以把全部引导逻辑集中在一个值里，通过
///   [`HostBuilder::apply_startup`](crate::builder::HostBuilder::apply_startup) 一次注册；
/// - **执行逻辑 (How)**：内部是六个回调槽位，未设置的槽位为空操作，根工厂默认直接物化注册表；
/// - **契约 (What)**：应用适配器会向五个处理器序列各追加一项（包括空操作），并替换构建器的根工厂。
#[derive(Clone)]
pub struct HostStartup {
    pub(crate) configuration_sources: ConfigurationSourceHandler,
    pub(crate) configuration: ConfigurationHandler,
    pub(crate) logging: LoggingHandler,
    pub(crate) registration: RegistrationHandler,
    pub(crate) post_resolution: PostResolutionHandler,
    pub(crate) resolution_root: ResolutionRootFactory,
}

impl Default for HostStartup {
    fn default() -> Self {
        Self {
            configuration_sources: Arc::new(|_: ConfigurationSourceParam<'_>| Ok(())),
            configuration: Arc::new(|_: ConfigurationParam<'_>| Ok(())),
            logging: Arc::new(|_: LoggingParam<'_>| Ok(())),
            registration: Arc::new(|_: RegistrationParam<'_>| Ok(())),
            post_resolution: Arc::new(|_: PostResolutionParam<'_>| Ok(())),
            resolution_root: default_resolution_root_factory(),
        }
    }
}

impl HostStartup {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_configuration_sources<F>(mut self, handler: F) -> Self
    where
        F: Fn(ConfigurationSourceParam<'_>) -> HandlerResult + Send + Sync + 'static,
    {
        self.configuration_sources = Arc::new(handler);
        self
    }

    pub fn with_configuration<F>(mut self, handler: F) -> Self
    where
        F: Fn(ConfigurationParam<'_>) -> HandlerResult + Send + Sync + 'static,
    {
        self.configuration = Arc::new(handler);
        self
    }

    pub fn with_logging<F>(mut self, handler: F) -> Self
    where
        F: Fn(LoggingParam<'_>) -> HandlerResult + Send + Sync + 'static,
    {
        self.logging = Arc::new(handler);
        self
    }

    pub fn with_registration<F>(mut self, handler: F) -> Self
    where
        F: Fn(RegistrationParam<'_>) -> HandlerResult + Send + Sync + 'static,
    {
        self.registration = Arc::new(handler);
        self
    }

    pub fn with_post_resolution<F>(mut self, handler: F) -> Self
    where
        F: Fn(PostResolutionParam<'_>) -> HandlerResult + Send + Sync + 'static,
    {
        self.post_resolution = Arc::new(handler);
        self
    }

    /// 替换根工厂，用于接入其它容器后端。
    pub fn with_resolution_root<F>(mut self, factory: F) -> Self
    where
        F: Fn(RootFactoryParam<'_>) -> Result<Arc<dyn ResolutionRoot>, BoxError>
            + Send
            + Sync
            + 'static,
    {
        self.resolution_root = Arc::new(factory);
        self
    }
}

impl fmt::Debug for HostStartup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HostStartup").finish_non_exhaustive()
    }
}
