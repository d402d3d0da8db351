//! 各阶段处理器的参数。
//!
//! 构建器在每次调用处理器前新建对应的参数结构体，每个字段对应一个协作者；
//! 可变借用只出现在该阶段允许修改的对象上（配置源列表、服务注册表、解析根）。

use std::sync::Arc;

use crate::{
    configuration::{Configuration, ConfigurationBuilder},
    environment::HostingEnvironment,
    logging::LoggerFactory,
    services::{ResolutionRoot, ServiceCollection},
};

/// 配置源阶段：可增删、重排配置源。
#[derive(Debug)]
pub struct ConfigurationSourceParam<'a> {
    pub builder: &'a mut ConfigurationBuilder,
    pub environment: &'a HostingEnvironment,
}

/// 配置值阶段：可覆盖或注入配置值。
#[derive(Debug)]
pub struct ConfigurationParam<'a> {
    pub configuration: &'a Arc<Configuration>,
    pub environment: &'a HostingEnvironment,
}

/// 日志阶段：向工厂挂接后端。
#[derive(Debug)]
pub struct LoggingParam<'a> {
    pub logger_factory: &'a Arc<LoggerFactory>,
    pub configuration: &'a Arc<Configuration>,
    pub environment: &'a HostingEnvironment,
}

/// 注册阶段：向注册表追加绑定。
#[derive(Debug)]
pub struct RegistrationParam<'a> {
    pub services: &'a mut ServiceCollection,
    pub logger_factory: &'a Arc<LoggerFactory>,
    pub configuration: &'a Arc<Configuration>,
    pub environment: &'a HostingEnvironment,
}

/// 构建解析根时传入根工厂的参数。
#[derive(Debug)]
pub struct RootFactoryParam<'a> {
    pub services: &'a ServiceCollection,
    pub logger_factory: &'a Arc<LoggerFactory>,
    pub configuration: &'a Arc<Configuration>,
    pub environment: &'a HostingEnvironment,
}

/// 后解析阶段：可读取或整体替换解析根。
pub struct PostResolutionParam<'a> {
    pub root: &'a mut Arc<dyn ResolutionRoot>,
    pub logger_factory: &'a Arc<LoggerFactory>,
    pub configuration: &'a Arc<Configuration>,
    pub environment: &'a HostingEnvironment,
}

impl std::fmt::Debug for PostResolutionParam<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PostResolutionParam")
            .field("logger_factory", &self.logger_factory)
            .field("configuration", &self.configuration)
            .field("environment", &self.environment)
            .finish_non_exhaustive()
    }
}
