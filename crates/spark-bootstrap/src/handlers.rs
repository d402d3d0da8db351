use std::{fmt, sync::Arc};

use crate::{
    error::{BoxError, HandlerResult},
    params::{
        ConfigurationParam, ConfigurationSourceParam, LoggingParam, PostResolutionParam,
        RegistrationParam, RootFactoryParam,
    },
    services::ResolutionRoot,
};

/// 配置源阶段处理器。
pub type ConfigurationSourceHandler =
    Arc<dyn for<'a> Fn(ConfigurationSourceParam<'a>) -> HandlerResult + Send + Sync>;

/// 配置值阶段处理器。
pub type ConfigurationHandler =
    Arc<dyn for<'a> Fn(ConfigurationParam<'a>) -> HandlerResult + Send + Sync>;

/// 日志阶段处理器。
pub type LoggingHandler = Arc<dyn for<'a> Fn(LoggingParam<'a>) -> HandlerResult + Send + Sync>;

/// 注册阶段处理器。
pub type RegistrationHandler =
    Arc<dyn for<'a> Fn(RegistrationParam<'a>) -> HandlerResult + Send + Sync>;

/// 后解析阶段处理器。
pub type PostResolutionHandler =
    Arc<dyn for<'a> Fn(PostResolutionParam<'a>) -> HandlerResult + Send + Sync>;

/// 解析根工厂。
pub type ResolutionRootFactory = Arc<
    dyn for<'a> Fn(RootFactoryParam<'a>) -> Result<Arc<dyn ResolutionRoot>, BoxError>
        + Send
        + Sync,
>;

/// 默认根工厂：直接把注册表物化为内置容器。
pub fn default_resolution_root_factory() -> ResolutionRootFactory {
    Arc::new(|param: RootFactoryParam<'_>| {
        let root: Arc<dyn ResolutionRoot> = Arc::new(param.services.build());
        Ok(root)
    })
}

/// 流水线阶段，执行顺序与声明顺序一致。
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Stage {
    Source,
    Configuration,
    Logging,
    Registration,
    RootFactory,
    PostResolution,
}

impl Stage {
    /// 全部阶段，按执行顺序排列。
    pub const ALL: [Stage; 6] = [
        Stage::Source,
        Stage::Configuration,
        Stage::Logging,
        Stage::Registration,
        Stage::RootFactory,
        Stage::PostResolution,
    ];
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            Stage::Source => "configuration source",
            Stage::Configuration => "configuration",
            Stage::Logging => "logging",
            Stage::Registration => "service registration",
            Stage::RootFactory => "resolution root",
            Stage::PostResolution => "post-resolution",
        };
        f.write_str(text)
    }
}

/// `HandlerRegistry` 按阶段保存有序的处理器序列。
///
/// # 教案级注释
/// - **设计动机 (Why)**
///   - 每个阶段的处理器签名不同，分别保存在五个序列中，插入顺序即执行顺序；
///   - 处理器以 `Arc` 保存，便于启动适配器与构建器共享同一闭包；构建只借用 `&self`，追加只能发生在两次构建之间。
/// - **系统位置 (Where)**
///   - 由 [`HostBuilder`](crate::builder::HostBuilder) 独占，随构建器释放而清空。
/// - **契约 (What)**
///   - 仅追加，不去重；同一闭包注册两次会执行两次；
///   - `count(Stage::RootFactory)` 恒为 1，根工厂不是序列而是单一槽位。
#[derive(Clone, Default)]
pub struct HandlerRegistry {
    pub(crate) source: Vec<ConfigurationSourceHandler>,
    pub(crate) configuration: Vec<ConfigurationHandler>,
    pub(crate) logging: Vec<LoggingHandler>,
    pub(crate) registration: Vec<RegistrationHandler>,
    pub(crate) post_resolution: Vec<PostResolutionHandler>,
}

impl HandlerRegistry {
    /// 构造空的注册表。
    pub fn new() -> Self {
        Self::default()
    }

    /// 指定阶段已注册的处理器数量。
    pub fn count(&self, stage: Stage) -> usize {
        match stage {
            Stage::Source => self.source.len(),
            Stage::Configuration => self.configuration.len(),
            Stage::Logging => self.logging.len(),
            Stage::Registration => self.registration.len(),
            Stage::RootFactory => 1,
            Stage::PostResolution => self.post_resolution.len(),
        }
    }

    /// 清空全部序列。
    pub fn clear(&mut self) {
        self.source.clear();
        self.configuration.clear();
        self.logging.clear();
        self.registration.clear();
        self.post_resolution.clear();
    }
}

impl fmt::Debug for HandlerRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HandlerRegistry")
            .field("source", &self.source.len())
            .field("configuration", &self.configuration.len())
            .field("logging", &self.logging.len())
            .field("registration", &self.registration.len())
            .field("post_resolution", &self.post_resolution.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counts_follow_each_sequence() {
        let mut registry = HandlerRegistry::new();
        registry.logging.push(Arc::new(|_: LoggingParam<'_>| Ok(())));
        registry.logging.push(Arc::new(|_: LoggingParam<'_>| Ok(())));
        assert_eq!(registry.count(Stage::Logging), 2);
        assert_eq!(registry.count(Stage::Source), 0);
        assert_eq!(registry.count(Stage::RootFactory), 1);

        registry.clear();
        assert_eq!(registry.count(Stage::Logging), 0);
    }

    #[test]
    fn stages_display_in_order() {
        let names: Vec<String> = Stage::ALL.iter().map(ToString::to_string).collect();
        assert_eq!(names.first().map(String::as_str), Some("configuration source"));
        assert_eq!(names.last().map(String::as_str), Some("post-resolution"));
    }
}
