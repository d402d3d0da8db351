//! # error 模块说明
//!
//! ## 角色定位（Why）
//! - 为引导流水线对外暴露的失败语义提供集中定义：参数非法、对象已释放、处理器失败、
//!   依赖解析失败以及配置加载失败；
//! - 所有错误均实现 `thiserror::Error`，可直接交给 `anyhow`/`Box<dyn Error>` 等上层设施处理。
//!
//! ## 传播策略（What）
//! - 处理器返回的错误以 [`BootstrapError::Handler`] 原样包裹，`source()` 即为处理器抛出的原始对象，
//!   调用方可通过 [`BootstrapError::into_handler_error`] 取回并向下转型；
//! - 解析失败在首次访问宿主对象时暴露，而非构建运行上下文时。

use std::{error::Error as StdError, path::PathBuf};

use thiserror::Error;

use crate::handlers::Stage;

/// 处理器、根工厂与宿主对象共享的装箱错误类型。
pub type BoxError = Box<dyn StdError + Send + Sync + 'static>;

/// 各阶段处理器的返回值。
pub type HandlerResult = Result<(), BoxError>;

/// 引导框架的统一错误域。
///
/// # 教案式说明
/// - **意图 (Why)**：将引导过程的四类失败（非法参数、释放后使用、处理器失败、解析失败）映射为可匹配的枚举，
///   同时为配置与 IO 失败保留独立变体，便于命令行宿主决定退出码；
/// - **契约 (What)**：
///   - 非法参数在接收参数的调用点立即返回，不会产生任何状态变更；
///   - `Disposed` 由 Builder 与运行上下文在释放后的任意调用上返回；
///   - `Handler`/`RootFactory` 终止剩余阶段，且不会返回任何运行上下文；
/// - **风险 (Trade-offs)**：处理器错误使用 `Box<dyn Error>` 保存，牺牲静态类型换取对任意业务错误的透传。
#[derive(Debug, Error)]
pub enum BootstrapError {
    /// 必填输入为空或不合法。
    #[error("invalid argument `{argument}`: {reason}")]
    InvalidArgument {
        argument: &'static str,
        reason: String,
    },

    /// 对象释放后仍被调用。
    #[error("`{object}` has already been disposed")]
    Disposed { object: &'static str },

    /// 某阶段的处理器返回失败，剩余阶段均未执行。
    #[error("{stage} handler failed: {source}")]
    Handler {
        stage: Stage,
        #[source]
        source: BoxError,
    },

    /// 解析根工厂返回失败。
    #[error("resolution root factory failed: {source}")]
    RootFactory {
        #[source]
        source: BoxError,
    },

    /// 配置源加载、刷新或绑定失败。
    #[error(transparent)]
    Configuration(#[from] ConfigurationError),

    /// 依赖解析失败，通常在首次访问宿主对象时出现。
    #[error(transparent)]
    Resolution(#[from] ResolutionError),

    /// 宿主对象的 `run` 返回失败。
    #[error("hosted object failed: {source}")]
    Host {
        #[source]
        source: BoxError,
    },

    /// 读取进程环境（工作目录等）失败。
    #[error("failed to inspect the process environment: {0}")]
    Io(#[from] std::io::Error),
}

impl BootstrapError {
    /// 构造非法参数错误的便捷函数。
    pub(crate) fn invalid_argument(argument: &'static str, reason: impl Into<String>) -> Self {
        Self::InvalidArgument {
            argument,
            reason: reason.into(),
        }
    }

    /// 返回处理器失败所在的阶段；其它变体返回 `None`。
    pub fn stage(&self) -> Option<Stage> {
        match self {
            Self::Handler { stage, .. } => Some(*stage),
            Self::RootFactory { .. } => Some(Stage::RootFactory),
            _ => None,
        }
    }

    /// 取回处理器（或根工厂）抛出的原始错误。
    ///
    /// - **契约 (What)**：若错误来源于处理器则返回 `Ok(原始错误)`，否则原样返回 `Err(self)`；
    /// - **用途 (Why)**：测试与宿主可以据此 `downcast` 出业务自定义错误类型。
    pub fn into_handler_error(self) -> Result<BoxError, Self> {
        match self {
            Self::Handler { source, .. } | Self::RootFactory { source } => Ok(source),
            other => Err(other),
        }
    }

    /// 是否为“释放后使用”错误。
    pub fn is_disposed(&self) -> bool {
        matches!(
            self,
            Self::Disposed { .. } | Self::Resolution(ResolutionError::Disposed)
        )
    }
}

/// 依赖解析错误。
#[derive(Debug, Error)]
pub enum ResolutionError {
    /// 目标类型没有任何注册。
    #[error("no service registered for `{type_name}`")]
    NotRegistered { type_name: &'static str },

    /// 在解析根上请求了作用域服务。
    #[error("scoped service `{type_name}` cannot be resolved from the root provider")]
    ScopeRequired { type_name: &'static str },

    /// 依赖链出现环。
    #[error("circular dependency detected: {chain}")]
    Circular { chain: String },

    /// 注册的实例与请求类型不一致，通常意味着替换后的后端返回了错误的对象。
    #[error("registered instance does not match requested type `{type_name}`")]
    TypeMismatch { type_name: &'static str },

    /// 工厂在构造实例时失败。
    #[error("failed to activate `{type_name}`: {source}")]
    Activation {
        type_name: &'static str,
        #[source]
        source: BoxError,
    },

    /// 作用域已释放。
    #[error("the resolution scope has already been disposed")]
    Disposed,
}

impl ResolutionError {
    /// 将任意业务错误包装为激活失败。
    pub fn activation(type_name: &'static str, source: impl Into<BoxError>) -> Self {
        Self::Activation {
            type_name,
            source: source.into(),
        }
    }
}

/// 配置源加载与绑定错误。
#[derive(Debug, Error)]
pub enum ConfigurationError {
    /// 必需的配置文件不存在。
    #[error("configuration file `{}` was not found", .path.display())]
    MissingFile { path: PathBuf },

    /// 读取配置文件失败。
    #[error("failed to read configuration file `{}`: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// JSON 语法错误。
    #[error("invalid JSON in `{}`: {source}", .path.display())]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    /// TOML 语法错误。
    #[error("invalid TOML in `{}`: {source}", .path.display())]
    Toml {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    /// 文档结构无法展开为键值对，例如顶层不是对象。
    #[error("configuration document `{}` is invalid: {reason}", .path.display())]
    InvalidDocument { path: PathBuf, reason: String },

    /// 命令行参数缺少取值。
    #[error("command-line argument `{argument}` is missing a value")]
    InvalidCommandLine { argument: String },

    /// 单值解析失败。
    #[error("value `{value}` of key `{key}` cannot be parsed: {reason}")]
    Parse {
        key: String,
        value: String,
        reason: String,
    },

    /// 配置节绑定到强类型选项失败。
    #[error("failed to bind section `{section}`: {source}")]
    Bind {
        section: String,
        #[source]
        source: serde::de::value::Error,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Error)]
    #[error("boom")]
    struct Boom;

    #[test]
    fn handler_error_can_be_recovered() {
        let error = BootstrapError::Handler {
            stage: Stage::Registration,
            source: Box::new(Boom),
        };
        assert_eq!(error.stage(), Some(Stage::Registration));
        assert!(error.to_string().contains("boom"));

        let source = error.into_handler_error().expect("处理器错误必须可取回");
        assert!(source.downcast_ref::<Boom>().is_some());
    }

    #[test]
    fn non_handler_error_is_returned_untouched() {
        let error = BootstrapError::Disposed {
            object: "HostBuilder",
        };
        let error = error.into_handler_error().expect_err("非处理器错误需原样返回");
        assert!(error.is_disposed());
    }
}
