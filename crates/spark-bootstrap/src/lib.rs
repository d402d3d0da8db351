#![deny(unsafe_code)]
#![allow(clippy::result_large_err)]
#![doc = "spark-bootstrap: 分阶段装配配置、日志与依赖注入，并运行宿主对象的引导框架。"]
//!
//! # 教案级导读
//! - **整体流程 (How)**：
//!   1. 以 [`HostingEnvironment`] 创建 [`HostBuilder`]，登记各阶段处理器或应用 [`HostStartup`]；
//!   2. 调用 [`HostBuilder::build_run_context`] 依次执行：配置源 → 配置值 → 日志 → 服务注册 →
//!      解析根与后解析，得到 [`RunContext`]；
//!   3. 通过 [`RunContext::host`] 惰性解析宿主对象，或直接 [`RunContext::run`] 运行，结束后释放上下文。
//! - **模块划分 (Where)**：
//!   - [`configuration`]：分层键值配置、配置源与 serde 绑定；
//!   - [`logging`]：基于 `tracing` 的日志工厂与分类日志器；
//!   - [`services`]：单例、作用域、瞬态三种生命周期的解析容器；
//!   - [`handlers`]/[`params`]/[`startup`]：处理器签名、参数与启动适配器。
//! - **契约 (What)**：构建流水线是同步的，唯一的异步边界是 [`Host::run`]。

pub mod builder;
pub mod cancellation;
pub mod configuration;
pub mod environment;
pub mod error;
pub mod handlers;
pub mod host;
pub mod logging;
pub mod params;
pub mod run_context;
pub mod services;
pub mod startup;

pub use async_trait::async_trait;
pub use builder::{HostBuilder, Ownership};
pub use cancellation::Cancellation;
pub use configuration::{Configuration, ConfigurationAccess, ConfigurationBuilder};
pub use environment::HostingEnvironment;
pub use error::{BootstrapError, BoxError, ConfigurationError, HandlerResult, ResolutionError};
pub use handlers::Stage;
pub use host::{Host, HostExt};
pub use logging::{Logger, LoggerFactory};
pub use run_context::{RunContext, RunContextId};
pub use services::{
    FromServices, Lifetime, ResolutionRoot, ResolutionScope, Resolver, ResolverExt,
    ServiceCollection, ServiceProvider,
};
pub use startup::HostStartup;
