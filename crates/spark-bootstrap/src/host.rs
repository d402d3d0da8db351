use async_trait::async_trait;

use crate::{cancellation::Cancellation, error::BoxError};

/// `Host` 是流水线最终解析并运行的长生命周期对象。
///
/// # 教案级注释
/// - **设计目的 (Why)**
///   - 流水线只负责装配，真正的业务循环由宿主对象承载；它从运行上下文的作用域中解析，
///     依赖（配置、日志、业务服务）在构造时注入；
///   - `run` 是整个引导流程中唯一的异步边界：解析宿主 → 运行宿主 → 等待完成或取消。
/// - **体系位置 (Where)**
///   - 由 [`RunContext::host`](crate::run_context::RunContext::host) 惰性解析，
///     经 [`RunContext::run`](crate::run_context::RunContext::run) 或
///     [`HostBuilder::run_host`](crate::builder::HostBuilder::run_host) 驱动。
/// - **契约说明 (What)**
///   - 实现应在 `cancellation` 被触发后尽快返回；
///   - 返回的错误会被包装为 [`BootstrapError::Host`](crate::error::BootstrapError::Host)。
/// - **风险提示 (Trade-offs)**
///   - 使用 `async_trait` 以保持对象安全，代价是每次调用一次堆分配，对一次性的宿主入口可以忽略。
#[async_trait]
pub trait Host: Send + Sync + 'static {
    async fn run(&self, cancellation: Cancellation) -> Result<(), BoxError>;
}

/// 宿主对象的同步运行辅助。
pub trait HostExt: Host {
    /// 在当前线程上阻塞运行宿主直至完成。
    ///
    /// 内部使用 `futures::executor::block_on`，不依赖具体异步运行时；
    /// 宿主若需要 Tokio 等运行时提供的 IO 或定时器，应改用异步入口。
    fn run_blocking(&self, cancellation: Cancellation) -> Result<(), BoxError> {
        futures::executor::block_on(self.run(cancellation))
    }
}

impl<H: Host + ?Sized> HostExt for H {}
