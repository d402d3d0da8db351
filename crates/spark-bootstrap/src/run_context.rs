use std::{
    fmt,
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
};

use parking_lot::Mutex;

use crate::{
    cancellation::Cancellation,
    error::BootstrapError,
    host::Host,
    logging::Logger,
    services::{ResolutionScope, Resolver, ResolverExt},
};

static NEXT_RUN_CONTEXT_ID: AtomicU64 = AtomicU64::new(1);

/// 运行上下文标识，进程内唯一，用于诊断日志关联。
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RunContextId(u64);

impl RunContextId {
    pub(crate) fn next() -> Self {
        Self(NEXT_RUN_CONTEXT_ID.fetch_add(1, Ordering::Relaxed))
    }

    pub fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for RunContextId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "run-context-{}", self.0)
    }
}

/// `RunContext` 独占一个解析作用域，并从中惰性解析宿主对象。
///
/// # 教案级注释
/// - **设计目标 (Why)**
///   - 构建流水线的最终产物：调用方拿到它之后即可运行宿主，运行结束后释放它，
///     作用域内创建的全部依赖随之释放；
///   - 宿主对象在首次访问时才解析，依赖缺失的错误因此在首次访问时暴露，而非构建时。
/// - **体系位置 (Where)**
///   - 由 [`HostBuilder::build_run_context`](crate::builder::HostBuilder::build_run_context) 创建，
///     调用方独占直至释放。
/// - **执行逻辑 (How)**
///   - `host` 在互斥锁内检查“已解析”缓存，未命中时从作用域解析并写入缓存；
///     解析失败不写缓存，调用方修正后可重试；
///   - `dispose` 先清空宿主缓存，再释放作用域，保证宿主先于其依赖被释放。
/// - **契约说明 (What)**
///   - 宿主对象至多解析一次，多次访问返回同一个 `Arc`；
///   - 释放后 `host`/`resolver`/`run` 均返回 [`BootstrapError::Disposed`]；`dispose` 幂等。
/// - **风险提示 (Trade-offs)**
///   - 未显式释放的上下文在 `Drop` 时记录一条泄漏告警后释放，仅作兜底。
pub struct RunContext<THost: ?Sized> {
    id: RunContextId,
    scope: Option<Box<dyn ResolutionScope>>,
    host: Mutex<Option<Arc<THost>>>,
    logger: Logger,
}

impl<THost> RunContext<THost>
where
    THost: ?Sized + Send + Sync + 'static,
{
    pub(crate) fn new(scope: Box<dyn ResolutionScope>, logger: Logger) -> Self {
        let id = RunContextId::next();
        logger.debug(format_args!("{id} created"));
        Self {
            id,
            scope: Some(scope),
            host: Mutex::new(None),
            logger,
        }
    }

    pub fn id(&self) -> RunContextId {
        self.id
    }

    /// 宿主对象；首次访问时解析并缓存。
    pub fn host(&self) -> Result<Arc<THost>, BootstrapError> {
        let scope = self.live_scope()?;
        let mut cached = self.host.lock();
        if let Some(host) = cached.as_ref() {
            return Ok(Arc::clone(host));
        }
        let host = scope.get_required::<THost>()?;
        *cached = Some(Arc::clone(&host));
        Ok(host)
    }

    /// 作用域的通用解析能力。
    pub fn resolver(&self) -> Result<&dyn Resolver, BootstrapError> {
        let resolver: &dyn Resolver = self.live_scope()?;
        Ok(resolver)
    }

    /// 释放作用域，幂等。
    pub fn dispose(&mut self) {
        let Some(mut scope) = self.scope.take() else {
            return;
        };
        self.host.lock().take();
        scope.dispose();
        self.logger.debug(format_args!("{} disposed", self.id));
    }

    pub fn is_disposed(&self) -> bool {
        self.scope.is_none()
    }

    fn live_scope(&self) -> Result<&dyn ResolutionScope, BootstrapError> {
        self.scope.as_deref().ok_or(BootstrapError::Disposed {
            object: "RunContext",
        })
    }
}

impl<THost> RunContext<THost>
where
    THost: Host + ?Sized,
{
    /// 解析并运行宿主对象，直到其返回。
    pub async fn run(&self, cancellation: Cancellation) -> Result<(), BootstrapError> {
        let host = self.host()?;
        self.logger
            .debug(format_args!("{} running host", self.id));
        host.run(cancellation)
            .await
            .map_err(|source| BootstrapError::Host { source })
    }
}

impl<THost: ?Sized> Drop for RunContext<THost> {
    fn drop(&mut self) {
        if let Some(mut scope) = self.scope.take() {
            self.logger
                .warn(format_args!("{} dropped without dispose; releasing scope", self.id));
            self.host.get_mut().take();
            scope.dispose();
        }
    }
}

impl<THost: ?Sized> fmt::Debug for RunContext<THost> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RunContext")
            .field("id", &self.id)
            .field("disposed", &self.scope.is_none())
            .field("host_resolved", &self.host.lock().is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{logging::LoggerFactory, services::ServiceCollection};

    fn context_with_number() -> RunContext<u32> {
        let mut services = ServiceCollection::new();
        services.add_scoped(|_: &dyn Resolver| Ok(Arc::new(42_u32)));
        let scope = Box::new(services.build().create_service_scope());
        RunContext::new(scope, LoggerFactory::new().create_logger("test"))
    }

    #[test]
    fn identifiers_are_unique() {
        let first = context_with_number();
        let second = context_with_number();
        assert_ne!(first.id(), second.id());
        assert!(first.id().to_string().starts_with("run-context-"));
    }

    #[test]
    fn accessors_fail_after_dispose() {
        let mut context = context_with_number();
        assert_eq!(*context.host().expect("可解析"), 42);
        assert!(context.resolver().is_ok());

        context.dispose();
        context.dispose();
        assert!(context.is_disposed());
        assert!(context.host().expect_err("释放后不可访问").is_disposed());
        assert!(context.resolver().is_err());
    }
}
