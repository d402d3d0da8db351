use std::{
    fmt,
    future::Future,
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
};

use tokio_util::sync::CancellationToken;

/// `Cancellation` 是交给宿主对象 `run` 的取消信号。
///
/// # 教案级注释
/// - **意图 (Why)**：
///   - 宿主对象是长生命周期任务，需要一个由外部（如 Ctrl-C 处理器）触发的统一停止信号；
///   - 构建流水线本身不可取消，取消只作用于宿主对象的运行阶段。
/// - **体系位置 (Where)**：
///   - 调用方创建并持有令牌，经 [`RunContext::run`](crate::run_context::RunContext::run)
///     或 [`HostBuilder::run_host`](crate::builder::HostBuilder::run_host) 传入宿主对象。
/// - **设计与逻辑 (How)**：
///   - 等待与唤醒交给 `tokio_util::sync::CancellationToken`，等待者的 future 被丢弃时自动注销，
///     不依赖 Tokio 运行时；
///   - 额外的原子位只用于让 `cancel` 报告“是否为首次触发”。
/// - **契约 (What)**：
///   - 克隆体共享同一状态；[`child`](Self::child) 派生的子令牌随父令牌取消，反之不成立；
///   - 取消不可撤销。
#[derive(Clone, Default)]
pub struct Cancellation {
    token: CancellationToken,
    triggered: Arc<AtomicBool>,
}

impl Cancellation {
    /// 创建处于“未取消”状态的取消令牌。
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    /// 将当前令牌标记为取消并唤醒全部等待者。
    ///
    /// 返回 `true` 表示本次调用触发了取消；令牌此前已被取消（含经由父令牌）时返回 `false`。
    pub fn cancel(&self) -> bool {
        if self.token.is_cancelled() {
            return false;
        }
        let first = self
            .triggered
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok();
        self.token.cancel();
        first
    }

    /// 派生子令牌：父令牌取消时子令牌随之取消，子令牌取消不影响父令牌。
    pub fn child(&self) -> Self {
        Self {
            token: self.token.child_token(),
            triggered: Arc::default(),
        }
    }

    /// 等待取消发生；已取消时立即完成。
    pub fn cancelled(&self) -> impl Future<Output = ()> + Send + 'static {
        self.token.clone().cancelled_owned()
    }
}

impl fmt::Debug for Cancellation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Cancellation")
            .field("cancelled", &self.is_cancelled())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::{
        pin::pin,
        task::{Context, Poll},
        thread,
        time::Duration,
    };

    use futures::{
        executor::block_on,
        task::{ArcWake, waker},
    };

    use super::*;

    #[test]
    fn cancel_reports_first_trigger_only() {
        let token = Cancellation::new();
        let clone = token.clone();
        assert!(!clone.is_cancelled());
        assert!(token.cancel());
        assert!(!clone.cancel());
        assert!(clone.is_cancelled());
    }

    #[test]
    fn child_follows_parent_but_not_the_reverse() {
        let parent = Cancellation::new();
        let child = parent.child();
        assert!(child.cancel());
        assert!(!parent.is_cancelled(), "子令牌取消不影响父令牌");

        let other = parent.child();
        assert!(parent.cancel());
        assert!(other.is_cancelled());
        assert!(!other.cancel(), "经由父令牌取消后不再报告首次触发");
    }

    #[test]
    fn cancelled_future_wakes_waiters() {
        let token = Cancellation::new();
        let trigger = token.clone();
        let handle = thread::spawn(move || {
            thread::sleep(Duration::from_millis(20));
            trigger.cancel();
        });

        block_on(token.cancelled());
        assert!(token.is_cancelled());
        handle.join().expect("取消线程不应 panic");
    }

    #[test]
    fn already_cancelled_completes_immediately() {
        let token = Cancellation::new();
        token.cancel();
        block_on(token.cancelled());
    }

    struct Idle;

    impl ArcWake for Idle {
        fn wake_by_ref(_arc_self: &Arc<Self>) {}
    }

    #[test]
    fn dropped_waiters_release_their_wakers() {
        let token = Cancellation::new();
        let idle = Arc::new(Idle);
        let task_waker = waker(Arc::clone(&idle));
        let mut cx = Context::from_waker(&task_waker);

        for _ in 0..1000 {
            let mut waiting = pin!(token.cancelled());
            assert_eq!(waiting.as_mut().poll(&mut cx), Poll::Pending);
        }
        drop(task_waker);

        assert_eq!(Arc::strong_count(&idle), 1, "被丢弃的等待者不应继续持有 Waker");
    }
}
