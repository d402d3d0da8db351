//! 日志工厂：具名后端 + 具名记录器。
//!
//! # 教案级注释
//! - **意图 (Why)**
//!   - 日志阶段的处理器需要“往工厂上挂后端”，业务代码需要“按类别拿记录器”；
//!     这里以 `tracing` 为门面、`tracing-subscriber` 的 Layer 为后端实现这两项能力；
//!   - 每个工厂维护私有的 [`Dispatch`]，测试或多宿主场景下互不干扰，也不会争抢全局 Subscriber。
//! - **体系位置 (Where)**
//!   - 构建器持有 `Arc<LoggerFactory>`，在日志阶段交给处理器，在注册阶段作为核心单例登记。
//! - **执行逻辑 (How)**
//!   1. [`LoggingBackend::layer`] 是可重复调用的 Layer 工厂；
//!   2. 每次新增后端，工厂用全部后端重新组装 `Registry + Vec<Layer>` 并替换私有 Dispatch；
//!   3. 记录器在发出事件时切换到该 Dispatch；工厂尚无后端时事件流向进程默认 Subscriber。
//! - **契约 (What)**
//!   - 释放后新增后端返回 [`BootstrapError::Disposed`]，已有记录器的事件被静默丢弃；
//!   - `dispose` 幂等。
//! - **风险提示 (Trade-offs)**
//!   - 重新组装 Dispatch 意味着新增后端后，此前由旧 Dispatch 创建的 span 不会出现在新后端中。

use std::{any, fmt, sync::Arc};

use parking_lot::RwLock;
use tracing::{Dispatch, Level, dispatcher};
use tracing_subscriber::{EnvFilter, Layer, Registry, layer::SubscriberExt};

use crate::error::BootstrapError;

/// 挂接到工厂上的 Layer 类型。
pub type BoxedLayer = Box<dyn Layer<Registry> + Send + Sync + 'static>;

/// 具名日志后端。
pub trait LoggingBackend: Send + Sync + 'static {
    /// 后端名称，仅用于诊断。
    fn name(&self) -> &str;

    /// 构造一个新的 Layer 实例；工厂每次重组 Dispatch 时都会调用。
    fn layer(&self) -> BoxedLayer;
}

/// 由闭包构造 Layer 的后端。
pub struct LayerBackend<F> {
    name: String,
    make: F,
}

impl<F> LayerBackend<F>
where
    F: Fn() -> BoxedLayer + Send + Sync + 'static,
{
    pub fn new(name: impl Into<String>, make: F) -> Self {
        Self {
            name: name.into(),
            make,
        }
    }
}

impl<F> LoggingBackend for LayerBackend<F>
where
    F: Fn() -> BoxedLayer + Send + Sync + 'static,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn layer(&self) -> BoxedLayer {
        (self.make)()
    }
}

/// 控制台后端：`fmt` 格式化输出 + `EnvFilter` 过滤。
#[derive(Clone, Debug)]
pub struct ConsoleBackend {
    directives: String,
}

impl ConsoleBackend {
    pub const NAME: &'static str = "console";

    /// 以 `EnvFilter` 指令（如 `info,spark_bootstrap=debug`）构造。
    pub fn new(directives: impl Into<String>) -> Result<Self, BootstrapError> {
        let directives = directives.into();
        EnvFilter::try_new(&directives).map_err(|error| {
            BootstrapError::invalid_argument("directives", error.to_string())
        })?;
        Ok(Self { directives })
    }
}

impl LoggingBackend for ConsoleBackend {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn layer(&self) -> BoxedLayer {
        tracing_subscriber::fmt::layer()
            .with_target(true)
            .with_filter(EnvFilter::new(&self.directives))
            .boxed()
    }
}

#[derive(Default)]
struct FactoryState {
    backends: Vec<Arc<dyn LoggingBackend>>,
    dispatch: Option<Dispatch>,
    disposed: bool,
}

impl FactoryState {
    fn rebuild(&mut self) {
        let layers: Vec<BoxedLayer> = self.backends.iter().map(|backend| backend.layer()).collect();
        self.dispatch = Some(Dispatch::new(Registry::default().with(layers)));
    }
}

/// 日志工厂（Logging Factory）。
///
/// 克隆开销低：内部状态以 `Arc` 共享，克隆体与原工厂看到同一组后端。
#[derive(Clone, Default)]
pub struct LoggerFactory {
    state: Arc<RwLock<FactoryState>>,
}

impl LoggerFactory {
    pub fn new() -> Self {
        Self::default()
    }

    /// 挂接后端并重组私有 Dispatch。
    pub fn add_backend<B>(&self, backend: B) -> Result<&Self, BootstrapError>
    where
        B: LoggingBackend,
    {
        let mut state = self.state.write();
        if state.disposed {
            return Err(BootstrapError::Disposed {
                object: "LoggerFactory",
            });
        }
        state.backends.push(Arc::new(backend));
        state.rebuild();
        Ok(self)
    }

    /// 以闭包形式挂接 Layer。
    pub fn add_layer<F>(&self, name: impl Into<String>, make: F) -> Result<&Self, BootstrapError>
    where
        F: Fn() -> BoxedLayer + Send + Sync + 'static,
    {
        self.add_backend(LayerBackend::new(name, make))
    }

    /// 挂接控制台后端。
    pub fn add_console(&self, directives: &str) -> Result<&Self, BootstrapError> {
        self.add_backend(ConsoleBackend::new(directives)?)
    }

    pub fn backend_names(&self) -> Vec<String> {
        self.state
            .read()
            .backends
            .iter()
            .map(|backend| backend.name().to_owned())
            .collect()
    }

    /// 创建指定类别的记录器。
    pub fn create_logger(&self, category: impl Into<Arc<str>>) -> Logger {
        Logger {
            category: category.into(),
            state: Arc::clone(&self.state),
        }
    }

    /// 以类型名作为类别创建记录器。
    pub fn create_logger_for<T: ?Sized>(&self) -> Logger {
        self.create_logger(any::type_name::<T>())
    }

    /// 当前私有 Dispatch；无后端或已释放时为 `None`。
    pub fn dispatch(&self) -> Option<Dispatch> {
        self.state.read().dispatch.clone()
    }

    /// 在工厂的 Dispatch 下执行 `f`，使其中直接使用 `tracing` 宏的代码也写入本工厂的后端。
    pub fn in_scope<R>(&self, f: impl FnOnce() -> R) -> R {
        match self.dispatch() {
            Some(dispatch) => dispatcher::with_default(&dispatch, f),
            None => f(),
        }
    }

    /// 释放全部后端。
    pub fn dispose(&self) {
        let mut state = self.state.write();
        if state.disposed {
            return;
        }
        state.disposed = true;
        state.backends.clear();
        state.dispatch = None;
    }

    pub fn is_disposed(&self) -> bool {
        self.state.read().disposed
    }
}

impl fmt::Debug for LoggerFactory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoggerFactory")
            .field("backends", &self.backend_names())
            .field("disposed", &self.is_disposed())
            .finish()
    }
}

/// 具名记录器，事件携带 `category` 结构化字段。
#[derive(Clone)]
pub struct Logger {
    category: Arc<str>,
    state: Arc<RwLock<FactoryState>>,
}

impl Logger {
    pub fn category(&self) -> &str {
        &self.category
    }

    pub fn trace(&self, message: impl fmt::Display) {
        self.emit(Level::TRACE, &message);
    }

    pub fn debug(&self, message: impl fmt::Display) {
        self.emit(Level::DEBUG, &message);
    }

    pub fn info(&self, message: impl fmt::Display) {
        self.emit(Level::INFO, &message);
    }

    pub fn warn(&self, message: impl fmt::Display) {
        self.emit(Level::WARN, &message);
    }

    pub fn error(&self, message: impl fmt::Display) {
        self.emit(Level::ERROR, &message);
    }

    fn emit(&self, level: Level, message: &dyn fmt::Display) {
        let dispatch = {
            let state = self.state.read();
            if state.disposed {
                return;
            }
            state.dispatch.clone()
        };

        let category = &*self.category;
        let event = || {
            if level == Level::ERROR {
                tracing::error!(category, "{message}");
            } else if level == Level::WARN {
                tracing::warn!(category, "{message}");
            } else if level == Level::INFO {
                tracing::info!(category, "{message}");
            } else if level == Level::DEBUG {
                tracing::debug!(category, "{message}");
            } else {
                tracing::trace!(category, "{message}");
            }
        };
        match dispatch {
            Some(dispatch) => dispatcher::with_default(&dispatch, event),
            None => event(),
        }
    }
}

impl fmt::Debug for Logger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Logger")
            .field("category", &self.category)
            .finish()
    }
}
