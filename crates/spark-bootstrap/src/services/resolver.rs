use std::sync::Arc;

use crate::error::ResolutionError;

use super::{ServiceInstance, ServiceKey, downcast};

/// 类型擦除的解析能力。
///
/// # 教案级注释
/// - **意图 (Why)**：工厂、运行上下文与后解析处理器都只依赖“按键解析”这一能力，
///   以对象安全的 trait 暴露，便于替换为其它容器后端；
/// - **契约 (What)**：
///   - `resolve_erased` 返回的实例内部保存 `Arc<T>`，由 [`ResolverExt`] 负责向下转型；
///   - 未注册时返回 [`ResolutionError::NotRegistered`]。
pub trait Resolver: Send + Sync {
    fn resolve_erased(&self, key: ServiceKey) -> Result<ServiceInstance, ResolutionError>;

    /// 是否存在该键的注册。
    fn contains(&self, key: ServiceKey) -> bool;
}

/// 强类型解析辅助方法，对所有 [`Resolver`]（含 trait 对象）自动实现。
pub trait ResolverExt: Resolver {
    /// 解析可选服务；未注册时返回 `Ok(None)`。
    fn get<T>(&self) -> Result<Option<Arc<T>>, ResolutionError>
    where
        T: ?Sized + Send + Sync + 'static,
    {
        let key = ServiceKey::of::<T>();
        if !self.contains(key) {
            return Ok(None);
        }
        self.get_required::<T>().map(Some)
    }

    /// 解析必需服务，未注册时报错。
    fn get_required<T>(&self) -> Result<Arc<T>, ResolutionError>
    where
        T: ?Sized + Send + Sync + 'static,
    {
        let instance = self.resolve_erased(ServiceKey::of::<T>())?;
        downcast::<T>(&instance)
    }
}

impl<R: Resolver + ?Sized> ResolverExt for R {}

/// 由容器激活的类型。
///
/// 构建器为宿主类型自动补充作用域注册时，即通过该 trait 从作用域中取得依赖并构造实例。
pub trait FromServices: Sized + Send + Sync + 'static {
    fn from_services(resolver: &dyn Resolver) -> Result<Self, ResolutionError>;
}

/// 解析根：可派生作用域的容器。
pub trait ResolutionRoot: Resolver {
    fn create_scope(&self) -> Box<dyn ResolutionScope>;
}

/// 解析作用域：释放时一并释放其创建的全部实例。
pub trait ResolutionScope: Resolver {
    /// 释放作用域，幂等。
    fn dispose(&mut self);

    fn is_disposed(&self) -> bool;
}
