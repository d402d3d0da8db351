//! 内置的最小依赖注入容器。
//!
//! # 教案级注释
//! - **意图 (Why)**：注册阶段需要一个可变的服务注册表，构建根阶段需要把它物化为解析根；
//!   默认提供这套最小实现，后解析阶段的处理器仍可通过 [`ResolutionRoot`] 接口替换为其它后端；
//! - **体系位置 (Where)**：[`ServiceCollection`] 由构建器在注册阶段创建并播种核心单例，
//!   [`ServiceProvider`] 是默认解析根，[`ServiceScope`] 被运行上下文独占；
//! - **契约 (What)**：
//!   - 同一类型多次注册时，最后一次注册生效；
//!   - 单例由根缓存，作用域服务由作用域缓存，瞬时服务每次新建但仍由发起解析的作用域持有；
//!   - 根拒绝解析作用域服务，作用域释放时按创建的逆序释放其持有的实例。

mod collection;
mod provider;
mod resolver;

use std::{
    any::{Any, TypeId},
    fmt,
    hash::{Hash, Hasher},
    sync::Arc,
};

use crate::error::ResolutionError;

pub use collection::ServiceCollection;
pub use provider::{ServiceProvider, ServiceScope};
pub use resolver::{FromServices, ResolutionRoot, ResolutionScope, Resolver, ResolverExt};

/// 服务生命周期。
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Lifetime {
    /// 整个解析根共享一个实例。
    Singleton,
    /// 每个作用域一个实例。
    Scoped,
    /// 每次解析都新建实例。
    Transient,
}

impl fmt::Display for Lifetime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            Lifetime::Singleton => "singleton",
            Lifetime::Scoped => "scoped",
            Lifetime::Transient => "transient",
        };
        f.write_str(text)
    }
}

/// 服务键：以 `TypeId` 判等，携带类型名用于诊断。
#[derive(Clone, Copy)]
pub struct ServiceKey {
    type_id: TypeId,
    type_name: &'static str,
}

impl ServiceKey {
    pub fn of<T: ?Sized + 'static>() -> Self {
        Self {
            type_id: TypeId::of::<T>(),
            type_name: std::any::type_name::<T>(),
        }
    }

    pub fn type_name(&self) -> &'static str {
        self.type_name
    }
}

impl PartialEq for ServiceKey {
    fn eq(&self, other: &Self) -> bool {
        self.type_id == other.type_id
    }
}

impl Eq for ServiceKey {}

impl Hash for ServiceKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.type_id.hash(state);
    }
}

impl fmt::Debug for ServiceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.type_name)
    }
}

/// 类型擦除后的实例：内部保存 `Arc<T>`，因此 `T` 可以是 `dyn Trait`。
pub type ServiceInstance = Arc<dyn Any + Send + Sync>;

pub(crate) type ErasedFactory =
    Arc<dyn Fn(&dyn Resolver) -> Result<ServiceInstance, ResolutionError> + Send + Sync>;

#[derive(Clone)]
pub(crate) enum Activation {
    Instance(ServiceInstance),
    Factory(ErasedFactory),
}

/// 单条服务注册。
#[derive(Clone)]
pub struct ServiceDescriptor {
    key: ServiceKey,
    lifetime: Lifetime,
    activation: Activation,
}

impl ServiceDescriptor {
    /// 以现成实例注册单例。
    pub fn instance<T>(instance: Arc<T>) -> Self
    where
        T: ?Sized + Send + Sync + 'static,
    {
        Self {
            key: ServiceKey::of::<T>(),
            lifetime: Lifetime::Singleton,
            activation: Activation::Instance(erase(instance)),
        }
    }

    /// 以工厂注册任意生命周期的服务。
    pub fn factory<T, F>(lifetime: Lifetime, factory: F) -> Self
    where
        T: ?Sized + Send + Sync + 'static,
        F: Fn(&dyn Resolver) -> Result<Arc<T>, ResolutionError> + Send + Sync + 'static,
    {
        Self {
            key: ServiceKey::of::<T>(),
            lifetime,
            activation: Activation::Factory(Arc::new(move |resolver: &dyn Resolver| {
                factory(resolver).map(erase)
            })),
        }
    }

    pub fn key(&self) -> ServiceKey {
        self.key
    }

    pub fn lifetime(&self) -> Lifetime {
        self.lifetime
    }

    /// 是否为现成实例注册。
    pub fn is_instance(&self) -> bool {
        matches!(self.activation, Activation::Instance(_))
    }

    pub(crate) fn activate(&self, resolver: &dyn Resolver) -> Result<ServiceInstance, ResolutionError> {
        match &self.activation {
            Activation::Instance(instance) => Ok(Arc::clone(instance)),
            Activation::Factory(factory) => factory(resolver),
        }
    }
}

impl fmt::Debug for ServiceDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceDescriptor")
            .field("key", &self.key)
            .field("lifetime", &self.lifetime)
            .field("instance", &self.is_instance())
            .finish()
    }
}

fn erase<T>(instance: Arc<T>) -> ServiceInstance
where
    T: ?Sized + Send + Sync + 'static,
{
    Arc::new(instance)
}

/// 从擦除实例中取回 `Arc<T>`。
pub(crate) fn downcast<T>(instance: &ServiceInstance) -> Result<Arc<T>, ResolutionError>
where
    T: ?Sized + Send + Sync + 'static,
{
    instance
        .downcast_ref::<Arc<T>>()
        .cloned()
        .ok_or(ResolutionError::TypeMismatch {
            type_name: std::any::type_name::<T>(),
        })
}
