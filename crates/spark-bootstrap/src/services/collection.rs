use std::{fmt, sync::Arc};

use crate::error::ResolutionError;

use super::{
    FromServices, Lifetime, ServiceDescriptor, ServiceKey, ServiceProvider, resolver::Resolver,
};

/// `ServiceCollection` 是注册阶段使用的服务注册表。
///
/// # 教案级注释
/// - **目标 (Why)**
///   - 注册阶段的处理器按顺序向同一个注册表追加绑定，构建根阶段再一次性物化为解析根；
///   - 允许按具体类型或 trait 对象（`dyn Trait`）注册，满足“按抽象或具体类型绑定”的需要。
/// - **架构位置 (Where)**
///   - 每次 `build_run_context` 都新建一个注册表，并由构建器播种日志工厂、配置与环境描述等核心单例。
/// - **设计要点 (How)**
///   - 内部按注册顺序保存 [`ServiceDescriptor`]，解析时以最后一条同类型注册为准；
///   - `try_add_*` 仅在该类型没有任何注册时追加，对应“若不存在则添加”的语义。
/// - **契约 (What)**
///   - 工厂接收 `&dyn Resolver`，可继续解析依赖；返回 `Arc<T>` 以便共享；
///   - 注册表本身不校验依赖是否可满足，缺失依赖在首次解析时才暴露。
/// - **风险与注意事项 (Trade-offs)**
///   - 克隆注册表会复制描述列表，但工厂与实例以 `Arc` 共享。
#[derive(Clone, Default)]
pub struct ServiceCollection {
    descriptors: Vec<ServiceDescriptor>,
}

impl ServiceCollection {
    /// 创建空的注册表。
    pub fn new() -> Self {
        Self::default()
    }

    /// 追加任意描述。
    pub fn add(&mut self, descriptor: ServiceDescriptor) -> &mut Self {
        self.descriptors.push(descriptor);
        self
    }

    /// 若该类型尚无注册则追加，返回是否追加成功。
    pub fn try_add(&mut self, descriptor: ServiceDescriptor) -> bool {
        if self.contains_key(descriptor.key()) {
            return false;
        }
        self.descriptors.push(descriptor);
        true
    }

    /// 注册现成实例为单例。
    pub fn add_instance<T>(&mut self, instance: Arc<T>) -> &mut Self
    where
        T: ?Sized + Send + Sync + 'static,
    {
        self.add(ServiceDescriptor::instance(instance))
    }

    pub fn add_singleton<T, F>(&mut self, factory: F) -> &mut Self
    where
        T: ?Sized + Send + Sync + 'static,
        F: Fn(&dyn Resolver) -> Result<Arc<T>, ResolutionError> + Send + Sync + 'static,
    {
        self.add(ServiceDescriptor::factory(Lifetime::Singleton, factory))
    }

    pub fn add_scoped<T, F>(&mut self, factory: F) -> &mut Self
    where
        T: ?Sized + Send + Sync + 'static,
        F: Fn(&dyn Resolver) -> Result<Arc<T>, ResolutionError> + Send + Sync + 'static,
    {
        self.add(ServiceDescriptor::factory(Lifetime::Scoped, factory))
    }

    pub fn add_transient<T, F>(&mut self, factory: F) -> &mut Self
    where
        T: ?Sized + Send + Sync + 'static,
        F: Fn(&dyn Resolver) -> Result<Arc<T>, ResolutionError> + Send + Sync + 'static,
    {
        self.add(ServiceDescriptor::factory(Lifetime::Transient, factory))
    }

    /// 以 [`FromServices`] 激活的方式注册具体类型。
    pub fn add_activated<T>(&mut self, lifetime: Lifetime) -> &mut Self
    where
        T: FromServices,
    {
        self.add(activated::<T>(lifetime))
    }

    pub fn try_add_instance<T>(&mut self, instance: Arc<T>) -> bool
    where
        T: ?Sized + Send + Sync + 'static,
    {
        self.try_add(ServiceDescriptor::instance(instance))
    }

    pub fn try_add_singleton<T, F>(&mut self, factory: F) -> bool
    where
        T: ?Sized + Send + Sync + 'static,
        F: Fn(&dyn Resolver) -> Result<Arc<T>, ResolutionError> + Send + Sync + 'static,
    {
        self.try_add(ServiceDescriptor::factory(Lifetime::Singleton, factory))
    }

    pub fn try_add_scoped<T, F>(&mut self, factory: F) -> bool
    where
        T: ?Sized + Send + Sync + 'static,
        F: Fn(&dyn Resolver) -> Result<Arc<T>, ResolutionError> + Send + Sync + 'static,
    {
        self.try_add(ServiceDescriptor::factory(Lifetime::Scoped, factory))
    }

    pub fn try_add_transient<T, F>(&mut self, factory: F) -> bool
    where
        T: ?Sized + Send + Sync + 'static,
        F: Fn(&dyn Resolver) -> Result<Arc<T>, ResolutionError> + Send + Sync + 'static,
    {
        self.try_add(ServiceDescriptor::factory(Lifetime::Transient, factory))
    }

    pub fn try_add_activated<T>(&mut self, lifetime: Lifetime) -> bool
    where
        T: FromServices,
    {
        self.try_add(activated::<T>(lifetime))
    }

    pub fn contains<T: ?Sized + 'static>(&self) -> bool {
        self.contains_key(ServiceKey::of::<T>())
    }

    pub fn contains_key(&self, key: ServiceKey) -> bool {
        self.descriptors.iter().any(|descriptor| descriptor.key() == key)
    }

    /// 生效注册（最后一条）的生命周期。
    pub fn lifetime_of<T: ?Sized + 'static>(&self) -> Option<Lifetime> {
        let key = ServiceKey::of::<T>();
        self.descriptors
            .iter()
            .rev()
            .find(|descriptor| descriptor.key() == key)
            .map(ServiceDescriptor::lifetime)
    }

    /// 移除该类型的全部注册，返回移除数量。
    pub fn remove_all<T: ?Sized + 'static>(&mut self) -> usize {
        let key = ServiceKey::of::<T>();
        let before = self.descriptors.len();
        self.descriptors.retain(|descriptor| descriptor.key() != key);
        before - self.descriptors.len()
    }

    /// 按注册顺序遍历。
    pub fn iter(&self) -> impl Iterator<Item = &ServiceDescriptor> {
        self.descriptors.iter()
    }

    pub fn len(&self) -> usize {
        self.descriptors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.descriptors.is_empty()
    }

    /// 物化为默认解析根。
    pub fn build(&self) -> ServiceProvider {
        ServiceProvider::new(self)
    }
}

impl fmt::Debug for ServiceCollection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.descriptors.iter()).finish()
    }
}

fn activated<T: FromServices>(lifetime: Lifetime) -> ServiceDescriptor {
    ServiceDescriptor::factory(lifetime, |resolver: &dyn Resolver| {
        T::from_services(resolver).map(Arc::new)
    })
}
