use std::{cell::RefCell, collections::HashMap, fmt, sync::Arc};

use parking_lot::{Mutex, ReentrantMutex};

use crate::error::ResolutionError;

use super::{
    Lifetime, ServiceCollection, ServiceDescriptor, ServiceInstance, ServiceKey,
    resolver::{ResolutionRoot, ResolutionScope, Resolver},
};

thread_local! {
    static RESOLVING: RefCell<Vec<ServiceKey>> = const { RefCell::new(Vec::new()) };
}

/// 当前线程的解析链守卫，用于发现循环依赖。
struct ResolutionGuard {
    key: ServiceKey,
}

impl ResolutionGuard {
    fn enter(key: ServiceKey) -> Result<Self, ResolutionError> {
        RESOLVING.with(|stack| {
            let mut stack = stack.borrow_mut();
            if let Some(position) = stack.iter().position(|entry| *entry == key) {
                let chain = stack[position..]
                    .iter()
                    .chain(std::iter::once(&key))
                    .map(ServiceKey::type_name)
                    .collect::<Vec<_>>()
                    .join(" -> ");
                return Err(ResolutionError::Circular { chain });
            }
            stack.push(key);
            Ok(Self { key })
        })
    }
}

impl Drop for ResolutionGuard {
    fn drop(&mut self) {
        RESOLVING.with(|stack| {
            let mut stack = stack.borrow_mut();
            if let Some(position) = stack.iter().rposition(|entry| *entry == self.key) {
                stack.remove(position);
            }
        });
    }
}

fn activate(
    descriptor: &ServiceDescriptor,
    resolver: &dyn Resolver,
) -> Result<ServiceInstance, ResolutionError> {
    let _guard = ResolutionGuard::enter(descriptor.key())?;
    descriptor.activate(resolver)
}

struct ProviderInner {
    descriptors: HashMap<ServiceKey, ServiceDescriptor>,
    singletons: Mutex<HashMap<ServiceKey, ServiceInstance>>,
    /// 单例创建期间持有；可重入，允许单例工厂继续解析其它单例。
    creation: ReentrantMutex<()>,
}

impl ProviderInner {
    fn descriptor(&self, key: ServiceKey) -> Result<&ServiceDescriptor, ResolutionError> {
        self.descriptors
            .get(&key)
            .ok_or(ResolutionError::NotRegistered {
                type_name: key.type_name(),
            })
    }

    fn singleton(&self, descriptor: &ServiceDescriptor) -> Result<ServiceInstance, ResolutionError> {
        let key = descriptor.key();
        if let Some(instance) = self.singletons.lock().get(&key) {
            return Ok(Arc::clone(instance));
        }

        let _creation = self.creation.lock();
        if let Some(instance) = self.singletons.lock().get(&key) {
            return Ok(Arc::clone(instance));
        }
        // 单例只能依赖根可见的服务。
        let instance = activate(descriptor, self)?;
        self.singletons.lock().insert(key, Arc::clone(&instance));
        Ok(instance)
    }
}

impl Resolver for ProviderInner {
    fn resolve_erased(&self, key: ServiceKey) -> Result<ServiceInstance, ResolutionError> {
        let descriptor = self.descriptor(key)?;
        match descriptor.lifetime() {
            Lifetime::Singleton => self.singleton(descriptor),
            Lifetime::Scoped => Err(ResolutionError::ScopeRequired {
                type_name: key.type_name(),
            }),
            Lifetime::Transient => activate(descriptor, self),
        }
    }

    fn contains(&self, key: ServiceKey) -> bool {
        self.descriptors.contains_key(&key)
    }
}

/// 默认解析根（Resolution Root）。
///
/// # 教案级注释
/// - **意图 (Why)**：把注册表物化为可并发读取的解析根，并作为作用域的来源；
/// - **执行逻辑 (How)**：
///   1. 构造时按注册顺序折叠描述，同一类型保留最后一条；
///   2. 单例采用“双重检查 + 可重入创建锁”，保证每个单例至多创建一次；
///   3. 线程局部的解析链用于发现循环依赖，报告完整链路；
/// - **契约 (What)**：
///   - 根直接解析作用域服务返回 [`ResolutionError::ScopeRequired`]；
///   - 根解析出的瞬时实例不被追踪，由调用方持有；
/// - **风险提示 (Trade-offs)**：单例创建串行化，工厂中不应执行阻塞操作。
#[derive(Clone)]
pub struct ServiceProvider {
    inner: Arc<ProviderInner>,
}

impl ServiceProvider {
    pub fn new(services: &ServiceCollection) -> Self {
        let descriptors = services
            .iter()
            .map(|descriptor| (descriptor.key(), descriptor.clone()))
            .collect();
        Self {
            inner: Arc::new(ProviderInner {
                descriptors,
                singletons: Mutex::new(HashMap::new()),
                creation: ReentrantMutex::new(()),
            }),
        }
    }

    /// 创建具体类型的作用域。
    pub fn create_service_scope(&self) -> ServiceScope {
        ServiceScope {
            root: self.clone(),
            state: Mutex::new(ScopeState::default()),
        }
    }
}

impl Resolver for ServiceProvider {
    fn resolve_erased(&self, key: ServiceKey) -> Result<ServiceInstance, ResolutionError> {
        self.inner.resolve_erased(key)
    }

    fn contains(&self, key: ServiceKey) -> bool {
        self.inner.contains(key)
    }
}

impl ResolutionRoot for ServiceProvider {
    fn create_scope(&self) -> Box<dyn ResolutionScope> {
        Box::new(self.create_service_scope())
    }
}

impl fmt::Debug for ServiceProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceProvider")
            .field("registrations", &self.inner.descriptors.len())
            .field("singletons", &self.inner.singletons.lock().len())
            .finish()
    }
}

#[derive(Default)]
struct ScopeState {
    scoped: HashMap<ServiceKey, ServiceInstance>,
    /// 按创建顺序记录作用域持有的实例。
    created: Vec<ServiceInstance>,
    disposed: bool,
}

/// 默认作用域。
///
/// 释放时先清空作用域缓存，再按创建的逆序逐个释放实例；`Drop` 时自动释放。
pub struct ServiceScope {
    root: ServiceProvider,
    state: Mutex<ScopeState>,
}

impl ServiceScope {
    fn ensure_live(&self) -> Result<(), ResolutionError> {
        if self.state.lock().disposed {
            return Err(ResolutionError::Disposed);
        }
        Ok(())
    }

    fn scoped(&self, descriptor: &ServiceDescriptor) -> Result<ServiceInstance, ResolutionError> {
        let key = descriptor.key();
        if let Some(instance) = self.state.lock().scoped.get(&key) {
            return Ok(Arc::clone(instance));
        }

        // 工厂执行期间不持有锁，工厂可以继续通过本作用域解析依赖。
        let instance = activate(descriptor, self)?;

        let mut state = self.state.lock();
        if state.disposed {
            return Err(ResolutionError::Disposed);
        }
        if let Some(existing) = state.scoped.get(&key) {
            return Ok(Arc::clone(existing));
        }
        state.scoped.insert(key, Arc::clone(&instance));
        state.created.push(Arc::clone(&instance));
        Ok(instance)
    }

    fn transient(&self, descriptor: &ServiceDescriptor) -> Result<ServiceInstance, ResolutionError> {
        let instance = activate(descriptor, self)?;
        let mut state = self.state.lock();
        if state.disposed {
            return Err(ResolutionError::Disposed);
        }
        state.created.push(Arc::clone(&instance));
        Ok(instance)
    }
}

impl Resolver for ServiceScope {
    fn resolve_erased(&self, key: ServiceKey) -> Result<ServiceInstance, ResolutionError> {
        self.ensure_live()?;
        let descriptor = self.root.inner.descriptor(key)?;
        match descriptor.lifetime() {
            Lifetime::Singleton => self.root.inner.singleton(descriptor),
            Lifetime::Scoped => self.scoped(descriptor),
            Lifetime::Transient => self.transient(descriptor),
        }
    }

    fn contains(&self, key: ServiceKey) -> bool {
        self.root.contains(key)
    }
}

impl ResolutionScope for ServiceScope {
    fn dispose(&mut self) {
        let (scoped, mut created) = {
            let mut state = self.state.lock();
            if state.disposed {
                return;
            }
            state.disposed = true;
            (
                std::mem::take(&mut state.scoped),
                std::mem::take(&mut state.created),
            )
        };
        drop(scoped);
        while let Some(instance) = created.pop() {
            drop(instance);
        }
    }

    fn is_disposed(&self) -> bool {
        self.state.lock().disposed
    }
}

impl Drop for ServiceScope {
    fn drop(&mut self) {
        ResolutionScope::dispose(self);
    }
}

impl fmt::Debug for ServiceScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.lock();
        f.debug_struct("ServiceScope")
            .field("created", &state.created.len())
            .field("disposed", &state.disposed)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;
    use crate::services::ResolverExt;

    struct Tracked {
        id: usize,
        log: Arc<Mutex<Vec<usize>>>,
    }

    impl Drop for Tracked {
        fn drop(&mut self) {
            self.log.lock().push(self.id);
        }
    }

    #[test]
    fn lifetimes_are_honoured() {
        let counter = Arc::new(AtomicUsize::new(0));
        let mut services = ServiceCollection::new();
        let singleton_counter = Arc::clone(&counter);
        services
            .add_singleton(move |_: &dyn Resolver| {
                Ok(Arc::new(singleton_counter.fetch_add(1, Ordering::SeqCst) as u64))
            })
            .add_scoped(|_: &dyn Resolver| Ok(Arc::new(String::from("scoped"))))
            .add_transient(|_: &dyn Resolver| Ok(Arc::new(7_i32)));
        let provider = services.build();

        let first = provider.create_service_scope();
        let second = provider.create_service_scope();
        let a = first.get_required::<u64>().expect("单例可解析");
        let b = second.get_required::<u64>().expect("单例可解析");
        assert!(Arc::ptr_eq(&a, &b), "单例在作用域之间共享");
        assert_eq!(counter.load(Ordering::SeqCst), 1);

        let s1 = first.get_required::<String>().expect("作用域服务可解析");
        let s2 = first.get_required::<String>().expect("作用域服务可解析");
        let s3 = second.get_required::<String>().expect("作用域服务可解析");
        assert!(Arc::ptr_eq(&s1, &s2));
        assert!(!Arc::ptr_eq(&s1, &s3));

        let t1 = first.get_required::<i32>().expect("瞬时服务可解析");
        let t2 = first.get_required::<i32>().expect("瞬时服务可解析");
        assert!(!Arc::ptr_eq(&t1, &t2));
    }

    #[test]
    fn root_refuses_scoped_services() {
        let mut services = ServiceCollection::new();
        services.add_scoped(|_: &dyn Resolver| Ok(Arc::new(1_u8)));
        let provider = services.build();

        let error = provider.get_required::<u8>().expect_err("根不可解析作用域服务");
        assert!(matches!(error, ResolutionError::ScopeRequired { .. }));
        assert!(matches!(
            provider.get_required::<u16>(),
            Err(ResolutionError::NotRegistered { .. })
        ));
        assert!(provider.get::<u16>().expect("未注册返回 None").is_none());
    }

    #[test]
    fn cycles_are_reported_with_chain() {
        struct A;
        struct B;

        let mut services = ServiceCollection::new();
        services
            .add_scoped(|resolver: &dyn Resolver| {
                resolver.get_required::<B>()?;
                Ok(Arc::new(A))
            })
            .add_scoped(|resolver: &dyn Resolver| {
                resolver.get_required::<A>()?;
                Ok(Arc::new(B))
            });
        let scope = services.build().create_service_scope();

        match scope.get_required::<A>() {
            Err(ResolutionError::Circular { chain }) => {
                assert!(chain.contains(" -> "), "循环链需包含路径: {chain}");
            }
            other => panic!("应检测到循环依赖: {:?}", other.err()),
        }
    }

    #[test]
    fn dispose_releases_in_reverse_creation_order() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let next = Arc::new(AtomicUsize::new(0));
        let mut services = ServiceCollection::new();
        let (scoped_log, scoped_next) = (Arc::clone(&log), Arc::clone(&next));
        services.add_transient(move |_: &dyn Resolver| {
            Ok(Arc::new(Tracked {
                id: scoped_next.fetch_add(1, Ordering::SeqCst),
                log: Arc::clone(&scoped_log),
            }))
        });

        let mut scope = services.build().create_service_scope();
        for _ in 0..3 {
            scope.get_required::<Tracked>().expect("瞬时服务可解析");
        }
        assert!(log.lock().is_empty(), "作用域仍持有瞬时实例");

        scope.dispose();
        scope.dispose();
        assert_eq!(*log.lock(), vec![2, 1, 0]);
        assert!(scope.is_disposed());
        assert!(matches!(
            scope.get_required::<Tracked>(),
            Err(ResolutionError::Disposed)
        ));
    }
}
