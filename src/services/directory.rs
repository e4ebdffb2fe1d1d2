//! Process-wide registry of singleton services

use crate::error::{Error, Result};
use once_cell::sync::OnceCell;
use std::any::{Any, TypeId};
use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::marker::PhantomData;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, PoisonError, RwLock};

type Instance = Arc<dyn Any + Send + Sync>;
type Factory = Box<dyn Fn(&ServiceDirectory) -> Result<Instance> + Send + Sync>;

thread_local! {
    /// Keys whose factories are currently running on this thread
    static CONSTRUCTING: RefCell<Vec<String>> = const { RefCell::new(Vec::new()) };
}

/// Holds a key on this thread's construction stack until dropped
struct Constructing;

impl Constructing {
    fn enter(key: &str) -> Self {
        CONSTRUCTING.with(|stack| stack.borrow_mut().push(key.to_string()));
        Self
    }
}

impl Drop for Constructing {
    fn drop(&mut self) {
        CONSTRUCTING.with(|stack| {
            stack.borrow_mut().pop();
        });
    }
}

/// Typed identity of a service
///
/// The string name is the identity; the type parameter makes lookups return
/// the concrete service without a cast at the call site.
pub struct ServiceKey<S> {
    name: &'static str,
    _marker: PhantomData<fn() -> S>,
}

impl<S> ServiceKey<S> {
    pub const fn new(name: &'static str) -> Self {
        Self {
            name,
            _marker: PhantomData,
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }
}

impl<S> Clone for ServiceKey<S> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<S> Copy for ServiceKey<S> {}

impl<S> fmt::Debug for ServiceKey<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ServiceKey({})", self.name)
    }
}

/// When a registered service gets constructed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConstructionPolicy {
    /// On first `get`
    Lazy,

    /// When bootstrap completes (`seal`)
    Eager,
}

struct ServiceEntry {
    key: &'static str,
    type_id: TypeId,
    type_name: &'static str,
    policy: ConstructionPolicy,
    factory: Factory,
    instance: OnceCell<Instance>,
}

impl ServiceEntry {
    fn is_pending_eager(&self) -> bool {
        self.policy == ConstructionPolicy::Eager && self.instance.get().is_none()
    }

    fn instance(&self, directory: &ServiceDirectory) -> Result<Instance> {
        if let Some(instance) = self.instance.get() {
            return Ok(instance.clone());
        }

        let cycle = CONSTRUCTING.with(|stack| {
            let stack = stack.borrow();
            stack.iter().any(|key| key == self.key).then(|| {
                let mut path: Vec<&str> = stack.iter().map(String::as_str).collect();
                path.push(self.key);
                path.join(" -> ")
            })
        });
        if let Some(path) = cycle {
            return Err(Error::CyclicDependency(path));
        }

        // Concurrent callers block here until the first one finishes
        self.instance
            .get_or_try_init(|| {
                let result = {
                    let _constructing = Constructing::enter(self.key);
                    (self.factory)(directory)
                };

                if result.is_ok() {
                    log::debug!("Constructed service '{}' ({})", self.key, self.type_name);
                }
                result
            })
            .cloned()
    }
}

#[derive(Default)]
struct Entries {
    by_key: HashMap<&'static str, Arc<ServiceEntry>>,
    order: Vec<&'static str>,
}

/// Registry mapping service identities to lazily constructed singletons
///
/// The directory only guarantees identity and single construction. Services
/// serialize their own internal mutations.
pub struct ServiceDirectory {
    entries: RwLock<Entries>,
    ready: AtomicBool,
}

impl ServiceDirectory {
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(Entries::default()),
            ready: AtomicBool::new(false),
        }
    }

    /// Register a lazily constructed singleton
    ///
    /// Returns `DuplicateRegistration` if the key is already taken and
    /// `DirectorySealed` once bootstrap has completed.
    pub fn register<S, F>(&self, key: ServiceKey<S>, factory: F) -> Result<()>
    where
        S: Send + Sync + 'static,
        F: Fn(&ServiceDirectory) -> Result<S> + Send + Sync + 'static,
    {
        self.insert(key, ConstructionPolicy::Lazy, factory)
    }

    /// Register a singleton that is constructed when the directory is sealed
    pub fn register_eager<S, F>(&self, key: ServiceKey<S>, factory: F) -> Result<()>
    where
        S: Send + Sync + 'static,
        F: Fn(&ServiceDirectory) -> Result<S> + Send + Sync + 'static,
    {
        self.insert(key, ConstructionPolicy::Eager, factory)
    }

    fn insert<S, F>(&self, key: ServiceKey<S>, policy: ConstructionPolicy, factory: F) -> Result<()>
    where
        S: Send + Sync + 'static,
        F: Fn(&ServiceDirectory) -> Result<S> + Send + Sync + 'static,
    {
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        // `seal` flips the flag under this lock
        if self.is_ready() {
            return Err(Error::DirectorySealed(key.name.to_string()));
        }
        if entries.by_key.contains_key(key.name) {
            return Err(Error::DuplicateRegistration(key.name.to_string()));
        }

        let entry = ServiceEntry {
            key: key.name,
            type_id: TypeId::of::<S>(),
            type_name: std::any::type_name::<S>(),
            policy,
            factory: Box::new(move |directory| {
                factory(directory).map(|service| Arc::new(service) as Instance)
            }),
            instance: OnceCell::new(),
        };

        log::debug!("Registered service '{}' ({:?}, {})", key.name, policy, entry.type_name);
        entries.by_key.insert(key.name, Arc::new(entry));
        entries.order.push(key.name);
        Ok(())
    }

    /// Get the singleton for `key`, constructing it on first access
    pub fn get<S>(&self, key: ServiceKey<S>) -> Result<Arc<S>>
    where
        S: Send + Sync + 'static,
    {
        let entry = self.entry(key.name)?;

        if entry.type_id != TypeId::of::<S>() {
            return Err(Error::ServiceTypeMismatch {
                key: key.name.to_string(),
                registered: entry.type_name,
                requested: std::any::type_name::<S>(),
            });
        }

        let instance = entry.instance(self)?;
        instance.downcast::<S>().map_err(|_| Error::ServiceTypeMismatch {
            key: key.name.to_string(),
            registered: entry.type_name,
            requested: std::any::type_name::<S>(),
        })
    }

    fn entry(&self, key: &str) -> Result<Arc<ServiceEntry>> {
        // The lock is dropped before construction so factories can resolve dependencies
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .by_key
            .get(key)
            .cloned()
            .ok_or_else(|| Error::UnregisteredService(key.to_string()))
    }

    /// Mark bootstrap complete: construct eager services and freeze the shape
    pub fn seal(&self) -> Result<()> {
        loop {
            if self.is_ready() {
                return Ok(());
            }

            for entry in self.pending_eager() {
                entry.instance(self)?;
            }

            // Eager entries registered during construction go another round
            let entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
            if entries.by_key.values().any(|entry| entry.is_pending_eager()) {
                continue;
            }
            self.ready.store(true, Ordering::Release);
            log::info!("Service directory sealed with {} services", entries.order.len());
            return Ok(());
        }
    }

    /// Eager entries not constructed yet, in registration order
    fn pending_eager(&self) -> Vec<Arc<ServiceEntry>> {
        let entries = self.entries.read().unwrap_or_else(PoisonError::into_inner);
        entries
            .order
            .iter()
            .filter_map(|key| entries.by_key.get(key))
            .filter(|entry| entry.is_pending_eager())
            .cloned()
            .collect()
    }

    /// Whether bootstrap has completed
    pub fn is_ready(&self) -> bool {
        self.ready.load(Ordering::Acquire)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .by_key
            .contains_key(key)
    }

    /// Whether the singleton for `key` has been constructed yet
    pub fn is_constructed(&self, key: &str) -> bool {
        self.entry(key)
            .map(|entry| entry.instance.get().is_some())
            .unwrap_or(false)
    }

    /// Registered keys in registration order
    pub fn keys(&self) -> Vec<&'static str> {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .order
            .clone()
    }

    pub fn len(&self) -> usize {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .order
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop every constructed instance, newest registration first
    ///
    /// Instances still referenced elsewhere live on until their last `Arc` drops.
    pub fn teardown(self) {
        let mut entries = self.entries.into_inner().unwrap_or_else(PoisonError::into_inner);
        while let Some(key) = entries.order.pop() {
            if let Some(entry) = entries.by_key.remove(key) {
                if entry.instance.get().is_some() {
                    log::debug!("Tearing down service '{}'", key);
                }
                drop(entry);
            }
        }
        log::info!("Service directory torn down");
    }
}

impl Default for ServiceDirectory {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::panic::AssertUnwindSafe;
    use std::sync::atomic::AtomicUsize;
    use std::sync::{Barrier, Mutex};

    #[derive(Debug)]
    struct Counter {
        hits: Mutex<u32>,
    }

    const COUNTER: ServiceKey<Counter> = ServiceKey::new("counter");

    fn counter() -> Result<Counter> {
        Ok(Counter { hits: Mutex::new(0) })
    }

    #[test]
    fn test_get_before_register_fails() {
        let directory = ServiceDirectory::new();
        let err = directory.get(COUNTER).unwrap_err();
        assert_eq!(err, Error::UnregisteredService("counter".to_string()));
    }

    #[test]
    fn test_get_returns_same_instance() {
        let directory = ServiceDirectory::new();
        directory.register(COUNTER, |_| counter()).unwrap();

        let a = directory.get(COUNTER).unwrap();
        let b = directory.get(COUNTER).unwrap();
        assert!(Arc::ptr_eq(&a, &b));

        *a.hits.lock().unwrap() += 1;
        assert_eq!(*b.hits.lock().unwrap(), 1);
    }

    #[test]
    fn test_duplicate_registration() {
        let directory = ServiceDirectory::new();
        directory.register(COUNTER, |_| counter()).unwrap();

        let result = directory.register(COUNTER, |_| counter());
        assert_eq!(result, Err(Error::DuplicateRegistration("counter".to_string())));
    }

    #[test]
    fn test_lazy_until_first_get() {
        let directory = ServiceDirectory::new();
        directory.register(COUNTER, |_| counter()).unwrap();
        directory.seal().unwrap();

        assert!(!directory.is_constructed("counter"));
        directory.get(COUNTER).unwrap();
        assert!(directory.is_constructed("counter"));
    }

    #[test]
    fn test_eager_constructed_on_seal() {
        let directory = ServiceDirectory::new();
        directory.register_eager(COUNTER, |_| counter()).unwrap();
        assert!(!directory.is_constructed("counter"));

        directory.seal().unwrap();
        assert!(directory.is_ready());
        assert!(directory.is_constructed("counter"));
    }

    #[test]
    fn test_register_after_seal_fails() {
        let directory = ServiceDirectory::new();
        directory.seal().unwrap();

        let result = directory.register(COUNTER, |_| counter());
        assert_eq!(result, Err(Error::DirectorySealed("counter".to_string())));
    }

    #[test]
    fn test_type_mismatch() {
        let directory = ServiceDirectory::new();
        directory.register(COUNTER, |_| counter()).unwrap();

        let wrong: ServiceKey<String> = ServiceKey::new("counter");
        let err = directory.get(wrong).unwrap_err();
        assert!(matches!(err, Error::ServiceTypeMismatch { .. }));
    }

    #[test]
    fn test_concurrent_first_access_constructs_once() {
        const CALLERS: usize = 16;

        let constructions = Arc::new(AtomicUsize::new(0));
        let directory = Arc::new(ServiceDirectory::new());
        let seen = Arc::clone(&constructions);
        directory
            .register(COUNTER, move |_| {
                seen.fetch_add(1, Ordering::SeqCst);
                std::thread::sleep(std::time::Duration::from_millis(20));
                counter()
            })
            .unwrap();
        directory.seal().unwrap();

        let barrier = Arc::new(Barrier::new(CALLERS));
        let handles: Vec<_> = (0..CALLERS)
            .map(|_| {
                let directory = Arc::clone(&directory);
                let barrier = Arc::clone(&barrier);
                std::thread::spawn(move || {
                    barrier.wait();
                    directory.get(COUNTER).unwrap()
                })
            })
            .collect();

        let instances: Vec<Arc<Counter>> = handles.into_iter().map(|h| h.join().unwrap()).collect();

        assert_eq!(constructions.load(Ordering::SeqCst), 1);
        assert!(instances.iter().all(|i| Arc::ptr_eq(i, &instances[0])));
    }

    #[test]
    fn test_factory_can_resolve_dependencies() {
        struct Wrapper {
            inner: Arc<Counter>,
        }
        const WRAPPER: ServiceKey<Wrapper> = ServiceKey::new("wrapper");

        let directory = ServiceDirectory::new();
        directory.register(COUNTER, |_| counter()).unwrap();
        directory
            .register(WRAPPER, |dir| Ok(Wrapper { inner: dir.get(COUNTER)? }))
            .unwrap();

        let wrapper = directory.get(WRAPPER).unwrap();
        assert!(Arc::ptr_eq(&wrapper.inner, &directory.get(COUNTER).unwrap()));
    }

    #[test]
    fn test_cyclic_dependency_is_reported() {
        struct Ping;
        struct Pong;
        const PING: ServiceKey<Ping> = ServiceKey::new("ping");
        const PONG: ServiceKey<Pong> = ServiceKey::new("pong");

        let directory = ServiceDirectory::new();
        directory
            .register(PING, |dir| {
                dir.get(PONG)?;
                Ok(Ping)
            })
            .unwrap();
        directory
            .register(PONG, |dir| {
                dir.get(PING)?;
                Ok(Pong)
            })
            .unwrap();

        let err = directory.get(PING).err().unwrap();
        assert_eq!(err, Error::CyclicDependency("ping -> pong -> ping".to_string()));
        assert!(!directory.is_constructed("ping"));
    }

    #[test]
    fn test_failed_construction_is_retried() {
        let attempts = Arc::new(AtomicUsize::new(0));
        let seen = Arc::clone(&attempts);

        let directory = ServiceDirectory::new();
        directory
            .register(COUNTER, move |_| {
                if seen.fetch_add(1, Ordering::SeqCst) == 0 {
                    Err(Error::UnregisteredService("backing-store".to_string()))
                } else {
                    counter()
                }
            })
            .unwrap();

        assert!(directory.get(COUNTER).is_err());
        assert!(directory.get(COUNTER).is_ok());
        assert_eq!(attempts.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_panicking_factory_leaves_no_false_cycle() {
        let attempts = Arc::new(AtomicUsize::new(0));
        let seen = Arc::clone(&attempts);

        let directory = ServiceDirectory::new();
        directory
            .register(COUNTER, move |_| {
                if seen.fetch_add(1, Ordering::SeqCst) == 0 {
                    panic!("backing store unavailable");
                }
                counter()
            })
            .unwrap();

        let first = std::panic::catch_unwind(AssertUnwindSafe(|| directory.get(COUNTER)));
        assert!(first.is_err());

        assert!(directory.get(COUNTER).is_ok());
        assert_eq!(attempts.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_registration_racing_seal_is_constructed_or_rejected() {
        const RACERS: usize = 8;

        let directory = Arc::new(ServiceDirectory::new());
        let barrier = Arc::new(Barrier::new(RACERS + 1));
        let handles: Vec<_> = (0..RACERS)
            .map(|i| {
                let directory = Arc::clone(&directory);
                let barrier = Arc::clone(&barrier);
                std::thread::spawn(move || {
                    let name: &'static str = Box::leak(format!("racer-{}", i).into_boxed_str());
                    barrier.wait();
                    directory
                        .register_eager(ServiceKey::<Counter>::new(name), |_| counter())
                        .map(|_| name)
                })
            })
            .collect();

        barrier.wait();
        directory.seal().unwrap();

        for handle in handles {
            match handle.join().unwrap() {
                Ok(name) => assert!(directory.is_constructed(name), "{} missed by seal", name),
                Err(err) => assert!(matches!(err, Error::DirectorySealed(_))),
            }
        }
    }

    #[test]
    fn test_keys_keep_registration_order() {
        struct Other;
        const OTHER: ServiceKey<Other> = ServiceKey::new("other");

        let directory = ServiceDirectory::new();
        directory.register(OTHER, |_| Ok(Other)).unwrap();
        directory.register(COUNTER, |_| counter()).unwrap();

        assert_eq!(directory.keys(), vec!["other", "counter"]);
        assert!(directory.contains("counter"));
        assert!(!directory.contains("missing"));
    }
}
