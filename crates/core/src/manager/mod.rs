//! Cache manager
//!
//! The manager owns a registry of named caches, the async operations pool
//! and the cleaning scheduler. Lookups read the registry directly.
//! Structural changes (create, remove, reschedule, shutdown) are sent as
//! commands to a single owner thread, which applies them one at a time.

pub(crate) mod scheduler;

use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use dashmap::DashMap;
use memcache_common::lifecycle::{ComponentStatus, Lifecycle, StatusCell};
use memcache_common::time::{Clock, SystemClock};
use parking_lot::Mutex;
use tracing::{debug, error, info, instrument, warn};

use self::scheduler::CleaningScheduler;
use crate::async_ops::AsyncOpsInvoker;
use crate::config::{CacheConfiguration, CacheDefinition, Configuration, ConfigurationSource};
use crate::entry::{CacheKey, CacheValue};
use crate::error::{CacheError, CacheResult};
use crate::store::{ManagedCache, MemCache};

const OWNER_THREAD_NAME: &str = "memcache-manager";

type Registry = Arc<DashMap<String, Arc<dyn ManagedCache>>>;
type Reply<T> = Sender<CacheResult<T>>;

enum Command {
    Create { definition: Arc<dyn CacheDefinition>, reschedule: bool, reply: Reply<bool> },
    Remove { name: String, reply: Reply<bool> },
    Reschedule { start_immediately: bool, reply: Reply<()> },
    Shutdown { reply: Reply<()> },
}

/// State owned by the manager thread
struct Owner {
    caches: Registry,
    invoker: Arc<AsyncOpsInvoker>,
    clock: Arc<dyn Clock>,
    scheduler: CleaningScheduler,
}

impl Owner {
    fn run(mut self, inbox: Receiver<Command>) {
        while let Ok(command) = inbox.recv() {
            match command {
                Command::Create { definition, reschedule, reply } => {
                    let _ = reply.send(self.create(definition.as_ref(), reschedule));
                }
                Command::Remove { name, reply } => {
                    let _ = reply.send(self.remove(&name));
                }
                Command::Reschedule { start_immediately, reply } => {
                    let _ = reply.send(self.reschedule(start_immediately));
                }
                Command::Shutdown { reply } => {
                    let _ = reply.send(self.shutdown());
                    return;
                }
            }
        }

        // Every sender is gone without an explicit shutdown.
        if let Err(e) = self.shutdown() {
            error!(error = %e, "Cache manager cleanup failed");
        }
    }

    fn create(&mut self, definition: &dyn CacheDefinition, reschedule: bool) -> CacheResult<bool> {
        let name = definition.cache_name();
        if self.caches.contains_key(name) {
            debug!(cache = name, "Cache already exists");
            return Ok(false);
        }

        let cache = definition.instantiate(&self.invoker, &self.clock)?;
        cache.initialize()?;
        self.caches.insert(name.to_string(), cache);
        info!(cache = name, "Cache created");

        if reschedule {
            self.reschedule(true)?;
        }
        Ok(true)
    }

    fn remove(&mut self, name: &str) -> CacheResult<bool> {
        let Some((_, cache)) = self.caches.remove(name) else {
            return Ok(false);
        };
        self.reschedule(true)?;

        if cache.status() == ComponentStatus::Running {
            cache.shutdown()?;
        }
        info!(cache = name, "Cache removed");
        Ok(true)
    }

    fn reschedule(&mut self, start_immediately: bool) -> CacheResult<()> {
        let caches: Vec<_> = self.caches.iter().map(|entry| Arc::clone(entry.value())).collect();
        let tasks = self.scheduler.reschedule(caches, start_immediately)?;
        debug!(tasks, "Cleaning tasks rescheduled");
        Ok(())
    }

    fn shutdown(&mut self) -> CacheResult<()> {
        self.scheduler.close();
        self.invoker.close();

        let mut caches: Vec<_> = self.caches.iter().map(|entry| Arc::clone(entry.value())).collect();
        caches.sort_by(|l, r| l.cache_name().cmp(r.cache_name()));
        self.caches.clear();

        let mut first_error = None;
        for cache in caches {
            if cache.status() != ComponentStatus::Running {
                continue;
            }
            if let Err(e) = cache.shutdown() {
                error!(cache = cache.cache_name(), error = %e, "Cache shutdown failed");
                first_error.get_or_insert(e);
            }
        }
        first_error.map_or(Ok(()), Err)
    }
}

struct OwnerHandle {
    commands: Sender<Command>,
    thread: JoinHandle<()>,
}

/// Registry and lifecycle owner of named caches
///
/// ```no_run
/// use memcache_core::{
///     CacheConfiguration, CacheManager, Configuration, EvictionPolicy,
///     ExpirationConfiguration, Lifecycle, MemoryStoreConfiguration,
/// };
///
/// # fn main() -> Result<(), memcache_core::CacheError> {
/// let sessions = CacheConfiguration::<String, String>::builder()
///     .cache_name("sessions")
///     .eviction_policy(EvictionPolicy::Lru)
///     .memory_store(MemoryStoreConfiguration::builder().max_entries(10_000).build()?)
///     .expiration(ExpirationConfiguration::eternal())
///     .build()?;
///
/// let manager = CacheManager::with_configuration(Configuration::builder().cache(sessions).build()?);
/// manager.initialize()?;
///
/// let cache = manager.get_cache::<String, String>("sessions")?.expect("configured");
/// cache.put("id".to_string(), "alice".to_string());
///
/// manager.shutdown()?;
/// # Ok(())
/// # }
/// ```
pub struct CacheManager {
    source: Box<dyn ConfigurationSource>,
    clock: Arc<dyn Clock>,
    status: StatusCell,
    caches: Registry,
    owner: Mutex<Option<OwnerHandle>>,
    // Serializes initialize, shutdown, create_cache and remove_cache.
    structural: Mutex<()>,
}

impl fmt::Debug for CacheManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CacheManager")
            .field("status", &self.status.get())
            .field("caches", &self.caches.len())
            .finish_non_exhaustive()
    }
}

impl Default for CacheManager {
    fn default() -> Self {
        Self::new()
    }
}

impl CacheManager {
    /// Manager started from the default configuration (no caches)
    pub fn new() -> Self {
        Self::with_source(Configuration::default())
    }

    /// Manager started from a fixed configuration
    pub fn with_configuration(configuration: Configuration) -> Self {
        Self::with_source(configuration)
    }

    /// Manager pulling its configuration from `source` during `initialize`
    pub fn with_source(source: impl ConfigurationSource + 'static) -> Self {
        Self {
            source: Box::new(source),
            clock: Arc::new(SystemClock),
            status: StatusCell::default(),
            caches: Arc::new(DashMap::new()),
            owner: Mutex::new(None),
            structural: Mutex::new(()),
        }
    }

    /// Replace the clock used for entry timestamps of caches created later.
    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Create, initialize and register a cache.
    ///
    /// Returns `false` if a cache with the same name already exists. A call
    /// made while another thread is initializing the manager waits for it.
    pub fn create_cache<K: CacheKey, V: CacheValue>(
        &self,
        configuration: CacheConfiguration<K, V>,
    ) -> CacheResult<bool> {
        let _structural = self.structural.lock();
        self.status.require(
            "create_cache",
            &[ComponentStatus::Running, ComponentStatus::Initializing],
        )?;
        self.request(|reply| Command::Create {
            definition: Arc::new(configuration),
            reschedule: true,
            reply,
        })
    }

    /// Shut down and drop the named cache.
    ///
    /// Returns `false` if no such cache exists.
    pub fn remove_cache(&self, name: &str) -> CacheResult<bool> {
        let _structural = self.structural.lock();
        self.status.require(
            "remove_cache",
            &[ComponentStatus::Running, ComponentStatus::Initializing],
        )?;
        self.request(|reply| Command::Remove { name: name.to_string(), reply })
    }

    /// Typed handle to the named cache.
    ///
    /// `Ok(None)` if absent; [`CacheError::TypeMismatch`] if the cache was
    /// created with other key or value types.
    pub fn get_cache<K: CacheKey, V: CacheValue>(&self, name: &str) -> CacheResult<Option<MemCache<K, V>>> {
        self.status.require("get_cache", &[ComponentStatus::Running])?;
        let Some(cache) = self.caches.get(name).map(|entry| Arc::clone(entry.value())) else {
            return Ok(None);
        };
        cache
            .as_any()
            .downcast_ref::<MemCache<K, V>>()
            .cloned()
            .map(Some)
            .ok_or_else(|| CacheError::TypeMismatch {
                name: name.to_string(),
                requested: std::any::type_name::<MemCache<K, V>>(),
            })
    }

    /// Names of all registered caches, sorted
    pub fn cache_names(&self) -> CacheResult<Vec<String>> {
        self.status.require("cache_names", &[ComponentStatus::Running])?;
        let mut names: Vec<String> = self.caches.iter().map(|entry| entry.key().clone()).collect();
        names.sort_unstable();
        Ok(names)
    }

    fn request<T>(&self, command: impl FnOnce(Reply<T>) -> Command) -> CacheResult<T> {
        let commands = self
            .owner
            .lock()
            .as_ref()
            .map(|owner| owner.commands.clone())
            .ok_or_else(|| CacheError::unexpected("request", "cache manager is not started"))?;

        let (reply, response) = mpsc::channel();
        commands
            .send(command(reply))
            .map_err(|_| CacheError::unexpected("request", "cache manager owner has stopped"))?;
        response
            .recv()
            .map_err(|_| CacheError::unexpected("request", "cache manager owner dropped the reply"))?
    }

    fn start(&self) -> CacheResult<()> {
        let configuration = self.source.pull()?;
        debug!(?configuration, "Configuration pulled");

        let owner = Owner {
            caches: Arc::clone(&self.caches),
            invoker: Arc::new(AsyncOpsInvoker::new(configuration.async_parallelism())?),
            clock: Arc::clone(&self.clock),
            scheduler: CleaningScheduler::new(configuration.cleaning_pool_size())?,
        };
        let (commands, inbox) = mpsc::channel();
        let thread = thread::Builder::new()
            .name(OWNER_THREAD_NAME.to_string())
            .spawn(move || owner.run(inbox))
            .map_err(|e| CacheError::unexpected("initialize", e.to_string()))?;
        *self.owner.lock() = Some(OwnerHandle { commands, thread });

        for definition in configuration.cache_definitions() {
            let definition = Arc::clone(definition);
            self.request(|reply| Command::Create { definition, reschedule: false, reply })?;
        }
        self.request(|reply| Command::Reschedule { start_immediately: false, reply })
    }

    fn stop_owner(&self) -> CacheResult<()> {
        let Some(OwnerHandle { commands, thread }) = self.owner.lock().take() else {
            return Ok(());
        };

        let (reply, response) = mpsc::channel();
        let result = match commands.send(Command::Shutdown { reply }) {
            Ok(()) => response.recv().unwrap_or_else(|_| {
                Err(CacheError::unexpected("shutdown", "cache manager owner dropped the reply"))
            }),
            Err(_) => Err(CacheError::unexpected("shutdown", "cache manager owner has stopped")),
        };
        drop(commands);

        if thread.join().is_err() {
            return Err(CacheError::unexpected("shutdown", "cache manager owner panicked"));
        }
        result
    }
}

impl Lifecycle for CacheManager {
    type Error = CacheError;

    /// Pull the configuration, start both pools, create every configured
    /// cache and schedule expiration sweeps.
    #[instrument(skip(self))]
    fn initialize(&self) -> CacheResult<()> {
        let _structural = self.structural.lock();
        self.status.transition(
            "initialize",
            ComponentStatus::Unavailable,
            ComponentStatus::Initializing,
        )?;
        info!("Initializing cache manager");

        let outcome = catch_unwind(AssertUnwindSafe(|| self.start()))
            .unwrap_or_else(|payload| Err(CacheError::from_panic("initialize", payload.as_ref())));

        match outcome {
            Ok(()) => {
                self.status.set(ComponentStatus::Running);
                info!(caches = self.caches.len(), "Cache manager running");
                Ok(())
            }
            Err(e) => {
                self.status.set(ComponentStatus::Failed);
                error!(error = %e, "Cache manager initialization failed");
                if let Err(cleanup) = self.stop_owner() {
                    warn!(error = %cleanup, "Cleanup after failed initialization failed");
                }
                Err(e)
            }
        }
    }

    /// Stop the cleaning pool, close the async pool and shut down every
    /// cache, persisting where configured.
    #[instrument(skip(self))]
    fn shutdown(&self) -> CacheResult<()> {
        let _structural = self.structural.lock();
        self.status.transition("shutdown", ComponentStatus::Running, ComponentStatus::Stopping)?;
        info!(caches = self.caches.len(), "Shutting down cache manager");

        let outcome = catch_unwind(AssertUnwindSafe(|| self.stop_owner()))
            .unwrap_or_else(|payload| Err(CacheError::from_panic("shutdown", payload.as_ref())));

        match outcome {
            Ok(()) => {
                self.status.set(ComponentStatus::Terminated);
                info!("Cache manager terminated");
                Ok(())
            }
            Err(e) => {
                self.status.set(ComponentStatus::Failed);
                error!(error = %e, "Cache manager shutdown failed");
                Err(e)
            }
        }
    }

    fn status(&self) -> ComponentStatus {
        self.status.get()
    }
}

impl Drop for CacheManager {
    fn drop(&mut self) {
        if self.status.get() == ComponentStatus::Running {
            warn!("CacheManager dropped while running; shutting down");
            if let Err(e) = self.shutdown() {
                error!(error = %e, "Shutdown on drop failed");
            }
        } else if let Err(e) = self.stop_owner() {
            error!(error = %e, "Stopping cache manager owner on drop failed");
        }
    }
}
