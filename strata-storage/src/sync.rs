//! Cross-process cache synchronization.
//!
//! Another process (e.g. a second browser tab) can write the shared medium
//! directly. The bridge listens to the medium's change notifications, folds
//! relevant changes into the in-memory overlay with raw mutations, and pokes
//! the cache/client broadcast hooks so live subscriptions observe the change.
//!
//! Raw mutation is mandatory here: the values are already on the medium, so
//! re-persisting them would emit another notification and ping-pong between
//! processes. One external change means at most one notification hop.

use std::sync::{Arc, Mutex, RwLock};
use tracing::{trace, warn};

use strata_core::{ConfigError, StoreOp};

use crate::adapter::StorageAdapter;
use crate::medium::StorageMedium;

/// One external key-value change: `new_value` is `None` for removals.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageChange {
    pub key: String,
    pub new_value: Option<String>,
}

impl StorageChange {
    pub fn set(key: impl Into<String>, new_value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            new_value: Some(new_value.into()),
        }
    }

    pub fn removed(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            new_value: None,
        }
    }
}

pub type ChangeListener = Arc<dyn Fn(&StorageChange) + Send + Sync>;

/// Identifier of one registered listener.
pub type SubscriptionId = u64;

/// A host capability: "subscribe to external change events of one specific
/// storage medium". Browser hosts back this with the window storage event;
/// tests and other hosts dispatch through [`LocalChangeHub`].
pub trait ChangeNotificationSource: Send + Sync {
    /// The medium whose external changes this source observes.
    fn medium(&self) -> Arc<dyn StorageMedium>;

    fn subscribe(&self, listener: ChangeListener) -> SubscriptionId;
    fn unsubscribe(&self, id: SubscriptionId);
}

/// In-process notification source.
///
/// Does not watch anything by itself: callers deliver external changes via
/// [`LocalChangeHub::dispatch`].
pub struct LocalChangeHub {
    medium: Arc<dyn StorageMedium>,
    listeners: RwLock<Vec<(SubscriptionId, ChangeListener)>>,
    next_id: Mutex<SubscriptionId>,
}

impl LocalChangeHub {
    pub fn new(medium: Arc<dyn StorageMedium>) -> Self {
        Self {
            medium,
            listeners: RwLock::new(Vec::new()),
            next_id: Mutex::new(0),
        }
    }

    /// Deliver one external change to every registered listener.
    pub fn dispatch(&self, change: &StorageChange) {
        let listeners = self.listeners.read().unwrap_or_else(|e| e.into_inner());
        for (_, listener) in listeners.iter() {
            listener(change);
        }
    }

    pub fn listener_count(&self) -> usize {
        self.listeners
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .len()
    }
}

impl ChangeNotificationSource for LocalChangeHub {
    fn medium(&self) -> Arc<dyn StorageMedium> {
        Arc::clone(&self.medium)
    }

    fn subscribe(&self, listener: ChangeListener) -> SubscriptionId {
        let mut next_id = self.next_id.lock().unwrap_or_else(|e| e.into_inner());
        let id = *next_id;
        *next_id += 1;

        self.listeners
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .push((id, listener));
        id
    }

    fn unsubscribe(&self, id: SubscriptionId) {
        self.listeners
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .retain(|(listener_id, _)| *listener_id != id);
    }
}

/// The cache half of the synchronized pair: exposes its backing adapter and
/// the watch-invalidation broadcast.
pub trait SyncableCache: Send + Sync {
    fn adapter(&self) -> &StorageAdapter;

    /// Invalidate watched queries so the engine re-reads the overlay.
    fn broadcast_watches(&self);
}

/// The client half: bound to exactly one cache, able to re-run active
/// queries so subscribers re-render.
pub trait SyncableClient: Send + Sync {
    fn cache(&self) -> Arc<dyn SyncableCache>;
    fn broadcast_queries(&self);
}

/// Deregistration handle. Dropping it (or calling [`SyncHandle::detach`])
/// removes the listener from the source.
pub struct SyncHandle {
    source: Arc<dyn ChangeNotificationSource>,
    id: Option<SubscriptionId>,
}

impl std::fmt::Debug for SyncHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncHandle")
            .field("id", &self.id)
            .finish_non_exhaustive()
    }
}

impl SyncHandle {
    pub fn detach(mut self) {
        if let Some(id) = self.id.take() {
            self.source.unsubscribe(id);
        }
    }
}

impl Drop for SyncHandle {
    fn drop(&mut self) {
        if let Some(id) = self.id.take() {
            self.source.unsubscribe(id);
        }
    }
}

/// Reconciles external medium changes into a live cache+client pair.
pub struct CacheSyncBridge;

impl CacheSyncBridge {
    /// Attach the bridge.
    ///
    /// Setup preconditions are configuration errors, not silent no-ops:
    /// the adapter must carry a non-empty prefix (otherwise unrelated keys on
    /// the shared medium are indistinguishable from cache entries), the
    /// client must be bound to this exact cache, and the source must observe
    /// the exact medium the adapter writes to.
    pub fn attach(
        cache: Arc<dyn SyncableCache>,
        client: Arc<dyn SyncableClient>,
        source: Arc<dyn ChangeNotificationSource>,
    ) -> Result<SyncHandle, ConfigError> {
        if cache.adapter().prefix().is_empty() {
            return Err(ConfigError::MissingSyncPrefix);
        }
        if !Arc::ptr_eq(&client.cache(), &cache) {
            return Err(ConfigError::CacheMismatch);
        }
        if !Arc::ptr_eq(&source.medium(), cache.adapter().medium()) {
            return Err(ConfigError::MediumMismatch);
        }

        let listener_cache = Arc::clone(&cache);
        let listener_client = Arc::clone(&client);
        let id = source.subscribe(Arc::new(move |change| {
            Self::on_change(&listener_cache, &listener_client, change);
        }));

        Ok(SyncHandle {
            source,
            id: Some(id),
        })
    }

    fn on_change(
        cache: &Arc<dyn SyncableCache>,
        client: &Arc<dyn SyncableClient>,
        change: &StorageChange,
    ) {
        let adapter = cache.adapter();
        let prefix = adapter.prefix();

        let data_id = match change.key.strip_prefix(prefix) {
            Some(data_id) => data_id,
            None => {
                trace!(key = %change.key, "ignoring change outside cache namespace");
                return;
            }
        };

        // Values that should never be persisted should never have produced a
        // notification; the check guards against races and misconfiguration.
        if !adapter.should_persist(StoreOp::Set, data_id, None) {
            return;
        }

        let applied = match &change.new_value {
            None => adapter.raw_delete(data_id).is_ok(),
            Some(raw) => match adapter.denormalize(raw, data_id) {
                Ok(record) => adapter.raw_set(data_id, record).is_ok(),
                Err(e) => {
                    warn!(data_id, error = %e, "external value did not deserialize; skipping");
                    false
                }
            },
        };

        if applied {
            cache.broadcast_watches();
            client.broadcast_queries();
        }
    }
}
