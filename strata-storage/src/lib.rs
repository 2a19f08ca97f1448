//! STRATA Storage - Overlay Adapter and Cross-Process Sync
//!
//! Wraps a synchronous key-value storage medium behind the normalized-cache
//! backing-store interface, with a per-operation persistence predicate, a
//! key-prefix namespace, and a write-through in-memory overlay. The sync
//! bridge folds changes made by other processes back into the overlay
//! without re-persisting them.

pub mod adapter;
pub mod medium;
pub mod sync;

pub use adapter::{AdapterConfig, NormalizedStore, StorageAdapter};
pub use medium::{iterate_prefixed, MediumCapabilities, MemoryMedium, StorageMedium};
pub use sync::{
    CacheSyncBridge, ChangeListener, ChangeNotificationSource, LocalChangeHub, StorageChange,
    SubscriptionId, SyncHandle, SyncableCache, SyncableClient,
};
