//! Overlay storage adapter: an in-memory working set backed by a prefixed
//! region of a synchronous key-value medium.
//!
//! The overlay is authoritative for every identifier it contains and is
//! written through unconditionally; the medium is only touched when the
//! persistence predicate allows it. Reads fall through to the medium and
//! cache the deserialized record back into the overlay.

use std::collections::HashMap;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use strata_core::{
    always_persist, default_denormalizer, default_normalizer, merge_records, ConfigError,
    Denormalizer, EntityRecord, Normalizer, PersistPredicate, StoreError, StoreOp,
};

use crate::medium::{iterate_prefixed, StorageMedium};

/// The backing-store capability interface a normalized cache engine consumes.
///
/// `get`/`set`/`delete` never fail for ordinary missing identifiers; absence
/// is `Ok(None)`. Errors are reserved for broken state (poisoned overlay,
/// serializer failures).
pub trait NormalizedStore: Send + Sync {
    fn get(&self, data_id: &str) -> Result<Option<EntityRecord>, StoreError>;
    fn set(&self, data_id: &str, record: EntityRecord) -> Result<(), StoreError>;
    fn delete(&self, data_id: &str) -> Result<(), StoreError>;
    fn clear(&self) -> Result<(), StoreError>;

    /// Materialize the entire logical state: persisted entries overlaid with
    /// the in-memory working set (overlay wins). Inspection/testing only,
    /// not a hot path.
    fn to_object(&self) -> Result<HashMap<String, EntityRecord>, StoreError>;

    /// Bulk reset used on cache restore. Merges into already-persisted
    /// records instead of overwriting wholesale.
    fn replace(&self, new_state: HashMap<String, EntityRecord>) -> Result<(), StoreError>;
}

/// Configuration for [`StorageAdapter`].
pub struct AdapterConfig {
    storage: Option<Arc<dyn StorageMedium>>,
    normalize: Normalizer,
    denormalize: Denormalizer,
    should_persist: PersistPredicate,
    prefix: String,
}

impl Default for AdapterConfig {
    fn default() -> Self {
        Self {
            storage: None,
            normalize: default_normalizer(),
            denormalize: default_denormalizer(),
            should_persist: always_persist(),
            prefix: String::new(),
        }
    }
}

impl AdapterConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the storage medium. Required.
    pub fn with_storage(mut self, storage: Arc<dyn StorageMedium>) -> Self {
        self.storage = Some(storage);
        self
    }

    /// Set the record serializer (default: compact JSON).
    pub fn with_normalize(mut self, normalize: Normalizer) -> Self {
        self.normalize = normalize;
        self
    }

    /// Set the record deserializer (default: JSON).
    pub fn with_denormalize(mut self, denormalize: Denormalizer) -> Self {
        self.denormalize = denormalize;
        self
    }

    /// Set the persistence predicate (default: persist everything).
    pub fn with_should_persist(mut self, should_persist: PersistPredicate) -> Self {
        self.should_persist = should_persist;
        self
    }

    /// Set the key namespace on the medium (default: empty). Useful to tell
    /// this cache's entries apart from other data sharing the medium.
    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = prefix.into();
        self
    }
}

/// Key-value storage adapter satisfying [`NormalizedStore`].
///
/// One adapter instance exclusively owns its overlay. Two adapters sharing a
/// prefix+medium combination risk interleaved overlay/store divergence.
pub struct StorageAdapter {
    medium: Arc<dyn StorageMedium>,
    normalize: Normalizer,
    denormalize: Denormalizer,
    should_persist: PersistPredicate,
    prefix: String,
    overlay: RwLock<HashMap<String, EntityRecord>>,
}

impl std::fmt::Debug for StorageAdapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StorageAdapter")
            .field("prefix", &self.prefix)
            .finish_non_exhaustive()
    }
}

impl StorageAdapter {
    /// Build an adapter, failing fast on misconfiguration.
    pub fn new(config: AdapterConfig) -> Result<Self, ConfigError> {
        let medium = config.storage.ok_or(ConfigError::MissingStorage)?;
        if let Some(capability) = medium.capabilities().missing() {
            return Err(ConfigError::InvalidStorage { capability });
        }

        Ok(Self {
            medium,
            normalize: config.normalize,
            denormalize: config.denormalize,
            should_persist: config.should_persist,
            prefix: config.prefix,
            overlay: RwLock::new(HashMap::new()),
        })
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    pub fn medium(&self) -> &Arc<dyn StorageMedium> {
        &self.medium
    }

    /// Consult the configured persistence predicate.
    pub fn should_persist(
        &self,
        op: StoreOp,
        data_id: &str,
        record: Option<&EntityRecord>,
    ) -> bool {
        (self.should_persist)(op, data_id, record)
    }

    /// Run the configured deserializer on a raw stored value.
    pub fn denormalize(&self, value: &str, data_id: &str) -> Result<EntityRecord, StoreError> {
        (self.denormalize)(value, data_id)
    }

    fn prefixed(&self, data_id: &str) -> String {
        format!("{}{}", self.prefix, data_id)
    }

    fn overlay_read(&self) -> Result<RwLockReadGuard<'_, HashMap<String, EntityRecord>>, StoreError> {
        self.overlay.read().map_err(|_| StoreError::LockPoisoned)
    }

    fn overlay_write(
        &self,
    ) -> Result<RwLockWriteGuard<'_, HashMap<String, EntityRecord>>, StoreError> {
        self.overlay.write().map_err(|_| StoreError::LockPoisoned)
    }

    /// Overlay-only read: no predicate, no medium access.
    pub fn raw_get(&self, data_id: &str) -> Result<Option<EntityRecord>, StoreError> {
        Ok(self.overlay_read()?.get(data_id).cloned())
    }

    /// Overlay-only write: bypasses the predicate and the medium. Used by the
    /// sync bridge to fold in changes that are already on the medium, so no
    /// redundant store write (and no outbound notification) happens.
    pub fn raw_set(&self, data_id: &str, record: EntityRecord) -> Result<(), StoreError> {
        self.overlay_write()?.insert(data_id.to_string(), record);
        Ok(())
    }

    /// Overlay-only removal: bypasses the predicate and the medium.
    pub fn raw_delete(&self, data_id: &str) -> Result<(), StoreError> {
        self.overlay_write()?.remove(data_id);
        Ok(())
    }
}

impl NormalizedStore for StorageAdapter {
    fn get(&self, data_id: &str) -> Result<Option<EntityRecord>, StoreError> {
        if let Some(record) = self.raw_get(data_id)? {
            return Ok(Some(record));
        }

        if !(self.should_persist)(StoreOp::Get, data_id, None) {
            return Ok(None);
        }

        let raw = match self.medium.get_item(&self.prefixed(data_id)) {
            Some(raw) => raw,
            None => return Ok(None),
        };

        let record = (self.denormalize)(&raw, data_id)?;
        self.raw_set(data_id, record.clone())?;
        Ok(Some(record))
    }

    fn set(&self, data_id: &str, record: EntityRecord) -> Result<(), StoreError> {
        if (self.should_persist)(StoreOp::Set, data_id, Some(&record)) {
            let encoded = (self.normalize)(&record, data_id)?;
            self.medium.set_item(&self.prefixed(data_id), &encoded);
        }

        self.raw_set(data_id, record)
    }

    fn delete(&self, data_id: &str) -> Result<(), StoreError> {
        if (self.should_persist)(StoreOp::Delete, data_id, None) {
            self.medium.remove_item(&self.prefixed(data_id));
        }

        self.raw_delete(data_id)
    }

    fn clear(&self) -> Result<(), StoreError> {
        // Only our namespace: other data may share the medium.
        iterate_prefixed(self.medium.as_ref(), &self.prefix, |data_id, _| {
            self.medium.remove_item(&self.prefixed(data_id));
        });

        self.overlay_write()?.clear();
        Ok(())
    }

    fn to_object(&self) -> Result<HashMap<String, EntityRecord>, StoreError> {
        let mut object = HashMap::new();

        let mut decode_error = None;
        iterate_prefixed(self.medium.as_ref(), &self.prefix, |data_id, value| {
            if decode_error.is_some() {
                return;
            }
            match (self.denormalize)(value, data_id) {
                Ok(record) => {
                    object.insert(data_id.to_string(), record);
                }
                Err(e) => decode_error = Some(e),
            }
        });
        if let Some(e) = decode_error {
            return Err(e);
        }

        for (data_id, record) in self.overlay_read()?.iter() {
            object.insert(data_id.clone(), record.clone());
        }

        Ok(object)
    }

    fn replace(&self, new_state: HashMap<String, EntityRecord>) -> Result<(), StoreError> {
        self.overlay_write()?.clear();

        for (data_id, record) in new_state {
            let merged = merge_records(self.get(&data_id)?, &record);
            self.set(&data_id, merged)?;
        }

        Ok(())
    }
}
