//! Synchronous key-value storage medium abstraction.
//!
//! The trait mirrors the web-storage shape (`getItem`/`setItem`/`removeItem`/
//! `clear` plus ordinal key enumeration) so browser storages, FFI shims, and
//! the in-memory reference medium all plug into the same adapter. All calls
//! are synchronous and blocking from the caller's perspective.

use std::collections::BTreeMap;
use std::sync::RwLock;

/// Which primitives a medium actually provides.
///
/// Host-provided shims (e.g. a partial web-storage polyfill behind FFI) may
/// lack primitives the adapter cannot work without; the adapter probes this
/// at construction and fails fast instead of panicking mid-operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MediumCapabilities {
    pub get_item: bool,
    pub set_item: bool,
    pub remove_item: bool,
    pub clear: bool,
}

impl MediumCapabilities {
    /// All four primitives available.
    pub const fn full() -> Self {
        Self {
            get_item: true,
            set_item: true,
            remove_item: true,
            clear: true,
        }
    }

    /// Name of the first missing primitive, if any.
    pub fn missing(&self) -> Option<&'static str> {
        if !self.get_item {
            Some("getItem")
        } else if !self.set_item {
            Some("setItem")
        } else if !self.remove_item {
            Some("removeItem")
        } else if !self.clear {
            Some("clear")
        } else {
            None
        }
    }
}

impl Default for MediumCapabilities {
    fn default() -> Self {
        Self::full()
    }
}

/// A synchronous key-value storage medium.
///
/// Keys and values are strings; absence is `None`, never an error. Mutations
/// take effect before the call returns.
pub trait StorageMedium: Send + Sync {
    fn get_item(&self, key: &str) -> Option<String>;
    fn set_item(&self, key: &str, value: &str);
    fn remove_item(&self, key: &str);
    fn clear(&self);

    /// Number of keys currently stored.
    fn length(&self) -> usize;

    /// Ordinal key access, `None` past the end. Order is medium-defined but
    /// must be stable between mutations.
    fn key(&self, index: usize) -> Option<String>;

    /// Which primitives this medium actually backs. Defaults to all of them;
    /// partial shims override this to be rejected at adapter construction.
    fn capabilities(&self) -> MediumCapabilities {
        MediumCapabilities::full()
    }
}

/// In-memory reference medium.
///
/// Keys enumerate in sorted order, which keeps ordinal iteration
/// deterministic for tests and non-browser hosts.
#[derive(Debug, Default)]
pub struct MemoryMedium {
    entries: RwLock<BTreeMap<String, String>>,
}

impl MemoryMedium {
    pub fn new() -> Self {
        Self::default()
    }
}

impl StorageMedium for MemoryMedium {
    fn get_item(&self, key: &str) -> Option<String> {
        // A poisoned lock still holds valid data; recover rather than panic.
        let entries = self.entries.read().unwrap_or_else(|e| e.into_inner());
        entries.get(key).cloned()
    }

    fn set_item(&self, key: &str, value: &str) {
        let mut entries = self.entries.write().unwrap_or_else(|e| e.into_inner());
        entries.insert(key.to_string(), value.to_string());
    }

    fn remove_item(&self, key: &str) {
        let mut entries = self.entries.write().unwrap_or_else(|e| e.into_inner());
        entries.remove(key);
    }

    fn clear(&self) {
        let mut entries = self.entries.write().unwrap_or_else(|e| e.into_inner());
        entries.clear();
    }

    fn length(&self) -> usize {
        let entries = self.entries.read().unwrap_or_else(|e| e.into_inner());
        entries.len()
    }

    fn key(&self, index: usize) -> Option<String> {
        let entries = self.entries.read().unwrap_or_else(|e| e.into_inner());
        entries.keys().nth(index).cloned()
    }
}

/// Iterate every entry under `prefix`, yielding the prefix-stripped key and
/// the raw stored value.
///
/// Keys are snapshotted before the callback runs, so the callback may mutate
/// the medium (e.g. remove entries) without skipping keys.
pub fn iterate_prefixed<F>(medium: &dyn StorageMedium, prefix: &str, mut callback: F)
where
    F: FnMut(&str, &str),
{
    let mut keys = Vec::with_capacity(medium.length());
    for index in 0..medium.length() {
        if let Some(key) = medium.key(index) {
            if key.starts_with(prefix) {
                keys.push(key);
            }
        }
    }

    for key in keys {
        if let Some(value) = medium.get_item(&key) {
            callback(&key[prefix.len()..], &value);
        }
    }
}
