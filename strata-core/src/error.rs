//! Error types for STRATA operations

use thiserror::Error;

/// Configuration errors.
///
/// All of these are raised synchronously at construction/setup time and are
/// fatal: the caller gets a descriptive message and nothing is retried.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("You must provide a storage medium to use")]
    MissingStorage,

    #[error("You must provide a valid storage medium: missing {capability}")]
    InvalidStorage { capability: &'static str },

    #[error(
        "The cache has no prefix configured. A prefix is required to tell \
         cache entries apart from unrelated data sharing the storage medium"
    )]
    MissingSyncPrefix,

    #[error("The provided client is not bound to the cache being synchronized")]
    CacheMismatch,

    #[error(
        "The notification source does not observe the cache's storage medium. \
         Change notifications are only defined for the medium the adapter writes to"
    )]
    MediumMismatch,
}

/// Storage adapter errors.
///
/// Ordinary missing-key lookups are not errors; `get` returns `Ok(None)` for
/// unknown identifiers. These variants cover genuinely broken states.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StoreError {
    #[error("Overlay lock poisoned")]
    LockPoisoned,

    #[error("Failed to serialize record {data_id}: {reason}")]
    Serialize { data_id: String, reason: String },

    #[error("Failed to deserialize stored value for {data_id}: {reason}")]
    Deserialize { data_id: String, reason: String },
}

/// Document transform errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TransformError {
    #[error("Fragment {name} spreads into itself (directly or via other fragments)")]
    RecursiveFragment { name: String },
}

/// Master error type for all STRATA errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StrataError {
    #[error("Config error: {0}")]
    Config(#[from] ConfigError),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Transform error: {0}")]
    Transform(#[from] TransformError),
}

/// Result type alias for STRATA operations.
pub type StrataResult<T> = Result<T, StrataError>;
