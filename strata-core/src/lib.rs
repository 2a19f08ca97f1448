//! STRATA Core - Shared Types for the Persistence Layer
//!
//! Vocabulary shared by the storage adapter and the GraphQL directive
//! pipeline: normalized entity records, field paths, persistence predicates,
//! serializer callables, and the error taxonomy.

pub mod error;
pub mod path;
pub mod predicate;
pub mod record;

pub use error::{ConfigError, StoreError, StrataError, StrataResult, TransformError};
pub use path::FieldPath;
pub use predicate::{
    always_persist, default_denormalizer, default_normalizer, Denormalizer, Normalizer,
    PersistPredicate, StoreOp,
};
pub use record::{
    is_marked, is_truthy, merge_records, EntityRecord, PERSIST_DIRECTIVE, PERSIST_FIELD, ROOT_ID,
};
