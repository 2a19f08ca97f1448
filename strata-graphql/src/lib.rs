//! STRATA GraphQL - Persist-Directive Pipeline
//!
//! The query-side half of the persistence layer:
//!
//! ```text
//! outgoing query
//!     ↓
//! extract @persist paths + strip directive artifacts (transform)
//!     ↓
//! forward to the network layer
//!     ↓
//! attach __persist markers onto response data (annotate)
//!     ↓
//! normalized write consults the marker (PersistLink::should_persist)
//! ```

pub mod annotate;
pub mod link;
pub mod transform;

pub use annotate::attach_persist_markers;
pub use link::{Operation, OperationResult, PersistLink, ResultStream};
pub use transform::{
    add_persist_field_to_document, extract_persist_directive_paths, has_persist_directive,
    strip_persist_fields, transform_document, Extraction, MarkerInjection,
};
