//! The persistence request-pipeline stage.
//!
//! `PersistLink` sits between the application and the network layer: it
//! strips directive artifacts from outgoing queries, records which locations
//! were marked, and re-attaches `__persist` markers onto incoming response
//! data. The forward layer is modeled as a single-subscriber stream producer;
//! annotation is a synchronous `map`, so cardinality and ordering of emitted
//! results are preserved.

use std::pin::Pin;

use async_graphql_parser::types::ExecutableDocument;
use futures_util::stream::{Stream, StreamExt};
use serde_json::Value;

use strata_core::{
    is_marked, EntityRecord, PersistPredicate, StoreOp, TransformError, PERSIST_DIRECTIVE,
    ROOT_ID,
};

use crate::annotate::attach_persist_markers;
use crate::transform::{
    extract_persist_directive_paths, has_persist_directive, strip_persist_fields,
};

/// An outgoing request: the query document plus whatever the host pipeline
/// carries alongside it.
#[derive(Debug, Clone)]
pub struct Operation {
    pub query: ExecutableDocument,
}

impl Operation {
    pub fn new(query: ExecutableDocument) -> Self {
        Self { query }
    }
}

/// One emitted result from the forward layer.
#[derive(Debug, Clone)]
pub struct OperationResult {
    pub data: Option<Value>,
}

/// The forward layer's output: a boxed single-subscriber stream of results.
pub type ResultStream = Pin<Box<dyn Stream<Item = OperationResult> + Send>>;

/// Request-pipeline stage handling the `@persist` directive protocol.
#[derive(Debug, Clone)]
pub struct PersistLink {
    directive: String,
}

impl Default for PersistLink {
    fn default() -> Self {
        Self {
            directive: PERSIST_DIRECTIVE.to_string(),
        }
    }
}

impl PersistLink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Use a directive name other than `persist`.
    pub fn with_directive(directive: impl Into<String>) -> Self {
        Self {
            directive: directive.into(),
        }
    }

    /// Marker-aware persistence predicate for the storage adapter: persist
    /// the query root, records the normalizer never saw (nothing to judge),
    /// and records carrying a truthy marker.
    pub fn should_persist(_op: StoreOp, data_id: &str, record: Option<&EntityRecord>) -> bool {
        data_id == ROOT_ID || record.map_or(true, is_marked)
    }

    /// [`Self::should_persist`] boxed for `AdapterConfig::with_should_persist`.
    pub fn persist_predicate() -> PersistPredicate {
        std::sync::Arc::new(Self::should_persist)
    }

    /// Marker-injection policy matching this link: inject whenever the
    /// document uses the directive.
    pub fn add_persist_field(document: &ExecutableDocument) -> bool {
        has_persist_directive(document, PERSIST_DIRECTIVE)
    }

    /// Process one request.
    ///
    /// With no directive occurrences the operation is forwarded untouched and
    /// no annotation happens. Otherwise the query is replaced by its
    /// directive-free form with marker-request fields removed, and every
    /// result the forward layer emits has its data payload annotated.
    pub fn request<F>(&self, mut operation: Operation, forward: F) -> Result<ResultStream, TransformError>
    where
        F: FnOnce(Operation) -> ResultStream,
    {
        let extraction = extract_persist_directive_paths(&operation.query, &self.directive)?;
        if extraction.paths.is_empty() {
            return Ok(forward(operation));
        }

        operation.query = strip_persist_fields(&extraction.document);

        let paths = extraction.paths;
        let annotated = forward(operation).map(move |mut result| {
            if let Some(data) = result.data.take() {
                result.data = Some(attach_persist_markers(&paths, &data));
            }
            result
        });

        Ok(Box::pin(annotated))
    }
}
