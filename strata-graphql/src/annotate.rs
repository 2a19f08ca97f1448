//! Attaches `__persist` markers to response data.
//!
//! The extracted field paths say where the directive pointed; the annotator
//! walks the concrete response and marks every object node that sits at,
//! above, or below one of those locations. The storage predicate reads the
//! marker back at normalized-write time.

use serde_json::{Map, Value};
use strata_core::{FieldPath, PERSIST_FIELD};

/// Deep-copy `data` with `__persist` markers attached.
///
/// Rules: the root object is always exempt; arrays are traversed but never
/// annotated themselves, and their indices do not count as path segments;
/// empty objects stay empty; an existing `__persist` key is never clobbered.
pub fn attach_persist_markers(paths: &[FieldPath], data: &Value) -> Value {
    let mut stack = Vec::new();
    annotate(data, &mut stack, paths, true)
}

fn annotate(value: &Value, stack: &mut Vec<String>, paths: &[FieldPath], is_root: bool) -> Value {
    match value {
        Value::Object(map) => {
            let mut annotated = Map::new();
            if !is_root && !map.is_empty() {
                let marked = paths.iter().any(|path| path.overlaps_segments(stack));
                annotated.insert(PERSIST_FIELD.to_string(), Value::Bool(marked));
            }
            for (key, child) in map {
                stack.push(key.clone());
                let child = annotate(child, stack, paths, false);
                stack.pop();
                // Re-inserting an existing __persist key overwrites the
                // computed marker, so caller-provided values win.
                annotated.insert(key.clone(), child);
            }
            Value::Object(annotated)
        }
        Value::Array(items) => Value::Array(
            items
                .iter()
                .map(|item| annotate(item, stack, paths, false))
                .collect(),
        ),
        scalar => scalar.clone(),
    }
}
