//! Pure transforms over parsed GraphQL documents.
//!
//! Two independent operations drive the persistence protocol:
//!
//! 1. Marker injection: append a `__persist` field to every non-root
//!    selection set, so normalized records carry the marker the persistence
//!    predicate inspects at write time.
//! 2. Directive extraction: find every `@persist` occurrence, turn it into a
//!    field path (fragment spreads resolved transitively), and return a
//!    directive-free copy of the document.
//!
//! Inputs are never mutated; every transform clones and returns.

use std::collections::HashMap;
use std::sync::Arc;

use async_graphql_parser::types::{
    DocumentOperations, ExecutableDocument, Field, OperationDefinition, Selection, SelectionSet,
};
use async_graphql_parser::{Pos, Positioned};
use async_graphql_value::Name;

use strata_core::{FieldPath, TransformError, PERSIST_FIELD};

/// Result of directive extraction: the directive-free document plus the
/// field paths the directive occurrences marked.
#[derive(Debug)]
pub struct Extraction {
    pub document: ExecutableDocument,
    pub paths: Vec<FieldPath>,
}

/// Where a selection (or spread site) textually lives.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Container {
    Operation,
    Fragment(String),
}

/// One use site of a named fragment.
#[derive(Debug)]
struct SpreadSite {
    container: Container,
    path: FieldPath,
}

fn pos<T>(node: T) -> Positioned<T> {
    Positioned::new(node, Pos::default())
}

fn persist_field() -> Field {
    Field {
        alias: None,
        name: pos(Name::new(PERSIST_FIELD)),
        arguments: Vec::new(),
        directives: Vec::new(),
        selection_set: pos(SelectionSet::default()),
    }
}

fn for_each_operation<'a>(
    document: &'a ExecutableDocument,
    mut f: impl FnMut(&'a OperationDefinition),
) {
    match &document.operations {
        DocumentOperations::Single(operation) => f(&operation.node),
        DocumentOperations::Multiple(operations) => {
            for operation in operations.values() {
                f(&operation.node);
            }
        }
    }
}

fn for_each_operation_mut(
    document: &mut ExecutableDocument,
    mut f: impl FnMut(&mut OperationDefinition),
) {
    match &mut document.operations {
        DocumentOperations::Single(operation) => f(&mut operation.node),
        DocumentOperations::Multiple(operations) => {
            for operation in operations.values_mut() {
                f(&mut operation.node);
            }
        }
    }
}

fn has_directive(
    directives: &[Positioned<async_graphql_parser::types::Directive>],
    name: &str,
) -> bool {
    directives.iter().any(|d| d.node.name.node.as_str() == name)
}

// ============================================================================
// MARKER INJECTION
// ============================================================================

/// Append a `__persist` selection to every non-root selection set that does
/// not already request `__typename` (the type discriminator doubles as the
/// marker carrier). Operation roots never receive the marker themselves but
/// their children are still visited; fragment definition roots do receive it.
pub fn add_persist_field_to_document(document: &ExecutableDocument) -> ExecutableDocument {
    let mut document = document.clone();

    for_each_operation_mut(&mut document, |operation| {
        add_marker_to_selection_set(&mut operation.selection_set.node, true);
    });
    for fragment in document.fragments.values_mut() {
        add_marker_to_selection_set(&mut fragment.node.selection_set.node, false);
    }

    document
}

fn add_marker_to_selection_set(set: &mut SelectionSet, is_root: bool) {
    if !is_root {
        let has_typename = set.items.iter().any(|item| {
            matches!(&item.node, Selection::Field(f) if f.node.name.node.as_str() == "__typename")
        });
        if !has_typename {
            set.items.push(pos(Selection::Field(pos(persist_field()))));
        }
    }

    for item in &mut set.items {
        match &mut item.node {
            Selection::Field(field) => {
                // Never descend into introspection fields.
                if !field.node.name.node.as_str().starts_with("__")
                    && !field.node.selection_set.node.items.is_empty()
                {
                    add_marker_to_selection_set(&mut field.node.selection_set.node, false);
                }
            }
            Selection::InlineFragment(inline) => {
                add_marker_to_selection_set(&mut inline.node.selection_set.node, false);
            }
            Selection::FragmentSpread(_) => {}
        }
    }
}

// ============================================================================
// DIRECTIVE EXTRACTION
// ============================================================================

#[derive(Default)]
struct Scan {
    /// Paths of directive occurrences directly under an operation.
    direct: Vec<FieldPath>,
    /// Directive occurrences inside fragment definitions, staged per name.
    staged: Vec<(String, Vec<FieldPath>)>,
    /// Every fragment spread site in the document.
    spreads: HashMap<String, Vec<SpreadSite>>,
}

impl Scan {
    fn record(&mut self, container: &Container, path: FieldPath) {
        match container {
            // A directive at the operation root has an empty path and is
            // indistinguishable from "nothing marked"; ignore it.
            Container::Operation => {
                if !path.is_root() {
                    self.direct.push(path);
                }
            }
            Container::Fragment(name) => match self.staged.iter_mut().find(|(n, _)| n == name) {
                Some((_, paths)) => paths.push(path),
                None => self.staged.push((name.clone(), vec![path])),
            },
        }
    }
}

/// Extract every occurrence of `@<directive>` from the document.
///
/// Occurrences directly under an operation become complete paths at once.
/// Occurrences inside fragment definitions compose with every transitive,
/// operation-rooted chain of spread sites for that fragment. A fragment
/// chain that spreads back into itself is invalid input.
pub fn extract_persist_directive_paths(
    document: &ExecutableDocument,
    directive: &str,
) -> Result<Extraction, TransformError> {
    let mut scan = Scan::default();

    for_each_operation(document, |operation| {
        let mut stack = Vec::new();
        scan_selection_set(
            &operation.selection_set.node,
            &Container::Operation,
            &mut stack,
            directive,
            &mut scan,
        );
    });

    for (name, fragment) in &document.fragments {
        let container = Container::Fragment(name.as_str().to_string());
        // A directive on the fragment definition itself marks the spread site.
        if has_directive(&fragment.node.directives, directive) {
            scan.record(&container, FieldPath::root());
        }
        let mut stack = Vec::new();
        scan_selection_set(
            &fragment.node.selection_set.node,
            &container,
            &mut stack,
            directive,
            &mut scan,
        );
    }

    let mut paths = std::mem::take(&mut scan.direct);
    for (fragment, staged_paths) in &scan.staged {
        let mut visiting = Vec::new();
        let prefixes = resolve_spread_prefixes(fragment, &scan.spreads, &mut visiting)?;
        for prefix in &prefixes {
            for staged in staged_paths {
                paths.push(prefix.join(staged));
            }
        }
    }

    let mut stripped = document.clone();
    for_each_operation_mut(&mut stripped, |operation| {
        operation
            .directives
            .retain(|d| d.node.name.node.as_str() != directive);
        strip_directive_from_selection_set(&mut operation.selection_set.node, directive);
    });
    for fragment in stripped.fragments.values_mut() {
        fragment
            .node
            .directives
            .retain(|d| d.node.name.node.as_str() != directive);
        strip_directive_from_selection_set(&mut fragment.node.selection_set.node, directive);
    }

    Ok(Extraction {
        document: stripped,
        paths,
    })
}

fn scan_selection_set(
    set: &SelectionSet,
    container: &Container,
    stack: &mut Vec<String>,
    directive: &str,
    scan: &mut Scan,
) {
    for item in &set.items {
        match &item.node {
            Selection::Field(field) => {
                stack.push(field.node.name.node.as_str().to_string());
                if has_directive(&field.node.directives, directive) {
                    scan.record(container, FieldPath::new(stack.clone()));
                }
                scan_selection_set(
                    &field.node.selection_set.node,
                    container,
                    stack,
                    directive,
                    scan,
                );
                stack.pop();
            }
            Selection::FragmentSpread(spread) => {
                let name = spread.node.fragment_name.node.as_str().to_string();
                scan.spreads.entry(name).or_default().push(SpreadSite {
                    container: container.clone(),
                    path: FieldPath::new(stack.clone()),
                });
                if has_directive(&spread.node.directives, directive) {
                    scan.record(container, FieldPath::new(stack.clone()));
                }
            }
            Selection::InlineFragment(inline) => {
                if has_directive(&inline.node.directives, directive) {
                    scan.record(container, FieldPath::new(stack.clone()));
                }
                scan_selection_set(
                    &inline.node.selection_set.node,
                    container,
                    stack,
                    directive,
                    scan,
                );
            }
        }
    }
}

/// All operation-rooted field paths leading to spread sites of `fragment`,
/// resolved transitively through intermediate fragments.
fn resolve_spread_prefixes(
    fragment: &str,
    spreads: &HashMap<String, Vec<SpreadSite>>,
    visiting: &mut Vec<String>,
) -> Result<Vec<FieldPath>, TransformError> {
    if visiting.iter().any(|name| name == fragment) {
        return Err(TransformError::RecursiveFragment {
            name: fragment.to_string(),
        });
    }
    visiting.push(fragment.to_string());

    let mut prefixes = Vec::new();
    if let Some(sites) = spreads.get(fragment) {
        for site in sites {
            match &site.container {
                Container::Operation => prefixes.push(site.path.clone()),
                Container::Fragment(parent) => {
                    for parent_prefix in resolve_spread_prefixes(parent, spreads, visiting)? {
                        prefixes.push(parent_prefix.join(&site.path));
                    }
                }
            }
        }
    }

    visiting.pop();
    Ok(prefixes)
}

fn strip_directive_from_selection_set(set: &mut SelectionSet, directive: &str) {
    for item in &mut set.items {
        match &mut item.node {
            Selection::Field(field) => {
                field
                    .node
                    .directives
                    .retain(|d| d.node.name.node.as_str() != directive);
                strip_directive_from_selection_set(&mut field.node.selection_set.node, directive);
            }
            Selection::FragmentSpread(spread) => {
                spread
                    .node
                    .directives
                    .retain(|d| d.node.name.node.as_str() != directive);
            }
            Selection::InlineFragment(inline) => {
                inline
                    .node
                    .directives
                    .retain(|d| d.node.name.node.as_str() != directive);
                strip_directive_from_selection_set(&mut inline.node.selection_set.node, directive);
            }
        }
    }
}

// ============================================================================
// PRESENCE CHECK AND MARKER-REQUEST REMOVAL
// ============================================================================

/// Whether `@<directive>` appears anywhere in the document. Short-circuits.
pub fn has_persist_directive(document: &ExecutableDocument, directive: &str) -> bool {
    let mut found = false;
    for_each_operation(document, |operation| {
        found = found
            || has_directive(&operation.directives, directive)
            || selection_set_has_directive(&operation.selection_set.node, directive);
    });
    if found {
        return true;
    }

    document.fragments.values().any(|fragment| {
        has_directive(&fragment.node.directives, directive)
            || selection_set_has_directive(&fragment.node.selection_set.node, directive)
    })
}

fn selection_set_has_directive(set: &SelectionSet, directive: &str) -> bool {
    set.items.iter().any(|item| match &item.node {
        Selection::Field(field) => {
            has_directive(&field.node.directives, directive)
                || selection_set_has_directive(&field.node.selection_set.node, directive)
        }
        Selection::FragmentSpread(spread) => has_directive(&spread.node.directives, directive),
        Selection::InlineFragment(inline) => {
            has_directive(&inline.node.directives, directive)
                || selection_set_has_directive(&inline.node.selection_set.node, directive)
        }
    })
}

/// Remove every field literally named `__persist` from the document. The
/// link applies this to outgoing queries so the marker never reaches the
/// server.
pub fn strip_persist_fields(document: &ExecutableDocument) -> ExecutableDocument {
    let mut document = document.clone();
    for_each_operation_mut(&mut document, |operation| {
        strip_fields_named(&mut operation.selection_set.node, PERSIST_FIELD);
    });
    for fragment in document.fragments.values_mut() {
        strip_fields_named(&mut fragment.node.selection_set.node, PERSIST_FIELD);
    }
    document
}

fn strip_fields_named(set: &mut SelectionSet, name: &str) {
    set.items.retain(|item| {
        !matches!(&item.node, Selection::Field(f) if f.node.name.node.as_str() == name)
    });
    for item in &mut set.items {
        match &mut item.node {
            Selection::Field(field) => {
                strip_fields_named(&mut field.node.selection_set.node, name)
            }
            Selection::InlineFragment(inline) => {
                strip_fields_named(&mut inline.node.selection_set.node, name)
            }
            Selection::FragmentSpread(_) => {}
        }
    }
}

// ============================================================================
// INJECTION POLICY
// ============================================================================

/// When to run marker injection on an outgoing document.
#[derive(Clone)]
pub enum MarkerInjection {
    /// Never inject (default).
    Never,
    /// Inject into every document.
    Always,
    /// Decide per document.
    ByDocument(Arc<dyn Fn(&ExecutableDocument) -> bool + Send + Sync>),
}

impl Default for MarkerInjection {
    fn default() -> Self {
        Self::Never
    }
}

impl MarkerInjection {
    pub fn applies_to(&self, document: &ExecutableDocument) -> bool {
        match self {
            Self::Never => false,
            Self::Always => true,
            Self::ByDocument(predicate) => predicate(document),
        }
    }
}

/// The document-transform hook body: inject markers when the policy says so,
/// otherwise pass the document through untouched.
pub fn transform_document(
    policy: &MarkerInjection,
    document: &ExecutableDocument,
) -> ExecutableDocument {
    if policy.applies_to(document) {
        add_persist_field_to_document(document)
    } else {
        document.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_graphql_parser::parse_query;
    use strata_core::PERSIST_DIRECTIVE;

    fn count_fields_named(document: &ExecutableDocument, name: &str) -> usize {
        let mut count = 0;
        for_each_operation(document, |operation| {
            count += count_in_set(&operation.selection_set.node, name);
        });
        for fragment in document.fragments.values() {
            count += count_in_set(&fragment.node.selection_set.node, name);
        }
        count
    }

    fn count_in_set(set: &SelectionSet, name: &str) -> usize {
        set.items
            .iter()
            .map(|item| match &item.node {
                Selection::Field(f) => {
                    let own = usize::from(f.node.name.node.as_str() == name);
                    own + count_in_set(&f.node.selection_set.node, name)
                }
                Selection::InlineFragment(inline) => {
                    count_in_set(&inline.node.selection_set.node, name)
                }
                Selection::FragmentSpread(_) => 0,
            })
            .sum()
    }

    fn root_selection_set(document: &ExecutableDocument) -> &SelectionSet {
        match &document.operations {
            DocumentOperations::Single(operation) => &operation.node.selection_set.node,
            DocumentOperations::Multiple(_) => panic!("expected a single operation"),
        }
    }

    fn paths(extraction: &Extraction) -> Vec<Vec<&str>> {
        extraction
            .paths
            .iter()
            .map(|p| p.segments().iter().map(String::as_str).collect())
            .collect()
    }

    #[test]
    fn test_marker_added_to_non_root_selection_sets() {
        let document = parse_query("query { a { b c { d } } }").unwrap();
        let injected = add_persist_field_to_document(&document);

        // Root set untouched, nested sets each gain one marker.
        assert_eq!(count_in_set(root_selection_set(&injected), PERSIST_FIELD), 2);
        let root_level: Vec<_> = root_selection_set(&injected)
            .items
            .iter()
            .filter(|item| {
                matches!(&item.node, Selection::Field(f) if f.node.name.node.as_str() == PERSIST_FIELD)
            })
            .collect();
        assert!(root_level.is_empty());
    }

    #[test]
    fn test_marker_injection_does_not_mutate_input() {
        let document = parse_query("query { a { b } }").unwrap();
        let _ = add_persist_field_to_document(&document);
        assert_eq!(count_fields_named(&document, PERSIST_FIELD), 0);
    }

    #[test]
    fn test_marker_skipped_when_typename_requested() {
        let document = parse_query("query { a { __typename b } }").unwrap();
        let injected = add_persist_field_to_document(&document);
        assert_eq!(count_fields_named(&injected, PERSIST_FIELD), 0);
    }

    #[test]
    fn test_marker_never_enters_introspection_fields() {
        let document = parse_query("query { __schema { types { name } } }").unwrap();
        let injected = add_persist_field_to_document(&document);
        assert_eq!(count_fields_named(&injected, PERSIST_FIELD), 0);
    }

    #[test]
    fn test_marker_added_to_fragment_definitions() {
        let document =
            parse_query("query { a { ...F } } fragment F on T { b }").unwrap();
        let injected = add_persist_field_to_document(&document);

        let fragment = injected.fragments.values().next().unwrap();
        assert_eq!(count_in_set(&fragment.node.selection_set.node, PERSIST_FIELD), 1);
    }

    #[test]
    fn test_marker_added_inside_inline_fragments() {
        let document = parse_query("query { a { ... on T { b } } }").unwrap();
        let injected = add_persist_field_to_document(&document);
        // One for a's set, one for the inline fragment body.
        assert_eq!(count_fields_named(&injected, PERSIST_FIELD), 2);
    }

    #[test]
    fn test_extract_direct_path() {
        let document = parse_query("query { x @persist { id } }").unwrap();
        let extraction =
            extract_persist_directive_paths(&document, PERSIST_DIRECTIVE).unwrap();

        assert_eq!(paths(&extraction), vec![vec!["x"]]);
        assert!(!has_persist_directive(&extraction.document, PERSIST_DIRECTIVE));
        // Field structure is preserved.
        assert_eq!(count_fields_named(&extraction.document, "x"), 1);
        assert_eq!(count_fields_named(&extraction.document, "id"), 1);
    }

    #[test]
    fn test_extract_round_trip_with_fragment() {
        let document = parse_query(
            "query {
                x @persist { id }
                w { ...frag }
            }
            fragment frag on W {
                y { z @persist { id } }
            }",
        )
        .unwrap();
        let extraction =
            extract_persist_directive_paths(&document, PERSIST_DIRECTIVE).unwrap();

        assert_eq!(paths(&extraction), vec![vec!["x"], vec!["w", "y", "z"]]);
        assert!(!has_persist_directive(&extraction.document, PERSIST_DIRECTIVE));
    }

    #[test]
    fn test_extract_through_chained_fragments() {
        let document = parse_query(
            "query { a { ...B } }
            fragment B on T { b { ...A } }
            fragment A on U { c @persist { id } }",
        )
        .unwrap();
        let extraction =
            extract_persist_directive_paths(&document, PERSIST_DIRECTIVE).unwrap();

        assert_eq!(paths(&extraction), vec![vec!["a", "b", "c"]]);
    }

    #[test]
    fn test_extract_multiple_spread_sites() {
        let document = parse_query(
            "query { a { ...F } b { ...F } }
            fragment F on T { c @persist }",
        )
        .unwrap();
        let extraction =
            extract_persist_directive_paths(&document, PERSIST_DIRECTIVE).unwrap();

        let mut found = paths(&extraction);
        found.sort();
        assert_eq!(found, vec![vec!["a", "c"], vec!["b", "c"]]);
    }

    #[test]
    fn test_directive_on_spread_marks_use_site() {
        let document = parse_query(
            "query { w { ...F @persist } }
            fragment F on T { a }",
        )
        .unwrap();
        let extraction =
            extract_persist_directive_paths(&document, PERSIST_DIRECTIVE).unwrap();

        assert_eq!(paths(&extraction), vec![vec!["w"]]);
        assert!(!has_persist_directive(&extraction.document, PERSIST_DIRECTIVE));
    }

    #[test]
    fn test_directive_on_fragment_definition_marks_spread_site() {
        let document = parse_query(
            "query { w { ...F } }
            fragment F on T @persist { a }",
        )
        .unwrap();
        let extraction =
            extract_persist_directive_paths(&document, PERSIST_DIRECTIVE).unwrap();

        assert_eq!(paths(&extraction), vec![vec!["w"]]);
    }

    #[test]
    fn test_directive_at_operation_root_is_ignored() {
        let document = parse_query("query @persist { a { id } }").unwrap();
        let extraction =
            extract_persist_directive_paths(&document, PERSIST_DIRECTIVE).unwrap();

        assert!(extraction.paths.is_empty());
        // Still stripped from the returned document.
        assert!(!has_persist_directive(&extraction.document, PERSIST_DIRECTIVE));
    }

    #[test]
    fn test_extract_inside_inline_fragment() {
        let document =
            parse_query("query { a { ... on T { b @persist { id } } } }").unwrap();
        let extraction =
            extract_persist_directive_paths(&document, PERSIST_DIRECTIVE).unwrap();

        assert_eq!(paths(&extraction), vec![vec!["a", "b"]]);
    }

    #[test]
    fn test_recursive_fragment_chain_is_rejected() {
        let document = parse_query(
            "query { a { ...A } }
            fragment A on T { b { ...A } c @persist }",
        )
        .unwrap();
        let err =
            extract_persist_directive_paths(&document, PERSIST_DIRECTIVE).unwrap_err();
        assert!(matches!(err, TransformError::RecursiveFragment { .. }));
    }

    #[test]
    fn test_unreachable_fragment_yields_no_paths() {
        let document = parse_query(
            "query { a }
            fragment Orphan on T { b @persist }",
        )
        .unwrap();
        let extraction =
            extract_persist_directive_paths(&document, PERSIST_DIRECTIVE).unwrap();
        assert!(extraction.paths.is_empty());
    }

    #[test]
    fn test_has_persist_directive() {
        let with = parse_query("query { a @persist }").unwrap();
        let without = parse_query("query { a }").unwrap();
        let in_fragment =
            parse_query("query { ...F } fragment F on T { a @persist }").unwrap();

        assert!(has_persist_directive(&with, PERSIST_DIRECTIVE));
        assert!(!has_persist_directive(&without, PERSIST_DIRECTIVE));
        assert!(has_persist_directive(&in_fragment, PERSIST_DIRECTIVE));
    }

    #[test]
    fn test_strip_persist_fields() {
        let document = parse_query("query { a { __persist b { __persist } } }").unwrap();
        let stripped = strip_persist_fields(&document);
        assert_eq!(count_fields_named(&stripped, PERSIST_FIELD), 0);
        assert_eq!(count_fields_named(&stripped, "b"), 1);
    }

    #[test]
    fn test_marker_injection_policy() {
        let plain = parse_query("query { a }").unwrap();
        let marked = parse_query("query { a @persist }").unwrap();

        assert!(!MarkerInjection::Never.applies_to(&marked));
        assert!(MarkerInjection::Always.applies_to(&plain));

        let by_directive = MarkerInjection::ByDocument(Arc::new(|doc| {
            has_persist_directive(doc, PERSIST_DIRECTIVE)
        }));
        assert!(by_directive.applies_to(&marked));
        assert!(!by_directive.applies_to(&plain));

        let transformed = transform_document(&MarkerInjection::Always, &plain);
        assert_eq!(count_fields_named(&transformed, PERSIST_FIELD), 0); // root only, no nested sets
        let nested = parse_query("query { a { b } }").unwrap();
        let transformed = transform_document(&by_directive, &nested);
        assert_eq!(count_fields_named(&transformed, PERSIST_FIELD), 0); // policy said no
    }
}
