//! Entrypoint Pre-Check (§4.3): a cheap unsatisfiability pruning over the
//! type-graph, not a soundness gate. The main expander must be correct even
//! without it (§8 invariant 8 — consistency with the full expansion).

use crate::models::ListUsersRequest;
use crate::typesystem::TypeSystem;

/// Returns `true` if some path in the pruned type-graph connects the
/// requested `(object.type, relation)` to the primary filter's
/// `(type, relation?)`. `false` means the full expansion would find nothing,
/// so the caller can skip reading tuples entirely.
pub fn passes_precheck(request: &ListUsersRequest, type_system: &TypeSystem) -> bool {
    let Some(primary) = request.user_filters.first() else {
        return false;
    };
    let mut graph = type_system.pruned_relationship_edges();
    let source = (primary.object_type.as_str(), primary.relation.as_deref().unwrap_or(""));
    let target = (request.object.object_type.as_str(), request.relation.as_str());
    graph.has_path(target, source)
}
