//! Per-sub-expansion request state (§3).

use crate::models::{ContextualTuple, Object, UserFilter};
use std::collections::HashSet;
use std::sync::Arc;

/// Cycle-detection set keyed on `"type:id#relation"`. Monotonically grown
/// along each root-to-leaf path and cloned on every branch so siblings at
/// union/intersection/difference nodes never poison each other (§4.9).
#[derive(Debug, Clone, Default)]
pub struct VisitedSet(HashSet<String>);

impl VisitedSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `true` if `(object, relation)` was already visited on this
    /// path (cycle), otherwise inserts it and returns `false`.
    pub fn enter(&mut self, object: &Object, relation: &str) -> bool {
        let key = format!("{}#{}", object, relation);
        !self.0.insert(key)
    }
}

/// Per-sub-expansion request. Shared by reference among sub-expansions
/// except for `visited`, which is cloned on every branch (§3 invariants).
#[derive(Debug, Clone)]
pub struct InternalRequest {
    pub store_id: String,
    pub model_id: String,
    pub object: Object,
    pub relation: String,
    /// Stable across all recursive sub-calls; only `object`/`relation` vary.
    pub user_filters: Arc<Vec<UserFilter>>,
    pub contextual_tuples: Arc<Vec<ContextualTuple>>,
    pub visited: VisitedSet,
    /// Set once the walk has descended through an intersection or
    /// difference node; gates which filters may fire (§4.4 step 2, §9).
    pub passed_through_intersection_or_exclusion: bool,
}

impl InternalRequest {
    pub fn root(
        store_id: String,
        model_id: String,
        object: Object,
        relation: String,
        user_filters: Vec<UserFilter>,
        contextual_tuples: Vec<ContextualTuple>,
    ) -> Self {
        Self {
            store_id,
            model_id,
            object,
            relation,
            user_filters: Arc::new(user_filters),
            contextual_tuples: Arc::new(contextual_tuples),
            visited: VisitedSet::new(),
            passed_through_intersection_or_exclusion: false,
        }
    }

    /// The first entry of `user_filters`; governs wildcard key construction
    /// (§3, §9 open questions). Requests always carry at least one filter.
    pub fn primary_filter(&self) -> &UserFilter {
        &self.user_filters[0]
    }

    /// Clones this request for a sibling sub-expansion at `object`/`relation`,
    /// carrying the same filters and flag but an independent `visited` copy.
    pub fn branch(&self, object: Object, relation: &str, passed_through: bool) -> Self {
        Self {
            store_id: self.store_id.clone(),
            model_id: self.model_id.clone(),
            object,
            relation: relation.to_string(),
            user_filters: self.user_filters.clone(),
            contextual_tuples: self.contextual_tuples.clone(),
            visited: self.visited.clone(),
            passed_through_intersection_or_exclusion: passed_through,
        }
    }
}
