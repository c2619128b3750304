//! Tuple Reader Facade (§4.1) and Filtered Tuple Iterator (§4.2).

use crate::error::{ListUsersError, Result};
use crate::models::{ContextualTuple, Object, TupleRecord};
use crate::typesystem::TypeSystem;
use async_trait::async_trait;
use dashmap::DashMap;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::warn;

pub mod postgres;

/// The store's narrow reader interface, consumed as an opaque API (§6.2).
/// The persistent engine behind it is out of scope (spec.md §1).
#[async_trait]
pub trait TupleReader: Send + Sync {
    async fn read(&self, store_id: &str, object: &Object, relation: &str) -> Result<Vec<TupleRecord>>;
}

/// In-memory reader for tests and standalone use, grounded on
/// `auth-zanzibar::repository::InMemoryTupleRepository`.
#[derive(Default)]
pub struct InMemoryTupleReader {
    tuples: DashMap<String, Vec<TupleRecord>>,
}

impl InMemoryTupleReader {
    pub fn new() -> Self {
        Self::default()
    }

    fn key(store_id: &str, object: &Object, relation: &str) -> String {
        format!("{}/{}#{}", store_id, object, relation)
    }

    pub fn write(&self, store_id: &str, tuple: TupleRecord) {
        let key = Self::key(store_id, &tuple.object, &tuple.relation);
        self.tuples.entry(key).or_default().push(tuple);
    }
}

#[async_trait]
impl TupleReader for InMemoryTupleReader {
    async fn read(&self, store_id: &str, object: &Object, relation: &str) -> Result<Vec<TupleRecord>> {
        let key = Self::key(store_id, object, relation);
        Ok(self.tuples.get(&key).map(|v| v.clone()).unwrap_or_default())
    }
}

/// Overlays per-request contextual tuples ahead of the underlying store
/// read. Contextual tuples are request-scoped and never persisted (§4.1).
pub struct ContextualTupleReader<'a> {
    base: Arc<dyn TupleReader>,
    contextual_tuples: &'a [ContextualTuple],
}

impl<'a> ContextualTupleReader<'a> {
    pub fn new(base: Arc<dyn TupleReader>, contextual_tuples: &'a [ContextualTuple]) -> Self {
        Self {
            base,
            contextual_tuples,
        }
    }

    /// Races the underlying store read against `cancel` so an in-flight read
    /// is abandoned promptly once a sibling has already failed (§5).
    pub async fn read(
        &self,
        store_id: &str,
        object: &Object,
        relation: &str,
        cancel: &CancellationToken,
    ) -> Result<Vec<TupleRecord>> {
        let mut out: Vec<TupleRecord> = self
            .contextual_tuples
            .iter()
            .filter(|t| &t.object == object && t.relation == relation)
            .cloned()
            .collect();

        let stored = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Ok(Vec::new()),
            result = self.base.read(store_id, object, relation) => {
                result.map_err(|e| ListUsersError::TupleReadFailure(e.to_string()))?
            }
        };
        out.extend(stored);
        Ok(out)
    }
}

/// Drops tuples invalid under the current schema — wrong types, relation no
/// longer defined, subject type not permitted. Invalid tuples are silently
/// skipped (ValidationSkip, §7); they do not abort expansion.
pub fn filter_valid_tuples(
    tuples: Vec<TupleRecord>,
    type_system: &TypeSystem,
) -> Vec<TupleRecord> {
    tuples
        .into_iter()
        .filter(|t| {
            let valid = type_system.filter_invalid_tuples(&t.object.object_type, &t.relation, &t.user);
            if !valid {
                warn!(
                    "dropping tuple invalid under current schema: {}",
                    t
                );
            }
            valid
        })
        .collect()
}

/// Reads tuples for `(object, relation)` via the facade, then filters them
/// against the schema. The single entry point `expand_direct` (§4.5) and
/// `expand_ttu` (§4.6) use to get a trustworthy tuple list.
pub async fn read_filtered(
    store_id: &str,
    object: &Object,
    relation: &str,
    contextual: &ContextualTupleReader<'_>,
    type_system: &TypeSystem,
    cancel: &CancellationToken,
) -> Result<Vec<TupleRecord>> {
    let raw = contextual.read(store_id, object, relation, cancel).await?;
    Ok(filter_valid_tuples(raw, type_system))
}
