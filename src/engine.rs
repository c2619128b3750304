//! Public API (§6.1): `ListUsersQuery` wires the type system, tuple reader,
//! and fan-out pool into the single `list_users` operation, mirroring the
//! teacher's `AuthorizationEngine` builder but scoped to this one query.

use crate::aggregator::spawn_collector;
use crate::concurrency::FanoutPool;
use crate::config::Config;
use crate::entrypoint::passes_precheck;
use crate::error::{ListUsersError, Result};
use crate::expand::{expand, ExpandContext};
use crate::models::{ListUsersRequest, ListUsersResponse};
use crate::reader::TupleReader;
use crate::request::InternalRequest;
use crate::typesystem::TypeSystem;
use std::sync::Arc;
use tracing::{debug, instrument};

/// The `ListUsers` evaluation engine for one `(store, model)` pair.
pub struct ListUsersQuery {
    reader: Arc<dyn TupleReader>,
    type_system: Arc<TypeSystem>,
    config: Config,
}

impl ListUsersQuery {
    pub fn new(reader: Arc<dyn TupleReader>, type_system: Arc<TypeSystem>) -> Self {
        Self {
            reader,
            type_system,
            config: Config::default(),
        }
    }

    pub fn with_config(mut self, config: Config) -> Self {
        self.config = config;
        self
    }

    /// Evaluates a `ListUsers` request to completion.
    ///
    /// Runs the entrypoint pre-check first (§4.3); a negative result short
    /// circuits to an empty response without reading a single tuple. On
    /// success, returns the deduplicated set of matching subjects (§4.10).
    #[instrument(skip(self, request), fields(object = %request.object, relation = %request.relation))]
    pub async fn list_users(&self, request: ListUsersRequest) -> Result<ListUsersResponse> {
        if request.user_filters.is_empty() {
            return Err(ListUsersError::Internal(anyhow::anyhow!(
                "list_users requires at least one user filter"
            )));
        }

        if !passes_precheck(&request, &self.type_system) {
            debug!("entrypoint pre-check found no reachable path; returning empty result");
            return Ok(ListUsersResponse { users: vec![] });
        }

        let root = InternalRequest::root(
            request.store_id,
            request.authorization_model_id,
            request.object,
            request.relation,
            request.user_filters,
            request.contextual_tuples,
        );

        let ctx = Arc::new(ExpandContext {
            reader: self.reader.clone(),
            type_system: self.type_system.clone(),
            fanout: FanoutPool::new(self.config.resolve_node_breadth_limit),
        });

        let (sink, collector) = spawn_collector(128);

        let expansion = expand(ctx, root, sink).await;

        let users = collector.await.map_err(|e| {
            ListUsersError::Internal(anyhow::anyhow!("aggregator task panicked: {e}"))
        })?;

        expansion?;

        Ok(ListUsersResponse { users })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ContextualTuple, Object, TupleRecord, UserFilter, UserRef};
    use crate::reader::InMemoryTupleReader;

    fn reader_with(tuples: Vec<(&str, &str, &str, &str, &str)>) -> Arc<InMemoryTupleReader> {
        let reader = InMemoryTupleReader::new();
        for (store, obj_type, obj_id, relation, user) in tuples {
            reader.write(
                store,
                TupleRecord::new(
                    Object::new(obj_type, obj_id),
                    relation,
                    UserRef::parse(user).unwrap(),
                ),
            );
        }
        Arc::new(reader)
    }

    fn request(object_type: &str, id: &str, relation: &str) -> ListUsersRequest {
        ListUsersRequest {
            store_id: "store".to_string(),
            authorization_model_id: "model".to_string(),
            object: Object::new(object_type, id),
            relation: relation.to_string(),
            user_filters: vec![UserFilter::object("user")],
            contextual_tuples: vec![],
        }
    }

    #[tokio::test]
    async fn returns_direct_viewer() {
        let reader = reader_with(vec![("store", "doc", "1", "viewer", "user:anne")]);
        let engine = ListUsersQuery::new(reader, Arc::new(TypeSystem::sample_schema()));
        let resp = engine.list_users(request("doc", "1", "viewer")).await.unwrap();
        assert_eq!(resp.users.len(), 1);
    }

    #[tokio::test]
    async fn union_can_view_merges_viewer_and_editor() {
        let reader = reader_with(vec![
            ("store", "doc", "1", "viewer", "user:anne"),
            ("store", "doc", "1", "editor", "user:bob"),
        ]);
        let engine = ListUsersQuery::new(reader, Arc::new(TypeSystem::sample_schema()));
        let resp = engine.list_users(request("doc", "1", "can_view")).await.unwrap();
        assert_eq!(resp.users.len(), 2);
    }

    #[tokio::test]
    async fn intersection_restricted_requires_both() {
        let reader = reader_with(vec![
            ("store", "doc", "1", "viewer", "user:anne"),
            ("store", "doc", "1", "editor", "user:anne"),
            ("store", "doc", "1", "viewer", "user:bob"),
        ]);
        let engine = ListUsersQuery::new(reader, Arc::new(TypeSystem::sample_schema()));
        let resp = engine.list_users(request("doc", "1", "restricted")).await.unwrap();
        assert_eq!(resp.users.len(), 1);
    }

    #[tokio::test]
    async fn difference_only_viewer_excludes_editors() {
        let reader = reader_with(vec![
            ("store", "doc", "1", "viewer", "user:anne"),
            ("store", "doc", "1", "viewer", "user:bob"),
            ("store", "doc", "1", "editor", "user:bob"),
        ]);
        let engine = ListUsersQuery::new(reader, Arc::new(TypeSystem::sample_schema()));
        let resp = engine.list_users(request("doc", "1", "only_viewer")).await.unwrap();
        assert_eq!(resp.users.len(), 1);
        assert!(matches!(&resp.users[0], crate::models::User::Object(o) if o.id == "anne"));
    }

    #[tokio::test]
    async fn wildcard_in_subtract_excludes_whole_type() {
        let reader = reader_with(vec![
            ("store", "doc", "1", "viewer", "user:anne"),
            ("store", "doc", "1", "editor", "user:*"),
        ]);
        let engine = ListUsersQuery::new(reader, Arc::new(TypeSystem::sample_schema()));
        let resp = engine.list_users(request("doc", "1", "only_viewer")).await.unwrap();
        assert!(resp.users.is_empty());
    }

    #[tokio::test]
    async fn self_loop_rewrite_terminates_with_no_results() {
        let reader = reader_with(vec![]);
        let engine = ListUsersQuery::new(reader, Arc::new(TypeSystem::sample_schema()));
        let resp = engine.list_users(request("doc", "1", "r")).await.unwrap();
        assert!(resp.users.is_empty());
    }

    #[tokio::test]
    async fn ttu_resolves_inherited_viewer_through_parent_folder() {
        let reader = reader_with(vec![
            ("store", "doc", "1", "parent", "folder:shared"),
            ("store", "folder", "shared", "viewer", "user:carol"),
        ]);
        let engine = ListUsersQuery::new(reader, Arc::new(TypeSystem::sample_schema()));
        let resp = engine
            .list_users(request("doc", "1", "inherited_viewer"))
            .await
            .unwrap();
        assert_eq!(resp.users.len(), 1);
    }

    #[tokio::test]
    async fn contextual_tuple_is_visible_without_being_persisted() {
        let reader = reader_with(vec![]);
        let engine = ListUsersQuery::new(reader, Arc::new(TypeSystem::sample_schema()));
        let mut req = request("doc", "1", "viewer");
        req.contextual_tuples = vec![ContextualTuple::new(
            Object::new("doc", "1"),
            "viewer",
            UserRef::parse("user:dana").unwrap(),
        )];
        let resp = engine.list_users(req).await.unwrap();
        assert_eq!(resp.users.len(), 1);
    }

    #[tokio::test]
    async fn entrypoint_precheck_short_circuits_unreachable_filter() {
        let reader = reader_with(vec![("store", "doc", "1", "viewer", "user:anne")]);
        let engine = ListUsersQuery::new(reader, Arc::new(TypeSystem::sample_schema()));
        let mut req = request("doc", "1", "viewer");
        req.user_filters = vec![UserFilter::object("folder")];
        let resp = engine.list_users(req).await.unwrap();
        assert!(resp.users.is_empty());
    }
}
