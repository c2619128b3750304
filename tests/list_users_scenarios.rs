//! The six concrete scenarios and the eight invariants of the evaluation
//! engine, run against the `doc`/`user`/`folder` sample schema.

use rebac_listusers::reader::InMemoryTupleReader;
use rebac_listusers::typesystem::TypeSystem;
use rebac_listusers::{
    ContextualTuple, ListUsersQuery, ListUsersRequest, Object, TupleRecord, User, UserFilter,
    UserRef,
};
use std::collections::HashSet;
use std::sync::Arc;

fn engine(tuples: &[(&str, &str, &str, &str)]) -> ListUsersQuery {
    let reader = InMemoryTupleReader::new();
    for (obj_type, obj_id, relation, user) in tuples {
        reader.write(
            "store-1",
            TupleRecord::new(
                Object::new(obj_type, obj_id),
                relation,
                UserRef::parse(user).unwrap(),
            ),
        );
    }
    ListUsersQuery::new(Arc::new(reader), Arc::new(TypeSystem::sample_schema()))
}

fn request(relation: &str) -> ListUsersRequest {
    ListUsersRequest {
        store_id: "store-1".to_string(),
        authorization_model_id: "model-1".to_string(),
        object: Object::new("doc", "1"),
        relation: relation.to_string(),
        user_filters: vec![UserFilter::object("user")],
        contextual_tuples: vec![],
    }
}

fn user_canonical(u: &User) -> String {
    match u {
        User::Object(o) => format!("{}:{}", o.object_type, o.id),
        User::Userset { object, relation } => {
            format!("{}:{}#{}", object.object_type, object.id, relation)
        }
        User::Wildcard { object_type } => format!("{}:*", object_type),
    }
}

fn canonical_set(users: &[User]) -> HashSet<String> {
    users.iter().map(user_canonical).collect()
}

fn set(strs: &[&str]) -> HashSet<String> {
    strs.iter().map(|s| s.to_string()).collect()
}

#[tokio::test]
async fn scenario_1_direct_viewer_includes_wildcard() {
    let engine = engine(&[
        ("doc", "1", "viewer", "user:alice"),
        ("doc", "1", "viewer", "user:*"),
        ("doc", "1", "editor", "user:bob"),
    ]);
    let resp = engine.list_users(request("viewer")).await.unwrap();
    assert_eq!(canonical_set(&resp.users), set(&["user:alice", "user:*"]));
}

#[tokio::test]
async fn scenario_2_can_view_is_union_of_viewer_and_editor() {
    let engine = engine(&[
        ("doc", "1", "viewer", "user:alice"),
        ("doc", "1", "viewer", "user:*"),
        ("doc", "1", "editor", "user:bob"),
    ]);
    let resp = engine.list_users(request("can_view")).await.unwrap();
    assert_eq!(
        canonical_set(&resp.users),
        set(&["user:alice", "user:*", "user:bob"])
    );
}

#[tokio::test]
async fn scenario_3_restricted_is_intersection_with_wildcard_arithmetic() {
    let engine = engine(&[
        ("doc", "1", "viewer", "user:alice"),
        ("doc", "1", "viewer", "user:*"),
        ("doc", "1", "editor", "user:bob"),
    ]);
    let resp = engine.list_users(request("restricted")).await.unwrap();
    // bob: editor directly, and the wildcard on the viewer side admits him
    // too, so he clears the two-operand threshold. alice: viewer but never
    // editor, so she does not.
    assert_eq!(canonical_set(&resp.users), set(&["user:bob"]));
}

#[tokio::test]
async fn scenario_4_only_viewer_excludes_editors() {
    let engine = engine(&[
        ("doc", "1", "viewer", "user:alice"),
        ("doc", "1", "viewer", "user:*"),
        ("doc", "1", "editor", "user:bob"),
    ]);
    let resp = engine.list_users(request("only_viewer")).await.unwrap();
    assert_eq!(canonical_set(&resp.users), set(&["user:alice", "user:*"]));
}

#[tokio::test]
async fn scenario_5_wildcard_on_subtract_side_empties_the_result() {
    let engine = engine(&[
        ("doc", "1", "viewer", "user:alice"),
        ("doc", "1", "viewer", "user:*"),
        ("doc", "1", "editor", "user:bob"),
        ("doc", "1", "editor", "user:*"),
    ]);
    let resp = engine.list_users(request("only_viewer")).await.unwrap();
    assert!(resp.users.is_empty());
}

#[tokio::test]
async fn scenario_6_self_loop_rewrite_terminates_empty() {
    let engine = engine(&[]);
    let resp = engine.list_users(request("r")).await.unwrap();
    assert!(resp.users.is_empty());
}

#[tokio::test]
async fn invariant_determinism_as_a_set() {
    let engine = engine(&[
        ("doc", "1", "viewer", "user:alice"),
        ("doc", "1", "editor", "user:bob"),
    ]);
    let first = engine.list_users(request("can_view")).await.unwrap();
    let second = engine.list_users(request("can_view")).await.unwrap();
    assert_eq!(canonical_set(&first.users), canonical_set(&second.users));
}

#[tokio::test]
async fn invariant_deduplication_across_union_branches() {
    // alice reaches can_view through both the viewer and editor branch.
    let engine = engine(&[
        ("doc", "1", "viewer", "user:alice"),
        ("doc", "1", "editor", "user:alice"),
    ]);
    let resp = engine.list_users(request("can_view")).await.unwrap();
    assert_eq!(resp.users.len(), 1);
}

#[tokio::test]
async fn invariant_filter_soundness_rejects_unrequested_types() {
    let reader = InMemoryTupleReader::new();
    reader.write(
        "store-1",
        TupleRecord::new(
            Object::new("doc", "1"),
            "parent",
            UserRef::parse("folder:shared").unwrap(),
        ),
    );
    reader.write(
        "store-1",
        TupleRecord::new(
            Object::new("folder", "shared"),
            "viewer",
            UserRef::parse("user:carol").unwrap(),
        ),
    );
    let engine = ListUsersQuery::new(Arc::new(reader), Arc::new(TypeSystem::sample_schema()));
    let resp = engine.list_users(request("inherited_viewer")).await.unwrap();
    assert!(resp
        .users
        .iter()
        .all(|u| matches!(u, User::Object(o) if o.object_type == "user")));
}

#[tokio::test]
async fn invariant_contextual_monotonicity() {
    let engine = engine(&[("doc", "1", "viewer", "user:alice")]);
    let before = engine.list_users(request("viewer")).await.unwrap();

    let mut req = request("viewer");
    req.contextual_tuples = vec![ContextualTuple::new(
        Object::new("doc", "1"),
        "viewer",
        UserRef::parse("user:dana").unwrap(),
    )];
    let after = engine.list_users(req).await.unwrap();

    let before_set = canonical_set(&before.users);
    let after_set = canonical_set(&after.users);
    assert!(before_set.is_subset(&after_set));
    assert!(after_set.contains("user:dana"));
}

#[tokio::test]
async fn invariant_entrypoint_consistency_with_full_expansion() {
    let engine = engine(&[("doc", "1", "viewer", "user:alice")]);
    let mut req = request("viewer");
    req.user_filters = vec![UserFilter::object("folder")];
    let resp = engine.list_users(req).await.unwrap();
    assert!(resp.users.is_empty());
}
