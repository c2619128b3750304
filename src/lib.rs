//! A `ListUsers` evaluation engine for a relationship-based authorization
//! system in the Zanzibar family: given an object, a relation, and one or
//! more subject-type filters, recursively expands the relation's rewrite
//! tree and returns every matching subject, deduplicated.
//!
//! ```no_run
//! use std::sync::Arc;
//! use rebac_listusers::{ListUsersQuery, ListUsersRequest, UserFilter, Object};
//! use rebac_listusers::reader::InMemoryTupleReader;
//! use rebac_listusers::typesystem::TypeSystem;
//!
//! # async fn run() -> rebac_listusers::Result<()> {
//! let reader = Arc::new(InMemoryTupleReader::new());
//! let engine = ListUsersQuery::new(reader, Arc::new(TypeSystem::sample_schema()));
//!
//! let response = engine
//!     .list_users(ListUsersRequest {
//!         store_id: "store-1".to_string(),
//!         authorization_model_id: "model-1".to_string(),
//!         object: Object::new("doc", "1"),
//!         relation: "viewer".to_string(),
//!         user_filters: vec![UserFilter::object("user")],
//!         contextual_tuples: vec![],
//!     })
//!     .await?;
//!
//! println!("{} users can view doc:1", response.users.len());
//! # Ok(())
//! # }
//! ```

pub mod aggregator;
pub mod combinators;
pub mod concurrency;
pub mod config;
pub mod entrypoint;
pub mod error;
pub mod expand;
pub mod models;
pub mod reader;
pub mod request;
pub mod typesystem;

mod engine;

pub use config::Config;
pub use engine::ListUsersQuery;
pub use error::{ListUsersError, Result};
pub use models::{
    ContextualTuple, ListUsersRequest, ListUsersResponse, Object, TupleRecord, User, UserFilter,
    UserRef,
};
