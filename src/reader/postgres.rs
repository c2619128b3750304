//! PostgreSQL-backed tuple reader.
//!
//! Read-only mirror of `auth-zanzibar::repository::postgres`'s query-building
//! style, narrowed to the single `read` operation this engine needs — writes,
//! schema migration, and multi-tenant `organization_id` scoping belong to the
//! store owner (spec.md §1, out of scope).

use crate::error::{ListUsersError, Result};
use crate::models::{Object, TupleRecord, UserRef};
use crate::reader::TupleReader;
use async_trait::async_trait;
use sqlx::{PgPool, Row};
use tracing::debug;

pub struct PostgresTupleReader {
    pool: PgPool,
}

impl PostgresTupleReader {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn from_connection_string(connection_string: &str) -> Result<Self> {
        let pool = PgPool::connect(connection_string)
            .await
            .map_err(|e| ListUsersError::TupleReadFailure(format!("failed to connect: {}", e)))?;
        Ok(Self::new(pool))
    }
}

#[async_trait]
impl TupleReader for PostgresTupleReader {
    async fn read(&self, store_id: &str, object: &Object, relation: &str) -> Result<Vec<TupleRecord>> {
        debug!(
            "reading tuples: store={} object={} relation={}",
            store_id, object, relation
        );

        let rows = sqlx::query(
            r#"
            SELECT user_object_type, user_id, user_relation, user_wildcard
            FROM relationship_tuples
            WHERE store_id = $1 AND object_type = $2 AND object_id = $3 AND relation = $4
            "#,
        )
        .bind(store_id)
        .bind(&object.object_type)
        .bind(&object.id)
        .bind(relation)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| ListUsersError::TupleReadFailure(format!("failed to read tuples: {}", e)))?;

        let tuples = rows
            .iter()
            .map(|row| {
                let user_object_type: String = row.get("user_object_type");
                let user_wildcard: bool = row.get("user_wildcard");
                let user_id: Option<String> = row.get("user_id");
                let user_relation: Option<String> = row.get("user_relation");

                let user = if user_wildcard {
                    UserRef::Wildcard {
                        object_type: user_object_type,
                    }
                } else if let Some(relation) = user_relation {
                    UserRef::Userset {
                        object: Object::new(&user_object_type, &user_id.unwrap_or_default()),
                        relation,
                    }
                } else {
                    UserRef::Object(Object::new(&user_object_type, &user_id.unwrap_or_default()))
                };

                TupleRecord::new(object.clone(), relation, user)
            })
            .collect();

        Ok(tuples)
    }
}
