use serde::{Deserialize, Serialize};
use std::fmt;

/// An object: `type:id`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Object {
    pub object_type: String,
    pub id: String,
}

impl Object {
    pub fn new(object_type: &str, id: &str) -> Self {
        Self {
            object_type: object_type.to_string(),
            id: id.to_string(),
        }
    }
}

impl fmt::Display for Object {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.object_type, self.id)
    }
}

/// The `user` field of a stored tuple: a bare object, a userset, or a typed
/// public wildcard. See spec §3/§6.4 for the string grammar.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum UserRef {
    Object(Object),
    Userset { object: Object, relation: String },
    Wildcard { object_type: String },
}

impl UserRef {
    pub fn object_type(&self) -> &str {
        match self {
            UserRef::Object(o) => &o.object_type,
            UserRef::Userset { object, .. } => &object.object_type,
            UserRef::Wildcard { object_type } => object_type,
        }
    }

    /// Canonical string form used as the dedup/map key everywhere (§6.4).
    pub fn canonical(&self) -> String {
        match self {
            UserRef::Object(o) => format!("{}:{}", o.object_type, o.id),
            UserRef::Userset { object, relation } => {
                format!("{}:{}#{}", object.object_type, object.id, relation)
            }
            UserRef::Wildcard { object_type } => format!("{}:*", object_type),
        }
    }

    pub fn wildcard_key(object_type: &str) -> String {
        format!("{}:*", object_type)
    }

    /// Parses the `type:id`, `type:id#relation`, `type:*` grammar of §6.4.
    pub fn parse(s: &str) -> Option<Self> {
        let (object_type, rest) = s.split_once(':')?;
        if rest == "*" {
            return Some(UserRef::Wildcard {
                object_type: object_type.to_string(),
            });
        }
        if let Some((id, relation)) = rest.split_once('#') {
            return Some(UserRef::Userset {
                object: Object::new(object_type, id),
                relation: relation.to_string(),
            });
        }
        Some(UserRef::Object(Object::new(object_type, rest)))
    }
}

impl fmt::Display for UserRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.canonical())
    }
}

/// A stored relationship tuple: `(object, relation, user)`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TupleRecord {
    pub object: Object,
    pub relation: String,
    pub user: UserRef,
}

impl TupleRecord {
    pub fn new(object: Object, relation: &str, user: UserRef) -> Self {
        Self {
            object,
            relation: relation.to_string(),
            user,
        }
    }
}

impl fmt::Display for TupleRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}@{}", self.object, self.relation, self.user)
    }
}

/// Selects which subjects the caller wants back. `(type, None)` matches
/// concrete objects of `type`; `(type, Some(r))` matches usersets shaped
/// `type:_#r`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserFilter {
    pub object_type: String,
    pub relation: Option<String>,
}

impl UserFilter {
    pub fn object(object_type: &str) -> Self {
        Self {
            object_type: object_type.to_string(),
            relation: None,
        }
    }

    pub fn userset(object_type: &str, relation: &str) -> Self {
        Self {
            object_type: object_type.to_string(),
            relation: Some(relation.to_string()),
        }
    }
}

/// A request-scoped tuple that augments the store for the lifetime of one
/// evaluation. Never persisted (§4.1).
pub type ContextualTuple = TupleRecord;

/// The final result a `ListUsers` evaluation emits for a matched subject.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum User {
    Object(Object),
    Userset { object: Object, relation: String },
    Wildcard { object_type: String },
}

impl From<UserRef> for User {
    fn from(u: UserRef) -> Self {
        match u {
            UserRef::Object(o) => User::Object(o),
            UserRef::Userset { object, relation } => User::Userset { object, relation },
            UserRef::Wildcard { object_type } => User::Wildcard { object_type },
        }
    }
}

/// A `ListUsers` request (§6.1).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListUsersRequest {
    pub store_id: String,
    pub authorization_model_id: String,
    pub object: Object,
    pub relation: String,
    pub user_filters: Vec<UserFilter>,
    #[serde(default)]
    pub contextual_tuples: Vec<ContextualTuple>,
}

/// A `ListUsers` response (§6.1). The list is deduplicated; order is
/// unspecified.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListUsersResponse {
    pub users: Vec<User>,
}
