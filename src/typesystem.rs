//! The authorization model ("typesystem"), consumed as an opaque API (§6.3).
//!
//! In the full system this is owned by the model loader, out of scope here
//! (spec.md §1). This module carries just enough of it — namespace
//! definitions, rewrite trees, and the pruned type-graph — for the engine to
//! run standalone and for its own tests to exercise every rewrite variant.

use crate::error::{ListUsersError, Result};
use petgraph::graphmap::DiGraphMap;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// A rewrite expression: the sum type of §3/§4.4.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Rewrite {
    /// Direct assignments: tuples stored against this relation.
    This,
    /// Alias to another relation on the same object.
    ComputedUserset(String),
    /// Follow tuples on `tupleset_relation`, then resolve `computed_relation`
    /// on each reached object.
    TupleToUserset {
        tupleset_relation: String,
        computed_relation: String,
    },
    Union(Vec<Rewrite>),
    Intersection(Vec<Rewrite>),
    Difference {
        base: Box<Rewrite>,
        subtract: Box<Rewrite>,
    },
}

impl Rewrite {
    /// `Union(This, ComputedUserset(parent))` — the shape the teacher's
    /// single-parent `inherits_from` edge generalizes to (SPEC_FULL §3).
    pub fn inherits(parent: &str) -> Rewrite {
        Rewrite::Union(vec![Rewrite::This, Rewrite::ComputedUserset(parent.to_string())])
    }
}

/// A relation's definition: just its rewrite and the subject types `this`
/// may legally assign (used by the filtered iterator, §4.2, and the
/// entrypoint pre-check, §4.3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RelationDefinition {
    pub name: String,
    pub rewrite: Rewrite,
    /// Object types (and, for usersets, `type#relation` pairs) permitted as
    /// direct `this` subjects. Empty means "schema does not constrain".
    pub assignable_types: Vec<AssignableType>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum AssignableType {
    Object(String),
    Userset { object_type: String, relation: String },
    Wildcard(String),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NamespaceDefinition {
    pub name: String,
    pub relations: Vec<RelationDefinition>,
}

/// Opaque per-`(store, model)` authorization model.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TypeSystem {
    pub namespaces: HashMap<String, NamespaceDefinition>,
}

impl Default for TypeSystem {
    fn default() -> Self {
        Self::sample_schema()
    }
}

impl TypeSystem {
    pub fn new() -> Self {
        Self {
            namespaces: HashMap::new(),
        }
    }

    /// `getRelation(type, relation) -> Relation` (§6.3).
    pub fn get_relation(&self, object_type: &str, relation: &str) -> Result<&RelationDefinition> {
        self.namespaces
            .get(object_type)
            .and_then(|ns| ns.relations.iter().find(|r| r.name == relation))
            .ok_or_else(|| ListUsersError::ModelResolution {
                store_id: String::new(),
                model_id: String::new(),
                reason: format!("relation '{}' not found on type '{}'", relation, object_type),
            })
    }

    pub fn has_relation(&self, object_type: &str, relation: &str) -> bool {
        self.namespaces
            .get(object_type)
            .map(|ns| ns.relations.iter().any(|r| r.name == relation))
            .unwrap_or(false)
    }

    /// Schema-validity predicate for the filtered tuple iterator (§4.2):
    /// rejects tuples whose relation no longer exists, or whose subject type
    /// is not permitted for a `this` assignment under that relation.
    pub fn filter_invalid_tuples(
        &self,
        object_type: &str,
        relation: &str,
        user: &crate::models::UserRef,
    ) -> bool {
        let Ok(def) = self.get_relation(object_type, relation) else {
            return false;
        };
        if def.assignable_types.is_empty() {
            return true;
        }
        match user {
            crate::models::UserRef::Object(o) => def
                .assignable_types
                .iter()
                .any(|t| matches!(t, AssignableType::Object(ty) if ty == &o.object_type)),
            crate::models::UserRef::Userset { object, relation } => {
                def.assignable_types.iter().any(|t| {
                    matches!(t, AssignableType::Userset { object_type: ty, relation: r }
                        if ty == &object.object_type && r == relation)
                })
            }
            crate::models::UserRef::Wildcard { object_type: wt } => def
                .assignable_types
                .iter()
                .any(|t| matches!(t, AssignableType::Wildcard(ty) if ty == wt)),
        }
    }

    /// Builds the pruned type-graph used by the entrypoint pre-check (§4.3):
    /// an edge `(source_type, source_relation) -> (target_type,
    /// target_relation)` means a walk from the source can reach the target.
    pub fn pruned_relationship_edges(&self) -> TypeGraph {
        let mut graph = DiGraphMap::<(u32, u32), ()>::new();
        let mut index = NodeIndex::default();
        let mut seen = std::collections::HashSet::new();

        for (object_type, ns) in &self.namespaces {
            for rel in &ns.relations {
                let target = index.id(object_type, &rel.name);
                graph.add_node(target);
                self.add_rewrite_edges(
                    &mut graph,
                    &mut index,
                    &mut seen,
                    object_type,
                    &rel.rewrite,
                    target,
                );
            }
        }

        TypeGraph { graph, index }
    }

    /// Enters a rewrite node for `target`, applying the cycle guard once at
    /// this relation-identity boundary, then dispatches via
    /// `walk_rewrite_edges`. `seen` guards against infinite recursion through
    /// computed-userset self-loops (the §8 scenario 6 schema). Call this for
    /// a *new* target (the top-level per-relation loop, and
    /// `ComputedUserset`'s recursion into its aliased relation); never for a
    /// Union/Intersection/Difference child, which shares its parent's target.
    fn add_rewrite_edges(
        &self,
        graph: &mut DiGraphMap<(u32, u32), ()>,
        index: &mut NodeIndex,
        seen: &mut std::collections::HashSet<(u32, u32)>,
        object_type: &str,
        rewrite: &Rewrite,
        target: (u32, u32),
    ) {
        if !seen.insert(target) {
            return;
        }
        self.walk_rewrite_edges(graph, index, seen, object_type, rewrite, target);
    }

    /// Dispatches one rewrite node against `target` without re-running the
    /// cycle guard. Union/Intersection/Difference recurse into their
    /// children through here (not `add_rewrite_edges`) because those
    /// children target the *same* `(object_type, relation)` as their parent
    /// — the guard was already satisfied when `target` was first entered,
    /// and re-checking it here would make every child bail out immediately.
    fn walk_rewrite_edges(
        &self,
        graph: &mut DiGraphMap<(u32, u32), ()>,
        index: &mut NodeIndex,
        seen: &mut std::collections::HashSet<(u32, u32)>,
        object_type: &str,
        rewrite: &Rewrite,
        target: (u32, u32),
    ) {
        match rewrite {
            Rewrite::This => {
                let relation = index.relation_of(target);
                if let Ok(def) = self.get_relation(object_type, &relation) {
                    for assignable in &def.assignable_types {
                        let src = match assignable {
                            AssignableType::Object(ty) => index.id(ty, ""),
                            AssignableType::Wildcard(ty) => index.id(ty, ""),
                            AssignableType::Userset { object_type: ty, relation } => {
                                index.id(ty, relation)
                            }
                        };
                        graph.add_edge(src, target, ());
                    }
                }
            }
            Rewrite::ComputedUserset(r) => {
                let src = index.id(object_type, r);
                graph.add_node(src);
                if let Ok(def) = self.get_relation(object_type, r) {
                    let child_rewrite = def.rewrite.clone();
                    self.add_rewrite_edges(graph, index, seen, object_type, &child_rewrite, src);
                }
                graph.add_edge(src, target, ());
            }
            Rewrite::TupleToUserset {
                tupleset_relation,
                computed_relation,
            } => {
                if let Ok(tupleset_def) = self.get_relation(object_type, tupleset_relation) {
                    for assignable in &tupleset_def.assignable_types {
                        if let AssignableType::Object(ty) = assignable {
                            let src = index.id(ty, computed_relation);
                            graph.add_node(src);
                            graph.add_edge(src, target, ());
                        }
                    }
                }
            }
            Rewrite::Union(children) | Rewrite::Intersection(children) => {
                for child in children {
                    self.walk_rewrite_edges(graph, index, seen, object_type, child, target);
                }
            }
            Rewrite::Difference { base, .. } => {
                self.walk_rewrite_edges(graph, index, seen, object_type, base, target);
            }
        }
    }

    /// A schema exercising every rewrite variant plus the §8 scenario's
    /// direct/userset/wildcard/union/intersection/difference mix and the
    /// self-loop cycle case.
    pub fn sample_schema() -> Self {
        let mut namespaces = HashMap::new();

        namespaces.insert(
            "user".to_string(),
            NamespaceDefinition {
                name: "user".to_string(),
                relations: vec![],
            },
        );

        namespaces.insert(
            "doc".to_string(),
            NamespaceDefinition {
                name: "doc".to_string(),
                relations: vec![
                    RelationDefinition {
                        name: "viewer".to_string(),
                        rewrite: Rewrite::This,
                        assignable_types: vec![
                            AssignableType::Object("user".to_string()),
                            AssignableType::Wildcard("user".to_string()),
                        ],
                    },
                    RelationDefinition {
                        name: "editor".to_string(),
                        rewrite: Rewrite::This,
                        assignable_types: vec![AssignableType::Object("user".to_string())],
                    },
                    RelationDefinition {
                        name: "can_view".to_string(),
                        rewrite: Rewrite::Union(vec![
                            Rewrite::ComputedUserset("viewer".to_string()),
                            Rewrite::ComputedUserset("editor".to_string()),
                        ]),
                        assignable_types: vec![],
                    },
                    RelationDefinition {
                        name: "restricted".to_string(),
                        rewrite: Rewrite::Intersection(vec![
                            Rewrite::ComputedUserset("viewer".to_string()),
                            Rewrite::ComputedUserset("editor".to_string()),
                        ]),
                        assignable_types: vec![],
                    },
                    RelationDefinition {
                        name: "only_viewer".to_string(),
                        rewrite: Rewrite::Difference {
                            base: Box::new(Rewrite::ComputedUserset("viewer".to_string())),
                            subtract: Box::new(Rewrite::ComputedUserset("editor".to_string())),
                        },
                        assignable_types: vec![],
                    },
                    RelationDefinition {
                        name: "r".to_string(),
                        rewrite: Rewrite::ComputedUserset("r".to_string()),
                        assignable_types: vec![],
                    },
                    RelationDefinition {
                        name: "parent".to_string(),
                        rewrite: Rewrite::This,
                        assignable_types: vec![AssignableType::Object("folder".to_string())],
                    },
                    RelationDefinition {
                        name: "inherited_viewer".to_string(),
                        rewrite: Rewrite::TupleToUserset {
                            tupleset_relation: "parent".to_string(),
                            computed_relation: "viewer".to_string(),
                        },
                        assignable_types: vec![],
                    },
                ],
            },
        );

        namespaces.insert(
            "folder".to_string(),
            NamespaceDefinition {
                name: "folder".to_string(),
                relations: vec![RelationDefinition {
                    name: "viewer".to_string(),
                    rewrite: Rewrite::This,
                    assignable_types: vec![AssignableType::Object("user".to_string())],
                }],
            },
        );

        Self { namespaces }
    }
}

/// Stable numeric index for `(object_type, relation)` pairs so the graph can
/// be keyed on `Copy` node weights.
#[derive(Debug, Default)]
pub struct NodeIndex {
    forward: HashMap<(String, String), (u32, u32)>,
    backward: HashMap<(u32, u32), (String, String)>,
    next: u32,
}

impl NodeIndex {
    fn id(&mut self, object_type: &str, relation: &str) -> (u32, u32) {
        let key = (object_type.to_string(), relation.to_string());
        if let Some(existing) = self.forward.get(&key) {
            return *existing;
        }
        let n = self.next;
        self.next += 1;
        let id = (n, 0);
        self.forward.insert(key.clone(), id);
        self.backward.insert(id, key);
        id
    }

    fn relation_of(&self, id: (u32, u32)) -> String {
        self.backward
            .get(&id)
            .map(|(_, relation)| relation.clone())
            .unwrap_or_default()
    }
}

/// The pruned type-graph: answers §4.3's coarse reachability query.
pub struct TypeGraph {
    graph: DiGraphMap<(u32, u32), ()>,
    index: NodeIndex,
}

impl TypeGraph {
    /// `getPrunedRelationshipEdges(target, source) -> edges`, collapsed to a
    /// boolean reachability test as §4.3 requires.
    pub fn has_path(&mut self, target: (&str, &str), source: (&str, &str)) -> bool {
        let target_id = self.index.id(target.0, target.1);
        let source_id = self.index.id(source.0, source.1);
        if !self.graph.contains_node(target_id) || !self.graph.contains_node(source_id) {
            return false;
        }
        petgraph::algo::has_path_connecting(&self.graph, source_id, target_id, None)
    }
}
