//! Rewrite Expander (§4.4–§4.6, §4.9): recursive dispatch over rewrite-node
//! kinds, cycle detection, and the direct/TTU leaves. Intersection and
//! difference are implemented in `combinators.rs`; this module ties
//! everything together and owns the per-request `ExpandContext`.

use crate::concurrency::FanoutPool;
use crate::error::{ListUsersError, Result};
use crate::models::UserRef;
use crate::reader::{read_filtered, ContextualTupleReader, TupleReader};
use crate::request::InternalRequest;
use crate::typesystem::{Rewrite, TypeSystem};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use tokio::sync::mpsc;

pub(crate) type BoxFuture<T> = Pin<Box<dyn Future<Output = T> + Send>>;

/// Everything an expansion node needs but that is shared, unmutated, across
/// the whole request: the store, the model, and the fan-out pool.
pub struct ExpandContext {
    pub reader: Arc<dyn TupleReader>,
    pub type_system: Arc<TypeSystem>,
    pub fanout: FanoutPool,
}

/// Races the channel send against `cancel` so a producer blocked on a full
/// sink is abandoned promptly once a sibling has already failed, rather than
/// waiting for capacity that may never come (§5).
async fn send(
    sink: &mpsc::Sender<UserRef>,
    user: UserRef,
    cancel: &tokio_util::sync::CancellationToken,
) -> Result<()> {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Ok(()),
        result = sink.send(user) => {
            result.map_err(|e| ListUsersError::Internal(anyhow::anyhow!("sink closed: {e}")))
        }
    }
}

/// Step 2 of §4.4: emits the current object as a match for every filter it
/// satisfies. Runs once per distinct `(object, relation)` entered, not once
/// per rewrite-tree node — callers that re-dispatch over the same
/// `(object, relation)` (union/intersection/difference children) must not
/// call this again.
async fn emit_filter_matches(
    req: &InternalRequest,
    sink: &mpsc::Sender<UserRef>,
    cancel: &tokio_util::sync::CancellationToken,
) -> Result<()> {
    for filter in req.user_filters.iter() {
        if filter.object_type != req.object.object_type {
            continue;
        }
        // Once the walk has crossed into an intersection or difference, a
        // plain-type match is still sound (witnessed by reaching the object
        // at all via the root) but a userset match is not (§4.4 step 2).
        if req.passed_through_intersection_or_exclusion && filter.relation.is_some() {
            continue;
        }
        match &filter.relation {
            None => send(sink, UserRef::Object(req.object.clone()), cancel).await?,
            Some(r) if r == &req.relation => {
                send(
                    sink,
                    UserRef::Userset {
                        object: req.object.clone(),
                        relation: req.relation.clone(),
                    },
                    cancel,
                )
                .await?
            }
            Some(_) => {}
        }
    }
    Ok(())
}

/// Entry point for a *new* `(object, relation)` pair: cycle guard, filter
/// match, then dispatch on that relation's rewrite (§4.4 steps 1–3).
pub fn expand(
    ctx: Arc<ExpandContext>,
    mut req: InternalRequest,
    sink: mpsc::Sender<UserRef>,
) -> BoxFuture<Result<()>> {
    Box::pin(async move {
        if ctx.fanout.is_cancelled() {
            return Ok(());
        }

        if req.visited.enter(&req.object, &req.relation) {
            return Ok(()); // cycle: no emissions, not an error (§4.9)
        }

        emit_filter_matches(&req, &sink, &ctx.fanout.cancel_token()).await?;

        let rewrite = ctx
            .type_system
            .get_relation(&req.object.object_type, &req.relation)?
            .rewrite
            .clone();

        expand_node(ctx, req, rewrite, sink).await
    })
}

/// Dispatches a specific rewrite node for the request's *current*
/// `(object, relation)`. Union/intersection/difference children share that
/// pair with their parent, so they call back into here (not `expand`) and
/// never re-run the cycle guard or filter match.
pub fn expand_node(
    ctx: Arc<ExpandContext>,
    req: InternalRequest,
    rewrite: Rewrite,
    sink: mpsc::Sender<UserRef>,
) -> BoxFuture<Result<()>> {
    Box::pin(async move {
        match rewrite {
            Rewrite::This => expand_direct(ctx, req, sink).await,
            Rewrite::ComputedUserset(r) => {
                let next = req.branch(req.object.clone(), &r, req.passed_through_intersection_or_exclusion);
                expand(ctx, next, sink).await
            }
            Rewrite::TupleToUserset {
                tupleset_relation,
                computed_relation,
            } => expand_ttu(ctx, req, &tupleset_relation, &computed_relation, sink).await,
            Rewrite::Union(children) => {
                let mut tasks: Vec<BoxFuture<Result<()>>> = Vec::with_capacity(children.len());
                for child in children {
                    let sibling = req.branch(
                        req.object.clone(),
                        &req.relation,
                        req.passed_through_intersection_or_exclusion,
                    );
                    tasks.push(expand_node(ctx.clone(), sibling, child, sink.clone()));
                }
                ctx.fanout.run(tasks).await.map(|_| ())
            }
            Rewrite::Intersection(children) => {
                crate::combinators::expand_intersection(ctx, req, children, sink).await
            }
            Rewrite::Difference { base, subtract } => {
                crate::combinators::expand_exclusion(ctx, req, *base, *subtract, sink).await
            }
        }
    })
}

/// `this`: reads direct tuples and, per §4.5, either emits a matching direct
/// subject (including the wildcard case) or spawns a sub-expansion for each
/// userset tuple.
fn expand_direct(
    ctx: Arc<ExpandContext>,
    req: InternalRequest,
    sink: mpsc::Sender<UserRef>,
) -> BoxFuture<Result<()>> {
    Box::pin(async move {
        let cancel = ctx.fanout.cancel_token();
        let contextual_tuples = req.contextual_tuples.clone();
        let contextual = ContextualTupleReader::new(ctx.reader.clone(), &contextual_tuples);
        let tuples = read_filtered(
            &req.store_id,
            &req.object,
            &req.relation,
            &contextual,
            &ctx.type_system,
            &cancel,
        )
        .await?;

        let mut tasks: Vec<BoxFuture<Result<()>>> = Vec::new();
        for tuple in tuples {
            match tuple.user {
                UserRef::Object(_) | UserRef::Wildcard { .. } => {
                    let user_type = tuple.user.object_type().to_string();
                    if req.user_filters.iter().any(|f| f.object_type == user_type) {
                        send(&sink, tuple.user, &cancel).await?;
                    }
                }
                UserRef::Userset { object, relation } => {
                    let next = req.branch(
                        object,
                        &relation,
                        req.passed_through_intersection_or_exclusion,
                    );
                    tasks.push(expand(ctx.clone(), next, sink.clone()));
                }
            }
        }

        if !tasks.is_empty() {
            ctx.fanout.run(tasks).await?;
        }
        Ok(())
    })
}

/// Tuple-to-userset (§4.6): follow tuples on `tupleset_relation`, then
/// resolve `computed_relation` on each reached object.
fn expand_ttu(
    ctx: Arc<ExpandContext>,
    req: InternalRequest,
    tupleset_relation: &str,
    computed_relation: &str,
    sink: mpsc::Sender<UserRef>,
) -> BoxFuture<Result<()>> {
    let tupleset_relation = tupleset_relation.to_string();
    let computed_relation = computed_relation.to_string();
    Box::pin(async move {
        let cancel = ctx.fanout.cancel_token();
        let contextual_tuples = req.contextual_tuples.clone();
        let contextual = ContextualTupleReader::new(ctx.reader.clone(), &contextual_tuples);
        let tuples = read_filtered(
            &req.store_id,
            &req.object,
            &tupleset_relation,
            &contextual,
            &ctx.type_system,
            &cancel,
        )
        .await?;

        let mut tasks: Vec<BoxFuture<Result<()>>> = Vec::new();
        for tuple in tuples {
            // Tupleset relations are schema-constrained to be object-typed;
            // a userset is treated as a bare object (implementation-defined
            // per SPEC_FULL §4.6 / spec §9 open questions).
            let target = match tuple.user {
                UserRef::Object(o) => o,
                UserRef::Userset { object, .. } => object,
                UserRef::Wildcard { .. } => continue,
            };
            let next = req.branch(
                target,
                &computed_relation,
                req.passed_through_intersection_or_exclusion,
            );
            tasks.push(expand(ctx.clone(), next, sink.clone()));
        }

        if !tasks.is_empty() {
            ctx.fanout.run(tasks).await?;
        }
        Ok(())
    })
}

pub(crate) async fn send_user(
    sink: &mpsc::Sender<UserRef>,
    user: UserRef,
    cancel: &tokio_util::sync::CancellationToken,
) -> Result<()> {
    send(sink, user, cancel).await
}
