//! Set-algebra combinators (§4.7, §4.8): intersection and difference over
//! the deduplicated per-operand subject sets, both wildcard-aware.

use crate::error::{ListUsersError, Result};
use crate::expand::{expand_node, send_user, BoxFuture};
use crate::models::UserRef;
use crate::request::InternalRequest;
use crate::typesystem::Rewrite;
use ahash::AHashSet;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::mpsc;

/// Runs one operand's rewrite to completion in a private channel and
/// returns its deduplicated subject set. The operand sees
/// `passed_through_intersection_or_exclusion = true` already baked into
/// `req` by the caller.
fn collect_operand(
    ctx: Arc<crate::expand::ExpandContext>,
    req: InternalRequest,
    rewrite: Rewrite,
) -> BoxFuture<Result<Vec<UserRef>>> {
    Box::pin(async move {
        let (tx, mut rx) = mpsc::channel(32);
        let drain = tokio::spawn(async move {
            let mut seen = AHashSet::new();
            let mut out = Vec::new();
            while let Some(u) = rx.recv().await {
                if seen.insert(u.canonical()) {
                    out.push(u);
                }
            }
            out
        });

        expand_node(ctx, req, rewrite, tx).await?;

        drain.await.map_err(|e| {
            ListUsersError::Internal(anyhow::anyhow!("operand drain task panicked: {e}"))
        })
    })
}

/// §4.7: a subject of type `u` is in the intersection iff the number of
/// operands that produced it, plus the number of operands that produced the
/// wildcard for `u`'s type, is at least the operand count — except for the
/// wildcard subject itself, which follows the ordinary rule (every operand
/// must have produced it directly).
pub fn expand_intersection(
    ctx: Arc<crate::expand::ExpandContext>,
    req: InternalRequest,
    children: Vec<Rewrite>,
    sink: mpsc::Sender<UserRef>,
) -> BoxFuture<Result<()>> {
    Box::pin(async move {
        let n = children.len();
        let wildcard_key = UserRef::wildcard_key(&req.primary_filter().object_type);

        let mut tasks: Vec<BoxFuture<Result<Vec<UserRef>>>> = Vec::with_capacity(n);
        for child in children {
            let operand_req = req.branch(req.object.clone(), &req.relation, true);
            tasks.push(collect_operand(ctx.clone(), operand_req, child));
        }
        let operand_results = ctx.fanout.run(tasks).await?;

        let mut counts: HashMap<String, (UserRef, usize)> = HashMap::new();
        let mut wildcard_operands = 0usize;

        for operand in &operand_results {
            let mut operand_has_wildcard = false;
            for u in operand {
                let key = u.canonical();
                if key == wildcard_key {
                    operand_has_wildcard = true;
                }
                counts.entry(key).or_insert_with(|| (u.clone(), 0)).1 += 1;
            }
            if operand_has_wildcard {
                wildcard_operands += 1;
            }
        }

        let cancel = ctx.fanout.cancel_token();
        for (key, (user, count)) in counts {
            let satisfied = if key == wildcard_key {
                count >= n
            } else {
                count + wildcard_operands >= n
            };
            if satisfied {
                send_user(&sink, user, &cancel).await?;
            }
        }
        Ok(())
    })
}

/// §4.8: `base - subtract`. Both sides run concurrently and both are fully
/// drained even if one errors, so neither producer can deadlock on the
/// other's channel. A wildcard on the subtract side excludes the entire
/// type from the result.
pub fn expand_exclusion(
    ctx: Arc<crate::expand::ExpandContext>,
    req: InternalRequest,
    base: Rewrite,
    subtract: Rewrite,
    sink: mpsc::Sender<UserRef>,
) -> BoxFuture<Result<()>> {
    Box::pin(async move {
        let wildcard_key = UserRef::wildcard_key(&req.primary_filter().object_type);

        let base_req = req.branch(req.object.clone(), &req.relation, true);
        let subtract_req = req.branch(req.object.clone(), &req.relation, true);

        let base_fut = collect_operand(ctx.clone(), base_req, base);
        let subtract_fut = collect_operand(ctx.clone(), subtract_req, subtract);

        let (base_result, subtract_result) = tokio::join!(base_fut, subtract_fut);

        match (base_result, subtract_result) {
            (Ok(base_users), Ok(subtract_users)) => {
                let subtract_keys: AHashSet<String> =
                    subtract_users.iter().map(|u| u.canonical()).collect();
                if subtract_keys.contains(&wildcard_key) {
                    return Ok(());
                }
                let cancel = ctx.fanout.cancel_token();
                for u in base_users {
                    if !subtract_keys.contains(&u.canonical()) {
                        send_user(&sink, u, &cancel).await?;
                    }
                }
                Ok(())
            }
            (Err(e1), Err(e2)) => Err(ListUsersError::AggregateChildErrors {
                base: e1.to_string(),
                subtract: e2.to_string(),
            }),
            (Err(e), Ok(_)) => Err(e),
            (Ok(_), Err(e)) => Err(e),
        }
    })
}
