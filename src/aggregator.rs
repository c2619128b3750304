//! Result Aggregator (§4.10): drains every emission from the root sink into
//! a deduplicated set, keyed on the same canonical string form used
//! throughout (§6.4). The accumulated set is discarded, not returned, if the
//! expansion errors.

use crate::models::User;
use crate::models::UserRef;
use ahash::AHashSet;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// Spawns the collector task and returns the sender the expander writes
/// into. The caller drops its own clone of the sender once expansion
/// finishes so the collector's receive loop terminates.
pub fn spawn_collector(capacity: usize) -> (mpsc::Sender<UserRef>, JoinHandle<Vec<User>>) {
    let (tx, mut rx) = mpsc::channel(capacity);
    let handle = tokio::spawn(async move {
        let mut seen = AHashSet::new();
        let mut out = Vec::new();
        while let Some(user) = rx.recv().await {
            if seen.insert(user.canonical()) {
                out.push(User::from(user));
            }
        }
        out
    });
    (tx, handle)
}
