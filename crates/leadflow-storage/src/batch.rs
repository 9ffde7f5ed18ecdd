//! Batch write retry machinery
//!
//! The backing store may accept some items of a batch and defer others
//! under load. Only the unprocessed subset is retried, with increasing
//! backoff; whatever survives the retry budget is surfaced to the caller
//! as hard failures. Written items are never rolled back.

use std::collections::HashSet;
use std::future::Future;
use std::time::Duration;

use tracing::warn;
use uuid::Uuid;

/// Maximum items per write attempt.
pub const MAX_BATCH_CHUNK: usize = 25;

/// Additional attempts after the initial pass.
const RETRY_ATTEMPTS: u32 = 3;

const BASE_BACKOFF_MS: u64 = 100;

/// Result of a batch write: two disjoint sets, never a single boolean.
#[derive(Debug, Clone, Default)]
pub struct BatchOutcome {
    pub written: Vec<Uuid>,
    pub unprocessed: Vec<Uuid>,
}

impl BatchOutcome {
    pub fn all_written(&self) -> bool {
        self.unprocessed.is_empty()
    }
}

fn backoff(round: u32) -> Duration {
    Duration::from_millis(BASE_BACKOFF_MS * 2u64.pow(round.saturating_sub(1)))
}

/// Drive a chunked batch write through the retry budget.
///
/// `attempt` writes one chunk and returns the ids the store left
/// unprocessed (an erroring chunk counts as fully unprocessed). Items
/// written in any round are final and never re-attempted.
pub async fn write_with_retry<T, K, F, Fut>(items: Vec<T>, id_of: K, mut attempt: F) -> BatchOutcome
where
    T: Clone,
    K: Fn(&T) -> Uuid,
    F: FnMut(Vec<T>) -> Fut,
    Fut: Future<Output = leadflow_common::Result<Vec<Uuid>>>,
{
    let mut written = Vec::new();
    let mut pending = items;
    let mut round = 0u32;

    loop {
        if pending.is_empty() {
            break;
        }

        let mut unprocessed: HashSet<Uuid> = HashSet::new();
        for chunk in pending.chunks(MAX_BATCH_CHUNK) {
            match attempt(chunk.to_vec()).await {
                Ok(left_over) => unprocessed.extend(left_over),
                Err(e) => {
                    warn!(round, error = %e, "Batch write chunk failed");
                    unprocessed.extend(chunk.iter().map(&id_of));
                }
            }
        }

        written.extend(
            pending
                .iter()
                .map(&id_of)
                .filter(|id| !unprocessed.contains(id)),
        );
        pending.retain(|item| unprocessed.contains(&id_of(item)));

        if pending.is_empty() || round >= RETRY_ATTEMPTS {
            break;
        }

        round += 1;
        tokio::time::sleep(backoff(round)).await;
    }

    let unprocessed = pending.iter().map(&id_of).collect();
    BatchOutcome {
        written,
        unprocessed,
    }
}
