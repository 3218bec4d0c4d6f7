//! Crash recovery for in-flight sends.
//!
//! A direct send is preceded by a `sending` marker. If the process dies
//! between the send call and the commit of its result, the marker stays
//! behind. At the start of the next run those stale markers are resolved to
//! `failed` so the comment is audited and never sent twice.

use log::{info, warn};

use crate::domain::ResponseStatus;
use crate::error::Result;
use crate::storage::Store;

/// Detail written on responses whose delivery cannot be confirmed
pub const UNKNOWN_OUTCOME_DETAIL: &str = "delivery outcome unknown: send was interrupted before its result was recorded";

/// Statistics about a recovery sweep.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecoveryStats {
    /// Markers resolved to failed
    pub resolved: usize,
    /// Markers too recent to be considered stale
    pub in_flight: usize,
    /// Markers whose update was lost to a concurrent writer
    pub lost_race: usize,
}

/// Resolve `sending` responses for `integration_id` last touched before `stale_before` (ms).
pub fn resolve_stale_sends(store: &dyn Store, integration_id: &str, stale_before: i64) -> Result<RecoveryStats> {
    let mut stats = RecoveryStats::default();

    for mut response in store.list_responses(integration_id, ResponseStatus::Sending)? {
        if response.updated_at >= stale_before {
            stats.in_flight += 1;
            continue;
        }

        response.mark_failed(UNKNOWN_OUTCOME_DETAIL)?;
        if store.update_response_if(&response, ResponseStatus::Sending)? {
            warn!(
                "Resolved stale send {} (comment {}) as failed, outcome unknown",
                response.id, response.comment_id
            );
            stats.resolved += 1;
        } else {
            stats.lost_race += 1;
        }
    }

    if stats.resolved > 0 {
        info!(
            "Recovery sweep for {}: {} resolved, {} in flight",
            integration_id, stats.resolved, stats.in_flight
        );
    }

    Ok(stats)
}
