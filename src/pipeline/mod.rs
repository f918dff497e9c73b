//! One fetch run: load state, fetch proposals, announce and persist the delta.

use crate::notifier::{self, MessageSink, NotifyOptions, NotifyReport};
use crate::proposals::ProposalFetcher;
use crate::store::StateStore;
use std::fmt;
use tracing::{error, warn};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    /// The fetch failed; nothing was sent and the state file was not touched.
    FetchFailed,
    Completed(NotifyReport),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunReport {
    pub previously_notified: usize,
    pub outcome: RunOutcome,
}

impl fmt::Display for RunReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.outcome {
            RunOutcome::FetchFailed => write!(
                f,
                "fetch failed, {} known proposals unchanged",
                self.previously_notified
            ),
            RunOutcome::Completed(r) => write!(
                f,
                "fetched={} new={} sent={} failed={} persisted={}",
                r.fetched, r.new, r.sent, r.failed, r.persisted
            ),
        }
    }
}

/// Run the full pipeline once. Never fails: every runtime error is logged
/// and folded into the report.
pub async fn run_once<S: MessageSink + ?Sized>(
    store: &StateStore,
    fetcher: &ProposalFetcher,
    sink: &S,
    opts: NotifyOptions,
) -> RunReport {
    let mut notified = store.load().await;
    let previously_notified = notified.len();

    let proposals = match fetcher.fetch().await {
        Ok(p) => p,
        Err(e) => {
            error!(url = %fetcher.url(), error = %e, "error fetching proposals");
            warn!("failed to fetch proposals, retrying in the next run");
            return RunReport {
                previously_notified,
                outcome: RunOutcome::FetchFailed,
            };
        }
    };

    let report = notifier::diff_and_notify(&proposals, &mut notified, sink, store, opts).await;
    RunReport {
        previously_notified,
        outcome: RunOutcome::Completed(report),
    }
}
