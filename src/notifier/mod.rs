//! New-proposal detection and announcement.
//!
//! Diffs the fetched proposals against the notified set, sends one message
//! per unseen proposal in fetch order, and persists the set once at the end
//! of the batch.

pub mod telegram;

use crate::proposals::Proposal;
use crate::store::{NotifiedSet, StateStore};
use async_trait::async_trait;
use std::collections::HashSet;
use std::fmt::Write;
use thiserror::Error;
use tracing::{error, info, warn};

pub use telegram::TelegramClient;

/// Summaries beyond this many chars are cut so the rendered message stays
/// under Telegram's 4096-char limit.
const MAX_SUMMARY_CHARS: usize = 3000;

const NO_DESCRIPTION: &str = "No description available";
const NO_URL: &str = "No URL available";
const NOT_AVAILABLE: &str = "N/A";

#[derive(Error, Debug)]
pub enum NotifyError {
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("chat API error {status}: {body}")]
    Api { status: u16, body: String },
}

/// Destination for rendered announcements.
#[async_trait]
pub trait MessageSink: Send + Sync {
    async fn send(&self, text: &str) -> Result<(), NotifyError>;
}

/// Sink that only logs the rendered message. Used for dry runs.
pub struct LogSink;

#[async_trait]
impl MessageSink for LogSink {
    async fn send(&self, text: &str) -> Result<(), NotifyError> {
        info!(message = %text, "dry run, message not sent");
        Ok(())
    }
}

#[derive(Debug, Clone, Copy)]
pub struct NotifyOptions {
    /// Add a proposal to the notified set even if its send failed.
    pub mark_failed_as_notified: bool,
    /// Write the notified set back to the store after the batch.
    pub persist: bool,
}

impl Default for NotifyOptions {
    fn default() -> Self {
        Self {
            mark_failed_as_notified: true,
            persist: true,
        }
    }
}

/// What a single diff-and-notify pass did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NotifyReport {
    pub fetched: usize,
    pub new: usize,
    pub sent: usize,
    pub failed: usize,
    pub persisted: bool,
}

/// Render the announcement for one proposal (Telegram Markdown).
pub fn format_message(proposal: &Proposal) -> String {
    let description = proposal
        .summary()
        .map(|s| truncate_summary(&s, MAX_SUMMARY_CHARS))
        .unwrap_or_else(|| NO_DESCRIPTION.to_string());
    let meta_url = proposal.meta_url().unwrap_or_else(|| NO_URL.to_string());

    let mut msg = String::new();
    // Writing into a String cannot fail.
    let _ = writeln!(msg, "*New Governance Proposal Detected!*");
    let _ = writeln!(msg, "*Proposal ID:* `{}`", proposal.proposal_id);
    let _ = writeln!(msg, "*Type:* {}", proposal.proposal_type);
    let _ = writeln!(msg, "*Description:* {}", description);
    let _ = writeln!(msg, "*Proposed Epoch:* {}", or_na(proposal.proposed_epoch()));
    let _ = writeln!(msg, "*Expiration:* {}", or_na(proposal.expiration()));
    let _ = writeln!(msg, "*Meta URL:* [{}]({})", meta_url, meta_url);
    msg
}

fn or_na(value: Option<String>) -> String {
    value.unwrap_or_else(|| NOT_AVAILABLE.to_string())
}

fn truncate_summary(s: &str, max: usize) -> String {
    match s.char_indices().nth(max) {
        Some((idx, _)) => format!("{}…", &s[..idx]),
        None => s.to_string(),
    }
}

/// Proposals not yet in `notified`, in fetch order, each ID at most once.
pub fn new_proposals<'a>(fetched: &'a [Proposal], notified: &NotifiedSet) -> Vec<&'a Proposal> {
    let mut seen = HashSet::new();
    fetched
        .iter()
        .filter(|p| !notified.contains(&p.proposal_id))
        .filter(|p| seen.insert(p.proposal_id.as_str()))
        .collect()
}

/// Announce every unseen proposal and record it in `notified`.
///
/// Send failures are logged and do not stop the batch. If anything new was
/// found, the set is saved once after the loop; a save failure is logged and
/// reported through `NotifyReport::persisted`.
pub async fn diff_and_notify<S: MessageSink + ?Sized>(
    fetched: &[Proposal],
    notified: &mut NotifiedSet,
    sink: &S,
    store: &StateStore,
    opts: NotifyOptions,
) -> NotifyReport {
    let fresh = new_proposals(fetched, notified);
    let mut report = NotifyReport {
        fetched: fetched.len(),
        new: fresh.len(),
        ..NotifyReport::default()
    };

    if fresh.is_empty() {
        info!("no new proposals found, no message will be sent");
        return report;
    }

    for proposal in fresh {
        let message = format_message(proposal);
        match sink.send(&message).await {
            Ok(()) => {
                report.sent += 1;
                notified.insert(proposal.proposal_id.clone());
                info!(proposal = %proposal, "new proposal detected and notified");
            }
            Err(e) => {
                report.failed += 1;
                error!(proposal = %proposal, error = %e, "error sending message");
                if opts.mark_failed_as_notified {
                    notified.insert(proposal.proposal_id.clone());
                } else {
                    warn!(proposal = %proposal, "leaving proposal unmarked for retry on next run");
                }
            }
        }
    }

    if opts.persist {
        match store.save(notified).await {
            Ok(()) => report.persisted = true,
            Err(e) => error!(error = %e, "failed to save notified proposals"),
        }
    }

    report
}
