//! Koios governance proposal fetcher.
//!
//! Fetches the proposal list from https://api.koios.rest/api/v1/proposal_list
//! in a single request. Any failure (transport, HTTP status, body that is not
//! a JSON array) is reported as a `FetchError`, which callers must treat as
//! "nothing known this run", never as "no proposals exist".

use serde::Deserialize;
use std::fmt;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, warn};

/// Longest slice of an unexpected response body worth logging.
const MAX_LOGGED_BODY: usize = 512;

#[derive(Error, Debug)]
pub enum FetchError {
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("API returned status {status}: {body}")]
    Status { status: u16, body: String },
    #[error("response is not valid JSON: {0}")]
    Decode(#[from] serde_json::Error),
    #[error("response is not a list of proposals")]
    NotAList,
}

/// A governance proposal as listed by Koios.
///
/// Only `proposal_id` and `proposal_type` are required; records missing
/// either are dropped at fetch time. The optional fields are kept as raw
/// JSON so an unexpected type never costs the announcement.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Proposal {
    pub proposal_id: String,
    pub proposal_type: String,
    #[serde(default)]
    pub proposal_description: Option<serde_json::Value>,
    #[serde(default)]
    pub proposed_epoch: Option<serde_json::Value>,
    #[serde(default)]
    pub expiration: Option<serde_json::Value>,
    #[serde(default)]
    pub meta_url: Option<serde_json::Value>,
}

impl Proposal {
    /// `proposal_description.summary`, when present and not null.
    pub fn summary(&self) -> Option<String> {
        display_value(self.proposal_description.as_ref()?.get("summary"))
    }

    pub fn proposed_epoch(&self) -> Option<String> {
        display_value(self.proposed_epoch.as_ref())
    }

    pub fn expiration(&self) -> Option<String> {
        display_value(self.expiration.as_ref())
    }

    pub fn meta_url(&self) -> Option<String> {
        display_value(self.meta_url.as_ref())
    }
}

/// Strings render bare, other values as JSON; null counts as absent.
fn display_value(value: Option<&serde_json::Value>) -> Option<String> {
    match value? {
        serde_json::Value::Null => None,
        serde_json::Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}

impl fmt::Display for Proposal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.proposal_id, self.proposal_type)
    }
}

pub struct ProposalFetcher {
    url: String,
    client: reqwest::Client,
}

impl ProposalFetcher {
    pub fn new(url: String, timeout: Option<Duration>) -> Result<Self, FetchError> {
        let mut builder = reqwest::Client::builder();
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }
        Ok(Self {
            url,
            client: builder.build()?,
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Fetch the current proposal list. One attempt, no retries.
    pub async fn fetch(&self) -> Result<Vec<Proposal>, FetchError> {
        debug!(url = %self.url, "fetching proposals");

        let resp = self
            .client
            .get(&self.url)
            .header(reqwest::header::ACCEPT, "application/json")
            .send()
            .await?;

        if !resp.status().is_success() {
            let status = resp.status().as_u16();
            let body = resp.text().await.unwrap_or_default();
            return Err(FetchError::Status {
                status,
                body: truncate(&body, MAX_LOGGED_BODY).to_string(),
            });
        }

        let body = resp.text().await?;
        let proposals = parse_proposals(&body)?;
        info!(count = proposals.len(), "fetched proposals");
        Ok(proposals)
    }
}

/// Decode a proposal list body, skipping records without the required fields.
pub fn parse_proposals(body: &str) -> Result<Vec<Proposal>, FetchError> {
    let value: serde_json::Value = serde_json::from_str(body)?;
    let records = match value {
        serde_json::Value::Array(records) => records,
        _ => {
            warn!(body = %truncate(body, MAX_LOGGED_BODY), "API response does not contain a proposal list");
            return Err(FetchError::NotAList);
        }
    };

    if records.is_empty() {
        warn!("API response contained no proposals");
    }

    let mut proposals = Vec::with_capacity(records.len());
    for (index, record) in records.into_iter().enumerate() {
        match serde_json::from_value::<Proposal>(record) {
            Ok(p) => proposals.push(p),
            Err(e) => warn!(index = index, error = %e, "skipping malformed proposal record"),
        }
    }
    Ok(proposals)
}

fn truncate(s: &str, max: usize) -> &str {
    match s.char_indices().nth(max) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"[
        {
            "proposal_id": "A1",
            "proposal_type": "TreasuryWithdrawals",
            "proposal_description": {"tag": "TreasuryWithdrawals", "summary": "Fund the thing"},
            "proposed_epoch": 507,
            "expiration": 513,
            "meta_url": "https://example.org/a1.json",
            "deposit": "100000000000"
        },
        {
            "proposal_id": "A2",
            "proposal_type": "InfoAction",
            "proposal_description": null,
            "proposed_epoch": 508,
            "expiration": null,
            "meta_url": null
        }
    ]"#;

    #[test]
    fn test_parse_full_and_sparse_records() {
        let proposals = parse_proposals(SAMPLE).unwrap();
        assert_eq!(proposals.len(), 2);

        assert_eq!(proposals[0].proposal_id, "A1");
        assert_eq!(proposals[0].summary().as_deref(), Some("Fund the thing"));
        assert_eq!(proposals[0].expiration().as_deref(), Some("513"));
        assert_eq!(
            proposals[0].meta_url().as_deref(),
            Some("https://example.org/a1.json")
        );

        assert_eq!(proposals[1].summary(), None);
        assert_eq!(proposals[1].proposed_epoch().as_deref(), Some("508"));
        assert_eq!(proposals[1].expiration(), None);
        assert_eq!(proposals[1].meta_url(), None);
    }

    #[test]
    fn test_parse_keeps_records_with_odd_optional_types() {
        let body = r#"[
            {"proposal_id": "G1", "proposal_type": "InfoAction", "proposed_epoch": "507"},
            {"proposal_id": "G2", "proposal_type": "InfoAction", "meta_url": 42},
            {"proposal_id": "G3", "proposal_type": "InfoAction", "expiration": 512.5,
             "proposal_description": {"summary": 7}}
        ]"#;
        let proposals = parse_proposals(body).unwrap();
        let ids: Vec<_> = proposals.iter().map(|p| p.proposal_id.as_str()).collect();
        assert_eq!(ids, vec!["G1", "G2", "G3"]);

        assert_eq!(proposals[0].proposed_epoch().as_deref(), Some("507"));
        assert_eq!(proposals[1].meta_url().as_deref(), Some("42"));
        assert_eq!(proposals[2].expiration().as_deref(), Some("512.5"));
        assert_eq!(proposals[2].summary().as_deref(), Some("7"));
    }

    #[test]
    fn test_parse_skips_records_missing_required_fields() {
        let body = r#"[
            {"proposal_type": "InfoAction"},
            {"proposal_id": "B1"},
            "not an object",
            {"proposal_id": "B2", "proposal_type": "NoConfidence"}
        ]"#;
        let proposals = parse_proposals(body).unwrap();
        assert_eq!(proposals.len(), 1);
        assert_eq!(proposals[0].proposal_id, "B2");
    }

    #[test]
    fn test_parse_rejects_non_list() {
        assert!(matches!(
            parse_proposals(r#"{"error": "rate limited"}"#),
            Err(FetchError::NotAList)
        ));
        assert!(matches!(parse_proposals("<html>"), Err(FetchError::Decode(_))));
    }

    #[test]
    fn test_parse_empty_list() {
        assert!(parse_proposals("[]").unwrap().is_empty());
    }

    #[test]
    fn test_truncate_respects_char_boundaries() {
        assert_eq!(truncate("héllo", 2), "hé");
        assert_eq!(truncate("abc", 10), "abc");
    }

    #[tokio::test]
    async fn test_fetch_sends_accept_header() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/api/v1/proposal_list")
            .match_header("accept", "application/json")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(SAMPLE)
            .create_async()
            .await;

        let fetcher =
            ProposalFetcher::new(format!("{}/api/v1/proposal_list", server.url()), None).unwrap();
        let proposals = fetcher.fetch().await.unwrap();

        assert_eq!(proposals.len(), 2);
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_fetch_http_error() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("GET", "/api/v1/proposal_list")
            .with_status(503)
            .with_body("upstream down")
            .create_async()
            .await;

        let fetcher =
            ProposalFetcher::new(format!("{}/api/v1/proposal_list", server.url()), None).unwrap();
        match fetcher.fetch().await {
            Err(FetchError::Status { status, body }) => {
                assert_eq!(status, 503);
                assert_eq!(body, "upstream down");
            }
            other => panic!("expected status error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_fetch_unreachable_host() {
        let port = {
            let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
            listener.local_addr().unwrap().port()
        };
        let fetcher = ProposalFetcher::new(
            format!("http://127.0.0.1:{}/api/v1/proposal_list", port),
            Some(Duration::from_secs(2)),
        )
        .unwrap();
        assert!(matches!(fetcher.fetch().await, Err(FetchError::Request(_))));
    }
}
