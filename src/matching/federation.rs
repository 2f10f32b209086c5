//! Federation with peer nodes: outbound match requests and asynchronous completion.

use std::time::Duration;

use chrono::Utc;
use futures::StreamExt;
use serde::Deserialize;
use tracing::{info, warn};

use crate::{
    conf::Conf,
    err::ValidationError,
    model::{
        records::{
            MatchError, MatchRecord, MatchRequest, MatchResult, MatchType, PeerNode,
            PendingAsyncQuery, ResultGroup,
        },
        validate::validate_results,
        Patient, MME_MIME_TYPE,
    },
    store::Store,
};

/// Failure of one peer; recorded in the match record, never raised to the caller.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum PeerError {
    #[error("request timed out after {0:?}")]
    Timeout(Duration),
    #[error("request failed: {0}")]
    Transport(String),
    #[error("invalid response: {0}")]
    InvalidResponse(String),
}

/// Answer of a peer to a match request.
#[derive(Debug, Clone, PartialEq)]
pub enum PeerOutcome {
    /// Immediate results.
    Results(Vec<MatchResult>),
    /// The peer will post its results to `/async_response` with this query ID.
    Deferred(String),
}

/// Sends match requests to peer nodes.
#[async_trait::async_trait]
pub trait PeerClient: Send + Sync {
    async fn send(&self, node: &PeerNode, request: &MatchRequest)
        -> Result<PeerOutcome, PeerError>;
}

/// Body of a peer's answer; either results or a deferred query ID.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PeerResponse {
    #[serde(default)]
    results: Option<Vec<MatchResult>>,
    #[serde(default, alias = "query_id")]
    query_id: Option<String>,
}

/// Interpret the body returned by a peer.
pub fn parse_peer_response(body: &[u8]) -> Result<PeerOutcome, PeerError> {
    let response: PeerResponse = serde_json::from_slice(body)
        .map_err(|e| PeerError::InvalidResponse(e.to_string()))?;
    match (response.results, response.query_id) {
        (Some(results), _) => {
            validate_results(&results).map_err(|e| PeerError::InvalidResponse(e.to_string()))?;
            Ok(PeerOutcome::Results(results))
        }
        (None, Some(query_id)) if !query_id.is_empty() => Ok(PeerOutcome::Deferred(query_id)),
        _ => Err(PeerError::InvalidResponse(
            "neither results nor queryId in response".to_string(),
        )),
    }
}

/// Peer client speaking HTTP.
#[derive(Debug, Clone)]
pub struct HttpPeerClient {
    client: reqwest::Client,
    timeout: Duration,
}

impl HttpPeerClient {
    pub fn new(timeout: Duration) -> Result<Self, anyhow::Error> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| anyhow::anyhow!("could not build HTTP client: {}", e))?;
        Ok(Self { client, timeout })
    }
}

#[async_trait::async_trait]
impl PeerClient for HttpPeerClient {
    async fn send(
        &self,
        node: &PeerNode,
        request: &MatchRequest,
    ) -> Result<PeerOutcome, PeerError> {
        let body =
            serde_json::to_vec(request).map_err(|e| PeerError::Transport(e.to_string()))?;
        let response = self
            .client
            .post(&node.matching_url)
            .header(reqwest::header::CONTENT_TYPE, &node.accepted_content)
            .header(reqwest::header::ACCEPT, MME_MIME_TYPE)
            .header("X-Auth-Token", &node.auth_token)
            .body(body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    PeerError::Timeout(self.timeout)
                } else {
                    PeerError::Transport(e.to_string())
                }
            })?;
        let status = response.status();
        let body = response
            .bytes()
            .await
            .map_err(|e| PeerError::Transport(e.to_string()))?;
        if !status.is_success() {
            return Err(PeerError::Transport(format!("HTTP status {}", status)));
        }
        parse_peer_response(&body)
    }
}

/// Result of an external match.
#[derive(Debug, Clone, PartialEq)]
pub enum ExternalMatch {
    /// No (matching) peer nodes are registered; nothing was stored.
    NoPeers,
    /// All peers answered or failed.
    Completed(MatchRecord),
}

/// Match a patient against all peer nodes, or the one with ID `node_id`.
///
/// Peers are queried concurrently and each one is waited for until it answers, fails or
/// times out.  Deferred answers create pending async queries.  The record is stored only if
/// it has matches or errors.
pub async fn external_match(
    store: &dyn Store,
    client: &dyn PeerClient,
    conf: &Conf,
    patient: &Patient,
    node_id: Option<&str>,
) -> Result<ExternalMatch, anyhow::Error> {
    let nodes = store
        .nodes()?
        .into_iter()
        .filter(|node| node_id.map(|id| id == node.id).unwrap_or(true))
        .collect::<Vec<_>>();
    if nodes.is_empty() {
        warn!("no peer nodes to match patient {} against", &patient.id);
        return Ok(ExternalMatch::NoPeers);
    }

    info!(
        "Matching patient {} against {} peer node(s)...",
        &patient.id,
        nodes.len()
    );
    let before_matching = std::time::Instant::now();
    let request = MatchRequest {
        patient: patient.to_mme(),
    };
    let timeout = conf.peer_timeout();
    let outcomes = futures::stream::iter(nodes.iter().map(|node| {
        let request = &request;
        async move {
            let outcome = match tokio::time::timeout(timeout, client.send(node, request)).await {
                Ok(outcome) => outcome,
                Err(_) => Err(PeerError::Timeout(timeout)),
            };
            (node, outcome)
        }
    }))
    .buffered(conf.max_peer_concurrency)
    .collect::<Vec<_>>()
    .await;

    let mut results = Vec::new();
    let mut errors = Vec::new();
    for (node, outcome) in outcomes {
        match outcome {
            Ok(PeerOutcome::Results(patients)) => {
                info!("node {} returned {} result(s)", &node.id, patients.len());
                if !patients.is_empty() {
                    results.push(ResultGroup {
                        node: node.node_ref(),
                        patients,
                    });
                }
            }
            Ok(PeerOutcome::Deferred(query_id)) => {
                info!("node {} deferred its answer as query {}", &node.id, &query_id);
                if let Err(e) = store.insert_pending(&PendingAsyncQuery {
                    query_id: query_id.clone(),
                    query_patient_id: patient.id.clone(),
                    node: node.node_ref(),
                    created: Utc::now(),
                }) {
                    warn!("could not record query {} of node {}: {}", &query_id, &node.id, e);
                    errors.push(MatchError {
                        node: node.node_ref(),
                        message: format!("could not record deferred query {}: {}", &query_id, e),
                    });
                }
            }
            Err(e) => {
                warn!("matching against node {} failed: {}", &node.id, &e);
                errors.push(MatchError {
                    node: node.node_ref(),
                    message: e.to_string(),
                });
            }
        }
    }

    let record = MatchRecord::new(
        MatchType::External,
        patient.id.clone(),
        Some(request.patient),
        results,
        errors,
    );
    if record.has_matches || !record.errors.is_empty() {
        store.insert_match(&record)?;
    }
    info!(
        "...done matching against peer nodes in {:?}",
        before_matching.elapsed()
    );

    Ok(ExternalMatch::Completed(record))
}

/// Failure to complete an asynchronous query.
#[derive(thiserror::Error, Debug)]
pub enum AsyncError {
    /// The body is not a valid async response.
    #[error("invalid async response: {0}")]
    BadRequest(String),
    /// The query ID is missing, unknown or already consumed.
    #[error("unknown query ID {0:?}")]
    UnknownQueryId(Option<String>),
    /// The results do not conform to the MME API.
    #[error(transparent)]
    Invalid(#[from] ValidationError),
    #[error(transparent)]
    Store(#[from] anyhow::Error),
}

/// Body posted by a peer to `/async_response`.
#[derive(Debug, Deserialize)]
struct AsyncResponse {
    #[serde(default)]
    query_id: Option<String>,
    #[serde(default)]
    source: Option<String>,
    #[serde(default)]
    response: Option<serde_json::Value>,
}

/// Results inside an async response.
#[derive(Debug, Deserialize)]
struct AsyncResults {
    results: Vec<MatchResult>,
}

/// Outcome of a completed async response.
#[derive(Debug, Clone, PartialEq)]
pub enum AsyncCompletion {
    /// The results were stored as a match record.
    Stored(MatchRecord),
    /// The query patient is no longer known; the query stays pending.
    UnknownPatient(String),
}

/// Complete a pending query with the results posted by the peer.
///
/// The pending query is consumed only if a match record is stored.
pub fn complete_async(store: &dyn Store, body: &[u8]) -> Result<AsyncCompletion, AsyncError> {
    let async_response: AsyncResponse =
        serde_json::from_slice(body).map_err(|e| AsyncError::BadRequest(e.to_string()))?;
    let query_id = async_response
        .query_id
        .ok_or(AsyncError::UnknownQueryId(None))?;
    let pending = store
        .take_pending(&query_id)?
        .ok_or_else(|| AsyncError::UnknownQueryId(Some(query_id.clone())))?;

    let results = match parse_async_results(async_response.response) {
        Ok(results) => results,
        Err(e) => {
            store.insert_pending(&pending)?;
            return Err(e);
        }
    };
    if store.get_patient(&pending.query_patient_id)?.is_none() {
        warn!(
            "query patient {} of async query {} is not in the database",
            &pending.query_patient_id, &query_id
        );
        store.insert_pending(&pending)?;
        return Ok(AsyncCompletion::UnknownPatient(pending.query_patient_id));
    }

    info!(
        "completing query {} of node {} (source {:?}) with {} result(s)",
        &query_id,
        &pending.node.id,
        &async_response.source,
        results.len()
    );
    let record = MatchRecord::new(
        MatchType::ExternalAsync,
        pending.query_patient_id,
        None,
        vec![ResultGroup {
            node: pending.node,
            patients: results,
        }],
        vec![],
    );
    store.insert_match(&record)?;
    Ok(AsyncCompletion::Stored(record))
}

/// Extract and validate the results of an async response.
fn parse_async_results(
    response: Option<serde_json::Value>,
) -> Result<Vec<MatchResult>, AsyncError> {
    let response = response.ok_or_else(|| AsyncError::BadRequest("missing response".into()))?;
    let results = serde_json::from_value::<AsyncResults>(response)
        .map_err(|e| ValidationError::schema(e.to_string()))?
        .results;
    validate_results(&results)?;
    Ok(results)
}
