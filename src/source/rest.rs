//! HTTP polling source
//!
//! Runs an installed batch query with `GET {base_url}/query/{graph}/{query}`
//! and reads both payload halves from the first entry of `results`.

use super::{GraphStoreClient, SeedVertex, Submission, TaskDescriptor, TaskScope};
use crate::error::FetchError;
use crate::types::PayloadKind;
use crate::wire::RawRecordBatch;
use bytes::Bytes;
use reqwest::blocking::Client;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, instrument};

/// Query parameter carrying seed vertices
pub const SEED_PARAM: &str = "input_vertices";

/// Connection settings of the REST source
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RestClientConfig {
    /// Server root, e.g. `http://localhost:9000`
    #[serde(default = "default_base_url")]
    pub base_url: String,
    /// Graph name
    pub graph: String,
    /// Installed query that produces one batch
    pub query: String,
    /// Bearer token
    #[serde(default)]
    pub token: Option<String>,
    /// Query timeout, forwarded as `GSQL-TIMEOUT` and used as HTTP timeout
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
    /// Response size cap, forwarded as `RESPONSE-LIMIT`
    #[serde(default)]
    pub response_limit: Option<u64>,
}

fn default_base_url() -> String {
    "http://localhost:9000".to_string()
}

fn default_timeout_ms() -> u64 {
    60_000
}

#[derive(Debug, Deserialize)]
struct QueryResponse {
    #[serde(default)]
    error: bool,
    #[serde(default)]
    message: String,
    #[serde(default)]
    results: Vec<BatchResult>,
}

#[derive(Debug, Deserialize)]
struct BatchResult {
    vertex_batch: Option<String>,
    edge_batch: Option<String>,
}

/// [`GraphStoreClient`] backed by a blocking HTTP client
#[derive(Debug, Clone)]
pub struct RestClient {
    config: RestClientConfig,
    client: Client,
}

impl RestClient {
    pub fn new(config: RestClientConfig) -> Result<Self, FetchError> {
        let client = Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms))
            .build()
            .map_err(|e| FetchError::Transport(format!("Failed to create HTTP client: {}", e)))?;
        Ok(Self { config, client })
    }

    pub fn config(&self) -> &RestClientConfig {
        &self.config
    }

    /// Endpoint of the batch query
    pub fn url(&self) -> String {
        format!(
            "{}/query/{}/{}",
            self.config.base_url.trim_end_matches('/'),
            self.config.graph,
            self.config.query
        )
    }

    fn map_http_error(&self, error: reqwest::Error) -> FetchError {
        if error.is_timeout() {
            FetchError::Timeout(self.config.timeout_ms)
        } else if error.is_connect() {
            FetchError::Transport(format!("Connection error: {}", error))
        } else {
            FetchError::Transport(format!("HTTP error: {}", error))
        }
    }
}

/// Query string pairs of a task, in a stable order
pub fn query_pairs(task: &TaskDescriptor) -> Vec<(String, String)> {
    let mut pairs: Vec<(String, String)> = task
        .params
        .iter()
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect();

    match &task.scope {
        TaskScope::WholeGraph => {}
        TaskScope::Partition { index, count } => {
            pairs.push(("num_batches".to_string(), count.to_string()));
            pairs.push(("batch_id".to_string(), index.to_string()));
        }
        TaskScope::Seeds(seeds) => pairs.extend(seed_pairs(seeds)),
    }
    pairs
}

/// `input_vertices[i]=id` and, for typed seeds, `input_vertices[i].type=T`
fn seed_pairs(seeds: &[SeedVertex]) -> Vec<(String, String)> {
    let mut pairs = Vec::with_capacity(seeds.len() * 2);
    for (i, seed) in seeds.iter().enumerate() {
        pairs.push((format!("{}[{}]", SEED_PARAM, i), seed.id.clone()));
        if let Some(t) = &seed.vertex_type {
            pairs.push((format!("{}[{}].type", SEED_PARAM, i), t.clone()));
        }
    }
    pairs
}

/// Extract the payload of `kind` from a query response body
pub fn parse_response(kind: PayloadKind, body: &str) -> Result<RawRecordBatch, FetchError> {
    let response: QueryResponse = serde_json::from_str(body)
        .map_err(|e| FetchError::InvalidResponse(format!("Failed to parse response: {}", e)))?;
    if response.error {
        return Err(FetchError::Remote(response.message));
    }
    let result = response
        .results
        .into_iter()
        .next()
        .ok_or_else(|| FetchError::InvalidResponse("empty results".to_string()))?;

    let half = |value: Option<String>, name: &str, needed: bool| match value {
        Some(text) => Ok(Bytes::from(text)),
        None if needed => Err(FetchError::InvalidResponse(format!("missing {}", name))),
        None => Ok(Bytes::new()),
    };
    let vertices = half(result.vertex_batch, "vertex_batch", kind.has_vertices())?;
    let edges = half(result.edge_batch, "edge_batch", kind.has_edges())?;
    Ok(RawRecordBatch::from_parts(kind, vertices, edges))
}

impl GraphStoreClient for RestClient {
    #[instrument(skip(self, task), fields(batch = task.batch_index, epoch = task.epoch))]
    fn submit_batch_task(&self, task: &TaskDescriptor) -> Result<Submission, FetchError> {
        let url = self.url();
        debug!("Running batch query {}", url);

        let mut request = self
            .client
            .get(&url)
            .query(&query_pairs(task))
            .header("GSQL-TIMEOUT", self.config.timeout_ms.to_string());
        if let Some(limit) = self.config.response_limit {
            request = request.header("RESPONSE-LIMIT", limit.to_string());
        }
        if let Some(token) = &self.config.token {
            request = request.bearer_auth(token);
        }

        let response = request.send().map_err(|e| self.map_http_error(e))?;
        let status = response.status();
        let body = response.text().map_err(|e| self.map_http_error(e))?;

        match status {
            StatusCode::OK => parse_response(task.payload, &body).map(Submission::Ready),
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                Err(FetchError::Remote(format!("Not authorized ({}): {}", status, body)))
            }
            StatusCode::REQUEST_TIMEOUT | StatusCode::GATEWAY_TIMEOUT => {
                Err(FetchError::Timeout(self.config.timeout_ms))
            }
            _ => Err(FetchError::Remote(format!(
                "Unexpected status code {}: {}",
                status, body
            ))),
        }
    }
}
