//! Pinecone serverless index over the REST API.
//!
//! Control plane (`index.control_url`, default `https://api.pinecone.io`):
//! `GET /indexes/{name}` to describe, `POST /indexes` to create.
//! Data plane (the `host` returned by describe): `POST /vectors/upsert`,
//! `POST /query`, `POST /describe_index_stats`.
//!
//! Chunk text and source are stored as vector metadata under `text` and
//! `source`.

use async_trait::async_trait;
use reqwest::{Method, RequestBuilder, StatusCode};
use serde::Deserialize;
use std::time::Duration;
use tokio::sync::OnceCell;

use super::{check_dimension, VectorIndex};
use crate::config::IndexConfig;
use crate::error::ProviderError;
use crate::models::{IndexedEntry, ScoredChunk};
use crate::retry::{http_client, json_body, send_with_retry};

const PROVIDER: &str = "pinecone";
const API_VERSION: &str = "2024-07";
/// How many times to poll a freshly created index before giving up.
const READY_POLLS: u32 = 120;

pub struct PineconeIndex {
    name: String,
    dimension: usize,
    metric: String,
    cloud: String,
    region: String,
    control_url: String,
    api_key: String,
    client: reqwest::Client,
    max_retries: u32,
    upsert_batch_size: usize,
    poll_interval: Duration,
    host: OnceCell<String>,
}

#[derive(Debug, Deserialize)]
struct IndexDescription {
    host: String,
    #[serde(default)]
    dimension: Option<usize>,
    #[serde(default)]
    status: IndexStatus,
}

#[derive(Debug, Default, Deserialize)]
struct IndexStatus {
    #[serde(default)]
    ready: bool,
}

impl PineconeIndex {
    pub fn new(config: &IndexConfig, api_key: &str) -> Result<Self, ProviderError> {
        Ok(Self {
            name: config.name.clone(),
            dimension: config.dimension,
            metric: config.metric.clone(),
            cloud: config.cloud.clone(),
            region: config.region.clone(),
            control_url: config.control_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
            client: http_client(PROVIDER, config.timeout_secs)?,
            max_retries: config.max_retries,
            upsert_batch_size: config.upsert_batch_size.max(1),
            poll_interval: Duration::from_secs(1),
            host: OnceCell::new(),
        })
    }

    /// Overrides the delay between readiness polls after index creation.
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    fn request(&self, method: Method, url: &str) -> RequestBuilder {
        self.client
            .request(method, url)
            .header("Api-Key", &self.api_key)
            .header("X-Pinecone-API-Version", API_VERSION)
    }

    async fn describe(&self) -> Result<Option<IndexDescription>, ProviderError> {
        let url = format!("{}/indexes/{}", self.control_url, self.name);
        let response =
            send_with_retry(PROVIDER, self.max_retries, || self.request(Method::GET, &url)).await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let json = json_body(PROVIDER, response).await?;
        serde_json::from_value(json)
            .map(Some)
            .map_err(|e| ProviderError::bad_response(PROVIDER, e))
    }

    async fn create(&self) -> Result<(), ProviderError> {
        let url = format!("{}/indexes", self.control_url);
        let body = serde_json::json!({
            "name": self.name,
            "dimension": self.dimension,
            "metric": self.metric,
            "spec": {
                "serverless": { "cloud": self.cloud, "region": self.region }
            }
        });

        let response = send_with_retry(PROVIDER, self.max_retries, || {
            self.request(Method::POST, &url).json(&body)
        })
        .await?;

        // Someone else created it between our describe and create.
        if response.status() == StatusCode::CONFLICT {
            return Ok(());
        }
        json_body(PROVIDER, response).await?;
        tracing::info!(index = %self.name, dimension = self.dimension, metric = %self.metric, "created index");
        Ok(())
    }

    async fn wait_until_ready(&self) -> Result<String, ProviderError> {
        for _ in 0..READY_POLLS {
            if let Some(desc) = self.describe().await? {
                if desc.status.ready {
                    return Ok(desc.host);
                }
            }
            tokio::time::sleep(self.poll_interval).await;
        }
        Err(ProviderError::unavailable(
            PROVIDER,
            format!("index '{}' did not become ready", self.name),
        ))
    }

    async fn host(&self) -> Result<&str, ProviderError> {
        self.host
            .get_or_try_init(|| async {
                match self.describe().await? {
                    Some(desc) => Ok(desc.host),
                    None => Err(ProviderError::misconfigured(
                        PROVIDER,
                        format!(
                            "index '{}' does not exist; run `medchat ingest` first",
                            self.name
                        ),
                    )),
                }
            })
            .await
            .map(String::as_str)
    }

    async fn data_url(&self, path: &str) -> Result<String, ProviderError> {
        Ok(data_url(self.host().await?, path))
    }
}

fn data_url(host: &str, path: &str) -> String {
    let host = host.trim_end_matches('/');
    if host.starts_with("http://") || host.starts_with("https://") {
        format!("{}{}", host, path)
    } else {
        format!("https://{}{}", host, path)
    }
}

fn parse_matches(json: &serde_json::Value) -> Result<Vec<ScoredChunk>, ProviderError> {
    let matches = json
        .get("matches")
        .and_then(|m| m.as_array())
        .ok_or_else(|| ProviderError::bad_response(PROVIDER, "missing matches array"))?;

    matches
        .iter()
        .map(|m| {
            let id = m
                .get("id")
                .and_then(|v| v.as_str())
                .ok_or_else(|| ProviderError::bad_response(PROVIDER, "match without id"))?;
            let metadata = m.get("metadata");
            let field = |key: &str| {
                metadata
                    .and_then(|md| md.get(key))
                    .and_then(|v| v.as_str())
                    .unwrap_or_default()
                    .to_string()
            };
            Ok(ScoredChunk {
                id: id.to_string(),
                text: field("text"),
                source: field("source"),
                score: m.get("score").and_then(|s| s.as_f64()).unwrap_or(0.0) as f32,
            })
        })
        .collect()
}

#[async_trait]
impl VectorIndex for PineconeIndex {
    fn provider(&self) -> &str {
        PROVIDER
    }

    async fn ensure_index(&self) -> Result<(), ProviderError> {
        let host = match self.describe().await? {
            Some(desc) => {
                if let Some(dimension) = desc.dimension {
                    if dimension != self.dimension {
                        return Err(ProviderError::misconfigured(
                            PROVIDER,
                            format!(
                                "index '{}' has dimension {}, expected {}",
                                self.name, dimension, self.dimension
                            ),
                        ));
                    }
                }
                if desc.status.ready {
                    desc.host
                } else {
                    self.wait_until_ready().await?
                }
            }
            None => {
                self.create().await?;
                self.wait_until_ready().await?
            }
        };
        // Already initialised by a concurrent caller is fine.
        let _ = self.host.set(host);
        Ok(())
    }

    async fn upsert(&self, entries: &[IndexedEntry]) -> Result<usize, ProviderError> {
        let url = self.data_url("/vectors/upsert").await?;
        let mut written = 0usize;

        for batch in entries.chunks(self.upsert_batch_size) {
            let mut vectors = Vec::with_capacity(batch.len());
            for entry in batch {
                check_dimension(PROVIDER, self.dimension, &entry.vector)?;
                vectors.push(serde_json::json!({
                    "id": entry.chunk.id,
                    "values": entry.vector,
                    "metadata": {
                        "text": entry.chunk.text,
                        "source": entry.chunk.source,
                    }
                }));
            }
            let body = serde_json::json!({ "vectors": vectors });

            let response = send_with_retry(PROVIDER, self.max_retries, || {
                self.request(Method::POST, &url).json(&body)
            })
            .await?;
            let json = json_body(PROVIDER, response).await?;
            written += json
                .get("upsertedCount")
                .and_then(|c| c.as_u64())
                .map(|c| c as usize)
                .unwrap_or(batch.len());
        }

        Ok(written)
    }

    async fn query(&self, vector: &[f32], k: usize) -> Result<Vec<ScoredChunk>, ProviderError> {
        check_dimension(PROVIDER, self.dimension, vector)?;
        let url = self.data_url("/query").await?;
        let body = serde_json::json!({
            "vector": vector,
            "topK": k,
            "includeMetadata": true,
            "includeValues": false,
        });

        let response = send_with_retry(PROVIDER, self.max_retries, || {
            self.request(Method::POST, &url).json(&body)
        })
        .await?;
        let json = json_body(PROVIDER, response).await?;

        let mut hits = parse_matches(&json)?;
        hits.truncate(k);
        Ok(hits)
    }

    async fn count(&self) -> Result<usize, ProviderError> {
        let url = self.data_url("/describe_index_stats").await?;
        let body = serde_json::json!({});
        let response = send_with_retry(PROVIDER, self.max_retries, || {
            self.request(Method::POST, &url).json(&body)
        })
        .await?;
        let json = json_body(PROVIDER, response).await?;
        json.get("totalVectorCount")
            .and_then(|c| c.as_u64())
            .map(|c| c as usize)
            .ok_or_else(|| ProviderError::bad_response(PROVIDER, "missing totalVectorCount"))
    }
}
