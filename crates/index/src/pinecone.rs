use std::collections::HashMap;
use std::time::Duration;

use parking_lot::Mutex;
use reqwest::blocking::{Client, RequestBuilder, Response};
use reqwest::StatusCode;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{debug, info};

use crate::error::{IndexError, Result};
use crate::{IndexDescription, IndexSpec, Metric, ScoredVector, StoredVector, VectorIndex};

const DEFAULT_CONTROLLER_URL: &str = "https://api.pinecone.io";
const DEFAULT_API_VERSION: &str = "2024-07";

#[derive(Debug, Clone)]
pub struct PineconeConfig {
    pub api_key: String,
    pub controller_url: String,
    pub api_version: String,
    pub request_timeout: Duration,
}

impl PineconeConfig {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            controller_url: DEFAULT_CONTROLLER_URL.to_string(),
            api_version: DEFAULT_API_VERSION.to_string(),
            request_timeout: Duration::from_secs(30),
        }
    }
}

/// Pinecone REST client: control plane for index lifecycle, per-index host for data.
pub struct PineconeIndex {
    http: Client,
    config: PineconeConfig,
    hosts: Mutex<HashMap<String, String>>,
}

impl PineconeIndex {
    pub fn new(config: PineconeConfig) -> Result<Self> {
        let http = Client::builder().timeout(config.request_timeout).build()?;
        Ok(Self {
            http,
            config,
            hosts: Mutex::new(HashMap::new()),
        })
    }

    fn controller(&self, path: &str) -> String {
        format!(
            "{}/{}",
            self.config.controller_url.trim_end_matches('/'),
            path.trim_start_matches('/')
        )
    }

    fn authorized(&self, builder: RequestBuilder) -> RequestBuilder {
        builder
            .header("Api-Key", &self.config.api_key)
            .header("X-Pinecone-API-Version", &self.config.api_version)
    }

    fn data_url(&self, name: &str, path: &str) -> Result<String> {
        let cached = self.hosts.lock().get(name).cloned();
        let host = match cached {
            Some(host) => host,
            None => self
                .describe(name)?
                .and_then(|description| description.host)
                .ok_or_else(|| IndexError::Missing(name.to_string()))?,
        };
        Ok(data_plane_url(&host, path))
    }
}

impl VectorIndex for PineconeIndex {
    fn describe(&self, name: &str) -> Result<Option<IndexDescription>> {
        let response = self
            .authorized(self.http.get(self.controller(&format!("indexes/{name}"))))
            .send()?;
        if response.status() == StatusCode::NOT_FOUND {
            self.hosts.lock().remove(name);
            return Ok(None);
        }
        let body: DescribeResponse = check(response)?.json()?;
        let description = body.into_description()?;
        if let Some(host) = &description.host {
            self.hosts.lock().insert(name.to_string(), host.clone());
        }
        Ok(Some(description))
    }

    fn create(&self, spec: &IndexSpec) -> Result<()> {
        let response = self
            .authorized(self.http.post(self.controller("indexes")))
            .json(&create_payload(spec))
            .send()?;
        if response.status() == StatusCode::CONFLICT {
            info!(index = %spec.name, "index already exists");
            return Ok(());
        }
        check(response)?;
        Ok(())
    }

    fn delete(&self, name: &str) -> Result<()> {
        let response = self
            .authorized(self.http.delete(self.controller(&format!("indexes/{name}"))))
            .send()?;
        self.hosts.lock().remove(name);
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(());
        }
        check(response)?;
        Ok(())
    }

    fn upsert(&self, name: &str, vectors: &[StoredVector]) -> Result<usize> {
        if vectors.is_empty() {
            return Ok(0);
        }
        let url = self.data_url(name, "vectors/upsert")?;
        let response = self
            .authorized(self.http.post(url))
            .json(&json!({ "vectors": vectors }))
            .send()?;
        let body: UpsertResponse = check(response)?.json()?;
        let count = body.upserted_count.unwrap_or(vectors.len());
        debug!(index = %name, count, "upsert accepted");
        Ok(count)
    }

    fn query(&self, name: &str, vector: &[f32], top_k: usize) -> Result<Vec<ScoredVector>> {
        let url = self.data_url(name, "query")?;
        let response = self
            .authorized(self.http.post(url))
            .json(&query_payload(vector, top_k))
            .send()?;
        let body: QueryResponse = check(response)?.json()?;
        Ok(body
            .matches
            .into_iter()
            .map(|m| ScoredVector {
                id: m.id,
                score: m.score,
                metadata: m.metadata.unwrap_or(Value::Null),
            })
            .collect())
    }
}

fn check(response: Response) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().unwrap_or_default();
    Err(IndexError::Api {
        status: status.as_u16(),
        body,
    })
}

fn data_plane_url(host: &str, path: &str) -> String {
    let host = host.trim_end_matches('/');
    if host.starts_with("http://") || host.starts_with("https://") {
        format!("{host}/{path}")
    } else {
        format!("https://{host}/{path}")
    }
}

fn create_payload(spec: &IndexSpec) -> Value {
    json!({
        "name": spec.name,
        "dimension": spec.dimension,
        "metric": spec.metric.as_str(),
        "spec": {
            "serverless": {
                "cloud": spec.cloud,
                "region": spec.region,
            }
        }
    })
}

fn query_payload(vector: &[f32], top_k: usize) -> Value {
    json!({
        "vector": vector,
        "topK": top_k,
        "includeMetadata": true,
        "includeValues": false,
    })
}

#[derive(Deserialize)]
struct DescribeResponse {
    name: String,
    dimension: usize,
    metric: String,
    #[serde(default)]
    host: Option<String>,
    #[serde(default)]
    status: Option<IndexStatus>,
}

#[derive(Deserialize)]
struct IndexStatus {
    #[serde(default)]
    ready: bool,
}

impl DescribeResponse {
    fn into_description(self) -> Result<IndexDescription> {
        let metric = Metric::from_str(&self.metric)
            .ok_or_else(|| IndexError::Other(format!("unknown metric {}", self.metric)))?;
        Ok(IndexDescription {
            name: self.name,
            dimension: self.dimension,
            metric,
            ready: self.status.map(|s| s.ready).unwrap_or(false),
            host: self.host.filter(|h| !h.is_empty()),
        })
    }
}

#[derive(Deserialize)]
struct UpsertResponse {
    #[serde(rename = "upsertedCount")]
    upserted_count: Option<usize>,
}

#[derive(Deserialize)]
struct QueryResponse {
    #[serde(default)]
    matches: Vec<QueryMatchBody>,
}

#[derive(Deserialize)]
struct QueryMatchBody {
    id: String,
    #[serde(default)]
    score: f32,
    #[serde(default)]
    metadata: Option<Value>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn create_payload_uses_serverless_spec() {
        let spec = IndexSpec::new("boq-items", 768, Metric::Cosine);
        let payload = create_payload(&spec);
        assert_eq!(payload["dimension"], 768);
        assert_eq!(payload["metric"], "cosine");
        assert_eq!(payload["spec"]["serverless"]["cloud"], "aws");
        assert_eq!(payload["spec"]["serverless"]["region"], "us-east-1");
    }

    #[test]
    fn query_payload_requests_metadata_only() {
        let payload = query_payload(&[0.5, 0.25], 3);
        assert_eq!(payload["topK"], 3);
        assert_eq!(payload["includeMetadata"], true);
        assert_eq!(payload["includeValues"], false);
    }

    #[test]
    fn upsert_body_matches_wire_format() {
        let vectors = vec![StoredVector {
            id: "id-0-0".into(),
            values: vec![0.5],
            metadata: json!({"text": "10m copper wire", "Raw Materials": "copper wire", "Sub QTY": 10}),
        }];
        let body = json!({ "vectors": vectors });
        assert_eq!(body["vectors"][0]["id"], "id-0-0");
        assert_eq!(body["vectors"][0]["metadata"]["Sub QTY"], 10);
    }

    #[test]
    fn describe_response_maps_status_and_host() {
        let raw = r#"{
            "name": "boq-items",
            "dimension": 768,
            "metric": "cosine",
            "host": "boq-items-abc.svc.pinecone.io",
            "status": {"ready": true, "state": "Ready"}
        }"#;
        let parsed: DescribeResponse = serde_json::from_str(raw).unwrap();
        let description = parsed.into_description().unwrap();
        assert!(description.ready);
        assert_eq!(description.metric, Metric::Cosine);
        assert_eq!(
            data_plane_url(description.host.as_deref().unwrap(), "query"),
            "https://boq-items-abc.svc.pinecone.io/query"
        );
    }

    #[test]
    fn query_response_tolerates_missing_metadata() {
        let parsed: QueryResponse =
            serde_json::from_str(r#"{"matches": [{"id": "id-1", "score": 0.87}]}"#).unwrap();
        assert_eq!(parsed.matches.len(), 1);
        assert!(parsed.matches[0].metadata.is_none());
        let empty: QueryResponse = serde_json::from_str(r#"{"namespace": ""}"#).unwrap();
        assert!(empty.matches.is_empty());
    }
}
