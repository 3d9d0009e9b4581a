use crate::models::{BulkItemOutcome, ContentQuery, IndexRecord, SearchHit};
use crate::traits::DocumentIndex;
use crate::SearchError;
use async_trait::async_trait;
use reqwest::Client;
use reqwest::StatusCode;
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{debug, info};

const BACKEND: &str = "opensearch";

pub struct OpenSearchStore {
    client: Arc<Client>,
    endpoint: String,
    index_name: String,
}

impl OpenSearchStore {
    pub fn new(endpoint: impl Into<String>, index_name: impl Into<String>) -> Self {
        Self::with_client(Arc::new(Client::new()), endpoint, index_name)
    }

    pub fn with_client(
        client: Arc<Client>,
        endpoint: impl Into<String>,
        index_name: impl Into<String>,
    ) -> Self {
        Self {
            client,
            endpoint: endpoint.into().trim_end_matches('/').to_string(),
            index_name: index_name.into(),
        }
    }

    fn index_url(&self, suffix: &str) -> String {
        format!("{}/{}{}", self.endpoint, self.index_name, suffix)
    }

    async fn backend_error(response: reqwest::Response) -> SearchError {
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        SearchError::BackendResponse {
            backend: BACKEND.to_string(),
            details: format!("{status}: {body}"),
        }
    }
}

#[async_trait]
impl DocumentIndex for OpenSearchStore {
    fn index_name(&self) -> &str {
        &self.index_name
    }

    async fn ensure_index(&self) -> Result<(), SearchError> {
        let response = self.client.head(self.index_url("")).send().await?;

        if response.status() == StatusCode::OK {
            return Ok(());
        }

        if response.status() != StatusCode::NOT_FOUND {
            return Err(SearchError::BackendResponse {
                backend: BACKEND.to_string(),
                details: response.status().to_string(),
            });
        }

        let response = self
            .client
            .put(self.index_url(""))
            .json(&index_definition())
            .send()
            .await?;

        // Another writer may have created it in between.
        if response.status() == StatusCode::BAD_REQUEST {
            let body: Value = response.json().await.unwrap_or(Value::Null);
            let kind = body.pointer("/error/type").and_then(Value::as_str);
            if kind == Some("resource_already_exists_exception") {
                return Ok(());
            }
            return Err(SearchError::Request(format!(
                "index setup for {} failed: {body}",
                self.index_name
            )));
        }

        if !response.status().is_success() {
            return Err(Self::backend_error(response).await);
        }

        info!(index = %self.index_name, "created search index");
        Ok(())
    }

    async fn bulk_upsert(
        &self,
        records: &[IndexRecord],
    ) -> Result<Vec<BulkItemOutcome>, SearchError> {
        if records.is_empty() {
            return Ok(Vec::new());
        }

        let payload = bulk_payload(&self.index_name, records)?;
        let response = self
            .client
            .post(format!("{}/_bulk", self.endpoint))
            .header("Content-Type", "application/x-ndjson")
            .body(payload)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(Self::backend_error(response).await);
        }

        let body: Value = response.json().await?;
        parse_bulk_items(&body)
    }

    async fn delete_all(&self) -> Result<u64, SearchError> {
        let response = self
            .client
            .post(self.index_url("/_delete_by_query?refresh=true&conflicts=proceed"))
            .json(&json!({
                "query": {
                    "match_all": {}
                }
            }))
            .send()
            .await?;

        if response.status() == StatusCode::NOT_FOUND {
            debug!(index = %self.index_name, "index does not exist, nothing to clear");
            return Ok(0);
        }

        if !response.status().is_success() {
            return Err(Self::backend_error(response).await);
        }

        let body: Value = response.json().await?;
        Ok(body.pointer("/deleted").and_then(Value::as_u64).unwrap_or(0))
    }

    async fn match_content(&self, query: &ContentQuery) -> Result<Vec<SearchHit>, SearchError> {
        let response = self
            .client
            .post(self.index_url("/_search"))
            .json(&search_body(query))
            .send()
            .await?;

        if response.status() == StatusCode::NOT_FOUND {
            return Ok(Vec::new());
        }

        if !response.status().is_success() {
            return Err(Self::backend_error(response).await);
        }

        let body: Value = response.json().await?;
        Ok(parse_hits(&body))
    }
}

fn index_definition() -> Value {
    json!({
        "settings": {
            "number_of_shards": 1,
            "number_of_replicas": 0
        },
        "mappings": {
            "properties": {
                "id": {"type": "keyword"},
                "location": {"type": "keyword"},
                "content": {"type": "text"}
            }
        }
    })
}

/// NDJSON body with one `index` action per record, keyed by the record id.
fn bulk_payload(index_name: &str, records: &[IndexRecord]) -> Result<String, SearchError> {
    let mut payload = String::new();

    for record in records {
        let action = json!({
            "index": {
                "_index": index_name,
                "_id": record.id,
            }
        });
        payload.push_str(&serde_json::to_string(&action)?);
        payload.push('\n');
        payload.push_str(&serde_json::to_string(record)?);
        payload.push('\n');
    }

    Ok(payload)
}

fn parse_bulk_items(body: &Value) -> Result<Vec<BulkItemOutcome>, SearchError> {
    let items = body
        .pointer("/items")
        .and_then(Value::as_array)
        .ok_or_else(|| SearchError::BackendResponse {
            backend: BACKEND.to_string(),
            details: "bulk response has no items array".to_string(),
        })?;

    Ok(items.iter().map(parse_bulk_item).collect())
}

fn parse_bulk_item(item: &Value) -> BulkItemOutcome {
    // Each entry is keyed by its action name: {"index": {...}}.
    let result = item
        .as_object()
        .and_then(|actions| actions.values().next())
        .cloned()
        .unwrap_or(Value::Null);

    let id = result.pointer("/_id").and_then(Value::as_str).map(str::to_string);
    let status = result
        .pointer("/status")
        .and_then(Value::as_u64)
        .and_then(|status| u16::try_from(status).ok())
        .unwrap_or(0);
    let error = result.get("error").filter(|error| !error.is_null()).map(|error| {
        let kind = error.pointer("/type").and_then(Value::as_str);
        let reason = error.pointer("/reason").and_then(Value::as_str);
        match (kind, reason) {
            (Some(kind), Some(reason)) => format!("{kind}: {reason}"),
            (Some(text), None) | (None, Some(text)) => text.to_string(),
            (None, None) => error.to_string(),
        }
    });

    BulkItemOutcome { id, status, error }
}

fn search_body(query: &ContentQuery) -> Value {
    json!({
        "size": query.max_results,
        "_source": ["id"],
        "query": {
            "bool": {
                "should": [
                    {
                        "match": {
                            "content": query.text
                        }
                    },
                    {
                        "wildcard": {
                            "content": {
                                "value": format!("*{}*", escape_wildcard(&query.text.to_lowercase())),
                                "case_insensitive": true
                            }
                        }
                    }
                ],
                "minimum_should_match": 1
            }
        }
    })
}

fn escape_wildcard(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for character in text.chars() {
        if matches!(character, '*' | '?' | '\\') {
            escaped.push('\\');
        }
        escaped.push(character);
    }
    escaped
}

fn parse_hits(body: &Value) -> Vec<SearchHit> {
    body.pointer("/hits/hits")
        .and_then(Value::as_array)
        .map(|hits| {
            hits.iter()
                .filter_map(|raw| {
                    let id = raw
                        .pointer("/_source/id")
                        .or_else(|| raw.pointer("/_id"))
                        .and_then(Value::as_str)?
                        .to_string();
                    let score = raw.pointer("/_score").and_then(Value::as_f64).unwrap_or(0.0);
                    Some(SearchHit { id, score })
                })
                .collect()
        })
        .unwrap_or_default()
}
