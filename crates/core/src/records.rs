use crate::error::IngestError;
use crate::models::{Location, SourceItem};
use crate::traits::RecordSource;
use async_trait::async_trait;
use serde::Deserialize;
use std::path::PathBuf;
use tracing::info;

/// Record ids appear either as plain strings or as extended JSON object ids.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RecordId {
    Plain(String),
    ObjectId {
        #[serde(rename = "$oid")]
        oid: String,
    },
}

impl RecordId {
    fn into_string(self) -> String {
        match self {
            Self::Plain(id) => id,
            Self::ObjectId { oid } => oid,
        }
    }
}

#[derive(Debug, Deserialize)]
struct ManifestRecord {
    #[serde(alias = "_id")]
    id: RecordId,
    #[serde(alias = "fileURL", alias = "location")]
    file_url: String,
}

/// Record store backed by a JSON-lines export of the document collection.
///
/// Each line holds one record: `{"_id": "...", "fileURL": "..."}`, where `_id`
/// may also be an extended JSON object id (`{"$oid": "..."}`).
#[derive(Debug, Clone)]
pub struct ManifestRecordSource {
    path: PathBuf,
}

impl ManifestRecordSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl RecordSource for ManifestRecordSource {
    async fn scan(&self) -> Result<Vec<SourceItem>, IngestError> {
        let raw = tokio::fs::read_to_string(&self.path).await?;
        let items = parse_manifest(&raw)?;
        info!(manifest = %self.path.display(), records = items.len(), "scanned record manifest");
        Ok(items)
    }
}

fn parse_manifest(raw: &str) -> Result<Vec<SourceItem>, IngestError> {
    let mut items = Vec::new();

    for (index, line) in raw.lines().enumerate() {
        let line_no = index + 1;
        if line.trim().is_empty() {
            continue;
        }

        let record: ManifestRecord =
            serde_json::from_str(line).map_err(|error| IngestError::InvalidRecord {
                line: line_no,
                reason: error.to_string(),
            })?;
        let location =
            Location::parse(&record.file_url).map_err(|error| IngestError::InvalidRecord {
                line: line_no,
                reason: error.to_string(),
            })?;

        items.push(SourceItem::new(record.id.into_string(), location));
    }

    Ok(items)
}
