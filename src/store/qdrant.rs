//! Qdrant [`VectorStore`] over gRPC with the `qdrant-client` crate.
//!
//! Each chunk becomes one point with a cosine-distance vector and a payload
//! holding the chunk text and metadata, the embedder identity, and the
//! insertion sequence number used for tie-breaking.
//!
//! Qdrant orders equal scores by its own internal order, so a search asks
//! for [`TIE_SLACK`] more points than needed and re-ranks them locally.
//! Ties that run past that window are still decided by Qdrant.

use std::collections::HashMap;

use anyhow::Result;
use async_trait::async_trait;
use qdrant_client::qdrant::value::Kind;
use qdrant_client::qdrant::{
    CountPointsBuilder, CreateCollectionBuilder, Distance, PointStruct, ScoredPoint,
    SearchPointsBuilder, UpsertPointsBuilder, Value as QdrantValue, VectorParamsBuilder,
};
use qdrant_client::{Payload, Qdrant, QdrantError};
use serde_json::{json, Value};
use sha2::{Digest, Sha256};
use tracing::debug;
use uuid::Uuid;

use crate::config::VectorStoreConfig;
use crate::embedding::EmbedderIdentity;
use crate::error::ServiceError;
use crate::models::{Chunk, IndexEntry, ScoredChunk};

use super::{rank, VectorStore};

const SERVICE: &str = "qdrant";

/// Extra points fetched per search so equal scores at the cut-off are
/// ranked by insertion order.
pub const TIE_SLACK: usize = 16;

pub struct QdrantStore {
    client: Qdrant,
}

impl QdrantStore {
    pub fn new(config: &VectorStoreConfig) -> Result<Self> {
        let client = Qdrant::from_url(&config.url())
            .timeout(config.timeout())
            .build()?;
        Ok(Self { client })
    }

    /// Wrap an already configured client.
    pub fn from_client(client: Qdrant) -> Self {
        Self { client }
    }
}

/// Classify a client error. Rejected requests keep their gRPC status.
fn service_error(err: QdrantError) -> ServiceError {
    match err {
        QdrantError::ResponseError { status, .. } => {
            grpc_error(status.code() as i32, status.message().to_string())
        }
        other => ServiceError::Transport {
            service: SERVICE.to_string(),
            message: other.to_string(),
        },
    }
}

/// Map a gRPC status code onto the HTTP-style classes `ServiceError` uses.
fn grpc_error(code: i32, message: String) -> ServiceError {
    let status = match code {
        4 => {
            return ServiceError::Timeout {
                service: SERVICE.to_string(),
            }
        }
        14 => {
            return ServiceError::Transport {
                service: SERVICE.to_string(),
                message,
            }
        }
        3 | 9 | 11 => 400,
        16 => 401,
        7 => 403,
        5 => 404,
        6 | 10 => 409,
        8 => 429,
        12 => 501,
        _ => 500,
    };
    ServiceError::Status {
        service: SERVICE.to_string(),
        status,
        body: message,
    }
}

/// Number of points to request for a search returning `limit` hits.
fn fetch_limit(limit: usize) -> u64 {
    limit.saturating_add(TIE_SLACK) as u64
}

/// Deterministic point ID from a chunk's location and content hash.
fn point_id(chunk: &Chunk) -> String {
    let mut hasher = Sha256::new();
    hasher.update(chunk.source_path.as_bytes());
    hasher.update(chunk.page_index.to_le_bytes());
    hasher.update(chunk.chunk_index.to_le_bytes());
    hasher.update(chunk.hash.as_bytes());
    let digest = hasher.finalize();
    let mut bytes = [0u8; 16];
    bytes.copy_from_slice(&digest[..16]);
    Uuid::from_bytes(bytes).to_string()
}

fn to_point(
    entry: &IndexEntry,
    seq: usize,
    embedder: &EmbedderIdentity,
) -> Result<PointStruct, ServiceError> {
    let payload = Payload::try_from(json!({
        "chunk": entry.chunk,
        "seq": seq,
        "embedder": embedder,
    }))
    .map_err(|e| ServiceError::invalid(SERVICE, format!("bad payload: {}", e)))?;
    Ok(PointStruct::new(
        point_id(&entry.chunk),
        entry.vector.clone(),
        payload,
    ))
}

/// Convert a payload value back into JSON.
fn to_json(value: &QdrantValue) -> Value {
    match &value.kind {
        Some(Kind::BoolValue(b)) => json!(b),
        Some(Kind::IntegerValue(i)) => json!(i),
        Some(Kind::DoubleValue(d)) => json!(d),
        Some(Kind::StringValue(s)) => json!(s),
        Some(Kind::ListValue(list)) => Value::Array(list.values.iter().map(to_json).collect()),
        Some(Kind::StructValue(st)) => Value::Object(
            st.fields
                .iter()
                .map(|(k, v)| (k.clone(), to_json(v)))
                .collect(),
        ),
        Some(Kind::NullValue(_)) | None => Value::Null,
    }
}

fn from_hit(
    score: f32,
    payload: &HashMap<String, QdrantValue>,
) -> Result<(ScoredChunk, usize), ServiceError> {
    let chunk = payload
        .get("chunk")
        .ok_or_else(|| ServiceError::invalid(SERVICE, "search hit without chunk payload"))?;
    let chunk: Chunk = serde_json::from_value(to_json(chunk))
        .map_err(|e| ServiceError::invalid(SERVICE, format!("bad chunk payload: {}", e)))?;
    let seq = match payload.get("seq").and_then(|v| v.kind.as_ref()) {
        Some(Kind::IntegerValue(seq)) => usize::try_from(*seq).unwrap_or(usize::MAX),
        _ => usize::MAX,
    };
    Ok((ScoredChunk { chunk, score }, seq))
}

fn from_scored_point(point: &ScoredPoint) -> Result<(ScoredChunk, usize), ServiceError> {
    from_hit(point.score, &point.payload)
}

#[async_trait]
impl VectorStore for QdrantStore {
    fn backend_name(&self) -> &str {
        SERVICE
    }

    async fn collection_exists(&self, collection: &str) -> Result<bool, ServiceError> {
        self.client
            .collection_exists(collection)
            .await
            .map_err(service_error)
    }

    async fn create_collection(&self, collection: &str, dims: usize) -> Result<(), ServiceError> {
        self.client
            .create_collection(
                CreateCollectionBuilder::new(collection)
                    .vectors_config(VectorParamsBuilder::new(dims as u64, Distance::Cosine)),
            )
            .await
            .map_err(service_error)?;
        debug!(collection, dims, "created qdrant collection");
        Ok(())
    }

    async fn delete_collection(&self, collection: &str) -> Result<(), ServiceError> {
        self.client
            .delete_collection(collection)
            .await
            .map_err(service_error)?;
        debug!(collection, "deleted qdrant collection");
        Ok(())
    }

    async fn upsert(
        &self,
        collection: &str,
        entries: &[IndexEntry],
        first_seq: usize,
        embedder: &EmbedderIdentity,
    ) -> Result<(), ServiceError> {
        if entries.is_empty() {
            return Ok(());
        }
        let points = entries
            .iter()
            .enumerate()
            .map(|(offset, entry)| to_point(entry, first_seq + offset, embedder))
            .collect::<Result<Vec<_>, _>>()?;
        self.client
            .upsert_points(UpsertPointsBuilder::new(collection, points).wait(true))
            .await
            .map_err(service_error)?;
        debug!(collection, count = entries.len(), "upserted points");
        Ok(())
    }

    async fn search(
        &self,
        collection: &str,
        query_vec: &[f32],
        limit: usize,
    ) -> Result<Vec<ScoredChunk>, ServiceError> {
        let response = self
            .client
            .search_points(
                SearchPointsBuilder::new(collection, query_vec.to_vec(), fetch_limit(limit))
                    .with_payload(true),
            )
            .await
            .map_err(service_error)?;
        let hits = response
            .result
            .iter()
            .map(from_scored_point)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rank(hits, limit))
    }

    async fn count(&self, collection: &str) -> Result<usize, ServiceError> {
        let response = self
            .client
            .count(CountPointsBuilder::new(collection).exact(true))
            .await
            .map_err(service_error)?;
        response
            .result
            .map(|r| r.count as usize)
            .ok_or_else(|| ServiceError::invalid(SERVICE, "count response without result"))
    }
}
