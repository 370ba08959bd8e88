//! Payload schema for Qdrant points

use qdrant_client::qdrant::value::Kind;
use qdrant_client::qdrant::{PointStruct, Value as QdrantValue};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashMap;
use uuid::Uuid;

/// A point ready to be upserted to Qdrant
#[derive(Debug, Clone)]
pub struct ChunkPoint {
    pub id: Uuid,
    pub vector: Vec<f32>,
    pub payload: ChunkPayload,
}

impl ChunkPoint {
    /// Stable point id derived from the chunk hash
    pub fn point_id(chunk_hash: &str) -> Uuid {
        Uuid::new_v5(&Uuid::NAMESPACE_OID, chunk_hash.as_bytes())
    }

    /// Convert to qdrant-client PointStruct
    pub fn to_point_struct(self) -> PointStruct {
        let payload_map = self.payload.to_qdrant_payload();
        PointStruct::new(self.id.to_string(), self.vector, payload_map)
    }
}

/// Payload stored with each chunk in Qdrant
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChunkPayload {
    /// Document name (`<file stem>_<page>`)
    pub doc_name: String,

    /// Locator the document was read from
    pub doc_uri: String,

    /// 1-based page number
    pub page: i64,

    /// Chunk index within the page
    pub chunk_index: i64,

    /// Hash of the chunk content
    pub chunk_hash: String,

    /// The chunk text itself
    pub content: String,

    /// When this chunk was last written
    pub updated_at: String,
}

impl ChunkPayload {
    /// Convert to Qdrant payload format
    pub fn to_qdrant_payload(self) -> HashMap<String, QdrantValue> {
        let mut map = HashMap::new();

        map.insert("doc_name".to_string(), string_to_qdrant(self.doc_name));
        map.insert("doc_uri".to_string(), string_to_qdrant(self.doc_uri));
        map.insert("page".to_string(), int_to_qdrant(self.page));
        map.insert("chunk_index".to_string(), int_to_qdrant(self.chunk_index));
        map.insert("chunk_hash".to_string(), string_to_qdrant(self.chunk_hash));
        map.insert("content".to_string(), string_to_qdrant(self.content));
        map.insert("updated_at".to_string(), string_to_qdrant(self.updated_at));

        map
    }

    /// Rebuild from a JSON map; missing fields fall back to defaults
    pub fn from_json_map(map: &Map<String, Value>) -> Self {
        let text = |key: &str| {
            map.get(key)
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string()
        };
        let int = |key: &str| map.get(key).and_then(Value::as_i64).unwrap_or_default();

        Self {
            doc_name: text("doc_name"),
            doc_uri: text("doc_uri"),
            page: int("page"),
            chunk_index: int("chunk_index"),
            chunk_hash: text("chunk_hash"),
            content: text("content"),
            updated_at: text("updated_at"),
        }
    }
}

fn string_to_qdrant(s: String) -> QdrantValue {
    QdrantValue {
        kind: Some(Kind::StringValue(s)),
    }
}

fn int_to_qdrant(i: i64) -> QdrantValue {
    QdrantValue {
        kind: Some(Kind::IntegerValue(i)),
    }
}

/// Convert Qdrant value to serde_json Value
pub fn json_from_qdrant_value(v: QdrantValue) -> Value {
    match v.kind {
        Some(Kind::NullValue(_)) => Value::Null,
        Some(Kind::BoolValue(b)) => Value::Bool(b),
        Some(Kind::IntegerValue(i)) => Value::Number(i.into()),
        Some(Kind::DoubleValue(d)) => serde_json::Number::from_f64(d)
            .map(Value::Number)
            .unwrap_or(Value::Null),
        Some(Kind::StringValue(s)) => Value::String(s),
        Some(Kind::ListValue(list)) => Value::Array(
            list.values
                .into_iter()
                .map(json_from_qdrant_value)
                .collect(),
        ),
        Some(Kind::StructValue(s)) => Value::Object(
            s.fields
                .into_iter()
                .map(|(k, v)| (k, json_from_qdrant_value(v)))
                .collect(),
        ),
        None => Value::Null,
    }
}
