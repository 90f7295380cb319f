//! Stream chunks and FIFO entries.

use crate::error::Result;
use crate::schema::PortSchema;
use serde_json::Value;
use std::sync::Arc;
use std::time::SystemTime;

/// An immutable envelope around one payload on a streaming edge.
///
/// The payload is validated against the schema at construction and is shared
/// by reference across fan-out targets — consumers must clone it before
/// modifying.
#[derive(Debug, Clone)]
pub struct Chunk {
    payload: Arc<Value>,
    schema: PortSchema,
    timestamp: SystemTime,
}

impl Chunk {
    /// Create a chunk, validating the payload against the schema.
    ///
    /// Node and port identify the producing endpoint in validation errors.
    pub fn new(payload: Value, schema: PortSchema, node_id: &str, port: &str) -> Result<Self> {
        schema.validate_for(&payload, node_id, port)?;
        Ok(Self {
            payload: Arc::new(payload),
            schema,
            timestamp: SystemTime::now(),
        })
    }

    /// The payload, shared by reference.
    pub fn payload(&self) -> &Arc<Value> {
        &self.payload
    }

    /// The schema the payload was validated against.
    pub fn schema(&self) -> &PortSchema {
        &self.schema
    }

    /// Creation time of the chunk.
    pub fn timestamp(&self) -> SystemTime {
        self.timestamp
    }
}

/// One entry in a streaming FIFO: a chunk or the end-of-stream marker.
#[derive(Debug, Clone)]
pub enum StreamEntry {
    /// A data chunk, reference-shared across fan-out targets.
    Chunk(Arc<Chunk>),
    /// End of stream. Nothing may follow this on a given FIFO.
    End,
}

impl StreamEntry {
    /// Check whether this entry is the end-of-stream marker.
    pub fn is_end(&self) -> bool {
        matches!(self, Self::End)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::AtomType;
    use serde_json::json;

    #[test]
    fn chunk_validates_payload_on_construction() {
        let schema = PortSchema::streaming_struct([("d", AtomType::String)]);
        let chunk = Chunk::new(json!({"d": "α"}), schema.clone(), "src", "out").unwrap();
        assert_eq!(*chunk.payload().as_ref(), json!({"d": "α"}));

        let err = Chunk::new(json!({"d": 1}), schema, "src", "out").unwrap_err();
        assert_eq!(err.code(), "E201");
        assert!(err.to_string().contains("src.out"));
    }

    #[test]
    fn payload_is_shared_not_copied() {
        let schema = PortSchema::streaming(AtomType::Any);
        let chunk = Arc::new(Chunk::new(json!([1, 2, 3]), schema, "src", "out").unwrap());
        let other = Arc::clone(&chunk);
        assert!(Arc::ptr_eq(chunk.payload(), other.payload()));
    }
}
