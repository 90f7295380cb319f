//! Connections between node ports and the routing fabric.
//!
//! Edges are stored as endpoint id pairs in a registry — never as direct
//! pointers between nodes — so cyclic streaming graphs create no ownership
//! cycles. The manager keeps four indices: by source endpoint, by
//! destination endpoint, and the streaming / value classification lists.

use crate::chunk::{Chunk, StreamEntry};
use crate::error::{Result, WeftError};
use crate::schema::{PortKind, PortSchema};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tokio::sync::mpsc;

/// One side of a connection: `(node, port)`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Endpoint {
    /// Node id.
    pub node: String,
    /// Port name.
    pub port: String,
}

impl Endpoint {
    /// Create an endpoint.
    pub fn new(node: impl Into<String>, port: impl Into<String>) -> Self {
        Self {
            node: node.into(),
            port: port.into(),
        }
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.node, self.port)
    }
}

/// Classification of an edge by its endpoint kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EdgeKind {
    /// Both endpoints are streaming ports.
    Streaming,
    /// Both endpoints are value ports.
    Value,
}

/// A directed edge between two port endpoints.
#[derive(Debug, Clone)]
pub struct Connection {
    /// Source endpoint (an output port).
    pub source: Endpoint,
    /// Target endpoint (an input port).
    pub target: Endpoint,
    /// Streaming or value edge.
    pub kind: EdgeKind,
    /// Schema of the source port.
    pub source_schema: PortSchema,
    /// Schema of the target port.
    pub target_schema: PortSchema,
}

impl Connection {
    /// Create an edge, validating kind and schema compatibility.
    ///
    /// Mixed streaming/value endpoints are illegal, and endpoint schemas
    /// must be structurally equal. Mismatch errors carry both schemas
    /// rendered verbatim.
    pub fn new(
        source: Endpoint,
        target: Endpoint,
        source_schema: PortSchema,
        target_schema: PortSchema,
    ) -> Result<Self> {
        if source_schema.kind != target_schema.kind {
            return Err(WeftError::KindMismatch {
                source_endpoint: source.to_string(),
                target_endpoint: target.to_string(),
                source_kind: source_schema.kind.to_string(),
                target_kind: target_schema.kind.to_string(),
            });
        }
        if !source_schema.matches(&target_schema) {
            return Err(WeftError::SchemaMismatch {
                source_endpoint: source.to_string(),
                target_endpoint: target.to_string(),
                source_schema: source_schema.to_string(),
                target_schema: target_schema.to_string(),
            });
        }
        let kind = match source_schema.kind {
            PortKind::Streaming => EdgeKind::Streaming,
            PortKind::Value => EdgeKind::Value,
        };
        Ok(Self {
            source,
            target,
            kind,
            source_schema,
            target_schema,
        })
    }

    /// Check whether this is a streaming edge.
    pub fn is_streaming(&self) -> bool {
        self.kind == EdgeKind::Streaming
    }
}

impl fmt::Display for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} -> {}", self.source, self.target)
    }
}

/// Registry of edges with routing indices and streaming sinks.
#[derive(Debug, Default)]
pub struct ConnectionManager {
    connections: Vec<Connection>,
    streaming: Vec<usize>,
    value: Vec<usize>,
    by_source: HashMap<Endpoint, Vec<usize>>,
    by_target: HashMap<Endpoint, Vec<usize>>,
    /// Destination FIFO senders, bound once FIFOs are allocated.
    sinks: RwLock<HashMap<Endpoint, mpsc::Sender<StreamEntry>>>,
}

impl ConnectionManager {
    /// Create an empty manager.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an edge, maintaining all indices.
    pub fn add(&mut self, conn: Connection) {
        let idx = self.connections.len();
        match conn.kind {
            EdgeKind::Streaming => self.streaming.push(idx),
            EdgeKind::Value => self.value.push(idx),
        }
        self.by_source
            .entry(conn.source.clone())
            .or_default()
            .push(idx);
        self.by_target
            .entry(conn.target.clone())
            .or_default()
            .push(idx);
        self.connections.push(conn);
    }

    /// All edges, in insertion order.
    pub fn all(&self) -> &[Connection] {
        &self.connections
    }

    /// All streaming edges, in insertion order.
    pub fn streaming_edges(&self) -> impl Iterator<Item = &Connection> {
        self.streaming.iter().map(|&i| &self.connections[i])
    }

    /// All value edges, in insertion order.
    pub fn value_edges(&self) -> impl Iterator<Item = &Connection> {
        self.value.iter().map(|&i| &self.connections[i])
    }

    /// Edges leaving a source endpoint.
    pub fn edges_from(&self, source: &Endpoint) -> impl Iterator<Item = &Connection> {
        self.by_source
            .get(source)
            .into_iter()
            .flat_map(|indices| indices.iter().map(|&i| &self.connections[i]))
    }

    /// Edges feeding a destination endpoint — `who feeds this port?` in O(1).
    pub fn edges_into(&self, target: &Endpoint) -> impl Iterator<Item = &Connection> {
        self.by_target
            .get(target)
            .into_iter()
            .flat_map(|indices| indices.iter().map(|&i| &self.connections[i]))
    }

    /// Bind a destination port's FIFO sender as the sink for its edges.
    pub fn bind_sink(&self, target: Endpoint, sender: mpsc::Sender<StreamEntry>) {
        self.sinks.write().insert(target, sender);
    }

    /// Drop all bound sinks (shutdown).
    pub fn clear_sinks(&self) {
        self.sinks.write().clear();
    }

    /// Fan a chunk out to every streaming edge leaving the source endpoint.
    ///
    /// One enqueue per sink per chunk; the chunk itself is reference-shared.
    /// A sink whose consumer is gone is skipped.
    pub async fn route_chunk(&self, node: &str, port: &str, chunk: Arc<Chunk>) -> Result<()> {
        let sinks = self.streaming_sinks_from(node, port);
        for (target, sender) in sinks {
            if sender.send(StreamEntry::Chunk(Arc::clone(&chunk))).await.is_err() {
                tracing::debug!(sink = %target, "dropping chunk: consumer gone");
            }
        }
        Ok(())
    }

    /// Deliver end-of-stream to every streaming edge leaving the source.
    pub async fn route_end(&self, node: &str, port: &str) -> Result<()> {
        let sinks = self.streaming_sinks_from(node, port);
        for (target, sender) in sinks {
            if sender.send(StreamEntry::End).await.is_err() {
                tracing::debug!(sink = %target, "dropping EOS: consumer gone");
            }
        }
        Ok(())
    }

    fn streaming_sinks_from(
        &self,
        node: &str,
        port: &str,
    ) -> Vec<(Endpoint, mpsc::Sender<StreamEntry>)> {
        let source = Endpoint::new(node, port);
        let sinks = self.sinks.read();
        self.edges_from(&source)
            .filter(|c| c.is_streaming())
            .filter_map(|c| {
                sinks
                    .get(&c.target)
                    .map(|s| (c.target.clone(), s.clone()))
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::AtomType;
    use serde_json::json;

    fn streaming_schema() -> PortSchema {
        PortSchema::streaming_struct([("d", AtomType::String)])
    }

    fn edge(src: &str, sport: &str, dst: &str, dport: &str, schema: PortSchema) -> Connection {
        Connection::new(
            Endpoint::new(src, sport),
            Endpoint::new(dst, dport),
            schema.clone(),
            schema,
        )
        .unwrap()
    }

    #[test]
    fn kind_mismatch_is_rejected() {
        let err = Connection::new(
            Endpoint::new("a", "out"),
            Endpoint::new("b", "in"),
            PortSchema::streaming(AtomType::String),
            PortSchema::value(AtomType::String),
        )
        .unwrap_err();
        assert_eq!(err.code(), "E106");
    }

    #[test]
    fn schema_mismatch_message_contains_both_schemas() {
        let source = PortSchema::value_struct([("v", AtomType::Integer)]);
        let target = PortSchema::value_struct([("v", AtomType::String)]);
        let err = Connection::new(
            Endpoint::new("a", "out"),
            Endpoint::new("b", "in"),
            source.clone(),
            target.clone(),
        )
        .unwrap_err();
        assert_eq!(err.code(), "E107");
        let msg = err.to_string();
        assert!(msg.contains(&source.to_string()));
        assert!(msg.contains(&target.to_string()));
    }

    #[test]
    fn classification_and_indices() {
        let mut cm = ConnectionManager::new();
        cm.add(edge("src", "out", "x", "in", streaming_schema()));
        cm.add(edge("src", "out", "y", "in", streaming_schema()));
        cm.add(edge(
            "a",
            "out",
            "b",
            "in",
            PortSchema::value(AtomType::Integer),
        ));

        assert_eq!(cm.streaming_edges().count(), 2);
        assert_eq!(cm.value_edges().count(), 1);
        assert_eq!(cm.edges_from(&Endpoint::new("src", "out")).count(), 2);
        assert_eq!(cm.edges_into(&Endpoint::new("y", "in")).count(), 1);
        assert_eq!(cm.edges_into(&Endpoint::new("nobody", "in")).count(), 0);
    }

    #[tokio::test]
    async fn route_chunk_fans_out_shared_references() {
        let mut cm = ConnectionManager::new();
        cm.add(edge("src", "out", "x", "in", streaming_schema()));
        cm.add(edge("src", "out", "y", "in", streaming_schema()));

        let (tx_x, mut rx_x) = mpsc::channel(8);
        let (tx_y, mut rx_y) = mpsc::channel(8);
        cm.bind_sink(Endpoint::new("x", "in"), tx_x);
        cm.bind_sink(Endpoint::new("y", "in"), tx_y);

        let chunk = Arc::new(
            Chunk::new(json!({"d": "α"}), streaming_schema(), "src", "out").unwrap(),
        );
        cm.route_chunk("src", "out", Arc::clone(&chunk)).await.unwrap();
        cm.route_end("src", "out").await.unwrap();

        match rx_x.recv().await.unwrap() {
            StreamEntry::Chunk(c) => assert!(Arc::ptr_eq(c.payload(), chunk.payload())),
            StreamEntry::End => panic!("expected chunk"),
        }
        assert!(rx_x.recv().await.unwrap().is_end());

        match rx_y.recv().await.unwrap() {
            StreamEntry::Chunk(c) => assert!(Arc::ptr_eq(c.payload(), chunk.payload())),
            StreamEntry::End => panic!("expected chunk"),
        }
        assert!(rx_y.recv().await.unwrap().is_end());
    }

    #[tokio::test]
    async fn routing_skips_gone_consumers() {
        let mut cm = ConnectionManager::new();
        cm.add(edge("src", "out", "x", "in", streaming_schema()));

        let (tx, rx) = mpsc::channel(1);
        drop(rx);
        cm.bind_sink(Endpoint::new("x", "in"), tx);

        let chunk = Arc::new(
            Chunk::new(json!({"d": "β"}), streaming_schema(), "src", "out").unwrap(),
        );
        assert!(cm.route_chunk("src", "out", chunk).await.is_ok());
    }
}
