//! Wire format: raw payloads and their decoding
//!
//! A graph store answers a batch query with one or two delimited text
//! payloads. [`RawRecordBatch`] holds them untouched; [`WireDecoder`] turns
//! them into column-major [`DecodedColumns`].

pub mod column;
pub mod decoder;

pub use column::{Column, ColumnRole, DecodedColumns, NamedColumn};
pub use decoder::{DecodedBatch, WireDecoder};

use crate::types::PayloadKind;
use bytes::Bytes;

/// Undecoded payload of one batch
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RawRecordBatch {
    /// Vertex records only
    Vertex(Bytes),
    /// Edge records only
    Edge(Bytes),
    /// Vertex half and edge half of the same subgraph
    Graph { vertices: Bytes, edges: Bytes },
}

impl RawRecordBatch {
    /// Payload kind of this batch
    pub fn kind(&self) -> PayloadKind {
        match self {
            RawRecordBatch::Vertex(_) => PayloadKind::Vertex,
            RawRecordBatch::Edge(_) => PayloadKind::Edge,
            RawRecordBatch::Graph { .. } => PayloadKind::Graph,
        }
    }

    /// Build a batch of `kind` from its vertex and edge texts
    ///
    /// Halves the kind does not carry are dropped.
    pub fn from_parts(kind: PayloadKind, vertices: Bytes, edges: Bytes) -> Self {
        match kind {
            PayloadKind::Vertex => RawRecordBatch::Vertex(vertices),
            PayloadKind::Edge => RawRecordBatch::Edge(edges),
            PayloadKind::Graph => RawRecordBatch::Graph { vertices, edges },
        }
    }

    /// Total payload size in bytes
    pub fn byte_len(&self) -> usize {
        match self {
            RawRecordBatch::Vertex(b) | RawRecordBatch::Edge(b) => b.len(),
            RawRecordBatch::Graph { vertices, edges } => vertices.len() + edges.len(),
        }
    }
}
