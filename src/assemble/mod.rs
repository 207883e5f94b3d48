//! Batch assembly
//!
//! Turns a [`DecodedBatch`] into the [`BatchObject`] handed to the consumer:
//! frames (named columns, no remapping) or a tensor-backed graph with a
//! local edge index.

pub mod frame;
pub mod graph;
pub mod tensor;

pub use frame::{Frame, FrameBatch, HeteroFrameBatch};
pub use graph::{EdgeKey, EdgeStore, GraphBatch, HeteroGraphBatch, NodeStore};
pub use tensor::{Feature, Tensor, TensorData};

use crate::error::WireFormatError;
use crate::types::OutputFormat;
use crate::wire::DecodedBatch;
use graph::IndexSpace;
use std::collections::BTreeMap;

/// One assembled batch
#[derive(Debug, Clone, PartialEq)]
pub enum BatchObject {
    Frames(FrameBatch),
    HeteroFrames(HeteroFrameBatch),
    Graph(GraphBatch),
    HeteroGraph(HeteroGraphBatch),
}

impl BatchObject {
    pub fn as_graph(&self) -> Option<&GraphBatch> {
        match self {
            BatchObject::Graph(g) => Some(g),
            _ => None,
        }
    }

    pub fn as_frames(&self) -> Option<&FrameBatch> {
        match self {
            BatchObject::Frames(f) => Some(f),
            _ => None,
        }
    }

    pub fn as_hetero_graph(&self) -> Option<&HeteroGraphBatch> {
        match self {
            BatchObject::HeteroGraph(g) => Some(g),
            _ => None,
        }
    }

    pub fn as_hetero_frames(&self) -> Option<&HeteroFrameBatch> {
        match self {
            BatchObject::HeteroFrames(f) => Some(f),
            _ => None,
        }
    }

    /// Total number of vertices across types
    pub fn num_vertices(&self) -> usize {
        match self {
            BatchObject::Frames(f) => f.vertices.as_ref().map_or(0, Frame::num_rows),
            BatchObject::HeteroFrames(f) => f.vertices.values().map(Frame::num_rows).sum(),
            BatchObject::Graph(g) => g.num_nodes(),
            BatchObject::HeteroGraph(g) => g.nodes.values().map(NodeStore::num_nodes).sum(),
        }
    }

    /// Total number of edges across types
    pub fn num_edges(&self) -> usize {
        match self {
            BatchObject::Frames(f) => f.edges.as_ref().map_or(0, Frame::num_rows),
            BatchObject::HeteroFrames(f) => f.edges.values().map(Frame::num_rows).sum(),
            BatchObject::Graph(g) => g.num_edges(),
            BatchObject::HeteroGraph(g) => g.edges.values().map(EdgeStore::num_edges).sum(),
        }
    }
}

/// Builds [`BatchObject`]s in the configured output format
#[derive(Debug, Clone)]
pub struct BatchAssembler {
    format: OutputFormat,
    /// Edge type -> (source vertex type, target vertex type)
    endpoints: BTreeMap<String, (String, String)>,
    /// Append an `i -> i` edge for every node of graph output
    self_loops: bool,
}

impl BatchAssembler {
    pub fn new(format: OutputFormat) -> Self {
        Self {
            format,
            endpoints: BTreeMap::new(),
            self_loops: false,
        }
    }

    /// Add one self loop per node to graph output
    ///
    /// Loops come after the sampled edges; their edge attributes are zero,
    /// `false` or empty text. Heterogeneous graphs get loops on edge types
    /// whose source and target types match.
    pub fn with_self_loops(mut self, self_loops: bool) -> Self {
        self.self_loops = self_loops;
        self
    }

    /// Endpoint types of heterogeneous edge types
    pub fn with_endpoints(mut self, endpoints: BTreeMap<String, (String, String)>) -> Self {
        self.endpoints = endpoints;
        self
    }

    pub fn format(&self) -> OutputFormat {
        self.format
    }

    /// Assemble one decoded batch
    pub fn assemble(&self, decoded: DecodedBatch) -> Result<BatchObject, WireFormatError> {
        match (self.format, decoded) {
            (OutputFormat::Frames, DecodedBatch::Homogeneous { vertices, edges }) => {
                Ok(BatchObject::Frames(FrameBatch {
                    vertices: vertices.map(Frame::from),
                    edges: edges.map(Frame::from),
                }))
            }
            (OutputFormat::Frames, DecodedBatch::Heterogeneous { vertices, edges }) => {
                Ok(BatchObject::HeteroFrames(HeteroFrameBatch {
                    vertices: vertices.into_iter().map(|(k, v)| (k, v.into())).collect(),
                    edges: edges.into_iter().map(|(k, v)| (k, v.into())).collect(),
                }))
            }
            (OutputFormat::Graph, DecodedBatch::Homogeneous { vertices, edges }) => {
                let (nodes, mut space) = match &vertices {
                    Some(v) => {
                        let (nodes, space) = graph::build_nodes(v);
                        (Some(nodes), space)
                    }
                    None => (None, IndexSpace::default()),
                };
                let mut edges = match &edges {
                    Some(e) => graph::build_edges_in(e, &mut space)?,
                    None => EdgeStore::default(),
                };
                let nodes = nodes.unwrap_or_else(|| graph::discovered_nodes(space));
                if self.self_loops {
                    edges.add_self_loops(nodes.num_nodes());
                }
                Ok(BatchObject::Graph(GraphBatch { nodes, edges }))
            }
            (OutputFormat::Graph, DecodedBatch::Heterogeneous { vertices, edges }) => {
                self.assemble_hetero_graph(vertices, edges)
            }
        }
    }

    fn assemble_hetero_graph(
        &self,
        vertices: BTreeMap<String, crate::wire::DecodedColumns>,
        edges: BTreeMap<String, crate::wire::DecodedColumns>,
    ) -> Result<BatchObject, WireFormatError> {
        let mut nodes = BTreeMap::new();
        let mut spaces: BTreeMap<String, IndexSpace> = BTreeMap::new();
        for (type_name, table) in &vertices {
            let (store, space) = graph::build_nodes(table);
            nodes.insert(type_name.clone(), store);
            spaces.insert(type_name.clone(), space);
        }

        let mut out_edges = BTreeMap::new();
        for (relation, table) in &edges {
            let (src, dst) = self.endpoints.get(relation).cloned().ok_or_else(|| {
                WireFormatError::UnknownRelation {
                    type_name: relation.clone(),
                }
            })?;

            let store = if src == dst {
                let space = spaces.entry(src.clone()).or_default();
                graph::build_edges_in(table, space)?
            } else {
                let mut s = spaces.remove(&src).unwrap_or_default();
                let mut d = spaces.remove(&dst).unwrap_or_default();
                let result = graph::build_edges_between(table, &mut s, &mut d);
                spaces.insert(src.clone(), s);
                spaces.insert(dst.clone(), d);
                result?
            };
            out_edges.insert(
                EdgeKey {
                    source: src,
                    relation: relation.clone(),
                    target: dst,
                },
                store,
            );
        }

        // Vertex types seen only through edges
        for (type_name, space) in spaces {
            nodes
                .entry(type_name)
                .or_insert_with(|| graph::discovered_nodes(space));
        }

        if self.self_loops {
            for (key, store) in out_edges.iter_mut() {
                if key.source == key.target {
                    let n = nodes.get(&key.source).map_or(0, NodeStore::num_nodes);
                    store.add_self_loops(n);
                }
            }
        }

        Ok(BatchObject::HeteroGraph(HeteroGraphBatch {
            nodes,
            edges: out_edges,
        }))
    }
}
