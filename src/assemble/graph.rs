//! Tensor-backed graph output
//!
//! Vertices get dense local indices: seeds first in payload order, then the
//! remaining vertices in payload order. A vertex id that appears on several
//! records keeps its first record and counts as a seed when any of them is
//! one. Edge endpoints are rewritten through that mapping into a `[2, E]` edge
//! index.

use super::tensor::{Feature, Tensor, TensorData};
use crate::error::WireFormatError;
use crate::schema::validator::AttributeRole;
use crate::types::IS_SEED_COLUMN;
use crate::wire::{Column, DecodedColumns};
use std::collections::{BTreeMap, HashMap};

/// Feature name of stacked node inputs
pub const NODE_FEATURES: &str = "x";
/// Feature name of node targets
pub const NODE_LABELS: &str = "y";
/// Feature name of stacked edge inputs
pub const EDGE_FEATURES: &str = "edge_feat";
/// Feature name of edge targets
pub const EDGE_LABELS: &str = "edge_label";

/// Nodes of one vertex type
#[derive(Debug, Clone, PartialEq, Default)]
pub struct NodeStore {
    /// Global vertex id of every local index
    pub vertex_ids: Vec<String>,
    pub features: BTreeMap<String, Feature>,
}

impl NodeStore {
    pub fn num_nodes(&self) -> usize {
        self.vertex_ids.len()
    }

    /// Seed marker per local index, when vertices were fetched
    pub fn is_seed(&self) -> Option<&[bool]> {
        self.features.get(IS_SEED_COLUMN)?.as_tensor()?.as_bool()
    }
}

/// Edges of one edge type
#[derive(Debug, Clone, PartialEq)]
pub struct EdgeStore {
    /// `[2, E]` local indices: row 0 sources, row 1 targets
    pub edge_index: Tensor,
    pub features: BTreeMap<String, Feature>,
}

impl EdgeStore {
    pub fn num_edges(&self) -> usize {
        self.edge_index.shape().get(1).copied().unwrap_or(0)
    }

    /// Sources row of the edge index
    pub fn sources(&self) -> &[i64] {
        let data = self.edge_index.as_i64().unwrap_or(&[]);
        &data[..data.len() / 2]
    }

    /// Targets row of the edge index
    pub fn targets(&self) -> &[i64] {
        let data = self.edge_index.as_i64().unwrap_or(&[]);
        &data[data.len() / 2..]
    }

    /// Append `i -> i` for every local index below `num_nodes`
    pub(crate) fn add_self_loops(&mut self, num_nodes: usize) {
        let total = self.num_edges() + num_nodes;
        let loops = 0..num_nodes as i64;
        let mut index = Vec::with_capacity(2 * total);
        index.extend_from_slice(self.sources());
        index.extend(loops.clone());
        index.extend_from_slice(self.targets());
        index.extend(loops);
        self.edge_index = Tensor::new(vec![2, total], TensorData::Int(index));
        for feature in self.features.values_mut() {
            feature.pad_rows(num_nodes);
        }
    }
}

impl Default for EdgeStore {
    fn default() -> Self {
        Self {
            edge_index: Tensor::empty_int(vec![2, 0]),
            features: BTreeMap::new(),
        }
    }
}

/// Homogeneous graph batch
#[derive(Debug, Clone, PartialEq, Default)]
pub struct GraphBatch {
    pub nodes: NodeStore,
    pub edges: EdgeStore,
}

impl GraphBatch {
    pub fn num_nodes(&self) -> usize {
        self.nodes.num_nodes()
    }

    pub fn num_edges(&self) -> usize {
        self.edges.num_edges()
    }

    pub fn edge_index(&self) -> &Tensor {
        &self.edges.edge_index
    }

    /// Node feature by name, falling back to edge features
    pub fn get(&self, name: &str) -> Option<&Feature> {
        self.nodes
            .features
            .get(name)
            .or_else(|| self.edges.features.get(name))
    }

    /// Tensor feature by name
    pub fn tensor(&self, name: &str) -> Option<&Tensor> {
        self.get(name)?.as_tensor()
    }

    pub fn is_seed(&self) -> Option<&[bool]> {
        self.nodes.is_seed()
    }
}

/// Edge type key: (source type, relation, target type)
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct EdgeKey {
    pub source: String,
    pub relation: String,
    pub target: String,
}

/// Heterogeneous graph batch, one index space per vertex type
#[derive(Debug, Clone, PartialEq, Default)]
pub struct HeteroGraphBatch {
    pub nodes: BTreeMap<String, NodeStore>,
    pub edges: BTreeMap<EdgeKey, EdgeStore>,
}

impl HeteroGraphBatch {
    /// Edge store by relation name
    pub fn relation(&self, name: &str) -> Option<&EdgeStore> {
        self.edges
            .iter()
            .find(|(k, _)| k.relation == name)
            .map(|(_, v)| v)
    }
}

// ==================== Index spaces ====================

/// Mapping of global vertex ids to local indices for one vertex type
#[derive(Debug, Default)]
pub(crate) struct IndexSpace {
    ids: Vec<String>,
    index: HashMap<String, usize>,
    /// Built from a vertex payload: unknown ids are dangling
    closed: bool,
}

impl IndexSpace {
    fn closed(ids: &[String]) -> Self {
        let mut space = IndexSpace {
            closed: true,
            ..Default::default()
        };
        for id in ids {
            space.insert(id);
        }
        space
    }

    fn insert(&mut self, id: &str) -> usize {
        if let Some(&i) = self.index.get(id) {
            return i;
        }
        let i = self.ids.len();
        self.ids.push(id.to_string());
        self.index.insert(id.to_string(), i);
        i
    }

    fn resolve(&mut self, edge: usize, id: &str) -> Result<i64, WireFormatError> {
        match self.index.get(id) {
            Some(&i) => Ok(i as i64),
            None if self.closed => Err(WireFormatError::DanglingEdge {
                edge,
                vertex_id: id.to_string(),
            }),
            None => Ok(self.insert(id) as i64),
        }
    }
}

/// Local order of a vertex table: one row per distinct id, seeds first
///
/// Returns the rows to keep and, when the table has seed markers, the merged
/// marker of every kept row.
fn seed_first_order(vertices: &DecodedColumns) -> (Vec<usize>, Option<Vec<bool>>) {
    let ids = vertices.identity(0);
    let flags = match vertices.get(IS_SEED_COLUMN) {
        Some(Column::Bool(flags)) => Some(flags.as_slice()),
        _ => None,
    };

    let mut first: HashMap<&str, usize> = HashMap::with_capacity(ids.len());
    let mut rows = Vec::with_capacity(ids.len());
    let mut seeds = Vec::with_capacity(ids.len());
    for (row, id) in ids.iter().enumerate() {
        let seed = flags.is_some_and(|f| f[row]);
        match first.get(id.as_str()) {
            Some(&k) => seeds[k] |= seed,
            None => {
                first.insert(id.as_str(), rows.len());
                rows.push(row);
                seeds.push(seed);
            }
        }
    }

    let order: Vec<usize> = (0..rows.len())
        .filter(|&k| seeds[k])
        .chain((0..rows.len()).filter(|&k| !seeds[k]))
        .collect();
    let merged = flags.map(|_| order.iter().map(|&k| seeds[k]).collect());
    (order.into_iter().map(|k| rows[k]).collect(), merged)
}

/// Build the node store of one vertex table and its index space
pub(crate) fn build_nodes(vertices: &DecodedColumns) -> (NodeStore, IndexSpace) {
    let (order, seeds) = seed_first_order(vertices);
    let mut ordered = vertices.take(&order);
    if let Some(seeds) = seeds {
        if let Some(marker) = ordered.columns.iter_mut().find(|c| c.name == IS_SEED_COLUMN) {
            marker.column = Column::Bool(seeds);
        }
    }
    let ids = ordered.identity(0).to_vec();
    let space = IndexSpace::closed(&ids);
    let features = collect_features(&ordered, NODE_FEATURES, NODE_LABELS);
    (
        NodeStore {
            vertex_ids: ids,
            features,
        },
        space,
    )
}

/// Node store for an index space discovered from edges alone
pub(crate) fn discovered_nodes(space: IndexSpace) -> NodeStore {
    NodeStore {
        vertex_ids: space.ids,
        features: BTreeMap::new(),
    }
}

/// Build the edge store of one edge table, mapping endpoints with `resolve`
fn build_edges(
    edges: &DecodedColumns,
    mut resolve: impl FnMut(usize, &str, &str) -> Result<(i64, i64), WireFormatError>,
) -> Result<EdgeStore, WireFormatError> {
    let sources = edges.identity(0);
    let targets = edges.identity(1);
    let n = edges.num_rows();

    let mut index = vec![0i64; 2 * n];
    for i in 0..n {
        let (s, t) = resolve(i, &sources[i], &targets[i])?;
        index[i] = s;
        index[n + i] = t;
    }

    Ok(EdgeStore {
        edge_index: Tensor::new(vec![2, n], TensorData::Int(index)),
        features: collect_features(edges, EDGE_FEATURES, EDGE_LABELS),
    })
}

/// Remap edges whose endpoints live in one shared index space
pub(crate) fn build_edges_in(
    edges: &DecodedColumns,
    space: &mut IndexSpace,
) -> Result<EdgeStore, WireFormatError> {
    build_edges(edges, |i, s, t| Ok((space.resolve(i, s)?, space.resolve(i, t)?)))
}

/// Remap edges whose endpoints live in two index spaces
pub(crate) fn build_edges_between(
    edges: &DecodedColumns,
    src: &mut IndexSpace,
    dst: &mut IndexSpace,
) -> Result<EdgeStore, WireFormatError> {
    build_edges(edges, |i, s, t| Ok((src.resolve(i, s)?, dst.resolve(i, t)?)))
}

fn collect_features(
    table: &DecodedColumns,
    inputs_name: &str,
    labels_name: &str,
) -> BTreeMap<String, Feature> {
    let rows = table.num_rows();
    let mut features = BTreeMap::new();

    let inputs: Vec<&Column> = table
        .with_role(AttributeRole::InFeature)
        .map(|c| &c.column)
        .collect();
    if !inputs.is_empty() {
        features.insert(
            inputs_name.to_string(),
            Feature::Tensor(Tensor::stack(&inputs, rows)),
        );
    }

    let labels: Vec<&Column> = table
        .with_role(AttributeRole::OutLabel)
        .map(|c| &c.column)
        .collect();
    match labels.as_slice() {
        [] => {}
        [single] if !matches!(single, Column::IntList { .. } | Column::FloatList { .. }) => {
            features.insert(labels_name.to_string(), Feature::from_column(single));
        }
        many => {
            features.insert(
                labels_name.to_string(),
                Feature::Tensor(Tensor::stack(many, rows)),
            );
        }
    }

    for extra in table.with_role(AttributeRole::Extra) {
        features.insert(extra.name.clone(), Feature::from_column(&extra.column));
    }
    features
}
