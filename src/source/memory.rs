//! In-memory graph store
//!
//! Holds a homogeneous graph and answers batch tasks with 1-hop
//! neighborhoods rendered in the wire format. Used to replay datasets
//! without a server and to exercise the pipeline in tests, including
//! latency and failure injection.

use super::{param, GraphStoreClient, Submission, TaskDescriptor, TaskScope};
use crate::error::FetchError;
use crate::types::{FIELD_SEPARATOR, IS_SEED_COLUMN, RECORD_SEPARATOR};
use crate::wire::RawRecordBatch;
use bytes::Bytes;
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tracing::trace;

#[derive(Debug, Clone)]
struct StoredVertex {
    id: String,
    attributes: BTreeMap<String, String>,
}

#[derive(Debug, Clone)]
struct StoredEdge {
    source: usize,
    target: usize,
    attributes: BTreeMap<String, String>,
}

/// Graph store held in memory
#[derive(Debug, Default)]
pub struct InMemoryGraphStore {
    vertices: Vec<StoredVertex>,
    index: HashMap<String, usize>,
    edges: Vec<StoredEdge>,
    /// Edge positions touching each vertex
    incident: Vec<Vec<usize>>,
    latency: Duration,
    failing: HashSet<usize>,
    corrupt: HashSet<usize>,
    calls: AtomicUsize,
}

impl InMemoryGraphStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a vertex, or replace the attributes of an existing one
    pub fn with_vertex<I, K, V>(mut self, id: impl Into<String>, attributes: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: ToString,
    {
        let attributes = attributes
            .into_iter()
            .map(|(k, v)| (k.into(), v.to_string()))
            .collect();
        let i = self.vertex_slot(id.into());
        self.vertices[i].attributes = attributes;
        self
    }

    /// Add an edge; unknown endpoints are added as attribute-less vertices
    pub fn with_edge<I, K, V>(
        mut self,
        source: impl Into<String>,
        target: impl Into<String>,
        attributes: I,
    ) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: ToString,
    {
        let source = self.vertex_slot(source.into());
        let target = self.vertex_slot(target.into());
        let position = self.edges.len();
        self.edges.push(StoredEdge {
            source,
            target,
            attributes: attributes
                .into_iter()
                .map(|(k, v)| (k.into(), v.to_string()))
                .collect(),
        });
        self.incident[source].push(position);
        if target != source {
            self.incident[target].push(position);
        }
        self
    }

    /// Delay every response
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    /// Answer task `batch_index` with a fetch error in every epoch
    pub fn fail_batch(mut self, batch_index: usize) -> Self {
        self.failing.insert(batch_index);
        self
    }

    /// Answer task `batch_index` with a malformed payload in every epoch
    pub fn corrupt_batch(mut self, batch_index: usize) -> Self {
        self.corrupt.insert(batch_index);
        self
    }

    /// Number of tasks served so far
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn num_vertices(&self) -> usize {
        self.vertices.len()
    }

    pub fn num_edges(&self) -> usize {
        self.edges.len()
    }

    fn vertex_slot(&mut self, id: String) -> usize {
        if let Some(&i) = self.index.get(&id) {
            return i;
        }
        let i = self.vertices.len();
        self.index.insert(id.clone(), i);
        self.vertices.push(StoredVertex {
            id,
            attributes: BTreeMap::new(),
        });
        self.incident.push(Vec::new());
        i
    }

    /// Positions of vertices eligible as seeds
    fn candidates(&self, filter_by: Option<&str>) -> Vec<usize> {
        (0..self.vertices.len())
            .filter(|&i| match filter_by {
                Some(attr) => self.vertices[i]
                    .attributes
                    .get(attr)
                    .is_some_and(|v| v == "1" || v.eq_ignore_ascii_case("true")),
                None => true,
            })
            .collect()
    }

    /// Render the payload of one task
    pub fn render(&self, task: &TaskDescriptor) -> Result<RawRecordBatch, FetchError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if !self.latency.is_zero() {
            std::thread::sleep(self.latency);
        }
        if self.failing.contains(&task.batch_index) {
            return Err(FetchError::Remote(format!(
                "injected failure for batch {}",
                task.batch_index
            )));
        }

        let filter_by = task.params.get(param::FILTER_BY).map(String::as_str);
        let candidates = self.candidates(filter_by);

        let (seeds, vertex_set, edge_set): (HashSet<usize>, BTreeSet<usize>, BTreeSet<usize>) =
            match &task.scope {
                TaskScope::WholeGraph => (
                    candidates.into_iter().collect(),
                    (0..self.vertices.len()).collect(),
                    (0..self.edges.len()).collect(),
                ),
                TaskScope::Partition { index, count } => {
                    let seeds: Vec<usize> = candidates
                        .into_iter()
                        .enumerate()
                        .filter(|(pos, _)| *count > 0 && *pos as u64 % count == *index)
                        .map(|(_, v)| v)
                        .collect();
                    self.neighborhood(seeds, task)
                }
                TaskScope::Seeds(ids) => {
                    let mut seeds = Vec::with_capacity(ids.len());
                    for seed in ids {
                        let i = self.index.get(&seed.id).copied().ok_or_else(|| {
                            FetchError::Remote(format!("vertex '{}' does not exist", seed.id))
                        })?;
                        seeds.push(i);
                    }
                    self.neighborhood(seeds, task)
                }
            };

        trace!(
            "Rendering batch {} with {} vertices, {} edges",
            task.batch_index,
            vertex_set.len(),
            edge_set.len()
        );

        let vertex_columns = attribute_list(task, &[
            param::VERTEX_IN_FEATURES,
            param::VERTEX_OUT_LABELS,
            param::VERTEX_EXTRA_FEATURES,
        ]);
        let edge_columns = attribute_list(task, &[
            param::EDGE_IN_FEATURES,
            param::EDGE_OUT_LABELS,
            param::EDGE_EXTRA_FEATURES,
        ]);

        let mut vertices = String::new();
        for &v in &vertex_set {
            let vertex = &self.vertices[v];
            vertices.push_str(&vertex.id);
            for name in &vertex_columns {
                vertices.push(FIELD_SEPARATOR);
                if name == IS_SEED_COLUMN {
                    vertices.push(if seeds.contains(&v) { '1' } else { '0' });
                } else if let Some(value) = vertex.attributes.get(name) {
                    vertices.push_str(value);
                }
            }
            vertices.push(RECORD_SEPARATOR);
        }

        let mut edges = String::new();
        for &e in &edge_set {
            let edge = &self.edges[e];
            edges.push_str(&self.vertices[edge.source].id);
            edges.push(FIELD_SEPARATOR);
            edges.push_str(&self.vertices[edge.target].id);
            for name in &edge_columns {
                edges.push(FIELD_SEPARATOR);
                if let Some(value) = edge.attributes.get(name) {
                    edges.push_str(value);
                }
            }
            edges.push(RECORD_SEPARATOR);
        }

        if self.corrupt.contains(&task.batch_index) {
            let target = if task.payload.has_vertices() {
                &mut vertices
            } else {
                &mut edges
            };
            target.push_str("corrupt");
            target.push(RECORD_SEPARATOR);
        }

        Ok(RawRecordBatch::from_parts(
            task.payload,
            Bytes::from(vertices),
            Bytes::from(edges),
        ))
    }

    /// Seeds, their 1-hop neighborhood, and the edges connecting them
    fn neighborhood(
        &self,
        seeds: Vec<usize>,
        task: &TaskDescriptor,
    ) -> (HashSet<usize>, BTreeSet<usize>, BTreeSet<usize>) {
        let fanout = task
            .params
            .get(param::NUM_NEIGHBORS)
            .and_then(|v| v.parse::<i64>().ok())
            .filter(|n| *n >= 0)
            .map_or(usize::MAX, |n| n as usize);

        let mut vertex_set: BTreeSet<usize> = seeds.iter().copied().collect();
        let mut edge_set = BTreeSet::new();
        for &s in &seeds {
            for &e in self.incident[s].iter().take(fanout) {
                edge_set.insert(e);
                vertex_set.insert(self.edges[e].source);
                vertex_set.insert(self.edges[e].target);
            }
        }
        (seeds.into_iter().collect(), vertex_set, edge_set)
    }
}

/// Attribute names requested by a task, in wire order
fn attribute_list(task: &TaskDescriptor, keys: &[&str]) -> Vec<String> {
    keys.iter()
        .filter_map(|k| task.params.get(*k))
        .flat_map(|v| v.split(param::LIST_SEPARATOR))
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

impl GraphStoreClient for InMemoryGraphStore {
    fn submit_batch_task(&self, task: &TaskDescriptor) -> Result<Submission, FetchError> {
        self.render(task).map(Submission::Ready)
    }

    fn seed_count(&self, filter_by: Option<&str>) -> Result<Option<u64>, FetchError> {
        Ok(Some(self.candidates(filter_by).len() as u64))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::SeedVertex;
    use crate::types::PayloadKind;

    fn store() -> InMemoryGraphStore {
        InMemoryGraphStore::new()
            .with_vertex("1", [("y", "0"), ("train_mask", "1")])
            .with_vertex("2", [("y", "1"), ("train_mask", "0")])
            .with_vertex("3", [("y", "1"), ("train_mask", "1")])
            .with_vertex("4", [("y", "0"), ("train_mask", "0")])
            .with_edge("1", "2", [("w", "0.5")])
            .with_edge("3", "4", [("w", "1.5")])
            .with_edge("4", "1", [("w", "2.5")])
    }

    fn task(scope: TaskScope, payload: PayloadKind) -> TaskDescriptor {
        let mut params = BTreeMap::new();
        params.insert(param::VERTEX_OUT_LABELS.to_string(), "y".to_string());
        params.insert(param::VERTEX_EXTRA_FEATURES.to_string(), "is_seed".to_string());
        params.insert(param::EDGE_IN_FEATURES.to_string(), "w".to_string());
        TaskDescriptor {
            loader_id: "l".to_string(),
            epoch: 0,
            batch_index: 0,
            payload,
            scope,
            params,
        }
    }

    fn halves(raw: RawRecordBatch) -> (String, String) {
        match raw {
            RawRecordBatch::Graph { vertices, edges } => (
                String::from_utf8(vertices.to_vec()).unwrap(),
                String::from_utf8(edges.to_vec()).unwrap(),
            ),
            other => panic!("expected graph payload, got {:?}", other),
        }
    }

    #[test]
    fn test_seed_neighborhood() {
        let s = store();
        let raw = s
            .render(&task(TaskScope::Seeds(vec![SeedVertex::new("1")]), PayloadKind::Graph))
            .unwrap();
        let (vertices, edges) = halves(raw);
        assert_eq!(vertices, "1,0,1\n2,1,0\n4,0,0\n");
        assert_eq!(edges, "1,2,0.5\n4,1,2.5\n");
        assert_eq!(s.calls(), 1);
    }

    #[test]
    fn test_partitions_cover_candidates_once() {
        let s = store();
        let mut t = task(TaskScope::WholeGraph, PayloadKind::Vertex);
        t.params
            .insert(param::FILTER_BY.to_string(), "train_mask".to_string());
        assert_eq!(s.seed_count(Some("train_mask")).unwrap(), Some(2));

        let mut seen = Vec::new();
        for index in 0..2 {
            t.scope = TaskScope::Partition { index, count: 2 };
            let raw = s.render(&t).unwrap();
            let RawRecordBatch::Vertex(bytes) = raw else {
                panic!("expected vertex payload");
            };
            let text = String::from_utf8(bytes.to_vec()).unwrap();
            seen.extend(
                text.lines()
                    .filter(|l| l.ends_with(",1"))
                    .map(|l| l.split(',').next().unwrap().to_string()),
            );
        }
        seen.sort();
        assert_eq!(seen, vec!["1", "3"]);
    }

    #[test]
    fn test_whole_graph_and_fanout() {
        let s = store();
        let (vertices, edges) =
            halves(s.render(&task(TaskScope::WholeGraph, PayloadKind::Graph)).unwrap());
        assert_eq!(vertices.lines().count(), 4);
        assert_eq!(edges.lines().count(), 3);

        let mut t = task(TaskScope::Seeds(vec![SeedVertex::new("1")]), PayloadKind::Graph);
        t.params
            .insert(param::NUM_NEIGHBORS.to_string(), "1".to_string());
        let (_, edges) = halves(s.render(&t).unwrap());
        assert_eq!(edges, "1,2,0.5\n");
    }

    #[test]
    fn test_fault_injection() {
        let s = store().fail_batch(0).corrupt_batch(1);
        let mut t = task(TaskScope::WholeGraph, PayloadKind::Edge);
        assert!(matches!(s.render(&t), Err(FetchError::Remote(_))));

        t.batch_index = 1;
        let RawRecordBatch::Edge(bytes) = s.render(&t).unwrap() else {
            panic!("expected edge payload");
        };
        assert!(bytes.ends_with(b"corrupt\n"));
    }

    #[test]
    fn test_unknown_seed() {
        let err = store()
            .render(&task(TaskScope::Seeds(vec![SeedVertex::new("99")]), PayloadKind::Graph))
            .unwrap_err();
        assert!(matches!(err, FetchError::Remote(_)));
    }
}
