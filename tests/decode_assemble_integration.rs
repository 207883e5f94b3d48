//! Integration tests for declaration -> decode -> assemble
//!
//! Declarations are validated against a catalog exactly as the loader does,
//! then payloads go through the public decoder and assembler.

mod common;

use bytes::Bytes;
use graph_batch_loader::assemble::BatchAssembler;
use graph_batch_loader::error::WireFormatError;
use graph_batch_loader::schema::{
    AttributeDecl, AttributeSpec, AttributeSpecValidator, InMemoryCatalog,
};
use graph_batch_loader::types::{EntityKind, OutputFormat, PayloadKind, PrimitiveType};
use graph_batch_loader::wire::{Column, RawRecordBatch, WireDecoder};
use proptest::prelude::*;
use std::collections::BTreeMap;

fn cora_catalog() -> InMemoryCatalog {
    InMemoryCatalog::new()
        .with_vertex_type(
            "Paper",
            [
                ("x", PrimitiveType::Int),
                ("y", PrimitiveType::Int),
                ("train_mask", PrimitiveType::Bool),
            ],
        )
        .with_edge_type("Cite", "Paper", "Paper", [("time", PrimitiveType::Int)])
}

fn vertex_spec(catalog: &InMemoryCatalog) -> AttributeSpec {
    AttributeSpecValidator::new(catalog, false)
        .resolve(
            EntityKind::Vertex,
            &AttributeDecl::names(["x"]),
            &AttributeDecl::names(["y"]),
            &AttributeDecl::names(["train_mask"]),
        )
        .unwrap()
        .with_seed_marker()
}

fn graph(vertices: &str, edges: &str) -> RawRecordBatch {
    RawRecordBatch::Graph {
        vertices: Bytes::from(vertices.to_string()),
        edges: Bytes::from(edges.to_string()),
    }
}

#[test]
fn test_vertex_scenario_through_validated_spec() {
    let catalog = cora_catalog();
    let decoder = WireDecoder::new(PayloadKind::Vertex, Some(vertex_spec(&catalog)), None);
    let raw = RawRecordBatch::Vertex(Bytes::from_static(
        b"99,1 0 0 1 ,1,0,1\n8,1 0 0 1 ,1,1,1\n",
    ));

    let batch = BatchAssembler::new(OutputFormat::Frames)
        .assemble(decoder.decode(&raw).unwrap())
        .unwrap();
    let frames = batch.as_frames().unwrap();
    let vertices = frames.vertices.as_ref().unwrap();

    assert_eq!(vertices.names(), vec!["vid", "x", "y", "train_mask", "is_seed"]);
    assert_eq!(vertices.row(0), vec!["99", "1 0 0 1", "1", "false", "true"]);
    assert_eq!(vertices.row(1), vec!["8", "1 0 0 1", "1", "true", "true"]);
    assert_eq!(
        vertices.column("x"),
        Some(&Column::IntList {
            width: 4,
            rows: 2,
            values: vec![1, 0, 0, 1, 1, 0, 0, 1]
        })
    );
}

#[test]
fn test_combined_scenario_edge_index() {
    let catalog = cora_catalog();
    let decoder = WireDecoder::new(PayloadKind::Graph, Some(vertex_spec(&catalog)), None);
    let raw = graph("99,1 0,0,1,1\n8,0 1,1,0,1\n", "99,8\n8,99\n");

    let batch = BatchAssembler::new(OutputFormat::Graph)
        .assemble(decoder.decode(&raw).unwrap())
        .unwrap();
    let g = batch.as_graph().unwrap();

    assert_eq!(g.nodes.vertex_ids, vec!["99", "8"]);
    assert_eq!(g.edges.sources(), &[0, 1]);
    assert_eq!(g.edges.targets(), &[1, 0]);
    assert_eq!(g.tensor("x").unwrap().shape(), &[2, 2]);
    assert!(g.get("edge_feat").is_none());
}

#[test]
fn test_undeclared_attributes_are_omitted() {
    let catalog = cora_catalog();
    let spec = AttributeSpecValidator::new(&catalog, false)
        .resolve(
            EntityKind::Vertex,
            &AttributeDecl::names(["x"]),
            &AttributeDecl::Absent,
            &AttributeDecl::Absent,
        )
        .unwrap();
    let decoder = WireDecoder::new(PayloadKind::Vertex, Some(spec), None);
    let raw = RawRecordBatch::Vertex(Bytes::from_static(b"1,5\n2,6\n"));

    let batch = BatchAssembler::new(OutputFormat::Graph)
        .assemble(decoder.decode(&raw).unwrap())
        .unwrap();
    let g = batch.as_graph().unwrap();
    assert!(g.get("y").is_none());
    assert!(g.is_seed().is_none());
    assert_eq!(g.tensor("x").unwrap().shape(), &[2, 1]);
    assert_eq!(g.num_edges(), 0);
}

#[test]
fn test_protocol_mismatch_is_wire_format_error() {
    let catalog = cora_catalog();
    let decoder = WireDecoder::new(PayloadKind::Graph, Some(vertex_spec(&catalog)), None);

    // Edge half carries an attribute the edge layout does not declare
    let err = decoder
        .decode(&graph("1,1,0,1,1\n", "1,1,2021\n"))
        .unwrap_err();
    assert!(matches!(
        err,
        WireFormatError::FieldCount {
            kind: EntityKind::Edge,
            expected: 2,
            found: 3,
            ..
        }
    ));
}

#[test]
fn test_heterogeneous_graph_keeps_index_per_type() {
    let catalog = InMemoryCatalog::new()
        .with_vertex_type("User", [("age", PrimitiveType::Int)])
        .with_vertex_type("Item", [("price", PrimitiveType::Float)])
        .with_edge_type("Buys", "User", "Item", [("qty", PrimitiveType::Int)]);
    let validator = AttributeSpecValidator::new(&catalog, true);
    let vertices = validator
        .resolve(
            EntityKind::Vertex,
            &AttributeDecl::by_type([("User", vec!["age"]), ("Item", vec!["price"])]),
            &AttributeDecl::Absent,
            &AttributeDecl::Absent,
        )
        .unwrap()
        .with_seed_marker();
    let edges = validator
        .resolve(
            EntityKind::Edge,
            &AttributeDecl::by_type([("Buys", vec!["qty"])]),
            &AttributeDecl::Absent,
            &AttributeDecl::Absent,
        )
        .unwrap();

    let endpoints: BTreeMap<String, (String, String)> =
        [("Buys".to_string(), ("User".to_string(), "Item".to_string()))].into();
    let decoder = WireDecoder::new(PayloadKind::Graph, Some(vertices), Some(edges));
    let raw = graph(
        "User,u1,30,1\nItem,i9,9.5,0\nUser,u2,41,0\nItem,i3,1.25,0\n",
        "Buys,u2,i3,2\nBuys,u1,i9,1\n",
    );

    let batch = BatchAssembler::new(OutputFormat::Graph)
        .with_endpoints(endpoints)
        .assemble(decoder.decode(&raw).unwrap())
        .unwrap();
    let hetero = batch.as_hetero_graph().unwrap();

    assert_eq!(hetero.nodes["User"].vertex_ids, vec!["u1", "u2"]);
    assert_eq!(hetero.nodes["Item"].vertex_ids, vec!["i9", "i3"]);
    let buys = hetero.relation("Buys").unwrap();
    assert_eq!(buys.sources(), &[1, 0]);
    assert_eq!(buys.targets(), &[1, 0]);
    assert_eq!(batch.num_vertices(), 4);
    assert_eq!(batch.num_edges(), 2);
}

// ==================== Properties ====================

/// Vertex records with seed flags, ids may repeat, and edges between them
fn graph_strategy() -> impl Strategy<Value = (Vec<(u32, bool)>, Vec<(usize, usize)>)> {
    prop::collection::vec((0u32..30, any::<bool>()), 1..40).prop_flat_map(|vertices| {
        let n = vertices.len();
        (Just(vertices), prop::collection::vec((0..n, 0..n), 0..80))
    })
}

/// Distinct ids in first-seen order, seed when any record is
fn distinct(vertices: &[(u32, bool)]) -> Vec<(u32, bool)> {
    let mut out: Vec<(u32, bool)> = Vec::new();
    for (id, seed) in vertices {
        match out.iter().position(|(d, _)| d == id) {
            Some(k) => out[k].1 |= *seed,
            None => out.push((*id, *seed)),
        }
    }
    out
}

fn render(vertices: &[(u32, bool)], edges: &[(usize, usize)]) -> RawRecordBatch {
    let v: String = vertices
        .iter()
        .map(|(id, seed)| format!("{},{}\n", id, u8::from(*seed)))
        .collect();
    let e: String = edges
        .iter()
        .map(|(s, t)| format!("{},{}\n", vertices[*s].0, vertices[*t].0))
        .collect();
    graph(&v, &e)
}

fn seed_only_decoder() -> WireDecoder {
    let spec = AttributeSpec::Flat(Default::default()).with_seed_marker();
    WireDecoder::new(PayloadKind::Graph, Some(spec), None)
}

proptest! {
    #[test]
    fn prop_remap_is_seeds_first_bijection((vertices, edges) in graph_strategy()) {
        let decoded = seed_only_decoder().decode(&render(&vertices, &edges)).unwrap();
        let batch = BatchAssembler::new(OutputFormat::Graph).assemble(decoded).unwrap();
        let g = batch.as_graph().unwrap();

        let unique = distinct(&vertices);
        let expected: Vec<String> = unique
            .iter()
            .filter(|(_, seed)| *seed)
            .chain(unique.iter().filter(|(_, seed)| !*seed))
            .map(|(id, _)| id.to_string())
            .collect();
        prop_assert_eq!(g.num_nodes(), unique.len());
        prop_assert_eq!(&g.nodes.vertex_ids, &expected);

        let seeds = unique.iter().filter(|(_, s)| *s).count();
        let flags = g.is_seed().unwrap();
        prop_assert_eq!(flags.iter().filter(|f| **f).count(), seeds);
        prop_assert_eq!(flags.len(), unique.len());
        prop_assert!(flags[..seeds].iter().all(|f| *f));

        prop_assert_eq!(g.num_edges(), edges.len());
        for (k, (s, t)) in edges.iter().enumerate() {
            let src = g.edges.sources()[k] as usize;
            let dst = g.edges.targets()[k] as usize;
            prop_assert!(src < g.num_nodes() && dst < g.num_nodes());
            prop_assert_eq!(&g.nodes.vertex_ids[src], &vertices[*s].0.to_string());
            prop_assert_eq!(&g.nodes.vertex_ids[dst], &vertices[*t].0.to_string());
        }
    }

    #[test]
    fn prop_frames_render_back_to_payload(
        rows in prop::collection::vec((0u32..1000, -500i64..500, any::<bool>()), 0..30)
    ) {
        let catalog = InMemoryCatalog::new()
            .with_vertex_type("V", [("a", PrimitiveType::Int), ("b", PrimitiveType::Bool)]);
        let spec = AttributeSpecValidator::new(&catalog, false)
            .resolve(
                EntityKind::Vertex,
                &AttributeDecl::names(["a"]),
                &AttributeDecl::Absent,
                &AttributeDecl::names(["b"]),
            )
            .unwrap();
        let payload: String = rows
            .iter()
            .map(|(id, a, b)| format!("{},{},{}\n", id, a, b))
            .collect();

        let decoder = WireDecoder::new(PayloadKind::Vertex, Some(spec), None);
        let decoded = decoder
            .decode(&RawRecordBatch::Vertex(Bytes::from(payload.clone())))
            .unwrap();
        let batch = BatchAssembler::new(OutputFormat::Frames).assemble(decoded).unwrap();
        let frame = batch.as_frames().unwrap().vertices.clone().unwrap();

        let rendered: String = (0..frame.num_rows())
            .map(|i| format!("{}\n", frame.row(i).join(",")))
            .collect();
        prop_assert_eq!(rendered, payload);
    }
}
