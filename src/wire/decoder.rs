//! Delimited payload decoder
//!
//! Records are separated by `\n`, fields by `,`, list elements by a space.
//! Field order is positional: identity columns, then `in_features`,
//! `out_labels` and `extra_features` of the type's [`AttributeLayout`].
//! Heterogeneous payloads carry the type name as an extra leading field.

use super::column::{Column, ColumnRole, DecodedColumns, NamedColumn};
use super::RawRecordBatch;
use crate::error::WireFormatError;
use crate::schema::{AttributeLayout, AttributeSpec};
use crate::types::{
    EntityKind, PayloadKind, PrimitiveType, ScalarKind, FIELD_SEPARATOR, LIST_SEPARATOR,
    RECORD_SEPARATOR,
};
use std::collections::BTreeMap;

/// Result of decoding one [`RawRecordBatch`]
#[derive(Debug, Clone, PartialEq)]
pub enum DecodedBatch {
    /// Homogeneous graph: at most one table per kind
    Homogeneous {
        vertices: Option<DecodedColumns>,
        edges: Option<DecodedColumns>,
    },
    /// Heterogeneous graph: one table per declared type
    Heterogeneous {
        vertices: BTreeMap<String, DecodedColumns>,
        edges: BTreeMap<String, DecodedColumns>,
    },
}

/// Decodes payloads according to resolved attribute specs
///
/// Cheap to clone; every worker owns one.
#[derive(Debug, Clone)]
pub struct WireDecoder {
    payload: PayloadKind,
    vertex_spec: Option<AttributeSpec>,
    edge_spec: Option<AttributeSpec>,
}

impl WireDecoder {
    /// Create a decoder for `payload`
    ///
    /// The attribute layout of a half the payload kind does not carry is ignored.
    pub fn new(
        payload: PayloadKind,
        vertex_spec: Option<AttributeSpec>,
        edge_spec: Option<AttributeSpec>,
    ) -> Self {
        let empty = || AttributeSpec::Flat(AttributeLayout::default());
        Self {
            payload,
            vertex_spec: payload
                .has_vertices()
                .then(|| vertex_spec.unwrap_or_else(empty)),
            edge_spec: payload.has_edges().then(|| edge_spec.unwrap_or_else(empty)),
        }
    }

    /// Payload kind this decoder expects
    pub fn payload(&self) -> PayloadKind {
        self.payload
    }

    /// Spec used for the vertex half
    pub fn vertex_spec(&self) -> Option<&AttributeSpec> {
        self.vertex_spec.as_ref()
    }

    /// Spec used for the edge half
    pub fn edge_spec(&self) -> Option<&AttributeSpec> {
        self.edge_spec.as_ref()
    }

    /// Whether records carry a type prefix
    pub fn is_heterogeneous(&self) -> bool {
        self.vertex_spec
            .as_ref()
            .or(self.edge_spec.as_ref())
            .is_some_and(AttributeSpec::is_heterogeneous)
    }

    /// Decode a raw batch
    pub fn decode(&self, raw: &RawRecordBatch) -> Result<DecodedBatch, WireFormatError> {
        let (vertex_bytes, edge_bytes) = match (self.payload, raw) {
            (PayloadKind::Vertex, RawRecordBatch::Vertex(v)) => (Some(v), None),
            (PayloadKind::Edge, RawRecordBatch::Edge(e)) => (None, Some(e)),
            (PayloadKind::Graph, RawRecordBatch::Graph { vertices, edges }) => {
                (Some(vertices), Some(edges))
            }
            (expected, other) => {
                return Err(WireFormatError::PayloadShape {
                    expected: expected.label(),
                    found: other.kind().label(),
                })
            }
        };

        if self.is_heterogeneous() {
            let vertices = match (vertex_bytes, &self.vertex_spec) {
                (Some(bytes), Some(AttributeSpec::ByType(layouts))) => {
                    decode_typed(EntityKind::Vertex, bytes, layouts)?
                }
                _ => BTreeMap::new(),
            };
            let edges = match (edge_bytes, &self.edge_spec) {
                (Some(bytes), Some(AttributeSpec::ByType(layouts))) => {
                    decode_typed(EntityKind::Edge, bytes, layouts)?
                }
                _ => BTreeMap::new(),
            };
            return Ok(DecodedBatch::Heterogeneous { vertices, edges });
        }

        let vertices = match (vertex_bytes, self.vertex_spec.as_ref().and_then(|s| s.layout(None))) {
            (Some(bytes), Some(layout)) => Some(decode_flat(EntityKind::Vertex, bytes, layout)?),
            _ => None,
        };
        let edges = match (edge_bytes, self.edge_spec.as_ref().and_then(|s| s.layout(None))) {
            (Some(bytes), Some(layout)) => Some(decode_flat(EntityKind::Edge, bytes, layout)?),
            _ => None,
        };
        Ok(DecodedBatch::Homogeneous { vertices, edges })
    }
}

/// Decode a homogeneous payload half
pub fn decode_flat(
    kind: EntityKind,
    bytes: &[u8],
    layout: &AttributeLayout,
) -> Result<DecodedColumns, WireFormatError> {
    let records = split_records(kind, bytes)?;
    decode_table(kind, None, layout, &records)
}

/// Decode a heterogeneous payload half, grouping records by type prefix
///
/// Every type of `layouts` appears in the result, possibly empty.
pub fn decode_typed(
    kind: EntityKind,
    bytes: &[u8],
    layouts: &BTreeMap<String, AttributeLayout>,
) -> Result<BTreeMap<String, DecodedColumns>, WireFormatError> {
    let records = split_records(kind, bytes)?;
    let mut groups: BTreeMap<&str, Vec<(usize, &str)>> =
        layouts.keys().map(|k| (k.as_str(), Vec::new())).collect();

    for (line, record) in records {
        let (type_name, rest) = record
            .split_once(FIELD_SEPARATOR)
            .unwrap_or((record, ""));
        match groups.get_mut(type_name) {
            Some(group) => group.push((line, rest)),
            None => {
                return Err(WireFormatError::UnknownType {
                    kind,
                    line,
                    type_name: type_name.to_string(),
                })
            }
        }
    }

    let mut out = BTreeMap::new();
    for (type_name, layout) in layouts {
        let rows = groups.get(type_name.as_str()).map(Vec::as_slice).unwrap_or(&[]);
        let table = decode_table(kind, Some(type_name.clone()), layout, rows)?;
        out.insert(type_name.clone(), table);
    }
    Ok(out)
}

/// Split a payload into non-empty records tagged with their 1-based line
fn split_records(kind: EntityKind, bytes: &[u8]) -> Result<Vec<(usize, &str)>, WireFormatError> {
    let text = std::str::from_utf8(bytes).map_err(|e| WireFormatError::InvalidUtf8 {
        kind,
        offset: e.valid_up_to(),
    })?;
    Ok(text
        .split(RECORD_SEPARATOR)
        .enumerate()
        .map(|(i, line)| (i + 1, line.strip_suffix('\r').unwrap_or(line)))
        .filter(|(_, line)| !line.is_empty())
        .collect())
}

fn decode_table(
    kind: EntityKind,
    type_name: Option<String>,
    layout: &AttributeLayout,
    rows: &[(usize, &str)],
) -> Result<DecodedColumns, WireFormatError> {
    let identity = kind.identity_columns();
    let mut slots: Vec<(String, ColumnRole, ColumnBuilder)> = identity
        .iter()
        .map(|name| {
            (
                name.to_string(),
                ColumnRole::Identity,
                ColumnBuilder::for_type(PrimitiveType::String, rows.len()),
            )
        })
        .collect();
    for (name, role) in layout.columns() {
        slots.push((
            name.to_string(),
            ColumnRole::Attribute(role),
            ColumnBuilder::for_type(layout.type_of(name), rows.len()),
        ));
    }

    let expected = slots.len();
    let mut fields = Vec::with_capacity(expected);
    for &(line, record) in rows {
        fields.clear();
        fields.extend(record.split(FIELD_SEPARATOR));
        if fields.len() != expected {
            return Err(WireFormatError::FieldCount {
                kind,
                line,
                expected,
                found: fields.len(),
            });
        }
        for ((name, _, builder), raw) in slots.iter_mut().zip(fields.iter()) {
            builder.push(raw, &Cell { kind, line, column: name })?;
        }
    }

    let columns = slots
        .into_iter()
        .map(|(name, role, builder)| NamedColumn {
            name,
            role,
            column: builder.finish(),
        })
        .collect();
    Ok(DecodedColumns::new(kind, type_name, columns, rows.len()))
}

/// Position of a field, for error reporting
struct Cell<'a> {
    kind: EntityKind,
    line: usize,
    column: &'a str,
}

impl Cell<'_> {
    fn invalid(&self, value: &str, expected: &'static str) -> WireFormatError {
        WireFormatError::InvalidValue {
            kind: self.kind,
            line: self.line,
            column: self.column.to_string(),
            value: value.to_string(),
            expected,
        }
    }
}

enum ColumnBuilder {
    Int(Vec<i64>),
    Float(Vec<f64>),
    Bool(Vec<bool>),
    Str(Vec<String>),
    List {
        elem: ScalarKind,
        width: Option<usize>,
        rows: usize,
        ints: Vec<i64>,
        floats: Vec<f64>,
    },
}

impl ColumnBuilder {
    fn for_type(ty: PrimitiveType, rows: usize) -> Self {
        match ty {
            PrimitiveType::Int => ColumnBuilder::Int(Vec::with_capacity(rows)),
            PrimitiveType::Float => ColumnBuilder::Float(Vec::with_capacity(rows)),
            PrimitiveType::Bool => ColumnBuilder::Bool(Vec::with_capacity(rows)),
            PrimitiveType::String => ColumnBuilder::Str(Vec::with_capacity(rows)),
            PrimitiveType::List(elem) => ColumnBuilder::list(elem),
        }
    }

    fn list(elem: ScalarKind) -> Self {
        ColumnBuilder::List {
            elem,
            width: None,
            rows: 0,
            ints: Vec::new(),
            floats: Vec::new(),
        }
    }

    fn push(&mut self, raw: &str, at: &Cell<'_>) -> Result<(), WireFormatError> {
        // Schemas often report only the element type of a list attribute;
        // the first record decides.
        let promote = match self {
            ColumnBuilder::Int(v) if v.is_empty() && is_list_literal(raw) => Some(ScalarKind::Int),
            ColumnBuilder::Float(v) if v.is_empty() && is_list_literal(raw) => {
                Some(ScalarKind::Float)
            }
            _ => None,
        };
        if let Some(elem) = promote {
            *self = ColumnBuilder::list(elem);
        }

        match self {
            ColumnBuilder::Int(v) => v.push(parse_int(raw).ok_or_else(|| at.invalid(raw, "INT"))?),
            ColumnBuilder::Float(v) => {
                v.push(parse_float(raw).ok_or_else(|| at.invalid(raw, "DOUBLE"))?)
            }
            ColumnBuilder::Bool(v) => {
                v.push(parse_bool(raw).ok_or_else(|| at.invalid(raw, "BOOL"))?)
            }
            ColumnBuilder::Str(v) => v.push(raw.to_string()),
            ColumnBuilder::List {
                elem,
                width,
                rows,
                ints,
                floats,
            } => {
                *rows += 1;
                let mut found = 0;
                for item in raw.split(LIST_SEPARATOR).filter(|s| !s.trim().is_empty()) {
                    match elem {
                        ScalarKind::Int => ints.push(
                            parse_int(item).ok_or_else(|| at.invalid(item, "LIST<INT>"))?,
                        ),
                        ScalarKind::Float => floats.push(
                            parse_float(item).ok_or_else(|| at.invalid(item, "LIST<DOUBLE>"))?,
                        ),
                    }
                    found += 1;
                }
                match width {
                    None => *width = Some(found),
                    Some(expected) if *expected != found => {
                        return Err(WireFormatError::ListWidth {
                            kind: at.kind,
                            line: at.line,
                            column: at.column.to_string(),
                            expected: *expected,
                            found,
                        })
                    }
                    Some(_) => {}
                }
            }
        }
        Ok(())
    }

    fn finish(self) -> Column {
        match self {
            ColumnBuilder::Int(v) => Column::Int(v),
            ColumnBuilder::Float(v) => Column::Float(v),
            ColumnBuilder::Bool(v) => Column::Bool(v),
            ColumnBuilder::Str(v) => Column::Str(v),
            ColumnBuilder::List {
                elem: ScalarKind::Int,
                width,
                rows,
                ints,
                ..
            } => Column::IntList {
                width: width.unwrap_or(0),
                rows,
                values: ints,
            },
            ColumnBuilder::List {
                elem: ScalarKind::Float,
                width,
                rows,
                floats,
                ..
            } => Column::FloatList {
                width: width.unwrap_or(0),
                rows,
                values: floats,
            },
        }
    }
}

fn is_list_literal(raw: &str) -> bool {
    raw.trim().contains(LIST_SEPARATOR)
}

fn parse_int(raw: &str) -> Option<i64> {
    raw.trim().parse().ok()
}

fn parse_float(raw: &str) -> Option<f64> {
    raw.trim().parse().ok()
}

fn parse_bool(raw: &str) -> Option<bool> {
    let raw = raw.trim();
    if raw == "1" || raw.eq_ignore_ascii_case("true") {
        Some(true)
    } else if raw == "0" || raw.eq_ignore_ascii_case("false") {
        Some(false)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::validator::AttributeRole;
    use bytes::Bytes;

    fn layout(
        ins: &[(&str, PrimitiveType)],
        outs: &[(&str, PrimitiveType)],
        extras: &[(&str, PrimitiveType)],
    ) -> AttributeLayout {
        let names = |xs: &[(&str, PrimitiveType)]| xs.iter().map(|(n, _)| n.to_string()).collect();
        let types = ins
            .iter()
            .chain(outs)
            .chain(extras)
            .map(|(n, t)| (n.to_string(), *t))
            .collect();
        AttributeLayout::new(names(ins), names(outs), names(extras), types)
    }

    fn cora_vertices() -> AttributeLayout {
        layout(
            &[("x", PrimitiveType::Int)],
            &[("y", PrimitiveType::Int)],
            &[("train_mask", PrimitiveType::Bool)],
        )
        .with_seed_marker()
    }

    fn cora_edges() -> AttributeLayout {
        layout(
            &[("x", PrimitiveType::Float), ("time", PrimitiveType::Int)],
            &[("y", PrimitiveType::Int)],
            &[("is_train", PrimitiveType::Bool)],
        )
    }

    #[test]
    fn test_decode_vertex_payload() {
        let decoded = decode_flat(
            EntityKind::Vertex,
            b"99,1 0 0 1 ,1,0,1\n8,1 0 0 1 ,1,1,1\n",
            &cora_vertices(),
        )
        .unwrap();

        assert_eq!(decoded.num_rows(), 2);
        assert_eq!(decoded.names(), vec!["vid", "x", "y", "train_mask", "is_seed"]);
        assert_eq!(decoded.identity(0), &["99".to_string(), "8".to_string()]);
        assert_eq!(
            decoded.get("x"),
            Some(&Column::IntList {
                width: 4,
                rows: 2,
                values: vec![1, 0, 0, 1, 1, 0, 0, 1]
            })
        );
        assert_eq!(decoded.get("y"), Some(&Column::Int(vec![1, 1])));
        assert_eq!(decoded.get("train_mask"), Some(&Column::Bool(vec![false, true])));
        assert_eq!(decoded.get("is_seed"), Some(&Column::Bool(vec![true, true])));
    }

    #[test]
    fn test_decode_edge_payload() {
        let decoded = decode_flat(
            EntityKind::Edge,
            b"1,2,0.1,2021,1,0\n2,1,1.5,2020,0,1\n",
            &cora_edges(),
        )
        .unwrap();

        assert_eq!(decoded.names(), vec!["source", "target", "x", "time", "y", "is_train"]);
        assert_eq!(decoded.identity(1), &["2".to_string(), "1".to_string()]);
        assert_eq!(decoded.get("x"), Some(&Column::Float(vec![0.1, 1.5])));
        assert_eq!(decoded.get("time"), Some(&Column::Int(vec![2021, 2020])));
        assert_eq!(decoded.with_role(AttributeRole::InFeature).count(), 2);
    }

    #[test]
    fn test_empty_payload_keeps_columns() {
        let decoded = decode_flat(EntityKind::Vertex, b"", &cora_vertices()).unwrap();
        assert!(decoded.is_empty());
        assert_eq!(decoded.names().len(), 5);
    }

    #[test]
    fn test_crlf_and_missing_trailing_newline() {
        let decoded = decode_flat(
            EntityKind::Edge,
            b"1,2,0.1,2021,1,0\r\n2,1,1.5,2020,0,1",
            &cora_edges(),
        )
        .unwrap();
        assert_eq!(decoded.num_rows(), 2);
    }

    #[test]
    fn test_field_count_mismatch() {
        let err = decode_flat(EntityKind::Edge, b"1,2,0.1,2021,1\n", &cora_edges()).unwrap_err();
        assert_eq!(
            err,
            WireFormatError::FieldCount {
                kind: EntityKind::Edge,
                line: 1,
                expected: 6,
                found: 5
            }
        );
    }

    #[test]
    fn test_unparsable_value() {
        let err = decode_flat(EntityKind::Edge, b"1,2,abc,2021,1,0\n", &cora_edges()).unwrap_err();
        assert!(matches!(
            err,
            WireFormatError::InvalidValue { ref column, expected: "DOUBLE", .. } if column == "x"
        ));

        let err = decode_flat(EntityKind::Edge, b"1,2,0.1,2021,1,yes\n", &cora_edges()).unwrap_err();
        assert!(matches!(err, WireFormatError::InvalidValue { expected: "BOOL", .. }));
    }

    #[test]
    fn test_bool_literals() {
        let layout = layout(&[], &[], &[("flag", PrimitiveType::Bool)]);
        let decoded =
            decode_flat(EntityKind::Vertex, b"1,true\n2,FALSE\n3,1\n4,0\n", &layout).unwrap();
        assert_eq!(
            decoded.get("flag"),
            Some(&Column::Bool(vec![true, false, true, false]))
        );
    }

    #[test]
    fn test_inconsistent_list_width() {
        let err = decode_flat(
            EntityKind::Vertex,
            b"99,1 0 0 1,1,0,1\n8,1 0 1,1,1,1\n",
            &cora_vertices(),
        )
        .unwrap_err();
        assert_eq!(
            err,
            WireFormatError::ListWidth {
                kind: EntityKind::Vertex,
                line: 2,
                column: "x".to_string(),
                expected: 4,
                found: 3
            }
        );
    }

    #[test]
    fn test_empty_lists_keep_row_count() {
        let layout = layout(
            &[("x", PrimitiveType::List(ScalarKind::Int))],
            &[("y", PrimitiveType::Int)],
            &[],
        );
        let decoded = decode_flat(EntityKind::Vertex, b"1,,0\n2,,1\n", &layout).unwrap();
        let x = decoded.get("x").unwrap();
        assert_eq!(x.width(), 0);
        assert_eq!(x.len(), 2);
        assert_eq!(decoded.num_rows(), 2);
    }

    #[test]
    fn test_invalid_utf8() {
        let err = decode_flat(EntityKind::Vertex, b"99,\xff\n", &cora_vertices()).unwrap_err();
        assert_eq!(
            err,
            WireFormatError::InvalidUtf8 {
                kind: EntityKind::Vertex,
                offset: 3
            }
        );
    }

    #[test]
    fn test_decoder_rejects_wrong_shape() {
        let decoder = WireDecoder::new(PayloadKind::Graph, Some(AttributeSpec::Flat(cora_vertices())), None);
        let err = decoder
            .decode(&RawRecordBatch::Vertex(Bytes::from_static(b"")))
            .unwrap_err();
        assert!(matches!(err, WireFormatError::PayloadShape { expected: "graph", .. }));
    }

    #[test]
    fn test_decoder_graph_halves() {
        let decoder = WireDecoder::new(
            PayloadKind::Graph,
            Some(AttributeSpec::Flat(layout(&[], &[], &[]).with_seed_marker())),
            None,
        );
        let decoded = decoder
            .decode(&RawRecordBatch::Graph {
                vertices: Bytes::from_static(b"99,1\n8,1\n"),
                edges: Bytes::from_static(b"99,8\n8,99\n"),
            })
            .unwrap();
        match decoded {
            DecodedBatch::Homogeneous {
                vertices: Some(v),
                edges: Some(e),
            } => {
                assert_eq!(v.num_rows(), 2);
                assert_eq!(e.identity(0), &["99".to_string(), "8".to_string()]);
            }
            other => panic!("unexpected decode result: {:?}", other),
        }
    }

    #[test]
    fn test_decode_typed_groups_records() {
        let mut layouts = BTreeMap::new();
        layouts.insert(
            "Paper".to_string(),
            layout(&[("x", PrimitiveType::Int)], &[], &[]),
        );
        layouts.insert(
            "Author".to_string(),
            layout(&[], &[], &[("name", PrimitiveType::String)]),
        );
        layouts.insert("Venue".to_string(), layout(&[], &[], &[]));

        let decoded = decode_typed(
            EntityKind::Vertex,
            b"Paper,1,5\nAuthor,7,Alex\nPaper,2,6\n",
            &layouts,
        )
        .unwrap();

        assert_eq!(decoded["Paper"].get("x"), Some(&Column::Int(vec![5, 6])));
        assert_eq!(decoded["Paper"].type_name.as_deref(), Some("Paper"));
        assert_eq!(
            decoded["Author"].get("name"),
            Some(&Column::Str(vec!["Alex".to_string()]))
        );
        assert!(decoded["Venue"].is_empty());

        let err = decode_typed(EntityKind::Vertex, b"Topic,1\n", &layouts).unwrap_err();
        assert!(matches!(err, WireFormatError::UnknownType { line: 1, .. }));
    }
}
