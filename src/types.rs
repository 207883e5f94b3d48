//! Core data types for the graph batch loader
//!
//! This module contains the small vocabulary types shared by every stage of
//! the pipeline.
//!
//! # Main Types
//!
//! - [`PrimitiveType`] - Declared attribute type as reported by the schema
//! - [`EntityKind`] - Vertex or edge
//! - [`PayloadKind`] - What a batch query returns (vertices, edges, or both)
//! - [`OutputFormat`] - How decoded batches are handed to the caller
//!
//! # Primitive Types
//!
//! The graph store reports attribute types as upper-case names (`INT`,
//! `DOUBLE`, `LIST<INT>`, ...). [`PrimitiveType::parse`] accepts those names
//! case-insensitively so that schema dumps can be used verbatim.

use serde::{Deserialize, Serialize};

/// Separator between records in a payload
pub const RECORD_SEPARATOR: char = '\n';

/// Separator between fields of a record
pub const FIELD_SEPARATOR: char = ',';

/// Separator between elements of a list-typed field
pub const LIST_SEPARATOR: char = ' ';

/// Name of the identity column of vertex payloads
pub const VERTEX_ID_COLUMN: &str = "vid";

/// Names of the identity columns of edge payloads
pub const EDGE_ID_COLUMNS: [&str; 2] = ["source", "target"];

static VERTEX_IDENTITY: [&str; 1] = [VERTEX_ID_COLUMN];
static EDGE_IDENTITY: [&str; 2] = EDGE_ID_COLUMNS;

/// Reserved boolean column marking seed vertices
pub const IS_SEED_COLUMN: &str = "is_seed";

/// Element type of a numeric list attribute
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ScalarKind {
    /// 64-bit signed integer elements
    Int,
    /// 64-bit floating point elements
    Float,
}

/// Declared type of a vertex or edge attribute
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(try_from = "String", into = "String")]
pub enum PrimitiveType {
    /// Integer (`INT`, `UINT`)
    #[default]
    Int,
    /// Floating point (`FLOAT`, `DOUBLE`)
    Float,
    /// Boolean
    Bool,
    /// Text, passed through untouched
    String,
    /// Fixed-length numeric list; width comes from the payload
    List(ScalarKind),
}

impl PrimitiveType {
    /// Parse a schema type name such as `INT`, `double` or `LIST<FLOAT>`
    pub fn parse(name: &str) -> Option<Self> {
        let upper = name.trim().to_ascii_uppercase();
        let scalar = |s: &str| match s {
            "INT" | "UINT" | "INT64" | "DATETIME" => Some(ScalarKind::Int),
            "FLOAT" | "DOUBLE" => Some(ScalarKind::Float),
            _ => None,
        };

        if let Some(inner) = upper
            .strip_prefix("LIST<")
            .and_then(|rest| rest.strip_suffix('>'))
        {
            return scalar(inner.trim()).map(PrimitiveType::List);
        }

        match upper.as_str() {
            "BOOL" | "BOOLEAN" => Some(PrimitiveType::Bool),
            "STRING" => Some(PrimitiveType::String),
            other => scalar(other).map(|kind| match kind {
                ScalarKind::Int => PrimitiveType::Int,
                ScalarKind::Float => PrimitiveType::Float,
            }),
        }
    }

    /// Returns true if values of this type can live in a numeric tensor
    pub fn is_numeric(&self) -> bool {
        !matches!(self, PrimitiveType::String)
    }

    /// Human-readable name used in error messages
    pub fn label(&self) -> &'static str {
        match self {
            PrimitiveType::Int => "INT",
            PrimitiveType::Float => "DOUBLE",
            PrimitiveType::Bool => "BOOL",
            PrimitiveType::String => "STRING",
            PrimitiveType::List(ScalarKind::Int) => "LIST<INT>",
            PrimitiveType::List(ScalarKind::Float) => "LIST<DOUBLE>",
        }
    }
}

impl std::fmt::Display for PrimitiveType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.label())
    }
}

impl TryFrom<String> for PrimitiveType {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        PrimitiveType::parse(&value).ok_or_else(|| format!("unknown primitive type '{}'", value))
    }
}

impl From<PrimitiveType> for String {
    fn from(value: PrimitiveType) -> Self {
        value.label().to_string()
    }
}

/// Vertex or edge
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityKind {
    /// Vertex
    Vertex,
    /// Edge
    Edge,
}

impl EntityKind {
    /// Names of the identity columns that precede attributes on the wire
    pub fn identity_columns(&self) -> &'static [&'static str] {
        match self {
            EntityKind::Vertex => &VERTEX_IDENTITY,
            EntityKind::Edge => &EDGE_IDENTITY,
        }
    }
}

impl std::fmt::Display for EntityKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EntityKind::Vertex => write!(f, "vertex"),
            EntityKind::Edge => write!(f, "edge"),
        }
    }
}

/// What a batch query returns
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum PayloadKind {
    /// Vertex records only
    Vertex,
    /// Edge records only
    Edge,
    /// Vertex half and edge half
    #[default]
    Graph,
}

impl PayloadKind {
    /// Whether the payload has a vertex half
    pub fn has_vertices(&self) -> bool {
        matches!(self, PayloadKind::Vertex | PayloadKind::Graph)
    }

    /// Whether the payload has an edge half
    pub fn has_edges(&self) -> bool {
        matches!(self, PayloadKind::Edge | PayloadKind::Graph)
    }

    /// Short name used in messages
    pub fn label(&self) -> &'static str {
        match self {
            PayloadKind::Vertex => "vertex",
            PayloadKind::Edge => "edge",
            PayloadKind::Graph => "graph",
        }
    }
}

impl std::fmt::Display for PayloadKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.label())
    }
}

/// Representation of the batches handed to the caller
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// Column-oriented frames, one for vertices and one for edges
    Frames,
    /// Tensor-backed graph with local edge index
    #[default]
    Graph,
}

impl std::fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OutputFormat::Frames => write!(f, "frames"),
            OutputFormat::Graph => write!(f, "graph"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_primitive_type_parse() {
        assert_eq!(PrimitiveType::parse("INT"), Some(PrimitiveType::Int));
        assert_eq!(PrimitiveType::parse("double"), Some(PrimitiveType::Float));
        assert_eq!(PrimitiveType::parse("Float"), Some(PrimitiveType::Float));
        assert_eq!(PrimitiveType::parse("bool"), Some(PrimitiveType::Bool));
        assert_eq!(PrimitiveType::parse("STRING"), Some(PrimitiveType::String));
        assert_eq!(
            PrimitiveType::parse("LIST<INT>"),
            Some(PrimitiveType::List(ScalarKind::Int))
        );
        assert_eq!(
            PrimitiveType::parse("list<double>"),
            Some(PrimitiveType::List(ScalarKind::Float))
        );
        assert_eq!(PrimitiveType::parse("LIST<STRING>"), None);
        assert_eq!(PrimitiveType::parse("MAP"), None);
    }

    #[test]
    fn test_primitive_type_serde_uses_schema_names() {
        let json = serde_json::to_string(&PrimitiveType::List(ScalarKind::Int)).unwrap();
        assert_eq!(json, "\"LIST<INT>\"");
        let parsed: PrimitiveType = serde_json::from_str("\"bool\"").unwrap();
        assert_eq!(parsed, PrimitiveType::Bool);
        assert!(serde_json::from_str::<PrimitiveType>("\"VARCHAR\"").is_err());
    }

    #[test]
    fn test_identity_columns() {
        assert_eq!(EntityKind::Vertex.identity_columns(), &["vid"]);
        assert_eq!(EntityKind::Edge.identity_columns(), &["source", "target"]);
    }

    #[test]
    fn test_payload_kind_halves() {
        assert!(PayloadKind::Graph.has_vertices() && PayloadKind::Graph.has_edges());
        assert!(PayloadKind::Vertex.has_vertices() && !PayloadKind::Vertex.has_edges());
        assert!(!PayloadKind::Edge.has_vertices() && PayloadKind::Edge.has_edges());
    }
}
