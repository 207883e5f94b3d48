//! Schema catalog and attribute declarations
//!
//! The loader never fetches the graph schema itself. It consumes a
//! [`SchemaCatalog`], which answers "what type does attribute `a` of vertex
//! type `T` have", and validates user declarations against it once, before any
//! worker thread starts.
//!
//! # Components
//!
//! - [`SchemaCatalog`] - The capability the loader consumes
//! - [`InMemoryCatalog`] - A catalog built in code or deserialized from a
//!   schema dump
//! - [`validator`] - Normalization of user declarations into
//!   [`AttributeSpec`] layouts
//!
//! # Example
//!
//! ```ignore
//! use graph_batch_loader::schema::InMemoryCatalog;
//! use graph_batch_loader::types::PrimitiveType;
//!
//! let catalog = InMemoryCatalog::new()
//!     .with_vertex_type("Paper", [("x", PrimitiveType::Int), ("y", PrimitiveType::Int)])
//!     .with_edge_type("Cite", "Paper", "Paper", [("time", PrimitiveType::Int)]);
//! ```

pub mod validator;

pub use validator::{
    AttributeDecl, AttributeLayout, AttributeSpec, AttributeSpecValidator, NormalizedDecl,
};

use crate::error::{LoaderError, Result};
use crate::types::{EntityKind, PrimitiveType};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

/// Read-only view of the graph schema
///
/// Implementations must be `Send + Sync`; the catalog is shared with the
/// loader for its whole lifetime.
pub trait SchemaCatalog: Send + Sync {
    /// Names of all vertex types, in a stable order
    fn vertex_types(&self) -> Vec<String>;

    /// Names of all edge types, in a stable order
    fn edge_types(&self) -> Vec<String>;

    /// Declared type of `attribute` on `type_name`, if both exist
    fn attribute_type(
        &self,
        kind: EntityKind,
        type_name: &str,
        attribute: &str,
    ) -> Option<PrimitiveType>;

    /// Source and target vertex types of an edge type
    fn edge_endpoints(&self, edge_type: &str) -> Option<(String, String)>;

    /// Names of all types of the given kind
    fn types_of(&self, kind: EntityKind) -> Vec<String> {
        match kind {
            EntityKind::Vertex => self.vertex_types(),
            EntityKind::Edge => self.edge_types(),
        }
    }

    /// Whether a type of the given kind exists
    fn has_type(&self, kind: EntityKind, type_name: &str) -> bool {
        self.types_of(kind).iter().any(|t| t == type_name)
    }
}

// ==================== In-memory catalog ====================

/// Attributes of one vertex type
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct VertexTypeDef {
    /// Attribute name to declared type
    #[serde(default)]
    pub attributes: BTreeMap<String, PrimitiveType>,
}

/// Attributes and endpoints of one edge type
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EdgeTypeDef {
    /// Source vertex type
    pub from: String,
    /// Target vertex type
    pub to: String,
    /// Attribute name to declared type
    #[serde(default)]
    pub attributes: BTreeMap<String, PrimitiveType>,
}

/// Schema catalog held entirely in memory
///
/// Deserializes from a JSON schema dump of the form:
///
/// ```json
/// {
///   "vertices": { "Paper": { "attributes": { "x": "INT", "train_mask": "BOOL" } } },
///   "edges": { "Cite": { "from": "Paper", "to": "Paper", "attributes": { "time": "INT" } } }
/// }
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct InMemoryCatalog {
    /// Vertex types by name
    #[serde(default)]
    pub vertices: BTreeMap<String, VertexTypeDef>,
    /// Edge types by name
    #[serde(default)]
    pub edges: BTreeMap<String, EdgeTypeDef>,
}

impl InMemoryCatalog {
    /// Create an empty catalog
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a vertex type with its attributes
    pub fn with_vertex_type<I, S>(mut self, name: &str, attributes: I) -> Self
    where
        I: IntoIterator<Item = (S, PrimitiveType)>,
        S: Into<String>,
    {
        let def = VertexTypeDef {
            attributes: attributes.into_iter().map(|(k, v)| (k.into(), v)).collect(),
        };
        self.vertices.insert(name.to_string(), def);
        self
    }

    /// Add an edge type with its endpoints and attributes
    pub fn with_edge_type<I, S>(mut self, name: &str, from: &str, to: &str, attributes: I) -> Self
    where
        I: IntoIterator<Item = (S, PrimitiveType)>,
        S: Into<String>,
    {
        let def = EdgeTypeDef {
            from: from.to_string(),
            to: to.to_string(),
            attributes: attributes.into_iter().map(|(k, v)| (k.into(), v)).collect(),
        };
        self.edges.insert(name.to_string(), def);
        self
    }

    /// Parse a catalog from a JSON schema dump
    pub fn from_json(content: &str) -> Result<Self> {
        serde_json::from_str(content)
            .map_err(|e| LoaderError::Config(format!("Failed to parse schema catalog: {}", e)))
    }

    /// Load a catalog from a JSON file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            LoaderError::Config(format!("Failed to read schema catalog {:?}: {}", path, e))
        })?;
        Self::from_json(&content)
    }

    fn attributes(
        &self,
        kind: EntityKind,
        type_name: &str,
    ) -> Option<&BTreeMap<String, PrimitiveType>> {
        match kind {
            EntityKind::Vertex => self.vertices.get(type_name).map(|d| &d.attributes),
            EntityKind::Edge => self.edges.get(type_name).map(|d| &d.attributes),
        }
    }
}

impl SchemaCatalog for InMemoryCatalog {
    fn vertex_types(&self) -> Vec<String> {
        self.vertices.keys().cloned().collect()
    }

    fn edge_types(&self) -> Vec<String> {
        self.edges.keys().cloned().collect()
    }

    fn attribute_type(
        &self,
        kind: EntityKind,
        type_name: &str,
        attribute: &str,
    ) -> Option<PrimitiveType> {
        self.attributes(kind, type_name)?.get(attribute).copied()
    }

    fn edge_endpoints(&self, edge_type: &str) -> Option<(String, String)> {
        self.edges
            .get(edge_type)
            .map(|d| (d.from.clone(), d.to.clone()))
    }
}
