//! Attribute declaration validation
//!
//! Users declare which attributes play which role (`in_features`,
//! `out_labels`, `extra_features`) either as a flat list (homogeneous
//! graphs) or as a map from type name to list (heterogeneous graphs).
//! Declarations usually come from configuration files, so they arrive
//! untyped as [`AttributeDecl`] and are resolved here into a tagged
//! [`NormalizedDecl`] and finally an [`AttributeSpec`] that carries the
//! declared type of every attribute.
//!
//! Validation runs once while the loader is built. Nothing downstream ever
//! inspects the shape of the caller's input again.

use super::SchemaCatalog;
use crate::error::ValidationError;
use crate::types::{EntityKind, PrimitiveType, IS_SEED_COLUMN};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};

/// Attribute declaration as supplied by the caller
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(untagged)]
pub enum AttributeDecl {
    /// Nothing declared
    #[default]
    Absent,
    /// Ordered attribute names (homogeneous)
    Names(Vec<String>),
    /// Ordered attribute names per type (heterogeneous)
    ByType(BTreeMap<String, Vec<String>>),
    /// Anything else; always rejected
    Other(serde_json::Value),
}

impl AttributeDecl {
    /// Whether nothing was declared
    pub fn is_absent(&self) -> bool {
        matches!(self, AttributeDecl::Absent)
    }

    /// Declare a flat list of names
    pub fn names<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        AttributeDecl::Names(names.into_iter().map(Into::into).collect())
    }

    /// Declare names for a set of types
    pub fn by_type<I, S, N>(entries: I) -> Self
    where
        I: IntoIterator<Item = (S, Vec<N>)>,
        S: Into<String>,
        N: Into<String>,
    {
        AttributeDecl::ByType(
            entries
                .into_iter()
                .map(|(t, names)| (t.into(), names.into_iter().map(Into::into).collect()))
                .collect(),
        )
    }
}

/// Declaration after validation: same shape, trimmed names
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NormalizedDecl {
    /// Homogeneous declaration
    Flat(Vec<String>),
    /// Heterogeneous declaration
    ByType(BTreeMap<String, Vec<String>>),
}

impl NormalizedDecl {
    fn empty(heterogeneous: bool) -> Self {
        if heterogeneous {
            NormalizedDecl::ByType(BTreeMap::new())
        } else {
            NormalizedDecl::Flat(Vec::new())
        }
    }

    /// Whether no attribute is declared
    pub fn is_empty(&self) -> bool {
        match self {
            NormalizedDecl::Flat(names) => names.is_empty(),
            NormalizedDecl::ByType(map) => map.is_empty(),
        }
    }
}

impl From<NormalizedDecl> for AttributeDecl {
    fn from(value: NormalizedDecl) -> Self {
        match value {
            NormalizedDecl::Flat(names) => AttributeDecl::Names(names),
            NormalizedDecl::ByType(map) => AttributeDecl::ByType(map),
        }
    }
}

/// Role an attribute plays in a batch
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AttributeRole {
    /// Model input feature
    InFeature,
    /// Training target
    OutLabel,
    /// Auxiliary column (masks, ids, seed marker)
    Extra,
}

/// Resolved attribute layout of one vertex or edge type
///
/// The wire order of a record is identity columns, then `in_features`, then
/// `out_labels`, then `extra_features`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AttributeLayout {
    /// Model input features, in declaration order
    pub in_features: Vec<String>,
    /// Targets, in declaration order
    pub out_labels: Vec<String>,
    /// Auxiliary columns, in declaration order
    pub extra_features: Vec<String>,
    /// Declared type of every attribute above
    pub types: BTreeMap<String, PrimitiveType>,
}

impl AttributeLayout {
    /// Build a layout from explicit lists and types
    ///
    /// Every attribute listed must have an entry in `types`; callers going
    /// through [`AttributeSpecValidator`] get that for free.
    pub fn new(
        in_features: Vec<String>,
        out_labels: Vec<String>,
        extra_features: Vec<String>,
        types: BTreeMap<String, PrimitiveType>,
    ) -> Self {
        Self {
            in_features,
            out_labels,
            extra_features,
            types,
        }
    }

    /// Attributes in wire order with their roles
    pub fn columns(&self) -> impl Iterator<Item = (&str, AttributeRole)> + '_ {
        self.in_features
            .iter()
            .map(|n| (n.as_str(), AttributeRole::InFeature))
            .chain(
                self.out_labels
                    .iter()
                    .map(|n| (n.as_str(), AttributeRole::OutLabel)),
            )
            .chain(
                self.extra_features
                    .iter()
                    .map(|n| (n.as_str(), AttributeRole::Extra)),
            )
    }

    /// Number of attribute fields per record
    pub fn len(&self) -> usize {
        self.in_features.len() + self.out_labels.len() + self.extra_features.len()
    }

    /// Whether the layout declares no attribute
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Declared type of an attribute (STRING when unknown)
    pub fn type_of(&self, name: &str) -> PrimitiveType {
        self.types.get(name).copied().unwrap_or(PrimitiveType::String)
    }

    /// Append the reserved seed marker column unless already declared
    pub fn with_seed_marker(mut self) -> Self {
        if !self.extra_features.iter().any(|n| n == IS_SEED_COLUMN) {
            self.extra_features.push(IS_SEED_COLUMN.to_string());
        }
        self.types
            .insert(IS_SEED_COLUMN.to_string(), PrimitiveType::Bool);
        self
    }

    fn first_string_feature(&self) -> Option<&str> {
        self.in_features
            .iter()
            .chain(self.out_labels.iter())
            .find(|n| !self.type_of(n).is_numeric())
            .map(String::as_str)
    }
}

/// Resolved attributes of one entity kind
#[derive(Debug, Clone, PartialEq)]
pub enum AttributeSpec {
    /// Homogeneous graph: one layout for every record
    Flat(AttributeLayout),
    /// Heterogeneous graph: one layout per type name
    ByType(BTreeMap<String, AttributeLayout>),
}

impl AttributeSpec {
    /// Whether this spec is heterogeneous
    pub fn is_heterogeneous(&self) -> bool {
        matches!(self, AttributeSpec::ByType(_))
    }

    /// Layout for a type name (the flat layout ignores the name)
    pub fn layout(&self, type_name: Option<&str>) -> Option<&AttributeLayout> {
        match (self, type_name) {
            (AttributeSpec::Flat(layout), _) => Some(layout),
            (AttributeSpec::ByType(map), Some(name)) => map.get(name),
            (AttributeSpec::ByType(_), None) => None,
        }
    }

    /// Append the reserved seed marker to every layout
    pub fn with_seed_marker(self) -> Self {
        match self {
            AttributeSpec::Flat(layout) => AttributeSpec::Flat(layout.with_seed_marker()),
            AttributeSpec::ByType(map) => AttributeSpec::ByType(
                map.into_iter()
                    .map(|(k, v)| (k, v.with_seed_marker()))
                    .collect(),
            ),
        }
    }

    /// Reject STRING attributes in feature or label roles
    pub fn ensure_numeric_features(&self, kind: EntityKind) -> Result<(), ValidationError> {
        let layouts: Vec<&AttributeLayout> = match self {
            AttributeSpec::Flat(layout) => vec![layout],
            AttributeSpec::ByType(map) => map.values().collect(),
        };
        for layout in layouts {
            if let Some(name) = layout.first_string_feature() {
                return Err(ValidationError::NonNumericFeature {
                    kind,
                    attribute: name.to_string(),
                });
            }
        }
        Ok(())
    }
}

/// Validates declarations against a [`SchemaCatalog`]
pub struct AttributeSpecValidator<'a> {
    catalog: &'a dyn SchemaCatalog,
    heterogeneous: bool,
}

impl<'a> AttributeSpecValidator<'a> {
    /// Create a validator for a homogeneous or heterogeneous loader
    pub fn new(catalog: &'a dyn SchemaCatalog, heterogeneous: bool) -> Self {
        Self {
            catalog,
            heterogeneous,
        }
    }

    /// Normalize one declaration: trim names, check shape and existence
    pub fn normalize(
        &self,
        kind: EntityKind,
        decl: &AttributeDecl,
    ) -> Result<NormalizedDecl, ValidationError> {
        match decl {
            AttributeDecl::Absent | AttributeDecl::Other(serde_json::Value::Null) => {
                Ok(NormalizedDecl::empty(self.heterogeneous))
            }
            AttributeDecl::Names(names) if names.is_empty() => {
                Ok(NormalizedDecl::empty(self.heterogeneous))
            }
            AttributeDecl::ByType(map) if map.is_empty() => {
                Ok(NormalizedDecl::empty(self.heterogeneous))
            }
            AttributeDecl::Names(_) if self.heterogeneous => Err(ValidationError::SchemaMode {
                kind,
                expected: "a mapping of type name to attributes",
                found: "a sequence",
            }),
            AttributeDecl::ByType(_) if !self.heterogeneous => Err(ValidationError::SchemaMode {
                kind,
                expected: "a sequence of attribute names",
                found: "a mapping",
            }),
            AttributeDecl::Names(names) => {
                let names: Vec<String> = names.iter().map(|n| n.trim().to_string()).collect();
                for name in &names {
                    self.resolve_homogeneous(kind, name)?;
                }
                Ok(NormalizedDecl::Flat(names))
            }
            AttributeDecl::ByType(map) => {
                let mut out = BTreeMap::new();
                for (type_name, names) in map {
                    let type_name = type_name.trim();
                    if !self.catalog.has_type(kind, type_name) {
                        return Err(ValidationError::UnknownEntityType {
                            kind,
                            type_name: type_name.to_string(),
                        });
                    }
                    let names: Vec<String> =
                        names.iter().map(|n| n.trim().to_string()).collect();
                    for name in &names {
                        if self.catalog.attribute_type(kind, type_name, name).is_none() {
                            return Err(ValidationError::UnknownAttribute {
                                kind,
                                type_name: type_name.to_string(),
                                attribute: name.clone(),
                            });
                        }
                    }
                    out.insert(type_name.to_string(), names);
                }
                Ok(NormalizedDecl::ByType(out))
            }
            AttributeDecl::Other(value) => Err(ValidationError::InvalidInputType {
                kind,
                found: describe_value(value),
            }),
        }
    }

    /// Validate the three role declarations of one kind and resolve types
    pub fn resolve(
        &self,
        kind: EntityKind,
        in_features: &AttributeDecl,
        out_labels: &AttributeDecl,
        extra_features: &AttributeDecl,
    ) -> Result<AttributeSpec, ValidationError> {
        let ins = self.normalize(kind, in_features)?;
        let outs = self.normalize(kind, out_labels)?;
        let extras = self.normalize(kind, extra_features)?;

        match (ins, outs, extras) {
            (NormalizedDecl::Flat(ins), NormalizedDecl::Flat(outs), NormalizedDecl::Flat(extras)) => {
                ensure_disjoint(kind, "*", [&ins, &outs, &extras])?;
                let mut types = BTreeMap::new();
                for name in ins.iter().chain(&outs).chain(&extras) {
                    types.insert(name.clone(), self.resolve_homogeneous(kind, name)?);
                }
                Ok(AttributeSpec::Flat(AttributeLayout::new(ins, outs, extras, types)))
            }
            (NormalizedDecl::ByType(ins), NormalizedDecl::ByType(outs), NormalizedDecl::ByType(extras)) => {
                let mut layouts = BTreeMap::new();
                for type_name in self.catalog.types_of(kind) {
                    let pick = |m: &BTreeMap<String, Vec<String>>| {
                        m.get(&type_name).cloned().unwrap_or_default()
                    };
                    let (i, o, e) = (pick(&ins), pick(&outs), pick(&extras));
                    ensure_disjoint(kind, &type_name, [&i, &o, &e])?;
                    let mut types = BTreeMap::new();
                    for name in i.iter().chain(&o).chain(&e) {
                        // Existence was checked by normalize
                        if let Some(ty) = self.catalog.attribute_type(kind, &type_name, name) {
                            types.insert(name.clone(), ty);
                        }
                    }
                    layouts.insert(type_name.clone(), AttributeLayout::new(i, o, e, types));
                }
                Ok(AttributeSpec::ByType(layouts))
            }
            // normalize returns the same shape for every declaration of one validator
            _ => Err(ValidationError::SchemaMode {
                kind,
                expected: "declarations of the same shape",
                found: "mixed sequences and mappings",
            }),
        }
    }

    /// Check that `attribute` is a BOOL vertex attribute usable as seed filter
    pub fn check_filter(&self, attribute: &str) -> Result<(), ValidationError> {
        let attribute = attribute.trim();
        let types: Vec<PrimitiveType> = self
            .catalog
            .vertex_types()
            .iter()
            .filter_map(|t| {
                self.catalog
                    .attribute_type(EntityKind::Vertex, t, attribute)
            })
            .collect();

        if types.is_empty() {
            return Err(ValidationError::InvalidFilter {
                attribute: attribute.to_string(),
                reason: "no vertex type declares it".to_string(),
            });
        }
        if let Some(other) = types.iter().find(|t| **t != PrimitiveType::Bool) {
            return Err(ValidationError::InvalidFilter {
                attribute: attribute.to_string(),
                reason: format!("expected BOOL, found {}", other),
            });
        }
        Ok(())
    }

    fn resolve_homogeneous(
        &self,
        kind: EntityKind,
        attribute: &str,
    ) -> Result<PrimitiveType, ValidationError> {
        self.catalog
            .types_of(kind)
            .iter()
            .find_map(|t| self.catalog.attribute_type(kind, t, attribute))
            .ok_or_else(|| ValidationError::UnknownHomogeneousAttribute {
                kind,
                attribute: attribute.to_string(),
            })
    }
}

fn ensure_disjoint(
    kind: EntityKind,
    type_name: &str,
    roles: [&Vec<String>; 3],
) -> Result<(), ValidationError> {
    let mut seen = HashSet::new();
    for name in roles.iter().flat_map(|r| r.iter()) {
        if !seen.insert(name.as_str()) {
            return Err(ValidationError::DuplicateAttribute {
                kind,
                type_name: type_name.to_string(),
                attribute: name.clone(),
            });
        }
    }
    Ok(())
}

fn describe_value(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::Null => "null".to_string(),
        serde_json::Value::Bool(b) => format!("boolean {}", b),
        serde_json::Value::Number(n) => format!("number {}", n),
        serde_json::Value::String(s) => format!("string '{}'", s),
        serde_json::Value::Array(_) => "a sequence with non-string elements".to_string(),
        serde_json::Value::Object(_) => "a mapping whose values are not name sequences".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::InMemoryCatalog;
    use crate::types::ScalarKind;

    fn cora() -> InMemoryCatalog {
        InMemoryCatalog::new()
            .with_vertex_type(
                "Paper",
                [
                    ("x", PrimitiveType::List(ScalarKind::Int)),
                    ("y", PrimitiveType::Int),
                    ("train_mask", PrimitiveType::Bool),
                    ("val_mask", PrimitiveType::Bool),
                    ("test_mask", PrimitiveType::Bool),
                    ("id", PrimitiveType::Int),
                    ("name", PrimitiveType::String),
                ],
            )
            .with_edge_type(
                "Cite",
                "Paper",
                "Paper",
                [("time", PrimitiveType::Int), ("is_train", PrimitiveType::Bool)],
            )
    }

    fn value(json: &str) -> AttributeDecl {
        serde_json::from_str(json).unwrap()
    }

    #[test]
    fn test_empty_input() {
        let catalog = cora();
        let flat = AttributeSpecValidator::new(&catalog, false);
        let hetero = AttributeSpecValidator::new(&catalog, true);

        for decl in [AttributeDecl::Absent, value("null"), value("[]"), value("{}")] {
            assert_eq!(
                flat.normalize(EntityKind::Vertex, &decl).unwrap(),
                NormalizedDecl::Flat(vec![])
            );
            assert_eq!(
                hetero.normalize(EntityKind::Vertex, &decl).unwrap(),
                NormalizedDecl::ByType(BTreeMap::new())
            );
        }
    }

    #[test]
    fn test_extra_spaces_are_trimmed() {
        let catalog = cora();
        let flat = AttributeSpecValidator::new(&catalog, false);
        assert_eq!(
            flat.normalize(EntityKind::Vertex, &AttributeDecl::names(["x ", " y"]))
                .unwrap(),
            NormalizedDecl::Flat(vec!["x".to_string(), "y".to_string()])
        );

        let hetero = AttributeSpecValidator::new(&catalog, true);
        let decl = AttributeDecl::by_type([("Paper", vec!["x ", " y"])]);
        let mut expected = BTreeMap::new();
        expected.insert("Paper".to_string(), vec!["x".to_string(), "y".to_string()]);
        assert_eq!(
            hetero.normalize(EntityKind::Vertex, &decl).unwrap(),
            NormalizedDecl::ByType(expected)
        );

        assert_eq!(
            flat.normalize(EntityKind::Edge, &AttributeDecl::names(["time ", "is_train"]))
                .unwrap(),
            NormalizedDecl::Flat(vec!["time".to_string(), "is_train".to_string()])
        );
    }

    #[test]
    fn test_wrong_input() {
        let catalog = cora();
        let flat = AttributeSpecValidator::new(&catalog, false);
        let hetero = AttributeSpecValidator::new(&catalog, true);

        assert!(matches!(
            flat.normalize(EntityKind::Vertex, &value("\"x\"")),
            Err(ValidationError::InvalidInputType { .. })
        ));
        assert!(matches!(
            flat.normalize(EntityKind::Vertex, &value("1")),
            Err(ValidationError::InvalidInputType { .. })
        ));
        assert!(matches!(
            flat.normalize(EntityKind::Vertex, &AttributeDecl::names(["nonexist"])),
            Err(ValidationError::UnknownHomogeneousAttribute { .. })
        ));
        assert!(matches!(
            hetero.normalize(
                EntityKind::Vertex,
                &AttributeDecl::by_type([("Paper", vec!["nonexist"])])
            ),
            Err(ValidationError::UnknownAttribute { .. })
        ));
        assert!(matches!(
            hetero.normalize(EntityKind::Vertex, &AttributeDecl::names(["x"])),
            Err(ValidationError::SchemaMode { .. })
        ));
        assert!(matches!(
            flat.normalize(
                EntityKind::Vertex,
                &AttributeDecl::by_type([("Paper", vec!["x"])])
            ),
            Err(ValidationError::SchemaMode { .. })
        ));
        assert!(matches!(
            flat.normalize(EntityKind::Edge, &value("\"time\"")),
            Err(ValidationError::InvalidInputType { .. })
        ));
        assert!(matches!(
            hetero.normalize(
                EntityKind::Edge,
                &AttributeDecl::by_type([("Cite", vec!["nonexist"])])
            ),
            Err(ValidationError::UnknownAttribute { .. })
        ));
    }

    #[test]
    fn test_unknown_type_key() {
        let catalog = cora();
        let hetero = AttributeSpecValidator::new(&catalog, true);
        let err = hetero
            .normalize(
                EntityKind::Vertex,
                &AttributeDecl::by_type([("Author", vec!["x"])]),
            )
            .unwrap_err();
        assert_eq!(
            err,
            ValidationError::UnknownEntityType {
                kind: EntityKind::Vertex,
                type_name: "Author".to_string()
            }
        );
    }

    #[test]
    fn test_resolve_flat_layout() {
        let catalog = cora();
        let validator = AttributeSpecValidator::new(&catalog, false);
        let spec = validator
            .resolve(
                EntityKind::Vertex,
                &AttributeDecl::names(["x"]),
                &AttributeDecl::names(["y"]),
                &AttributeDecl::names(["train_mask"]),
            )
            .unwrap();

        let layout = spec.layout(None).unwrap();
        let order: Vec<_> = layout.columns().map(|(n, _)| n).collect();
        assert_eq!(order, vec!["x", "y", "train_mask"]);
        assert_eq!(layout.type_of("x"), PrimitiveType::List(ScalarKind::Int));
        assert_eq!(layout.type_of("train_mask"), PrimitiveType::Bool);
    }

    #[test]
    fn test_resolve_rejects_overlapping_roles() {
        let catalog = cora();
        let validator = AttributeSpecValidator::new(&catalog, false);
        let err = validator
            .resolve(
                EntityKind::Vertex,
                &AttributeDecl::names(["x", "y"]),
                &AttributeDecl::names(["y"]),
                &AttributeDecl::Absent,
            )
            .unwrap_err();
        assert!(matches!(err, ValidationError::DuplicateAttribute { .. }));
    }

    #[test]
    fn test_resolve_by_type_covers_every_catalog_type() {
        let catalog = cora().with_vertex_type("Author", [("age", PrimitiveType::Int)]);
        let validator = AttributeSpecValidator::new(&catalog, true);
        let spec = validator
            .resolve(
                EntityKind::Vertex,
                &AttributeDecl::by_type([("Paper", vec!["x"])]),
                &AttributeDecl::Absent,
                &AttributeDecl::Absent,
            )
            .unwrap();

        let author = spec.layout(Some("Author")).unwrap();
        assert!(author.is_empty());
        assert_eq!(spec.layout(Some("Paper")).unwrap().in_features, vec!["x"]);
        assert!(spec.layout(None).is_none());
    }

    #[test]
    fn test_seed_marker_is_appended_once() {
        let layout = AttributeLayout::default().with_seed_marker().with_seed_marker();
        assert_eq!(layout.extra_features, vec![IS_SEED_COLUMN.to_string()]);
        assert_eq!(layout.type_of(IS_SEED_COLUMN), PrimitiveType::Bool);
    }

    #[test]
    fn test_numeric_feature_check() {
        let catalog = cora();
        let validator = AttributeSpecValidator::new(&catalog, false);
        let spec = validator
            .resolve(
                EntityKind::Vertex,
                &AttributeDecl::names(["name"]),
                &AttributeDecl::Absent,
                &AttributeDecl::Absent,
            )
            .unwrap();
        assert!(matches!(
            spec.ensure_numeric_features(EntityKind::Vertex),
            Err(ValidationError::NonNumericFeature { .. })
        ));

        // Text is fine as an extra column
        let spec = validator
            .resolve(
                EntityKind::Vertex,
                &AttributeDecl::Absent,
                &AttributeDecl::Absent,
                &AttributeDecl::names(["name"]),
            )
            .unwrap();
        assert!(spec.ensure_numeric_features(EntityKind::Vertex).is_ok());
    }

    #[test]
    fn test_filter_check() {
        let catalog = cora();
        let validator = AttributeSpecValidator::new(&catalog, false);
        assert!(validator.check_filter("train_mask").is_ok());
        assert!(matches!(
            validator.check_filter("y"),
            Err(ValidationError::InvalidFilter { .. })
        ));
        assert!(matches!(
            validator.check_filter("missing"),
            Err(ValidationError::InvalidFilter { .. })
        ));
    }

    use proptest::prelude::*;

    proptest! {
        #[test]
        fn test_normalize_is_idempotent(
            picks in prop::collection::vec(
                prop::sample::select(vec!["x", "y", "train_mask", "val_mask", "id"]),
                0..5
            ),
            pad_left in prop::collection::vec(0usize..3, 5),
            pad_right in prop::collection::vec(0usize..3, 5),
        ) {
            let catalog = cora();
            let validator = AttributeSpecValidator::new(&catalog, false);
            let names: Vec<String> = picks
                .iter()
                .enumerate()
                .map(|(i, n)| format!("{}{}{}", " ".repeat(pad_left[i]), n, " ".repeat(pad_right[i])))
                .collect();

            let once = validator
                .normalize(EntityKind::Vertex, &AttributeDecl::Names(names))
                .unwrap();
            let twice = validator
                .normalize(EntityKind::Vertex, &once.clone().into())
                .unwrap();
            prop_assert_eq!(once, twice);
        }
    }
}
