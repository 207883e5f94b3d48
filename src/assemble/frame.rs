//! Tabular batch output

use crate::types::EntityKind;
use crate::wire::{Column, DecodedColumns};
use std::collections::BTreeMap;

/// Named columns of one entity table, in decode order
#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    pub kind: EntityKind,
    pub type_name: Option<String>,
    columns: Vec<(String, Column)>,
    num_rows: usize,
}

impl Frame {
    pub fn num_rows(&self) -> usize {
        self.num_rows
    }

    pub fn is_empty(&self) -> bool {
        self.num_rows == 0
    }

    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|(n, _)| n == name).map(|(_, c)| c)
    }

    pub fn names(&self) -> Vec<&str> {
        self.columns.iter().map(|(n, _)| n.as_str()).collect()
    }

    pub fn columns(&self) -> impl Iterator<Item = (&str, &Column)> + '_ {
        self.columns.iter().map(|(n, c)| (n.as_str(), c))
    }

    /// Row `i` with every value rendered as text
    pub fn row(&self, i: usize) -> Vec<String> {
        self.columns.iter().map(|(_, c)| c.render(i)).collect()
    }
}

impl From<DecodedColumns> for Frame {
    fn from(decoded: DecodedColumns) -> Self {
        let num_rows = decoded.num_rows();
        Frame {
            kind: decoded.kind,
            type_name: decoded.type_name,
            columns: decoded
                .columns
                .into_iter()
                .map(|c| (c.name, c.column))
                .collect(),
            num_rows,
        }
    }
}

/// Vertex frame and edge frame of one batch
#[derive(Debug, Clone, PartialEq, Default)]
pub struct FrameBatch {
    pub vertices: Option<Frame>,
    pub edges: Option<Frame>,
}

/// Per-type frames of one heterogeneous batch
#[derive(Debug, Clone, PartialEq, Default)]
pub struct HeteroFrameBatch {
    pub vertices: BTreeMap<String, Frame>,
    pub edges: BTreeMap<String, Frame>,
}
