//! Column-major decoded data

use crate::schema::validator::AttributeRole;
use crate::types::EntityKind;

/// One typed column
#[derive(Debug, Clone, PartialEq)]
pub enum Column {
    Int(Vec<i64>),
    Float(Vec<f64>),
    Bool(Vec<bool>),
    Str(Vec<String>),
    /// Row-major `[rows, width]` integers
    IntList {
        width: usize,
        rows: usize,
        values: Vec<i64>,
    },
    /// Row-major `[rows, width]` floats
    FloatList {
        width: usize,
        rows: usize,
        values: Vec<f64>,
    },
}

impl Column {
    /// Number of rows
    pub fn len(&self) -> usize {
        match self {
            Column::Int(v) => v.len(),
            Column::Float(v) => v.len(),
            Column::Bool(v) => v.len(),
            Column::Str(v) => v.len(),
            Column::IntList { rows, .. } | Column::FloatList { rows, .. } => *rows,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of values per row (1 for scalars)
    pub fn width(&self) -> usize {
        match self {
            Column::IntList { width, .. } | Column::FloatList { width, .. } => *width,
            _ => 1,
        }
    }

    /// Whether the column holds text
    pub fn is_text(&self) -> bool {
        matches!(self, Column::Str(_))
    }

    /// Whether the column holds floating point values
    pub fn is_float(&self) -> bool {
        matches!(self, Column::Float(_) | Column::FloatList { .. })
    }

    /// Type name used in logs and frame dumps
    pub fn type_label(&self) -> &'static str {
        match self {
            Column::Int(_) => "int",
            Column::Float(_) => "float",
            Column::Bool(_) => "bool",
            Column::Str(_) => "string",
            Column::IntList { .. } => "list<int>",
            Column::FloatList { .. } => "list<float>",
        }
    }

    /// New column made of the rows at `order`, in that order
    ///
    /// Every index in `order` must be below `self.len()`.
    pub fn take(&self, order: &[usize]) -> Column {
        match self {
            Column::Int(v) => Column::Int(order.iter().map(|&i| v[i]).collect()),
            Column::Float(v) => Column::Float(order.iter().map(|&i| v[i]).collect()),
            Column::Bool(v) => Column::Bool(order.iter().map(|&i| v[i]).collect()),
            Column::Str(v) => Column::Str(order.iter().map(|&i| v[i].clone()).collect()),
            Column::IntList { width, values, .. } => Column::IntList {
                width: *width,
                rows: order.len(),
                values: take_rows(values, *width, order),
            },
            Column::FloatList { width, values, .. } => Column::FloatList {
                width: *width,
                rows: order.len(),
                values: take_rows(values, *width, order),
            },
        }
    }

    /// Row `i` rendered as text
    pub fn render(&self, i: usize) -> String {
        match self {
            Column::Int(v) => v[i].to_string(),
            Column::Float(v) => v[i].to_string(),
            Column::Bool(v) => v[i].to_string(),
            Column::Str(v) => v[i].clone(),
            Column::IntList { width, values, .. } => join(&values[i * width..(i + 1) * width]),
            Column::FloatList { width, values, .. } => join(&values[i * width..(i + 1) * width]),
        }
    }
}

fn take_rows<T: Copy>(values: &[T], width: usize, order: &[usize]) -> Vec<T> {
    let mut out = Vec::with_capacity(order.len() * width);
    for &i in order {
        out.extend_from_slice(&values[i * width..(i + 1) * width]);
    }
    out
}

fn join<T: ToString>(values: &[T]) -> String {
    values
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(" ")
}

/// What a column is for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnRole {
    /// `vid`, `source` or `target`
    Identity,
    /// Declared attribute
    Attribute(AttributeRole),
}

/// Column with its name and role
#[derive(Debug, Clone, PartialEq)]
pub struct NamedColumn {
    pub name: String,
    pub role: ColumnRole,
    pub column: Column,
}

/// Decoded records of one entity kind (and one type, for heterogeneous data)
///
/// Identity columns come first, then attributes in declaration order.
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedColumns {
    pub kind: EntityKind,
    /// Type name for heterogeneous payloads
    pub type_name: Option<String>,
    pub columns: Vec<NamedColumn>,
    num_rows: usize,
}

impl DecodedColumns {
    pub(crate) fn new(
        kind: EntityKind,
        type_name: Option<String>,
        columns: Vec<NamedColumn>,
        num_rows: usize,
    ) -> Self {
        Self {
            kind,
            type_name,
            columns,
            num_rows,
        }
    }

    /// Number of records
    pub fn num_rows(&self) -> usize {
        self.num_rows
    }

    pub fn is_empty(&self) -> bool {
        self.num_rows == 0
    }

    /// Column by name
    pub fn get(&self, name: &str) -> Option<&Column> {
        self.columns
            .iter()
            .find(|c| c.name == name)
            .map(|c| &c.column)
    }

    /// Column names in order
    pub fn names(&self) -> Vec<&str> {
        self.columns.iter().map(|c| c.name.as_str()).collect()
    }

    /// Columns playing `role`, in order
    pub fn with_role(&self, role: AttributeRole) -> impl Iterator<Item = &NamedColumn> + '_ {
        self.columns
            .iter()
            .filter(move |c| c.role == ColumnRole::Attribute(role))
    }

    /// Text of the identity column at `position` (0 = `vid` or `source`)
    pub fn identity(&self, position: usize) -> &[String] {
        match self
            .columns
            .iter()
            .filter(|c| c.role == ColumnRole::Identity)
            .nth(position)
            .map(|c| &c.column)
        {
            Some(Column::Str(ids)) => ids,
            _ => &[],
        }
    }

    /// Same columns, rows permuted to `order`
    pub fn take(&self, order: &[usize]) -> DecodedColumns {
        DecodedColumns {
            kind: self.kind,
            type_name: self.type_name.clone(),
            columns: self
                .columns
                .iter()
                .map(|c| NamedColumn {
                    name: c.name.clone(),
                    role: c.role,
                    column: c.column.take(order),
                })
                .collect(),
            num_rows: order.len(),
        }
    }
}
