//! Dense tensors and named features

use crate::wire::Column;

/// Flat tensor storage
#[derive(Debug, Clone, PartialEq)]
pub enum TensorData {
    Int(Vec<i64>),
    Float(Vec<f64>),
    Bool(Vec<bool>),
}

impl TensorData {
    fn len(&self) -> usize {
        match self {
            TensorData::Int(v) => v.len(),
            TensorData::Float(v) => v.len(),
            TensorData::Bool(v) => v.len(),
        }
    }
}

/// Row-major dense tensor
#[derive(Debug, Clone, PartialEq)]
pub struct Tensor {
    shape: Vec<usize>,
    data: TensorData,
}

impl Tensor {
    pub(crate) fn new(shape: Vec<usize>, data: TensorData) -> Self {
        debug_assert_eq!(shape.iter().product::<usize>(), data.len());
        Self { shape, data }
    }

    /// Empty tensor of the given shape (one dimension must be 0)
    pub fn empty_int(shape: Vec<usize>) -> Self {
        Self::new(shape, TensorData::Int(Vec::new()))
    }

    pub fn shape(&self) -> &[usize] {
        &self.shape
    }

    pub fn data(&self) -> &TensorData {
        &self.data
    }

    /// Number of elements
    pub fn numel(&self) -> usize {
        self.data.len()
    }

    /// Element type name
    pub fn dtype(&self) -> &'static str {
        match self.data {
            TensorData::Int(_) => "int64",
            TensorData::Float(_) => "float64",
            TensorData::Bool(_) => "bool",
        }
    }

    pub fn as_i64(&self) -> Option<&[i64]> {
        match &self.data {
            TensorData::Int(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<&[f64]> {
        match &self.data {
            TensorData::Float(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<&[bool]> {
        match &self.data {
            TensorData::Bool(v) => Some(v),
            _ => None,
        }
    }

    /// Append `n` rows of zeros (`false` for booleans)
    pub(crate) fn pad_rows(&mut self, n: usize) {
        let width: usize = self.shape.iter().skip(1).product();
        match &mut self.data {
            TensorData::Int(v) => v.resize(v.len() + n * width, 0),
            TensorData::Float(v) => v.resize(v.len() + n * width, 0.0),
            TensorData::Bool(v) => v.resize(v.len() + n * width, false),
        }
        if let Some(rows) = self.shape.first_mut() {
            *rows += n;
        }
    }

    /// Tensor holding one column: `[n]` for scalars, `[n, w]` for lists
    ///
    /// Text columns have no tensor form.
    pub fn from_column(column: &Column) -> Option<Tensor> {
        let n = column.len();
        let tensor = match column {
            Column::Int(v) => Tensor::new(vec![n], TensorData::Int(v.clone())),
            Column::Float(v) => Tensor::new(vec![n], TensorData::Float(v.clone())),
            Column::Bool(v) => Tensor::new(vec![n], TensorData::Bool(v.clone())),
            Column::Str(_) => return None,
            Column::IntList { width, values, .. } => {
                Tensor::new(vec![n, *width], TensorData::Int(values.clone()))
            }
            Column::FloatList { width, values, .. } => {
                Tensor::new(vec![n, *width], TensorData::Float(values.clone()))
            }
        };
        Some(tensor)
    }

    /// Concatenate columns side by side into a `[rows, total_width]` tensor
    ///
    /// Integers and booleans are promoted to float when any column is
    /// floating point. Text columns are skipped.
    pub fn stack(columns: &[&Column], rows: usize) -> Tensor {
        let columns: Vec<&Column> = columns.iter().copied().filter(|c| !c.is_text()).collect();
        let width: usize = columns.iter().map(|c| c.width()).sum();

        if columns.iter().any(|c| c.is_float()) {
            let mut out = Vec::with_capacity(rows * width);
            for row in 0..rows {
                for column in &columns {
                    push_row(column, row, &mut out, |v| v as f64, |v| v, |b| f64::from(u8::from(b)));
                }
            }
            Tensor::new(vec![rows, width], TensorData::Float(out))
        } else {
            let mut out = Vec::with_capacity(rows * width);
            for row in 0..rows {
                for column in &columns {
                    push_row(column, row, &mut out, |v| v, |v| v as i64, i64::from);
                }
            }
            Tensor::new(vec![rows, width], TensorData::Int(out))
        }
    }
}

fn push_row<T>(
    column: &Column,
    row: usize,
    out: &mut Vec<T>,
    from_int: impl Fn(i64) -> T,
    from_float: impl Fn(f64) -> T,
    from_bool: impl Fn(bool) -> T,
) {
    match column {
        Column::Int(v) => out.push(from_int(v[row])),
        Column::Float(v) => out.push(from_float(v[row])),
        Column::Bool(v) => out.push(from_bool(v[row])),
        Column::Str(_) => {}
        Column::IntList { width, values, .. } => out.extend(
            values[row * width..(row + 1) * width]
                .iter()
                .map(|&v| from_int(v)),
        ),
        Column::FloatList { width, values, .. } => out.extend(
            values[row * width..(row + 1) * width]
                .iter()
                .map(|&v| from_float(v)),
        ),
    }
}

/// Named attribute of a graph store
#[derive(Debug, Clone, PartialEq)]
pub enum Feature {
    Tensor(Tensor),
    /// Text attribute, one entry per node or edge
    Strings(Vec<String>),
}

impl Feature {
    /// Feature holding one column as-is
    pub fn from_column(column: &Column) -> Feature {
        match column {
            Column::Str(v) => Feature::Strings(v.clone()),
            other => match Tensor::from_column(other) {
                Some(t) => Feature::Tensor(t),
                None => Feature::Strings(Vec::new()),
            },
        }
    }

    /// Append `n` zero or empty entries
    pub(crate) fn pad_rows(&mut self, n: usize) {
        match self {
            Feature::Tensor(t) => t.pad_rows(n),
            Feature::Strings(s) => s.resize(s.len() + n, String::new()),
        }
    }

    pub fn as_tensor(&self) -> Option<&Tensor> {
        match self {
            Feature::Tensor(t) => Some(t),
            Feature::Strings(_) => None,
        }
    }

    pub fn as_strings(&self) -> Option<&[String]> {
        match self {
            Feature::Strings(s) => Some(s),
            Feature::Tensor(_) => None,
        }
    }
}
