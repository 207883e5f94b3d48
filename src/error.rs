//! Error handling for the graph batch loader
//!
//! This module defines the error taxonomy and a Result alias for use
//! throughout the crate.
//!
//! # Taxonomy
//!
//! - [`ValidationError`] - Bad attribute declarations or loader settings. Raised
//!   synchronously while the loader is built, before any worker starts.
//! - [`WireFormatError`] - A payload does not match the declared layout. Fatal to
//!   one batch, never retried.
//! - [`FetchError`] - The graph store could not deliver a payload. Surfaced to
//!   the consumer; retry policy belongs to the client.
//! - [`StateError`] - The loader was used in a way its current state forbids.
//! - [`BatchError`] - A per-batch failure (decode or fetch) tagged with the
//!   batch index, as delivered through the result queue.

use crate::types::EntityKind;
use thiserror::Error;

/// Main error type for loader operations
#[derive(Error, Debug)]
pub enum LoaderError {
    /// Attribute declaration or settings rejected at construction
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    /// Malformed payload
    #[error("Wire format error: {0}")]
    WireFormat(#[from] WireFormatError),

    /// Graph store failure
    #[error("Fetch error: {0}")]
    Fetch(#[from] FetchError),

    /// Invalid use of the loader
    #[error("State error: {0}")]
    State(#[from] StateError),

    /// A single batch failed inside the pipeline
    #[error("{0}")]
    Batch(#[from] BatchError),

    /// Errors related to configuration loading
    #[error("Configuration error: {0}")]
    Config(String),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Generic errors with context
    #[error("{context}: {source}")]
    WithContext {
        context: String,
        #[source]
        source: Box<LoaderError>,
    },
}

impl LoaderError {
    /// Add context to an error
    pub fn with_context(self, context: impl Into<String>) -> Self {
        LoaderError::WithContext {
            context: context.into(),
            source: Box::new(self),
        }
    }

    /// The batch error carried by this error, looking through context layers
    pub fn as_batch_error(&self) -> Option<&BatchError> {
        match self {
            LoaderError::Batch(err) => Some(err),
            LoaderError::WithContext { source, .. } => source.as_batch_error(),
            _ => None,
        }
    }
}

/// Result type alias for loader operations
pub type Result<T> = std::result::Result<T, LoaderError>;

/// Extension trait for adding context to Results
pub trait ResultExt<T> {
    /// Add context to an error result
    fn context(self, context: impl Into<String>) -> Result<T>;

    /// Add context lazily to an error result
    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String;
}

impl<T, E> ResultExt<T> for std::result::Result<T, E>
where
    E: Into<LoaderError>,
{
    fn context(self, context: impl Into<String>) -> Result<T> {
        self.map_err(|e| e.into().with_context(context))
    }

    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String,
    {
        self.map_err(|e| e.into().with_context(f()))
    }
}

// ==================== Validation ====================

/// Errors raised while validating attribute declarations and loader settings
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    /// Attribute not declared by the schema for its type
    #[error("{kind} attribute '{attribute}' does not exist on type '{type_name}'")]
    UnknownAttribute {
        kind: EntityKind,
        type_name: String,
        attribute: String,
    },

    /// Attribute not declared by any type of this kind (homogeneous lookup)
    #[error("{kind} attribute '{attribute}' does not exist on any {kind} type")]
    UnknownHomogeneousAttribute { kind: EntityKind, attribute: String },

    /// Type name not present in the schema
    #[error("{kind} type '{type_name}' does not exist in the schema")]
    UnknownEntityType { kind: EntityKind, type_name: String },

    /// Sequence given to a heterogeneous loader or map to a homogeneous one
    #[error("{kind} attributes: expected {expected}, got {found}")]
    SchemaMode {
        kind: EntityKind,
        expected: &'static str,
        found: &'static str,
    },

    /// Declaration is neither absent, a sequence, nor a mapping
    #[error("{kind} attributes: unsupported declaration {found}")]
    InvalidInputType { kind: EntityKind, found: String },

    /// Same attribute used in more than one role
    #[error("{kind} attribute '{attribute}' is declared more than once for type '{type_name}'")]
    DuplicateAttribute {
        kind: EntityKind,
        type_name: String,
        attribute: String,
    },

    /// Text attribute requested as a tensor feature or label
    #[error("{kind} attribute '{attribute}' is STRING and cannot be stacked into a tensor")]
    NonNumericFeature { kind: EntityKind, attribute: String },

    /// Seed filter attribute missing or not boolean
    #[error("filter attribute '{attribute}': {reason}")]
    InvalidFilter { attribute: String, reason: String },

    /// Heterogeneous edge type whose endpoint types the schema does not name
    #[error("edge type '{type_name}' has no source and target vertex types in the schema")]
    MissingEndpoints { type_name: String },

    /// Numeric setting out of range or contradictory settings
    #[error("invalid setting '{field}': {reason}")]
    InvalidSetting { field: &'static str, reason: String },
}

// ==================== Wire format ====================

/// Errors raised while decoding a payload
#[derive(Error, Debug, Clone, PartialEq)]
pub enum WireFormatError {
    /// Payload is not valid UTF-8
    #[error("{kind} payload is not valid UTF-8 (at byte {offset})")]
    InvalidUtf8 { kind: EntityKind, offset: usize },

    /// Record field count does not match the declared layout
    #[error("{kind} record {line}: expected {expected} fields, found {found}")]
    FieldCount {
        kind: EntityKind,
        line: usize,
        expected: usize,
        found: usize,
    },

    /// Field value cannot be coerced to its declared type
    #[error("{kind} record {line}: column '{column}' cannot parse '{value}' as {expected}")]
    InvalidValue {
        kind: EntityKind,
        line: usize,
        column: String,
        value: String,
        expected: &'static str,
    },

    /// List width differs from the width of the first record
    #[error("{kind} record {line}: column '{column}' has {found} elements, expected {expected}")]
    ListWidth {
        kind: EntityKind,
        line: usize,
        column: String,
        expected: usize,
        found: usize,
    },

    /// Heterogeneous record prefixed with an undeclared type
    #[error("{kind} record {line}: undeclared type '{type_name}'")]
    UnknownType {
        kind: EntityKind,
        line: usize,
        type_name: String,
    },

    /// Decoded edge type with no known endpoint vertex types
    #[error("edge type '{type_name}' has no endpoint vertex types")]
    UnknownRelation { type_name: String },

    /// Edge endpoint missing from the vertex half of a combined payload
    #[error("edge {edge}: endpoint '{vertex_id}' is not present in the vertex payload")]
    DanglingEdge { edge: usize, vertex_id: String },

    /// Payload shape does not match the requested payload kind
    #[error("payload shape mismatch: expected {expected}, got {found}")]
    PayloadShape {
        expected: &'static str,
        found: &'static str,
    },
}

// ==================== Fetch ====================

/// Errors raised while fetching a payload from the graph store
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FetchError {
    /// Transport-level failure (connection refused, DNS, TLS)
    #[error("transport error: {0}")]
    Transport(String),

    /// The store answered with an error
    #[error("remote error: {0}")]
    Remote(String),

    /// No payload within the allotted time
    #[error("timed out after {0} ms")]
    Timeout(u64),

    /// Response body could not be interpreted
    #[error("invalid response: {0}")]
    InvalidResponse(String),

    /// Stream ended before delivering every payload part
    #[error("stream closed before the batch was complete")]
    StreamClosed,

    /// Loader was closed while the fetch was in flight
    #[error("fetch cancelled")]
    Cancelled,
}

// ==================== State ====================

/// Errors raised when the loader is used in a way its state forbids
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StateError {
    /// Pull after the single epoch of a non-looping loader
    #[error("loader exhausted: the epoch is complete and looping is disabled")]
    Exhausted,

    /// Any use after close
    #[error("loader is closed")]
    Closed,

    /// Whole-graph accessor on a mini-batch loader and vice versa
    #[error("operation requires {expected} mode, loader is in {actual} mode")]
    ModeMismatch {
        expected: &'static str,
        actual: &'static str,
    },

    /// Every worker disappeared without reporting completion
    #[error("worker pool terminated unexpectedly")]
    WorkerLost,

    /// Whole-graph epoch finished without producing its batch
    #[error("whole-graph epoch produced no batch")]
    NoData,
}

// ==================== Per-batch failures ====================

/// Cause of a failed batch
#[derive(Error, Debug, Clone, PartialEq)]
pub enum BatchFailure {
    /// Payload could not be fetched
    #[error("fetch failed: {0}")]
    Fetch(#[from] FetchError),

    /// Payload could not be decoded or assembled
    #[error("decode failed: {0}")]
    Decode(#[from] WireFormatError),
}

impl BatchFailure {
    /// Check if this failure came from the decode step
    pub fn is_decode(&self) -> bool {
        matches!(self, BatchFailure::Decode(_))
    }
}

/// A failed batch, tagged with its position in the epoch
#[derive(Error, Debug, Clone, PartialEq)]
#[error("batch {index} of epoch {epoch}: {cause}")]
pub struct BatchError {
    /// Position of the batch within the epoch's task sequence
    pub index: usize,
    /// Epoch the batch belongs to
    pub epoch: u64,
    /// What went wrong
    #[source]
    pub cause: BatchFailure,
}
