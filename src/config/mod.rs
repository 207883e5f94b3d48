//! Loader configuration
//!
//! [`LoaderConfig`] gathers every setting of a [`BatchLoader`] and loads from
//! JSON or TOML. Every field has a default, so a config file only needs the
//! settings that differ.
//!
//! # Example
//!
//! ```toml
//! payload = "graph"
//! output_format = "graph"
//!
//! [attributes]
//! v_in_feats = ["x"]
//! v_out_labels = ["y"]
//! v_extra_feats = ["train_mask"]
//!
//! [batching]
//! batch_size = 16
//!
//! [pipeline]
//! num_workers = 4
//! shuffle = true
//!
//! [sampling]
//! num_neighbors = 10
//! num_hops = 2
//! filter_by = "train_mask"
//! add_self_loop = true
//! ```
//!
//! [`BatchLoader`]: crate::pipeline::BatchLoader

use crate::error::{LoaderError, Result, ValidationError};
use crate::schema::{AttributeDecl, AttributeSpec};
use crate::source::param;
use crate::types::{OutputFormat, PayloadKind};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

/// Complete loader configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LoaderConfig {
    /// Attribute declarations per role
    #[serde(default)]
    pub attributes: AttributeConfig,
    /// Per-type declarations and type-prefixed records
    #[serde(default)]
    pub heterogeneous: bool,
    /// What each batch query returns
    #[serde(default)]
    pub payload: PayloadKind,
    /// Representation handed to the consumer
    #[serde(default)]
    pub output_format: OutputFormat,
    /// Identifier sent with every task; random when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub loader_id: Option<String>,
    #[serde(default)]
    pub batching: BatchingConfig,
    #[serde(default)]
    pub pipeline: PipelineConfig,
    #[serde(default)]
    pub sampling: SamplingConfig,
}

// ==================== Attributes ====================

/// Attribute declarations, as written by the user
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AttributeConfig {
    /// Vertex input features
    #[serde(default, skip_serializing_if = "AttributeDecl::is_absent")]
    pub v_in_feats: AttributeDecl,
    /// Vertex labels
    #[serde(default, skip_serializing_if = "AttributeDecl::is_absent")]
    pub v_out_labels: AttributeDecl,
    /// Vertex extra columns
    #[serde(default, skip_serializing_if = "AttributeDecl::is_absent")]
    pub v_extra_feats: AttributeDecl,
    /// Edge input features
    #[serde(default, skip_serializing_if = "AttributeDecl::is_absent")]
    pub e_in_feats: AttributeDecl,
    /// Edge labels
    #[serde(default, skip_serializing_if = "AttributeDecl::is_absent")]
    pub e_out_labels: AttributeDecl,
    /// Edge extra columns
    #[serde(default, skip_serializing_if = "AttributeDecl::is_absent")]
    pub e_extra_feats: AttributeDecl,
}

// ==================== Batching ====================

/// How the seed set is split into batches
///
/// Mini-batch mode needs exactly one of `batch_size` and `num_batches`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BatchingConfig {
    /// Fetch the whole graph as a single batch
    #[serde(default)]
    pub whole_graph: bool,
    /// Seeds per batch
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub batch_size: Option<usize>,
    /// Batches per epoch
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub num_batches: Option<usize>,
}

// ==================== Pipeline ====================

/// Worker pool and queue settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Reader threads per epoch
    #[serde(default = "default_num_workers")]
    pub num_workers: usize,
    /// Capacity of the result queue
    #[serde(default = "default_buffer_size")]
    pub buffer_size: usize,
    /// Shuffle seeds at the start of every epoch
    #[serde(default)]
    pub shuffle: bool,
    /// Seed of the shuffling RNG; entropy when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub shuffle_seed: Option<u64>,
    /// Start a new epoch instead of failing once an epoch is consumed
    #[serde(default)]
    pub looping: bool,
    /// Drop batches whose payload fails to decode
    #[serde(default)]
    pub skip_malformed: bool,
    /// Poll interval of stream fetches
    #[serde(default = "default_stream_poll_interval_ms")]
    pub stream_poll_interval_ms: u64,
    /// Give up on a stream fetch after this long
    #[serde(default = "default_stream_timeout_ms")]
    pub stream_timeout_ms: u64,
}

fn default_num_workers() -> usize {
    2
}

fn default_buffer_size() -> usize {
    4
}

fn default_stream_poll_interval_ms() -> u64 {
    50
}

fn default_stream_timeout_ms() -> u64 {
    30_000
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            num_workers: default_num_workers(),
            buffer_size: default_buffer_size(),
            shuffle: false,
            shuffle_seed: None,
            looping: false,
            skip_malformed: false,
            stream_poll_interval_ms: default_stream_poll_interval_ms(),
            stream_timeout_ms: default_stream_timeout_ms(),
        }
    }
}

impl PipelineConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.stream_poll_interval_ms)
    }

    pub fn stream_timeout(&self) -> Duration {
        Duration::from_millis(self.stream_timeout_ms)
    }
}

// ==================== Sampling ====================

/// Parameters forwarded to the server-side sampler
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SamplingConfig {
    /// Neighbors sampled per vertex and hop; -1 takes all
    #[serde(default = "default_num_neighbors")]
    pub num_neighbors: i64,
    /// Hops around each seed
    #[serde(default = "default_num_hops")]
    pub num_hops: u32,
    /// BOOL vertex attribute selecting seed candidates
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filter_by: Option<String>,
    /// Append a self loop per node to graph output
    #[serde(default)]
    pub add_self_loop: bool,
}

fn default_num_neighbors() -> i64 {
    10
}

fn default_num_hops() -> u32 {
    2
}

impl Default for SamplingConfig {
    fn default() -> Self {
        Self {
            num_neighbors: default_num_neighbors(),
            num_hops: default_num_hops(),
            filter_by: None,
            add_self_loop: false,
        }
    }
}

impl LoaderConfig {
    /// Load from a `.json` or `.toml` file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            LoaderError::Config(format!("Failed to read loader config {:?}: {}", path, e))
        })?;

        match path.extension().and_then(|e| e.to_str()) {
            Some("json") => Self::from_json(&content),
            Some("toml") => Self::from_toml(&content),
            _ => Err(LoaderError::Config(format!(
                "Unsupported config format {:?}: expected .json or .toml",
                path
            ))),
        }
    }

    pub fn from_json(content: &str) -> Result<Self> {
        serde_json::from_str(content)
            .map_err(|e| LoaderError::Config(format!("Failed to parse loader config: {}", e)))
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        toml::from_str(content)
            .map_err(|e| LoaderError::Config(format!("Failed to parse loader config: {}", e)))
    }

    /// Save as pretty JSON
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let content = serde_json::to_string_pretty(self)
            .map_err(|e| LoaderError::Config(format!("Failed to serialize loader config: {}", e)))?;
        std::fs::write(path, content).map_err(|e| {
            LoaderError::Config(format!("Failed to write loader config {:?}: {}", path, e))
        })
    }

    /// Check numeric bounds and mode settings
    pub fn validate(&self) -> std::result::Result<(), ValidationError> {
        let invalid = |field: &'static str, reason: &str| {
            Err(ValidationError::InvalidSetting {
                field,
                reason: reason.to_string(),
            })
        };

        if self.pipeline.num_workers == 0 {
            return invalid("pipeline.num_workers", "must be at least 1");
        }
        if self.pipeline.buffer_size == 0 {
            return invalid("pipeline.buffer_size", "must be at least 1");
        }
        if self.pipeline.stream_poll_interval_ms == 0 {
            return invalid("pipeline.stream_poll_interval_ms", "must be at least 1");
        }
        if self.sampling.num_hops == 0 {
            return invalid("sampling.num_hops", "must be at least 1");
        }
        if self.sampling.num_neighbors < -1 {
            return invalid("sampling.num_neighbors", "must be -1 or non-negative");
        }
        if self.sampling.add_self_loop && self.output_format != OutputFormat::Graph {
            return invalid("sampling.add_self_loop", "only applies to graph output");
        }

        let batching = &self.batching;
        if batching.whole_graph {
            if batching.batch_size.is_some() || batching.num_batches.is_some() {
                return invalid(
                    "batching.whole_graph",
                    "cannot be combined with batch_size or num_batches",
                );
            }
            return Ok(());
        }
        match (batching.batch_size, batching.num_batches) {
            (Some(_), Some(_)) => invalid(
                "batching.batch_size",
                "give either batch_size or num_batches, not both",
            ),
            (None, None) => invalid(
                "batching.batch_size",
                "mini-batch mode needs batch_size or num_batches",
            ),
            (Some(0), None) => invalid("batching.batch_size", "must be at least 1"),
            (None, Some(0)) => invalid("batching.num_batches", "must be at least 1"),
            _ => Ok(()),
        }
    }

    /// Query parameters shared by every task
    ///
    /// Attribute lists are taken from the resolved specs so the store renders
    /// exactly the columns the decoder expects.
    pub fn query_params(
        &self,
        vertex: Option<&AttributeSpec>,
        edge: Option<&AttributeSpec>,
    ) -> BTreeMap<String, String> {
        let mut params = BTreeMap::new();
        if let Some(spec) = vertex {
            let [i, o, e] = role_lists(spec);
            params.insert(param::VERTEX_IN_FEATURES.to_string(), i);
            params.insert(param::VERTEX_OUT_LABELS.to_string(), o);
            params.insert(param::VERTEX_EXTRA_FEATURES.to_string(), e);
        }
        if let Some(spec) = edge {
            let [i, o, e] = role_lists(spec);
            params.insert(param::EDGE_IN_FEATURES.to_string(), i);
            params.insert(param::EDGE_OUT_LABELS.to_string(), o);
            params.insert(param::EDGE_EXTRA_FEATURES.to_string(), e);
        }
        if !self.batching.whole_graph {
            params.insert(
                param::NUM_NEIGHBORS.to_string(),
                self.sampling.num_neighbors.to_string(),
            );
            params.insert(param::NUM_HOPS.to_string(), self.sampling.num_hops.to_string());
        }
        if let Some(filter) = &self.sampling.filter_by {
            params.insert(param::FILTER_BY.to_string(), filter.trim().to_string());
        }
        params
    }
}

/// Comma-joined names per role; heterogeneous names are `Type.attr`
fn role_lists(spec: &AttributeSpec) -> [String; 3] {
    let sep = param::LIST_SEPARATOR.to_string();
    match spec {
        AttributeSpec::Flat(layout) => [
            layout.in_features.join(&sep),
            layout.out_labels.join(&sep),
            layout.extra_features.join(&sep),
        ],
        AttributeSpec::ByType(layouts) => {
            let mut lists: [Vec<String>; 3] = Default::default();
            for (type_name, layout) in layouts {
                let roles = [
                    &layout.in_features,
                    &layout.out_labels,
                    &layout.extra_features,
                ];
                for (list, names) in lists.iter_mut().zip(roles) {
                    list.extend(names.iter().map(|n| format!("{}.{}", type_name, n)));
                }
            }
            lists.map(|list| list.join(&sep))
        }
    }
}
