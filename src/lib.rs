//! # graph-batch-loader: streaming graph mini-batch loader
//!
//! Fetches vertex and edge batches from a graph store, decodes the delimited
//! wire payload into typed columns, and assembles ML-ready batches: column
//! frames or tensor graphs with a local edge index.
//!
//! ## Architecture
//!
//! - **Schema**: Attribute declarations validated against a schema catalog
//!   before any I/O
//! - **Wire**: Positional decoding of `\n` / `,` / space delimited payloads
//! - **Assemble**: Frames or tensor graphs with seeds-first local indexing
//! - **Pipeline**: Reader thread pool, bounded queues, sentinel-based epochs
//! - **Source**: REST polling, broker subscription and in-memory graph stores
//! - **Communication**: Crossbeam channels between readers and the consumer
//!
//! ## Example
//!
//! ```ignore
//! use graph_batch_loader::{
//!     config::LoaderConfig,
//!     schema::InMemoryCatalog,
//!     source::rest::{RestClient, RestClientConfig},
//!     LoaderBuilder,
//! };
//!
//! fn main() -> graph_batch_loader::Result<()> {
//!     graph_batch_loader::logging::init_default();
//!
//!     let config = LoaderConfig::load("loader.toml")?;
//!     let catalog = InMemoryCatalog::load("schema.json")?;
//!     let client = RestClient::new(RestClientConfig::default())?;
//!
//!     let mut loader = LoaderBuilder::new(config)
//!         .catalog(catalog)
//!         .client(client)
//!         .build()?;
//!
//!     for batch in &mut loader {
//!         let batch = batch?;
//!         println!("{} vertices", batch.num_vertices());
//!     }
//!     Ok(())
//! }
//! ```

pub mod assemble;
pub mod config;
pub mod error;
pub mod logging;
pub mod pipeline;
pub mod schema;
pub mod source;
pub mod types;
pub mod wire;

// Re-export commonly used types
pub use assemble::{BatchAssembler, BatchObject, FrameBatch, GraphBatch, Tensor};
pub use config::LoaderConfig;
pub use error::{LoaderError, Result};
pub use pipeline::{BatchLoader, LoaderBuilder, PipelineStatus};
pub use schema::{AttributeDecl, AttributeSpec, InMemoryCatalog, SchemaCatalog};
pub use source::{GraphStoreClient, SeedVertex, TaskDescriptor};
pub use types::{EntityKind, OutputFormat, PayloadKind, PrimitiveType};
pub use wire::{RawRecordBatch, WireDecoder};
