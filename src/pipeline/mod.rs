//! Batch pipeline
//!
//! The loader fills a bounded task queue at the start of every epoch and
//! starts a small pool of reader threads. Readers fetch, decode and assemble
//! batches and push them on a bounded result queue the consumer pulls from.
//!
//! # Architecture
//!
//! ```text
//!              tasks (bounded)            results (bounded)
//! [EpochPlan] ────────────────► [BatchReader] × N ────────────────► [BatchLoader] ──► caller
//!                                   │
//!                                   └── GraphStoreClient → WireDecoder → BatchAssembler
//! ```
//!
//! - **Backpressure**: a full result queue blocks the readers.
//! - **Sentinels**: each reader sends one `Done` when it runs out of tasks;
//!   the epoch ends when every started reader has sent it.
//! - **Cancellation**: a shared flag, checked between tasks and stream polls.

pub mod loader;
pub mod task;
pub(crate) mod worker;

pub use loader::{BatchLoader, LoaderBuilder, PipelineStatus};
pub use task::{EpochPlan, SeedSelection, Split};
