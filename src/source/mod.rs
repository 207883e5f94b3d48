//! Graph store sources
//!
//! Workers never talk to the network directly. They hand a
//! [`TaskDescriptor`] to a [`GraphStoreClient`], which either returns the
//! payload right away ([`Submission::Ready`]) or a [`StreamHandle`] the
//! worker polls until the payload is complete.
//!
//! # Implementations
//!
//! - [`RestClient`] - Runs an installed query over HTTP
//! - [`SubscriptionClient`] - Triggers a job and listens on a broker topic
//! - [`InMemoryGraphStore`] - Serves neighborhoods of a graph held in memory
//!
//! Closures `Fn(&TaskDescriptor) -> Result<Submission, FetchError>`
//! implement [`GraphStoreClient`] too, which keeps tests short.

pub mod broker;
pub mod memory;
pub mod rest;

pub use broker::{BrokerTransport, ChannelBroker, SubscriptionClient};
pub use memory::InMemoryGraphStore;
pub use rest::{RestClient, RestClientConfig};

use crate::error::FetchError;
use crate::types::PayloadKind;
use crate::wire::RawRecordBatch;
use bytes::{Bytes, BytesMut};
use crossbeam_channel::{Receiver, RecvTimeoutError};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

/// Names of the query parameters the loader sends with every task
pub mod param {
    pub const VERTEX_IN_FEATURES: &str = "v_in_feats";
    pub const VERTEX_OUT_LABELS: &str = "v_out_labels";
    pub const VERTEX_EXTRA_FEATURES: &str = "v_extra_feats";
    pub const EDGE_IN_FEATURES: &str = "e_in_feats";
    pub const EDGE_OUT_LABELS: &str = "e_out_labels";
    pub const EDGE_EXTRA_FEATURES: &str = "e_extra_feats";
    pub const NUM_NEIGHBORS: &str = "num_neighbors";
    pub const NUM_HOPS: &str = "num_hops";
    pub const FILTER_BY: &str = "filter_by";
    /// Separator of attribute name lists
    pub const LIST_SEPARATOR: char = ',';
}

/// A seed vertex named by id (and type, for heterogeneous graphs)
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SeedVertex {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vertex_type: Option<String>,
}

impl SeedVertex {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            vertex_type: None,
        }
    }

    pub fn typed(vertex_type: impl Into<String>, id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            vertex_type: Some(vertex_type.into()),
        }
    }
}

/// Which part of the graph a task asks for
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskScope {
    /// Every vertex and edge
    WholeGraph,
    /// Server-side partition `index` of `count` seed partitions
    Partition { index: u64, count: u64 },
    /// Neighborhood of these seeds
    Seeds(Vec<SeedVertex>),
}

/// One batch-fetch request
#[derive(Debug, Clone, PartialEq)]
pub struct TaskDescriptor {
    pub loader_id: String,
    pub epoch: u64,
    /// Position of the task within its epoch
    pub batch_index: usize,
    pub payload: PayloadKind,
    pub scope: TaskScope,
    /// Query parameters shared by every task of the loader
    pub params: BTreeMap<String, String>,
}

impl TaskDescriptor {
    /// Broker topic / job name of this task
    pub fn topic(&self) -> String {
        format!("{}_{}_{}", self.loader_id, self.epoch, self.batch_index)
    }
}

/// Outcome of submitting a task
#[derive(Debug)]
pub enum Submission {
    /// Complete payload
    Ready(RawRecordBatch),
    /// Payload delivered in parts
    Stream(StreamHandle),
}

/// Half of a payload a stream part belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PayloadHalf {
    Vertices,
    Edges,
}

/// One message on a payload stream
#[derive(Debug, Clone, PartialEq)]
pub enum StreamEvent {
    /// A chunk of records, appended in arrival order
    Part { half: PayloadHalf, data: Bytes },
    /// Every part has been sent
    End,
    /// The job failed server-side
    Failed(FetchError),
}

/// Receiving end of a payload stream
#[derive(Debug)]
pub struct StreamHandle {
    topic: String,
    receiver: Receiver<StreamEvent>,
}

impl StreamHandle {
    pub fn new(topic: impl Into<String>, receiver: Receiver<StreamEvent>) -> Self {
        Self {
            topic: topic.into(),
            receiver,
        }
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    /// Poll until the end signal and concatenate the parts
    ///
    /// Checks `cancel` between polls. Gives up with [`FetchError::Timeout`]
    /// once `timeout` has elapsed without the end signal.
    pub fn collect(
        &self,
        kind: PayloadKind,
        cancel: &AtomicBool,
        poll_interval: Duration,
        timeout: Duration,
    ) -> Result<RawRecordBatch, FetchError> {
        let started = Instant::now();
        let mut vertices = BytesMut::new();
        let mut edges = BytesMut::new();

        loop {
            if cancel.load(Ordering::Relaxed) {
                return Err(FetchError::Cancelled);
            }
            match self.receiver.recv_timeout(poll_interval) {
                Ok(StreamEvent::Part { half, data }) => match half {
                    PayloadHalf::Vertices => vertices.extend_from_slice(&data),
                    PayloadHalf::Edges => edges.extend_from_slice(&data),
                },
                Ok(StreamEvent::End) => break,
                Ok(StreamEvent::Failed(err)) => return Err(err),
                Err(RecvTimeoutError::Timeout) => {
                    if started.elapsed() >= timeout {
                        return Err(FetchError::Timeout(timeout.as_millis() as u64));
                    }
                }
                Err(RecvTimeoutError::Disconnected) => return Err(FetchError::StreamClosed),
            }
        }

        Ok(RawRecordBatch::from_parts(
            kind,
            vertices.freeze(),
            edges.freeze(),
        ))
    }
}

/// Capability to run batch queries against a graph store
pub trait GraphStoreClient: Send + Sync {
    /// Run the query or job for one task
    fn submit_batch_task(&self, task: &TaskDescriptor) -> Result<Submission, FetchError>;

    /// Release a stream returned by [`submit_batch_task`](Self::submit_batch_task)
    fn close_stream(&self, _handle: StreamHandle) {}

    /// Number of seed vertices passing `filter_by`, if the store can tell
    fn seed_count(&self, _filter_by: Option<&str>) -> Result<Option<u64>, FetchError> {
        Ok(None)
    }
}

impl<F> GraphStoreClient for F
where
    F: Fn(&TaskDescriptor) -> Result<Submission, FetchError> + Send + Sync,
{
    fn submit_batch_task(&self, task: &TaskDescriptor) -> Result<Submission, FetchError> {
        self(task)
    }
}
