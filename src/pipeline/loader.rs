//! Consumer-facing batch loader
//!
//! [`BatchLoader`] owns the reader pool of one epoch at a time and hands
//! assembled batches to the caller in completion order. [`LoaderBuilder`]
//! validates every declaration against the schema catalog before the first
//! reader thread exists.
//!
//! # Lifecycle
//!
//! ```text
//! Idle ──► Running ──► Draining ──► EpochDone ──► Running (looping)
//!                                          └───► Closed
//! ```
//!
//! An epoch ends once every started reader has sent its sentinel. The end is
//! reported as `Ok(None)` by [`BatchLoader::next_batch`] and as `None` by the
//! iterator.

use crate::assemble::{BatchAssembler, BatchObject};
use crate::config::LoaderConfig;
use crate::error::{BatchError, LoaderError, Result, StateError, ValidationError};
use crate::pipeline::task::{EpochPlan, SeedSelection};
use crate::pipeline::worker::{BatchReader, WorkerContext, WorkerMessage};
use crate::schema::{AttributeSpec, AttributeSpecValidator, SchemaCatalog};
use crate::source::{GraphStoreClient, SeedVertex, TaskDescriptor};
use crate::types::{EntityKind, OutputFormat, PayloadKind};
use crate::wire::WireDecoder;
use crossbeam_channel::{bounded, Receiver};
use rand::rngs::SmallRng;
use rand::SeedableRng;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use tracing::{debug, error, info, warn};

/// Loader state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineStatus {
    /// Built, no reader started yet
    Idle,
    /// Readers are working through the epoch's tasks
    Running,
    /// At least one reader has run out of tasks
    Draining,
    /// Every result of the epoch has been delivered
    EpochDone,
    /// Terminal
    Closed,
}

impl std::fmt::Display for PipelineStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            PipelineStatus::Idle => "idle",
            PipelineStatus::Running => "running",
            PipelineStatus::Draining => "draining",
            PipelineStatus::EpochDone => "epoch done",
            PipelineStatus::Closed => "closed",
        };
        write!(f, "{}", name)
    }
}

/// Reader pool and result queue of the current epoch
struct EpochRun {
    results: Receiver<WorkerMessage>,
    workers: Vec<JoinHandle<()>>,
    sentinels: usize,
}

impl EpochRun {
    fn is_complete(&self) -> bool {
        self.sentinels == self.workers.len()
    }

    /// Discard pending results, release the queue, and wait for readers
    fn shutdown(self) {
        let discarded = self.results.try_iter().count();
        if discarded > 0 {
            debug!("Discarded {} pending results", discarded);
        }
        drop(self.results);
        join_all(self.workers);
    }
}

fn join_all(workers: Vec<JoinHandle<()>>) {
    for handle in workers {
        let name = handle.thread().name().unwrap_or("batch-reader").to_string();
        if handle.join().is_err() {
            error!("Reader thread {} panicked", name);
        }
    }
}

/// Pull-based loader of graph batches
///
/// # Example
///
/// ```ignore
/// let mut loader = LoaderBuilder::new(config)
///     .catalog(catalog)
///     .client(store)
///     .build()?;
///
/// for batch in &mut loader {
///     let batch = batch?;
///     train_step(batch.as_graph().unwrap());
/// }
/// loader.close();
/// ```
pub struct BatchLoader {
    loader_id: String,
    plan: EpochPlan,
    ctx: Arc<WorkerContext>,
    payload: PayloadKind,
    params: BTreeMap<String, String>,
    num_workers: usize,
    buffer_size: usize,
    looping: bool,
    skip_malformed: bool,
    rng: SmallRng,
    status: PipelineStatus,
    epoch: u64,
    started: bool,
    run: Option<EpochRun>,
    /// Whole-graph batch, kept for `data()`
    data: Option<BatchObject>,
}

impl BatchLoader {
    pub fn loader_id(&self) -> &str {
        &self.loader_id
    }

    /// Number of batches in every epoch
    pub fn len(&self) -> usize {
        self.plan.num_batches()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Current epoch, counted from 0
    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    pub fn status(&self) -> PipelineStatus {
        self.status
    }

    pub fn is_whole_graph(&self) -> bool {
        self.plan.is_whole_graph()
    }

    /// Query parameters sent with every task
    pub fn params(&self) -> &BTreeMap<String, String> {
        &self.params
    }

    /// Pull the next batch
    ///
    /// Returns `Ok(None)` once at the end of every epoch. After that, a
    /// looping loader starts the next epoch and a non-looping one fails with
    /// [`StateError::Exhausted`].
    pub fn next_batch(&mut self) -> Result<Option<BatchObject>> {
        match self.status {
            PipelineStatus::Closed => return Err(StateError::Closed.into()),
            PipelineStatus::Idle => self.start_epoch()?,
            PipelineStatus::EpochDone if self.looping => self.start_epoch()?,
            PipelineStatus::EpochDone => return Err(StateError::Exhausted.into()),
            PipelineStatus::Running | PipelineStatus::Draining => {}
        }

        loop {
            let Some(run) = self.run.as_mut() else {
                return Err(StateError::WorkerLost.into());
            };
            if run.is_complete() {
                self.finish_epoch();
                return Ok(None);
            }

            match run.results.recv() {
                Ok(WorkerMessage::Done { worker }) => {
                    run.sentinels += 1;
                    debug!(
                        "Reader {} finished ({}/{} sentinels)",
                        worker,
                        run.sentinels,
                        run.workers.len()
                    );
                    if self.status == PipelineStatus::Running {
                        self.status = PipelineStatus::Draining;
                    }
                }
                Ok(WorkerMessage::Batch {
                    outcome: Ok(batch), ..
                }) => {
                    if self.plan.is_whole_graph() {
                        self.data = Some(batch.clone());
                    }
                    return Ok(Some(batch));
                }
                Ok(WorkerMessage::Batch {
                    index,
                    outcome: Err(cause),
                }) => {
                    if self.skip_malformed && cause.is_decode() {
                        warn!("Skipping malformed batch {}: {}", index, cause);
                        continue;
                    }
                    return Err(BatchError {
                        index,
                        epoch: self.epoch,
                        cause,
                    }
                    .into());
                }
                Err(_) => {
                    error!(
                        "Result queue closed after {}/{} sentinels",
                        run.sentinels,
                        run.workers.len()
                    );
                    self.finish_epoch();
                    return Err(StateError::WorkerLost.into());
                }
            }
        }
    }

    /// The single batch of a whole-graph loader
    ///
    /// Runs the epoch on first use; later calls return the cached batch.
    pub fn data(&mut self) -> Result<&BatchObject> {
        if !self.plan.is_whole_graph() {
            return Err(StateError::ModeMismatch {
                expected: "whole-graph",
                actual: "mini-batch",
            }
            .into());
        }
        if self.status == PipelineStatus::Closed {
            return Err(StateError::Closed.into());
        }

        while self.data.is_none() {
            match self.next_batch() {
                Ok(Some(_)) => {}
                Ok(None) | Err(LoaderError::State(StateError::Exhausted)) => break,
                Err(e) => return Err(e),
            }
        }
        self.data.as_ref().ok_or_else(|| StateError::NoData.into())
    }

    /// Stop every reader and release the queues
    ///
    /// Idempotent. In-flight fetches are abandoned at their next checkpoint.
    pub fn close(&mut self) {
        if self.status == PipelineStatus::Closed {
            return;
        }
        self.ctx.cancel.store(true, Ordering::SeqCst);
        if let Some(run) = self.run.take() {
            run.shutdown();
        }
        self.status = PipelineStatus::Closed;
        info!("Loader {} closed after epoch {}", self.loader_id, self.epoch);
    }

    fn start_epoch(&mut self) -> Result<()> {
        if self.started {
            self.epoch += 1;
        }
        self.started = true;

        let scopes = self.plan.scopes(&mut self.rng);
        let num_tasks = scopes.len();
        let (task_tx, task_rx) = bounded(num_tasks);
        for (batch_index, scope) in scopes.into_iter().enumerate() {
            let task = TaskDescriptor {
                loader_id: self.loader_id.clone(),
                epoch: self.epoch,
                batch_index,
                payload: self.payload,
                scope,
                params: self.params.clone(),
            };
            // Capacity equals the task count
            let _ = task_tx.send(task);
        }
        drop(task_tx);

        let (result_tx, result_rx) = bounded(self.buffer_size);
        let num_workers = self.num_workers.min(num_tasks);
        let mut workers = Vec::with_capacity(num_workers);
        let mut spawn_error = None;
        for id in 0..num_workers {
            let reader = BatchReader::new(
                id,
                Arc::clone(&self.ctx),
                task_rx.clone(),
                result_tx.clone(),
            );
            match std::thread::Builder::new()
                .name(format!("batch-reader-{}", id))
                .spawn(move || reader.run())
            {
                Ok(handle) => workers.push(handle),
                Err(e) => {
                    spawn_error = Some(e);
                    break;
                }
            }
        }
        drop(result_tx);

        let started_workers = workers.len();
        self.run = Some(EpochRun {
            results: result_rx,
            workers,
            sentinels: 0,
        });
        self.status = PipelineStatus::Running;

        if let Some(e) = spawn_error {
            error!(
                "Started {} of {} readers for epoch {}: {}",
                started_workers, num_workers, self.epoch, e
            );
            return Err(LoaderError::from(e).with_context("Failed to spawn batch reader"));
        }
        info!(
            "Epoch {} started: {} tasks, {} readers",
            self.epoch, num_tasks, started_workers
        );
        Ok(())
    }

    fn finish_epoch(&mut self) {
        if let Some(run) = self.run.take() {
            join_all(run.workers);
        }
        self.status = PipelineStatus::EpochDone;
        info!("Epoch {} complete", self.epoch);
    }
}

impl Iterator for BatchLoader {
    type Item = Result<BatchObject>;

    fn next(&mut self) -> Option<Self::Item> {
        match self.next_batch() {
            Ok(batch) => batch.map(Ok),
            Err(LoaderError::State(StateError::Exhausted | StateError::Closed)) => None,
            Err(e) => Some(Err(e)),
        }
    }
}

impl Drop for BatchLoader {
    fn drop(&mut self) {
        self.close();
    }
}

impl std::fmt::Debug for BatchLoader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BatchLoader")
            .field("loader_id", &self.loader_id)
            .field("plan", &self.plan)
            .field("status", &self.status)
            .field("epoch", &self.epoch)
            .finish_non_exhaustive()
    }
}

// ==================== Builder ====================

/// Validates a [`LoaderConfig`] against a schema catalog and builds a loader
pub struct LoaderBuilder {
    config: LoaderConfig,
    catalog: Option<Box<dyn SchemaCatalog>>,
    client: Option<Arc<dyn GraphStoreClient>>,
    seeds: Option<Vec<SeedVertex>>,
    seed_count: Option<u64>,
}

impl LoaderBuilder {
    pub fn new(config: LoaderConfig) -> Self {
        Self {
            config,
            catalog: None,
            client: None,
            seeds: None,
            seed_count: None,
        }
    }

    pub fn catalog(mut self, catalog: impl SchemaCatalog + 'static) -> Self {
        self.catalog = Some(Box::new(catalog));
        self
    }

    pub fn client(mut self, client: impl GraphStoreClient + 'static) -> Self {
        self.client = Some(Arc::new(client));
        self
    }

    /// Use a client that the caller keeps a handle to
    pub fn shared_client(mut self, client: Arc<dyn GraphStoreClient>) -> Self {
        self.client = Some(client);
        self
    }

    /// Seed vertices to batch over
    pub fn seeds(mut self, seeds: Vec<SeedVertex>) -> Self {
        self.seeds = Some(seeds);
        self
    }

    /// Number of seeds held by the store, when the ids are not known here
    pub fn seed_count(mut self, count: u64) -> Self {
        self.seed_count = Some(count);
        self
    }

    pub fn build(self) -> Result<BatchLoader> {
        let config = self.config;
        config.validate()?;

        let catalog = self
            .catalog
            .ok_or_else(|| LoaderError::Config("No schema catalog provided".to_string()))?;
        let client = self
            .client
            .ok_or_else(|| LoaderError::Config("No graph store client provided".to_string()))?;

        let validator = AttributeSpecValidator::new(catalog.as_ref(), config.heterogeneous);
        let attrs = &config.attributes;
        let vertex_spec = if config.payload.has_vertices() {
            let spec = validator.resolve(
                EntityKind::Vertex,
                &attrs.v_in_feats,
                &attrs.v_out_labels,
                &attrs.v_extra_feats,
            )?;
            Some(spec.with_seed_marker())
        } else {
            None
        };
        let edge_spec = if config.payload.has_edges() {
            Some(validator.resolve(
                EntityKind::Edge,
                &attrs.e_in_feats,
                &attrs.e_out_labels,
                &attrs.e_extra_feats,
            )?)
        } else {
            None
        };

        if config.output_format == OutputFormat::Graph {
            check_numeric(vertex_spec.as_ref(), EntityKind::Vertex)?;
            check_numeric(edge_spec.as_ref(), EntityKind::Edge)?;
        }

        let endpoints: BTreeMap<String, (String, String)> = catalog
            .edge_types()
            .into_iter()
            .filter_map(|t| catalog.edge_endpoints(&t).map(|ends| (t, ends)))
            .collect();
        if config.output_format == OutputFormat::Graph {
            if let Some(AttributeSpec::ByType(layouts)) = &edge_spec {
                if let Some(missing) = layouts.keys().find(|t| !endpoints.contains_key(*t)) {
                    return Err(ValidationError::MissingEndpoints {
                        type_name: missing.clone(),
                    }
                    .into());
                }
            }
        }

        let filter_by = config
            .sampling
            .filter_by
            .as_deref()
            .map(str::trim)
            .filter(|f| !f.is_empty());
        if let Some(filter) = filter_by {
            validator.check_filter(filter)?;
        }

        let shuffle = config.pipeline.shuffle;
        let plan = if config.batching.whole_graph {
            EpochPlan::WholeGraph
        } else {
            let seeds = match (self.seeds, self.seed_count) {
                (Some(ids), _) => SeedSelection::Ids(ids),
                (None, Some(count)) => SeedSelection::Count(count),
                (None, None) => match client.seed_count(filter_by)? {
                    Some(count) => SeedSelection::Count(count),
                    None => {
                        return Err(LoaderError::Config(
                            "Seed vertices unknown: provide seeds or a seed count".to_string(),
                        ))
                    }
                },
            };
            match (config.batching.batch_size, config.batching.num_batches) {
                (Some(size), _) => EpochPlan::with_batch_size(seeds, size, shuffle),
                (None, Some(n)) => EpochPlan::with_num_batches(seeds, n, shuffle),
                (None, None) => {
                    return Err(LoaderError::Config(
                        "Either batch_size or num_batches is required".to_string(),
                    ))
                }
            }
        };

        let params = config.query_params(vertex_spec.as_ref(), edge_spec.as_ref());
        let loader_id = config
            .loader_id
            .clone()
            .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
        let rng = match config.pipeline.shuffle_seed {
            Some(seed) => SmallRng::seed_from_u64(seed),
            None => SmallRng::from_entropy(),
        };

        let ctx = Arc::new(WorkerContext {
            client,
            decoder: WireDecoder::new(config.payload, vertex_spec, edge_spec),
            assembler: BatchAssembler::new(config.output_format)
                .with_endpoints(endpoints)
                .with_self_loops(config.sampling.add_self_loop),
            cancel: Arc::new(AtomicBool::new(false)),
            poll_interval: config.pipeline.poll_interval(),
            stream_timeout: config.pipeline.stream_timeout(),
        });

        info!(
            "Loader {} ready: {} payload, {} output, {} batches per epoch",
            loader_id,
            config.payload,
            config.output_format,
            plan.num_batches()
        );

        Ok(BatchLoader {
            loader_id,
            plan,
            ctx,
            payload: config.payload,
            params,
            num_workers: config.pipeline.num_workers,
            buffer_size: config.pipeline.buffer_size,
            looping: config.pipeline.looping,
            skip_malformed: config.pipeline.skip_malformed,
            rng,
            status: PipelineStatus::Idle,
            epoch: 0,
            started: false,
            run: None,
            data: None,
        })
    }
}

fn check_numeric(spec: Option<&AttributeSpec>, kind: EntityKind) -> Result<()> {
    if let Some(spec) = spec {
        spec.ensure_numeric_features(kind)?;
    }
    Ok(())
}
