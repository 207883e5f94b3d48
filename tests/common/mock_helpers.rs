//! Mock construction helpers

use bytes::Bytes;
use graph_batch_loader::error::FetchError;
use graph_batch_loader::source::broker::Responder;
use graph_batch_loader::source::{
    ChannelBroker, GraphStoreClient, InMemoryGraphStore, Submission, SubscriptionClient,
    TaskDescriptor,
};
use graph_batch_loader::wire::RawRecordBatch;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// Share a store with the loader while keeping a handle for assertions
pub fn shared_store(store: InMemoryGraphStore) -> (Arc<InMemoryGraphStore>, Arc<dyn GraphStoreClient>) {
    let store = Arc::new(store);
    let client: Arc<dyn GraphStoreClient> = store.clone();
    (store, client)
}

/// Broker-backed client whose jobs render from `store`
pub fn broker_client(
    store: Arc<InMemoryGraphStore>,
    records_per_part: usize,
) -> SubscriptionClient<ChannelBroker> {
    let responder: Responder = Arc::new(move |task: &TaskDescriptor| store.render(task));
    SubscriptionClient::new(ChannelBroker::new(responder).with_records_per_part(records_per_part))
        .with_topic_prefix("test/")
}

/// Client returning the same graph payload for every task
pub fn fixed_graph_client(vertices: &'static str, edges: &'static str) -> impl GraphStoreClient {
    move |_task: &TaskDescriptor| {
        Ok::<_, FetchError>(Submission::Ready(RawRecordBatch::Graph {
            vertices: Bytes::from_static(vertices.as_bytes()),
            edges: Bytes::from_static(edges.as_bytes()),
        }))
    }
}

/// Client that counts calls and delegates to a store
pub struct CountingClient {
    pub inner: InMemoryGraphStore,
    pub calls: Arc<AtomicUsize>,
}

impl CountingClient {
    pub fn new(inner: InMemoryGraphStore) -> (Self, Arc<AtomicUsize>) {
        let calls = Arc::new(AtomicUsize::new(0));
        (
            Self {
                inner,
                calls: calls.clone(),
            },
            calls,
        )
    }
}

impl GraphStoreClient for CountingClient {
    fn submit_batch_task(&self, task: &TaskDescriptor) -> Result<Submission, FetchError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.inner.submit_batch_task(task)
    }

    fn seed_count(&self, filter_by: Option<&str>) -> Result<Option<u64>, FetchError> {
        self.inner.seed_count(filter_by)
    }
}
