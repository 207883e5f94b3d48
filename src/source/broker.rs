//! Broker subscription source
//!
//! The job for a task publishes its payload to a per-task topic. The client
//! subscribes before triggering the job so no part is missed, then hands
//! the subscription to the worker as a [`StreamHandle`].

use super::{
    GraphStoreClient, PayloadHalf, StreamEvent, StreamHandle, Submission, TaskDescriptor,
};
use crate::error::FetchError;
use crate::types::RECORD_SEPARATOR;
use crate::wire::RawRecordBatch;
use bytes::Bytes;
use crossbeam_channel::{unbounded, Receiver, Sender};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tracing::{debug, warn};

/// Message broker as seen by the loader
pub trait BrokerTransport: Send + Sync {
    /// Start receiving messages published to `topic`
    fn subscribe(&self, topic: &str) -> Result<Receiver<StreamEvent>, FetchError>;

    /// Ask the store to run the job for `task`, publishing to `topic`
    fn trigger(&self, topic: &str, task: &TaskDescriptor) -> Result<(), FetchError>;

    /// Stop receiving messages for `topic`
    fn unsubscribe(&self, topic: &str);
}

/// [`GraphStoreClient`] that receives payloads through a [`BrokerTransport`]
pub struct SubscriptionClient<T: BrokerTransport> {
    transport: T,
    topic_prefix: String,
}

impl<T: BrokerTransport> SubscriptionClient<T> {
    pub fn new(transport: T) -> Self {
        Self {
            transport,
            topic_prefix: String::new(),
        }
    }

    /// Prefix prepended to every task topic
    pub fn with_topic_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.topic_prefix = prefix.into();
        self
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }
}

impl<T: BrokerTransport> GraphStoreClient for SubscriptionClient<T> {
    fn submit_batch_task(&self, task: &TaskDescriptor) -> Result<Submission, FetchError> {
        let topic = format!("{}{}", self.topic_prefix, task.topic());
        let receiver = self.transport.subscribe(&topic)?;
        if let Err(e) = self.transport.trigger(&topic, task) {
            self.transport.unsubscribe(&topic);
            return Err(e);
        }
        debug!("Subscribed to {}", topic);
        Ok(Submission::Stream(StreamHandle::new(topic, receiver)))
    }

    fn close_stream(&self, handle: StreamHandle) {
        self.transport.unsubscribe(handle.topic());
    }
}

/// Produces the payload of a task for [`ChannelBroker`]
pub type Responder = Arc<dyn Fn(&TaskDescriptor) -> Result<RawRecordBatch, FetchError> + Send + Sync>;

/// In-process broker: topics are channels, jobs run a [`Responder`]
///
/// Payload halves are published in parts of at most `records_per_part`
/// records, vertex parts first.
pub struct ChannelBroker {
    topics: Mutex<HashMap<String, Sender<StreamEvent>>>,
    responder: Responder,
    records_per_part: usize,
}

impl ChannelBroker {
    pub fn new(responder: Responder) -> Self {
        Self {
            topics: Mutex::new(HashMap::new()),
            responder,
            records_per_part: 64,
        }
    }

    pub fn with_records_per_part(mut self, records: usize) -> Self {
        self.records_per_part = records.max(1);
        self
    }

    /// Number of live subscriptions
    pub fn subscriptions(&self) -> usize {
        self.topics.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    fn publish(&self, topic: &str, event: StreamEvent) {
        let topics = self.topics.lock().unwrap_or_else(|e| e.into_inner());
        match topics.get(topic) {
            Some(sender) => {
                // Subscriber may have given up already
                let _ = sender.send(event);
            }
            None => warn!("Dropping message for topic {} without subscriber", topic),
        }
    }

    fn publish_half(&self, topic: &str, half: PayloadHalf, data: &Bytes) {
        for part in split_parts(data, self.records_per_part) {
            self.publish(topic, StreamEvent::Part { half, data: part });
        }
    }
}

/// Split a payload into chunks of whole records
fn split_parts(data: &Bytes, records_per_part: usize) -> Vec<Bytes> {
    let mut parts = Vec::new();
    let mut start = 0;
    let mut records = 0;
    for (i, byte) in data.iter().enumerate() {
        if *byte == RECORD_SEPARATOR as u8 {
            records += 1;
            if records == records_per_part {
                parts.push(data.slice(start..=i));
                start = i + 1;
                records = 0;
            }
        }
    }
    if start < data.len() {
        parts.push(data.slice(start..));
    }
    parts
}

impl BrokerTransport for ChannelBroker {
    fn subscribe(&self, topic: &str) -> Result<Receiver<StreamEvent>, FetchError> {
        let (tx, rx) = unbounded();
        self.topics
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(topic.to_string(), tx);
        Ok(rx)
    }

    fn trigger(&self, topic: &str, task: &TaskDescriptor) -> Result<(), FetchError> {
        match (self.responder)(task) {
            Ok(raw) => {
                match &raw {
                    RawRecordBatch::Vertex(v) => self.publish_half(topic, PayloadHalf::Vertices, v),
                    RawRecordBatch::Edge(e) => self.publish_half(topic, PayloadHalf::Edges, e),
                    RawRecordBatch::Graph { vertices, edges } => {
                        self.publish_half(topic, PayloadHalf::Vertices, vertices);
                        self.publish_half(topic, PayloadHalf::Edges, edges);
                    }
                }
                self.publish(topic, StreamEvent::End);
            }
            Err(err) => self.publish(topic, StreamEvent::Failed(err)),
        }
        Ok(())
    }

    fn unsubscribe(&self, topic: &str) {
        self.topics
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(topic);
    }
}
