//! Lightweight progress-event channel for node execution.
//!
//! Nodes emit scoped progress events through their
//! [`NodeContext`](crate::node::NodeContext); the bus fans them out to a
//! listener task that renders them through `tracing`. Kept separate from the
//! tracing spans themselves so callers can also drain the raw event stream
//! (e.g. to push progress to a client).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// A node-scoped progress event.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct Event {
    /// Name of the node that emitted the event.
    pub node: String,
    /// Step number within the turn.
    pub step: u64,
    /// Short category label (e.g. "routing", "retrieve").
    pub scope: String,
    pub message: String,
    pub at: DateTime<Utc>,
}

impl Event {
    pub fn node_message(
        node: impl Into<String>,
        step: u64,
        scope: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            node: node.into(),
            step,
            scope: scope.into(),
            message: message.into(),
            at: Utc::now(),
        }
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}#{} {}] {}",
            self.node, self.step, self.scope, self.message
        )
    }
}

/// Unbounded event channel shared by all nodes of a runner.
#[derive(Clone)]
pub struct EventBus {
    sender: flume::Sender<Event>,
    receiver: flume::Receiver<Event>,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl EventBus {
    #[must_use]
    pub fn new() -> Self {
        let (sender, receiver) = flume::unbounded();
        Self { sender, receiver }
    }

    /// Sender handed to node contexts.
    #[must_use]
    pub fn sender(&self) -> flume::Sender<Event> {
        self.sender.clone()
    }

    /// Receiver for callers that want the raw stream.
    #[must_use]
    pub fn receiver(&self) -> flume::Receiver<Event> {
        self.receiver.clone()
    }

    /// Spawns a task that logs every event through `tracing` until all
    /// senders are dropped.
    pub fn spawn_tracing_listener(&self) -> tokio::task::JoinHandle<()> {
        let receiver = self.receiver.clone();
        tokio::spawn(async move {
            while let Ok(event) = receiver.recv_async().await {
                tracing::info!(
                    node = %event.node,
                    step = event.step,
                    scope = %event.scope,
                    "{}",
                    event.message
                );
            }
        })
    }
}
