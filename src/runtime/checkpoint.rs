//! Checkpoint model, the [`Checkpointer`] trait, and the in-memory backend.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use miette::Diagnostic;
use parking_lot::RwLock;
use rustc_hash::FxHashMap;
use serde_json::Value;
use thiserror::Error;
use tracing::instrument;

use crate::state::ConversationState;
use crate::types::NodeKind;

/// A suspension awaiting an external decision.
///
/// While a thread's latest checkpoint carries one of these, new turns are
/// rejected and the only way forward is an explicit resume.
#[derive(Clone, Debug, PartialEq)]
pub struct PendingInterrupt {
    /// Node that suspended; the resume payload is delivered back to it.
    pub node: NodeKind,
    /// Payload surfaced to the caller when the suspension was raised
    /// (e.g. the leave draft awaiting confirmation).
    pub payload: Value,
}

/// One durable snapshot of a thread.
///
/// A checkpoint is written *before* the node named in `next` executes, so the
/// latest stored checkpoint is always a valid restart point: its state merges
/// every completed node's update and nothing of the node that may have been
/// mid-flight.
#[derive(Clone, Debug, PartialEq)]
pub struct Checkpoint {
    pub thread_id: String,
    /// Strictly increasing per thread, starting at 1, no gaps.
    pub seq: u64,
    pub state: ConversationState,
    /// The node to execute next; `End` marks a completed turn.
    pub next: NodeKind,
    /// Outstanding suspension, if the thread is paused for external input.
    pub pending_interrupt: Option<PendingInterrupt>,
    pub created_at: DateTime<Utc>,
}

impl Checkpoint {
    /// `true` while the thread is paused awaiting an external decision.
    #[must_use]
    pub fn is_suspended(&self) -> bool {
        self.pending_interrupt.is_some()
    }
}

/// Errors surfaced by checkpoint backends.
#[derive(Debug, Error, Diagnostic)]
pub enum CheckpointerError {
    /// The save lost an optimistic-concurrency race: another writer advanced
    /// the thread past the sequence this save was based on.
    #[error("stale sequence for thread {thread_id}: attempted seq {attempted}, latest is {latest}")]
    #[diagnostic(
        code(campusflow::checkpointer::stale_sequence),
        help("Reload the latest checkpoint and retry from there.")
    )]
    StaleSequence {
        thread_id: String,
        attempted: u64,
        latest: u64,
    },

    /// Storage-level failure (connection, transaction, I/O).
    #[error("checkpoint backend error: {message}")]
    #[diagnostic(code(campusflow::checkpointer::backend))]
    Backend { message: String },

    /// Serialization of the persisted shape failed.
    #[error("checkpoint serialization error: {message}")]
    #[diagnostic(code(campusflow::checkpointer::serde))]
    Serde { message: String },
}

pub type Result<T> = std::result::Result<T, CheckpointerError>;

/// Pluggable durable storage for thread checkpoints.
///
/// Implementations enforce the sequence invariant inside `save`: a checkpoint
/// is accepted only when its `seq` is exactly one past the thread's latest
/// stored sequence (or 1 for a new thread). Anything else is
/// [`CheckpointerError::StaleSequence`].
#[async_trait]
pub trait Checkpointer: Send + Sync {
    /// Persist a checkpoint, enforcing the strictly-increasing sequence.
    async fn save(&self, checkpoint: Checkpoint) -> Result<()>;

    /// Load the latest checkpoint of a thread, if the thread exists.
    async fn load_latest(&self, thread_id: &str) -> Result<Option<Checkpoint>>;

    /// List known thread ids, most recently updated first.
    async fn list_threads(&self) -> Result<Vec<String>>;
}

/// Volatile checkpointer keeping full history per thread.
///
/// Used by tests and development setups; state is lost on drop.
#[derive(Default)]
pub struct InMemoryCheckpointer {
    threads: RwLock<FxHashMap<String, Vec<Checkpoint>>>,
}

impl InMemoryCheckpointer {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Full checkpoint history of a thread, oldest first. Test support.
    #[must_use]
    pub fn history(&self, thread_id: &str) -> Vec<Checkpoint> {
        self.threads
            .read()
            .get(thread_id)
            .cloned()
            .unwrap_or_default()
    }
}

impl std::fmt::Debug for InMemoryCheckpointer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemoryCheckpointer")
            .field("threads", &self.threads.read().len())
            .finish()
    }
}

#[async_trait]
impl Checkpointer for InMemoryCheckpointer {
    #[instrument(skip(self, checkpoint), fields(thread_id = %checkpoint.thread_id, seq = checkpoint.seq), err)]
    async fn save(&self, checkpoint: Checkpoint) -> Result<()> {
        let mut threads = self.threads.write();
        let history = threads.entry(checkpoint.thread_id.clone()).or_default();
        let latest = history.last().map_or(0, |cp| cp.seq);
        if checkpoint.seq != latest + 1 {
            return Err(CheckpointerError::StaleSequence {
                thread_id: checkpoint.thread_id,
                attempted: checkpoint.seq,
                latest,
            });
        }
        history.push(checkpoint);
        Ok(())
    }

    async fn load_latest(&self, thread_id: &str) -> Result<Option<Checkpoint>> {
        Ok(self
            .threads
            .read()
            .get(thread_id)
            .and_then(|h| h.last().cloned()))
    }

    async fn list_threads(&self) -> Result<Vec<String>> {
        let threads = self.threads.read();
        let mut ids: Vec<(String, DateTime<Utc>)> = threads
            .iter()
            .filter_map(|(id, h)| h.last().map(|cp| (id.clone(), cp.created_at)))
            .collect();
        ids.sort_by(|a, b| b.1.cmp(&a.1));
        Ok(ids.into_iter().map(|(id, _)| id).collect())
    }
}
