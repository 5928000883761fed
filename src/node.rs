//! Node execution primitives: the [`Node`] trait, execution context, step
//! results, and node-level errors.

use async_trait::async_trait;
use miette::Diagnostic;
use serde_json::Value;
use thiserror::Error;

use crate::event_bus::Event;
use crate::state::{ConversationState, StateUpdate};
use crate::types::NodeKind;

/// A single unit of work within a flow.
///
/// Nodes receive the full current state and return a [`NodeStep`]: a partial
/// update plus how execution should proceed. Nodes are stateless; anything
/// they need across turns lives in the state or behind a collaborator trait.
///
/// A node that suspends must also implement [`resume`](Self::resume): the
/// runner re-enters it there with the externally supplied payload when the
/// thread is resumed. The default implementation rejects resumption, so only
/// nodes that genuinely suspend opt in.
#[async_trait]
pub trait Node: Send + Sync {
    /// Execute this node against the current state.
    async fn run(
        &self,
        state: &ConversationState,
        ctx: NodeContext,
    ) -> Result<NodeStep, NodeError>;

    /// Continuation entered when a thread suspended at this node is resumed.
    ///
    /// `payload` is the externally supplied decision, injected as the result
    /// of the suspended call.
    async fn resume(
        &self,
        state: &ConversationState,
        ctx: NodeContext,
        payload: Value,
    ) -> Result<NodeStep, NodeError> {
        let _ = (state, payload);
        Err(NodeError::NotResumable { node: ctx.node_id })
    }
}

/// Execution context passed to nodes.
#[derive(Clone, Debug)]
pub struct NodeContext {
    /// Name of the node being executed.
    pub node_id: String,
    /// Step number within the current turn.
    pub step: u64,
    /// Channel for emitting progress events.
    pub event_sender: flume::Sender<Event>,
}

impl NodeContext {
    /// Emit a node-scoped progress event enriched with this context's
    /// metadata. Best effort: a disconnected bus is logged and the event
    /// dropped, never fatal to the turn.
    pub fn emit(&self, scope: impl Into<String>, message: impl Into<String>) {
        let event = Event::node_message(self.node_id.clone(), self.step, scope, message);
        if self.event_sender.send(event).is_err() {
            tracing::debug!(
                node = %self.node_id,
                step = self.step,
                "event bus listener gone, dropping event"
            );
        }
    }
}

/// Result of one node execution: the state delta plus a routing directive.
#[derive(Clone, Debug)]
pub enum NodeStep {
    /// Merge the update and follow the node's registered outgoing edge.
    Continue(StateUpdate),
    /// Merge the update and jump to an explicit next node, replacing the
    /// registered edge for this step.
    Goto(StateUpdate, NodeKind),
    /// Merge the update, persist `interrupt` as the pending suspension, and
    /// return control to the caller until an explicit resume.
    Suspend {
        update: StateUpdate,
        interrupt: Value,
    },
}

/// Fatal errors during node execution.
///
/// Any of these aborts the turn; the last successfully persisted checkpoint
/// remains the valid resume point.
#[derive(Debug, Error, Diagnostic)]
pub enum NodeError {
    /// Expected input data is missing from the state.
    #[error("missing expected input: {what}")]
    #[diagnostic(
        code(campusflow::node::missing_input),
        help("Check that the previous node produced the required data.")
    )]
    MissingInput { what: &'static str },

    /// Router output absent or outside the closed intent enumeration.
    #[error("classification failed: {message}")]
    #[diagnostic(
        code(campusflow::node::classification),
        help("The classifier output is treated as untrusted; it is never coerced to a default branch.")
    )]
    Classification { message: String },

    /// Structured decoding did not satisfy the expected schema.
    #[error("extraction failed: {message}")]
    #[diagnostic(
        code(campusflow::node::extraction),
        help("Ask the user to restate; field values are never guessed.")
    )]
    Extraction { message: String },

    /// A relational write failed; the record is not considered filed.
    #[error("persistence failed: {message}")]
    #[diagnostic(code(campusflow::node::persistence))]
    Persistence { message: String },

    /// External provider or service error.
    #[error("provider error ({provider}): {message}")]
    #[diagnostic(code(campusflow::node::provider))]
    Provider {
        provider: &'static str,
        message: String,
    },

    /// JSON serialization/deserialization error.
    #[error(transparent)]
    #[diagnostic(code(campusflow::node::serde_json))]
    Serde(#[from] serde_json::Error),

    /// Resume was delivered to a node that never suspends.
    #[error("node {node} does not accept resume payloads")]
    #[diagnostic(code(campusflow::node::not_resumable))]
    NotResumable { node: String },
}
