//! Turn-driving runtime: loads the thread, executes nodes to completion or
//! suspension, and checkpoints before every step.
//!
//! # Execution model
//!
//! A turn is sequential: one node runs at a time, its update is merged, the
//! next node is resolved through the flow's edges. Before each node executes
//! the runner persists a checkpoint carrying the merged state and that node
//! as the frontier, so a crash at any point restarts from a durable,
//! consistent snapshot.
//!
//! # Concurrency
//!
//! One writer per thread: a turn or resume in flight holds the thread's busy
//! slot, and a second caller gets [`RunnerError::ThreadBusy`] instead of
//! queueing. Different threads proceed independently. The checkpoint
//! sequence check backstops the guard across processes.
//!
//! # Suspension
//!
//! When a node suspends, the runner writes a checkpoint whose
//! `pending_interrupt` records the suspending node and payload, then returns
//! [`TurnOutcome::Suspended`]. While that interrupt is outstanding, new turns
//! are rejected with [`RunnerError::InterruptPending`]; only
//! [`resume`](FlowRunner::resume) moves the thread forward. During a resume
//! the interrupt is carried through every intermediate checkpoint and cleared
//! only by the final end-of-turn checkpoint: if a downstream write fails, the
//! last durable checkpoint still holds the interrupt and the resume can be
//! retried; once the turn completes, a replayed resume is a stale-resume
//! conflict.

use std::sync::Arc;

use chrono::Utc;
use miette::Diagnostic;
use parking_lot::Mutex;
use rustc_hash::FxHashSet;
use serde_json::Value;
use thiserror::Error;
use tracing::instrument;

use crate::event_bus::{Event, EventBus};
use crate::graph::{Flow, FlowError};
use crate::node::{NodeContext, NodeError, NodeStep};
use crate::runtime::checkpoint::{Checkpoint, Checkpointer, CheckpointerError, PendingInterrupt};
use crate::state::{ConversationState, Patch, StateUpdate, UserInfo};
use crate::types::NodeKind;

/// Ceiling on nodes executed in a single turn; exceeding it indicates a
/// routing cycle.
pub const DEFAULT_STEP_LIMIT: u64 = 32;

/// One incoming user turn.
#[derive(Clone, Debug)]
pub struct TurnRequest {
    pub thread_id: String,
    /// Authenticated identity; used verbatim when the thread is new.
    pub user_info: UserInfo,
    /// The user's utterance.
    pub message: String,
    /// Text of a file attached to this turn, if any.
    pub file_content: Option<String>,
}

/// An external decision delivered to a suspended thread.
#[derive(Clone, Debug)]
pub struct ResumeRequest {
    pub thread_id: String,
    /// Injected as the result of the suspended call (e.g.
    /// `{"confirmed": true}`).
    pub payload: Value,
}

/// How a turn ended.
#[derive(Clone, Debug)]
pub enum TurnOutcome {
    /// The flow reached its end; the state holds the assistant's reply.
    Completed { state: ConversationState },
    /// A node suspended awaiting an external decision.
    Suspended {
        /// Payload to surface to the caller (e.g. a draft to confirm).
        interrupt: Value,
        state: ConversationState,
    },
}

impl TurnOutcome {
    #[must_use]
    pub fn state(&self) -> &ConversationState {
        match self {
            TurnOutcome::Completed { state } | TurnOutcome::Suspended { state, .. } => state,
        }
    }
}

/// Errors surfaced by [`FlowRunner`].
#[derive(Debug, Error, Diagnostic)]
pub enum RunnerError {
    /// Another turn or resume is in flight on this thread.
    #[error("thread {thread_id} already has a turn in flight")]
    #[diagnostic(
        code(campusflow::runner::thread_busy),
        help("Retry after the current turn finishes; turns on a thread are serialized.")
    )]
    ThreadBusy { thread_id: String },

    /// A suspension is outstanding; only a resume moves the thread forward.
    #[error("thread {thread_id} is suspended awaiting an external decision")]
    #[diagnostic(
        code(campusflow::runner::interrupt_pending),
        help("Deliver a resume payload for the pending interrupt before starting a new turn.")
    )]
    InterruptPending { thread_id: String },

    /// Resume targeted a thread with no checkpoints.
    #[error("unknown thread: {thread_id}")]
    #[diagnostic(code(campusflow::runner::unknown_thread))]
    UnknownThread { thread_id: String },

    /// Resume delivered to a thread with no outstanding interrupt, e.g. a
    /// replay after the decision was already consumed.
    #[error("thread {thread_id} has no pending interrupt to resume")]
    #[diagnostic(
        code(campusflow::runner::stale_interrupt_resume),
        help("The suspension was already resolved; the payload is not applied.")
    )]
    StaleInterruptResume { thread_id: String },

    /// The turn executed more nodes than the configured ceiling.
    #[error("thread {thread_id} exceeded the step limit of {limit}")]
    #[diagnostic(code(campusflow::runner::step_limit))]
    StepLimitExceeded { thread_id: String, limit: u64 },

    #[error(transparent)]
    #[diagnostic(transparent)]
    Flow(#[from] FlowError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Node(#[from] NodeError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Checkpointer(#[from] CheckpointerError),
}

/// Drives turns over a compiled [`Flow`] with durable checkpointing.
pub struct FlowRunner {
    flow: Arc<Flow>,
    checkpointer: Arc<dyn Checkpointer>,
    event_bus: EventBus,
    busy: Arc<Mutex<FxHashSet<String>>>,
    step_limit: u64,
}

impl std::fmt::Debug for FlowRunner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FlowRunner")
            .field("flow", &self.flow)
            .field("step_limit", &self.step_limit)
            .finish()
    }
}

impl FlowRunner {
    #[must_use]
    pub fn new(flow: Flow, checkpointer: Arc<dyn Checkpointer>) -> Self {
        Self {
            flow: Arc::new(flow),
            checkpointer,
            event_bus: EventBus::new(),
            busy: Arc::new(Mutex::new(FxHashSet::default())),
            step_limit: DEFAULT_STEP_LIMIT,
        }
    }

    #[must_use]
    pub fn with_event_bus(mut self, event_bus: EventBus) -> Self {
        self.event_bus = event_bus;
        self
    }

    #[must_use]
    pub fn with_step_limit(mut self, limit: u64) -> Self {
        self.step_limit = limit;
        self
    }

    /// Raw progress-event stream of this runner.
    #[must_use]
    pub fn events(&self) -> flume::Receiver<Event> {
        self.event_bus.receiver()
    }

    fn acquire(&self, thread_id: &str) -> Result<ThreadGuard, RunnerError> {
        let mut busy = self.busy.lock();
        if !busy.insert(thread_id.to_string()) {
            return Err(RunnerError::ThreadBusy {
                thread_id: thread_id.to_string(),
            });
        }
        Ok(ThreadGuard {
            busy: Arc::clone(&self.busy),
            thread_id: thread_id.to_string(),
        })
    }

    /// Run one user turn to completion or suspension.
    ///
    /// Loads the thread's latest checkpoint (creating a fresh state for an
    /// unseen thread), appends the user message, and executes from the entry
    /// node.
    #[instrument(skip(self, request), fields(thread_id = %request.thread_id), err)]
    pub async fn run_turn(&self, request: TurnRequest) -> Result<TurnOutcome, RunnerError> {
        let _guard = self.acquire(&request.thread_id)?;

        let latest = self.checkpointer.load_latest(&request.thread_id).await?;
        if latest.as_ref().is_some_and(Checkpoint::is_suspended) {
            return Err(RunnerError::InterruptPending {
                thread_id: request.thread_id,
            });
        }
        let (mut state, seq) = match latest {
            Some(cp) => (cp.state, cp.seq),
            None => (ConversationState::new(request.user_info.clone()), 0),
        };

        // Fresh turn: append the utterance and reset the per-turn scratch
        // fields so stale evidence never leaks into this turn's reply.
        let mut turn_update = StateUpdate::new()
            .with_message(crate::message::Message::user(request.message.clone()));
        turn_update.structured_data = Patch::Clear;
        turn_update.rag_query_params = Patch::Clear;
        turn_update.rag_query_results = Patch::Clear;
        turn_update.ui_type = Patch::Clear;
        turn_update.file_content = match request.file_content.clone() {
            Some(content) => Patch::Set(content),
            None => Patch::Clear,
        };
        state.apply(turn_update);

        let next = self.flow.next_node(&NodeKind::Start, &state)?;
        self.drive(&request.thread_id, state, seq, next, None).await
    }

    /// Deliver an external decision to a suspended thread and run the flow
    /// onward to completion (or a further suspension).
    #[instrument(skip(self, request), fields(thread_id = %request.thread_id), err)]
    pub async fn resume(&self, request: ResumeRequest) -> Result<TurnOutcome, RunnerError> {
        let _guard = self.acquire(&request.thread_id)?;

        let cp = self
            .checkpointer
            .load_latest(&request.thread_id)
            .await?
            .ok_or_else(|| RunnerError::UnknownThread {
                thread_id: request.thread_id.clone(),
            })?;
        let pending = cp
            .pending_interrupt
            .clone()
            .ok_or_else(|| RunnerError::StaleInterruptResume {
                thread_id: request.thread_id.clone(),
            })?;

        let mut state = cp.state;
        let node = self.flow.node(&pending.node)?;
        let ctx = NodeContext {
            node_id: pending.node.to_string(),
            step: 0,
            event_sender: self.event_bus.sender(),
        };

        let next = match node.resume(&state, ctx, request.payload).await? {
            NodeStep::Continue(update) => {
                state.apply(update);
                self.flow.next_node(&pending.node, &state)?
            }
            NodeStep::Goto(update, target) => {
                state.apply(update);
                target
            }
            NodeStep::Suspend { update, interrupt } => {
                state.apply(update);
                let seq = cp.seq + 1;
                self.checkpointer
                    .save(Checkpoint {
                        thread_id: request.thread_id.clone(),
                        seq,
                        state: state.clone(),
                        next: pending.node.clone(),
                        pending_interrupt: Some(PendingInterrupt {
                            node: pending.node,
                            payload: interrupt.clone(),
                        }),
                        created_at: Utc::now(),
                    })
                    .await?;
                return Ok(TurnOutcome::Suspended { interrupt, state });
            }
        };

        // Intermediate checkpoints keep carrying the interrupt: a failure
        // before the end-of-turn checkpoint leaves it consumable for a retry.
        self.drive(&request.thread_id, state, cp.seq, next, Some(pending))
            .await
    }

    /// Sequential node loop with persist-before-execute checkpointing.
    async fn drive(
        &self,
        thread_id: &str,
        mut state: ConversationState,
        mut seq: u64,
        mut next: NodeKind,
        carried_interrupt: Option<PendingInterrupt>,
    ) -> Result<TurnOutcome, RunnerError> {
        let mut steps: u64 = 0;
        loop {
            seq += 1;
            self.checkpointer
                .save(Checkpoint {
                    thread_id: thread_id.to_string(),
                    seq,
                    state: state.clone(),
                    next: next.clone(),
                    pending_interrupt: if next.is_end() {
                        None
                    } else {
                        carried_interrupt.clone()
                    },
                    created_at: Utc::now(),
                })
                .await?;

            if next.is_end() {
                return Ok(TurnOutcome::Completed { state });
            }

            steps += 1;
            if steps > self.step_limit {
                return Err(RunnerError::StepLimitExceeded {
                    thread_id: thread_id.to_string(),
                    limit: self.step_limit,
                });
            }

            let node = self.flow.node(&next)?;
            let ctx = NodeContext {
                node_id: next.to_string(),
                step: steps,
                event_sender: self.event_bus.sender(),
            };
            match node.run(&state, ctx).await? {
                NodeStep::Continue(update) => {
                    state.apply(update);
                    let from = next;
                    next = self.flow.next_node(&from, &state)?;
                }
                NodeStep::Goto(update, target) => {
                    state.apply(update);
                    next = target;
                }
                NodeStep::Suspend { update, interrupt } => {
                    state.apply(update);
                    seq += 1;
                    self.checkpointer
                        .save(Checkpoint {
                            thread_id: thread_id.to_string(),
                            seq,
                            state: state.clone(),
                            next: next.clone(),
                            pending_interrupt: Some(PendingInterrupt {
                                node: next,
                                payload: interrupt.clone(),
                            }),
                            created_at: Utc::now(),
                        })
                        .await?;
                    return Ok(TurnOutcome::Suspended { interrupt, state });
                }
            }
        }
    }
}

/// Releases the thread's busy slot when the turn ends, on any path.
struct ThreadGuard {
    busy: Arc<Mutex<FxHashSet<String>>>,
    thread_id: String,
}

impl Drop for ThreadGuard {
    fn drop(&mut self) {
        self.busy.lock().remove(&self.thread_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::FlowBuilder;
    use crate::node::{Node, NodeContext, NodeError};
    use crate::runtime::checkpoint::InMemoryCheckpointer;
    use crate::types::UserRole;
    use async_trait::async_trait;

    struct Reply;

    #[async_trait]
    impl Node for Reply {
        async fn run(
            &self,
            _state: &ConversationState,
            _ctx: NodeContext,
        ) -> Result<NodeStep, NodeError> {
            Ok(NodeStep::Continue(
                StateUpdate::new().with_message(crate::message::Message::assistant("ok")),
            ))
        }
    }

    fn runner() -> FlowRunner {
        let flow = FlowBuilder::new()
            .add_node("reply", Reply)
            .add_edge(NodeKind::Start, "reply".into())
            .add_edge("reply".into(), NodeKind::End)
            .compile()
            .unwrap();
        FlowRunner::new(flow, Arc::new(InMemoryCheckpointer::new()))
    }

    fn request(thread: &str) -> TurnRequest {
        TurnRequest {
            thread_id: thread.to_string(),
            user_info: UserInfo {
                uid: 1,
                role: UserRole::Student,
                name: "test".into(),
            },
            message: "hello".into(),
            file_content: None,
        }
    }

    #[tokio::test]
    async fn busy_guard_releases_after_turn() {
        let runner = runner();
        let guard = runner.acquire("t1").unwrap();
        assert!(matches!(
            runner.acquire("t1"),
            Err(RunnerError::ThreadBusy { .. })
        ));
        // Other threads are unaffected.
        drop(runner.acquire("t2").unwrap());
        drop(guard);
        drop(runner.acquire("t1").unwrap());
    }

    #[tokio::test]
    async fn simple_turn_completes_and_checkpoints() {
        let checkpointer = Arc::new(InMemoryCheckpointer::new());
        let flow = FlowBuilder::new()
            .add_node("reply", Reply)
            .add_edge(NodeKind::Start, "reply".into())
            .add_edge("reply".into(), NodeKind::End)
            .compile()
            .unwrap();
        let runner = FlowRunner::new(flow, checkpointer.clone());

        let outcome = runner.run_turn(request("t1")).await.unwrap();
        let TurnOutcome::Completed { state } = outcome else {
            panic!("expected completion");
        };
        assert_eq!(state.messages.len(), 2);

        // One checkpoint before the node, one at end-of-turn.
        let history = checkpointer.history("t1");
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].next, NodeKind::Custom("reply".into()));
        assert!(history[1].next.is_end());
        assert_eq!(history[1].seq, 2);
    }
}
