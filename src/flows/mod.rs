//! The campus assistant flow: node implementations and the wiring that
//! assembles them into a [`Flow`].
//!
//! ```text
//!                      Start
//!                        │
//!                      router
//!        ┌───────────┬───┴────────┬───────────┐
//!    academic   query_expand  leave_intake  smalltalk
//!        │           │            │⇢ leave_persist
//!        │        retrieve        │      │
//!        │           │            │      │
//!        │       synthesize       │      │
//!        └───────────┴────────────┴──────┘
//!                       End
//! ```
//!
//! The router's conditional edge is a closed map over the intent set;
//! `leave_intake` reaches `leave_persist` only through an explicit jump
//! after a confirmed resume.

pub mod academic;
pub mod admin;
pub mod chat;
pub mod info;
pub mod prompts;
pub mod router;
pub mod tools;

use std::sync::Arc;

use crate::clients::{CampusStore, Embedder, LanguageModel, VectorSearch};
use crate::graph::{Flow, FlowBuilder, FlowError};
use crate::state::ConversationState;
use crate::types::NodeKind;

pub use academic::AcademicNode;
pub use admin::{LEAVE_CONFIRM_UI, LeaveData, LeaveIntakeNode, LeavePersistNode};
pub use chat::SmalltalkNode;
pub use info::{QueryExpandNode, RAG_TOP_K, RetrieveNode, SynthesizeNode};
pub use router::RouterNode;

pub const ROUTER: &str = "router";
pub const ACADEMIC: &str = "academic";
pub const QUERY_EXPAND: &str = "query_expand";
pub const RETRIEVE: &str = "retrieve";
pub const SYNTHESIZE: &str = "synthesize";
pub const LEAVE_INTAKE: &str = "leave_intake";
pub const LEAVE_PERSIST: &str = "leave_persist";
pub const SMALLTALK: &str = "smalltalk";

/// Collaborators the flow's nodes depend on.
#[derive(Clone)]
pub struct FlowDeps {
    pub llm: Arc<dyn LanguageModel>,
    pub embedder: Arc<dyn Embedder>,
    pub search: Arc<dyn VectorSearch>,
    pub store: Arc<dyn CampusStore>,
}

/// Assembles the full assistant flow over the given collaborators.
pub fn build_campus_flow(deps: &FlowDeps) -> Result<Flow, FlowError> {
    FlowBuilder::new()
        .add_node(ROUTER, RouterNode::new(Arc::clone(&deps.llm)))
        .add_node(
            ACADEMIC,
            AcademicNode::new(Arc::clone(&deps.llm), Arc::clone(&deps.store)),
        )
        .add_node(QUERY_EXPAND, QueryExpandNode::new(Arc::clone(&deps.llm)))
        .add_node(
            RETRIEVE,
            RetrieveNode::new(Arc::clone(&deps.embedder), Arc::clone(&deps.search)),
        )
        .add_node(SYNTHESIZE, SynthesizeNode::new(Arc::clone(&deps.llm)))
        .add_node(LEAVE_INTAKE, LeaveIntakeNode::new(Arc::clone(&deps.llm)))
        .add_node(LEAVE_PERSIST, LeavePersistNode::new(Arc::clone(&deps.store)))
        .add_node(SMALLTALK, SmalltalkNode::new(Arc::clone(&deps.llm)))
        .add_edge(NodeKind::Start, ROUTER.into())
        .add_conditional_edge(
            ROUTER.into(),
            Arc::new(|state: &ConversationState| {
                state.intent.map(|i| i.as_str().to_string())
            }),
            [
                ("academic", ACADEMIC.into()),
                ("info", QUERY_EXPAND.into()),
                ("admin", LEAVE_INTAKE.into()),
                ("chat", SMALLTALK.into()),
            ],
        )
        .add_edge(ACADEMIC.into(), NodeKind::End)
        .add_edge(QUERY_EXPAND.into(), RETRIEVE.into())
        .add_edge(RETRIEVE.into(), SYNTHESIZE.into())
        .add_edge(SYNTHESIZE.into(), NodeKind::End)
        .add_edge(LEAVE_INTAKE.into(), NodeKind::End)
        .add_edge(LEAVE_PERSIST.into(), NodeKind::End)
        .add_edge(SMALLTALK.into(), NodeKind::End)
        .compile()
}
