//! Academic subflow: grade and timetable queries through tool calling.

use async_trait::async_trait;
use chrono::Utc;
use std::sync::Arc;
use tracing::instrument;

use crate::clients::{CampusStore, LanguageModel, ToolHandler};
use crate::flows::prompts;
use crate::flows::tools::{GradesTool, ScheduleTool};
use crate::message::Message;
use crate::node::{Node, NodeContext, NodeError, NodeStep};
use crate::state::{ConversationState, StateUpdate};

/// Runs the tool-calling loop with identity-scoped academic tools.
///
/// Tools are constructed per turn, bound to the thread's authenticated user
/// id; nothing the model emits can redirect a lookup to someone else's
/// records. The final assistant reply is appended to the log and the last
/// tool payload, if any, lands in `structured_data` for the client's
/// renderer.
pub struct AcademicNode {
    llm: Arc<dyn LanguageModel>,
    store: Arc<dyn CampusStore>,
}

impl AcademicNode {
    #[must_use]
    pub fn new(llm: Arc<dyn LanguageModel>, store: Arc<dyn CampusStore>) -> Self {
        Self { llm, store }
    }
}

#[async_trait]
impl Node for AcademicNode {
    #[instrument(skip_all, err)]
    async fn run(
        &self,
        state: &ConversationState,
        ctx: NodeContext,
    ) -> Result<NodeStep, NodeError> {
        let today = Utc::now().format("%Y-%m-%d").to_string();
        let system = prompts::academic_system_prompt(&state.user_info, &today);

        let mut messages = vec![Message::system(system)];
        messages.extend(state.messages.iter().cloned());

        let tools: Vec<Arc<dyn ToolHandler>> = vec![
            Arc::new(GradesTool::new(
                Arc::clone(&self.store),
                state.user_info.uid,
            )),
            Arc::new(ScheduleTool::new(
                Arc::clone(&self.store),
                state.user_info.uid,
            )),
        ];

        let trace = self
            .llm
            .tool_call(&messages, &tools)
            .await
            .map_err(|e| NodeError::Provider {
                provider: "llm",
                message: e.to_string(),
            })?;
        ctx.emit(
            "academic",
            format!("{} tool call(s)", trace.tool_payloads.len()),
        );

        let mut update = StateUpdate::new().with_message(Message::assistant(trace.reply.clone()));
        if let Some(payload) = trace.tool_payloads.last() {
            update = update
                .set_structured_data(payload.clone())
                .set_ui_type("academic_records");
        }
        Ok(NodeStep::Continue(update))
    }
}
