//! Intent classification for each incoming turn.

use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;
use tracing::instrument;

use crate::clients::LanguageModel;
use crate::flows::prompts;
use crate::message::Message;
use crate::node::{Node, NodeContext, NodeError, NodeStep};
use crate::state::{ConversationState, StateUpdate};
use crate::types::Intent;

/// Classifies the latest user utterance into the closed intent set.
///
/// The classifier's output is untrusted: the `destination` field is parsed
/// strictly and anything outside {academic, info, admin, chat} fails the
/// turn as a classification error rather than falling back to a default
/// branch.
pub struct RouterNode {
    llm: Arc<dyn LanguageModel>,
}

impl RouterNode {
    #[must_use]
    pub fn new(llm: Arc<dyn LanguageModel>) -> Self {
        Self { llm }
    }
}

#[async_trait]
impl Node for RouterNode {
    #[instrument(skip_all, err)]
    async fn run(
        &self,
        state: &ConversationState,
        ctx: NodeContext,
    ) -> Result<NodeStep, NodeError> {
        let utterance = state
            .last_user_message()
            .ok_or(NodeError::MissingInput {
                what: "user message",
            })?
            .content
            .clone();

        let decision = self
            .llm
            .structured(&[
                Message::system(prompts::router_system_prompt()),
                Message::user(utterance),
            ])
            .await
            .map_err(|e| NodeError::Provider {
                provider: "llm",
                message: e.to_string(),
            })?;

        let destination =
            decision
                .get("destination")
                .and_then(Value::as_str)
                .ok_or_else(|| NodeError::Classification {
                    message: "classifier reply has no destination field".into(),
                })?;
        let intent: Intent = destination
            .parse()
            .map_err(|e: crate::types::UnknownVariant| NodeError::Classification {
                message: e.to_string(),
            })?;

        let reason = decision
            .get("reason")
            .and_then(Value::as_str)
            .unwrap_or("unstated");
        ctx.emit("routing", format!("intent={intent} ({reason})"));

        Ok(NodeStep::Continue(StateUpdate::new().with_intent(intent)))
    }
}
