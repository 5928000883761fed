//! Smalltalk node for greetings and off-topic turns.

use async_trait::async_trait;
use std::sync::Arc;
use tracing::instrument;

use crate::clients::LanguageModel;
use crate::flows::prompts;
use crate::message::Message;
use crate::node::{Node, NodeContext, NodeError, NodeStep};
use crate::state::{ConversationState, StateUpdate};

pub struct SmalltalkNode {
    llm: Arc<dyn LanguageModel>,
}

impl SmalltalkNode {
    #[must_use]
    pub fn new(llm: Arc<dyn LanguageModel>) -> Self {
        Self { llm }
    }
}

#[async_trait]
impl Node for SmalltalkNode {
    #[instrument(skip_all, err)]
    async fn run(
        &self,
        state: &ConversationState,
        ctx: NodeContext,
    ) -> Result<NodeStep, NodeError> {
        let mut messages = vec![Message::system(prompts::smalltalk_system_prompt(
            &state.user_info,
        ))];
        messages.extend(state.messages.iter().cloned());

        let reply = self
            .llm
            .chat(&messages)
            .await
            .map_err(|e| NodeError::Provider {
                provider: "llm",
                message: e.to_string(),
            })?;
        ctx.emit("chat", "replied");
        Ok(NodeStep::Continue(
            StateUpdate::new().with_message(Message::assistant(reply)),
        ))
    }
}
