//! Scripted collaborators shared by the integration tests.

use std::collections::VecDeque;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::Value;

use campusflow::clients::{ClientError, Embedder, LanguageModel, ToolHandler, ToolTrace};
use campusflow::message::Message;

/// One scripted pass through the tool-calling loop: the tools to invoke, in
/// order, followed by the final assistant reply.
#[derive(Clone, Debug, Default)]
pub struct ToolScript {
    pub calls: Vec<(String, Value)>,
    pub reply: String,
}

impl ToolScript {
    pub fn reply(reply: impl Into<String>) -> Self {
        Self {
            calls: Vec::new(),
            reply: reply.into(),
        }
    }

    #[must_use]
    pub fn call(mut self, name: impl Into<String>, arguments: Value) -> Self {
        self.calls.push((name.into(), arguments));
        self
    }
}

/// Language model driven entirely by scripted replies, consumed in call
/// order per method. Running out of script is an error, so a test fails
/// loudly when a flow makes an unexpected model call.
#[derive(Default)]
pub struct MockLlm {
    structured: Mutex<VecDeque<Value>>,
    chat: Mutex<VecDeque<String>>,
    tool_scripts: Mutex<VecDeque<ToolScript>>,
    chat_transcripts: Mutex<Vec<Vec<Message>>>,
}

impl MockLlm {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn structured_reply(self, reply: Value) -> Self {
        self.structured.lock().push_back(reply);
        self
    }

    #[must_use]
    pub fn chat_reply(self, reply: impl Into<String>) -> Self {
        self.chat.lock().push_back(reply.into());
        self
    }

    #[must_use]
    pub fn tool_script(self, script: ToolScript) -> Self {
        self.tool_scripts.lock().push_back(script);
        self
    }

    /// Full message lists of every `chat` call, for prompt assertions.
    pub fn chat_transcripts(&self) -> Vec<Vec<Message>> {
        self.chat_transcripts.lock().clone()
    }
}

#[async_trait]
impl LanguageModel for MockLlm {
    async fn chat(&self, messages: &[Message]) -> Result<String, ClientError> {
        self.chat_transcripts.lock().push(messages.to_vec());
        self.chat.lock().pop_front().ok_or(ClientError::Empty {
            provider: "mock-chat",
        })
    }

    async fn structured(&self, _messages: &[Message]) -> Result<Value, ClientError> {
        self.structured
            .lock()
            .pop_front()
            .ok_or(ClientError::Empty {
                provider: "mock-structured",
            })
    }

    async fn tool_call(
        &self,
        _messages: &[Message],
        tools: &[Arc<dyn ToolHandler>],
    ) -> Result<ToolTrace, ClientError> {
        let script = self
            .tool_scripts
            .lock()
            .pop_front()
            .ok_or(ClientError::Empty {
                provider: "mock-tools",
            })?;
        let mut trace = ToolTrace::default();
        for (name, arguments) in script.calls {
            let handler = tools
                .iter()
                .find(|t| t.spec().name == name)
                .ok_or_else(|| ClientError::Tool {
                    name: name.clone(),
                    message: "script calls an unregistered tool".into(),
                })?;
            let payload = handler.invoke(arguments).await?;
            trace.messages.push(Message::tool(payload.to_string()));
            trace.tool_payloads.push(payload);
        }
        trace.messages.push(Message::assistant(script.reply.clone()));
        trace.reply = script.reply;
        Ok(trace)
    }
}

/// Embedder returning a constant unit vector; similarity ordering in tests
/// then comes from the stored documents' vectors alone.
pub struct FixedEmbedder {
    vector: Vec<f32>,
}

impl FixedEmbedder {
    pub fn new(vector: Vec<f32>) -> Self {
        Self { vector }
    }
}

impl Default for FixedEmbedder {
    fn default() -> Self {
        Self::new(vec![1.0, 0.0])
    }
}

#[async_trait]
impl Embedder for FixedEmbedder {
    async fn embed(&self, _text: &str) -> Result<Vec<f32>, ClientError> {
        Ok(self.vector.clone())
    }

    fn dimensions(&self) -> usize {
        self.vector.len()
    }
}
