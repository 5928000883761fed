//! Info subflow: query expansion, filtered retrieval, grounded synthesis.

use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;
use tracing::instrument;

use crate::clients::{Embedder, LanguageModel, VectorSearch};
use crate::flows::prompts;
use crate::message::Message;
use crate::node::{Node, NodeContext, NodeError, NodeStep};
use crate::state::{ConversationState, RagQueryParams, StateUpdate};
use crate::types::Domain;

/// Passages fetched per retrieval.
pub const RAG_TOP_K: usize = 10;

/// Keywords beyond this are dropped; the prompt asks for 3-5.
const MAX_KEYWORDS: usize = 5;

/// Expands the question into retrieval parameters: a hypothetical answering
/// passage (HyDE), canonical keywords, and the target domain.
pub struct QueryExpandNode {
    llm: Arc<dyn LanguageModel>,
}

impl QueryExpandNode {
    #[must_use]
    pub fn new(llm: Arc<dyn LanguageModel>) -> Self {
        Self { llm }
    }
}

/// Accepts either a JSON array of strings or a whitespace-separated string;
/// models produce both despite the schema in the prompt.
fn parse_keywords(value: Option<&Value>) -> Vec<String> {
    match value {
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(Value::as_str)
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect(),
        Some(Value::String(s)) => s
            .split_whitespace()
            .map(str::to_string)
            .collect(),
        _ => Vec::new(),
    }
}

#[async_trait]
impl Node for QueryExpandNode {
    #[instrument(skip_all, err)]
    async fn run(
        &self,
        state: &ConversationState,
        ctx: NodeContext,
    ) -> Result<NodeStep, NodeError> {
        let question = state
            .last_user_message()
            .ok_or(NodeError::MissingInput {
                what: "user message",
            })?
            .content
            .clone();

        let expansion = self
            .llm
            .structured(&[Message::user(prompts::query_expand_prompt(&question))])
            .await
            .map_err(|e| NodeError::Provider {
                provider: "llm",
                message: e.to_string(),
            })?;

        let hyde_doc = expansion
            .get("hyde_doc")
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .ok_or_else(|| NodeError::Extraction {
                message: "query expansion produced no hyde_doc".into(),
            })?
            .to_string();

        let mut keywords = parse_keywords(expansion.get("keywords"));
        if keywords.is_empty() {
            return Err(NodeError::Extraction {
                message: "query expansion produced no keywords".into(),
            });
        }
        keywords.truncate(MAX_KEYWORDS);

        let domain: Domain = expansion
            .get("domain")
            .and_then(Value::as_str)
            .ok_or_else(|| NodeError::Extraction {
                message: "query expansion produced no domain".into(),
            })?
            .parse()
            .map_err(|e: crate::types::UnknownVariant| NodeError::Extraction {
                message: e.to_string(),
            })?;

        ctx.emit(
            "retrieve",
            format!("domain={domain}, {} keyword(s)", keywords.len()),
        );
        Ok(NodeStep::Continue(StateUpdate::new().set_rag_query_params(
            RagQueryParams {
                hyde_doc,
                keywords,
                domain,
            },
        )))
    }
}

/// Embeds the HyDE passage and runs the filtered similarity search.
///
/// Empty retrieval is a valid outcome, not an error; synthesis decides what
/// to tell the user.
pub struct RetrieveNode {
    embedder: Arc<dyn Embedder>,
    search: Arc<dyn VectorSearch>,
}

impl RetrieveNode {
    #[must_use]
    pub fn new(embedder: Arc<dyn Embedder>, search: Arc<dyn VectorSearch>) -> Self {
        Self { embedder, search }
    }
}

#[async_trait]
impl Node for RetrieveNode {
    #[instrument(skip_all, err)]
    async fn run(
        &self,
        state: &ConversationState,
        ctx: NodeContext,
    ) -> Result<NodeStep, NodeError> {
        let params = state
            .rag_query_params
            .as_ref()
            .ok_or(NodeError::MissingInput {
                what: "rag query parameters",
            })?;

        let vector =
            self.embedder
                .embed(&params.hyde_doc)
                .await
                .map_err(|e| NodeError::Provider {
                    provider: "embedder",
                    message: e.to_string(),
                })?;
        let hits = self
            .search
            .search(&vector, params, RAG_TOP_K)
            .await
            .map_err(|e| NodeError::Provider {
                provider: "vector_search",
                message: e.to_string(),
            })?;

        ctx.emit("retrieve", format!("{} passage(s)", hits.len()));
        Ok(NodeStep::Continue(
            StateUpdate::new().set_rag_query_results(hits),
        ))
    }
}

/// Answers from the retrieved passages, or declines when there are none.
pub struct SynthesizeNode {
    llm: Arc<dyn LanguageModel>,
}

impl SynthesizeNode {
    #[must_use]
    pub fn new(llm: Arc<dyn LanguageModel>) -> Self {
        Self { llm }
    }
}

#[async_trait]
impl Node for SynthesizeNode {
    #[instrument(skip_all, err)]
    async fn run(
        &self,
        state: &ConversationState,
        ctx: NodeContext,
    ) -> Result<NodeStep, NodeError> {
        let hits = state
            .rag_query_results
            .as_ref()
            .ok_or(NodeError::MissingInput {
                what: "retrieval results",
            })?;

        if hits.is_empty() {
            // No evidence: skip the model entirely so nothing gets invented.
            ctx.emit("synthesize", "no evidence, declining");
            return Ok(NodeStep::Continue(
                StateUpdate::new().with_message(Message::assistant(prompts::NO_EVIDENCE_REPLY)),
            ));
        }

        let passages: Vec<String> = hits.iter().map(|h| h.content.clone()).collect();
        let mut messages = vec![Message::system(prompts::synthesis_system_prompt(&passages))];
        messages.extend(state.messages.iter().cloned());

        let reply = self
            .llm
            .chat(&messages)
            .await
            .map_err(|e| NodeError::Provider {
                provider: "llm",
                message: e.to_string(),
            })?;
        ctx.emit("synthesize", format!("answered from {} passage(s)", hits.len()));
        Ok(NodeStep::Continue(
            StateUpdate::new().with_message(Message::assistant(reply)),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::flows::testing::ScriptedLlm;
    use crate::state::{RagHit, UserInfo};
    use crate::types::UserRole;
    use serde_json::json;

    fn state_with(utterance: &str) -> ConversationState {
        let mut state = ConversationState::new(UserInfo {
            uid: 1,
            role: UserRole::Student,
            name: "test".into(),
        });
        state.apply(StateUpdate::new().with_message(Message::user(utterance)));
        state
    }

    fn ctx(node: &str) -> NodeContext {
        NodeContext {
            node_id: node.into(),
            step: 1,
            event_sender: crate::event_bus::EventBus::new().sender(),
        }
    }

    #[tokio::test]
    async fn expansion_parses_array_keywords() {
        let llm = Arc::new(ScriptedLlm::structured_replies(vec![json!({
            "hyde_doc": "Recommendation requires a GPA above 3.5.",
            "keywords": ["GPA", "recommendation", "quota"],
            "domain": "admission_policy",
        })]));
        let node = QueryExpandNode::new(llm);
        let step = node
            .run(&state_with("what GPA do I need?"), ctx("query_expand"))
            .await
            .unwrap();
        let NodeStep::Continue(update) = step else {
            panic!("expected continue");
        };
        let crate::state::Patch::Set(params) = update.rag_query_params else {
            panic!("expected params");
        };
        assert_eq!(params.domain, Domain::AdmissionPolicy);
        assert_eq!(params.keywords.len(), 3);
    }

    #[tokio::test]
    async fn expansion_splits_string_keywords_and_truncates() {
        let llm = Arc::new(ScriptedLlm::structured_replies(vec![json!({
            "hyde_doc": "The library closes at 22:00.",
            "keywords": "library hours closing opening weekend holiday",
            "domain": "campus_life",
        })]));
        let node = QueryExpandNode::new(llm);
        let step = node
            .run(&state_with("library hours?"), ctx("query_expand"))
            .await
            .unwrap();
        let NodeStep::Continue(update) = step else {
            panic!("expected continue");
        };
        let crate::state::Patch::Set(params) = update.rag_query_params else {
            panic!("expected params");
        };
        assert_eq!(params.keywords.len(), MAX_KEYWORDS);
    }

    #[tokio::test]
    async fn unknown_domain_is_an_extraction_error() {
        let llm = Arc::new(ScriptedLlm::structured_replies(vec![json!({
            "hyde_doc": "Something.",
            "keywords": ["a"],
            "domain": "weather",
        })]));
        let node = QueryExpandNode::new(llm);
        let err = node
            .run(&state_with("?"), ctx("query_expand"))
            .await
            .unwrap_err();
        assert!(matches!(err, NodeError::Extraction { .. }));
    }

    #[tokio::test]
    async fn empty_retrieval_declines_without_calling_the_model() {
        // A scripted LLM with no replies would fail if synthesis called it.
        let node = SynthesizeNode::new(Arc::new(ScriptedLlm::default()));
        let mut state = state_with("obscure question");
        state.apply(StateUpdate::new().set_rag_query_results(Vec::new()));

        let step = node.run(&state, ctx("synthesize")).await.unwrap();
        let NodeStep::Continue(update) = step else {
            panic!("expected continue");
        };
        assert_eq!(update.messages[0].content, prompts::NO_EVIDENCE_REPLY);
    }

    #[tokio::test]
    async fn synthesis_grounds_on_the_retrieved_passages() {
        let llm = Arc::new(ScriptedLlm::default().chat_reply("Per passage 1, 22:00."));
        let node = SynthesizeNode::new(llm.clone());
        let mut state = state_with("when does the library close?");
        state.apply(StateUpdate::new().set_rag_query_results(vec![RagHit {
            score: 0.9,
            content: "The library closes at 22:00 on weekdays.".into(),
        }]));

        node.run(&state, ctx("synthesize")).await.unwrap();
        let system = llm.last_chat_system();
        assert!(system.contains("closes at 22:00"));
    }
}
