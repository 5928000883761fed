//! Conversation state and the per-field merge policy.
//!
//! [`ConversationState`] is the typed record threaded through every node of a
//! flow. Nodes never mutate it directly: they return a [`StateUpdate`] and the
//! runner merges it. The merge policy is fixed per field:
//!
//! - `messages` **append**: the log only grows, entries are never reordered
//!   or removed;
//! - every other optional field follows [`Patch`] semantics: absent from the
//!   update means "leave as is", explicit clear means "set to none",
//!   otherwise overwrite.
//!
//! The record is schema-checked at node boundaries: fields are typed and
//! optional only where the value is genuinely optional for the thread, not as
//! a stand-in for "filled in later".

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::message::Message;
use crate::types::{Domain, Intent, UserRole};

/// Identity of the authenticated user behind a thread.
///
/// Immutable for the lifetime of the thread; every identity-scoped operation
/// (tool lookups, leave persistence) derives its subject from here, never
/// from model output.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct UserInfo {
    /// Database id of the student or teacher.
    pub uid: i64,
    pub role: UserRole,
    /// Display name.
    pub name: String,
}

/// Query parameters produced by the RAG query-expansion stage.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RagQueryParams {
    /// Hypothetical short passage answering the question (HyDE); embedded as
    /// the dense search query.
    pub hyde_doc: String,
    /// 3–5 canonical keywords, compound terms split into independent official
    /// forms. Applied as a soft (boosting) filter.
    pub keywords: Vec<String>,
    /// Hard filter: only documents from exactly this domain are eligible.
    pub domain: Domain,
}

/// One retrieved passage with its similarity score.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RagHit {
    pub score: f32,
    pub content: String,
}

/// The typed record threaded through every stage of a flow.
///
/// Created on the first turn of a thread, mutated incrementally by each node
/// via [`StateUpdate`], and persisted in the checkpoint store until the
/// thread is expired by an external retention policy.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ConversationState {
    /// Append-only conversation log.
    pub messages: Vec<Message>,
    /// Authenticated identity; immutable for the thread.
    pub user_info: UserInfo,
    /// Last router decision; overwritten each turn.
    #[serde(default)]
    pub intent: Option<Intent>,
    /// Raw payload of the last tool result (academic subflow).
    #[serde(default)]
    pub structured_data: Option<Value>,
    /// Draft payload shown to the user while a suspension is outstanding.
    #[serde(default)]
    pub interrupt_data: Option<Value>,
    /// Hint for the caller's renderer.
    #[serde(default)]
    pub ui_type: Option<String>,
    #[serde(default)]
    pub rag_query_params: Option<RagQueryParams>,
    #[serde(default)]
    pub rag_query_results: Option<Vec<RagHit>>,
    /// Text content of a file attached to the current turn.
    #[serde(default)]
    pub file_content: Option<String>,
}

impl ConversationState {
    /// Creates the state for a fresh thread.
    #[must_use]
    pub fn new(user_info: UserInfo) -> Self {
        Self {
            messages: Vec::new(),
            user_info,
            intent: None,
            structured_data: None,
            interrupt_data: None,
            ui_type: None,
            rag_query_params: None,
            rag_query_results: None,
            file_content: None,
        }
    }

    /// The most recent user message, if any.
    #[must_use]
    pub fn last_user_message(&self) -> Option<&Message> {
        self.messages.iter().rev().find(|m| m.has_role(Message::USER))
    }

    /// Merges a node's partial update into this state.
    ///
    /// Messages append; all other fields follow their [`Patch`].
    pub fn apply(&mut self, update: StateUpdate) {
        self.messages.extend(update.messages);
        if let Some(intent) = update.intent {
            self.intent = Some(intent);
        }
        update.structured_data.apply_to(&mut self.structured_data);
        update.interrupt_data.apply_to(&mut self.interrupt_data);
        update.ui_type.apply_to(&mut self.ui_type);
        update.rag_query_params.apply_to(&mut self.rag_query_params);
        update.rag_query_results.apply_to(&mut self.rag_query_results);
        update.file_content.apply_to(&mut self.file_content);
    }
}

/// Three-state field update: leave as is, clear, or overwrite.
///
/// `Keep` is what an absent field means in a node's update; `Clear` is an
/// explicit null. Keeping the distinction in the type stops "absent" from
/// silently erasing values another node produced.
#[derive(Clone, Debug, Default, PartialEq)]
pub enum Patch<T> {
    #[default]
    Keep,
    Clear,
    Set(T),
}

impl<T> Patch<T> {
    pub fn apply_to(self, slot: &mut Option<T>) {
        match self {
            Patch::Keep => {}
            Patch::Clear => *slot = None,
            Patch::Set(value) => *slot = Some(value),
        }
    }

    #[must_use]
    pub fn is_keep(&self) -> bool {
        matches!(self, Patch::Keep)
    }
}

/// Partial state update returned by node execution.
///
/// All fields default to "no change", so a node only names the state it
/// actually produced.
///
/// # Examples
///
/// ```
/// use campusflow::message::Message;
/// use campusflow::state::StateUpdate;
/// use serde_json::json;
///
/// let update = StateUpdate::new()
///     .with_message(Message::assistant("Here are your grades."))
///     .set_structured_data(json!([{"course_name": "Calculus", "score": 91}]));
/// ```
#[derive(Clone, Debug, Default, PartialEq)]
pub struct StateUpdate {
    /// Messages to append to the thread log.
    pub messages: Vec<Message>,
    /// New router decision, if this node made one.
    pub intent: Option<Intent>,
    pub structured_data: Patch<Value>,
    pub interrupt_data: Patch<Value>,
    pub ui_type: Patch<String>,
    pub rag_query_params: Patch<RagQueryParams>,
    pub rag_query_results: Patch<Vec<RagHit>>,
    pub file_content: Patch<String>,
}

impl StateUpdate {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_message(mut self, message: Message) -> Self {
        self.messages.push(message);
        self
    }

    #[must_use]
    pub fn with_intent(mut self, intent: Intent) -> Self {
        self.intent = Some(intent);
        self
    }

    #[must_use]
    pub fn set_structured_data(mut self, value: Value) -> Self {
        self.structured_data = Patch::Set(value);
        self
    }

    #[must_use]
    pub fn set_interrupt_data(mut self, value: Value) -> Self {
        self.interrupt_data = Patch::Set(value);
        self
    }

    #[must_use]
    pub fn clear_interrupt_data(mut self) -> Self {
        self.interrupt_data = Patch::Clear;
        self
    }

    #[must_use]
    pub fn set_ui_type(mut self, ui_type: impl Into<String>) -> Self {
        self.ui_type = Patch::Set(ui_type.into());
        self
    }

    #[must_use]
    pub fn set_rag_query_params(mut self, params: RagQueryParams) -> Self {
        self.rag_query_params = Patch::Set(params);
        self
    }

    #[must_use]
    pub fn set_rag_query_results(mut self, hits: Vec<RagHit>) -> Self {
        self.rag_query_results = Patch::Set(hits);
        self
    }

    #[must_use]
    pub fn set_file_content(mut self, content: impl Into<String>) -> Self {
        self.file_content = Patch::Set(content.into());
        self
    }

    #[must_use]
    pub fn clear_file_content(mut self) -> Self {
        self.file_content = Patch::Clear;
        self
    }
}
