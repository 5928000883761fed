//! Collaborator traits for everything outside the flow engine: language
//! models, embedders, vector search, and the campus relational store.
//!
//! Nodes depend on these traits, never on concrete providers, so every
//! subflow is testable with scripted in-memory implementations and the
//! production wiring is a construction-time concern.
//!
//! # Implementations
//!
//! - [`openai::OpenAiChatClient`]: OpenAI-compatible chat completions over
//!   HTTP (any base URL)
//! - [`ollama::OllamaEmbedder`]: dense embeddings from a local Ollama server
//! - [`qdrant::QdrantSearch`]: filtered vector search over Qdrant's REST API
//! - [`memory`]: in-memory vector store and campus store for tests
//! - [`campus_sqlite::SqliteCampusStore`]: SQLite campus records (feature
//!   `sqlite`)

pub mod memory;
pub mod ollama;
pub mod openai;
pub mod qdrant;

#[cfg(feature = "sqlite")]
pub mod campus_sqlite;

use async_trait::async_trait;
use chrono::NaiveDate;
use miette::Diagnostic;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use thiserror::Error;

use crate::message::Message;
use crate::state::{RagHit, RagQueryParams};
use crate::types::LeaveType;

pub use memory::{MemoryCampusStore, MemoryVectorStore};
pub use ollama::OllamaEmbedder;
pub use openai::OpenAiChatClient;
pub use qdrant::QdrantSearch;

/// Errors from model and retrieval providers.
#[derive(Debug, Error, Diagnostic)]
pub enum ClientError {
    /// Transport-level failure before an HTTP status was obtained.
    #[error("{provider} request failed: {message}")]
    #[diagnostic(code(campusflow::client::http))]
    Http {
        provider: &'static str,
        message: String,
    },

    /// Non-success HTTP status from the provider.
    #[error("{provider} returned status {status}: {message}")]
    #[diagnostic(code(campusflow::client::api))]
    Api {
        provider: &'static str,
        status: u16,
        message: String,
    },

    /// Response body did not match the expected shape.
    #[error("{provider} response decode failed: {message}")]
    #[diagnostic(code(campusflow::client::decode))]
    Decode {
        provider: &'static str,
        message: String,
    },

    /// The provider returned a response with no usable content.
    #[error("{provider} returned an empty response")]
    #[diagnostic(code(campusflow::client::empty))]
    Empty { provider: &'static str },

    /// A local tool handler failed while servicing a model tool call.
    #[error("tool {name} failed: {message}")]
    #[diagnostic(code(campusflow::client::tool))]
    Tool { name: String, message: String },
}

/// JSON-schema description of a callable tool, in the shape chat-completions
/// APIs expect under `tools[].function`.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ToolSpec {
    pub name: String,
    pub description: String,
    /// JSON schema for the arguments object.
    pub parameters: Value,
}

/// A tool invocation requested by the model.
#[derive(Clone, Debug, PartialEq)]
pub struct ToolCallRequest {
    /// Provider-assigned call id, echoed back in the tool result message.
    pub id: String,
    pub name: String,
    pub arguments: Value,
}

/// A locally executed tool the model may call.
///
/// Handlers are constructed already scoped to the authenticated user; the
/// model chooses *which* tool to call, never *whose* data it reads.
#[async_trait]
pub trait ToolHandler: Send + Sync {
    fn spec(&self) -> ToolSpec;
    async fn invoke(&self, arguments: Value) -> Result<Value, ClientError>;
}

/// Transcript of a tool-calling loop: the messages exchanged (assistant tool
/// calls and tool results) plus the raw tool payloads in invocation order.
#[derive(Clone, Debug, Default)]
pub struct ToolTrace {
    pub messages: Vec<Message>,
    pub tool_payloads: Vec<Value>,
    /// Final assistant text after the model stopped calling tools.
    pub reply: String,
}

/// A chat-capable language model.
#[async_trait]
pub trait LanguageModel: Send + Sync {
    /// Free-form completion over the given transcript.
    async fn chat(&self, messages: &[Message]) -> Result<String, ClientError>;

    /// Completion constrained to a single JSON object.
    async fn structured(&self, messages: &[Message]) -> Result<Value, ClientError>;

    /// Tool-calling loop: the model may request tool invocations, which are
    /// executed locally and fed back until it produces a final reply.
    async fn tool_call(
        &self,
        messages: &[Message],
        tools: &[Arc<dyn ToolHandler>],
    ) -> Result<ToolTrace, ClientError>;
}

/// Produces dense embeddings for retrieval queries.
#[async_trait]
pub trait Embedder: Send + Sync {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, ClientError>;

    /// Dimensionality of the produced vectors.
    fn dimensions(&self) -> usize;
}

/// Filtered similarity search over the document index.
///
/// Implementations apply `params.domain` as a hard filter (documents from
/// other domains are excluded unconditionally) and `params.keywords` as a
/// soft boost.
#[async_trait]
pub trait VectorSearch: Send + Sync {
    async fn search(
        &self,
        embedding: &[f32],
        params: &RagQueryParams,
        limit: usize,
    ) -> Result<Vec<RagHit>, ClientError>;
}

/// A leave request ready to file.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LeaveRecord {
    pub student_id: i64,
    pub leave_type: LeaveType,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub reason: String,
}

/// Errors from the campus relational store.
#[derive(Debug, Error, Diagnostic)]
pub enum StoreError {
    #[error("campus store backend error: {message}")]
    #[diagnostic(code(campusflow::store::backend))]
    Backend { message: String },

    #[error("no records found for student {student_id}")]
    #[diagnostic(code(campusflow::store::not_found))]
    NotFound { student_id: i64 },
}

/// Campus records: grades, schedules, and leave-request persistence.
#[async_trait]
pub trait CampusStore: Send + Sync {
    /// Grade rows for a student, as a JSON array.
    async fn grades_for(&self, student_id: i64) -> Result<Value, StoreError>;

    /// Course schedule rows for a student, as a JSON array.
    async fn schedule_for(&self, student_id: i64) -> Result<Value, StoreError>;

    /// File a leave request. Returns the new record's id; an error means the
    /// record was not filed and the operation is safe to retry.
    async fn insert_leave(&self, record: &LeaveRecord) -> Result<String, StoreError>;
}
