//! Top-level assembly: collaborators, flow, checkpointer, runner.

use std::sync::Arc;

use miette::Diagnostic;
use thiserror::Error;

use crate::clients::ClientError;
use crate::flows::{FlowDeps, build_campus_flow};
use crate::graph::FlowError;
use crate::runtime::{Checkpointer, FlowRunner, ResumeRequest, RunnerError, TurnOutcome, TurnRequest};
use crate::types::UserRole;

/// Errors while assembling the application.
#[derive(Debug, Error, Diagnostic)]
pub enum AppError {
    #[error(transparent)]
    #[diagnostic(transparent)]
    Flow(#[from] FlowError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Client(#[from] ClientError),

    #[cfg(feature = "sqlite")]
    #[error(transparent)]
    #[diagnostic(transparent)]
    Checkpointer(#[from] crate::runtime::CheckpointerError),

    #[cfg(feature = "sqlite")]
    #[error("database error: {0}")]
    #[diagnostic(code(campusflow::app::database))]
    Database(String),
}

/// Canonical thread id for a user: `<uid>-<role>`, so the same person gets
/// separate threads per role.
#[must_use]
pub fn thread_id(uid: i64, role: UserRole) -> String {
    let role = match role {
        UserRole::Student => "student",
        UserRole::Teacher => "teacher",
    };
    format!("{uid}-{role}")
}

/// The assembled campus assistant.
///
/// Wraps a [`FlowRunner`] over the standard flow; callers hand it turns and
/// resume decisions and render the resulting state.
pub struct CampusApp {
    runner: FlowRunner,
}

impl CampusApp {
    /// Assemble from explicit collaborators. This is the constructor tests
    /// and embedding applications use; production setups usually go through
    /// [`from_settings`](Self::from_settings).
    pub fn new(deps: &FlowDeps, checkpointer: Arc<dyn Checkpointer>) -> Result<Self, AppError> {
        let flow = build_campus_flow(deps)?;
        Ok(Self {
            runner: FlowRunner::new(flow, checkpointer),
        })
    }

    /// Assemble the production stack from [`Settings`](crate::config::Settings):
    /// OpenAI-compatible chat, Ollama embeddings, Qdrant search, and SQLite
    /// for both checkpoints and campus records on one pool.
    #[cfg(feature = "sqlite")]
    pub async fn from_settings(settings: &crate::config::Settings) -> Result<Self, AppError> {
        use crate::clients::{OllamaEmbedder, OpenAiChatClient, QdrantSearch, campus_sqlite::SqliteCampusStore};
        use crate::runtime::SqliteCheckpointer;

        let llm = OpenAiChatClient::new(
            &settings.llm_base_url,
            &settings.llm_api_key,
            &settings.llm_model,
        )?;
        let embedder = OllamaEmbedder::new(
            &settings.ollama_base_url,
            &settings.embedding_model,
            settings.embedding_dimensions,
        )?;
        let search = QdrantSearch::new(&settings.qdrant_url, &settings.qdrant_collection)?;

        let pool = Arc::new(
            sqlx::SqlitePool::connect(&settings.database_url)
                .await
                .map_err(|e| AppError::Database(e.to_string()))?,
        );
        #[cfg(feature = "sqlite-migrations")]
        sqlx::migrate!("./migrations")
            .run(&*pool)
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;

        let deps = FlowDeps {
            llm: Arc::new(llm),
            embedder: Arc::new(embedder),
            search: Arc::new(search),
            store: Arc::new(SqliteCampusStore::new(Arc::clone(&pool))),
        };
        let checkpointer: Arc<dyn Checkpointer> = Arc::new(SqliteCheckpointer::from_pool(pool));
        Self::new(&deps, checkpointer)
    }

    /// Run one user turn. See [`FlowRunner::run_turn`].
    pub async fn chat(&self, request: TurnRequest) -> Result<TurnOutcome, RunnerError> {
        self.runner.run_turn(request).await
    }

    /// Deliver an interrupt decision. See [`FlowRunner::resume`].
    pub async fn resume(&self, request: ResumeRequest) -> Result<TurnOutcome, RunnerError> {
        self.runner.resume(request).await
    }

    #[must_use]
    pub fn runner(&self) -> &FlowRunner {
        &self.runner
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn thread_ids_separate_roles() {
        assert_eq!(thread_id(7, UserRole::Student), "7-student");
        assert_eq!(thread_id(7, UserRole::Teacher), "7-teacher");
    }
}
