//! Environment-driven settings for production wiring.
//!
//! `.env` files are honored via `dotenvy`; explicit environment variables
//! win. Only the chat API key is required, everything else has a sensible
//! local default.

use miette::Diagnostic;
use thiserror::Error;

#[derive(Debug, Error, Diagnostic)]
pub enum ConfigError {
    #[error("missing required environment variable: {name}")]
    #[diagnostic(
        code(campusflow::config::missing),
        help("Set the variable in the environment or a .env file.")
    )]
    Missing { name: &'static str },

    #[error("invalid value for {name}: {message}")]
    #[diagnostic(code(campusflow::config::invalid))]
    Invalid {
        name: &'static str,
        message: String,
    },
}

/// Connection settings for every external collaborator.
#[derive(Clone, Debug)]
pub struct Settings {
    /// OpenAI-compatible endpoint, up to and excluding `/chat/completions`.
    pub llm_base_url: String,
    pub llm_api_key: String,
    pub llm_model: String,
    pub ollama_base_url: String,
    pub embedding_model: String,
    pub embedding_dimensions: usize,
    pub qdrant_url: String,
    pub qdrant_collection: String,
    /// SQLite URL for checkpoints and campus records.
    pub database_url: String,
}

fn var_or(name: &str, default: &str) -> String {
    std::env::var(name).unwrap_or_else(|_| default.to_string())
}

impl Settings {
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        let llm_api_key =
            std::env::var("LLM_API_KEY").map_err(|_| ConfigError::Missing { name: "LLM_API_KEY" })?;

        let embedding_dimensions = var_or("EMBEDDING_DIMENSIONS", "768")
            .parse::<usize>()
            .map_err(|e| ConfigError::Invalid {
                name: "EMBEDDING_DIMENSIONS",
                message: e.to_string(),
            })?;

        Ok(Self {
            llm_base_url: var_or("LLM_BASE_URL", "https://api.openai.com/v1"),
            llm_api_key,
            llm_model: var_or("LLM_MODEL", "gpt-4o-mini"),
            ollama_base_url: var_or("OLLAMA_BASE_URL", "http://localhost:11434"),
            embedding_model: var_or("EMBEDDING_MODEL", "nomic-embed-text"),
            embedding_dimensions,
            qdrant_url: var_or("QDRANT_URL", "http://localhost:6333"),
            qdrant_collection: var_or("QDRANT_COLLECTION", "campus_docs"),
            database_url: var_or("DATABASE_URL", "sqlite://campusflow.db?mode=rwc"),
        })
    }
}
