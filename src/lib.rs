//! # Campusflow: Resumable Conversation Orchestration
//!
//! Campusflow is a checkpointed conversation engine for a smart-campus
//! assistant. Every turn runs through a typed flow graph (an intent router
//! fanning out to an academic tool-calling agent, a retrieval-grounded info
//! subflow, a human-confirmed leave-request subflow, and smalltalk) with a
//! durable checkpoint written before every node executes.
//!
//! ## Core Concepts
//!
//! - **State**: [`state::ConversationState`], a typed record with a fixed
//!   per-field merge policy (messages append, everything else patches)
//! - **Nodes**: async units of work returning a partial update plus a
//!   routing directive ([`node::NodeStep`])
//! - **Flow**: declarative topology with closed-map conditional edges
//!   ([`graph::FlowBuilder`])
//! - **Runtime**: [`runtime::FlowRunner`] drives turns, persists through a
//!   pluggable [`runtime::Checkpointer`], and serializes writers per thread
//! - **Interrupts**: nodes can suspend for an external decision; the thread
//!   stays parked durably until an explicit resume, exactly once
//!
//! ## Quick Start
//!
//! ```no_run
//! use std::sync::Arc;
//! use campusflow::app::{CampusApp, thread_id};
//! use campusflow::clients::{MemoryCampusStore, MemoryVectorStore};
//! use campusflow::flows::FlowDeps;
//! use campusflow::runtime::{InMemoryCheckpointer, TurnRequest, TurnOutcome};
//! use campusflow::state::UserInfo;
//! use campusflow::types::UserRole;
//!
//! # async fn example(llm: Arc<dyn campusflow::clients::LanguageModel>,
//! #                  embedder: Arc<dyn campusflow::clients::Embedder>) -> miette::Result<()> {
//! let deps = FlowDeps {
//!     llm,
//!     embedder,
//!     search: Arc::new(MemoryVectorStore::new()),
//!     store: Arc::new(MemoryCampusStore::new()),
//! };
//! let app = CampusApp::new(&deps, Arc::new(InMemoryCheckpointer::new()))?;
//!
//! let user = UserInfo { uid: 7, role: UserRole::Student, name: "Li Xiaoyao".into() };
//! let outcome = app.chat(TurnRequest {
//!     thread_id: thread_id(user.uid, user.role),
//!     user_info: user,
//!     message: "When does the library close?".into(),
//!     file_content: None,
//! }).await?;
//!
//! if let TurnOutcome::Completed { state } = outcome {
//!     println!("{}", state.messages.last().unwrap().content);
//! }
//! # Ok(())
//! # }
//! ```
//!
//! ## Module Map
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`message`] | Conversation messages with role constants |
//! | [`types`] | Closed enumerations: intents, domains, node ids |
//! | [`state`] | The conversation record and its merge policy |
//! | [`node`] | The [`node::Node`] trait and execution primitives |
//! | [`graph`] | Flow topology and compilation |
//! | [`runtime`] | Checkpoints, backends, and the turn runner |
//! | [`clients`] | Collaborator traits and provider implementations |
//! | [`flows`] | The campus assistant's nodes and wiring |
//! | [`event_bus`] | Progress-event channel for node execution |
//! | [`config`] | Environment-driven settings |
//! | [`telemetry`] | Tracing setup |
//! | [`app`] | Top-level assembly |

pub mod app;
pub mod clients;
pub mod config;
pub mod event_bus;
pub mod flows;
pub mod graph;
pub mod message;
pub mod node;
pub mod runtime;
pub mod state;
pub mod telemetry;
pub mod types;
