//! Durable execution: checkpoints, pluggable persistence backends, and the
//! turn-driving [`FlowRunner`].
//!
//! The runtime layer owns the two durability invariants of the engine:
//!
//! - **Persist before execute.** A checkpoint recording the merged state and
//!   the next node to run is written before that node executes, so a crash at
//!   any point resumes from the last durable frontier.
//! - **Strictly increasing sequence.** Checkpoints of a thread are numbered
//!   `1, 2, 3, …` with no gaps; a backend rejects any save whose sequence is
//!   not exactly one past the latest stored one. Two writers racing on the
//!   same thread cannot both win.
//!
//! # Backends
//!
//! - [`InMemoryCheckpointer`]: volatile storage for tests and development
//! - [`SqliteCheckpointer`]: durable SQLite-backed persistence (feature
//!   `sqlite`)

pub mod checkpoint;
#[cfg(feature = "sqlite")]
pub mod checkpointer_sqlite;
pub mod persistence;
pub mod runner;

pub use checkpoint::{
    Checkpoint, Checkpointer, CheckpointerError, InMemoryCheckpointer, PendingInterrupt,
};
#[cfg(feature = "sqlite")]
pub use checkpointer_sqlite::SqliteCheckpointer;
pub use persistence::{PersistedCheckpoint, PersistedInterrupt, PersistenceError};
pub use runner::{FlowRunner, ResumeRequest, RunnerError, TurnOutcome, TurnRequest};
