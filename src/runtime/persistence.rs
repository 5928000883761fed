//! Serde-friendly persisted shapes for checkpoints, decoupled from the
//! in-memory types.
//!
//! Conversion logic lives here (`From` / `TryFrom` impls) so backend code
//! stays lean and declarative. This module performs no I/O.

use chrono::{DateTime, Utc};
use miette::Diagnostic;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::runtime::checkpoint::{Checkpoint, PendingInterrupt};
use crate::state::ConversationState;
use crate::types::NodeKind;

/// Persisted form of [`PendingInterrupt`].
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PersistedInterrupt {
    /// Encoded via [`NodeKind::encode`].
    pub node: String,
    pub payload: Value,
}

/// Persisted form of a [`Checkpoint`].
///
/// Node kinds round-trip through their string encoding and the timestamp is
/// stored as RFC3339 text, keeping `chrono` types out of the serialized
/// shape. Unknown node encodings decode as `NodeKind::Custom`, so old
/// checkpoints keep loading after a rename.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PersistedCheckpoint {
    pub thread_id: String,
    pub seq: u64,
    pub state: ConversationState,
    /// Encoded via [`NodeKind::encode`].
    pub next: String,
    #[serde(default)]
    pub pending_interrupt: Option<PersistedInterrupt>,
    /// RFC3339 creation time.
    pub created_at: String,
}

/// Conversion and serialization errors for persisted shapes.
#[derive(Debug, Error, Diagnostic)]
pub enum PersistenceError {
    #[error("JSON serialization/deserialization failed: {source}")]
    #[diagnostic(
        code(campusflow::persistence::serde),
        help("Ensure the stored JSON matches the Persisted* shapes.")
    )]
    Serde {
        #[source]
        source: serde_json::Error,
    },

    #[error("invalid stored timestamp: {value:?}")]
    #[diagnostic(code(campusflow::persistence::timestamp))]
    InvalidTimestamp { value: String },
}

pub type Result<T> = std::result::Result<T, PersistenceError>;

impl From<&Checkpoint> for PersistedCheckpoint {
    fn from(cp: &Checkpoint) -> Self {
        PersistedCheckpoint {
            thread_id: cp.thread_id.clone(),
            seq: cp.seq,
            state: cp.state.clone(),
            next: cp.next.encode(),
            pending_interrupt: cp.pending_interrupt.as_ref().map(|i| PersistedInterrupt {
                node: i.node.encode(),
                payload: i.payload.clone(),
            }),
            created_at: cp.created_at.to_rfc3339(),
        }
    }
}

impl TryFrom<PersistedCheckpoint> for Checkpoint {
    type Error = PersistenceError;

    fn try_from(p: PersistedCheckpoint) -> Result<Self> {
        let created_at = DateTime::parse_from_rfc3339(&p.created_at)
            .map(|dt| dt.with_timezone(&Utc))
            .map_err(|_| PersistenceError::InvalidTimestamp {
                value: p.created_at.clone(),
            })?;
        Ok(Checkpoint {
            thread_id: p.thread_id,
            seq: p.seq,
            state: p.state,
            next: NodeKind::decode(&p.next),
            pending_interrupt: p.pending_interrupt.map(|i| PendingInterrupt {
                node: NodeKind::decode(&i.node),
                payload: i.payload,
            }),
            created_at,
        })
    }
}

impl PersistedCheckpoint {
    pub fn to_json_string(&self) -> Result<String> {
        serde_json::to_string(self).map_err(|source| PersistenceError::Serde { source })
    }

    pub fn from_json_str(s: &str) -> Result<Self> {
        serde_json::from_str(s).map_err(|source| PersistenceError::Serde { source })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::UserInfo;
    use crate::types::UserRole;
    use serde_json::json;

    #[test]
    fn checkpoint_roundtrips_through_persisted_shape() {
        let cp = Checkpoint {
            thread_id: "42-student".into(),
            seq: 3,
            state: ConversationState::new(UserInfo {
                uid: 42,
                role: UserRole::Student,
                name: "test".into(),
            }),
            next: NodeKind::Custom("leave_persist".into()),
            pending_interrupt: Some(PendingInterrupt {
                node: NodeKind::Custom("leave_intake".into()),
                payload: json!({"leave_type": "sick", "start_date": "2026-03-02"}),
            }),
            created_at: Utc::now(),
        };

        let persisted = PersistedCheckpoint::from(&cp);
        let json = persisted.to_json_string().unwrap();
        let restored = Checkpoint::try_from(PersistedCheckpoint::from_json_str(&json).unwrap())
            .unwrap();

        assert_eq!(restored.thread_id, cp.thread_id);
        assert_eq!(restored.seq, cp.seq);
        assert_eq!(restored.next, cp.next);
        assert_eq!(restored.pending_interrupt, cp.pending_interrupt);
        assert_eq!(restored.state, cp.state);
    }

    #[test]
    fn bad_timestamp_is_rejected() {
        let p = PersistedCheckpoint {
            thread_id: "t".into(),
            seq: 1,
            state: ConversationState::new(UserInfo {
                uid: 1,
                role: UserRole::Teacher,
                name: "t".into(),
            }),
            next: "End".into(),
            pending_interrupt: None,
            created_at: "not-a-timestamp".into(),
        };
        assert!(matches!(
            Checkpoint::try_from(p),
            Err(PersistenceError::InvalidTimestamp { .. })
        ));
    }
}
