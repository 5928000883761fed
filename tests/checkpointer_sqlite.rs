//! SQLite checkpointer tests over a temporary database file.

#![cfg(feature = "sqlite")]

mod common;

use chrono::Utc;
use serde_json::json;

use campusflow::message::Message;
use campusflow::runtime::{
    Checkpoint, Checkpointer, CheckpointerError, PendingInterrupt, SqliteCheckpointer,
};
use campusflow::state::{ConversationState, StateUpdate};
use campusflow::types::NodeKind;

use common::student;

struct TempDb {
    // Held for its Drop; the path keeps the database alive for the test.
    _dir: tempfile::TempDir,
    url: String,
}

fn temp_db() -> TempDb {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("checkpoints.db");
    TempDb {
        url: format!("sqlite://{}?mode=rwc", path.display()),
        _dir: dir,
    }
}

fn checkpoint(thread: &str, seq: u64) -> Checkpoint {
    let mut state = ConversationState::new(student());
    state.apply(StateUpdate::new().with_message(Message::user("hello")));
    Checkpoint {
        thread_id: thread.to_string(),
        seq,
        state,
        next: NodeKind::Custom("router".into()),
        pending_interrupt: None,
        created_at: Utc::now(),
    }
}

#[tokio::test]
async fn save_and_load_round_trip() {
    let db = temp_db();
    let cp = SqliteCheckpointer::connect(&db.url).await.unwrap();

    let original = checkpoint("7-student", 1);
    cp.save(original.clone()).await.unwrap();

    let loaded = cp.load_latest("7-student").await.unwrap().unwrap();
    assert_eq!(loaded.seq, 1);
    assert_eq!(loaded.next, original.next);
    assert_eq!(loaded.state, original.state);
    assert!(loaded.pending_interrupt.is_none());
}

#[tokio::test]
async fn stale_sequences_are_rejected_durably() {
    let db = temp_db();
    let cp = SqliteCheckpointer::connect(&db.url).await.unwrap();
    cp.save(checkpoint("t", 1)).await.unwrap();
    cp.save(checkpoint("t", 2)).await.unwrap();

    let err = cp.save(checkpoint("t", 2)).await.unwrap_err();
    assert!(matches!(err, CheckpointerError::StaleSequence { .. }));
    let err = cp.save(checkpoint("t", 5)).await.unwrap_err();
    assert!(matches!(err, CheckpointerError::StaleSequence { .. }));

    // The losing writes left nothing behind.
    assert_eq!(cp.load_latest("t").await.unwrap().unwrap().seq, 2);
}

#[tokio::test]
async fn interrupts_survive_reconnection() {
    let db = temp_db();
    {
        let cp = SqliteCheckpointer::connect(&db.url).await.unwrap();
        let mut suspended = checkpoint("t", 1);
        suspended.pending_interrupt = Some(PendingInterrupt {
            node: NodeKind::Custom("leave_intake".into()),
            payload: json!({"interrupt_data": {"leave_type": "sick"}}),
        });
        cp.save(suspended).await.unwrap();
    }

    // A fresh connection sees the suspension.
    let cp = SqliteCheckpointer::connect(&db.url).await.unwrap();
    let loaded = cp.load_latest("t").await.unwrap().unwrap();
    let pending = loaded.pending_interrupt.expect("interrupt persisted");
    assert_eq!(pending.node, NodeKind::Custom("leave_intake".into()));
    assert_eq!(pending.payload["interrupt_data"]["leave_type"], "sick");
}

#[tokio::test]
async fn unknown_threads_load_as_none() {
    let db = temp_db();
    let cp = SqliteCheckpointer::connect(&db.url).await.unwrap();
    assert!(cp.load_latest("nobody").await.unwrap().is_none());
    assert!(cp.list_threads().await.unwrap().is_empty());
}
