//! Checkpointer contract tests against the in-memory backend.

mod common;

use chrono::Utc;
use serde_json::json;

use campusflow::runtime::{
    Checkpoint, Checkpointer, CheckpointerError, InMemoryCheckpointer, PendingInterrupt,
};
use campusflow::state::ConversationState;
use campusflow::types::NodeKind;

use common::student;

fn checkpoint(thread: &str, seq: u64) -> Checkpoint {
    Checkpoint {
        thread_id: thread.to_string(),
        seq,
        state: ConversationState::new(student()),
        next: NodeKind::Custom("router".into()),
        pending_interrupt: None,
        created_at: Utc::now(),
    }
}

#[tokio::test]
async fn threads_are_independent_sequences() {
    let cp = InMemoryCheckpointer::new();
    cp.save(checkpoint("a", 1)).await.unwrap();
    cp.save(checkpoint("b", 1)).await.unwrap();
    cp.save(checkpoint("a", 2)).await.unwrap();

    assert_eq!(cp.load_latest("a").await.unwrap().unwrap().seq, 2);
    assert_eq!(cp.load_latest("b").await.unwrap().unwrap().seq, 1);
}

#[tokio::test]
async fn racing_writers_cannot_both_win() {
    let cp = InMemoryCheckpointer::new();
    cp.save(checkpoint("t", 1)).await.unwrap();

    // Two writers both based their work on seq 1 and try to write seq 2.
    cp.save(checkpoint("t", 2)).await.unwrap();
    let err = cp.save(checkpoint("t", 2)).await.unwrap_err();
    assert!(matches!(
        err,
        CheckpointerError::StaleSequence {
            attempted: 2,
            latest: 2,
            ..
        }
    ));
    // History is unchanged by the losing write.
    assert_eq!(cp.history("t").len(), 2);
}

#[tokio::test]
async fn interrupts_round_trip_through_storage() {
    let cp = InMemoryCheckpointer::new();
    let mut suspended = checkpoint("t", 1);
    suspended.pending_interrupt = Some(PendingInterrupt {
        node: NodeKind::Custom("leave_intake".into()),
        payload: json!({"ui_type": "leave_confirm"}),
    });
    cp.save(suspended.clone()).await.unwrap();

    let loaded = cp.load_latest("t").await.unwrap().unwrap();
    assert_eq!(loaded.pending_interrupt, suspended.pending_interrupt);
}

#[tokio::test]
async fn list_threads_orders_by_recency() {
    let cp = InMemoryCheckpointer::new();
    cp.save(checkpoint("old", 1)).await.unwrap();
    tokio::time::sleep(std::time::Duration::from_millis(5)).await;
    cp.save(checkpoint("new", 1)).await.unwrap();

    let threads = cp.list_threads().await.unwrap();
    assert_eq!(threads, vec!["new".to_string(), "old".to_string()]);
}
