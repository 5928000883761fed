//! Shared fixtures: users, requests, and pre-seeded stores.

use std::sync::Arc;

use serde_json::{Value, json};

use campusflow::app::{CampusApp, thread_id};
use campusflow::clients::{MemoryCampusStore, MemoryVectorStore, memory::MemoryDoc};
use campusflow::flows::FlowDeps;
use campusflow::runtime::{InMemoryCheckpointer, ResumeRequest, TurnRequest};
use campusflow::state::UserInfo;
use campusflow::types::{Domain, UserRole};

use super::mocks::{FixedEmbedder, MockLlm};

pub fn student() -> UserInfo {
    UserInfo {
        uid: 7,
        role: UserRole::Student,
        name: "Li Xiaoyao".into(),
    }
}

pub fn student_thread() -> String {
    thread_id(7, UserRole::Student)
}

pub fn turn(message: &str) -> TurnRequest {
    TurnRequest {
        thread_id: student_thread(),
        user_info: student(),
        message: message.into(),
        file_content: None,
    }
}

pub fn resume_with(payload: Value) -> ResumeRequest {
    ResumeRequest {
        thread_id: student_thread(),
        payload,
    }
}

pub fn router_decision(destination: &str) -> Value {
    json!({"destination": destination, "reason": "scripted"})
}

pub fn full_leave_draft() -> Value {
    json!({
        "leave_type": "sick",
        "start_date": "2026-03-02",
        "end_date": "2026-03-03",
        "reason": "flu",
    })
}

/// Campus store pre-seeded with grades and a schedule for [`student`].
pub fn seeded_campus_store() -> Arc<MemoryCampusStore> {
    let store = Arc::new(MemoryCampusStore::new());
    store.set_grades(
        7,
        json!([
            {"course_name": "Calculus", "score": 91.0, "term": "2025-fall"},
            {"course_name": "Physics", "score": 58.0, "term": "2025-fall"},
        ]),
    );
    store.set_schedule(
        7,
        json!([
            {"course_name": "Calculus", "weekday": 5, "start_time": "08:00",
             "end_time": "09:40", "location": "Building A 302"},
        ]),
    );
    store
}

/// Vector store with one document per domain, all near the fixed query
/// vector so the domain filter decides what comes back.
pub fn seeded_vector_store() -> Arc<MemoryVectorStore> {
    let store = Arc::new(MemoryVectorStore::new());
    store.insert(MemoryDoc {
        domain: Domain::AdmissionPolicy,
        content: "Graduate recommendation requires a GPA ranking in the top 20% with no failed courses.".into(),
        embedding: vec![1.0, 0.0],
    });
    store.insert(MemoryDoc {
        domain: Domain::CampusNews,
        content: "The AI lecture series starts next Wednesday in the main auditorium.".into(),
        embedding: vec![1.0, 0.0],
    });
    store.insert(MemoryDoc {
        domain: Domain::CampusLife,
        content: "The library closes at 22:00 on weekdays and 18:00 on weekends.".into(),
        embedding: vec![1.0, 0.0],
    });
    store
}

/// Assemble a [`CampusApp`] over the scripted model and in-memory backends.
pub struct TestApp {
    pub app: CampusApp,
    pub checkpointer: Arc<InMemoryCheckpointer>,
    pub campus: Arc<MemoryCampusStore>,
}

pub fn test_app(llm: MockLlm) -> TestApp {
    test_app_with(llm, seeded_campus_store())
}

pub fn test_app_with(llm: MockLlm, campus: Arc<MemoryCampusStore>) -> TestApp {
    let checkpointer = Arc::new(InMemoryCheckpointer::new());
    let deps = FlowDeps {
        llm: Arc::new(llm),
        embedder: Arc::new(FixedEmbedder::default()),
        search: seeded_vector_store(),
        store: Arc::clone(&campus) as _,
    };
    let app = CampusApp::new(&deps, checkpointer.clone() as _).expect("flow compiles");
    TestApp {
        app,
        checkpointer,
        campus,
    }
}
