//! In-memory collaborator implementations for tests and development.

use async_trait::async_trait;
use parking_lot::Mutex;
use parking_lot::RwLock;
use rustc_hash::FxHashMap;
use serde_json::Value;
use std::sync::atomic::{AtomicBool, Ordering};
use uuid::Uuid;

use crate::clients::{CampusStore, ClientError, LeaveRecord, StoreError, VectorSearch};
use crate::state::{RagHit, RagQueryParams};
use crate::types::Domain;

/// One indexed document.
#[derive(Clone, Debug)]
pub struct MemoryDoc {
    pub domain: Domain,
    pub content: String,
    pub embedding: Vec<f32>,
}

/// Cosine-similarity vector store over an in-memory document list.
///
/// Mirrors the production search semantics: the domain filter is hard, the
/// keyword filter only boosts ranking.
#[derive(Default)]
pub struct MemoryVectorStore {
    docs: RwLock<Vec<MemoryDoc>>,
}

/// Ranking boost per matched keyword, small enough that similarity dominates.
const KEYWORD_BOOST: f32 = 0.05;

fn cosine(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        0.0
    } else {
        dot / (norm_a * norm_b)
    }
}

impl MemoryVectorStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, doc: MemoryDoc) {
        self.docs.write().push(doc);
    }
}

#[async_trait]
impl VectorSearch for MemoryVectorStore {
    async fn search(
        &self,
        embedding: &[f32],
        params: &RagQueryParams,
        limit: usize,
    ) -> Result<Vec<RagHit>, ClientError> {
        let docs = self.docs.read();
        let mut scored: Vec<RagHit> = docs
            .iter()
            .filter(|doc| doc.domain == params.domain)
            .map(|doc| {
                let matched = params
                    .keywords
                    .iter()
                    .filter(|kw| doc.content.contains(kw.as_str()))
                    .count() as f32;
                RagHit {
                    score: cosine(embedding, &doc.embedding) + matched * KEYWORD_BOOST,
                    content: doc.content.clone(),
                }
            })
            .collect();
        scored.sort_by(|a, b| b.score.total_cmp(&a.score));
        scored.truncate(limit);
        Ok(scored)
    }
}

/// In-memory campus records with scripted failure support.
#[derive(Default)]
pub struct MemoryCampusStore {
    grades: RwLock<FxHashMap<i64, Value>>,
    schedules: RwLock<FxHashMap<i64, Value>>,
    leaves: Mutex<Vec<(String, LeaveRecord)>>,
    fail_next_insert: AtomicBool,
}

impl MemoryCampusStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_grades(&self, student_id: i64, grades: Value) {
        self.grades.write().insert(student_id, grades);
    }

    pub fn set_schedule(&self, student_id: i64, schedule: Value) {
        self.schedules.write().insert(student_id, schedule);
    }

    /// Make the next `insert_leave` fail, for retry testing.
    pub fn fail_next_insert(&self) {
        self.fail_next_insert.store(true, Ordering::SeqCst);
    }

    /// Filed leave requests, in insertion order.
    #[must_use]
    pub fn leaves(&self) -> Vec<(String, LeaveRecord)> {
        self.leaves.lock().clone()
    }
}

#[async_trait]
impl CampusStore for MemoryCampusStore {
    async fn grades_for(&self, student_id: i64) -> Result<Value, StoreError> {
        self.grades
            .read()
            .get(&student_id)
            .cloned()
            .ok_or(StoreError::NotFound { student_id })
    }

    async fn schedule_for(&self, student_id: i64) -> Result<Value, StoreError> {
        self.schedules
            .read()
            .get(&student_id)
            .cloned()
            .ok_or(StoreError::NotFound { student_id })
    }

    async fn insert_leave(&self, record: &LeaveRecord) -> Result<String, StoreError> {
        if self.fail_next_insert.swap(false, Ordering::SeqCst) {
            return Err(StoreError::Backend {
                message: "scripted insert failure".into(),
            });
        }
        let id = Uuid::new_v4().to_string();
        self.leaves.lock().push((id.clone(), record.clone()));
        Ok(id)
    }
}
