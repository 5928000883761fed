//! Tool handlers exposed to the academic agent.
//!
//! Each handler is constructed already bound to the authenticated user's id:
//! the model picks which tool to call, the arguments carry no identity, and a
//! hallucinated student id in the arguments simply has nowhere to go.

use async_trait::async_trait;
use serde_json::{Value, json};
use std::sync::Arc;

use crate::clients::{CampusStore, ClientError, StoreError, ToolHandler, ToolSpec};

fn no_argument_schema() -> Value {
    json!({"type": "object", "properties": {}, "required": []})
}

fn store_payload(result: Result<Value, StoreError>, what: &str) -> Result<Value, ClientError> {
    match result {
        Ok(rows) => Ok(rows),
        Err(StoreError::NotFound { .. }) => Ok(json!({"message": format!("no {what} found")})),
        Err(err) => Err(ClientError::Tool {
            name: what.to_string(),
            message: err.to_string(),
        }),
    }
}

/// Looks up the bound student's grade records.
pub struct GradesTool {
    store: Arc<dyn CampusStore>,
    student_id: i64,
}

impl GradesTool {
    #[must_use]
    pub fn new(store: Arc<dyn CampusStore>, student_id: i64) -> Self {
        Self { store, student_id }
    }
}

#[async_trait]
impl ToolHandler for GradesTool {
    fn spec(&self) -> ToolSpec {
        ToolSpec {
            name: "get_grades".into(),
            description: "Fetch the current user's grade records for all terms.".into(),
            parameters: no_argument_schema(),
        }
    }

    async fn invoke(&self, _arguments: Value) -> Result<Value, ClientError> {
        store_payload(self.store.grades_for(self.student_id).await, "grades")
    }
}

/// Looks up the bound student's course schedule.
pub struct ScheduleTool {
    store: Arc<dyn CampusStore>,
    student_id: i64,
}

impl ScheduleTool {
    #[must_use]
    pub fn new(store: Arc<dyn CampusStore>, student_id: i64) -> Self {
        Self { store, student_id }
    }
}

#[async_trait]
impl ToolHandler for ScheduleTool {
    fn spec(&self) -> ToolSpec {
        ToolSpec {
            name: "get_schedule".into(),
            description: "Fetch the current user's course timetable.".into(),
            parameters: no_argument_schema(),
        }
    }

    async fn invoke(&self, _arguments: Value) -> Result<Value, ClientError> {
        store_payload(self.store.schedule_for(self.student_id).await, "schedule")
    }
}
