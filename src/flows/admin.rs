//! Admin subflow: leave-request intake with human confirmation, and the
//! persistence node the confirmation routes to.
//!
//! Intake extracts the leave details from the conversation. Incomplete
//! details get a clarification reply and the turn ends; complete details
//! suspend the thread with a draft for the user to confirm. The resume
//! payload either cancels or routes to [`LeavePersistNode`], which files the
//! record. Only after the insert succeeds does the end-of-turn checkpoint
//! clear the interrupt, so a failed insert leaves the confirmation
//! consumable for a retry and a replayed confirmation after success is
//! rejected as stale.

use async_trait::async_trait;
use chrono::{NaiveDate, Utc};
use serde::Deserialize;
use serde_json::{Value, json};
use std::sync::Arc;
use tracing::instrument;

use crate::clients::{CampusStore, LanguageModel, LeaveRecord};
use crate::flows::{LEAVE_PERSIST, prompts};
use crate::message::Message;
use crate::node::{Node, NodeContext, NodeError, NodeStep};
use crate::state::{ConversationState, Patch, StateUpdate};
use crate::types::{LeaveType, NodeKind};

/// UI hint attached while a leave draft awaits confirmation.
pub const LEAVE_CONFIRM_UI: &str = "leave_confirm";

/// Raw extraction shape: every field optional, nothing guessed.
#[derive(Debug, Clone, Default, Deserialize)]
struct LeaveDraft {
    leave_type: Option<String>,
    start_date: Option<String>,
    end_date: Option<String>,
    reason: Option<String>,
}

impl LeaveDraft {
    /// Normalize the extraction into validated leave data, or list the
    /// fields the user still has to supply.
    ///
    /// A field only counts as present once it normalizes: the leave type
    /// must map onto the closed enum, dates must be YYYY-MM-DD, and the end
    /// date must not precede the start. Anything else is asked for again
    /// instead of becoming a draft the user is invited to confirm.
    fn normalize(&self) -> Result<LeaveData, Vec<&'static str>> {
        let mut missing = Vec::new();
        fn text(f: &Option<String>) -> Option<&str> {
            f.as_deref().map(str::trim).filter(|s| !s.is_empty())
        }
        let date = |f: &Option<String>| {
            text(f).and_then(|s| NaiveDate::parse_from_str(s, "%Y-%m-%d").ok())
        };

        let leave_type = text(&self.leave_type).and_then(|s| s.to_lowercase().parse::<LeaveType>().ok());
        if leave_type.is_none() {
            missing.push("leave type (sick or personal)");
        }
        let start_date = date(&self.start_date);
        if start_date.is_none() {
            missing.push("start date");
        }
        let end_date = match (date(&self.end_date), start_date) {
            (Some(end), Some(start)) if end < start => None,
            (end, _) => end,
        };
        if end_date.is_none() {
            missing.push("end date");
        }
        let reason = text(&self.reason).map(str::to_string);
        if reason.is_none() {
            missing.push("reason");
        }

        match (leave_type, start_date, end_date, reason) {
            (Some(leave_type), Some(start_date), Some(end_date), Some(reason)) => Ok(LeaveData {
                leave_type,
                start_date,
                end_date,
                reason,
            }),
            _ => Err(missing),
        }
    }
}

/// A fully validated leave request.
#[derive(Debug, Clone, PartialEq)]
pub struct LeaveData {
    pub leave_type: LeaveType,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub reason: String,
}

impl LeaveData {
    /// Validate the draft JSON a confirmation carries. Field values come from
    /// model extraction or a user-edited form, so everything is re-checked
    /// here before anything touches the database.
    pub fn from_value(value: &Value) -> Result<Self, String> {
        let field = |name: &str| -> Result<&str, String> {
            value
                .get(name)
                .and_then(Value::as_str)
                .filter(|s| !s.trim().is_empty())
                .ok_or_else(|| format!("missing field: {name}"))
        };
        let leave_type: LeaveType = field("leave_type")?
            .trim()
            .to_lowercase()
            .parse()
            .map_err(|e: crate::types::UnknownVariant| e.to_string())?;
        let parse_date = |name: &str| -> Result<NaiveDate, String> {
            NaiveDate::parse_from_str(field(name)?, "%Y-%m-%d")
                .map_err(|_| format!("{name} is not a YYYY-MM-DD date"))
        };
        let start_date = parse_date("start_date")?;
        let end_date = parse_date("end_date")?;
        if end_date < start_date {
            return Err("end_date is before start_date".into());
        }
        Ok(Self {
            leave_type,
            start_date,
            end_date,
            reason: field("reason")?.to_string(),
        })
    }
}

/// Extracts leave details and suspends for confirmation once complete.
pub struct LeaveIntakeNode {
    llm: Arc<dyn LanguageModel>,
}

impl LeaveIntakeNode {
    #[must_use]
    pub fn new(llm: Arc<dyn LanguageModel>) -> Self {
        Self { llm }
    }
}

#[async_trait]
impl Node for LeaveIntakeNode {
    #[instrument(skip_all, err)]
    async fn run(
        &self,
        state: &ConversationState,
        ctx: NodeContext,
    ) -> Result<NodeStep, NodeError> {
        let today = Utc::now().format("%Y-%m-%d").to_string();
        let system = prompts::leave_extraction_system_prompt(&state.user_info, &today);
        let mut messages = vec![Message::system(system)];
        messages.extend(state.messages.iter().cloned());

        let extracted = self
            .llm
            .structured(&messages)
            .await
            .map_err(|e| NodeError::Provider {
                provider: "llm",
                message: e.to_string(),
            })?;
        let draft: LeaveDraft = serde_json::from_value(extracted)?;

        let leave = match draft.normalize() {
            Ok(leave) => leave,
            Err(missing) => {
                ctx.emit("leave", format!("asking for {} field(s)", missing.len()));
                let reply = format!(
                    "To file your leave request I still need: {}.",
                    missing.join(", ")
                );
                return Ok(NodeStep::Continue(
                    StateUpdate::new().with_message(Message::assistant(reply)),
                ));
            }
        };

        ctx.emit("leave", "draft complete, awaiting confirmation");
        // The suspended draft carries the normalized values, not the raw
        // extraction text.
        let draft_json = json!({
            "leave_type": leave.leave_type,
            "start_date": leave.start_date,
            "end_date": leave.end_date,
            "reason": leave.reason,
        });
        let update = StateUpdate::new()
            .with_message(Message::assistant(
                "I've drafted your leave request. Please check it and confirm.",
            ))
            .set_interrupt_data(draft_json.clone())
            .set_ui_type(LEAVE_CONFIRM_UI);
        Ok(NodeStep::Suspend {
            update,
            interrupt: json!({
                "ui_type": LEAVE_CONFIRM_UI,
                "interrupt_data": draft_json,
            }),
        })
    }

    #[instrument(skip_all, err)]
    async fn resume(
        &self,
        state: &ConversationState,
        ctx: NodeContext,
        payload: Value,
    ) -> Result<NodeStep, NodeError> {
        if payload.get("action").and_then(Value::as_str) == Some("cancel") {
            ctx.emit("leave", "request cancelled");
            let mut update =
                StateUpdate::new().with_message(Message::assistant("Your leave request was cancelled."));
            update.interrupt_data = Patch::Clear;
            update.ui_type = Patch::Clear;
            return Ok(NodeStep::Continue(update));
        }

        // Anything else is a submission; the form may have edited the draft.
        let data = payload
            .get("data")
            .cloned()
            .or_else(|| state.interrupt_data.clone())
            .ok_or(NodeError::MissingInput {
                what: "confirmed leave data",
            })?;
        LeaveData::from_value(&data).map_err(|message| NodeError::Extraction { message })?;

        ctx.emit("leave", "confirmed, filing");
        let update = StateUpdate::new()
            .with_message(Message::assistant("Submitting your leave request…"))
            .set_interrupt_data(data);
        Ok(NodeStep::Goto(update, NodeKind::from(LEAVE_PERSIST)))
    }
}

/// Files the confirmed leave request.
pub struct LeavePersistNode {
    store: Arc<dyn CampusStore>,
}

impl LeavePersistNode {
    #[must_use]
    pub fn new(store: Arc<dyn CampusStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl Node for LeavePersistNode {
    #[instrument(skip_all, err)]
    async fn run(
        &self,
        state: &ConversationState,
        ctx: NodeContext,
    ) -> Result<NodeStep, NodeError> {
        let data = state.interrupt_data.as_ref().ok_or(NodeError::MissingInput {
            what: "confirmed leave data",
        })?;
        let leave =
            LeaveData::from_value(data).map_err(|message| NodeError::Extraction { message })?;
        let record = LeaveRecord {
            // Identity comes from the thread, never from the payload.
            student_id: state.user_info.uid,
            leave_type: leave.leave_type,
            start_date: leave.start_date,
            end_date: leave.end_date,
            reason: leave.reason,
        };

        let id = self
            .store
            .insert_leave(&record)
            .await
            .map_err(|e| NodeError::Persistence {
                message: e.to_string(),
            })?;
        ctx.emit("leave", format!("filed as {id}"));

        let mut update = StateUpdate::new().with_message(Message::assistant(format!(
            "Your leave request has been submitted (reference {id}) and is awaiting approval."
        )));
        update.interrupt_data = Patch::Clear;
        update.ui_type = Patch::Clear;
        Ok(NodeStep::Continue(update))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clients::MemoryCampusStore;
    use crate::flows::testing::ScriptedLlm;
    use crate::state::UserInfo;
    use crate::types::UserRole;

    fn state_with(utterance: &str) -> ConversationState {
        let mut state = ConversationState::new(UserInfo {
            uid: 3,
            role: UserRole::Student,
            name: "test".into(),
        });
        state.apply(StateUpdate::new().with_message(Message::user(utterance)));
        state
    }

    fn ctx(node: &str) -> NodeContext {
        NodeContext {
            node_id: node.into(),
            step: 1,
            event_sender: crate::event_bus::EventBus::new().sender(),
        }
    }

    fn full_draft() -> Value {
        json!({
            "leave_type": "sick",
            "start_date": "2026-03-02",
            "end_date": "2026-03-03",
            "reason": "flu",
        })
    }

    #[tokio::test]
    async fn incomplete_extraction_asks_for_the_missing_fields() {
        let llm = Arc::new(ScriptedLlm::structured_replies(vec![json!({
            "leave_type": "sick",
            "start_date": null,
            "end_date": null,
            "reason": "flu",
        })]));
        let node = LeaveIntakeNode::new(llm);
        let step = node
            .run(&state_with("I'm sick, need time off"), ctx("leave_intake"))
            .await
            .unwrap();
        let NodeStep::Continue(update) = step else {
            panic!("expected clarification");
        };
        let reply = &update.messages[0].content;
        assert!(reply.contains("start date"));
        assert!(reply.contains("end date"));
        assert!(!reply.contains("reason"));
    }

    #[tokio::test]
    async fn complete_extraction_suspends_with_the_draft() {
        let llm = Arc::new(ScriptedLlm::structured_replies(vec![full_draft()]));
        let node = LeaveIntakeNode::new(llm);
        let step = node
            .run(
                &state_with("sick leave March 2-3, flu"),
                ctx("leave_intake"),
            )
            .await
            .unwrap();
        let NodeStep::Suspend { interrupt, .. } = step else {
            panic!("expected suspension");
        };
        assert_eq!(interrupt["ui_type"], LEAVE_CONFIRM_UI);
        assert_eq!(interrupt["interrupt_data"]["leave_type"], "sick");
    }

    #[tokio::test]
    async fn unnormalizable_fields_count_as_missing() {
        let llm = Arc::new(ScriptedLlm::structured_replies(vec![json!({
            "leave_type": "vacation",
            "start_date": "next tuesday",
            "end_date": "2026-03-03",
            "reason": "trip",
        })]));
        let node = LeaveIntakeNode::new(llm);
        let step = node
            .run(&state_with("I need a few days off"), ctx("leave_intake"))
            .await
            .unwrap();
        let NodeStep::Continue(update) = step else {
            panic!("garbled fields must clarify, not suspend");
        };
        let reply = &update.messages[0].content;
        assert!(reply.contains("leave type"), "{reply}");
        assert!(reply.contains("start date"), "{reply}");
        assert!(!reply.contains("end date"), "{reply}");
        assert!(!reply.contains("reason"), "{reply}");
    }

    #[tokio::test]
    async fn an_end_before_the_start_asks_for_the_end_date_again() {
        let llm = Arc::new(ScriptedLlm::structured_replies(vec![json!({
            "leave_type": "sick",
            "start_date": "2026-03-02",
            "end_date": "2026-03-01",
            "reason": "flu",
        })]));
        let node = LeaveIntakeNode::new(llm);
        let step = node
            .run(&state_with("sick leave"), ctx("leave_intake"))
            .await
            .unwrap();
        let NodeStep::Continue(update) = step else {
            panic!("backwards dates must clarify, not suspend");
        };
        let reply = &update.messages[0].content;
        assert!(reply.contains("end date"), "{reply}");
        assert!(!reply.contains("start date"), "{reply}");
    }

    #[tokio::test]
    async fn suspended_drafts_carry_normalized_values() {
        let llm = Arc::new(ScriptedLlm::structured_replies(vec![json!({
            "leave_type": "  Sick ",
            "start_date": "2026-03-02",
            "end_date": "2026-03-03",
            "reason": "flu",
        })]));
        let node = LeaveIntakeNode::new(llm);
        let step = node
            .run(&state_with("sick leave"), ctx("leave_intake"))
            .await
            .unwrap();
        let NodeStep::Suspend { interrupt, .. } = step else {
            panic!("expected suspension");
        };
        assert_eq!(interrupt["interrupt_data"]["leave_type"], "sick");
        assert_eq!(interrupt["interrupt_data"]["start_date"], "2026-03-02");
    }

    #[tokio::test]
    async fn cancel_resume_clears_the_draft() {
        let node = LeaveIntakeNode::new(Arc::new(ScriptedLlm::default()));
        let mut state = state_with("sick leave");
        state.apply(StateUpdate::new().set_interrupt_data(full_draft()));

        let step = node
            .resume(&state, ctx("leave_intake"), json!({"action": "cancel"}))
            .await
            .unwrap();
        let NodeStep::Continue(update) = step else {
            panic!("expected continue");
        };
        assert_eq!(update.interrupt_data, Patch::Clear);
        assert!(update.messages[0].content.contains("cancelled"));
    }

    #[tokio::test]
    async fn submit_resume_routes_to_the_persist_node() {
        let node = LeaveIntakeNode::new(Arc::new(ScriptedLlm::default()));
        let mut state = state_with("sick leave");
        state.apply(StateUpdate::new().set_interrupt_data(full_draft()));

        let step = node
            .resume(
                &state,
                ctx("leave_intake"),
                json!({"action": "submit", "data": full_draft()}),
            )
            .await
            .unwrap();
        let NodeStep::Goto(_, target) = step else {
            panic!("expected goto");
        };
        assert_eq!(target, NodeKind::from(LEAVE_PERSIST));
    }

    #[tokio::test]
    async fn invalid_dates_fail_validation() {
        let mut backwards = full_draft();
        backwards["end_date"] = json!("2026-03-01");
        assert!(LeaveData::from_value(&backwards)
            .unwrap_err()
            .contains("before"));

        let mut garbled = full_draft();
        garbled["start_date"] = json!("next tuesday");
        assert!(LeaveData::from_value(&garbled).unwrap_err().contains("YYYY-MM-DD"));
    }

    #[tokio::test]
    async fn persist_uses_the_thread_identity() {
        let store = Arc::new(MemoryCampusStore::new());
        let node = LeavePersistNode::new(store.clone());
        let mut state = state_with("sick leave");
        let mut draft = full_draft();
        // A forged id in the payload is ignored.
        draft["student_id"] = json!(9999);
        state.apply(StateUpdate::new().set_interrupt_data(draft));

        let step = node.run(&state, ctx("leave_persist")).await.unwrap();
        let NodeStep::Continue(update) = step else {
            panic!("expected continue");
        };
        assert_eq!(update.interrupt_data, Patch::Clear);
        let leaves = store.leaves();
        assert_eq!(leaves.len(), 1);
        assert_eq!(leaves[0].1.student_id, 3);
    }

    #[tokio::test]
    async fn failed_insert_is_a_persistence_error() {
        let store = Arc::new(MemoryCampusStore::new());
        store.fail_next_insert();
        let node = LeavePersistNode::new(store.clone());
        let mut state = state_with("sick leave");
        state.apply(StateUpdate::new().set_interrupt_data(full_draft()));

        let err = node.run(&state, ctx("leave_persist")).await.unwrap_err();
        assert!(matches!(err, NodeError::Persistence { .. }));
        assert!(store.leaves().is_empty());
    }
}
