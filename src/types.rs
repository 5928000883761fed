//! Core types for the campusflow orchestration engine.
//!
//! This module defines the closed enumerations the engine routes and filters
//! on, plus [`NodeKind`], the identifier for nodes in the flow graph. All
//! enumerations here parse strictly: a value outside the closed set is an
//! error for the caller to surface, never a default branch.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Identifies a node within the flow graph.
///
/// `Start` and `End` are virtual endpoints: they are never registered with an
/// executable node and never run. `Custom` names the application nodes
/// (router, subflow stages).
///
/// # Persistence
///
/// `NodeKind` round-trips through [`encode`](Self::encode) /
/// [`decode`](Self::decode) for checkpoint storage:
/// `Start` → `"Start"`, `End` → `"End"`, `Custom(name)` → `"Custom:<name>"`.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NodeKind {
    /// Virtual entry point; the first edge of every flow starts here.
    Start,
    /// Virtual terminal; reaching it completes the turn.
    End,
    /// An executable application node identified by name.
    Custom(String),
}

impl NodeKind {
    /// Encode a NodeKind into its persisted string form.
    #[must_use]
    pub fn encode(&self) -> String {
        match self {
            NodeKind::Start => "Start".to_string(),
            NodeKind::End => "End".to_string(),
            NodeKind::Custom(s) => format!("Custom:{s}"),
        }
    }

    /// Decode a persisted string form back into a NodeKind.
    ///
    /// Unrecognized formats fall back to `Custom(s)` so old checkpoints keep
    /// loading after a rename.
    pub fn decode(s: &str) -> Self {
        if s == "Start" {
            NodeKind::Start
        } else if s == "End" {
            NodeKind::End
        } else if let Some(rest) = s.strip_prefix("Custom:") {
            NodeKind::Custom(rest.to_string())
        } else {
            NodeKind::Custom(s.to_string())
        }
    }

    /// Returns `true` if this is the virtual [`End`](Self::End) node.
    #[must_use]
    pub fn is_end(&self) -> bool {
        matches!(self, Self::End)
    }
}

impl fmt::Display for NodeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Start => write!(f, "Start"),
            Self::End => write!(f, "End"),
            Self::Custom(name) => write!(f, "{name}"),
        }
    }
}

impl From<&str> for NodeKind {
    fn from(s: &str) -> Self {
        match s {
            "Start" => NodeKind::Start,
            "End" => NodeKind::End,
            other => NodeKind::Custom(other.to_string()),
        }
    }
}

/// Router destination for one turn.
///
/// The classifier output is untrusted input: parsing is strict and anything
/// outside this set is a classification error, never coerced to a default.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Intent {
    /// Grades, schedules, and other records tied to the requester's identity.
    Academic,
    /// Policy, lecture, and campus news questions answered over retrieval.
    Info,
    /// Write operations that require confirmation (leave requests).
    Admin,
    /// Greetings and smalltalk.
    Chat,
}

impl Intent {
    /// Canonical lowercase label, matching the wire form.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Intent::Academic => "academic",
            Intent::Info => "info",
            Intent::Admin => "admin",
            Intent::Chat => "chat",
        }
    }
}

impl FromStr for Intent {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "academic" => Ok(Intent::Academic),
            "info" => Ok(Intent::Info),
            "admin" => Ok(Intent::Admin),
            "chat" => Ok(Intent::Chat),
            other => Err(UnknownVariant {
                what: "intent",
                value: other.to_string(),
            }),
        }
    }
}

impl fmt::Display for Intent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Closed set of document domains indexed in the vector store.
///
/// Retrieval applies this as a hard filter: documents from any other domain
/// are excluded unconditionally.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Domain {
    /// Postgraduate admission / recommendation policy documents.
    AdmissionPolicy,
    /// Campus news and announcements.
    CampusNews,
    /// Campus life: facilities, opening hours, services.
    CampusLife,
}

impl Domain {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Domain::AdmissionPolicy => "admission_policy",
            Domain::CampusNews => "campus_news",
            Domain::CampusLife => "campus_life",
        }
    }
}

impl FromStr for Domain {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "admission_policy" => Ok(Domain::AdmissionPolicy),
            "campus_news" => Ok(Domain::CampusNews),
            "campus_life" => Ok(Domain::CampusLife),
            other => Err(UnknownVariant {
                what: "domain",
                value: other.to_string(),
            }),
        }
    }
}

impl fmt::Display for Domain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Category of a leave request.
///
/// Parsed strictly from the tokens `sick`, `personal` and `other`. Anything
/// else is rejected; the intake node treats an unparsable leave type as a
/// missing field and asks again rather than guessing a category.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LeaveType {
    Sick,
    Personal,
    Other,
}

impl LeaveType {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            LeaveType::Sick => "sick",
            LeaveType::Personal => "personal",
            LeaveType::Other => "other",
        }
    }
}

impl FromStr for LeaveType {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "sick" => Ok(LeaveType::Sick),
            "personal" => Ok(LeaveType::Personal),
            "other" => Ok(LeaveType::Other),
            other => Err(UnknownVariant {
                what: "leave_type",
                value: other.to_string(),
            }),
        }
    }
}

impl fmt::Display for LeaveType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Role of the authenticated user behind a thread.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UserRole {
    Student,
    Teacher,
}

/// A value claimed to belong to a closed enumeration but not found in it.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
#[error("unknown {what} value: {value:?}")]
pub struct UnknownVariant {
    pub what: &'static str,
    pub value: String,
}
