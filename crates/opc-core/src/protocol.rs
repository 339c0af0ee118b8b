//! Push message protocol.
//!
//! Frames are JSON text with a required `type` discriminator next to the
//! payload fields, e.g. `{"type":"deployment_update","deployment_id":"d-1","status":"success"}`.

use crate::model::{
    AgentStatus, CheckStatus, DeploymentStatus, HealthStatus, IssueState, LogEntry, Notification,
    PrState, WorktreeStatus,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

pub const MAX_FRAME_BYTES: usize = 256 * 1024;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProtocolError {
    #[error("frame exceeds max size: {size} > {max}")]
    Oversized { size: usize, max: usize },
    #[error("frame decode failed: {0}")]
    Decode(String),
    #[error("frame encode failed: {0}")]
    Encode(String),
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PushMessage {
    AgentStatus(AgentStatusPayload),
    LogEntry(LogEntry),
    Notification(Notification),
    DeploymentUpdate(DeploymentUpdatePayload),
    PrUpdate(PrUpdatePayload),
    IssueUpdate(IssueUpdatePayload),
    WorktreeUpdate(WorktreeUpdatePayload),
    TaskUpdated(TaskUpdatedPayload),
    AgentStarted(AgentStartedPayload),
    AgentProgress(AgentProgressPayload),
    AgentCompleted(AgentCompletedPayload),
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AgentStatusPayload {
    pub agent_id: String,
    pub status: AgentStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_task: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DeploymentUpdatePayload {
    pub deployment_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<DeploymentStatus>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub health: Option<HealthStatus>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PrUpdatePayload {
    pub pr_number: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state: Option<PrState>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub checks: Option<CheckStatus>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct IssueUpdatePayload {
    pub issue_number: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state: Option<IssueState>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub labels: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub assignee: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WorktreeUpdatePayload {
    pub path: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub branch: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<WorktreeStatus>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agent_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TaskUpdatedPayload {
    pub task_id: String,
    pub status: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agent_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AgentStartedPayload {
    pub agent_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub task: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AgentProgressPayload {
    pub agent_id: String,
    pub progress: f32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AgentCompletedPayload {
    pub agent_id: String,
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<DateTime<Utc>>,
}

/// Fieldless mirror of [`PushMessage`] used for routing and display.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageKind {
    AgentStatus,
    LogEntry,
    Notification,
    DeploymentUpdate,
    PrUpdate,
    IssueUpdate,
    WorktreeUpdate,
    TaskUpdated,
    AgentStarted,
    AgentProgress,
    AgentCompleted,
}

impl MessageKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageKind::AgentStatus => "agent_status",
            MessageKind::LogEntry => "log_entry",
            MessageKind::Notification => "notification",
            MessageKind::DeploymentUpdate => "deployment_update",
            MessageKind::PrUpdate => "pr_update",
            MessageKind::IssueUpdate => "issue_update",
            MessageKind::WorktreeUpdate => "worktree_update",
            MessageKind::TaskUpdated => "task_updated",
            MessageKind::AgentStarted => "agent_started",
            MessageKind::AgentProgress => "agent_progress",
            MessageKind::AgentCompleted => "agent_completed",
        }
    }
}

impl fmt::Display for MessageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl PushMessage {
    pub fn parse(text: &str) -> Result<Self, ProtocolError> {
        if text.len() > MAX_FRAME_BYTES {
            return Err(ProtocolError::Oversized {
                size: text.len(),
                max: MAX_FRAME_BYTES,
            });
        }
        serde_json::from_str(text).map_err(|err| ProtocolError::Decode(err.to_string()))
    }

    pub fn encode(&self) -> Result<String, ProtocolError> {
        let text =
            serde_json::to_string(self).map_err(|err| ProtocolError::Encode(err.to_string()))?;
        if text.len() > MAX_FRAME_BYTES {
            return Err(ProtocolError::Oversized {
                size: text.len(),
                max: MAX_FRAME_BYTES,
            });
        }
        Ok(text)
    }

    pub fn kind(&self) -> MessageKind {
        match self {
            PushMessage::AgentStatus(_) => MessageKind::AgentStatus,
            PushMessage::LogEntry(_) => MessageKind::LogEntry,
            PushMessage::Notification(_) => MessageKind::Notification,
            PushMessage::DeploymentUpdate(_) => MessageKind::DeploymentUpdate,
            PushMessage::PrUpdate(_) => MessageKind::PrUpdate,
            PushMessage::IssueUpdate(_) => MessageKind::IssueUpdate,
            PushMessage::WorktreeUpdate(_) => MessageKind::WorktreeUpdate,
            PushMessage::TaskUpdated(_) => MessageKind::TaskUpdated,
            PushMessage::AgentStarted(_) => MessageKind::AgentStarted,
            PushMessage::AgentProgress(_) => MessageKind::AgentProgress,
            PushMessage::AgentCompleted(_) => MessageKind::AgentCompleted,
        }
    }

    pub fn timestamp(&self) -> Option<DateTime<Utc>> {
        match self {
            PushMessage::AgentStatus(p) => p.timestamp,
            PushMessage::LogEntry(p) => Some(p.timestamp),
            PushMessage::Notification(p) => Some(p.timestamp),
            PushMessage::DeploymentUpdate(p) => p.timestamp,
            PushMessage::PrUpdate(p) => p.timestamp,
            PushMessage::IssueUpdate(p) => p.timestamp,
            PushMessage::WorktreeUpdate(p) => p.timestamp,
            PushMessage::TaskUpdated(p) => p.timestamp,
            PushMessage::AgentStarted(p) => p.timestamp,
            PushMessage::AgentProgress(p) => p.timestamp,
            PushMessage::AgentCompleted(p) => p.timestamp,
        }
    }

    /// One-line description for the activity feed.
    pub fn summary(&self) -> String {
        match self {
            PushMessage::AgentStatus(p) => match &p.current_task {
                Some(task) => format!("agent {} is {} ({task})", p.agent_id, p.status),
                None => format!("agent {} is {}", p.agent_id, p.status),
            },
            PushMessage::LogEntry(p) => match &p.source {
                Some(source) => format!("[{}] {source}: {}", p.level, p.message),
                None => format!("[{}] {}", p.level, p.message),
            },
            PushMessage::Notification(p) => {
                if p.message.is_empty() {
                    p.title.clone()
                } else {
                    format!("{}: {}", p.title, p.message)
                }
            }
            PushMessage::DeploymentUpdate(p) => {
                let mut parts = Vec::new();
                if let Some(status) = p.status {
                    parts.push(status.to_string());
                }
                if let Some(health) = p.health {
                    parts.push(format!("health {health}"));
                }
                if parts.is_empty() {
                    format!("deployment {} updated", p.deployment_id)
                } else {
                    format!("deployment {} {}", p.deployment_id, parts.join(", "))
                }
            }
            PushMessage::PrUpdate(p) => match (p.state, p.checks) {
                (Some(state), Some(checks)) => {
                    format!("PR #{} {state}, checks {checks}", p.pr_number)
                }
                (Some(state), None) => format!("PR #{} {state}", p.pr_number),
                (None, Some(checks)) => format!("PR #{} checks {checks}", p.pr_number),
                (None, None) => format!("PR #{} updated", p.pr_number),
            },
            PushMessage::IssueUpdate(p) => match p.state {
                Some(state) => format!("issue #{} {state}", p.issue_number),
                None => format!("issue #{} updated", p.issue_number),
            },
            PushMessage::WorktreeUpdate(p) => match p.status {
                Some(status) => format!("worktree {} {status}", p.path),
                None => format!("worktree {} updated", p.path),
            },
            PushMessage::TaskUpdated(p) => match &p.title {
                Some(title) => format!("task {} \"{title}\" {}", p.task_id, p.status),
                None => format!("task {} {}", p.task_id, p.status),
            },
            PushMessage::AgentStarted(p) => match &p.task {
                Some(task) => format!("agent {} started {task}", p.agent_id),
                None => format!("agent {} started", p.agent_id),
            },
            PushMessage::AgentProgress(p) => {
                format!("agent {} at {:.0}%", p.agent_id, p.progress.clamp(0.0, 100.0))
            }
            PushMessage::AgentCompleted(p) => {
                let outcome = if p.success { "completed" } else { "failed" };
                match &p.summary {
                    Some(summary) => format!("agent {} {outcome}: {summary}", p.agent_id),
                    None => format!("agent {} {outcome}", p.agent_id),
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_internally_tagged_frames() {
        let msg = PushMessage::parse(
            r#"{"type":"deployment_update","deployment_id":"dep-1","status":"success","health":"healthy","timestamp":"2026-03-01T10:00:00Z"}"#,
        )
        .unwrap();
        assert_eq!(msg.kind(), MessageKind::DeploymentUpdate);
        let PushMessage::DeploymentUpdate(payload) = &msg else {
            panic!("expected deployment update");
        };
        assert_eq!(payload.status, Some(DeploymentStatus::Success));
        assert_eq!(payload.health, Some(HealthStatus::Healthy));
        assert!(msg.timestamp().is_some());
        assert_eq!(msg.summary(), "deployment dep-1 success, health healthy");
    }

    #[test]
    fn frames_accept_lenient_status_spellings() {
        let msg = PushMessage::parse(
            r#"{"type":"deployment_update","deployment_id":"dep-3","status":"running","health":"down"}"#,
        )
        .unwrap();
        let PushMessage::DeploymentUpdate(payload) = &msg else {
            panic!("expected deployment update");
        };
        assert_eq!(payload.status, Some(DeploymentStatus::InProgress));
        assert_eq!(payload.health, Some(HealthStatus::Unhealthy));

        assert!(matches!(
            PushMessage::parse(r#"{"type":"deployment_update","deployment_id":"dep-3","status":"exploded"}"#),
            Err(ProtocolError::Decode(_))
        ));
    }

    #[test]
    fn log_entry_frame_flattens_entry_fields() {
        let msg = PushMessage::parse(
            r#"{"type":"log_entry","timestamp":"2026-03-01T10:00:00Z","level":"warn","source":"builder","message":"slow step"}"#,
        )
        .unwrap();
        let PushMessage::LogEntry(entry) = &msg else {
            panic!("expected log entry");
        };
        assert_eq!(entry.source.as_deref(), Some("builder"));
        assert_eq!(msg.summary(), "[warn] builder: slow step");

        let encoded = msg.encode().unwrap();
        let value: serde_json::Value = serde_json::from_str(&encoded).unwrap();
        assert_eq!(value["type"], "log_entry");
        assert_eq!(value["message"], "slow step");
    }

    #[test]
    fn rejects_malformed_unknown_and_missing_type() {
        assert!(matches!(
            PushMessage::parse("{not json"),
            Err(ProtocolError::Decode(_))
        ));
        assert!(matches!(
            PushMessage::parse(r#"{"type":"mystery","id":1}"#),
            Err(ProtocolError::Decode(_))
        ));
        assert!(matches!(
            PushMessage::parse(r#"{"agent_id":"a-1","status":"idle"}"#),
            Err(ProtocolError::Decode(_))
        ));
        assert!(matches!(
            PushMessage::parse(r#"{"type":"pr_update","pr_number":"seven"}"#),
            Err(ProtocolError::Decode(_))
        ));
    }

    #[test]
    fn rejects_oversized_frames_before_decoding() {
        let padding = "x".repeat(MAX_FRAME_BYTES);
        let text = format!(r#"{{"type":"notification","title":"{padding}","timestamp":"2026-03-01T10:00:00Z"}}"#);
        assert!(matches!(
            PushMessage::parse(&text),
            Err(ProtocolError::Oversized { .. })
        ));
    }

    #[test]
    fn progress_summary_clamps_out_of_range_values() {
        let msg = PushMessage::AgentProgress(AgentProgressPayload {
            agent_id: "a-1".to_string(),
            progress: 140.0,
            message: None,
            timestamp: None,
        });
        assert_eq!(msg.summary(), "agent a-1 at 100%");
        assert!(msg.timestamp().is_none());
    }
}
