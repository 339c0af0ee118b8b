use crate::model::{
    Agent, AgentStatus, CheckStatus, Deployment, DeploymentStatus, HealthStatus, Issue,
    IssueState, PrState, PullRequest, Worktree, WorktreeStatus,
};
use crate::overlay::LiveResource;
use crate::protocol::PushMessage;
use chrono::{DateTime, Utc};

#[derive(Debug, Clone, Default, PartialEq)]
pub struct IssuePatch {
    pub state: Option<IssueState>,
    pub title: Option<String>,
    pub labels: Option<Vec<String>>,
    pub assignee: Option<String>,
    pub updated_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct PullRequestPatch {
    pub state: Option<PrState>,
    pub checks: Option<CheckStatus>,
    pub title: Option<String>,
    pub updated_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct DeploymentPatch {
    pub status: Option<DeploymentStatus>,
    pub health: Option<HealthStatus>,
    pub url: Option<String>,
    pub updated_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct WorktreePatch {
    pub branch: Option<String>,
    pub status: Option<WorktreeStatus>,
    pub agent_id: Option<String>,
    pub updated_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct AgentPatch {
    pub status: Option<AgentStatus>,
    pub current_task: Option<String>,
    pub progress: Option<f32>,
    pub last_seen: Option<DateTime<Utc>>,
}

fn replace<T: Clone>(field: &mut T, value: &Option<T>) {
    if let Some(value) = value {
        *field = value.clone();
    }
}

fn replace_opt<T: Clone>(field: &mut Option<T>, value: &Option<T>) {
    if value.is_some() {
        *field = value.clone();
    }
}

impl LiveResource for Issue {
    type Key = u64;
    type Patch = IssuePatch;

    fn key(&self) -> u64 {
        self.number
    }

    fn apply_patch(&self, patch: &IssuePatch) -> Self {
        let mut next = self.clone();
        replace(&mut next.state, &patch.state);
        replace(&mut next.title, &patch.title);
        replace(&mut next.labels, &patch.labels);
        replace_opt(&mut next.assignee, &patch.assignee);
        replace(&mut next.updated_at, &patch.updated_at);
        next
    }

    fn patch_from(message: &PushMessage) -> Option<(u64, IssuePatch)> {
        let PushMessage::IssueUpdate(p) = message else {
            return None;
        };
        Some((
            p.issue_number,
            IssuePatch {
                state: p.state,
                title: p.title.clone(),
                labels: p.labels.clone(),
                assignee: p.assignee.clone(),
                updated_at: p.timestamp,
            },
        ))
    }
}

impl LiveResource for PullRequest {
    type Key = u64;
    type Patch = PullRequestPatch;

    fn key(&self) -> u64 {
        self.number
    }

    fn apply_patch(&self, patch: &PullRequestPatch) -> Self {
        let mut next = self.clone();
        replace(&mut next.state, &patch.state);
        replace_opt(&mut next.checks, &patch.checks);
        replace(&mut next.title, &patch.title);
        replace(&mut next.updated_at, &patch.updated_at);
        next
    }

    fn patch_from(message: &PushMessage) -> Option<(u64, PullRequestPatch)> {
        let PushMessage::PrUpdate(p) = message else {
            return None;
        };
        Some((
            p.pr_number,
            PullRequestPatch {
                state: p.state,
                checks: p.checks,
                title: p.title.clone(),
                updated_at: p.timestamp,
            },
        ))
    }
}

impl LiveResource for Deployment {
    type Key = String;
    type Patch = DeploymentPatch;

    fn key(&self) -> String {
        self.id.clone()
    }

    fn apply_patch(&self, patch: &DeploymentPatch) -> Self {
        let mut next = self.clone();
        replace(&mut next.status, &patch.status);
        replace_opt(&mut next.health, &patch.health);
        replace_opt(&mut next.url, &patch.url);
        replace(&mut next.updated_at, &patch.updated_at);
        next
    }

    fn patch_from(message: &PushMessage) -> Option<(String, DeploymentPatch)> {
        let PushMessage::DeploymentUpdate(p) = message else {
            return None;
        };
        Some((
            p.deployment_id.clone(),
            DeploymentPatch {
                status: p.status,
                health: p.health,
                url: p.url.clone(),
                updated_at: p.timestamp,
            },
        ))
    }
}

impl LiveResource for Worktree {
    type Key = String;
    type Patch = WorktreePatch;

    fn key(&self) -> String {
        self.path.clone()
    }

    fn apply_patch(&self, patch: &WorktreePatch) -> Self {
        let mut next = self.clone();
        replace(&mut next.branch, &patch.branch);
        replace(&mut next.status, &patch.status);
        replace_opt(&mut next.agent_id, &patch.agent_id);
        replace(&mut next.updated_at, &patch.updated_at);
        next
    }

    fn patch_from(message: &PushMessage) -> Option<(String, WorktreePatch)> {
        let PushMessage::WorktreeUpdate(p) = message else {
            return None;
        };
        Some((
            p.path.clone(),
            WorktreePatch {
                branch: p.branch.clone(),
                status: p.status,
                agent_id: p.agent_id.clone(),
                updated_at: p.timestamp,
            },
        ))
    }
}

impl LiveResource for Agent {
    type Key = String;
    type Patch = AgentPatch;

    fn key(&self) -> String {
        self.id.clone()
    }

    fn apply_patch(&self, patch: &AgentPatch) -> Self {
        let mut next = self.clone();
        replace(&mut next.status, &patch.status);
        replace_opt(&mut next.current_task, &patch.current_task);
        replace_opt(&mut next.progress, &patch.progress);
        replace_opt(&mut next.last_seen, &patch.last_seen);
        next
    }

    fn patch_from(message: &PushMessage) -> Option<(String, AgentPatch)> {
        match message {
            PushMessage::AgentStatus(p) => Some((
                p.agent_id.clone(),
                AgentPatch {
                    status: Some(p.status),
                    current_task: p.current_task.clone(),
                    progress: None,
                    last_seen: p.timestamp,
                },
            )),
            PushMessage::AgentStarted(p) => Some((
                p.agent_id.clone(),
                AgentPatch {
                    status: Some(AgentStatus::Running),
                    current_task: p.task.clone(),
                    progress: Some(0.0),
                    last_seen: p.timestamp,
                },
            )),
            PushMessage::AgentProgress(p) => Some((
                p.agent_id.clone(),
                AgentPatch {
                    status: Some(AgentStatus::Running),
                    current_task: None,
                    progress: Some(p.progress.clamp(0.0, 100.0)),
                    last_seen: p.timestamp,
                },
            )),
            PushMessage::AgentCompleted(p) => Some((
                p.agent_id.clone(),
                AgentPatch {
                    status: Some(if p.success {
                        AgentStatus::Idle
                    } else {
                        AgentStatus::Error
                    }),
                    current_task: None,
                    progress: p.success.then_some(100.0),
                    last_seen: p.timestamp,
                },
            )),
            _ => None,
        }
    }
}
