//! Shared types for the ops console: resource records, the push message
//! protocol, the live-update overlay, view filters and the companion wizard.

pub mod companion;
pub mod feed;
pub mod filter;
pub mod flag;
pub mod live;
pub mod model;
pub mod overlay;
pub mod protocol;

pub use feed::{ActivityFeed, FeedItem, LogTail};
pub use filter::{sort_records, Filter, Searchable, SortOrder};
pub use flag::parse_bool_flag;
pub use live::{AgentPatch, DeploymentPatch, IssuePatch, PullRequestPatch, WorktreePatch};
pub use model::{
    Agent, AgentStatus, CheckStatus, Deployment, DeploymentStatus, HealthStatus, Issue,
    IssueState, ListResponse, LogEntry, LogLevel, Notification, PrState, PullRequest, Worktree,
    WorktreeStatus,
};
pub use overlay::{IngestOutcome, LiveResource, Overlay, UpdateOrdering};
pub use protocol::{MessageKind, ProtocolError, PushMessage};
