//! Per-page state: the fetched snapshot, its live overlay and the view filter.

use opc_client::{ApiClient, ClientError};
use opc_core::{
    sort_records, Agent, AgentStatus, Deployment, DeploymentStatus, Filter, Issue, IssueState,
    LiveResource, LogEntry, LogTail, Overlay, PrState, PullRequest, PushMessage, Searchable,
    SortOrder, UpdateOrdering, Worktree,
};
use tokio::task::JoinHandle;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Page {
    Dashboard,
    Agents,
    Issues,
    Prs,
    Deployments,
    Worktrees,
    Logs,
}

impl Page {
    pub const ALL: [Page; 7] = [
        Page::Dashboard,
        Page::Agents,
        Page::Issues,
        Page::Prs,
        Page::Deployments,
        Page::Worktrees,
        Page::Logs,
    ];

    pub fn title(self) -> &'static str {
        match self {
            Page::Dashboard => "Dashboard",
            Page::Agents => "Agents",
            Page::Issues => "Issues",
            Page::Prs => "Pull Requests",
            Page::Deployments => "Deployments",
            Page::Worktrees => "Worktrees",
            Page::Logs => "Logs",
        }
    }

    fn index(self) -> usize {
        Page::ALL.iter().position(|page| *page == self).unwrap_or(0)
    }

    pub fn next(self) -> Self {
        Page::ALL[(self.index() + 1) % Page::ALL.len()]
    }

    pub fn prev(self) -> Self {
        Page::ALL[(self.index() + Page::ALL.len() - 1) % Page::ALL.len()]
    }
}

pub struct ResourceView<R: LiveResource + Searchable> {
    base: Vec<R>,
    overlay: Overlay<R>,
    pub filter: Filter,
    pub sort: SortOrder,
}

impl<R: LiveResource + Searchable> Default for ResourceView<R> {
    fn default() -> Self {
        Self {
            base: Vec::new(),
            overlay: Overlay::new(UpdateOrdering::Timestamp),
            filter: Filter::default(),
            sort: SortOrder::default(),
        }
    }
}

impl<R: LiveResource + Searchable> ResourceView<R> {
    pub fn set_base(&mut self, base: Vec<R>) {
        self.base = base;
    }

    pub fn base(&self) -> &[R] {
        &self.base
    }

    pub fn ingest(&mut self, message: &PushMessage) {
        self.overlay.ingest(message);
    }

    /// Snapshot records with live updates applied, filtered and sorted.
    pub fn rows(&self) -> Vec<R> {
        let merged = self.overlay.merge_all(&self.base);
        let mut visible = self.filter.apply(&merged);
        sort_records(&mut visible, self.sort);
        visible.into_iter().cloned().collect()
    }

    pub fn count_merged<F: Fn(&R) -> bool>(&self, predicate: F) -> usize {
        self.base
            .iter()
            .filter(|record| predicate(&self.overlay.merged(record)))
            .count()
    }
}

pub struct LogView {
    tail: LogTail,
    pub filter: Filter,
    pub sort: SortOrder,
}

impl Default for LogView {
    fn default() -> Self {
        Self {
            tail: LogTail::default(),
            filter: Filter::default(),
            sort: SortOrder::NewestFirst,
        }
    }
}

impl LogView {
    pub fn rows(&self) -> Vec<LogEntry> {
        let mut visible: Vec<&LogEntry> = self
            .tail
            .entries()
            .filter(|entry| self.filter.matches(*entry))
            .collect();
        sort_records(&mut visible, self.sort);
        visible.into_iter().cloned().collect()
    }
}

#[derive(Default)]
pub struct DashboardView {
    pub agents: ResourceView<Agent>,
    pub issues: ResourceView<Issue>,
    pub prs: ResourceView<PullRequest>,
    pub deployments: ResourceView<Deployment>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DashboardCounts {
    pub agents: usize,
    pub active_agents: usize,
    pub open_issues: usize,
    pub open_prs: usize,
    pub deploying: usize,
    pub failed_deployments: usize,
}

impl DashboardView {
    pub fn counts(&self) -> DashboardCounts {
        DashboardCounts {
            agents: self.agents.base().len(),
            active_agents: self.agents.count_merged(|agent| agent.status.is_active()),
            open_issues: self
                .issues
                .count_merged(|issue| issue.state == IssueState::Open),
            open_prs: self
                .prs
                .count_merged(|pr| matches!(pr.state, PrState::Open | PrState::Draft)),
            deploying: self
                .deployments
                .count_merged(|deployment| !deployment.status.is_terminal()),
            failed_deployments: self
                .deployments
                .count_merged(|deployment| deployment.status == DeploymentStatus::Failed),
        }
    }

    /// Agents currently working, for the dashboard's agent strip.
    pub fn busy_agents(&self) -> Vec<Agent> {
        self.agents
            .rows()
            .into_iter()
            .filter(|agent| matches!(agent.status, AgentStatus::Running | AgentStatus::Busy))
            .collect()
    }
}

pub enum PageData {
    Dashboard(Box<DashboardView>),
    Agents(ResourceView<Agent>),
    Issues(ResourceView<Issue>),
    Prs(ResourceView<PullRequest>),
    Deployments(ResourceView<Deployment>),
    Worktrees(ResourceView<Worktree>),
    Logs(LogView),
}

impl PageData {
    fn new(page: Page) -> Self {
        match page {
            Page::Dashboard => PageData::Dashboard(Box::default()),
            Page::Agents => PageData::Agents(ResourceView::default()),
            Page::Issues => PageData::Issues(ResourceView::default()),
            Page::Prs => PageData::Prs(ResourceView::default()),
            Page::Deployments => PageData::Deployments(ResourceView::default()),
            Page::Worktrees => PageData::Worktrees(ResourceView::default()),
            Page::Logs => PageData::Logs(LogView::default()),
        }
    }
}

/// Result of one page fetch.
#[derive(Debug, Clone)]
pub enum PageSnapshot {
    Dashboard {
        agents: Vec<Agent>,
        issues: Vec<Issue>,
        prs: Vec<PullRequest>,
        deployments: Vec<Deployment>,
    },
    Agents(Vec<Agent>),
    Issues(Vec<Issue>),
    Prs(Vec<PullRequest>),
    Deployments(Vec<Deployment>),
    Worktrees(Vec<Worktree>),
    Logs(Vec<LogEntry>),
}

pub async fn fetch_page(
    api: &ApiClient,
    page: Page,
    log_limit: usize,
) -> Result<PageSnapshot, ClientError> {
    Ok(match page {
        Page::Dashboard => {
            let (agents, issues, prs, deployments) = tokio::try_join!(
                api.fetch_agents(),
                api.fetch_issues(),
                api.fetch_prs(),
                api.fetch_deployments()
            )?;
            PageSnapshot::Dashboard {
                agents: agents.items,
                issues: issues.items,
                prs: prs.items,
                deployments: deployments.items,
            }
        }
        Page::Agents => PageSnapshot::Agents(api.fetch_agents().await?.items),
        Page::Issues => PageSnapshot::Issues(api.fetch_issues().await?.items),
        Page::Prs => PageSnapshot::Prs(api.fetch_prs().await?.items),
        Page::Deployments => PageSnapshot::Deployments(api.fetch_deployments().await?.items),
        Page::Worktrees => PageSnapshot::Worktrees(api.fetch_worktrees().await?.items),
        Page::Logs => PageSnapshot::Logs(api.fetch_logs(log_limit).await?.items),
    })
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoadStatus {
    Loading,
    Loaded,
    Failed(String),
}

/// State of the page on screen. Dropping it aborts its in-flight fetch.
pub struct PageState {
    pub page: Page,
    pub data: PageData,
    pub status: LoadStatus,
    pub generation: u64,
    pub selected: usize,
    fetch: Option<JoinHandle<()>>,
}

impl PageState {
    pub fn new(page: Page, generation: u64) -> Self {
        Self {
            page,
            data: PageData::new(page),
            status: LoadStatus::Loading,
            generation,
            selected: 0,
            fetch: None,
        }
    }

    pub fn track_fetch(&mut self, generation: u64, handle: JoinHandle<()>) {
        self.abort_fetch();
        self.generation = generation;
        self.status = LoadStatus::Loading;
        self.fetch = Some(handle);
    }

    pub fn abort_fetch(&mut self) {
        if let Some(handle) = self.fetch.take() {
            handle.abort();
        }
    }

    pub fn apply_snapshot(&mut self, snapshot: PageSnapshot) {
        self.fetch = None;
        self.status = LoadStatus::Loaded;
        match (&mut self.data, snapshot) {
            (
                PageData::Dashboard(view),
                PageSnapshot::Dashboard {
                    agents,
                    issues,
                    prs,
                    deployments,
                },
            ) => {
                view.agents.set_base(agents);
                view.issues.set_base(issues);
                view.prs.set_base(prs);
                view.deployments.set_base(deployments);
            }
            (PageData::Agents(view), PageSnapshot::Agents(items)) => view.set_base(items),
            (PageData::Issues(view), PageSnapshot::Issues(items)) => view.set_base(items),
            (PageData::Prs(view), PageSnapshot::Prs(items)) => view.set_base(items),
            (PageData::Deployments(view), PageSnapshot::Deployments(items)) => {
                view.set_base(items)
            }
            (PageData::Worktrees(view), PageSnapshot::Worktrees(items)) => view.set_base(items),
            (PageData::Logs(view), PageSnapshot::Logs(items)) => view.tail.merge_snapshot(items),
            _ => {
                self.status = LoadStatus::Failed("snapshot does not match page".to_string());
            }
        }
    }

    pub fn fail(&mut self, error: String) {
        self.fetch = None;
        self.status = LoadStatus::Failed(error);
    }

    pub fn ingest(&mut self, message: &PushMessage) {
        match &mut self.data {
            PageData::Dashboard(view) => {
                view.agents.ingest(message);
                view.issues.ingest(message);
                view.prs.ingest(message);
                view.deployments.ingest(message);
            }
            PageData::Agents(view) => view.ingest(message),
            PageData::Issues(view) => view.ingest(message),
            PageData::Prs(view) => view.ingest(message),
            PageData::Deployments(view) => view.ingest(message),
            PageData::Worktrees(view) => view.ingest(message),
            PageData::Logs(view) => {
                view.tail.ingest(message);
            }
        }
    }

    pub fn filter(&self) -> Option<&Filter> {
        match &self.data {
            PageData::Dashboard(_) => None,
            PageData::Agents(view) => Some(&view.filter),
            PageData::Issues(view) => Some(&view.filter),
            PageData::Prs(view) => Some(&view.filter),
            PageData::Deployments(view) => Some(&view.filter),
            PageData::Worktrees(view) => Some(&view.filter),
            PageData::Logs(view) => Some(&view.filter),
        }
    }

    pub fn filter_mut(&mut self) -> Option<&mut Filter> {
        match &mut self.data {
            PageData::Dashboard(_) => None,
            PageData::Agents(view) => Some(&mut view.filter),
            PageData::Issues(view) => Some(&mut view.filter),
            PageData::Prs(view) => Some(&mut view.filter),
            PageData::Deployments(view) => Some(&mut view.filter),
            PageData::Worktrees(view) => Some(&mut view.filter),
            PageData::Logs(view) => Some(&mut view.filter),
        }
    }

    pub fn sort(&self) -> Option<SortOrder> {
        match &self.data {
            PageData::Dashboard(_) => None,
            PageData::Agents(view) => Some(view.sort),
            PageData::Issues(view) => Some(view.sort),
            PageData::Prs(view) => Some(view.sort),
            PageData::Deployments(view) => Some(view.sort),
            PageData::Worktrees(view) => Some(view.sort),
            PageData::Logs(view) => Some(view.sort),
        }
    }

    pub fn cycle_sort(&mut self) {
        match &mut self.data {
            PageData::Dashboard(_) => {}
            PageData::Agents(view) => view.sort = view.sort.next(),
            PageData::Issues(view) => view.sort = view.sort.next(),
            PageData::Prs(view) => view.sort = view.sort.next(),
            PageData::Deployments(view) => view.sort = view.sort.next(),
            PageData::Worktrees(view) => view.sort = view.sort.next(),
            PageData::Logs(view) => view.sort = view.sort.next(),
        }
        self.selected = 0;
    }

    pub fn cycle_category(&mut self) {
        match &mut self.data {
            PageData::Dashboard(_) => {}
            PageData::Agents(view) => view.filter.cycle_category::<Agent>(),
            PageData::Issues(view) => view.filter.cycle_category::<Issue>(),
            PageData::Prs(view) => view.filter.cycle_category::<PullRequest>(),
            PageData::Deployments(view) => view.filter.cycle_category::<Deployment>(),
            PageData::Worktrees(view) => view.filter.cycle_category::<Worktree>(),
            PageData::Logs(view) => view.filter.cycle_category::<LogEntry>(),
        }
        self.selected = 0;
    }

    pub fn row_count(&self) -> usize {
        match &self.data {
            PageData::Dashboard(_) => 0,
            PageData::Agents(view) => view.rows().len(),
            PageData::Issues(view) => view.rows().len(),
            PageData::Prs(view) => view.rows().len(),
            PageData::Deployments(view) => view.rows().len(),
            PageData::Worktrees(view) => view.rows().len(),
            PageData::Logs(view) => view.rows().len(),
        }
    }
}

impl Drop for PageState {
    fn drop(&mut self) {
        self.abort_fetch();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn deployment(id: &str, status: DeploymentStatus, updated: &str) -> Deployment {
        Deployment {
            id: id.to_string(),
            environment: "staging".to_string(),
            status,
            health: None,
            version: "1.0.0".to_string(),
            url: None,
            created_at: "2026-03-01T09:00:00Z".parse().unwrap(),
            updated_at: updated.parse().unwrap(),
        }
    }

    #[test]
    fn page_cycle_wraps_both_ways() {
        assert_eq!(Page::Logs.next(), Page::Dashboard);
        assert_eq!(Page::Dashboard.prev(), Page::Logs);
        assert_eq!(Page::Issues.next(), Page::Prs);
    }

    #[test]
    fn rows_merge_filter_and_sort_without_touching_base() {
        let mut view: ResourceView<Deployment> = ResourceView::default();
        view.set_base(vec![
            deployment("dep-1", DeploymentStatus::InProgress, "2026-03-01T09:00:00Z"),
            deployment("dep-2", DeploymentStatus::Success, "2026-03-01T09:30:00Z"),
        ]);
        view.ingest(
            &PushMessage::parse(
                r#"{"type":"deployment_update","deployment_id":"dep-1","status":"failed","timestamp":"2026-03-01T10:00:00Z"}"#,
            )
            .unwrap(),
        );

        let rows = view.rows();
        assert_eq!(rows[0].id, "dep-1");
        assert_eq!(rows[0].status, DeploymentStatus::Failed);
        assert_eq!(view.base()[0].status, DeploymentStatus::InProgress);

        view.filter.category = Some("failed".to_string());
        assert_eq!(view.rows().len(), 1);
        view.filter.category = Some("in_progress".to_string());
        assert!(view.rows().is_empty());
    }

    #[test]
    fn older_push_update_does_not_override_newer_one() {
        let mut view: ResourceView<Deployment> = ResourceView::default();
        view.set_base(vec![deployment(
            "dep-1",
            DeploymentStatus::Pending,
            "2026-03-01T09:00:00Z",
        )]);
        view.ingest(
            &PushMessage::parse(
                r#"{"type":"deployment_update","deployment_id":"dep-1","status":"success","timestamp":"2026-03-01T10:05:00Z"}"#,
            )
            .unwrap(),
        );
        view.ingest(
            &PushMessage::parse(
                r#"{"type":"deployment_update","deployment_id":"dep-1","status":"in_progress","timestamp":"2026-03-01T10:00:00Z"}"#,
            )
            .unwrap(),
        );
        assert_eq!(view.rows()[0].status, DeploymentStatus::Success);
    }

    #[test]
    fn dashboard_counts_use_merged_records() {
        let mut state = PageState::new(Page::Dashboard, 1);
        state.apply_snapshot(PageSnapshot::Dashboard {
            agents: Vec::new(),
            issues: Vec::new(),
            prs: Vec::new(),
            deployments: vec![
                deployment("dep-1", DeploymentStatus::InProgress, "2026-03-01T09:00:00Z"),
                deployment("dep-2", DeploymentStatus::Success, "2026-03-01T09:00:00Z"),
            ],
        });
        state.ingest(
            &PushMessage::parse(
                r#"{"type":"deployment_update","deployment_id":"dep-2","status":"failed"}"#,
            )
            .unwrap(),
        );
        let PageData::Dashboard(view) = &state.data else {
            panic!("expected dashboard");
        };
        let counts = view.counts();
        assert_eq!(counts.deploying, 1);
        assert_eq!(counts.failed_deployments, 1);
        assert_eq!(state.status, LoadStatus::Loaded);
    }

    #[test]
    fn mismatched_snapshot_marks_page_failed() {
        let mut state = PageState::new(Page::Issues, 1);
        state.apply_snapshot(PageSnapshot::Logs(Vec::new()));
        assert!(matches!(state.status, LoadStatus::Failed(_)));
    }
}
