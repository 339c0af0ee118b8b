//! Read-only view filters: text search, category select and sort order.

use crate::model::{Agent, Deployment, Issue, LogEntry, PullRequest, Worktree};
use chrono::{DateTime, Utc};
use std::cmp::Ordering;

pub trait Searchable {
    /// Values matched by the free-text query.
    fn search_fields(&self) -> Vec<&str>;

    /// Value matched by the category select.
    fn category(&self) -> &'static str;

    /// Every category value the select offers, in display order.
    fn categories() -> &'static [&'static str];

    fn recency(&self) -> Option<DateTime<Utc>>;

    /// Numeric ids sort numerically; everything else sorts by text.
    fn id_sort_key(&self) -> (u64, String);
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Filter {
    pub query: String,
    pub category: Option<String>,
}

impl Filter {
    pub fn is_active(&self) -> bool {
        !self.query.trim().is_empty() || self.category.is_some()
    }

    pub fn matches<R: Searchable>(&self, record: &R) -> bool {
        if let Some(category) = &self.category {
            if !record.category().eq_ignore_ascii_case(category) {
                return false;
            }
        }
        let needle = self.query.trim().to_lowercase();
        if needle.is_empty() {
            return true;
        }
        record
            .search_fields()
            .iter()
            .any(|field| field.to_lowercase().contains(&needle))
    }

    pub fn apply<'a, R: Searchable>(&self, records: &'a [R]) -> Vec<&'a R> {
        records.iter().filter(|record| self.matches(*record)).collect()
    }

    /// Steps the category select: all, then each category, then back to all.
    pub fn cycle_category<R: Searchable>(&mut self) {
        let categories = R::categories();
        self.category = match &self.category {
            None => categories.first().map(|c| c.to_string()),
            Some(current) => categories
                .iter()
                .position(|c| c.eq_ignore_ascii_case(current))
                .and_then(|idx| categories.get(idx + 1))
                .map(|c| c.to_string()),
        };
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortOrder {
    #[default]
    NewestFirst,
    OldestFirst,
    Id,
}

impl SortOrder {
    pub fn label(self) -> &'static str {
        match self {
            SortOrder::NewestFirst => "newest",
            SortOrder::OldestFirst => "oldest",
            SortOrder::Id => "id",
        }
    }

    pub fn next(self) -> Self {
        match self {
            SortOrder::NewestFirst => SortOrder::OldestFirst,
            SortOrder::OldestFirst => SortOrder::Id,
            SortOrder::Id => SortOrder::NewestFirst,
        }
    }
}

pub fn sort_records<R: Searchable>(records: &mut [&R], order: SortOrder) {
    match order {
        SortOrder::NewestFirst => records.sort_by(|a, b| compare_recency(*b, *a)),
        SortOrder::OldestFirst => records.sort_by(|a, b| compare_recency(*a, *b)),
        SortOrder::Id => records.sort_by_key(|record| record.id_sort_key()),
    }
}

fn compare_recency<R: Searchable>(a: &R, b: &R) -> Ordering {
    // Records without a timestamp sort as oldest.
    a.recency()
        .cmp(&b.recency())
        .then_with(|| a.id_sort_key().cmp(&b.id_sort_key()))
}

fn text_id(id: &str) -> (u64, String) {
    match id.parse::<u64>() {
        Ok(n) => (n, String::new()),
        Err(_) => (u64::MAX, id.to_string()),
    }
}

impl Searchable for Issue {
    fn search_fields(&self) -> Vec<&str> {
        let mut fields = vec![self.title.as_str(), self.author.as_str()];
        fields.extend(self.labels.iter().map(String::as_str));
        if let Some(assignee) = &self.assignee {
            fields.push(assignee);
        }
        fields
    }

    fn category(&self) -> &'static str {
        self.state.as_str()
    }

    fn categories() -> &'static [&'static str] {
        &["open", "closed"]
    }

    fn recency(&self) -> Option<DateTime<Utc>> {
        Some(self.updated_at)
    }

    fn id_sort_key(&self) -> (u64, String) {
        (self.number, String::new())
    }
}

impl Searchable for PullRequest {
    fn search_fields(&self) -> Vec<&str> {
        vec![
            self.title.as_str(),
            self.author.as_str(),
            self.branch.as_str(),
        ]
    }

    fn category(&self) -> &'static str {
        self.state.as_str()
    }

    fn categories() -> &'static [&'static str] {
        &["open", "draft", "merged", "closed"]
    }

    fn recency(&self) -> Option<DateTime<Utc>> {
        Some(self.updated_at)
    }

    fn id_sort_key(&self) -> (u64, String) {
        (self.number, String::new())
    }
}

impl Searchable for Deployment {
    fn search_fields(&self) -> Vec<&str> {
        let mut fields = vec![
            self.id.as_str(),
            self.environment.as_str(),
            self.version.as_str(),
        ];
        if let Some(url) = &self.url {
            fields.push(url);
        }
        fields
    }

    fn category(&self) -> &'static str {
        self.status.as_str()
    }

    fn categories() -> &'static [&'static str] {
        &["pending", "in_progress", "success", "failed", "rolled_back"]
    }

    fn recency(&self) -> Option<DateTime<Utc>> {
        Some(self.updated_at)
    }

    fn id_sort_key(&self) -> (u64, String) {
        text_id(&self.id)
    }
}

impl Searchable for Worktree {
    fn search_fields(&self) -> Vec<&str> {
        let mut fields = vec![self.path.as_str(), self.branch.as_str()];
        if let Some(agent) = &self.agent_id {
            fields.push(agent);
        }
        fields
    }

    fn category(&self) -> &'static str {
        self.status.as_str()
    }

    fn categories() -> &'static [&'static str] {
        &["active", "idle", "dirty", "stale"]
    }

    fn recency(&self) -> Option<DateTime<Utc>> {
        Some(self.updated_at)
    }

    fn id_sort_key(&self) -> (u64, String) {
        (u64::MAX, self.path.clone())
    }
}

impl Searchable for Agent {
    fn search_fields(&self) -> Vec<&str> {
        let mut fields = vec![self.id.as_str(), self.name.as_str()];
        if let Some(task) = &self.current_task {
            fields.push(task);
        }
        fields
    }

    fn category(&self) -> &'static str {
        self.status.as_str()
    }

    fn categories() -> &'static [&'static str] {
        &["idle", "running", "busy", "error", "offline"]
    }

    fn recency(&self) -> Option<DateTime<Utc>> {
        self.last_seen
    }

    fn id_sort_key(&self) -> (u64, String) {
        text_id(&self.id)
    }
}

impl Searchable for LogEntry {
    fn search_fields(&self) -> Vec<&str> {
        let mut fields = vec![self.message.as_str()];
        if let Some(source) = &self.source {
            fields.push(source);
        }
        fields
    }

    fn category(&self) -> &'static str {
        self.level.as_str()
    }

    fn categories() -> &'static [&'static str] {
        &["debug", "info", "warn", "error"]
    }

    fn recency(&self) -> Option<DateTime<Utc>> {
        Some(self.timestamp)
    }

    fn id_sort_key(&self) -> (u64, String) {
        self.id.as_deref().map(text_id).unwrap_or((u64::MAX, String::new()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{IssueState, PrState};

    fn issue(number: u64, title: &str, state: IssueState, updated: &str) -> Issue {
        Issue {
            number,
            title: title.to_string(),
            state,
            labels: vec!["backend".to_string()],
            author: "rin".to_string(),
            assignee: None,
            created_at: "2026-03-01T09:00:00Z".parse().unwrap(),
            updated_at: updated.parse().unwrap(),
        }
    }

    #[test]
    fn query_and_category_combine_without_mutating_input() {
        let issues = vec![
            issue(1, "Login timeout", IssueState::Open, "2026-03-01T10:00:00Z"),
            issue(2, "Deploy TIMEOUT on staging", IssueState::Closed, "2026-03-01T11:00:00Z"),
            issue(3, "Docs typo", IssueState::Open, "2026-03-01T12:00:00Z"),
        ];
        let snapshot = issues.clone();

        let filter = Filter {
            query: "timeout".to_string(),
            category: None,
        };
        let hits: Vec<u64> = filter.apply(&issues).iter().map(|i| i.number).collect();
        assert_eq!(hits, vec![1, 2]);

        let filter = Filter {
            query: " timeout ".to_string(),
            category: Some("open".to_string()),
        };
        let hits: Vec<u64> = filter.apply(&issues).iter().map(|i| i.number).collect();
        assert_eq!(hits, vec![1]);

        let filter = Filter {
            query: "BACKEND".to_string(),
            category: None,
        };
        assert_eq!(filter.apply(&issues).len(), 3);
        assert_eq!(issues, snapshot);
    }

    #[test]
    fn category_cycle_wraps_back_to_all() {
        let mut filter = Filter::default();
        let mut seen = Vec::new();
        for _ in 0..5 {
            filter.cycle_category::<PullRequest>();
            seen.push(filter.category.clone());
        }
        assert_eq!(
            seen,
            vec![
                Some("open".to_string()),
                Some("draft".to_string()),
                Some("merged".to_string()),
                Some("closed".to_string()),
                None,
            ]
        );
        assert!(!filter.is_active());
        assert_eq!(PrState::Merged.as_str(), "merged");
    }

    #[test]
    fn sort_orders_by_recency_and_id() {
        let issues = vec![
            issue(10, "b", IssueState::Open, "2026-03-01T10:00:00Z"),
            issue(2, "a", IssueState::Open, "2026-03-01T12:00:00Z"),
            issue(7, "c", IssueState::Open, "2026-03-01T11:00:00Z"),
        ];
        let mut view: Vec<&Issue> = issues.iter().collect();
        sort_records(&mut view, SortOrder::NewestFirst);
        assert_eq!(view.iter().map(|i| i.number).collect::<Vec<_>>(), vec![2, 7, 10]);
        sort_records(&mut view, SortOrder::OldestFirst);
        assert_eq!(view.iter().map(|i| i.number).collect::<Vec<_>>(), vec![10, 7, 2]);
        sort_records(&mut view, SortOrder::Id);
        assert_eq!(view.iter().map(|i| i.number).collect::<Vec<_>>(), vec![2, 7, 10]);
    }
}
