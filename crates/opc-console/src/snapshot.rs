use clap::ValueEnum;
use opc_client::{ApiClient, ClientError};
use opc_core::{Agent, Deployment, Issue, ListResponse, LogEntry, PullRequest, Worktree};
use serde::Serialize;
use std::io::{self, Write};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Resource {
    Agents,
    Issues,
    Prs,
    Worktrees,
    Deployments,
    Logs,
}

#[derive(Debug)]
pub enum Snapshot {
    Agents(ListResponse<Agent>),
    Issues(ListResponse<Issue>),
    Prs(ListResponse<PullRequest>),
    Worktrees(ListResponse<Worktree>),
    Deployments(ListResponse<Deployment>),
    Logs(ListResponse<LogEntry>),
}

pub async fn fetch(
    api: &ApiClient,
    resource: Resource,
    log_limit: usize,
) -> Result<Snapshot, ClientError> {
    Ok(match resource {
        Resource::Agents => Snapshot::Agents(api.fetch_agents().await?),
        Resource::Issues => Snapshot::Issues(api.fetch_issues().await?),
        Resource::Prs => Snapshot::Prs(api.fetch_prs().await?),
        Resource::Worktrees => Snapshot::Worktrees(api.fetch_worktrees().await?),
        Resource::Deployments => Snapshot::Deployments(api.fetch_deployments().await?),
        Resource::Logs => Snapshot::Logs(api.fetch_logs(log_limit).await?),
    })
}

pub fn write_snapshot<W: Write>(snapshot: &Snapshot, json: bool, out: &mut W) -> io::Result<()> {
    match snapshot {
        Snapshot::Agents(list) => write_list(list, json, out, agent_line),
        Snapshot::Issues(list) => write_list(list, json, out, issue_line),
        Snapshot::Prs(list) => write_list(list, json, out, pr_line),
        Snapshot::Worktrees(list) => write_list(list, json, out, worktree_line),
        Snapshot::Deployments(list) => write_list(list, json, out, deployment_line),
        Snapshot::Logs(list) => write_list(list, json, out, log_line),
    }
}

fn write_list<T, W, F>(list: &ListResponse<T>, json: bool, out: &mut W, line: F) -> io::Result<()>
where
    T: Serialize,
    W: Write,
    F: Fn(&T) -> String,
{
    if json {
        serde_json::to_writer_pretty(&mut *out, list)?;
        writeln!(out)?;
        return Ok(());
    }
    for item in &list.items {
        writeln!(out, "{}", line(item))?;
    }
    writeln!(out, "({} of {})", list.items.len(), list.total)
}

fn agent_line(agent: &Agent) -> String {
    let task = agent.current_task.as_deref().unwrap_or("-");
    match agent.progress {
        Some(progress) => format!(
            "{:<16} {:<8} {} ({:.0}%)",
            agent.name,
            agent.status.as_str(),
            task,
            progress.clamp(0.0, 100.0)
        ),
        None => format!("{:<16} {:<8} {}", agent.name, agent.status.as_str(), task),
    }
}

fn issue_line(issue: &Issue) -> String {
    let labels = if issue.labels.is_empty() {
        String::new()
    } else {
        format!(" [{}]", issue.labels.join(", "))
    };
    format!(
        "#{:<5} {:<6} {}{}",
        issue.number,
        issue.state.as_str(),
        issue.title,
        labels
    )
}

fn pr_line(pr: &PullRequest) -> String {
    let checks = pr.checks.map(|checks| checks.as_str()).unwrap_or("-");
    format!(
        "#{:<5} {:<6} {:<8} {} ({})",
        pr.number,
        pr.state.as_str(),
        checks,
        pr.title,
        pr.branch
    )
}

fn worktree_line(worktree: &Worktree) -> String {
    format!(
        "{:<32} {:<20} {:<6} {}",
        worktree.path,
        worktree.branch,
        worktree.status.as_str(),
        worktree.agent_id.as_deref().unwrap_or("-")
    )
}

fn deployment_line(deployment: &Deployment) -> String {
    let health = deployment
        .health
        .map(|health| health.as_str())
        .unwrap_or("-");
    format!(
        "{:<12} {:<12} {:<12} {:<9} {}",
        deployment.id,
        deployment.environment,
        deployment.status.as_str(),
        health,
        deployment.version
    )
}

fn log_line(entry: &LogEntry) -> String {
    format!(
        "{} {:<5} {:<10} {}",
        entry.timestamp.format("%Y-%m-%d %H:%M:%S"),
        entry.level.as_str(),
        entry.source.as_deref().unwrap_or("-"),
        entry.message
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use opc_core::{IssueState, LogLevel};

    fn issues() -> ListResponse<Issue> {
        ListResponse {
            items: vec![Issue {
                number: 42,
                title: "Login timeout".to_string(),
                state: IssueState::Open,
                labels: vec!["bug".to_string(), "p1".to_string()],
                author: "ren".to_string(),
                assignee: None,
                created_at: "2026-03-01T09:00:00Z".parse().unwrap(),
                updated_at: "2026-03-01T09:00:00Z".parse().unwrap(),
            }],
            total: 3,
        }
    }

    #[test]
    fn text_output_lists_items_and_totals() {
        let mut out = Vec::new();
        write_snapshot(&Snapshot::Issues(issues()), false, &mut out).unwrap();
        let text = String::from_utf8(out).unwrap();
        assert!(text.contains("#42"));
        assert!(text.contains("Login timeout [bug, p1]"));
        assert!(text.trim_end().ends_with("(1 of 3)"));
    }

    #[test]
    fn json_output_keeps_the_wire_shape() {
        let mut out = Vec::new();
        write_snapshot(&Snapshot::Issues(issues()), true, &mut out).unwrap();
        let value: serde_json::Value = serde_json::from_slice(&out).unwrap();
        assert_eq!(value["total"], 3);
        assert_eq!(value["items"][0]["number"], 42);
        assert_eq!(value["items"][0]["state"], "open");
    }

    #[test]
    fn log_lines_use_level_and_source() {
        let entry = LogEntry {
            id: None,
            timestamp: "2026-03-01T09:30:00Z".parse().unwrap(),
            level: LogLevel::Warn,
            source: Some("deployer".to_string()),
            message: "slow health check".to_string(),
        };
        let line = log_line(&entry);
        assert!(line.starts_with("2026-03-01 09:30:00 warn"));
        assert!(line.ends_with("slow health check"));
    }
}
