use crate::app::{App, InputMode};
use crate::theme;
use crate::view::{DashboardView, LoadStatus, Page, PageData, PageState};
use chrono::{DateTime, Local, Utc};
use opc_core::{Agent, Deployment, Issue, LogEntry, PullRequest, Worktree};
use ratatui::{
    layout::{Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{
        Block, Borders, Cell, Clear, List, ListItem, Paragraph, Row, Table, TableState, Tabs, Wrap,
    },
    Frame,
};

trait TableRecord {
    const HEADERS: &'static [&'static str];

    fn widths() -> Vec<Constraint>;

    fn cells(&self) -> Vec<Cell<'static>>;
}

fn styled(text: impl Into<String>, color: Color) -> Cell<'static> {
    Cell::from(Span::styled(text.into(), Style::new().fg(color)))
}

fn short_time(at: DateTime<Utc>) -> String {
    at.with_timezone(&Local).format("%m-%d %H:%M:%S").to_string()
}

impl TableRecord for Agent {
    const HEADERS: &'static [&'static str] = &["Agent", "Status", "Task", "Progress", "Last seen"];

    fn widths() -> Vec<Constraint> {
        vec![
            Constraint::Length(20),
            Constraint::Length(9),
            Constraint::Min(20),
            Constraint::Length(9),
            Constraint::Length(15),
        ]
    }

    fn cells(&self) -> Vec<Cell<'static>> {
        vec![
            Cell::from(self.display_name().to_string()),
            styled(self.status.as_str(), theme::agent_color(self.status)),
            Cell::from(self.current_task.clone().unwrap_or_default()),
            Cell::from(
                self.progress
                    .map(|p| format!("{:.0}%", p.clamp(0.0, 100.0)))
                    .unwrap_or_default(),
            ),
            Cell::from(self.last_seen.map(short_time).unwrap_or_default()),
        ]
    }
}

impl TableRecord for Issue {
    const HEADERS: &'static [&'static str] = &["#", "Title", "State", "Labels", "Assignee", "Updated"];

    fn widths() -> Vec<Constraint> {
        vec![
            Constraint::Length(6),
            Constraint::Min(24),
            Constraint::Length(7),
            Constraint::Length(18),
            Constraint::Length(12),
            Constraint::Length(15),
        ]
    }

    fn cells(&self) -> Vec<Cell<'static>> {
        let color = match self.state {
            opc_core::IssueState::Open => theme::OK,
            opc_core::IssueState::Closed => theme::MUTED,
        };
        vec![
            Cell::from(self.number.to_string()),
            Cell::from(self.title.clone()),
            styled(self.state.as_str(), color),
            Cell::from(self.labels.join(", ")),
            Cell::from(self.assignee.clone().unwrap_or_default()),
            Cell::from(short_time(self.updated_at)),
        ]
    }
}

impl TableRecord for PullRequest {
    const HEADERS: &'static [&'static str] = &["#", "Title", "State", "Branch", "Checks", "Updated"];

    fn widths() -> Vec<Constraint> {
        vec![
            Constraint::Length(6),
            Constraint::Min(24),
            Constraint::Length(7),
            Constraint::Length(20),
            Constraint::Length(8),
            Constraint::Length(15),
        ]
    }

    fn cells(&self) -> Vec<Cell<'static>> {
        vec![
            Cell::from(self.number.to_string()),
            Cell::from(self.title.clone()),
            Cell::from(self.state.as_str()),
            Cell::from(self.branch.clone()),
            styled(
                self.checks.map(|c| c.as_str()).unwrap_or("-"),
                theme::checks_color(self.checks),
            ),
            Cell::from(short_time(self.updated_at)),
        ]
    }
}

impl TableRecord for Deployment {
    const HEADERS: &'static [&'static str] = &["Id", "Env", "Version", "Status", "Health", "Updated"];

    fn widths() -> Vec<Constraint> {
        vec![
            Constraint::Length(14),
            Constraint::Length(12),
            Constraint::Length(12),
            Constraint::Length(12),
            Constraint::Length(10),
            Constraint::Min(15),
        ]
    }

    fn cells(&self) -> Vec<Cell<'static>> {
        vec![
            Cell::from(self.id.clone()),
            Cell::from(self.environment.clone()),
            Cell::from(self.version.clone()),
            styled(self.status.as_str(), theme::deployment_color(self.status)),
            styled(
                self.health.map(|h| h.as_str()).unwrap_or("-"),
                theme::health_color(self.health),
            ),
            Cell::from(short_time(self.updated_at)),
        ]
    }
}

impl TableRecord for Worktree {
    const HEADERS: &'static [&'static str] = &["Path", "Branch", "Status", "Agent", "Updated"];

    fn widths() -> Vec<Constraint> {
        vec![
            Constraint::Min(24),
            Constraint::Length(20),
            Constraint::Length(8),
            Constraint::Length(14),
            Constraint::Length(15),
        ]
    }

    fn cells(&self) -> Vec<Cell<'static>> {
        vec![
            Cell::from(self.path.clone()),
            Cell::from(self.branch.clone()),
            Cell::from(self.status.as_str()),
            Cell::from(self.agent_id.clone().unwrap_or_default()),
            Cell::from(short_time(self.updated_at)),
        ]
    }
}

impl TableRecord for LogEntry {
    const HEADERS: &'static [&'static str] = &["Time", "Level", "Source", "Message"];

    fn widths() -> Vec<Constraint> {
        vec![
            Constraint::Length(15),
            Constraint::Length(6),
            Constraint::Length(14),
            Constraint::Min(30),
        ]
    }

    fn cells(&self) -> Vec<Cell<'static>> {
        vec![
            Cell::from(short_time(self.timestamp)),
            styled(self.level.as_str(), theme::level_color(self.level)),
            Cell::from(self.source.clone().unwrap_or_default()),
            Cell::from(self.message.clone()),
        ]
    }
}

pub fn render(f: &mut Frame, app: &App) {
    let area = f.size();
    let layout = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(1),
            Constraint::Length(3),
            Constraint::Min(0),
            Constraint::Length(1),
        ])
        .split(area);

    render_status_line(f, app, layout[0]);
    render_tabs(f, app, layout[1]);
    match &app.page.data {
        PageData::Dashboard(view) => render_dashboard(f, app, view, layout[2]),
        PageData::Agents(view) => render_table(f, &app.page, &view.rows(), layout[2]),
        PageData::Issues(view) => render_table(f, &app.page, &view.rows(), layout[2]),
        PageData::Prs(view) => render_table(f, &app.page, &view.rows(), layout[2]),
        PageData::Deployments(view) => render_table(f, &app.page, &view.rows(), layout[2]),
        PageData::Worktrees(view) => render_table(f, &app.page, &view.rows(), layout[2]),
        PageData::Logs(view) => render_table(f, &app.page, &view.rows(), layout[2]),
    }
    render_footer(f, app, layout[3]);

    if app.help_open {
        render_help(f, area);
    }
}

fn render_status_line(f: &mut Frame, app: &App, area: Rect) {
    let (label, color) = if !app.push_enabled {
        ("live updates off", theme::MUTED)
    } else if app.connection.is_connected() {
        ("connected", theme::OK)
    } else {
        ("disconnected", theme::CRITICAL)
    };
    let mut spans = vec![
        Span::styled("Ops Console ", theme::HEADER_STYLE),
        Span::styled(format!("● {label}"), Style::new().fg(color)),
    ];
    if let Some(kind) = app.last_kind {
        spans.push(Span::styled(
            format!("  last: {kind}"),
            Style::new().fg(theme::MUTED),
        ));
    }
    if let Some(note) = &app.status_note {
        spans.push(Span::styled(format!("  {note}"), Style::new().fg(theme::WARN)));
    }
    f.render_widget(Paragraph::new(Line::from(spans)), area);
}

fn render_tabs(f: &mut Frame, app: &App, area: Rect) {
    let titles: Vec<Line> = Page::ALL
        .iter()
        .enumerate()
        .map(|(idx, page)| Line::from(format!("{} {}", idx + 1, page.title())))
        .collect();
    let selected = Page::ALL
        .iter()
        .position(|page| *page == app.page.page)
        .unwrap_or(0);
    let tabs = Tabs::new(titles)
        .block(Block::default().borders(Borders::ALL))
        .select(selected)
        .highlight_style(
            Style::new()
                .fg(theme::ACCENT)
                .add_modifier(Modifier::BOLD),
        );
    f.render_widget(tabs, area);
}

fn render_dashboard(f: &mut Frame, app: &App, view: &DashboardView, area: Rect) {
    let columns = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Percentage(45), Constraint::Percentage(55)])
        .split(area);
    let left = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Length(9), Constraint::Min(0)])
        .split(columns[0]);

    let counts = view.counts();
    let mut lines = vec![
        Line::from(format!(
            "Agents        {} ({} active)",
            counts.agents, counts.active_agents
        )),
        Line::from(format!("Open issues   {}", counts.open_issues)),
        Line::from(format!("Open PRs      {}", counts.open_prs)),
        Line::from(format!("Deploying     {}", counts.deploying)),
        Line::from(Span::styled(
            format!("Failed deploy {}", counts.failed_deployments),
            if counts.failed_deployments > 0 {
                Style::new().fg(theme::CRITICAL)
            } else {
                Style::new()
            },
        )),
    ];
    match &app.page.status {
        LoadStatus::Loading => lines.push(Line::from(Span::styled(
            "loading…",
            Style::new().fg(theme::MUTED),
        ))),
        LoadStatus::Failed(err) => lines.push(Line::from(Span::styled(
            err.clone(),
            Style::new().fg(theme::WARN),
        ))),
        LoadStatus::Loaded => {}
    }
    let summary = Paragraph::new(lines)
        .block(Block::default().borders(Borders::ALL).title("Overview"))
        .wrap(Wrap { trim: true });
    f.render_widget(summary, left[0]);

    let agents: Vec<ListItem> = view
        .busy_agents()
        .into_iter()
        .map(|agent| {
            let progress = agent
                .progress
                .map(|p| format!(" {:.0}%", p.clamp(0.0, 100.0)))
                .unwrap_or_default();
            ListItem::new(Line::from(vec![
                Span::styled(
                    agent.display_name().to_string(),
                    Style::new().fg(theme::agent_color(agent.status)),
                ),
                Span::raw(format!(
                    " {}{progress}",
                    agent.current_task.clone().unwrap_or_default()
                )),
            ]))
        })
        .collect();
    f.render_widget(
        List::new(agents).block(Block::default().borders(Borders::ALL).title("Working agents")),
        left[1],
    );

    let feed: Vec<ListItem> = app
        .feed
        .iter()
        .map(|item| {
            ListItem::new(Line::from(vec![
                Span::styled(
                    item.timestamp.with_timezone(&Local).format("%H:%M:%S ").to_string(),
                    Style::new().fg(theme::MUTED),
                ),
                Span::raw(item.summary.clone()),
            ]))
        })
        .collect();
    f.render_widget(
        List::new(feed).block(Block::default().borders(Borders::ALL).title("Activity")),
        columns[1],
    );
}

fn render_table<R: TableRecord>(f: &mut Frame, page: &PageState, rows: &[R], area: Rect) {
    let block = Block::default()
        .borders(Borders::ALL)
        .title(format!("{} ({})", page.page.title(), rows.len()));

    if rows.is_empty() {
        let message = match &page.status {
            LoadStatus::Loading => Span::styled("Loading…", Style::new().fg(theme::MUTED)),
            LoadStatus::Failed(err) => {
                Span::styled(format!("{err}  (r to retry)"), Style::new().fg(theme::WARN))
            }
            LoadStatus::Loaded => Span::styled("Nothing to show", Style::new().fg(theme::MUTED)),
        };
        f.render_widget(
            Paragraph::new(Line::from(message))
                .block(block)
                .wrap(Wrap { trim: true }),
            area,
        );
        return;
    }

    let header = Row::new(R::HEADERS.iter().map(|title| Cell::from(*title)))
        .style(theme::HEADER_STYLE);
    let body: Vec<Row> = rows
        .iter()
        .enumerate()
        .map(|(idx, record)| Row::new(record.cells()).style(theme::zebra_row_style(idx)))
        .collect();
    let table = Table::new(body, R::widths())
        .header(header)
        .block(block)
        .highlight_style(theme::SELECTED_STYLE);

    let mut state = TableState::default();
    state.select(Some(page.selected.min(rows.len() - 1)));
    f.render_stateful_widget(table, area, &mut state);
}

fn render_footer(f: &mut Frame, app: &App, area: Rect) {
    let mut spans = Vec::new();
    if app.input == InputMode::Search {
        let query = app
            .page
            .filter()
            .map(|filter| filter.query.as_str())
            .unwrap_or_default();
        spans.push(Span::styled(
            format!("search: {query}_"),
            Style::new().fg(theme::ACCENT),
        ));
    } else {
        if let Some(filter) = app.page.filter() {
            if !filter.query.is_empty() {
                spans.push(Span::raw(format!("search \"{}\"  ", filter.query)));
            }
            spans.push(Span::raw(format!(
                "category {}  ",
                filter.category.as_deref().unwrap_or("all")
            )));
        }
        if let Some(sort) = app.page.sort() {
            spans.push(Span::raw(format!("sort {}  ", sort.label())));
        }
        spans.push(Span::styled(
            "Tab page  / search  c category  s sort  r refresh  ? help  q quit",
            Style::new().fg(theme::MUTED),
        ));
    }
    f.render_widget(Paragraph::new(Line::from(spans)), area);
}

fn render_help(f: &mut Frame, area: Rect) {
    let width = area.width.min(52);
    let height = area.height.min(16);
    let popup = Rect {
        x: area.x + (area.width.saturating_sub(width)) / 2,
        y: area.y + (area.height.saturating_sub(height)) / 2,
        width,
        height,
    };
    let keys = [
        ("Tab / S-Tab", "Next / previous page"),
        ("1-7", "Jump to page"),
        ("j k / ↓ ↑", "Move selection"),
        ("/", "Search (Enter to finish)"),
        ("c", "Cycle category"),
        ("s", "Cycle sort order"),
        ("Esc", "Clear search and category"),
        ("r", "Refetch snapshot"),
        ("?", "Toggle help"),
        ("q", "Quit"),
    ];
    let mut text = vec![
        Line::from(Span::styled(
            "Keyboard Shortcuts",
            Style::default().add_modifier(Modifier::BOLD),
        )),
        Line::from(""),
    ];
    text.extend(keys.iter().map(|(key, action)| {
        Line::from(vec![
            Span::styled(format!("{key:<12}"), Style::new().fg(Color::Cyan)),
            Span::raw(*action),
        ])
    }));

    f.render_widget(Clear, popup);
    f.render_widget(
        Paragraph::new(text).block(
            Block::default()
                .borders(Borders::ALL)
                .title("Help")
                .border_style(Style::default().fg(Color::Yellow)),
        ),
        popup,
    );
}
