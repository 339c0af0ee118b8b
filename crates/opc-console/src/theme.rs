use opc_core::{AgentStatus, CheckStatus, DeploymentStatus, HealthStatus, LogLevel};
use ratatui::style::{Color, Modifier, Style};

pub const HEADER_STYLE: Style = Style::new()
    .fg(Color::Rgb(191, 219, 254))
    .add_modifier(Modifier::BOLD);
pub const SELECTED_STYLE: Style = Style::new()
    .bg(Color::Rgb(56, 189, 248))
    .fg(Color::Black)
    .add_modifier(Modifier::BOLD);

pub const OK: Color = Color::Rgb(34, 197, 94);
pub const WARN: Color = Color::Rgb(245, 158, 11);
pub const CRITICAL: Color = Color::Rgb(239, 68, 68);
pub const INFO: Color = Color::Rgb(59, 130, 246);
pub const MUTED: Color = Color::Rgb(148, 163, 184);
pub const ACCENT: Color = Color::Rgb(56, 189, 248);

pub fn zebra_row_style(index: usize) -> Style {
    let bg = if index % 2 == 0 {
        Color::Rgb(17, 26, 46)
    } else {
        Color::Rgb(11, 18, 32)
    };
    Style::new().bg(bg)
}

pub fn agent_color(status: AgentStatus) -> Color {
    match status {
        AgentStatus::Running | AgentStatus::Busy => ACCENT,
        AgentStatus::Idle => OK,
        AgentStatus::Error => CRITICAL,
        AgentStatus::Offline => MUTED,
    }
}

pub fn deployment_color(status: DeploymentStatus) -> Color {
    match status {
        DeploymentStatus::Success => OK,
        DeploymentStatus::Pending | DeploymentStatus::InProgress => INFO,
        DeploymentStatus::Failed => CRITICAL,
        DeploymentStatus::RolledBack => WARN,
    }
}

pub fn health_color(health: Option<HealthStatus>) -> Color {
    match health {
        Some(HealthStatus::Healthy) => OK,
        Some(HealthStatus::Degraded) => WARN,
        Some(HealthStatus::Unhealthy) => CRITICAL,
        Some(HealthStatus::Unknown) | None => MUTED,
    }
}

pub fn checks_color(checks: Option<CheckStatus>) -> Color {
    match checks {
        Some(CheckStatus::Passing) => OK,
        Some(CheckStatus::Pending) => INFO,
        Some(CheckStatus::Failing) => CRITICAL,
        None => MUTED,
    }
}

pub fn level_color(level: LogLevel) -> Color {
    match level {
        LogLevel::Debug => MUTED,
        LogLevel::Info => INFO,
        LogLevel::Warn => WARN,
        LogLevel::Error => CRITICAL,
    }
}
