mod app;
mod companion;
mod logging;
mod snapshot;
mod theme;
mod ui;
mod view;

use anyhow::Result;
use app::{App, FetchOutcome};
use clap::{Args, Parser, Subcommand};
use crossterm::{
    event::{Event, EventStream, KeyEventKind},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use futures_util::StreamExt;
use opc_client::{
    ApiClient, ClientConfig, ConfigOverrides, PushClient, PushEvent, DEFAULT_LOG_LIMIT,
};
use ratatui::{backend::CrosstermBackend, Terminal};
use snapshot::Resource;
use std::{io, path::PathBuf, time::Duration};
use tokio::sync::mpsc;
use tracing::{error, info};
use view::Page;

const FETCH_QUEUE_CAPACITY: usize = 16;
const REDRAW_INTERVAL: Duration = Duration::from_secs(1);

#[derive(Parser, Debug)]
#[command(
    name = "opc",
    about = "Live operations console for agents, issues, PRs and deployments"
)]
struct Cli {
    #[command(flatten)]
    endpoints: EndpointArgs,
    /// Directory for the console log file.
    #[arg(long)]
    log_dir: Option<PathBuf>,
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Args, Debug)]
struct EndpointArgs {
    /// development or production
    #[arg(long)]
    env: Option<String>,
    #[arg(long)]
    api_url: Option<String>,
    #[arg(long)]
    ws_url: Option<String>,
    /// Do not reconnect when the push connection drops.
    #[arg(long, default_value_t = false)]
    no_reconnect: bool,
    #[arg(long)]
    reconnect_delay_ms: Option<u64>,
    #[arg(long)]
    http_timeout_secs: Option<u64>,
}

impl EndpointArgs {
    fn overrides(&self) -> ConfigOverrides {
        ConfigOverrides {
            environment: self.env.clone(),
            api_url: self.api_url.clone(),
            ws_url: self.ws_url.clone(),
            reconnect: self.no_reconnect.then_some(false),
            reconnect_delay_ms: self.reconnect_delay_ms,
            http_timeout_secs: self.http_timeout_secs,
        }
    }
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Interactive console (default).
    Tui {
        /// Snapshots only, no push connection.
        #[arg(long, default_value_t = false)]
        no_live: bool,
        #[arg(long, default_value_t = DEFAULT_LOG_LIMIT)]
        log_limit: usize,
    },
    /// Fetch one resource list and print it.
    Snapshot {
        #[arg(value_enum)]
        resource: Resource,
        #[arg(long, default_value_t = false)]
        json: bool,
        #[arg(long, default_value_t = DEFAULT_LOG_LIMIT)]
        log_limit: usize,
    },
    /// Walk through the companion creation wizard and print the submission.
    Companion,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let _log_guard = logging::init_logging(cli.log_dir.as_deref());

    let command = cli.command.unwrap_or(Command::Tui {
        no_live: false,
        log_limit: DEFAULT_LOG_LIMIT,
    });
    match command {
        Command::Tui { no_live, log_limit } => {
            let (config, api) = load_client(&cli.endpoints)?;
            run_tui(&config, api, log_limit, !no_live).await
        }
        Command::Snapshot {
            resource,
            json,
            log_limit,
        } => {
            let (_, api) = load_client(&cli.endpoints)?;
            let data = snapshot::fetch(&api, resource, log_limit).await?;
            let stdout = io::stdout();
            snapshot::write_snapshot(&data, json, &mut stdout.lock())?;
            Ok(())
        }
        Command::Companion => run_companion(),
    }
}

fn load_client(endpoints: &EndpointArgs) -> Result<(ClientConfig, ApiClient)> {
    let config = match ClientConfig::from_env(&endpoints.overrides()) {
        Ok(config) => config,
        Err(err) => {
            error!(event = "config_error", error = %err);
            return Err(err.into());
        }
    };
    info!(
        event = "config_resolved",
        environment = ?config.environment,
        api = %config.api_base,
        push = config.push_url.as_ref().map(|url| url.as_str()).unwrap_or("-")
    );
    let api = ApiClient::new(&config)?;
    Ok((config, api))
}

fn run_companion() -> Result<()> {
    let stdin = io::stdin();
    let mut stdout = io::stdout();
    match companion::run_wizard(stdin.lock(), &mut stdout)? {
        Some(submission) => {
            info!(event = "companion_submitted", name = %submission.name);
            println!("{}", serde_json::to_string_pretty(&submission)?);
            Ok(())
        }
        None => anyhow::bail!("input ended before the companion was submitted"),
    }
}

async fn run_tui(
    config: &ClientConfig,
    api: ApiClient,
    log_limit: usize,
    live: bool,
) -> Result<()> {
    let (fetch_tx, mut fetch_rx) = mpsc::channel(FETCH_QUEUE_CAPACITY);
    let mut app = App::new(api, fetch_tx, log_limit);

    let (mut push, mut push_rx) = match config.push_config().filter(|_| live) {
        Some(push_config) => {
            let (mut client, rx) = PushClient::new(push_config);
            client.connect();
            (Some(client), Some(rx))
        }
        None => {
            info!(event = "push_disabled");
            app.push_enabled = false;
            (None, None)
        }
    };
    app.open_page(Page::Dashboard);

    let mut terminal = setup_terminal()?;
    let result = event_loop(&mut terminal, &mut app, &mut fetch_rx, &mut push_rx).await;
    restore_terminal(&mut terminal)?;

    if let Some(client) = push.as_mut() {
        client.disconnect().await;
    }
    result
}

async fn event_loop(
    terminal: &mut Terminal<CrosstermBackend<io::Stdout>>,
    app: &mut App,
    fetch_rx: &mut mpsc::Receiver<FetchOutcome>,
    push_rx: &mut Option<mpsc::Receiver<PushEvent>>,
) -> Result<()> {
    let mut events = EventStream::new();
    let mut redraw = tokio::time::interval(REDRAW_INTERVAL);

    loop {
        terminal.draw(|frame| ui::render(frame, app))?;
        tokio::select! {
            _ = redraw.tick() => {}
            Some(outcome) = fetch_rx.recv() => {
                app.apply_fetch(outcome);
            }
            Some(event) = next_push_event(push_rx) => {
                app.apply_push_event(event);
            }
            maybe_event = events.next() => match maybe_event {
                Some(Ok(Event::Key(key))) if key.kind == KeyEventKind::Press => {
                    if app.handle_key(key) {
                        break;
                    }
                }
                Some(Ok(_)) => {}
                Some(Err(err)) => return Err(err.into()),
                None => break,
            },
        }
    }
    Ok(())
}

async fn next_push_event(rx: &mut Option<mpsc::Receiver<PushEvent>>) -> Option<PushEvent> {
    match rx {
        Some(rx) => rx.recv().await,
        None => std::future::pending().await,
    }
}

fn setup_terminal() -> Result<Terminal<CrosstermBackend<io::Stdout>>> {
    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;
    terminal.clear()?;
    Ok(terminal)
}

fn restore_terminal(terminal: &mut Terminal<CrosstermBackend<io::Stdout>>) -> Result<()> {
    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
    terminal.show_cursor()?;
    Ok(())
}
