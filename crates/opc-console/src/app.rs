use crate::view::{fetch_page, Page, PageSnapshot, PageState};
use chrono::Utc;
use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};
use opc_client::{ApiClient, ConnectionState, PushEvent};
use opc_core::{ActivityFeed, MessageKind};
use tokio::sync::mpsc;
use tracing::{debug, warn};

#[derive(Debug)]
pub struct FetchOutcome {
    pub page: Page,
    pub generation: u64,
    pub result: Result<PageSnapshot, String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputMode {
    Normal,
    Search,
}

pub struct App {
    api: ApiClient,
    fetch_tx: mpsc::Sender<FetchOutcome>,
    log_limit: usize,
    next_generation: u64,
    pub page: PageState,
    pub connection: ConnectionState,
    pub push_enabled: bool,
    pub last_kind: Option<MessageKind>,
    pub feed: ActivityFeed,
    pub input: InputMode,
    pub help_open: bool,
    pub status_note: Option<String>,
}

impl App {
    pub fn new(api: ApiClient, fetch_tx: mpsc::Sender<FetchOutcome>, log_limit: usize) -> Self {
        Self {
            api,
            fetch_tx,
            log_limit,
            next_generation: 1,
            page: PageState::new(Page::Dashboard, 0),
            connection: ConnectionState::Disconnected,
            push_enabled: true,
            last_kind: None,
            feed: ActivityFeed::default(),
            input: InputMode::Normal,
            help_open: false,
            status_note: None,
        }
    }

    /// Replaces the current page. The old page state is dropped, which aborts
    /// its fetch and discards its overlay.
    pub fn open_page(&mut self, page: Page) {
        self.page = PageState::new(page, 0);
        self.input = InputMode::Normal;
        self.refresh();
    }

    pub fn refresh(&mut self) {
        let generation = self.next_generation;
        self.next_generation += 1;
        let page = self.page.page;
        let api = self.api.clone();
        let tx = self.fetch_tx.clone();
        let log_limit = self.log_limit;
        let handle = tokio::spawn(async move {
            let result = fetch_page(&api, page, log_limit)
                .await
                .map_err(|err| err.to_string());
            let _ = tx
                .send(FetchOutcome {
                    page,
                    generation,
                    result,
                })
                .await;
        });
        self.page.track_fetch(generation, handle);
    }

    pub fn apply_fetch(&mut self, outcome: FetchOutcome) {
        if outcome.page != self.page.page || outcome.generation != self.page.generation {
            debug!(
                event = "stale_fetch_dropped",
                page = outcome.page.title(),
                generation = outcome.generation
            );
            return;
        }
        match outcome.result {
            Ok(snapshot) => {
                self.page.apply_snapshot(snapshot);
                self.clamp_selection();
            }
            Err(err) => {
                warn!(event = "snapshot_fetch_failed", page = outcome.page.title(), error = %err);
                self.page.fail(err);
            }
        }
    }

    pub fn apply_push_event(&mut self, event: PushEvent) {
        match event {
            PushEvent::Connected => {
                self.connection = ConnectionState::Connected;
                self.status_note = None;
            }
            PushEvent::Disconnected => {
                self.connection = ConnectionState::Disconnected;
            }
            PushEvent::Message(message) => {
                self.last_kind = Some(message.kind());
                self.feed.push(&message, Utc::now());
                self.page.ingest(&message);
                self.clamp_selection();
            }
            PushEvent::Error(err) => {
                self.status_note = Some(err);
            }
        }
    }

    /// Returns true when the console should exit.
    pub fn handle_key(&mut self, key: KeyEvent) -> bool {
        if key.modifiers.contains(KeyModifiers::CONTROL) && key.code == KeyCode::Char('c') {
            return true;
        }
        if self.input == InputMode::Search {
            self.handle_search_key(key);
            return false;
        }
        if matches!(key.code, KeyCode::Char('?') | KeyCode::F(1)) {
            self.help_open = !self.help_open;
            return false;
        }
        if key.code == KeyCode::Esc && self.help_open {
            self.help_open = false;
            return false;
        }

        match key.code {
            KeyCode::Char('q') => return true,
            KeyCode::Tab => self.open_page(self.page.page.next()),
            KeyCode::BackTab => self.open_page(self.page.page.prev()),
            KeyCode::Char(c @ '1'..='7') => {
                let idx = (c as usize) - ('1' as usize);
                if Page::ALL[idx] != self.page.page {
                    self.open_page(Page::ALL[idx]);
                }
            }
            KeyCode::Char('/') => {
                if self.page.filter().is_some() {
                    self.input = InputMode::Search;
                }
            }
            KeyCode::Char('c') => self.page.cycle_category(),
            KeyCode::Char('s') => self.page.cycle_sort(),
            KeyCode::Char('r') => self.refresh(),
            KeyCode::Esc => {
                if let Some(filter) = self.page.filter_mut() {
                    filter.query.clear();
                    filter.category = None;
                }
                self.page.selected = 0;
            }
            KeyCode::Down | KeyCode::Char('j') => self.move_selection(1),
            KeyCode::Up | KeyCode::Char('k') => self.move_selection(-1),
            _ => {}
        }
        false
    }

    fn handle_search_key(&mut self, key: KeyEvent) {
        match key.code {
            KeyCode::Enter | KeyCode::Esc => self.input = InputMode::Normal,
            KeyCode::Backspace => {
                if let Some(filter) = self.page.filter_mut() {
                    filter.query.pop();
                }
            }
            KeyCode::Char(c) => {
                if let Some(filter) = self.page.filter_mut() {
                    filter.query.push(c);
                }
            }
            _ => {}
        }
        self.page.selected = 0;
    }

    fn move_selection(&mut self, delta: isize) {
        let rows = self.page.row_count();
        if rows == 0 {
            self.page.selected = 0;
            return;
        }
        let next = self.page.selected as isize + delta;
        self.page.selected = next.clamp(0, rows as isize - 1) as usize;
    }

    fn clamp_selection(&mut self) {
        let rows = self.page.row_count();
        if self.page.selected >= rows {
            self.page.selected = rows.saturating_sub(1);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::view::{LoadStatus, PageData};
    use opc_client::{ApiBase, ClientConfig, Environment};
    use opc_core::{Issue, IssueState, PushMessage};
    use std::time::Duration;

    fn app() -> (App, mpsc::Receiver<FetchOutcome>) {
        let config = ClientConfig {
            environment: Environment::Production,
            api_base: ApiBase::Relative("/api".to_string()),
            push_url: None,
            reconnect: false,
            reconnect_delay: Duration::from_millis(100),
            http_timeout: Duration::from_secs(1),
        };
        let (tx, rx) = mpsc::channel(16);
        (App::new(ApiClient::new(&config).unwrap(), tx, 50), rx)
    }

    fn key(code: KeyCode) -> KeyEvent {
        KeyEvent::new(code, KeyModifiers::NONE)
    }

    fn issue(number: u64, title: &str) -> Issue {
        Issue {
            number,
            title: title.to_string(),
            state: IssueState::Open,
            labels: Vec::new(),
            author: "ren".to_string(),
            assignee: None,
            created_at: "2026-03-01T09:00:00Z".parse().unwrap(),
            updated_at: "2026-03-01T09:00:00Z".parse().unwrap(),
        }
    }

    fn issue_rows(app: &App) -> Vec<Issue> {
        match &app.page.data {
            PageData::Issues(view) => view.rows(),
            _ => panic!("expected issues page"),
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn fetch_failure_is_shown_on_the_page() {
        let (mut app, mut rx) = app();
        app.refresh();
        let outcome = tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .unwrap()
            .unwrap();
        app.apply_fetch(outcome);
        assert!(matches!(app.page.status, LoadStatus::Failed(ref err) if err.contains("relative")));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn outcome_for_a_previous_page_is_ignored() {
        let (mut app, _rx) = app();
        app.open_page(Page::Issues);
        let stale_generation = app.page.generation;
        app.open_page(Page::Prs);
        app.open_page(Page::Issues);

        app.apply_fetch(FetchOutcome {
            page: Page::Issues,
            generation: stale_generation,
            result: Ok(PageSnapshot::Issues(vec![issue(1, "stale")])),
        });
        assert_eq!(app.page.status, LoadStatus::Loading);

        let current = app.page.generation;
        app.apply_fetch(FetchOutcome {
            page: Page::Issues,
            generation: current,
            result: Ok(PageSnapshot::Issues(vec![issue(1, "fresh")])),
        });
        assert_eq!(app.page.status, LoadStatus::Loaded);
        assert_eq!(issue_rows(&app)[0].title, "fresh");
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn push_messages_update_rows_feed_and_header() {
        let (mut app, _rx) = app();
        app.open_page(Page::Issues);
        let generation = app.page.generation;
        app.apply_fetch(FetchOutcome {
            page: Page::Issues,
            generation,
            result: Ok(PageSnapshot::Issues(vec![issue(9, "Broken build")])),
        });

        app.apply_push_event(PushEvent::Connected);
        app.apply_push_event(PushEvent::Message(
            PushMessage::parse(r#"{"type":"issue_update","issue_number":9,"state":"closed"}"#)
                .unwrap(),
        ));

        assert!(app.connection.is_connected());
        assert_eq!(app.last_kind, Some(MessageKind::IssueUpdate));
        assert_eq!(app.feed.len(), 1);
        let rows = issue_rows(&app);
        assert_eq!(rows[0].state, IssueState::Closed);
        assert_eq!(rows[0].title, "Broken build");

        app.open_page(Page::Prs);
        app.open_page(Page::Issues);
        let generation = app.page.generation;
        app.apply_fetch(FetchOutcome {
            page: Page::Issues,
            generation,
            result: Ok(PageSnapshot::Issues(vec![issue(9, "Broken build")])),
        });
        assert_eq!(issue_rows(&app)[0].state, IssueState::Open);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn search_mode_edits_the_page_filter() {
        let (mut app, _rx) = app();
        app.open_page(Page::Issues);
        let generation = app.page.generation;
        app.apply_fetch(FetchOutcome {
            page: Page::Issues,
            generation,
            result: Ok(PageSnapshot::Issues(vec![
                issue(1, "Login timeout"),
                issue(2, "Docs typo"),
            ])),
        });

        assert!(!app.handle_key(key(KeyCode::Char('/'))));
        for c in "typox".chars() {
            app.handle_key(key(KeyCode::Char(c)));
        }
        app.handle_key(key(KeyCode::Backspace));
        app.handle_key(key(KeyCode::Enter));
        assert_eq!(app.input, InputMode::Normal);
        assert_eq!(issue_rows(&app).len(), 1);

        app.handle_key(key(KeyCode::Esc));
        assert_eq!(issue_rows(&app).len(), 2);
        assert!(app.handle_key(key(KeyCode::Char('q'))));
    }
}
