#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]

// Integration tests for Runtime::run
// These tests drive whole applications against the mock server.
// Unit tests for individual methods are in src/runtime.rs

mod common;

use std::sync::Arc;

use common::{Staff, Ticker, Treatment, api, lazy_days_server, test_client};
use querent::http::{Method, MockTransport};
use querent::prelude::*;
use ratatui::widgets::Paragraph;
use ratatui::{Frame, Terminal, backend::TestBackend};
use serde_json::Value;
use tokio::time::{Duration, timeout};

#[derive(Clone)]
struct Flags {
    client: QueryClient,
    transport: MockTransport,
}

impl Flags {
    fn new() -> Self {
        Self {
            client: test_client(),
            transport: lazy_days_server(),
        }
    }
}

fn screen_text(terminal: &Terminal<TestBackend>) -> String {
    terminal
        .backend()
        .buffer()
        .content()
        .iter()
        .map(|cell| cell.symbol())
        .collect()
}

// Helper: calendar that quits after paging through `months` months
struct Calendar {
    month: u32,
    months: u32,
}

#[derive(Debug, Clone)]
enum CalendarMessage {
    #[allow(dead_code)]
    NextMonth,
}

impl Application for Calendar {
    type Message = CalendarMessage;
    type Flags = u32;

    fn new(months: u32) -> (Self, Command<Self::Message>) {
        let cmd = if months == 0 {
            Command::effect(Action::Quit)
        } else {
            Command::none()
        };
        (Calendar { month: 0, months }, cmd)
    }

    fn update(&mut self, msg: Self::Message) -> Command<Self::Message> {
        match msg {
            CalendarMessage::NextMonth => {
                self.month += 1;
                if self.month >= self.months {
                    Command::effect(Action::Quit)
                } else {
                    Command::none()
                }
            }
        }
    }

    fn view(&self, _frame: &mut Frame<'_>) {}

    fn subscriptions(&self) -> Vec<Subscription<Self::Message>> {
        vec![]
    }
}

#[tokio::test]
async fn test_runtime_run_quits_from_init() {
    let backend = TestBackend::new(80, 24);
    let mut terminal = Terminal::new(backend).unwrap();

    let runtime = Runtime::<Calendar>::new(0);

    let result = timeout(Duration::from_secs(1), runtime.run(&mut terminal, 60)).await;

    assert!(result.is_ok(), "Runtime should complete");
    assert!(result.unwrap().is_ok(), "Runtime should not error");
}

#[tokio::test]
async fn test_runtime_run_renders_query_data() {
    // Treatments are rendered once loaded; a ticker quits a few frames later
    struct Treatments {
        flags: Flags,
        treatments: QueryResult<Arc<Vec<Treatment>>>,
    }

    enum Msg {
        Treatments(QueryResult<Arc<Vec<Treatment>>>),
        Tick,
    }

    impl Application for Treatments {
        type Message = Msg;
        type Flags = Flags;

        fn new(flags: Flags) -> (Self, Command<Msg>) {
            let treatments = QueryResult::idle();
            (Treatments { flags, treatments }, Command::none())
        }

        fn update(&mut self, msg: Msg) -> Command<Msg> {
            match msg {
                Msg::Treatments(result) => {
                    self.treatments = result;
                    Command::none()
                }
                Msg::Tick if self.treatments.is_success() => Command::effect(Action::Quit),
                Msg::Tick => Command::none(),
            }
        }

        fn view(&self, frame: &mut Frame<'_>) {
            let text = match self.treatments.data() {
                Some(treatments) => treatments
                    .iter()
                    .map(|t| t.name.as_str())
                    .collect::<Vec<_>>()
                    .join(", "),
                None => "Loading...".to_string(),
            };
            frame.render_widget(Paragraph::new(text), frame.area());
        }

        fn subscriptions(&self) -> Vec<Subscription<Msg>> {
            let api = api(&self.flags.transport);
            vec![
                Subscription::new(Query::new(
                    query_key!["treatments"],
                    move || api.get::<Vec<Treatment>>("/treatments"),
                    self.flags.client.clone(),
                ))
                .map(Msg::Treatments),
                Subscription::new(Ticker::new(50)).map(|()| Msg::Tick),
            ]
        }
    }

    let backend = TestBackend::new(80, 24);
    let mut terminal = Terminal::new(backend).unwrap();

    let runtime = Runtime::<Treatments>::new(Flags::new());
    let result = timeout(Duration::from_secs(1), runtime.run(&mut terminal, 60)).await;

    assert!(result.is_ok());
    assert!(result.unwrap().is_ok());
    assert!(
        screen_text(&terminal).contains("massage, facial, scrub"),
        "treatments should be on screen"
    );
}

#[tokio::test]
async fn test_runtime_run_delivers_command_results() {
    // Three fetches run as init commands; their results arrive as messages
    struct Loader {
        received: Vec<String>,
    }

    impl Application for Loader {
        type Message = String;
        type Flags = Flags;

        fn new(flags: Flags) -> (Self, Command<String>) {
            let api = api(&flags.transport);
            let cmd = Command::batch(["/staff", "/treatments", "/user/1"].map(|path| {
                let client = flags.client.clone();
                let api = api.clone();
                Command::perform(
                    async move {
                        client
                            .fetch_query(
                                &query_key![path],
                                move || api.get::<Value>(path),
                                &QueryOptions::new(),
                            )
                            .await
                    },
                    move |result| match result {
                        Ok(_) => format!("{path} ok"),
                        Err(err) => format!("{path} failed: {err}"),
                    },
                )
            }));
            (Loader { received: vec![] }, cmd)
        }

        fn update(&mut self, msg: String) -> Command<String> {
            assert!(msg.ends_with(" ok"), "unexpected result {msg}");
            self.received.push(msg);
            if self.received.len() >= 3 {
                Command::effect(Action::Quit)
            } else {
                Command::none()
            }
        }

        fn view(&self, _frame: &mut Frame<'_>) {}

        fn subscriptions(&self) -> Vec<Subscription<String>> {
            vec![]
        }
    }

    let backend = TestBackend::new(80, 24);
    let mut terminal = Terminal::new(backend).unwrap();
    let flags = Flags::new();

    let runtime = Runtime::<Loader>::new(flags.clone());
    let result = timeout(Duration::from_secs(1), runtime.run(&mut terminal, 60)).await;

    assert!(result.is_ok());
    assert!(result.unwrap().is_ok());
    assert_eq!(flags.transport.total_calls(), 3);
}

#[tokio::test]
async fn test_runtime_run_invalidate_command_refetches_mounted_query() {
    // The first result triggers an invalidation; the refetched data quits
    struct StaffList {
        flags: Flags,
        loads: Vec<tokio::time::Instant>,
    }

    enum Msg {
        Staff(QueryResult<Arc<Vec<Staff>>>),
    }

    impl Application for StaffList {
        type Message = Msg;
        type Flags = Flags;

        fn new(flags: Flags) -> (Self, Command<Msg>) {
            (StaffList { flags, loads: vec![] }, Command::none())
        }

        fn update(&mut self, msg: Msg) -> Command<Msg> {
            let Msg::Staff(result) = msg;
            let Some(updated_at) = result.updated_at else {
                return Command::none();
            };
            if self.loads.contains(&updated_at) {
                return Command::none();
            }
            self.loads.push(updated_at);
            match self.loads.len() {
                1 => self.flags.client.invalidate(&query_key!["staff"]),
                _ => Command::effect(Action::Quit),
            }
        }

        fn view(&self, _frame: &mut Frame<'_>) {}

        fn subscriptions(&self) -> Vec<Subscription<Msg>> {
            let api = api(&self.flags.transport);
            vec![
                Subscription::new(Query::new(
                    query_key!["staff"],
                    move || api.get::<Vec<Staff>>("/staff"),
                    self.flags.client.clone(),
                ))
                .map(Msg::Staff),
            ]
        }
    }

    let backend = TestBackend::new(80, 24);
    let mut terminal = Terminal::new(backend).unwrap();
    let flags = Flags::new();

    let runtime = Runtime::<StaffList>::new(flags.clone());
    let result = timeout(Duration::from_secs(1), runtime.run(&mut terminal, 60)).await;

    assert!(result.is_ok(), "Runtime should quit after the refetch");
    assert!(result.unwrap().is_ok());
    assert_eq!(flags.transport.calls(Method::Get, "/staff"), 2);
}
