#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]

// Query subscriptions follow application state: switching screens or months
// mounts and unmounts observers, and unmounted queries stop fetching

mod common;

use std::sync::{Arc, Mutex};

use common::{Staff, api, lazy_days_server, test_client};
use querent::http::{Method, MockTransport};
use querent::prelude::*;
use ratatui::{Frame, Terminal, backend::TestBackend};
use serde_json::{Value, json};
use tokio::time::{Duration, sleep, timeout};

#[derive(Clone)]
struct Flags {
    client: QueryClient,
    transport: MockTransport,
    log: Arc<Mutex<Vec<String>>>,
}

impl Flags {
    fn new() -> Self {
        Self {
            client: test_client(),
            transport: lazy_days_server(),
            log: Arc::new(Mutex::new(Vec::new())),
        }
    }

    fn record(&self, entry: String) {
        self.log.lock().unwrap().push(entry);
    }

    fn subscribers(&self, key: &QueryKey) -> usize {
        self.client
            .get_query_state(key)
            .map_or(0, |state| state.subscriber_count)
    }

    fn log(&self) -> Vec<String> {
        self.log.lock().unwrap().clone()
    }
}

async fn run<A: Application>(flags: A::Flags) {
    let backend = TestBackend::new(80, 24);
    let mut terminal = Terminal::new(backend).unwrap();
    let runtime = Runtime::<A>::new(flags);
    let result = timeout(Duration::from_secs(2), runtime.run(&mut terminal, 60)).await;

    assert!(result.is_ok(), "Runtime should quit");
    assert!(result.unwrap().is_ok());
}

fn settle<Msg: Send + 'static>(msg: Msg) -> Command<Msg> {
    Command::future(async move {
        sleep(Duration::from_millis(20)).await;
        msg
    })
}

#[tokio::test]
async fn test_switching_screens_moves_observers() {
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    enum Screen {
        Treatments,
        Staff,
        Home,
    }

    struct Spa {
        flags: Flags,
        screen: Screen,
    }

    enum Msg {
        Treatments(QueryResult<Arc<Value>>),
        Staff(QueryResult<Arc<Vec<Staff>>>),
        Check,
    }

    impl Application for Spa {
        type Message = Msg;
        type Flags = Flags;

        fn new(flags: Flags) -> (Self, Command<Msg>) {
            let screen = Screen::Treatments;
            (Spa { flags, screen }, Command::none())
        }

        fn update(&mut self, msg: Msg) -> Command<Msg> {
            match msg {
                Msg::Treatments(result) if result.is_success() => {
                    self.screen = Screen::Staff;
                    settle(Msg::Check)
                }
                Msg::Staff(result) if result.is_success() => {
                    self.screen = Screen::Home;
                    settle(Msg::Check)
                }
                Msg::Treatments(_) | Msg::Staff(_) => Command::none(),
                Msg::Check => {
                    let treatments = self.flags.subscribers(&query_key!["treatments"]);
                    let staff = self.flags.subscribers(&query_key!["staff"]);
                    self.flags
                        .record(format!("{:?}: treatments={treatments} staff={staff}", self.screen));
                    if self.screen == Screen::Home {
                        Command::effect(Action::Quit)
                    } else {
                        Command::none()
                    }
                }
            }
        }

        fn view(&self, _frame: &mut Frame<'_>) {}

        fn subscriptions(&self) -> Vec<Subscription<Msg>> {
            let client = self.flags.client.clone();
            let api = api(&self.flags.transport);
            match self.screen {
                Screen::Treatments => vec![
                    Subscription::new(Query::new(
                        query_key!["treatments"],
                        move || api.get::<Value>("/treatments"),
                        client,
                    ))
                    .map(Msg::Treatments),
                ],
                Screen::Staff => vec![
                    Subscription::new(Query::new(
                        query_key!["staff"],
                        move || api.get::<Vec<Staff>>("/staff"),
                        client,
                    ))
                    .map(Msg::Staff),
                ],
                Screen::Home => vec![],
            }
        }
    }

    let flags = Flags::new();
    run::<Spa>(flags.clone()).await;

    // The staff screen may load before the first check runs; only the
    // final state is timing independent
    let log = flags.log();
    assert_eq!(
        log.last().map(String::as_str),
        Some("Home: treatments=0 staff=0")
    );
    assert_eq!(flags.transport.calls(Method::Get, "/treatments"), 1);
    assert_eq!(flags.transport.calls(Method::Get, "/staff"), 1);

    // Both entries stay cached for their gc time
    assert!(flags.client.get_query_state(&query_key!["treatments"]).is_some());
    assert!(flags.client.get_query_state(&query_key!["staff"]).is_some());
}

#[tokio::test]
async fn test_month_subscription_follows_state() {
    struct Calendar {
        flags: Flags,
        month: u32,
        visits: u32,
    }

    enum Msg {
        Appointments(u32, QueryResult<Arc<Value>>),
    }

    impl Application for Calendar {
        type Message = Msg;
        type Flags = Flags;

        fn new(flags: Flags) -> (Self, Command<Msg>) {
            let calendar = Calendar {
                flags,
                month: 1,
                visits: 0,
            };
            (calendar, Command::none())
        }

        fn update(&mut self, msg: Msg) -> Command<Msg> {
            match msg {
                Msg::Appointments(month, result) if month == self.month && result.is_success() => {
                    self.visits += 1;
                    self.flags.record(format!("month {month}"));
                    // January, February, then back to January
                    match self.visits {
                        1 => self.month = 2,
                        2 => self.month = 1,
                        _ => return Command::effect(Action::Quit),
                    }
                    Command::none()
                }
                Msg::Appointments(..) => Command::none(),
            }
        }

        fn view(&self, _frame: &mut Frame<'_>) {}

        fn subscriptions(&self) -> Vec<Subscription<Msg>> {
            let month = self.month;
            let api = api(&self.flags.transport);
            vec![
                Subscription::new(Query::new(
                    query_key!["appointments", 2024, month],
                    move || api.get::<Value>(format!("/appointments/2024/{month}")),
                    self.flags.client.clone(),
                ))
                .map(move |result| Msg::Appointments(month, result)),
            ]
        }
    }

    let flags = Flags::new();
    for month in 1..=2 {
        flags.transport.respond(
            Method::Get,
            &format!("/appointments/2024/{month}"),
            200,
            json!([{"id": month, "day": 3}]),
        );
    }
    run::<Calendar>(flags.clone()).await;

    assert_eq!(flags.log(), vec!["month 1", "month 2", "month 1"]);
    // Returning to a fresh month is served from the cache
    assert_eq!(flags.transport.calls(Method::Get, "/appointments/2024/1"), 1);
    assert_eq!(flags.transport.calls(Method::Get, "/appointments/2024/2"), 1);
}

#[tokio::test]
async fn test_polling_stops_when_unmounted() {
    struct Poller {
        flags: Flags,
        polling: bool,
        updates: Vec<tokio::time::Instant>,
    }

    enum Msg {
        Staff(QueryResult<Arc<Vec<Staff>>>),
    }

    impl Application for Poller {
        type Message = Msg;
        type Flags = Flags;

        fn new(flags: Flags) -> (Self, Command<Msg>) {
            let poller = Poller {
                flags,
                polling: true,
                updates: Vec::new(),
            };
            (poller, Command::none())
        }

        fn update(&mut self, msg: Msg) -> Command<Msg> {
            let Msg::Staff(result) = msg;
            if let Some(updated_at) = result.updated_at {
                if !self.updates.contains(&updated_at) {
                    self.updates.push(updated_at);
                }
            }
            if self.updates.len() >= 3 {
                self.polling = false;
                return Command::effect(Action::Quit);
            }
            Command::none()
        }

        fn view(&self, _frame: &mut Frame<'_>) {}

        fn subscriptions(&self) -> Vec<Subscription<Msg>> {
            if !self.polling {
                return vec![];
            }
            let api = api(&self.flags.transport);
            vec![
                Subscription::new(
                    Query::new(
                        query_key!["staff"],
                        move || api.get::<Vec<Staff>>("/staff"),
                        self.flags.client.clone(),
                    )
                    .with_options(QueryOptions::new().refetch_interval(Duration::from_millis(30))),
                )
                .map(Msg::Staff),
            ]
        }
    }

    let flags = Flags::new();
    run::<Poller>(flags.clone()).await;

    let polled = flags.transport.calls(Method::Get, "/staff");
    assert!(polled >= 3, "expected at least 3 fetches, got {polled}");

    sleep(Duration::from_millis(150)).await;
    assert_eq!(
        flags.transport.calls(Method::Get, "/staff"),
        polled,
        "no polling after unmount"
    );
}

#[tokio::test]
async fn test_query_subscription_unmounts_observer() {
    // A Query subscription that stops being returned releases its cache entry
    struct StaffScreen {
        flags: Flags,
        mounted: bool,
    }

    enum Msg {
        Staff(QueryResult<Arc<Vec<Staff>>>),
        Check,
    }

    impl Application for StaffScreen {
        type Message = Msg;
        type Flags = Flags;

        fn new(flags: Flags) -> (Self, Command<Msg>) {
            (
                StaffScreen {
                    flags,
                    mounted: true,
                },
                Command::none(),
            )
        }

        fn update(&mut self, msg: Msg) -> Command<Msg> {
            match msg {
                Msg::Staff(result) if result.is_success() => {
                    self.mounted = false;
                    settle(Msg::Check)
                }
                Msg::Staff(_) => Command::none(),
                Msg::Check => {
                    let count = self.flags.subscribers(&query_key!["staff"]);
                    self.flags.record(format!("subscribers={count}"));
                    Command::effect(Action::Quit)
                }
            }
        }

        fn view(&self, _frame: &mut Frame<'_>) {}

        fn subscriptions(&self) -> Vec<Subscription<Msg>> {
            if !self.mounted {
                return vec![];
            }
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

    let flags = Flags::new();
    run::<StaffScreen>(flags.clone()).await;

    assert_eq!(flags.log(), vec!["subscribers=0"]);
    assert_eq!(flags.transport.total_calls(), 1);
    assert!(
        flags
            .client
            .get_query_data::<Vec<Staff>>(&query_key!["staff"])
            .is_some()
    );
}
