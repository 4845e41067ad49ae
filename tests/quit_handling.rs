#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]

// Quitting must stay responsive while queries and mutations are in flight

mod common;

use common::{Staff, api, lazy_days_server, test_client};
use querent::http::{Method, MockTransport, PatchOperation};
use querent::prelude::*;
use ratatui::backend::TestBackend;
use ratatui::{Frame, Terminal};
use serde_json::{Value, json};
use tokio::time::{Duration, Instant, sleep, timeout};

#[derive(Clone)]
struct Flags {
    client: QueryClient,
    transport: MockTransport,
}

fn flags(latency: Duration) -> Flags {
    Flags {
        client: test_client(),
        transport: lazy_days_server().with_latency(latency),
    }
}

// Quits from its init command while the staff query is still loading
struct QuitWhileLoading {
    client: QueryClient,
    api: ApiClient,
}

impl Application for QuitWhileLoading {
    type Message = ();
    type Flags = Flags;

    fn new(flags: Flags) -> (Self, Command<()>) {
        let app = Self {
            client: flags.client,
            api: api(&flags.transport),
        };
        (app, Command::effect(Action::Quit))
    }

    fn update(&mut self, _msg: ()) -> Command<()> {
        Command::none()
    }

    fn view(&self, _frame: &mut Frame<'_>) {}

    fn subscriptions(&self) -> Vec<Subscription<()>> {
        let api = self.api.clone();
        vec![
            Subscription::new(Query::new(
                query_key!["staff"],
                move || api.get::<Vec<Staff>>("/staff"),
                self.client.clone(),
            ))
            .map(|_| ()),
        ]
    }
}

#[tokio::test]
async fn test_quit_is_not_blocked_by_slow_query() {
    let backend = TestBackend::new(80, 24);
    let mut terminal = Terminal::new(backend).unwrap();
    let flags = flags(Duration::from_secs(5));
    let client = flags.client.clone();

    let runtime = Runtime::<QuitWhileLoading>::new(flags);

    let start = Instant::now();
    // 16 FPS is 62.5ms per frame
    let result = timeout(Duration::from_millis(500), runtime.run(&mut terminal, 16)).await;
    let elapsed = start.elapsed();

    assert!(result.is_ok(), "Runtime should quit within 500ms");
    assert!(result.unwrap().is_ok(), "Runtime should complete without error");
    println!("Quit with a pending query took: {elapsed:?}");
    assert!(
        elapsed < Duration::from_millis(300),
        "Should quit without waiting for the fetch"
    );

    // The stopped subscription releases its observer
    let key = query_key!["staff"];
    timeout(Duration::from_secs(1), async {
        while client
            .get_query_state(&key)
            .is_some_and(|s| s.subscriber_count > 0)
        {
            sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("observer released");
}

// Saves a profile, then quits once the mutation has settled
struct SaveAndQuit;

#[derive(Debug, Clone)]
enum SaveMessage {
    Saved(Result<Value, QueryError>),
}

impl Application for SaveAndQuit {
    type Message = SaveMessage;
    type Flags = Flags;

    fn new(flags: Flags) -> (Self, Command<SaveMessage>) {
        let api = api(&flags.transport);
        let save = flags
            .client
            .mutation(move |name: String| {
                api.patch::<Value>("/user/1", vec![PatchOperation::replace("/name", json!(name))])
            })
            .with_key(query_key!["patch-user"]);
        let cmd = save.mutate("Anne".to_string()).map(SaveMessage::Saved);
        (Self, cmd)
    }

    fn update(&mut self, msg: SaveMessage) -> Command<SaveMessage> {
        match msg {
            SaveMessage::Saved(result) => {
                let name = result.map(|user| user["user"]["name"].clone());
                assert_eq!(name, Ok(json!("Anne")));
                Command::effect(Action::Quit)
            }
        }
    }

    fn view(&self, _frame: &mut Frame<'_>) {}

    fn subscriptions(&self) -> Vec<Subscription<SaveMessage>> {
        vec![]
    }
}

#[tokio::test]
async fn test_quit_after_mutation_settles() {
    let backend = TestBackend::new(80, 24);
    let mut terminal = Terminal::new(backend).unwrap();
    let flags = flags(Duration::from_millis(50));
    flags
        .transport
        .respond(Method::Patch, "/user/1", 200, json!({"user": {"name": "Anne"}}));
    let transport = flags.transport.clone();

    let runtime = Runtime::<SaveAndQuit>::new(flags);

    let start = Instant::now();
    // 10 FPS is 100ms per frame
    let result = timeout(Duration::from_millis(500), runtime.run(&mut terminal, 10)).await;
    let elapsed = start.elapsed();

    assert!(result.is_ok(), "Runtime should quit within 500ms");
    assert!(result.unwrap().is_ok(), "Runtime should complete without error");
    println!("Quit after mutation took: {elapsed:?}");
    assert!(
        elapsed < Duration::from_millis(300),
        "Should quit as soon as the mutation settles, not on a frame boundary"
    );
    assert_eq!(transport.calls(Method::Patch, "/user/1"), 1);
}

// Prefetches several keys as init commands, then quits once all have landed
struct PrefetchThenQuit {
    loaded: u32,
}

#[derive(Debug, Clone)]
enum PrefetchMessage {
    Loaded,
}

impl Application for PrefetchThenQuit {
    type Message = PrefetchMessage;
    type Flags = Flags;

    fn new(flags: Flags) -> (Self, Command<PrefetchMessage>) {
        let api = api(&flags.transport);
        let commands = ["/staff", "/treatments", "/user/1"].map(|path| {
            let client = flags.client.clone();
            let api = api.clone();
            Command::perform(
                async move {
                    client
                        .prefetch_query(
                            &query_key![path],
                            move || api.get::<Value>(path),
                            &QueryOptions::new(),
                        )
                        .await;
                },
                |()| PrefetchMessage::Loaded,
            )
        });
        (Self { loaded: 0 }, Command::batch(commands))
    }

    fn update(&mut self, msg: PrefetchMessage) -> Command<PrefetchMessage> {
        match msg {
            PrefetchMessage::Loaded => {
                self.loaded += 1;
                if self.loaded == 3 {
                    Command::effect(Action::Quit)
                } else {
                    Command::none()
                }
            }
        }
    }

    fn view(&self, _frame: &mut Frame<'_>) {}

    fn subscriptions(&self) -> Vec<Subscription<PrefetchMessage>> {
        vec![]
    }
}

#[tokio::test]
async fn test_quit_after_prefetches() {
    let backend = TestBackend::new(80, 24);
    let mut terminal = Terminal::new(backend).unwrap();
    let flags = flags(Duration::from_millis(20));
    let client = flags.client.clone();
    let transport = flags.transport.clone();

    let runtime = Runtime::<PrefetchThenQuit>::new(flags);

    let start = Instant::now();
    let result = timeout(Duration::from_millis(500), runtime.run(&mut terminal, 60)).await;
    let elapsed = start.elapsed();

    assert!(result.is_ok(), "Runtime should quit within 500ms");
    assert!(result.unwrap().is_ok(), "Runtime should complete without error");
    println!("Quit after prefetches took: {elapsed:?}");
    assert!(elapsed < Duration::from_millis(300));

    assert_eq!(transport.total_calls(), 3);
    let staff = client
        .get_query_data::<Value>(&query_key!["/staff"])
        .expect("staff prefetched");
    assert_eq!(staff.as_array().map(Vec::len), Some(4));
}
