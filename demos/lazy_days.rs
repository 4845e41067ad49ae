//! Lazy Days Spa: a booking client built on the query cache.
//!
//! This example shows:
//! - Query subscriptions for treatments, staff, appointments and the signed-in user
//! - A memoized staff filter that never refetches
//! - Month navigation with prefetching of the next month and polling
//! - A PATCH mutation that invalidates the user queries when it settles
//! - De-duplicated error notifications shown as a toast
//! - Refetching stale data when the terminal regains focus
//!
//! By default the data comes from in-process fixtures. Point `LAZY_DAYS_API`
//! at a lazy-days server to use it instead. Logs go to `lazy_days.log` in the
//! temp directory; set `RUST_LOG` to change the level.
//!
//! Run with: `cargo run --example lazy_days`

use std::hash::{DefaultHasher, Hash, Hasher};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use color_eyre::Result;
use crossterm::event::{DisableFocusChange, EnableFocusChange, Event, KeyCode, KeyEventKind};
use futures::stream::{self, BoxStream};
use futures::{FutureExt, StreamExt};
use querent::http::patch::diff;
use querent::http::{Method, MockTransport, Response};
use querent::prelude::*;
use querent::query::{ChannelSink, ErrorNotifier, Memoized, Notification, USER, user_key};
use querent::subscription::terminal::TerminalEvents;
use querent::subscription::{SubscriptionId, SubscriptionSource};
use ratatui::prelude::*;
use ratatui::widgets::{Block, Borders, List, ListItem, Paragraph, Tabs};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio::sync::mpsc;
use tokio_stream::wrappers::UnboundedReceiverStream;
use tracing_subscriber::EnvFilter;

const FIRST_MONTH: (i32, u32) = (2025, 1);
const TREATMENT_FILTERS: [&str; 4] = ["all", "massage", "facial", "scrub"];

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
struct Treatment {
    id: i64,
    name: String,
    description: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
struct Staff {
    id: i64,
    name: String,
    #[serde(rename = "treatmentNames")]
    treatment_names: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
struct Appointment {
    id: i64,
    day: u32,
    treatment: String,
    #[serde(rename = "userId")]
    user_id: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
struct User {
    id: i64,
    name: String,
    email: String,
}

#[derive(Debug, Deserialize)]
struct UserResponse {
    user: User,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Screen {
    Treatments,
    Staff,
    Calendar,
    Profile,
}

impl Screen {
    const ALL: [Self; 4] = [Self::Treatments, Self::Staff, Self::Calendar, Self::Profile];

    const fn title(self) -> &'static str {
        match self {
            Self::Treatments => "Treatments",
            Self::Staff => "Staff",
            Self::Calendar => "Calendar",
            Self::Profile => "Profile",
        }
    }

    fn next(self) -> Self {
        let index = Self::ALL.iter().position(|s| *s == self).unwrap_or(0);
        Self::ALL[(index + 1) % Self::ALL.len()]
    }
}

#[derive(Debug, Clone)]
enum Message {
    Terminal(Event),
    Treatments(QueryResult<Arc<Vec<Treatment>>>),
    Staff(QueryResult<Arc<Vec<Staff>>>),
    Appointments(QueryResult<Arc<Vec<Appointment>>>),
    User(QueryResult<Arc<User>>),
    UserSaved(Result<User, QueryError>),
    Toast(Notification),
}

/// Everything the app needs from outside: the cache, the API and the
/// notification receiver the cache's notifier feeds.
#[derive(Clone)]
struct Flags {
    client: QueryClient,
    api: ApiClient,
    toasts: Toasts,
}

struct LazyDays {
    client: QueryClient,
    api: ApiClient,
    toasts: Toasts,
    save_user: Mutation<(User, User), User>,

    screen: Screen,
    treatments: QueryResult<Arc<Vec<Treatment>>>,
    staff: QueryResult<Arc<Vec<Staff>>>,
    staff_filter: usize,
    staff_by_treatment: Memoized<Vec<Staff>, String, Vec<Staff>>,
    month: (i32, u32),
    appointments: QueryResult<Arc<Vec<Appointment>>>,
    user: QueryResult<Arc<User>>,
    name_input: String,
    status: String,
    toast: Option<Notification>,
}

impl Application for LazyDays {
    type Message = Message;
    type Flags = Flags;

    fn new(flags: Flags) -> (Self, Command<Message>) {
        let save_user = user_mutation(&flags.client, &flags.api);
        let app = Self {
            client: flags.client,
            api: flags.api,
            toasts: flags.toasts,
            save_user,
            screen: Screen::Treatments,
            treatments: QueryResult::idle(),
            staff: QueryResult::idle(),
            staff_filter: 0,
            staff_by_treatment: Memoized::new(|staff: &Vec<Staff>, filter: &String| {
                staff
                    .iter()
                    .filter(|s| filter == "all" || s.treatment_names.contains(filter))
                    .cloned()
                    .collect()
            }),
            month: FIRST_MONTH,
            appointments: QueryResult::idle(),
            user: QueryResult::idle(),
            name_input: String::new(),
            status: "Tab: switch screen, q: quit".to_string(),
            toast: None,
        };
        let prefetch = app.prefetch_month(next_month(FIRST_MONTH));
        (app, prefetch)
    }

    fn update(&mut self, msg: Message) -> Command<Message> {
        match msg {
            Message::Terminal(event) => {
                if self.client.handle_terminal_event(&event) {
                    return Command::none();
                }
                match event {
                    Event::Key(key) if key.kind == KeyEventKind::Press => self.on_key(key.code),
                    _ => Command::none(),
                }
            }
            Message::Treatments(result) => {
                self.treatments = result;
                Command::none()
            }
            Message::Staff(result) => {
                self.staff = result;
                Command::none()
            }
            Message::Appointments(result) => {
                self.appointments = result;
                Command::none()
            }
            Message::User(result) => {
                if self.name_input.is_empty() {
                    if let Some(user) = result.data() {
                        self.name_input.clone_from(&user.name);
                    }
                }
                self.user = result;
                Command::none()
            }
            Message::UserSaved(Ok(user)) => {
                self.status = format!("Saved profile for {}", user.name);
                Command::none()
            }
            Message::UserSaved(Err(err)) => {
                self.status = format!("Could not save profile: {}", err.message());
                Command::none()
            }
            Message::Toast(notification) => {
                self.toast = Some(notification);
                Command::none()
            }
        }
    }

    fn view(&self, frame: &mut Frame<'_>) {
        let chunks = Layout::default()
            .direction(Direction::Vertical)
            .constraints([
                Constraint::Length(3),
                Constraint::Min(1),
                Constraint::Length(3),
            ])
            .split(frame.area());

        let titles: Vec<&str> = Screen::ALL.iter().map(|s| s.title()).collect();
        let selected = Screen::ALL.iter().position(|s| *s == self.screen).unwrap_or(0);
        let tabs = Tabs::new(titles)
            .select(selected)
            .highlight_style(Style::default().fg(Color::Yellow))
            .block(Block::default().borders(Borders::ALL).title("Lazy Days Spa"));
        frame.render_widget(tabs, chunks[0]);

        match self.screen {
            Screen::Treatments => self.render_treatments(frame, chunks[1]),
            Screen::Staff => self.render_staff(frame, chunks[1]),
            Screen::Calendar => self.render_calendar(frame, chunks[1]),
            Screen::Profile => self.render_profile(frame, chunks[1]),
        }

        let footer = match &self.toast {
            Some(toast) => Paragraph::new(toast.title.as_str())
                .style(Style::default().fg(Color::Red))
                .block(Block::default().borders(Borders::ALL).title("Error (x: dismiss)")),
            None => Paragraph::new(self.status.as_str())
                .block(Block::default().borders(Borders::ALL).title("Status")),
        };
        frame.render_widget(footer, chunks[2]);
    }

    fn subscriptions(&self) -> Vec<Subscription<Message>> {
        let mut subscriptions = vec![
            Subscription::new(TerminalEvents::new()).map(Message::Terminal),
            Subscription::new(self.toasts.clone()).map(Message::Toast),
        ];

        // Only the queries the current screen shows are observed, so the
        // others become inactive and are collected after their gc time.
        match self.screen {
            Screen::Treatments => {
                let api = self.api.clone();
                subscriptions.push(
                    Subscription::new(Query::new(
                        query_key!["treatments"],
                        move || api.get::<Vec<Treatment>>("/treatments"),
                        self.client.clone(),
                    ))
                    .map(Message::Treatments),
                );
            }
            Screen::Staff => {
                let api = self.api.clone();
                subscriptions.push(
                    Subscription::new(Query::new(
                        query_key!["staff"],
                        move || api.get::<Vec<Staff>>("/staff"),
                        self.client.clone(),
                    ))
                    .map(Message::Staff),
                );
            }
            Screen::Calendar => {
                subscriptions.push(
                    Subscription::new(
                        Query::new(
                            appointments_key(self.month),
                            appointments_fetcher(&self.api, self.month),
                            self.client.clone(),
                        )
                        .with_options(appointment_options()),
                    )
                    .map(Message::Appointments),
                );
            }
            Screen::Profile => {
                subscriptions.push(
                    Subscription::new(Query::new(user_key(Some(1)), user_fetcher(&self.api), self.client.clone()))
                        .map(Message::User),
                );
            }
        }
        subscriptions
    }
}

impl LazyDays {
    fn on_key(&mut self, code: KeyCode) -> Command<Message> {
        match (self.screen, code) {
            (_, KeyCode::Tab) => {
                self.screen = self.screen.next();
                self.client.notifier().reset();
                self.toast = None;
                Command::none()
            }
            (_, KeyCode::Char('x')) if self.toast.is_some() => {
                if let Some(toast) = self.toast.take() {
                    self.client.notifier().dismiss(&toast.id);
                }
                Command::none()
            }
            (Screen::Profile, KeyCode::Char(c)) => {
                self.name_input.push(c);
                Command::none()
            }
            (Screen::Profile, KeyCode::Backspace) => {
                self.name_input.pop();
                Command::none()
            }
            (Screen::Profile, KeyCode::Enter) => self.save_profile(),
            (Screen::Profile, KeyCode::Esc) | (_, KeyCode::Char('q')) => Command::effect(Action::Quit),
            (_, KeyCode::Char('r')) => self.client.invalidate(&query_key![]),
            (Screen::Staff, KeyCode::Char('f')) => {
                self.staff_filter = (self.staff_filter + 1) % TREATMENT_FILTERS.len();
                Command::none()
            }
            (Screen::Calendar, KeyCode::Right) => {
                self.month = next_month(self.month);
                self.appointments = QueryResult::idle();
                self.prefetch_month(next_month(self.month))
            }
            (Screen::Calendar, KeyCode::Left) => {
                self.month = previous_month(self.month);
                self.appointments = QueryResult::idle();
                Command::none()
            }
            _ => Command::none(),
        }
    }

    fn prefetch_month(&self, month: (i32, u32)) -> Command<Message> {
        self.client.prefetch(
            &appointments_key(month),
            appointments_fetcher(&self.api, month),
            &appointment_options(),
        )
    }

    fn save_profile(&mut self) -> Command<Message> {
        let Some(original) = self.user.data() else {
            self.status = "Profile is still loading".to_string();
            return Command::none();
        };
        let updated = User {
            name: self.name_input.trim().to_string(),
            ..original.as_ref().clone()
        };
        if updated == **original {
            self.status = "Nothing to save".to_string();
            return Command::none();
        }
        self.status = "Saving...".to_string();
        self.save_user
            .mutate((original.as_ref().clone(), updated))
            .map(Message::UserSaved)
    }

    fn render_treatments(&self, frame: &mut Frame<'_>, area: Rect) {
        let block = Block::default()
            .borders(Borders::ALL)
            .title(with_fetching("Treatments (r: refresh)", &self.treatments));
        match self.treatments.data() {
            Some(treatments) => {
                let items: Vec<ListItem> = treatments
                    .iter()
                    .map(|t| ListItem::new(format!("{}: {}", t.name, t.description)))
                    .collect();
                frame.render_widget(List::new(items).block(block), area);
            }
            None => frame.render_widget(placeholder(&self.treatments).block(block), area),
        }
    }

    fn render_staff(&self, frame: &mut Frame<'_>, area: Rect) {
        let filter = TREATMENT_FILTERS[self.staff_filter].to_string();
        let title = format!("Staff offering {filter} (f: change filter)");
        let block = Block::default()
            .borders(Borders::ALL)
            .title(with_fetching(&title, &self.staff));
        match self.staff.data() {
            Some(staff) => {
                let items: Vec<ListItem> = self
                    .staff_by_treatment
                    .get(staff, &filter)
                    .into_iter()
                    .map(|s| ListItem::new(format!("{} ({})", s.name, s.treatment_names.join(", "))))
                    .collect();
                frame.render_widget(List::new(items).block(block), area);
            }
            None => frame.render_widget(placeholder(&self.staff).block(block), area),
        }
    }

    fn render_calendar(&self, frame: &mut Frame<'_>, area: Rect) {
        let (year, month) = self.month;
        let title = format!("{year}-{month:02} (left/right: change month)");
        let block = Block::default()
            .borders(Borders::ALL)
            .title(with_fetching(&title, &self.appointments));
        match self.appointments.data() {
            Some(appointments) => {
                let items: Vec<ListItem> = appointments
                    .iter()
                    .map(|a| {
                        let item = ListItem::new(format!("day {:>2}: {}", a.day, a.treatment));
                        if a.user_id.is_some() {
                            item.style(Style::default().fg(Color::DarkGray))
                        } else {
                            item
                        }
                    })
                    .collect();
                frame.render_widget(List::new(items).block(block), area);
            }
            None => frame.render_widget(placeholder(&self.appointments).block(block), area),
        }
    }

    fn render_profile(&self, frame: &mut Frame<'_>, area: Rect) {
        let block = Block::default()
            .borders(Borders::ALL)
            .title(with_fetching("Profile (type a name, Enter: save)", &self.user));
        let saving = self.save_user.state().is_pending();
        let paragraph = match self.user.data() {
            Some(user) => Paragraph::new(format!(
                "Name:  {}{}\nEmail: {}",
                self.name_input,
                if saving { " (saving)" } else { "_" },
                user.email
            )),
            None => placeholder(&self.user),
        };
        frame.render_widget(paragraph.block(block), area);
    }
}

fn with_fetching<T>(title: &str, result: &QueryResult<T>) -> String {
    if result.is_fetching && result.data.is_some() {
        format!("{title} (refreshing...)")
    } else {
        title.to_string()
    }
}

fn placeholder<T>(result: &QueryResult<T>) -> Paragraph<'static> {
    match &result.error {
        Some(err) => Paragraph::new(format!("Error: {}", err.message()))
            .style(Style::default().fg(Color::Red)),
        None => Paragraph::new("Loading..."),
    }
}

/// Appointments are polled so bookings made elsewhere show up.
fn appointment_options() -> QueryOptions {
    QueryOptions::new()
        .stale_time(Duration::from_secs(30))
        .refetch_interval(Duration::from_secs(60))
}

fn appointments_key((year, month): (i32, u32)) -> QueryKey {
    query_key!["appointments", year, month]
}

fn appointments_fetcher(
    api: &ApiClient,
    (year, month): (i32, u32),
) -> impl Fn() -> futures::future::BoxFuture<'static, Result<Vec<Appointment>, QueryError>>
+ Send
+ Sync
+ 'static {
    let api = api.clone();
    move || api.get(format!("/appointments/{year}/{month}"))
}

fn user_fetcher(
    api: &ApiClient,
) -> impl Fn() -> futures::future::BoxFuture<'static, Result<User, QueryError>> + Send + Sync + 'static
{
    let api = api.clone();
    move || {
        api.get::<UserResponse>("/user/1")
            .map(|response| response.map(|r| r.user))
            .boxed()
    }
}

/// PATCHes the fields that changed between the cached user and the edited
/// one, then refreshes every user-scoped query once the request settles.
fn user_mutation(client: &QueryClient, api: &ApiClient) -> Mutation<(User, User), User> {
    let api = api.clone();
    let invalidate = client.clone();
    client
        .mutation(move |(original, updated): (User, User)| {
            let before = serde_json::to_value(&original);
            let after = serde_json::to_value(&updated);
            match (before, after) {
                (Ok(before), Ok(after)) => api
                    .patch::<UserResponse>(format!("/user/{}", original.id), diff(&before, &after))
                    .map(|response| response.map(|r| r.user))
                    .boxed(),
                (Err(err), _) | (_, Err(err)) => {
                    futures::future::ready(Err(QueryError::from(err))).boxed()
                }
            }
        })
        .with_key(query_key!["patch-user"])
        .on_settled(move |_, _| {
            let client = invalidate.clone();
            async move { client.invalidate_queries(&query_key![USER]).await }.boxed()
        })
}

const fn next_month((year, month): (i32, u32)) -> (i32, u32) {
    if month == 12 { (year + 1, 1) } else { (year, month + 1) }
}

const fn previous_month((year, month): (i32, u32)) -> (i32, u32) {
    if month == 1 { (year - 1, 12) } else { (year, month - 1) }
}

/// Notifications from the cache's notifier, delivered as messages.
///
/// The receiver is handed to the first stream started; the subscription
/// keeps a stable id so the runtime never starts a second one.
#[derive(Clone)]
struct Toasts {
    rx: Arc<Mutex<Option<mpsc::UnboundedReceiver<Notification>>>>,
}

impl Toasts {
    fn new(rx: mpsc::UnboundedReceiver<Notification>) -> Self {
        Self {
            rx: Arc::new(Mutex::new(Some(rx))),
        }
    }
}

impl SubscriptionSource for Toasts {
    type Output = Notification;

    fn stream(&self) -> BoxStream<'static, Notification> {
        let rx = self.rx.lock().unwrap_or_else(PoisonError::into_inner).take();
        match rx {
            Some(rx) => UnboundedReceiverStream::new(rx).boxed(),
            None => stream::empty().boxed(),
        }
    }

    fn id(&self) -> SubscriptionId {
        let mut hasher = DefaultHasher::new();
        "toasts".hash(&mut hasher);
        SubscriptionId::of::<Self>(hasher.finish())
    }
}

/// In-process stand-in for the lazy-days server.
fn fixtures() -> MockTransport {
    let transport = MockTransport::new().with_latency(Duration::from_millis(300));
    transport
        .respond(
            Method::Get,
            "/treatments",
            200,
            json!([
                {"id": 1, "name": "massage", "description": "Deep tissue or relaxation"},
                {"id": 2, "name": "facial", "description": "Cleansing and hydration"},
                {"id": 3, "name": "scrub", "description": "Salt or sugar exfoliation"},
            ]),
        )
        .respond(
            Method::Get,
            "/staff",
            200,
            json!([
                {"id": 1, "name": "Divya", "treatmentNames": ["facial", "scrub"]},
                {"id": 2, "name": "Sandra", "treatmentNames": ["facial", "massage"]},
                {"id": 3, "name": "Michael", "treatmentNames": ["facial", "scrub", "massage"]},
                {"id": 4, "name": "Mateo", "treatmentNames": ["massage"]},
            ]),
        )
        .respond(
            Method::Get,
            "/user/1",
            200,
            json!({"user": {"id": 1, "name": "Ann", "email": "ann@example.com"}}),
        );

    let treatments = ["massage", "facial", "scrub"];
    let mut month = FIRST_MONTH;
    for _ in 0..24 {
        let (year, m) = month;
        let appointments: Vec<Appointment> = (1..=8)
            .map(|i| Appointment {
                id: i64::from(year) * 1000 + i64::from(m) * 10 + i64::from(i),
                day: (i * 3 + m) % 28 + 1,
                treatment: treatments[(i + m) as usize % treatments.len()].to_string(),
                user_id: (i % 3 == 0).then_some(1),
            })
            .collect();
        let body = serde_json::to_value(appointments).unwrap_or_default();
        transport.respond(Method::Get, &format!("/appointments/{year}/{m}"), 200, body);
        month = next_month(month);
    }

    let server = transport.clone();
    transport.handle(Method::Patch, "/user/1", move |request| {
        let mut user = json!({"id": 1, "name": "Ann", "email": "ann@example.com"});
        let ops = request
            .body
            .as_ref()
            .and_then(|body| body["patch"].as_array().cloned())
            .unwrap_or_default();
        for op in ops {
            if let (Some(field), Some(value)) = (
                op["path"].as_str().and_then(|p| p.strip_prefix('/')),
                op.get("value"),
            ) {
                user[field] = value.clone();
            }
        }
        server.respond(Method::Get, "/user/1", 200, json!({ "user": user.clone() }));
        Response::new(200, json!({ "user": user }))
    });
    transport
}

fn init_tracing() -> Result<()> {
    let path = std::env::temp_dir().join("lazy_days.log");
    let file = std::fs::File::create(path)?;
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("querent=debug")))
        .with_writer(Mutex::new(file))
        .with_ansi(false)
        .init();
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;
    init_tracing()?;

    let api = match std::env::var("LAZY_DAYS_API") {
        Ok(url) => ApiClient::http(url),
        Err(_) => ApiClient::new(fixtures()),
    };
    let (tx, rx) = mpsc::unbounded_channel();
    let client = QueryClient::new().with_notifier(ErrorNotifier::new(Arc::new(ChannelSink::new(tx))));
    let flags = Flags {
        client,
        api,
        toasts: Toasts::new(rx),
    };

    let mut terminal = ratatui::init();
    crossterm::execute!(std::io::stdout(), EnableFocusChange)?;

    let result = Runtime::<LazyDays>::new(flags).run(&mut terminal, 30).await;

    crossterm::execute!(std::io::stdout(), DisableFocusChange)?;
    ratatui::restore();
    result
}
