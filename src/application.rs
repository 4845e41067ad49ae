use ratatui::Frame;

use crate::{command::Command, subscription::Subscription};

/// A TUI application following the Elm Architecture.
///
/// The application owns its view state; cached server state lives in a
/// [`QueryClient`](crate::query::QueryClient) the application keeps a clone
/// of and reaches through commands and [`Query`](crate::query::Query)
/// subscriptions.
///
/// # Type Parameters
///
/// * `Message` - The messages your application handles.
/// * `Flags` - Data passed at initialization, typically the query client
///   and the API client.
///
/// # Example
///
/// ```
/// use ratatui::Frame;
/// use querent::{application::Application, command::Command, subscription::Subscription};
///
/// #[derive(Debug, Clone)]
/// enum Message {
///     NextMonth,
///     PreviousMonth,
/// }
///
/// struct Calendar {
///     month_offset: i32,
/// }
///
/// impl Application for Calendar {
///     type Message = Message;
///     type Flags = i32;
///
///     fn new(month_offset: i32) -> (Self, Command<Message>) {
///         (Calendar { month_offset }, Command::none())
///     }
///
///     fn update(&mut self, msg: Message) -> Command<Message> {
///         match msg {
///             Message::NextMonth => self.month_offset += 1,
///             Message::PreviousMonth => self.month_offset -= 1,
///         }
///         Command::none()
///     }
///
///     fn view(&self, _frame: &mut Frame<'_>) {}
///
///     fn subscriptions(&self) -> Vec<Subscription<Message>> {
///         vec![]
///     }
/// }
/// ```
pub trait Application: Sized {
    /// The type of messages your application processes.
    type Message: Send + 'static;

    /// Configuration data for initializing your application.
    ///
    /// Use `()` if no configuration is needed.
    type Flags: Clone + Send;

    /// Initialize the application with the given flags.
    ///
    /// Returns the initial state and a command to run at startup, such as
    /// prefetching the data the first screen needs.
    ///
    /// ```
    /// # use querent::{application::Application, command::Command};
    /// # use querent::query::{QueryClient, QueryOptions};
    /// # use querent::query_key;
    /// # use querent::subscription::Subscription;
    /// # use futures::FutureExt;
    /// # use ratatui::Frame;
    /// # struct Home { client: QueryClient }
    /// # enum Message {}
    /// # impl Application for Home {
    /// #     type Message = Message;
    /// #     type Flags = QueryClient;
    /// fn new(client: QueryClient) -> (Self, Command<Message>) {
    ///     let warm = client.prefetch(
    ///         &query_key!["treatments"],
    ///         || async { Ok(vec!["massage".to_string()]) }.boxed(),
    ///         &QueryOptions::new(),
    ///     );
    ///     (Home { client }, warm)
    /// }
    /// #     fn update(&mut self, msg: Message) -> Command<Message> { Command::none() }
    /// #     fn view(&self, frame: &mut Frame<'_>) {}
    /// #     fn subscriptions(&self) -> Vec<Subscription<Message>> { vec![] }
    /// # }
    /// ```
    fn new(flags: Self::Flags) -> (Self, Command<Self::Message>);

    /// Process a message and update the application state.
    ///
    /// All state changes happen here. The returned command runs
    /// asynchronously and may produce further messages.
    ///
    /// ```
    /// # use querent::{application::Application, command::{Command, Action}};
    /// # use querent::query::QueryClient;
    /// # use querent::query_key;
    /// # use ratatui::Frame;
    /// # use querent::subscription::Subscription;
    /// # struct Appointments { client: QueryClient }
    /// # enum Message { Refresh, Quit }
    /// # impl Application for Appointments {
    /// #     type Message = Message;
    /// #     type Flags = QueryClient;
    /// #     fn new(client: QueryClient) -> (Self, Command<Message>) { (Appointments { client }, Command::none()) }
    /// fn update(&mut self, msg: Message) -> Command<Message> {
    ///     match msg {
    ///         Message::Refresh => self.client.invalidate(&query_key!["appointments"]),
    ///         Message::Quit => Command::effect(Action::Quit),
    ///     }
    /// }
    /// #     fn view(&self, frame: &mut Frame<'_>) {}
    /// #     fn subscriptions(&self) -> Vec<Subscription<Message>> { vec![] }
    /// # }
    /// ```
    fn update(&mut self, msg: Self::Message) -> Command<Self::Message>;

    /// Render the application's user interface.
    ///
    /// This should only read from `self`. All state changes happen in
    /// `update()`.
    fn view(&self, frame: &mut Frame<'_>);

    /// The event sources the application currently listens to.
    ///
    /// Called after every update. Subscriptions are matched by id, so a
    /// [`Query`](crate::query::Query) that keeps being returned keeps its
    /// observer, and one that disappears is closed.
    ///
    /// ```
    /// # use querent::{application::Application, command::Command, subscription::Subscription};
    /// # use querent::subscription::terminal::TerminalEvents;
    /// # use ratatui::Frame;
    /// # struct MyApp;
    /// # enum Message { Terminal(crossterm::event::Event) }
    /// # impl Application for MyApp {
    /// #     type Message = Message;
    /// #     type Flags = ();
    /// #     fn new(_: ()) -> (Self, Command<Message>) { (MyApp, Command::none()) }
    /// #     fn update(&mut self, msg: Message) -> Command<Message> { Command::none() }
    /// #     fn view(&self, frame: &mut Frame<'_>) {}
    /// fn subscriptions(&self) -> Vec<Subscription<Message>> {
    ///     vec![Subscription::new(TerminalEvents::new()).map(Message::Terminal)]
    /// }
    /// # }
    /// ```
    fn subscriptions(&self) -> Vec<Subscription<Self::Message>>;
}
