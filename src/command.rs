use futures::{
    FutureExt, Stream, StreamExt,
    stream::{self, BoxStream, select_all},
};

/// An action that can be performed by a command.
///
/// Actions are emitted by command streams and processed by the runtime.
pub enum Action<Msg> {
    /// Send a message to the application's update function.
    Message(Msg),

    /// Request the application to quit.
    ///
    /// The runtime stops its event loop and cancels every subscription,
    /// which also closes the query observers they own.
    Quit,
}

/// A command that can be executed to perform side effects.
///
/// Commands are returned from `Application::new` and `Application::update`
/// and executed by the runtime. In a query-backed application they are how
/// `update` reaches the cache:
/// - running a mutation ([`Mutation::mutate`](crate::query::Mutation::mutate))
/// - invalidating or prefetching keys
///   ([`QueryClient::invalidate`](crate::query::QueryClient::invalidate),
///   [`QueryClient::prefetch`](crate::query::QueryClient::prefetch))
/// - any other async work whose result comes back as a message
///
/// # Examples
///
/// ```
/// use querent::command::Command;
///
/// enum Message {
///     Reserved(u32),
/// }
///
/// let cmd = Command::perform(async { 42 }, Message::Reserved);
/// ```
pub struct Command<Msg: Send + 'static> {
    pub(crate) stream: Option<BoxStream<'static, Action<Msg>>>,
}

impl<Msg: Send + 'static> Command<Msg> {
    /// Create a command that does nothing.
    ///
    /// ```
    /// use querent::command::Command;
    ///
    /// let cmd: Command<i32> = Command::none();
    /// ```
    pub fn none() -> Self {
        Self { stream: None }
    }

    /// Perform an asynchronous operation and convert its result to a message.
    ///
    /// ```
    /// use querent::command::Command;
    ///
    /// async fn load_treatments() -> Vec<String> {
    ///     vec!["massage".to_string(), "facial".to_string()]
    /// }
    ///
    /// enum Message {
    ///     Treatments(Vec<String>),
    /// }
    ///
    /// let cmd = Command::perform(load_treatments(), Message::Treatments);
    /// ```
    pub fn perform<A>(
        future: impl Future<Output = A> + Send + 'static,
        f: impl FnOnce(A) -> Msg + Send + 'static,
    ) -> Self {
        Self::future(future.map(f))
    }

    /// Create a command from a future that produces a message.
    ///
    /// ```
    /// use querent::command::Command;
    ///
    /// let cmd = Command::future(async { 42 });
    /// ```
    pub fn future(future: impl Future<Output = Msg> + Send + 'static) -> Self {
        Self {
            stream: Some(future.into_stream().map(Action::Message).boxed()),
        }
    }

    /// Run a future for its effect only. No message is produced.
    ///
    /// The future runs to completion even though `update` never hears
    /// about it; cache changes reach the views through their subscriptions.
    ///
    /// ```
    /// use querent::command::Command;
    ///
    /// let cmd: Command<i32> = Command::task(async {});
    /// ```
    pub fn task(future: impl Future<Output = ()> + Send + 'static) -> Self {
        Self {
            stream: Some(
                future
                    .into_stream()
                    .filter_map(|()| async { None })
                    .boxed(),
            ),
        }
    }

    /// Create a command that performs a single action immediately.
    ///
    /// ```
    /// use querent::command::{Action, Command};
    ///
    /// let quit: Command<i32> = Command::effect(Action::Quit);
    /// let message = Command::effect(Action::Message(42));
    /// ```
    pub fn effect(action: Action<Msg>) -> Self {
        Self {
            stream: Some(stream::once(async move { action }).boxed()),
        }
    }

    /// Batch multiple commands into a single command.
    ///
    /// All commands run concurrently and messages arrive in completion
    /// order. `Command::none()` entries are filtered out.
    ///
    /// ```
    /// use querent::command::Command;
    ///
    /// enum Message {
    ///     Staff(usize),
    ///     Treatments(usize),
    /// }
    ///
    /// let cmd = Command::batch(vec![
    ///     Command::perform(async { 4 }, Message::Staff),
    ///     Command::perform(async { 3 }, Message::Treatments),
    ///     Command::none(),
    /// ]);
    /// ```
    pub fn batch(commands: impl IntoIterator<Item = Command<Msg>>) -> Self {
        let streams: Vec<_> = commands.into_iter().filter_map(|cmd| cmd.stream).collect();

        if streams.is_empty() {
            Self::none()
        } else {
            Self {
                stream: Some(select_all(streams).boxed()),
            }
        }
    }

    /// Create a command from a stream of messages.
    ///
    /// ```
    /// use querent::command::Command;
    /// use futures::stream;
    ///
    /// let cmd = Command::stream(stream::iter(vec![1, 2, 3]));
    /// ```
    pub fn stream(stream: impl Stream<Item = Msg> + Send + 'static) -> Self {
        Self {
            stream: Some(stream.map(Action::Message).boxed()),
        }
    }

    /// Convert the messages this command produces. Quit actions pass through.
    ///
    /// ```
    /// use querent::command::Command;
    ///
    /// enum Message {
    ///     Saved(Result<u32, String>),
    /// }
    ///
    /// let save: Command<Result<u32, String>> = Command::future(async { Ok(1) });
    /// let cmd = save.map(Message::Saved);
    /// ```
    pub fn map<T, F>(self, f: F) -> Command<T>
    where
        T: Send + 'static,
        F: Fn(Msg) -> T + Send + 'static,
    {
        Command {
            stream: self.stream.map(|stream| {
                stream
                    .map(move |action| match action {
                        Action::Message(msg) => Action::Message(f(msg)),
                        Action::Quit => Action::Quit,
                    })
                    .boxed()
            }),
        }
    }
}
