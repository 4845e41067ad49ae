use std::time::Duration;

use color_eyre::eyre::Result;
use futures::stream::StreamExt;
use ratatui::{Terminal, prelude::Backend};
use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use crate::{
    application::Application,
    command::{Action, Command},
    subscription::SubscriptionManager,
};

/// Drives an [`Application`]: runs its commands, keeps its subscriptions in
/// line with its state and redraws after updates.
pub struct Runtime<A: Application> {
    app: A,
    init: Option<Command<A::Message>>,
    tx: mpsc::UnboundedSender<A::Message>,
    rx: mpsc::UnboundedReceiver<A::Message>,
    subscription_manager: SubscriptionManager<A::Message>,
    quit: CancellationToken,
}

impl<A: Application> Runtime<A> {
    /// Initializes the application. Its init command starts with [`run`](Self::run).
    pub fn new(flags: A::Flags) -> Self {
        let (app, init) = A::new(flags);
        let (tx, rx) = mpsc::unbounded_channel();
        let subscription_manager = SubscriptionManager::new(tx.clone());

        Self {
            app,
            init: Some(init),
            tx,
            rx,
            subscription_manager,
            quit: CancellationToken::new(),
        }
    }

    pub const fn app(&self) -> &A {
        &self.app
    }

    /// Runs until a command emits [`Action::Quit`].
    ///
    /// Messages are applied as soon as they arrive; the view is drawn at
    /// most `frame_rate` times per second and only when something changed.
    /// On exit every subscription is cancelled and awaited, which closes
    /// the query observers they own.
    ///
    /// # Errors
    ///
    /// Returns an error if drawing to the terminal fails.
    pub async fn run<B: Backend>(mut self, terminal: &mut Terminal<B>, frame_rate: u32) -> Result<()> {
        let frame_duration = Duration::from_secs(1) / frame_rate.max(1);
        let quit = self.quit.clone();

        if let Some(init) = self.init.take() {
            self.enqueue(init);
        }
        self.subscription_manager.update(self.app.subscriptions());

        let mut frames = tokio::time::interval(frame_duration);
        frames.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut dirty = true;

        loop {
            tokio::select! {
                biased;
                () = quit.cancelled() => break,
                Some(msg) = self.rx.recv() => {
                    self.process(msg);
                    while let Ok(msg) = self.rx.try_recv() {
                        self.process(msg);
                    }
                    dirty = true;
                }
                _ = frames.tick() => {
                    if dirty {
                        terminal.draw(|frame| self.app.view(frame))?;
                        dirty = false;
                    }
                }
            }
        }

        tracing::debug!("runtime quitting");
        self.subscription_manager.shutdown().await;
        Ok(())
    }

    fn process(&mut self, msg: A::Message) {
        let cmd = self.app.update(msg);
        self.enqueue(cmd);
        self.subscription_manager.update(self.app.subscriptions());
    }

    fn enqueue(&self, cmd: Command<A::Message>) {
        let Some(mut stream) = cmd.stream else {
            return;
        };
        let tx = self.tx.clone();
        let quit = self.quit.clone();

        tokio::spawn(async move {
            loop {
                tokio::select! {
                    () = quit.cancelled() => break,
                    action = stream.next() => match action {
                        Some(Action::Message(msg)) => {
                            if tx.send(msg).is_err() {
                                break;
                            }
                        }
                        Some(Action::Quit) => {
                            quit.cancel();
                            break;
                        }
                        None => break,
                    },
                }
            }
        });
    }
}
