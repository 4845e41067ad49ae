use std::hash::{DefaultHasher, Hash, Hasher};

use crossterm::event::{Event, EventStream};
use futures::{StreamExt, stream::BoxStream};

use super::{SubscriptionId, SubscriptionSource};
use crate::query::QueryClient;

/// Terminal event subscription using crossterm's `EventStream`.
///
/// The stream ends on the first read error. Focus events are only reported
/// when the application enabled them with
/// `crossterm::event::EnableFocusChange`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Hash)]
pub struct TerminalEvents;

impl TerminalEvents {
    pub const fn new() -> Self {
        Self
    }
}

impl SubscriptionSource for TerminalEvents {
    type Output = Event;

    fn stream(&self) -> BoxStream<'static, Self::Output> {
        futures::stream::unfold(EventStream::new(), |mut events| async move {
            match events.next().await {
                Some(Ok(event)) => Some((event, events)),
                Some(Err(err)) => {
                    tracing::warn!(error = %err, "terminal event stream failed");
                    None
                }
                None => None,
            }
        })
        .boxed()
    }

    fn id(&self) -> SubscriptionId {
        let mut hasher = DefaultHasher::new();
        self.hash(&mut hasher);
        SubscriptionId::of::<Self>(hasher.finish())
    }
}

/// Focus change carried by a terminal event, if any.
pub const fn focus_change(event: &Event) -> Option<bool> {
    match event {
        Event::FocusGained => Some(true),
        Event::FocusLost => Some(false),
        _ => None,
    }
}

impl QueryClient {
    /// Feeds terminal focus events into the client's focus state, so that
    /// regaining focus refetches stale observed queries.
    ///
    /// Returns `true` if the event was a focus change.
    pub fn handle_terminal_event(&self, event: &Event) -> bool {
        match focus_change(event) {
            Some(focused) => {
                self.set_focused(focused);
                true
            }
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crossterm::event::{KeyCode, KeyEvent};

    #[test]
    fn test_terminal_events_id_consistency() {
        assert_eq!(TerminalEvents::new().id(), TerminalEvents.id());
    }

    #[test]
    fn test_focus_change() {
        assert_eq!(focus_change(&Event::FocusGained), Some(true));
        assert_eq!(focus_change(&Event::FocusLost), Some(false));
        assert_eq!(focus_change(&Event::Key(KeyEvent::from(KeyCode::Char('q')))), None);
    }

    #[tokio::test]
    async fn test_handle_terminal_event_updates_focus() {
        let client = QueryClient::new();

        assert!(client.handle_terminal_event(&Event::FocusLost));
        assert!(!client.is_focused());
        assert!(client.handle_terminal_event(&Event::FocusGained));
        assert!(client.is_focused());
        assert!(!client.handle_terminal_event(&Event::Resize(80, 24)));
    }
}
