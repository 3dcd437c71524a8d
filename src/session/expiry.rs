use tokio::sync::broadcast;
use tokio::sync::broadcast::error::{RecvError, TryRecvError};

const CHANNEL_CAPACITY: usize = 16;

/// The `tokenExpired` event. Carries no payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TokenExpired;

/// Process-wide channel announcing that the session died outside the
/// normal logout flow.
///
/// Every live subscription receives each event. Dropping an
/// `ExpirySubscription` unsubscribes it.
#[derive(Debug, Clone)]
pub struct ExpiryBroadcast {
    sender: broadcast::Sender<TokenExpired>,
}

impl ExpiryBroadcast {
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(CHANNEL_CAPACITY);
        Self { sender }
    }

    /// Fire the event; returns how many subscribers it reached.
    pub fn emit(&self) -> usize {
        let reached = self.sender.send(TokenExpired).unwrap_or(0);
        tracing::debug!(subscribers = reached, "tokenExpired broadcast");
        reached
    }

    pub fn subscribe(&self) -> ExpirySubscription {
        ExpirySubscription {
            receiver: self.sender.subscribe(),
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for ExpiryBroadcast {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug)]
pub struct ExpirySubscription {
    receiver: broadcast::Receiver<TokenExpired>,
}

impl ExpirySubscription {
    /// Wait for the next event. `None` once every sender is gone.
    ///
    /// A lagged subscriber gets one event for the whole backlog; reactions
    /// are idempotent so nothing is lost.
    pub async fn recv(&mut self) -> Option<TokenExpired> {
        match self.receiver.recv().await {
            Ok(event) => Some(event),
            Err(RecvError::Lagged(_)) => Some(TokenExpired),
            Err(RecvError::Closed) => None,
        }
    }

    pub fn try_recv(&mut self) -> Option<TokenExpired> {
        match self.receiver.try_recv() {
            Ok(event) => Some(event),
            Err(TryRecvError::Lagged(_)) => Some(TokenExpired),
            Err(TryRecvError::Empty) | Err(TryRecvError::Closed) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_emit_without_subscribers() {
        let expiry = ExpiryBroadcast::new();
        assert_eq!(expiry.emit(), 0);
    }

    #[test]
    fn test_every_subscriber_receives_event() {
        let expiry = ExpiryBroadcast::new();
        let mut first = expiry.subscribe();
        let mut second = expiry.subscribe();

        assert_eq!(expiry.emit(), 2);
        assert_eq!(first.try_recv(), Some(TokenExpired));
        assert_eq!(second.try_recv(), Some(TokenExpired));
        assert_eq!(first.try_recv(), None);
    }

    #[test]
    fn test_drop_unsubscribes() {
        let expiry = ExpiryBroadcast::new();
        let subscription = expiry.subscribe();
        assert_eq!(expiry.subscriber_count(), 1);

        drop(subscription);
        assert_eq!(expiry.subscriber_count(), 0);
        assert_eq!(expiry.emit(), 0);
    }

    #[tokio::test]
    async fn test_recv_waits_for_event() {
        let expiry = ExpiryBroadcast::new();
        let mut subscription = expiry.subscribe();

        let sender = expiry.clone();
        tokio::spawn(async move {
            sender.emit();
        });

        assert_eq!(subscription.recv().await, Some(TokenExpired));
    }
}
