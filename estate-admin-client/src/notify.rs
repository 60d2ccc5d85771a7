//! Authentication event notifications.
//!
//! When the interceptor gives up on a session (no usable refresh token, or
//! the refresh call failed) it clears the credential store and broadcasts an
//! [`AuthEvent::Unauthorized`]. Route guards and UIs subscribe through
//! [`ApiClient::subscribe`](crate::ApiClient::subscribe) and send the user
//! back to the login screen.

use std::fmt;
use tokio::sync::broadcast;

/// Buffered events per subscriber before the slowest one starts lagging.
const DEFAULT_CAPACITY: usize = 16;

/// Why a session was dropped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnauthorizedReason {
    /// The access token expired and no refresh token is stored.
    RefreshTokenMissing,

    /// The stored refresh token is itself expired.
    RefreshTokenExpired,

    /// The refresh endpoint rejected the refresh token or was unreachable.
    RefreshFailed,
}

impl fmt::Display for UnauthorizedReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let reason = match self {
            Self::RefreshTokenMissing => "no refresh token",
            Self::RefreshTokenExpired => "refresh token expired",
            Self::RefreshFailed => "token refresh failed",
        };
        write!(f, "{}", reason)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthEvent {
    /// Credentials were cleared; the caller must log in again.
    Unauthorized { reason: UnauthorizedReason },
}

/// Broadcast channel for [`AuthEvent`]s.
#[derive(Debug, Clone)]
pub struct AuthNotifier {
    tx: broadcast::Sender<AuthEvent>,
}

impl AuthNotifier {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    /// Register a new observer. Only events sent after this call are received.
    pub fn subscribe(&self) -> broadcast::Receiver<AuthEvent> {
        self.tx.subscribe()
    }

    /// Send an event to every current subscriber.
    ///
    /// Returns the number of subscribers reached; zero is not an error.
    pub fn notify(&self, event: AuthEvent) -> usize {
        self.tx.send(event).unwrap_or(0)
    }
}

impl Default for AuthNotifier {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_notify_without_subscribers() {
        let notifier = AuthNotifier::default();
        let sent = notifier.notify(AuthEvent::Unauthorized {
            reason: UnauthorizedReason::RefreshFailed,
        });
        assert_eq!(sent, 0);
    }

    #[tokio::test]
    async fn test_every_subscriber_sees_event() {
        let notifier = AuthNotifier::default();
        let mut first = notifier.subscribe();
        let mut second = notifier.clone().subscribe();

        let event = AuthEvent::Unauthorized {
            reason: UnauthorizedReason::RefreshTokenExpired,
        };
        assert_eq!(notifier.notify(event.clone()), 2);

        assert_eq!(first.recv().await.unwrap(), event);
        assert_eq!(second.recv().await.unwrap(), event);
    }
}
