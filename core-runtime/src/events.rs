//! # Event Bus System
//!
//! Typed notifications published by the sync core over `tokio::sync::broadcast`.
//!
//! ## Overview
//!
//! - **Event Types**: [`AuthEvent`] for the session lifecycle, [`SyncEvent`]
//!   for listings and transfers, [`TaskEvent`] for background task lifecycle
//! - **EventBus**: central broadcast channel, cheap to clone
//! - **EventStream**: receiver wrapper with optional filtering
//!
//! Publishing never fails the operation that emits: a bus without subscribers
//! simply drops the event.
//!
//! ## Usage
//!
//! ```rust
//! use core_runtime::events::{AuthEvent, CoreEvent, EventBus};
//!
//! let event_bus = EventBus::new(100);
//! let mut receiver = event_bus.subscribe();
//!
//! event_bus.emit(CoreEvent::Auth(AuthEvent::SignedIn {
//!     account: "user@example.com".to_string(),
//! })).ok();
//!
//! assert!(receiver.try_recv().is_ok());
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;
use tokio::sync::broadcast::{self, error::RecvError, error::SendError, Receiver};
use tracing::trace;

/// Default number of events buffered per subscriber.
pub const DEFAULT_EVENT_BUFFER_SIZE: usize = 256;

/// Top-level event enum encompassing all event categories.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", content = "payload")]
pub enum CoreEvent {
    /// Session lifecycle events
    Auth(AuthEvent),
    /// Listing, upload and download events
    Sync(SyncEvent),
    /// Background task lifecycle events
    Task(TaskEvent),
}

impl CoreEvent {
    /// Returns a human-readable description of the event.
    pub fn description(&self) -> &str {
        match self {
            CoreEvent::Auth(e) => e.description(),
            CoreEvent::Sync(e) => e.description(),
            CoreEvent::Task(e) => e.description(),
        }
    }

    /// Returns the severity level of the event.
    pub fn severity(&self) -> EventSeverity {
        match self {
            CoreEvent::Auth(AuthEvent::AuthError { .. }) => EventSeverity::Error,
            CoreEvent::Task(TaskEvent::Failed { .. }) => EventSeverity::Error,
            CoreEvent::Auth(AuthEvent::SessionExpired { .. }) => EventSeverity::Warning,
            CoreEvent::Auth(AuthEvent::SignedIn { .. }) => EventSeverity::Info,
            CoreEvent::Sync(SyncEvent::UploadCompleted { .. })
            | CoreEvent::Sync(SyncEvent::DownloadCompleted { .. }) => EventSeverity::Info,
            _ => EventSeverity::Debug,
        }
    }
}

/// Event severity levels for filtering and logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum EventSeverity {
    Debug,
    Info,
    Warning,
    Error,
}

// ============================================================================
// Authentication Events
// ============================================================================

/// Events related to the authentication session.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "event")]
pub enum AuthEvent {
    /// Interactive or cached authentication started.
    SigningIn,
    /// An account is now the active session.
    SignedIn {
        account: String,
    },
    /// A persisted session was restored at startup.
    SessionRestored {
        account: String,
    },
    /// The active session was closed.
    SignedOut {
        account: String,
    },
    /// Access token is being refreshed.
    TokenRefreshing {
        account: String,
    },
    /// Token refresh completed successfully.
    TokenRefreshed {
        account: String,
        /// Unix epoch seconds, when the provider reported an expiry.
        expires_at: Option<i64>,
    },
    /// The credential could not be refreshed; a new sign-in is required.
    SessionExpired {
        account: String,
    },
    /// Authentication error occurred.
    AuthError {
        account: Option<String>,
        message: String,
    },
}

impl AuthEvent {
    fn description(&self) -> &str {
        match self {
            AuthEvent::SigningIn => "Authentication in progress",
            AuthEvent::SignedIn { .. } => "User signed in successfully",
            AuthEvent::SessionRestored { .. } => "Session restored",
            AuthEvent::SignedOut { .. } => "User signed out",
            AuthEvent::TokenRefreshing { .. } => "Refreshing access token",
            AuthEvent::TokenRefreshed { .. } => "Token refreshed successfully",
            AuthEvent::SessionExpired { .. } => "Session expired",
            AuthEvent::AuthError { .. } => "Authentication error",
        }
    }
}

// ============================================================================
// Sync Events
// ============================================================================

/// Events related to remote listings and file transfers.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "event")]
pub enum SyncEvent {
    /// A listing was fetched from the remote service and cached.
    ListingRefreshed { account: String, file_count: usize },
    /// A listing was answered from the metadata cache.
    ListingServedFromCache { account: String, file_count: usize },
    /// The cached listing for an account was dropped.
    CacheInvalidated { account: String },
    UploadCompleted { file_id: String, name: String },
    DownloadProgress { file_id: String, percent: u8 },
    DownloadCompleted { file_id: String, path: String },
}

impl SyncEvent {
    fn description(&self) -> &str {
        match self {
            SyncEvent::ListingRefreshed { .. } => "Listing refreshed from remote",
            SyncEvent::ListingServedFromCache { .. } => "Listing served from cache",
            SyncEvent::CacheInvalidated { .. } => "Metadata cache invalidated",
            SyncEvent::UploadCompleted { .. } => "Upload completed",
            SyncEvent::DownloadProgress { .. } => "Download in progress",
            SyncEvent::DownloadCompleted { .. } => "Download completed",
        }
    }
}

// ============================================================================
// Task Events
// ============================================================================

/// Lifecycle of a background task.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "event")]
pub enum TaskEvent {
    Started { task_id: String, label: String },
    Completed { task_id: String },
    Failed { task_id: String, message: String },
}

impl TaskEvent {
    fn description(&self) -> &str {
        match self {
            TaskEvent::Started { .. } => "Task started",
            TaskEvent::Completed { .. } => "Task completed",
            TaskEvent::Failed { .. } => "Task failed",
        }
    }
}

// ============================================================================
// Event Bus
// ============================================================================

/// Central broadcast channel for [`CoreEvent`]s.
///
/// Cloning the bus shares the underlying channel.
#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<CoreEvent>,
}

impl EventBus {
    /// Creates a new event bus with the specified buffer size.
    ///
    /// # Arguments
    ///
    /// * `capacity` - Maximum number of events to buffer per subscriber.
    ///   A subscriber that falls further behind receives `RecvError::Lagged`.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Publishes an event to all subscribers.
    ///
    /// Returns the number of subscribers that received the event, or an error
    /// if there are none.
    pub fn emit(&self, event: CoreEvent) -> Result<usize, SendError<CoreEvent>> {
        trace!(severity = ?event.severity(), "{}", event.description());
        self.sender.send(event)
    }

    /// Creates a new subscriber. Past events are not replayed.
    pub fn subscribe(&self) -> Receiver<CoreEvent> {
        self.sender.subscribe()
    }

    /// Returns the number of active subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_EVENT_BUFFER_SIZE)
    }
}

impl fmt::Debug for EventBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventBus")
            .field("subscriber_count", &self.subscriber_count())
            .finish()
    }
}

// ============================================================================
// Event Stream Wrapper
// ============================================================================

type EventFilter = Box<dyn Fn(&CoreEvent) -> bool + Send + Sync>;

/// A wrapper around `broadcast::Receiver` with optional filtering.
///
/// ```rust
/// use core_runtime::events::{CoreEvent, EventBus, EventStream};
///
/// let event_bus = EventBus::new(16);
/// let sync_only = EventStream::new(event_bus.subscribe())
///     .filter(|event| matches!(event, CoreEvent::Sync(_)));
/// ```
pub struct EventStream {
    receiver: Receiver<CoreEvent>,
    filter: Option<EventFilter>,
}

impl EventStream {
    pub fn new(receiver: Receiver<CoreEvent>) -> Self {
        Self {
            receiver,
            filter: None,
        }
    }

    /// Only events at `min_severity` or above are returned by `recv()`.
    pub fn at_least(receiver: Receiver<CoreEvent>, min_severity: EventSeverity) -> Self {
        Self::new(receiver).filter(move |event| event.severity() >= min_severity)
    }

    /// Only events matching `predicate` are returned by `recv()`.
    pub fn filter<F>(mut self, predicate: F) -> Self
    where
        F: Fn(&CoreEvent) -> bool + Send + Sync + 'static,
    {
        self.filter = Some(Box::new(predicate));
        self
    }

    /// Receives the next event that passes the filter.
    ///
    /// # Errors
    ///
    /// Returns `RecvError::Lagged(n)` if the subscriber fell behind by `n` events.
    /// Returns `RecvError::Closed` if all senders have been dropped.
    pub async fn recv(&mut self) -> Result<CoreEvent, RecvError> {
        loop {
            let event = self.receiver.recv().await?;

            match &self.filter {
                Some(filter) if !filter(&event) => continue,
                _ => return Ok(event),
            }
        }
    }
}

impl fmt::Debug for EventStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventStream")
            .field("has_filter", &self.filter.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_event_bus_subscription() {
        let bus = EventBus::new(10);
        assert_eq!(bus.subscriber_count(), 0);

        let _sub1 = bus.subscribe();
        let _sub2 = bus.subscribe();
        assert_eq!(bus.subscriber_count(), 2);
    }

    #[tokio::test]
    async fn test_emit_without_subscribers_is_an_error() {
        let bus = EventBus::new(10);
        let result = bus.emit(CoreEvent::Auth(AuthEvent::SigningIn));
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_all_subscribers_receive_event() {
        let bus = EventBus::new(10);
        let mut first = bus.subscribe();
        let mut second = bus.subscribe();

        let event = CoreEvent::Sync(SyncEvent::UploadCompleted {
            file_id: "abc".to_string(),
            name: "notes.txt".to_string(),
        });
        assert_eq!(bus.emit(event.clone()).unwrap(), 2);

        assert_eq!(first.recv().await.unwrap(), event);
        assert_eq!(second.recv().await.unwrap(), event);
    }

    #[tokio::test]
    async fn test_event_stream_filter() {
        let bus = EventBus::new(10);
        let mut stream = EventStream::new(bus.subscribe())
            .filter(|event| matches!(event, CoreEvent::Sync(_)));

        bus.emit(CoreEvent::Auth(AuthEvent::SigningIn)).unwrap();
        bus.emit(CoreEvent::Sync(SyncEvent::CacheInvalidated {
            account: "user@example.com".to_string(),
        }))
        .unwrap();

        let event = stream.recv().await.unwrap();
        assert!(matches!(
            event,
            CoreEvent::Sync(SyncEvent::CacheInvalidated { .. })
        ));
    }

    #[tokio::test]
    async fn test_event_stream_minimum_severity() {
        let bus = EventBus::new(10);
        let mut stream = EventStream::at_least(bus.subscribe(), EventSeverity::Warning);

        bus.emit(CoreEvent::Sync(SyncEvent::DownloadProgress {
            file_id: "abc".to_string(),
            percent: 50,
        }))
        .unwrap();
        bus.emit(CoreEvent::Auth(AuthEvent::SessionExpired {
            account: "user@example.com".to_string(),
        }))
        .unwrap();

        assert_eq!(
            stream.recv().await.unwrap(),
            CoreEvent::Auth(AuthEvent::SessionExpired {
                account: "user@example.com".to_string(),
            })
        );
    }

    #[test]
    fn test_event_severity() {
        let error = CoreEvent::Auth(AuthEvent::AuthError {
            account: None,
            message: "denied".to_string(),
        });
        assert_eq!(error.severity(), EventSeverity::Error);

        let progress = CoreEvent::Sync(SyncEvent::DownloadProgress {
            file_id: "abc".to_string(),
            percent: 50,
        });
        assert_eq!(progress.severity(), EventSeverity::Debug);
        assert_eq!(progress.description(), "Download in progress");
    }

    #[test]
    fn test_event_serialization() {
        let event = CoreEvent::Auth(AuthEvent::TokenRefreshed {
            account: "user@example.com".to_string(),
            expires_at: Some(1_700_000_000),
        });

        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("\"type\":\"Auth\""));
        assert!(json.contains("TokenRefreshed"));

        let parsed: CoreEvent = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, event);
    }
}
