//! # Event Bus System
//!
//! Provides an event-driven architecture for the session core using `tokio::sync::broadcast`.
//! This module enables decoupled communication between the core and its hosts through
//! typed events.
//!
//! ## Overview
//!
//! The event bus system consists of:
//! - **Event Types**: Strongly-typed enum hierarchy for session lifecycle events
//! - **EventBus**: Central broadcast channel for publishing events
//! - **EventStream**: Wrapper for consuming events with filtering
//! - **Subscription Management**: Multiple subscribers can listen independently
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────┐     emit      ┌───────────┐
//! │Session Store ├──────────────>│           │
//! └──────────────┘               │ EventBus  │     subscribe    ┌────────────┐
//!                                │ (broadcast├─────────────────>│ Subscriber │
//! ┌──────────────┐     emit      │  channel) │                  └────────────┘
//! │Callback      ├──────────────>│           │     subscribe    ┌────────────┐
//! │Finalizer     │               │           ├─────────────────>│ Subscriber │
//! └──────────────┘               └───────────┘                  └────────────┘
//! ```
//!
//! ## Usage
//!
//! ### Publishing Events
//!
//! ```rust
//! use core_runtime::events::{EventBus, CoreEvent, AuthEvent};
//!
//! # let event_bus = EventBus::new(100);
//! let event = CoreEvent::Auth(AuthEvent::SignedIn {
//!     user_id: "user-123".to_string(),
//!     email: "user@example.com".to_string(),
//! });
//!
//! event_bus.emit(event).ok();
//! ```
//!
//! ### Subscribing to Events
//!
//! ```rust
//! use core_runtime::events::{EventBus, CoreEvent};
//! use tokio::sync::broadcast::error::RecvError;
//!
//! # #[tokio::main]
//! # async fn main() {
//! let event_bus = EventBus::new(100);
//! let mut subscriber = event_bus.subscribe();
//!
//! tokio::spawn(async move {
//!     loop {
//!         match subscriber.recv().await {
//!             Ok(event) => println!("Received: {:?}", event),
//!             Err(RecvError::Lagged(n)) => {
//!                 eprintln!("Missed {} events", n);
//!             }
//!             Err(RecvError::Closed) => break,
//!         }
//!     }
//! });
//! # }
//! ```
//!
//! ## Event Types
//!
//! ### Authentication Events
//! - `SignInStarted`: OAuth redirect is about to leave the app
//! - `SignedIn`: A session was established or restored
//! - `SignedOut`: The session ended
//! - `SessionResolved`: Initial bootstrap settled (authenticated or not)
//! - `CallbackFailed`: The OAuth callback could not produce a session
//! - `AuthError`: A provider or storage operation failed
//!
//! ## Error Handling
//!
//! The event bus uses `tokio::sync::broadcast`, which can produce two types of errors:
//!
//! - **`RecvError::Lagged(n)`**: Subscriber was too slow and missed `n` events.
//!   This is non-fatal; the subscriber can continue receiving new events.
//! - **`RecvError::Closed`**: All senders have been dropped. This indicates shutdown.
//!
//! Subscribers should handle `Lagged` gracefully and treat `Closed` as a signal to exit.
//!
//! ## Thread Safety
//!
//! The event bus is fully thread-safe (`Send + Sync`). It can be safely shared across
//! async tasks using `Arc`, or cloned directly since cloning shares the underlying
//! channel.

use serde::{Deserialize, Serialize};
use std::fmt;
use tokio::sync::broadcast;

// Re-export commonly used types
pub use tokio::sync::broadcast::error::{RecvError, SendError};
pub use tokio::sync::broadcast::Receiver;

/// Default buffer size for the event bus channel.
///
/// This value balances memory usage with the ability to handle bursts of events.
/// Subscribers that can't keep up will receive `RecvError::Lagged`.
pub const DEFAULT_EVENT_BUFFER_SIZE: usize = 100;

// ============================================================================
// Core Event Types
// ============================================================================

/// Top-level event enum encompassing all event categories.
///
/// This is the main event type published and received through the event bus.
/// It wraps domain-specific event types.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", content = "payload")]
pub enum CoreEvent {
    /// Authentication and session lifecycle events
    Auth(AuthEvent),
}

impl CoreEvent {
    /// Returns a human-readable description of the event.
    pub fn description(&self) -> &str {
        match self {
            CoreEvent::Auth(e) => e.description(),
        }
    }

    /// Returns the severity level of the event.
    pub fn severity(&self) -> EventSeverity {
        match self {
            CoreEvent::Auth(AuthEvent::AuthError {
                recoverable: false, ..
            }) => EventSeverity::Error,
            CoreEvent::Auth(AuthEvent::AuthError { .. }) => EventSeverity::Warning,
            CoreEvent::Auth(AuthEvent::CallbackFailed { .. }) => EventSeverity::Warning,
            CoreEvent::Auth(AuthEvent::SignInStarted { .. }) => EventSeverity::Info,
            CoreEvent::Auth(AuthEvent::SignedIn { .. }) => EventSeverity::Info,
            CoreEvent::Auth(AuthEvent::SignedOut) => EventSeverity::Info,
            CoreEvent::Auth(AuthEvent::SessionResolved { .. }) => EventSeverity::Debug,
        }
    }
}

impl From<AuthEvent> for CoreEvent {
    fn from(event: AuthEvent) -> Self {
        CoreEvent::Auth(event)
    }
}

/// Event severity levels for filtering and logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum EventSeverity {
    /// Debug-level events (verbose)
    Debug,
    /// Informational events
    Info,
    /// Warning events
    Warning,
    /// Error events
    Error,
}

// ============================================================================
// Authentication Events
// ============================================================================

/// Events related to the session lifecycle.
#[derive(Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "event")]
pub enum AuthEvent {
    /// An OAuth redirect is about to leave the app.
    SignInStarted {
        /// The in-app path the user should land on after the round trip.
        return_to: Option<String>,
    },
    /// A session was established or restored.
    SignedIn {
        /// The provider's stable user identifier.
        user_id: String,
        /// The user's email address.
        email: String,
    },
    /// The session ended.
    SignedOut,
    /// Initial session bootstrap settled.
    SessionResolved {
        /// Whether a session was found.
        authenticated: bool,
    },
    /// The OAuth callback could not produce a session.
    CallbackFailed {
        /// Human-readable failure message.
        message: String,
    },
    /// A provider or storage operation failed.
    AuthError {
        /// Human-readable error message.
        message: String,
        /// Whether the error is recoverable (e.g., retry possible).
        recoverable: bool,
    },
}

impl AuthEvent {
    fn description(&self) -> &str {
        match self {
            AuthEvent::SignInStarted { .. } => "Sign-in redirect started",
            AuthEvent::SignedIn { .. } => "User signed in successfully",
            AuthEvent::SignedOut => "User signed out",
            AuthEvent::SessionResolved { .. } => "Initial session resolved",
            AuthEvent::CallbackFailed { .. } => "OAuth callback failed",
            AuthEvent::AuthError { .. } => "Authentication error",
        }
    }
}

// Events end up in host logs via Debug, which must not print addresses.
impl fmt::Debug for AuthEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AuthEvent::SignInStarted { return_to } => f
                .debug_struct("SignInStarted")
                .field("return_to", return_to)
                .finish(),
            AuthEvent::SignedIn { user_id, .. } => f
                .debug_struct("SignedIn")
                .field("user_id", user_id)
                .field("email", &"[REDACTED]")
                .finish(),
            AuthEvent::SignedOut => f.write_str("SignedOut"),
            AuthEvent::SessionResolved { authenticated } => f
                .debug_struct("SessionResolved")
                .field("authenticated", authenticated)
                .finish(),
            AuthEvent::CallbackFailed { message } => f
                .debug_struct("CallbackFailed")
                .field("message", message)
                .finish(),
            AuthEvent::AuthError {
                message,
                recoverable,
            } => f
                .debug_struct("AuthError")
                .field("message", message)
                .field("recoverable", recoverable)
                .finish(),
        }
    }
}

// ============================================================================
// Event Bus
// ============================================================================

/// Central event bus for publishing and subscribing to events.
///
/// Uses `tokio::sync::broadcast` internally, which provides:
/// - Multiple producers (clone the `EventBus`)
/// - Multiple consumers (each `subscribe()` creates a new receiver)
/// - Non-blocking sends (events are cloned for each subscriber)
/// - Lagging detection (slow subscribers get `RecvError::Lagged`)
///
/// # Example
///
/// ```rust
/// use core_runtime::events::{EventBus, CoreEvent, AuthEvent};
///
/// # #[tokio::main]
/// # async fn main() {
/// let event_bus = EventBus::new(100);
///
/// let mut subscriber = event_bus.subscribe();
///
/// let event = CoreEvent::Auth(AuthEvent::SessionResolved {
///     authenticated: false,
/// });
/// event_bus.emit(event).ok();
/// # }
/// ```
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
    ///   When a subscriber falls behind by more than this amount, it will
    ///   receive a `RecvError::Lagged` error.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Creates a new event bus with the default buffer size.
    #[allow(clippy::should_implement_trait)]
    pub fn default() -> Self {
        Self::new(DEFAULT_EVENT_BUFFER_SIZE)
    }

    /// Publishes an event to all subscribers.
    ///
    /// Returns the number of subscribers that received the event.
    /// Returns an error if there are no active subscribers; callers that
    /// treat events as fire-and-forget should discard it with `.ok()`.
    pub fn emit(&self, event: CoreEvent) -> Result<usize, SendError<CoreEvent>> {
        self.sender.send(event)
    }

    /// Creates a new subscriber to receive events.
    ///
    /// Each call creates an independent receiver that will receive all future
    /// events. Past events are not replayed.
    pub fn subscribe(&self) -> Receiver<CoreEvent> {
        self.sender.subscribe()
    }

    /// Returns the number of active subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
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

/// Type alias for event filter functions.
type EventFilter = Box<dyn Fn(&CoreEvent) -> bool + Send + Sync>;

/// A wrapper around `broadcast::Receiver` with additional filtering capabilities.
///
/// This provides a more ergonomic API for consuming events with optional filtering
/// by event type or severity.
///
/// # Example
///
/// ```rust
/// use core_runtime::events::{EventBus, EventStream, EventSeverity};
///
/// # #[tokio::main]
/// # async fn main() {
/// let event_bus = EventBus::new(100);
/// let stream = EventStream::new(event_bus.subscribe());
///
/// // Only warnings and errors
/// let mut alert_stream = stream.filter(|event| {
///     event.severity() >= EventSeverity::Warning
/// });
/// # }
/// ```
pub struct EventStream {
    receiver: Receiver<CoreEvent>,
    filter: Option<EventFilter>,
}

impl EventStream {
    /// Creates a new event stream from a receiver.
    pub fn new(receiver: Receiver<CoreEvent>) -> Self {
        Self {
            receiver,
            filter: None,
        }
    }

    /// Adds a filter function to this stream.
    ///
    /// Only events that match the filter will be returned by `recv()`.
    pub fn filter<F>(mut self, predicate: F) -> Self
    where
        F: Fn(&CoreEvent) -> bool + Send + Sync + 'static,
    {
        self.filter = Some(Box::new(predicate));
        self
    }

    /// Receives the next event that passes the filter (if any).
    ///
    /// This will skip events that don't match the filter and return the next
    /// matching event.
    ///
    /// # Errors
    ///
    /// Returns `RecvError::Lagged(n)` if the subscriber fell behind by `n` events.
    /// Returns `RecvError::Closed` if all senders have been dropped.
    pub async fn recv(&mut self) -> Result<CoreEvent, RecvError> {
        loop {
            let event = self.receiver.recv().await?;

            let Some(filter) = &self.filter else {
                return Ok(event);
            };

            if filter(&event) {
                return Ok(event);
            }

            // Event didn't match filter, continue to next event
        }
    }

    /// Attempts to receive an event without blocking.
    ///
    /// Returns `None` if no events are currently available.
    pub fn try_recv(&mut self) -> Option<Result<CoreEvent, RecvError>> {
        loop {
            match self.receiver.try_recv() {
                Ok(event) => {
                    let Some(filter) = &self.filter else {
                        return Some(Ok(event));
                    };

                    if filter(&event) {
                        return Some(Ok(event));
                    }

                    // Event didn't match filter, continue
                }
                Err(broadcast::error::TryRecvError::Empty) => return None,
                Err(broadcast::error::TryRecvError::Lagged(n)) => {
                    return Some(Err(RecvError::Lagged(n)))
                }
                Err(broadcast::error::TryRecvError::Closed) => return Some(Err(RecvError::Closed)),
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

// ============================================================================
// Tests
// ============================================================================
