//! Identity Provider Abstraction
//!
//! Contract for the hosted identity service that issues sessions and drives
//! the redirect-based OAuth flow. The core never talks to the provider's
//! network API directly; hosts wrap their SDK (or raw HTTP integration)
//! behind this trait.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use tokio::sync::mpsc;

use crate::error::Result;

/// Authenticated identity record held client-side after sign-in.
///
/// Owned by the session layer and replaced wholesale on every provider
/// state change; consumers must never mutate it in place. `raw` carries the
/// provider's original user payload for host-specific needs the normalized
/// fields don't cover.
#[derive(Clone, PartialEq, Serialize, Deserialize)]
pub struct AuthSession {
    /// Provider-issued stable user identifier.
    pub user_id: String,
    /// Primary email address of the signed-in user.
    pub email: String,
    /// Profile picture URL, when the provider supplies one.
    pub avatar_url: Option<String>,
    /// Raw provider user payload, untouched.
    pub raw: Value,
}

impl AuthSession {
    /// Create a session record with no avatar and no raw payload.
    pub fn new(user_id: impl Into<String>, email: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            email: email.into(),
            avatar_url: None,
            raw: Value::Null,
        }
    }

    /// Attach an avatar URL.
    pub fn with_avatar_url(mut self, url: impl Into<String>) -> Self {
        self.avatar_url = Some(url.into());
        self
    }

    /// Build a session from a provider user payload.
    ///
    /// Expects at least `id` and `email` string fields; returns `None` when
    /// either is missing so malformed payloads degrade to "no session"
    /// rather than a partially-populated record. The avatar is taken from
    /// `user_metadata.avatar_url`, falling back to `user_metadata.picture`
    /// (social providers disagree on the field name).
    pub fn from_provider_payload(payload: Value) -> Option<Self> {
        let user_id = payload.get("id")?.as_str()?.to_string();
        let email = payload.get("email")?.as_str()?.to_string();

        let avatar_url = payload
            .get("user_metadata")
            .and_then(|meta| {
                meta.get("avatar_url")
                    .or_else(|| meta.get("picture"))
            })
            .and_then(Value::as_str)
            .map(str::to_string);

        Some(Self {
            user_id,
            email,
            avatar_url,
            raw: payload,
        })
    }
}

impl fmt::Debug for AuthSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthSession")
            .field("user_id", &self.user_id)
            .field("email", &"[REDACTED]")
            .field("has_avatar", &self.avatar_url.is_some())
            .finish()
    }
}

/// A provider-pushed session state change.
///
/// `session: None` means the user is now signed out (explicit sign-out or
/// provider-reported expiry); `Some` replaces the current session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionChange {
    pub session: Option<AuthSession>,
}

impl SessionChange {
    /// Change announcing a (new or refreshed) session.
    pub fn signed_in(session: AuthSession) -> Self {
        Self {
            session: Some(session),
        }
    }

    /// Change announcing the absence of a session.
    pub fn signed_out() -> Self {
        Self { session: None }
    }
}

/// Stream of provider-pushed session changes.
///
/// Dropping the stream is the unsubscribe: the provider side observes the
/// closed channel and releases its callback registration.
pub struct SessionChanges {
    receiver: mpsc::UnboundedReceiver<SessionChange>,
}

impl SessionChanges {
    /// Wrap an existing receiver.
    pub fn new(receiver: mpsc::UnboundedReceiver<SessionChange>) -> Self {
        Self { receiver }
    }

    /// Create a connected sender/stream pair.
    ///
    /// Host implementations keep the sender inside their provider adapter
    /// and hand the stream to the core.
    pub fn channel() -> (mpsc::UnboundedSender<SessionChange>, Self) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (sender, Self { receiver })
    }

    /// Receive the next change, in delivery order.
    ///
    /// Returns `None` once the provider side has dropped the sender.
    pub async fn recv(&mut self) -> Option<SessionChange> {
        self.receiver.recv().await
    }
}

impl fmt::Debug for SessionChanges {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionChanges").finish()
    }
}

/// Parameters for initiating the provider's OAuth redirect.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OAuthRedirectRequest {
    /// Absolute URL the provider should redirect back to.
    pub redirect_url: String,
    /// Opaque state token round-tripped through the provider.
    pub opaque_state: String,
}

impl OAuthRedirectRequest {
    pub fn new(redirect_url: impl Into<String>, opaque_state: impl Into<String>) -> Self {
        Self {
            redirect_url: redirect_url.into(),
            opaque_state: opaque_state.into(),
        }
    }
}

/// Async identity provider trait
///
/// Abstracts the hosted auth service (session issuance, OAuth redirect,
/// sign-out). Implementations should:
/// - Translate SDK/network failures into `BridgeError::OperationFailed`
/// - Deliver session changes in the order the provider emits them
/// - Treat `start_oauth_redirect` success as "navigation is underway";
///   callers only observe the return value when the provider rejects the
///   request before navigating
///
/// # Example
///
/// ```ignore
/// use bridge_traits::identity::{IdentityProvider, OAuthRedirectRequest};
///
/// async fn check_signed_in(provider: &dyn IdentityProvider) -> bool {
///     matches!(provider.current_session().await, Ok(Some(_)))
/// }
/// ```
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// Fetch the current session, if any.
    ///
    /// # Errors
    ///
    /// Returns an error when the provider cannot be reached or rejects the
    /// request; "reachable but signed out" is `Ok(None)`.
    async fn current_session(&self) -> Result<Option<AuthSession>>;

    /// Ask the provider to begin the OAuth redirect.
    ///
    /// On success the browser (or host webview) navigates away and this
    /// process is about to be torn down.
    async fn start_oauth_redirect(&self, request: OAuthRedirectRequest) -> Result<()>;

    /// Subscribe to provider-pushed session changes.
    ///
    /// At most one subscription is required by the core; dropping the
    /// returned stream unsubscribes.
    fn subscribe_session_changes(&self) -> Result<SessionChanges>;

    /// Ask the provider to terminate the current session.
    ///
    /// A successful call is expected to be followed by a `SessionChange`
    /// with `session: None` on the subscription stream.
    async fn sign_out(&self) -> Result<()>;
}
