//! Callback Finalizer
//!
//! Completes the OAuth flow on the callback page. The provider has
//! redirected the browser back to `/auth/callback`; this module inspects
//! the callback URL, waits for the provider to finish minting the session,
//! and moves the user to where they wanted to go.
//!
//! State machine per page load:
//!
//! ```text
//! ENTERED -> (ERROR_DETECTED | AWAITING_SESSION)
//!         -> (RESOLVED | RETRYING)
//!         -> (RESOLVED | FAILED)
//! ```
//!
//! Every exit navigates with history replacement so the callback URL is
//! never reachable via back-navigation, and every exit consumes the
//! backed-up return path. The session re-check is limited to a single
//! retry; the page never hangs.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};
use url::Url;

use bridge_traits::{IdentityProvider, NavigateOptions};
use core_runtime::config::CoreConfig;
use core_runtime::events::{AuthEvent, EventBus};
use core_runtime::logging::redact_url;

use crate::backup::ReturnPathBackup;
use crate::error::AuthError;
use crate::return_path::{decode_state, ReturnPath};

/// Total session requests the callback page will make before giving up.
const SESSION_CHECK_ATTEMPTS: u32 = 2;

/// Terminal outcome of a callback page load.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CallbackOutcome {
    /// A session arrived and the user was sent to `destination`.
    Resolved { destination: String },
    /// The flow failed; the user was told why and sent to the landing
    /// route.
    Failed { message: String },
    /// The page was torn down mid-flight; nothing further happened.
    Cancelled,
}

/// Query parameters the finalizer reads from the callback URL.
#[derive(Debug, Default, PartialEq, Eq)]
struct CallbackParams {
    state: Option<String>,
    error: Option<String>,
    error_code: Option<String>,
    error_description: Option<String>,
}

impl CallbackParams {
    /// Extract the recognized parameters.
    ///
    /// Accepts a full URL or just a path with a query string. Anything
    /// unparseable is treated as carrying no parameters.
    fn parse(callback_url: &str) -> Self {
        let parsed = Url::parse(callback_url).or_else(|_| {
            // Hosts may hand over only the path and query.
            Url::parse("http://localhost").and_then(|base| base.join(callback_url))
        });

        let Ok(url) = parsed else {
            debug!("Callback URL did not parse; treating it as parameter-free");
            return Self::default();
        };

        let mut params = Self::default();
        for (key, value) in url.query_pairs() {
            match key.as_ref() {
                "state" => params.state = Some(value.into_owned()),
                "error" => params.error = Some(value.into_owned()),
                "error_code" => params.error_code = Some(value.into_owned()),
                "error_description" => params.error_description = Some(value.into_owned()),
                _ => {}
            }
        }
        params
    }

    /// User-facing message when the provider reported an error, preferring
    /// the human-readable description over the error code.
    fn provider_error_message(&self) -> Option<String> {
        if self.error.is_none() && self.error_code.is_none() && self.error_description.is_none() {
            return None;
        }

        Some(
            self.error_description
                .clone()
                .or_else(|| self.error.clone())
                .unwrap_or_else(|| "The identity provider reported an error.".to_string()),
        )
    }
}

/// How a round of session checking ended.
enum SessionWait {
    Present,
    Absent,
    ProviderFailure(String),
    Cancelled,
}

/// One-shot finalizer for the callback page.
///
/// Construct it when the callback page mounts and cancel the token when
/// the page unmounts; a cancelled finalizer stops where it is without
/// navigating.
pub struct CallbackFinalizer {
    config: CoreConfig,
    backup: ReturnPathBackup,
    event_bus: EventBus,
    cancel: CancellationToken,
}

impl CallbackFinalizer {
    pub fn new(config: CoreConfig, event_bus: EventBus, cancel: CancellationToken) -> Self {
        let backup = ReturnPathBackup::new(config.return_path_store.clone());
        Self {
            config,
            backup,
            event_bus,
            cancel,
        }
    }

    /// Run the callback flow to completion.
    ///
    /// Consumes the finalizer: the flow runs exactly once per page load.
    /// Never returns an error; every failure mode collapses into
    /// [`CallbackOutcome::Failed`] with a human-readable message.
    #[instrument(skip(self, callback_url))]
    pub async fn run(self, callback_url: &str) -> CallbackOutcome {
        debug!(url = %redact_url(callback_url), "Finalizing OAuth callback");
        let params = CallbackParams::parse(callback_url);

        if let Some(message) = params.provider_error_message() {
            warn!(
                error = params.error.as_deref().unwrap_or("unknown"),
                error_code = params.error_code.as_deref().unwrap_or(""),
                "Provider returned an error on the callback"
            );
            return self
                .fail(message, Some(self.config.failure_redirect_delay))
                .await;
        }

        let destination = self.resolve_destination(params.state.as_deref()).await;

        let Some(provider) = self.config.identity_provider.clone() else {
            warn!("Callback page loaded but no identity provider is configured");
            return self
                .fail(
                    "Authentication is not configured.".to_string(),
                    Some(self.config.failure_redirect_delay),
                )
                .await;
        };

        match self.await_session(&provider).await {
            SessionWait::Present => self.resolve(destination).await,
            SessionWait::Absent => {
                let exhausted = AuthError::RetryExhausted {
                    attempts: SESSION_CHECK_ATTEMPTS,
                };
                warn!(error = %exhausted, "Callback page gave up waiting for a session");
                // The retry delay already kept the user waiting; leave
                // immediately.
                self.fail("Sign-in did not complete. Please try again.".to_string(), None)
                    .await
            }
            SessionWait::ProviderFailure(message) => {
                self.fail(message, Some(self.config.failure_redirect_delay))
                    .await
            }
            SessionWait::Cancelled => CallbackOutcome::Cancelled,
        }
    }

    /// Destination for a successful sign-in: the state token, then the
    /// backup store, then the post-login default.
    async fn resolve_destination(&self, state: Option<&str>) -> ReturnPath {
        if let Some(token) = state {
            if let Some(path) = decode_state(token) {
                debug!(destination = %path, "Destination recovered from the state token");
                return path;
            }
        }

        if let Some(path) = self.backup.load().await {
            debug!(destination = %path, "Destination recovered from the backup store");
            return path;
        }

        ReturnPath::parse(&self.config.routes.post_login).unwrap_or_else(ReturnPath::root)
    }

    /// Ask the provider for a session, waiting out the code exchange with
    /// at most one delayed re-check.
    async fn await_session(&self, provider: &Arc<dyn IdentityProvider>) -> SessionWait {
        match self.check_session(provider).await {
            SessionWait::Absent => {}
            decided => return decided,
        }

        debug!(
            delay_ms = self.config.retry_delay.as_millis() as u64,
            "No session on first check; giving the provider time to settle"
        );
        if self.checked(sleep(self.config.retry_delay)).await.is_none() {
            return SessionWait::Cancelled;
        }

        self.check_session(provider).await
    }

    async fn check_session(&self, provider: &Arc<dyn IdentityProvider>) -> SessionWait {
        match self.checked(provider.current_session()).await {
            None => SessionWait::Cancelled,
            Some(Ok(Some(_session))) => SessionWait::Present,
            Some(Ok(None)) => SessionWait::Absent,
            Some(Err(e)) => {
                error!(error = %e, "Session lookup failed on the callback page");
                SessionWait::ProviderFailure(format!("Sign-in failed: {}", e))
            }
        }
    }

    async fn resolve(&self, destination: ReturnPath) -> CallbackOutcome {
        self.backup.clear().await;

        info!(destination = %destination, "Sign-in finalized");
        self.navigate(destination.as_str());
        CallbackOutcome::Resolved {
            destination: destination.as_str().to_string(),
        }
    }

    /// Enter `FAILED`: consume the backup, surface the message, and leave
    /// for the landing route, lingering first when a delay is given.
    async fn fail(&self, message: String, linger: Option<Duration>) -> CallbackOutcome {
        self.backup.clear().await;

        let _ = self.event_bus.emit(
            AuthEvent::CallbackFailed {
                message: message.clone(),
            }
            .into(),
        );

        if let Some(delay) = linger {
            if self.checked(sleep(delay)).await.is_none() {
                return CallbackOutcome::Cancelled;
            }
        }

        self.navigate(&self.config.routes.landing);
        CallbackOutcome::Failed { message }
    }

    fn navigate(&self, path: &str) {
        if let Err(e) = self
            .config
            .navigator
            .navigate(path, NavigateOptions::replace())
        {
            warn!(error = %e, path = %path, "Post-callback navigation failed");
        }
    }

    /// Race an operation against page teardown. `None` means cancelled.
    async fn checked<T>(&self, operation: impl Future<Output = T>) -> Option<T> {
        tokio::select! {
            _ = self.cancel.cancelled() => None,
            value = operation => Some(value),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::return_path::encode_state;
    use bridge_traits::error::{BridgeError, Result as BridgeResult};
    use bridge_traits::{
        AuthSession, KeyValueStore, MemoryKeyValueStore, OAuthRedirectRequest,
        RecordingNavigator, SessionChanges,
    };
    use chrono::Utc;
    use core_runtime::events::CoreEvent;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use tokio::sync::Notify;

    /// Provider that serves a scripted queue of session-check results.
    struct QueuedProvider {
        sessions: Mutex<VecDeque<BridgeResult<Option<AuthSession>>>>,
        fetch_calls: AtomicUsize,
        fetch_gate: Option<Arc<Notify>>,
    }

    impl QueuedProvider {
        fn new(
            sessions: impl IntoIterator<Item = BridgeResult<Option<AuthSession>>>,
        ) -> Arc<Self> {
            Arc::new(Self {
                sessions: Mutex::new(sessions.into_iter().collect()),
                fetch_calls: AtomicUsize::new(0),
                fetch_gate: None,
            })
        }

        fn gated(gate: Arc<Notify>) -> Arc<Self> {
            Arc::new(Self {
                sessions: Mutex::new(VecDeque::new()),
                fetch_calls: AtomicUsize::new(0),
                fetch_gate: Some(gate),
            })
        }

        fn fetch_calls(&self) -> usize {
            self.fetch_calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait::async_trait]
    impl IdentityProvider for QueuedProvider {
        async fn current_session(&self) -> BridgeResult<Option<AuthSession>> {
            self.fetch_calls.fetch_add(1, Ordering::SeqCst);
            if let Some(gate) = &self.fetch_gate {
                gate.notified().await;
            }
            self.sessions
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or(Ok(None))
        }

        async fn start_oauth_redirect(&self, _request: OAuthRedirectRequest) -> BridgeResult<()> {
            Ok(())
        }

        fn subscribe_session_changes(&self) -> BridgeResult<SessionChanges> {
            let (_sender, changes) = SessionChanges::channel();
            Ok(changes)
        }

        async fn sign_out(&self) -> BridgeResult<()> {
            Ok(())
        }
    }

    struct Fixture {
        finalizer: CallbackFinalizer,
        navigator: Arc<RecordingNavigator>,
        store: Arc<MemoryKeyValueStore>,
        event_bus: EventBus,
        cancel: CancellationToken,
    }

    fn fixture(provider: Option<Arc<QueuedProvider>>) -> Fixture {
        let navigator = Arc::new(RecordingNavigator::new());
        let store = Arc::new(MemoryKeyValueStore::new());
        let event_bus = EventBus::default();
        let cancel = CancellationToken::new();

        let mut builder = CoreConfig::builder()
            .frontend_origin("https://app.spendsense.example")
            .return_path_store(store.clone())
            .navigator(navigator.clone())
            .retry_delay(Duration::from_millis(5))
            .failure_redirect_delay(Duration::from_millis(5));
        if let Some(provider) = provider {
            builder = builder.identity_provider(provider);
        }
        let config = builder.build().unwrap();

        Fixture {
            finalizer: CallbackFinalizer::new(config, event_bus.clone(), cancel.clone()),
            navigator,
            store,
            event_bus,
            cancel,
        }
    }

    fn session() -> AuthSession {
        AuthSession::new("user-123", "alice@example.com")
    }

    fn callback_url_with_state(state: &str) -> String {
        format!("https://app.spendsense.example/auth/callback?state={}", state)
    }

    #[tokio::test]
    async fn test_resolves_to_state_destination() {
        let provider = QueuedProvider::new([Ok(Some(session()))]);
        let fixture = fixture(Some(provider.clone()));

        let state = encode_state(&ReturnPath::parse("/insights").unwrap(), Utc::now());
        let outcome = fixture
            .finalizer
            .run(&callback_url_with_state(&state))
            .await;

        assert_eq!(
            outcome,
            CallbackOutcome::Resolved {
                destination: "/insights".to_string()
            }
        );
        assert_eq!(provider.fetch_calls(), 1);

        let calls = fixture.navigator.calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].path, "/insights");
        assert!(calls[0].options.replace);
    }

    #[tokio::test]
    async fn test_provider_error_params_fail_without_session_request() {
        let provider = QueuedProvider::new([Ok(Some(session()))]);
        let fixture = fixture(Some(provider.clone()));
        fixture
            .store
            .set("auth:return_path", "/insights")
            .await
            .unwrap();
        let mut events = fixture.event_bus.subscribe();

        let outcome = fixture
            .finalizer
            .run(
                "https://app.spendsense.example/auth/callback?error=access_denied\
                 &error_code=user_cancel&error_description=User%20cancelled%20the%20flow",
            )
            .await;

        assert_eq!(
            outcome,
            CallbackOutcome::Failed {
                message: "User cancelled the flow".to_string()
            }
        );
        // The provider is never consulted on an error callback.
        assert_eq!(provider.fetch_calls(), 0);
        // The backup is consumed even on failure.
        assert_eq!(fixture.store.get("auth:return_path").await.unwrap(), None);

        let calls = fixture.navigator.calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].path, "/");
        assert!(calls[0].options.replace);

        match events.try_recv().unwrap() {
            CoreEvent::Auth(AuthEvent::CallbackFailed { message }) => {
                assert_eq!(message, "User cancelled the flow")
            }
            other => panic!("Unexpected event: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_error_param_without_description_uses_error() {
        let provider = QueuedProvider::new([Ok(Some(session()))]);
        let fixture = fixture(Some(provider));

        let outcome = fixture
            .finalizer
            .run("https://app.spendsense.example/auth/callback?error=access_denied")
            .await;

        assert_eq!(
            outcome,
            CallbackOutcome::Failed {
                message: "access_denied".to_string()
            }
        );
    }

    #[tokio::test]
    async fn test_corrupt_state_falls_back_to_backup() {
        let provider = QueuedProvider::new([Ok(Some(session()))]);
        let fixture = fixture(Some(provider));
        fixture
            .store
            .set("auth:return_path", "/settings")
            .await
            .unwrap();

        let outcome = fixture
            .finalizer
            .run(&callback_url_with_state("not-a-valid-token"))
            .await;

        assert_eq!(
            outcome,
            CallbackOutcome::Resolved {
                destination: "/settings".to_string()
            }
        );
        assert_eq!(fixture.navigator.calls()[0].path, "/settings");
        // Consumed on success.
        assert_eq!(fixture.store.get("auth:return_path").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_missing_state_and_backup_defaults_to_post_login() {
        let provider = QueuedProvider::new([Ok(Some(session()))]);
        let fixture = fixture(Some(provider));

        let outcome = fixture
            .finalizer
            .run("https://app.spendsense.example/auth/callback")
            .await;

        assert_eq!(
            outcome,
            CallbackOutcome::Resolved {
                destination: "/dashboard".to_string()
            }
        );
    }

    #[tokio::test]
    async fn test_retries_exactly_once_then_fails() {
        let provider = QueuedProvider::new([Ok(None), Ok(None)]);
        let fixture = fixture(Some(provider.clone()));

        let outcome = fixture
            .finalizer
            .run("https://app.spendsense.example/auth/callback")
            .await;

        assert_eq!(provider.fetch_calls(), 2);
        assert!(matches!(outcome, CallbackOutcome::Failed { .. }));
        let calls = fixture.navigator.calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].path, "/");
        assert!(calls[0].options.replace);
    }

    #[tokio::test]
    async fn test_session_on_retry_resolves() {
        let provider = QueuedProvider::new([Ok(None), Ok(Some(session()))]);
        let fixture = fixture(Some(provider.clone()));

        let state = encode_state(&ReturnPath::parse("/insights").unwrap(), Utc::now());
        let outcome = fixture
            .finalizer
            .run(&callback_url_with_state(&state))
            .await;

        assert_eq!(provider.fetch_calls(), 2);
        assert_eq!(
            outcome,
            CallbackOutcome::Resolved {
                destination: "/insights".to_string()
            }
        );
    }

    #[tokio::test]
    async fn test_session_lookup_failure_fails_without_retry() {
        let provider = QueuedProvider::new([Err(BridgeError::OperationFailed(
            "network down".to_string(),
        ))]);
        let fixture = fixture(Some(provider.clone()));

        let outcome = fixture
            .finalizer
            .run("https://app.spendsense.example/auth/callback")
            .await;

        assert_eq!(provider.fetch_calls(), 1);
        assert!(matches!(outcome, CallbackOutcome::Failed { .. }));
        assert_eq!(fixture.navigator.calls()[0].path, "/");
    }

    #[tokio::test]
    async fn test_unparseable_url_is_treated_as_parameter_free() {
        let provider = QueuedProvider::new([Ok(Some(session()))]);
        let fixture = fixture(Some(provider));

        let outcome = fixture.finalizer.run("::::").await;

        assert_eq!(
            outcome,
            CallbackOutcome::Resolved {
                destination: "/dashboard".to_string()
            }
        );
    }

    #[tokio::test]
    async fn test_path_and_query_form_is_accepted() {
        let provider = QueuedProvider::new([Ok(Some(session()))]);
        let fixture = fixture(Some(provider));

        let state = encode_state(&ReturnPath::parse("/insights").unwrap(), Utc::now());
        let outcome = fixture
            .finalizer
            .run(&format!("/auth/callback?state={}", state))
            .await;

        assert_eq!(
            outcome,
            CallbackOutcome::Resolved {
                destination: "/insights".to_string()
            }
        );
    }

    #[tokio::test]
    async fn test_unconfigured_provider_fails_with_message() {
        let fixture = fixture(None);

        let outcome = fixture
            .finalizer
            .run("https://app.spendsense.example/auth/callback")
            .await;

        assert_eq!(
            outcome,
            CallbackOutcome::Failed {
                message: "Authentication is not configured.".to_string()
            }
        );
        assert_eq!(fixture.navigator.calls()[0].path, "/");
    }

    #[tokio::test]
    async fn test_cancellation_during_session_fetch() {
        let gate = Arc::new(Notify::new());
        let provider = QueuedProvider::gated(gate.clone());
        let fixture = fixture(Some(provider));
        fixture
            .store
            .set("auth:return_path", "/insights")
            .await
            .unwrap();

        let cancel = fixture.cancel.clone();
        let navigator = fixture.navigator.clone();
        let run = tokio::spawn(
            fixture
                .finalizer
                .run("https://app.spendsense.example/auth/callback"),
        );

        tokio::task::yield_now().await;
        cancel.cancel();

        let outcome = run.await.unwrap();
        assert_eq!(outcome, CallbackOutcome::Cancelled);
        // No navigation happened on the torn-down page.
        assert!(navigator.calls().is_empty());
    }

    #[tokio::test]
    async fn test_cancellation_during_retry_delay() {
        let provider = QueuedProvider::new([Ok(None)]);
        let fixture = fixture(Some(provider.clone()));

        // Long delay so cancellation clearly lands inside it.
        let navigator = Arc::new(RecordingNavigator::new());
        let cancel = CancellationToken::new();
        let config = CoreConfig::builder()
            .frontend_origin("https://app.spendsense.example")
            .return_path_store(Arc::new(MemoryKeyValueStore::new()))
            .navigator(navigator.clone())
            .identity_provider(provider.clone())
            .retry_delay(Duration::from_secs(30))
            .build()
            .unwrap();
        let finalizer = CallbackFinalizer::new(config, EventBus::default(), cancel.clone());

        let run =
            tokio::spawn(finalizer.run("https://app.spendsense.example/auth/callback"));

        // Let the first check complete and the retry sleep begin.
        while provider.fetch_calls() == 0 {
            tokio::task::yield_now().await;
        }
        tokio::task::yield_now().await;
        cancel.cancel();

        let outcome = run.await.unwrap();
        assert_eq!(outcome, CallbackOutcome::Cancelled);
        assert_eq!(provider.fetch_calls(), 1);
        assert!(navigator.calls().is_empty());
    }

    #[tokio::test]
    async fn test_cancellation_during_failure_redirect_delay() {
        let navigator = Arc::new(RecordingNavigator::new());
        let cancel = CancellationToken::new();
        let event_bus = EventBus::default();
        let config = CoreConfig::builder()
            .frontend_origin("https://app.spendsense.example")
            .return_path_store(Arc::new(MemoryKeyValueStore::new()))
            .navigator(navigator.clone())
            .failure_redirect_delay(Duration::from_secs(30))
            .build()
            .unwrap();
        let finalizer = CallbackFinalizer::new(config, event_bus.clone(), cancel.clone());
        let mut events = event_bus.subscribe();

        let run = tokio::spawn(
            finalizer.run("https://app.spendsense.example/auth/callback?error=access_denied"),
        );

        // The failure message is emitted before the redirect delay starts.
        match events.recv().await.unwrap() {
            CoreEvent::Auth(AuthEvent::CallbackFailed { .. }) => {}
            other => panic!("Unexpected event: {:?}", other),
        }
        cancel.cancel();

        let outcome = run.await.unwrap();
        assert_eq!(outcome, CallbackOutcome::Cancelled);
        assert!(navigator.calls().is_empty());
    }

    #[tokio::test]
    async fn test_navigation_failure_does_not_change_outcome() {
        struct FailingNavigator;
        impl bridge_traits::Navigator for FailingNavigator {
            fn navigate(
                &self,
                _path: &str,
                _options: NavigateOptions,
            ) -> BridgeResult<()> {
                Err(BridgeError::OperationFailed("router offline".to_string()))
            }
        }

        let provider = QueuedProvider::new([Ok(Some(session()))]);
        let cancel = CancellationToken::new();
        let config = CoreConfig::builder()
            .frontend_origin("https://app.spendsense.example")
            .return_path_store(Arc::new(MemoryKeyValueStore::new()))
            .navigator(Arc::new(FailingNavigator))
            .identity_provider(provider)
            .build()
            .unwrap();
        let finalizer = CallbackFinalizer::new(config, EventBus::default(), cancel);

        let outcome = finalizer
            .run("https://app.spendsense.example/auth/callback")
            .await;

        assert_eq!(
            outcome,
            CallbackOutcome::Resolved {
                destination: "/dashboard".to_string()
            }
        );
    }

    #[test]
    fn test_callback_params_parsing() {
        let params = CallbackParams::parse(
            "https://app.spendsense.example/auth/callback?state=abc&error=denied&other=x",
        );
        assert_eq!(params.state.as_deref(), Some("abc"));
        assert_eq!(params.error.as_deref(), Some("denied"));
        assert_eq!(params.error_code, None);
        assert_eq!(params.error_description, None);

        assert_eq!(CallbackParams::parse("::::"), CallbackParams::default());
        assert_eq!(
            CallbackParams::parse("https://app.spendsense.example/auth/callback"),
            CallbackParams::default()
        );
    }
}
