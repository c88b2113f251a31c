//! Session Store
//!
//! Single owner of the client-side session state. The store resolves the
//! initial session on construction, listens for provider-pushed changes,
//! and fans the resulting state out to any number of watchers. Consumers
//! never mutate session state themselves; they observe whole-state
//! replacements through [`SessionStore::subscribe`].
//!
//! ## State lifecycle
//!
//! Construction starts at `loading: true`. Exactly one resolution clears
//! it: the fail-open signed-out resolution (no provider configured), the
//! initial provider fetch, or an earlier provider-pushed change. `loading`
//! never returns to `true`; teardown leaves whatever state was last
//! applied.
//!
//! ## Liveness
//!
//! Every background continuation captures the store's generation at spawn
//! time and re-checks it before applying a result. [`SessionStore::shutdown`]
//! bumps the generation and aborts the background tasks, so work that
//! completes after teardown is discarded instead of mutating a dead store.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, instrument, warn};

use bridge_traits::{AuthSession, IdentityProvider, SessionChanges};
use core_runtime::config::CoreConfig;
use core_runtime::events::{AuthEvent, EventBus};

use crate::error::{AuthError, Result};
use crate::signin::{SignInInitiator, SignInOptions};
use crate::types::SessionState;

/// State shared between the store handle and its background tasks.
struct StoreShared {
    state: watch::Sender<SessionState>,
    generation: AtomicU64,
    /// Serializes generation checks against state writes so a teardown
    /// between check and write cannot leak a stale update.
    write_lock: Mutex<()>,
    event_bus: EventBus,
}

impl StoreShared {
    fn current_generation(&self) -> u64 {
        self.generation.load(Ordering::SeqCst)
    }

    /// Replace the state with a resolved snapshot, unless the store has
    /// been torn down since `generation` was captured.
    fn apply_if_current(&self, generation: u64, session: Option<AuthSession>) -> bool {
        let _guard = self.write_lock.lock().expect("state write lock poisoned");
        if self.generation.load(Ordering::SeqCst) != generation {
            debug!("Discarding session resolution for a torn-down store");
            return false;
        }
        self.state.send_replace(SessionState::resolved(session));
        true
    }

    fn invalidate(&self) {
        let _guard = self.write_lock.lock().expect("state write lock poisoned");
        self.generation.fetch_add(1, Ordering::SeqCst);
    }
}

/// Owner of session state and the session lifecycle tasks.
///
/// Construct once per app instance, share as `Arc<SessionStore>`, and call
/// [`shutdown`](Self::shutdown) (or drop the store) on teardown. Must be
/// created from within a Tokio runtime.
pub struct SessionStore {
    shared: Arc<StoreShared>,
    initiator: SignInInitiator,
    provider: Option<Arc<dyn IdentityProvider>>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl SessionStore {
    /// Create the store and start resolving the session.
    ///
    /// Without a configured identity provider the state resolves to
    /// signed-out before this returns. With one, a bootstrap task fetches
    /// the current session and a subscription task applies provider-pushed
    /// changes for the lifetime of the store.
    pub fn new(config: CoreConfig, event_bus: EventBus) -> Self {
        let (state, _) = watch::channel(SessionState::resolving());
        let shared = Arc::new(StoreShared {
            state,
            generation: AtomicU64::new(0),
            write_lock: Mutex::new(()),
            event_bus: event_bus.clone(),
        });

        let provider = config.identity_provider.clone();
        let mut tasks = Vec::new();

        match &provider {
            None => {
                debug!("No identity provider configured; resolving signed-out");
                let generation = shared.current_generation();
                shared.apply_if_current(generation, None);
                let _ = shared.event_bus.emit(
                    AuthEvent::SessionResolved {
                        authenticated: false,
                    }
                    .into(),
                );
            }
            Some(provider) => {
                let generation = shared.current_generation();

                let bootstrap_shared = Arc::clone(&shared);
                let bootstrap_provider = Arc::clone(provider);
                tasks.push(tokio::spawn(async move {
                    Self::run_bootstrap(bootstrap_shared, bootstrap_provider, generation).await;
                }));

                match provider.subscribe_session_changes() {
                    Ok(changes) => {
                        let subscription_shared = Arc::clone(&shared);
                        tasks.push(tokio::spawn(async move {
                            Self::run_subscription(subscription_shared, changes, generation).await;
                        }));
                    }
                    Err(e) => {
                        warn!(
                            error = %e,
                            "Session change subscription failed; later sign-ins and sign-outs \
                             will not be observed"
                        );
                    }
                }
            }
        }

        Self {
            shared,
            initiator: SignInInitiator::new(config, event_bus),
            provider,
            tasks: Mutex::new(tasks),
        }
    }

    /// Synchronous snapshot of the current state.
    pub fn state(&self) -> SessionState {
        self.shared.state.borrow().clone()
    }

    /// Watch the state. The receiver yields the current value immediately
    /// and a change notification for every replacement; dropping it
    /// unsubscribes.
    pub fn subscribe(&self) -> watch::Receiver<SessionState> {
        self.shared.state.subscribe()
    }

    /// True when an identity provider is configured and sign-in can be
    /// offered in the UI.
    pub fn sign_in_available(&self) -> bool {
        self.provider.is_some()
    }

    /// Start the redirect-based sign-in flow.
    ///
    /// See [`SignInInitiator::sign_in`] for the contract.
    pub async fn sign_in(&self, options: SignInOptions) -> Result<()> {
        self.initiator.sign_in(options).await
    }

    /// Ask the provider to terminate the session.
    ///
    /// Local state is not cleared here: the provider acknowledges the
    /// sign-out by pushing a signed-out change through the subscription
    /// stream, and that change is what clears the session. UIs reflect the
    /// sign-out when it has actually happened.
    ///
    /// # Errors
    ///
    /// - [`AuthError::Configuration`] when no provider is configured
    /// - [`AuthError::Provider`] when the provider rejects the request
    #[instrument(skip(self))]
    pub async fn sign_out(&self) -> Result<()> {
        let Some(provider) = self.provider.as_ref() else {
            return Err(AuthError::Configuration(
                "No identity provider is configured, there is no session to sign out of"
                    .to_string(),
            ));
        };

        provider.sign_out().await.map_err(|e| {
            error!(error = %e, "Provider sign-out failed");
            let _ = self.shared.event_bus.emit(
                AuthEvent::AuthError {
                    message: format!("Sign-out failed: {}", e),
                    recoverable: true,
                }
                .into(),
            );
            AuthError::Provider(e.to_string())
        })?;

        info!("Sign-out requested; awaiting provider confirmation");
        Ok(())
    }

    /// Tear the store down.
    ///
    /// Bumps the generation so in-flight continuations are discarded,
    /// aborts the background tasks, and drops the provider subscription.
    /// Idempotent; also runs on drop.
    pub fn shutdown(&self) {
        self.shared.invalidate();
        let mut tasks = self.tasks.lock().expect("task list lock poisoned");
        for task in tasks.drain(..) {
            task.abort();
        }
    }

    async fn run_bootstrap(
        shared: Arc<StoreShared>,
        provider: Arc<dyn IdentityProvider>,
        generation: u64,
    ) {
        let (session, fetch_error) = match provider.current_session().await {
            Ok(session) => (session, None),
            Err(e) => (None, Some(e)),
        };

        let authenticated = session.is_some();
        if !shared.apply_if_current(generation, session) {
            return;
        }

        if let Some(e) = fetch_error {
            warn!(error = %e, "Initial session fetch failed; starting signed-out");
            let _ = shared.event_bus.emit(
                AuthEvent::AuthError {
                    message: format!("Session restore failed: {}", e),
                    recoverable: true,
                }
                .into(),
            );
        }

        debug!(authenticated, "Initial session resolved");
        let _ = shared
            .event_bus
            .emit(AuthEvent::SessionResolved { authenticated }.into());
    }

    async fn run_subscription(
        shared: Arc<StoreShared>,
        mut changes: SessionChanges,
        generation: u64,
    ) {
        while let Some(change) = changes.recv().await {
            let event = match &change.session {
                Some(session) => AuthEvent::SignedIn {
                    user_id: session.user_id.clone(),
                    email: session.email.clone(),
                },
                None => AuthEvent::SignedOut,
            };

            if !shared.apply_if_current(generation, change.session) {
                break;
            }
            let _ = shared.event_bus.emit(event.into());
        }
        debug!("Session change stream ended");
    }
}

impl Drop for SessionStore {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl std::fmt::Debug for SessionStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionStore")
            .field("state", &self.state())
            .field("sign_in_available", &self.sign_in_available())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bridge_traits::error::{BridgeError, Result as BridgeResult};
    use bridge_traits::{
        MemoryKeyValueStore, OAuthRedirectRequest, RecordingNavigator, SessionChange,
    };
    use core_runtime::events::CoreEvent;
    use std::sync::atomic::AtomicUsize;
    use tokio::sync::broadcast::error::TryRecvError;
    use tokio::sync::{mpsc, Notify};

    /// Provider with a scripted initial session and a caller-held sender
    /// for pushed changes.
    struct ScriptedProvider {
        initial_session: Option<AuthSession>,
        fail_fetch: bool,
        fetch_gate: Option<Arc<Notify>>,
        fetch_calls: AtomicUsize,
        changes: Mutex<Option<SessionChanges>>,
        sign_out_calls: AtomicUsize,
    }

    impl ScriptedProvider {
        fn new(
            initial_session: Option<AuthSession>,
        ) -> (Arc<Self>, mpsc::UnboundedSender<SessionChange>) {
            Self::build(initial_session, false, None)
        }

        fn failing_fetch() -> (Arc<Self>, mpsc::UnboundedSender<SessionChange>) {
            Self::build(None, true, None)
        }

        fn gated(
            initial_session: Option<AuthSession>,
            gate: Arc<Notify>,
        ) -> (Arc<Self>, mpsc::UnboundedSender<SessionChange>) {
            Self::build(initial_session, false, Some(gate))
        }

        fn build(
            initial_session: Option<AuthSession>,
            fail_fetch: bool,
            fetch_gate: Option<Arc<Notify>>,
        ) -> (Arc<Self>, mpsc::UnboundedSender<SessionChange>) {
            let (sender, changes) = SessionChanges::channel();
            let provider = Arc::new(Self {
                initial_session,
                fail_fetch,
                fetch_gate,
                fetch_calls: AtomicUsize::new(0),
                changes: Mutex::new(Some(changes)),
                sign_out_calls: AtomicUsize::new(0),
            });
            (provider, sender)
        }
    }

    #[async_trait::async_trait]
    impl IdentityProvider for ScriptedProvider {
        async fn current_session(&self) -> BridgeResult<Option<AuthSession>> {
            self.fetch_calls.fetch_add(1, Ordering::SeqCst);
            if let Some(gate) = &self.fetch_gate {
                gate.notified().await;
            }
            if self.fail_fetch {
                return Err(BridgeError::OperationFailed("network down".to_string()));
            }
            Ok(self.initial_session.clone())
        }

        async fn start_oauth_redirect(&self, _request: OAuthRedirectRequest) -> BridgeResult<()> {
            Ok(())
        }

        fn subscribe_session_changes(&self) -> BridgeResult<SessionChanges> {
            self.changes
                .lock()
                .unwrap()
                .take()
                .ok_or_else(|| BridgeError::OperationFailed("already subscribed".to_string()))
        }

        async fn sign_out(&self) -> BridgeResult<()> {
            self.sign_out_calls.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    fn config_with_provider(provider: Option<Arc<dyn IdentityProvider>>) -> CoreConfig {
        let mut builder = CoreConfig::builder()
            .frontend_origin("https://app.spendsense.example")
            .return_path_store(Arc::new(MemoryKeyValueStore::new()))
            .navigator(Arc::new(RecordingNavigator::new()));
        if let Some(provider) = provider {
            builder = builder.identity_provider(provider);
        }
        builder.build().unwrap()
    }

    fn test_session() -> AuthSession {
        AuthSession::new("user-123", "alice@example.com")
    }

    #[tokio::test]
    async fn test_store_without_provider_resolves_signed_out() {
        let event_bus = EventBus::default();
        let mut events = event_bus.subscribe();

        let store = SessionStore::new(config_with_provider(None), event_bus);

        // Resolution happens before the constructor returns.
        let state = store.state();
        assert!(!state.loading);
        assert!(!state.is_authenticated());
        assert!(!store.sign_in_available());

        match events.try_recv().unwrap() {
            CoreEvent::Auth(AuthEvent::SessionResolved { authenticated }) => {
                assert!(!authenticated)
            }
            other => panic!("Unexpected event: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_bootstrap_resolves_existing_session() {
        let (provider, _sender) = ScriptedProvider::new(Some(test_session()));
        let event_bus = EventBus::default();
        let mut events = event_bus.subscribe();

        let store = SessionStore::new(config_with_provider(Some(provider.clone())), event_bus);
        let mut state_rx = store.subscribe();

        state_rx.changed().await.unwrap();
        let state = store.state();
        assert!(!state.loading);
        assert!(state.is_authenticated());
        assert_eq!(provider.fetch_calls.load(Ordering::SeqCst), 1);

        match events.try_recv().unwrap() {
            CoreEvent::Auth(AuthEvent::SessionResolved { authenticated }) => {
                assert!(authenticated)
            }
            other => panic!("Unexpected event: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_bootstrap_fetch_failure_degrades_to_signed_out() {
        let (provider, _sender) = ScriptedProvider::failing_fetch();
        let event_bus = EventBus::default();
        let mut events = event_bus.subscribe();

        let store = SessionStore::new(config_with_provider(Some(provider)), event_bus);
        let mut state_rx = store.subscribe();

        state_rx.changed().await.unwrap();
        let state = store.state();
        assert!(!state.loading);
        assert!(!state.is_authenticated());

        match events.try_recv().unwrap() {
            CoreEvent::Auth(AuthEvent::AuthError { recoverable, .. }) => assert!(recoverable),
            other => panic!("Unexpected event: {:?}", other),
        }
        match events.try_recv().unwrap() {
            CoreEvent::Auth(AuthEvent::SessionResolved { authenticated }) => {
                assert!(!authenticated)
            }
            other => panic!("Unexpected event: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_loading_clears_exactly_once() {
        let gate = Arc::new(Notify::new());
        let (provider, sender) = ScriptedProvider::gated(None, gate.clone());

        let store = SessionStore::new(config_with_provider(Some(provider)), EventBus::default());
        let mut state_rx = store.subscribe();

        assert!(state_rx.borrow().loading);

        gate.notify_one();
        state_rx.changed().await.unwrap();
        assert!(!state_rx.borrow().loading);

        // Later changes keep loading settled.
        sender
            .send(SessionChange::signed_in(test_session()))
            .unwrap();
        state_rx.changed().await.unwrap();
        {
            let state = state_rx.borrow();
            assert!(!state.loading);
            assert!(state.is_authenticated());
        }

        sender.send(SessionChange::signed_out()).unwrap();
        state_rx.changed().await.unwrap();
        assert!(!state_rx.borrow().loading);
    }

    #[tokio::test]
    async fn test_session_changes_replace_state_and_emit() {
        let (provider, sender) = ScriptedProvider::new(None);
        let event_bus = EventBus::default();
        let mut events = event_bus.subscribe();

        let store = SessionStore::new(config_with_provider(Some(provider)), event_bus);
        let mut state_rx = store.subscribe();
        state_rx.changed().await.unwrap();

        // Bootstrap event first.
        match events.try_recv().unwrap() {
            CoreEvent::Auth(AuthEvent::SessionResolved { .. }) => {}
            other => panic!("Unexpected event: {:?}", other),
        }

        sender
            .send(SessionChange::signed_in(test_session()))
            .unwrap();
        state_rx.changed().await.unwrap();
        assert!(store.state().is_authenticated());
        match events.try_recv().unwrap() {
            CoreEvent::Auth(AuthEvent::SignedIn { user_id, .. }) => {
                assert_eq!(user_id, "user-123")
            }
            other => panic!("Unexpected event: {:?}", other),
        }

        sender.send(SessionChange::signed_out()).unwrap();
        state_rx.changed().await.unwrap();
        assert!(!store.state().is_authenticated());
        match events.try_recv().unwrap() {
            CoreEvent::Auth(AuthEvent::SignedOut) => {}
            other => panic!("Unexpected event: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_sign_out_waits_for_provider_change() {
        let (provider, sender) = ScriptedProvider::new(Some(test_session()));

        let store =
            SessionStore::new(config_with_provider(Some(provider.clone())), EventBus::default());
        let mut state_rx = store.subscribe();
        state_rx.changed().await.unwrap();
        assert!(store.state().is_authenticated());

        store.sign_out().await.unwrap();
        assert_eq!(provider.sign_out_calls.load(Ordering::SeqCst), 1);

        // Still signed in locally until the provider pushes the change.
        assert!(store.state().is_authenticated());

        sender.send(SessionChange::signed_out()).unwrap();
        state_rx.changed().await.unwrap();
        assert!(!store.state().is_authenticated());
    }

    #[tokio::test]
    async fn test_sign_out_without_provider_is_configuration_error() {
        let store = SessionStore::new(config_with_provider(None), EventBus::default());

        let error = store.sign_out().await.unwrap_err();
        assert!(matches!(error, AuthError::Configuration(_)));
    }

    #[tokio::test]
    async fn test_shutdown_discards_inflight_resolution() {
        let gate = Arc::new(Notify::new());
        let (provider, _sender) = ScriptedProvider::gated(Some(test_session()), gate.clone());
        let event_bus = EventBus::default();
        let mut events = event_bus.subscribe();

        let store = SessionStore::new(config_with_provider(Some(provider)), event_bus);

        // Let the bootstrap task reach its await on the gate.
        tokio::task::yield_now().await;
        store.shutdown();

        gate.notify_one();
        for _ in 0..10 {
            tokio::task::yield_now().await;
        }

        // The fetch never lands: no state change, no events.
        assert!(store.state().loading);
        assert!(matches!(events.try_recv(), Err(TryRecvError::Empty)));
    }

    #[tokio::test]
    async fn test_shutdown_is_idempotent() {
        let store = SessionStore::new(config_with_provider(None), EventBus::default());
        store.shutdown();
        store.shutdown();
    }

    #[tokio::test]
    async fn test_stale_generation_is_discarded() {
        let (state, _) = watch::channel(SessionState::resolving());
        let shared = StoreShared {
            state,
            generation: AtomicU64::new(0),
            write_lock: Mutex::new(()),
            event_bus: EventBus::default(),
        };

        let generation = shared.current_generation();
        shared.invalidate();

        assert!(!shared.apply_if_current(generation, Some(test_session())));
        assert!(shared.state.borrow().loading);

        // A continuation from the new generation still applies.
        assert!(shared.apply_if_current(shared.current_generation(), None));
        assert!(!shared.state.borrow().loading);
    }

    #[tokio::test]
    async fn test_drop_detaches_subscription() {
        let (provider, sender) = ScriptedProvider::new(None);

        let store = SessionStore::new(config_with_provider(Some(provider)), EventBus::default());
        let mut state_rx = store.subscribe();
        state_rx.changed().await.unwrap();

        drop(store);
        for _ in 0..10 {
            tokio::task::yield_now().await;
        }

        // The subscription task is gone; its receiver has been dropped.
        assert!(sender.send(SessionChange::signed_in(test_session())).is_err());
    }
}
