//! Route Guard
//!
//! Synchronous decision point for protected views. Each mount of a
//! protected route asks the guard what to do with the current session
//! state:
//!
//! | state                      | decision              | navigation          |
//! |----------------------------|-----------------------|---------------------|
//! | `loading == true`          | `CheckingSession`     | none                |
//! | resolved, no session       | `RedirectedToLanding` | replace with landing |
//! | resolved, session present  | `Render`              | none                |
//!
//! The redirect carries the attempted path as a `return_to` query
//! parameter so a subsequent sign-in can bring the user back. It replaces
//! the denied route's history entry; pressing back from the landing page
//! lands before the denied attempt instead of re-entering the guard.

use tokio::sync::watch;
use tracing::{debug, info, warn};
use url::form_urlencoded;

use bridge_traits::NavigateOptions;
use core_runtime::config::CoreConfig;

use crate::return_path::ReturnPath;
use crate::types::SessionState;

/// What a protected view should do with the current attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GuardDecision {
    /// A session is present; render the protected content.
    Render,
    /// The bootstrap has not settled; show an interstitial and re-check
    /// when the state changes.
    CheckingSession,
    /// No session; the guard has already navigated to the landing route.
    RedirectedToLanding,
}

/// Gatekeeper for protected routes.
///
/// Construct one per shell with the store's state subscription:
///
/// ```ignore
/// let guard = RouteGuard::new(config.clone(), store.subscribe());
/// match guard.check("/reports/q3") {
///     GuardDecision::Render => { /* mount the view */ }
///     GuardDecision::CheckingSession => { /* spinner */ }
///     GuardDecision::RedirectedToLanding => { /* nothing to do */ }
/// }
/// ```
pub struct RouteGuard {
    config: CoreConfig,
    state: watch::Receiver<SessionState>,
}

impl RouteGuard {
    pub fn new(config: CoreConfig, state: watch::Receiver<SessionState>) -> Self {
        Self { config, state }
    }

    /// Decide whether `attempted_path` may render right now.
    ///
    /// Denied attempts navigate exactly once per call; the caller renders
    /// nothing and waits for the router to move on.
    pub fn check(&self, attempted_path: &str) -> GuardDecision {
        let state = self.state.borrow().clone();

        if state.loading {
            debug!(path = %attempted_path, "Session still resolving; holding the route");
            return GuardDecision::CheckingSession;
        }

        if state.session.is_some() {
            return GuardDecision::Render;
        }

        let target = self.landing_with_return_to(attempted_path);
        info!(
            path = %attempted_path,
            "Unauthenticated access to a protected route; redirecting to landing"
        );
        if let Err(e) = self
            .config
            .navigator
            .navigate(&target, NavigateOptions::replace())
        {
            warn!(error = %e, "Landing redirect failed");
        }
        GuardDecision::RedirectedToLanding
    }

    /// Landing route with the attempted path attached as `return_to`,
    /// when the attempted path is a usable in-app route.
    fn landing_with_return_to(&self, attempted_path: &str) -> String {
        let landing = &self.config.routes.landing;

        match ReturnPath::parse(attempted_path) {
            Some(path) => {
                let query = form_urlencoded::Serializer::new(String::new())
                    .append_pair("return_to", path.as_str())
                    .finish();
                format!("{}?{}", landing, query)
            }
            None => landing.clone(),
        }
    }
}
