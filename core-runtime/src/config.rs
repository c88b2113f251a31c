//! # Core Configuration Module
//!
//! Provides configuration management for the session core.
//!
//! ## Overview
//!
//! The configuration system uses a builder pattern to construct a `CoreConfig`
//! instance that holds all dependencies and settings the core needs. It
//! enforces fail-fast validation so a misconfigured host is caught at
//! startup, with one deliberate exception: the identity provider is
//! optional, and its absence means the app runs signed-out rather than
//! refusing to start.
//!
//! ## Required Dependencies
//!
//! - `frontend_origin` - Absolute origin the OAuth callback URL is built from
//! - `KeyValueStore` - Tab-scoped storage backing the return-path fallback
//! - `Navigator` - Router navigation
//!
//! ## Optional Dependencies (with defaults)
//!
//! - `IdentityProvider` - Absent means sign-in is disabled (fail open)
//! - `Clock` - Defaults to [`SystemClock`]
//! - `RouteConfig` - Defaults to `/`, `/auth/callback`, `/dashboard`
//! - Retry/redirect delays - Defaults tuned for the hosted provider
//!
//! ## Usage
//!
//! ```no_run
//! use core_runtime::config::CoreConfig;
//! use bridge_traits::{MemoryKeyValueStore, RecordingNavigator};
//! use std::sync::Arc;
//!
//! let config = CoreConfig::builder()
//!     .frontend_origin("https://app.spendsense.example")
//!     .return_path_store(Arc::new(MemoryKeyValueStore::new()))
//!     .navigator(Arc::new(RecordingNavigator::new()))
//!     .build()
//!     .expect("Failed to build config");
//! ```
//!
//! ## Error Handling
//!
//! The builder validates all required dependencies and provides actionable
//! error messages when something is missing or malformed, naming the builder
//! method that sets it.

use crate::error::{Error, Result};
use bridge_traits::{Clock, IdentityProvider, KeyValueStore, Navigator, SystemClock};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;
use url::Url;

/// Default delay before the callback page re-checks for a session.
pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_millis(450);

/// Default delay before a failed callback redirects to the landing route,
/// long enough for the transient message to be seen.
pub const DEFAULT_FAILURE_REDIRECT_DELAY: Duration = Duration::from_millis(800);

/// Public landing route.
pub const DEFAULT_LANDING_ROUTE: &str = "/";

/// Route the identity provider redirects back to.
pub const DEFAULT_CALLBACK_ROUTE: &str = "/auth/callback";

/// Canonical destination after sign-in when no return path survives.
pub const DEFAULT_POST_LOGIN_ROUTE: &str = "/dashboard";

/// In-app route surface the core navigates between.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteConfig {
    /// Public landing route, also the failure destination.
    pub landing: String,
    /// Callback route registered with the identity provider.
    pub callback: String,
    /// Default post-login destination.
    pub post_login: String,
}

impl Default for RouteConfig {
    fn default() -> Self {
        Self {
            landing: DEFAULT_LANDING_ROUTE.to_string(),
            callback: DEFAULT_CALLBACK_ROUTE.to_string(),
            post_login: DEFAULT_POST_LOGIN_ROUTE.to_string(),
        }
    }
}

impl RouteConfig {
    /// Validates that every route is an absolute in-app path.
    pub fn validate(&self) -> Result<()> {
        for (name, route) in [
            ("landing", &self.landing),
            ("callback", &self.callback),
            ("post_login", &self.post_login),
        ] {
            if !route.starts_with('/') {
                return Err(Error::Config(format!(
                    "Route '{}' must start with '/', got '{}'",
                    name, route
                )));
            }
        }
        Ok(())
    }
}

/// Core configuration for the session subsystem.
///
/// Holds all dependencies and settings required to construct the session
/// store and its collaborators. Use [`CoreConfigBuilder`] to create
/// instances.
#[derive(Clone)]
pub struct CoreConfig {
    /// Origin the callback URL is derived from (scheme + host + port only).
    pub frontend_origin: Url,

    /// Identity provider; `None` disables sign-in without disabling the app.
    pub identity_provider: Option<Arc<dyn IdentityProvider>>,

    /// Tab-scoped store for the return-path backup (required).
    pub return_path_store: Arc<dyn KeyValueStore>,

    /// Router navigation (required).
    pub navigator: Arc<dyn Navigator>,

    /// Time source, injectable for tests.
    pub clock: Arc<dyn Clock>,

    /// Route surface.
    pub routes: RouteConfig,

    /// Delay before the callback page's single session re-check.
    pub retry_delay: Duration,

    /// Delay between a callback failure and the redirect to landing.
    pub failure_redirect_delay: Duration,
}

impl std::fmt::Debug for CoreConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CoreConfig")
            .field("frontend_origin", &self.frontend_origin.as_str())
            .field(
                "identity_provider",
                &self
                    .identity_provider
                    .as_ref()
                    .map(|_| "IdentityProvider { ... }"),
            )
            .field("return_path_store", &"KeyValueStore { ... }")
            .field("navigator", &"Navigator { ... }")
            .field("clock", &"Clock { ... }")
            .field("routes", &self.routes)
            .field("retry_delay", &self.retry_delay)
            .field("failure_redirect_delay", &self.failure_redirect_delay)
            .finish()
    }
}

impl CoreConfig {
    /// Creates a new builder for constructing a `CoreConfig`.
    pub fn builder() -> CoreConfigBuilder {
        CoreConfigBuilder::default()
    }

    /// True when a provider is available and sign-in can be offered.
    pub fn sign_in_available(&self) -> bool {
        self.identity_provider.is_some()
    }

    /// Absolute URL the provider redirects back to after sign-in.
    pub fn callback_url(&self) -> String {
        // Url::join resolves an absolute path against the origin, so any
        // trailing slash on the configured origin is irrelevant.
        self.frontend_origin
            .join(&self.routes.callback)
            .map(|url| url.to_string())
            .unwrap_or_else(|_| {
                format!(
                    "{}{}",
                    self.frontend_origin.as_str().trim_end_matches('/'),
                    self.routes.callback
                )
            })
    }

    /// Validates the configuration and returns an error if invalid.
    ///
    /// This checks:
    /// - Routes are absolute in-app paths
    /// - Delays are within sane bounds
    pub fn validate(&self) -> Result<()> {
        self.routes.validate()?;

        if self.retry_delay > Duration::from_secs(60) {
            return Err(Error::Config(
                "Retry delay exceeds maximum of 60 seconds".to_string(),
            ));
        }

        if self.failure_redirect_delay > Duration::from_secs(60) {
            return Err(Error::Config(
                "Failure redirect delay exceeds maximum of 60 seconds".to_string(),
            ));
        }

        Ok(())
    }
}

fn parse_frontend_origin(raw: &str) -> Result<Url> {
    let url = Url::parse(raw).map_err(|e| {
        Error::Config(format!(
            "Frontend origin '{}' is not a valid URL: {}. \
             Expected something like 'https://app.example.com'.",
            raw, e
        ))
    })?;

    if url.scheme() != "http" && url.scheme() != "https" {
        return Err(Error::Config(format!(
            "Frontend origin must use http or https, got '{}'",
            url.scheme()
        )));
    }

    if url.path() != "/" || url.query().is_some() || url.fragment().is_some() {
        return Err(Error::Config(format!(
            "Frontend origin must be a bare origin without path, query, or fragment, got '{}'",
            raw
        )));
    }

    Ok(url)
}

/// Builder for constructing [`CoreConfig`] instances.
///
/// Use this builder to incrementally set configuration options and then
/// call [`build()`](CoreConfigBuilder::build) to create the final config.
/// The builder validates required dependencies and provides helpful error
/// messages.
#[derive(Default)]
pub struct CoreConfigBuilder {
    frontend_origin: Option<String>,
    identity_provider: Option<Arc<dyn IdentityProvider>>,
    return_path_store: Option<Arc<dyn KeyValueStore>>,
    navigator: Option<Arc<dyn Navigator>>,
    clock: Option<Arc<dyn Clock>>,
    routes: Option<RouteConfig>,
    retry_delay: Option<Duration>,
    failure_redirect_delay: Option<Duration>,
}

impl CoreConfigBuilder {
    /// Sets the frontend origin the callback URL is built from.
    ///
    /// Must be a bare `http`/`https` origin. A configured origin is used
    /// instead of whatever origin the host currently runs on, so reverse
    /// proxies and alternate hostnames cannot skew the provider's redirect
    /// target.
    pub fn frontend_origin(mut self, origin: impl Into<String>) -> Self {
        self.frontend_origin = Some(origin.into());
        self
    }

    /// Sets the identity provider implementation.
    ///
    /// Leaving this unset is valid: sign-in is disabled and the session
    /// store resolves to signed-out immediately.
    pub fn identity_provider(mut self, provider: Arc<dyn IdentityProvider>) -> Self {
        self.identity_provider = Some(provider);
        self
    }

    /// Sets the tab-scoped key-value store backing the return-path fallback
    /// (required).
    pub fn return_path_store(mut self, store: Arc<dyn KeyValueStore>) -> Self {
        self.return_path_store = Some(store);
        self
    }

    /// Sets the router navigation implementation (required).
    pub fn navigator(mut self, navigator: Arc<dyn Navigator>) -> Self {
        self.navigator = Some(navigator);
        self
    }

    /// Sets the time source.
    ///
    /// Defaults to [`SystemClock`]. Inject a fixed clock in tests to pin
    /// down state-token timestamps.
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    /// Sets the route surface.
    pub fn routes(mut self, routes: RouteConfig) -> Self {
        self.routes = Some(routes);
        self
    }

    /// Sets the delay before the callback page's single session re-check.
    ///
    /// Default: [`DEFAULT_RETRY_DELAY`].
    pub fn retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay = Some(delay);
        self
    }

    /// Sets the delay between a callback failure and the landing redirect.
    ///
    /// Default: [`DEFAULT_FAILURE_REDIRECT_DELAY`].
    pub fn failure_redirect_delay(mut self, delay: Duration) -> Self {
        self.failure_redirect_delay = Some(delay);
        self
    }

    /// Builds the final `CoreConfig` instance.
    ///
    /// # Returns
    ///
    /// Returns `Ok(CoreConfig)` on success, or an error if:
    /// - The frontend origin is missing or not a bare http(s) origin
    /// - Required bridges are missing (KeyValueStore, Navigator)
    /// - Routes or delays are invalid
    pub fn build(self) -> Result<CoreConfig> {
        let raw_origin = self.frontend_origin.ok_or_else(|| {
            Error::Config(
                "Frontend origin is required. Use .frontend_origin() to set it.".to_string(),
            )
        })?;
        let frontend_origin = parse_frontend_origin(&raw_origin)?;

        let return_path_store = self.return_path_store.ok_or_else(|| {
            Error::CapabilityMissing {
                capability: "KeyValueStore".to_string(),
                message: "A tab-scoped key-value store is required for the return-path \
                          backup. Web: wrap sessionStorage. Tests and headless hosts: \
                          use bridge_traits::MemoryKeyValueStore."
                    .to_string(),
            }
        })?;

        let navigator = self.navigator.ok_or_else(|| Error::CapabilityMissing {
            capability: "Navigator".to_string(),
            message: "A router navigation implementation is required. Web: wrap the \
                      SPA router. Tests: use bridge_traits::RecordingNavigator."
                .to_string(),
        })?;

        if self.identity_provider.is_none() {
            debug!("No identity provider configured; sign-in will be disabled");
        }

        let config = CoreConfig {
            frontend_origin,
            identity_provider: self.identity_provider,
            return_path_store,
            navigator,
            clock: self.clock.unwrap_or_else(|| Arc::new(SystemClock)),
            routes: self.routes.unwrap_or_default(),
            retry_delay: self.retry_delay.unwrap_or(DEFAULT_RETRY_DELAY),
            failure_redirect_delay: self
                .failure_redirect_delay
                .unwrap_or(DEFAULT_FAILURE_REDIRECT_DELAY),
        };

        config.validate()?;

        debug!(
            origin = %config.frontend_origin,
            sign_in_available = config.sign_in_available(),
            callback = %config.routes.callback,
            "Core configuration assembled"
        );

        Ok(config)
    }
}
