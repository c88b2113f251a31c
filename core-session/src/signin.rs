//! Sign-In Initiator
//!
//! Starts the redirect-based OAuth flow: resolves where the user should
//! land afterwards, persists that destination twice (opaque state token
//! plus tab-scoped backup), and hands control to the identity provider.
//! On success the host is about to navigate away, so this module's last
//! observable act is the provider call itself.

use tracing::{error, info, instrument, warn};

use bridge_traits::OAuthRedirectRequest;
use core_runtime::config::CoreConfig;
use core_runtime::events::{AuthEvent, EventBus};
use core_runtime::logging::redact_url;

use crate::backup::ReturnPathBackup;
use crate::error::{AuthError, Result};
use crate::return_path::{encode_state, ReturnPath};

/// Options for a sign-in request.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SignInOptions {
    /// Override for the provider's redirect target. Defaults to the
    /// configured origin plus the callback route.
    pub redirect_to: Option<String>,
    /// Where the user should land after the flow completes. Values that
    /// are not app-internal paths fall back to the post-login default.
    pub return_to: Option<String>,
}

impl SignInOptions {
    /// Sign in and land on the post-login default afterwards.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the post-login destination.
    pub fn with_return_to(mut self, path: impl Into<String>) -> Self {
        self.return_to = Some(path.into());
        self
    }

    /// Overrides the provider's redirect target.
    pub fn with_redirect_to(mut self, url: impl Into<String>) -> Self {
        self.redirect_to = Some(url.into());
        self
    }
}

/// Starts the OAuth redirect flow against the configured provider.
pub struct SignInInitiator {
    config: CoreConfig,
    backup: ReturnPathBackup,
    event_bus: EventBus,
}

impl SignInInitiator {
    pub fn new(config: CoreConfig, event_bus: EventBus) -> Self {
        let backup = ReturnPathBackup::new(config.return_path_store.clone());
        Self {
            config,
            backup,
            event_bus,
        }
    }

    /// Begin the redirect flow.
    ///
    /// Returns without provider interaction when no identity provider is
    /// configured; the caller can surface that state in its UI. After a
    /// successful return the provider is navigating the host away and no
    /// further local work should be scheduled.
    ///
    /// # Errors
    ///
    /// - [`AuthError::Configuration`] when no provider is configured
    /// - [`AuthError::Provider`] when the provider rejects the redirect
    #[instrument(skip(self, options), fields(has_redirect_override = options.redirect_to.is_some()))]
    pub async fn sign_in(&self, options: SignInOptions) -> Result<()> {
        let Some(provider) = self.config.identity_provider.as_ref() else {
            warn!("Sign-in requested but no identity provider is configured");
            return Err(AuthError::Configuration(
                "No identity provider is configured, sign-in is unavailable".to_string(),
            ));
        };

        let redirect_url = options
            .redirect_to
            .clone()
            .unwrap_or_else(|| self.config.callback_url());

        let return_to = options
            .return_to
            .as_deref()
            .and_then(ReturnPath::parse)
            .unwrap_or_else(|| self.default_return_path());

        // Backup first: if the provider mangles the state token on the way
        // back, the callback page can still recover the destination.
        self.backup.save(&return_to).await;

        let state = encode_state(&return_to, self.config.clock.now());

        provider
            .start_oauth_redirect(OAuthRedirectRequest::new(redirect_url.clone(), state))
            .await
            .map_err(|e| {
                error!(error = %e, "Identity provider rejected the OAuth redirect");
                let _ = self.event_bus.emit(
                    AuthEvent::AuthError {
                        message: format!("Sign-in could not be started: {}", e),
                        recoverable: true,
                    }
                    .into(),
                );
                AuthError::Provider(e.to_string())
            })?;

        info!(
            return_to = %return_to,
            redirect_url = %redact_url(&redirect_url),
            "OAuth redirect started"
        );
        let _ = self.event_bus.emit(
            AuthEvent::SignInStarted {
                return_to: Some(return_to.as_str().to_string()),
            }
            .into(),
        );

        Ok(())
    }

    fn default_return_path(&self) -> ReturnPath {
        ReturnPath::parse(&self.config.routes.post_login).unwrap_or_else(ReturnPath::root)
    }
}
