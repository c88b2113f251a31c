//! # Session Core
//!
//! Client-side session lifecycle and OAuth redirect coordination.
//!
//! ## Overview
//!
//! This crate owns everything between "the user clicked sign in" and "a
//! protected view may render": starting the redirect to the identity
//! provider, carrying the intended destination through the round trip,
//! finalizing the callback, holding the resolved session as the single
//! source of truth, and gating protected routes on it.
//!
//! ## Components
//!
//! - [`SessionStore`] - resolved session + loading flag, provider-change
//!   subscription, generation-guarded teardown
//! - [`SignInInitiator`] - packages the return path and starts the
//!   provider redirect
//! - [`CallbackFinalizer`] - state machine for the provider's redirect
//!   back into the app
//! - [`RouteGuard`] - synchronous render/redirect decision for protected
//!   views
//! - [`ReturnPath`] codec + [`ReturnPathBackup`] - dual transport for the
//!   intended destination (opaque state token, tab-scoped fallback)
//!
//! ## Usage
//!
//! ```ignore
//! use core_session::{RouteGuard, SessionStore, SignInOptions};
//! use core_runtime::events::EventBus;
//! use std::sync::Arc;
//!
//! let event_bus = EventBus::default();
//! let store = Arc::new(SessionStore::new(config.clone(), event_bus.clone()));
//! let guard = RouteGuard::new(config, store.subscribe());
//!
//! store
//!     .sign_in(SignInOptions::new().with_return_to("/insights"))
//!     .await?;
//! ```

pub mod backup;
pub mod callback;
pub mod error;
pub mod guard;
pub mod return_path;
pub mod signin;
pub mod store;
pub mod types;

pub use backup::ReturnPathBackup;
pub use callback::{CallbackFinalizer, CallbackOutcome};
pub use error::{AuthError, Result};
pub use guard::{GuardDecision, RouteGuard};
pub use return_path::{decode_state, encode_state, ReturnPath};
pub use signin::{SignInInitiator, SignInOptions};
pub use store::SessionStore;
pub use types::SessionState;
