//! # Host Bridge Traits
//!
//! Platform abstraction traits that must be implemented by each host shell.
//!
//! ## Overview
//!
//! This crate defines the contract between the session core and the
//! host-specific glue around it. Each trait represents a capability the core
//! requires but that must be implemented differently per host (web shell,
//! desktop webview, test harness).
//!
//! ## Traits
//!
//! ### Identity
//! - [`IdentityProvider`](identity::IdentityProvider) - Session fetch, OAuth redirect, sign-out, pushed session changes
//!
//! ### Storage & Navigation
//! - [`KeyValueStore`](storage::KeyValueStore) - Tab-scoped string storage for the return-path backup
//! - [`Navigator`](navigation::Navigator) - Router navigation with push/replace semantics
//!
//! ### Utilities
//! - [`Clock`](time::Clock) - Time source for deterministic testing
//! - [`LoggerSink`](time::LoggerSink) - Forward structured logs to host logging
//!
//! ## Fail-Open Identity
//!
//! Unlike the other capabilities, the identity provider is optional by
//! design: a host without one gets a permanently signed-out but otherwise
//! functional app. The config layer therefore models it as
//! `Option<Arc<dyn IdentityProvider>>` rather than failing fast:
//!
//! ```ignore
//! match config.identity_provider {
//!     Some(provider) => bootstrap_session(provider),
//!     None => resolve_signed_out(),
//! }
//! ```
//!
//! ## Error Handling
//!
//! All bridge traits use the [`BridgeError`](error::BridgeError) type for
//! consistent error handling. Host implementations should:
//!
//! - Convert host-specific errors to `BridgeError`
//! - Provide actionable error messages
//! - Include error context (e.g., which provider call failed)
//!
//! ## Thread Safety
//!
//! All bridge traits require `Send + Sync` bounds to support safe concurrent
//! usage across async tasks. Implementations must ensure thread safety.
//!
//! ## Examples
//!
//! ### Implementing KeyValueStore
//!
//! ```ignore
//! use bridge_traits::storage::KeyValueStore;
//! use bridge_traits::error::Result;
//! use async_trait::async_trait;
//!
//! pub struct SessionStorageStore {
//!     // handle into the host's sessionStorage
//! }
//!
//! #[async_trait]
//! impl KeyValueStore for SessionStorageStore {
//!     async fn get(&self, key: &str) -> Result<Option<String>> {
//!         todo!()
//!     }
//!
//!     async fn set(&self, key: &str, value: &str) -> Result<()> {
//!         todo!()
//!     }
//!
//!     async fn remove(&self, key: &str) -> Result<()> {
//!         todo!()
//!     }
//! }
//! ```

pub mod error;
pub mod identity;
pub mod navigation;
pub mod storage;
pub mod time;

pub use error::BridgeError;

// Re-export commonly used types
pub use identity::{
    AuthSession, IdentityProvider, OAuthRedirectRequest, SessionChange, SessionChanges,
};
pub use navigation::{NavigateOptions, NavigationCall, Navigator, RecordingNavigator};
pub use storage::{KeyValueStore, MemoryKeyValueStore};
pub use time::{Clock, LogEntry, LogLevel, LoggerSink, SystemClock};
