//! Workspace umbrella crate.
//!
//! Re-exports the individual workspace crates (`bridge-traits`,
//! `core-runtime`, `core-session`) so host applications can depend on
//! `spendsense-core` alone instead of wiring each crate individually.

pub use bridge_traits;
pub use core_runtime;
pub use core_session;
