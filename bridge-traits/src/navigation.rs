//! Navigation Abstraction
//!
//! Contract for the host's router. The core only ever asks for an in-app
//! navigation; how that maps to history entries, webview URLs, or native
//! view stacks is the host's concern.

use std::fmt;
use std::sync::Mutex;

use crate::error::Result;

/// Options for a navigation request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct NavigateOptions {
    /// Replace the current history entry instead of pushing a new one.
    pub replace: bool,
}

impl NavigateOptions {
    /// Push a new history entry (the default).
    pub fn push() -> Self {
        Self { replace: false }
    }

    /// Replace the current history entry, keeping it unreachable via
    /// back-navigation.
    pub fn replace() -> Self {
        Self { replace: true }
    }
}

/// Router navigation trait
///
/// Implementations perform the navigation synchronously from the core's
/// point of view; any animation or async routing happens on the host side
/// after this call returns.
pub trait Navigator: Send + Sync {
    /// Navigate to an in-app path such as `/dashboard`.
    ///
    /// # Errors
    ///
    /// Returns an error when the host router rejects the request. Callers
    /// in the core log and continue; a failed navigation never escalates.
    fn navigate(&self, path: &str, options: NavigateOptions) -> Result<()>;
}

/// A recorded navigation request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NavigationCall {
    pub path: String,
    pub options: NavigateOptions,
}

/// Navigator that records every request instead of navigating.
///
/// Reference implementation for tests and headless hosts.
#[derive(Default)]
pub struct RecordingNavigator {
    calls: Mutex<Vec<NavigationCall>>,
}

impl RecordingNavigator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of the recorded requests, in call order.
    pub fn calls(&self) -> Vec<NavigationCall> {
        self.calls.lock().expect("navigator lock poisoned").clone()
    }
}

impl Navigator for RecordingNavigator {
    fn navigate(&self, path: &str, options: NavigateOptions) -> Result<()> {
        let mut calls = self.calls.lock().expect("navigator lock poisoned");
        calls.push(NavigationCall {
            path: path.to_string(),
            options,
        });
        Ok(())
    }
}

impl fmt::Debug for RecordingNavigator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RecordingNavigator")
            .field("calls", &self.calls())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recording_navigator_captures_calls() {
        let navigator = RecordingNavigator::new();

        navigator
            .navigate("/dashboard", NavigateOptions::push())
            .unwrap();
        navigator.navigate("/", NavigateOptions::replace()).unwrap();

        let calls = navigator.calls();
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[0].path, "/dashboard");
        assert!(!calls[0].options.replace);
        assert_eq!(calls[1].path, "/");
        assert!(calls[1].options.replace);
    }

    #[test]
    fn test_navigate_options_defaults_to_push() {
        assert_eq!(NavigateOptions::default(), NavigateOptions::push());
    }
}
