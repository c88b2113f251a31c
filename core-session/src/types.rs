use bridge_traits::AuthSession;

/// Snapshot of the session store's observable state.
///
/// `loading` is `true` only during the bootstrap window between store
/// creation and the first resolution. Once it drops to `false` it never
/// returns to `true` for the lifetime of the store.
///
/// # Examples
///
/// ```
/// use core_session::SessionState;
///
/// let state = SessionState::resolving();
/// assert!(state.loading);
/// assert!(!state.is_authenticated());
///
/// let settled = SessionState::resolved(None);
/// assert!(!settled.loading);
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct SessionState {
    /// The current session, or `None` when signed out or unresolved.
    pub session: Option<AuthSession>,
    /// Whether the initial bootstrap is still in flight.
    pub loading: bool,
}

impl SessionState {
    /// State before the first resolution: no session, bootstrap in flight.
    pub fn resolving() -> Self {
        Self {
            session: None,
            loading: true,
        }
    }

    /// State after a resolution settled (bootstrap, provider event, or
    /// sign-out event).
    pub fn resolved(session: Option<AuthSession>) -> Self {
        Self {
            session,
            loading: false,
        }
    }

    /// True when a session is present.
    pub fn is_authenticated(&self) -> bool {
        self.session.is_some()
    }
}

impl Default for SessionState {
    fn default() -> Self {
        Self::resolving()
    }
}
