//! Per-session state consumed by the object core.
//!
//! The session/context manager proper lives outside this crate; a [`Session`]
//! value is the slice of its state the core needs: the session identity, the
//! login state used to gate private-class objects, and the search cursor for
//! the find protocol. A session value is owned by exactly one caller thread
//! at a time (`&mut` access), so its state needs no locking.

use crate::id::SessionId;
use crate::store::search::SearchCursor;

/// Authentication state of the session, as reported by the session
/// collaborator.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LoginState {
    /// No user authentication; private-class objects are invisible.
    Public,
    /// User login completed; private-class objects are accessible.
    User,
}

/// The per-session view the object core operates on.
#[derive(Debug)]
pub struct Session {
    id: SessionId,
    login: LoginState,
    pub(crate) search: Option<SearchCursor>,
}

impl Session {
    /// New un-authenticated session.
    pub fn new() -> Self {
        Self::with_login(LoginState::Public)
    }

    /// New session with an explicit login state.
    pub fn with_login(login: LoginState) -> Self {
        Self {
            id: SessionId::new(),
            login,
            search: None,
        }
    }

    pub fn id(&self) -> SessionId {
        self.id
    }

    pub fn login(&self) -> LoginState {
        self.login
    }

    /// Update the login state; the session collaborator calls this on
    /// login/logout transitions.
    pub fn set_login(&mut self, login: LoginState) {
        self.login = login;
    }

    pub fn is_user_logged_in(&self) -> bool {
        self.login == LoginState::User
    }

    /// Whether an object search is active (Searching state).
    pub fn is_searching(&self) -> bool {
        self.search.is_some()
    }
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}
