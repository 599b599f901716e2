// Published state snapshot types.

use serde::Deserialize;

use crate::connection::ConnectionStatus;

/// Published authentication state. `LoggedIn` is only published once the
/// first `Connected` event of the current session has been confirmed, so a
/// consumer never observes "authenticated" paired with a missing connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthState {
    LoggedOut,
    LoggedIn { user_id: String, email: String },
}

/// Read reference to the live connection session. Present iff `auth` is
/// `LoggedIn`, and always bound to the identity currently cached.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionView {
    pub user_id: String,
    pub status: ConnectionStatus,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct RoomSummary {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub unread: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct BusyState {
    pub logging_in: bool,
    pub restoring: bool,
    pub loading_rooms: bool,
}

impl BusyState {
    pub fn idle() -> Self {
        Self::default()
    }
}

/// The Published Session View: one atomically-replaced snapshot of
/// everything consumers render. Snapshots are committed whole, so the
/// (auth, session) pair can never be observed mid-transition.
#[derive(Debug, Clone, PartialEq)]
pub struct AppState {
    pub rev: u64,
    pub auth: AuthState,
    pub session: Option<SessionView>,
    pub rooms: Vec<RoomSummary>,
    pub busy: BusyState,
    pub toast: Option<String>,
}

impl AppState {
    pub fn empty() -> Self {
        Self {
            rev: 0,
            auth: AuthState::LoggedOut,
            session: None,
            rooms: vec![],
            busy: BusyState::idle(),
            toast: None,
        }
    }

    /// Dependent work (room loads, message handling) is gated on this:
    /// authenticated AND connected, never one without the other.
    pub fn is_ready(&self) -> bool {
        matches!(self.auth, AuthState::LoggedIn { .. })
            && self
                .session
                .as_ref()
                .map(|s| s.status == ConnectionStatus::Connected)
                .unwrap_or(false)
    }
}
