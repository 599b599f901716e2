use crate::actions::AppAction;
use crate::auth::{AuthError, AuthResult};
use crate::connection::ConnectionEvent;
use crate::state::{AppState, RoomSummary};

#[derive(Clone, Debug)]
pub enum AppUpdate {
    /// Primary update stream: always a full state snapshot. Simplest possible
    /// reconciliation story for consumers; can be made granular later.
    FullState(AppState),
    /// Side-channel notification that the session just became ready
    /// (authenticated AND connected). Consumers that only care about the
    /// ready edge subscribe to this instead of diffing snapshots.
    SessionReady { rev: u64, user_id: String },
}

impl AppUpdate {
    pub fn rev(&self) -> u64 {
        match self {
            AppUpdate::FullState(s) => s.rev,
            AppUpdate::SessionReady { rev, .. } => *rev,
        }
    }
}

#[derive(Debug)]
pub enum CoreMsg {
    Action(AppAction),
    Internal(Box<InternalEvent>),
}

/// Completions of collaborator I/O, re-entering the single-writer loop.
/// Never log these with `?`: login results carry credentials.
#[derive(Debug)]
pub enum InternalEvent {
    LoginFinished {
        attempt: u64,
        result: Result<AuthResult, AuthError>,
    },
    Connection {
        session_gen: u64,
        event: ConnectionEvent,
    },
    RoomsLoaded {
        session_gen: u64,
        result: Result<Vec<RoomSummary>, AuthError>,
    },
    ToastAutoDismiss {
        token: u64,
    },
}
