#[derive(Debug, Clone)]
pub enum AppAction {
    // Auth
    Login { email: String, password: String },
    RestoreFromCache,
    Logout,

    // Rooms
    RefreshRooms,

    // UI
    ClearToast,
}

impl AppAction {
    /// Log-safe action tag (never includes secrets like passwords).
    pub fn tag(&self) -> &'static str {
        match self {
            AppAction::Login { .. } => "Login",
            AppAction::RestoreFromCache => "RestoreFromCache",
            AppAction::Logout => "Logout",
            AppAction::RefreshRooms => "RefreshRooms",
            AppAction::ClearToast => "ClearToast",
        }
    }
}
