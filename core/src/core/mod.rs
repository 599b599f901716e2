pub(crate) mod config;
mod session;
mod transitions;

use std::sync::atomic::AtomicBool;
use std::sync::{Arc, RwLock};
use std::time::Duration;

use flume::Sender;
use tokio::sync::broadcast;

use crate::actions::AppAction;
use crate::auth::{AuthError, AuthGateway, AuthResult, SharedAuthGateway};
use crate::connection::{
    ConnectionEvent, ConnectionStatus, Connector, SessionError, SharedConnector,
};
use crate::credentials::{CredentialStore, Identity};
use crate::state::{AppState, AuthState, BusyState, RoomSummary, SessionView};
use crate::updates::{AppUpdate, CoreMsg, InternalEvent};

use transitions::{evaluate_connection_event, ConnInput};

/// The one live connection session, owned exclusively by the actor. The UI
/// only ever sees the `SessionView` published in `AppState`.
struct Session {
    identity: Identity,
    gen: u64,
    status: ConnectionStatus,
    /// First `Connected` of this session already observed.
    ready: bool,
    alive: Arc<AtomicBool>,
    close_tx: flume::Sender<()>,
}

/// Single-writer session orchestrator. All credential-store writes and all
/// published-state mutations happen on the one thread driving
/// `handle_message`; collaborator I/O runs on the owned tokio runtime and
/// re-enters through `CoreMsg::Internal`.
pub struct SessionCore {
    pub state: AppState,
    rev: u64,

    update_sender: Sender<AppUpdate>,
    core_sender: Sender<CoreMsg>,
    shared_state: Arc<RwLock<AppState>>,
    events_tx: broadcast::Sender<ConnectionEvent>,
    auth_gateway: SharedAuthGateway,
    connector: SharedConnector,

    config: config::AppConfig,
    runtime: tokio::runtime::Runtime,

    store: CredentialStore,
    session: Option<Session>,
    session_gen: u64,
    login_attempt: u64,
    toast_dismiss_token: u64,
}

impl SessionCore {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        update_sender: Sender<AppUpdate>,
        core_sender: Sender<CoreMsg>,
        data_dir: String,
        config: config::AppConfig,
        shared_state: Arc<RwLock<AppState>>,
        events_tx: broadcast::Sender<ConnectionEvent>,
        auth_gateway: SharedAuthGateway,
        connector: SharedConnector,
    ) -> Self {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(2)
            .enable_time()
            .enable_io()
            .build()
            .expect("tokio runtime");

        let store = CredentialStore::new(&data_dir);

        let this = Self {
            state: AppState::empty(),
            rev: 0,
            update_sender,
            core_sender,
            shared_state,
            events_tx,
            auth_gateway,
            connector,
            config,
            runtime,
            store,
            session: None,
            session_gen: 0,
            login_attempt: 0,
            toast_dismiss_token: 0,
        };

        // Ensure App::state() has an immediately-available snapshot.
        let initial = this.state.clone();
        this.commit_state_snapshot(&initial);
        this
    }

    fn auth_gateway(&self) -> Arc<dyn AuthGateway> {
        match self.auth_gateway.read() {
            Ok(g) => g.clone(),
            Err(poison) => poison.into_inner().clone(),
        }
    }

    fn connector(&self) -> Arc<dyn Connector> {
        match self.connector.read() {
            Ok(c) => c.clone(),
            Err(poison) => poison.into_inner().clone(),
        }
    }

    fn next_rev(&mut self) -> u64 {
        self.rev += 1;
        self.state.rev = self.rev;
        self.rev
    }

    fn commit_state_snapshot(&self, snapshot: &AppState) {
        match self.shared_state.write() {
            Ok(mut g) => *g = snapshot.clone(),
            Err(poison) => *poison.into_inner() = snapshot.clone(),
        }
    }

    fn emit_state(&mut self) {
        self.next_rev();
        let snapshot = self.state.clone();
        self.commit_state_snapshot(&snapshot);
        let _ = self.update_sender.send(AppUpdate::FullState(snapshot));
    }

    fn emit_session_ready(&mut self, user_id: String) {
        let rev = self.next_rev();
        // Keep snapshot rev in sync with the update stream even though this
        // is a side-effect update.
        let snapshot = self.state.clone();
        self.commit_state_snapshot(&snapshot);
        let _ = self
            .update_sender
            .send(AppUpdate::SessionReady { rev, user_id });
    }

    fn set_busy(&mut self, f: impl FnOnce(&mut BusyState)) {
        let mut next = self.state.busy.clone();
        f(&mut next);
        if next != self.state.busy {
            self.state.busy = next;
            self.emit_state();
        }
    }

    fn clear_busy(&mut self) {
        self.set_busy(|b| *b = BusyState::idle());
    }

    fn toast(&mut self, msg: impl Into<String>) {
        self.state.toast = Some(msg.into());
        self.toast_dismiss_token = self.toast_dismiss_token.saturating_add(1);
        self.schedule_toast_auto_dismiss(self.toast_dismiss_token);
        self.emit_state();
    }

    fn schedule_toast_auto_dismiss(&self, token: u64) {
        let tx = self.core_sender.clone();
        self.runtime.spawn(async move {
            tokio::time::sleep(Duration::from_secs(3)).await;
            let _ = tx.send(CoreMsg::Internal(Box::new(InternalEvent::ToastAutoDismiss {
                token,
            })));
        });
    }

    pub fn handle_message(&mut self, msg: CoreMsg) {
        match msg {
            CoreMsg::Action(ref action) => {
                // Never log `?action` directly: Login carries a password.
                tracing::info!(action = action.tag(), "dispatch");
                self.handle_action(action.clone());
            }
            CoreMsg::Internal(internal) => self.handle_internal(*internal),
        }
    }

    fn handle_action(&mut self, action: AppAction) {
        match action {
            AppAction::Login { email, password } => self.handle_login(email, password),
            AppAction::RestoreFromCache => self.handle_restore_from_cache(),
            AppAction::Logout => self.handle_logout(),
            AppAction::RefreshRooms => {
                if !self.state.is_ready() {
                    self.toast("Not connected");
                    return;
                }
                self.begin_rooms_load();
            }
            AppAction::ClearToast => {
                if self.state.toast.take().is_some() {
                    self.emit_state();
                }
            }
        }
    }

    fn handle_internal(&mut self, internal: InternalEvent) {
        match internal {
            InternalEvent::LoginFinished { attempt, result } => {
                self.handle_login_finished(attempt, result)
            }
            InternalEvent::Connection { session_gen, event } => {
                self.handle_connection_event(session_gen, event)
            }
            InternalEvent::RoomsLoaded {
                session_gen,
                result,
            } => self.handle_rooms_loaded(session_gen, result),
            InternalEvent::ToastAutoDismiss { token } => {
                if token == self.toast_dismiss_token && self.state.toast.take().is_some() {
                    self.emit_state();
                }
            }
        }
    }

    fn handle_login(&mut self, email: String, password: String) {
        let email = email.trim().to_string();
        if email.is_empty() || password.is_empty() {
            self.toast("Enter an email and password");
            return;
        }

        self.set_busy(|b| {
            b.logging_in = true;
            b.restoring = false;
        });

        self.login_attempt += 1;
        let attempt = self.login_attempt;
        let gateway = self.auth_gateway();
        let tx = self.core_sender.clone();
        self.runtime.spawn(async move {
            let result = gateway.login_with_email(&email, &password).await;
            let _ = tx.send(CoreMsg::Internal(Box::new(InternalEvent::LoginFinished {
                attempt,
                result,
            })));
        });
    }

    fn handle_login_finished(&mut self, attempt: u64, result: Result<AuthResult, AuthError>) {
        if attempt != self.login_attempt {
            // A later login or a logout superseded this attempt.
            tracing::info!(attempt, current = self.login_attempt, "stale login result dropped");
            return;
        }

        match result {
            Ok(auth) => {
                // Commit first, then connect: the fetch/commit split lives here,
                // not in the gateway.
                if let Err(e) = self.store.set_identity(&auth) {
                    tracing::warn!(%e, "identity commit failed");
                    self.clear_busy();
                    self.toast(format!("Login failed: {e}"));
                    return;
                }
                if let Err(e) = self.start_session(auth.identity()) {
                    self.clear_busy();
                    self.toast(format!("Login failed: {e}"));
                }
            }
            Err(e) => {
                // Prior published state stays untouched; the error kind is the
                // user-visible message.
                self.clear_busy();
                self.toast(format!("Login failed: {e}"));
            }
        }
    }

    fn handle_restore_from_cache(&mut self) {
        if let Some(sess) = self.session.as_ref() {
            // Re-entrant connect is a caller bug; refuse loudly and leave the
            // live session untouched.
            let e = SessionError::AlreadyConnected;
            tracing::error!(error = %e, user_id = %sess.identity.id, "restore refused");
            self.toast(format!("Restore failed: {e}"));
            return;
        }

        let Some(identity) = self.store.restore() else {
            tracing::info!("no cached identity, staying logged out");
            return;
        };
        if !identity.usable_for_connection() {
            self.toast("Cached identity is missing chat credentials");
            return;
        }

        self.set_busy(|b| b.restoring = true);
        // Unlike the login path there is no optimistic publish here: auth
        // flips to LoggedIn only once the first Connected event arrives.
        if let Err(e) = self.start_session(identity) {
            self.clear_busy();
            self.toast(format!("Restore failed: {e}"));
        }
    }

    fn handle_logout(&mut self) {
        // Cancels any in-flight login commit.
        self.login_attempt += 1;

        // Disconnect first, then clear the store, then publish once: a
        // consumer can never see "unauthenticated" while a connection is
        // still considered live.
        self.stop_session();
        self.store.clear();

        self.state.auth = AuthState::LoggedOut;
        self.state.session = None;
        self.state.rooms.clear();
        self.state.busy = BusyState::idle();
        self.emit_state();
    }

    fn handle_connection_event(&mut self, session_gen: u64, event: ConnectionEvent) {
        let input = match self.session.as_ref() {
            Some(sess) => ConnInput {
                current_gen: sess.gen,
                ready: sess.ready,
            },
            None => {
                tracing::debug!(session_gen, "connection event with no live session");
                return;
            }
        };

        let fx = evaluate_connection_event(input, session_gen, &event);
        if fx.ignore {
            tracing::debug!(session_gen, "stale connection event dropped");
            return;
        }

        // Fan out to live-event subscribers before touching state. Stale
        // events never reach them.
        let _ = self.events_tx.send(event);

        if let Some(room_id) = fx.bump_unread {
            if let Some(room) = self.state.rooms.iter_mut().find(|r| r.id == room_id) {
                room.unread += 1;
                self.emit_state();
            }
        }

        if fx.mark_ready {
            let Some(sess) = self.session.as_mut() else {
                return;
            };
            sess.ready = true;
            sess.status = ConnectionStatus::Connected;
            let user_id = sess.identity.id.clone();
            let email = sess.identity.email.clone();

            // The one place auth flips to LoggedIn: credentials committed AND
            // connection confirmed, published in a single snapshot.
            self.state.auth = AuthState::LoggedIn {
                user_id: user_id.clone(),
                email,
            };
            self.state.session = Some(SessionView {
                user_id: user_id.clone(),
                status: ConnectionStatus::Connected,
            });
            self.state.busy = BusyState::idle();
            self.emit_state();
            self.emit_session_ready(user_id);
            self.begin_rooms_load();
        } else if let Some(status) = fx.new_status {
            if let Some(sess) = self.session.as_mut() {
                sess.status = status;
            }
            let changed = match self.state.session.as_mut() {
                Some(view) if view.status != status => {
                    view.status = status;
                    true
                }
                _ => false,
            };
            if changed {
                self.emit_state();
            }
        }

        if let Some(reason) = fx.connect_failed {
            // Connect attempt died before ready: the view went back to
            // logged-out when the dial started, so only busy + toast need
            // attention. Cached credentials stay put; the caller decides
            // whether to retry.
            self.session = None;
            self.clear_busy();
            self.toast(format!("Connection failed: {reason}"));
        } else if fx.terminal {
            // Post-ready drop: auth stays LoggedIn, the view shows
            // Disconnected. A status change, not a login failure.
            self.session = None;
        }
    }

    fn handle_rooms_loaded(
        &mut self,
        session_gen: u64,
        result: Result<Vec<RoomSummary>, AuthError>,
    ) {
        let current = self.session.as_ref().map(|s| s.gen);
        if current != Some(session_gen) {
            tracing::debug!(session_gen, "rooms result for superseded session dropped");
            return;
        }

        self.set_busy(|b| b.loading_rooms = false);
        match result {
            Ok(rooms) => {
                tracing::info!(count = rooms.len(), "rooms loaded");
                self.state.rooms = rooms;
                self.emit_state();
            }
            Err(e) => {
                self.toast(format!("Failed to load rooms: {e}"));
            }
        }
    }
}
