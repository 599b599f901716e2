mod actions;
mod auth;
mod connection;
mod core;
mod credentials;
mod logging;
mod state;
mod updates;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};
use std::thread;

use flume::{Receiver, Sender};
use tokio::sync::broadcast;

pub use actions::AppAction;
pub use auth::{AuthError, AuthGateway, AuthResult, HttpAuthGateway, SharedAuthGateway};
pub use connection::{
    ChatMessage, ConnectionEvent, ConnectionFailure, ConnectionHandle, ConnectionStatus, Connector,
    Envelope, SessionError, SharedConnector, WsConnector,
};
pub use credentials::{CredentialStore, Identity, PersistenceError};
pub use state::{AppState, AuthState, BusyState, RoomSummary, SessionView};
pub use updates::{AppUpdate, CoreMsg, InternalEvent};

const CONNECTION_EVENTS_CAPACITY: usize = 256;

pub trait AppReconciler: Send + Sync + 'static {
    fn reconcile(&self, update: AppUpdate);
}

/// Handle onto the session core. Construction spawns the single-writer actor
/// thread; everything else is message passing against it.
pub struct App {
    core_tx: Sender<CoreMsg>,
    update_rx: Receiver<AppUpdate>,
    listening: AtomicBool,
    shared_state: Arc<RwLock<AppState>>,
    events_tx: broadcast::Sender<ConnectionEvent>,
    auth_gateway: SharedAuthGateway,
    connector: SharedConnector,
}

impl App {
    pub fn new(data_dir: String) -> Arc<Self> {
        logging::init_logging();
        tracing::info!(data_dir = %data_dir, "App::new() starting");

        let config = crate::core::config::load_app_config(&data_dir);

        let (update_tx, update_rx) = flume::unbounded();
        let (core_tx, core_rx) = flume::unbounded::<CoreMsg>();
        let (events_tx, _) = broadcast::channel(CONNECTION_EVENTS_CAPACITY);
        let shared_state = Arc::new(RwLock::new(AppState::empty()));

        let auth_gateway: SharedAuthGateway = Arc::new(RwLock::new(Arc::new(
            HttpAuthGateway::new(config.auth_base_url()),
        )));
        let connector: SharedConnector = Arc::new(RwLock::new(Arc::new(WsConnector)));

        // Actor loop thread (single-writer context for all state transitions).
        let core_tx_for_core = core_tx.clone();
        let shared_for_core = shared_state.clone();
        let events_for_core = events_tx.clone();
        let gateway_for_core = auth_gateway.clone();
        let connector_for_core = connector.clone();
        thread::spawn(move || {
            let mut core = crate::core::SessionCore::new(
                update_tx,
                core_tx_for_core,
                data_dir,
                config,
                shared_for_core,
                events_for_core,
                gateway_for_core,
                connector_for_core,
            );
            while let Ok(msg) = core_rx.recv() {
                core.handle_message(msg);
            }
        });

        Arc::new(Self {
            core_tx,
            update_rx,
            listening: AtomicBool::new(false),
            shared_state,
            events_tx,
            auth_gateway,
            connector,
        })
    }

    /// Latest published snapshot. Read-only and eventually consistent with
    /// in-flight transitions; the actor commits every snapshot here before
    /// sending it on the update stream.
    pub fn state(&self) -> AppState {
        match self.shared_state.read() {
            Ok(g) => g.clone(),
            Err(poison) => poison.into_inner().clone(),
        }
    }

    /// Contract: never blocks the caller.
    pub fn dispatch(&self, action: AppAction) {
        let _ = self.core_tx.send(CoreMsg::Action(action));
    }

    pub fn listen_for_updates(&self, reconciler: Box<dyn AppReconciler>) {
        if self
            .listening
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            // Avoid multiple listeners that would split messages.
            return;
        }

        let rx = self.update_rx.clone();
        thread::spawn(move || {
            while let Ok(update) = rx.recv() {
                reconciler.reconcile(update);
            }
        });
    }

    /// Live connection events of the current session (stale-session events
    /// are filtered before fan-out). Any number of consumers may subscribe.
    pub fn subscribe_connection_events(&self) -> broadcast::Receiver<ConnectionEvent> {
        self.events_tx.subscribe()
    }
}

impl App {
    pub fn set_auth_gateway_for_tests(&self, gateway: Arc<dyn AuthGateway>) {
        match self.auth_gateway.write() {
            Ok(mut slot) => *slot = gateway,
            Err(poison) => *poison.into_inner() = gateway,
        }
    }

    pub fn set_connector_for_tests(&self, connector: Arc<dyn Connector>) {
        match self.connector.write() {
            Ok(mut slot) => *slot = connector,
            Err(poison) => *poison.into_inner() = connector,
        }
    }
}
