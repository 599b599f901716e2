#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use futures::future::BoxFuture;

use roost_core::{
    AppReconciler, AppState, AppUpdate, AuthError, AuthGateway, AuthResult, ChatMessage,
    ConnectionEvent, ConnectionFailure, ConnectionHandle, Connector, Identity, RoomSummary,
};

pub fn wait_until(what: &str, timeout: Duration, mut f: impl FnMut() -> bool) {
    let start = Instant::now();
    while start.elapsed() < timeout {
        if f() {
            return;
        }
        std::thread::sleep(Duration::from_millis(20));
    }
    panic!("{what}: condition not met within {timeout:?}");
}

pub fn auth_result() -> AuthResult {
    AuthResult {
        user_id: "u1".into(),
        email: "a@b.com".into(),
        chat_username: Some("alice".into()),
        chat_password: Some("secret".into()),
        token: "tok1".into(),
    }
}

pub fn room(id: &str, name: &str) -> RoomSummary {
    RoomSummary {
        id: id.into(),
        name: name.into(),
        unread: 0,
    }
}

// ── Update collector ───────────────────────────────────────────────

#[derive(Clone, Default)]
pub struct Collector {
    updates: Arc<Mutex<Vec<AppUpdate>>>,
}

impl AppReconciler for Collector {
    fn reconcile(&self, update: AppUpdate) {
        self.updates.lock().unwrap().push(update);
    }
}

impl Collector {
    pub fn states(&self) -> Vec<AppState> {
        self.updates
            .lock()
            .unwrap()
            .iter()
            .filter_map(|u| match u {
                AppUpdate::FullState(s) => Some(s.clone()),
                _ => None,
            })
            .collect()
    }

    pub fn session_ready_user(&self) -> Option<String> {
        self.updates.lock().unwrap().iter().find_map(|u| match u {
            AppUpdate::SessionReady { user_id, .. } => Some(user_id.clone()),
            _ => None,
        })
    }
}

// ── Fake authentication gateway ────────────────────────────────────

pub struct FakeAuthGateway {
    login_result: Mutex<Result<AuthResult, AuthError>>,
    rooms: Mutex<Vec<RoomSummary>>,
    pub login_calls: AtomicUsize,
    pub rooms_calls: AtomicUsize,
}

impl FakeAuthGateway {
    pub fn succeeding(auth: AuthResult, rooms: Vec<RoomSummary>) -> Arc<Self> {
        Arc::new(Self {
            login_result: Mutex::new(Ok(auth)),
            rooms: Mutex::new(rooms),
            login_calls: AtomicUsize::new(0),
            rooms_calls: AtomicUsize::new(0),
        })
    }

    pub fn failing(err: AuthError) -> Arc<Self> {
        Arc::new(Self {
            login_result: Mutex::new(Err(err)),
            rooms: Mutex::new(vec![]),
            login_calls: AtomicUsize::new(0),
            rooms_calls: AtomicUsize::new(0),
        })
    }

    pub fn set_login_result(&self, result: Result<AuthResult, AuthError>) {
        *self.login_result.lock().unwrap() = result;
    }
}

impl AuthGateway for FakeAuthGateway {
    fn login_with_email(
        &self,
        _email: &str,
        _password: &str,
    ) -> BoxFuture<'static, Result<AuthResult, AuthError>> {
        self.login_calls.fetch_add(1, Ordering::SeqCst);
        let result = self.login_result.lock().unwrap().clone();
        Box::pin(async move { result })
    }

    fn list_rooms(&self, _token: &str) -> BoxFuture<'static, Result<Vec<RoomSummary>, AuthError>> {
        self.rooms_calls.fetch_add(1, Ordering::SeqCst);
        let rooms = self.rooms.lock().unwrap().clone();
        Box::pin(async move { Ok(rooms) })
    }
}

// ── Scripted connector ─────────────────────────────────────────────

/// One connection's worth of events: (delay ms, event) pairs played back in
/// order. An exhausted script holds the connection open until it is closed,
/// at which point a final `Disconnected` is emitted.
#[derive(Default, Clone)]
pub struct Script {
    pub steps: Vec<(u64, ConnectionEvent)>,
}

impl Script {
    pub fn connect_immediately() -> Self {
        Self {
            steps: vec![(0, ConnectionEvent::Connected)],
        }
    }

    pub fn connect_after_ms(ms: u64) -> Self {
        Self {
            steps: vec![(ms, ConnectionEvent::Connected)],
        }
    }

    pub fn fail(reason: &str) -> Self {
        Self {
            steps: vec![(
                0,
                ConnectionEvent::Disconnected {
                    reason: Some(reason.into()),
                },
            )],
        }
    }

    pub fn then(mut self, delay_ms: u64, event: ConnectionEvent) -> Self {
        self.steps.push((delay_ms, event));
        self
    }
}

pub fn chat_message(room_id: &str, from: &str, body: &str) -> ConnectionEvent {
    ConnectionEvent::Message(ChatMessage {
        room_id: Some(room_id.into()),
        from: from.into(),
        body: body.into(),
    })
}

pub struct ScriptedConnector {
    scripts: Mutex<VecDeque<Script>>,
    pub opens: AtomicUsize,
}

impl ScriptedConnector {
    pub fn with_scripts(scripts: Vec<Script>) -> Arc<Self> {
        Arc::new(Self {
            scripts: Mutex::new(scripts.into()),
            opens: AtomicUsize::new(0),
        })
    }

    pub fn connected_immediately() -> Arc<Self> {
        Self::with_scripts(vec![Script::connect_immediately()])
    }
}

impl Connector for ScriptedConnector {
    fn open(
        &self,
        _identity: &Identity,
        _server_url: &str,
    ) -> BoxFuture<'static, Result<ConnectionHandle, ConnectionFailure>> {
        self.opens.fetch_add(1, Ordering::SeqCst);
        let script = self.scripts.lock().unwrap().pop_front().unwrap_or_default();
        Box::pin(async move {
            let (events_tx, events_rx) = flume::unbounded();
            let (close_tx, close_rx) = flume::unbounded::<()>();

            tokio::spawn(async move {
                for (delay_ms, event) in script.steps {
                    tokio::select! {
                        _ = tokio::time::sleep(Duration::from_millis(delay_ms)) => {
                            let terminal = matches!(event, ConnectionEvent::Disconnected { .. });
                            if events_tx.send(event).is_err() || terminal {
                                return;
                            }
                        }
                        _ = close_rx.recv_async() => {
                            let _ = events_tx.send(ConnectionEvent::Disconnected { reason: None });
                            return;
                        }
                    }
                }
                // Script exhausted: hold the connection open until closed.
                let _ = close_rx.recv_async().await;
                let _ = events_tx.send(ConnectionEvent::Disconnected { reason: None });
            });

            Ok(ConnectionHandle::new(events_rx, close_tx))
        })
    }
}
