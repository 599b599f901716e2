// Session lifecycle + connection event pump.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::connection::{ConnectionEvent, ConnectionStatus, SessionError};
use crate::credentials::Identity;
use crate::state::AuthState;
use crate::updates::{CoreMsg, InternalEvent};

use super::{Session, SessionCore};

impl SessionCore {
    /// Connects a new session bound to `identity`, replacing any live one.
    /// This is the single connect path shared by login and cache restore:
    /// published state is only touched later, when the first `Connected`
    /// event (or a failure) comes back through the actor loop.
    pub(super) fn start_session(&mut self, identity: Identity) -> Result<(), SessionError> {
        if !identity.usable_for_connection() {
            return Err(SessionError::MissingCredentials);
        }

        // Later-committing identity wins: tear down any live session first so
        // exactly one connection exists at a time.
        self.stop_session();

        // A published session view must not outlive its connection. Demote in
        // the same transition as the teardown; the view only says LoggedIn
        // again once the new dial confirms Connected.
        if !matches!(self.state.auth, AuthState::LoggedOut) || self.state.session.is_some() {
            self.state.auth = AuthState::LoggedOut;
            self.state.session = None;
            self.state.rooms.clear();
            self.emit_state();
        }

        self.session_gen += 1;
        let gen = self.session_gen;
        let alive = Arc::new(AtomicBool::new(true));
        let (close_tx, close_rx) = flume::unbounded::<()>();

        tracing::info!(user_id = %identity.id, gen, "start_session");

        let connector = self.connector();
        let server_url = self.config.chat_server_url();
        let tx = self.core_sender.clone();
        let io_identity = identity.clone();
        let io_alive = alive.clone();

        self.runtime.spawn(async move {
            let handle = match connector.open(&io_identity, &server_url).await {
                Ok(handle) => handle,
                Err(e) => {
                    // Dial failures are delivered as events, never thrown.
                    let _ = tx.send(CoreMsg::Internal(Box::new(InternalEvent::Connection {
                        session_gen: gen,
                        event: ConnectionEvent::Disconnected { reason: Some(e.0) },
                    })));
                    return;
                }
            };

            if !io_alive.load(Ordering::SeqCst) {
                // Logout raced the dial; this connection lost and must not
                // surface a `Connected` afterwards.
                handle.close();
                return;
            }

            let events = handle.events();
            let mut close_requested = false;
            loop {
                if !close_requested {
                    tokio::select! {
                        _ = close_rx.recv_async() => {
                            // Either an explicit disconnect or the session
                            // was dropped; close once, then drain.
                            handle.close();
                            close_requested = true;
                            continue;
                        }
                        ev = events.recv_async() => match ev {
                            Ok(event) => {
                                let terminal = event.is_terminal();
                                let _ = tx.send(CoreMsg::Internal(Box::new(
                                    InternalEvent::Connection { session_gen: gen, event },
                                )));
                                if terminal {
                                    break;
                                }
                            }
                            Err(_) => break,
                        }
                    }
                } else {
                    match events.recv_async().await {
                        Ok(event) => {
                            let terminal = event.is_terminal();
                            let _ = tx.send(CoreMsg::Internal(Box::new(
                                InternalEvent::Connection { session_gen: gen, event },
                            )));
                            if terminal {
                                break;
                            }
                        }
                        Err(_) => break,
                    }
                }
            }
        });

        self.session = Some(Session {
            identity,
            gen,
            status: ConnectionStatus::Connecting,
            ready: false,
            alive,
            close_tx,
        });
        Ok(())
    }

    /// Tears down the live session, if any. Safe from any state. Events still
    /// draining from the old pump carry a stale generation and are dropped.
    pub(super) fn stop_session(&mut self) {
        if let Some(sess) = self.session.take() {
            tracing::info!(
                user_id = %sess.identity.id,
                gen = sess.gen,
                status = ?sess.status,
                "stop_session"
            );
            sess.alive.store(false, Ordering::SeqCst);
            let _ = sess.close_tx.send(());
        }
    }

    /// Kicks off the room-list fetch for the current session. Only called
    /// once the session is ready; the result is dropped if the session
    /// generation has moved on by the time it lands.
    pub(super) fn begin_rooms_load(&mut self) {
        let Some(sess) = self.session.as_ref() else {
            return;
        };
        let Some(token) = sess.identity.token.clone() else {
            tracing::warn!("rooms load skipped: cached identity has no session token");
            return;
        };
        let gen = sess.gen;
        let gateway = self.auth_gateway();
        let tx = self.core_sender.clone();

        self.set_busy(|b| b.loading_rooms = true);
        self.runtime.spawn(async move {
            let result = gateway.list_rooms(&token).await;
            let _ = tx.send(CoreMsg::Internal(Box::new(InternalEvent::RoomsLoaded {
                session_gen: gen,
                result,
            })));
        });
    }
}
