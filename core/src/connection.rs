// Protocol connection seam: typed events, connector trait, websocket impl.

use std::sync::{Arc, RwLock};

use futures::future::BoxFuture;
use futures::{SinkExt, StreamExt};
use thiserror::Error;

use crate::credentials::Identity;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionStatus {
    Disconnected,
    Connecting,
    Connected,
}

/// Opaque wire payload passed through to consumers. Stanza/frame parsing is
/// the transport collaborator's business, not this crate's.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Envelope {
    pub payload: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatMessage {
    pub room_id: Option<String>,
    pub from: String,
    pub body: String,
}

/// Event-subscription contract replacing a fixed delegate: any number of
/// consumers can observe these through `App::subscribe_connection_events`.
///
/// Per connection instance: `Connected` precedes any `Message`, and a
/// terminal `Disconnected` is the last event delivered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionEvent {
    Connected,
    Disconnected { reason: Option<String> },
    Message(ChatMessage),
    Raw(Envelope),
    StatusChanged(ConnectionStatus),
}

impl ConnectionEvent {
    /// True once no further events may be delivered for this instance.
    pub fn is_terminal(&self) -> bool {
        matches!(self, ConnectionEvent::Disconnected { .. })
    }
}

/// Misuse of the session contract. Surfaced loudly, never swallowed.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SessionError {
    #[error("chat credentials are missing a username or password")]
    MissingCredentials,
    #[error("a connection is already live")]
    AlreadyConnected,
}

/// Connect/teardown failure, delivered through the event stream rather than
/// thrown: the orchestrator maps it onto a `Disconnected` event.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{0}")]
pub struct ConnectionFailure(pub String);

/// Live handle to one protocol connection: an event receiver plus a close
/// command. Dropping the handle without `close()` leaves the I/O task to
/// notice the closed channels on its own.
pub struct ConnectionHandle {
    events: flume::Receiver<ConnectionEvent>,
    close_tx: flume::Sender<()>,
}

impl ConnectionHandle {
    pub fn new(events: flume::Receiver<ConnectionEvent>, close_tx: flume::Sender<()>) -> Self {
        Self { events, close_tx }
    }

    pub fn events(&self) -> flume::Receiver<ConnectionEvent> {
        self.events.clone()
    }

    /// Requests teardown. Safe from any state; if the connection was not
    /// already down, a final `Disconnected` event follows.
    pub fn close(&self) {
        let _ = self.close_tx.send(());
    }
}

/// Transport seam. `open` resolves once the connection attempt itself has an
/// outcome; everything after that arrives on the handle's event stream.
pub trait Connector: Send + Sync + 'static {
    fn open(
        &self,
        identity: &Identity,
        server_url: &str,
    ) -> BoxFuture<'static, Result<ConnectionHandle, ConnectionFailure>>;
}

/// Swappable connector slot. Tests install scripted connectors through
/// `App::set_connector_for_tests`.
pub type SharedConnector = Arc<RwLock<Arc<dyn Connector>>>;

/// Default transport: a websocket to the chat server. Frames are passed
/// through as opaque `Raw` envelopes; protocol negotiation above the socket
/// is an external collaborator's job.
#[derive(Default)]
pub struct WsConnector;

impl Connector for WsConnector {
    fn open(
        &self,
        identity: &Identity,
        server_url: &str,
    ) -> BoxFuture<'static, Result<ConnectionHandle, ConnectionFailure>> {
        let url = server_url.to_string();
        let username = identity.connection_username().to_string();
        Box::pin(async move {
            let (ws, _resp) = tokio_tungstenite::connect_async(url.as_str())
                .await
                .map_err(|e| ConnectionFailure(e.to_string()))?;
            tracing::info!(%url, %username, "websocket open");

            let (events_tx, events_rx) = flume::unbounded();
            let (close_tx, close_rx) = flume::unbounded();
            let _ = events_tx.send(ConnectionEvent::Connected);
            let _ = events_tx.send(ConnectionEvent::StatusChanged(ConnectionStatus::Connected));

            tokio::spawn(async move {
                let (mut sink, mut stream) = ws.split();
                loop {
                    tokio::select! {
                        _ = close_rx.recv_async() => {
                            let _ = sink.send(tokio_tungstenite::tungstenite::Message::Close(None)).await;
                            let _ = events_tx.send(ConnectionEvent::Disconnected { reason: None });
                            break;
                        }
                        frame = stream.next() => match frame {
                            Some(Ok(msg)) => {
                                use tokio_tungstenite::tungstenite::Message;
                                match msg {
                                    Message::Text(t) => {
                                        let _ = events_tx.send(ConnectionEvent::Raw(Envelope {
                                            payload: t.to_string(),
                                        }));
                                    }
                                    Message::Binary(b) => {
                                        let _ = events_tx.send(ConnectionEvent::Raw(Envelope {
                                            payload: String::from_utf8_lossy(&b).into_owned(),
                                        }));
                                    }
                                    Message::Close(frame) => {
                                        let reason = frame.map(|f| f.reason.to_string());
                                        let _ = events_tx.send(ConnectionEvent::Disconnected { reason });
                                        break;
                                    }
                                    Message::Ping(_) | Message::Pong(_) | Message::Frame(_) => {}
                                }
                            }
                            Some(Err(e)) => {
                                let _ = events_tx.send(ConnectionEvent::Disconnected {
                                    reason: Some(e.to_string()),
                                });
                                break;
                            }
                            None => {
                                let _ = events_tx.send(ConnectionEvent::Disconnected { reason: None });
                                break;
                            }
                        }
                    }
                }
            });

            Ok(ConnectionHandle::new(events_rx, close_tx))
        })
    }
}
