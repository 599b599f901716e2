// Pure evaluation of connection events against the current session.
//
// Split out of the actor so the ordering rules (stale-generation
// suppression, single ready edge, terminal disconnect handling) are
// unit-testable without any I/O.

use crate::connection::{ConnectionEvent, ConnectionStatus};

/// The slice of actor state the evaluation needs.
#[derive(Debug, Clone, Copy)]
pub(crate) struct ConnInput {
    /// Generation of the currently live session.
    pub current_gen: u64,
    /// Whether this session already delivered its first `Connected`.
    pub ready: bool,
}

#[derive(Debug, Default, PartialEq, Eq)]
pub(crate) struct ConnEffects {
    /// Event belongs to a superseded session; drop it entirely.
    pub ignore: bool,
    /// First `Connected` of this session: publish LoggedIn + session view,
    /// emit the ready notification, start the room list load.
    pub mark_ready: bool,
    /// New connection status to reflect in the published session view.
    pub new_status: Option<ConnectionStatus>,
    /// Terminal disconnect before the session ever became ready, i.e. the
    /// connect attempt failed. The reason is surfaced to the user.
    pub connect_failed: Option<String>,
    /// Terminal disconnect: no further events for this session.
    pub terminal: bool,
    /// A chat message arrived for this room; bump its unread counter.
    pub bump_unread: Option<String>,
}

pub(crate) fn evaluate_connection_event(
    input: ConnInput,
    event_gen: u64,
    event: &ConnectionEvent,
) -> ConnEffects {
    let mut fx = ConnEffects::default();

    if event_gen != input.current_gen {
        fx.ignore = true;
        return fx;
    }

    match event {
        ConnectionEvent::Connected => {
            fx.new_status = Some(ConnectionStatus::Connected);
            fx.mark_ready = !input.ready;
        }
        ConnectionEvent::Disconnected { reason } => {
            fx.terminal = true;
            if input.ready {
                fx.new_status = Some(ConnectionStatus::Disconnected);
            } else {
                fx.connect_failed =
                    Some(reason.clone().unwrap_or_else(|| "connection closed".into()));
            }
        }
        ConnectionEvent::Message(msg) => {
            if input.ready {
                fx.bump_unread = msg.room_id.clone();
            }
        }
        ConnectionEvent::Raw(_) => {
            // Opaque payloads are fanned out to subscribers; no state change.
        }
        ConnectionEvent::StatusChanged(status) => {
            // Only mirrored once ready: before that, the authoritative
            // outcome arrives as Connected/Disconnected.
            if input.ready {
                fx.new_status = Some(*status);
            }
        }
    }

    fx
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::{ChatMessage, Envelope};

    fn input(current_gen: u64, ready: bool) -> ConnInput {
        ConnInput { current_gen, ready }
    }

    fn message(room_id: Option<&str>) -> ConnectionEvent {
        ConnectionEvent::Message(ChatMessage {
            room_id: room_id.map(|s| s.to_string()),
            from: "alice".into(),
            body: "hi".into(),
        })
    }

    // ── Stale generation ───────────────────────────────────────────

    #[test]
    fn stale_generation_is_dropped() {
        let fx = evaluate_connection_event(input(5, true), 4, &ConnectionEvent::Connected);
        assert!(fx.ignore);
        assert!(!fx.mark_ready);
        assert!(fx.new_status.is_none());
    }

    #[test]
    fn stale_disconnect_is_dropped_too() {
        let fx = evaluate_connection_event(
            input(5, false),
            4,
            &ConnectionEvent::Disconnected { reason: None },
        );
        assert!(fx.ignore);
        assert!(!fx.terminal);
    }

    // ── Ready edge ─────────────────────────────────────────────────

    #[test]
    fn first_connected_marks_ready() {
        let fx = evaluate_connection_event(input(1, false), 1, &ConnectionEvent::Connected);
        assert!(fx.mark_ready);
        assert_eq!(fx.new_status, Some(ConnectionStatus::Connected));
    }

    #[test]
    fn second_connected_does_not_re_emit_ready() {
        let fx = evaluate_connection_event(input(1, true), 1, &ConnectionEvent::Connected);
        assert!(!fx.mark_ready);
        assert_eq!(fx.new_status, Some(ConnectionStatus::Connected));
    }

    // ── Disconnects ────────────────────────────────────────────────

    #[test]
    fn disconnect_before_ready_is_a_connect_failure() {
        let fx = evaluate_connection_event(
            input(1, false),
            1,
            &ConnectionEvent::Disconnected {
                reason: Some("refused".into()),
            },
        );
        assert!(fx.terminal);
        assert_eq!(fx.connect_failed.as_deref(), Some("refused"));
        assert!(fx.new_status.is_none());
    }

    #[test]
    fn disconnect_after_ready_is_a_status_change() {
        let fx = evaluate_connection_event(
            input(1, true),
            1,
            &ConnectionEvent::Disconnected { reason: None },
        );
        assert!(fx.terminal);
        assert!(fx.connect_failed.is_none());
        assert_eq!(fx.new_status, Some(ConnectionStatus::Disconnected));
    }

    // ── Messages / raw / status ────────────────────────────────────

    #[test]
    fn message_bumps_unread_only_when_ready() {
        let fx = evaluate_connection_event(input(1, true), 1, &message(Some("general")));
        assert_eq!(fx.bump_unread.as_deref(), Some("general"));

        let fx = evaluate_connection_event(input(1, false), 1, &message(Some("general")));
        assert!(fx.bump_unread.is_none());
    }

    #[test]
    fn message_without_room_has_no_state_effect() {
        let fx = evaluate_connection_event(input(1, true), 1, &message(None));
        assert!(fx.bump_unread.is_none());
        assert!(!fx.ignore);
    }

    #[test]
    fn raw_event_has_no_state_effect() {
        let fx = evaluate_connection_event(
            input(1, true),
            1,
            &ConnectionEvent::Raw(Envelope {
                payload: "<presence/>".into(),
            }),
        );
        assert_eq!(fx, ConnEffects::default());
    }

    #[test]
    fn status_change_is_mirrored_only_once_ready() {
        let ev = ConnectionEvent::StatusChanged(ConnectionStatus::Connecting);
        let fx = evaluate_connection_event(input(1, true), 1, &ev);
        assert_eq!(fx.new_status, Some(ConnectionStatus::Connecting));

        let fx = evaluate_connection_event(input(1, false), 1, &ev);
        assert!(fx.new_status.is_none());
    }
}
