//! Connection state machine of the client session.
//!
//! | from           | event       | to             |
//! |----------------|-------------|----------------|
//! | `Idle`         | `Start`     | `Connecting`   |
//! | `Connecting`   | `Opened`    | `Connected`    |
//! | `Connecting`   | `Dropped`   | `Reconnecting` |
//! | `Connected`    | `Dropped`   | `Reconnecting` |
//! | `Reconnecting` | `RetryDue`  | `Connecting`   |
//! | `Reconnecting` | `Exhausted` | `GaveUp`       |
//! | any but `Stopped` | `Stop`   | `Stopped`      |
//!
//! Every other pair is rejected. In particular a second `Dropped` while
//! already `Reconnecting` does not start another cycle.

use strum_macros::{AsRefStr, Display, EnumIter};

/// Where the session currently is in its connect/reconnect cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, AsRefStr, EnumIter)]
pub enum ConnectionState {
    /// Created, not started.
    Idle,
    /// Transport open in progress.
    Connecting,
    /// Transport open; subscription sent.
    Connected,
    /// Waiting for the retry timer.
    Reconnecting,
    /// Retry ceiling reached; no further attempts.
    GaveUp,
    /// Torn down by the owner.
    Stopped,
}

/// Input to the state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumIter)]
pub enum LinkEvent {
    /// Session started.
    Start,
    /// Transport opened successfully.
    Opened,
    /// Transport closed, failed, or could not be opened.
    Dropped,
    /// Retry timer fired.
    RetryDue,
    /// Backoff refused another attempt.
    Exhausted,
    /// Owner requested teardown.
    Stop,
}

impl ConnectionState {
    /// Next state for `event`, or `None` if the event does not apply here.
    pub fn on(self, event: LinkEvent) -> Option<ConnectionState> {
        use ConnectionState::*;
        use LinkEvent::*;

        match (self, event) {
            (Idle, Start) => Some(Connecting),
            (Connecting, Opened) => Some(Connected),
            (Connecting, Dropped) | (Connected, Dropped) => Some(Reconnecting),
            (Reconnecting, RetryDue) => Some(Connecting),
            (Reconnecting, Exhausted) => Some(GaveUp),
            (Stopped, Stop) => None,
            (_, Stop) => Some(Stopped),
            _ => None,
        }
    }

    /// Whether the session will never connect again.
    pub fn is_terminal(self) -> bool {
        matches!(self, ConnectionState::GaveUp | ConnectionState::Stopped)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use strum::IntoEnumIterator;

    #[test]
    fn happy_path_and_reconnect_cycle() {
        let mut state = ConnectionState::Idle;
        for (event, expected) in [
            (LinkEvent::Start, ConnectionState::Connecting),
            (LinkEvent::Opened, ConnectionState::Connected),
            (LinkEvent::Dropped, ConnectionState::Reconnecting),
            (LinkEvent::RetryDue, ConnectionState::Connecting),
            (LinkEvent::Dropped, ConnectionState::Reconnecting),
            (LinkEvent::RetryDue, ConnectionState::Connecting),
            (LinkEvent::Opened, ConnectionState::Connected),
        ] {
            state = state.on(event).unwrap();
            assert_eq!(state, expected);
        }
    }

    #[test]
    fn drop_while_reconnecting_is_ignored() {
        assert_eq!(ConnectionState::Reconnecting.on(LinkEvent::Dropped), None);
    }

    #[test]
    fn exhaustion_is_terminal() {
        let state = ConnectionState::Reconnecting.on(LinkEvent::Exhausted).unwrap();
        assert_eq!(state, ConnectionState::GaveUp);
        assert!(state.is_terminal());
        assert_eq!(state.on(LinkEvent::RetryDue), None);
        assert_eq!(state.on(LinkEvent::Opened), None);
    }

    #[test]
    fn stop_reaches_stopped_from_everywhere_once() {
        for state in ConnectionState::iter() {
            let next = state.on(LinkEvent::Stop);
            if state == ConnectionState::Stopped {
                assert_eq!(next, None);
            } else {
                assert_eq!(next, Some(ConnectionState::Stopped));
            }
        }
    }

    #[test]
    fn stopped_accepts_nothing() {
        for event in LinkEvent::iter() {
            assert_eq!(ConnectionState::Stopped.on(event), None);
        }
    }

    #[test]
    fn display_names_match_variants() {
        assert_eq!(ConnectionState::Reconnecting.to_string(), "Reconnecting");
        assert_eq!(ConnectionState::GaveUp.as_ref(), "GaveUp");
    }
}
