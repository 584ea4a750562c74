//! Session state machine.

/// Represents the lifecycle state of an upstream WebSocket session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SessionState {
    /// Transport handshake in flight.
    #[default]
    Connecting,
    /// Handshake done, receive loop running.
    Open,
    /// Close handshake in progress.
    Closing,
    /// Connection released and registry entry gone.
    Closed,
}

impl SessionState {
    /// Check if transition to target state is valid.
    ///
    /// Valid transitions:
    /// - Connecting -> Open
    /// - Connecting -> Closed (handshake failed or aborted)
    /// - Open -> Closing
    /// - Closing -> Closed
    pub fn can_transition_to(&self, target: SessionState) -> bool {
        use SessionState::*;
        matches!(
            (*self, target),
            (Connecting, Open) | (Connecting, Closed) | (Open, Closing) | (Closing, Closed)
        )
    }

    /// Attempt to transition to a new state.
    ///
    /// Returns `Ok(())` if the transition is valid, or an error otherwise.
    pub fn transition_to(&mut self, target: SessionState) -> crate::Result<()> {
        if self.can_transition_to(target) {
            *self = target;
            Ok(())
        } else {
            Err(crate::error::BridgeError::InvalidStateTransition {
                from: *self,
                to: target,
            })
        }
    }

    /// Check if this is a terminal state (no further transitions possible).
    pub fn is_terminal(&self) -> bool {
        matches!(self, SessionState::Closed)
    }

    /// Check if the session is visible to callers (read, keepalive, list).
    pub fn is_live(&self) -> bool {
        matches!(self, SessionState::Connecting | SessionState::Open)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_lifecycle() {
        let mut state = SessionState::Connecting;
        assert!(state.transition_to(SessionState::Open).is_ok());
        assert!(state.transition_to(SessionState::Closing).is_ok());
        assert!(state.transition_to(SessionState::Closed).is_ok());
        assert_eq!(state, SessionState::Closed);
    }

    #[test]
    fn test_handshake_failure_goes_straight_to_closed() {
        let mut state = SessionState::Connecting;
        assert!(state.transition_to(SessionState::Closed).is_ok());
        assert!(state.is_terminal());
    }

    #[test]
    fn test_no_back_transitions() {
        let mut state = SessionState::Closing;
        assert!(state.transition_to(SessionState::Open).is_err());
        assert_eq!(state, SessionState::Closing);

        let mut state = SessionState::Open;
        assert!(state.transition_to(SessionState::Connecting).is_err());
        assert!(state.transition_to(SessionState::Closed).is_err());
    }

    #[test]
    fn test_invalid_from_closed() {
        let mut state = SessionState::Closed;
        assert!(state.transition_to(SessionState::Connecting).is_err());
        assert!(state.transition_to(SessionState::Open).is_err());
        assert!(state.transition_to(SessionState::Closing).is_err());
        assert!(state.transition_to(SessionState::Closed).is_err());
    }

    #[test]
    fn test_is_live() {
        assert!(SessionState::Connecting.is_live());
        assert!(SessionState::Open.is_live());
        assert!(!SessionState::Closing.is_live());
        assert!(!SessionState::Closed.is_live());
    }

    #[test]
    fn test_default() {
        assert_eq!(SessionState::default(), SessionState::Connecting);
    }
}
