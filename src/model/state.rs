//! Attempt state definitions
//!
//! Every fetch attempt walks
//! `Pending -> InFlight -> {Succeeded | RetryableFailure -> Pending | TerminalFailure}`.

use std::fmt;

/// Represents the state of one fetch attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AttemptState {
    /// Admitted and waiting in the ready queue (or waiting out a backoff)
    Pending,

    /// A worker is performing the network call
    InFlight,

    /// A response was received and will be delivered
    Succeeded,

    /// The attempt failed in a way another attempt may fix
    RetryableFailure,

    /// The attempt failed for good; a failed response will be delivered
    TerminalFailure,
}

impl AttemptState {
    /// Returns true if no further attempt follows this state
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Succeeded | Self::TerminalFailure)
    }

    /// Only terminal states produce a response for the consumer
    pub fn produces_response(&self) -> bool {
        self.is_terminal()
    }

    /// Checks whether moving to `next` is a legal transition
    pub fn can_transition_to(&self, next: AttemptState) -> bool {
        use AttemptState::*;
        matches!(
            (self, next),
            (Pending, InFlight)
                | (InFlight, Succeeded)
                | (InFlight, RetryableFailure)
                | (InFlight, TerminalFailure)
                | (RetryableFailure, Pending)
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::InFlight => "in_flight",
            Self::Succeeded => "succeeded",
            Self::RetryableFailure => "retryable_failure",
            Self::TerminalFailure => "terminal_failure",
        }
    }
}

impl fmt::Display for AttemptState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALL: [AttemptState; 5] = [
        AttemptState::Pending,
        AttemptState::InFlight,
        AttemptState::Succeeded,
        AttemptState::RetryableFailure,
        AttemptState::TerminalFailure,
    ];

    #[test]
    fn test_terminal_states() {
        assert!(!AttemptState::Pending.is_terminal());
        assert!(!AttemptState::InFlight.is_terminal());
        assert!(!AttemptState::RetryableFailure.is_terminal());
        assert!(AttemptState::Succeeded.is_terminal());
        assert!(AttemptState::TerminalFailure.is_terminal());
    }

    #[test]
    fn test_only_terminal_states_produce_responses() {
        for state in ALL {
            assert_eq!(state.produces_response(), state.is_terminal());
        }
    }

    #[test]
    fn test_transitions() {
        use AttemptState::*;

        assert!(Pending.can_transition_to(InFlight));
        assert!(InFlight.can_transition_to(Succeeded));
        assert!(InFlight.can_transition_to(RetryableFailure));
        assert!(InFlight.can_transition_to(TerminalFailure));
        assert!(RetryableFailure.can_transition_to(Pending));

        assert!(!Pending.can_transition_to(Succeeded));
        assert!(!RetryableFailure.can_transition_to(InFlight));
        for state in ALL {
            assert!(!Succeeded.can_transition_to(state));
            assert!(!TerminalFailure.can_transition_to(state));
        }
    }

    #[test]
    fn test_display() {
        assert_eq!(AttemptState::InFlight.to_string(), "in_flight");
        assert_eq!(AttemptState::TerminalFailure.to_string(), "terminal_failure");
    }
}
