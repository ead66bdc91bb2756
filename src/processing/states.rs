use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Stages a single delivery passes through inside the processor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProcessingState {
    /// Delivery handed to the processor
    Received,
    /// Retry counter is being compared against the bound
    PoisonCheck,
    /// Event id is being checked against the dedup cache
    DedupCheck,
    /// Business logic and downstream publishes are running
    Processing,
    /// Broker may commit the offset
    Acked,
    /// Broker should redeliver with an incremented retry count
    RetrySignaled,
    /// Envelope published to the dead-letter topic; offset may be committed
    DeadLettered,
}

impl ProcessingState {
    /// Check if this is a terminal state (no further transitions allowed)
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Acked | Self::RetrySignaled | Self::DeadLettered
        )
    }

    /// Check if reaching this state allows the offset to be committed
    pub fn commits_offset(&self) -> bool {
        matches!(self, Self::Acked | Self::DeadLettered)
    }

    /// Apply `event`, returning the next state
    pub fn transition(self, event: ProcessingEvent) -> Result<Self, InvalidTransition> {
        let target = match (self, event) {
            (Self::Received, ProcessingEvent::Inspect) => Self::PoisonCheck,

            (Self::PoisonCheck, ProcessingEvent::RetriesExhausted) => Self::DeadLettered,
            (Self::PoisonCheck, ProcessingEvent::WithinRetryBudget) => Self::DedupCheck,

            (Self::DedupCheck, ProcessingEvent::DuplicateDetected) => Self::Acked,
            (Self::DedupCheck, ProcessingEvent::FirstDelivery) => Self::Processing,

            (Self::Processing, ProcessingEvent::Succeeded) => Self::Acked,
            (Self::Processing, ProcessingEvent::FailedRetryable) => Self::RetrySignaled,
            (Self::Processing, ProcessingEvent::RetriesExhausted) => Self::DeadLettered,

            (from, event) => return Err(InvalidTransition { from, event }),
        };

        Ok(target)
    }
}

impl fmt::Display for ProcessingState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Received => write!(f, "received"),
            Self::PoisonCheck => write!(f, "poison_check"),
            Self::DedupCheck => write!(f, "dedup_check"),
            Self::Processing => write!(f, "processing"),
            Self::Acked => write!(f, "acked"),
            Self::RetrySignaled => write!(f, "retry_signaled"),
            Self::DeadLettered => write!(f, "dead_lettered"),
        }
    }
}

impl std::str::FromStr for ProcessingState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "received" => Ok(Self::Received),
            "poison_check" => Ok(Self::PoisonCheck),
            "dedup_check" => Ok(Self::DedupCheck),
            "processing" => Ok(Self::Processing),
            "acked" => Ok(Self::Acked),
            "retry_signaled" => Ok(Self::RetrySignaled),
            "dead_lettered" => Ok(Self::DeadLettered),
            _ => Err(format!("Invalid processing state: {s}")),
        }
    }
}

/// Events that drive [`ProcessingState`] transitions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProcessingEvent {
    /// Begin inspecting a delivery
    Inspect,
    /// Retry counter reached the bound
    RetriesExhausted,
    WithinRetryBudget,
    DuplicateDetected,
    FirstDelivery,
    /// Business logic and every downstream publish succeeded
    Succeeded,
    /// Processing failed with retry budget remaining
    FailedRetryable,
}

impl ProcessingEvent {
    /// Get a string representation of the event type for logging
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::Inspect => "inspect",
            Self::RetriesExhausted => "retries_exhausted",
            Self::WithinRetryBudget => "within_retry_budget",
            Self::DuplicateDetected => "duplicate_detected",
            Self::FirstDelivery => "first_delivery",
            Self::Succeeded => "succeeded",
            Self::FailedRetryable => "failed_retryable",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("Invalid processing transition from {from} on {}", event.event_type())]
pub struct InvalidTransition {
    pub from: ProcessingState,
    pub event: ProcessingEvent,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_happy_path_transitions() {
        let state = ProcessingState::Received
            .transition(ProcessingEvent::Inspect)
            .and_then(|s| s.transition(ProcessingEvent::WithinRetryBudget))
            .and_then(|s| s.transition(ProcessingEvent::FirstDelivery))
            .and_then(|s| s.transition(ProcessingEvent::Succeeded))
            .unwrap();

        assert_eq!(state, ProcessingState::Acked);
        assert!(state.is_terminal());
        assert!(state.commits_offset());
    }

    #[test]
    fn test_poison_short_circuits_to_dead_letter() {
        let state = ProcessingState::PoisonCheck
            .transition(ProcessingEvent::RetriesExhausted)
            .unwrap();
        assert_eq!(state, ProcessingState::DeadLettered);
        assert!(state.commits_offset());
    }

    #[test]
    fn test_retry_signaled_does_not_commit() {
        let state = ProcessingState::Processing
            .transition(ProcessingEvent::FailedRetryable)
            .unwrap();
        assert!(state.is_terminal());
        assert!(!state.commits_offset());
    }

    #[test]
    fn test_terminal_states_reject_events() {
        let err = ProcessingState::Acked
            .transition(ProcessingEvent::Inspect)
            .unwrap_err();
        assert_eq!(err.from, ProcessingState::Acked);

        assert!(ProcessingState::Received
            .transition(ProcessingEvent::Succeeded)
            .is_err());
        assert!(ProcessingState::DedupCheck
            .transition(ProcessingEvent::RetriesExhausted)
            .is_err());
    }

    #[test]
    fn test_state_string_round_trip() {
        for state in [
            ProcessingState::Received,
            ProcessingState::PoisonCheck,
            ProcessingState::DedupCheck,
            ProcessingState::Processing,
            ProcessingState::Acked,
            ProcessingState::RetrySignaled,
            ProcessingState::DeadLettered,
        ] {
            assert_eq!(state.to_string().parse::<ProcessingState>().unwrap(), state);
        }
        assert!("bogus".parse::<ProcessingState>().is_err());
    }
}
