//! Reservation saga state machine.

/// Where a reservation run is in its lifecycle.
///
/// State transitions:
/// ```text
/// NotStarted ──► Fetching ──► Validating ──► Applying ──► Persisting ──► Succeeded
///                   │             │                           │
///                   └─────────────┴───────────► Failed ◄──────┘
/// ```
///
/// A concurrency conflict while persisting sends the run back to
/// `Fetching`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ReservationState {
    #[default]
    NotStarted,

    /// Loading the stock items named by the order.
    Fetching,

    /// Checking every line before anything is mutated.
    Validating,

    /// Reserving units on the loaded items, in memory.
    Applying,

    /// Writing all mutated items in one version-checked batch.
    Persisting,

    /// All lines reserved and stored (terminal state).
    Succeeded,

    /// Nothing reserved (terminal state).
    Failed,
}

impl ReservationState {
    /// Returns true if the run may move from this state to `next`.
    pub fn can_transition_to(&self, next: ReservationState) -> bool {
        use ReservationState::*;

        matches!(
            (self, next),
            (NotStarted, Fetching)
                | (NotStarted, Failed)
                | (Fetching, Validating)
                | (Fetching, Failed)
                | (Validating, Applying)
                | (Validating, Failed)
                | (Applying, Persisting)
                | (Applying, Failed)
                | (Persisting, Succeeded)
                | (Persisting, Failed)
                | (Persisting, Fetching)
        )
    }

    /// Returns true if this is a terminal state.
    pub fn is_terminal(&self) -> bool {
        matches!(self, ReservationState::Succeeded | ReservationState::Failed)
    }

    /// Returns the state name as a string.
    pub fn as_str(&self) -> &'static str {
        match self {
            ReservationState::NotStarted => "NotStarted",
            ReservationState::Fetching => "Fetching",
            ReservationState::Validating => "Validating",
            ReservationState::Applying => "Applying",
            ReservationState::Persisting => "Persisting",
            ReservationState::Succeeded => "Succeeded",
            ReservationState::Failed => "Failed",
        }
    }
}

impl std::fmt::Display for ReservationState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
