//! The nine-value record state machine (spec §3) and its legal transitions (spec §4.1).

use serde::{Deserialize, Serialize};

/// State of a single record as it flows through the two-stage pipeline.
///
/// Exactly the nine values of spec §3. `Found-A`, `Found-B`, `Not-Found`,
/// `Error-A`, and `Error-B` are terminal: a record leaves a terminal state
/// only via an explicit retry (back to `Pending`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RecordState {
    Pending,
    ProcessingA,
    FoundA,
    CheckB,
    ProcessingB,
    FoundB,
    NotFound,
    ErrorA,
    ErrorB,
}

impl RecordState {
    /// All nine states, in table order (spec §4.1).
    pub const ALL: [RecordState; 9] = [
        RecordState::Pending,
        RecordState::ProcessingA,
        RecordState::FoundA,
        RecordState::CheckB,
        RecordState::ProcessingB,
        RecordState::FoundB,
        RecordState::NotFound,
        RecordState::ErrorA,
        RecordState::ErrorB,
    ];

    /// Whether this state is terminal (only leaves via retry).
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            RecordState::FoundA
                | RecordState::FoundB
                | RecordState::NotFound
                | RecordState::ErrorA
                | RecordState::ErrorB
        )
    }

    /// Whether this state is eligible for `retry-failed` (spec §4.8):
    /// `Not-Found`, `Error-A`, `Error-B`.
    #[must_use]
    pub fn is_retry_eligible(self) -> bool {
        matches!(
            self,
            RecordState::NotFound | RecordState::ErrorA | RecordState::ErrorB
        )
    }

    /// Whether this is one of the two processing states (`Processing-A`/`Processing-B`).
    #[must_use]
    pub fn is_processing(self) -> bool {
        matches!(self, RecordState::ProcessingA | RecordState::ProcessingB)
    }

    /// The predecessor state recovery demotes a stranded processing state back to
    /// (spec §4.1 `rec`): `Processing-A` -> `Pending`, `Processing-B` -> `Check-B`.
    /// Returns `None` for non-processing states.
    #[must_use]
    pub fn recovery_predecessor(self) -> Option<RecordState> {
        match self {
            RecordState::ProcessingA => Some(RecordState::Pending),
            RecordState::ProcessingB => Some(RecordState::CheckB),
            _ => None,
        }
    }

    /// Stable string tag, used as the secondary-index byte and in HTTP/export output.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            RecordState::Pending => "Pending",
            RecordState::ProcessingA => "Processing-A",
            RecordState::FoundA => "Found-A",
            RecordState::CheckB => "Check-B",
            RecordState::ProcessingB => "Processing-B",
            RecordState::FoundB => "Found-B",
            RecordState::NotFound => "Not-Found",
            RecordState::ErrorA => "Error-A",
            RecordState::ErrorB => "Error-B",
        }
    }

    /// Parses the stable string tag produced by [`RecordState::as_str`].
    #[must_use]
    pub fn parse(s: &str) -> Option<RecordState> {
        Some(match s {
            "Pending" => RecordState::Pending,
            "Processing-A" => RecordState::ProcessingA,
            "Found-A" => RecordState::FoundA,
            "Check-B" => RecordState::CheckB,
            "Processing-B" => RecordState::ProcessingB,
            "Found-B" => RecordState::FoundB,
            "Not-Found" => RecordState::NotFound,
            "Error-A" => RecordState::ErrorA,
            "Error-B" => RecordState::ErrorB,
            _ => return None,
        })
    }

    /// Single-byte tag used as part of the `(tenant, state)` secondary-index key.
    /// Stable across releases -- never renumber, only append.
    #[must_use]
    pub fn tag(self) -> u8 {
        match self {
            RecordState::Pending => 0,
            RecordState::ProcessingA => 1,
            RecordState::FoundA => 2,
            RecordState::CheckB => 3,
            RecordState::ProcessingB => 4,
            RecordState::FoundB => 5,
            RecordState::NotFound => 6,
            RecordState::ErrorA => 7,
            RecordState::ErrorB => 8,
        }
    }
}

impl std::fmt::Display for RecordState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
