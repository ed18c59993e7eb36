//! Outcome classification for a single checker invocation

use serde::{Deserialize, Serialize};

use crate::error::CheckerError;

/// Result of one checker invocation, ordered by severity.
///
/// Exactly one outcome is produced per invocation. The derived `Ord` follows
/// the severity order used for scoring: `Ok < Mumble < Offline < Timeout <
/// InternalError`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Outcome {
    /// The action completed without raising anything.
    Ok,
    /// The service responded but data/flag verification failed.
    Mumble,
    /// The service was unreachable.
    Offline,
    /// The action did not finish within its wall-clock budget.
    Timeout,
    /// A defect in the checker itself, not the service.
    InternalError,
}

impl Outcome {
    /// Classify a checker error into an outcome.
    ///
    /// Only the two domain signals map to service states; anything else,
    /// including store misses the checker did not handle, is a checker
    /// defect. Deadline breaches are detected by the engine and never
    /// reach this function.
    pub fn from_error(err: &CheckerError) -> Outcome {
        match err {
            CheckerError::Broken(_) => Outcome::Mumble,
            CheckerError::Offline(_) => Outcome::Offline,
            _ => Outcome::InternalError,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Outcome::Ok => "OK",
            Outcome::Mumble => "MUMBLE",
            Outcome::Offline => "OFFLINE",
            Outcome::Timeout => "TIMEOUT",
            Outcome::InternalError => "INTERNAL_ERROR",
        }
    }

    /// Process exit code for this outcome, following the severity order.
    pub fn exit_code(self) -> i32 {
        match self {
            Outcome::Ok => 0,
            Outcome::Mumble => 1,
            Outcome::Offline => 2,
            Outcome::Timeout => 3,
            Outcome::InternalError => 4,
        }
    }
}

impl std::fmt::Display for Outcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
