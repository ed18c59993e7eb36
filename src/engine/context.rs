//! Invocation context, the fixed verb set, and the wall-clock deadline

use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

use crate::error::{CheckerError, CheckerResult};

/// The fixed set of verbs a checker exposes.
///
/// Dispatch is an explicit allow-list: the engine resolves the requested
/// action name against this enum and rejects everything else, so a malformed
/// or malicious action name can never reach internal logic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Action {
    StoreFlag,
    RetrieveFlag,
    StoreNoise,
    RetrieveNoise,
    Havoc,
    Exploit,
}

impl Action {
    pub const ALL: [Action; 6] = [
        Action::StoreFlag,
        Action::RetrieveFlag,
        Action::StoreNoise,
        Action::RetrieveNoise,
        Action::Havoc,
        Action::Exploit,
    ];

    /// Resolve an action name against the allow-list.
    pub fn from_name(name: &str) -> CheckerResult<Action> {
        match name {
            "StoreFlag" => Ok(Action::StoreFlag),
            "RetrieveFlag" => Ok(Action::RetrieveFlag),
            "StoreNoise" => Ok(Action::StoreNoise),
            "RetrieveNoise" => Ok(Action::RetrieveNoise),
            "Havoc" => Ok(Action::Havoc),
            "Exploit" => Ok(Action::Exploit),
            other => {
                let supported: Vec<&str> = Action::ALL.iter().map(|a| a.as_str()).collect();
                Err(CheckerError::UnknownAction(format!(
                    "{} (supported: {})",
                    other,
                    supported.join(", ")
                )))
            }
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Action::StoreFlag => "StoreFlag",
            Action::RetrieveFlag => "RetrieveFlag",
            Action::StoreNoise => "StoreNoise",
            Action::RetrieveNoise => "RetrieveNoise",
            Action::Havoc => "Havoc",
            Action::Exploit => "Exploit",
        }
    }
}

impl std::fmt::Display for Action {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Action {
    type Err = CheckerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Action::from_name(s)
    }
}

/// Immutable inputs for one checker invocation, as supplied by the
/// external caller.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckerContext {
    /// Requested action name; validated by the engine, not here.
    pub action: String,
    /// IP or hostname of the target service.
    pub address: String,
    /// Team identifier; scopes the team database.
    pub team_name: String,
    /// Current round number.
    pub round: u32,
    /// Flag (or noise) payload for this call.
    pub flag: String,
    /// Index disambiguating multiple calls within one round.
    pub call_idx: u32,
    /// Wall-clock budget in seconds.
    pub max_time: u64,
    /// Target port, if the caller supplied one.
    pub port: Option<u16>,
}

impl CheckerContext {
    /// The noise payload. Noise travels in the same field as the flag,
    /// just under a different action.
    pub fn noise(&self) -> &str {
        &self.flag
    }

    pub fn budget(&self) -> Duration {
        Duration::from_secs(self.max_time)
    }

    /// One-line summary naming action, team, address, port and round, used
    /// to seed diagnostics so a report can be understood without re-running.
    pub fn describe(&self) -> String {
        let port = self
            .port
            .map(|p| p.to_string())
            .unwrap_or_else(|| "-".to_string());
        format!(
            "{} for team {} at {}:{} (round {}, call {})",
            self.action, self.team_name, self.address, port, self.round, self.call_idx
        )
    }
}

/// Wall-clock budget for the running state.
///
/// Network helpers clamp their socket timeouts to `remaining()` so every
/// suspension point inside a checker body is bound by the budget.
#[derive(Debug, Clone, Copy)]
pub struct Deadline {
    end: Instant,
}

impl Deadline {
    pub fn starting_now(budget: Duration) -> Self {
        Self {
            end: Instant::now() + budget,
        }
    }

    pub fn remaining(&self) -> Duration {
        self.end.saturating_duration_since(Instant::now())
    }

    pub fn expired(&self) -> bool {
        self.remaining().is_zero()
    }

    /// Clamp an IO timeout to the remaining budget, keeping it strictly
    /// positive so socket APIs don't interpret it as "no timeout".
    pub fn clamp(&self, timeout: Duration) -> Duration {
        timeout
            .min(self.remaining())
            .max(Duration::from_millis(1))
    }
}
