//! Execution engine: run one checker action and classify the result
//!
//! The checker body runs on a worker thread while the engine waits on a
//! channel with the invocation's time budget. A worker that overruns the
//! budget is left behind; its socket timeouts are clamped to the remaining
//! deadline, so it winds down on its own while the engine already reports.

use std::path::PathBuf;
use std::sync::mpsc;
use std::thread;

use tracing::{info, warn};

use crate::checker::{Checker, CheckerEnv};
use crate::engine::context::{Action, CheckerContext};
use crate::error::CheckerResult;
use crate::outcome::Outcome;
use crate::DB_DEFAULT_DIR;

/// The classified result of one engine run.
#[derive(Debug, Clone)]
pub struct RunReport {
    pub outcome: Outcome,
    /// Verbatim failure message, or a short success note.
    pub message: String,
    /// Human-readable invocation summary for logs.
    pub context: String,
}

impl std::fmt::Display for RunReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} [{}]: {}", self.outcome, self.context, self.message)
    }
}

/// Drives a single checker invocation from parameters to a [`RunReport`].
pub struct Engine {
    ctx: CheckerContext,
    storage_dir: PathBuf,
}

impl Engine {
    pub fn new(ctx: CheckerContext) -> Self {
        Self {
            ctx,
            storage_dir: PathBuf::from(DB_DEFAULT_DIR),
        }
    }

    /// Override where team databases live.
    pub fn with_storage_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.storage_dir = dir.into();
        self
    }

    /// Resolve the action, run the checker under the time budget and
    /// classify whatever comes back. Never panics and never returns early
    /// without a report.
    pub fn run<C: Checker + 'static>(self, mut checker: C) -> RunReport {
        let context = self.ctx.describe();
        info!(%context, "starting checker run");

        let action = match Action::from_name(&self.ctx.action) {
            Ok(action) => action,
            Err(e) => {
                warn!(%context, error = %e, "invalid action");
                return RunReport {
                    outcome: Outcome::InternalError,
                    message: e.to_string(),
                    context,
                };
            }
        };

        let mut env = match CheckerEnv::bind(&self.ctx, &self.storage_dir) {
            Ok(env) => env,
            Err(e) => {
                warn!(%context, error = %e, "environment setup failed");
                return RunReport {
                    outcome: Outcome::InternalError,
                    message: format!("failed to set up checker environment: {e}"),
                    context,
                };
            }
        };

        let budget = self.ctx.budget();
        let (tx, rx) = mpsc::channel::<CheckerResult<()>>();
        let worker = thread::Builder::new()
            .name(format!("checker-{}", action))
            .spawn(move || {
                let run_result = dispatch(&mut checker, action, &mut env);
                if let Err(e) = env.store.release_all() {
                    warn!(error = %e, "failed to release store locks");
                }
                let persist_result = env.store.persist();
                let result = match (run_result, persist_result) {
                    (Err(e), _) => Err(e),
                    (Ok(()), Err(e)) => Err(e),
                    (Ok(()), Ok(())) => Ok(()),
                };
                // The receiver is gone if the engine already timed out.
                let _ = tx.send(result);
            });

        if let Err(e) = worker {
            return RunReport {
                outcome: Outcome::InternalError,
                message: format!("failed to spawn checker thread: {e}"),
                context,
            };
        }

        let (outcome, message) = match rx.recv_timeout(budget) {
            Ok(result) => classify(action, result),
            Err(mpsc::RecvTimeoutError::Timeout) => (
                Outcome::Timeout,
                format!("action did not finish within {}s", self.ctx.max_time),
            ),
            Err(mpsc::RecvTimeoutError::Disconnected) => {
                (Outcome::InternalError, "checker panicked".to_string())
            }
        };

        match outcome {
            Outcome::Ok => info!(%context, %outcome, "checker run finished"),
            _ => warn!(%context, %outcome, %message, "checker run failed"),
        }
        RunReport {
            outcome,
            message,
            context,
        }
    }
}

fn dispatch<C: Checker>(
    checker: &mut C,
    action: Action,
    env: &mut CheckerEnv,
) -> CheckerResult<()> {
    match action {
        Action::StoreFlag => checker.store_flag(env),
        Action::RetrieveFlag => checker.retrieve_flag(env),
        Action::StoreNoise => checker.store_noise(env),
        Action::RetrieveNoise => checker.retrieve_noise(env),
        Action::Havoc => checker.havoc(env),
        Action::Exploit => checker.exploit(env),
    }
}

fn classify(action: Action, result: CheckerResult<()>) -> (Outcome, String) {
    match result {
        Ok(()) => (Outcome::Ok, format!("{action} completed")),
        Err(e) => {
            let outcome = Outcome::from_error(&e);
            (outcome, e.to_string())
        }
    }
}
