//! flagcheck is a harness for attack/defense CTF service checkers.
//!
//! A checker is a small program the game engine runs once per team, round
//! and verb: it stores a flag in a team's service instance, retrieves it
//! again later, exercises the service with noise and havoc traffic, and
//! reports one of five outcomes (`OK`, `MUMBLE`, `OFFLINE`, `TIMEOUT`,
//! `INTERNAL_ERROR`) through its exit code.
//!
//! This crate provides the parts every checker needs so the checker author
//! only writes service logic:
//!
//! - the [`Checker`] trait with one method per verb,
//! - the [`Engine`](engine::Engine) that runs a verb under the time budget
//!   and turns errors and panics into outcomes,
//! - a per-team persistent key/value store ([`TeamStore`](engine::TeamStore))
//!   that survives across rounds and processes,
//! - HTTP and TCP helpers whose failures already carry the right outcome,
//! - assertion helpers in [`utils`] for expressing service expectations.
//!
//! ```no_run
//! use flagcheck::prelude::*;
//!
//! struct ExampleChecker;
//!
//! impl Checker for ExampleChecker {
//!     fn store_flag(&mut self, env: &mut CheckerEnv) -> CheckerResult<()> {
//!         let flag = env.flag().to_string();
//!         env.store.set("flag", flag)?;
//!         Ok(())
//!     }
//!
//!     fn retrieve_flag(&mut self, env: &mut CheckerEnv) -> CheckerResult<()> {
//!         let stored: String = env.store.get_as("flag")?;
//!         assert_equals(env.flag(), stored.as_str(), Some("flag lost"))
//!     }
//!
//!     fn store_noise(&mut self, _env: &mut CheckerEnv) -> CheckerResult<()> {
//!         Ok(())
//!     }
//!
//!     fn retrieve_noise(&mut self, _env: &mut CheckerEnv) -> CheckerResult<()> {
//!         Ok(())
//!     }
//!
//!     fn havoc(&mut self, _env: &mut CheckerEnv) -> CheckerResult<()> {
//!         Ok(())
//!     }
//! }
//!
//! fn main() {
//!     flagcheck::cli::run_checker(ExampleChecker);
//! }
//! ```

pub mod cli;
pub mod engine;
pub mod net;
pub mod utils;

mod checker;
mod error;
mod outcome;

pub use checker::{Checker, CheckerEnv};
pub use engine::context::{Action, CheckerContext, Deadline};
pub use engine::runner::{Engine, RunReport};
pub use engine::store::TeamStore;
pub use error::{CheckerError, CheckerResult};
pub use outcome::Outcome;

/// Default directory for team databases, relative to the working directory.
pub const DB_DEFAULT_DIR: &str = ".data";

/// One-stop imports for checker binaries.
pub mod prelude {
    pub use crate::checker::{Checker, CheckerEnv};
    pub use crate::engine::context::{Action, CheckerContext};
    pub use crate::engine::runner::{Engine, RunReport};
    pub use crate::engine::store::TeamStore;
    pub use crate::error::{CheckerError, CheckerResult};
    pub use crate::net::http::expect_success;
    pub use crate::net::tcp::TcpConn;
    pub use crate::outcome::Outcome;
    pub use crate::utils::{assert_contains, assert_equals, assert_equals_bytes, assert_in};
}
