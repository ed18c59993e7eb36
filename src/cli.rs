//! Command-line entry point for checker binaries
//!
//! A checker crate's `main` is one call:
//!
//! ```no_run
//! # use flagcheck::prelude::*;
//! # struct MyChecker;
//! # impl Checker for MyChecker {
//! #     fn store_flag(&mut self, _env: &mut CheckerEnv) -> CheckerResult<()> { Ok(()) }
//! #     fn retrieve_flag(&mut self, _env: &mut CheckerEnv) -> CheckerResult<()> { Ok(()) }
//! #     fn store_noise(&mut self, _env: &mut CheckerEnv) -> CheckerResult<()> { Ok(()) }
//! #     fn retrieve_noise(&mut self, _env: &mut CheckerEnv) -> CheckerResult<()> { Ok(()) }
//! #     fn havoc(&mut self, _env: &mut CheckerEnv) -> CheckerResult<()> { Ok(()) }
//! # }
//! fn main() {
//!     flagcheck::cli::run_checker(MyChecker);
//! }
//! ```

use clap::Parser;
use tracing::Level;
use tracing_subscriber::EnvFilter;

use crate::checker::Checker;
use crate::engine::context::CheckerContext;
use crate::engine::runner::Engine;

/// Positional arguments as the game engine passes them.
#[derive(Debug, Parser)]
#[command(about = "Check a team's service instance and report its status")]
pub struct CheckerArgs {
    /// Action to run (StoreFlag, RetrieveFlag, StoreNoise, RetrieveNoise, Havoc, Exploit)
    pub action: String,
    /// Address of the team's service instance
    pub address: String,
    /// Name of the team being checked
    pub team_name: String,
    /// Current round number
    pub round: u32,
    /// Flag to store or expect, also used as the noise payload
    pub flag: String,
    /// Time budget for the whole invocation, in seconds
    #[arg(value_parser = clap::value_parser!(u64).range(1..))]
    pub max_time: u64,
    /// Index of this call within the round
    pub call_idx: u32,
    /// Service port
    #[arg(short, long, value_parser = clap::value_parser!(u16).range(1..))]
    pub port: Option<u16>,
    /// Increase log verbosity (-v, -vv, ...)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,
    /// Only log errors
    #[arg(short, long)]
    pub quiet: bool,
}

impl CheckerArgs {
    pub fn into_context(self) -> CheckerContext {
        CheckerContext {
            action: self.action,
            address: self.address,
            team_name: self.team_name,
            round: self.round,
            flag: self.flag,
            max_time: self.max_time,
            call_idx: self.call_idx,
            port: self.port,
        }
    }
}

fn init_tracing(verbose: u8, quiet: bool) {
    let level = if quiet {
        Level::ERROR
    } else {
        match verbose {
            0 => Level::WARN,
            1 => Level::INFO,
            2 => Level::DEBUG,
            _ => Level::TRACE,
        }
    };
    // RUST_LOG still wins over the flags when set.
    let filter = EnvFilter::builder()
        .with_default_directive(level.into())
        .from_env_lossy();
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .try_init();
}

/// Parse the command line, run the checker and exit with the outcome's code.
pub fn run_checker<C: Checker + 'static>(checker: C) -> ! {
    let args = CheckerArgs::parse();
    init_tracing(args.verbose, args.quiet);

    let report = Engine::new(args.into_context()).run(checker);
    println!("{report}");
    std::process::exit(report.outcome.exit_code())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_args() {
        let args = CheckerArgs::try_parse_from([
            "checker",
            "StoreFlag",
            "localhost",
            "TestTeam",
            "1",
            "ENOFLAG",
            "30",
            "0",
            "-p",
            "1337",
        ])
        .unwrap();
        assert_eq!(args.action, "StoreFlag");
        assert_eq!(args.address, "localhost");
        assert_eq!(args.team_name, "TestTeam");
        assert_eq!(args.round, 1);
        assert_eq!(args.flag, "ENOFLAG");
        assert_eq!(args.max_time, 30);
        assert_eq!(args.call_idx, 0);
        assert_eq!(args.port, Some(1337));

        let ctx = args.into_context();
        assert_eq!(ctx.noise(), "ENOFLAG");
    }

    #[test]
    fn test_args_reject_zero_budget() {
        let result = CheckerArgs::try_parse_from([
            "checker",
            "Havoc",
            "localhost",
            "TestTeam",
            "1",
            "ENOFLAG",
            "0",
            "0",
        ]);
        assert!(result.is_err());
    }

    #[test]
    fn test_args_port_is_optional() {
        let args = CheckerArgs::try_parse_from([
            "checker",
            "Havoc",
            "localhost",
            "TestTeam",
            "1",
            "ENOFLAG",
            "30",
            "0",
        ])
        .unwrap();
        assert_eq!(args.port, None);
    }
}
