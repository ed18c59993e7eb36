//! End-to-end runs through the engine with small in-crate checkers.

use std::path::Path;
use std::time::{Duration, Instant};

use tempfile::tempdir;

use flagcheck::prelude::*;
use flagcheck::utils::assert_equals as check_equals;
use flagcheck::Engine;

fn ctx(action: &str, round: u32) -> CheckerContext {
    CheckerContext {
        action: action.to_string(),
        address: "localhost".to_string(),
        team_name: "TestTeam".to_string(),
        round,
        flag: "ENOFLAG".to_string(),
        call_idx: 0,
        max_time: 30,
        port: Some(9999),
    }
}

fn run(action: &str, round: u32, storage: &Path, checker: impl Checker + 'static) -> RunReport {
    Engine::new(ctx(action, round))
        .with_storage_dir(storage)
        .run(checker)
}

/// Stores the flag in the team database and expects it back later.
struct ExampleChecker;

impl Checker for ExampleChecker {
    fn store_flag(&mut self, env: &mut CheckerEnv) -> CheckerResult<()> {
        let flag = env.flag().to_string();
        env.store.set("flag", flag)?;
        Ok(())
    }

    fn retrieve_flag(&mut self, env: &mut CheckerEnv) -> CheckerResult<()> {
        let stored: String = env
            .store
            .get_as("flag")
            .map_err(|_| CheckerError::Broken("flag not found".to_string()))?;
        check_equals(env.flag(), stored.as_str(), Some("flag is wrong"))
    }

    fn store_noise(&mut self, env: &mut CheckerEnv) -> CheckerResult<()> {
        let noise = env.noise().to_string();
        env.store.set("noise", noise)?;
        Ok(())
    }

    fn retrieve_noise(&mut self, env: &mut CheckerEnv) -> CheckerResult<()> {
        let stored: String = env
            .store
            .get_as("noise")
            .map_err(|_| CheckerError::Broken("noise not found".to_string()))?;
        check_equals(env.noise(), stored.as_str(), Some("noise is wrong"))
    }

    fn havoc(&mut self, env: &mut CheckerEnv) -> CheckerResult<()> {
        Err(CheckerError::Offline(format!(
            "could not connect to team {} at {}",
            env.ctx.team_name, env.ctx.address
        )))
    }
}

/// Succeeds on every verb.
struct NoopChecker;

impl Checker for NoopChecker {
    fn store_flag(&mut self, _env: &mut CheckerEnv) -> CheckerResult<()> {
        Ok(())
    }
    fn retrieve_flag(&mut self, _env: &mut CheckerEnv) -> CheckerResult<()> {
        Ok(())
    }
    fn store_noise(&mut self, _env: &mut CheckerEnv) -> CheckerResult<()> {
        Ok(())
    }
    fn retrieve_noise(&mut self, _env: &mut CheckerEnv) -> CheckerResult<()> {
        Ok(())
    }
    fn havoc(&mut self, _env: &mut CheckerEnv) -> CheckerResult<()> {
        Ok(())
    }
    fn exploit(&mut self, _env: &mut CheckerEnv) -> CheckerResult<()> {
        Ok(())
    }
}

#[test]
fn test_all_verbs_succeed() {
    let dir = tempdir().unwrap();
    for action in [
        "StoreFlag",
        "RetrieveFlag",
        "StoreNoise",
        "RetrieveNoise",
        "Havoc",
        "Exploit",
    ] {
        let report = run(action, 1, dir.path(), NoopChecker);
        assert_eq!(report.outcome, Outcome::Ok, "{action}: {}", report.message);
        assert_eq!(report.outcome.exit_code(), 0);
    }
}

#[test]
fn test_broken_service_is_mumble_with_verbatim_message() {
    struct BrokenChecker;
    impl Checker for BrokenChecker {
        fn store_flag(&mut self, _env: &mut CheckerEnv) -> CheckerResult<()> {
            Err(CheckerError::Broken("it is broken".to_string()))
        }
        fn retrieve_flag(&mut self, _env: &mut CheckerEnv) -> CheckerResult<()> {
            Ok(())
        }
        fn store_noise(&mut self, _env: &mut CheckerEnv) -> CheckerResult<()> {
            Ok(())
        }
        fn retrieve_noise(&mut self, _env: &mut CheckerEnv) -> CheckerResult<()> {
            Ok(())
        }
        fn havoc(&mut self, _env: &mut CheckerEnv) -> CheckerResult<()> {
            Ok(())
        }
    }

    let dir = tempdir().unwrap();
    let report = run("StoreFlag", 1, dir.path(), BrokenChecker);
    assert_eq!(report.outcome, Outcome::Mumble);
    assert_eq!(report.message, "it is broken");
    assert_eq!(report.outcome.exit_code(), 1);
    // The display form still carries the invocation context for logs.
    assert!(report.to_string().contains("TestTeam"));
}

#[test]
fn test_unreachable_service_is_offline() {
    let dir = tempdir().unwrap();
    let report = run("Havoc", 1, dir.path(), ExampleChecker);
    assert_eq!(report.outcome, Outcome::Offline);
    assert!(report.message.contains("could not connect"));
    assert_eq!(report.outcome.exit_code(), 2);
}

#[test]
fn test_unknown_actions_are_rejected() {
    let dir = tempdir().unwrap();
    for action in ["__init__", "store_flag", "db", ""] {
        let report = run(action, 1, dir.path(), NoopChecker);
        assert_eq!(report.outcome, Outcome::InternalError, "action {action:?}");
    }
}

#[test]
fn test_flag_survives_across_invocations() {
    let dir = tempdir().unwrap();

    let report = run("StoreFlag", 1, dir.path(), ExampleChecker);
    assert_eq!(report.outcome, Outcome::Ok, "{}", report.message);

    // Fresh engine and checker, same storage, later round.
    let report = run("RetrieveFlag", 2, dir.path(), ExampleChecker);
    assert_eq!(report.outcome, Outcome::Ok, "{}", report.message);
}

#[test]
fn test_retrieve_before_store_is_mumble() {
    let dir = tempdir().unwrap();
    let report = run("RetrieveFlag", 1, dir.path(), ExampleChecker);
    assert_eq!(report.outcome, Outcome::Mumble);
    assert_eq!(report.message, "flag not found");
}

#[test]
fn test_noise_roundtrip() {
    let dir = tempdir().unwrap();
    assert_eq!(
        run("StoreNoise", 1, dir.path(), ExampleChecker).outcome,
        Outcome::Ok
    );
    assert_eq!(
        run("RetrieveNoise", 2, dir.path(), ExampleChecker).outcome,
        Outcome::Ok
    );
}

#[test]
fn test_overrunning_checker_times_out() {
    struct SleepChecker;
    impl Checker for SleepChecker {
        fn store_flag(&mut self, _env: &mut CheckerEnv) -> CheckerResult<()> {
            std::thread::sleep(Duration::from_secs(3));
            Ok(())
        }
        fn retrieve_flag(&mut self, _env: &mut CheckerEnv) -> CheckerResult<()> {
            Ok(())
        }
        fn store_noise(&mut self, _env: &mut CheckerEnv) -> CheckerResult<()> {
            Ok(())
        }
        fn retrieve_noise(&mut self, _env: &mut CheckerEnv) -> CheckerResult<()> {
            Ok(())
        }
        fn havoc(&mut self, _env: &mut CheckerEnv) -> CheckerResult<()> {
            Ok(())
        }
    }

    let dir = tempdir().unwrap();
    let mut context = ctx("StoreFlag", 1);
    context.max_time = 1;

    let started = Instant::now();
    let report = Engine::new(context)
        .with_storage_dir(dir.path())
        .run(SleepChecker);
    let elapsed = started.elapsed();

    assert_eq!(report.outcome, Outcome::Timeout);
    assert!(report.message.contains("1s"));
    assert_eq!(report.outcome.exit_code(), 3);
    // The engine reports at the deadline instead of waiting out the sleep.
    assert!(elapsed < Duration::from_millis(2500), "took {elapsed:?}");
}

#[test]
fn test_panicking_checker_is_an_internal_error() {
    struct PanicChecker;
    impl Checker for PanicChecker {
        fn store_flag(&mut self, _env: &mut CheckerEnv) -> CheckerResult<()> {
            panic!("checker bug")
        }
        fn retrieve_flag(&mut self, _env: &mut CheckerEnv) -> CheckerResult<()> {
            Ok(())
        }
        fn store_noise(&mut self, _env: &mut CheckerEnv) -> CheckerResult<()> {
            Ok(())
        }
        fn retrieve_noise(&mut self, _env: &mut CheckerEnv) -> CheckerResult<()> {
            Ok(())
        }
        fn havoc(&mut self, _env: &mut CheckerEnv) -> CheckerResult<()> {
            Ok(())
        }
    }

    let dir = tempdir().unwrap();
    let report = run("StoreFlag", 1, dir.path(), PanicChecker);
    assert_eq!(report.outcome, Outcome::InternalError);
    assert_eq!(report.message, "checker panicked");
    assert_eq!(report.outcome.exit_code(), 4);
}

#[test]
fn test_exploit_defaults_to_not_implemented() {
    let dir = tempdir().unwrap();
    let report = run("Exploit", 1, dir.path(), ExampleChecker);
    assert_eq!(report.outcome, Outcome::InternalError);
    assert!(report.message.contains("Exploit"));
}

#[test]
fn test_store_is_persisted_even_when_the_action_fails() {
    struct StoreThenFailChecker;
    impl Checker for StoreThenFailChecker {
        fn store_flag(&mut self, env: &mut CheckerEnv) -> CheckerResult<()> {
            env.store.set("attempted", true)?;
            Err(CheckerError::Broken("post-write failure".to_string()))
        }
        fn retrieve_flag(&mut self, env: &mut CheckerEnv) -> CheckerResult<()> {
            env.store.get_as::<bool>("attempted").map(|_| ())
        }
        fn store_noise(&mut self, _env: &mut CheckerEnv) -> CheckerResult<()> {
            Ok(())
        }
        fn retrieve_noise(&mut self, _env: &mut CheckerEnv) -> CheckerResult<()> {
            Ok(())
        }
        fn havoc(&mut self, _env: &mut CheckerEnv) -> CheckerResult<()> {
            Ok(())
        }
    }

    let dir = tempdir().unwrap();
    let report = run("StoreFlag", 1, dir.path(), StoreThenFailChecker);
    assert_eq!(report.outcome, Outcome::Mumble);

    // The write that happened before the failure is still durable.
    let report = run("RetrieveFlag", 2, dir.path(), StoreThenFailChecker);
    assert_eq!(report.outcome, Outcome::Ok, "{}", report.message);
}

#[test]
fn test_locks_do_not_leak_across_invocations() {
    struct LockingChecker;
    impl Checker for LockingChecker {
        fn store_flag(&mut self, env: &mut CheckerEnv) -> CheckerResult<()> {
            env.store.lock("flag")?;
            let flag = env.flag().to_string();
            env.store.set("flag", flag)
        }
        fn retrieve_flag(&mut self, env: &mut CheckerEnv) -> CheckerResult<()> {
            if env.store.is_locked("flag") {
                return Err(CheckerError::Store("flag key still locked".to_string()));
            }
            env.store.get_as::<String>("flag").map(|_| ())
        }
        fn store_noise(&mut self, _env: &mut CheckerEnv) -> CheckerResult<()> {
            Ok(())
        }
        fn retrieve_noise(&mut self, _env: &mut CheckerEnv) -> CheckerResult<()> {
            Ok(())
        }
        fn havoc(&mut self, _env: &mut CheckerEnv) -> CheckerResult<()> {
            Ok(())
        }
    }

    let dir = tempdir().unwrap();
    assert_eq!(
        run("StoreFlag", 1, dir.path(), LockingChecker).outcome,
        Outcome::Ok
    );
    let report = run("RetrieveFlag", 2, dir.path(), LockingChecker);
    assert_eq!(report.outcome, Outcome::Ok, "{}", report.message);
}
