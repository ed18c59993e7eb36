//! Engine internals: invocation context, team database and the runner

pub mod context;
pub mod runner;
pub mod store;

pub use context::{Action, CheckerContext, Deadline};
pub use runner::{Engine, RunReport};
pub use store::TeamStore;
