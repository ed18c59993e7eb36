//! The trait a service checker implements, plus the environment handed to it

use std::path::Path;
use std::time::Duration;

use reqwest::blocking::Response;
use serde_json::Value as JsonValue;

use crate::engine::context::{CheckerContext, Deadline};
use crate::engine::store::TeamStore;
use crate::error::{CheckerError, CheckerResult};
use crate::net::http::HttpClient;
use crate::net::tcp::TcpConn;

/// Ceiling for a single network operation; the remaining run deadline
/// shrinks it further as time is spent.
const DEFAULT_IO_TIMEOUT: Duration = Duration::from_secs(30);

/// One checker action against a service.
///
/// Implement the five flag/noise/havoc methods; `exploit` has a default
/// body that reports the verb as not implemented. Every method receives the
/// same [`CheckerEnv`], so state written during `store_flag` in one round is
/// readable during `retrieve_flag` in a later one.
///
/// Returning `Err` from any method decides the round for this team:
/// [`CheckerError::Broken`] means the service misbehaves, everything that
/// maps to [`CheckerError::Offline`] means it is unreachable, and any other
/// error is treated as a defect in the checker itself.
pub trait Checker: Send {
    fn store_flag(&mut self, env: &mut CheckerEnv) -> CheckerResult<()>;
    fn retrieve_flag(&mut self, env: &mut CheckerEnv) -> CheckerResult<()>;
    fn store_noise(&mut self, env: &mut CheckerEnv) -> CheckerResult<()>;
    fn retrieve_noise(&mut self, env: &mut CheckerEnv) -> CheckerResult<()>;
    fn havoc(&mut self, env: &mut CheckerEnv) -> CheckerResult<()>;

    fn exploit(&mut self, _env: &mut CheckerEnv) -> CheckerResult<()> {
        Err(CheckerError::NotImplemented("Exploit".to_string()))
    }
}

/// Everything a checker action needs: the invocation parameters, the team
/// database and network collaborators bound to the target service.
pub struct CheckerEnv {
    pub ctx: CheckerContext,
    pub store: TeamStore,
    pub http: HttpClient,
    deadline: Deadline,
}

impl CheckerEnv {
    pub(crate) fn bind(ctx: &CheckerContext, storage_dir: &Path) -> CheckerResult<Self> {
        let store = TeamStore::open(storage_dir, &format!("team_{}", ctx.team_name))?;
        let http = HttpClient::new(&ctx.address, ctx.port)?;
        Ok(Self {
            ctx: ctx.clone(),
            store,
            http,
            deadline: Deadline::starting_now(ctx.budget()),
        })
    }

    /// The flag to store or look for.
    pub fn flag(&self) -> &str {
        &self.ctx.flag
    }

    /// The noise payload for this call (shares the flag slot on the wire).
    pub fn noise(&self) -> &str {
        self.ctx.noise()
    }

    /// Time left before the run is declared timed out.
    pub fn remaining(&self) -> Duration {
        self.deadline.remaining()
    }

    fn io_timeout(&self) -> Duration {
        self.deadline.clamp(DEFAULT_IO_TIMEOUT)
    }

    /// GET a route on the service over HTTP.
    pub fn http_get(&self, route: &str) -> CheckerResult<Response> {
        self.http.get(route, self.io_timeout())
    }

    /// POST a JSON body to a route on the service.
    pub fn http_post(&self, route: &str, body: &JsonValue) -> CheckerResult<Response> {
        self.http.post_json(route, body, self.io_timeout())
    }

    /// Open a raw TCP connection to the service address and port.
    pub fn connect(&self) -> CheckerResult<TcpConn> {
        let port = self.ctx.port.ok_or_else(|| {
            CheckerError::InvalidConfig("port for service not set, cannot connect".to_string())
        })?;
        self.connect_to(&self.ctx.address, port)
    }

    /// Open a raw TCP connection to an arbitrary host and port.
    pub fn connect_to(&self, host: &str, port: u16) -> CheckerResult<TcpConn> {
        TcpConn::open(host, port, self.io_timeout())
    }

    /// Present a fresh browser identity for subsequent HTTP requests.
    pub fn randomize_useragent(&mut self) -> String {
        self.http.randomize_useragent()
    }
}
