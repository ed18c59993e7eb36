//! Blocking HTTP session bound to the target service
//!
//! Cookies are cached across requests within one invocation, like a browser
//! session. Connection-level failures surface as the offline signal via the
//! `From<reqwest::Error>` conversion; HTTP error statuses are the service
//! talking, so [`expect_success`] turns those into the broken signal instead.

use std::time::Duration;

use reqwest::blocking::{Client, RequestBuilder, Response};
use serde_json::Value as JsonValue;
use tracing::debug;

use crate::error::{CheckerError, CheckerResult};
use crate::net::useragents::random_useragent;

/// HTTP client pinned to one address:port, with a per-invocation user agent.
pub struct HttpClient {
    client: Client,
    address: String,
    port: Option<u16>,
    user_agent: String,
}

impl HttpClient {
    pub fn new(address: &str, port: Option<u16>) -> CheckerResult<Self> {
        let client = Client::builder().cookie_store(true).build()?;
        Ok(Self {
            client,
            address: address.to_string(),
            port,
            user_agent: random_useragent().to_string(),
        })
    }

    /// Build a full URL for a route on the target service.
    pub fn url(&self, route: &str) -> CheckerResult<String> {
        let port = self.port.ok_or_else(|| {
            CheckerError::InvalidConfig("port for service not set, cannot request".to_string())
        })?;
        let route = if route.starts_with('/') {
            route.to_string()
        } else {
            format!("/{route}")
        };
        Ok(format!("http://{}:{}{}", self.address, port, route))
    }

    pub fn get(&self, route: &str, timeout: Duration) -> CheckerResult<Response> {
        let url = self.url(route)?;
        self.send(self.client.get(url), timeout)
    }

    pub fn get_with_params(
        &self,
        route: &str,
        params: &[(&str, &str)],
        timeout: Duration,
    ) -> CheckerResult<Response> {
        let url = self.url(route)?;
        self.send(self.client.get(url).query(params), timeout)
    }

    pub fn post(&self, route: &str, timeout: Duration) -> CheckerResult<Response> {
        let url = self.url(route)?;
        self.send(self.client.post(url), timeout)
    }

    pub fn post_json(
        &self,
        route: &str,
        body: &JsonValue,
        timeout: Duration,
    ) -> CheckerResult<Response> {
        let url = self.url(route)?;
        self.send(self.client.post(url).json(body), timeout)
    }

    pub fn post_form(
        &self,
        route: &str,
        form: &[(&str, &str)],
        timeout: Duration,
    ) -> CheckerResult<Response> {
        let url = self.url(route)?;
        self.send(self.client.post(url).form(form), timeout)
    }

    fn send(&self, request: RequestBuilder, timeout: Duration) -> CheckerResult<Response> {
        debug!(timeout_ms = timeout.as_millis() as u64, "sending http request");
        let response = request
            .header(reqwest::header::USER_AGENT, &self.user_agent)
            .timeout(timeout)
            .send()?;
        debug!(status = response.status().as_u16(), "received http response");
        Ok(response)
    }

    pub fn user_agent(&self) -> &str {
        &self.user_agent
    }

    /// Swap in a fresh random user agent and return it.
    pub fn randomize_useragent(&mut self) -> String {
        self.user_agent = random_useragent().to_string();
        self.user_agent.clone()
    }
}

/// Treat 4xx/5xx statuses as a broken service rather than a checker defect.
pub fn expect_success(response: Response) -> CheckerResult<Response> {
    let status = response.status();
    if status.is_client_error() || status.is_server_error() {
        return Err(CheckerError::Broken(format!(
            "service returned HTTP {status}"
        )));
    }
    Ok(response)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_url_building() {
        let client = HttpClient::new("10.0.0.1", Some(8080)).unwrap();
        assert_eq!(client.url("/").unwrap(), "http://10.0.0.1:8080/");
        assert_eq!(
            client.url("api/flags").unwrap(),
            "http://10.0.0.1:8080/api/flags"
        );
    }

    #[test]
    fn test_url_without_port_is_a_config_error() {
        let client = HttpClient::new("10.0.0.1", None).unwrap();
        assert!(matches!(
            client.url("/").unwrap_err(),
            CheckerError::InvalidConfig(_)
        ));
    }

    #[test]
    fn test_randomize_useragent_updates_identity() {
        let mut client = HttpClient::new("10.0.0.1", Some(80)).unwrap();
        let next = client.randomize_useragent();
        assert_eq!(client.user_agent(), next);
        assert!(!next.is_empty());
    }
}
