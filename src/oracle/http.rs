//! IAM-backed oracle over HTTP
//!
//! Asks `GET <url>?user=<username>` and expects `{"allowed": true|false}`.
//! When the IAM service cannot be reached or answers nonsense, the configured
//! `fail_open` value is returned instead. Fail-open keeps an IAM outage from
//! kicking every user off the VPN.

use super::{AccessOracle, OracleError};
use reqwest::Url;
use reqwest::blocking::Client;
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, warn};

#[derive(Debug, Deserialize)]
struct AllowedResponse {
    allowed: bool,
}

pub struct HttpOracle {
    client: Client,
    url: Url,
    fail_open: bool,
}

impl HttpOracle {
    pub fn new(url: &str, timeout: Duration, fail_open: bool) -> Result<Self, OracleError> {
        let url = Url::parse(url).map_err(|e| OracleError::InvalidUrl {
            url: url.to_string(),
            message: e.to_string(),
        })?;

        let client = Client::builder()
            .timeout(timeout)
            .user_agent(concat!("vpn-kill-users/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            client,
            url,
            fail_open,
        })
    }

    pub fn fail_open(&self) -> bool {
        self.fail_open
    }

    fn query(&self, username: &str) -> Result<bool, reqwest::Error> {
        let response = self
            .client
            .get(self.url.clone())
            .query(&[("user", username)])
            .send()?
            .error_for_status()?;
        let body: AllowedResponse = response.json()?;
        Ok(body.allowed)
    }
}

impl AccessOracle for HttpOracle {
    fn is_allowed(&self, username: &str) -> bool {
        match self.query(username) {
            Ok(allowed) => {
                debug!("IAM says {} allowed={}", username, allowed);
                allowed
            }
            Err(e) => {
                warn!(
                    "IAM lookup for {} failed: {} (answering {})",
                    username, e, self.fail_open
                );
                self.fail_open
            }
        }
    }
}
