//! Authorization oracles
//!
//! The killer only needs one question answered: "is this user still allowed
//! on the VPN right now?". How that is decided (IAM lookup, static list) is
//! the oracle's business, including what to say when the backend is down.

pub mod http;

pub use http::HttpOracle;

use crate::config::OracleConfig;
use std::collections::HashSet;
use thiserror::Error;
use tracing::{info, warn};

#[derive(Error, Debug)]
pub enum OracleError {
    #[error("Failed to build HTTP client: {0}")]
    ClientError(#[from] reqwest::Error),
    #[error("Invalid oracle URL {url}: {message}")]
    InvalidUrl { url: String, message: String },
}

/// Answers whether a user may currently use the VPN
pub trait AccessOracle {
    fn is_allowed(&self, username: &str) -> bool;
}

impl<F> AccessOracle for F
where
    F: Fn(&str) -> bool,
{
    fn is_allowed(&self, username: &str) -> bool {
        self(username)
    }
}

/// Fixed set of allowed usernames, compared case-insensitively
#[derive(Debug, Clone, Default)]
pub struct AllowlistOracle {
    users: HashSet<String>,
}

impl AllowlistOracle {
    pub fn new<I, S>(users: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            users: users
                .into_iter()
                .map(|u| u.as_ref().to_lowercase())
                .collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.users.len()
    }

    pub fn is_empty(&self) -> bool {
        self.users.is_empty()
    }
}

impl AccessOracle for AllowlistOracle {
    fn is_allowed(&self, username: &str) -> bool {
        self.users.contains(&username.to_lowercase())
    }
}

/// Build the oracle described by the config
pub fn build_oracle(config: &OracleConfig) -> Result<Box<dyn AccessOracle>, OracleError> {
    match config {
        OracleConfig::Allowlist { users } => {
            let oracle = AllowlistOracle::new(users);
            if oracle.is_empty() {
                warn!("Allowlist is empty: every connected user will be disconnected");
            } else {
                info!("Using allowlist oracle with {} users", oracle.len());
            }
            Ok(Box::new(oracle))
        }
        OracleConfig::Http {
            url,
            timeout_secs,
            fail_open,
        } => {
            let oracle = HttpOracle::new(
                url,
                std::time::Duration::from_secs(*timeout_secs),
                *fail_open,
            )?;
            info!(
                "Using HTTP oracle at {} (fail_open={})",
                url,
                oracle.fail_open()
            );
            Ok(Box::new(oracle))
        }
    }
}
