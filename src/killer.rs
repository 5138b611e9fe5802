//! One eviction pass
//!
//! Ties the management client and the authorization oracle together:
//!
//! 1. connect to the management socket
//! 2. list connected users (`status 2`)
//! 3. ask the oracle about each one
//! 4. kill every session that is no longer allowed
//! 5. disconnect, whatever happened in 4
//!
//! # Error Handling
//!
//! A failed connect ends the pass early and is reported, not retried. A
//! failed kill is logged and the batch carries on. Socket errors on an
//! established channel abort the pass, after a best-effort disconnect.

use crate::config::Config;
use crate::mgmt::{ConnectedSession, ManagementClient, MgmtError};
use crate::oracle::{AccessOracle, OracleError, build_oracle};
use crate::reconcile::reconcile;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, error, info, warn};

#[derive(Error, Debug)]
pub enum KillerError {
    #[error("Unable to connect to {}", .0.display())]
    Unreachable(PathBuf),
    #[error("Management error: {0}")]
    MgmtError(#[from] MgmtError),
    #[error("Oracle error: {0}")]
    OracleError(#[from] OracleError),
    #[error("Config error: {0}")]
    ConfigError(#[from] crate::config::ConfigError),
    #[error("No authorization oracle configured")]
    NoOracle,
}

/// Where a pass currently stands
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Disconnected,
    Connecting,
    Handshaking,
    Ready,
    Draining,
}

/// What a completed pass did
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunSummary {
    /// Users scheduled for eviction
    pub planned: usize,
    /// Kills the daemon confirmed
    pub evicted: usize,
    /// Kills the daemon refused
    pub failed: usize,
}

pub struct VpnKiller {
    vpn: ManagementClient,
    oracle: Box<dyn AccessOracle>,
    state: RunState,
    #[cfg(test)]
    visited: Vec<RunState>,
}

impl VpnKiller {
    pub fn new(vpn: ManagementClient, oracle: Box<dyn AccessOracle>) -> Self {
        Self {
            vpn,
            oracle,
            state: RunState::Disconnected,
            #[cfg(test)]
            visited: Vec::new(),
        }
    }

    /// Discover configuration (see [`Config::discover`]) and build a killer
    pub fn load(socket_path: &Path, config_path: Option<&Path>) -> Result<Self, KillerError> {
        let config = Config::discover(config_path)?;
        Self::from_config(socket_path, &config)
    }

    /// Build a killer for `socket_path` from loaded configuration
    pub fn from_config(socket_path: &Path, config: &Config) -> Result<Self, KillerError> {
        let oracle_config = config.oracle.as_ref().ok_or(KillerError::NoOracle)?;
        let oracle = build_oracle(oracle_config)?;
        let vpn = ManagementClient::from_config(socket_path, &config.management);
        Ok(Self::new(vpn, oracle))
    }

    pub fn state(&self) -> RunState {
        self.state
    }

    pub fn socket_path(&self) -> &Path {
        self.vpn.socket_path()
    }

    fn transition(&mut self, next: RunState) {
        debug!("State {:?} -> {:?}", self.state, next);
        self.state = next;
        #[cfg(test)]
        self.visited.push(next);
    }

    /// Try to reach the management socket. `false` means not connected.
    pub fn vpn_connect(&mut self) -> bool {
        self.transition(RunState::Connecting);
        if let Err(e) = self.vpn.open() {
            warn!("{}", e);
            self.transition(RunState::Disconnected);
            return false;
        }

        self.transition(RunState::Handshaking);
        if let Err(e) = self.vpn.handshake() {
            warn!("{}", e);
            self.transition(RunState::Disconnected);
            return false;
        }

        self.transition(RunState::Ready);
        true
    }

    /// Leave the management socket. Safe to call in any state.
    pub fn vpn_disconnect(&mut self) {
        self.transition(RunState::Draining);
        self.vpn.disconnect();
        self.transition(RunState::Disconnected);
    }

    /// Connected users the oracle no longer approves
    pub fn get_users_to_disconnect(
        &mut self,
    ) -> Result<HashMap<String, ConnectedSession>, KillerError> {
        let report = self.vpn.status()?;
        if report.looks_like_error() {
            warn!(
                "Status query returned an error: {}",
                report.raw().trim_end()
            );
        } else if !report.is_complete() {
            warn!("Status dump was incomplete, user list may be short");
        }

        let connected = report.into_sessions();
        info!("{} users connected to the VPN", connected.len());

        let to_disconnect = reconcile(&connected, self.oracle.as_ref());
        info!("{} users no longer allowed", to_disconnect.len());
        Ok(to_disconnect)
    }

    /// Announce and kill one session. Returns whether the daemon agreed.
    pub fn disconnect_user(
        &mut self,
        session: &ConnectedSession,
        commit: bool,
    ) -> Result<bool, KillerError> {
        println!(
            "disconnecting from VPN: {} / {}",
            session.username,
            session.remote_ip()
        );
        let outcome = self.vpn.kill(&session.username, commit)?;
        if outcome.success {
            info!("Disconnected {}", session.username);
        } else {
            warn!(
                "Failed to disconnect {}: {}",
                session.username,
                outcome.raw_reply.trim_end()
            );
        }
        Ok(outcome.success)
    }

    /// Run a complete pass: connect, reconcile, evict, disconnect
    pub fn run(&mut self, dry_run: bool) -> Result<RunSummary, KillerError> {
        if !self.vpn_connect() {
            return Err(KillerError::Unreachable(self.socket_path().to_path_buf()));
        }

        let result = self.evict_all(!dry_run);
        if let Err(e) = &result {
            error!("Pass aborted: {}", e);
        }
        self.vpn_disconnect();
        result
    }

    fn evict_all(&mut self, commit: bool) -> Result<RunSummary, KillerError> {
        let to_disconnect = self.get_users_to_disconnect()?;
        let mut summary = RunSummary {
            planned: to_disconnect.len(),
            ..RunSummary::default()
        };

        let mut sessions: Vec<&ConnectedSession> = to_disconnect.values().collect();
        sessions.sort_by(|a, b| a.username.cmp(&b.username));

        for session in sessions {
            if self.disconnect_user(session, commit)? {
                summary.evicted += 1;
            } else {
                summary.failed += 1;
            }
        }

        info!(
            "Pass complete: {} planned, {} evicted, {} failed{}",
            summary.planned,
            summary.evicted,
            summary.failed,
            if commit { "" } else { " (dry run)" }
        );
        Ok(summary)
    }
}
