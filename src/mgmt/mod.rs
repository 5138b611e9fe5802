//! OpenVPN management interface client
//!
//! OpenVPN exposes an administrative channel on a local Unix socket when the
//! server is configured with, for example:
//!
//! ```text
//! management /var/run/openvpn-udp-stage.socket unix
//! management-client-group vpnmgmt
//! ```
//!
//! The protocol is line oriented and call-and-response, but it has no
//! framing: a reply ends either at a known terminal token (`END` for status
//! dumps) or when the daemon goes quiet. This module handles that
//! conversation.
//!
//! - `transport`: socket ownership, greeting, blocking → non-blocking switch
//! - `command`: send a command and drain the reply
//! - `status`: parse `status 2` dumps into connected sessions
//! - `kill`: evict a session (or check the channel in dry-run mode)

pub mod command;
pub mod kill;
pub mod status;
pub mod transport;

pub use command::DrainPolicy;
pub use kill::KillOutcome;
pub use status::{ConnectedSession, StatusFormat, StatusReport};
pub use transport::{Connection, SocketMode};

use crate::config::ManagementConfig;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::debug;

/// Management channel errors
#[derive(Error, Debug)]
pub enum MgmtError {
    #[error("Failed to connect to {}: {source}", .path.display())]
    Connect { path: PathBuf, source: io::Error },

    #[error("Not connected to the management socket")]
    NotConnected,

    #[error("Management socket I/O failed: {0}")]
    Transmission(#[from] io::Error),
}

/// Client for one OpenVPN management socket
///
/// Owns the [`Connection`] outright; nothing else ever holds the socket.
pub struct ManagementClient {
    conn: Connection,
    policy: DrainPolicy,
}

impl ManagementClient {
    pub fn new(socket_path: impl Into<PathBuf>) -> Self {
        Self::with_policy(socket_path, DrainPolicy::default())
    }

    pub fn with_policy(socket_path: impl Into<PathBuf>, policy: DrainPolicy) -> Self {
        Self {
            conn: Connection::new(socket_path.into()),
            policy,
        }
    }

    pub fn from_config(socket_path: impl Into<PathBuf>, config: &ManagementConfig) -> Self {
        let conn = Connection::new(socket_path.into())
            .with_greeting(config.banner_size, config.greeting_timeout());
        Self {
            conn,
            policy: DrainPolicy::from_config(config),
        }
    }

    pub fn socket_path(&self) -> &Path {
        self.conn.path()
    }

    pub fn policy(&self) -> &DrainPolicy {
        &self.policy
    }

    pub fn mode(&self) -> SocketMode {
        self.conn.mode()
    }

    pub fn is_connected(&self) -> bool {
        self.conn.is_connected()
    }

    /// Connect and discard the welcome banner
    pub fn connect(&mut self) -> Result<(), MgmtError> {
        self.conn.connect()
    }

    /// First half of [`connect`](Self::connect): open the socket only
    pub fn open(&mut self) -> Result<(), MgmtError> {
        self.conn.open()
    }

    /// Second half of [`connect`](Self::connect): consume the greeting
    pub fn handshake(&mut self) -> Result<(), MgmtError> {
        self.conn.handshake()
    }

    /// Leave gracefully if possible; never fails
    pub fn disconnect(&mut self) {
        if self.conn.is_connected() {
            if let Err(e) = self.send("quit", None) {
                debug!("quit not delivered: {}", e);
            }
        }
        self.conn.close();
    }
}
