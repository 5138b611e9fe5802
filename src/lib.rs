//! vpn-kill-users - Force disallowed users off an OpenVPN server
//!
//! Looks for people who are connected to the VPN but no longer allowed on
//! it, and administratively kicks them off through the OpenVPN management
//! socket.
//!
//! "Why not just let `reneg-sec` do its thing?" Renegotiation is usually
//! turned off once MFA is in place, and `auth-gen-token` is not available
//! with every client in the field.
//!
//! # Architecture
//!
//! - `config`: Configuration file handling (TOML)
//! - `mgmt`: OpenVPN management protocol client
//! - `oracle`: Authorization backends (allowlist, IAM over HTTP)
//! - `reconcile`: Connected users minus allowed users
//! - `killer`: One connect → reconcile → evict → disconnect pass
//!
//! # Usage
//!
//! Meant to be run periodically from cron or a systemd timer:
//! ```bash
//! vpn-kill-users /var/run/openvpn-udp-stage.socket
//! ```

pub mod config;
pub mod killer;
pub mod mgmt;
pub mod oracle;
pub mod reconcile;

pub use config::Config;
pub use killer::{KillerError, RunState, RunSummary, VpnKiller};
pub use mgmt::{ConnectedSession, KillOutcome, ManagementClient, MgmtError};
pub use oracle::AccessOracle;
pub use reconcile::reconcile;
