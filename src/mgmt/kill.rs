//! Session eviction

use super::command::is_success;
use super::{ManagementClient, MgmtError};
use tracing::debug;

/// Result of one eviction attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KillOutcome {
    pub success: bool,
    pub raw_reply: String,
}

impl KillOutcome {
    pub fn from_reply(raw_reply: String) -> Self {
        Self {
            success: is_success(&raw_reply),
            raw_reply,
        }
    }
}

impl ManagementClient {
    /// Disconnect every session with this common name
    ///
    /// Does not check whether the user was connected. With `commit` unset the
    /// user is left alone and a harmless `version` is sent instead, so a dry
    /// run still exercises the channel (and fails if it is down).
    pub fn kill(&mut self, username: &str, commit: bool) -> Result<KillOutcome, MgmtError> {
        let reply = if commit {
            self.send(&format!("kill {}", username), Some("\r\n"))?
        } else {
            debug!("Dry run, probing with version instead of killing {}", username);
            self.send("version", None)?
        };
        Ok(KillOutcome::from_reply(reply))
    }
}
