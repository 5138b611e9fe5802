//! Command/response exchange over the management socket
//!
//! The management protocol has no length prefix and no universal terminator.
//! A reply is drained until either a caller-supplied stop marker shows up in
//! the accumulated text, or the socket stays quiet for one poll interval.

use super::{ManagementClient, MgmtError};
use crate::config::ManagementConfig;
use std::time::Duration;
use tracing::{debug, trace};

/// How long to keep reading a reply, and in what chunk size
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DrainPolicy {
    /// Silence of this length ends a reply
    pub poll_interval: Duration,
    pub read_chunk_size: usize,
}

impl Default for DrainPolicy {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(1),
            read_chunk_size: 1024,
        }
    }
}

impl DrainPolicy {
    pub fn from_config(config: &ManagementConfig) -> Self {
        Self {
            poll_interval: config.poll_interval(),
            read_chunk_size: config.read_chunk_size.max(1),
        }
    }
}

impl ManagementClient {
    /// Send one command and return the (possibly multi-line) reply
    ///
    /// Pick `stop_on` carefully: it is a plain substring test against
    /// everything received since the command went out, so a marker that can
    /// appear inside the payload ends the read early. Reading always runs to
    /// the end of the line holding the marker, so nothing of this reply is
    /// left behind for the next command.
    pub fn send(&mut self, command: &str, stop_on: Option<&str>) -> Result<String, MgmtError> {
        if !self.conn.is_connected() {
            return Err(MgmtError::NotConnected);
        }

        let stale = self.discard_pending()?;
        if stale > 0 {
            debug!("Discarded {} stale bytes before {:?}", stale, command);
        }

        debug!("> {}", command);
        self.conn.write_line(command)?;

        let mut data: Vec<u8> = Vec::new();
        let mut chunk = vec![0u8; self.policy.read_chunk_size];

        loop {
            if !self.conn.wait_readable(self.policy.poll_interval)? {
                trace!("Idle for {:?}, reply complete", self.policy.poll_interval);
                break;
            }

            let n = self.conn.read_available(&mut chunk)?;
            if n == 0 {
                break;
            }
            data.extend_from_slice(&chunk[..n]);

            if let Some(marker) = stop_on {
                if data.ends_with(b"\n") && contains(&data, marker.as_bytes()) {
                    trace!("Stop marker {:?} seen", marker);
                    break;
                }
            }
        }

        let reply = String::from_utf8_lossy(&data).into_owned();
        debug!("< {} bytes", reply.len());
        Ok(reply)
    }

    /// Drop anything already waiting on the socket, without blocking
    fn discard_pending(&mut self) -> Result<usize, MgmtError> {
        let mut discarded = 0;
        let mut chunk = vec![0u8; self.policy.read_chunk_size];
        while self.conn.wait_readable(Duration::ZERO)? {
            let n = self.conn.read_available(&mut chunk)?;
            if n == 0 {
                break;
            }
            discarded += n;
        }
        Ok(discarded)
    }
}

/// Whether the daemon reported success for the last command
pub fn is_success(reply: &str) -> bool {
    reply.starts_with("SUCCESS") || reply.starts_with("INFO")
}

fn contains(haystack: &[u8], needle: &[u8]) -> bool {
    needle.is_empty() || haystack.windows(needle.len()).any(|w| w == needle)
}
