//! `status 2` parsing
//!
//! The status dump changed shape across OpenVPN releases and nothing on the
//! wire says which one we got. Versions 2 and 3 open with a `TITLE` record
//! and carry one `CLIENT_LIST` record per session (comma separated in v2,
//! tab separated in v3):
//!
//! ```text
//! TITLE,OpenVPN 2.4.6 x86_64-redhat-linux-gnu ...
//! TIME,Thu Jun 21 12:00:00 2018,1529582400
//! HEADER,CLIENT_LIST,Common Name,Real Address,Virtual Address,...
//! CLIENT_LIST,user@example.com,203.0.113.7:51234,10.48.236.2,,3863,3706,...
//! END
//! ```
//!
//! Version 1 has no `TITLE`; the usable rows are in the routing table,
//! `virtual,common name,real address,...`. Sessions still mid-handshake have
//! no `ip:port` real address and are deliberately never matched.

use super::{ManagementClient, MgmtError};
use regex::Regex;
use std::collections::HashMap;
use std::sync::LazyLock;
use tracing::debug;

/// Stop marker for status dumps: the whole final `END` line
pub const STATUS_END: &str = "\nEND\r\n";

static TITLE_LINE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)^TITLE").expect("valid TITLE regex"));

static END_LINE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)^END\r?$").expect("valid END regex"));

static CLIENT_LIST_RECORD: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?m)^CLIENT_LIST[,\t]([^,\t\r\n]+)[,\t](\d+\.\d+\.\d+\.\d+:\d+)[,\t]")
        .expect("valid CLIENT_LIST regex")
});

static LEGACY_RECORD: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r",([^,\r\n]+),(\d+\.\d+\.\d+\.\d+:\d+)").expect("valid legacy status regex")
});

/// A fully established VPN session
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectedSession {
    pub username: String,
    /// Client's real address as `ip:port`
    pub remote_endpoint: String,
}

impl ConnectedSession {
    pub fn new(username: impl Into<String>, remote_endpoint: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            remote_endpoint: remote_endpoint.into(),
        }
    }

    /// Remote address with the port stripped
    pub fn remote_ip(&self) -> &str {
        self.remote_endpoint
            .rsplit_once(':')
            .map_or(self.remote_endpoint.as_str(), |(ip, _)| ip)
    }
}

/// Status dump layout, inferred from the presence of a `TITLE` line
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusFormat {
    /// Status versions 2 and 3
    Titled,
    /// Status version 1, or an error/garbled reply
    Legacy,
}

pub fn sniff_format(raw: &str) -> StatusFormat {
    if TITLE_LINE.is_match(raw) {
        StatusFormat::Titled
    } else {
        StatusFormat::Legacy
    }
}

/// Extract sessions from `CLIENT_LIST` records (status v2/v3)
pub fn parse_titled(raw: &str) -> Vec<ConnectedSession> {
    captures(&CLIENT_LIST_RECORD, raw)
}

/// Extract sessions from `,user,ip:port` rows (status v1)
pub fn parse_legacy(raw: &str) -> Vec<ConnectedSession> {
    captures(&LEGACY_RECORD, raw)
}

fn captures(re: &Regex, raw: &str) -> Vec<ConnectedSession> {
    re.captures_iter(raw)
        .map(|c| ConnectedSession::new(&c[1], &c[2]))
        .collect()
}

/// Parsed reply to `status 2`
#[derive(Debug, Clone)]
pub struct StatusReport {
    raw: String,
    format: StatusFormat,
    sessions: HashMap<String, ConnectedSession>,
}

impl StatusReport {
    /// Parse a raw dump. Never fails: anything unrecognisable is simply empty.
    pub fn parse(raw: impl Into<String>) -> Self {
        let raw = raw.into();
        let format = sniff_format(&raw);
        let records = match format {
            StatusFormat::Titled => parse_titled(&raw),
            StatusFormat::Legacy => parse_legacy(&raw),
        };

        // Last record wins for a repeated username
        let sessions = records
            .into_iter()
            .map(|s| (s.username.clone(), s))
            .collect();

        Self {
            raw,
            format,
            sessions,
        }
    }

    pub fn raw(&self) -> &str {
        &self.raw
    }

    pub fn format(&self) -> StatusFormat {
        self.format
    }

    pub fn sessions(&self) -> &HashMap<String, ConnectedSession> {
        &self.sessions
    }

    pub fn into_sessions(self) -> HashMap<String, ConnectedSession> {
        self.sessions
    }

    /// The dump reached its closing `END` line
    pub fn is_complete(&self) -> bool {
        END_LINE.is_match(&self.raw)
    }

    /// The daemon answered with an explicit `ERROR:` line
    pub fn looks_like_error(&self) -> bool {
        self.raw.trim_start().starts_with("ERROR")
    }
}

impl ManagementClient {
    /// Ask the daemon for `status 2` and parse it
    pub fn status(&mut self) -> Result<StatusReport, MgmtError> {
        let raw = self.send("status 2", Some(STATUS_END))?;
        let report = StatusReport::parse(raw);
        debug!(
            "Status format {:?}, {} sessions",
            report.format(),
            report.sessions().len()
        );
        Ok(report)
    }
}
