//! Fake OpenVPN management daemon for integration tests

#![allow(dead_code)]

use std::io::{BufRead, BufReader, Write};
use std::os::unix::net::UnixListener;
use std::path::PathBuf;
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tempfile::TempDir;
use vpn_kill_users::ManagementClient;
use vpn_kill_users::mgmt::DrainPolicy;

pub const GREETING: &str =
    ">INFO:OpenVPN Management Interface Version 1 -- type 'help' for more info\r\n";

pub const VERSION_REPLY: &str =
    "OpenVPN Version: OpenVPN 2.4.6 x86_64-redhat-linux-gnu\r\nManagement Version: 1\r\nEND\r\n";

pub const USERS: [&str; 3] = [
    "user1@example.com",
    "user2@example.com",
    "user3@example.com",
];

pub const STATUS_V1: &str = "OpenVPN CLIENT LIST\r\n\
    Updated,Thu Jun 21 12:00:00 2018\r\n\
    Common Name,Real Address,Bytes Received,Bytes Sent,Connected Since\r\n\
    user1@example.com,198.51.100.1:50001,3863,3706,Thu Jun 21 11:58:01 2018\r\n\
    user2@example.com,198.51.100.2:50002,3863,3706,Thu Jun 21 11:58:02 2018\r\n\
    user3@example.com,198.51.100.3:50003,3863,3706,Thu Jun 21 11:58:03 2018\r\n\
    ROUTING TABLE\r\n\
    Virtual Address,Common Name,Real Address,Last Ref\r\n\
    10.48.236.2,user1@example.com,198.51.100.1:50001,Thu Jun 21 11:58:01 2018\r\n\
    10.48.236.3,user2@example.com,198.51.100.2:50002,Thu Jun 21 11:58:02 2018\r\n\
    10.48.236.4,user3@example.com,198.51.100.3:50003,Thu Jun 21 11:58:03 2018\r\n\
    GLOBAL STATS\r\n\
    Max bcast/mcast queue length,0\r\n\
    END\r\n";

pub const STATUS_V2: &str = "TITLE,OpenVPN 2.4.6 x86_64-redhat-linux-gnu [SSL (OpenSSL)]\r\n\
    TIME,Thu Jun 21 12:00:00 2018,1529582400\r\n\
    HEADER,CLIENT_LIST,Common Name,Real Address,Virtual Address,Virtual IPv6 Address,Bytes Received,Bytes Sent,Connected Since,Connected Since (time_t),Username,Client ID,Peer ID\r\n\
    CLIENT_LIST,user1@example.com,198.51.100.1:50001,10.48.236.2,,3863,3706,Thu Jun 21 11:58:01 2018,1529582281,user1@example.com,0,0\r\n\
    CLIENT_LIST,user2@example.com,198.51.100.2:50002,10.48.236.3,,3863,3706,Thu Jun 21 11:58:02 2018,1529582282,user2@example.com,1,1\r\n\
    CLIENT_LIST,user3@example.com,198.51.100.3:50003,10.48.236.4,,3863,3706,Thu Jun 21 11:58:03 2018,1529582283,user3@example.com,2,2\r\n\
    HEADER,ROUTING_TABLE,Virtual Address,Common Name,Real Address,Last Ref,Last Ref (time_t)\r\n\
    ROUTING_TABLE,10.48.236.2,user1@example.com,198.51.100.1:50001,Thu Jun 21 11:58:01 2018,1529582281\r\n\
    ROUTING_TABLE,10.48.236.3,user2@example.com,198.51.100.2:50002,Thu Jun 21 11:58:02 2018,1529582282\r\n\
    ROUTING_TABLE,10.48.236.4,user3@example.com,198.51.100.3:50003,Thu Jun 21 11:58:03 2018,1529582283\r\n\
    GLOBAL_STATS,Max bcast/mcast queue length,0\r\n\
    END\r\n";

pub const STATUS_V3: &str = "TITLE\tOpenVPN 2.4.6 x86_64-redhat-linux-gnu [SSL (OpenSSL)]\r\n\
    TIME\tThu Jun 21 12:00:00 2018\t1529582400\r\n\
    HEADER\tCLIENT_LIST\tCommon Name\tReal Address\tVirtual Address\tVirtual IPv6 Address\tBytes Received\tBytes Sent\r\n\
    CLIENT_LIST\tuser1@example.com\t198.51.100.1:50001\t10.48.236.2\t\t3863\t3706\r\n\
    CLIENT_LIST\tuser2@example.com\t198.51.100.2:50002\t10.48.236.3\t\t3863\t3706\r\n\
    CLIENT_LIST\tuser3@example.com\t198.51.100.3:50003\t10.48.236.4\t\t3863\t3706\r\n\
    GLOBAL_STATS\tMax bcast/mcast queue length\t0\r\n\
    END\r\n";

/// Version 2 dump with a fourth client still mid-handshake (no real port)
pub const STATUS_KIDDIE: &str = "TITLE,OpenVPN 2.4.6 x86_64-redhat-linux-gnu [SSL (OpenSSL)]\r\n\
    TIME,Thu Jun 21 12:00:00 2018,1529582400\r\n\
    CLIENT_LIST,user1@example.com,198.51.100.1:50001,10.48.236.2,,3863,3706\r\n\
    CLIENT_LIST,user2@example.com,198.51.100.2:50002,10.48.236.3,,3863,3706\r\n\
    CLIENT_LIST,user3@example.com,198.51.100.3:50003,10.48.236.4,,3863,3706\r\n\
    CLIENT_LIST,kiddie@example.com,198.51.100.4,,,0,0\r\n\
    END\r\n";

pub fn test_policy() -> DrainPolicy {
    DrainPolicy {
        poll_interval: Duration::from_millis(100),
        read_chunk_size: 256,
    }
}

pub fn client_for(daemon: &FakeDaemon) -> ManagementClient {
    ManagementClient::with_policy(daemon.path.clone(), test_policy())
}

/// Reply like OpenVPN 2.4 would, with a canned status dump
pub fn openvpn(
    status: &'static str,
    kill_ok: bool,
) -> impl Fn(&str) -> Option<String> + Send + 'static {
    move |command: &str| {
        if command == "status 2" {
            Some(status.to_string())
        } else if command == "version" {
            Some(VERSION_REPLY.to_string())
        } else if let Some(user) = command.strip_prefix("kill ") {
            if kill_ok {
                Some(format!(
                    "SUCCESS: common name '{}' found, 1 client(s) killed\r\n",
                    user
                ))
            } else {
                Some(format!("ERROR: common name '{}' not found\r\n", user))
            }
        } else {
            Some("ERROR: unknown command, enter 'help' for more options\r\n".to_string())
        }
    }
}

/// Serves a single management client on a Unix socket in a temp directory
pub struct FakeDaemon {
    pub path: PathBuf,
    _dir: TempDir,
    handle: Option<JoinHandle<Vec<String>>>,
}

impl FakeDaemon {
    /// Greet the client, then answer each command line with `respond`
    ///
    /// Stops on `quit` or when the client goes away. Every command received
    /// is returned from [`FakeDaemon::join`].
    pub fn start<F>(respond: F) -> Self
    where
        F: Fn(&str) -> Option<String> + Send + 'static,
    {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("openvpn-mgmt.sock");
        let listener = UnixListener::bind(&path).unwrap();

        let handle = thread::spawn(move || {
            let mut commands = Vec::new();
            let (mut stream, _) = listener.accept().unwrap();
            stream.write_all(GREETING.as_bytes()).unwrap();

            let reader = BufReader::new(stream.try_clone().unwrap());
            for line in reader.lines() {
                let Ok(line) = line else { break };
                let command = line.trim_end_matches('\r').to_string();
                commands.push(command.clone());
                if command == "quit" {
                    break;
                }
                if let Some(reply) = respond(&command) {
                    if stream.write_all(reply.as_bytes()).is_err() {
                        break;
                    }
                }
            }
            commands
        });

        Self {
            path,
            _dir: dir,
            handle: Some(handle),
        }
    }

    /// Greet, then hang up immediately
    pub fn start_and_vanish() -> Self {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("openvpn-mgmt.sock");
        let listener = UnixListener::bind(&path).unwrap();

        let handle = thread::spawn(move || {
            let (mut stream, _) = listener.accept().unwrap();
            stream.write_all(GREETING.as_bytes()).unwrap();
            Vec::new()
        });

        Self {
            path,
            _dir: dir,
            handle: Some(handle),
        }
    }

    /// Wait for the client session to end; returns the commands received
    pub fn join(mut self) -> Vec<String> {
        self.handle
            .take()
            .map(|h| h.join().unwrap())
            .unwrap_or_default()
    }
}
