// SPDX-License-Identifier: AGPL-3.0-or-later

//! In-process stand-ins for the two Vantage services, bound to ephemeral
//! loopback ports over plain TCP (no TLS, so the suite never needs
//! certificates). Mirrors the shape of the teacher's `tests/common.rs`
//! helper module, minus the docker-target bits: there is no real
//! controller to dial in this environment.

#![allow(dead_code)]

use std::time::Duration;

use tokio::{
    io::{AsyncBufReadExt, AsyncWriteExt, BufReader},
    net::{TcpListener, TcpStream},
};
use vantage_client::cfg::{config::SessionConfig, enums::Transport};

/// A scripted command-service simulator: accepts one connection, replies
/// `R:<VERB> OK` to `LOGIN`, and otherwise replies using `reply_for`.
pub struct CommandSimulator {
    pub port: u16,
}

impl CommandSimulator {
    /// Starts listening and spawns the accept/serve loop in the
    /// background. `reply_for` is called with each non-LOGIN line
    /// received and returns the verbatim reply line to send back, or
    /// `None` to withhold a reply (simulating a dropped response for
    /// timeout scenarios).
    pub async fn start(reply_for: impl Fn(&str) -> Option<String> + Send + Sync + 'static) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind simulator port");
        let port = listener.local_addr().expect("local addr").port();

        tokio::spawn(async move {
            if let Ok((socket, _)) = listener.accept().await {
                serve_command(socket, reply_for).await;
            }
        });

        Self { port }
    }
}

async fn serve_command(socket: TcpStream, reply_for: impl Fn(&str) -> Option<String>) {
    let (read_half, mut write_half) = socket.into_split();
    let mut lines = BufReader::new(read_half).lines();
    while let Ok(Some(line)) = lines.next_line().await {
        let trimmed = line.trim_end_matches(['\r', '\n']);
        let reply = if let Some(rest) = trimmed.strip_prefix("LOGIN ") {
            let _ = rest;
            Some("R:LOGIN OK".to_string())
        } else {
            reply_for(trimmed)
        };
        if let Some(reply) = reply {
            if write_half.write_all(format!("{reply}\r\n").as_bytes()).await.is_err() {
                return;
            }
        }
    }
}

/// Builds a [`SessionConfig`] pointed at the given plain-TCP command port,
/// with short timeouts suited to fast-failing tests.
pub fn test_config(command_port: u16) -> SessionConfig {
    SessionConfig::builder("127.0.0.1")
        .transport(Transport::Plain)
        .command_port(command_port)
        .credentials("admin", "hunter2")
        .connect_timeout(Duration::from_secs(2))
        .command_timeout(Duration::from_millis(500))
        .build()
        .expect("valid test config")
}
