// SPDX-License-Identifier: AGPL-3.0-or-later

//! Public error taxonomy (spec §7).
//!
//! Internal plumbing uses `anyhow::Result` freely, the same way the
//! teacher codebase does; this module is the small set of typed leaves
//! callers are expected to match on.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

/// Failure cases for establishing a connection (§4.A).
#[derive(Debug, Error)]
pub enum ConnectError {
    #[error("DNS resolution failed for {host}: {source}")]
    Dns {
        host: String,
        #[source]
        source: std::io::Error,
    },
    #[error("TCP connect to {addr} failed: {source}")]
    Tcp {
        addr: String,
        #[source]
        source: std::io::Error,
    },
    #[error("TLS handshake with {host} failed: {source}")]
    TlsHandshake {
        host: String,
        #[source]
        source: std::io::Error,
    },
    #[error("login to {host} failed: {reason}")]
    Login { host: String, reason: String },
}

/// Error kinds surfaced to callers of the session, config client and
/// command client (spec §7).
#[derive(Debug, Error)]
pub enum Error {
    #[error("connect: {0}")]
    Connect(#[from] ConnectError),

    #[error("authentication rejected")]
    Auth,

    #[error("protocol error: {0}")]
    Protocol(String),

    #[error("object not found: {0}")]
    NotFound(String),

    #[error("request timed out")]
    Timeout,

    #[error("disconnected")]
    Disconnected,

    #[error("cancelled")]
    Cancelled,

    #[error("decode error: {0}")]
    Decode(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl Error {
    pub fn protocol(msg: impl Into<String>) -> Self {
        Self::Protocol(msg.into())
    }

    pub fn not_found(vid: impl std::fmt::Display) -> Self {
        Self::NotFound(vid.to_string())
    }

    pub fn decode(msg: impl Into<String>) -> Self {
        Self::Decode(msg.into())
    }

    /// True for kinds the spec marks as transport-local and retryable by
    /// the caller (timeout, disconnected) as opposed to fatal (auth) or
    /// already-retried-once (protocol).
    pub fn is_retryable(&self) -> bool {
        matches!(self, Error::Timeout | Error::Disconnected)
    }
}
