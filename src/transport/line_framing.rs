// SPDX-License-Identifier: AGPL-3.0-or-later

//! CRLF line framing and classification for the Host Command service.
//!
//! Every line the controller sends is one of a reply (`R:...`), an
//! unsolicited status push (`S:...`), or an enhanced log entry
//! (`EL:...` / `ELLOG...`) — spec §4.D.1. Lines are otherwise plain ASCII
//! tokens separated by whitespace.

use std::time::Duration;

use rand::RngExt;
use tokio::io::{AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader};

use crate::error::{Error, Result};

/// One classified line from the command service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Line {
    /// A correlated reply to a previously sent request.
    Reply(String),
    /// An unsolicited status push (`S:STATUS ...` / `S:ADDSTATUS ...`).
    Status(String),
    /// An enhanced log entry (`EL: ...`).
    EnhancedLog(String),
}

/// Splits a raw line (CRLF already stripped) into its classification and
/// the remaining token text.
pub fn classify(raw: &str) -> Line {
    if let Some(rest) = raw.strip_prefix("R:") {
        Line::Reply(rest.trim_start().to_string())
    } else if let Some(rest) = raw.strip_prefix("S:") {
        Line::Status(rest.trim_start().to_string())
    } else if let Some(rest) = raw.strip_prefix("EL:") {
        Line::EnhancedLog(rest.trim_start().to_string())
    } else {
        // Controllers occasionally echo a bare status line without the
        // `S:` prefix for ADDSTATUS acknowledgements; treat as status.
        Line::Status(raw.trim_start().to_string())
    }
}

pub struct LineReader<S> {
    inner: BufReader<S>,
}

impl<S: tokio::io::AsyncRead + Unpin> LineReader<S> {
    pub fn new(inner: S) -> Self {
        Self { inner: BufReader::new(inner) }
    }

    /// Reads one line, stripping the trailing CRLF (or bare LF). Returns
    /// `Ok(None)` on clean EOF.
    pub async fn read_line(&mut self) -> Result<Option<Line>> {
        let mut buf = String::new();
        let n = self
            .inner
            .read_line(&mut buf)
            .await
            .map_err(|e| Error::protocol(format!("reading command line: {e}")))?;
        if n == 0 {
            return Ok(None);
        }
        let trimmed = buf.trim_end_matches(['\r', '\n']);
        Ok(Some(classify(trimmed)))
    }
}

pub struct LineWriter<S> {
    inner: S,
}

impl<S: AsyncWrite + Unpin> LineWriter<S> {
    pub fn new(inner: S) -> Self {
        Self { inner }
    }

    pub async fn write_line(&mut self, line: &str) -> Result<()> {
        self.inner
            .write_all(line.as_bytes())
            .await
            .map_err(|e| Error::protocol(format!("writing command line: {e}")))?;
        self.inner
            .write_all(b"\r\n")
            .await
            .map_err(|e| Error::protocol(format!("writing command line: {e}")))?;
        self.inner.flush().await.map_err(|e| Error::protocol(format!("flushing command line: {e}")))
    }
}

/// Exponential backoff with +/-20% jitter, capped at `max`, for reconnect
/// attempts on the line transport (spec §4.D.4).
pub struct Backoff {
    initial: Duration,
    max: Duration,
    attempt: u32,
}

impl Backoff {
    pub fn new(initial: Duration, max: Duration) -> Self {
        Self { initial, max, attempt: 0 }
    }

    pub fn reset(&mut self) {
        self.attempt = 0;
    }

    /// Returns the delay for the next attempt and advances the counter.
    pub fn next_delay(&mut self) -> Duration {
        let exp = self.attempt.min(16);
        self.attempt += 1;
        let base = self.initial.saturating_mul(1u32.checked_shl(exp).unwrap_or(u32::MAX)).min(self.max);
        jitter(base)
    }
}

fn jitter(base: Duration) -> Duration {
    let factor = rand::rng().random_range(0.8..=1.2);
    Duration::from_secs_f64(base.as_secs_f64() * factor)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_reply_status_and_log_lines() {
        assert_eq!(classify("R:GETLOAD 1 50.000"), Line::Reply("GETLOAD 1 50.000".into()));
        assert_eq!(classify("S:STATUS LOAD"), Line::Status("STATUS LOAD".into()));
        assert_eq!(classify("EL: some log text"), Line::EnhancedLog("some log text".into()));
    }

    #[tokio::test]
    async fn reads_lines_until_eof() {
        let data = b"R:ok\r\nS:STATUS LOAD\r\n".to_vec();
        let mut reader = LineReader::new(std::io::Cursor::new(data));
        assert_eq!(reader.read_line().await.unwrap(), Some(Line::Reply("ok".into())));
        assert_eq!(reader.read_line().await.unwrap(), Some(Line::Status("STATUS LOAD".into())));
        assert_eq!(reader.read_line().await.unwrap(), None);
    }

    #[test]
    fn backoff_stays_within_bounds_and_grows() {
        let mut b = Backoff::new(Duration::from_millis(100), Duration::from_secs(1));
        let d0 = b.next_delay();
        let d1 = b.next_delay();
        assert!(d0 >= Duration::from_millis(80) && d0 <= Duration::from_millis(120));
        assert!(d1 > d0 / 2);
        for _ in 0..20 {
            assert!(b.next_delay() <= Duration::from_millis(1200));
        }
    }
}
