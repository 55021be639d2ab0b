// SPDX-License-Identifier: AGPL-3.0-or-later

//! The line-oriented Host Command service (spec §4.D).
//!
//! Unlike the configuration service's XML-RPC frames, command requests
//! carry no correlation tag on the wire: the controller replies in the
//! order requests were sent, one reply per request, FIFO. Status pushes
//! and enhanced-log lines can arrive interleaved with replies at any time
//! and are handed off to [`crate::event`] rather than correlated here.

pub mod codec;
pub mod methods;

use std::{
    collections::VecDeque,
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
    time::Duration,
};

use tokio::{
    sync::{Mutex, mpsc, oneshot},
    time::timeout,
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::{
    cfg::config::SessionConfig,
    error::{Error, Result},
    transport::{
        TlsStream,
        line_framing::{Line, LineReader, LineWriter},
    },
};

/// A status push or enhanced-log line handed off for event dispatch.
#[derive(Debug, Clone)]
pub enum Unsolicited {
    Status(String),
    EnhancedLog(String),
}

/// One open connection to the Host Command service.
///
/// Reconnection and resubscription are the caller's responsibility
/// (see [`crate::event`]); this type models a single connection's
/// lifetime, which ends the moment the socket closes or a protocol
/// error occurs.
pub struct CommandClient {
    writer: Mutex<LineWriter<tokio::io::WriteHalf<TlsStream>>>,
    pending: Mutex<VecDeque<PendingRequest>>,
    next_request_id: AtomicU64,
    cancel: CancellationToken,
    response_timeout: Duration,
}

impl std::fmt::Debug for CommandClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CommandClient")
            .field("response_timeout", &self.response_timeout)
            .finish_non_exhaustive()
    }
}

/// One outstanding request's correlation slot. Tagged with an id so a
/// timed-out request can be pulled out of the FIFO queue by identity
/// instead of by position — leaving it in place would let the next
/// unrelated reply satisfy it once it finally arrived, misaligning every
/// correlation after it (spec §5's FIFO-ordering guarantee).
struct PendingRequest {
    id: u64,
    tx: oneshot::Sender<Result<String>>,
}

impl CommandClient {
    pub async fn connect(
        cfg: &SessionConfig,
        unsolicited_tx: mpsc::Sender<Unsolicited>,
    ) -> Result<Arc<Self>> {
        let stream = crate::transport::dial(
            &cfg.host,
            cfg.command_port(),
            cfg.tls.transport,
            cfg.tls.verify,
            cfg.timeouts.connect,
        )
        .await?;
        let (r, w) = tokio::io::split(stream);

        let client = Arc::new(Self {
            writer: Mutex::new(LineWriter::new(w)),
            pending: Mutex::new(VecDeque::new()),
            next_request_id: AtomicU64::new(0),
            cancel: CancellationToken::new(),
            response_timeout: cfg.timeouts.command_response,
        });

        if let Some(creds) = &cfg.credentials {
            client.login(&creds.username, &creds.password).await?;
        }

        // `unsolicited_tx` is moved into the task rather than stored on
        // `self`: when the read loop exits, dropping it closes the
        // channel, which is how `EventStream` notices the connection is
        // gone and starts reconnecting.
        let reader_client = Arc::clone(&client);
        tokio::spawn(async move {
            let mut reader = LineReader::new(r);
            if let Err(e) = reader_client.read_loop(&mut reader, &unsolicited_tx).await {
                debug!("command client read loop ended: {e}");
            }
            reader_client.fail_all_pending(Error::Disconnected).await;
        });

        Ok(client)
    }

    pub async fn login(&self, username: &str, password: &str) -> Result<()> {
        let line = format!("LOGIN {username} {password}");
        let reply = self.send(&line).await?;
        if reply.trim_start().starts_with("Error") {
            return Err(Error::Auth);
        }
        Ok(())
    }

    /// Sends one line and waits for its correlated reply (spec §4.D.3).
    /// The request/response pair does not tear down the connection on
    /// timeout; the caller may retry or give up while the connection
    /// stays open for subsequent commands.
    pub async fn send(&self, line: &str) -> Result<String> {
        let id = self.next_request_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = oneshot::channel();
        {
            let mut pending = self.pending.lock().await;
            pending.push_back(PendingRequest { id, tx });
        }

        {
            let mut w = self.writer.lock().await;
            if let Err(e) = w.write_line(line).await {
                self.remove_pending(id).await;
                return Err(e);
            }
        }
        debug!("sent command: {line}");

        match timeout(self.response_timeout, rx).await {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => Err(Error::Disconnected),
            Err(_) => {
                self.remove_pending(id).await;
                Err(Error::Timeout)
            },
        }
    }

    async fn remove_pending(&self, id: u64) {
        let mut pending = self.pending.lock().await;
        if let Some(pos) = pending.iter().position(|p| p.id == id) {
            pending.remove(pos);
        }
    }

    pub fn close(&self) {
        self.cancel.cancel();
    }

    async fn read_loop(
        &self,
        reader: &mut LineReader<tokio::io::ReadHalf<TlsStream>>,
        unsolicited_tx: &mpsc::Sender<Unsolicited>,
    ) -> Result<()> {
        loop {
            if self.cancel.is_cancelled() {
                return Ok(());
            }
            let Some(line) = reader.read_line().await? else {
                return Ok(());
            };
            match line {
                Line::Reply(text) => self.dispatch_reply(text).await,
                Line::Status(text) => {
                    let _ = unsolicited_tx.send(Unsolicited::Status(text)).await;
                },
                Line::EnhancedLog(text) => {
                    let _ = unsolicited_tx.send(Unsolicited::EnhancedLog(text)).await;
                },
            }
        }
    }

    async fn dispatch_reply(&self, text: String) {
        let next = {
            let mut pending = self.pending.lock().await;
            pending.pop_front()
        };
        match next {
            Some(req) => {
                let _ = req.tx.send(Ok(text));
            },
            None => warn!("reply with no pending request: {text}"),
        }
    }

    async fn fail_all_pending(&self, err: Error) {
        let mut pending = self.pending.lock().await;
        while let Some(req) = pending.pop_front() {
            let _ = req.tx.send(Err(clone_error(&err)));
        }
    }
}

fn clone_error(err: &Error) -> Error {
    match err {
        Error::Disconnected => Error::Disconnected,
        Error::Timeout => Error::Timeout,
        Error::Cancelled => Error::Cancelled,
        other => Error::protocol(other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// A request that times out must not leave its slot in the FIFO
    /// queue; otherwise the next arriving reply would satisfy the
    /// abandoned request instead of the one actually waiting on it.
    #[tokio::test]
    async fn timed_out_request_is_removed_from_pending_queue() {
        let pending: Mutex<VecDeque<PendingRequest>> = Mutex::new(VecDeque::new());
        let next_id = AtomicU64::new(0);

        let id_a = next_id.fetch_add(1, Ordering::Relaxed);
        let (tx_a, rx_a) = oneshot::channel();
        pending.lock().await.push_back(PendingRequest { id: id_a, tx: tx_a });

        let id_b = next_id.fetch_add(1, Ordering::Relaxed);
        let (tx_b, rx_b) = oneshot::channel();
        pending.lock().await.push_back(PendingRequest { id: id_b, tx: tx_b });

        // Request A times out and is removed by id, even though it's at
        // the front of the queue.
        {
            let mut p = pending.lock().await;
            if let Some(pos) = p.iter().position(|p| p.id == id_a) {
                p.remove(pos);
            }
        }
        drop(rx_a);

        // The next reply must now satisfy B, not the removed A.
        let req = pending.lock().await.pop_front().expect("B still queued");
        assert_eq!(req.id, id_b);
        let _ = req.tx.send(Ok("reply for B".to_string()));
        assert_eq!(rx_b.await.expect("B's receiver gets the reply").expect("ok"), "reply for B");
    }
}
