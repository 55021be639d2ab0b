// SPDX-License-Identifier: AGPL-3.0-or-later

//! Subscription bookkeeping (spec §4.F).
//!
//! A subscription moves `Pending -> Active` once its `ADDSTATUS`/`ELLOG`
//! registration command round-trips successfully, `Active -> Suspended`
//! while the command connection is down and being re-established, and
//! back to `Active` once resubscribed after reconnect. `Removed` is
//! terminal: the handle has been unsubscribed and its channel closed.

use std::{
    collections::VecDeque,
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
};

use tokio::sync::{Mutex, Notify};

use crate::{
    cfg::enums::{EnhancedLogType, StatusCategory},
    model::Vid,
};

pub type SubscriptionId = u64;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubscriptionState {
    Pending,
    Active,
    Suspended,
    Removed,
}

/// What a subscription is registered to receive.
#[derive(Debug, Clone)]
pub enum SubscriptionKind {
    Status(StatusCategory),
    /// Fine-grained per-object enrolment (`ADDSTATUS <vid> <vid> …`, spec
    /// §4.F.2). A single subscription of this kind receives `S:STATUS
    /// <vid> <Interface.Method> <result>` pushes for every enrolled VID.
    ObjectStatus,
    EnhancedLog(EnhancedLogType),
}

/// One received event, already classified by category/type.
#[derive(Debug, Clone)]
pub enum Event {
    Status { category: StatusCategory, line: String },
    /// A fine-grained `S:STATUS <vid> <Interface.Method> <result>` push
    /// (spec §4.F.2). `interface_method` is the dotted name as received
    /// (e.g. `"Load.GetLevel"`); `args` is everything after it.
    ObjectStatus { vid: Vid, interface_method: String, args: Vec<String>, line: String },
    /// `timestamp` is the leading `MM/DD/YYYY HH:MM:SS.mmm` the controller
    /// prefixes enhanced-log lines with, decoded when present; `line`
    /// keeps the remainder of the line verbatim for callers that want the
    /// raw text regardless of whether the prefix parsed.
    EnhancedLog { kind: EnhancedLogType, timestamp: Option<chrono::NaiveDateTime>, line: String },
}

/// A slow consumer must never block the reader loop that keeps the
/// socket draining, so a subscription's queue has a bounded capacity and
/// drops its oldest buffered event on overflow rather than the newest
/// one (spec §4.F.4) — `tokio::sync::mpsc` has no way to pop its own
/// head, so the queue is a small ring buffer behind a mutex instead.
pub const DEFAULT_CHANNEL_CAPACITY: usize = 256;

pub(crate) struct Inner {
    queue: Mutex<VecDeque<Event>>,
    notify: Notify,
    capacity: usize,
    closed: std::sync::atomic::AtomicBool,
}

#[derive(Clone)]
pub(crate) struct EventSender {
    inner: Arc<Inner>,
}

impl EventSender {
    pub(crate) async fn send(&self, event: Event) {
        if self.inner.closed.load(Ordering::Acquire) {
            return;
        }
        let mut queue = self.inner.queue.lock().await;
        if queue.len() >= self.inner.capacity {
            let dropped = queue.pop_front();
            if let Some(dropped) = dropped {
                tracing::debug!("subscription channel full; dropping oldest event {dropped:?}");
            }
        }
        queue.push_back(event);
        drop(queue);
        self.inner.notify.notify_one();
    }

    pub(crate) fn close(&self) {
        self.inner.closed.store(true, Ordering::Release);
        self.inner.notify.notify_waiters();
    }
}

/// The receiving half a caller interacts with.
pub struct Subscription {
    pub(crate) id: SubscriptionId,
    pub(crate) inner: Arc<Inner>,
}

impl Subscription {
    pub fn id(&self) -> SubscriptionId {
        self.id
    }

    /// Waits for the next event, or returns `None` once the subscription
    /// has been removed (spec §4.F: `Removed` is terminal).
    pub async fn recv(&mut self) -> Option<Event> {
        loop {
            {
                let mut queue = self.inner.queue.lock().await;
                if let Some(event) = queue.pop_front() {
                    return Some(event);
                }
                if self.inner.closed.load(Ordering::Acquire) {
                    return None;
                }
            }
            self.inner.notify.notified().await;
        }
    }
}

pub(crate) fn channel(capacity: usize) -> (EventSender, Arc<Inner>) {
    let inner = Arc::new(Inner {
        queue: Mutex::new(VecDeque::with_capacity(capacity.min(64))),
        notify: Notify::new(),
        capacity,
        closed: std::sync::atomic::AtomicBool::new(false),
    });
    (EventSender { inner: inner.clone() }, inner)
}

static NEXT_ID: AtomicU64 = AtomicU64::new(1);

pub(crate) fn next_id() -> SubscriptionId {
    NEXT_ID.fetch_add(1, Ordering::Relaxed)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn drops_oldest_event_on_overflow() {
        let (tx, inner) = channel(2);
        let mut sub = Subscription { id: next_id(), inner };
        tx.send(Event::Status { category: StatusCategory::LOAD, line: "1".into() }).await;
        tx.send(Event::Status { category: StatusCategory::LOAD, line: "2".into() }).await;
        tx.send(Event::Status { category: StatusCategory::LOAD, line: "3".into() }).await;

        let first = sub.recv().await.unwrap();
        match first {
            Event::Status { line, .. } => assert_eq!(line, "2"),
            _ => panic!("expected status event"),
        }
    }

    #[tokio::test]
    async fn recv_returns_none_after_close() {
        let (tx, inner) = channel(4);
        let mut sub = Subscription { id: next_id(), inner };
        tx.close();
        assert!(sub.recv().await.is_none());
    }
}
