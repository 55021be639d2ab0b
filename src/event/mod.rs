// SPDX-License-Identifier: AGPL-3.0-or-later

//! Owns the command connection's event side: subscription registration,
//! dispatch of `S:`/`EL:` lines to the right subscribers, and reconnect
//! with resubscription (spec §4.D.4, §4.F).

pub mod subscription;

use std::{str::FromStr, sync::Arc};

use dashmap::DashMap;
use tokio::sync::{RwLock, mpsc};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::{
    cfg::{
        config::SessionConfig,
        enums::{EnhancedLogType, StatusCategory},
    },
    command_client::{CommandClient, Unsolicited},
    error::Result,
    event::subscription::{
        DEFAULT_CHANNEL_CAPACITY, Event, EventSender, Subscription, SubscriptionId, SubscriptionKind,
        SubscriptionState, channel, next_id,
    },
    model::Vid,
    transport::line_framing::Backoff,
};

struct Registered {
    kind: SubscriptionKind,
    sender: EventSender,
    state: SubscriptionState,
}

/// Manages the Host Command connection used for subscriptions, including
/// transparent reconnect. Command/response traffic for the object model
/// goes through a separate [`CommandClient`] obtained via
/// [`EventStream::command_methods`]; this type owns the connection whose
/// unsolicited-line stream feeds subscribers.
pub struct EventStream {
    cfg: SessionConfig,
    client: RwLock<Arc<CommandClient>>,
    subscriptions: DashMap<SubscriptionId, Registered>,
    cancel: CancellationToken,
    /// VIDs enrolled via [`EventStream::enroll_object_status`], resent on
    /// reconnect so fine-grained per-object pushes survive a drop (spec
    /// §8 scenario: reconnect re-enrols every previously enrolled VID).
    enrolled_vids: tokio::sync::Mutex<Vec<Vid>>,
}

impl EventStream {
    pub async fn connect(cfg: SessionConfig) -> Result<Arc<Self>> {
        let (unsolicited_tx, unsolicited_rx) = mpsc::channel(1024);
        let client = CommandClient::connect(&cfg, unsolicited_tx).await?;

        let stream = Arc::new(Self {
            cfg,
            client: RwLock::new(client),
            subscriptions: DashMap::new(),
            cancel: CancellationToken::new(),
            enrolled_vids: tokio::sync::Mutex::new(Vec::new()),
        });

        let dispatch_stream = Arc::clone(&stream);
        tokio::spawn(async move {
            dispatch_stream.run(unsolicited_rx).await;
        });

        Ok(stream)
    }

    /// The connection subscribers' commands (`ADDSTATUS`/`ELLOG`) are sent
    /// over; also usable by [`crate::controller`] for plain command
    /// traffic that should share the connection instead of opening a
    /// second one.
    pub async fn command_client(&self) -> Arc<CommandClient> {
        self.client.read().await.clone()
    }

    pub async fn subscribe_status(&self, category: StatusCategory) -> Result<Subscription> {
        self.subscribe(SubscriptionKind::Status(category)).await
    }

    pub async fn subscribe_enhanced_log(&self, kind: EnhancedLogType) -> Result<Subscription> {
        self.subscribe(SubscriptionKind::EnhancedLog(kind)).await
    }

    /// Subscribes to fine-grained per-object pushes (spec §4.F.2). Callers
    /// must also call [`EventStream::enroll_object_status`] with the VIDs
    /// they care about; a subscription with no enrolled VIDs receives
    /// nothing.
    pub async fn subscribe_object_status(&self) -> Result<Subscription> {
        self.subscribe(SubscriptionKind::ObjectStatus).await
    }

    /// Enrols `vids` for fine-grained `ADDSTATUS` pushes, remembering them
    /// so reconnect can re-enrol without callers having to redo it.
    pub async fn enroll_object_status(&self, vids: &[Vid]) -> Result<()> {
        {
            let mut enrolled = self.enrolled_vids.lock().await;
            for vid in vids {
                if !enrolled.contains(vid) {
                    enrolled.push(*vid);
                }
            }
        }
        self.send_addstatus(vids).await
    }

    async fn send_addstatus(&self, vids: &[Vid]) -> Result<()> {
        if vids.is_empty() {
            return Ok(());
        }
        let client = self.client.read().await.clone();
        let args = vids.iter().map(ToString::to_string).collect::<Vec<_>>().join(" ");
        client.send(&format!("ADDSTATUS {args}")).await?;
        Ok(())
    }

    async fn subscribe(&self, kind: SubscriptionKind) -> Result<Subscription> {
        let id = next_id();
        let (sender, inner) = channel(DEFAULT_CHANNEL_CAPACITY);

        self.register_on_wire(&kind).await?;

        self.subscriptions.insert(id, Registered { kind, sender, state: SubscriptionState::Active });
        Ok(Subscription { id, inner })
    }

    pub async fn unsubscribe(&self, id: SubscriptionId) {
        if let Some((_, mut reg)) = self.subscriptions.remove(&id) {
            reg.state = SubscriptionState::Removed;
            reg.sender.close();
        }
    }

    async fn register_on_wire(&self, kind: &SubscriptionKind) -> Result<()> {
        let client = self.client.read().await.clone();
        match kind {
            SubscriptionKind::Status(category) => {
                client.send(&format!("STATUS {category}")).await?;
            },
            // Enrolment is keyed by VID, not by subscription, and is sent
            // separately via `enroll_object_status`/resubscribe.
            SubscriptionKind::ObjectStatus => {},
            SubscriptionKind::EnhancedLog(log_type) => {
                client.send(&format!("ELENABLE {log_type} ON")).await?;
            },
        }
        Ok(())
    }

    async fn run(self: Arc<Self>, mut unsolicited_rx: mpsc::Receiver<Unsolicited>) {
        let mut backoff =
            Backoff::new(self.cfg.timeouts.reconnect_initial_backoff, self.cfg.timeouts.reconnect_max_backoff);

        loop {
            while let Some(line) = unsolicited_rx.recv().await {
                self.dispatch(line).await;
            }

            if self.cancel.is_cancelled() {
                return;
            }

            self.mark_all_suspended();
            let delay = backoff.next_delay();
            warn!("command event connection lost; reconnecting in {delay:?}");
            tokio::time::sleep(delay).await;

            match self.reconnect().await {
                Ok(new_rx) => {
                    unsolicited_rx = new_rx;
                    backoff.reset();
                    self.resubscribe_all().await;
                    info!("command event connection re-established");
                },
                Err(e) => {
                    warn!("reconnect attempt failed: {e}");
                    let (_drained_tx, drained_rx) = mpsc::channel(1);
                    unsolicited_rx = drained_rx;
                },
            }
        }
    }

    async fn reconnect(&self) -> Result<mpsc::Receiver<Unsolicited>> {
        let (unsolicited_tx, unsolicited_rx) = mpsc::channel(1024);
        let new_client = CommandClient::connect(&self.cfg, unsolicited_tx).await?;
        *self.client.write().await = new_client;
        Ok(unsolicited_rx)
    }

    fn mark_all_suspended(&self) {
        for mut entry in self.subscriptions.iter_mut() {
            if entry.state == SubscriptionState::Active {
                entry.state = SubscriptionState::Suspended;
            }
        }
    }

    async fn resubscribe_all(&self) {
        let kinds: Vec<(SubscriptionId, SubscriptionKind)> =
            self.subscriptions.iter().map(|e| (*e.key(), e.kind.clone())).collect();
        for (id, kind) in kinds {
            if let Err(e) = self.register_on_wire(&kind).await {
                warn!("failed to resubscribe {id}: {e}");
                continue;
            }
            if let Some(mut reg) = self.subscriptions.get_mut(&id) {
                reg.state = SubscriptionState::Active;
            }
        }

        let vids = self.enrolled_vids.lock().await.clone();
        if let Err(e) = self.send_addstatus(&vids).await {
            warn!("failed to re-enrol object status VIDs: {e}");
        }
    }

    async fn dispatch(&self, line: Unsolicited) {
        // Collect matching senders (cheap clones) before awaiting any
        // send, so the DashMap shard lock is never held across an await.
        match line {
            Unsolicited::Status(text) if text.split_whitespace().next() == Some("STATUS") => {
                let Some(event) = parse_object_status(&text) else {
                    warn!("unparseable object status line: {text}");
                    return;
                };
                let targets: Vec<EventSender> = self
                    .subscriptions
                    .iter()
                    .filter(|e| matches!(e.kind, SubscriptionKind::ObjectStatus))
                    .map(|e| e.sender.clone())
                    .collect();
                for sender in targets {
                    sender.send(event.clone()).await;
                }
            },
            Unsolicited::Status(text) => {
                let Some(category) = text.split_whitespace().next().and_then(|t| StatusCategory::from_str(t).ok())
                else {
                    return;
                };
                let targets: Vec<EventSender> = self
                    .subscriptions
                    .iter()
                    .filter(|e| matches!(e.kind, SubscriptionKind::Status(c) if c == category))
                    .map(|e| e.sender.clone())
                    .collect();
                for sender in targets {
                    sender.send(Event::Status { category, line: text.clone() }).await;
                }
            },
            Unsolicited::EnhancedLog(text) => {
                let Some(kind) = parse_enhanced_log_type(&text) else { return };
                let timestamp = parse_enhanced_log_timestamp(&text);
                let targets: Vec<EventSender> = self
                    .subscriptions
                    .iter()
                    .filter(|e| matches!(e.kind, SubscriptionKind::EnhancedLog(k) if k == kind))
                    .map(|e| e.sender.clone())
                    .collect();
                for sender in targets {
                    sender.send(Event::EnhancedLog { kind, timestamp, line: text.clone() }).await;
                }
            },
        }
    }

    pub fn close(&self) {
        self.cancel.cancel();
    }
}

/// Parses the fine-grained object push `STATUS <vid> <Interface.Method>
/// <result…>` (the text has already had its `S:` prefix stripped) into an
/// [`Event::ObjectStatus`] (spec §4.F.2).
fn parse_object_status(text: &str) -> Option<Event> {
    let mut tokens = text.split_whitespace();
    tokens.next()?; // "STATUS"
    let vid: Vid = tokens.next()?.parse().ok()?;
    let interface_method = tokens.next()?.to_string();
    let args = tokens.map(ToString::to_string).collect();
    Some(Event::ObjectStatus { vid, interface_method, args, line: text.to_string() })
}

fn parse_enhanced_log_type(text: &str) -> Option<EnhancedLogType> {
    use EnhancedLogType::*;
    let first = text.split_whitespace().next()?;
    Some(match first {
        "STATUS" => STATUS,
        "STATUSEX" => STATUSEX,
        "AUTOMATION" => AUTOMATION,
        "SYSTEM" => SYSTEM,
        "EVENT" => EVENT,
        "MODCOM" => MODCOM,
        "STATCOM" => STATCOM,
        _ => return None,
    })
}

/// Enhanced-log lines carry the log type token followed by a
/// `MM/DD/YYYY HH:MM:SS.mmm` timestamp before the free-form message; older
/// firmware omits it, so a miss here just leaves the event's `timestamp`
/// unset rather than failing the whole line.
fn parse_enhanced_log_timestamp(text: &str) -> Option<chrono::NaiveDateTime> {
    let mut tokens = text.split_whitespace();
    tokens.next()?; // log type
    let date = tokens.next()?;
    let time = tokens.next()?;
    chrono::NaiveDateTime::parse_from_str(&format!("{date} {time}"), "%m/%d/%Y %H:%M:%S%.f").ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_fine_grained_object_status_push() {
        let event = parse_object_status("STATUS 118 Load.GetLevel 50000").unwrap();
        match event {
            Event::ObjectStatus { vid, interface_method, args, .. } => {
                assert_eq!(vid, 118);
                assert_eq!(interface_method, "Load.GetLevel");
                assert_eq!(args, vec!["50000".to_string()]);
            },
            _ => panic!("expected object status event"),
        }
    }

    #[test]
    fn rejects_a_non_status_object_push() {
        assert!(parse_object_status("118 Load.GetLevel 50000").is_none());
    }

    #[test]
    fn recognizes_every_enhanced_log_type() {
        assert_eq!(parse_enhanced_log_type("STATUSEX 02/17/2021 08:15:23.123 ..."), Some(EnhancedLogType::STATUSEX));
        assert_eq!(parse_enhanced_log_type("bogus text"), None);
    }

    #[test]
    fn decodes_timestamp_when_present() {
        let ts = parse_enhanced_log_timestamp("STATUS 02/17/2021 08:15:23.123 S:STATUS 118 Load.GetLoad 50.000");
        assert_eq!(ts.unwrap().and_utc().timestamp(), 1613549723);
    }

    #[test]
    fn missing_timestamp_is_not_an_error() {
        assert_eq!(parse_enhanced_log_timestamp("STATUS"), None);
        assert_eq!(parse_enhanced_log_timestamp("STATUS not-a-date not-a-time"), None);
    }
}
