// SPDX-License-Identifier: AGPL-3.0-or-later

//! mDNS discovery consumption (spec §6, §10.D). The library never
//! advertises itself here, only browses for controllers already on the
//! LAN; consuming the result is optional, enabled only by the
//! `discovery` feature.

use std::time::Duration;

use mdns_sd::{ServiceDaemon, ServiceEvent};
use tracing::{debug, warn};

/// One of the four service types a Vantage controller advertises.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServiceKind {
    Aci,
    SecureAci,
    HostCommand,
    SecureHostCommand,
}

impl ServiceKind {
    const fn service_type(self) -> &'static str {
        match self {
            ServiceKind::Aci => "_aci._tcp.local.",
            ServiceKind::SecureAci => "_secure_aci._tcp.local.",
            ServiceKind::HostCommand => "_hc._tcp.local.",
            ServiceKind::SecureHostCommand => "_secure_hc._tcp.local.",
        }
    }

    const ALL: [ServiceKind; 4] =
        [ServiceKind::Aci, ServiceKind::SecureAci, ServiceKind::HostCommand, ServiceKind::SecureHostCommand];
}

/// A controller service found on the LAN.
#[derive(Debug, Clone)]
pub struct DiscoveredController {
    pub host: String,
    pub port: u16,
    pub service_kind: ServiceKind,
    pub txt_records: Vec<(String, String)>,
}

/// Browses all four Vantage service types for `timeout` and returns
/// whatever resolved within the window. Best-effort: a browse failure
/// for one service type is logged and skipped rather than failing the
/// whole call, since a controller need not advertise every service type
/// (e.g. plain-TCP-only deployments skip the `secure_*` types).
pub async fn discover_controllers(timeout: Duration) -> Vec<DiscoveredController> {
    let daemon = match ServiceDaemon::new() {
        Ok(d) => d,
        Err(e) => {
            warn!("failed to start mDNS daemon: {e}");
            return Vec::new();
        },
    };

    let mut found = Vec::new();
    for kind in ServiceKind::ALL {
        found.extend(browse_one(&daemon, kind, timeout).await);
    }

    if let Err(e) = daemon.shutdown() {
        debug!("mDNS daemon shutdown reported: {e}");
    }

    found
}

async fn browse_one(daemon: &ServiceDaemon, kind: ServiceKind, timeout: Duration) -> Vec<DiscoveredController> {
    let receiver = match daemon.browse(kind.service_type()) {
        Ok(r) => r,
        Err(e) => {
            warn!("failed to browse {}: {e}", kind.service_type());
            return Vec::new();
        },
    };

    let mut results = Vec::new();
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        let remaining = deadline.saturating_duration_since(tokio::time::Instant::now());
        if remaining.is_zero() {
            break;
        }
        match tokio::time::timeout(remaining, receiver.recv_async()).await {
            Ok(Ok(ServiceEvent::ServiceResolved(info))) => {
                let Some(addr) = info.get_addresses().iter().next() else { continue };
                let txt_records = info
                    .get_properties()
                    .iter()
                    .map(|p| (p.key().to_string(), p.val_str().to_string()))
                    .collect();
                results.push(DiscoveredController {
                    host: addr.to_string(),
                    port: info.get_port(),
                    service_kind: kind,
                    txt_records,
                });
            },
            Ok(Ok(_other_event)) => continue,
            Ok(Err(_disconnected)) => break,
            Err(_elapsed) => break,
        }
    }

    let _ = daemon.stop_browse(kind.service_type());
    results
}
