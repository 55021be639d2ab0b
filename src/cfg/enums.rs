// SPDX-License-Identifier: AGPL-3.0-or-later

use core::fmt;

use serde::{Deserialize, Serialize};

/// TLS peer-certificate verification strategy (spec §4.A).
///
/// Vantage controllers ship self-signed certificates, so `None` is the
/// default — callers on a trusted LAN segment opt into stronger modes
/// explicitly.
#[derive(Deserialize, Serialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "kebab-case")]
pub enum SslMode {
    /// Full chain + hostname verification against the system trust store.
    Strict,
    /// Verify the certificate's subject alternative names match the
    /// configured host, but skip chain validation.
    HostnameOnly,
    /// Accept any certificate. Still encrypts the link; does not
    /// authenticate the peer.
    #[default]
    None,
}

impl fmt::Display for SslMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            SslMode::Strict => "strict",
            SslMode::HostnameOnly => "hostname-only",
            SslMode::None => "none",
        })
    }
}

/// Whether to use TLS at all. When `Plain`, the client connects to the
/// unencrypted fallback ports (spec §6).
#[derive(Deserialize, Serialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum Transport {
    #[default]
    Tls,
    Plain,
}

/// Category of a subscribed status line (spec §4.F.1).
#[derive(Deserialize, Serialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[allow(non_camel_case_types)]
pub enum StatusCategory {
    LOAD,
    LED,
    BTN,
    TASK,
    TEMP,
    THERMFAN,
    THERMOP,
    THERMDAY,
    SLIDER,
    TEXT,
    VARIABLE,
    BLIND,
    WIND,
    LIGHT,
    CURRENT,
    POWER,
    ALL,
    NONE,
}

impl fmt::Display for StatusCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

impl std::str::FromStr for StatusCategory {
    type Err = crate::error::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        use StatusCategory::*;
        Ok(match s {
            "LOAD" => LOAD,
            "LED" => LED,
            "BTN" => BTN,
            "TASK" => TASK,
            "TEMP" => TEMP,
            "THERMFAN" => THERMFAN,
            "THERMOP" => THERMOP,
            "THERMDAY" => THERMDAY,
            "SLIDER" => SLIDER,
            "TEXT" => TEXT,
            "VARIABLE" => VARIABLE,
            "BLIND" => BLIND,
            "WIND" => WIND,
            "LIGHT" => LIGHT,
            "CURRENT" => CURRENT,
            "POWER" => POWER,
            "ALL" => ALL,
            "NONE" => NONE,
            other => {
                return Err(crate::error::Error::protocol(format!(
                    "unknown STATUS category {other}"
                )));
            },
        })
    }
}

/// Enhanced-log subscription type (spec §4.F.3).
#[derive(Deserialize, Serialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[allow(non_camel_case_types)]
pub enum EnhancedLogType {
    STATUS,
    STATUSEX,
    AUTOMATION,
    SYSTEM,
    EVENT,
    MODCOM,
    STATCOM,
}

impl fmt::Display for EnhancedLogType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}
