// SPDX-License-Identifier: AGPL-3.0-or-later

use std::{fs, path::Path, time::Duration};

use anyhow::{Context, Result, ensure};
use serde::{Deserialize, Serialize};

use crate::cfg::enums::{SslMode, Transport};

/// Default secure ports for the two services (spec §6).
pub const DEFAULT_CONFIG_TLS_PORT: u16 = 2010;
pub const DEFAULT_COMMAND_TLS_PORT: u16 = 3010;
/// Plain-TCP fallback ports (spec §6).
pub const DEFAULT_CONFIG_PLAIN_PORT: u16 = 2001;
pub const DEFAULT_COMMAND_PLAIN_PORT: u16 = 3001;

/// Everything needed to open a [`Session`](crate::session::Session)
/// against one controller.
///
/// Constructed programmatically via [`SessionConfig::builder`] for the
/// common case, or loaded from YAML via [`SessionConfig::load_from_file`]
/// for deployments that keep connection profiles on disk (spec §10.B).
#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct SessionConfig {
    /// Controller hostname or IP address.
    pub host: String,
    /// Login credentials. Omit both to skip the initial login attempt
    /// (spec §4.C.1); it is then retried once if a call reports
    /// `auth-required`.
    #[serde(default)]
    pub credentials: Option<Credentials>,
    /// TLS transport and verification settings.
    #[serde(default)]
    pub tls: TlsConfig,
    /// Port overrides. Defaults are derived from `tls.transport`.
    #[serde(default)]
    pub ports: PortConfig,
    /// Timeouts governing connect, command round-trips and reconnect
    /// backoff.
    #[serde(default)]
    pub timeouts: TimeoutConfig,
    /// Page size used when draining `IEnclosure/IConfiguration` object
    /// filters (spec §4.C.3). Default 50, matching the spec's default.
    #[serde(default = "default_filter_page_size")]
    pub filter_page_size: u32,
}

fn default_filter_page_size() -> u32 {
    50
}

#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

#[derive(Deserialize, Serialize, Debug, Clone, Default)]
pub struct TlsConfig {
    #[serde(default)]
    pub transport: Transport,
    #[serde(default)]
    pub verify: SslMode,
}

#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct PortConfig {
    pub config_port: Option<u16>,
    pub command_port: Option<u16>,
}

impl Default for PortConfig {
    fn default() -> Self {
        Self { config_port: None, command_port: None }
    }
}

#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct TimeoutConfig {
    #[serde(with = "serde_secs")]
    pub connect: Duration,
    #[serde(with = "serde_secs")]
    pub command_response: Duration,
    #[serde(with = "serde_secs")]
    pub reconnect_initial_backoff: Duration,
    #[serde(with = "serde_secs")]
    pub reconnect_max_backoff: Duration,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            connect: Duration::from_secs(10),
            command_response: Duration::from_secs(5),
            reconnect_initial_backoff: Duration::from_secs(1),
            reconnect_max_backoff: Duration::from_secs(60),
        }
    }
}

impl SessionConfig {
    /// Starts a builder with only `host` set; everything else defaults.
    pub fn builder(host: impl Into<String>) -> SessionConfigBuilder {
        SessionConfigBuilder::new(host)
    }

    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let s = fs::read_to_string(&path)
            .with_context(|| format!("failed to read {:?}", path.as_ref()))?;
        let mut cfg: SessionConfig =
            serde_yaml::from_str(&s).context("failed to parse session config YAML")?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&mut self) -> Result<()> {
        ensure!(!self.host.is_empty(), "host must not be empty");
        ensure!(self.filter_page_size >= 1, "filter_page_size must be >= 1");
        if let Some(creds) = &self.credentials {
            ensure!(!creds.username.is_empty(), "username must not be empty when credentials are set");
        }
        Ok(())
    }

    pub fn config_port(&self) -> u16 {
        self.ports.config_port.unwrap_or(match self.tls.transport {
            Transport::Tls => DEFAULT_CONFIG_TLS_PORT,
            Transport::Plain => DEFAULT_CONFIG_PLAIN_PORT,
        })
    }

    pub fn command_port(&self) -> u16 {
        self.ports.command_port.unwrap_or(match self.tls.transport {
            Transport::Tls => DEFAULT_COMMAND_TLS_PORT,
            Transport::Plain => DEFAULT_COMMAND_PLAIN_PORT,
        })
    }
}

/// Builder for the common "I already have host/credentials in hand" case.
#[derive(Debug, Clone)]
pub struct SessionConfigBuilder {
    cfg: SessionConfig,
}

impl SessionConfigBuilder {
    pub fn new(host: impl Into<String>) -> Self {
        Self {
            cfg: SessionConfig {
                host: host.into(),
                credentials: None,
                tls: TlsConfig::default(),
                ports: PortConfig::default(),
                timeouts: TimeoutConfig::default(),
                filter_page_size: default_filter_page_size(),
            },
        }
    }

    pub fn credentials(mut self, username: impl Into<String>, password: impl Into<String>) -> Self {
        self.cfg.credentials = Some(Credentials { username: username.into(), password: password.into() });
        self
    }

    pub fn ssl_mode(mut self, mode: SslMode) -> Self {
        self.cfg.tls.verify = mode;
        self
    }

    pub fn transport(mut self, transport: Transport) -> Self {
        self.cfg.tls.transport = transport;
        self
    }

    pub fn config_port(mut self, port: u16) -> Self {
        self.cfg.ports.config_port = Some(port);
        self
    }

    pub fn command_port(mut self, port: u16) -> Self {
        self.cfg.ports.command_port = Some(port);
        self
    }

    pub fn connect_timeout(mut self, d: Duration) -> Self {
        self.cfg.timeouts.connect = d;
        self
    }

    pub fn command_timeout(mut self, d: Duration) -> Self {
        self.cfg.timeouts.command_response = d;
        self
    }

    pub fn filter_page_size(mut self, n: u32) -> Self {
        self.cfg.filter_page_size = n;
        self
    }

    pub fn build(mut self) -> Result<SessionConfig> {
        self.cfg.validate()?;
        Ok(self.cfg)
    }
}

/// Serde helper for representing `Duration` as a number of seconds,
/// matching the teacher's `cfg::config::serde_secs` module.
mod serde_secs {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_secs())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        let secs = u64::deserialize(d)?;
        Ok(Duration::from_secs(secs))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_defaults_to_tls_ports() {
        let cfg = SessionConfig::builder("vantage.local").build().expect("valid config");
        assert_eq!(cfg.config_port(), DEFAULT_CONFIG_TLS_PORT);
        assert_eq!(cfg.command_port(), DEFAULT_COMMAND_TLS_PORT);
    }

    #[test]
    fn plain_transport_uses_fallback_ports() {
        let cfg = SessionConfig::builder("vantage.local")
            .transport(Transport::Plain)
            .build()
            .expect("valid config");
        assert_eq!(cfg.config_port(), DEFAULT_CONFIG_PLAIN_PORT);
        assert_eq!(cfg.command_port(), DEFAULT_COMMAND_PLAIN_PORT);
    }

    #[test]
    fn explicit_port_override_wins() {
        let cfg = SessionConfig::builder("vantage.local").config_port(12010).build().expect("valid config");
        assert_eq!(cfg.config_port(), 12010);
    }

    #[test]
    fn empty_host_is_rejected() {
        let err = SessionConfig::builder("").build();
        assert!(err.is_err());
    }

    #[test]
    fn yaml_round_trip() {
        let cfg = SessionConfig::builder("vantage.local")
            .credentials("admin", "hunter2")
            .build()
            .expect("valid config");
        let yaml = serde_yaml::to_string(&cfg).expect("serialize");
        let back: SessionConfig = serde_yaml::from_str(&yaml).expect("deserialize");
        assert_eq!(back.host, cfg.host);
        assert_eq!(back.config_port(), cfg.config_port());
    }
}
