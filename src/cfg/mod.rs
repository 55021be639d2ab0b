// SPDX-License-Identifier: AGPL-3.0-or-later

//! Configuration, logging initialization, and small shared enumerations.

/// Session configuration (host, credentials, ports, timeouts).
pub mod config;
/// Small serde-friendly enumerations shared by the configuration.
pub mod enums;
/// Opt-in `tracing` subscriber initializer.
pub mod logging;
