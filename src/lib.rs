// SPDX-License-Identifier: AGPL-3.0-or-later

//! Async client for Vantage InFusion home-automation controllers.
//!
//! A [`Session`](session::Session) opens the two services a Vantage
//! controller exposes — the XML-RPC configuration service ("ACI") and the
//! line-oriented Host Command service — and presents their objects as
//! typed, queryable, observable in-memory collections.

pub mod cfg;
pub mod command_client;
pub mod config_client;
#[cfg(feature = "discovery")]
pub mod discovery;
pub mod error;
pub mod event;
pub mod model;
pub mod controller;
pub mod session;
pub mod transport;

pub use error::{ConnectError, Error, Result};
pub use session::Session;
