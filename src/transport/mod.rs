// SPDX-License-Identifier: AGPL-3.0-or-later

//! Wire-level transports shared by the two Vantage services.
//!
//! [`tls`] opens the encrypted (or, in fallback mode, plain) socket.
//! [`xml_framing`] and [`line_framing`] turn that socket into a stream of
//! framed messages for the configuration service and the command service
//! respectively.

pub mod line_framing;
pub mod tls;
pub mod xml_framing;

pub use tls::{TlsStream, dial};
