// SPDX-License-Identifier: AGPL-3.0-or-later

//! Numeric encodings used on the line protocol (spec §4.D.2, §4.E, §5).
//!
//! Load/blind/sensor levels on the *command channel* (`LOAD`, `RAMPLOAD`,
//! `BLIND ... POS`, and their `GET*` replies) travel as plain percent,
//! three decimals (e.g. `"50.000"`). The fine-grained `Load.GetLevel`
//! *state-event* push (spec §4.F.2) is the one exception: it carries
//! millipercent integers (0–100000) that must be divided by 1000.000. The
//! object model always works in percent (0.0–100.0) regardless of which
//! wire encoding produced it. Temperatures travel as plain decimal Celsius
//! with one digit of precision on both channels. A bare `-` or empty token
//! means "value unknown" and decodes to `None`.

use crate::error::{Error, Result};

/// Converts a command-channel percent token (e.g. `"50.000"`) to a
/// percent value (`50.0`).
pub fn decode_percent(token: &str) -> Result<Option<f64>> {
    if is_unknown(token) {
        return Ok(None);
    }
    token.trim().parse().map(Some).map_err(|_| Error::decode(format!("invalid percent token '{token}'")))
}

/// Formats a percent value to the command channel's three-decimal
/// convention, clamping to the valid 0–100 range.
pub fn encode_percent(percent: f64) -> String {
    format!("{:.3}", percent.clamp(0.0, 100.0))
}

/// Converts a `Load.GetLevel` state-event's millipercent token (e.g.
/// `"50000"`) to a percent value (`50.0`).
pub fn decode_status_millipercent(token: &str) -> Result<Option<f64>> {
    if is_unknown(token) {
        return Ok(None);
    }
    let millipercent: f64 =
        token.trim().parse().map_err(|_| Error::decode(format!("invalid percent token '{token}'")))?;
    Ok(Some(millipercent / 1000.000))
}

/// Formats a percent value to the millipercent convention the
/// `Load.GetLevel` state event carries.
pub fn encode_status_millipercent(percent: f64) -> String {
    let clamped = percent.clamp(0.0, 100.0);
    let millipercent = (clamped * 1000.000).round() as i64;
    millipercent.to_string()
}

/// Parses a Celsius setpoint token.
pub fn decode_celsius(token: &str) -> Result<Option<f64>> {
    if is_unknown(token) {
        return Ok(None);
    }
    token.trim().parse().map(Some).map_err(|_| Error::decode(format!("invalid temperature token '{token}'")))
}

/// Formats a Celsius setpoint to the wire's one-decimal-place convention.
pub fn encode_celsius(celsius: f64) -> String {
    format!("{celsius:.1}")
}

pub fn is_unknown(token: &str) -> bool {
    matches!(token.trim(), "" | "-")
}

/// Splits a command-line argument list on whitespace, honoring the
/// protocol's use of double quotes around strings containing spaces
/// (e.g. object names echoed by `GETNAME`).
pub fn split_args(line: &str) -> Vec<String> {
    let mut args = Vec::new();
    let mut chars = line.trim().chars().peekable();
    while chars.peek().is_some() {
        while chars.peek() == Some(&' ') {
            chars.next();
        }
        if chars.peek().is_none() {
            break;
        }
        if chars.peek() == Some(&'"') {
            chars.next();
            let mut s = String::new();
            for c in chars.by_ref() {
                if c == '"' {
                    break;
                }
                s.push(c);
            }
            args.push(s);
        } else {
            let mut s = String::new();
            while let Some(&c) = chars.peek() {
                if c == ' ' {
                    break;
                }
                s.push(c);
                chars.next();
            }
            args.push(s);
        }
    }
    args
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn percent_round_trips() {
        assert_eq!(decode_percent("50.000").unwrap(), Some(50.0));
        assert_eq!(decode_percent("100.000").unwrap(), Some(100.0));
        assert_eq!(encode_percent(50.0), "50.000");
        assert_eq!(encode_percent(33.3), "33.300");
    }

    #[test]
    fn percent_clamps_out_of_range_values() {
        assert_eq!(encode_percent(150.0), "100.000");
        assert_eq!(encode_percent(-5.0), "0.000");
    }

    #[test]
    fn status_millipercent_round_trips() {
        assert_eq!(decode_status_millipercent("50000").unwrap(), Some(50.0));
        assert_eq!(decode_status_millipercent("100000").unwrap(), Some(100.0));
        assert_eq!(encode_status_millipercent(50.0), "50000");
        assert_eq!(encode_status_millipercent(33.3), "33300");
    }

    #[test]
    fn status_millipercent_clamps_out_of_range_values() {
        assert_eq!(encode_status_millipercent(150.0), "100000");
        assert_eq!(encode_status_millipercent(-5.0), "0");
    }

    #[test]
    fn unknown_token_decodes_to_none() {
        assert_eq!(decode_percent("-").unwrap(), None);
        assert_eq!(decode_percent("").unwrap(), None);
        assert_eq!(decode_celsius("-").unwrap(), None);
    }

    #[test]
    fn celsius_keeps_one_decimal() {
        assert_eq!(encode_celsius(21.0), "21.0");
        assert_eq!(encode_celsius(21.25), "21.2");
        assert_eq!(decode_celsius("21.5").unwrap(), Some(21.5));
    }

    #[test]
    fn splits_quoted_arguments() {
        assert_eq!(split_args(r#"1 "Kitchen Load" 50.000"#), vec!["1", "Kitchen Load", "50.000"]);
        assert_eq!(split_args("1 50.000"), vec!["1", "50.000"]);
    }
}
