// SPDX-License-Identifier: AGPL-3.0-or-later

//! Typed helpers over [`CommandClient::send`] for each interface the
//! object model exposes (spec §5). Each function builds the wire command,
//! sends it, and decodes the reply's trailing value(s).

use std::sync::Arc;

use crate::{
    command_client::{CommandClient, codec},
    error::{Error, Result},
};

/// A thin, cheaply-clonable façade over a [`CommandClient`] exposing one
/// method per Vantage interface used by the object model.
#[derive(Clone)]
pub struct CommandMethods {
    client: Arc<CommandClient>,
}

impl CommandMethods {
    pub fn new(client: Arc<CommandClient>) -> Self {
        Self { client }
    }

    /// Sends an arbitrary command and returns the raw reply text, for
    /// interfaces without a dedicated helper.
    pub async fn invoke(&self, command: &str, vid: i64, args: &[&str]) -> Result<String> {
        let mut line = format!("{command} {vid}");
        for arg in args {
            line.push(' ');
            line.push_str(arg);
        }
        self.client.send(&line).await
    }

    // --- Load ---------------------------------------------------------

    pub async fn load_get_level(&self, vid: i64) -> Result<Option<f64>> {
        let reply = self.invoke("GETLOAD", vid, &[]).await?;
        let token = last_token(&reply)?;
        codec::decode_percent(token)
    }

    pub async fn load_set_level(&self, vid: i64, percent: f64) -> Result<()> {
        let token = codec::encode_percent(percent);
        self.invoke("LOAD", vid, &[&token]).await?;
        Ok(())
    }

    pub async fn load_ramp(&self, vid: i64, percent: f64, seconds: f64) -> Result<()> {
        let level = codec::encode_percent(percent);
        let time = format!("{seconds:.2}");
        self.invoke("RAMPLOAD", vid, &[&level, &time]).await?;
        Ok(())
    }

    // --- Button ---------------------------------------------------------

    pub async fn button_press(&self, vid: i64) -> Result<()> {
        self.invoke("BTN", vid, &["PRESS"]).await?;
        Ok(())
    }

    pub async fn button_release(&self, vid: i64) -> Result<()> {
        self.invoke("BTN", vid, &["RELEASE"]).await?;
        Ok(())
    }

    // --- Blind ---------------------------------------------------------

    pub async fn blind_open(&self, vid: i64) -> Result<()> {
        self.invoke("BLIND", vid, &["OPEN"]).await?;
        Ok(())
    }

    pub async fn blind_close(&self, vid: i64) -> Result<()> {
        self.invoke("BLIND", vid, &["CLOSE"]).await?;
        Ok(())
    }

    pub async fn blind_stop(&self, vid: i64) -> Result<()> {
        self.invoke("BLIND", vid, &["STOP"]).await?;
        Ok(())
    }

    pub async fn blind_set_position(&self, vid: i64, percent: f64) -> Result<()> {
        let token = codec::encode_percent(percent);
        self.invoke("BLIND", vid, &["POS", &token]).await?;
        Ok(())
    }

    pub async fn blind_get_position(&self, vid: i64) -> Result<Option<f64>> {
        let reply = self.invoke("GETBLIND", vid, &[]).await?;
        codec::decode_percent(last_token(&reply)?)
    }

    // --- Thermostat ---------------------------------------------------------

    pub async fn thermostat_get_setpoint(&self, vid: i64, kind: &str) -> Result<Option<f64>> {
        let reply = self.invoke("GETTHERMOP", vid, &[kind]).await?;
        codec::decode_celsius(last_token(&reply)?)
    }

    pub async fn thermostat_set_setpoint(&self, vid: i64, kind: &str, celsius: f64) -> Result<()> {
        let token = codec::encode_celsius(celsius);
        self.invoke("THERMOP", vid, &[kind, &token]).await?;
        Ok(())
    }

    pub async fn thermostat_get_indoor_temp(&self, vid: i64) -> Result<Option<f64>> {
        let reply = self.invoke("GETTHERMTEMP", vid, &["INDOOR"]).await?;
        codec::decode_celsius(last_token(&reply)?)
    }

    pub async fn thermostat_set_fan(&self, vid: i64, mode: &str) -> Result<()> {
        self.invoke("THERMFAN", vid, &[mode]).await?;
        Ok(())
    }

    /// Sets the operation mode (`off`/`cool`/`heat`/`auto`), distinct from
    /// [`Self::thermostat_set_setpoint`]'s two-argument `THERMOP <kind>
    /// <temp>` form — the controller tells them apart by argument count.
    pub async fn thermostat_set_op(&self, vid: i64, mode: &str) -> Result<()> {
        self.invoke("THERMOP", vid, &[mode]).await?;
        Ok(())
    }

    pub async fn thermostat_set_day(&self, vid: i64, mode: &str) -> Result<()> {
        self.invoke("THERMDAY", vid, &[mode]).await?;
        Ok(())
    }

    // --- Sensor ---------------------------------------------------------

    pub async fn sensor_get_level(&self, vid: i64) -> Result<Option<f64>> {
        let reply = self.invoke("GETLEVEL", vid, &[]).await?;
        codec::decode_percent(last_token(&reply)?)
    }

    // --- GMem (global memory / variable) ---------------------------------

    pub async fn gmem_get(&self, vid: i64) -> Result<String> {
        let reply = self.invoke("GETVARIABLE", vid, &[]).await?;
        Ok(last_token(&reply)?.to_string())
    }

    pub async fn gmem_set(&self, vid: i64, value: &str) -> Result<()> {
        self.invoke("VARIABLE", vid, &[value]).await?;
        Ok(())
    }

    // --- Task ---------------------------------------------------------

    /// Triggers a task with the given event (spec §4.E), e.g. `"press"`,
    /// `"release"`, `"timer"`.
    pub async fn task_invoke(&self, vid: i64, event: &str) -> Result<()> {
        self.invoke("TASK", vid, &[event]).await?;
        Ok(())
    }
}

/// Command replies echo the request's arguments before the value we want,
/// so the value we care about is always the final whitespace-separated
/// token.
fn last_token(reply: &str) -> Result<&str> {
    reply.split_whitespace().next_back().ok_or_else(|| Error::decode(format!("empty command reply '{reply}'")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn last_token_extracts_trailing_value() {
        assert_eq!(last_token("GETLOAD 1 50000").unwrap(), "50000");
        assert_eq!(last_token("GETBLIND 12 -").unwrap(), "-");
    }
}
