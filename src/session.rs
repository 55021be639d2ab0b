// SPDX-License-Identifier: AGPL-3.0-or-later

//! Aggregates the two wire clients and the event stream behind one
//! entry point (spec §4.I). `Session` owns nothing the rest of the
//! crate doesn't already make `Arc`-shareable, so closing it is just
//! cancelling the shared event stream and dropping the clients.

use std::{future::Future, sync::Arc};

use tracing::instrument;

use crate::{
    cfg::config::SessionConfig,
    command_client::methods::CommandMethods,
    config_client::ConfigClient,
    controller::Controller,
    error::Result,
    event::EventStream,
    model::kinds::ObjectKind,
};

/// One connected session against a controller: the configuration
/// channel, the command channel (shared with the event stream), and the
/// lazily-populated object registry.
pub struct Session {
    config_client: Arc<ConfigClient>,
    events: Arc<EventStream>,
    controller: Controller,
}

impl Session {
    #[instrument(skip(cfg), fields(host = %cfg.host))]
    pub async fn connect(mut cfg: SessionConfig) -> Result<Arc<Self>> {
        cfg.validate()?;

        let config_client = ConfigClient::connect(&cfg).await?;
        let events = EventStream::connect(cfg.clone()).await?;
        let command = CommandMethods::new(events.command_client().await);
        let controller = Controller::new(Arc::clone(&config_client), command, Arc::clone(&events), cfg.filter_page_size);

        Ok(Arc::new(Self { config_client, events, controller }))
    }

    /// Connects, runs `f`, and closes the session on every exit path
    /// (including `f` returning an error), mirroring the guaranteed-close
    /// requirement in §6.
    pub async fn scoped<F, Fut, R>(cfg: SessionConfig, f: F) -> Result<R>
    where
        F: FnOnce(Arc<Session>) -> Fut,
        Fut: Future<Output = Result<R>>,
    {
        let session = Self::connect(cfg).await?;
        let result = f(Arc::clone(&session)).await;
        session.close().await;
        result
    }

    /// Triggers (once) full enumeration and initial state fetch of every
    /// object kind. Subsequent typed accessors transparently trigger this
    /// on first use if it hasn't run yet.
    pub async fn initialize(&self) -> Result<()> {
        self.controller.ensure_initialized().await
    }

    pub async fn loads(&self) -> Result<Vec<Arc<ObjectKind>>> {
        self.kind(|o| matches!(o.as_ref(), ObjectKind::Load(_))).await
    }

    pub async fn buttons(&self) -> Result<Vec<Arc<ObjectKind>>> {
        self.kind(|o| matches!(o.as_ref(), ObjectKind::Button(_))).await
    }

    pub async fn blinds(&self) -> Result<Vec<Arc<ObjectKind>>> {
        self.kind(|o| matches!(o.as_ref(), ObjectKind::Blind(_))).await
    }

    pub async fn sensors(&self) -> Result<Vec<Arc<ObjectKind>>> {
        self.kind(|o| matches!(o.as_ref(), ObjectKind::Sensor(_))).await
    }

    pub async fn thermostats(&self) -> Result<Vec<Arc<ObjectKind>>> {
        self.kind(|o| matches!(o.as_ref(), ObjectKind::Thermostat(_))).await
    }

    pub async fn tasks(&self) -> Result<Vec<Arc<ObjectKind>>> {
        self.kind(|o| matches!(o.as_ref(), ObjectKind::Task(_))).await
    }

    pub async fn variables(&self) -> Result<Vec<Arc<ObjectKind>>> {
        self.kind(|o| matches!(o.as_ref(), ObjectKind::GMem(_))).await
    }

    async fn kind(&self, predicate: impl Fn(&Arc<ObjectKind>) -> bool) -> Result<Vec<Arc<ObjectKind>>> {
        self.controller.ensure_initialized().await?;
        Ok(self.controller.objects().into_iter().filter(predicate).collect())
    }

    /// Looks up a single object by VID across all kinds, triggering
    /// initialization if it hasn't run yet.
    pub async fn get(&self, vid: crate::model::Vid) -> Result<Option<Arc<ObjectKind>>> {
        self.controller.ensure_initialized().await?;
        Ok(self.controller.get(vid))
    }

    /// Direct access to the command connection's typed request/response
    /// helpers, for callers that want to issue a control command without
    /// going through a controller accessor.
    pub fn config_client(&self) -> &Arc<ConfigClient> {
        &self.config_client
    }

    /// Cancels the event stream's reconnect loop and signals both
    /// connections to close. Outstanding requests fail with
    /// [`crate::Error::Cancelled`]-equivalent disconnection per §5's
    /// cancellation policy.
    pub async fn close(&self) {
        self.events.close();
    }
}

impl Drop for Session {
    /// Best-effort: `Drop` cannot `await`, so this only cancels the event
    /// stream's background task; callers that need to observe clean
    /// shutdown (including server-side filter-handle teardown) must call
    /// [`Session::close`] explicitly.
    fn drop(&mut self) {
        self.events.close();
    }
}
