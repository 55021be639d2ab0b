// SPDX-License-Identifier: AGPL-3.0-or-later

//! Lazily-initialized, queryable collections of controller objects
//! (spec §5.B). The first call to [`Controller::ensure_initialized`]
//! drains the configuration service's object filter and fetches each
//! object's current state over the command connection with bounded
//! fan-out; later calls serve from the in-memory registry, kept current
//! by status subscriptions.

use std::sync::Arc;

use futures_util::stream::{self, StreamExt};
use tokio::sync::OnceCell;
use tracing::warn;

use crate::{
    cfg::enums::StatusCategory,
    command_client::methods::CommandMethods,
    config_client::{ConfigClient, filter::ObjectFilter},
    error::Result,
    event::{EventStream, subscription::Event},
    model::{
        Vid,
        kinds::{ObjectBehavior, ObjectKind},
        registry::Registry,
    },
};

/// Default number of concurrent state-fetch requests issued while
/// initializing a controller's collection (spec §5.B.2).
pub const DEFAULT_INIT_CONCURRENCY: usize = 20;

/// Status categories a freshly initialized controller subscribes to so
/// its objects stay current without polling.
const SUBSCRIBED_CATEGORIES: &[StatusCategory] = &[
    StatusCategory::LOAD,
    StatusCategory::BTN,
    StatusCategory::BLIND,
    StatusCategory::TEMP,
    StatusCategory::TASK,
    StatusCategory::VARIABLE,
];

pub struct Controller {
    config_client: Arc<ConfigClient>,
    command: CommandMethods,
    events: Arc<EventStream>,
    registry: Arc<Registry>,
    filter_page_size: u32,
    init: OnceCell<()>,
}

impl Controller {
    pub fn new(
        config_client: Arc<ConfigClient>,
        command: CommandMethods,
        events: Arc<EventStream>,
        filter_page_size: u32,
    ) -> Self {
        Self {
            config_client,
            command,
            events,
            registry: Arc::new(Registry::new()),
            filter_page_size,
            init: OnceCell::new(),
        }
    }

    /// Triggers (once) a full enumeration of the controller's objects and
    /// an initial state fetch for each, then subscribes to STATUS pushes
    /// to keep them current.
    pub async fn ensure_initialized(&self) -> Result<()> {
        self.init
            .get_or_try_init(|| async {
                self.load_objects().await?;
                self.fetch_initial_state().await;
                self.subscribe_status_updates().await?;
                Ok(())
            })
            .await
            .map(|_| ())
    }

    async fn load_objects(&self) -> Result<()> {
        let filter = ObjectFilter::open(Arc::clone(&self.config_client), &[], self.filter_page_size).await?;
        let objects = filter.drain_all().await?;
        for obj in objects {
            let Some(type_name) = obj.member("ObjectType").and_then(|v| v.as_str()) else {
                continue;
            };
            let Some(fields) = obj.as_struct() else { continue };
            if let Err(e) = self.registry.insert_from_wire(type_name, fields) {
                warn!("skipping object of type '{type_name}': {e}");
            }
        }
        Ok(())
    }

    async fn fetch_initial_state(&self) {
        let objects = self.registry.all();
        let command = &self.command;
        stream::iter(objects)
            .for_each_concurrent(DEFAULT_INIT_CONCURRENCY, |obj| async move {
                if let Err(e) = refresh_state(command, &obj).await {
                    warn!("initial state fetch failed for VID {}: {e}", obj.vid());
                }
            })
            .await;
    }

    /// Spawns one background task per subscribed category, plus one for
    /// the fine-grained per-object enrolment, that apply incoming status
    /// pushes to the registry for as long as `self`'s owner keeps the
    /// session alive; each task holds only an `Arc` clone of the
    /// registry, not `self`.
    async fn subscribe_status_updates(&self) -> Result<()> {
        for category in SUBSCRIBED_CATEGORIES.iter().copied() {
            let sub = self.events.subscribe_status(category).await?;
            let registry = Arc::clone(&self.registry);
            tokio::spawn(apply_category_status_events(registry, sub));
        }

        let vids = self.registry.vids();
        self.events.enroll_object_status(&vids).await?;
        let sub = self.events.subscribe_object_status().await?;
        let registry = Arc::clone(&self.registry);
        tokio::spawn(apply_object_status_events(registry, sub));

        Ok(())
    }

    pub fn get(&self, vid: Vid) -> Option<Arc<ObjectKind>> {
        self.registry.get(vid)
    }

    pub fn objects(&self) -> Vec<Arc<ObjectKind>> {
        self.registry.all()
    }

    pub fn filter(&self, predicate: impl Fn(&ObjectKind) -> bool) -> Vec<Arc<ObjectKind>> {
        self.registry.all().into_iter().filter(|o| predicate(o)).collect()
    }

    pub fn len(&self) -> usize {
        self.registry.len()
    }

    pub fn is_empty(&self) -> bool {
        self.registry.is_empty()
    }
}

async fn apply_category_status_events(registry: Arc<Registry>, mut sub: crate::event::subscription::Subscription) {
    while let Some(event) = sub.recv().await {
        let Event::Status { line, .. } = event else { continue };
        let mut tokens = line.split_whitespace();
        let Some(category_token) = tokens.next() else { continue };
        let Some(vid_token) = tokens.next() else { continue };
        let Ok(vid) = vid_token.parse::<Vid>() else { continue };
        let args: Vec<String> = tokens.map(ToString::to_string).collect();
        let _ = category_token;
        if !registry.apply_status(vid, &args) {
            tracing::debug!("status line for unknown or unrecognized VID {vid}: {line}");
        }
    }
}

/// Routes fine-grained `S:STATUS <vid> <Interface.Method> <result>` pushes
/// to their object via the method-keyed binding table (spec §4.G),
/// stripping the interface prefix before dispatch.
async fn apply_object_status_events(registry: Arc<Registry>, mut sub: crate::event::subscription::Subscription) {
    while let Some(event) = sub.recv().await {
        let Event::ObjectStatus { vid, interface_method, args, line } = event else { continue };
        let method = interface_method.split('.').next_back().unwrap_or(&interface_method);
        if !registry.apply_object_status(vid, method, &args) {
            tracing::warn!("unhandled object status push for VID {vid}: {line}");
        }
    }
}

async fn refresh_state(command: &CommandMethods, obj: &Arc<ObjectKind>) -> Result<()> {
    match obj.as_ref() {
        ObjectKind::Load(load) => {
            if let Some(level) = command.load_get_level(load.vid()).await? {
                load.set_level_percent(level);
            }
        },
        ObjectKind::Blind(blind) => {
            if let Some(pos) = command.blind_get_position(blind.vid()).await? {
                blind.set_position_percent(pos);
            }
        },
        ObjectKind::Thermostat(th) => {
            if let Some(indoor) = command.thermostat_get_indoor_temp(th.vid()).await? {
                th.apply_status_line(&["INDOOR".to_string(), crate::command_client::codec::encode_celsius(indoor)]);
            }
        },
        ObjectKind::Sensor(sensor) => {
            if let Some(level) = command.sensor_get_level(sensor.vid()).await? {
                sensor.set_level_percent(level);
            }
        },
        ObjectKind::GMem(gmem) => {
            let value = command.gmem_get(gmem.vid()).await?;
            gmem.apply_status_line(&[value]);
        },
        ObjectKind::Button(_) | ObjectKind::Task(_) | ObjectKind::Introspection(_) => {},
    }
    Ok(())
}
