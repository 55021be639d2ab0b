// SPDX-License-Identifier: AGPL-3.0-or-later

//! Per-kind object types and the `ObjectKind` tagged union that dispatches
//! across them (spec §5). Each kind owns its own state, updated in place
//! as `S:STATUS` lines arrive so readers always see the latest value
//! without waiting on the controller's O(n) command round trip.

use std::sync::RwLock;

use enum_dispatch::enum_dispatch;

use crate::model::{ObjectInfo, Vid};

/// Behavior common to every object kind. Field mutation goes through
/// `apply_status_line` so every kind funnels unsolicited updates through
/// one choke point, mirroring how the command client funnels all wire
/// replies through one correlation point.
#[enum_dispatch]
pub trait ObjectBehavior {
    fn vid(&self) -> Vid;
    fn info(&self) -> &ObjectInfo;
    /// Applies one already-classified status line's arguments (with the
    /// category and VID tokens already stripped). Returns `true` if the
    /// object recognized and applied the update.
    fn apply_status_line(&self, args: &[String]) -> bool;
    /// Applies a fine-grained `Interface.Method` push (spec §4.F.2/§4.G),
    /// `method` being the bare method name with the interface prefix
    /// already stripped. Returns `true` if this kind has a binding for
    /// `method` and applied the update.
    fn apply_object_status(&self, method: &str, args: &[String]) -> bool;
}

macro_rules! object_kind {
    ($name:ident, $state:ty, $default:expr) => {
        #[derive(Debug)]
        pub struct $name {
            info: ObjectInfo,
            state: RwLock<$state>,
        }

        impl $name {
            pub fn new(info: ObjectInfo) -> Self {
                Self { info, state: RwLock::new($default) }
            }

            pub fn state(&self) -> $state {
                self.state.read().expect("state lock poisoned").clone()
            }
        }

        impl ObjectBehavior for $name {
            fn vid(&self) -> Vid {
                self.info.vid
            }

            fn info(&self) -> &ObjectInfo {
                &self.info
            }

            fn apply_status_line(&self, args: &[String]) -> bool {
                self.apply(args)
            }

            fn apply_object_status(&self, method: &str, args: &[String]) -> bool {
                self.apply_method(method, args)
            }
        }
    };
}

#[derive(Debug, Clone, Default)]
pub struct LoadState {
    pub level_percent: Option<f64>,
}

object_kind!(LoadObject, LoadState, LoadState::default());

impl LoadObject {
    fn apply(&self, args: &[String]) -> bool {
        let Some(level) = args.first().and_then(|t| crate::command_client::codec::decode_percent(t).ok().flatten())
        else {
            return false;
        };
        self.state.write().expect("state lock poisoned").level_percent = Some(level);
        true
    }

    /// Sets the level directly from an already-scaled percent value,
    /// bypassing wire-token decoding (used by [`crate::controller`] to
    /// fold in command-channel reads without re-encoding them).
    pub fn set_level_percent(&self, percent: f64) {
        self.state.write().expect("state lock poisoned").level_percent = Some(percent);
    }

    fn apply_method(&self, method: &str, args: &[String]) -> bool {
        if method != "GetLevel" {
            return false;
        }
        let Some(level) =
            args.first().and_then(|t| crate::command_client::codec::decode_status_millipercent(t).ok().flatten())
        else {
            return false;
        };
        self.state.write().expect("state lock poisoned").level_percent = Some(level);
        true
    }
}

#[derive(Debug, Clone, Default)]
pub struct ButtonState {
    pub pressed: Option<bool>,
}

object_kind!(ButtonObject, ButtonState, ButtonState::default());

impl ButtonObject {
    fn apply(&self, args: &[String]) -> bool {
        let Some(token) = args.first() else { return false };
        let pressed = match token.as_str() {
            "PRESS" => true,
            "RELEASE" => false,
            _ => return false,
        };
        self.state.write().expect("state lock poisoned").pressed = Some(pressed);
        true
    }

    fn apply_method(&self, _method: &str, _args: &[String]) -> bool {
        false
    }
}

#[derive(Debug, Clone, Default)]
pub struct BlindState {
    pub position_percent: Option<f64>,
    pub moving: bool,
}

object_kind!(BlindObject, BlindState, BlindState::default());

impl BlindObject {
    fn apply(&self, args: &[String]) -> bool {
        match args.first().map(String::as_str) {
            Some("OPEN") | Some("CLOSE") => {
                self.state.write().expect("state lock poisoned").moving = true;
                true
            },
            Some("STOP") => {
                self.state.write().expect("state lock poisoned").moving = false;
                true
            },
            Some(token) => {
                let Ok(Some(pos)) = crate::command_client::codec::decode_percent(token) else { return false };
                let mut state = self.state.write().expect("state lock poisoned");
                state.position_percent = Some(pos);
                state.moving = false;
                true
            },
            None => false,
        }
    }

    /// Sets the position directly from an already-scaled percent value
    /// (see [`LoadObject::set_level_percent`]).
    pub fn set_position_percent(&self, percent: f64) {
        let mut state = self.state.write().expect("state lock poisoned");
        state.position_percent = Some(percent);
        state.moving = false;
    }

    fn apply_method(&self, method: &str, args: &[String]) -> bool {
        if method != "GetPosition" {
            return false;
        }
        let Some(pos) = args.first().and_then(|t| crate::command_client::codec::decode_percent(t).ok().flatten())
        else {
            return false;
        };
        let mut state = self.state.write().expect("state lock poisoned");
        state.position_percent = Some(pos);
        state.moving = false;
        true
    }
}

#[derive(Debug, Clone, Default)]
pub struct SensorState {
    pub level_percent: Option<f64>,
}

object_kind!(SensorObject, SensorState, SensorState::default());

impl SensorObject {
    fn apply(&self, args: &[String]) -> bool {
        let Some(level) = args.first().and_then(|t| crate::command_client::codec::decode_percent(t).ok().flatten())
        else {
            return false;
        };
        self.state.write().expect("state lock poisoned").level_percent = Some(level);
        true
    }

    /// Sets the level directly from an already-scaled percent value (see
    /// [`LoadObject::set_level_percent`]).
    pub fn set_level_percent(&self, percent: f64) {
        self.state.write().expect("state lock poisoned").level_percent = Some(percent);
    }

    fn apply_method(&self, method: &str, args: &[String]) -> bool {
        if method != "GetLevel" {
            return false;
        }
        self.apply(args)
    }
}

#[derive(Debug, Clone, Default)]
pub struct ThermostatState {
    pub indoor_celsius: Option<f64>,
    pub heat_setpoint_celsius: Option<f64>,
    pub cool_setpoint_celsius: Option<f64>,
}

object_kind!(ThermostatObject, ThermostatState, ThermostatState::default());

impl ThermostatObject {
    fn apply(&self, args: &[String]) -> bool {
        let [kind, value] = args else { return false };
        let Ok(Some(celsius)) = crate::command_client::codec::decode_celsius(value) else { return false };
        let mut state = self.state.write().expect("state lock poisoned");
        match kind.as_str() {
            "INDOOR" => state.indoor_celsius = Some(celsius),
            "HEAT" => state.heat_setpoint_celsius = Some(celsius),
            "COOL" => state.cool_setpoint_celsius = Some(celsius),
            _ => return false,
        }
        true
    }

    fn apply_method(&self, method: &str, args: &[String]) -> bool {
        let Some(Ok(Some(celsius))) =
            args.first().map(|t| crate::command_client::codec::decode_celsius(t))
        else {
            return false;
        };
        let mut state = self.state.write().expect("state lock poisoned");
        match method {
            "GetIndoorTemperature" => state.indoor_celsius = Some(celsius),
            "GetHeatSetpoint" => state.heat_setpoint_celsius = Some(celsius),
            "GetCoolSetpoint" => state.cool_setpoint_celsius = Some(celsius),
            _ => return false,
        }
        true
    }
}

#[derive(Debug, Clone, Default)]
pub struct TaskState {
    pub last_run_state: Option<String>,
}

object_kind!(TaskObject, TaskState, TaskState::default());

impl TaskObject {
    fn apply(&self, args: &[String]) -> bool {
        let Some(token) = args.first() else { return false };
        self.state.write().expect("state lock poisoned").last_run_state = Some(token.clone());
        true
    }

    fn apply_method(&self, _method: &str, _args: &[String]) -> bool {
        false
    }
}

#[derive(Debug, Clone, Default)]
pub struct GMemState {
    pub value: Option<String>,
}

object_kind!(GMemObject, GMemState, GMemState::default());

impl GMemObject {
    fn apply(&self, args: &[String]) -> bool {
        let Some(token) = args.first() else { return false };
        self.state.write().expect("state lock poisoned").value = Some(token.clone());
        true
    }

    fn apply_method(&self, method: &str, args: &[String]) -> bool {
        if method != "GetValue" {
            return false;
        }
        self.apply(args)
    }
}

/// Read-only introspection pseudo-object (`IIntrospection`), carried in
/// the registry so callers can query controller version/types through
/// the same object-lookup API as everything else.
#[derive(Debug, Clone, Default)]
pub struct IntrospectionState {
    pub firmware_version: Option<String>,
}

object_kind!(IntrospectionObject, IntrospectionState, IntrospectionState::default());

impl IntrospectionObject {
    fn apply(&self, _args: &[String]) -> bool {
        false
    }

    fn apply_method(&self, _method: &str, _args: &[String]) -> bool {
        false
    }
}

/// The tagged union of every object kind the controller can report.
/// Adding a kind means adding a variant here and to
/// [`crate::model::registry::Registry::instantiate`] — nowhere else,
/// since everything else goes through [`ObjectBehavior`].
#[enum_dispatch(ObjectBehavior)]
#[derive(Debug)]
pub enum ObjectKind {
    Load(LoadObject),
    Button(ButtonObject),
    Blind(BlindObject),
    Sensor(SensorObject),
    Thermostat(ThermostatObject),
    Task(TaskObject),
    GMem(GMemObject),
    Introspection(IntrospectionObject),
}

#[cfg(test)]
mod tests {
    use super::*;

    fn info(vid: Vid) -> ObjectInfo {
        ObjectInfo { vid, name: "test".into(), model: None, area_vid: None, master_vid: None }
    }

    #[test]
    fn load_applies_level_updates() {
        let load = LoadObject::new(info(1));
        assert!(load.apply_status_line(&["50.000".to_string()]));
        assert_eq!(load.state().level_percent, Some(50.0));
    }

    #[test]
    fn blind_tracks_moving_and_position() {
        let blind = BlindObject::new(info(2));
        assert!(blind.apply_status_line(&["OPEN".to_string()]));
        assert!(blind.state().moving);
        assert!(blind.apply_status_line(&["75.000".to_string()]));
        assert_eq!(blind.state().position_percent, Some(75.0));
        assert!(!blind.state().moving);
    }

    #[test]
    fn load_applies_fine_grained_get_level_push_as_millipercent() {
        let load = LoadObject::new(info(4));
        assert!(load.apply_object_status("GetLevel", &["50000".to_string()]));
        assert_eq!(load.state().level_percent, Some(50.0));
    }

    #[test]
    fn unrecognized_arguments_are_rejected() {
        let button = ButtonObject::new(info(3));
        assert!(!button.apply_status_line(&["WIGGLE".to_string()]));
    }

    #[test]
    fn thermostat_applies_method_keyed_push() {
        let thermostat = ThermostatObject::new(info(5));
        assert!(thermostat.apply_object_status("GetHeatSetpoint", &["21.5".to_string()]));
        assert_eq!(thermostat.state().heat_setpoint_celsius, Some(21.5));
        assert!(!thermostat.apply_object_status("SetFanMode", &["AUTO".to_string()]));
    }

    #[test]
    fn unbound_method_names_are_ignored() {
        let task = TaskObject::new(info(6));
        assert!(!task.apply_object_status("AnythingElse", &["1".to_string()]));
    }
}
