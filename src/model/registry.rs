// SPDX-License-Identifier: AGPL-3.0-or-later

//! The in-memory object table, keyed by VID (spec §5).
//!
//! Kind is fixed at insertion: a VID cannot migrate from one kind to
//! another without being removed and re-added first, reported as a
//! protocol error if the controller's data disagrees.

use std::sync::Arc;

use dashmap::DashMap;

use crate::{
    config_client::xmlrpc::Value,
    error::{Error, Result},
    model::{
        ObjectInfo, Vid,
        kinds::{
            ButtonObject, GMemObject, IntrospectionObject, LoadObject, ObjectBehavior, ObjectKind,
            SensorObject, TaskObject, ThermostatObject,
        },
    },
};

pub struct Registry {
    objects: DashMap<Vid, Arc<ObjectKind>>,
}

impl Registry {
    pub fn new() -> Self {
        Self { objects: DashMap::new() }
    }

    pub fn get(&self, vid: Vid) -> Option<Arc<ObjectKind>> {
        self.objects.get(&vid).map(|e| Arc::clone(e.value()))
    }

    pub fn all(&self) -> Vec<Arc<ObjectKind>> {
        self.objects.iter().map(|e| Arc::clone(e.value())).collect()
    }

    pub fn len(&self) -> usize {
        self.objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    /// Builds an `ObjectKind` from a decoded `IEnclosure`/`IConfiguration`
    /// struct and inserts it, refusing to let an existing VID change
    /// kind.
    pub fn insert_from_wire(&self, type_name: &str, fields: &[(String, Value)]) -> Result<Arc<ObjectKind>> {
        let vid = fields
            .iter()
            .find(|(k, _)| k == "VID")
            .and_then(|(_, v)| v.as_int())
            .ok_or_else(|| Error::decode("object is missing VID"))?;
        let info = ObjectInfo::from_struct(vid, fields);
        let kind = instantiate(type_name, info)?;
        let arc = Arc::new(kind);

        if let Some(existing) = self.objects.get(&vid) {
            if std::mem::discriminant(existing.value().as_ref()) != std::mem::discriminant(arc.as_ref()) {
                return Err(Error::protocol(format!("VID {vid} changed kind on re-registration")));
            }
        }

        self.objects.insert(vid, Arc::clone(&arc));
        Ok(arc)
    }

    pub fn remove(&self, vid: Vid) -> Option<Arc<ObjectKind>> {
        self.objects.remove(&vid).map(|(_, v)| v)
    }

    /// Routes one classified `S:STATUS` line's remaining arguments to the
    /// object they target.
    pub fn apply_status(&self, vid: Vid, args: &[String]) -> bool {
        self.objects.get(&vid).map(|e| e.value().apply_status_line(args)).unwrap_or(false)
    }

    /// Routes one fine-grained `S:STATUS <vid> <Interface.Method> <result>`
    /// push to the object it targets (spec §4.F.2/§4.G).
    pub fn apply_object_status(&self, vid: Vid, method: &str, args: &[String]) -> bool {
        self.objects.get(&vid).map(|e| e.value().apply_object_status(method, args)).unwrap_or(false)
    }

    /// VIDs of every object currently registered, for per-object
    /// `ADDSTATUS` enrolment (spec §4.H).
    pub fn vids(&self) -> Vec<Vid> {
        self.objects.iter().map(|e| *e.key()).collect()
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}

fn instantiate(type_name: &str, info: ObjectInfo) -> Result<ObjectKind> {
    Ok(match type_name {
        "Load" => ObjectKind::Load(LoadObject::new(info)),
        "Button" => ObjectKind::Button(ButtonObject::new(info)),
        "Blind" | "BlindGroup" => ObjectKind::Blind(crate::model::kinds::BlindObject::new(info)),
        "Sensor" | "LightSensor" | "AnemoSensor" | "OmniSensor" => ObjectKind::Sensor(SensorObject::new(info)),
        "Thermostat" => ObjectKind::Thermostat(ThermostatObject::new(info)),
        "Task" => ObjectKind::Task(TaskObject::new(info)),
        "GMem" => ObjectKind::GMem(GMemObject::new(info)),
        "IIntrospection" => ObjectKind::Introspection(IntrospectionObject::new(info)),
        other => return Err(Error::protocol(format!("unsupported object type '{other}'"))),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn load_fields(vid: i64) -> Vec<(String, Value)> {
        vec![("VID".into(), Value::Int(vid)), ("Name".into(), Value::String("Kitchen".into()))]
    }

    #[test]
    fn inserts_and_looks_up_by_vid() {
        let registry = Registry::new();
        registry.insert_from_wire("Load", &load_fields(1)).unwrap();
        assert!(registry.get(1).is_some());
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn rejects_kind_change_on_existing_vid() {
        let registry = Registry::new();
        registry.insert_from_wire("Load", &load_fields(5)).unwrap();
        let err = registry.insert_from_wire("Button", &load_fields(5)).unwrap_err();
        assert!(matches!(err, Error::Protocol(_)));
    }

    #[test]
    fn unknown_type_name_is_rejected() {
        let registry = Registry::new();
        let err = registry.insert_from_wire("Spaceship", &load_fields(9)).unwrap_err();
        assert!(matches!(err, Error::Protocol(_)));
    }
}
