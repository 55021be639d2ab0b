// SPDX-License-Identifier: AGPL-3.0-or-later

//! The object model: typed wrappers over the raw attribute structs the
//! configuration service returns, kept up to date by state pushes from
//! the command service (spec §5).

pub mod kinds;
pub mod registry;

use crate::config_client::xmlrpc::Value;

/// Stable identity of a controller object. Immutable once assigned; the
/// kind of the object behind a VID never changes (spec §5, invariant
/// I-1 in the source material's terms, carried here without the tag).
pub type Vid = i64;

/// Fields common to every object kind, populated once from the
/// configuration service and never mutated afterward.
#[derive(Debug, Clone)]
pub struct ObjectInfo {
    pub vid: Vid,
    pub name: String,
    pub model: Option<String>,
    pub area_vid: Option<Vid>,
    pub master_vid: Option<Vid>,
}

impl ObjectInfo {
    pub fn from_struct(vid: Vid, fields: &[(String, Value)]) -> Self {
        let get_str = |key: &str| fields.iter().find(|(k, _)| k == key).and_then(|(_, v)| v.as_str());
        let get_vid = |key: &str| fields.iter().find(|(k, _)| k == key).and_then(|(_, v)| v.as_int());
        Self {
            vid,
            name: get_str("Name").unwrap_or_default().to_string(),
            model: get_str("Model").map(ToString::to_string),
            area_vid: get_vid("Area"),
            master_vid: get_vid("Master"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_common_fields_from_struct() {
        let fields = vec![
            ("Name".to_string(), Value::String("Kitchen Load".into())),
            ("Area".to_string(), Value::Int(7)),
            ("Master".to_string(), Value::Int(1)),
        ];
        let info = ObjectInfo::from_struct(118, &fields);
        assert_eq!(info.name, "Kitchen Load");
        assert_eq!(info.area_vid, Some(7));
        assert_eq!(info.master_vid, Some(1));
        assert_eq!(info.model, None);
    }
}
