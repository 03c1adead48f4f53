//! Normalizers turning cloud API resources into canonical inventory records.
//!
//! Each normalizer is a plain function bound to one entity type in the
//! registry. They only ever append to the accumulator: a record without an
//! `id` cannot be referenced downstream and is skipped with a warning.

mod compute;
mod network;
mod storage;

use serde_json::Value;
use tracing::warn;

use crate::inventory::{RawRecord, Record, Scope};
use crate::registry::{NormalizeFn, RegistryBuilder};

/// Normalizer shipped for `tag`, if any.
pub fn for_tag(tag: &str) -> Option<NormalizeFn> {
    let normalize: NormalizeFn = match tag {
        "vms" => compute::normalize_vm,
        "flavors" => compute::normalize_flavor,
        "network_interfaces" => network::normalize_network_interface,
        "cloud_networks" => network::normalize_cloud_network,
        "security_groups" => network::normalize_security_group,
        "floating_ips" => network::normalize_floating_ip,
        "cloud_volumes" => storage::normalize_cloud_volume,
        "cloud_volume_snapshots" => storage::normalize_snapshot,
        _ => return None,
    };
    Some(normalize)
}

/// Binds every shipped normalizer whose tag is in `tags`.
pub fn register_defaults<'a>(
    mut builder: RegistryBuilder,
    tags: impl IntoIterator<Item = &'a str>,
) -> RegistryBuilder {
    for tag in tags {
        if let Some(normalize) = for_tag(tag) {
            builder = builder.normalizer(tag, normalize);
        }
    }
    builder
}

fn str_at<'a>(raw: &'a Value, pointer: &str) -> Option<&'a str> {
    raw.pointer(pointer).and_then(Value::as_str)
}

fn value_at(raw: &Value, pointer: &str) -> Value {
    raw.pointer(pointer).cloned().unwrap_or(Value::Null)
}

/// Resource group segment of an ARM resource id, lowercased.
fn resource_group(resource_id: &str) -> Option<String> {
    let mut segments = resource_id.split('/');
    while let Some(segment) = segments.next() {
        if segment.eq_ignore_ascii_case("resourceGroups") {
            return segments.next().map(str::to_ascii_lowercase);
        }
    }
    None
}

/// Common attributes every ARM resource carries.
///
/// Returns `None` (and logs) when the resource has no id.
fn base_record(entity: &str, raw: &RawRecord, scope: &Scope) -> Option<Record> {
    let Some(id) = str_at(raw, "/id") else {
        warn!(
            event = "raw_record_skipped",
            entity_type = entity,
            scope = %scope,
            "resource without id skipped"
        );
        return None;
    };

    Some(
        Record::new(id.to_ascii_lowercase())
            .with("name", value_at(raw, "/name"))
            .with("location", value_at(raw, "/location"))
            .with("resource_group", resource_group(id))
            .with("subscription", scope.id.as_str())
            .with("tags", value_at(raw, "/tags")),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn resource_group_is_extracted_case_insensitively() {
        assert_eq!(
            resource_group("/subscriptions/s/resourceGroups/Prod-RG/providers/x/y/z"),
            Some("prod-rg".to_string())
        );
        assert_eq!(resource_group("/subscriptions/s"), None);
    }

    #[test]
    fn base_record_requires_an_id() {
        let scope = Scope::new("sub-1");
        assert!(base_record("vms", &json!({"name": "orphan"}), &scope).is_none());

        let record = base_record(
            "vms",
            &json!({"id": "/subscriptions/sub-1/resourceGroups/RG/providers/p/t/VM1", "name": "VM1", "location": "westeurope"}),
            &scope,
        )
        .expect("resource with id should map");
        assert_eq!(
            record.ems_ref,
            "/subscriptions/sub-1/resourcegroups/rg/providers/p/t/vm1"
        );
        assert_eq!(record.attribute("subscription"), Some(&json!("sub-1")));
        assert_eq!(record.attribute("resource_group"), Some(&json!("rg")));
        assert!(record.attribute("tags").is_none());
    }

    #[test]
    fn every_default_type_has_a_normalizer() {
        for entity in crate::registry::default_entity_types() {
            assert!(for_tag(entity.tag()).is_some(), "{} lacks a normalizer", entity.tag());
        }
        assert!(for_tag("unknown").is_none());
    }
}
