use serde_json::Value;

use super::{base_record, str_at, value_at};
use crate::inventory::{BatchAccumulator, RawRecord, Record, Scope};

fn lowercase_ref(raw: &Value, pointer: &str) -> Option<String> {
    str_at(raw, pointer).map(str::to_ascii_lowercase)
}

pub(super) fn normalize_network_interface(
    raw: &RawRecord,
    scope: &Scope,
    acc: &mut BatchAccumulator,
) {
    let Some(port) = base_record("network_interfaces", raw, scope) else {
        return;
    };

    let primary_config = raw
        .pointer("/properties/ipConfigurations")
        .and_then(Value::as_array)
        .and_then(|configs| configs.first());

    acc.push(
        "network_ports",
        port.with("mac_address", value_at(raw, "/properties/macAddress"))
            .with("device", lowercase_ref(raw, "/properties/virtualMachine/id"))
            .with(
                "security_group",
                lowercase_ref(raw, "/properties/networkSecurityGroup/id"),
            )
            .with(
                "private_ip",
                primary_config.map(|config| value_at(config, "/properties/privateIPAddress")),
            )
            .with(
                "subnet",
                primary_config.and_then(|config| lowercase_ref(config, "/properties/subnet/id")),
            ),
    );
}

pub(super) fn normalize_cloud_network(raw: &RawRecord, scope: &Scope, acc: &mut BatchAccumulator) {
    let Some(network) = base_record("cloud_networks", raw, scope) else {
        return;
    };
    let network_ref = network.ems_ref.clone();

    acc.push(
        "cloud_networks",
        network.with(
            "cidr",
            value_at(raw, "/properties/addressSpace/addressPrefixes"),
        ),
    );

    let subnets = raw
        .pointer("/properties/subnets")
        .and_then(Value::as_array)
        .map(Vec::as_slice)
        .unwrap_or_default();
    for subnet in subnets {
        let Some(subnet_ref) = lowercase_ref(subnet, "/id") else {
            continue;
        };
        acc.push(
            "cloud_subnets",
            Record::new(subnet_ref)
                .with("name", value_at(subnet, "/name"))
                .with("cloud_network", network_ref.as_str())
                .with("cidr", value_at(subnet, "/properties/addressPrefix"))
                .with(
                    "security_group",
                    lowercase_ref(subnet, "/properties/networkSecurityGroup/id"),
                ),
        );
    }
}

pub(super) fn normalize_security_group(
    raw: &RawRecord,
    scope: &Scope,
    acc: &mut BatchAccumulator,
) {
    let Some(group) = base_record("security_groups", raw, scope) else {
        return;
    };
    let group_ref = group.ems_ref.clone();
    acc.push("security_groups", group);

    // Declared even for rule-less groups so deleted rules still get swept.
    acc.touch("firewall_rules");
    let rules = raw
        .pointer("/properties/securityRules")
        .and_then(Value::as_array)
        .map(Vec::as_slice)
        .unwrap_or_default();
    for rule in rules {
        let Some(rule_ref) = lowercase_ref(rule, "/id") else {
            continue;
        };
        acc.push(
            "firewall_rules",
            Record::new(rule_ref)
                .with("security_group", group_ref.as_str())
                .with("name", value_at(rule, "/name"))
                .with("direction", value_at(rule, "/properties/direction"))
                .with("access", value_at(rule, "/properties/access"))
                .with("protocol", value_at(rule, "/properties/protocol"))
                .with("priority", value_at(rule, "/properties/priority"))
                .with(
                    "port_range",
                    value_at(rule, "/properties/destinationPortRange"),
                )
                .with(
                    "source_ip_range",
                    value_at(rule, "/properties/sourceAddressPrefix"),
                ),
        );
    }
}

pub(super) fn normalize_floating_ip(raw: &RawRecord, scope: &Scope, acc: &mut BatchAccumulator) {
    let Some(ip) = base_record("floating_ips", raw, scope) else {
        return;
    };

    acc.push(
        "floating_ips",
        ip.with("address", value_at(raw, "/properties/ipAddress"))
            .with(
                "allocation",
                value_at(raw, "/properties/publicIPAllocationMethod"),
            )
            .with(
                "network_port",
                lowercase_ref(raw, "/properties/ipConfiguration/id")
                    .map(|config| nic_from_ip_configuration(&config)),
            ),
    );
}

/// `.../networkInterfaces/nic-1/ipConfigurations/ipconfig1` -> `.../networkInterfaces/nic-1`
fn nic_from_ip_configuration(config_ref: &str) -> String {
    match config_ref.find("/ipconfigurations/") {
        Some(position) => config_ref[..position].to_string(),
        None => config_ref.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn network_emits_subnets_linked_to_network() {
        let raw = json!({
            "id": "/subscriptions/s/resourceGroups/rg/providers/Microsoft.Network/virtualNetworks/vnet",
            "name": "vnet",
            "properties": {
                "addressSpace": {"addressPrefixes": ["10.0.0.0/16"]},
                "subnets": [
                    {"id": "/subscriptions/s/resourceGroups/rg/providers/Microsoft.Network/virtualNetworks/vnet/subnets/default",
                     "name": "default", "properties": {"addressPrefix": "10.0.0.0/24"}},
                    {"name": "no-id"}
                ]
            }
        });
        let mut acc = BatchAccumulator::new();

        normalize_cloud_network(&raw, &Scope::new("s"), &mut acc);

        let networks = acc.collection("cloud_networks").expect("networks");
        let subnets = acc.collection("cloud_subnets").expect("subnets");
        assert_eq!(subnets.len(), 1);
        assert_eq!(
            subnets[0].attribute("cloud_network"),
            Some(&json!(networks[0].ems_ref))
        );
        assert_eq!(subnets[0].attribute("cidr"), Some(&json!("10.0.0.0/24")));
    }

    #[test]
    fn security_group_without_rules_still_declares_rule_collection() {
        let mut acc = BatchAccumulator::new();
        normalize_security_group(
            &json!({"id": "/subscriptions/s/resourceGroups/rg/providers/Microsoft.Network/networkSecurityGroups/nsg"}),
            &Scope::new("s"),
            &mut acc,
        );

        assert_eq!(acc.collection("security_groups").map(<[_]>::len), Some(1));
        assert_eq!(acc.collection("firewall_rules").map(<[_]>::len), Some(0));
    }

    #[test]
    fn floating_ip_points_at_owning_nic() {
        let mut acc = BatchAccumulator::new();
        normalize_floating_ip(
            &json!({
                "id": "/subscriptions/s/resourceGroups/rg/providers/Microsoft.Network/publicIPAddresses/pip",
                "properties": {
                    "ipAddress": "20.1.2.3",
                    "ipConfiguration": {"id": "/subscriptions/s/resourceGroups/rg/providers/Microsoft.Network/networkInterfaces/nic-1/ipConfigurations/ipconfig1"}
                }
            }),
            &Scope::new("s"),
            &mut acc,
        );

        let ip = &acc.collection("floating_ips").expect("floating ips")[0];
        assert_eq!(
            ip.attribute("network_port"),
            Some(&json!(
                "/subscriptions/s/resourcegroups/rg/providers/microsoft.network/networkinterfaces/nic-1"
            ))
        );
        assert_eq!(ip.attribute("address"), Some(&json!("20.1.2.3")));
    }
}
