use serde_json::Value;

use super::{base_record, str_at, value_at};
use crate::inventory::{BatchAccumulator, RawRecord, Record, Scope};

pub(super) fn normalize_vm(raw: &RawRecord, scope: &Scope, acc: &mut BatchAccumulator) {
    let Some(vm) = base_record("vms", raw, scope) else {
        return;
    };
    let vm_ref = vm.ems_ref.clone();

    acc.push(
        "vms",
        vm.with("vendor", "azure")
            .with("flavor", value_at(raw, "/properties/hardwareProfile/vmSize"))
            .with("uid_ems", value_at(raw, "/properties/vmId"))
            .with("provisioning_state", value_at(raw, "/properties/provisioningState")),
    );

    acc.push(
        "hardwares",
        Record::new(vm_ref.clone())
            .with("vm", vm_ref.as_str())
            .with(
                "guest_os",
                value_at(raw, "/properties/storageProfile/osDisk/osType"),
            )
            .with(
                "image_ref",
                value_at(raw, "/properties/storageProfile/imageReference/id"),
            ),
    );

    if let Some(os_disk) = raw.pointer("/properties/storageProfile/osDisk") {
        push_disk(acc, &vm_ref, os_disk, true);
    }
    if let Some(data_disks) = raw
        .pointer("/properties/storageProfile/dataDisks")
        .and_then(Value::as_array)
    {
        for disk in data_disks {
            push_disk(acc, &vm_ref, disk, false);
        }
    }
}

fn push_disk(acc: &mut BatchAccumulator, vm_ref: &str, disk: &Value, os_disk: bool) {
    let Some(name) = str_at(disk, "/name") else {
        return;
    };

    acc.push(
        "disks",
        Record::new(format!("{vm_ref}/disks/{}", name.to_ascii_lowercase()))
            .with("hardware", vm_ref)
            .with("device_name", name)
            .with("bootable", os_disk)
            .with("size_gb", value_at(disk, "/diskSizeGB"))
            .with("lun", value_at(disk, "/lun"))
            .with("volume", value_at(disk, "/managedDisk/id")),
    );
}

/// Resource SKUs carry no ARM id; the SKU name is the reference.
pub(super) fn normalize_flavor(raw: &RawRecord, _scope: &Scope, acc: &mut BatchAccumulator) {
    if str_at(raw, "/resourceType") != Some("virtualMachines") {
        return;
    }
    let Some(name) = str_at(raw, "/name") else {
        return;
    };

    acc.push(
        "flavors",
        Record::new(name.to_ascii_lowercase())
            .with("name", name)
            .with("cpus", capability(raw, "vCPUs"))
            .with("memory_gb", capability(raw, "MemoryGB"))
            .with("max_data_disks", capability(raw, "MaxDataDiskCount"))
            .with("locations", value_at(raw, "/locations")),
    );
}

fn capability(raw: &Value, name: &str) -> Option<f64> {
    raw.get("capabilities")?
        .as_array()?
        .iter()
        .find(|capability| str_at(capability, "/name") == Some(name))
        .and_then(|capability| str_at(capability, "/value"))
        .and_then(|value| value.parse().ok())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn vm_emits_vm_hardware_and_disks() {
        let raw = json!({
            "id": "/subscriptions/sub-1/resourceGroups/rg/providers/Microsoft.Compute/virtualMachines/web-1",
            "name": "web-1",
            "location": "eastus",
            "properties": {
                "vmId": "8f0c",
                "hardwareProfile": {"vmSize": "Standard_B2s"},
                "storageProfile": {
                    "osDisk": {"name": "web-1-os", "osType": "Linux", "diskSizeGB": 30},
                    "dataDisks": [{"name": "web-1-data", "lun": 0, "diskSizeGB": 128}]
                }
            }
        });
        let mut acc = BatchAccumulator::new();

        normalize_vm(&raw, &Scope::new("sub-1"), &mut acc);

        let vms = acc.collection("vms").expect("vms collection");
        assert_eq!(vms.len(), 1);
        assert_eq!(vms[0].attribute("flavor"), Some(&json!("Standard_B2s")));
        let hardware = &acc.collection("hardwares").expect("hardwares")[0];
        assert_eq!(hardware.attribute("guest_os"), Some(&json!("Linux")));
        let disks = acc.collection("disks").expect("disks");
        assert_eq!(disks.len(), 2);
        assert_eq!(disks[0].attribute("bootable"), Some(&json!(true)));
        assert!(disks[1].ems_ref.ends_with("/disks/web-1-data"));
    }

    #[test]
    fn flavor_reads_capabilities_and_ignores_other_skus() {
        let mut acc = BatchAccumulator::new();
        let scope = Scope::new("sub-1");
        normalize_flavor(
            &json!({
                "resourceType": "virtualMachines",
                "name": "Standard_D2s_v3",
                "capabilities": [{"name": "vCPUs", "value": "2"}, {"name": "MemoryGB", "value": "8"}]
            }),
            &scope,
            &mut acc,
        );
        normalize_flavor(
            &json!({"resourceType": "disks", "name": "Premium_LRS"}),
            &scope,
            &mut acc,
        );

        let flavors = acc.collection("flavors").expect("flavors");
        assert_eq!(flavors.len(), 1);
        assert_eq!(flavors[0].ems_ref, "standard_d2s_v3");
        assert_eq!(flavors[0].attribute("cpus"), Some(&json!(2.0)));
        assert_eq!(flavors[0].attribute("memory_gb"), Some(&json!(8.0)));
    }
}
