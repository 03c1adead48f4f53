use super::{base_record, str_at, value_at};
use crate::inventory::{BatchAccumulator, RawRecord, Scope};

pub(super) fn normalize_cloud_volume(raw: &RawRecord, scope: &Scope, acc: &mut BatchAccumulator) {
    let Some(volume) = base_record("cloud_volumes", raw, scope) else {
        return;
    };

    acc.push(
        "cloud_volumes",
        volume
            .with("size_gb", value_at(raw, "/properties/diskSizeGB"))
            .with("status", value_at(raw, "/properties/diskState"))
            .with("volume_type", value_at(raw, "/sku/name"))
            .with("attached_to", str_at(raw, "/managedBy").map(str::to_ascii_lowercase))
            .with("created_at", value_at(raw, "/properties/timeCreated")),
    );
}

pub(super) fn normalize_snapshot(raw: &RawRecord, scope: &Scope, acc: &mut BatchAccumulator) {
    let Some(snapshot) = base_record("cloud_volume_snapshots", raw, scope) else {
        return;
    };

    acc.push(
        "cloud_volume_snapshots",
        snapshot
            .with("size_gb", value_at(raw, "/properties/diskSizeGB"))
            .with(
                "cloud_volume",
                str_at(raw, "/properties/creationData/sourceResourceId")
                    .map(str::to_ascii_lowercase),
            )
            .with("created_at", value_at(raw, "/properties/timeCreated")),
    );
}
