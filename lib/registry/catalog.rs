use nonzero_ext::nonzero;

use super::entity::{Domain, EntityType};

/// Entity types the collector ships with, in collection order.
pub fn default_entity_types() -> Vec<EntityType> {
    vec![
        EntityType::new("vms", Domain::Compute, nonzero!(200usize))
            .with_resource_path("providers/Microsoft.Compute/virtualMachines")
            .with_collections(&["vms", "hardwares", "disks"])
            .with_related(&["network_interfaces"])
            .top_level(),
        EntityType::new("network_interfaces", Domain::Network, nonzero!(500usize))
            .with_resource_path("providers/Microsoft.Network/networkInterfaces")
            .with_collections(&["network_ports"]),
        EntityType::new("flavors", Domain::Compute, nonzero!(1000usize))
            .with_resource_path("providers/Microsoft.Compute/skus")
            .top_level(),
        EntityType::new("cloud_networks", Domain::Network, nonzero!(500usize))
            .with_resource_path("providers/Microsoft.Network/virtualNetworks")
            .with_collections(&["cloud_networks", "cloud_subnets"])
            .with_related(&["security_groups", "floating_ips"])
            .top_level(),
        EntityType::new("security_groups", Domain::Network, nonzero!(500usize))
            .with_resource_path("providers/Microsoft.Network/networkSecurityGroups")
            .with_collections(&["security_groups", "firewall_rules"]),
        EntityType::new("floating_ips", Domain::Network, nonzero!(500usize))
            .with_resource_path("providers/Microsoft.Network/publicIPAddresses"),
        EntityType::new("cloud_volumes", Domain::Storage, nonzero!(500usize))
            .with_resource_path("providers/Microsoft.Compute/disks")
            .with_related(&["cloud_volume_snapshots"])
            .top_level(),
        EntityType::new("cloud_volume_snapshots", Domain::Storage, nonzero!(500usize))
            .with_resource_path("providers/Microsoft.Compute/snapshots"),
    ]
}
