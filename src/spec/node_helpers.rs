use crate::config::CapacityClassConvention;
use k8s_openapi::api::core::v1::Node;
use serde::{Deserialize, Serialize};
use strum_macros::{Display, EnumString};

/// The two kinds of capacity a group is balanced across.
#[derive(
    Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Display, EnumString,
)]
#[strum(ascii_case_insensitive)]
pub enum CapacityClass {
    OnDemand,
    Spot,
}

impl CapacityClass {
    pub const ALL: [CapacityClass; 2] = [CapacityClass::OnDemand, CapacityClass::Spot];
}

pub fn node_name(node: &Node) -> &str {
    node.metadata.name.as_deref().unwrap_or_default()
}

/// Resolve a node to its capacity class.
///
/// A recognised value of the capacity label wins. Otherwise a node carrying one of the
/// configured spot taints is spot. Anything else is `None`: the node has no class and takes
/// no part in ratio accounting.
pub fn capacity_class(node: &Node, convention: &CapacityClassConvention) -> Option<CapacityClass> {
    let label_value = node
        .metadata
        .labels
        .as_ref()
        .and_then(|labels| labels.get(&convention.label_key));

    if let Some(value) = label_value {
        let matches = |values: &[String]| values.iter().any(|v| v.eq_ignore_ascii_case(value));
        if matches(&convention.on_demand_values) {
            return Some(CapacityClass::OnDemand);
        }
        if matches(&convention.spot_values) {
            return Some(CapacityClass::Spot);
        }
    }

    let spot_tainted = node
        .spec
        .as_ref()
        .and_then(|spec| spec.taints.as_ref())
        .map(|taints| {
            taints
                .iter()
                .any(|t| convention.spot_taint_keys.iter().any(|k| k == &t.key))
        })
        .unwrap_or(false);

    if spot_tainted {
        return Some(CapacityClass::Spot);
    }
    None
}
