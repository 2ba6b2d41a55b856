use crate::config::{DEFAULT_CAPACITY_LABEL, DEFAULT_RATIO_ANNOTATION};
use crate::scheduler::NodeInfo;
use k8s_openapi::api::apps::v1::{Deployment, ReplicaSet, StatefulSet};
use k8s_openapi::api::core::v1::{Node, Pod, PodSpec};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{ObjectMeta, OwnerReference};
use std::collections::BTreeMap;

#[allow(unused)]
pub fn init_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn meta(name: &str) -> ObjectMeta {
    ObjectMeta {
        name: Some(name.to_string()),
        namespace: Some("default".to_string()),
        uid: Some(format!("uid-{}", name)),
        ..Default::default()
    }
}

fn owner_ref(kind: &str, name: &str) -> OwnerReference {
    OwnerReference {
        api_version: "apps/v1".to_string(),
        kind: kind.to_string(),
        name: name.to_string(),
        uid: format!("uid-{}", name),
        controller: Some(true),
        block_owner_deletion: Some(true),
    }
}

#[allow(unused)]
pub fn replica_set_ref(name: &str) -> OwnerReference {
    owner_ref("ReplicaSet", name)
}

#[allow(unused)]
pub fn deployment_ref(name: &str) -> OwnerReference {
    owner_ref("Deployment", name)
}

#[allow(unused)]
pub fn stateful_set_ref(name: &str) -> OwnerReference {
    owner_ref("StatefulSet", name)
}

#[allow(unused)]
pub fn daemon_set_ref(name: &str) -> OwnerReference {
    owner_ref("DaemonSet", name)
}

#[allow(unused)]
pub fn node_with_labels(name: &str, labels: &[(&str, &str)]) -> Node {
    let mut metadata = meta(name);
    metadata.namespace = None;
    metadata.labels = Some(
        labels
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect(),
    );
    Node {
        metadata,
        ..Default::default()
    }
}

/// A node labelled with the default capacity-type label, if `capacity` is given.
#[allow(unused)]
pub fn node(name: &str, capacity: Option<&str>) -> Node {
    match capacity {
        Some(capacity) => node_with_labels(name, &[(DEFAULT_CAPACITY_LABEL, capacity)]),
        None => node_with_labels(name, &[("kubernetes.io/hostname", name)]),
    }
}

#[allow(unused)]
pub fn node_info(node: Node) -> NodeInfo {
    NodeInfo::new(node, vec![])
}

#[allow(unused)]
pub fn pod(name: &str, owners: &[OwnerReference]) -> Pod {
    let mut metadata = meta(name);
    if !owners.is_empty() {
        metadata.owner_references = Some(owners.to_vec());
    }
    Pod {
        metadata,
        spec: Some(PodSpec::default()),
        status: None,
    }
}

#[allow(unused)]
pub fn bound_pod(name: &str, owners: &[OwnerReference], node_name: &str) -> Pod {
    let mut p = pod(name, owners);
    if let Some(spec) = p.spec.as_mut() {
        spec.node_name = Some(node_name.to_string());
    }
    p
}

fn ratio_annotations(ratio: Option<&str>) -> Option<BTreeMap<String, String>> {
    ratio.map(|r| BTreeMap::from([(DEFAULT_RATIO_ANNOTATION.to_string(), r.to_string())]))
}

#[allow(unused)]
pub fn deployment(name: &str, ratio: Option<&str>) -> Deployment {
    let mut metadata = meta(name);
    metadata.annotations = ratio_annotations(ratio);
    Deployment {
        metadata,
        ..Default::default()
    }
}

#[allow(unused)]
pub fn replica_set(name: &str, owner: Option<OwnerReference>) -> ReplicaSet {
    let mut metadata = meta(name);
    metadata.owner_references = owner.map(|o| vec![o]);
    ReplicaSet {
        metadata,
        ..Default::default()
    }
}

#[allow(unused)]
pub fn stateful_set(name: &str, ratio: Option<&str>) -> StatefulSet {
    let mut metadata = meta(name);
    metadata.annotations = ratio_annotations(ratio);
    StatefulSet {
        metadata,
        ..Default::default()
    }
}
