use crate::scheduler::NodeInfo;
use crate::spec::pod_helpers::assigned_node;
use crate::util::{NamespacedName, metadata_name, namespace_of};
use k8s_openapi::api::apps::v1::{Deployment, ReplicaSet, StatefulSet};
use k8s_openapi::api::core::v1::{Node, Pod};
use std::collections::BTreeMap;

#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum StoreError {
    #[error("{kind} {name} not found")]
    NotFound { kind: &'static str, name: String },
    #[error("object store unavailable: {0}")]
    Unavailable(String),
}

impl StoreError {
    pub fn not_found(kind: &'static str, name: impl ToString) -> Self {
        StoreError::NotFound {
            kind,
            name: name.to_string(),
        }
    }
}

/// Read access to cluster objects.
///
/// Only PreFilter talks to the store; Filter and Score work from the cycle state.
pub trait ObjectStore: Send + Sync {
    fn get_node(&self, name: &str) -> Result<Node, StoreError>;
    fn list_pods(&self, namespace: &str) -> Result<Vec<Pod>, StoreError>;
    fn get_replica_set(&self, namespace: &str, name: &str) -> Result<ReplicaSet, StoreError>;
    fn get_deployment(&self, namespace: &str, name: &str) -> Result<Deployment, StoreError>;
    fn get_stateful_set(&self, namespace: &str, name: &str) -> Result<StatefulSet, StoreError>;
}

/// In-memory view of the cluster.
#[derive(Debug, Clone, Default)]
pub struct ClusterState {
    pub nodes: BTreeMap<String, Node>,
    pub pods: BTreeMap<NamespacedName, Pod>,
    pub replica_sets: BTreeMap<NamespacedName, ReplicaSet>,
    pub deployments: BTreeMap<NamespacedName, Deployment>,
    pub stateful_sets: BTreeMap<NamespacedName, StatefulSet>,
}

impl ClusterState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_node(mut self, node: Node) -> Self {
        self.add_node(node);
        self
    }

    pub fn with_pod(mut self, pod: Pod) -> Self {
        self.add_pod(pod);
        self
    }

    pub fn with_replica_set(mut self, rs: ReplicaSet) -> Self {
        self.replica_sets.insert(metadata_name(&rs), rs);
        self
    }

    pub fn with_deployment(mut self, deployment: Deployment) -> Self {
        self.deployments.insert(metadata_name(&deployment), deployment);
        self
    }

    pub fn with_stateful_set(mut self, sts: StatefulSet) -> Self {
        self.stateful_sets.insert(metadata_name(&sts), sts);
        self
    }

    pub fn add_node(&mut self, node: Node) {
        let name = node.metadata.name.clone().unwrap_or_default();
        self.nodes.insert(name, node);
    }

    pub fn add_pod(&mut self, pod: Pod) {
        self.pods.insert(metadata_name(&pod), pod);
    }

    /// Records the binding of a pod to a node, as the host does after a successful attempt.
    pub fn bind_pod(&mut self, mut pod: Pod, node_name: &str) {
        pod.spec.get_or_insert_with(Default::default).node_name = Some(node_name.to_string());
        self.add_pod(pod);
    }

    pub fn pods_on_node(&self, node_name: &str) -> Vec<Pod> {
        self.pods
            .values()
            .filter(|p| assigned_node(p) == Some(node_name))
            .cloned()
            .collect()
    }

    /// Every node with the pods bound to it, in node name order.
    pub fn node_infos(&self) -> Vec<NodeInfo> {
        self.nodes
            .iter()
            .map(|(name, node)| NodeInfo::new(node.clone(), self.pods_on_node(name)))
            .collect()
    }
}

impl ObjectStore for ClusterState {
    fn get_node(&self, name: &str) -> Result<Node, StoreError> {
        self.nodes
            .get(name)
            .cloned()
            .ok_or_else(|| StoreError::not_found("Node", name))
    }

    fn list_pods(&self, namespace: &str) -> Result<Vec<Pod>, StoreError> {
        Ok(self
            .pods
            .values()
            .filter(|p| namespace_of(&p.metadata) == namespace)
            .cloned()
            .collect())
    }

    fn get_replica_set(&self, namespace: &str, name: &str) -> Result<ReplicaSet, StoreError> {
        let key = NamespacedName::new(name, namespace);
        self.replica_sets
            .get(&key)
            .cloned()
            .ok_or_else(|| StoreError::not_found("ReplicaSet", key))
    }

    fn get_deployment(&self, namespace: &str, name: &str) -> Result<Deployment, StoreError> {
        let key = NamespacedName::new(name, namespace);
        self.deployments
            .get(&key)
            .cloned()
            .ok_or_else(|| StoreError::not_found("Deployment", key))
    }

    fn get_stateful_set(&self, namespace: &str, name: &str) -> Result<StatefulSet, StoreError> {
        let key = NamespacedName::new(name, namespace);
        self.stateful_sets
            .get(&key)
            .cloned()
            .ok_or_else(|| StoreError::not_found("StatefulSet", key))
    }
}
