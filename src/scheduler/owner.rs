use crate::spec::pod_helpers::controller_ref;
use crate::spec::ratio::{DesiredRatio, RatioError};
use crate::state::{ObjectStore, StoreError};
use crate::util::namespace_of;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use log::debug;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fmt::{Display, Formatter};
use strum_macros::{Display, EnumString};

#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum OwnerError {
    #[error("owner lookup failed: {0}")]
    Lookup(#[from] StoreError),
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Display, EnumString)]
pub enum GroupKind {
    Deployment,
    ReplicaSet,
    StatefulSet,
}

/// Identity of a workload group.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct GroupRef {
    pub kind: GroupKind,
    pub namespace: String,
    pub name: String,
}

impl Display for GroupRef {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {}/{}", self.kind, self.namespace, self.name)
    }
}

/// The controller object that owns a set of pods.
#[derive(Debug, Clone, PartialEq)]
pub struct WorkloadGroup {
    pub id: GroupRef,
    pub annotations: BTreeMap<String, String>,
}

impl WorkloadGroup {
    fn from_meta(kind: GroupKind, meta: &ObjectMeta) -> Self {
        WorkloadGroup {
            id: GroupRef {
                kind,
                namespace: namespace_of(meta).to_string(),
                name: meta.name.clone().unwrap_or_default(),
            },
            annotations: meta.annotations.clone().unwrap_or_default(),
        }
    }

    /// `Ok(None)` when the group carries no ratio annotation.
    pub fn desired_ratio(&self, annotation: &str) -> Result<Option<DesiredRatio>, RatioError> {
        self.annotations
            .get(annotation)
            .map(|value| value.parse::<DesiredRatio>())
            .transpose()
    }
}

/// Walks controller owner references up to the workload group.
///
/// Pod -> ReplicaSet -> Deployment, or Pod -> StatefulSet. A ReplicaSet that no Deployment
/// controls is its own group. Lookups are memoised for the lifetime of the resolver, which is
/// one PreFilter call.
pub struct OwnerResolver<'a> {
    store: &'a dyn ObjectStore,
    cache: HashMap<(String, String, String), Option<WorkloadGroup>>,
}

impl<'a> OwnerResolver<'a> {
    pub fn new(store: &'a dyn ObjectStore) -> Self {
        OwnerResolver {
            store,
            cache: HashMap::new(),
        }
    }

    pub fn resolve(&mut self, meta: &ObjectMeta) -> Result<Option<WorkloadGroup>, OwnerError> {
        let owner = match controller_ref(meta) {
            None => return Ok(None),
            Some(owner) => owner,
        };
        let namespace = namespace_of(meta);

        let key = (owner.kind.clone(), namespace.to_string(), owner.name.clone());
        if let Some(group) = self.cache.get(&key) {
            return Ok(group.clone());
        }

        let group = self.lookup(&owner.kind, namespace, &owner.name)?;
        self.cache.insert(key, group.clone());
        Ok(group)
    }

    fn lookup(&self, kind: &str, namespace: &str, name: &str) -> Result<Option<WorkloadGroup>, OwnerError> {
        match kind {
            "ReplicaSet" => {
                let rs = self.store.get_replica_set(namespace, name)?;
                match controller_ref(&rs.metadata) {
                    None => Ok(Some(WorkloadGroup::from_meta(GroupKind::ReplicaSet, &rs.metadata))),
                    Some(owner) if owner.kind == "Deployment" => {
                        let deployment = self.store.get_deployment(namespace, &owner.name)?;
                        Ok(Some(WorkloadGroup::from_meta(GroupKind::Deployment, &deployment.metadata)))
                    }
                    Some(owner) => {
                        debug!("replicaset {}/{} is controlled by unsupported kind {}", namespace, name, owner.kind);
                        Ok(None)
                    }
                }
            }
            "Deployment" => {
                let deployment = self.store.get_deployment(namespace, name)?;
                Ok(Some(WorkloadGroup::from_meta(GroupKind::Deployment, &deployment.metadata)))
            }
            "StatefulSet" => {
                let sts = self.store.get_stateful_set(namespace, name)?;
                Ok(Some(WorkloadGroup::from_meta(GroupKind::StatefulSet, &sts.metadata)))
            }
            other => {
                debug!("controller kind {} is not balanced", other);
                Ok(None)
            }
        }
    }
}
