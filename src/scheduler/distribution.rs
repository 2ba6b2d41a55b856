use crate::config::BalancerArgs;
use crate::scheduler::NodeInfo;
use crate::scheduler::owner::{GroupRef, OwnerResolver, WorkloadGroup};
use crate::spec::node_helpers::{CapacityClass, capacity_class};
use crate::spec::pod_helpers::{assigned_node, is_active, pod_key, same_pod};
use crate::spec::ratio::DesiredRatio;
use crate::state::{ObjectStore, StoreError};
use itertools::Itertools;
use k8s_openapi::api::core::v1::Pod;
use log::{debug, warn};
use std::collections::{BTreeMap, BTreeSet, HashMap};

/// Where a group's pods are today and where each candidate node would take it.
///
/// Built once per scheduling attempt by PreFilter and read-only afterwards.
#[derive(Debug, Clone, PartialEq)]
pub struct DistributionSnapshot {
    pub group: GroupRef,
    pub desired_ratio: DesiredRatio,
    pub tolerance_percent: f64,
    pub current_counts: BTreeMap<CapacityClass, u32>,
    /// Group pods whose node has no capacity class. Not part of any percentage.
    pub unclassified: u32,
    pub current_percentage: BTreeMap<CapacityClass, f64>,
    /// node name -> class -> share of each class if the pod lands on that node
    pub calculated_percentage: BTreeMap<String, BTreeMap<CapacityClass, f64>>,
    pub node_classes: BTreeMap<String, CapacityClass>,
    /// Classes a new pod may be placed on without breaching the ceiling.
    pub admitted_classes: BTreeSet<CapacityClass>,
}

impl DistributionSnapshot {
    pub fn total_classified(&self) -> u32 {
        self.current_counts.values().sum()
    }

    pub fn count(&self, class: CapacityClass) -> u32 {
        self.current_counts.get(&class).copied().unwrap_or(0)
    }

    /// Share of `class` after adding one more pod there.
    pub fn projected_for_class(&self, class: CapacityClass) -> f64 {
        percentage(self.count(class) + 1, self.total_classified() + 1)
    }

    /// Projected share of `class` for a placement on `node_name`.
    pub fn projected(&self, node_name: &str, class: CapacityClass) -> f64 {
        self.calculated_percentage
            .get(node_name)
            .and_then(|p| p.get(&class))
            .copied()
            .unwrap_or_else(|| self.projected_for_class(class))
    }

    pub fn ceiling(&self, class: CapacityClass) -> f64 {
        self.desired_ratio.percent(class) + self.tolerance_percent
    }

    pub fn admits(&self, class: CapacityClass) -> bool {
        self.admitted_classes.contains(&class)
    }

    /// Positive when placing on `class` moves the group towards its target.
    /// Unit is hundredths of a percentage point.
    pub fn raw_score(&self, node_name: &str, class: CapacityClass) -> i64 {
        ((self.desired_ratio.percent(class) - self.projected(node_name, class)) * 100.0).round() as i64
    }
}

fn percentage(count: u32, total: u32) -> f64 {
    if total == 0 {
        return 0.0;
    }
    (100.0 * count as f64) / total as f64
}

/// Counts where a group's pods run and projects each candidate placement.
pub struct DistributionCalculator<'a> {
    store: &'a dyn ObjectStore,
    args: &'a BalancerArgs,
}

impl<'a> DistributionCalculator<'a> {
    pub fn new(store: &'a dyn ObjectStore, args: &'a BalancerArgs) -> Self {
        DistributionCalculator { store, args }
    }

    /// Bound, active pods of `group`, excluding the pod being scheduled.
    fn group_pods(
        &self,
        resolver: &mut OwnerResolver,
        group: &WorkloadGroup,
        pod: &Pod,
    ) -> Result<Vec<Pod>, StoreError> {
        let pods = self.store.list_pods(&group.id.namespace)?;

        Ok(pods
            .into_iter()
            .filter(|p| !same_pod(p, pod) && is_active(p) && assigned_node(p).is_some())
            .filter(|p| match resolver.resolve(&p.metadata) {
                Ok(Some(g)) => g.id == group.id,
                Ok(None) => false,
                Err(e) => {
                    warn!("skipping pod {} when counting {}: {}", pod_key(p), group.id, e);
                    false
                }
            })
            .collect())
    }

    fn classify_node(
        &self,
        name: &str,
        nodes: &[NodeInfo],
        cache: &mut HashMap<String, Option<CapacityClass>>,
    ) -> Result<Option<CapacityClass>, StoreError> {
        if let Some(class) = cache.get(name) {
            return Ok(*class);
        }
        let convention = &self.args.capacity_class;
        let class = match nodes.iter().find(|n| n.name() == name) {
            Some(info) => capacity_class(&info.node, convention),
            None => match self.store.get_node(name) {
                Ok(node) => capacity_class(&node, convention),
                Err(StoreError::NotFound { .. }) => {
                    debug!("node {} is gone, counting its pods as unclassified", name);
                    None
                }
                Err(e) => return Err(e),
            },
        };
        cache.insert(name.to_string(), class);
        Ok(class)
    }

    pub fn calculate(
        &self,
        resolver: &mut OwnerResolver,
        group: &WorkloadGroup,
        desired_ratio: DesiredRatio,
        pod: &Pod,
        nodes: &[NodeInfo],
    ) -> Result<DistributionSnapshot, StoreError> {
        let mut class_cache = HashMap::new();

        let mut current_counts: BTreeMap<CapacityClass, u32> =
            CapacityClass::ALL.iter().map(|c| (*c, 0)).collect();
        let mut unclassified = 0;

        for p in self.group_pods(resolver, group, pod)? {
            let node_name = assigned_node(&p).unwrap_or_default();
            match self.classify_node(node_name, nodes, &mut class_cache)? {
                Some(class) => *current_counts.entry(class).or_insert(0) += 1,
                None => unclassified += 1,
            }
        }

        let total: u32 = current_counts.values().sum();
        let current_percentage = current_counts
            .iter()
            .map(|(class, count)| (*class, percentage(*count, total)))
            .collect();

        let mut node_classes = BTreeMap::new();
        let mut calculated_percentage = BTreeMap::new();
        for info in nodes {
            let class = match self.classify_node(info.name(), nodes, &mut class_cache)? {
                Some(class) => class,
                None => continue,
            };
            let projections = CapacityClass::ALL
                .iter()
                .map(|c| {
                    let count = current_counts.get(c).copied().unwrap_or(0);
                    let count = if *c == class { count + 1 } else { count };
                    (*c, percentage(count, total + 1))
                })
                .collect::<BTreeMap<_, _>>();
            node_classes.insert(info.name().to_string(), class);
            calculated_percentage.insert(info.name().to_string(), projections);
        }

        let mut snapshot = DistributionSnapshot {
            group: group.id.clone(),
            desired_ratio,
            tolerance_percent: self.args.tolerance_percent,
            current_counts,
            unclassified,
            current_percentage,
            calculated_percentage,
            node_classes,
            admitted_classes: BTreeSet::new(),
        };
        snapshot.admitted_classes = self.admitted_classes(&snapshot);

        debug!(
            "{} desired {} current {:?} unclassified {} admitted {:?}",
            snapshot.group,
            snapshot.desired_ratio,
            snapshot.current_counts,
            snapshot.unclassified,
            snapshot.admitted_classes
        );
        Ok(snapshot)
    }

    fn admitted_classes(&self, snapshot: &DistributionSnapshot) -> BTreeSet<CapacityClass> {
        // nothing placed yet, nothing to violate
        if snapshot.total_classified() == 0 {
            return CapacityClass::ALL.into_iter().collect();
        }

        let overshoot =
            |class: CapacityClass| snapshot.projected_for_class(class) - snapshot.ceiling(class);

        let admitted: BTreeSet<CapacityClass> = CapacityClass::ALL
            .into_iter()
            .filter(|c| overshoot(*c) <= 0.0)
            .collect();

        if admitted.is_empty() && self.args.relax_ceiling_when_all_classes_exceed {
            // small groups can overshoot on both sides; keep the closer one open
            return CapacityClass::ALL
                .into_iter()
                .min_by(|a, b| overshoot(*a).total_cmp(&overshoot(*b)))
                .into_iter()
                .collect();
        }
        admitted
    }
}

/// Describe a snapshot's counts as `OnDemand=7 Spot=3`.
pub fn describe_counts(snapshot: &DistributionSnapshot) -> String {
    snapshot
        .current_counts
        .iter()
        .map(|(class, count)| format!("{}={}", class, count))
        .join(" ")
}
