use crate::config::BalancerArgs;
use crate::errors::BalancerError;
use crate::scheduler::cycle_state::CycleState;
use crate::scheduler::distribution::{DistributionCalculator, DistributionSnapshot, describe_counts};
use crate::scheduler::owner::{GroupRef, OwnerError, OwnerResolver};
use crate::scheduler::plugins::{
    Filter, Plugin, PreFilter, PreFilterExtensions, Score, ScoreExtensions, normalize_scores,
};
use crate::scheduler::{NodeInfo, NodeScore, Status};
use crate::spec::node_helpers::{CapacityClass, capacity_class};
use crate::spec::pod_helpers::pod_key;
use crate::spec::ratio::RatioError;
use crate::state::{ObjectStore, StoreError};
use k8s_openapi::api::core::v1::Pod;
use log::{debug, info, warn};
use std::sync::Arc;
use validator::Validate;

pub const NAME: &str = "OndemandSpotBalancer";

/// Why a pod is left alone by the balancer.
#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum Exemption {
    #[error("pod has no workload group")]
    NoWorkloadGroup,
    #[error("{0} has no ratio annotation")]
    NoRatioAnnotation(GroupRef),
    #[error("{0} has a malformed ratio annotation: {1}")]
    MalformedRatio(GroupRef, RatioError),
    #[error("{0}")]
    OwnerLookup(OwnerError),
    #[error("listing pods for {0}: {1}")]
    Distribution(GroupRef, StoreError),
}

/// What PreFilter leaves in the cycle state for the rest of the attempt.
#[derive(Debug, Clone, PartialEq)]
pub enum BalancerState {
    Exempt(Exemption),
    Balanced(DistributionSnapshot),
}

/// Keeps each workload group close to the on-demand/spot ratio annotated on it.
///
/// PreFilter does all the cluster lookups and stores a [`DistributionSnapshot`]; Filter,
/// Score and NormalizeScore only read that snapshot. Groups the plugin cannot reason about
/// (no owner, no or bad annotation, failed lookups) pass through untouched.
pub struct OndemandSpotBalancer {
    store: Arc<dyn ObjectStore>,
    args: BalancerArgs,
}

impl OndemandSpotBalancer {
    pub fn new(args: BalancerArgs, store: Arc<dyn ObjectStore>) -> Result<Self, BalancerError> {
        args.validate()?;
        Ok(OndemandSpotBalancer { store, args })
    }

    /// Resolve the group and its ratio, then measure where the group runs today.
    pub fn evaluate(&self, pod: &Pod, nodes: &[NodeInfo]) -> BalancerState {
        let mut resolver = OwnerResolver::new(self.store.as_ref());

        let group = match resolver.resolve(&pod.metadata) {
            Ok(Some(group)) => group,
            Ok(None) => return BalancerState::Exempt(Exemption::NoWorkloadGroup),
            Err(e) => return BalancerState::Exempt(Exemption::OwnerLookup(e)),
        };

        let ratio = match group.desired_ratio(&self.args.ratio_annotation) {
            Ok(Some(ratio)) => ratio,
            Ok(None) => return BalancerState::Exempt(Exemption::NoRatioAnnotation(group.id)),
            Err(e) => return BalancerState::Exempt(Exemption::MalformedRatio(group.id, e)),
        };

        let calculator = DistributionCalculator::new(self.store.as_ref(), &self.args);
        match calculator.calculate(&mut resolver, &group, ratio, pod, nodes) {
            Ok(snapshot) => BalancerState::Balanced(snapshot),
            Err(e) => BalancerState::Exempt(Exemption::Distribution(group.id, e)),
        }
    }

    fn read_state<'a>(&self, state: &'a CycleState) -> Result<&'a BalancerState, Status> {
        state
            .read::<BalancerState>(NAME)
            .map_err(|e| Status::error(format!("{}: {}", NAME, e)))
    }

    fn node_class(&self, snapshot: &DistributionSnapshot, node: &NodeInfo) -> Option<CapacityClass> {
        snapshot
            .node_classes
            .get(node.name())
            .copied()
            .or_else(|| capacity_class(&node.node, &self.args.capacity_class))
    }
}

impl Plugin for OndemandSpotBalancer {
    fn name(&self) -> &str {
        NAME
    }
}

impl PreFilter for OndemandSpotBalancer {
    /// 1. find the pod's workload group
    /// 2. read the desired on-demand/spot split from its annotation
    /// 3. count where the group's pods run today
    /// 4. project the split for a placement on each candidate node
    /// 5. store the result for Filter and Score
    fn pre_filter(&self, state: &mut CycleState, pod: &Pod, nodes: &[NodeInfo]) -> Status {
        let balancer_state = self.evaluate(pod, nodes);
        match &balancer_state {
            BalancerState::Exempt(e @ (Exemption::NoWorkloadGroup | Exemption::NoRatioAnnotation(_))) => {
                debug!("not balancing pod {}: {}", pod_key(pod), e)
            }
            BalancerState::Exempt(e) => warn!("not balancing pod {}: {}", pod_key(pod), e),
            BalancerState::Balanced(snapshot) => info!(
                "balancing pod {} of {} towards {} (current {})",
                pod_key(pod),
                snapshot.group,
                snapshot.desired_ratio,
                describe_counts(snapshot)
            ),
        }

        match state.write(NAME, balancer_state) {
            Ok(()) => Status::success(),
            Err(e) => Status::error(format!("{}: {}", NAME, e)),
        }
    }

    fn pre_filter_extensions(&self) -> Option<&dyn PreFilterExtensions> {
        Some(self)
    }
}

/// The snapshot always reflects the cluster as PreFilter saw it. Preemption simulations do
/// not adjust it, so both hooks succeed without touching the state.
impl PreFilterExtensions for OndemandSpotBalancer {
    fn add_pod(&self, _: &mut CycleState, _: &Pod, _: &Pod, _: &NodeInfo) -> Status {
        Status::success()
    }

    fn remove_pod(&self, _: &mut CycleState, _: &Pod, _: &Pod, _: &NodeInfo) -> Status {
        Status::success()
    }
}

impl Filter for OndemandSpotBalancer {
    fn filter(&self, state: &CycleState, pod: &Pod, node: &NodeInfo) -> Status {
        let snapshot = match self.read_state(state) {
            Err(status) => return status,
            Ok(BalancerState::Exempt(_)) => return Status::success(),
            Ok(BalancerState::Balanced(snapshot)) => snapshot,
        };

        // no class, no opinion
        let class = match self.node_class(snapshot, node) {
            None => return Status::success(),
            Some(class) => class,
        };

        if snapshot.admits(class) {
            return Status::success();
        }

        let reason = format!(
            "placing pod on {} node would raise {} share to {:.2}% (desired {}% + {}% tolerance)",
            class,
            class,
            snapshot.projected(node.name(), class),
            snapshot.desired_ratio.percent(class),
            snapshot.tolerance_percent
        );
        debug!("rejecting node {} for pod {}: {}", node.name(), pod_key(pod), reason);
        Status::unschedulable(reason)
    }
}

impl Score for OndemandSpotBalancer {
    /// score = desired % - projected % for the node's class, in hundredths of a point
    fn score(&self, state: &CycleState, _: &Pod, node: &NodeInfo) -> Result<i64, Status> {
        let snapshot = match self.read_state(state)? {
            BalancerState::Exempt(_) => return Ok(0),
            BalancerState::Balanced(snapshot) => snapshot,
        };

        Ok(self
            .node_class(snapshot, node)
            .map(|class| snapshot.raw_score(node.name(), class))
            .unwrap_or(0))
    }

    fn score_extensions(&self) -> Option<&dyn ScoreExtensions> {
        Some(self)
    }
}

impl ScoreExtensions for OndemandSpotBalancer {
    /// Rescale every node onto `[0, MAX_NODE_SCORE]` in one pass, so the ranking follows the
    /// raw scores. Nodes without a class score a raw 0 (on target) and land in order with the
    /// rest; an exempt pod scores 0 everywhere and so gets a flat `MAX_NODE_SCORE`.
    fn normalize_score(&self, state: &CycleState, _: &Pod, scores: &mut [NodeScore]) -> Status {
        if let Err(status) = self.read_state(state) {
            return status;
        }
        normalize_scores(&mut scores.iter_mut().collect::<Vec<_>>());
        Status::success()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scheduler::Code;
    use crate::scheduler::owner::GroupKind;
    use crate::scheduler::plugins::MAX_NODE_SCORE;
    use crate::state::ClusterState;
    use crate::test_helpers::objects::{
        bound_pod, daemon_set_ref, deployment, deployment_ref, init_logger, node, node_info, pod,
        replica_set, replica_set_ref,
    };
    use itertools::Itertools;
    use k8s_openapi::api::apps::v1::{Deployment, ReplicaSet, StatefulSet};
    use k8s_openapi::api::core::v1::Node;

    struct Unreachable {}

    impl ObjectStore for Unreachable {
        fn get_node(&self, _: &str) -> Result<Node, StoreError> {
            Err(StoreError::Unavailable("connection refused".to_string()))
        }
        fn list_pods(&self, _: &str) -> Result<Vec<Pod>, StoreError> {
            Err(StoreError::Unavailable("connection refused".to_string()))
        }
        fn get_replica_set(&self, _: &str, _: &str) -> Result<ReplicaSet, StoreError> {
            Err(StoreError::Unavailable("connection refused".to_string()))
        }
        fn get_deployment(&self, _: &str, _: &str) -> Result<Deployment, StoreError> {
            Err(StoreError::Unavailable("connection refused".to_string()))
        }
        fn get_stateful_set(&self, _: &str, _: &str) -> Result<StatefulSet, StoreError> {
            Err(StoreError::Unavailable("connection refused".to_string()))
        }
    }

    fn cluster(ratio: Option<&str>, on_demand: usize, spot: usize) -> ClusterState {
        let mut state = ClusterState::new()
            .with_node(node("od-1", Some("on-demand")))
            .with_node(node("spot-1", Some("spot")))
            .with_node(node("mystery", None))
            .with_deployment(deployment("web", ratio))
            .with_replica_set(replica_set("web-abc", Some(deployment_ref("web"))));
        for i in 0..on_demand {
            state.add_pod(bound_pod(&format!("web-od-{}", i), &[replica_set_ref("web-abc")], "od-1"));
        }
        for i in 0..spot {
            state.add_pod(bound_pod(&format!("web-spot-{}", i), &[replica_set_ref("web-abc")], "spot-1"));
        }
        state
    }

    fn plugin(state: ClusterState, args: BalancerArgs) -> OndemandSpotBalancer {
        OndemandSpotBalancer::new(args, Arc::new(state)).unwrap()
    }

    fn candidates() -> Vec<NodeInfo> {
        vec![
            node_info(node("od-1", Some("on-demand"))),
            node_info(node("spot-1", Some("spot"))),
            node_info(node("mystery", None)),
        ]
    }

    fn new_pod() -> Pod {
        pod("web-new", &[replica_set_ref("web-abc")])
    }

    fn pre_filtered(balancer: &OndemandSpotBalancer) -> CycleState {
        let mut state = CycleState::new();
        let status = balancer.pre_filter(&mut state, &new_pod(), &candidates());
        assert_eq!(status, Status::success());
        state
    }

    fn scores(balancer: &OndemandSpotBalancer, state: &CycleState, names: &[&str]) -> Vec<NodeScore> {
        let nodes = candidates();
        let mut scores: Vec<NodeScore> = names
            .iter()
            .map(|name| {
                let n = nodes.iter().find(|n| n.name() == *name).unwrap();
                NodeScore {
                    name: name.to_string(),
                    score: balancer.score(state, &new_pod(), n).unwrap(),
                }
            })
            .collect();
        let status = balancer.normalize_score(state, &new_pod(), &mut scores);
        assert!(status.is_success());
        scores
    }

    #[test]
    fn should_reject_node_that_breaks_the_ceiling() {
        init_logger();
        let balancer = plugin(cluster(Some("50:50"), 9, 1), BalancerArgs::default());
        let state = pre_filtered(&balancer);
        let nodes = candidates();

        let status = balancer.filter(&state, &new_pod(), &nodes[0]);
        assert_eq!(status.code, Code::Unschedulable);
        assert_eq!(
            status.message(),
            "placing pod on OnDemand node would raise OnDemand share to 90.91% (desired 50% + 5% tolerance)"
        );
        assert!(balancer.filter(&state, &new_pod(), &nodes[1]).is_success());
        assert!(balancer.filter(&state, &new_pod(), &nodes[2]).is_success());
    }

    #[test]
    fn should_prefer_under_represented_class() {
        let args = BalancerArgs {
            tolerance_percent: 10.0,
            ..Default::default()
        };
        let balancer = plugin(cluster(Some("70:30"), 7, 3), args);
        let state = pre_filtered(&balancer);
        let nodes = candidates();

        assert!(balancer.filter(&state, &new_pod(), &nodes[0]).is_success());
        assert!(balancer.filter(&state, &new_pod(), &nodes[1]).is_success());
        assert_eq!(balancer.score(&state, &new_pod(), &nodes[0]), Ok(-273));
        assert_eq!(balancer.score(&state, &new_pod(), &nodes[1]), Ok(-636));

        let normalized = scores(&balancer, &state, &["od-1", "spot-1", "mystery"]);
        assert_eq!(normalized[0].score, 57);
        assert_eq!(normalized[1].score, 0);
        assert_eq!(normalized[2].score, 100);
    }

    #[test]
    fn should_keep_raw_order_with_unclassified_nodes() {
        let names = ["od-1", "spot-1", "mystery"];
        for (ratio, on_demand, spot) in [("70:30", 7, 3), ("50:50", 9, 1), ("20:80", 1, 4), ("70:30", 0, 0)] {
            let args = BalancerArgs {
                tolerance_percent: 100.0,
                ..Default::default()
            };
            let balancer = plugin(cluster(Some(ratio), on_demand, spot), args);
            let state = pre_filtered(&balancer);
            let nodes = candidates();

            let raw: Vec<i64> = nodes
                .iter()
                .map(|n| balancer.score(&state, &new_pod(), n).unwrap())
                .collect();
            let normalized = scores(&balancer, &state, &names);

            for (i, j) in (0..names.len()).tuple_combinations() {
                if raw[i] > raw[j] {
                    assert!(normalized[i].score >= normalized[j].score, "{} {:?} {:?}", ratio, raw, normalized);
                } else if raw[i] < raw[j] {
                    assert!(normalized[i].score <= normalized[j].score, "{} {:?} {:?}", ratio, raw, normalized);
                }
            }
        }
    }

    #[test]
    fn should_score_nodes_unseen_by_pre_filter_in_order() {
        let balancer = plugin(cluster(Some("50:50"), 9, 1), BalancerArgs::default());
        let state = pre_filtered(&balancer);
        let late = node_info(node("spot-2", Some("spot")));

        let raw = balancer.score(&state, &new_pod(), &late).unwrap();
        assert_eq!(raw, 3182);

        let mut list = vec![
            NodeScore {
                name: "spot-2".to_string(),
                score: raw,
            },
            NodeScore {
                name: "mystery".to_string(),
                score: 0,
            },
        ];
        assert!(balancer.normalize_score(&state, &new_pod(), &mut list).is_success());
        assert_eq!(list[0].score, MAX_NODE_SCORE);
        assert_eq!(list[1].score, 0);
    }

    #[test]
    fn should_pass_through_exempt_pods() {
        let balancer = plugin(cluster(None, 9, 1), BalancerArgs::default());
        let state = pre_filtered(&balancer);

        assert_eq!(
            state.read::<BalancerState>(NAME).unwrap(),
            &BalancerState::Exempt(Exemption::NoRatioAnnotation(GroupRef {
                kind: GroupKind::Deployment,
                namespace: "default".to_string(),
                name: "web".to_string(),
            }))
        );
        for n in &candidates() {
            assert!(balancer.filter(&state, &new_pod(), n).is_success());
            assert_eq!(balancer.score(&state, &new_pod(), n), Ok(0));
        }
        let normalized = scores(&balancer, &state, &["od-1", "spot-1", "mystery"]);
        assert!(normalized.iter().all(|s| s.score == MAX_NODE_SCORE));
    }

    #[test]
    fn should_exempt_malformed_and_unowned() {
        let balancer = plugin(cluster(Some("80:30"), 9, 1), BalancerArgs::default());
        assert!(matches!(
            balancer.evaluate(&new_pod(), &candidates()),
            BalancerState::Exempt(Exemption::MalformedRatio(_, RatioError::Sum(110)))
        ));
        assert_eq!(
            balancer.evaluate(&pod("agent", &[daemon_set_ref("agent")]), &candidates()),
            BalancerState::Exempt(Exemption::NoWorkloadGroup)
        );
    }

    #[test]
    fn should_exempt_when_store_is_unreachable() {
        let balancer = OndemandSpotBalancer::new(BalancerArgs::default(), Arc::new(Unreachable {})).unwrap();
        let state = pre_filtered(&balancer);

        assert!(matches!(
            state.read::<BalancerState>(NAME).unwrap(),
            BalancerState::Exempt(Exemption::OwnerLookup(_))
        ));
        assert!(balancer.filter(&state, &new_pod(), &candidates()[0]).is_success());
    }

    #[test]
    fn should_error_without_pre_filter_state() {
        let balancer = plugin(cluster(Some("50:50"), 1, 1), BalancerArgs::default());
        let state = CycleState::new();

        let status = balancer.filter(&state, &new_pod(), &candidates()[0]);
        assert_eq!(status.code, Code::Error);
        assert!(balancer.score(&state, &new_pod(), &candidates()[0]).is_err());
    }

    #[test]
    fn should_not_pre_filter_twice_in_one_cycle() {
        let balancer = plugin(cluster(Some("50:50"), 1, 1), BalancerArgs::default());
        let mut state = pre_filtered(&balancer);

        let status = balancer.pre_filter(&mut state, &new_pod(), &candidates());
        assert_eq!(status.code, Code::Error);
    }

    #[test]
    fn should_leave_state_alone_on_preemption_hooks() {
        let balancer = plugin(cluster(Some("50:50"), 9, 1), BalancerArgs::default());
        let mut state = pre_filtered(&balancer);
        let before = state.read::<BalancerState>(NAME).unwrap().clone();
        let nodes = candidates();
        let ext = balancer.pre_filter_extensions().unwrap();

        let victim = bound_pod("web-od-0", &[replica_set_ref("web-abc")], "od-1");
        assert!(ext.remove_pod(&mut state, &new_pod(), &victim, &nodes[0]).is_success());
        assert!(ext.add_pod(&mut state, &new_pod(), &victim, &nodes[1]).is_success());
        assert_eq!(state.read::<BalancerState>(NAME).unwrap(), &before);
    }

    #[test]
    fn should_reject_invalid_args() {
        let args = BalancerArgs {
            tolerance_percent: -1.0,
            ..Default::default()
        };
        assert!(matches!(
            OndemandSpotBalancer::new(args, Arc::new(ClusterState::new())),
            Err(BalancerError::InvalidArgs(_))
        ));
    }
}
