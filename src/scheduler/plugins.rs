use crate::scheduler::cycle_state::CycleState;
use crate::scheduler::{NodeInfo, NodeScore, Status};
use itertools::Itertools;
use k8s_openapi::api::core::v1::Pod;

pub const MAX_NODE_SCORE: i64 = 100;
pub const MIN_NODE_SCORE: i64 = 0;

pub trait Plugin: Send + Sync {
    fn name(&self) -> &str;
}

/// These plugins are used to pre-process info about the Pod, or to check certain conditions that
/// the cluster or the Pod must meet. If a PreFilter plugin returns a non-success status,
/// the scheduling cycle is aborted
pub trait PreFilter: Plugin {
    fn pre_filter(&self, state: &mut CycleState, pod: &Pod, nodes: &[NodeInfo]) -> Status;

    /// Hooks used to keep pre-filter state current while preemption simulates adding or
    /// removing pods.
    fn pre_filter_extensions(&self) -> Option<&dyn PreFilterExtensions> {
        None
    }
}

pub trait PreFilterExtensions: Send + Sync {
    fn add_pod(
        &self,
        state: &mut CycleState,
        pod_to_schedule: &Pod,
        pod_to_add: &Pod,
        node: &NodeInfo,
    ) -> Status;

    fn remove_pod(
        &self,
        state: &mut CycleState,
        pod_to_schedule: &Pod,
        pod_to_remove: &Pod,
        node: &NodeInfo,
    ) -> Status;
}

/// These plugins are used to filter out nodes that cannot run the Pod. For each node, the scheduler
/// will call filter plugins in their configured order. If any filter plugin marks the node as
/// infeasible, the remaining plugins will not be called for that node.
///
/// Filter is called for many nodes at once and must only read from the cycle state.
pub trait Filter: Plugin {
    fn filter(&self, state: &CycleState, pod: &Pod, node: &NodeInfo) -> Status;
}

/// These plugins are used to rank nodes that have passed the filtering phase. The scheduler will
/// call each scoring plugin for each node. There will be a well defined range of integers
/// representing the minimum and maximum scores. After the NormalizeScore phase, the scheduler will
/// combine node scores from all plugins according to the configured plugin weights.
pub trait Score: Plugin {
    fn score(&self, state: &CycleState, pod: &Pod, node: &NodeInfo) -> Result<i64, Status>;

    fn score_extensions(&self) -> Option<&dyn ScoreExtensions> {
        None
    }
}

/// These plugins are used to modify node scores before the scheduler computes a final ranking of Nodes.
/// A plugin that registers for this extension point will be called with the Score results from the
/// same plugin.
pub trait ScoreExtensions: Send + Sync {
    fn normalize_score(&self, state: &CycleState, pod: &Pod, scores: &mut [NodeScore]) -> Status;
}

/// Rescale scores linearly onto `[MIN_NODE_SCORE, MAX_NODE_SCORE]`, highest raw score first.
///
/// When every score is equal they all get `MAX_NODE_SCORE`.
pub fn normalize_scores(scores: &mut [&mut NodeScore]) {
    if scores.is_empty() {
        return;
    }
    let (min, max) = scores
        .iter()
        .map(|s| s.score)
        .minmax()
        .into_option()
        .unwrap_or((0, 0));
    for node_score in scores.iter_mut() {
        if min == max {
            node_score.score = MAX_NODE_SCORE;
            continue;
        }
        // i128 so that extreme raw scores cannot overflow the multiplication
        let offset = (node_score.score as i128) - (min as i128);
        let range = (max as i128) - (min as i128);
        node_score.score = MIN_NODE_SCORE + (offset * (MAX_NODE_SCORE - MIN_NODE_SCORE) as i128 / range) as i64;
    }
}
