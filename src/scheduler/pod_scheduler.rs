use crate::scheduler::cycle_state::CycleState;
use crate::scheduler::ondemand_spot_balancer::OndemandSpotBalancer;
use crate::scheduler::plugins::{Filter, PreFilter, Score};
use crate::scheduler::{NodeInfo, NodeScore, NodeSelection, RejectedNode, Status};
use itertools::{Either, Itertools};
use k8s_openapi::api::core::v1::Pod;
use log::debug;
use rayon::prelude::*;
use std::collections::BTreeMap;
use std::sync::Arc;

/// Runs one scheduling attempt per pod through the registered plugins.
///
/// PreFilter runs once on the calling thread. Filter and Score fan out across the candidate
/// nodes on the rayon pool, sharing the cycle state read-only.
#[derive(Default)]
pub struct PodScheduler {
    pre_filters: Vec<Arc<dyn PreFilter>>,
    filters: Vec<Arc<dyn Filter>>,
    scorers: Vec<(Arc<dyn Score>, i64)>,
}

impl PodScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_pre_filter(mut self, plugin: Arc<dyn PreFilter>) -> Self {
        self.pre_filters.push(plugin);
        self
    }

    pub fn with_filter(mut self, plugin: Arc<dyn Filter>) -> Self {
        self.filters.push(plugin);
        self
    }

    pub fn with_score(mut self, plugin: Arc<dyn Score>, weight: i64) -> Self {
        self.scorers.push((plugin, weight));
        self
    }

    /// Register the balancer at every stage it implements.
    pub fn with_balancer(self, plugin: Arc<OndemandSpotBalancer>, weight: i64) -> Self {
        self.with_pre_filter(plugin.clone())
            .with_filter(plugin.clone())
            .with_score(plugin, weight)
    }

    fn reject_all(status: &Status) -> NodeSelection {
        NodeSelection {
            selected: None,
            rejected: vec![RejectedNode {
                node_name: "*".to_string(),
                reason: status.to_string(),
            }],
            scores: BTreeMap::new(),
        }
    }

    pub fn run_pre_filter_plugins(&self, state: &mut CycleState, pod: &Pod, nodes: &[NodeInfo]) -> Status {
        for plugin in &self.pre_filters {
            let status = plugin.pre_filter(state, pod, nodes);
            if !status.is_success() {
                debug!("pre-filter {} failed: {}", plugin.name(), status);
                return status;
            }
        }
        Status::success()
    }

    /// Preemption hook: another pod is being simulated onto `node`.
    pub fn run_add_pod(&self, state: &mut CycleState, pod: &Pod, pod_to_add: &Pod, node: &NodeInfo) -> Status {
        for plugin in &self.pre_filters {
            if let Some(ext) = plugin.pre_filter_extensions() {
                let status = ext.add_pod(state, pod, pod_to_add, node);
                if !status.is_success() {
                    return status;
                }
            }
        }
        Status::success()
    }

    /// Preemption hook: a pod on `node` is being simulated away.
    pub fn run_remove_pod(&self, state: &mut CycleState, pod: &Pod, pod_to_remove: &Pod, node: &NodeInfo) -> Status {
        for plugin in &self.pre_filters {
            if let Some(ext) = plugin.pre_filter_extensions() {
                let status = ext.remove_pod(state, pod, pod_to_remove, node);
                if !status.is_success() {
                    return status;
                }
            }
        }
        Status::success()
    }

    pub fn run_filter_plugins<'a>(
        &self,
        state: &CycleState,
        pod: &Pod,
        nodes: &'a [NodeInfo],
    ) -> (Vec<&'a NodeInfo>, Vec<RejectedNode>) {
        let results: Vec<Either<&NodeInfo, RejectedNode>> = nodes
            .par_iter()
            .map(|n| {
                // apply all filters
                for filter in &self.filters {
                    let status = filter.filter(state, pod, n);
                    if !status.is_success() {
                        return Either::Right(RejectedNode {
                            node_name: n.name().to_string(),
                            reason: status.message(),
                        });
                    }
                }
                // if all filters pass, return the node
                Either::Left(n)
            })
            .collect();

        results.into_iter().partition_map(|r| r)
    }

    /// Score and normalize every node per plugin, then sum the weighted results.
    pub fn run_score_plugins(
        &self,
        state: &CycleState,
        pod: &Pod,
        nodes: &[&NodeInfo],
    ) -> Result<BTreeMap<String, i64>, Status> {
        let mut node_score_total = BTreeMap::<String, i64>::new();

        for (scorer, weight) in &self.scorers {
            let mut scored_nodes: Vec<NodeScore> = nodes
                .par_iter()
                .map(|n| {
                    scorer.score(state, pod, n).map(|score| NodeScore {
                        name: n.name().to_string(),
                        score,
                    })
                })
                .collect::<Result<Vec<_>, Status>>()?;

            if let Some(ext) = scorer.score_extensions() {
                let status = ext.normalize_score(state, pod, &mut scored_nodes);
                if !status.is_success() {
                    return Err(status);
                }
            }

            for node_score in scored_nodes {
                let total_score = node_score_total.entry(node_score.name).or_insert(0);
                *total_score += node_score.score * weight;
            }
        }
        Ok(node_score_total)
    }

    pub fn choose_node(&self, pod: &Pod, nodes: &[NodeInfo]) -> NodeSelection {
        let mut state = CycleState::new();

        let status = self.run_pre_filter_plugins(&mut state, pod, nodes);
        if !status.is_success() {
            return Self::reject_all(&status);
        }

        let state = state;
        let (filtered_nodes, rejected_nodes) = self.run_filter_plugins(&state, pod, nodes);

        if filtered_nodes.is_empty() {
            return NodeSelection {
                selected: None,
                rejected: rejected_nodes,
                scores: BTreeMap::new(),
            };
        }

        let scores = match self.run_score_plugins(&state, pod, &filtered_nodes) {
            Ok(scores) => scores,
            Err(status) => return Self::reject_all(&status),
        };

        // highest total wins, ties go to the first node by name
        let selected = scores
            .iter()
            .sorted_by(|(name1, score1), (name2, score2)| score2.cmp(score1).then(name1.cmp(name2)))
            .map(|(name, _)| name.clone())
            .next()
            .or_else(|| filtered_nodes.first().map(|n| n.name().to_string()));

        NodeSelection {
            selected,
            rejected: rejected_nodes,
            scores,
        }
    }
}
