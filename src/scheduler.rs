//*
// NOTE: the plugin system is inspired by the Kubernetes scheduler plugin system.

// Copyright 2019 The Kubernetes Authors.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.
// */
pub mod cycle_state;
pub mod distribution;
pub mod ondemand_spot_balancer;
pub mod owner;
pub mod plugins;
pub mod pod_scheduler;

use crate::spec::node_helpers::node_name;
use k8s_openapi::api::core::v1::{Node, Pod};
use std::collections::BTreeMap;
use std::fmt::{Display, Formatter};
use strum_macros::Display;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum Code {
    Success,
    Unschedulable,
    Error,
}

/// Result of running a plugin stage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Status {
    pub code: Code,
    pub reasons: Vec<String>,
}

impl Status {
    pub fn success() -> Self {
        Status {
            code: Code::Success,
            reasons: vec![],
        }
    }

    pub fn unschedulable(reason: impl Into<String>) -> Self {
        Status {
            code: Code::Unschedulable,
            reasons: vec![reason.into()],
        }
    }

    pub fn error(reason: impl Into<String>) -> Self {
        Status {
            code: Code::Error,
            reasons: vec![reason.into()],
        }
    }

    pub fn is_success(&self) -> bool {
        self.code == Code::Success
    }

    pub fn message(&self) -> String {
        self.reasons.join(", ")
    }
}

impl Display for Status {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        if self.reasons.is_empty() {
            return write!(f, "{}", self.code);
        }
        write!(f, "{}: {}", self.code, self.message())
    }
}

/// A candidate node together with the pods currently assigned to it.
#[derive(Debug, Clone, Default)]
pub struct NodeInfo {
    pub node: Node,
    pub pods: Vec<Pod>,
}

impl NodeInfo {
    pub fn new(node: Node, pods: Vec<Pod>) -> Self {
        NodeInfo { node, pods }
    }

    pub fn name(&self) -> &str {
        node_name(&self.node)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeScore {
    pub name: String,
    pub score: i64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RejectedNode {
    pub node_name: String,
    pub reason: String,
}

#[derive(Debug, Clone, Default)]
pub struct NodeSelection {
    pub selected: Option<String>,
    pub rejected: Vec<RejectedNode>,
    /// Weighted sum of normalized scores for every node that passed filtering.
    pub scores: BTreeMap<String, i64>,
}
