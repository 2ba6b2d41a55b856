pub mod config;
pub mod errors;
pub mod scheduler;
pub mod spec;
pub mod state;
pub mod util;

#[cfg(test)]
mod test_helpers;

pub use config::BalancerArgs;
pub use errors::BalancerError;
pub use scheduler::ondemand_spot_balancer::{BalancerState, Exemption, NAME, OndemandSpotBalancer};
pub use scheduler::pod_scheduler::PodScheduler;
pub use scheduler::{Code, NodeInfo, NodeScore, NodeSelection, RejectedNode, Status};
pub use spec::node_helpers::CapacityClass;
pub use spec::ratio::DesiredRatio;
pub use state::{ClusterState, ObjectStore, StoreError};
