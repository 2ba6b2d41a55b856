use thiserror::Error;
use validator::ValidationErrors;

#[derive(Error, Debug)]
pub enum BalancerError {
    #[error("invalid plugin args: {0}")]
    InvalidArgs(#[from] ValidationErrors),
    #[error("Error: {0}")]
    SerdeYaml(#[from] serde_yaml::Error),
    #[error("Error: {0}")]
    SerdeJson(#[from] serde_json::Error),
}
