use crate::errors::BalancerError;
use serde::{Deserialize, Serialize};
use validator::{Validate, ValidationError};

pub const DEFAULT_RATIO_ANNOTATION: &str = "spot-balancer.io/ondemand-spot-ratio";
pub const DEFAULT_CAPACITY_LABEL: &str = "karpenter.sh/capacity-type";
pub const DEFAULT_TOLERANCE_PERCENT: f64 = 5.0;

/// Arguments for the OndemandSpotBalancer plugin, as they appear under `pluginConfig.args`
/// in a scheduler configuration.
#[derive(Serialize, Deserialize, Validate, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct BalancerArgs {
    /// Annotation on the owning workload that carries `"<onDemand>:<spot>"`.
    #[validate(length(min = 1))]
    pub ratio_annotation: String,
    /// Percentage points a class may exceed its desired share before nodes of that class
    /// are filtered out.
    #[validate(range(min = 0.0, max = 100.0), custom(function = "validate_finite"))]
    pub tolerance_percent: f64,
    #[validate(nested)]
    pub capacity_class: CapacityClassConvention,
    /// When both classes would exceed their ceiling, keep the one with the smaller overshoot.
    ///
    /// On by default, which departs from a strict ceiling: a class past its ceiling is still
    /// admitted when the other class is further past its own. Turn it off to reject every
    /// class over its ceiling, at the cost of leaving some pods unschedulable.
    pub relax_ceiling_when_all_classes_exceed: bool,
}

impl Default for BalancerArgs {
    fn default() -> Self {
        BalancerArgs {
            ratio_annotation: DEFAULT_RATIO_ANNOTATION.to_string(),
            tolerance_percent: DEFAULT_TOLERANCE_PERCENT,
            capacity_class: CapacityClassConvention::default(),
            relax_ceiling_when_all_classes_exceed: true,
        }
    }
}

/// How a node advertises whether it is on-demand or spot capacity.
#[derive(Serialize, Deserialize, Validate, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct CapacityClassConvention {
    #[validate(length(min = 1))]
    pub label_key: String,
    #[validate(length(min = 1))]
    pub on_demand_values: Vec<String>,
    #[validate(length(min = 1))]
    pub spot_values: Vec<String>,
    /// Taint keys that mark a node as spot when the label is absent.
    pub spot_taint_keys: Vec<String>,
}

impl Default for CapacityClassConvention {
    fn default() -> Self {
        CapacityClassConvention {
            label_key: DEFAULT_CAPACITY_LABEL.to_string(),
            on_demand_values: vec!["on-demand".to_string()],
            spot_values: vec!["spot".to_string()],
            spot_taint_keys: vec![],
        }
    }
}

// range checks pass NaN through
fn validate_finite(value: f64) -> Result<(), ValidationError> {
    if !value.is_finite() {
        return Err(ValidationError::new("finite"));
    }
    Ok(())
}

impl BalancerArgs {
    pub fn from_yaml(yaml: &str) -> Result<Self, BalancerError> {
        let args: BalancerArgs = serde_yaml::from_str(yaml)?;
        args.validate()?;
        Ok(args)
    }

    pub fn from_json(json: &str) -> Result<Self, BalancerError> {
        let args: BalancerArgs = serde_json::from_str(json)?;
        args.validate()?;
        Ok(args)
    }
}
