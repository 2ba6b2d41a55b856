use crate::spec::node_helpers::CapacityClass;
use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};
use std::str::FromStr;

#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum RatioError {
    #[error("expected \"<onDemand>:<spot>\", got {0:?}")]
    Format(String),
    #[error("invalid percentage {0:?}")]
    NotANumber(String),
    #[error("percentages must sum to 100, got {0}")]
    Sum(u32),
}

/// Desired share of a group's pods per capacity class. Always sums to 100.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub struct DesiredRatio {
    on_demand: u32,
    spot: u32,
}

impl DesiredRatio {
    pub fn new(on_demand: u32, spot: u32) -> Result<Self, RatioError> {
        let sum = on_demand.saturating_add(spot);
        if sum != 100 {
            return Err(RatioError::Sum(sum));
        }
        Ok(DesiredRatio { on_demand, spot })
    }

    pub fn on_demand(&self) -> u32 {
        self.on_demand
    }

    pub fn spot(&self) -> u32 {
        self.spot
    }

    pub fn percent(&self, class: CapacityClass) -> f64 {
        match class {
            CapacityClass::OnDemand => self.on_demand as f64,
            CapacityClass::Spot => self.spot as f64,
        }
    }
}

impl FromStr for DesiredRatio {
    type Err = RatioError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (on_demand, spot) = s
            .split_once(':')
            .ok_or_else(|| RatioError::Format(s.to_string()))?;

        // digits only, u32::from_str would also take a leading '+'
        let parse = |v: &str| {
            let v = v.trim();
            if v.is_empty() || !v.bytes().all(|b| b.is_ascii_digit()) {
                return Err(RatioError::NotANumber(v.to_string()));
            }
            v.parse::<u32>().map_err(|_| RatioError::NotANumber(v.to_string()))
        };

        DesiredRatio::new(parse(on_demand)?, parse(spot)?)
    }
}

impl Display for DesiredRatio {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.on_demand, self.spot)
    }
}
