use crate::errors::{McmcTreeError, Result};
use crate::tree::format_number;

use super::NodePrior;

/// MCMCTree's `B(tL, tU, pL, pU)` soft bounds: uniform between the minimum
/// and maximum age, with `min_prob` of the mass below `tL` and `max_prob`
/// above `tU`.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct BoundPrior {
    pub min_age: f64,
    pub max_age: f64,
    /// Probability that the age is below `min_age`.
    pub min_prob: f64,
    /// Probability that the age is above `max_age`.
    pub max_prob: f64,
}

impl BoundPrior {
    pub fn new(min_age: f64, max_age: f64, min_prob: f64, max_prob: f64) -> Result<Self> {
        if !min_age.is_finite() || min_age <= 0.0 {
            return Err(McmcTreeError::InvalidParameter {
                param: "min_age",
                value: min_age,
            });
        }
        if !max_age.is_finite() || max_age <= min_age {
            return Err(McmcTreeError::InvalidParameter {
                param: "max_age",
                value: max_age,
            });
        }
        for (param, value) in [("min_prob", min_prob), ("max_prob", max_prob)] {
            if !(value > 0.0 && value < 1.0) {
                return Err(McmcTreeError::InvalidParameter { param, value });
            }
        }
        if min_prob + max_prob >= 1.0 {
            return Err(McmcTreeError::InvalidParameter {
                param: "max_prob",
                value: max_prob,
            });
        }
        Ok(Self {
            min_age,
            max_age,
            min_prob,
            max_prob,
        })
    }

    fn plateau(&self) -> f64 {
        (1.0 - self.min_prob - self.max_prob) / (self.max_age - self.min_age)
    }

    /// Power-law exponent of the left tail.
    fn left_exponent(&self) -> f64 {
        self.plateau() * self.min_age / self.min_prob
    }

    /// Rate of the exponential right tail.
    fn right_rate(&self) -> f64 {
        self.plateau() / self.max_prob
    }
}

impl NodePrior for BoundPrior {
    fn label(&self) -> String {
        format!(
            "B[{}~{}~{}~{}]",
            format_number(self.min_age),
            format_number(self.max_age),
            format_number(self.min_prob),
            format_number(self.max_prob)
        )
    }

    fn density(&self, age: f64) -> f64 {
        let c = self.plateau();
        if age <= 0.0 {
            0.0
        } else if age < self.min_age {
            c * (age / self.min_age).powf(self.left_exponent() - 1.0)
        } else if age <= self.max_age {
            c
        } else {
            c * (-self.right_rate() * (age - self.max_age)).exp()
        }
    }

    fn cdf(&self, age: f64) -> f64 {
        if age <= 0.0 {
            0.0
        } else if age < self.min_age {
            self.min_prob * (age / self.min_age).powf(self.left_exponent())
        } else if age <= self.max_age {
            self.min_prob + self.plateau() * (age - self.min_age)
        } else {
            1.0 - self.max_prob * (-self.right_rate() * (age - self.max_age)).exp()
        }
    }

    fn age_range(&self) -> (f64, f64) {
        (0.0, self.max_age + (self.max_age - self.min_age))
    }
}
