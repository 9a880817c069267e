use tracing::debug;

use crate::errors::{McmcTreeError, Result};

/// Default lower-tail probability of a Cauchy calibration.
pub const DEFAULT_MIN_PROB: f64 = 1e-8;
/// Default cumulative probability at the maximum age.
pub const DEFAULT_MAX_PROB: f64 = 0.975;
pub const DEFAULT_OFFSET: f64 = 0.1;
pub const DEFAULT_SCALE: f64 = 1.0;
/// Default tail probabilities of a soft-bound calibration.
pub const DEFAULT_BOUND_TAIL: f64 = 0.025;

/// Age bounds and Cauchy settings for one clade.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct CladeCalibration {
    /// Tip names whose common ancestor is calibrated.
    pub tips: Vec<String>,
    pub min_age: f64,
    pub max_age: f64,
    /// Probability that the node is younger than `min_age`.
    pub min_prob: f64,
    /// Cumulative probability at `max_age`.
    pub max_prob: f64,
    pub offset: f64,
    /// Used as given unless `estimate_scale` is set.
    pub scale: f64,
    /// Search the scale so the prior's `max_prob` quantile is `max_age`.
    pub estimate_scale: bool,
}

impl CladeCalibration {
    /// Calibration with default probabilities, offset and scale search.
    pub fn new<S: Into<String>>(tips: impl IntoIterator<Item = S>, min_age: f64, max_age: f64) -> Self {
        Self {
            tips: tips.into_iter().map(Into::into).collect(),
            min_age,
            max_age,
            min_prob: DEFAULT_MIN_PROB,
            max_prob: DEFAULT_MAX_PROB,
            offset: DEFAULT_OFFSET,
            scale: DEFAULT_SCALE,
            estimate_scale: true,
        }
    }

    pub fn with_offset(mut self, offset: f64) -> Self {
        self.offset = offset;
        self
    }

    /// Use a fixed scale instead of searching for one.
    pub fn with_fixed_scale(mut self, scale: f64) -> Self {
        self.scale = scale;
        self.estimate_scale = false;
        self
    }

    pub fn with_probs(mut self, min_prob: f64, max_prob: f64) -> Self {
        self.min_prob = min_prob;
        self.max_prob = max_prob;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if !self.min_age.is_finite() || self.min_age < 0.0 {
            return Err(McmcTreeError::InvalidParameter {
                param: "min_age",
                value: self.min_age,
            });
        }
        if !self.max_age.is_finite() || self.max_age <= self.min_age {
            return Err(McmcTreeError::InvalidParameter {
                param: "max_age",
                value: self.max_age,
            });
        }
        // anything below the floor, negatives included, is clamped later
        if self.min_prob.is_nan() || self.min_prob >= 1.0 {
            return Err(McmcTreeError::InvalidParameter {
                param: "min_prob",
                value: self.min_prob,
            });
        }
        if !(0.0..1.0).contains(&self.max_prob) {
            return Err(McmcTreeError::InvalidParameter {
                param: "max_prob",
                value: self.max_prob,
            });
        }
        if self.max_prob <= self.min_prob {
            return Err(McmcTreeError::InvalidParameter {
                param: "max_prob",
                value: self.max_prob,
            });
        }
        if !self.offset.is_finite() || self.offset <= 0.0 {
            return Err(McmcTreeError::InvalidParameter {
                param: "offset",
                value: self.offset,
            });
        }
        if !self.estimate_scale && !(self.scale.is_finite() && self.scale > 0.0) {
            return Err(McmcTreeError::InvalidParameter {
                param: "scale",
                value: self.scale,
            });
        }
        Ok(())
    }
}

/// Soft minimum and maximum bounds for one clade.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct BoundCalibration {
    pub tips: Vec<String>,
    pub min_age: f64,
    pub max_age: f64,
    /// Probability below `min_age`.
    pub min_prob: f64,
    /// Probability above `max_age`.
    pub max_prob: f64,
}

impl BoundCalibration {
    pub fn new<S: Into<String>>(tips: impl IntoIterator<Item = S>, min_age: f64, max_age: f64) -> Self {
        Self {
            tips: tips.into_iter().map(Into::into).collect(),
            min_age,
            max_age,
            min_prob: DEFAULT_BOUND_TAIL,
            max_prob: DEFAULT_BOUND_TAIL,
        }
    }
}

/// Calibrations given as parallel columns.
///
/// Every column must hold either one value, applied to all clades, or
/// exactly one value per clade. Anything else is an
/// [`McmcTreeError::InputLengthMismatch`]; columns are never recycled.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct CalibrationColumns {
    pub clades: Vec<Vec<String>>,
    pub min_age: Vec<f64>,
    pub max_age: Vec<f64>,
    pub min_prob: Vec<f64>,
    pub max_prob: Vec<f64>,
    pub offset: Vec<f64>,
    pub scale: Vec<f64>,
    pub estimate_scale: Vec<bool>,
}

impl Default for CalibrationColumns {
    fn default() -> Self {
        Self {
            clades: Vec::new(),
            min_age: Vec::new(),
            max_age: Vec::new(),
            min_prob: vec![DEFAULT_MIN_PROB],
            max_prob: vec![DEFAULT_MAX_PROB],
            offset: vec![DEFAULT_OFFSET],
            scale: vec![DEFAULT_SCALE],
            estimate_scale: vec![true],
        }
    }
}

fn expand<T: Clone>(field: &'static str, values: Vec<T>, expected: usize) -> Result<Vec<T>> {
    match values.len() {
        n if n == expected => Ok(values),
        1 => {
            debug!(field, clades = expected, "applying single value to every clade");
            Ok(vec![values[0].clone(); expected])
        }
        len => Err(McmcTreeError::InputLengthMismatch {
            field,
            len,
            expected,
        }),
    }
}

impl CalibrationColumns {
    /// Split the columns into one validated record per clade.
    pub fn into_calibrations(self) -> Result<Vec<CladeCalibration>> {
        let n = self.clades.len();
        if n == 0 {
            return Ok(Vec::new());
        }
        let min_age = expand("min_age", self.min_age, n)?;
        let max_age = expand("max_age", self.max_age, n)?;
        let min_prob = expand("min_prob", self.min_prob, n)?;
        let max_prob = expand("max_prob", self.max_prob, n)?;
        let offset = expand("offset", self.offset, n)?;
        let scale = expand("scale", self.scale, n)?;
        let estimate_scale = expand("estimate_scale", self.estimate_scale, n)?;

        let calibrations: Vec<CladeCalibration> = self
            .clades
            .into_iter()
            .enumerate()
            .map(|(i, tips)| CladeCalibration {
                tips,
                min_age: min_age[i],
                max_age: max_age[i],
                min_prob: min_prob[i],
                max_prob: max_prob[i],
                offset: offset[i],
                scale: scale[i],
                estimate_scale: estimate_scale[i],
            })
            .collect();

        for c in &calibrations {
            c.validate()?;
        }
        Ok(calibrations)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn columns() -> CalibrationColumns {
        CalibrationColumns {
            clades: vec![
                vec!["human".into(), "gorilla".into()],
                vec!["human".into(), "orangutan".into()],
            ],
            min_age: vec![0.6, 1.0],
            max_age: vec![1.2, 1.8],
            ..CalibrationColumns::default()
        }
    }

    #[test]
    fn single_values_apply_to_every_clade() {
        let cals = columns().into_calibrations().unwrap();
        assert_eq!(cals.len(), 2);
        assert_eq!(cals[1].min_age, 1.0);
        assert_eq!(cals[1].offset, DEFAULT_OFFSET);
        assert!(cals.iter().all(|c| c.estimate_scale));
    }

    #[test]
    fn partial_column_is_rejected() {
        let mut cols = columns();
        cols.clades.push(vec!["a".into(), "b".into()]);
        cols.min_age.push(2.0);
        // max_age still has two entries for three clades
        let err = cols.into_calibrations().unwrap_err();
        assert!(matches!(
            err,
            McmcTreeError::InputLengthMismatch {
                field: "max_age",
                len: 2,
                expected: 3
            }
        ));
    }

    #[test]
    fn missing_ages_are_rejected() {
        let cols = CalibrationColumns {
            clades: vec![vec!["a".into(), "b".into()]],
            ..CalibrationColumns::default()
        };
        assert!(matches!(
            cols.into_calibrations(),
            Err(McmcTreeError::InputLengthMismatch { field: "min_age", len: 0, .. })
        ));
    }

    #[test]
    fn invalid_values_are_rejected() {
        let cal = CladeCalibration::new(["a", "b"], 1.2, 0.6);
        assert!(matches!(
            cal.validate(),
            Err(McmcTreeError::InvalidParameter { param: "max_age", .. })
        ));
        let cal = CladeCalibration::new(["a", "b"], 0.6, 1.2).with_fixed_scale(0.0);
        assert!(cal.validate().is_err());
        let cal = CladeCalibration::new(["a", "b"], 0.6, 1.2).with_offset(0.0);
        assert!(cal.validate().is_err());
        let cal = CladeCalibration::new(["a", "b"], 0.6, 1.2).with_probs(0.5, 0.4);
        assert!(cal.validate().is_err());
        let cal = CladeCalibration::new(["a", "b"], 0.6, 1.2).with_probs(f64::NAN, 0.975);
        assert!(cal.validate().is_err());
        let cal = CladeCalibration::new(["a", "b"], 0.6, 1.2).with_probs(1.0, 0.975);
        assert!(cal.validate().is_err());
        let cal = CladeCalibration::new(["a", "b"], 0.6, 1.2).with_probs(0.01, -0.5);
        assert!(cal.validate().is_err());
    }

    #[test]
    fn negative_min_prob_is_accepted() {
        let cal = CladeCalibration::new(["a", "b"], 0.6, 1.2).with_probs(-1e-9, 0.975);
        assert!(cal.validate().is_ok());
    }

    #[test]
    fn builder_defaults() {
        let cal = CladeCalibration::new(["a", "b"], 0.6, 1.2);
        assert_eq!(cal.min_prob, DEFAULT_MIN_PROB);
        assert_eq!(cal.max_prob, DEFAULT_MAX_PROB);
        assert!(cal.validate().is_ok());
        let fixed = cal.with_fixed_scale(0.5);
        assert!(!fixed.estimate_scale);
        assert_eq!(fixed.scale, 0.5);
    }
}
