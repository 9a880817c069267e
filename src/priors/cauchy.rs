use core::f64::consts::PI;

#[cfg(feature = "rayon")]
use rayon::prelude::*;
use tracing::{debug, warn};

use crate::errors::{McmcTreeError, Result};
use crate::tree::format_number;

use super::NodePrior;

/// Lower-tail probabilities below this are replaced by [`MIN_PROB_CLAMP`].
pub const MIN_PROB_FLOOR: f64 = 1e-7;
/// Substitute for negligible lower-tail probabilities.
pub const MIN_PROB_CLAMP: f64 = 1e-300;

/// Replace a negligible lower-tail probability with [`MIN_PROB_CLAMP`].
pub fn clamp_min_prob(min_prob: f64) -> f64 {
    if min_prob < MIN_PROB_FLOOR {
        debug!(min_prob, clamped = MIN_PROB_CLAMP, "clamping lower-tail probability");
        MIN_PROB_CLAMP
    } else {
        min_prob
    }
}

/// Age implied for the `max_prob` quantile of a Cauchy soft-bound prior.
///
/// `min_prob` is used as given; clamp it with [`clamp_min_prob`] first.
/// For fixed `offset`, `min_prob` and `max_prob` this is strictly
/// increasing in `scale`.
pub fn upper_bound_estimate(
    min_age: f64,
    offset: f64,
    scale: f64,
    min_prob: f64,
    max_prob: f64,
) -> f64 {
    let right_mass = 0.5 + (offset / scale).atan() / PI;
    let angle = PI * right_mass * (1.0 - max_prob) / (1.0 - min_prob);
    min_age + offset + scale / angle.tan()
}

/// MCMCTree's `L(tL, p, c, pL)` calibration: a Cauchy density truncated
/// at the minimum age `location`, centred at `location + offset`, with a
/// soft lower bound leaving `min_prob` below the minimum.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct CauchyPrior {
    pub location: f64,
    pub offset: f64,
    pub scale: f64,
    pub min_prob: f64,
}

impl CauchyPrior {
    /// Validate and build a prior. `min_prob` below [`MIN_PROB_FLOOR`],
    /// zero and negatives included, is clamped.
    pub fn new(location: f64, offset: f64, scale: f64, min_prob: f64) -> Result<Self> {
        if !location.is_finite() || location < 0.0 {
            return Err(McmcTreeError::InvalidParameter {
                param: "min_age",
                value: location,
            });
        }
        if !offset.is_finite() || offset <= 0.0 {
            return Err(McmcTreeError::InvalidParameter {
                param: "offset",
                value: offset,
            });
        }
        if !scale.is_finite() || scale <= 0.0 {
            return Err(McmcTreeError::InvalidParameter {
                param: "scale",
                value: scale,
            });
        }
        if min_prob.is_nan() || min_prob >= 1.0 {
            return Err(McmcTreeError::InvalidParameter {
                param: "min_prob",
                value: min_prob,
            });
        }
        Ok(Self {
            location,
            offset,
            scale,
            min_prob: clamp_min_prob(min_prob),
        })
    }

    /// Age below which `max_prob` of the prior mass lies.
    pub fn implied_upper(&self, max_prob: f64) -> f64 {
        upper_bound_estimate(self.location, self.offset, self.scale, self.min_prob, max_prob)
    }

    /// Cauchy mass above the minimum age before truncation.
    fn right_mass(&self) -> f64 {
        0.5 + (self.offset / self.scale).atan() / PI
    }

    fn cauchy_cdf(&self, age: f64) -> f64 {
        0.5 + ((age - self.location - self.offset) / self.scale).atan() / PI
    }

    fn right_density(&self, age: f64) -> f64 {
        let z = (age - self.location - self.offset) / self.scale;
        (1.0 - self.min_prob) / (PI * self.scale * (1.0 + z * z)) / self.right_mass()
    }

    /// Exponent of the power-law left tail that carries `min_prob` and
    /// meets the truncated Cauchy continuously at the minimum age.
    fn left_exponent(&self) -> f64 {
        self.right_density(self.location) * self.location / self.min_prob
    }
}

impl NodePrior for CauchyPrior {
    fn label(&self) -> String {
        format!(
            "L[{}~{}~{}~{}]",
            format_number(self.location),
            format_number(self.offset),
            format_number(self.scale),
            format_number(self.min_prob)
        )
    }

    /// Approximate density: the truncated Cauchy above the minimum age and a
    /// power-law tail below it. MCMCTree's internal density differs in the
    /// left tail.
    fn density(&self, age: f64) -> f64 {
        if age <= 0.0 {
            return 0.0;
        }
        if age >= self.location {
            return self.right_density(age);
        }
        let theta = self.left_exponent();
        self.right_density(self.location) * (age / self.location).powf(theta - 1.0)
    }

    fn cdf(&self, age: f64) -> f64 {
        if age <= 0.0 {
            return 0.0;
        }
        if age < self.location {
            return self.min_prob * (age / self.location).powf(self.left_exponent());
        }
        let above = (self.cauchy_cdf(age) - self.cauchy_cdf(self.location)) / self.right_mass();
        self.min_prob + (1.0 - self.min_prob) * above
    }

    fn age_range(&self) -> (f64, f64) {
        (0.0, 1.1 * self.implied_upper(0.99))
    }
}

/// Candidate scales `start, start + step, ..., end`.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ScaleGrid {
    pub start: f64,
    pub end: f64,
    pub step: f64,
}

impl Default for ScaleGrid {
    fn default() -> Self {
        Self {
            start: 0.001,
            end: 10.0,
            step: 0.001,
        }
    }
}

impl ScaleGrid {
    pub fn len(&self) -> usize {
        ((self.end - self.start) / self.step).round() as usize + 1
    }

    pub fn is_empty(&self) -> bool {
        self.end < self.start
    }

    /// The `k`-th candidate, computed without accumulating rounding error.
    pub fn value(&self, k: usize) -> f64 {
        self.start + k as f64 * self.step
    }

    fn validate(&self) -> Result<()> {
        if !(self.start > 0.0 && self.start.is_finite()) {
            return Err(McmcTreeError::InvalidParameter {
                param: "grid.start",
                value: self.start,
            });
        }
        if !(self.step > 0.0 && self.step.is_finite()) {
            return Err(McmcTreeError::InvalidParameter {
                param: "grid.step",
                value: self.step,
            });
        }
        if !(self.end >= self.start && self.end.is_finite()) {
            return Err(McmcTreeError::InvalidParameter {
                param: "grid.end",
                value: self.end,
            });
        }
        Ok(())
    }
}

/// How the scale is searched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum ScaleSearch {
    /// Best grid candidate; ties go to the smallest scale.
    Grid,
    /// Best grid candidate, then bisection between its grid neighbours.
    #[default]
    GridRefined,
}

/// Outcome of a scale search.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ScaleFit {
    pub scale: f64,
    /// Upper-bound age implied by `scale`.
    pub implied_upper: f64,
    /// Index of the best grid candidate.
    pub grid_index: usize,
    /// The best grid candidate is the first or last one, so the target
    /// may lie outside what the grid can express.
    pub at_boundary: bool,
}

const BISECTION_ITERATIONS: usize = 100;

/// Find the scale whose implied `max_prob` quantile is closest to
/// `max_age`, with `offset` held fixed.
///
/// `min_prob` is clamped before use.
pub fn search_scale(
    min_age: f64,
    max_age: f64,
    offset: f64,
    min_prob: f64,
    max_prob: f64,
    grid: &ScaleGrid,
    search: ScaleSearch,
) -> Result<ScaleFit> {
    grid.validate()?;
    let min_prob = clamp_min_prob(min_prob);
    let upper = |scale: f64| upper_bound_estimate(min_age, offset, scale, min_prob, max_prob);
    let distance = |scale: f64| {
        let d = (upper(scale) - max_age).abs();
        if d.is_nan() {
            f64::INFINITY
        } else {
            d
        }
    };

    let (best, _) = grid_minimizer(grid, distance);
    let last = grid.len() - 1;
    let at_boundary = last > 0 && (best == 0 || best == last);
    let mut scale = grid.value(best);

    if search == ScaleSearch::GridRefined {
        let lo = grid.value(best.saturating_sub(1));
        let hi = grid.value((best + 1).min(last));
        if let Some(root) = bisect(|s| upper(s) - max_age, lo, hi) {
            scale = root;
        }
    }

    if at_boundary {
        warn!(
            min_age,
            max_age,
            offset,
            scale,
            "best scale lies on the edge of the search grid; the maximum age may be unreachable"
        );
    }

    let fit = ScaleFit {
        scale,
        implied_upper: upper(scale),
        grid_index: best,
        at_boundary,
    };
    debug!(
        min_age,
        max_age,
        scale = fit.scale,
        implied_upper = fit.implied_upper,
        "fitted Cauchy scale"
    );
    Ok(fit)
}

fn pick_closer(a: (usize, f64), b: (usize, f64)) -> (usize, f64) {
    if b.1 < a.1 || (b.1 == a.1 && b.0 < a.0) {
        b
    } else {
        a
    }
}

#[cfg(feature = "rayon")]
fn grid_minimizer<F: Fn(f64) -> f64 + Sync>(grid: &ScaleGrid, distance: F) -> (usize, f64) {
    (0..grid.len())
        .into_par_iter()
        .map(|k| (k, distance(grid.value(k))))
        .reduce(|| (usize::MAX, f64::INFINITY), pick_closer)
}

#[cfg(not(feature = "rayon"))]
fn grid_minimizer<F: Fn(f64) -> f64>(grid: &ScaleGrid, distance: F) -> (usize, f64) {
    (0..grid.len())
        .map(|k| (k, distance(grid.value(k))))
        .fold((usize::MAX, f64::INFINITY), pick_closer)
}

/// Root of an increasing function inside `[lo, hi]`, if it is bracketed.
fn bisect<F: Fn(f64) -> f64>(f: F, mut lo: f64, mut hi: f64) -> Option<f64> {
    let (f_lo, f_hi) = (f(lo), f(hi));
    if !(f_lo <= 0.0 && f_hi >= 0.0) {
        return None;
    }
    for _ in 0..BISECTION_ITERATIONS {
        let mid = 0.5 * (lo + hi);
        if mid <= lo || mid >= hi {
            break;
        }
        if f(mid) < 0.0 {
            lo = mid;
        } else {
            hi = mid;
        }
    }
    Some(0.5 * (lo + hi))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clamps_small_min_prob() {
        assert_eq!(clamp_min_prob(1e-8), MIN_PROB_CLAMP);
        assert_eq!(clamp_min_prob(0.0), MIN_PROB_CLAMP);
        assert_eq!(clamp_min_prob(-0.3), MIN_PROB_CLAMP);
        assert_eq!(clamp_min_prob(0.025), 0.025);
    }

    #[test]
    fn upper_bound_increases_with_scale() {
        let mut prev = f64::NEG_INFINITY;
        for k in 1..200 {
            let s = k as f64 * 0.05;
            let u = upper_bound_estimate(0.6, 0.1, s, MIN_PROB_CLAMP, 0.975);
            assert!(u > prev, "not increasing at scale {}", s);
            prev = u;
        }
    }

    #[test]
    fn grid_search_picks_nearest_candidate() {
        let fit = search_scale(0.6, 1.2, 0.1, 1e-8, 0.975, &ScaleGrid::default(), ScaleSearch::Grid)
            .unwrap();
        assert_eq!(fit.grid_index, 34);
        assert!((fit.scale - 0.035).abs() < 1e-12);
        assert!(!fit.at_boundary);
        // neighbours are no closer
        for s in [0.034, 0.036] {
            let u = upper_bound_estimate(0.6, 0.1, s, MIN_PROB_CLAMP, 0.975);
            assert!((u - 1.2).abs() >= (fit.implied_upper - 1.2).abs());
        }
    }

    #[test]
    fn refined_search_hits_target() {
        let fit = search_scale(
            0.6,
            1.2,
            0.1,
            1e-8,
            0.975,
            &ScaleGrid::default(),
            ScaleSearch::GridRefined,
        )
        .unwrap();
        assert!((fit.implied_upper - 1.2).abs() < 1e-9);
        assert!(fit.scale > 0.034 && fit.scale < 0.036);
    }

    #[test]
    fn unreachable_target_hits_boundary() {
        // max age below minimum + offset cannot be reached by any scale
        let fit = search_scale(0.6, 0.65, 0.1, 1e-8, 0.975, &ScaleGrid::default(), ScaleSearch::GridRefined)
            .unwrap();
        assert_eq!(fit.grid_index, 0);
        assert!(fit.at_boundary);
        assert_eq!(fit.scale, 0.001);
    }

    #[test]
    fn ties_break_towards_smallest_scale() {
        assert_eq!(pick_closer((3, 1.0), (1, 1.0)), (1, 1.0));
        assert_eq!(pick_closer((1, 1.0), (3, 1.0)), (1, 1.0));
        assert_eq!(pick_closer((1, 2.0), (3, 1.0)), (3, 1.0));
    }

    #[test]
    fn invalid_grid_is_rejected() {
        let grid = ScaleGrid {
            start: 0.0,
            ..ScaleGrid::default()
        };
        assert!(search_scale(0.6, 1.2, 0.1, 1e-8, 0.975, &grid, ScaleSearch::Grid).is_err());
    }

    #[test]
    fn prior_validation() {
        assert!(CauchyPrior::new(0.6, 0.1, 0.0, 1e-8).is_err());
        assert!(CauchyPrior::new(0.6, -0.1, 1.0, 1e-8).is_err());
        assert!(CauchyPrior::new(-0.6, 0.1, 1.0, 1e-8).is_err());
        assert!(CauchyPrior::new(0.6, 0.1, 1.0, 1.0).is_err());
        assert!(CauchyPrior::new(0.6, 0.1, 1.0, f64::NAN).is_err());
        let p = CauchyPrior::new(0.6, 0.1, 1.0, 1e-8).unwrap();
        assert_eq!(p.min_prob, MIN_PROB_CLAMP);
        let p = CauchyPrior::new(0.6, 0.1, 1.0, -1e-9).unwrap();
        assert_eq!(p.min_prob, MIN_PROB_CLAMP);
    }

    #[test]
    fn label_format() {
        let p = CauchyPrior::new(0.6, 0.1, 0.035, 1e-8).unwrap();
        assert_eq!(p.label(), "L[0.6~0.1~0.035~1e-300]");
    }

    #[test]
    fn cdf_matches_implied_upper() {
        let p = CauchyPrior::new(0.6, 0.1, 0.5, 0.025).unwrap();
        let upper = p.implied_upper(0.975);
        assert!((p.cdf(upper) - 0.975).abs() < 1e-9);
        assert!((p.cdf(0.6) - 0.025).abs() < 1e-12);
        assert_eq!(p.cdf(0.0), 0.0);
    }

    #[test]
    fn density_is_continuous_at_minimum() {
        let p = CauchyPrior::new(0.6, 0.1, 0.5, 0.025).unwrap();
        let left = p.density(0.6 - 1e-9);
        let right = p.density(0.6);
        assert!((left - right).abs() / right < 1e-6);
        assert_eq!(p.density(-1.0), 0.0);
    }

    #[test]
    fn density_integrates_to_one() {
        let p = CauchyPrior::new(0.6, 0.1, 0.2, 0.025).unwrap();
        // trapezoid over (0, 2000]; the Cauchy tail beyond is ~1e-4
        let n = 2_000_000;
        let h = 2000.0 / n as f64;
        let mut total = 0.0;
        for i in 0..n {
            let a = i as f64 * h;
            total += 0.5 * h * (p.density(a) + p.density(a + h));
        }
        assert!((total - 1.0).abs() < 1e-3, "total = {}", total);
    }
}
