pub mod bound;
pub mod calibration;
pub mod cauchy;
pub mod estimate;
pub mod writer;

pub use bound::BoundPrior;
pub use calibration::{BoundCalibration, CalibrationColumns, CladeCalibration};
pub use cauchy::{
    clamp_min_prob, search_scale, upper_bound_estimate, CauchyPrior, ScaleFit, ScaleGrid,
    ScaleSearch,
};
pub use estimate::{estimate_bounds, estimate_cauchy, CauchyOptions, FittedPrior, PriorEstimate};
pub use writer::{mcmctree_label, to_mcmctree_string, write_density_table, write_mcmctree_file};

/// A node-age calibration density that MCMCTree understands.
///
/// `label` is the in-memory constraint string attached to the calibrated
/// node (`L[...]`, `B[...]`); `density` and `cdf` describe an approximation
/// of the prior on ages, used for tabulating the curve.
pub trait NodePrior: Send + Sync {
    /// Constraint label with `~`-separated parameters in square brackets.
    fn label(&self) -> String;

    fn density(&self, age: f64) -> f64;

    fn cdf(&self, age: f64) -> f64;

    /// Age range `(from, to)` that covers the bulk of the density.
    fn age_range(&self) -> (f64, f64);
}
