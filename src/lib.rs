//! Read MCMCTree divergence-time output and build calibrated input trees.
//!
//! [`mcmctree`] turns an annotated `FigTree.tre` into a dated [`Tree`] and a
//! [`NodeAgeTable`]; [`priors`] fits Cauchy soft-bound calibrations to clade
//! age bounds and writes the constraint tree MCMCTree reads.

pub mod errors;
pub mod mcmctree;
pub mod priors;
pub mod tree;

#[cfg(feature = "pyo3")]
pub mod pyo3_bindings;

pub use errors::{LookupError, McmcTreeError, Result};
pub use mcmctree::{read_mcmctree, read_mcmctree_file, McmcTreeOutput, NodeAgeTable, ReaderOptions};
pub use priors::{
    estimate_bounds, estimate_cauchy, BoundCalibration, CauchyOptions, CauchyPrior,
    CladeCalibration, NodePrior, PriorEstimate,
};
pub use tree::{parse_newick, write_newick, Tree};
