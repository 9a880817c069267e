use thiserror::Error;

/// Reasons a clade cannot be resolved to a node of the reference tree.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum LookupError {
    /// A requested tip name is not a tip label of the tree.
    #[error("tip '{0}' not found in tree")]
    UnknownTip(String),
    /// No tip names were given.
    #[error("clade has no tip names")]
    EmptyClade,
    /// The names resolve to a tip rather than an internal node.
    #[error("clade {0:?} resolves to a tip, not an internal node")]
    NotInternal(Vec<String>),
    /// The common ancestor has descendants outside the requested set.
    #[error("clade {tips:?} is not monophyletic: its common ancestor (node {node}) has {extra} additional descendant tips")]
    NotMonophyletic {
        tips: Vec<String>,
        node: u32,
        extra: usize,
    },
    /// Two calibrations resolve to the same node.
    #[error("clades {first:?} and {second:?} both resolve to node {node}")]
    DuplicateCalibration {
        first: Vec<String>,
        second: Vec<String>,
        node: u32,
    },
}

/// Error types for the mcmctree crate.
#[derive(Debug, Error)]
pub enum McmcTreeError {
    /// Parallel calibration columns cannot be aligned to the clade count.
    #[error("input length mismatch for '{field}': got {len}, expected 1 or {expected}")]
    InputLengthMismatch {
        field: &'static str,
        len: usize,
        expected: usize,
    },
    /// Tree text or an annotation is malformed.
    #[error("parse error: {0}")]
    Parse(String),
    /// A clade could not be resolved against the tree.
    #[error("lookup error: {0}")]
    Lookup(#[from] LookupError),
    /// A calibration parameter is out of range.
    #[error("invalid parameter '{param}': {value}")]
    InvalidParameter { param: &'static str, value: f64 },
    /// Reading input or writing output failed.
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = core::result::Result<T, McmcTreeError>;

impl McmcTreeError {
    pub(crate) fn parse(msg: impl Into<String>) -> Self {
        Self::Parse(msg.into())
    }
}
