// PyO3 bindings, behind the `pyo3` feature flag.
// Exposes the MCMCTree output reader and the Cauchy prior estimator; trees
// cross the boundary as Newick strings, tables as dicts of columns.

#[cfg(feature = "pyo3")]
use pyo3::prelude::*;
#[cfg(feature = "pyo3")]
use pyo3::types::PyDict;

#[cfg(feature = "pyo3")]
use crate::errors::McmcTreeError;
#[cfg(feature = "pyo3")]
use crate::mcmctree::{parse_figtree, read_mcmctree, ReaderOptions};
#[cfg(feature = "pyo3")]
use crate::priors::{CalibrationColumns, CauchyOptions, ScaleSearch};
#[cfg(feature = "pyo3")]
use crate::tree::{parse_newick, write_newick, NewickWriteOptions};

#[cfg(feature = "pyo3")]
fn to_py_err(err: McmcTreeError) -> PyErr {
    match err {
        McmcTreeError::Io(e) => PyErr::new::<pyo3::exceptions::PyIOError, _>(e.to_string()),
        McmcTreeError::Lookup(e) => PyErr::new::<pyo3::exceptions::PyKeyError, _>(e.to_string()),
        other => PyErr::new::<pyo3::exceptions::PyValueError, _>(other.to_string()),
    }
}

/// Read MCMCTree output. `text` is either a whole FigTree.tre file or a
/// single annotated tree.
/// Returns a dict with keys: tree, node, mean, lower, upper.
#[cfg(feature = "pyo3")]
#[pyfunction]
#[pyo3(signature = (text, force_ultrametric=true, tree_field=3))]
fn read_output(
    py: Python<'_>,
    text: &str,
    force_ultrametric: bool,
    tree_field: usize,
) -> PyResult<Py<PyDict>> {
    let options = ReaderOptions {
        force_ultrametric,
        tree_field,
    };
    let out = if text.trim_start().starts_with('(') {
        read_mcmctree(text, &options)
    } else {
        parse_figtree(text, &options)
    }
    .map_err(to_py_err)?;

    let rows = out.node_ages.rows();
    let dict = PyDict::new(py);
    dict.set_item("tree", write_newick(&out.tree, &NewickWriteOptions::default()))?;
    dict.set_item("node", rows.iter().map(|r| r.node).collect::<Vec<_>>())?;
    dict.set_item("mean", rows.iter().map(|r| r.mean).collect::<Vec<_>>())?;
    dict.set_item("lower", rows.iter().map(|r| r.lower).collect::<Vec<_>>())?;
    dict.set_item("upper", rows.iter().map(|r| r.upper).collect::<Vec<_>>())?;
    Ok(dict.into())
}

/// Fit Cauchy calibrations and return the MCMCTree tree file contents.
/// Scalar columns may be given as one-element lists.
/// Returns a dict with keys: tree_file, node, scale, label.
#[cfg(feature = "pyo3")]
#[pyfunction]
#[pyo3(signature = (
    newick,
    clades,
    min_age,
    max_age,
    min_prob=vec![1e-8],
    max_prob=vec![0.975],
    offset=vec![0.1],
    scale=vec![1.0],
    estimate_scale=vec![true],
    refine=true,
))]
#[allow(clippy::too_many_arguments)]
fn estimate_cauchy(
    py: Python<'_>,
    newick: &str,
    clades: Vec<Vec<String>>,
    min_age: Vec<f64>,
    max_age: Vec<f64>,
    min_prob: Vec<f64>,
    max_prob: Vec<f64>,
    offset: Vec<f64>,
    scale: Vec<f64>,
    estimate_scale: Vec<bool>,
    refine: bool,
) -> PyResult<Py<PyDict>> {
    let tree = parse_newick(newick).map_err(to_py_err)?;
    let calibrations = CalibrationColumns {
        clades,
        min_age,
        max_age,
        min_prob,
        max_prob,
        offset,
        scale,
        estimate_scale,
    }
    .into_calibrations()
    .map_err(to_py_err)?;
    let options = CauchyOptions {
        search: if refine {
            ScaleSearch::GridRefined
        } else {
            ScaleSearch::Grid
        },
        ..CauchyOptions::default()
    };
    let est = crate::priors::estimate_cauchy(&tree, &calibrations, &options).map_err(to_py_err)?;

    let dict = PyDict::new(py);
    dict.set_item("tree_file", est.to_mcmctree_string())?;
    dict.set_item("node", est.priors.iter().map(|p| p.node).collect::<Vec<_>>())?;
    dict.set_item("scale", est.priors.iter().map(|p| p.prior.scale).collect::<Vec<_>>())?;
    dict.set_item("label", est.priors.iter().map(|p| p.label.clone()).collect::<Vec<_>>())?;
    Ok(dict.into())
}

#[cfg(feature = "pyo3")]
#[pymodule]
fn mcmctree(m: &Bound<'_, PyModule>) -> PyResult<()> {
    m.add_function(wrap_pyfunction!(read_output, m)?)?;
    m.add_function(wrap_pyfunction!(estimate_cauchy, m)?)?;
    Ok(())
}
