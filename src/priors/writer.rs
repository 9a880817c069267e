use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::Path;

use tracing::{debug, warn};

use crate::errors::{McmcTreeError, Result};
use crate::tree::{format_number, write_newick, NewickWriteOptions, Tree};

use super::NodePrior;

/// Default number of ages sampled per density curve.
pub const DEFAULT_DENSITY_POINTS: usize = 1000;

/// Whether `label` is an in-memory constraint such as `L[...]` or `B[...]`.
pub fn is_constraint_label(label: &str) -> bool {
    let mut chars = label.chars();
    matches!(chars.next(), Some('L' | 'B' | 'U' | 'G' | 'S'))
        && matches!(chars.next(), Some('['))
        && label.ends_with(']')
}

/// Convert an in-memory constraint `L[a~b~c]` to MCMCTree's `L(a,b,c)`.
pub fn mcmctree_label(label: &str) -> String {
    label
        .chars()
        .map(|c| match c {
            '~' => ',',
            '[' => '(',
            ']' => ')',
            other => other,
        })
        .collect()
}

/// Serialize a calibrated tree in MCMCTree's control-file tree format:
/// a `"<tips> 1"` header, the tree without branch lengths, and an
/// end-of-file marker.
///
/// Internal labels that are not constraints are dropped.
pub fn to_mcmctree_string(tree: &Tree) -> String {
    let mut out_tree = tree.clone();
    for node in tree.internal_nodes() {
        let label = tree
            .label(node)
            .filter(|l| is_constraint_label(l))
            .map(mcmctree_label);
        out_tree.set_label(node, label);
    }
    let newick = write_newick(
        &out_tree,
        &NewickWriteOptions {
            edge_lengths: false,
            internal_labels: true,
        },
    );
    format!("{} 1\n{}\n//end of file\n", tree.num_tips(), newick)
}

/// Write [`to_mcmctree_string`] to `path`, replacing any existing file.
pub fn write_mcmctree_file<P: AsRef<Path>>(tree: &Tree, path: P) -> Result<()> {
    let path = path.as_ref();
    let mut out = BufWriter::new(File::create(path)?);
    out.write_all(to_mcmctree_string(tree).as_bytes())?;
    out.flush()?;
    debug!(path = %path.display(), tips = tree.num_tips(), "wrote MCMCTree tree file");
    Ok(())
}

fn prepare_output_path(path: &Path) -> Result<()> {
    if path.exists() {
        warn!(path = %path.display(), "output file exists and will be replaced");
        fs::remove_file(path)?;
    }
    Ok(())
}

/// Tabulate approximate densities as `clade\tage\tdensity` rows, `points`
/// evenly spaced ages per prior over its [`NodePrior::age_range`].
///
/// Each entry is `(clade name, prior)`. An existing file at `path` is
/// removed first. `points` must be at least 2 so each curve spans its
/// range; fewer is an [`McmcTreeError::InvalidParameter`] and leaves
/// `path` untouched.
pub fn write_density_table<P, D>(path: P, priors: &[(String, &D)], points: usize) -> Result<()>
where
    P: AsRef<Path>,
    D: NodePrior + ?Sized,
{
    if points < 2 {
        return Err(McmcTreeError::InvalidParameter {
            param: "points",
            value: points as f64,
        });
    }
    let path = path.as_ref();
    prepare_output_path(path)?;
    let mut out = BufWriter::new(File::create(path)?);
    writeln!(out, "clade\tage\tdensity")?;
    let steps = points - 1;
    for (name, prior) in priors {
        let (from, to) = prior.age_range();
        let width = (to - from) / steps as f64;
        for k in 0..=steps {
            let age = from + k as f64 * width;
            writeln!(
                out,
                "{}\t{}\t{}",
                name,
                format_number(age),
                format_number(prior.density(age))
            )?;
        }
    }
    out.flush()?;
    debug!(path = %path.display(), curves = priors.len(), "wrote density table");
    Ok(())
}
