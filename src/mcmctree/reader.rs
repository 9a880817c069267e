use std::fs;
use std::path::Path;

use tracing::{debug, warn};

use crate::errors::{McmcTreeError, Result};
use crate::tree::{force_ultrametric, parse_newick, parse_newick_with_comments, TipSet, Tree};

use super::annotations::{
    extract_annotations, extract_tree_field, parse_interval, strip_annotations, tree_text,
    CredibilityInterval,
};

/// Slack allowed when checking that a node's mean age lies inside its
/// interval; MCMCTree rounds ages to a few decimals.
const INTERVAL_TOLERANCE: f64 = 1e-6;

/// Options for reading MCMCTree output.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ReaderOptions {
    /// Extend terminal edges so every tip is equidistant from the root
    /// before node ages are computed.
    pub force_ultrametric: bool,
    /// 0-based index of the tab/line separated field holding the tree
    /// when reading a whole `FigTree.tre` file.
    pub tree_field: usize,
}

impl Default for ReaderOptions {
    fn default() -> Self {
        Self {
            force_ultrametric: true,
            tree_field: 3,
        }
    }
}

/// Age estimate for one internal node.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct NodeAge {
    /// Internal node id in the returned tree.
    pub node: u32,
    /// Point estimate, from the tree's branch lengths.
    pub mean: f64,
    /// Lower bound of the 95% credibility interval.
    pub lower: f64,
    /// Upper bound of the 95% credibility interval.
    pub upper: f64,
}

/// Age estimates for every internal node, row `i` belonging to node
/// `tree.num_tips() + i`.
#[derive(Debug, Clone, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct NodeAgeTable {
    rows: Vec<NodeAge>,
}

impl NodeAgeTable {
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn rows(&self) -> &[NodeAge] {
        &self.rows
    }

    pub fn iter(&self) -> impl Iterator<Item = &NodeAge> {
        self.rows.iter()
    }

    /// Row for an internal node id.
    pub fn get(&self, node: u32) -> Option<&NodeAge> {
        let first = self.rows.first()?.node;
        node.checked_sub(first)
            .and_then(|i| self.rows.get(i as usize))
    }

    /// Rows as JSON records (`node`, `mean`, `lower`, `upper`).
    #[cfg(feature = "serde")]
    pub fn to_records(&self) -> Vec<serde_json::Value> {
        self.rows
            .iter()
            .map(|r| {
                serde_json::json!({
                    "node": r.node,
                    "mean": r.mean,
                    "lower": r.lower,
                    "upper": r.upper,
                })
            })
            .collect()
    }
}

/// Result of reading an MCMCTree output tree.
#[derive(Debug, Clone, PartialEq)]
pub struct McmcTreeOutput {
    /// Dated tree with branch lengths equal to the posterior mean times.
    pub tree: Tree,
    pub node_ages: NodeAgeTable,
}

/// Read MCMCTree's `FigTree.tre` from disk.
pub fn read_mcmctree_file<P: AsRef<Path>>(path: P, options: &ReaderOptions) -> Result<McmcTreeOutput> {
    let path = path.as_ref();
    debug!(path = %path.display(), "reading MCMCTree output");
    let contents = fs::read_to_string(path)?;
    parse_figtree(&contents, options)
}

/// Parse the full contents of a `FigTree.tre` file.
pub fn parse_figtree(contents: &str, options: &ReaderOptions) -> Result<McmcTreeOutput> {
    let field = extract_tree_field(contents, options.tree_field)?;
    read_mcmctree(field, options)
}

/// Parse one annotated tree string into a tree and its node age table.
///
/// Text before the first `(` (such as `UTREE 1 =`) is ignored. There must
/// be exactly one `[...{lower, upper}]` annotation per internal node.
pub fn read_mcmctree(annotated: &str, options: &ReaderOptions) -> Result<McmcTreeOutput> {
    let annotated = tree_text(annotated)?;

    let mut tree = parse_newick(&strip_annotations(annotated)?)?;
    // a unary node shares its clade with its child, so annotations on the
    // two could not be told apart
    if let Some(node) = tree.internal_nodes().find(|&n| tree.children(n).len() == 1) {
        return Err(McmcTreeError::parse(format!(
            "internal node {} has a single child; unary nodes are not supported",
            node
        )));
    }
    let intervals = extract_annotations(annotated)?
        .into_iter()
        .map(parse_interval)
        .collect::<Result<Vec<_>>>()?;

    if intervals.len() != tree.num_internal() {
        return Err(McmcTreeError::parse(format!(
            "found {} node annotations for {} internal nodes",
            intervals.len(),
            tree.num_internal()
        )));
    }

    let intervals = reconcile_intervals(&tree, annotated, &intervals)?;

    if options.force_ultrametric {
        force_ultrametric(&mut tree);
    }

    let first = tree.num_tips() as u32;
    let rows: Vec<NodeAge> = tree
        .branching_times()
        .into_iter()
        .zip(intervals)
        .enumerate()
        .map(|(i, (mean, iv))| NodeAge {
            node: first + i as u32,
            mean,
            lower: iv.lower,
            upper: iv.upper,
        })
        .collect();

    for row in &rows {
        if !(row.lower - INTERVAL_TOLERANCE..=row.upper + INTERVAL_TOLERANCE).contains(&row.mean) {
            warn!(
                node = row.node,
                mean = row.mean,
                lower = row.lower,
                upper = row.upper,
                "node age outside its credibility interval"
            );
        }
    }

    debug!(
        tips = tree.num_tips(),
        internal = tree.num_internal(),
        "read MCMCTree output tree"
    );
    Ok(McmcTreeOutput {
        tree,
        node_ages: NodeAgeTable { rows },
    })
}

/// Reorder intervals from textual (MCMCTree) order into the tree's
/// internal node order.
///
/// The annotated text is parsed again keeping each annotation's owner
/// node. The owner's descendant tip names form a [`TipSet`] that is looked
/// up among the internal clades of `tree`, so the two numberings are
/// matched on clade content rather than position.
fn reconcile_intervals(
    tree: &Tree,
    annotated: &str,
    intervals: &[CredibilityInterval],
) -> Result<Vec<CredibilityInterval>> {
    let (annotated_tree, owners) = parse_newick_with_comments(annotated)?;
    if owners.len() != intervals.len() {
        return Err(McmcTreeError::parse(format!(
            "found {} annotation owners for {} annotations",
            owners.len(),
            intervals.len()
        )));
    }

    let names = tree.tip_index()?;
    let translate: Vec<u32> = annotated_tree
        .tip_labels()
        .map(|label| {
            label
                .and_then(|l| names.get(l).copied())
                .ok_or_else(|| McmcTreeError::parse("annotated tree tips differ from the stripped tree"))
        })
        .collect::<Result<_>>()?;

    let clades = tree.internal_clade_index();
    let signatures = annotated_tree.clade_signatures();
    let first = tree.num_tips() as u32;
    let mut slots: Vec<Option<CredibilityInterval>> = vec![None; tree.num_internal()];

    for (i, ((owner, _), interval)) in owners.iter().zip(intervals).enumerate() {
        if annotated_tree.is_tip(*owner) {
            return Err(McmcTreeError::parse(format!(
                "annotation {} follows tip '{}'",
                i + 1,
                annotated_tree.label(*owner).unwrap_or("")
            )));
        }

        let mut clade = TipSet::new(tree.num_tips());
        for (tip, &target) in translate.iter().enumerate() {
            if signatures[*owner as usize].contains(tip as u32) {
                clade.insert(target);
            }
        }

        let node = *clades.get(&clade).ok_or_else(|| {
            McmcTreeError::parse(format!("annotation {} matches no internal node", i + 1))
        })?;
        let slot = &mut slots[(node - first) as usize];
        if slot.is_some() {
            return Err(McmcTreeError::parse(format!(
                "node {} has more than one annotation",
                node
            )));
        }
        *slot = Some(*interval);
    }

    slots
        .into_iter()
        .enumerate()
        .map(|(i, slot)| {
            slot.ok_or_else(|| {
                McmcTreeError::parse(format!("node {} has no annotation", first + i as u32))
            })
        })
        .collect()
}
