use tracing::debug;

use super::Tree;

/// Make every root-to-tip path as long as the longest one.
///
/// Each tip's terminal edge is extended by the difference between the
/// maximum root-to-tip length and its own. Internal edges are never
/// touched. Trees written with rounded branch lengths (as MCMCTree does)
/// are usually a few ulps away from ultrametric; this removes that noise.
///
/// Returns the largest correction applied.
pub fn force_ultrametric(tree: &mut Tree) -> f64 {
    let depth = tree.node_depths();
    let tips = &depth[..tree.num_tips()];
    let max_depth = tips.iter().copied().fold(0.0, f64::max);

    let mut largest = 0.0f64;
    for tip in 0..tree.num_tips() as u32 {
        if tree.parent(tip).is_none() {
            continue;
        }
        let shortfall = max_depth - tips[tip as usize];
        if shortfall > 0.0 {
            let length = tree.edge_length(tip).unwrap_or(0.0);
            tree.set_edge_length(tip, Some(length + shortfall));
            largest = largest.max(shortfall);
        }
    }

    debug!(
        tips = tree.num_tips(),
        height = max_depth,
        largest_correction = largest,
        "forced tree ultrametric"
    );
    largest
}

/// Whether all root-to-tip lengths agree within `tolerance`.
pub fn is_ultrametric(tree: &Tree, tolerance: f64) -> bool {
    let depth = tree.node_depths();
    let tips = &depth[..tree.num_tips()];
    let (lo, hi) = tips
        .iter()
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &d| {
            (lo.min(d), hi.max(d))
        });
    tips.is_empty() || hi - lo <= tolerance
}
