use std::path::Path;

use tracing::{debug, info_span};

use crate::errors::{LookupError, McmcTreeError, Result};
use crate::tree::{CladeResolver, Tree};

use super::calibration::{BoundCalibration, CladeCalibration};
use super::cauchy::{search_scale, CauchyPrior, ScaleGrid, ScaleSearch};
use super::writer::{is_constraint_label, to_mcmctree_string, write_density_table, write_mcmctree_file};
use super::{BoundPrior, NodePrior};

/// Settings shared by every clade in [`estimate_cauchy`].
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct CauchyOptions {
    pub grid: ScaleGrid,
    pub search: ScaleSearch,
    /// Reject clades whose common ancestor has descendants outside the
    /// named tips. When off, the common ancestor is calibrated anyway.
    pub require_monophyly: bool,
}

impl Default for CauchyOptions {
    fn default() -> Self {
        Self {
            grid: ScaleGrid::default(),
            search: ScaleSearch::default(),
            require_monophyly: true,
        }
    }
}

/// A prior attached to one node of the calibrated tree.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct FittedPrior<P> {
    pub node: u32,
    pub tips: Vec<String>,
    pub prior: P,
    /// In-memory constraint label placed on `node`.
    pub label: String,
}

impl<P> FittedPrior<P> {
    /// Name used for this clade in tabular output.
    pub fn clade_name(&self) -> String {
        self.tips.join("-")
    }
}

/// Fitted priors in calibration order and a copy of the input tree with
/// each prior's label on its node.
#[derive(Debug, Clone, PartialEq)]
pub struct PriorEstimate<P> {
    pub priors: Vec<FittedPrior<P>>,
    pub tree: Tree,
}

impl<P: NodePrior> PriorEstimate<P> {
    /// The calibrated tree in MCMCTree's tree-file format.
    pub fn to_mcmctree_string(&self) -> String {
        to_mcmctree_string(&self.tree)
    }

    pub fn write_mcmctree<Q: AsRef<Path>>(&self, path: Q) -> Result<()> {
        write_mcmctree_file(&self.tree, path)
    }

    /// Tabulate each prior's approximate density over `points` ages.
    pub fn write_density_table<Q: AsRef<Path>>(&self, path: Q, points: usize) -> Result<()> {
        let curves: Vec<(String, &P)> = self
            .priors
            .iter()
            .map(|p| (p.clade_name(), &p.prior))
            .collect();
        write_density_table(path, &curves, points)
    }
}

#[cfg(feature = "serde")]
impl PriorEstimate<CauchyPrior> {
    pub fn to_records(&self) -> Vec<serde_json::Value> {
        self.priors
            .iter()
            .map(|p| {
                serde_json::json!({
                    "node": p.node,
                    "tips": p.tips,
                    "location": p.prior.location,
                    "offset": p.prior.offset,
                    "scale": p.prior.scale,
                    "min_prob": p.prior.min_prob,
                    "label": p.label,
                })
            })
            .collect()
    }
}

fn resolve(
    tree: &Tree,
    resolver: &CladeResolver<'_>,
    tips: &[String],
    require_monophyly: bool,
) -> Result<u32> {
    if require_monophyly {
        return resolver.resolve_clade(tips);
    }
    let node = resolver.find_mrca(tips)?;
    if tree.is_tip(node) {
        return Err(LookupError::NotInternal(tips.to_vec()).into());
    }
    Ok(node)
}

/// Resolve every clade and label a copy of `tree` with its prior.
///
/// Existing internal labels that are not constraints are cleared so the
/// copy carries calibrations only.
fn attach<P: NodePrior>(
    tree: &Tree,
    fitted: Vec<(Vec<String>, P)>,
    require_monophyly: bool,
) -> Result<PriorEstimate<P>> {
    let mut out = tree.clone();
    for node in tree.internal_nodes() {
        if !tree.label(node).is_some_and(is_constraint_label) {
            out.set_label(node, None);
        }
    }

    let resolver = tree.clade_resolver()?;
    let mut owner: Vec<Option<usize>> = vec![None; tree.num_nodes()];
    let mut priors = Vec::with_capacity(fitted.len());
    for (i, (tips, prior)) in fitted.into_iter().enumerate() {
        let node = resolve(tree, &resolver, &tips, require_monophyly)?;
        if let Some(first) = owner[node as usize] {
            let first: &FittedPrior<P> = &priors[first];
            return Err(McmcTreeError::Lookup(LookupError::DuplicateCalibration {
                first: first.tips.clone(),
                second: tips,
                node,
            }));
        }
        owner[node as usize] = Some(i);
        let label = prior.label();
        out.set_label(node, Some(label.clone()));
        priors.push(FittedPrior {
            node,
            tips,
            prior,
            label,
        });
    }
    Ok(PriorEstimate { priors, tree: out })
}

/// Fit a Cauchy calibration to every clade and attach the resulting
/// `L[...]` labels to a copy of `tree`.
///
/// With `estimate_scale` set, the scale is searched so that the
/// `max_prob` quantile of the prior lands on `max_age`; otherwise the
/// supplied scale is used as is.
pub fn estimate_cauchy(
    tree: &Tree,
    calibrations: &[CladeCalibration],
    options: &CauchyOptions,
) -> Result<PriorEstimate<CauchyPrior>> {
    let mut fitted = Vec::with_capacity(calibrations.len());
    for cal in calibrations {
        let _span = info_span!("calibration", tips = ?cal.tips).entered();
        cal.validate()?;
        let scale = if cal.estimate_scale {
            search_scale(
                cal.min_age,
                cal.max_age,
                cal.offset,
                cal.min_prob,
                cal.max_prob,
                &options.grid,
                options.search,
            )?
            .scale
        } else {
            cal.scale
        };
        let prior = CauchyPrior::new(cal.min_age, cal.offset, scale, cal.min_prob)?;
        debug!(label = %prior.label(), "calibration fitted");
        fitted.push((cal.tips.clone(), prior));
    }
    attach(tree, fitted, options.require_monophyly)
}

/// Attach MCMCTree soft-bound `B[...]` labels to a copy of `tree`.
pub fn estimate_bounds(
    tree: &Tree,
    calibrations: &[BoundCalibration],
    require_monophyly: bool,
) -> Result<PriorEstimate<BoundPrior>> {
    let fitted = calibrations
        .iter()
        .map(|cal| {
            BoundPrior::new(cal.min_age, cal.max_age, cal.min_prob, cal.max_prob)
                .map(|prior| (cal.tips.clone(), prior))
        })
        .collect::<Result<Vec<_>>>()?;
    attach(tree, fitted, require_monophyly)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tree::parse_newick;

    fn apes() -> Tree {
        parse_newick(
            "((((human:0.1,(chimpanzee:0.05,bonobo:0.05):0.05):0.1,gorilla:0.2):0.2,orangutan:0.4):0.3,(macaque:0.5,gibbon:0.5):0.2);",
        )
        .unwrap()
    }

    fn hominines() -> CladeCalibration {
        CladeCalibration::new(["human", "chimpanzee", "bonobo", "gorilla"], 0.6, 1.2)
    }

    #[test]
    fn fits_and_labels_clade() {
        let tree = apes();
        let est = estimate_cauchy(&tree, &[hominines()], &CauchyOptions::default()).unwrap();
        assert_eq!(est.priors.len(), 1);
        let fitted = &est.priors[0];
        assert!((fitted.prior.implied_upper(0.975) - 1.2).abs() < 1e-3);
        assert_eq!(est.tree.label(fitted.node), Some(fitted.label.as_str()));
        assert!(fitted.label.starts_with("L[0.6~0.1~"));
        assert!(fitted.label.ends_with("~1e-300]"));
        // input untouched
        assert_eq!(tree.label(fitted.node), None);
    }

    #[test]
    fn fixed_scale_is_kept() {
        let cal = hominines().with_fixed_scale(0.5);
        let est = estimate_cauchy(&apes(), &[cal], &CauchyOptions::default()).unwrap();
        assert_eq!(est.priors[0].prior.scale, 0.5);
        assert_eq!(est.priors[0].label, "L[0.6~0.1~0.5~1e-300]");
    }

    #[test]
    fn negative_min_prob_is_clamped() {
        let cal = hominines().with_probs(-1e-9, 0.975);
        let est = estimate_cauchy(&apes(), &[cal], &CauchyOptions::default()).unwrap();
        let fitted = &est.priors[0];
        assert_eq!(fitted.prior.min_prob, 1e-300);
        assert!(fitted.label.ends_with("~1e-300]"));
        assert!((fitted.prior.implied_upper(0.975) - 1.2).abs() < 1e-3);
    }

    #[test]
    fn unknown_tip_is_a_lookup_error() {
        let cal = CladeCalibration::new(["human", "martian"], 0.6, 1.2);
        let err = estimate_cauchy(&apes(), &[cal], &CauchyOptions::default()).unwrap_err();
        assert!(matches!(
            err,
            McmcTreeError::Lookup(LookupError::UnknownTip(ref n)) if n == "martian"
        ));
    }

    #[test]
    fn paraphyletic_clade_needs_opt_out() {
        let cal = CladeCalibration::new(["human", "gorilla"], 0.6, 1.2);
        let err = estimate_cauchy(&apes(), &[cal.clone()], &CauchyOptions::default()).unwrap_err();
        assert!(matches!(err, McmcTreeError::Lookup(LookupError::NotMonophyletic { .. })));

        let options = CauchyOptions {
            require_monophyly: false,
            ..CauchyOptions::default()
        };
        let est = estimate_cauchy(&apes(), &[cal], &options).unwrap();
        let expected = apes()
            .resolve_clade(&["human", "chimpanzee", "bonobo", "gorilla"])
            .unwrap();
        assert_eq!(est.priors[0].node, expected);
    }

    #[test]
    fn two_calibrations_on_one_node_conflict() {
        let other = CladeCalibration::new(["gorilla", "bonobo", "human", "chimpanzee"], 0.7, 1.5);
        let err = estimate_cauchy(&apes(), &[hominines(), other], &CauchyOptions::default())
            .unwrap_err();
        assert!(matches!(
            err,
            McmcTreeError::Lookup(LookupError::DuplicateCalibration { .. })
        ));
    }

    #[test]
    fn single_tip_is_not_internal() {
        let cal = CladeCalibration::new(["human"], 0.6, 1.2);
        let options = CauchyOptions {
            require_monophyly: false,
            ..CauchyOptions::default()
        };
        let err = estimate_cauchy(&apes(), &[cal], &options).unwrap_err();
        assert!(matches!(err, McmcTreeError::Lookup(LookupError::NotInternal(_))));
    }

    #[test]
    fn invalid_calibration_is_rejected() {
        let cal = CladeCalibration::new(["human", "chimpanzee"], 1.2, 0.6);
        assert!(matches!(
            estimate_cauchy(&apes(), &[cal], &CauchyOptions::default()),
            Err(McmcTreeError::InvalidParameter { .. })
        ));
    }

    #[test]
    fn soft_bounds() {
        let cal = BoundCalibration::new(["chimpanzee", "bonobo"], 0.02, 0.04);
        let est = estimate_bounds(&apes(), &[cal], true).unwrap();
        assert_eq!(est.priors[0].label, "B[0.02~0.04~0.025~0.025]");
        assert!(est
            .to_mcmctree_string()
            .contains("(chimpanzee,bonobo)'B(0.02,0.04,0.025,0.025)'"));
    }

    #[test]
    fn writes_outputs() {
        let dir = tempfile::tempdir().unwrap();
        let est = estimate_cauchy(&apes(), &[hominines()], &CauchyOptions::default()).unwrap();
        let tree_path = dir.path().join("input.tree");
        est.write_mcmctree(&tree_path).unwrap();
        let text = std::fs::read_to_string(&tree_path).unwrap();
        assert!(text.starts_with("7 1\n"));
        assert!(text.ends_with("//end of file\n"));
        assert!(text.contains("'L(0.6,0.1,"));

        let table_path = dir.path().join("density.tsv");
        est.write_density_table(&table_path, 10).unwrap();
        let table = std::fs::read_to_string(&table_path).unwrap();
        assert_eq!(table.lines().count(), 11);
        assert!(table.lines().nth(1).unwrap().starts_with("human-chimpanzee-bonobo-gorilla\t"));
    }
}
