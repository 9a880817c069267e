use std::collections::HashMap;

use crate::errors::{LookupError, McmcTreeError, Result};

use super::Tree;

/// Set of tip ids, stored as a fixed-width bitset.
///
/// Two nodes with equal `TipSet`s subtend the same clade, which makes the
/// set usable as a hash key for matching nodes across numbering schemes.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TipSet(Vec<u64>);

impl TipSet {
    /// Empty set able to hold tip ids `0..num_tips`.
    pub fn new(num_tips: usize) -> Self {
        Self(vec![0; (num_tips + 63) / 64])
    }

    pub fn insert(&mut self, tip: u32) {
        let (word, bit) = (tip as usize / 64, tip as usize % 64);
        self.0[word] |= 1u64 << bit;
    }

    pub fn contains(&self, tip: u32) -> bool {
        let (word, bit) = (tip as usize / 64, tip as usize % 64);
        self.0.get(word).is_some_and(|w| (w >> bit) & 1 == 1)
    }

    pub fn union_with(&mut self, other: &TipSet) {
        for (a, b) in self.0.iter_mut().zip(&other.0) {
            *a |= *b;
        }
    }

    pub fn len(&self) -> usize {
        self.0.iter().map(|w| w.count_ones() as usize).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.0.iter().all(|&w| w == 0)
    }

    /// Whether every member of `self` is also in `other`.
    pub fn is_subset(&self, other: &TipSet) -> bool {
        self.0.iter().zip(&other.0).all(|(a, b)| a & !b == 0)
    }
}

impl Tree {
    /// Descendant tip set of every node, indexed by node id.
    pub fn clade_signatures(&self) -> Vec<TipSet> {
        let mut sets = vec![TipSet::new(self.num_tips()); self.num_nodes()];
        for node in self.postorder() {
            if self.is_tip(node) {
                sets[node as usize].insert(node);
                continue;
            }
            let mut acc = TipSet::new(self.num_tips());
            for &child in self.children(node) {
                acc.union_with(&sets[child as usize]);
            }
            sets[node as usize] = acc;
        }
        sets
    }

    /// Hash index from clade signature to internal node id.
    ///
    /// A unary node has the same signature as its child; only the last
    /// such node in id order is kept.
    pub fn internal_clade_index(&self) -> HashMap<TipSet, u32> {
        let sets = self.clade_signatures();
        self.internal_nodes()
            .map(|node| (sets[node as usize].clone(), node))
            .collect()
    }

    /// Resolve tip names to a [`TipSet`].
    ///
    /// Duplicate names are ignored. Fails with
    /// [`LookupError::UnknownTip`] for a name that is not a tip label.
    pub fn tip_set<S: AsRef<str>>(&self, names: &[S]) -> Result<TipSet> {
        self.clade_resolver()?.tip_set(names)
    }

    /// Most recent common ancestor of the named tips.
    pub fn find_mrca<S: AsRef<str>>(&self, names: &[S]) -> Result<u32> {
        self.clade_resolver()?.find_mrca(names)
    }

    /// Internal node whose descendant tips are exactly the named set.
    ///
    /// See [`CladeResolver::resolve_clade`].
    pub fn resolve_clade<S: AsRef<str>>(&self, names: &[S]) -> Result<u32> {
        self.clade_resolver()?.resolve_clade(names)
    }

    /// Tip index and clade signatures computed once, for resolving many
    /// clades against the same tree.
    pub fn clade_resolver(&self) -> Result<CladeResolver<'_>> {
        Ok(CladeResolver {
            tree: self,
            index: self.tip_index()?,
            signatures: self.clade_signatures(),
        })
    }
}

/// Node Resolution against one tree.
#[derive(Debug, Clone)]
pub struct CladeResolver<'a> {
    tree: &'a Tree,
    index: HashMap<&'a str, u32>,
    signatures: Vec<TipSet>,
}

impl CladeResolver<'_> {
    pub fn tip_set<S: AsRef<str>>(&self, names: &[S]) -> Result<TipSet> {
        if names.is_empty() {
            return Err(LookupError::EmptyClade.into());
        }
        let mut set = TipSet::new(self.tree.num_tips());
        for name in names {
            let name = name.as_ref();
            let tip = self
                .index
                .get(name)
                .ok_or_else(|| LookupError::UnknownTip(name.to_string()))?;
            set.insert(*tip);
        }
        Ok(set)
    }

    /// Walks from the first requested tip towards the root and returns the
    /// first node whose descendant set covers every requested tip. The
    /// result does not depend on the order of the names.
    fn mrca_of(&self, wanted: &TipSet) -> Result<u32> {
        let first = (0..self.tree.num_tips() as u32)
            .find(|&tip| wanted.contains(tip))
            .ok_or(LookupError::EmptyClade)?;

        let mut node = first;
        loop {
            if wanted.is_subset(&self.signatures[node as usize]) {
                return Ok(node);
            }
            match self.tree.parent(node) {
                Some(p) => node = p,
                // the root covers every tip
                None => return Ok(node),
            }
        }
    }

    /// Most recent common ancestor of the named tips.
    pub fn find_mrca<S: AsRef<str>>(&self, names: &[S]) -> Result<u32> {
        self.mrca_of(&self.tip_set(names)?)
    }

    /// Internal node whose descendant tips are exactly the named set.
    ///
    /// Fails with [`LookupError::NotInternal`] when the names resolve to a
    /// single tip and [`LookupError::NotMonophyletic`] when the common
    /// ancestor has further descendants.
    pub fn resolve_clade<S: AsRef<str>>(&self, names: &[S]) -> Result<u32> {
        let wanted = self.tip_set(names)?;
        let node = self.mrca_of(&wanted)?;
        let tips = || names.iter().map(|n| n.as_ref().to_string()).collect::<Vec<_>>();
        if self.tree.is_tip(node) {
            return Err(McmcTreeError::Lookup(LookupError::NotInternal(tips())));
        }
        let found = &self.signatures[node as usize];
        if found.len() != wanted.len() {
            return Err(McmcTreeError::Lookup(LookupError::NotMonophyletic {
                tips: tips(),
                node,
                extra: found.len() - wanted.len(),
            }));
        }
        Ok(node)
    }
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

    #[test]
    fn tipset_basics() {
        let mut s = TipSet::new(130);
        assert!(s.is_empty());
        s.insert(0);
        s.insert(129);
        assert!(s.contains(129));
        assert!(!s.contains(64));
        assert_eq!(s.len(), 2);

        let mut t = TipSet::new(130);
        t.insert(0);
        assert!(t.is_subset(&s));
        assert!(!s.is_subset(&t));
        t.union_with(&s);
        assert_eq!(t, s);
    }

    #[test]
    fn mrca_of_great_apes() {
        let tree = apes();
        let node = tree
            .find_mrca(&["human", "chimpanzee", "bonobo", "gorilla"])
            .unwrap();
        assert!(!tree.is_tip(node));
        assert_eq!(tree.clade_signatures()[node as usize].len(), 4);
    }

    #[test]
    fn mrca_is_order_independent() {
        let tree = apes();
        let a = tree.find_mrca(&["bonobo", "human"]).unwrap();
        let b = tree.find_mrca(&["human", "bonobo"]).unwrap();
        let c = tree.find_mrca(&["human", "bonobo", "human"]).unwrap();
        assert_eq!(a, b);
        assert_eq!(a, c);
    }

    #[test]
    fn unknown_tip_is_lookup_error() {
        let tree = apes();
        let err = tree.find_mrca(&["human", "martian"]).unwrap_err();
        assert!(matches!(
            err,
            McmcTreeError::Lookup(LookupError::UnknownTip(ref n)) if n == "martian"
        ));
    }

    #[test]
    fn resolve_rejects_paraphyletic_set() {
        let tree = apes();
        // chimpanzee and bonobo also descend from the human-gorilla ancestor
        let err = tree.resolve_clade(&["human", "gorilla"]).unwrap_err();
        assert!(matches!(
            err,
            McmcTreeError::Lookup(LookupError::NotMonophyletic { extra: 2, .. })
        ));
    }

    #[test]
    fn resolve_rejects_single_tip_and_empty() {
        let tree = apes();
        assert!(matches!(
            tree.resolve_clade(&["human"]),
            Err(McmcTreeError::Lookup(LookupError::NotInternal(_)))
        ));
        let none: [&str; 0] = [];
        assert!(matches!(
            tree.resolve_clade(&none),
            Err(McmcTreeError::Lookup(LookupError::EmptyClade))
        ));
    }

    #[test]
    fn resolve_root_clade() {
        let tree = apes();
        let all: Vec<&str> = tree.tip_labels().map(|l| l.unwrap()).collect();
        assert_eq!(tree.resolve_clade(&all).unwrap(), tree.root());
    }

    #[test]
    fn resolver_matches_tree_methods() {
        let tree = apes();
        let resolver = tree.clade_resolver().unwrap();
        for names in [
            vec!["human", "chimpanzee"],
            vec!["chimpanzee", "bonobo"],
            vec!["macaque", "gibbon"],
            vec!["gorilla", "human", "bonobo", "chimpanzee"],
        ] {
            assert_eq!(resolver.find_mrca(&names).unwrap(), tree.find_mrca(&names).unwrap());
            assert_eq!(
                resolver.resolve_clade(&names).ok(),
                tree.resolve_clade(&names).ok()
            );
        }
        assert!(matches!(
            resolver.resolve_clade(&["human", "gorilla"]),
            Err(McmcTreeError::Lookup(LookupError::NotMonophyletic { extra: 2, .. }))
        ));
        assert!(matches!(
            resolver.tip_set(&["martian"]),
            Err(McmcTreeError::Lookup(LookupError::UnknownTip(_)))
        ));
    }

    #[test]
    fn internal_clade_index_covers_all_internal_nodes() {
        let tree = apes();
        let index = tree.internal_clade_index();
        assert_eq!(index.len(), tree.num_internal());
        for node in tree.internal_nodes() {
            assert_eq!(index[&tree.clade_signatures()[node as usize]], node);
        }
    }
}
