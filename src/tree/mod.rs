pub mod clade;
pub mod newick;
pub mod ultrametric;

use std::collections::HashMap;

use crate::errors::{McmcTreeError, Result};

pub use clade::{CladeResolver, TipSet};
pub use newick::{
    format_number, parse_newick, parse_newick_with_comments, write_newick, NewickWriteOptions,
};
pub use ultrametric::{force_ultrametric, is_ultrametric};

pub(crate) const NO_PARENT: u32 = u32::MAX;

/// Node arena in creation order, used while a tree is being built.
///
/// Node 0 is the root. Children keep insertion order, which for the Newick
/// parser is left-to-right textual order.
#[derive(Debug, Clone, Default)]
pub(crate) struct NodeArena {
    pub parent: Vec<u32>,
    pub children: Vec<Vec<u32>>,
    pub edge_length: Vec<Option<f64>>,
    pub label: Vec<Option<String>>,
}

impl NodeArena {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.parent.len()
    }

    /// Add a node as a child of `parent_idx` (or as the root with
    /// `NO_PARENT`) and return its index.
    pub fn add_node(&mut self, parent_idx: u32) -> u32 {
        let idx = self.parent.len() as u32;
        self.parent.push(parent_idx);
        self.children.push(Vec::new());
        self.edge_length.push(None);
        self.label.push(None);
        if parent_idx != NO_PARENT {
            self.children[parent_idx as usize].push(idx);
        }
        idx
    }

    /// Renumber into a [`Tree`]: tips `0..n_tips` in left-to-right order,
    /// then internal nodes in pre-order starting with the root.
    ///
    /// Returns the tree and the arena-index -> tree-id map.
    pub fn into_tree(self) -> (Tree, Vec<u32>) {
        let n = self.len();
        let mut order: Vec<u32> = Vec::with_capacity(n);
        let mut stack: Vec<u32> = vec![0];
        while let Some(node) = stack.pop() {
            order.push(node);
            for &child in self.children[node as usize].iter().rev() {
                stack.push(child);
            }
        }

        let num_tips = order
            .iter()
            .filter(|&&node| self.children[node as usize].is_empty())
            .count();

        let mut new_id = vec![NO_PARENT; n];
        let mut next_tip = 0u32;
        let mut next_internal = num_tips as u32;
        for &node in &order {
            if self.children[node as usize].is_empty() {
                new_id[node as usize] = next_tip;
                next_tip += 1;
            } else {
                new_id[node as usize] = next_internal;
                next_internal += 1;
            }
        }

        let mut parent = vec![NO_PARENT; n];
        let mut children = vec![Vec::new(); n];
        let mut edge_length = vec![None; n];
        let mut label = vec![None; n];
        let NodeArena {
            parent: old_parent,
            children: old_children,
            edge_length: old_edge_length,
            label: old_label,
        } = self;

        for (old, ((p, kids), (len, lab))) in old_parent
            .into_iter()
            .zip(old_children)
            .zip(old_edge_length.into_iter().zip(old_label))
            .enumerate()
        {
            let id = new_id[old] as usize;
            if id == NO_PARENT as usize {
                continue;
            }
            parent[id] = if p == NO_PARENT { NO_PARENT } else { new_id[p as usize] };
            children[id] = kids.into_iter().map(|c| new_id[c as usize]).collect();
            edge_length[id] = len;
            label[id] = lab;
        }

        (
            Tree {
                parent,
                children,
                edge_length,
                label,
                num_tips,
            },
            new_id,
        )
    }
}

/// A rooted phylogeny stored as parallel vectors indexed by node id.
///
/// Tips are numbered `0..num_tips()` in left-to-right order and internal
/// nodes `num_tips()..num_nodes()` in pre-order, so the root is always node
/// `num_tips()`. Internal node `num_tips() + i` corresponds to row `i` of a
/// [`NodeAgeTable`](crate::mcmctree::NodeAgeTable).
#[derive(Debug, Clone, PartialEq)]
pub struct Tree {
    parent: Vec<u32>,
    children: Vec<Vec<u32>>,
    edge_length: Vec<Option<f64>>,
    label: Vec<Option<String>>,
    num_tips: usize,
}

impl Tree {
    pub fn num_nodes(&self) -> usize {
        self.parent.len()
    }

    pub fn num_tips(&self) -> usize {
        self.num_tips
    }

    pub fn num_internal(&self) -> usize {
        self.num_nodes() - self.num_tips
    }

    /// The root node id. A single-tip tree has its tip as root.
    pub fn root(&self) -> u32 {
        if self.num_internal() == 0 {
            0
        } else {
            self.num_tips as u32
        }
    }

    pub fn is_tip(&self, node: u32) -> bool {
        (node as usize) < self.num_tips
    }

    pub fn internal_nodes(&self) -> core::ops::Range<u32> {
        self.num_tips as u32..self.num_nodes() as u32
    }

    pub fn parent(&self, node: u32) -> Option<u32> {
        match self.parent[node as usize] {
            NO_PARENT => None,
            p => Some(p),
        }
    }

    pub fn children(&self, node: u32) -> &[u32] {
        &self.children[node as usize]
    }

    pub fn edge_length(&self, node: u32) -> Option<f64> {
        self.edge_length[node as usize]
    }

    pub fn set_edge_length(&mut self, node: u32, length: Option<f64>) {
        self.edge_length[node as usize] = length;
    }

    pub fn label(&self, node: u32) -> Option<&str> {
        self.label[node as usize].as_deref()
    }

    pub fn set_label(&mut self, node: u32, label: Option<String>) {
        self.label[node as usize] = label;
    }

    /// Whether any edge carries a length.
    pub fn has_edge_lengths(&self) -> bool {
        self.edge_length.iter().any(Option::is_some)
    }

    /// Tip labels in tip-id order (`None` for unlabeled tips).
    pub fn tip_labels(&self) -> impl Iterator<Item = Option<&str>> + '_ {
        self.label[..self.num_tips].iter().map(|l| l.as_deref())
    }

    /// Map from tip label to tip id.
    ///
    /// Fails when a tip is unlabeled or two tips share a label, since clade
    /// definitions address tips by name.
    pub fn tip_index(&self) -> Result<HashMap<&str, u32>> {
        let mut map = HashMap::with_capacity(self.num_tips);
        for (tip, label) in self.tip_labels().enumerate() {
            let name = label.ok_or_else(|| {
                McmcTreeError::parse(format!("tip {} has no label", tip))
            })?;
            if map.insert(name, tip as u32).is_some() {
                return Err(McmcTreeError::parse(format!(
                    "duplicate tip label '{}'",
                    name
                )));
            }
        }
        Ok(map)
    }

    /// Node ids in pre-order, children visited left to right.
    pub fn preorder(&self) -> Vec<u32> {
        let mut order = Vec::with_capacity(self.num_nodes());
        if self.num_nodes() == 0 {
            return order;
        }
        let mut stack = vec![self.root()];
        while let Some(node) = stack.pop() {
            order.push(node);
            for &child in self.children[node as usize].iter().rev() {
                stack.push(child);
            }
        }
        order
    }

    /// Node ids in post-order, children visited left to right.
    ///
    /// Internal nodes appear in the order of their closing parentheses in
    /// the Newick text the tree was parsed from.
    pub fn postorder(&self) -> Vec<u32> {
        let mut order = Vec::with_capacity(self.num_nodes());
        if self.num_nodes() == 0 {
            return order;
        }
        let mut stack: Vec<(u32, bool)> = vec![(self.root(), false)];
        while let Some((node, expanded)) = stack.pop() {
            if expanded {
                order.push(node);
                continue;
            }
            stack.push((node, true));
            for &child in self.children[node as usize].iter().rev() {
                stack.push((child, false));
            }
        }
        order
    }

    /// Cumulative edge length from the root to every node.
    /// Missing edge lengths count as zero.
    pub fn node_depths(&self) -> Vec<f64> {
        let mut depth = vec![0.0; self.num_nodes()];
        for node in self.preorder() {
            if let Some(p) = self.parent(node) {
                depth[node as usize] = depth[p as usize] + self.edge_length(node).unwrap_or(0.0);
            }
        }
        depth
    }

    /// Maximum root-to-tip path length.
    pub fn height(&self) -> f64 {
        let depth = self.node_depths();
        depth[..self.num_tips].iter().copied().fold(0.0, f64::max)
    }

    /// Age of every internal node: tree height minus the node's depth.
    ///
    /// Entry `i` belongs to internal node `num_tips() + i`. On an
    /// ultrametric tree this is the distance from the node to any of its
    /// descendant tips.
    pub fn branching_times(&self) -> Vec<f64> {
        let depth = self.node_depths();
        let height = depth[..self.num_tips].iter().copied().fold(0.0, f64::max);
        depth[self.num_tips..].iter().map(|d| height - d).collect()
    }
}
