//! Arena over self-referential records (categories, menu items).
//!
//! Nodes are stored flat with a parent-id and a child index. Nothing holds a
//! reference to another node; traversal goes through ids.

use std::collections::{HashMap, HashSet};

use serde::Serialize;

use crate::CoreError;

/// A record that participates in a parent/child hierarchy.
pub trait TreeNode {
    fn node_id(&self) -> i64;
    fn parent_id(&self) -> Option<i64>;
}

#[derive(Debug, Clone)]
pub struct Hierarchy<T> {
    nodes: Vec<T>,
    index: HashMap<i64, usize>,
    children: HashMap<i64, Vec<usize>>,
    roots: Vec<usize>,
}

/// Nested view of a subtree, produced by [`Hierarchy::tree`].
#[derive(Debug, Clone, Serialize)]
pub struct TreeView<'a, T: Serialize> {
    #[serde(flatten)]
    pub node: &'a T,
    pub children: Vec<TreeView<'a, T>>,
}

impl<T: TreeNode> Hierarchy<T> {
    /// Build the arena. Nodes whose parent is not present are treated as roots.
    /// Input order is preserved among siblings.
    #[must_use]
    pub fn new(nodes: Vec<T>) -> Self {
        let index: HashMap<i64, usize> = nodes
            .iter()
            .enumerate()
            .map(|(pos, n)| (n.node_id(), pos))
            .collect();

        let mut children: HashMap<i64, Vec<usize>> = HashMap::new();
        let mut roots = Vec::new();
        for (pos, node) in nodes.iter().enumerate() {
            match node.parent_id().filter(|p| index.contains_key(p)) {
                Some(parent) => children.entry(parent).or_default().push(pos),
                None => roots.push(pos),
            }
        }

        Self {
            nodes,
            index,
            children,
            roots,
        }
    }

    #[must_use]
    pub fn get(&self, id: i64) -> Option<&T> {
        self.index.get(&id).map(|&pos| &self.nodes[pos])
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn roots(&self) -> impl Iterator<Item = &T> + '_ {
        self.roots.iter().map(|&pos| &self.nodes[pos])
    }

    pub fn children(&self, id: i64) -> impl Iterator<Item = &T> + '_ {
        self.children
            .get(&id)
            .into_iter()
            .flatten()
            .map(|&pos| &self.nodes[pos])
    }

    /// Ids of `id` and every node below it, breadth first. Empty if `id` is
    /// unknown.
    #[must_use]
    pub fn descendants(&self, id: i64) -> Vec<i64> {
        if !self.index.contains_key(&id) {
            return Vec::new();
        }
        let mut out = vec![id];
        let mut seen: HashSet<i64> = HashSet::from([id]);
        let mut cursor = 0;
        while cursor < out.len() {
            let current = out[cursor];
            cursor += 1;
            for child in self.children(current) {
                if seen.insert(child.node_id()) {
                    out.push(child.node_id());
                }
            }
        }
        out
    }

    /// Parent chain of `id`, nearest first. Stops on a repeated id so a
    /// corrupted chain cannot loop forever.
    #[must_use]
    pub fn ancestors(&self, id: i64) -> Vec<i64> {
        let mut out = Vec::new();
        let mut seen: HashSet<i64> = HashSet::from([id]);
        let mut current = self.get(id).and_then(TreeNode::parent_id);
        while let Some(parent) = current {
            if !seen.insert(parent) {
                break;
            }
            out.push(parent);
            current = self.get(parent).and_then(TreeNode::parent_id);
        }
        out
    }

    /// Whether re-parenting `node_id` under `new_parent` would close a loop.
    #[must_use]
    pub fn would_create_cycle(&self, node_id: i64, new_parent: i64) -> bool {
        new_parent == node_id || self.ancestors(new_parent).contains(&node_id)
    }

    /// Validate a proposed parent for `node_id`.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::HierarchyCycle`] when the move would make the node
    /// its own ancestor.
    pub fn check_parent(&self, node_id: i64, new_parent: Option<i64>) -> Result<(), CoreError> {
        match new_parent {
            Some(parent_id) if self.would_create_cycle(node_id, parent_id) => {
                Err(CoreError::HierarchyCycle { node_id, parent_id })
            }
            _ => Ok(()),
        }
    }
}

impl<T: TreeNode + Serialize> Hierarchy<T> {
    /// Nested view of the whole forest.
    #[must_use]
    pub fn tree(&self) -> Vec<TreeView<'_, T>> {
        self.roots
            .iter()
            .map(|&pos| self.subtree(pos, &mut HashSet::new()))
            .collect()
    }

    fn subtree(&self, pos: usize, visiting: &mut HashSet<i64>) -> TreeView<'_, T> {
        let node = &self.nodes[pos];
        visiting.insert(node.node_id());
        let mut children = Vec::new();
        for &child in self.children.get(&node.node_id()).into_iter().flatten() {
            if !visiting.contains(&self.nodes[child].node_id()) {
                children.push(self.subtree(child, visiting));
            }
        }
        TreeView { node, children }
    }
}
