use generational_arena::{Arena, Index};
use tracing::instrument;

use crate::domain::vessel::Vessel;

/// Handle of a vessel inside the tree arena.
pub type VesselIndex = Index;

/// Tree node in the arena-based hierarchy.
#[derive(Debug, Clone)]
pub struct VesselNode {
    pub vessel: Vessel,
    /// Parent handle, None for the root
    pub parent: Option<Index>,
    /// Ordered child handles
    pub children: Vec<Index>,
}

/// Arena-based vessel tree.
///
/// Uses a generational arena so handles of released vessels are never
/// confused with vessels inserted later into the same slot.
#[derive(Debug, Clone)]
pub struct VesselArena {
    arena: Arena<VesselNode>,
    root: Option<Index>,
}

impl Default for VesselArena {
    fn default() -> Self {
        Self::new()
    }
}

impl VesselArena {
    pub fn new() -> Self {
        Self {
            arena: Arena::new(),
            root: None,
        }
    }

    #[instrument(level = "trace", skip(self, vessel))]
    pub fn insert_node(&mut self, vessel: Vessel, parent: Option<Index>) -> Index {
        let node = VesselNode {
            vessel,
            parent,
            children: Vec::new(),
        };
        let node_idx = self.arena.insert(node);

        if let Some(parent_idx) = parent {
            if let Some(parent) = self.arena.get_mut(parent_idx) {
                parent.children.push(node_idx);
            }
        } else {
            self.root = Some(node_idx);
        }

        node_idx
    }

    #[instrument(level = "trace", skip(self))]
    pub fn get_node(&self, idx: Index) -> Option<&VesselNode> {
        self.arena.get(idx)
    }

    #[instrument(level = "trace", skip(self))]
    pub fn get_node_mut(&mut self, idx: Index) -> Option<&mut VesselNode> {
        self.arena.get_mut(idx)
    }

    pub fn root(&self) -> Option<Index> {
        self.root
    }

    pub fn len(&self) -> usize {
        self.arena.len()
    }

    pub fn is_empty(&self) -> bool {
        self.arena.is_empty()
    }

    pub fn contains(&self, idx: Index) -> bool {
        self.arena.contains(idx)
    }

    pub fn iter(&self) -> PreOrderIterator<'_> {
        PreOrderIterator::new(self)
    }

    pub fn iter_postorder(&self) -> PostOrderIterator<'_> {
        PostOrderIterator::new(self)
    }

    /// Pre-order handles, collected so the caller may mutate while walking.
    pub fn preorder_indices(&self) -> Vec<Index> {
        self.iter().map(|(idx, _)| idx).collect()
    }

    pub fn postorder_indices(&self) -> Vec<Index> {
        self.iter_postorder().map(|(idx, _)| idx).collect()
    }

    #[instrument(level = "debug", skip(self))]
    pub fn depth(&self) -> usize {
        if let Some(root) = self.root {
            self.calculate_depth(root)
        } else {
            0
        }
    }

    fn calculate_depth(&self, node_idx: Index) -> usize {
        if let Some(node) = self.get_node(node_idx) {
            1 + node
                .children
                .iter()
                .map(|&child| self.calculate_depth(child))
                .max()
                .unwrap_or(0)
        } else {
            0
        }
    }

    /// Collects all leaf handles in pre-order.
    pub fn leaf_nodes(&self) -> Vec<Index> {
        self.iter()
            .filter(|(_, node)| node.children.is_empty())
            .map(|(idx, _)| idx)
            .collect()
    }

    /// Handles from `idx` up to the root, `idx` first.
    pub fn ancestry(&self, idx: Index) -> Vec<Index> {
        let mut path = Vec::new();
        let mut current = Some(idx);
        while let Some(i) = current {
            match self.get_node(i) {
                Some(node) => {
                    path.push(i);
                    current = node.parent;
                }
                None => break,
            }
        }
        path
    }

    /// Detaches `idx` from its parent and releases it together with all
    /// descendants. Returns the released vessels in pre-order.
    #[instrument(level = "trace", skip(self))]
    pub fn remove_subtree(&mut self, idx: Index) -> Vec<Vessel> {
        let parent = self.get_node(idx).and_then(|n| n.parent);
        if let Some(parent_idx) = parent {
            if let Some(parent) = self.arena.get_mut(parent_idx) {
                parent.children.retain(|&c| c != idx);
            }
        } else if self.root == Some(idx) {
            self.root = None;
        }

        let mut released = Vec::new();
        let mut stack = vec![idx];
        while let Some(current) = stack.pop() {
            if let Some(node) = self.arena.remove(current) {
                for &child in node.children.iter().rev() {
                    stack.push(child);
                }
                released.push(node.vessel);
            }
        }
        released
    }

    /// Releases a single node without touching its children; the caller is
    /// responsible for re-attaching them.
    pub(crate) fn remove_node(&mut self, idx: Index) -> Option<VesselNode> {
        let node = self.arena.remove(idx)?;
        if let Some(parent_idx) = node.parent {
            if let Some(parent) = self.arena.get_mut(parent_idx) {
                parent.children.retain(|&c| c != idx);
            }
        }
        Some(node)
    }
}

pub struct PreOrderIterator<'a> {
    arena: &'a VesselArena,
    stack: Vec<Index>,
}

impl<'a> PreOrderIterator<'a> {
    fn new(arena: &'a VesselArena) -> Self {
        let mut stack = Vec::new();
        if let Some(root) = arena.root() {
            stack.push(root);
        }
        Self { arena, stack }
    }
}

impl<'a> Iterator for PreOrderIterator<'a> {
    type Item = (Index, &'a VesselNode);

    fn next(&mut self) -> Option<Self::Item> {
        if let Some(current_idx) = self.stack.pop() {
            if let Some(node) = self.arena.get_node(current_idx) {
                // Push children in reverse order for left-to-right traversal
                for &child in node.children.iter().rev() {
                    self.stack.push(child);
                }
                return Some((current_idx, node));
            }
        }
        None
    }
}

pub struct PostOrderIterator<'a> {
    arena: &'a VesselArena,
    stack: Vec<(Index, bool)>,
}

impl<'a> PostOrderIterator<'a> {
    fn new(arena: &'a VesselArena) -> Self {
        let mut stack = Vec::new();
        if let Some(root) = arena.root() {
            stack.push((root, false));
        }
        Self { arena, stack }
    }
}

impl<'a> Iterator for PostOrderIterator<'a> {
    type Item = (Index, &'a VesselNode);

    fn next(&mut self) -> Option<Self::Item> {
        while let Some((current_idx, visited)) = self.stack.pop() {
            if let Some(node) = self.arena.get_node(current_idx) {
                if !visited {
                    self.stack.push((current_idx, true));
                    for &child in node.children.iter().rev() {
                        self.stack.push((child, false));
                    }
                } else {
                    return Some((current_idx, node));
                }
            }
        }
        None
    }
}
