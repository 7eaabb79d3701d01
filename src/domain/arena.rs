use generational_arena::{Arena, Index};
use std::collections::HashSet;
use std::path::Path;
use tracing::instrument;

use crate::domain::entities::ModuleData;

/// Module node in the arena-based dependency structure.
#[derive(Debug)]
pub struct ModuleNode {
    /// Module data for this node
    pub data: ModuleData,
    /// Node that introduced this one, None for the root.
    /// Display only: a shared node keeps its first parent.
    pub parent: Option<Index>,
    /// Dependencies in declaration order
    pub children: Vec<Index>,
}

/// Arena-based dependency structure.
///
/// Nodes are addressed by generational index. A node reached from several
/// parents is stored once and listed in each parent's `children`, so the
/// structure is a DAG rooted at `root`; cycles are cut by `Cyclic` leaf nodes.
#[derive(Debug)]
pub struct ModuleArena {
    arena: Arena<ModuleNode>,
    root: Option<Index>,
}

impl Default for ModuleArena {
    fn default() -> Self {
        Self::new()
    }
}

impl ModuleArena {
    pub fn new() -> Self {
        Self {
            arena: Arena::new(),
            root: None,
        }
    }

    #[instrument(level = "trace", skip(self, data), fields(name = %data.name))]
    pub fn insert_node(&mut self, data: ModuleData, parent: Option<Index>) -> Index {
        let node = ModuleNode {
            data,
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

    /// Lists an existing node as another child of `parent`.
    #[instrument(level = "trace", skip(self))]
    pub fn add_child(&mut self, parent: Index, child: Index) {
        if let Some(parent) = self.arena.get_mut(parent) {
            parent.children.push(child);
        }
    }

    pub fn get_node(&self, idx: Index) -> Option<&ModuleNode> {
        self.arena.get(idx)
    }

    pub fn get_node_mut(&mut self, idx: Index) -> Option<&mut ModuleNode> {
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

    /// Direct dependencies of `idx`, in declaration order.
    pub fn children(&self, idx: Index) -> impl Iterator<Item = (Index, &ModuleNode)> + '_ {
        self.get_node(idx)
            .into_iter()
            .flat_map(|node| node.children.iter())
            .filter_map(move |&child| self.get_node(child).map(|n| (child, n)))
    }

    /// Chain of introducing nodes from `idx`'s parent up to the root.
    fn ancestors(&self, idx: Index) -> Vec<Index> {
        let mut chain = Vec::new();
        let mut current = self.get_node(idx).and_then(|n| n.parent);
        while let Some(parent) = current {
            chain.push(parent);
            current = self.get_node(parent).and_then(|n| n.parent);
        }
        chain
    }

    /// Names from the root down to `idx`, e.g. for "ioc <- motor <- asyn" displays.
    pub fn name_path(&self, idx: Index) -> Vec<&str> {
        self.ancestors(idx)
            .into_iter()
            .rev()
            .chain(std::iter::once(idx))
            .filter_map(|i| self.get_node(i).map(|n| n.data.name.as_str()))
            .collect()
    }

    /// Pre-order walk; shared nodes are yielded once.
    pub fn iter(&self) -> TreeIterator<'_> {
        TreeIterator::new(self)
    }

    /// Post-order walk; shared nodes are yielded once.
    pub fn iter_postorder(&self) -> PostOrderIterator<'_> {
        PostOrderIterator::new(self)
    }

    /// Every module once, dependencies before their dependents,
    /// de-duplicated by install path. Cyclic placeholders are skipped.
    #[instrument(level = "debug", skip(self))]
    pub fn flatten(&self) -> Vec<Index> {
        let mut seen: HashSet<&Path> = HashSet::new();
        self.iter_postorder()
            .filter(|(_, node)| !node.data.status.is_cyclic())
            .filter(|(_, node)| seen.insert(node.data.path.as_path()))
            .map(|(idx, _)| idx)
            .collect()
    }
}

pub struct TreeIterator<'a> {
    arena: &'a ModuleArena,
    stack: Vec<Index>,
    seen: HashSet<Index>,
}

impl<'a> TreeIterator<'a> {
    fn new(arena: &'a ModuleArena) -> Self {
        let mut stack = Vec::new();
        if let Some(root) = arena.root() {
            stack.push(root);
        }
        Self {
            arena,
            stack,
            seen: HashSet::new(),
        }
    }
}

impl<'a> Iterator for TreeIterator<'a> {
    type Item = (Index, &'a ModuleNode);

    fn next(&mut self) -> Option<Self::Item> {
        while let Some(current_idx) = self.stack.pop() {
            if !self.seen.insert(current_idx) {
                continue;
            }
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
    arena: &'a ModuleArena,
    stack: Vec<(Index, bool)>,
    seen: HashSet<Index>,
}

impl<'a> PostOrderIterator<'a> {
    fn new(arena: &'a ModuleArena) -> Self {
        let mut stack = Vec::new();
        if let Some(root) = arena.root() {
            stack.push((root, false));
        }
        Self {
            arena,
            stack,
            seen: HashSet::new(),
        }
    }
}

impl<'a> Iterator for PostOrderIterator<'a> {
    type Item = (Index, &'a ModuleNode);

    fn next(&mut self) -> Option<Self::Item> {
        while let Some((current_idx, visited)) = self.stack.pop() {
            if let Some(node) = self.arena.get_node(current_idx) {
                if !visited {
                    if !self.seen.insert(current_idx) {
                        continue;
                    }
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
