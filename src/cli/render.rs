//! termtree rendering of a resolved module tree.

use std::collections::HashSet;
use std::path::Path;

use colored::Colorize;
use generational_arena::Index;
use termtree::Tree;
use tracing::instrument;

use crate::domain::{ModuleArena, ModuleNode, NodeStatus};
use crate::util::path::relative_to;

pub trait TreeNodeConvert {
    /// Renders the tree; with `base`, module paths are shown relative to it.
    fn to_tree_string(&self, base: Option<&Path>) -> Tree<String>;
}

impl TreeNodeConvert for ModuleArena {
    #[instrument(level = "debug", skip(self))]
    fn to_tree_string(&self, base: Option<&Path>) -> Tree<String> {
        let Some(root_idx) = self.root() else {
            return Tree::new("Empty tree".to_string());
        };
        let mut expanded = HashSet::new();
        build_tree(self, root_idx, base, &mut expanded)
    }
}

// A module shared by several parents is expanded under the first one only.
fn build_tree(
    arena: &ModuleArena,
    idx: Index,
    base: Option<&Path>,
    expanded: &mut HashSet<Index>,
) -> Tree<String> {
    let Some(node) = arena.get_node(idx) else {
        return Tree::new(String::new());
    };
    let label = label(node, base);

    if !expanded.insert(idx) && !node.children.is_empty() {
        return Tree::new(format!("{} {}", label, "[shared]".dimmed()));
    }

    let leaves: Vec<_> = node
        .children
        .iter()
        .map(|&child| build_tree(arena, child, base, expanded))
        .collect();
    Tree::new(label).with_leaves(leaves)
}

/// `name: version (path)` plus a marker for anything but a clean resolve.
pub fn label(node: &ModuleNode, base: Option<&Path>) -> String {
    let data = &node.data;
    let path = match base {
        Some(base) => relative_to(base, &data.path),
        None => data.path.clone(),
    };
    let text = format!("{}: {} ({})", data.name, data.version, path.display());
    match data.status {
        NodeStatus::Resolved => text,
        NodeStatus::PartiallyResolved => format!("{} {}", text, "[partial]".yellow()),
        NodeStatus::Missing => format!("{} {}", text, "[missing]".red()),
        NodeStatus::Cyclic { .. } => format!("{} {}", text, "[cycle]".yellow().bold()),
        NodeStatus::Unresolved => format!("{} {}", text, "[unresolved]".red()),
    }
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use super::*;
    use crate::domain::{ModuleData, Version};

    fn module(name: &str, path: &str, status: NodeStatus) -> ModuleData {
        ModuleData {
            name: name.to_string(),
            module: name.to_lowercase(),
            path: PathBuf::from(path),
            version: Version::Unknown,
            release_file: None,
            status,
        }
    }

    #[test]
    fn given_shared_subtree_when_rendering_then_expands_it_once() {
        // Arrange
        colored::control::set_override(false);
        let mut tree = ModuleArena::new();
        let ioc = tree.insert_node(module("ioc", "/w/ioc", NodeStatus::Resolved), None);
        let calc = tree.insert_node(module("CALC", "/p/calc", NodeStatus::Resolved), Some(ioc));
        let asyn = tree.insert_node(module("ASYN", "/p/asyn", NodeStatus::Resolved), Some(calc));
        tree.insert_node(module("SNCSEQ", "/p/seq", NodeStatus::Resolved), Some(asyn));
        tree.add_child(ioc, asyn);
        tree.insert_node(module("GONE", "/p/gone", NodeStatus::Missing), Some(ioc));

        // Act
        let text = tree.to_tree_string(None).to_string();

        // Assert
        assert_eq!(text.matches("SNCSEQ").count(), 1);
        assert!(text.contains("ASYN: unknown (/p/asyn) [shared]"));
        assert!(text.contains("GONE: unknown (/p/gone) [missing]"));
    }

    #[test]
    fn given_base_when_labelling_then_path_is_relative() {
        // Arrange
        colored::control::set_override(false);
        let mut tree = ModuleArena::new();
        let ioc = tree.insert_node(module("ioc", "/w/ioc", NodeStatus::Resolved), None);
        let node = tree.get_node(ioc).unwrap();

        // Act
        let text = label(node, Some(Path::new("/w")));

        // Assert
        assert_eq!(text, "ioc: unknown (ioc)");
    }
}
