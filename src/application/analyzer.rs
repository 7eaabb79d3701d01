//! Version conflict and dependency cycle detection over a resolved tree.

use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::path::PathBuf;

use generational_arena::Index;
use itertools::Itertools;
use tracing::{debug, instrument};

use crate::domain::{ModuleArena, NodeStatus, Version};

/// Where one variant of a conflicting module enters the tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConflictLocation {
    pub node: Index,
    /// Module declaring the dependency, `None` for the root
    pub parent: Option<Index>,
    pub introduced_by: Option<String>,
    /// Declared names from the root down to `parent`
    pub chain: Vec<String>,
    pub version: Version,
    pub path: PathBuf,
}

/// One module resolved at more than one concrete version.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionConflict {
    /// Module identity shared by the conflicting nodes
    pub name: String,
    /// Distinct known versions, lowest release first
    pub versions: Vec<String>,
    pub locations: Vec<ConflictLocation>,
}

/// Module names forming a cycle, starting and ending with the same module.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DependencyCycle {
    pub path: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Report {
    pub conflicts: Vec<VersionConflict>,
    pub cycles: Vec<DependencyCycle>,
}

impl Report {
    pub fn has_issues(&self) -> bool {
        !self.conflicts.is_empty() || !self.cycles.is_empty()
    }
}

/// Collects version conflicts and cycles. Read-only; repeatable.
#[instrument(level = "debug", skip(tree))]
pub fn analyze(tree: &ModuleArena) -> Report {
    let report = Report {
        conflicts: find_conflicts(tree),
        cycles: find_cycles(tree),
    };
    debug!(
        "{} conflicts, {} cycles",
        report.conflicts.len(),
        report.cycles.len()
    );
    report
}

fn find_conflicts(tree: &ModuleArena) -> Vec<VersionConflict> {
    let mut by_module: BTreeMap<&str, Vec<ConflictLocation>> = BTreeMap::new();
    let mut seen_edges: HashSet<(Option<Index>, Index)> = HashSet::new();

    let mut record = |node: Index, parent: Option<Index>| {
        let Some(module) = tree.get_node(node) else {
            return;
        };
        // cyclic placeholders repeat their ancestor
        if module.data.status.is_cyclic() || !seen_edges.insert((parent, node)) {
            return;
        }
        by_module
            .entry(module.data.module.as_str())
            .or_default()
            .push(ConflictLocation {
                node,
                parent,
                introduced_by: parent
                    .and_then(|p| tree.get_node(p))
                    .map(|p| p.data.name.clone()),
                chain: parent
                    .map(|p| tree.name_path(p).into_iter().map(String::from).collect())
                    .unwrap_or_default(),
                version: module.data.version.clone(),
                path: module.data.path.clone(),
            });
    };

    if let Some(root) = tree.root() {
        record(root, None);
    }
    for (idx, node) in tree.iter() {
        for &child in &node.children {
            record(child, Some(idx));
        }
    }

    by_module
        .into_iter()
        .filter_map(|(name, locations)| {
            // `1.2` and `1-2` name the same release
            let versions: Vec<String> = locations
                .iter()
                .filter_map(|l| l.version.release_key().map(|key| (key, l.version.as_str())))
                .unique_by(|(key, _)| key.clone())
                .sorted_by(|a, b| a.0.cmp(&b.0))
                .map(|(_, version)| version.to_string())
                .collect();
            (versions.len() > 1).then(|| VersionConflict {
                name: name.to_string(),
                versions,
                locations: locations
                    .into_iter()
                    .filter(|l| l.version.is_known())
                    .collect(),
            })
        })
        .collect()
}

fn find_cycles(tree: &ModuleArena) -> Vec<DependencyCycle> {
    let mut seen: HashSet<Vec<String>> = HashSet::new();
    let mut cycles = Vec::new();

    for (idx, node) in tree.iter() {
        let NodeStatus::Cyclic { ancestor } = node.data.status else {
            continue;
        };

        // parent links follow the chain the cycle was found on
        let mut chain = vec![idx];
        let mut current = node.parent;
        while let Some(p) = current {
            chain.push(p);
            if p == ancestor {
                break;
            }
            current = tree.get_node(p).and_then(|n| n.parent);
        }

        let path: Vec<String> = chain
            .iter()
            .rev()
            .filter_map(|&i| tree.get_node(i).map(|n| n.data.name.clone()))
            .collect();

        if seen.insert(rotation_key(&path)) {
            cycles.push(DependencyCycle { path });
        }
    }
    cycles
}

/// Members of a cycle rotated to start at the smallest name, so the same
/// cycle entered at a different module compares equal.
fn rotation_key(path: &[String]) -> Vec<String> {
    let members = &path[..path.len().saturating_sub(1)];
    let start = members
        .iter()
        .position_min()
        .unwrap_or_default();
    members[start..]
        .iter()
        .chain(&members[..start])
        .cloned()
        .collect()
}

impl fmt::Display for Report {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if !self.has_issues() {
            return write!(f, "No version conflicts or cycles.");
        }
        if !self.conflicts.is_empty() {
            writeln!(f, "Version conflicts ({}):", self.conflicts.len())?;
            for c in &self.conflicts {
                writeln!(f, "  {}", c)?;
            }
        }
        if !self.cycles.is_empty() {
            writeln!(f, "Dependency cycles ({}):", self.cycles.len())?;
            for c in &self.cycles {
                writeln!(f, "  {}", c)?;
            }
        }
        Ok(())
    }
}

impl fmt::Display for VersionConflict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.name, self.versions.join(", "))?;
        for l in &self.locations {
            let from = if l.chain.is_empty() {
                "<root>".to_string()
            } else {
                l.chain.join(" -> ")
            };
            write!(f, "\n    {} from {} ({})", l.version, from, l.path.display())?;
        }
        Ok(())
    }
}

impl fmt::Display for DependencyCycle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.path.join(" -> "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn given_empty_report_when_displaying_then_says_clean() {
        let report = Report::default();
        assert!(!report.has_issues());
        assert_eq!(report.to_string(), "No version conflicts or cycles.");
    }

    #[test]
    fn given_rotated_cycles_when_keying_then_equal() {
        let a: Vec<String> = ["B", "A", "B"].map(String::from).to_vec();
        let b: Vec<String> = ["A", "B", "A"].map(String::from).to_vec();
        assert_eq!(rotation_key(&a), rotation_key(&b));
    }

    #[test]
    fn given_cycle_when_displaying_then_joins_with_arrows() {
        let cycle = DependencyCycle {
            path: ["A", "B", "A"].map(String::from).to_vec(),
        };
        assert_eq!(cycle.to_string(), "A -> B -> A");
    }
}
