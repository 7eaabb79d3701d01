//! Update suggestions for the direct dependencies of a module.
//!
//! Each direct dependency moves to the newest installed release of the same
//! module. While the resulting set pulls some module in at several versions,
//! the dependency bringing in the newest of them steps back one release.
//! Nothing is written: the plan lists the release file changes to make.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use itertools::Itertools;
use rayon::prelude::*;
use tracing::{debug, info, instrument, trace, warn};

use crate::application::builder::{DependencyGraphBuilder, ResolveOptions};
use crate::application::locator::ModuleLocator;
use crate::domain::{ModuleArena, ReleaseKey, Version};
use crate::infrastructure::traits::FileSystem;

/// One installed release of a module.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Release {
    pub version: Version,
    pub path: PathBuf,
}

/// A direct dependency moved to another release.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpdateChange {
    /// Name declared in the release file
    pub name: String,
    pub module: String,
    pub from: Release,
    pub to: Release,
}

/// A module still pulled in at several versions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Inconsistency {
    pub module: String,
    /// Lowest release first
    pub versions: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UpdatePlan {
    pub changes: Vec<UpdateChange>,
    /// Left over after rolling back; empty for a consistent plan
    pub inconsistencies: Vec<Inconsistency>,
}

impl UpdatePlan {
    pub fn is_consistent(&self) -> bool {
        self.inconsistencies.is_empty()
    }
}

/// Module and version of every node in one release's dependency tree.
type Contents = Vec<(String, Version)>;

/// A direct dependency: its current release first, newer ones after.
struct Candidate {
    name: String,
    module: String,
    releases: Vec<Release>,
    selected: usize,
}

impl Candidate {
    fn selected_release(&self) -> &Release {
        &self.releases[self.selected]
    }
}

pub struct UpdatePlanner {
    fs: Arc<dyn FileSystem>,
    options: ResolveOptions,
}

impl UpdatePlanner {
    pub fn new(fs: Arc<dyn FileSystem>, options: ResolveOptions) -> Self {
        Self { fs, options }
    }

    /// `current` followed by the installed releases of `module` newer than
    /// it, lowest first.
    ///
    /// Releases are looked for next to `current` and below every area root,
    /// both as `<dir>/<module>/<version>` and `<dir>/<module>-<version>`.
    /// A release without a known version has no newer releases.
    pub fn releases(&self, module: &str, current: &Release) -> Vec<Release> {
        let Some(current_key) = current.version.release_key() else {
            return vec![current.clone()];
        };
        let locator = ModuleLocator::new(self.fs.as_ref());

        let newer = self
            .search_dirs(module, &current.path)
            .into_iter()
            .flat_map(|dir| match self.fs.read_dir(&dir) {
                Ok(entries) => entries,
                Err(e) => {
                    trace!("cannot list {}: {}", dir.display(), e);
                    Vec::new()
                }
            })
            .filter(|path| !path.to_string_lossy().ends_with(".tar.gz") && self.fs.is_dir(path))
            .unique()
            .filter_map(|path| {
                let located = locator.locate(module, &path).ok()?;
                let key = located.version.release_key()?;
                (located.name.as_deref() == Some(module) && key > current_key).then_some((
                    key,
                    Release {
                        version: located.version,
                        path: located.root,
                    },
                ))
            })
            .sorted_by(|a, b| a.0.cmp(&b.0))
            .dedup_by(|a, b| a.0 == b.0)
            .map(|(_, release)| release);

        std::iter::once(current.clone()).chain(newer).collect()
    }

    fn search_dirs(&self, module: &str, current: &Path) -> Vec<PathBuf> {
        current
            .parent()
            .map(Path::to_path_buf)
            .into_iter()
            .chain(
                self.options
                    .parse
                    .area_roots
                    .iter()
                    .flat_map(|root| [root.join(module), root.clone()]),
            )
            .unique()
            .collect()
    }

    /// Plans updates for the direct dependencies of the tree's root.
    ///
    /// With `consistent`, updates are rolled back one release at a time
    /// until no module is pulled in at two versions, or until no rollback
    /// is left that could help.
    #[instrument(level = "debug", skip(self, tree))]
    pub fn plan(&self, tree: &ModuleArena, consistent: bool) -> UpdatePlan {
        let Some(root_idx) = tree.root() else {
            return UpdatePlan::default();
        };
        let Some(root) = tree.get_node(root_idx) else {
            return UpdatePlan::default();
        };
        let root_entry = (root.data.module.clone(), root.data.version.clone());

        let mut candidates: Vec<Candidate> = tree
            .children(root_idx)
            .filter(|(_, node)| !node.data.status.is_cyclic())
            .unique_by(|(idx, _)| *idx)
            .map(|(_, node)| {
                let current = Release {
                    version: node.data.version.clone(),
                    path: node.data.path.clone(),
                };
                let releases = self.releases(&node.data.module, &current);
                debug!("{}: {} candidate releases", node.data.name, releases.len());
                Candidate {
                    name: node.data.name.clone(),
                    module: node.data.module.clone(),
                    selected: releases.len().saturating_sub(1),
                    releases,
                }
            })
            .collect();

        let contents = self.scan_all(&candidates);
        let mut remaining = find_inconsistencies(selected_entries(&root_entry, &candidates, &contents));

        if consistent {
            while !remaining.is_empty() {
                let reverted = remaining
                    .iter()
                    .any(|conflict| revert_one(&mut candidates, conflict, &contents));
                if !reverted {
                    warn!("no rollback resolves the remaining conflicts");
                    break;
                }
                remaining = find_inconsistencies(selected_entries(&root_entry, &candidates, &contents));
            }
        }

        UpdatePlan {
            changes: candidates
                .iter()
                .filter(|c| c.selected > 0)
                .map(|c| UpdateChange {
                    name: c.name.clone(),
                    module: c.module.clone(),
                    from: c.releases[0].clone(),
                    to: c.selected_release().clone(),
                })
                .collect(),
            inconsistencies: remaining,
        }
    }

    /// Resolves every candidate release once, on the rayon pool.
    fn scan_all(&self, candidates: &[Candidate]) -> HashMap<PathBuf, Contents> {
        let releases: Vec<(&str, &Release)> = candidates
            .iter()
            .flat_map(|c| c.releases.iter().map(move |r| (c.module.as_str(), r)))
            .unique_by(|(_, r)| r.path.clone())
            .collect();
        releases
            .into_par_iter()
            .map(|(module, release)| (release.path.clone(), self.scan(module, release)))
            .collect()
    }

    fn scan(&self, module: &str, release: &Release) -> Contents {
        let builder = DependencyGraphBuilder::new(Arc::clone(&self.fs), self.options.clone());
        match builder.build(&release.path) {
            Ok(resolution) => resolution
                .tree
                .iter()
                .filter(|(_, node)| !node.data.status.is_cyclic())
                .map(|(_, node)| (node.data.module.clone(), node.data.version.clone()))
                .collect(),
            Err(e) => {
                debug!("{}", e);
                vec![(module.to_string(), release.version.clone())]
            }
        }
    }
}

fn selected_entries<'a>(
    root: &'a (String, Version),
    candidates: &'a [Candidate],
    contents: &'a HashMap<PathBuf, Contents>,
) -> impl Iterator<Item = &'a (String, Version)> {
    std::iter::once(root).chain(
        candidates
            .iter()
            .flat_map(move |c| contents.get(&c.selected_release().path).into_iter().flatten()),
    )
}

fn find_inconsistencies<'a>(entries: impl Iterator<Item = &'a (String, Version)>) -> Vec<Inconsistency> {
    let mut by_module: BTreeMap<&str, Vec<(ReleaseKey, &str)>> = BTreeMap::new();
    for (module, version) in entries {
        if let Some(key) = version.release_key() {
            by_module
                .entry(module.as_str())
                .or_default()
                .push((key, version.as_str()));
        }
    }
    by_module
        .into_iter()
        .filter_map(|(module, versions)| {
            let versions: Vec<String> = versions
                .into_iter()
                .sorted_by(|a, b| a.0.cmp(&b.0))
                .dedup_by(|a, b| a.0 == b.0)
                .map(|(_, version)| version.to_string())
                .collect();
            (versions.len() > 1).then(|| Inconsistency {
                module: module.to_string(),
                versions,
            })
        })
        .collect()
}

/// Steps back the updated dependency that brings in the newest version of
/// the conflicting module. Returns false if none can step back.
fn revert_one(candidates: &mut [Candidate], conflict: &Inconsistency, contents: &HashMap<PathBuf, Contents>) -> bool {
    for version in conflict.versions.iter().rev() {
        let key = ReleaseKey::new(version);
        let culprit = candidates.iter().position(|c| {
            c.selected > 0
                && contents.get(&c.selected_release().path).is_some_and(|entries| {
                    entries
                        .iter()
                        .any(|(module, v)| *module == conflict.module && v.release_key().as_ref() == Some(&key))
                })
        });
        if let Some(i) = culprit {
            let candidate = &mut candidates[i];
            candidate.selected -= 1;
            info!(
                "reverting {} to {} ({} pulls in {} {})",
                candidate.name,
                candidate.selected_release().version,
                candidate.name,
                conflict.module,
                version
            );
            return true;
        }
    }
    false
}

impl fmt::Display for UpdatePlan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.changes.is_empty() {
            writeln!(f, "No updates available.")?;
        } else {
            writeln!(f, "Updates ({}):", self.changes.len())?;
            for change in &self.changes {
                writeln!(f, "  {}", change)?;
            }
        }
        if !self.inconsistencies.is_empty() {
            writeln!(f, "Still inconsistent ({}):", self.inconsistencies.len())?;
            for i in &self.inconsistencies {
                writeln!(f, "  {}: {}", i.module, i.versions.join(", "))?;
            }
        }
        Ok(())
    }
}

impl fmt::Display for UpdateChange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}: {} -> {} ({})",
            self.name,
            self.from.version,
            self.to.version,
            self.to.path.display()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(module: &str, version: &str) -> (String, Version) {
        (module.to_string(), Version::Known(version.to_string()))
    }

    #[test]
    fn given_equivalent_versions_when_finding_inconsistencies_then_none() {
        let entries = [entry("asyn", "4.21"), entry("asyn", "4-21"), entry("calc", "3-7")];

        let found = find_inconsistencies(entries.iter());

        assert!(found.is_empty());
    }

    #[test]
    fn given_unknown_and_two_known_versions_when_finding_inconsistencies_then_lists_known_lowest_first() {
        let entries = [
            entry("motor", "6-10"),
            ("motor".to_string(), Version::Unknown),
            entry("motor", "6-9"),
        ];

        let found = find_inconsistencies(entries.iter());

        assert_eq!(
            found,
            vec![Inconsistency {
                module: "motor".into(),
                versions: vec!["6-9".into(), "6-10".into()],
            }]
        );
    }

    #[test]
    fn given_plan_when_displaying_then_lists_changes_and_leftovers() {
        let plan = UpdatePlan {
            changes: vec![UpdateChange {
                name: "ASYN".into(),
                module: "asyn".into(),
                from: Release {
                    version: Version::Known("4-21".into()),
                    path: PathBuf::from("/prod/asyn/4-21"),
                },
                to: Release {
                    version: Version::Known("4-22".into()),
                    path: PathBuf::from("/prod/asyn/4-22"),
                },
            }],
            inconsistencies: vec![Inconsistency {
                module: "calc".into(),
                versions: vec!["3-6".into(), "3-7".into()],
            }],
        };

        let text = plan.to_string();

        assert!(text.contains("ASYN: 4-21 -> 4-22 (/prod/asyn/4-22)"));
        assert!(text.contains("calc: 3-6, 3-7"));
        assert!(!plan.is_consistent());
    }
}
