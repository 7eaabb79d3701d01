//! Listing files below every module of a tree.

use std::path::PathBuf;

use glob::Pattern;
use tracing::{debug, instrument, trace};

use crate::application::error::{ApplicationError, ApplicationResult};
use crate::domain::{ModuleArena, NodeStatus};

/// Glob applied when none is given.
pub const DEFAULT_GLOB: &str = "/data";

/// Paths matching `<module path><glob>` for each module of the flattened
/// tree and each glob, in that order.
///
/// A glob is appended verbatim, so it normally starts with `/`, e.g. `/db`
/// or `/*App/opi/edl/*.edl`. Missing modules are skipped.
#[instrument(level = "debug", skip(tree))]
pub fn module_paths(tree: &ModuleArena, globs: &[String]) -> ApplicationResult<Vec<PathBuf>> {
    let mut out = Vec::new();
    for idx in tree.flatten() {
        let Some(node) = tree.get_node(idx) else {
            continue;
        };
        if node.data.status == NodeStatus::Missing {
            continue;
        }
        let base = Pattern::escape(&node.data.path.to_string_lossy());
        for g in globs {
            let pattern = format!("{base}{g}");
            let entries = glob::glob(&pattern).map_err(|e| ApplicationError::Pattern {
                pattern: pattern.clone(),
                message: e.to_string(),
            })?;
            for entry in entries {
                match entry {
                    Ok(path) => out.push(path),
                    Err(e) => trace!("skipping {}", e),
                }
            }
        }
    }
    debug!("{} paths matched", out.len());
    Ok(out)
}
