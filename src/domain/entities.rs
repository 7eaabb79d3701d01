//! Domain entities: core data structures

use std::fmt;
use std::path::PathBuf;

use generational_arena::Index;

use crate::domain::version::Version;

/// Resolution state of a module node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeStatus {
    /// Release file parsed (or absent) and every dependency visited
    Resolved,
    /// Parsed, but at least one macro could not be expanded because of a cycle
    PartiallyResolved,
    /// No module exists at the declared path
    Missing,
    /// Repeats `ancestor` on the current dependency chain; never expanded
    Cyclic { ancestor: Index },
    /// The release file exists but could not be read
    Unresolved,
}

impl NodeStatus {
    pub fn label(&self) -> &'static str {
        match self {
            NodeStatus::Resolved => "resolved",
            NodeStatus::PartiallyResolved => "partially resolved",
            NodeStatus::Missing => "missing",
            NodeStatus::Cyclic { .. } => "cyclic",
            NodeStatus::Unresolved => "unresolved",
        }
    }

    pub fn is_cyclic(&self) -> bool {
        matches!(self, NodeStatus::Cyclic { .. })
    }
}

/// Data payload of a module node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModuleData {
    /// Dependency name as declared by the parent (derived from the path for the root)
    pub name: String,
    /// Module identity: metadata or install path name, else the declared name.
    /// Versions are compared between nodes sharing it.
    pub module: String,
    /// Absolute install root of the module
    pub path: PathBuf,
    pub version: Version,
    /// Release file the node's children were read from
    pub release_file: Option<PathBuf>,
    pub status: NodeStatus,
}

impl fmt::Display for ModuleData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {} ({})", self.name, self.version, self.path.display())
    }
}

/// One dependency line of a release file, after macro expansion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Declaration {
    pub name: String,
    /// Path expression as written
    pub expression: String,
    /// Expanded, absolute, lexically normalised path
    pub path: PathBuf,
    /// File the line came from (the release file or one it includes)
    pub source: PathBuf,
    pub line: usize,
}
