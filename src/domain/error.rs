//! Domain-level errors (no external dependencies)

use std::path::PathBuf;
use thiserror::Error;

/// How much a recorded issue matters for the resolved tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Severity {
    Warning,
    Error,
}

/// Per-module failures met while resolving a tree.
///
/// None of these abort a resolution pass: they are attached to the affected
/// node as diagnostics and the pass continues with the remaining modules.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DomainError {
    #[error("file not found: {0}")]
    FileNotFound(PathBuf),

    #[error("cannot read {path}: {reason}")]
    UnreadableFile { path: PathBuf, reason: String },

    #[error("cannot read macro definitions {path}: {reason}")]
    UnreadableMacroSource { path: PathBuf, reason: String },

    #[error("can't find module {name} at {path}")]
    ModuleNotFound { name: String, path: PathBuf },

    #[error("macro cycle while expanding $({name}): {}", chain.join(" -> "))]
    MacroCycle { name: String, chain: Vec<String> },

    #[error("unresolved macro: $({0})")]
    UnresolvedMacro(String),

    #[error("malformed line {line}: {content}")]
    MalformedLine { line: usize, content: String },

    #[error("include file not found: {0}")]
    MissingInclude(PathBuf),

    #[error("cycle detected: {}", cycle.join(" -> "))]
    CycleDetected { cycle: Vec<String> },
}

impl DomainError {
    pub fn severity(&self) -> Severity {
        match self {
            DomainError::MalformedLine { .. }
            | DomainError::UnresolvedMacro(_)
            | DomainError::MissingInclude(_)
            | DomainError::UnreadableMacroSource { .. } => Severity::Warning,
            _ => Severity::Error,
        }
    }
}
