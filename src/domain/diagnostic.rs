//! Recoverable issues collected alongside a resolved tree.

use std::fmt;
use std::path::PathBuf;

use generational_arena::Index;

use crate::domain::error::{DomainError, Severity};

/// A recorded issue, optionally tied to a node and a source location.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    /// Node the issue was recorded against
    pub node: Option<Index>,
    /// Second node involved (the ancestor of a detected cycle)
    pub related: Option<Index>,
    /// File the issue was found in
    pub source: Option<PathBuf>,
    /// 1-based line within `source`
    pub line: Option<usize>,
    pub error: DomainError,
}

impl Diagnostic {
    pub fn new(error: DomainError) -> Self {
        Self {
            node: None,
            related: None,
            source: None,
            line: None,
            error,
        }
    }

    pub fn with_node(mut self, node: Index) -> Self {
        self.node = Some(node);
        self
    }

    pub fn with_related(mut self, node: Index) -> Self {
        self.related = Some(node);
        self
    }

    pub fn at(mut self, source: impl Into<PathBuf>, line: usize) -> Self {
        self.source = Some(source.into());
        self.line = Some(line);
        self
    }

    pub fn severity(&self) -> Severity {
        self.error.severity()
    }

    pub fn is_warning(&self) -> bool {
        self.severity() == Severity::Warning
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (&self.source, self.line) {
            (Some(source), Some(line)) => write!(f, "{}:{}: {}", source.display(), line, self.error),
            (Some(source), None) => write!(f, "{}: {}", source.display(), self.error),
            _ => write!(f, "{}", self.error),
        }
    }
}
