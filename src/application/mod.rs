//! Application layer: the resolution core
//!
//! This layer turns release files on disk into a dependency tree and a
//! report. All file access goes through the `FileSystem` boundary trait.

pub mod analyzer;
pub mod builder;
pub mod error;
pub mod locator;
pub mod macros;
pub mod parser;
pub mod paths;
pub mod updates;

pub use analyzer::{analyze, ConflictLocation, DependencyCycle, Report, VersionConflict};
pub use builder::{DependencyGraphBuilder, Resolution, ResolveOptions};
pub use error::{ApplicationError, ApplicationResult};
pub use locator::{LocatedModule, ModuleLocator, METADATA_CANDIDATES, RELEASE_CANDIDATES};
pub use macros::{Expansion, MacroResolver, MacroTable, Scope};
pub use parser::{split_declaration, ParseOptions, ParsedRelease, ReleaseParser};
pub use paths::{module_paths, DEFAULT_GLOB};
pub use updates::{Inconsistency, Release, UpdateChange, UpdatePlan, UpdatePlanner};
