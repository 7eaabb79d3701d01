//! Domain layer: entities and business logic
//!
//! This layer is independent of external concerns (no I/O, no CLI, no config loading).

pub mod arena;
pub mod diagnostic;
pub mod entities;
pub mod error;
pub mod version;

pub use arena::{ModuleArena, ModuleNode};
pub use diagnostic::Diagnostic;
pub use entities::*;
pub use error::{DomainError, Severity};
pub use version::{classify_path, ReleaseKey, Version};
