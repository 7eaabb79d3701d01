//! Application-level errors

use std::path::PathBuf;
use thiserror::Error;

use crate::domain::DomainError;

/// Errors that stop an operation outright.
///
/// Per-module problems are not reported through this type; they end up as
/// diagnostics next to the resolved tree. The one exception is the root
/// module: without it there is nothing to resolve.
#[derive(Error, Debug)]
pub enum ApplicationError {
    #[error("cannot resolve root module {path}: {source}")]
    RootUnresolvable {
        path: PathBuf,
        #[source]
        source: DomainError,
    },

    #[error("config error: {message}")]
    Config { message: String },

    #[error("invalid glob pattern {pattern}: {message}")]
    Pattern { pattern: String, message: String },
}

/// Result type for application layer operations.
pub type ApplicationResult<T> = Result<T, ApplicationError>;
