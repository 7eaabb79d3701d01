//! reltree: dependency trees of support modules
//!
//! A support module declares its dependencies in a RELEASE file, one
//! `NAME PATH` line per dependency, where paths may use `$(MACRO)` tokens.
//! Starting from a root module, reltree follows these files recursively,
//! builds the dependency tree, and reports modules pulled in at several
//! versions as well as dependency cycles.
//!
//! ```no_run
//! use std::path::Path;
//! use std::sync::Arc;
//!
//! use reltree::application::{analyze, DependencyGraphBuilder, ResolveOptions};
//! use reltree::infrastructure::RealFileSystem;
//!
//! let builder = DependencyGraphBuilder::new(Arc::new(RealFileSystem), ResolveOptions::default());
//! let resolution = builder.build(Path::new("/dls_sw/prod/R3.14.12.7/ioc/BL01I")).unwrap();
//! let report = analyze(&resolution.tree);
//! println!("{report}");
//! ```
//!
//! Layers:
//! - [`domain`]: tree, versions, diagnostics; no I/O
//! - [`application`]: macro expansion, parsing, locating, building, analysis
//! - [`infrastructure`]: filesystem boundary
//! - [`cli`]: command line front end

pub mod application;
pub mod cli;
pub mod config;
pub mod domain;
pub mod exitcode;
pub mod infrastructure;
pub mod util;
