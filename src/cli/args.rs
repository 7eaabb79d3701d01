//! CLI argument definitions using clap

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueHint};

use crate::application::DEFAULT_GLOB;

/// Resolve and audit dependency trees of support modules declared in RELEASE files
#[derive(Parser, Debug)]
#[command(name = "reltree")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Debug output (repeat for more: -d info, -dd debug, -ddd trace)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    pub debug: u8,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Print the dependency tree with conflicts and cycles
    Tree {
        #[command(flatten)]
        resolve: ResolveArgs,
        /// Print module paths relative to the root module
        #[arg(short, long)]
        relative: bool,
    },

    /// Print only the conflict and cycle report
    Check {
        #[command(flatten)]
        resolve: ResolveArgs,
    },

    /// List every module once, dependencies first
    List {
        #[command(flatten)]
        resolve: ResolveArgs,
    },

    /// List files matching a glob below every module
    Paths {
        #[command(flatten)]
        resolve: ResolveArgs,
        /// Glob appended to each module path (repeatable)
        #[arg(short, long = "glob", default_value = DEFAULT_GLOB)]
        globs: Vec<String>,
        /// Separator between paths
        #[arg(short, long, default_value = ":", conflicts_with = "newline")]
        separator: String,
        /// One path per line
        #[arg(short, long)]
        newline: bool,
    },

    /// Suggest newer releases for the direct dependencies (nothing is written)
    Updates {
        #[command(flatten)]
        resolve: ResolveArgs,
        /// Take the newest release of each dependency even if versions then conflict
        #[arg(long)]
        latest: bool,
    },

    /// Manage settings
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },

    /// Generate shell completions
    Completion {
        /// Shell type
        #[arg(value_enum)]
        shell: clap_complete::Shell,
    },
}

/// Options shared by every command that resolves a tree.
#[derive(Args, Debug, Clone)]
pub struct ResolveArgs {
    /// Root module: install directory, RELEASE file, or a name below an area root
    #[arg(value_hint = ValueHint::AnyPath)]
    pub module: PathBuf,

    /// Macro definition file, searched before configured sources (repeatable)
    #[arg(short, long = "macros", value_hint = ValueHint::FilePath)]
    pub macros: Vec<PathBuf>,

    /// Apply RELEASE.<ARCH>.Common / RELEASE.<ARCH> overlays
    #[arg(long)]
    pub host_arch: Option<String>,

    /// Ignore include and -include directives
    #[arg(long)]
    pub no_includes: bool,

    /// Resolve on a single thread
    #[arg(long)]
    pub sequential: bool,
}

#[derive(Subcommand, Debug)]
pub enum ConfigCommands {
    /// Show merged config
    Show {
        /// Module whose local config is merged in
        module: Option<PathBuf>,
    },

    /// Create config template
    Init {
        /// Create global config
        #[arg(short, long)]
        global: bool,
    },

    /// Show config paths
    Path,
}
