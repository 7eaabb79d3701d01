//! Command dispatch

use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::CommandFactory;
use clap_complete::{generate, Shell};
use itertools::Itertools;
use tracing::{debug, instrument};

use crate::application::{
    analyze, module_paths, DependencyGraphBuilder, Report, Resolution, ResolveOptions,
    UpdatePlanner,
};
use crate::cli::args::{Cli, Commands, ConfigCommands, ResolveArgs};
use crate::cli::error::{CliError, CliResult};
use crate::cli::output;
use crate::cli::render::TreeNodeConvert;
use crate::config::{global_config_path, local_config_path, Settings};
use crate::exitcode;
use crate::infrastructure::{FileSystem, InfraError, RealFileSystem};
use crate::util::path::absolutize;

/// Runs the selected command and returns the process exit code.
pub fn execute_command(cli: &Cli) -> CliResult<i32> {
    match &cli.command {
        Commands::Tree { resolve, relative } => cmd_tree(resolve, *relative),
        Commands::Check { resolve } => cmd_check(resolve),
        Commands::List { resolve } => cmd_list(resolve),
        Commands::Paths {
            resolve,
            globs,
            separator,
            newline,
        } => cmd_paths(resolve, globs, separator, *newline),
        Commands::Updates { resolve, latest } => cmd_updates(resolve, *latest),
        Commands::Config { command } => cmd_config(command),
        Commands::Completion { shell } => cmd_completion(*shell),
    }
}

fn current_dir() -> CliResult<PathBuf> {
    std::env::current_dir().map_err(|e| InfraError::io("current directory", e).into())
}

/// Root module path for the command line argument.
///
/// A bare name that does not exist relative to the working directory is
/// looked up below the configured area roots.
fn root_module(fs: &dyn FileSystem, arg: &Path, settings: &Settings) -> CliResult<PathBuf> {
    let candidate = absolutize(&current_dir()?, arg);
    if fs.exists(&candidate) || arg.components().count() != 1 {
        return Ok(candidate);
    }
    Ok(settings
        .area_roots
        .iter()
        .map(|root| root.join(arg))
        .find(|p| fs.exists(p))
        .unwrap_or(candidate))
}

/// File system, root module and resolve options for the command line.
fn prepare(args: &ResolveArgs) -> CliResult<(Arc<dyn FileSystem>, PathBuf, ResolveOptions)> {
    let fs: Arc<dyn FileSystem> = Arc::new(RealFileSystem);

    let candidate = absolutize(&current_dir()?, &args.module);
    let local_dir = fs.is_dir(&candidate).then_some(candidate.as_path());
    let settings = Settings::load(local_dir)?;
    let module = root_module(fs.as_ref(), &args.module, &settings)?;
    debug!("root module: {}", module.display());

    let mut options = ResolveOptions::from(&settings);
    options.macro_sources = args
        .macros
        .iter()
        .cloned()
        .chain(options.macro_sources)
        .collect();
    if let Some(arch) = &args.host_arch {
        options.parse.host_arch = Some(arch.clone());
    }
    if args.no_includes {
        options.parse.follow_includes = false;
    }
    if args.sequential {
        options.parallel = false;
    }
    Ok((fs, module, options))
}

#[instrument(level = "debug")]
fn resolve(args: &ResolveArgs) -> CliResult<(PathBuf, Resolution)> {
    let (fs, module, options) = prepare(args)?;
    let resolution = DependencyGraphBuilder::new(fs, options).build(&module)?;
    let root = resolution
        .tree
        .root()
        .and_then(|idx| resolution.tree.get_node(idx))
        .map(|node| node.data.path.clone())
        .unwrap_or(module);
    Ok((root, resolution))
}

fn print_diagnostics(resolution: &Resolution) {
    for d in resolution.warnings() {
        output::warning(d);
    }
    for d in resolution.errors() {
        output::error(d);
    }
}

fn print_report(report: &Report) -> i32 {
    if report.has_issues() {
        output::failure(&report.to_string().trim_end());
        exitcode::ISSUES
    } else {
        output::success(report);
        exitcode::OK
    }
}

fn cmd_tree(args: &ResolveArgs, relative: bool) -> CliResult<i32> {
    let (root, resolution) = resolve(args)?;
    let base = relative.then_some(root.as_path());
    output::info(&resolution.tree.to_tree_string(base));
    print_diagnostics(&resolution);
    Ok(print_report(&analyze(&resolution.tree)))
}

fn cmd_check(args: &ResolveArgs) -> CliResult<i32> {
    let (_, resolution) = resolve(args)?;
    print_diagnostics(&resolution);
    Ok(print_report(&analyze(&resolution.tree)))
}

fn cmd_list(args: &ResolveArgs) -> CliResult<i32> {
    let (_, resolution) = resolve(args)?;
    let tree = &resolution.tree;
    for node in tree.flatten().into_iter().filter_map(|idx| tree.get_node(idx)) {
        output::info(&format!(
            "{:<20} {:<16} {}",
            node.data.name,
            node.data.version,
            node.data.path.display()
        ));
    }
    Ok(exitcode::OK)
}

fn cmd_paths(args: &ResolveArgs, globs: &[String], separator: &str, newline: bool) -> CliResult<i32> {
    let (_, resolution) = resolve(args)?;
    let paths = module_paths(&resolution.tree, globs)?;
    let separator = if newline { "\n" } else { separator };
    output::info(&paths.iter().map(|p| p.display()).join(separator));
    Ok(exitcode::OK)
}

fn cmd_updates(args: &ResolveArgs, latest: bool) -> CliResult<i32> {
    let (fs, module, options) = prepare(args)?;
    let resolution = DependencyGraphBuilder::new(Arc::clone(&fs), options.clone()).build(&module)?;
    print_diagnostics(&resolution);
    let plan = UpdatePlanner::new(fs, options).plan(&resolution.tree, !latest);
    if plan.is_consistent() {
        output::success(&plan.to_string().trim_end());
        Ok(exitcode::OK)
    } else {
        output::failure(&plan.to_string().trim_end());
        Ok(exitcode::ISSUES)
    }
}

fn cmd_config(command: &ConfigCommands) -> CliResult<i32> {
    match command {
        ConfigCommands::Show { module } => {
            let settings = Settings::load(module.as_deref())?;
            output::info(&settings.to_toml()?);
        }
        ConfigCommands::Init { global } => {
            let path = if *global {
                global_config_path()
                    .ok_or_else(|| CliError::Usage("cannot determine config directory".into()))?
            } else {
                local_config_path(&current_dir()?)
            };
            if path.exists() {
                return Err(CliError::Usage(format!(
                    "config already exists: {}",
                    path.display()
                )));
            }
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)
                    .map_err(|e| InfraError::io(format!("create {}", parent.display()), e))?;
            }
            std::fs::write(&path, Settings::template())
                .map_err(|e| InfraError::io(format!("write {}", path.display()), e))?;
            output::action("Created", &path.display());
        }
        ConfigCommands::Path => {
            output::header("Config files");
            let global = global_config_path();
            let local = local_config_path(&current_dir()?);
            for (label, path) in [("global", global.as_deref()), ("local", Some(local.as_path()))] {
                match path {
                    Some(p) if p.exists() => output::detail(&format!("{label}: {}", p.display())),
                    Some(p) => output::detail(&format!("{label}: {} (not found)", p.display())),
                    None => output::detail(&format!("{label}: unavailable")),
                }
            }
        }
    }
    Ok(exitcode::OK)
}

fn cmd_completion(shell: Shell) -> CliResult<i32> {
    let mut cmd = Cli::command();
    let name = cmd.get_name().to_string();
    generate(shell, &mut cmd, name, &mut io::stdout());
    Ok(exitcode::OK)
}
