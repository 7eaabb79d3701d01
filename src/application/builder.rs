//! Dependency graph construction.
//!
//! A pass walks the release files depth-first from a root module. Modules
//! are identified by install root: a module reached again from another
//! parent is shared, a module reached again from its own descendants is a
//! cycle and becomes a `Cyclic` leaf.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::vec;

use generational_arena::Index;
use rayon::prelude::*;
use tracing::{debug, instrument, warn};

use crate::application::error::{ApplicationError, ApplicationResult};
use crate::application::locator::{LocatedModule, ModuleLocator};
use crate::application::macros::{MacroResolver, MacroTable};
use crate::application::parser::{ParseOptions, ParsedRelease, ReleaseParser};
use crate::domain::{
    classify_path, Declaration, Diagnostic, DomainError, ModuleArena, ModuleData, NodeStatus,
};
use crate::infrastructure::traits::FileSystem;
use crate::util::path::normalize;

/// Settings of one resolution pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolveOptions {
    /// Macro definition files, searched in order
    pub macro_sources: Vec<PathBuf>,
    /// Fall back to the process environment for undefined macros
    pub include_environment: bool,
    /// Locate and parse unvisited siblings on the rayon pool
    pub parallel: bool,
    pub parse: ParseOptions,
}

impl Default for ResolveOptions {
    fn default() -> Self {
        Self {
            macro_sources: Vec::new(),
            include_environment: true,
            parallel: true,
            parse: ParseOptions::default(),
        }
    }
}

/// A resolved tree and every issue met while building it.
#[derive(Debug)]
pub struct Resolution {
    pub tree: ModuleArena,
    pub diagnostics: Vec<Diagnostic>,
}

impl Resolution {
    pub fn warnings(&self) -> impl Iterator<Item = &Diagnostic> {
        self.diagnostics.iter().filter(|d| d.is_warning())
    }

    pub fn errors(&self) -> impl Iterator<Item = &Diagnostic> {
        self.diagnostics.iter().filter(|d| !d.is_warning())
    }

    /// Issues recorded against `node`, either directly or as the related node.
    pub fn diagnostics_for(&self, node: Index) -> impl Iterator<Item = &Diagnostic> {
        self.diagnostics
            .iter()
            .filter(move |d| d.node == Some(node) || d.related == Some(node))
    }
}

pub struct DependencyGraphBuilder {
    fs: Arc<dyn FileSystem>,
    options: ResolveOptions,
}

impl DependencyGraphBuilder {
    pub fn new(fs: Arc<dyn FileSystem>, options: ResolveOptions) -> Self {
        Self { fs, options }
    }

    pub fn options(&self) -> &ResolveOptions {
        &self.options
    }

    /// Resolves the dependency tree rooted at the module installed at `root`.
    ///
    /// Fails only if the root module itself cannot be located or its release
    /// file cannot be read. Every other problem is returned as a diagnostic.
    #[instrument(level = "debug", skip(self), fields(root = %root.display()))]
    pub fn build(&self, root: &Path) -> ApplicationResult<Resolution> {
        let table = MacroTable::new(
            Arc::clone(&self.fs),
            self.options.macro_sources.clone(),
            self.options.include_environment,
        );
        let mut pass = ResolutionPass {
            ctx: PassContext {
                fs: self.fs.as_ref(),
                options: &self.options,
                resolver: MacroResolver::new(table),
            },
            tree: ModuleArena::new(),
            diagnostics: Vec::new(),
            visited: HashMap::new(),
            stack: Vec::new(),
        };

        pass.start(root)?;
        pass.run();
        Ok(pass.finish())
    }
}

/// Locate and parse outcome for one declared module.
struct Prepared {
    located: Result<LocatedModule, DomainError>,
    parsed: Option<Result<ParsedRelease, DomainError>>,
}

/// Read-only part of a pass, shared with prefetch workers.
struct PassContext<'a> {
    fs: &'a dyn FileSystem,
    options: &'a ResolveOptions,
    resolver: MacroResolver,
}

impl PassContext<'_> {
    fn prepare(&self, name: &str, path: &Path) -> Prepared {
        let located = ModuleLocator::new(self.fs).locate(name, path);
        let parsed = match &located {
            Ok(module) => module.release_file.as_ref().map(|release_file| {
                ReleaseParser::new(self.fs, &self.resolver, &self.options.parse)
                    .parse(release_file, &module.root)
            }),
            Err(_) => None,
        };
        Prepared { located, parsed }
    }

    /// Pairs each declaration with its prepared module when running in parallel.
    ///
    /// Declarations whose path is already known are left for the walk to
    /// link. The result keeps declaration order.
    fn prefetch(
        &self,
        declarations: Vec<Declaration>,
        visited: &HashMap<PathBuf, Index>,
    ) -> Vec<(Declaration, Option<Prepared>)> {
        if !self.options.parallel {
            return declarations.into_iter().map(|d| (d, None)).collect();
        }
        declarations
            .into_par_iter()
            .map(|d| {
                let prepared = (!visited.contains_key(&d.path)).then(|| self.prepare(&d.name, &d.path));
                (d, prepared)
            })
            .collect()
    }
}

/// A module whose declarations are being walked.
struct Frame {
    node: Index,
    pending: vec::IntoIter<(Declaration, Option<Prepared>)>,
}

struct ResolutionPass<'a> {
    ctx: PassContext<'a>,
    tree: ModuleArena,
    diagnostics: Vec<Diagnostic>,
    /// Declared paths and canonical roots of every node created in this pass
    visited: HashMap<PathBuf, Index>,
    /// Current ancestor chain, root first
    stack: Vec<Frame>,
}

impl ResolutionPass<'_> {
    fn start(&mut self, root: &Path) -> ApplicationResult<()> {
        let root = normalize(root);
        let fallback_name = root
            .file_name()
            .map(|f| f.to_string_lossy().into_owned())
            .unwrap_or_else(|| root.display().to_string());

        let prepared = self.ctx.prepare(&fallback_name, &root);
        let located = prepared
            .located
            .map_err(|source| ApplicationError::RootUnresolvable {
                path: root.clone(),
                source,
            })?;
        let parsed = prepared
            .parsed
            .transpose()
            .map_err(|source| ApplicationError::RootUnresolvable {
                path: root.clone(),
                source,
            })?;

        let name = located.name.clone().unwrap_or(fallback_name);
        let data = ModuleData {
            module: name.clone(),
            name,
            path: located.root.clone(),
            version: located.version.clone(),
            release_file: located.release_file.clone(),
            status: NodeStatus::Resolved,
        };
        let idx = self.tree.insert_node(data, None);
        self.register(idx, &root, &located);
        self.open(idx, parsed.map(Ok));
        Ok(())
    }

    fn run(&mut self) {
        while let Some(frame) = self.stack.last_mut() {
            let parent = frame.node;
            match frame.pending.next() {
                Some((declaration, prepared)) => self.visit(parent, declaration, prepared),
                None => {
                    self.stack.pop();
                }
            }
        }
    }

    fn finish(self) -> Resolution {
        let mut diagnostics = self.diagnostics;
        diagnostics.extend(
            self.ctx
                .resolver
                .table()
                .load_issues()
                .iter()
                .cloned()
                .map(Diagnostic::new),
        );
        debug!(
            "resolved {} modules with {} diagnostics",
            self.tree.len(),
            diagnostics.len()
        );
        Resolution {
            tree: self.tree,
            diagnostics,
        }
    }

    fn register(&mut self, idx: Index, declared: &Path, located: &LocatedModule) {
        self.visited.insert(declared.to_path_buf(), idx);
        self.visited.insert(located.canonical.clone(), idx);
    }

    /// Records the parse outcome on `idx` and pushes its declarations.
    fn open(&mut self, idx: Index, parsed: Option<Result<ParsedRelease, DomainError>>) {
        let status = match parsed {
            None => NodeStatus::Resolved,
            Some(Err(e)) => {
                warn!("{}", e);
                self.diagnostics.push(Diagnostic::new(e).with_node(idx));
                NodeStatus::Unresolved
            }
            Some(Ok(parsed)) => {
                let status = if parsed.partially_resolved() {
                    NodeStatus::PartiallyResolved
                } else {
                    NodeStatus::Resolved
                };
                self.diagnostics
                    .extend(parsed.diagnostics.into_iter().map(|d| d.with_node(idx)));
                let pending = self.ctx.prefetch(parsed.declarations, &self.visited);
                self.stack.push(Frame {
                    node: idx,
                    pending: pending.into_iter(),
                });
                status
            }
        };
        if let Some(node) = self.tree.get_node_mut(idx) {
            node.data.status = status;
        }
    }

    fn visit(&mut self, parent: Index, declaration: Declaration, prepared: Option<Prepared>) {
        if let Some(&idx) = self.visited.get(&declaration.path) {
            self.link(parent, idx, &declaration);
            return;
        }

        let prepared = prepared.unwrap_or_else(|| self.ctx.prepare(&declaration.name, &declaration.path));
        let located = match prepared.located {
            Ok(located) => located,
            Err(e) => {
                self.add_missing(parent, declaration, e);
                return;
            }
        };

        if let Some(&idx) = self.visited.get(&located.canonical) {
            self.visited.insert(declaration.path.clone(), idx);
            self.link(parent, idx, &declaration);
            return;
        }

        let data = ModuleData {
            module: located.name.clone().unwrap_or_else(|| declaration.name.clone()),
            name: declaration.name.clone(),
            path: located.root.clone(),
            version: located.version.clone(),
            release_file: located.release_file.clone(),
            status: NodeStatus::Resolved,
        };
        let idx = self.tree.insert_node(data, Some(parent));
        self.register(idx, &declaration.path, &located);
        self.open(idx, prepared.parsed);
    }

    fn add_missing(&mut self, parent: Index, declaration: Declaration, error: DomainError) {
        warn!("{}", error);
        let (module, version) = classify_path(&declaration.path);
        let data = ModuleData {
            module: module.unwrap_or_else(|| declaration.name.clone()),
            name: declaration.name,
            path: declaration.path.clone(),
            version,
            release_file: None,
            status: NodeStatus::Missing,
        };
        let idx = self.tree.insert_node(data, Some(parent));
        self.visited.insert(declaration.path, idx);
        self.diagnostics.push(
            Diagnostic::new(error)
                .with_node(idx)
                .at(declaration.source, declaration.line),
        );
    }

    /// Adds an already created module as a child of `parent`.
    ///
    /// If the module is on the current chain the edge closes a cycle and a
    /// `Cyclic` placeholder is added instead.
    fn link(&mut self, parent: Index, idx: Index, declaration: &Declaration) {
        let Some(position) = self.stack.iter().position(|f| f.node == idx) else {
            self.tree.add_child(parent, idx);
            return;
        };

        let Some(ancestor) = self.tree.get_node(idx).map(|n| n.data.clone()) else {
            return;
        };
        let cyclic = self.tree.insert_node(
            ModuleData {
                name: declaration.name.clone(),
                release_file: None,
                status: NodeStatus::Cyclic { ancestor: idx },
                ..ancestor
            },
            Some(parent),
        );

        let cycle: Vec<String> = self.stack[position..]
            .iter()
            .filter_map(|f| self.tree.get_node(f.node).map(|n| n.data.name.clone()))
            .chain(std::iter::once(declaration.name.clone()))
            .collect();
        warn!("dependency cycle: {}", cycle.join(" -> "));
        self.diagnostics.push(
            Diagnostic::new(DomainError::CycleDetected { cycle })
                .with_node(cyclic)
                .with_related(idx)
                .at(&declaration.source, declaration.line),
        );
    }
}
