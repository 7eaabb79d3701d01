//! Release file parsing.
//!
//! A release file lists a module's direct dependencies, one per line:
//!
//! ```text
//! # comment
//! SUPPORT=/dls_sw/prod/R3.14.12.7/support
//! ASYN            $(SUPPORT)/asyn/4-41
//! CALC = $(SUPPORT)/calc/3-7-3
//! -include $(TOP)/configure/RELEASE.private
//! ```
//!
//! Every declaration also defines a macro visible to later lines of the same
//! file. Declarations that only make sense as macros (flags, install-area
//! roots, skip-listed names) are not reported as dependencies.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use tracing::{debug, instrument, trace};

use crate::application::locator::builder_module_root;
use crate::application::macros::{MacroResolver, Scope};
use crate::domain::{Declaration, Diagnostic, DomainError};
use crate::infrastructure::traits::FileSystem;
use crate::util::path::{absolutize, normalize};

/// Macro name bound to the module root in every release file.
pub const TOP: &str = "TOP";

const FLAGS: [&str; 4] = ["YES", "NO", "TRUE", "FALSE"];

/// Knobs of the release file dialect.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseOptions {
    /// Honour `include` and `-include` directives
    pub follow_includes: bool,
    /// Append `RELEASE.<arch>.Common` (or `RELEASE.<arch>`) when present
    pub host_arch: Option<String>,
    /// Declarations that define macros only
    pub skip_names: Vec<String>,
    /// Install-area roots; a declaration pointing at one is a macro only
    pub area_roots: Vec<PathBuf>,
}

impl Default for ParseOptions {
    fn default() -> Self {
        Self {
            follow_includes: true,
            host_arch: None,
            skip_names: vec![TOP.into(), "TEMPLATE_TOP".into(), "EPICS_BASE".into()],
            area_roots: Vec::new(),
        }
    }
}

/// Outcome of parsing one release file.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParsedRelease {
    /// Dependencies in declaration order
    pub declarations: Vec<Declaration>,
    /// Warnings and macro issues met on the way
    pub diagnostics: Vec<Diagnostic>,
}

impl ParsedRelease {
    /// True if some macro could not be expanded because of a macro cycle.
    pub fn partially_resolved(&self) -> bool {
        self.diagnostics
            .iter()
            .any(|d| matches!(d.error, DomainError::MacroCycle { .. }))
    }
}

/// Splits a significant line into `(name, value)`.
///
/// Accepts `NAME VALUE`, `NAME=VALUE` and `NAME = VALUE`. The whitespace
/// form needs exactly two tokens; the assignment form may have an empty value.
pub fn split_declaration(line: &str) -> Option<(&str, &str)> {
    if let Some((name, value)) = line.split_once('=') {
        let name = name.trim();
        if is_macro_name(name) {
            return Some((name, value.trim()));
        }
    }

    let mut tokens = line.split_whitespace();
    match (tokens.next(), tokens.next(), tokens.next()) {
        (Some(name), Some(value), None) if is_macro_name(name) => Some((name, value)),
        _ => None,
    }
}

fn is_macro_name(name: &str) -> bool {
    let mut chars = name.chars();
    matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-'))
}

/// Strips a trailing `#` comment and surrounding whitespace.
fn significant(line: &str) -> &str {
    line.split('#').next().unwrap_or_default().trim()
}

/// Parses release files into ordered dependency declarations.
pub struct ReleaseParser<'a> {
    fs: &'a dyn FileSystem,
    resolver: &'a MacroResolver,
    options: &'a ParseOptions,
}

struct ParseState {
    module_root: PathBuf,
    scope: Scope,
    includes: HashSet<PathBuf>,
    parsed: ParsedRelease,
}

impl<'a> ReleaseParser<'a> {
    pub fn new(fs: &'a dyn FileSystem, resolver: &'a MacroResolver, options: &'a ParseOptions) -> Self {
        Self {
            fs,
            resolver,
            options,
        }
    }

    /// Parses `release_file` of the module installed at `module_root`.
    ///
    /// Only the release file itself is fatal: a missing or unreadable
    /// include or overlay becomes a diagnostic.
    #[instrument(level = "debug", skip(self))]
    pub fn parse(&self, release_file: &Path, module_root: &Path) -> Result<ParsedRelease, DomainError> {
        if !self.fs.is_file(release_file) {
            return Err(DomainError::FileNotFound(release_file.to_path_buf()));
        }

        let mut state = ParseState {
            module_root: module_root.to_path_buf(),
            scope: Scope::from([(TOP.to_string(), module_root.to_string_lossy().into_owned())]),
            includes: HashSet::new(),
            parsed: ParsedRelease::default(),
        };

        if let Some(base) = self.builder_base(release_file) {
            debug!("reading module release {} first", base.display());
            if let Err(e) = self.parse_file(&base, &mut state) {
                state.parsed.diagnostics.push(Diagnostic::new(e));
            }
        }

        self.parse_file(release_file, &mut state)?;

        if let Some(overlay) = self.overlay(release_file) {
            debug!("applying host-arch overlay {}", overlay.display());
            if let Err(e) = self.parse_file(&overlay, &mut state) {
                state.parsed.diagnostics.push(Diagnostic::new(e));
            }
        }

        debug!(
            "{}: {} dependencies, {} diagnostics",
            release_file.display(),
            state.parsed.declarations.len(),
            state.parsed.diagnostics.len()
        );
        Ok(state.parsed)
    }

    /// The module's own `configure/RELEASE` for a builder release file in
    /// `<module>/etc/<dir>/`, whose lines come before the file's own.
    fn builder_base(&self, release_file: &Path) -> Option<PathBuf> {
        let base = builder_module_root(release_file)?.join("configure").join("RELEASE");
        (self.fs.is_file(&base) && normalize(&base) != normalize(release_file)).then_some(base)
    }

    fn overlay(&self, release_file: &Path) -> Option<PathBuf> {
        let arch = self.options.host_arch.as_deref()?;
        let base = release_file.to_string_lossy();
        [format!("{base}.{arch}.Common"), format!("{base}.{arch}")]
            .into_iter()
            .map(PathBuf::from)
            .find(|candidate| self.fs.is_file(candidate))
    }

    fn parse_file(&self, file: &Path, state: &mut ParseState) -> Result<(), DomainError> {
        let content = self
            .fs
            .read_to_string(file)
            .map_err(|e| DomainError::UnreadableFile {
                path: file.to_path_buf(),
                reason: e.to_string(),
            })?;
        state.includes.insert(normalize(file));

        for (idx, raw) in content.lines().enumerate() {
            let line_no = idx + 1;
            let line = significant(raw);
            if line.is_empty() {
                continue;
            }

            if let Some((optional, target)) = include_directive(line) {
                self.include(file, line_no, optional, target, state);
                continue;
            }

            match split_declaration(line) {
                Some((name, expression)) => self.declare(file, line_no, name, expression, state),
                None => {
                    trace!("{}:{}: skipping malformed line", file.display(), line_no);
                    state.parsed.diagnostics.push(
                        Diagnostic::new(DomainError::MalformedLine {
                            line: line_no,
                            content: line.to_string(),
                        })
                        .at(file, line_no),
                    );
                }
            }
        }
        Ok(())
    }

    fn include(&self, file: &Path, line_no: usize, optional: bool, target: &str, state: &mut ParseState) {
        if !self.options.follow_includes {
            return;
        }
        let expansion = self.resolver.resolve(target, &state.scope);
        let path = absolutize(&state.module_root, Path::new(&expansion.text));

        if state.includes.contains(&path) {
            trace!("{} already included", path.display());
            return;
        }
        if !self.fs.is_file(&path) {
            if !optional {
                state
                    .parsed
                    .diagnostics
                    .push(Diagnostic::new(DomainError::MissingInclude(path)).at(file, line_no));
            }
            return;
        }
        if let Err(e) = self.parse_file(&path, state) {
            state.parsed.diagnostics.push(Diagnostic::new(e).at(file, line_no));
        }
    }

    fn declare(&self, file: &Path, line_no: usize, name: &str, expression: &str, state: &mut ParseState) {
        let expansion = self.resolver.resolve_definition(name, expression, &state.scope);
        state.parsed.diagnostics.extend(
            expansion
                .issues
                .iter()
                .cloned()
                .map(|e| Diagnostic::new(e).at(file, line_no)),
        );

        if name != TOP {
            state.scope.insert(name.to_string(), expansion.text.clone());
        }
        if self.is_macro_only(name, &expansion.text) {
            trace!("{} is a macro, not a dependency", name);
            return;
        }

        let declaration = Declaration {
            name: name.to_string(),
            expression: expression.to_string(),
            path: absolutize(&state.module_root, Path::new(&expansion.text)),
            source: file.to_path_buf(),
            line: line_no,
        };
        let declarations = &mut state.parsed.declarations;
        match declarations.iter_mut().find(|d| d.name == declaration.name) {
            // a redefinition keeps the original position
            Some(existing) => *existing = declaration,
            None => declarations.push(declaration),
        }
    }

    fn is_macro_only(&self, name: &str, value: &str) -> bool {
        if name == TOP || self.options.skip_names.iter().any(|n| n == name) {
            return true;
        }
        if value.is_empty() || value == "." {
            return true;
        }
        if FLAGS.iter().any(|flag| value.eq_ignore_ascii_case(flag)) {
            return true;
        }
        let path = normalize(Path::new(value));
        self.options
            .area_roots
            .iter()
            .any(|root| normalize(root) == path)
    }
}

/// Recognises `include FILE` and `-include FILE`, returning `(optional, FILE)`.
fn include_directive(line: &str) -> Option<(bool, &str)> {
    let (keyword, rest) = line.split_once(char::is_whitespace)?;
    let optional = match keyword {
        "include" => false,
        "-include" => true,
        _ => return None,
    };
    let target = rest.trim();
    (!target.is_empty()).then_some((optional, target))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("ASYN /prod/asyn/4-21", Some(("ASYN", "/prod/asyn/4-21")))]
    #[case("ASYN=/prod/asyn/4-21", Some(("ASYN", "/prod/asyn/4-21")))]
    #[case("ASYN = $(SUPPORT)/asyn", Some(("ASYN", "$(SUPPORT)/asyn")))]
    #[case("CROSS_COMPILER_TARGET_ARCHS =", Some(("CROSS_COMPILER_TARGET_ARCHS", "")))]
    #[case("JUST_A_NAME", None)]
    #[case("TOO MANY TOKENS", None)]
    #[case("1BAD /prod/x", None)]
    fn given_line_when_splitting_declaration_then_matches_shape(
        #[case] line: &str,
        #[case] expected: Option<(&str, &str)>,
    ) {
        assert_eq!(split_declaration(line), expected);
    }

    #[rstest]
    #[case("include $(TOP)/configure/RELEASE.local", Some((false, "$(TOP)/configure/RELEASE.local")))]
    #[case("-include /etc/RELEASE.private", Some((true, "/etc/RELEASE.private")))]
    #[case("INCLUDE_DIR /prod/x", None)]
    #[case("include", None)]
    fn given_line_when_checking_include_then_recognises_directive(
        #[case] line: &str,
        #[case] expected: Option<(bool, &str)>,
    ) {
        assert_eq!(include_directive(line), expected);
    }

    #[test]
    fn given_trailing_comment_when_stripping_then_keeps_declaration() {
        assert_eq!(significant("  ASYN /prod/asyn # pinned  "), "ASYN /prod/asyn");
        assert_eq!(significant("# only a comment"), "");
    }
}
