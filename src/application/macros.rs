//! Macro resolution for release-file path expressions.
//!
//! A path expression such as `$(SUPPORT)/asyn/4-21` is expanded from three
//! scopes, first match wins:
//! 1. macros defined earlier in the same release file (see [`Scope`])
//! 2. the configured definition sources, in order
//! 3. the process environment, if enabled
//!
//! Definition sources are read lazily, once per resolution pass.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, OnceLock};

use regex::Regex;
use tracing::{debug, instrument, trace};

use crate::application::parser::split_declaration;
use crate::domain::DomainError;
use crate::infrastructure::traits::FileSystem;

/// Macros defined by a single release file while it is being parsed.
pub type Scope = HashMap<String, String>;

#[derive(Debug, Default)]
struct Definitions {
    values: HashMap<String, String>,
    issues: Vec<DomainError>,
}

/// Macro definitions for one resolution pass.
///
/// Immutable once loaded; a new pass builds a new table.
pub struct MacroTable {
    fs: Arc<dyn FileSystem>,
    sources: Vec<PathBuf>,
    include_environment: bool,
    definitions: OnceLock<Definitions>,
}

impl MacroTable {
    pub fn new(fs: Arc<dyn FileSystem>, sources: Vec<PathBuf>, include_environment: bool) -> Self {
        Self {
            fs,
            sources,
            include_environment,
            definitions: OnceLock::new(),
        }
    }

    /// Table with fixed definitions and no sources to load.
    pub fn from_definitions<I, K, V>(fs: Arc<dyn FileSystem>, definitions: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let values = definitions
            .into_iter()
            .map(|(k, v)| (k.into(), v.into()))
            .collect();
        let table = Self::new(fs, Vec::new(), false);
        // a fresh OnceLock is always empty
        let _ = table.definitions.set(Definitions {
            values,
            issues: Vec::new(),
        });
        table
    }

    fn definitions(&self) -> &Definitions {
        self.definitions.get_or_init(|| self.load())
    }

    #[instrument(level = "debug", skip(self))]
    fn load(&self) -> Definitions {
        let mut definitions = Definitions::default();
        for source in &self.sources {
            match self.fs.read_to_string(source) {
                Ok(content) => {
                    let mut count = 0;
                    for line in content.lines() {
                        let line = line.trim();
                        if line.is_empty() || line.starts_with('#') {
                            continue;
                        }
                        if let Some((name, value)) = split_declaration(line) {
                            // first source defining a name wins
                            definitions
                                .values
                                .entry(name.to_string())
                                .or_insert_with(|| value.to_string());
                            count += 1;
                        }
                    }
                    debug!("loaded {} macro definitions from {}", count, source.display());
                }
                Err(e) => definitions.issues.push(DomainError::UnreadableMacroSource {
                    path: source.clone(),
                    reason: e.to_string(),
                }),
            }
        }
        definitions
    }

    /// Unexpanded value of `name`.
    pub fn get(&self, name: &str) -> Option<String> {
        self.definitions()
            .values
            .get(name)
            .cloned()
            .or_else(|| {
                if self.include_environment {
                    std::env::var(name).ok()
                } else {
                    None
                }
            })
    }

    /// Problems met while loading the definition sources.
    pub fn load_issues(&self) -> &[DomainError] {
        &self.definitions().issues
    }
}

/// Result of expanding one expression.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Expansion {
    pub text: String,
    /// Unresolved macros and macro cycles, in order of appearance
    pub issues: Vec<DomainError>,
}

impl Expansion {
    pub fn has_cycle(&self) -> bool {
        self.issues
            .iter()
            .any(|e| matches!(e, DomainError::MacroCycle { .. }))
    }

    pub fn is_complete(&self) -> bool {
        self.issues.is_empty()
    }
}

/// Expands `$(NAME)`, `${NAME}` and `$NAME` tokens.
pub struct MacroResolver {
    table: MacroTable,
    token_regex: Regex,
}

impl MacroResolver {
    pub fn new(table: MacroTable) -> Self {
        Self {
            table,
            token_regex: Regex::new(
                r"\$\(([A-Za-z_][A-Za-z0-9_.\-]*)\)|\$\{([A-Za-z_][A-Za-z0-9_.\-]*)\}|\$([A-Za-z_][A-Za-z0-9_]*)",
            )
            .expect("macro token pattern is valid"),
        }
    }

    pub fn table(&self) -> &MacroTable {
        &self.table
    }

    /// Substitutes every macro token in `text`.
    ///
    /// Unknown macros stay in the text as written and are reported as
    /// [`DomainError::UnresolvedMacro`]. A macro whose expansion reaches
    /// itself again stays unexpanded and is reported as
    /// [`DomainError::MacroCycle`]; the rest of the text is still expanded.
    pub fn resolve(&self, text: &str, scope: &Scope) -> Expansion {
        let mut issues = Vec::new();
        let mut chain = Vec::new();
        let text = self.expand(text, scope, &mut chain, &mut issues);
        Expansion { text, issues }
    }

    /// Expands the value being assigned to `name`.
    ///
    /// Without an earlier definition to extend, a reference to `name` in
    /// its own value is a [`DomainError::MacroCycle`].
    pub fn resolve_definition(&self, name: &str, text: &str, scope: &Scope) -> Expansion {
        let mut issues = Vec::new();
        let mut chain = Vec::new();
        if self.lookup(name, scope).is_none() {
            chain.push(name.to_string());
        }
        let text = self.expand(text, scope, &mut chain, &mut issues);
        Expansion { text, issues }
    }

    fn lookup(&self, name: &str, scope: &Scope) -> Option<String> {
        scope.get(name).cloned().or_else(|| self.table.get(name))
    }

    fn expand(
        &self,
        text: &str,
        scope: &Scope,
        chain: &mut Vec<String>,
        issues: &mut Vec<DomainError>,
    ) -> String {
        let mut out = String::with_capacity(text.len());
        let mut last = 0;

        for caps in self.token_regex.captures_iter(text) {
            let (Some(token), Some(name)) = (
                caps.get(0),
                caps.get(1).or_else(|| caps.get(2)).or_else(|| caps.get(3)),
            ) else {
                continue;
            };
            let name = name.as_str();
            out.push_str(&text[last..token.start()]);
            last = token.end();

            if chain.iter().any(|n| n == name) {
                let mut cycle = chain.clone();
                cycle.push(name.to_string());
                trace!("macro cycle: {:?}", cycle);
                issues.push(DomainError::MacroCycle {
                    name: name.to_string(),
                    chain: cycle,
                });
                out.push_str(token.as_str());
                continue;
            }

            match self.lookup(name, scope) {
                Some(value) => {
                    chain.push(name.to_string());
                    let expanded = self.expand(&value, scope, chain, issues);
                    chain.pop();
                    out.push_str(&expanded);
                }
                None => {
                    issues.push(DomainError::UnresolvedMacro(name.to_string()));
                    out.push_str(token.as_str());
                }
            }
        }

        out.push_str(&text[last..]);
        out
    }
}
