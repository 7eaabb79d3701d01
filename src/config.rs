//! Configuration management with layered loading
//!
//! Precedence (lowest to highest):
//! 1. Compiled defaults
//! 2. Global config: `$XDG_CONFIG_HOME/reltree/reltree.toml`
//! 3. Local config: `<module>/.reltree.toml` (next to the root module)
//! 4. Environment variables: `RELTREE_*` prefix

use std::path::{Path, PathBuf};

use config::{Config, ConfigError, Environment};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};

use crate::application::{ApplicationError, ParseOptions, ResolveOptions};

/// Host architecture when neither config nor `EPICS_HOST_ARCH` names one.
pub const DEFAULT_HOST_ARCH: &str = "linux-x86_64";

/// Unified configuration for reltree.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct Settings {
    /// Macro definition files, searched in order
    pub macro_sources: Vec<PathBuf>,
    /// Use the process environment as the last macro source
    pub include_environment: bool,
    /// Honour `include` / `-include` in release files
    pub follow_includes: bool,
    /// Apply `RELEASE.<arch>.Common` / `RELEASE.<arch>` overlays
    pub host_arch: Option<String>,
    /// Declarations that define macros but are never dependencies
    pub skip_names: Vec<String>,
    /// Install-area roots, e.g. `/dls_sw/prod/R3.14.12.7/support`
    pub area_roots: Vec<PathBuf>,
    /// Prefetch sibling modules on a thread pool
    pub parallel: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            macro_sources: Vec::new(),
            include_environment: true,
            follow_includes: true,
            host_arch: None,
            skip_names: ParseOptions::default().skip_names,
            area_roots: Vec::new(),
            parallel: true,
        }
    }
}

/// Raw settings for intermediate parsing (arrays are Option to detect "not specified").
///
/// - `None` → field not specified, inherit from base
/// - `Some([])` → explicit empty array
/// - `Some([...])` → explicit values to merge
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct RawSettings {
    pub macro_sources: Option<Vec<String>>,
    pub include_environment: Option<bool>,
    pub follow_includes: Option<bool>,
    pub host_arch: Option<String>,
    pub skip_names: Option<Vec<String>>,
    pub area_roots: Option<Vec<String>>,
    pub parallel: Option<bool>,
}

/// Merge arrays with union semantics and negation support.
///
/// - Items from overlay are appended to base, keeping base order
/// - Items prefixed with `!` remove the corresponding item from the result
/// - Duplicates are dropped
///
/// # Examples
/// ```ignore
/// merge_array(&["a", "b"], &["c"])       // → ["a", "b", "c"]
/// merge_array(&["a", "b"], &["!a", "c"]) // → ["b", "c"]
/// ```
pub fn merge_array(base: &[String], overlay: &[String]) -> Vec<String> {
    let mut result: Vec<String> = Vec::with_capacity(base.len() + overlay.len());
    for item in base {
        if !result.contains(item) {
            result.push(item.clone());
        }
    }

    for pattern in overlay {
        if let Some(negated) = pattern.strip_prefix('!') {
            result.retain(|item| item != negated);
        } else if !result.contains(pattern) {
            result.push(pattern.clone());
        }
    }
    result
}

fn to_strings(paths: &[PathBuf]) -> Vec<String> {
    paths
        .iter()
        .map(|p| p.to_string_lossy().into_owned())
        .collect()
}

fn to_paths(items: Vec<String>) -> Vec<PathBuf> {
    items.into_iter().map(PathBuf::from).collect()
}

/// Get the XDG config directory for reltree.
pub fn global_config_dir() -> Option<PathBuf> {
    ProjectDirs::from("", "", "reltree").map(|dirs| dirs.config_dir().to_path_buf())
}

/// Get the path to the global config file.
pub fn global_config_path() -> Option<PathBuf> {
    global_config_dir().map(|dir| dir.join("reltree.toml"))
}

/// Get the path to the local config file of a module.
pub fn local_config_path(module_dir: &Path) -> PathBuf {
    module_dir.join(".reltree.toml")
}

/// Load a TOML file into RawSettings for manual merging.
fn load_raw_settings(path: &Path) -> Result<RawSettings, ApplicationError> {
    let content = std::fs::read_to_string(path).map_err(|e| ApplicationError::Config {
        message: format!("read {}: {}", path.display(), e),
    })?;
    toml::from_str(&content).map_err(|e| ApplicationError::Config {
        message: format!("parse {}: {}", path.display(), e),
    })
}

fn default_host_arch() -> String {
    std::env::var("EPICS_HOST_ARCH")
        .ok()
        .filter(|arch| !arch.is_empty())
        .unwrap_or_else(|| DEFAULT_HOST_ARCH.to_string())
}

fn expand(value: &str) -> String {
    shellexpand::full(value)
        .map(|v| v.into_owned())
        .unwrap_or_else(|_| value.to_string())
}

impl Settings {
    /// Expand shell variables and tilde in path-like fields.
    ///
    /// Handles `~`, `$VAR`, and `${VAR}` syntax.
    fn expand_paths(&mut self) {
        for path in self.macro_sources.iter_mut().chain(self.area_roots.iter_mut()) {
            *path = PathBuf::from(expand(&path.to_string_lossy()));
        }
    }

    /// Merge overlay config onto self (base) with union semantics for arrays.
    fn merge_with(&self, overlay: &RawSettings) -> Self {
        Self {
            macro_sources: overlay
                .macro_sources
                .as_ref()
                .map(|o| to_paths(merge_array(&to_strings(&self.macro_sources), o)))
                .unwrap_or_else(|| self.macro_sources.clone()),
            area_roots: overlay
                .area_roots
                .as_ref()
                .map(|o| to_paths(merge_array(&to_strings(&self.area_roots), o)))
                .unwrap_or_else(|| self.area_roots.clone()),
            skip_names: overlay
                .skip_names
                .as_ref()
                .map(|o| merge_array(&self.skip_names, o))
                .unwrap_or_else(|| self.skip_names.clone()),
            ..self.apply_scalars(overlay)
        }
    }

    /// Apply global config onto defaults with REPLACE semantics for arrays.
    fn apply_global(&self, global: &RawSettings) -> Self {
        Self {
            macro_sources: global
                .macro_sources
                .clone()
                .map(to_paths)
                .unwrap_or_else(|| self.macro_sources.clone()),
            area_roots: global
                .area_roots
                .clone()
                .map(to_paths)
                .unwrap_or_else(|| self.area_roots.clone()),
            skip_names: global
                .skip_names
                .clone()
                .unwrap_or_else(|| self.skip_names.clone()),
            ..self.apply_scalars(global)
        }
    }

    fn apply_scalars(&self, overlay: &RawSettings) -> Self {
        Self {
            include_environment: overlay
                .include_environment
                .unwrap_or(self.include_environment),
            follow_includes: overlay.follow_includes.unwrap_or(self.follow_includes),
            host_arch: overlay.host_arch.clone().or_else(|| self.host_arch.clone()),
            parallel: overlay.parallel.unwrap_or(self.parallel),
            ..self.clone()
        }
    }

    /// Load settings with layered precedence.
    ///
    /// # Arguments
    /// * `module_dir` - Optional root module directory for local config
    ///
    /// # Array Merge Semantics
    /// - Defaults → Global: REPLACE (global defines the real baseline)
    /// - Global → Local: UNION with negation support, order kept
    /// - Any → Env vars: REPLACE (explicit user override)
    ///
    /// An unset `host_arch` falls back to `$EPICS_HOST_ARCH`, then
    /// [`DEFAULT_HOST_ARCH`].
    pub fn load(module_dir: Option<&Path>) -> Result<Self, ApplicationError> {
        let global = global_config_path();
        let local = module_dir.map(local_config_path);
        Self::load_from(global.as_deref(), local.as_deref())
    }

    /// [`Settings::load`] with explicit file locations; absent files are skipped.
    pub fn load_from(global: Option<&Path>, local: Option<&Path>) -> Result<Self, ApplicationError> {
        let mut current = Self::default();

        if let Some(global_path) = global.filter(|p| p.exists()) {
            let raw = load_raw_settings(global_path)?;
            current = current.apply_global(&raw);
        }

        if let Some(local_path) = local.filter(|p| p.exists()) {
            let raw = load_raw_settings(local_path)?;
            current = current.merge_with(&raw);
        }

        current = Self::apply_env_overrides(current)?;
        current.expand_paths();
        if current.host_arch.is_none() {
            current.host_arch = Some(default_host_arch());
        }

        Ok(current)
    }

    /// Apply RELTREE_* environment variables as explicit overrides.
    fn apply_env_overrides(mut settings: Self) -> Result<Self, ApplicationError> {
        let config = Config::builder()
            .add_source(
                Environment::with_prefix("RELTREE")
                    .separator("__")
                    .try_parsing(true)
                    .list_separator(",")
                    .with_list_parse_key("macro_sources")
                    .with_list_parse_key("skip_names")
                    .with_list_parse_key("area_roots"),
            )
            .build()
            .map_err(config_err)?;

        if let Ok(val) = config.get::<Vec<String>>("macro_sources") {
            settings.macro_sources = to_paths(val);
        }
        if let Ok(val) = config.get::<Vec<String>>("area_roots") {
            settings.area_roots = to_paths(val);
        }
        if let Ok(val) = config.get::<Vec<String>>("skip_names") {
            settings.skip_names = val;
        }
        if let Ok(val) = config.get_bool("include_environment") {
            settings.include_environment = val;
        }
        if let Ok(val) = config.get_bool("follow_includes") {
            settings.follow_includes = val;
        }
        if let Ok(val) = config.get_bool("parallel") {
            settings.parallel = val;
        }
        if let Ok(val) = config.get_string("host_arch") {
            settings.host_arch = Some(val);
        }

        Ok(settings)
    }

    /// Show the effective configuration as TOML.
    pub fn to_toml(&self) -> Result<String, ApplicationError> {
        toml::to_string_pretty(self).map_err(|e| ApplicationError::Config {
            message: format!("serialize config: {e}"),
        })
    }

    /// Generate a template config file.
    pub fn template() -> String {
        r#"# reltree configuration
#
# Locations (by precedence, lowest to highest):
#   Global: ~/.config/reltree/reltree.toml  (defines your baseline)
#   Local:  <module>/.reltree.toml          (module-specific additions)
#   Env:    RELTREE_* environment variables (explicit overrides)
#
# Array Merge Semantics:
#   Global config REPLACES compiled defaults.
#   Local config UNIONS with global, keeping order.
#   Use "!item" in local config to REMOVE an inherited item:
#     skip_names = ["!EPICS_BASE", "PYTHON"]

# Macro definition files, searched in order (first definition wins)
# macro_sources = ["/dls_sw/prod/R3.14.12.7/support/RELEASE.macros"]

# Fall back to environment variables for undefined macros
# include_environment = true

# Follow include / -include directives in RELEASE files
# follow_includes = true

# Append RELEASE.<arch>.Common (or RELEASE.<arch>) when present.
# Unset: $EPICS_HOST_ARCH, else linux-x86_64
# host_arch = "linux-x86_64"

# Declarations that only define macros
# skip_names = ["TOP", "TEMPLATE_TOP", "EPICS_BASE"]

# Install areas; a declaration pointing at one is not a dependency.
# A bare module name on the command line is looked up below them.
# area_roots = ["/dls_sw/prod/R3.14.12.7/support", "/dls_sw/work/R3.14.12.7/support"]

# Locate and parse sibling modules in parallel
# parallel = true
"#
        .to_string()
    }
}

impl From<&Settings> for ResolveOptions {
    fn from(settings: &Settings) -> Self {
        Self {
            macro_sources: settings.macro_sources.clone(),
            include_environment: settings.include_environment,
            parallel: settings.parallel,
            parse: ParseOptions {
                follow_includes: settings.follow_includes,
                host_arch: settings.host_arch.clone(),
                skip_names: settings.skip_names.clone(),
                area_roots: settings.area_roots.clone(),
            },
        }
    }
}

fn config_err(e: ConfigError) -> ApplicationError {
    ApplicationError::Config {
        message: e.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn strings(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn given_default_settings_when_created_then_skips_top_and_base() {
        let settings = Settings::default();
        assert!(settings.skip_names.contains(&"TOP".to_string()));
        assert!(settings.skip_names.contains(&"EPICS_BASE".to_string()));
        assert!(settings.include_environment);
        assert!(settings.parallel);
    }

    #[test]
    fn given_tilde_in_macro_source_when_expand_paths_then_expands_to_home() {
        let mut settings = Settings {
            macro_sources: vec![PathBuf::from("~/macros/RELEASE")],
            area_roots: vec![PathBuf::from("$HOME/support")],
            ..Settings::default()
        };

        settings.expand_paths();

        let home = std::env::var("HOME").expect("HOME should be set");
        assert!(settings.macro_sources[0].to_string_lossy().starts_with(&home));
        assert!(settings.area_roots[0].to_string_lossy().starts_with(&home));
    }

    #[test]
    fn given_overlay_when_merge_array_then_appends_in_order() {
        let result = merge_array(&strings(&["b", "a"]), &strings(&["c", "a"]));
        assert_eq!(result, strings(&["b", "a", "c"]));
    }

    #[test]
    fn given_negation_when_merge_array_then_removes_item() {
        let result = merge_array(&strings(&["a", "b"]), &strings(&["!a", "c", "!x"]));
        assert_eq!(result, strings(&["b", "c"]));
    }

    #[test]
    fn given_global_arrays_when_apply_global_then_replaces_defaults() {
        let global = RawSettings {
            skip_names: Some(strings(&["TOP"])),
            host_arch: Some("linux-x86_64".into()),
            ..RawSettings::default()
        };

        let result = Settings::default().apply_global(&global);

        assert_eq!(result.skip_names, strings(&["TOP"]));
        assert_eq!(result.host_arch.as_deref(), Some("linux-x86_64"));
        assert!(result.follow_includes);
    }

    #[test]
    fn given_local_arrays_when_merge_with_then_unions_with_base() {
        let local = RawSettings {
            skip_names: Some(strings(&["!EPICS_BASE", "PYTHON"])),
            parallel: Some(false),
            ..RawSettings::default()
        };

        let result = Settings::default().merge_with(&local);

        assert_eq!(result.skip_names, strings(&["TOP", "TEMPLATE_TOP", "PYTHON"]));
        assert!(!result.parallel);
    }

    #[test]
    fn given_settings_when_converting_then_resolve_options_match() {
        let settings = Settings {
            host_arch: Some("linux-x86_64".into()),
            follow_includes: false,
            ..Settings::default()
        };

        let options = ResolveOptions::from(&settings);

        assert_eq!(options.parse.host_arch.as_deref(), Some("linux-x86_64"));
        assert!(!options.parse.follow_includes);
        assert_eq!(options.parse.skip_names, settings.skip_names);
    }
}
