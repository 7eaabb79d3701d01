//! Finding a module's install root, release file and version on disk.

use std::path::{Path, PathBuf};

use config::{Config, File, FileFormat};
use tracing::{debug, instrument, trace};

use crate::domain::{classify_path, DomainError, Version};
use crate::infrastructure::traits::FileSystem;
use crate::util::path::normalize;

/// Release file locations below a module root, in precedence order.
pub const RELEASE_CANDIDATES: [&str; 3] = ["configure/RELEASE", "config/RELEASE", "RELEASE"];

/// Metadata file locations below a module root, in precedence order.
pub const METADATA_CANDIDATES: [&str; 2] = ["configure/module.ini", "etc/module.ini"];

/// Directories that hold a release file one level below the module root.
const CONFIG_DIRS: [&str; 2] = ["configure", "config"];

/// A module found on disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocatedModule {
    /// Name from metadata, else derived from the path
    pub name: Option<String>,
    /// Install root as declared, lexically normalised
    pub root: PathBuf,
    /// Install root with symlinks resolved; identity of the module within a pass
    pub canonical: PathBuf,
    /// `None` for a module without a release file, which has no dependencies
    pub release_file: Option<PathBuf>,
    pub version: Version,
}

#[derive(Debug, Default)]
struct Metadata {
    name: Option<String>,
    version: Option<String>,
}

pub struct ModuleLocator<'a> {
    fs: &'a dyn FileSystem,
}

impl<'a> ModuleLocator<'a> {
    pub fn new(fs: &'a dyn FileSystem) -> Self {
        Self { fs }
    }

    /// Locates the module `name` declared at `path`.
    ///
    /// `path` may be the module root, its `prefix` directory, or the release
    /// file itself. A root directory without a release file is a valid leaf.
    #[instrument(level = "debug", skip(self))]
    pub fn locate(&self, name: &str, path: &Path) -> Result<LocatedModule, DomainError> {
        let mut path = normalize(path);
        if path.file_name().is_some_and(|f| f == "prefix") {
            path.pop();
        }

        let (root, release_file) = if self.is_release_file(&path) {
            (release_root(&path), Some(path.clone()))
        } else if self.fs.is_dir(&path) {
            let release_file = RELEASE_CANDIDATES
                .iter()
                .map(|candidate| path.join(candidate))
                .find(|candidate| self.fs.is_file(candidate));
            (path, release_file)
        } else {
            return Err(DomainError::ModuleNotFound {
                name: name.to_string(),
                path,
            });
        };

        if release_file.is_none() {
            trace!("{} has no release file", root.display());
        }

        let canonical = self.fs.canonicalize(&root).unwrap_or_else(|_| root.clone());
        let (path_name, path_version) = classify_path(&root);
        let metadata = self.metadata(&root);

        let version = metadata.version.map(Version::Known).unwrap_or(path_version);
        let located = LocatedModule {
            name: metadata.name.or(path_name),
            root,
            canonical,
            release_file,
            version,
        };
        debug!("located {} at {}", name, located.root.display());
        Ok(located)
    }

    fn is_release_file(&self, path: &Path) -> bool {
        path.file_name()
            .and_then(|f| f.to_str())
            .is_some_and(|f| f.starts_with("RELEASE"))
            && self.fs.is_file(path)
    }

    fn metadata(&self, root: &Path) -> Metadata {
        let Some(file) = METADATA_CANDIDATES
            .iter()
            .map(|candidate| root.join(candidate))
            .find(|candidate| self.fs.is_file(candidate))
        else {
            return Metadata::default();
        };

        let parsed = self
            .fs
            .read_to_string(&file)
            .map_err(|e| e.to_string())
            .and_then(|content| {
                Config::builder()
                    .add_source(File::from_str(&content, FileFormat::Ini))
                    .build()
                    .map_err(|e| e.to_string())
            });

        match parsed {
            Ok(ini) => Metadata {
                name: non_empty(ini.get_string("general.name").ok()),
                version: non_empty(ini.get_string("general.version").ok()),
            },
            Err(e) => {
                debug!("ignoring metadata {}: {}", file.display(), e);
                Metadata::default()
            }
        }
    }
}

/// Module root for a release file path: its directory, or one level higher
/// when that directory is `configure/` or `config/`. Builder release files
/// under `<module>/etc/<dir>/` belong to `<module>`.
fn release_root(release_file: &Path) -> PathBuf {
    if let Some(module) = builder_module_root(release_file) {
        return module.to_path_buf();
    }
    let dir = release_file.parent().unwrap_or(release_file);
    let in_config_dir = dir
        .file_name()
        .and_then(|f| f.to_str())
        .is_some_and(|f| CONFIG_DIRS.contains(&f));
    match dir.parent() {
        Some(parent) if in_config_dir => parent.to_path_buf(),
        _ => dir.to_path_buf(),
    }
}

/// `<module>` for a release file at `<module>/etc/<dir>/<file>`.
pub fn builder_module_root(release_file: &Path) -> Option<&Path> {
    let etc = release_file.parent()?.parent()?;
    if etc.file_name()? != "etc" {
        return None;
    }
    etc.parent()
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}
