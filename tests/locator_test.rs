//! Tests for ModuleLocator

use std::fs;
use std::path::{Path, PathBuf};

use rstest::rstest;
use tempfile::TempDir;

use reltree::application::ModuleLocator;
use reltree::domain::{DomainError, Version};
use reltree::infrastructure::RealFileSystem;

fn touch(dir: &Path, rel: &str, content: &str) -> PathBuf {
    let path = dir.join(rel);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).ok();
    }
    fs::write(&path, content).expect("write file");
    path
}

#[rstest]
#[case(&["configure/RELEASE", "config/RELEASE", "RELEASE"], "configure/RELEASE")]
#[case(&["config/RELEASE", "RELEASE"], "config/RELEASE")]
#[case(&["RELEASE"], "RELEASE")]
fn given_release_candidates_when_locating_then_uses_precedence_order(
    #[case] present: &[&str],
    #[case] expected: &str,
) {
    // Arrange
    let temp = TempDir::new().unwrap();
    let root = temp.path().join("asyn/4-21");
    for rel in present {
        touch(&root, rel, "");
    }

    // Act
    let located = ModuleLocator::new(&RealFileSystem).locate("ASYN", &root).unwrap();

    // Assert
    assert_eq!(located.release_file, Some(root.join(expected)));
    assert_eq!(located.root, root);
    assert_eq!(located.name.as_deref(), Some("asyn"));
    assert_eq!(located.version, Version::Known("4-21".into()));
}

#[test]
fn given_directory_without_release_when_locating_then_is_leaf() {
    // Arrange
    let temp = TempDir::new().unwrap();
    let root = temp.path().join("python/dls_pmac");
    fs::create_dir_all(&root).unwrap();

    // Act
    let located = ModuleLocator::new(&RealFileSystem).locate("PMAC", &root).unwrap();

    // Assert
    assert_eq!(located.release_file, None);
    assert_eq!(located.version, Version::Unknown);
}

#[test]
fn given_prefix_directory_when_locating_then_uses_module_root() {
    // Arrange
    let temp = TempDir::new().unwrap();
    let root = temp.path().join("tools/foo-1.2");
    touch(&root, "configure/RELEASE", "");
    fs::create_dir_all(root.join("prefix")).unwrap();

    // Act
    let located = ModuleLocator::new(&RealFileSystem)
        .locate("FOO", &root.join("prefix"))
        .unwrap();

    // Assert
    assert_eq!(located.root, root);
    assert_eq!(located.version, Version::Known("1.2".into()));
}

#[test]
fn given_release_file_path_when_locating_then_root_is_above_configure() {
    // Arrange
    let temp = TempDir::new().unwrap();
    let root = temp.path().join("motor/6-9");
    let release = touch(&root, "configure/RELEASE", "");

    // Act
    let located = ModuleLocator::new(&RealFileSystem).locate("MOTOR", &release).unwrap();

    // Assert
    assert_eq!(located.root, root);
    assert_eq!(located.release_file, Some(release));
    assert_eq!(located.version, Version::Known("6-9".into()));
}

#[test]
fn given_module_ini_when_locating_then_metadata_overrides_path() {
    // Arrange
    let temp = TempDir::new().unwrap();
    let root = temp.path().join("work/mymodule");
    touch(&root, "configure/RELEASE", "");
    touch(
        &root,
        "configure/module.ini",
        "[general]\nname = ethercat\nversion = 4-7\n",
    );

    // Act
    let located = ModuleLocator::new(&RealFileSystem).locate("ETHERCAT", &root).unwrap();

    // Assert
    assert_eq!(located.name.as_deref(), Some("ethercat"));
    assert_eq!(located.version, Version::Known("4-7".into()));
}

#[test]
fn given_nonexistent_path_when_locating_then_module_not_found() {
    // Arrange
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("nothing/1-0");

    // Act
    let result = ModuleLocator::new(&RealFileSystem).locate("NOTHING", &path);

    // Assert
    assert_eq!(
        result,
        Err(DomainError::ModuleNotFound {
            name: "NOTHING".into(),
            path,
        })
    );
}
