//! Tests for MacroTable and MacroResolver

use std::fs;
use std::path::PathBuf;
use std::sync::Arc;

use tempfile::TempDir;

use reltree::application::{MacroResolver, MacroTable, Scope};
use reltree::domain::DomainError;
use reltree::infrastructure::RealFileSystem;

fn write_file(dir: &TempDir, name: &str, content: &str) -> PathBuf {
    let path = dir.path().join(name);
    fs::write(&path, content).expect("write macro file");
    path
}

#[test]
fn given_root_definition_when_resolving_then_substitutes_path() {
    // Arrange
    let temp = TempDir::new().unwrap();
    let source = write_file(&temp, "macros", "ROOT=/opt/modules\n");
    let resolver = MacroResolver::new(MacroTable::new(
        Arc::new(RealFileSystem),
        vec![source],
        false,
    ));

    // Act
    let expansion = resolver.resolve("$(ROOT)/foo-1.2", &Scope::new());

    // Assert
    assert_eq!(expansion.text, "/opt/modules/foo-1.2");
    assert!(expansion.is_complete());
}

#[test]
fn given_several_sources_when_resolving_then_first_definition_wins() {
    // Arrange
    let temp = TempDir::new().unwrap();
    let first = write_file(
        &temp,
        "first",
        "# site macros\nSUPPORT /dls_sw/prod/support\n",
    );
    let second = write_file(
        &temp,
        "second",
        "SUPPORT=/dls_sw/work/support\nWORK = /dls_sw/work\n",
    );
    let table = MacroTable::new(Arc::new(RealFileSystem), vec![first, second], false);

    // Act
    let support = table.get("SUPPORT");
    let work = table.get("WORK");

    // Assert
    assert_eq!(support.as_deref(), Some("/dls_sw/prod/support"));
    assert_eq!(work.as_deref(), Some("/dls_sw/work"));
    assert!(table.load_issues().is_empty());
}

#[test]
fn given_missing_source_when_loading_then_records_issue_and_uses_rest() {
    // Arrange
    let temp = TempDir::new().unwrap();
    let present = write_file(&temp, "present", "A=/a\n");
    let table = MacroTable::new(
        Arc::new(RealFileSystem),
        vec![temp.path().join("absent"), present],
        false,
    );

    // Act
    let a = table.get("A");

    // Assert
    assert_eq!(a.as_deref(), Some("/a"));
    assert_eq!(table.load_issues().len(), 1);
    assert!(matches!(
        table.load_issues()[0],
        DomainError::UnreadableMacroSource { .. }
    ));
}

#[test]
fn given_environment_enabled_when_resolving_then_falls_back_to_process_env() {
    // Arrange
    std::env::set_var("RELTREE_TEST_ENV_AREA", "/env/area");
    let with_env = MacroResolver::new(MacroTable::new(Arc::new(RealFileSystem), vec![], true));
    let without_env = MacroResolver::new(MacroTable::new(Arc::new(RealFileSystem), vec![], false));

    // Act
    let resolved = with_env.resolve("${RELTREE_TEST_ENV_AREA}/x", &Scope::new());
    let unresolved = without_env.resolve("${RELTREE_TEST_ENV_AREA}/x", &Scope::new());

    // Assert
    assert_eq!(resolved.text, "/env/area/x");
    assert_eq!(unresolved.text, "${RELTREE_TEST_ENV_AREA}/x");
    assert_eq!(
        unresolved.issues,
        vec![DomainError::UnresolvedMacro("RELTREE_TEST_ENV_AREA".into())]
    );
}

#[test]
fn given_two_macros_referencing_each_other_when_resolving_then_reports_cycle_once_per_use() {
    // Arrange
    let resolver = MacroResolver::new(MacroTable::from_definitions(
        Arc::new(RealFileSystem),
        [("A", "$(B)/a"), ("B", "$(A)/b")],
    ));

    // Act
    let expansion = resolver.resolve("$(A)", &Scope::new());

    // Assert
    assert!(expansion.has_cycle());
    assert_eq!(expansion.issues.len(), 1);
    assert_eq!(expansion.text, "$(A)/b/a");
}
