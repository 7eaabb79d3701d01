//! Tests for UpdatePlanner

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tempfile::TempDir;

use reltree::application::{
    DependencyGraphBuilder, Inconsistency, ParseOptions, Release, ResolveOptions, UpdatePlan, UpdatePlanner,
};
use reltree::domain::Version;
use reltree::infrastructure::RealFileSystem;
use reltree::util::testing::init_test_setup;

fn create_module(dir: &TempDir, rel: &str, release: &str) -> PathBuf {
    let root = dir.path().join(rel);
    fs::create_dir_all(root.join("configure")).expect("create module dir");
    fs::write(root.join("configure/RELEASE"), release).expect("write RELEASE");
    root
}

fn options(area_roots: Vec<PathBuf>) -> ResolveOptions {
    ResolveOptions {
        include_environment: false,
        parse: ParseOptions {
            area_roots,
            ..ParseOptions::default()
        },
        ..ResolveOptions::default()
    }
}

fn plan(root: &Path, options: ResolveOptions, consistent: bool) -> UpdatePlan {
    let fs = Arc::new(RealFileSystem);
    let resolution = DependencyGraphBuilder::new(fs.clone(), options.clone())
        .build(root)
        .expect("resolve tree");
    UpdatePlanner::new(fs, options).plan(&resolution.tree, consistent)
}

fn changes(plan: &UpdatePlan) -> Vec<(String, String, String)> {
    plan.changes
        .iter()
        .map(|c| (c.name.clone(), c.from.version.to_string(), c.to.version.to_string()))
        .collect()
}

/// asyn 4-21 and 4-22; motor 6-8 needs asyn 4-21, 6-9 needs 4-22, 6-10 needs
/// the uninstalled 4-23.
fn create_support_area(temp: &TempDir) -> PathBuf {
    create_module(temp, "support/asyn/4-21", "");
    create_module(temp, "support/asyn/4-22", "");
    create_module(temp, "support/motor/6-8", "ASYN $(TOP)/../../asyn/4-21\n");
    create_module(temp, "support/motor/6-9", "ASYN $(TOP)/../../asyn/4-22\n");
    create_module(temp, "support/motor/6-10", "ASYN $(TOP)/../../asyn/4-23\n");
    create_module(
        temp,
        "ioc",
        "SUPPORT=$(TOP)/../support\nASYN $(SUPPORT)/asyn/4-21\nMOTOR $(SUPPORT)/motor/6-8\n",
    )
}

#[test]
fn given_newest_release_conflicts_when_planning_then_rolls_back_to_consistent_set() {
    // Arrange
    init_test_setup();
    let temp = TempDir::new().expect("temp dir");
    let ioc = create_support_area(&temp);

    // Act
    let plan = plan(&ioc, options(vec![]), true);

    // Assert
    assert!(plan.is_consistent());
    assert_eq!(
        changes(&plan),
        vec![
            ("ASYN".to_string(), "4-21".to_string(), "4-22".to_string()),
            ("MOTOR".to_string(), "6-8".to_string(), "6-9".to_string()),
        ]
    );
    assert_eq!(plan.changes[1].to.path, temp.path().join("support/motor/6-9"));
}

#[test]
fn given_latest_when_planning_then_keeps_newest_and_reports_conflict() {
    // Arrange
    let temp = TempDir::new().expect("temp dir");
    let ioc = create_support_area(&temp);

    // Act
    let plan = plan(&ioc, options(vec![]), false);

    // Assert
    assert_eq!(
        changes(&plan),
        vec![
            ("ASYN".to_string(), "4-21".to_string(), "4-22".to_string()),
            ("MOTOR".to_string(), "6-8".to_string(), "6-10".to_string()),
        ]
    );
    assert_eq!(
        plan.inconsistencies,
        vec![Inconsistency {
            module: "asyn".into(),
            versions: vec!["4-22".into(), "4-23".into()],
        }]
    );
    assert!(plan.to_string().contains("Still inconsistent (1):"));
}

#[test]
fn given_release_only_below_area_root_when_listing_then_found() {
    // Arrange
    let temp = TempDir::new().expect("temp dir");
    let old = create_module(&temp, "old/asyn-4.21", "");
    create_module(&temp, "support/asyn/4-22", "");
    create_module(&temp, "support/asyn/4-20", "");
    let planner = UpdatePlanner::new(Arc::new(RealFileSystem), options(vec![temp.path().join("support")]));
    let current = Release {
        version: Version::Known("4.21".into()),
        path: old.clone(),
    };

    // Act
    let releases = planner.releases("asyn", &current);

    // Assert
    let versions: Vec<String> = releases.iter().map(|r| r.version.to_string()).collect();
    assert_eq!(versions, vec!["4.21", "4-22"]);
    assert_eq!(releases[0].path, old);
}

#[test]
fn given_unversioned_dependency_when_planning_then_no_updates() {
    // Arrange
    let temp = TempDir::new().expect("temp dir");
    create_module(&temp, "tools/builder", "");
    create_module(&temp, "tools/builder-2", "");
    let ioc = create_module(&temp, "ioc", "BUILDER $(TOP)/../tools/builder\n");

    // Act
    let plan = plan(&ioc, options(vec![]), true);

    // Assert
    assert!(plan.changes.is_empty());
    assert!(plan.is_consistent());
    assert_eq!(plan.to_string().trim_end(), "No updates available.");
}
