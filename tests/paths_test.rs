//! Tests for flatten and glob path listing

use std::fs;
use std::path::PathBuf;
use std::sync::Arc;

use tempfile::TempDir;

use reltree::application::{module_paths, DependencyGraphBuilder, ResolveOptions, DEFAULT_GLOB};
use reltree::infrastructure::RealFileSystem;

fn create_module(dir: &TempDir, rel: &str, release: &str, data: &[&str]) -> PathBuf {
    let root = dir.path().join(rel);
    fs::create_dir_all(root.join("configure")).unwrap();
    fs::write(root.join("configure/RELEASE"), release).unwrap();
    for file in data {
        let path = root.join(file);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, "").unwrap();
    }
    root
}

#[test]
fn given_tree_with_shared_module_when_flattening_then_dependencies_first_once() {
    // Arrange
    let temp = TempDir::new().unwrap();
    create_module(&temp, "asyn-4.21", "", &[]);
    create_module(&temp, "calc-3.7", "ASYN $(TOP)/../asyn-4.21\n", &[]);
    let ioc = create_module(
        &temp,
        "ioc",
        "ASYN $(TOP)/../asyn-4.21\nCALC $(TOP)/../calc-3.7\nGONE $(TOP)/../gone-1\n",
        &[],
    );

    // Act
    let resolution = DependencyGraphBuilder::new(Arc::new(RealFileSystem), ResolveOptions::default())
        .build(&ioc)
        .unwrap();
    let tree = &resolution.tree;
    let names: Vec<_> = tree
        .flatten()
        .into_iter()
        .filter_map(|idx| tree.get_node(idx))
        .map(|n| n.data.name.clone())
        .collect();

    // Assert
    assert_eq!(names, vec!["ASYN", "CALC", "GONE", "ioc"]);
}

#[test]
fn given_globs_when_listing_paths_then_matches_per_module_in_flatten_order() {
    // Arrange
    let temp = TempDir::new().unwrap();
    let asyn = create_module(&temp, "asyn-4.21", "", &["data/asyn.proto", "db/asyn.db"]);
    let ioc = create_module(
        &temp,
        "ioc",
        "ASYN $(TOP)/../asyn-4.21\nGONE $(TOP)/../gone-1\n",
        &["data/ioc.proto"],
    );
    let resolution = DependencyGraphBuilder::new(Arc::new(RealFileSystem), ResolveOptions::default())
        .build(&ioc)
        .unwrap();

    // Act
    let data = module_paths(&resolution.tree, &[DEFAULT_GLOB.to_string()]).unwrap();
    let protos = module_paths(&resolution.tree, &["/data/*.proto".to_string(), "/db/*.db".to_string()]).unwrap();

    // Assert
    assert_eq!(data, vec![asyn.join("data"), ioc.join("data")]);
    assert_eq!(
        protos,
        vec![
            asyn.join("data/asyn.proto"),
            asyn.join("db/asyn.db"),
            ioc.join("data/ioc.proto")
        ]
    );
}

#[test]
fn given_invalid_glob_when_listing_paths_then_pattern_error() {
    // Arrange
    let temp = TempDir::new().unwrap();
    let ioc = create_module(&temp, "ioc", "", &[]);
    let resolution = DependencyGraphBuilder::new(Arc::new(RealFileSystem), ResolveOptions::default())
        .build(&ioc)
        .unwrap();

    // Act
    let result = module_paths(&resolution.tree, &["/[unclosed".to_string()]);

    // Assert
    assert!(result.is_err());
}
