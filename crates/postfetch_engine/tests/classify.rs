use std::path::Path;

use postfetch_core::{kwdict_from_value, PathContext, PathSettings, PluginOptions};
use postfetch_engine::{ClassifyPostprocessor, Postprocessor, PostprocessorError};
use serde_json::json;
use tempfile::TempDir;

fn init_logging() {
    postfetch_logging::initialize_for_tests();
}

fn context(base: &Path) -> PathContext {
    let settings = PathSettings {
        base_directory: base.to_path_buf(),
        ..PathSettings::default()
    };
    let mut ctx = PathContext::new(&settings).unwrap();
    let kwdict =
        kwdict_from_value(json!({"category": "test", "filename": "file", "extension": "ext"}))
            .unwrap();
    ctx.set_directory(&kwdict);
    ctx.set_filename(kwdict);
    ctx
}

#[test]
fn default_mapping_routes_pictures() {
    init_logging();
    let temp = TempDir::new().unwrap();
    let mut ctx = context(temp.path());
    let mut pp = ClassifyPostprocessor::new(&PluginOptions::new()).unwrap();

    assert_eq!(pp.mapping()["jpg"], "Pictures");
    assert_eq!(pp.mapping()["mp4"], "Video");
    ctx.set_extension("jpg");

    pp.prepare(&mut ctx).unwrap();
    let path = temp.path().join("test").join("Pictures");
    assert_eq!(ctx.path(), path.join("file.jpg"));
    assert_eq!(ctx.realpath(), path.join("file.jpg"));

    assert!(!path.exists());
    pp.run(&mut ctx).unwrap();
    assert!(path.is_dir());

    // already existing directory is fine
    pp.run(&mut ctx).unwrap();
}

#[test]
fn unmapped_extension_is_a_noop() {
    init_logging();
    let temp = TempDir::new().unwrap();
    let mut ctx = context(temp.path());
    let realpath = ctx.realpath().to_path_buf();
    let mut pp = ClassifyPostprocessor::new(&PluginOptions::new()).unwrap();

    pp.prepare(&mut ctx).unwrap();
    assert_eq!(ctx.path(), realpath);
    assert_eq!(ctx.realpath(), realpath);

    pp.run(&mut ctx).unwrap();
    assert!(!temp.path().join("test").exists());
}

#[test]
fn custom_mapping_supports_nested_labels() {
    init_logging();
    let temp = TempDir::new().unwrap();
    let mut ctx = context(temp.path());
    let options = PluginOptions::new().with("mapping", json!({"foo/bar": ["foo", "bar"]}));
    let mut pp = ClassifyPostprocessor::new(&options).unwrap();

    assert_eq!(pp.mapping().len(), 2);
    assert_eq!(pp.mapping()["foo"], "foo/bar");
    assert_eq!(pp.mapping()["bar"], "foo/bar");
    ctx.set_extension("foo");

    pp.prepare(&mut ctx).unwrap();
    let path = temp.path().join("test").join("foo").join("bar");
    assert_eq!(ctx.path(), path.join("file.foo"));
    assert_eq!(ctx.realpath(), path.join("file.foo"));

    pp.run(&mut ctx).unwrap();
    assert!(path.is_dir());
}

#[test]
fn later_labels_win_for_duplicate_extensions() {
    init_logging();
    let options = PluginOptions::new().with("mapping", json!({"A": ["x"], "B": ["x", "y"]}));
    let pp = ClassifyPostprocessor::new(&options).unwrap();
    assert_eq!(pp.mapping()["x"], "B");
    assert_eq!(pp.mapping()["y"], "B");
}

#[test]
fn blocked_directory_is_reported() {
    init_logging();
    let temp = TempDir::new().unwrap();
    std::fs::write(temp.path().join("test"), "not a directory").unwrap();
    let mut ctx = context(temp.path());
    let mut pp = ClassifyPostprocessor::new(&PluginOptions::new()).unwrap();
    ctx.set_extension("png");

    pp.prepare(&mut ctx).unwrap();
    let err = pp.run(&mut ctx).unwrap_err();
    assert!(matches!(err, PostprocessorError::DirectoryCreate { .. }));
    assert!(err.is_item_fatal());
}

#[test]
fn invalid_options_are_rejected() {
    init_logging();
    let options = PluginOptions::new().with("mapping", json!(["not", "a", "map"]));
    let err = ClassifyPostprocessor::new(&options).unwrap_err();
    assert!(matches!(err, PostprocessorError::InvalidOptions { plugin: "classify", .. }));
}
