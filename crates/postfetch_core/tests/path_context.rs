use std::path::PathBuf;

use postfetch_core::{kwdict_from_value, Kwdict, PathContext, PathSettings};
use serde_json::json;
use tempfile::TempDir;

fn init_logging() {
    postfetch_logging::initialize_for_tests();
}

fn item() -> Kwdict {
    kwdict_from_value(json!({"category": "test", "filename": "file", "extension": "ext"})).unwrap()
}

fn context(base: PathBuf) -> PathContext {
    let settings = PathSettings {
        base_directory: base,
        ..PathSettings::default()
    };
    let mut ctx = PathContext::new(&settings).unwrap();
    let kwdict = item();
    ctx.set_directory(&kwdict);
    ctx.set_filename(kwdict);
    ctx
}

#[test]
fn default_templates_build_category_directory() {
    init_logging();
    let temp = TempDir::new().unwrap();
    let ctx = context(temp.path().to_path_buf());

    assert_eq!(ctx.directory(), ["test".to_string()]);
    assert_eq!(ctx.filename(), "file.ext");
    assert_eq!(ctx.extension(), "ext");
    assert_eq!(ctx.path(), temp.path().join("test").join("file.ext"));
    assert_eq!(ctx.realdirectory(), temp.path().join("test"));
    assert_eq!(ctx.realpath(), temp.path().join("test").join("file.ext"));
}

#[test]
fn set_extension_updates_filename_and_kwdict() {
    init_logging();
    let temp = TempDir::new().unwrap();
    let mut ctx = context(temp.path().to_path_buf());

    ctx.set_extension("jpg");

    assert_eq!(ctx.filename(), "file.jpg");
    assert_eq!(ctx.kwdict()["extension"], json!("jpg"));
    assert_eq!(ctx.realpath(), temp.path().join("test").join("file.jpg"));
}

#[test]
fn append_directory_splits_nested_labels() {
    init_logging();
    let temp = TempDir::new().unwrap();
    let mut ctx = context(temp.path().to_path_buf());

    ctx.append_directory("foo/bar");

    assert_eq!(ctx.directory(), ["test", "foo", "bar"]);
    let expected = temp.path().join("test").join("foo").join("bar");
    assert_eq!(ctx.realdirectory(), expected);
    assert_eq!(ctx.path(), expected.join("file.ext"));
    assert_eq!(ctx.realpath(), expected.join("file.ext"));
}

#[test]
fn relative_base_resolves_to_absolute_realpath() {
    init_logging();
    let ctx = context(PathBuf::from("downloads"));

    assert_eq!(ctx.path(), PathBuf::from("downloads/test/file.ext"));
    assert!(ctx.realpath().is_absolute());
    assert!(ctx.realpath().ends_with("downloads/test/file.ext"));
}

#[test]
fn rendered_segments_cannot_escape_the_base_directory() {
    init_logging();
    let temp = TempDir::new().unwrap();
    let settings = PathSettings {
        base_directory: temp.path().to_path_buf(),
        directory: vec!["{category}".into(), "{user}".into()],
        ..PathSettings::default()
    };
    let mut ctx = PathContext::new(&settings).unwrap();
    let kwdict = kwdict_from_value(json!({"category": "..", "user": "a/../b"})).unwrap();
    ctx.set_directory(&kwdict);

    assert_eq!(ctx.directory(), ["a_.._b".to_string()]);
    assert!(ctx.realdirectory().starts_with(temp.path()));
}

#[test]
fn set_final_filename_overrides_template() {
    init_logging();
    let temp = TempDir::new().unwrap();
    let mut ctx = context(temp.path().to_path_buf());

    ctx.set_final_filename("file2.ext");
    ctx.set_temppath(temp.path().join("part"));

    assert_eq!(ctx.filename(), "file2.ext");
    assert_eq!(ctx.realpath(), temp.path().join("test").join("file2.ext"));
    assert_eq!(ctx.temppath(), Some(temp.path().join("part").as_path()));
}
