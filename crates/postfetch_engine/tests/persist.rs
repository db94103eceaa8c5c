use std::fs::{self, File};
use std::time::{Duration, UNIX_EPOCH};

use postfetch_core::{kwdict_from_value, PathContext, PathSettings, MTIME_KEY};
use postfetch_engine::{ensure_output_dir, materialize, AtomicFileWriter};
use pretty_assertions::assert_eq;
use serde_json::{json, Value};
use tempfile::TempDir;

fn context(temp: &TempDir) -> PathContext {
    let settings = PathSettings {
        base_directory: temp.path().join("out"),
        ..PathSettings::default()
    };
    let mut ctx = PathContext::new(&settings).unwrap();
    let kwdict =
        kwdict_from_value(json!({"category": "test", "filename": "item", "extension": "bin"}))
            .unwrap();
    ctx.set_directory(&kwdict);
    ctx.set_filename(kwdict);
    ctx
}

#[test]
fn creates_missing_output_dir() {
    let temp = TempDir::new().unwrap();
    let new_dir = temp.path().join("out");
    assert!(!new_dir.exists());
    ensure_output_dir(&new_dir).unwrap();
    assert!(new_dir.is_dir());
}

#[test]
fn output_dir_must_be_a_directory() {
    let temp = TempDir::new().unwrap();
    let file_path = temp.path().join("plain");
    fs::write(&file_path, "x").unwrap();
    assert!(ensure_output_dir(&file_path).is_err());
}

#[test]
fn atomic_write_replaces_existing() {
    let temp = TempDir::new().unwrap();
    let writer = AtomicFileWriter::new(temp.path().join("sidecars"));

    let first = writer.write("item.json", "hello").unwrap();
    assert_eq!(first.file_name().unwrap(), "item.json");
    assert_eq!(fs::read_to_string(&first).unwrap(), "hello");

    let second = writer.write("item.json", "world").unwrap();
    assert_eq!(first, second);
    assert_eq!(fs::read_to_string(&second).unwrap(), "world");
}

#[test]
fn no_partial_file_on_error() {
    let temp = TempDir::new().unwrap();
    let file_path = temp.path().join("not_a_dir");
    fs::write(&file_path, "x").unwrap();

    let writer = AtomicFileWriter::new(file_path.clone());
    assert!(writer.write("item.json", "data").is_err());
    assert!(!file_path.with_file_name("item.json").exists());
}

#[test]
fn materialize_moves_temp_file_and_applies_mtime() {
    let temp = TempDir::new().unwrap();
    let mut ctx = context(&temp);
    let part = temp.path().join("item.part");
    fs::write(&part, "content").unwrap();
    ctx.set_temppath(&part);
    ctx.kwdict_mut()
        .insert(MTIME_KEY.to_string(), Value::from(1_000_000_000));

    let target = materialize(&ctx).unwrap().unwrap();

    assert_eq!(target, temp.path().join("out").join("test").join("item.bin"));
    assert!(!part.exists());
    assert_eq!(fs::read_to_string(&target).unwrap(), "content");
    let modified = File::open(&target).unwrap().metadata().unwrap().modified().unwrap();
    assert_eq!(modified, UNIX_EPOCH + Duration::from_secs(1_000_000_000));
}

#[test]
fn materialize_without_temp_file_is_a_no_op() {
    let temp = TempDir::new().unwrap();
    let mut ctx = context(&temp);
    assert_eq!(materialize(&ctx).unwrap(), None);

    ctx.set_temppath(temp.path().join("consumed.part"));
    assert_eq!(materialize(&ctx).unwrap(), None);
    assert!(!ctx.realpath().exists());
}
