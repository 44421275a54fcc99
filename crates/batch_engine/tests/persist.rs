use std::fs;
use std::io::Write;

use batch_engine::{probe_writable_dir, AtomicFileWriter};
use tempfile::TempDir;

#[test]
fn probe_creates_missing_download_dir() {
    let temp = TempDir::new().unwrap();
    let new_dir = temp.path().join("downloads").join("sct").join("20111111112");
    assert!(!new_dir.exists());
    probe_writable_dir(&new_dir).unwrap();
    assert!(new_dir.is_dir());
}

#[test]
fn atomic_write_replaces_existing() {
    let temp = TempDir::new().unwrap();
    let writer = AtomicFileWriter::new(temp.path().to_path_buf());

    let first = writer.write("results-sct.json", b"[]").unwrap();
    assert_eq!(first.file_name().unwrap(), "results-sct.json");
    assert_eq!(fs::read_to_string(&first).unwrap(), "[]");

    let second = writer.write("results-sct.json", b"[1]").unwrap();
    assert_eq!(first, second);
    assert_eq!(fs::read_to_string(&second).unwrap(), "[1]");
}

#[test]
fn persist_new_picks_a_free_name() {
    let temp = TempDir::new().unwrap();
    let writer = AtomicFileWriter::new(temp.path().to_path_buf());

    let mut names = Vec::new();
    for body in ["a", "b", "c"] {
        let mut staged = writer.staging_file().unwrap();
        staged.write_all(body.as_bytes()).unwrap();
        names.push(writer.persist_new(staged, "constancia.pdf").unwrap());
    }

    assert_eq!(names[0], temp.path().join("constancia.pdf"));
    names.sort();
    names.dedup();
    assert_eq!(names.len(), 3);
    assert_eq!(fs::read_dir(temp.path()).unwrap().count(), 3);
}

#[test]
fn no_partial_file_on_error() {
    let temp = TempDir::new().unwrap();
    let file_path = temp.path().join("not_a_dir");
    fs::write(&file_path, "x").unwrap();

    let writer = AtomicFileWriter::new(file_path.clone());
    let result = writer.write("results.json", b"data");
    assert!(result.is_err());
    assert!(!file_path.with_file_name("results.json").exists());
}
