//! Unit tests for zip extraction and packing.

use std::fs::{self, File};
use std::io::{Read, Write};

use session_annotator::worker::packaging::{extract_archive, pack_directory};
use session_annotator::AppError;
use zip::write::SimpleFileOptions;
use zip::{ZipArchive, ZipWriter};

#[test]
fn pack_then_extract_preserves_the_tree() {
    let dir = tempfile::tempdir().expect("tempdir");
    let root = dir.path().join("sessions");
    fs::create_dir_all(root.join("S01/audio")).expect("mkdir");
    fs::write(root.join("S01/ledger.csv"), "Block_Nr\n1\n").expect("write");
    fs::write(root.join("S01/audio/t1.wav"), b"RIFF").expect("write");

    let dest = dir.path().join("result.zip");
    let packed = pack_directory(&root, &dest).expect("pack");
    assert_eq!(packed, 2);

    let mut archive = ZipArchive::new(File::open(&dest).expect("open")).expect("zip");
    let mut names: Vec<String> = archive.file_names().map(str::to_owned).collect();
    names.sort();
    assert_eq!(names, vec!["S01/audio/t1.wav", "S01/ledger.csv"]);

    let mut ledger = String::new();
    archive
        .by_name("S01/ledger.csv")
        .expect("entry")
        .read_to_string(&mut ledger)
        .expect("read");
    assert_eq!(ledger, "Block_Nr\n1\n");

    let out = dir.path().join("unpacked");
    extract_archive(&dest, &out).expect("extract");
    assert_eq!(fs::read(out.join("S01/audio/t1.wav")).expect("read"), b"RIFF");
}

#[test]
fn repacking_replaces_the_previous_archive() {
    let dir = tempfile::tempdir().expect("tempdir");
    let root = dir.path().join("sessions");
    fs::create_dir_all(&root).expect("mkdir");
    fs::write(root.join("a.csv"), "x").expect("write");
    let dest = dir.path().join("result.zip");

    pack_directory(&root, &dest).expect("first pack");
    fs::write(root.join("b.csv"), "y").expect("write");
    assert_eq!(pack_directory(&root, &dest).expect("second pack"), 2);

    let archive = ZipArchive::new(File::open(&dest).expect("open")).expect("zip");
    assert_eq!(archive.len(), 2);
}

#[test]
fn entries_escaping_the_destination_are_rejected() {
    let dir = tempfile::tempdir().expect("tempdir");
    let zip_path = dir.path().join("evil.zip");
    {
        let mut writer = ZipWriter::new(File::create(&zip_path).expect("create"));
        writer
            .start_file("../escaped.txt", SimpleFileOptions::default())
            .expect("start");
        writer.write_all(b"gotcha").expect("write");
        writer.finish().expect("finish");
    }

    let out = dir.path().join("out");
    let result = extract_archive(&zip_path, &out);
    assert!(result.is_err());
    assert!(!dir.path().join("escaped.txt").exists());
}

#[test]
fn non_zip_input_is_an_archive_error() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("upload.zip");
    fs::write(&path, "definitely not a zip").expect("write");

    let err = extract_archive(&path, &dir.path().join("out")).expect_err("must fail");
    assert!(matches!(err, AppError::Archive(_)));
}

// ── symlinks ─────────────────────────────────────────────────

#[test]
fn symlink_entries_are_not_extracted() {
    let dir = tempfile::tempdir().expect("tempdir");
    let secret = dir.path().join("secret.txt");
    fs::write(&secret, "host-only").expect("write secret");

    let zip_path = dir.path().join("bundle.zip");
    {
        let mut writer = ZipWriter::new(File::create(&zip_path).expect("create"));
        writer
            .start_file("s1/ledger.csv", SimpleFileOptions::default())
            .expect("start");
        writer.write_all(b"Block_Nr\n1\n").expect("write");
        writer
            .add_symlink(
                "s1/leak.txt",
                secret.to_string_lossy().into_owned(),
                SimpleFileOptions::default(),
            )
            .expect("symlink entry");
        writer.finish().expect("finish");
    }

    let out = dir.path().join("out");
    extract_archive(&zip_path, &out).expect("extract");
    assert!(out.join("s1/ledger.csv").is_file());
    assert!(fs::symlink_metadata(out.join("s1/leak.txt")).is_err());

    let dest = dir.path().join("result.zip");
    assert_eq!(pack_directory(&out, &dest).expect("pack"), 1);
    let archive = ZipArchive::new(File::open(&dest).expect("open")).expect("zip");
    let names: Vec<&str> = archive.file_names().collect();
    assert_eq!(names, vec!["s1/ledger.csv"]);
}

#[cfg(unix)]
#[test]
fn packing_skips_symlinks_and_does_not_loop() {
    let dir = tempfile::tempdir().expect("tempdir");
    let root = dir.path().join("sessions");
    fs::create_dir_all(root.join("S01")).expect("mkdir");
    fs::write(root.join("S01/ledger.csv"), "Block_Nr\n1\n").expect("write");
    fs::write(dir.path().join("outside.txt"), "host-only").expect("write");
    std::os::unix::fs::symlink(dir.path().join("outside.txt"), root.join("S01/leak.txt"))
        .expect("file symlink");
    std::os::unix::fs::symlink(&root, root.join("S01/loop")).expect("dir symlink");

    let dest = dir.path().join("result.zip");
    assert_eq!(pack_directory(&root, &dest).expect("pack"), 1);

    let archive = ZipArchive::new(File::open(&dest).expect("open")).expect("zip");
    let names: Vec<&str> = archive.file_names().collect();
    assert_eq!(names, vec!["S01/ledger.csv"]);
}
