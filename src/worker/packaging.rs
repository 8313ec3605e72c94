//! Zip extraction and packing for session bundles.

use std::fs::{self, File};
use std::io::{self, BufReader};
use std::path::Path;

use tempfile::NamedTempFile;
use tracing::{debug, warn};
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

use crate::processing::walk_files;
use crate::{AppError, Result};

/// Unpack `archive` into `dest`, creating it when needed.
///
/// Only directories and regular files are written. Symlink entries are
/// skipped, so nothing outside `dest` becomes reachable from the tree.
///
/// # Errors
///
/// Returns `AppError::Archive` if the file is not a readable zip archive or
/// an entry name would escape `dest`.
pub fn extract_archive(archive: &Path, dest: &Path) -> Result<()> {
    let file = File::open(archive).map_err(|err| {
        AppError::Archive(format!("failed to open {}: {err}", archive.display()))
    })?;
    let mut zip = ZipArchive::new(BufReader::new(file))?;
    fs::create_dir_all(dest)?;

    let mut skipped = 0usize;
    for index in 0..zip.len() {
        let mut entry = zip.by_index(index)?;
        let Some(relative) = entry.enclosed_name() else {
            return Err(AppError::Archive(format!(
                "entry '{}' escapes the extraction directory",
                entry.name()
            )));
        };
        let target = dest.join(relative);

        if entry.is_dir() {
            fs::create_dir_all(&target)?;
            continue;
        }
        if entry.unix_mode().is_some_and(is_symlink_mode) {
            warn!(entry = entry.name(), "symlink entry skipped");
            skipped += 1;
            continue;
        }

        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent)?;
        }
        let mut out = File::create(&target)?;
        io::copy(&mut entry, &mut out)?;
    }

    debug!(archive = %archive.display(), entries = zip.len(), skipped, "archive extracted");
    Ok(())
}

fn is_symlink_mode(mode: u32) -> bool {
    mode & 0o170_000 == 0o120_000
}

/// Pack every regular file below `root` into the zip archive at `dest`.
///
/// The archive is built next to `dest` and renamed into place, so readers
/// never observe a partial file. Returns the number of packed files.
///
/// # Errors
///
/// Returns `AppError::Archive` if a file cannot be read or the archive
/// cannot be written.
pub fn pack_directory(root: &Path, dest: &Path) -> Result<usize> {
    let parent = dest
        .parent()
        .ok_or_else(|| AppError::Archive("result path has no parent directory".into()))?;
    let tmp = NamedTempFile::new_in(parent)?;
    let mut writer = ZipWriter::new(tmp);
    let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);

    let files = walk_files(root, |_| true, |_| false)?;
    for path in &files {
        let name = entry_name(root, path)?;
        writer.start_file(name, options)?;
        let mut source = File::open(path)?;
        io::copy(&mut source, &mut writer)?;
    }

    let tmp = writer.finish()?;
    tmp.persist(dest).map_err(|err| {
        AppError::Archive(format!("failed to persist {}: {err}", dest.display()))
    })?;
    Ok(files.len())
}

/// Zip entry name of `path` relative to `root`, always `/`-separated.
fn entry_name(root: &Path, path: &Path) -> Result<String> {
    let relative = path.strip_prefix(root).map_err(|_| {
        AppError::Archive(format!("{} is outside {}", path.display(), root.display()))
    })?;
    Ok(relative
        .components()
        .map(|part| part.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/"))
}
