use std::ffi::OsString;
use std::fs::{self, File};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};

use tracing::debug;
use walkdir::WalkDir;

use crate::constants::files::RAW_BATCH_EXTENSIONS;
use crate::constants::snapshot::STAGING_SUFFIX;
use crate::errors::MonitorError;

/// True if the path extension is one of `extensions` (case-insensitive).
pub fn has_extension(path: &Path, extensions: &[&str]) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| extensions.iter().any(|known| ext.eq_ignore_ascii_case(known)))
        .unwrap_or(false)
}

/// Raw batch files under `root`, in lexicographic path order.
///
/// A file root is returned as-is. A directory root is walked recursively and
/// filtered to known batch extensions. A missing root is `MissingInput`.
pub fn list_batch_files(root: &Path) -> Result<Vec<PathBuf>, MonitorError> {
    if !root.exists() {
        return Err(MonitorError::MissingInput {
            path: root.to_path_buf(),
        });
    }
    if root.is_file() {
        return Ok(vec![root.to_path_buf()]);
    }
    let mut files = Vec::new();
    for entry in WalkDir::new(root).sort_by_file_name() {
        let entry = entry.map_err(|err| MonitorError::InputFormat {
            path: root.to_path_buf(),
            reason: format!("failed listing batch directory: {err}"),
        })?;
        if entry.file_type().is_file() && has_extension(entry.path(), &RAW_BATCH_EXTENSIONS) {
            files.push(entry.into_path());
        }
    }
    files.sort();
    debug!(
        "[judilibre:source] {} batch file(s) under {}",
        files.len(),
        root.display()
    );
    Ok(files)
}

/// Lines of `path`, split on `\n` with a trailing `\r` removed.
///
/// A line that is not valid UTF-8 comes back as `None` so callers can count
/// it and keep going.
pub fn read_lines_lossy(path: &Path) -> Result<Vec<Option<String>>, MonitorError> {
    let reader = BufReader::new(File::open(path)?);
    let mut lines = Vec::new();
    for chunk in reader.split(b'\n') {
        let mut bytes = chunk?;
        if bytes.last() == Some(&b'\r') {
            bytes.pop();
        }
        lines.push(String::from_utf8(bytes).ok());
    }
    Ok(lines)
}

/// Staging path next to `target` (`name.parquet` -> `.name.parquet.tmp`).
pub fn staging_path(target: &Path) -> PathBuf {
    let mut name = OsString::from(".");
    name.push(target.file_name().unwrap_or_default());
    name.push(".");
    name.push(STAGING_SUFFIX);
    target.with_file_name(name)
}

/// Write a staging file for `target` through `write`, then fsync it.
///
/// The target itself is not touched. On any failure the staging file is removed.
pub fn write_staged<F>(target: &Path, write: F) -> Result<PathBuf, MonitorError>
where
    F: FnOnce(&mut File) -> Result<(), MonitorError>,
{
    if let Some(parent) = target.parent()
        && !parent.as_os_str().is_empty()
    {
        fs::create_dir_all(parent)?;
    }
    let staging = staging_path(target);
    let result = File::create(&staging)
        .map_err(MonitorError::from)
        .and_then(|mut file| {
            write(&mut file)?;
            file.sync_all()?;
            Ok(())
        });
    match result {
        Ok(()) => Ok(staging),
        Err(err) => {
            let _ = fs::remove_file(&staging);
            Err(err)
        }
    }
}

/// Move a staged file over its target in one rename.
pub fn commit_staged(staging: &Path, target: &Path) -> Result<(), MonitorError> {
    fs::rename(staging, target)?;
    Ok(())
}

/// Best-effort removal of staging files after an aborted write.
pub fn discard_staged<'a>(paths: impl IntoIterator<Item = &'a Path>) {
    for path in paths {
        if let Err(err) = fs::remove_file(path) {
            debug!(
                "[judilibre:snapshot] could not remove staging file {}: {}",
                path.display(),
                err
            );
        }
    }
}

/// Replace `target` with `bytes` without exposing a partially written file.
pub fn write_atomic(target: &Path, bytes: &[u8]) -> Result<(), MonitorError> {
    let staging = write_staged(target, |file| {
        file.write_all(bytes)?;
        Ok(())
    })?;
    if let Err(err) = commit_staged(&staging, target) {
        discard_staged([staging.as_path()]);
        return Err(err);
    }
    Ok(())
}
