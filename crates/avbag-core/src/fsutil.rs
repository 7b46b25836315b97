//! Directory helpers for staging, copying and moving bags.

use crate::error::{AvBagError, AvBagResult};
use std::path::{Path, PathBuf};

/// All regular files below `root`, sorted.
pub fn collect_files_recursive(root: &Path) -> AvBagResult<Vec<PathBuf>> {
    let mut out = Vec::new();
    if root.is_dir() {
        collect_files_recursive_inner(root, &mut out)?;
    }
    out.sort();
    Ok(out)
}

fn collect_files_recursive_inner(dir: &Path, out: &mut Vec<PathBuf>) -> AvBagResult<()> {
    for entry in std::fs::read_dir(dir).map_err(|e| AvBagError::io(dir, e))? {
        let entry = entry.map_err(|e| AvBagError::io(dir, e))?;
        let path = entry.path();
        let ft = entry.file_type().map_err(|e| AvBagError::io(&path, e))?;
        if ft.is_dir() {
            collect_files_recursive_inner(&path, out)?;
        } else if ft.is_file() {
            out.push(path);
        }
    }
    Ok(())
}

/// Direct subdirectories of `dir`, sorted by name.
pub fn list_dirs(dir: &Path) -> AvBagResult<Vec<PathBuf>> {
    let mut dirs = Vec::new();
    for entry in std::fs::read_dir(dir).map_err(|e| AvBagError::io(dir, e))? {
        let entry = entry.map_err(|e| AvBagError::io(dir, e))?;
        let path = entry.path();
        if path.is_dir() {
            dirs.push(path);
        } else {
            tracing::warn!("ignoring {}, not a directory", path.display());
        }
    }
    dirs.sort();
    Ok(dirs)
}

/// Number of entries directly in `dir`.
pub fn count_entries(dir: &Path) -> AvBagResult<usize> {
    Ok(std::fs::read_dir(dir)
        .map_err(|e| AvBagError::io(dir, e))?
        .count())
}

/// `path` relative to `base` with forward slashes, as used in manifests and listings.
pub fn relative_posix(base: &Path, path: &Path) -> Option<String> {
    let rel = path.strip_prefix(base).ok()?;
    let parts: Vec<String> = rel
        .components()
        .map(|c| c.as_os_str().to_string_lossy().into_owned())
        .collect();
    Some(parts.join("/"))
}

/// Copy the tree at `from` to `to`; `to` must not exist yet.
pub fn copy_dir_recursive(from: &Path, to: &Path) -> AvBagResult<()> {
    if to.exists() {
        return Err(AvBagError::io(
            to,
            std::io::Error::new(std::io::ErrorKind::AlreadyExists, "copy destination exists"),
        ));
    }
    copy_dir_inner(from, to)
}

fn copy_dir_inner(from: &Path, to: &Path) -> AvBagResult<()> {
    std::fs::create_dir_all(to).map_err(|e| AvBagError::io(to, e))?;
    for entry in std::fs::read_dir(from).map_err(|e| AvBagError::io(from, e))? {
        let entry = entry.map_err(|e| AvBagError::io(from, e))?;
        let src = entry.path();
        let dst = to.join(entry.file_name());
        let ft = entry.file_type().map_err(|e| AvBagError::io(&src, e))?;
        if ft.is_dir() {
            copy_dir_inner(&src, &dst)?;
        } else {
            copy_file(&src, &dst)?;
        }
    }
    Ok(())
}

/// Copy one file, creating missing parent directories and keeping the modification time.
pub fn copy_file(from: &Path, to: &Path) -> AvBagResult<()> {
    if let Some(parent) = to.parent() {
        std::fs::create_dir_all(parent).map_err(|e| AvBagError::io(parent, e))?;
    }
    std::fs::copy(from, to).map_err(|e| AvBagError::io(from, e))?;
    let modified = std::fs::metadata(from)
        .and_then(|m| m.modified())
        .map_err(|e| AvBagError::io(from, e))?;
    std::fs::File::options()
        .write(true)
        .open(to)
        .and_then(|f| f.set_modified(modified))
        .map_err(|e| AvBagError::io(to, e))?;
    Ok(())
}

/// Move a directory; falls back to copy and delete across file systems.
pub fn move_dir(from: &Path, to: &Path) -> AvBagResult<()> {
    if to.exists() {
        return Err(AvBagError::io(
            to,
            std::io::Error::new(std::io::ErrorKind::AlreadyExists, "move destination exists"),
        ));
    }
    if std::fs::rename(from, to).is_ok() {
        return Ok(());
    }
    copy_dir_recursive(from, to)?;
    std::fs::remove_dir_all(from).map_err(|e| AvBagError::io(from, e))
}
