//! Removes payload files, their listing entries and emptied directories.

use crate::error::{AvBagError, AvBagResult};
use crate::filter::NoneNoneAndPlaceholderFilter;
use crate::listing::{payload_path, FilesXml};
use crate::placeholders::bag_parent_name;
use std::path::{Path, PathBuf};
use tracing::debug;

pub struct FileRemover<'a> {
    bag_dir: &'a Path,
}

impl<'a> FileRemover<'a> {
    pub fn new(bag_dir: &'a Path) -> Self {
        Self { bag_dir }
    }

    /// Detach matching entries from `listing`, delete their payload files and
    /// prune directories left empty. Returns the removed paths relative to
    /// the bag root.
    ///
    /// The listing is not written; callers persist it once all edits are done.
    /// Every path is checked before the first file is deleted.
    pub fn remove_files(
        &self,
        listing: &mut FilesXml,
        filter: &NoneNoneAndPlaceholderFilter,
    ) -> AvBagResult<Vec<PathBuf>> {
        let removed_paths = listing
            .remove_files(|entry| filter.matches(entry))
            .into_iter()
            .filter_map(|entry| entry.file_path)
            .map(|file_path| payload_path(&file_path))
            .collect::<AvBagResult<Vec<PathBuf>>>()?;
        for file_path in &removed_paths {
            let file = self.bag_dir.join(file_path);
            std::fs::remove_file(&file).map_err(|source| AvBagError::DeleteFailed {
                bag: bag_parent_name(self.bag_dir),
                path: file.clone(),
                source,
            })?;
            debug!("removed {}", file.display());
            if let Some(parent) = file.parent() {
                self.delete_if_empty(parent)?;
            }
        }
        Ok(removed_paths)
    }

    /// Delete `dir` and its ancestors while they are empty, stopping at the bag root.
    fn delete_if_empty(&self, dir: &Path) -> AvBagResult<()> {
        let mut current = Some(dir);
        while let Some(dir) = current {
            if dir == self.bag_dir || !dir.starts_with(self.bag_dir) {
                break;
            }
            let mut entries = std::fs::read_dir(dir).map_err(|e| AvBagError::io(dir, e))?;
            if entries.next().is_some() {
                break;
            }
            std::fs::remove_dir(dir).map_err(|e| AvBagError::io(dir, e))?;
            current = dir.parent();
        }
        Ok(())
    }
}
