//! Which payload files must leave a bag.

use crate::listing::FileEntry;
use crate::placeholders::Placeholders;
use std::collections::BTreeSet;
use std::path::PathBuf;

/// Selects placeholder destinations and entries whose accessible and visible
/// rights are both `NONE`.
#[derive(Debug, Clone, Default)]
pub struct NoneNoneAndPlaceholderFilter {
    placeholder_paths: BTreeSet<PathBuf>,
}

impl NoneNoneAndPlaceholderFilter {
    pub fn new(placeholders: &Placeholders) -> Self {
        Self {
            placeholder_paths: placeholders.paths().into_iter().collect(),
        }
    }

    pub fn matches(&self, entry: &FileEntry) -> bool {
        let is_placeholder = entry
            .file_path
            .as_deref()
            .is_some_and(|p| self.placeholder_paths.contains(&PathBuf::from(p)));
        is_placeholder || entry.is_none_none()
    }
}
