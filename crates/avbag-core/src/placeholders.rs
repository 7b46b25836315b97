//! Placeholder resolution.
//!
//! A placeholder is a zero-length payload file whose listing entry carries an
//! origin annotation (`<dct:source>`). Its real content lives in the external
//! sources; the placeholder only tells where that content belongs in the bag.

use crate::error::{AvBagError, AvBagResult};
use crate::listing::{payload_path, FileEntry, FilesXml};
use crate::sources::SourceCatalog;
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use tracing::error;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Placeholders {
    bag_parent: String,
    /// file id -> destination path relative to the bag root
    destinations: BTreeMap<String, PathBuf>,
}

impl Placeholders {
    /// Scan the listing of `bag_dir` for placeholders and strip all origin
    /// annotations from `listing`.
    ///
    /// Entries without identifier or filepath are logged and skipped. A
    /// referenced payload file that does not exist fails the scan.
    pub fn resolve(bag_dir: &Path, listing: &mut FilesXml) -> AvBagResult<Self> {
        let bag_parent = bag_parent_name(bag_dir);
        let mut destinations = BTreeMap::new();

        for element in listing.file_elements() {
            let entry = FileEntry::from_element(element);
            if !entry.has_source {
                continue;
            }
            let Some(file_id) = entry.file_id else {
                error!(bag = %bag_parent, "no <dct:identifier> found: {}", element.to_xml_string());
                continue;
            };
            let Some(file_path) = entry.file_path else {
                error!(bag = %bag_parent, "no filepath attribute found: {}", element.to_xml_string());
                continue;
            };
            let dest = payload_path(&file_path)?;
            let payload = bag_dir.join(&dest);
            let size = std::fs::metadata(&payload)
                .map_err(|e| AvBagError::io(&payload, e))?
                .len();
            if size == 0 {
                destinations.insert(file_id, dest);
            }
        }
        listing.strip_sources();

        Ok(Self {
            bag_parent,
            destinations,
        })
    }

    /// Destination of the placeholder with the given file id.
    pub fn dest_path(&self, file_id: &str) -> Option<&Path> {
        self.destinations.get(file_id).map(PathBuf::as_path)
    }

    pub fn paths(&self) -> Vec<PathBuf> {
        self.destinations.values().cloned().collect()
    }

    pub fn ids(&self) -> BTreeSet<&str> {
        self.destinations.keys().map(String::as_str).collect()
    }

    /// Whether the placeholder ids equal the archive-source ids cataloged for
    /// this bag parent. Differences are logged in both directions.
    pub fn has_same_file_ids(&self, catalog: &SourceCatalog) -> bool {
        let mapped = catalog.archive_files_for(&self.bag_parent);
        let mapped: BTreeSet<&str> = mapped.keys().map(String::as_str).collect();
        let replaced = self.ids();

        let only_in_mapping: Vec<&str> = mapped.difference(&replaced).copied().collect();
        let only_in_replaced: Vec<&str> = replaced.difference(&mapped).copied().collect();

        if !only_in_mapping.is_empty() {
            error!(
                "{} files in source catalog but not having <dct:source> and length zero: [{}]",
                self.bag_parent,
                only_in_mapping.join(", ")
            );
        }
        if !only_in_replaced.is_empty() {
            error!(
                "{} files having <dct:source> and length zero but not in source catalog: [{}]",
                self.bag_parent,
                only_in_replaced.join(", ")
            );
        }
        only_in_mapping.is_empty() && only_in_replaced.is_empty()
    }
}

/// Name of the directory holding the bag.
pub fn bag_parent_name(bag_dir: &Path) -> String {
    bag_dir
        .parent()
        .and_then(Path::file_name)
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}
