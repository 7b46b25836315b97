//! External source catalog: where the real content of placeholder files lives.
//!
//! Loaded once per run from a CSV mapping with the columns
//! `easy_file_id`, `path_in_AV_dir` and `path_in_springfield_dir`.
//! The first segment of `path_in_AV_dir` names the bag parent (the directory
//! holding the bag in the input tree). Loading is all-or-nothing.

use crate::error::{AvBagError, AvBagResult};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::{Component, Path, PathBuf};
use tracing::{debug, warn};

pub const COL_FILE_ID: &str = "easy_file_id";
pub const COL_ARCHIVE_PATH: &str = "path_in_AV_dir";
pub const COL_STREAMING_PATH: &str = "path_in_springfield_dir";

/// file id -> absolute source path
pub type SourceFiles = BTreeMap<String, PathBuf>;

/// Locations of the two feeds and of the CSV mapping them.
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct SourcesConfig {
    /// Root of the archive-source feed (the full quality AV files).
    pub archive_dir: PathBuf,
    /// Root of the streaming-source feed.
    pub streaming_dir: PathBuf,
    /// CSV mapping file ids to paths below the two roots.
    pub csv: PathBuf,
}

/// bag parent -> file id -> path relative to a feed root
type Feed = BTreeMap<String, BTreeMap<String, String>>;

#[derive(Debug, Clone)]
pub struct SourceCatalog {
    archive_dir: PathBuf,
    streaming_dir: PathBuf,
    archive: Feed,
    streaming: Feed,
}

impl SourceCatalog {
    /// Load and validate the catalog.
    ///
    /// Fails before reading any row when a feed root is missing, fails when
    /// any row lacks a file id or archive path, and fails when any cataloged
    /// file is absent from disk.
    pub fn load(config: &SourcesConfig) -> AvBagResult<Self> {
        let not_dirs: Vec<PathBuf> = [&config.archive_dir, &config.streaming_dir]
            .into_iter()
            .filter(|d| !d.is_dir())
            .cloned()
            .collect();
        if !not_dirs.is_empty() {
            return Err(AvBagError::NotADirectory { paths: not_dirs });
        }

        let (archive, streaming) = read_csv(&config.csv)?;
        let catalog = Self {
            archive_dir: config.archive_dir.clone(),
            streaming_dir: config.streaming_dir.clone(),
            archive,
            streaming,
        };

        let mut missing = missing_files(&catalog.streaming_dir, &catalog.streaming);
        missing.extend(missing_files(&catalog.archive_dir, &catalog.archive));
        if !missing.is_empty() {
            return Err(AvBagError::MissingSourceFiles { paths: missing });
        }
        debug!(
            bag_parents = catalog.archive.len(),
            "loaded source catalog from {}",
            config.csv.display()
        );
        Ok(catalog)
    }

    /// Archive-source files of a bag parent; empty when the bag parent is unknown.
    pub fn archive_files_for(&self, bag_parent: &str) -> SourceFiles {
        resolve(&self.archive_dir, self.archive.get(bag_parent))
    }

    /// Streaming-source files of a bag parent; empty when the bag parent is unknown.
    pub fn streaming_files_for(&self, bag_parent: &str) -> SourceFiles {
        resolve(&self.streaming_dir, self.streaming.get(bag_parent))
    }
}

fn resolve(root: &Path, files: Option<&BTreeMap<String, String>>) -> SourceFiles {
    files
        .map(|files| {
            files
                .iter()
                .map(|(id, rel)| (id.clone(), root.join(rel)))
                .collect()
        })
        .unwrap_or_default()
}

fn missing_files(root: &Path, feed: &Feed) -> Vec<PathBuf> {
    feed.values()
        .flat_map(BTreeMap::values)
        .map(|rel| root.join(rel))
        .filter(|p| !p.exists())
        .collect()
}

fn read_csv(path: &Path) -> AvBagResult<(Feed, Feed)> {
    if !path.is_file() {
        return Err(AvBagError::CsvNotAFile {
            path: path.to_path_buf(),
        });
    }
    let csv_err = |source| AvBagError::Csv {
        path: path.to_path_buf(),
        source,
    };
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_path(path)
        .map_err(csv_err)?;

    let headers = reader.headers().map_err(csv_err)?.clone();
    let column = |name: &str| {
        headers
            .iter()
            .position(|h| h == name)
            .ok_or_else(|| AvBagError::CsvHeader {
                header: name.to_string(),
                actual: headers.iter().map(str::to_string).collect(),
            })
    };
    let id_col = column(COL_FILE_ID)?;
    let archive_col = column(COL_ARCHIVE_PATH)?;
    let streaming_col = column(COL_STREAMING_PATH)?;

    let mut archive = Feed::new();
    let mut streaming = Feed::new();
    let mut invalid = 0usize;
    for record in reader.records() {
        let record = record.map_err(csv_err)?;
        let field = |i: usize| record.get(i).filter(|v| !v.is_empty());
        match (field(id_col), field(archive_col).and_then(|p| bag_parent_of(p).map(|bp| (p, bp)))) {
            (Some(file_id), Some((archive_path, bag_parent))) => {
                archive
                    .entry(bag_parent.clone())
                    .or_default()
                    .insert(file_id.to_string(), archive_path.to_string());
                if let Some(streaming_path) = field(streaming_col) {
                    streaming
                        .entry(bag_parent)
                        .or_default()
                        .insert(file_id.to_string(), streaming_path.to_string());
                }
            }
            _ => {
                invalid += 1;
                let line = record.position().map_or(0, csv::Position::line);
                warn!(
                    line,
                    "no value in column {COL_ARCHIVE_PATH} and/or {COL_FILE_ID}: {:?}",
                    record.iter().collect::<Vec<_>>()
                );
            }
        }
    }
    if invalid > 0 {
        return Err(AvBagError::CsvInvalidRows { count: invalid });
    }
    Ok((archive, streaming))
}

/// First normal segment of a relative source path.
fn bag_parent_of(path: &str) -> Option<String> {
    Path::new(path).components().find_map(|c| match c {
        Component::Normal(s) => Some(s.to_string_lossy().into_owned()),
        _ => None,
    })
}
