//! Streaming-file injection.
//!
//! Streaming copies of placeholder files are added next to the place the
//! placeholder occupied, with the rights of the placeholder's original
//! listing entry. [`StreamingFiles::plan`] validates everything before any
//! bag is touched and the listing only changes once all copies succeeded.

use crate::error::{AvBagError, AvBagResult};
use crate::fsutil::{copy_file, relative_posix};
use crate::listing::{FileEntry, FilesXml, ACCESSIBLE_TO_RIGHTS, VISIBLE_TO_RIGHTS};
use crate::placeholders::Placeholders;
use crate::sources::SourceFiles;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::debug;

#[derive(Debug, Clone)]
pub struct StreamingFiles {
    sources: SourceFiles,
    /// listing entries of the mapped ids, as found in the original listing
    originals: BTreeMap<String, FileEntry>,
}

/// A validated injection: where one source goes and how it is described.
#[derive(Debug, Clone, PartialEq, Eq)]
struct PendingFile {
    source: PathBuf,
    file_path: String,
    accessible: String,
    visible: String,
}

/// Injections that passed validation and still wait to be applied to a bag.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamingPlan {
    pending: Vec<PendingFile>,
}

impl StreamingFiles {
    /// `listing` is the file listing before any entry was removed; only the
    /// entries of ids in `sources` are kept.
    pub fn new(listing: &FilesXml, sources: SourceFiles) -> Self {
        let originals = listing
            .entries()
            .into_iter()
            .filter_map(|e| {
                let id = e.file_id.clone()?;
                sources.contains_key(&id).then_some((id, e))
            })
            .collect();
        Self { sources, originals }
    }

    /// Fails when a mapped id has no entry in the listing.
    pub fn check_ids_present(&self) -> AvBagResult<()> {
        let missing: Vec<String> = self
            .sources
            .keys()
            .filter(|id| !self.originals.contains_key(*id))
            .cloned()
            .collect();
        if missing.is_empty() {
            Ok(())
        } else {
            Err(AvBagError::StreamingIdsMissing { ids: missing })
        }
    }

    /// Validate every injection without touching any bag: ids, placeholder
    /// destinations and rights.
    pub fn plan(&self, placeholders: &Placeholders) -> AvBagResult<StreamingPlan> {
        self.check_ids_present()?;
        let mut pending = Vec::with_capacity(self.sources.len());
        for (file_id, source) in &self.sources {
            let Some(original) = self.originals.get(file_id) else {
                continue;
            };
            let placeholder = placeholders.dest_path(file_id).ok_or_else(|| {
                AvBagError::StreamingIdsMissing {
                    ids: vec![file_id.clone()],
                }
            })?;
            let accessible = required_rights(file_id, ACCESSIBLE_TO_RIGHTS, &original.accessible_to_rights)?;
            let visible = required_rights(file_id, VISIBLE_TO_RIGHTS, &original.visible_to_rights)?;
            pending.push(PendingFile {
                source: source.clone(),
                file_path: streaming_path(placeholder, source),
                accessible,
                visible,
            });
        }
        Ok(StreamingPlan { pending })
    }
}

impl StreamingPlan {
    /// Whether any injection is pending; decides if a streaming revision is made.
    pub fn has_files_to_add(&self) -> bool {
        !self.pending.is_empty()
    }

    /// Copy every pending source into `bag_dir` and append their entries to
    /// `listing`. Returns the added paths relative to the bag root.
    ///
    /// Consumes the plan, so nothing stays pending afterwards. The listing is
    /// not written.
    pub fn add_files(self, bag_dir: &Path, listing: &mut FilesXml) -> AvBagResult<Vec<String>> {
        for file in &self.pending {
            let target = bag_dir.join(&file.file_path);
            copy_file(&file.source, &target)?;
            debug!("copied {} to {}", file.source.display(), target.display());
        }
        for file in &self.pending {
            listing.append_file(&file.file_path, &file.accessible, &file.visible);
        }
        Ok(self.pending.into_iter().map(|f| f.file_path).collect())
    }
}

fn required_rights(file_id: &str, field: &str, value: &Option<String>) -> AvBagResult<String> {
    value
        .as_ref()
        .filter(|v| !v.is_empty())
        .cloned()
        .ok_or_else(|| AvBagError::MissingRights {
            file_id: file_id.to_string(),
            field: field.to_string(),
        })
}

/// Placeholder path with its extension replaced by the source's.
///
/// `-streaming` is inserted when both extensions are equal so the copy never
/// takes the name of the archive file at the placeholder path.
fn streaming_path(placeholder: &Path, source: &Path) -> String {
    let source_ext = extension(source);
    let suffix = if source_ext == extension(placeholder) {
        if source_ext.is_empty() {
            "-streaming".to_string()
        } else {
            format!("-streaming.{source_ext}")
        }
    } else if source_ext.is_empty() {
        String::new()
    } else {
        format!(".{source_ext}")
    };
    let stem = placeholder
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let new_path = placeholder.with_file_name(format!("{stem}{suffix}"));
    relative_posix(Path::new(""), &new_path).unwrap_or_default()
}

fn extension(path: &Path) -> String {
    path.extension()
        .map(|e| e.to_string_lossy().into_owned())
        .unwrap_or_default()
}
