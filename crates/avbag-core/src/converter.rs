//! Batch conversion: input tree -> staged revisions -> output tree.
//!
//! Every bag at `<input>/<bag-parent>/<bag>` becomes a chain of up to three
//! revisions:
//!
//! 1. the input with archive sources copied over the placeholders,
//!    staged at `<staging>/<bag-parent>/<bag>`;
//! 2. revision 1 without placeholders and none/none files;
//! 3. revision 2 plus streaming copies, only when the bag has any.
//!
//! Revisions 2 and 3 are staged at `<staging>/<id>/<id>` with freshly
//! allocated ids.
//! Bags are processed one at a time; a failing bag never stops the walk.

use crate::bag::{read_declaration, remove_payloads_from_manifests, update_manifests};
use crate::error::{AvBagError, AvBagResult};
use crate::filter::NoneNoneAndPlaceholderFilter;
use crate::fsutil::{copy_dir_recursive, copy_file, count_entries, list_dirs, move_dir};
use crate::listing::FilesXml;
use crate::placeholders::{bag_parent_name, Placeholders};
use crate::remover::FileRemover;
use crate::sources::SourceCatalog;
use crate::streaming::{StreamingFiles, StreamingPlan};
use crate::version::{update_bag_version, Clock, SystemClock};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use tracing::{error, info, warn};

/// Names the staging directories of revisions 2 and 3.
pub trait IdAllocator {
    fn next_id(&self) -> String;
}

/// Random version 4 UUIDs.
#[derive(Debug, Clone, Copy, Default)]
pub struct UuidAllocator;

impl IdAllocator for UuidAllocator {
    fn next_id(&self) -> String {
        uuid::Uuid::new_v4().to_string()
    }
}

/// UUID-shaped ids counting up from 1, for reproducible runs.
#[derive(Debug, Default)]
pub struct SequentialIds {
    next: AtomicUsize,
}

impl IdAllocator for SequentialIds {
    fn next_id(&self) -> String {
        let n = self.next.fetch_add(1, Ordering::Relaxed) + 1;
        format!("00000000-0000-4000-8000-{n:012}")
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConverterConfig {
    pub input_dir: PathBuf,
    pub output_dir: PathBuf,
    pub staging_dir: PathBuf,
    /// Leave the input bag parent in place after a successful conversion.
    pub keep_input: bool,
}

/// What happened to one input bag.
#[derive(Debug)]
pub enum BagOutcome {
    /// Output for the bag parent existed before the run.
    AlreadyDone,
    /// All revisions were moved to the output directory.
    Converted { revisions: usize },
    /// Revision 3 failed; revisions 1 and 2 were moved anyway.
    PartiallyConverted { revisions: usize, cause: AvBagError },
    /// Nothing was moved to the output directory.
    Failed { cause: AvBagError },
}

/// Run counters, folded from the bag outcomes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ConversionTally {
    pub processed: usize,
    pub failed: usize,
    pub created: usize,
    pub already_done: usize,
}

impl ConversionTally {
    pub fn record(&mut self, outcome: &BagOutcome) {
        match outcome {
            BagOutcome::AlreadyDone => self.already_done += 1,
            BagOutcome::Converted { revisions } => {
                self.processed += 1;
                self.created += revisions;
            }
            BagOutcome::PartiallyConverted { revisions, .. } => {
                self.processed += 1;
                self.failed += 1;
                self.created += revisions;
            }
            BagOutcome::Failed { .. } => self.failed += 1,
        }
    }
}

/// The line printed at the end of a run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunSummary {
    pub tally: ConversionTally,
    pub dir_counts: Vec<(PathBuf, usize)>,
}

impl fmt::Display for RunSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let t = &self.tally;
        write!(
            f,
            "Conversion finished. Bags processed={}, failed={}, created={}, doneBefore={}. In directories: ",
            t.processed, t.failed, t.created, t.already_done
        )?;
        let dirs: Vec<String> = self
            .dir_counts
            .iter()
            .map(|(dir, n)| format!("{}={n}", dir.display()))
            .collect();
        f.write_str(&dirs.join(", "))
    }
}

/// Revisions of one bag that made it into staging.
struct Staged {
    revisions: Vec<PathBuf>,
    revision3_failure: Option<AvBagError>,
}

pub struct Converter<'a> {
    config: ConverterConfig,
    catalog: &'a SourceCatalog,
    ids: Box<dyn IdAllocator + 'a>,
    clock: Box<dyn Clock + 'a>,
}

impl<'a> Converter<'a> {
    pub fn new(config: ConverterConfig, catalog: &'a SourceCatalog) -> Self {
        Self {
            config,
            catalog,
            ids: Box::new(UuidAllocator),
            clock: Box::new(SystemClock),
        }
    }

    pub fn with_id_allocator(mut self, ids: impl IdAllocator + 'a) -> Self {
        self.ids = Box::new(ids);
        self
    }

    pub fn with_clock(mut self, clock: impl Clock + 'a) -> Self {
        self.clock = Box::new(clock);
        self
    }

    /// Convert every bag below the input directory.
    ///
    /// Fails only for run-level problems found before the first bag: missing
    /// input or output directory, missing or non-empty staging directory.
    pub fn convert_all(&self) -> AvBagResult<ConversionTally> {
        self.check_directories()?;
        let mut tally = ConversionTally::default();
        for bag_parent in list_dirs(&self.config.input_dir)? {
            self.convert_bag_parent(&bag_parent, &mut tally);
        }
        Ok(tally)
    }

    /// Convert the bags below one bag parent. A bag parent that cannot be
    /// listed counts as one failed bag.
    fn convert_bag_parent(&self, bag_parent: &Path, tally: &mut ConversionTally) {
        match list_dirs(bag_parent) {
            Ok(bags) => {
                for bag in bags {
                    tally.record(&self.convert_one(&bag));
                }
            }
            Err(cause) => {
                let name = bag_parent
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_default();
                tally.record(&self.failed(&name, cause));
            }
        }
    }

    fn check_directories(&self) -> AvBagResult<()> {
        let ConverterConfig {
            input_dir,
            output_dir,
            staging_dir,
            ..
        } = &self.config;
        let not_dirs: Vec<PathBuf> = [input_dir, output_dir, staging_dir]
            .into_iter()
            .filter(|d| !d.is_dir())
            .cloned()
            .collect();
        if !not_dirs.is_empty() {
            return Err(AvBagError::NotADirectory { paths: not_dirs });
        }
        let mut entries =
            std::fs::read_dir(staging_dir).map_err(|source| AvBagError::StagingUnreadable {
                path: staging_dir.clone(),
                source,
            })?;
        if entries.next().is_some() {
            return Err(AvBagError::StagingNotEmpty {
                path: staging_dir.clone(),
            });
        }
        Ok(())
    }

    /// Entry counts of the input, staging and output directories.
    pub fn summary(&self, tally: ConversionTally) -> AvBagResult<RunSummary> {
        let dirs = [
            &self.config.input_dir,
            &self.config.staging_dir,
            &self.config.output_dir,
        ];
        let mut dir_counts = Vec::with_capacity(dirs.len());
        for dir in dirs {
            dir_counts.push((dir.clone(), count_entries(dir)?));
        }
        Ok(RunSummary { tally, dir_counts })
    }

    /// Convert the bag at `<input>/<bag-parent>/<bag>`.
    pub fn convert_one(&self, bag_dir: &Path) -> BagOutcome {
        let bag_parent = bag_parent_name(bag_dir);
        let done = self.config.output_dir.join(&bag_parent);
        if done.exists() {
            warn!(bag = %bag_parent, "skipped {}, it exists in {}", bag_parent, self.config.output_dir.display());
            return BagOutcome::AlreadyDone;
        }

        let staged = match self.stage_revisions(bag_dir, &bag_parent) {
            Ok(staged) => staged,
            Err(cause) => return self.failed(&bag_parent, cause),
        };

        let mut moved = 0usize;
        for revision in &staged.revisions {
            if let Err(cause) = self.move_to_output(revision) {
                return self.failed(&bag_parent, cause);
            }
            moved += 1;
        }

        if let Some(cause) = staged.revision3_failure {
            error!(
                bag = %bag_parent,
                staging = %self.config.staging_dir.display(),
                "{} revision 3 failed, revisions 1 and 2 were moved: {}",
                bag_parent,
                cause
            );
            return BagOutcome::PartiallyConverted {
                revisions: moved,
                cause,
            };
        }

        if !self.config.keep_input {
            if let Some(input_parent) = bag_dir.parent() {
                if let Err(e) = std::fs::remove_dir_all(input_parent) {
                    // the revisions are already in the output directory
                    error!(bag = %bag_parent, "could not delete {}: {}", input_parent.display(), e);
                }
            }
        }
        BagOutcome::Converted { revisions: moved }
    }

    fn failed(&self, bag_parent: &str, cause: AvBagError) -> BagOutcome {
        error!(
            bag = %bag_parent,
            staging = %self.config.staging_dir.display(),
            "{} failed, it may or may not have (incomplete) bags in {}: {}",
            bag_parent,
            self.config.staging_dir.display(),
            cause
        );
        BagOutcome::Failed { cause }
    }

    fn stage_revisions(&self, bag_dir: &Path, bag_parent: &str) -> AvBagResult<Staged> {
        read_declaration(bag_dir)?;
        let mut listing = FilesXml::read(bag_dir)?;
        listing.check_paths()?;
        let placeholders = Placeholders::resolve(bag_dir, &mut listing)?;
        if !placeholders.has_same_file_ids(self.catalog) {
            return Err(AvBagError::IdMismatch {
                bag: bag_parent.to_string(),
            });
        }
        let streaming = StreamingFiles::new(&listing, self.catalog.streaming_files_for(bag_parent));

        let revision1 = self.revision1(bag_dir, bag_parent, &placeholders, &listing)?;
        let revision2 = self.revision2(&revision1, bag_parent, &placeholders, listing)?;
        let mut staged = Staged {
            revisions: vec![revision1, revision2.clone()],
            revision3_failure: None,
        };

        match streaming.plan(&placeholders) {
            Ok(plan) if plan.has_files_to_add() => match self.revision3(&revision2, bag_parent, plan) {
                Ok(revision3) => staged.revisions.push(revision3),
                Err(e) => staged.revision3_failure = Some(e),
            },
            Ok(_) => info!(bag = %bag_parent, "no streaming files found for {}", bag_parent),
            Err(e) => staged.revision3_failure = Some(e),
        }
        Ok(staged)
    }

    /// `<staging>/<fresh id>/<fresh id>`
    fn fresh_staging_dir(&self) -> (String, PathBuf) {
        let parent = self.ids.next_id();
        let dir = self.config.staging_dir.join(&parent).join(self.ids.next_id());
        (parent, dir)
    }

    fn revision1(
        &self,
        input_bag: &Path,
        bag_parent: &str,
        placeholders: &Placeholders,
        listing: &FilesXml,
    ) -> AvBagResult<PathBuf> {
        let name = input_bag.file_name().unwrap_or(input_bag.as_os_str());
        let revision = self.config.staging_dir.join(bag_parent).join(name);
        info!(bag = %bag_parent, "creating revision 1: {} ### {}", bag_parent, name.to_string_lossy());
        copy_dir_recursive(input_bag, &revision)?;
        for (file_id, source) in self.catalog.archive_files_for(bag_parent) {
            let Some(dest) = placeholders.dest_path(&file_id) else {
                continue;
            };
            copy_file(&source, &revision.join(dest))?;
        }
        listing.write(&revision)?;
        update_manifests(&revision)?;
        Ok(revision)
    }

    fn revision2(
        &self,
        revision1: &Path,
        bag_parent: &str,
        placeholders: &Placeholders,
        mut listing: FilesXml,
    ) -> AvBagResult<PathBuf> {
        let (id, revision) = self.fresh_staging_dir();
        info!(bag = %bag_parent, "creating revision 2: {} ### {}", bag_parent, id);
        copy_dir_recursive(revision1, &revision)?;
        let filter = NoneNoneAndPlaceholderFilter::new(placeholders);
        let removed = FileRemover::new(&revision).remove_files(&mut listing, &filter)?;
        listing.write(&revision)?;
        update_bag_version(&revision, revision1, self.clock.as_ref())?;
        remove_payloads_from_manifests(&revision, &removed)?;
        Ok(revision)
    }

    /// Staged only after `plan` validated every injection.
    fn revision3(&self, revision2: &Path, bag_parent: &str, plan: StreamingPlan) -> AvBagResult<PathBuf> {
        let (id, revision) = self.fresh_staging_dir();
        info!(bag = %bag_parent, "creating revision 3: {} ### {}", bag_parent, id);
        copy_dir_recursive(revision2, &revision)?;
        let mut listing = FilesXml::read(&revision)?;
        let added = plan.add_files(&revision, &mut listing)?;
        info!(bag = %bag_parent, "added streaming files to {}: [{}]", id, added.join(", "));
        listing.write(&revision)?;
        update_bag_version(&revision, revision2, self.clock.as_ref())?;
        update_manifests(&revision)?;
        Ok(revision)
    }

    /// Move the staged revision's parent directory into the output directory.
    fn move_to_output(&self, revision: &Path) -> AvBagResult<()> {
        let Some(parent) = revision.parent() else {
            return Err(AvBagError::bag(revision, "staged revision has no parent directory"));
        };
        let name = parent.file_name().unwrap_or(parent.as_os_str());
        move_dir(parent, &self.config.output_dir.join(name))
    }
}
