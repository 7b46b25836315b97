//! Error types for the bag conversion pipeline.

use std::path::{Path, PathBuf};

/// Conversion errors.
///
/// Run-level variants abort the whole run before any bag is touched
/// (see [`AvBagError::is_fatal`]); all others abort a single bag.
#[derive(Debug, thiserror::Error)]
pub enum AvBagError {
    /// The staging directory must be empty when a run starts.
    #[error("the staging directory is not empty, please empty {} and try again", .path.display())]
    StagingNotEmpty { path: PathBuf },

    /// The staging directory could not be listed.
    #[error("staging directory {}: {source}", .path.display())]
    StagingUnreadable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A configured directory does not exist or is a file.
    #[error("not existing or not a directory: {}", format_paths(.paths))]
    NotADirectory { paths: Vec<PathBuf> },

    /// The CSV mapping file does not exist or is not a regular file.
    #[error("does not exist or is not a file: {}", .path.display())]
    CsvNotAFile { path: PathBuf },

    /// A required CSV column is absent.
    #[error("{header} not found in actual CSV headers: [{}]", .actual.join(", "))]
    CsvHeader { header: String, actual: Vec<String> },

    /// Rows without a file id or archive path.
    #[error("{count} records have missing values, see warnings")]
    CsvInvalidRows { count: usize },

    /// Cataloged source files that are absent from disk.
    #[error("not existing files: {}", format_paths(.paths))]
    MissingSourceFiles { paths: Vec<PathBuf> },

    /// CSV reader failure.
    #[error("csv error in {}: {source}", .path.display())]
    Csv {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },

    /// Placeholders and archive-source catalog disagree for a bag.
    #[error("{bag}: file ids of placeholders and archive sources differ")]
    IdMismatch { bag: String },

    /// A payload file selected for removal could not be deleted.
    #[error("{bag}: could not delete {}: {source}", .path.display())]
    DeleteFailed {
        bag: String,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Streaming-source ids without a matching file-listing entry.
    #[error("not all streaming-source ids present in files.xml: [{}]", .ids.join(", "))]
    StreamingIdsMissing { ids: Vec<String> },

    /// A file-listing entry lacks a rights field needed to describe a new file.
    #[error("{field} is required on file element {file_id}")]
    MissingRights { file_id: String, field: String },

    /// A listing path that does not name a file below the payload directory.
    #[error("file path {path} in files.xml is not inside the payload directory")]
    UnsafePath { path: String },

    /// Malformed or unexpected XML.
    #[error("xml error in {}: {message}", .path.display())]
    Xml { path: PathBuf, message: String },

    /// Malformed bag manifest or unsupported checksum algorithm.
    #[error("manifest error in {}: {message}", .path.display())]
    Manifest { path: PathBuf, message: String },

    /// Malformed bag declaration or bag-info.
    #[error("bag error in {}: {message}", .path.display())]
    Bag { path: PathBuf, message: String },

    /// IO error with the path it concerns.
    #[error("{}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl AvBagError {
    pub fn io(path: impl AsRef<Path>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.as_ref().to_path_buf(),
            source,
        }
    }

    pub fn xml(path: impl AsRef<Path>, message: impl Into<String>) -> Self {
        Self::Xml {
            path: path.as_ref().to_path_buf(),
            message: message.into(),
        }
    }

    pub fn manifest(path: impl AsRef<Path>, message: impl Into<String>) -> Self {
        Self::Manifest {
            path: path.as_ref().to_path_buf(),
            message: message.into(),
        }
    }

    pub fn bag(path: impl AsRef<Path>, message: impl Into<String>) -> Self {
        Self::Bag {
            path: path.as_ref().to_path_buf(),
            message: message.into(),
        }
    }

    /// Whether the error aborts the run rather than a single bag.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::StagingNotEmpty { .. }
                | Self::StagingUnreadable { .. }
                | Self::NotADirectory { .. }
                | Self::CsvNotAFile { .. }
                | Self::CsvHeader { .. }
                | Self::CsvInvalidRows { .. }
                | Self::MissingSourceFiles { .. }
                | Self::Csv { .. }
        )
    }
}

fn format_paths(paths: &[PathBuf]) -> String {
    let shown: Vec<String> = paths.iter().map(|p| p.display().to_string()).collect();
    format!("[{}]", shown.join(", "))
}

/// Result type for conversion operations.
pub type AvBagResult<T> = Result<T, AvBagError>;
