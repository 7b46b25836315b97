//! Conversion of audiovisual archival bags.
//!
//! Input bags carry zero-length placeholder files whose real content lives in
//! two external feeds: the archive sources (full quality) and the streaming
//! sources. [`Converter`] turns every input bag into a chain of successor
//! bags with the content substituted, files nobody may see removed and
//! streaming copies added, keeping manifests and version metadata current.
//!
//! ```no_run
//! use avbag_core::{Converter, ConverterConfig, SourceCatalog, SourcesConfig};
//!
//! # fn example() -> avbag_core::AvBagResult<()> {
//! let catalog = SourceCatalog::load(&SourcesConfig {
//!     archive_dir: "/data/darkarchive".into(),
//!     streaming_dir: "/data/springfield".into(),
//!     csv: "/data/sources.csv".into(),
//! })?;
//! let converter = Converter::new(
//!     ConverterConfig {
//!         input_dir: "/data/input".into(),
//!         output_dir: "/data/output".into(),
//!         staging_dir: "/data/staging".into(),
//!         keep_input: false,
//!     },
//!     &catalog,
//! );
//! let tally = converter.convert_all()?;
//! println!("{}", converter.summary(tally)?);
//! # Ok(())
//! # }
//! ```

pub mod bag;
pub mod converter;
pub mod error;
pub mod filter;
pub mod fsutil;
pub mod listing;
pub mod placeholders;
pub mod remover;
pub mod sources;
pub mod streaming;
pub mod version;
pub mod xml;

#[cfg(test)]
pub(crate) mod test_support;

pub use bag::{verify_bag, VerifyResult};
pub use converter::{
    BagOutcome, ConversionTally, Converter, ConverterConfig, IdAllocator, RunSummary,
    SequentialIds, UuidAllocator,
};
pub use error::{AvBagError, AvBagResult};
pub use sources::{SourceCatalog, SourcesConfig};
pub use version::{Clock, FixedClock, SystemClock};
