//! Version metadata of successor bags in `bag-info.txt`.

use crate::bag::BagInfo;
use crate::error::AvBagResult;
use crate::placeholders::bag_parent_name;
use crate::xml::{XmlDocument, XmlElement};
use chrono::{DateTime, FixedOffset, Local, SecondsFormat};
use std::path::Path;

pub const IS_VERSION_OF: &str = "Is-Version-Of";
pub const CREATED: &str = "Created";
pub const BASE_DOI: &str = "Base-DOI";
pub const BASE_URN: &str = "Base-URN";
pub const DATASET_XML: &str = "metadata/dataset.xml";

/// Source of the `Created` timestamp.
pub trait Clock {
    fn now(&self) -> DateTime<FixedOffset>;
}

/// Local wall clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<FixedOffset> {
        Local::now().fixed_offset()
    }
}

/// Always returns the same instant.
#[derive(Debug, Clone, Copy)]
pub struct FixedClock(pub DateTime<FixedOffset>);

impl Clock for FixedClock {
    fn now(&self) -> DateTime<FixedOffset> {
        self.0
    }
}

/// Mark `new_bag` as the successor of `previous_bag`.
///
/// `Is-Version-Of` becomes `urn:uuid:<parent dir of previous_bag>` and
/// `Created` the current time. `Base-DOI`/`Base-URN` are taken from the
/// dataset metadata only while at least one of them is missing.
pub fn update_bag_version(new_bag: &Path, previous_bag: &Path, clock: &dyn Clock) -> AvBagResult<()> {
    let mut info = BagInfo::read(new_bag)?;
    info.set(
        IS_VERSION_OF,
        format!("urn:uuid:{}", bag_parent_name(previous_bag)),
    );
    info.set(
        CREATED,
        clock.now().to_rfc3339_opts(SecondsFormat::Millis, false),
    );
    if !(info.contains(BASE_DOI) && info.contains(BASE_URN)) {
        let dataset = new_bag.join(DATASET_XML);
        if dataset.is_file() {
            let doc = XmlDocument::read(&dataset)?;
            let (doi, urn) = base_identifiers(&doc.root);
            if let Some(doi) = doi {
                info.set(BASE_DOI, doi);
            }
            if let Some(urn) = urn {
                info.set(BASE_URN, urn);
            }
        } else {
            tracing::warn!("no {} in {}", DATASET_XML, new_bag.display());
        }
    }
    info.write(new_bag)
}

/// First DOI and first URN among the `dcmiMetadata` identifiers.
fn base_identifiers(root: &XmlElement) -> (Option<String>, Option<String>) {
    let mut doi = None;
    let mut urn = None;
    let dcmi = if root.local_name() == "dcmiMetadata" {
        vec![root]
    } else {
        root.descendants("dcmiMetadata")
    };
    for identifier in dcmi.into_iter().flat_map(|d| d.descendants("identifier")) {
        let value = identifier.text().trim().to_string();
        match identifier_type(identifier) {
            Some("DOI") if doi.is_none() => doi = Some(value),
            Some("URN") if urn.is_none() => urn = Some(value),
            _ => {}
        }
    }
    (doi, urn)
}

/// `id-type:DOI` -> `DOI`; the prefix is optional.
fn identifier_type(el: &XmlElement) -> Option<&str> {
    el.attributes
        .iter()
        .find(|(name, _)| name == "type" || name.ends_with(":type"))
        .map(|(_, value)| value.rsplit(':').next().unwrap_or(value))
}
