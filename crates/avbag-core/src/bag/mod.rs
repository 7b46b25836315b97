//! Minimal BagIt container layer: declaration, bag-info, manifests.

pub mod digest;
pub mod info;
pub mod manifest;
pub mod verify;

pub use digest::DigestAlgorithm;
pub use info::BagInfo;
pub use manifest::{remove_payloads_from_manifests, update_manifests, Manifest, ManifestKind};
pub use verify::{verify_bag, VerifyResult};

use crate::error::{AvBagError, AvBagResult};
use std::path::Path;

pub const BAGIT_TXT: &str = "bagit.txt";
pub const PAYLOAD_DIR: &str = "data";

/// Contents of `bagit.txt`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BagDeclaration {
    pub version: String,
    pub encoding: String,
}

/// Read the declaration; a directory without one is not a bag.
pub fn read_declaration(bag_dir: &Path) -> AvBagResult<BagDeclaration> {
    let path = bag_dir.join(BAGIT_TXT);
    if !path.is_file() {
        return Err(AvBagError::bag(bag_dir, format!("no {BAGIT_TXT}, not a bag")));
    }
    let content = std::fs::read_to_string(&path).map_err(|e| AvBagError::io(&path, e))?;
    let tags = BagInfo::parse(&content, &path)?;
    let version = tags
        .get("BagIt-Version")
        .ok_or_else(|| AvBagError::bag(&path, "BagIt-Version missing"))?;
    if tags
        .get("Tag-File-Character-Encoding")
        .is_some_and(|e| !e.eq_ignore_ascii_case("UTF-8"))
    {
        return Err(AvBagError::bag(&path, "only UTF-8 tag files are supported"));
    }
    Ok(BagDeclaration {
        version: version.to_string(),
        encoding: "UTF-8".to_string(),
    })
}
