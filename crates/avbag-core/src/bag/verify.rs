//! Bag verification: manifests against file contents.
//!
//! Every payload file must be listed by every payload manifest and every
//! listed checksum must match. Tag manifests must not list a tag manifest.
//! A stale `Payload-Oxum` is reported as a warning.

use super::digest::digest_file;
use super::info::{payload_oxum, BagInfo, PAYLOAD_OXUM};
use super::manifest::{read_manifests, Manifest, ManifestKind};
use super::{read_declaration, PAYLOAD_DIR};
use crate::error::AvBagResult;
use crate::fsutil::{collect_files_recursive, relative_posix};
use std::collections::BTreeSet;
use std::path::Path;

#[derive(Debug, Default)]
pub struct VerifyResult {
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
}

impl VerifyResult {
    pub fn is_ok(&self) -> bool {
        self.errors.is_empty()
    }

    fn fail(&mut self, msg: impl Into<String>) {
        self.errors.push(msg.into());
    }

    fn warn(&mut self, msg: impl Into<String>) {
        self.warnings.push(msg.into());
    }
}

/// Verify the bag at `bag_dir`. Errors reading the bag structure itself are
/// returned as `Err`; content problems end up in the result.
pub fn verify_bag(bag_dir: &Path) -> AvBagResult<VerifyResult> {
    read_declaration(bag_dir)?;
    let mut result = VerifyResult::default();

    let payload_manifests = read_manifests(bag_dir, ManifestKind::Payload)?;
    if payload_manifests.is_empty() {
        result.fail("no payload manifest");
    }
    for manifest in &payload_manifests {
        check_entries(bag_dir, manifest, &mut result);
    }

    let on_disk: BTreeSet<String> = collect_files_recursive(&bag_dir.join(PAYLOAD_DIR))?
        .iter()
        .filter_map(|f| relative_posix(bag_dir, f))
        .collect();
    for manifest in &payload_manifests {
        for path in &on_disk {
            if !manifest.entries.contains_key(path) {
                result.fail(format!(
                    "{} not listed in {}",
                    path,
                    ManifestKind::Payload.file_name(manifest.algorithm)
                ));
            }
        }
    }

    for manifest in read_manifests(bag_dir, ManifestKind::Tag)? {
        let name = ManifestKind::Tag.file_name(manifest.algorithm);
        for path in manifest.entries.keys() {
            if path.starts_with("tagmanifest-") && !path.contains('/') {
                result.fail(format!("{name} lists tag manifest {path}"));
            }
        }
        check_entries(bag_dir, &manifest, &mut result);
    }

    let info = BagInfo::read(bag_dir)?;
    if let Some(recorded) = info.get(PAYLOAD_OXUM) {
        let (octets, streams) = payload_oxum(bag_dir)?;
        let actual = format!("{octets}.{streams}");
        if recorded != actual {
            result.warn(format!("{PAYLOAD_OXUM} is {recorded}, payload is {actual}"));
        }
    }
    Ok(result)
}

fn check_entries(bag_dir: &Path, manifest: &Manifest, result: &mut VerifyResult) {
    let name = manifest.kind.file_name(manifest.algorithm);
    for (path, expected) in &manifest.entries {
        let file = bag_dir.join(path);
        if !file.is_file() {
            result.fail(format!("{name} lists {path} but the file is missing"));
            continue;
        }
        match digest_file(&file, &[manifest.algorithm]) {
            Ok(sums) => {
                let actual = sums.get(&manifest.algorithm).map(String::as_str);
                if actual != Some(expected.as_str()) {
                    result.fail(format!(
                        "checksum mismatch for {path} in {name}: manifest {expected} vs computed {}",
                        actual.unwrap_or("-")
                    ));
                }
            }
            Err(e) => result.fail(format!("cannot read {path}: {e}")),
        }
    }
}
