//! Payload and tag manifests (`manifest-<alg>.txt`, `tagmanifest-<alg>.txt`).

use super::digest::{digest_file, DigestAlgorithm};
use super::info::refresh_payload_oxum;
use super::PAYLOAD_DIR;
use crate::error::{AvBagError, AvBagResult};
use crate::fsutil::{collect_files_recursive, relative_posix};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ManifestKind {
    Payload,
    Tag,
}

impl ManifestKind {
    fn prefix(self) -> &'static str {
        match self {
            Self::Payload => "manifest-",
            Self::Tag => "tagmanifest-",
        }
    }

    pub fn file_name(self, algorithm: DigestAlgorithm) -> String {
        format!("{}{}.txt", self.prefix(), algorithm)
    }
}

/// One manifest file: path relative to the bag root -> hex checksum.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Manifest {
    pub kind: ManifestKind,
    pub algorithm: DigestAlgorithm,
    pub entries: BTreeMap<String, String>,
}

impl Manifest {
    pub fn new(kind: ManifestKind, algorithm: DigestAlgorithm) -> Self {
        Self {
            kind,
            algorithm,
            entries: BTreeMap::new(),
        }
    }

    pub fn path(&self, bag_dir: &Path) -> PathBuf {
        bag_dir.join(self.kind.file_name(self.algorithm))
    }

    /// Parse manifest lines. Both `checksum  path` and `checksum *path` are accepted.
    pub fn parse(
        kind: ManifestKind,
        algorithm: DigestAlgorithm,
        content: &str,
        origin: &Path,
    ) -> AvBagResult<Self> {
        let mut manifest = Self::new(kind, algorithm);
        for (n, line) in content.lines().enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            let Some((checksum, rest)) = line.split_once(' ') else {
                return Err(AvBagError::manifest(
                    origin,
                    format!("line {}: expected checksum and path", n + 1),
                ));
            };
            let path = rest
                .strip_prefix(' ')
                .or_else(|| rest.strip_prefix('*'))
                .unwrap_or(rest);
            if path.is_empty() {
                return Err(AvBagError::manifest(origin, format!("line {}: empty path", n + 1)));
            }
            manifest
                .entries
                .insert(decode_path(path), checksum.to_ascii_lowercase());
        }
        Ok(manifest)
    }

    pub fn read(bag_dir: &Path, kind: ManifestKind, algorithm: DigestAlgorithm) -> AvBagResult<Self> {
        let path = bag_dir.join(kind.file_name(algorithm));
        let content = std::fs::read_to_string(&path).map_err(|e| AvBagError::io(&path, e))?;
        Self::parse(kind, algorithm, &content, &path)
    }

    pub fn to_manifest_string(&self) -> String {
        let mut out = String::new();
        for (path, checksum) in &self.entries {
            out.push_str(checksum);
            out.push_str("  ");
            out.push_str(&encode_path(path));
            out.push('\n');
        }
        out
    }

    pub fn write(&self, bag_dir: &Path) -> AvBagResult<()> {
        let path = self.path(bag_dir);
        std::fs::write(&path, self.to_manifest_string()).map_err(|e| AvBagError::io(&path, e))
    }
}

fn encode_path(path: &str) -> String {
    path.replace('%', "%25")
        .replace('\n', "%0A")
        .replace('\r', "%0D")
}

fn decode_path(path: &str) -> String {
    path.replace("%0A", "\n")
        .replace("%0a", "\n")
        .replace("%0D", "\r")
        .replace("%0d", "\r")
        .replace("%25", "%")
}

/// Algorithms declared by the manifest files of `kind` at the bag root, sorted.
///
/// A manifest file naming an unsupported algorithm fails the bag.
pub fn declared_algorithms(bag_dir: &Path, kind: ManifestKind) -> AvBagResult<Vec<DigestAlgorithm>> {
    let mut algorithms = Vec::new();
    for entry in std::fs::read_dir(bag_dir).map_err(|e| AvBagError::io(bag_dir, e))? {
        let entry = entry.map_err(|e| AvBagError::io(bag_dir, e))?;
        let name = entry.file_name().to_string_lossy().into_owned();
        let Some(alg) = name
            .strip_prefix(kind.prefix())
            .and_then(|rest| rest.strip_suffix(".txt"))
        else {
            continue;
        };
        match DigestAlgorithm::from_name(alg) {
            Some(alg) => algorithms.push(alg),
            None => {
                return Err(AvBagError::manifest(
                    entry.path(),
                    format!("unsupported checksum algorithm '{alg}'"),
                ))
            }
        }
    }
    algorithms.sort();
    Ok(algorithms)
}

pub fn read_manifests(bag_dir: &Path, kind: ManifestKind) -> AvBagResult<Vec<Manifest>> {
    declared_algorithms(bag_dir, kind)?
        .into_iter()
        .map(|alg| Manifest::read(bag_dir, kind, alg))
        .collect()
}

fn is_tag_manifest(bag_dir: &Path, file: &Path) -> bool {
    file.parent() == Some(bag_dir)
        && file
            .file_name()
            .is_some_and(|n| n.to_string_lossy().starts_with(ManifestKind::Tag.prefix()))
}

/// Files covered by the tag manifests: everything outside the payload
/// directory except the tag manifests themselves.
pub fn tag_files(bag_dir: &Path) -> AvBagResult<Vec<PathBuf>> {
    let payload_dir = bag_dir.join(PAYLOAD_DIR);
    Ok(collect_files_recursive(bag_dir)?
        .into_iter()
        .filter(|f| !f.starts_with(&payload_dir) && !is_tag_manifest(bag_dir, f))
        .collect())
}

/// Checksum every file into one manifest per algorithm.
fn compute(
    bag_dir: &Path,
    kind: ManifestKind,
    algorithms: &[DigestAlgorithm],
    files: &[PathBuf],
) -> AvBagResult<Vec<Manifest>> {
    let mut manifests: Vec<Manifest> = algorithms
        .iter()
        .map(|&alg| Manifest::new(kind, alg))
        .collect();
    for file in files {
        let Some(rel) = relative_posix(bag_dir, file) else {
            continue;
        };
        let sums = digest_file(file, algorithms).map_err(|e| AvBagError::io(file, e))?;
        for manifest in &mut manifests {
            if let Some(sum) = sums.get(&manifest.algorithm) {
                manifest.entries.insert(rel.clone(), sum.clone());
            }
        }
    }
    Ok(manifests)
}

/// Recompute all payload manifests, refresh `Payload-Oxum` and rewrite the
/// tag manifests, using the algorithms the bag already declares.
pub fn update_manifests(bag_dir: &Path) -> AvBagResult<()> {
    let started = Instant::now();
    let algorithms = declared_algorithms(bag_dir, ManifestKind::Payload)?;
    if algorithms.is_empty() {
        return Err(AvBagError::manifest(bag_dir, "no payload manifest found"));
    }
    let payload = collect_files_recursive(&bag_dir.join(PAYLOAD_DIR))?;
    for manifest in compute(bag_dir, ManifestKind::Payload, &algorithms, &payload)? {
        manifest.write(bag_dir)?;
    }
    refresh_payload_oxum(bag_dir)?;
    update_tag_manifests(bag_dir)?;
    debug!(
        elapsed_ms = started.elapsed().as_millis() as u64,
        "{} checksums recalculated",
        bag_dir.display()
    );
    Ok(())
}

/// Drop `removed` paths from the payload manifests without rehashing the
/// payload, then refresh `Payload-Oxum` and the tag manifests.
pub fn remove_payloads_from_manifests(bag_dir: &Path, removed: &[PathBuf]) -> AvBagResult<()> {
    let removed: Vec<String> = removed
        .iter()
        .filter_map(|p| relative_posix(Path::new(""), p))
        .collect();
    for mut manifest in read_manifests(bag_dir, ManifestKind::Payload)? {
        for path in &removed {
            manifest.entries.remove(path);
        }
        manifest.write(bag_dir)?;
    }
    refresh_payload_oxum(bag_dir)?;
    update_tag_manifests(bag_dir)
}

/// Rewrite every declared tag manifest. Bags without tag manifests are left alone.
pub fn update_tag_manifests(bag_dir: &Path) -> AvBagResult<()> {
    let algorithms = declared_algorithms(bag_dir, ManifestKind::Tag)?;
    if algorithms.is_empty() {
        return Ok(());
    }
    let files = tag_files(bag_dir)?;
    for manifest in compute(bag_dir, ManifestKind::Tag, &algorithms, &files)? {
        manifest.write(bag_dir)?;
    }
    Ok(())
}
