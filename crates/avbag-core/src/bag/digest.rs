use sha2::Digest;
use std::collections::BTreeMap;
use std::fmt;
use std::io::Read;
use std::path::Path;

/// Checksum algorithms a bag may declare through its manifest file names.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum DigestAlgorithm {
    Md5,
    Sha1,
    Sha256,
    Sha512,
}

impl DigestAlgorithm {
    pub fn name(self) -> &'static str {
        match self {
            Self::Md5 => "md5",
            Self::Sha1 => "sha1",
            Self::Sha256 => "sha256",
            Self::Sha512 => "sha512",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        match name.to_ascii_lowercase().as_str() {
            "md5" => Some(Self::Md5),
            "sha1" => Some(Self::Sha1),
            "sha256" => Some(Self::Sha256),
            "sha512" => Some(Self::Sha512),
            _ => None,
        }
    }
}

impl fmt::Display for DigestAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

enum Hasher {
    Md5(md5::Context),
    Sha1(sha1::Sha1),
    Sha256(sha2::Sha256),
    Sha512(sha2::Sha512),
}

impl Hasher {
    fn new(algorithm: DigestAlgorithm) -> Self {
        match algorithm {
            DigestAlgorithm::Md5 => Self::Md5(md5::Context::new()),
            DigestAlgorithm::Sha1 => Self::Sha1(sha1::Sha1::new()),
            DigestAlgorithm::Sha256 => Self::Sha256(sha2::Sha256::new()),
            DigestAlgorithm::Sha512 => Self::Sha512(sha2::Sha512::new()),
        }
    }

    fn update(&mut self, data: &[u8]) {
        match self {
            Self::Md5(h) => h.consume(data),
            Self::Sha1(h) => h.update(data),
            Self::Sha256(h) => h.update(data),
            Self::Sha512(h) => h.update(data),
        }
    }

    fn finalize_hex(self) -> String {
        match self {
            Self::Md5(h) => format!("{:x}", h.finalize()),
            Self::Sha1(h) => hex::encode(h.finalize()),
            Self::Sha256(h) => hex::encode(h.finalize()),
            Self::Sha512(h) => hex::encode(h.finalize()),
        }
    }
}

/// Lowercase hex checksums of `reader` for every requested algorithm, in one pass.
pub fn digest_reader<R: Read>(
    mut reader: R,
    algorithms: &[DigestAlgorithm],
) -> std::io::Result<BTreeMap<DigestAlgorithm, String>> {
    let mut hashers: Vec<(DigestAlgorithm, Hasher)> = algorithms
        .iter()
        .map(|&alg| (alg, Hasher::new(alg)))
        .collect();
    let mut buf = [0u8; 64 * 1024];
    loop {
        let n = reader.read(&mut buf)?;
        if n == 0 {
            break;
        }
        for (_, hasher) in &mut hashers {
            hasher.update(&buf[..n]);
        }
    }
    Ok(hashers
        .into_iter()
        .map(|(alg, hasher)| (alg, hasher.finalize_hex()))
        .collect())
}

pub fn digest_file(
    path: &Path,
    algorithms: &[DigestAlgorithm],
) -> std::io::Result<BTreeMap<DigestAlgorithm, String>> {
    digest_reader(std::fs::File::open(path)?, algorithms)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_digests_of_abc() {
        let all = [
            DigestAlgorithm::Md5,
            DigestAlgorithm::Sha1,
            DigestAlgorithm::Sha256,
            DigestAlgorithm::Sha512,
        ];
        let sums = digest_reader(&b"abc"[..], &all).unwrap();
        assert_eq!(sums[&DigestAlgorithm::Md5], "900150983cd24fb0d6963f7d28e17f72");
        assert_eq!(
            sums[&DigestAlgorithm::Sha1],
            "a9993e364706816aba3e25717850c26c9cd0d89d"
        );
        assert_eq!(
            sums[&DigestAlgorithm::Sha256],
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
        assert!(sums[&DigestAlgorithm::Sha512].starts_with("ddaf35a193617aba"));
    }

    #[test]
    fn names_round_trip() {
        for name in ["md5", "sha1", "sha256", "sha512"] {
            assert_eq!(DigestAlgorithm::from_name(name).unwrap().name(), name);
        }
        assert_eq!(DigestAlgorithm::from_name("SHA256"), Some(DigestAlgorithm::Sha256));
        assert_eq!(DigestAlgorithm::from_name("crc32"), None);
    }
}
