//! `bag-info.txt`: ordered `Label: value` pairs.

use super::PAYLOAD_DIR;
use crate::error::{AvBagError, AvBagResult};
use std::path::Path;

pub const BAG_INFO: &str = "bag-info.txt";
pub const PAYLOAD_OXUM: &str = "Payload-Oxum";

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BagInfo {
    entries: Vec<(String, String)>,
}

impl BagInfo {
    /// Parse tag lines. Lines starting with whitespace continue the previous value.
    pub fn parse(content: &str, origin: &Path) -> AvBagResult<Self> {
        let mut entries: Vec<(String, String)> = Vec::new();
        for (n, line) in content.lines().enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            if line.starts_with([' ', '\t']) {
                let Some((_, value)) = entries.last_mut() else {
                    return Err(AvBagError::bag(
                        origin,
                        format!("line {}: continuation without a label", n + 1),
                    ));
                };
                value.push(' ');
                value.push_str(line.trim());
                continue;
            }
            let Some((label, value)) = line.split_once(':') else {
                return Err(AvBagError::bag(origin, format!("line {}: missing ':'", n + 1)));
            };
            entries.push((label.trim().to_string(), value.trim().to_string()));
        }
        Ok(Self { entries })
    }

    /// Read `bag-info.txt`; a bag without one has no tags.
    pub fn read(bag_dir: &Path) -> AvBagResult<Self> {
        let path = bag_dir.join(BAG_INFO);
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(&path).map_err(|e| AvBagError::io(&path, e))?;
        Self::parse(&content, &path)
    }

    pub fn write(&self, bag_dir: &Path) -> AvBagResult<()> {
        let path = bag_dir.join(BAG_INFO);
        std::fs::write(&path, self.to_info_string()).map_err(|e| AvBagError::io(&path, e))
    }

    pub fn to_info_string(&self) -> String {
        self.entries
            .iter()
            .map(|(label, value)| format!("{label}: {value}\n"))
            .collect()
    }

    /// First value for `label`, compared case-insensitively.
    pub fn get(&self, label: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(l, _)| l.eq_ignore_ascii_case(label))
            .map(|(_, v)| v.as_str())
    }

    pub fn contains(&self, label: &str) -> bool {
        self.get(label).is_some()
    }

    pub fn add(&mut self, label: &str, value: impl Into<String>) {
        self.entries.push((label.to_string(), value.into()));
    }

    /// Replace all values for `label` with one value, keeping the position of the first.
    pub fn set(&mut self, label: &str, value: impl Into<String>) {
        let value = value.into();
        match self
            .entries
            .iter()
            .position(|(l, _)| l.eq_ignore_ascii_case(label))
        {
            Some(pos) => {
                self.entries[pos].1 = value;
                let mut seen = 0usize;
                self.entries.retain(|(l, _)| {
                    if l.eq_ignore_ascii_case(label) {
                        seen += 1;
                        seen == 1
                    } else {
                        true
                    }
                });
            }
            None => self.add(label, value),
        }
    }
}

/// Octet and stream count of the payload directory.
pub fn payload_oxum(bag_dir: &Path) -> AvBagResult<(u64, usize)> {
    let files = crate::fsutil::collect_files_recursive(&bag_dir.join(PAYLOAD_DIR))?;
    let mut octets = 0u64;
    for file in &files {
        octets += std::fs::metadata(file)
            .map_err(|e| AvBagError::io(file, e))?
            .len();
    }
    Ok((octets, files.len()))
}

/// Rewrite `Payload-Oxum` when the bag declares one.
pub fn refresh_payload_oxum(bag_dir: &Path) -> AvBagResult<()> {
    let mut info = BagInfo::read(bag_dir)?;
    if !info.contains(PAYLOAD_OXUM) {
        return Ok(());
    }
    let (octets, streams) = payload_oxum(bag_dir)?;
    info.set(PAYLOAD_OXUM, format!("{octets}.{streams}"));
    info.write(bag_dir)
}
