//! The per-bag file listing (`metadata/files.xml`).

use crate::bag::PAYLOAD_DIR;
use crate::error::{AvBagError, AvBagResult};
use crate::xml::{XmlDocument, XmlElement, XmlNode};
use std::ffi::OsStr;
use std::path::{Component, Path, PathBuf};

/// Location of the listing relative to the bag root.
pub const FILES_XML: &str = "metadata/files.xml";

/// Rights token meaning "nobody".
pub const NONE: &str = "NONE";

pub const ACCESSIBLE_TO_RIGHTS: &str = "accessibleToRights";
pub const VISIBLE_TO_RIGHTS: &str = "visibleToRights";
const FILE: &str = "file";
const FILEPATH: &str = "filepath";
const IDENTIFIER: &str = "identifier";
const SOURCE: &str = "source";

/// Read-only view of one `<file>` element.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileEntry {
    pub file_id: Option<String>,
    pub file_path: Option<String>,
    pub accessible_to_rights: Option<String>,
    pub visible_to_rights: Option<String>,
    /// Whether the element carries an origin annotation (`<dct:source>`).
    pub has_source: bool,
}

impl FileEntry {
    pub fn from_element(el: &XmlElement) -> Self {
        Self {
            file_id: child_text(el, IDENTIFIER),
            file_path: el
                .attribute(FILEPATH)
                .filter(|p| !p.is_empty())
                .map(str::to_string),
            accessible_to_rights: child_text(el, ACCESSIBLE_TO_RIGHTS),
            visible_to_rights: child_text(el, VISIBLE_TO_RIGHTS),
            has_source: el.child(SOURCE).is_some(),
        }
    }

    /// Both rights resolve to `NONE`; an absent field counts as `NONE`.
    pub fn is_none_none(&self) -> bool {
        is_none(self.accessible_to_rights.as_deref()) && is_none(self.visible_to_rights.as_deref())
    }
}

fn is_none(rights: Option<&str>) -> bool {
    !matches!(rights, Some(r) if r != NONE)
}

/// A listing `filepath` as a path relative to the bag root.
///
/// Only plain `data/...` paths are accepted; `..`, `.` and absolute paths
/// would let listing edits reach files outside the bag.
pub fn payload_path(file_path: &str) -> AvBagResult<PathBuf> {
    let path = Path::new(file_path);
    let mut components = path.components();
    let in_payload = components.next() == Some(Component::Normal(OsStr::new(PAYLOAD_DIR)))
        && components.clone().next().is_some()
        && components.all(|c| matches!(c, Component::Normal(_)));
    if in_payload {
        Ok(path.to_path_buf())
    } else {
        Err(AvBagError::UnsafePath {
            path: file_path.to_string(),
        })
    }
}

fn child_text(el: &XmlElement, local: &str) -> Option<String> {
    el.child(local).map(|c| c.text().trim().to_string())
}

/// Parsed `files.xml` with the edits the pipeline needs.
#[derive(Debug, Clone, PartialEq)]
pub struct FilesXml {
    doc: XmlDocument,
}

impl FilesXml {
    pub fn read(bag_dir: &Path) -> AvBagResult<Self> {
        Ok(Self {
            doc: XmlDocument::read(&bag_dir.join(FILES_XML))?,
        })
    }

    pub fn parse(content: &str) -> AvBagResult<Self> {
        Ok(Self {
            doc: XmlDocument::parse(content, Path::new(FILES_XML))?,
        })
    }

    pub fn write(&self, bag_dir: &Path) -> AvBagResult<()> {
        self.doc.write(&bag_dir.join(FILES_XML))
    }

    pub fn file_elements(&self) -> impl Iterator<Item = &XmlElement> {
        self.doc
            .root
            .child_elements()
            .filter(|e| e.local_name() == FILE)
    }

    pub fn entries(&self) -> Vec<FileEntry> {
        self.file_elements().map(FileEntry::from_element).collect()
    }

    /// Fails on the first entry whose `filepath` is not a payload path.
    pub fn check_paths(&self) -> AvBagResult<()> {
        for entry in self.entries() {
            if let Some(file_path) = entry.file_path {
                payload_path(&file_path)?;
            }
        }
        Ok(())
    }

    /// Drop every `<source>` child from every `<file>` element.
    pub fn strip_sources(&mut self) {
        for node in &mut self.doc.root.children {
            if let XmlNode::Element(file) = node {
                if file.local_name() == FILE {
                    file.remove_child_elements(|c| c.local_name() == SOURCE);
                }
            }
        }
    }

    /// Detach every `<file>` element matching `remove` and return their views.
    pub fn remove_files<F>(&mut self, mut remove: F) -> Vec<FileEntry>
    where
        F: FnMut(&FileEntry) -> bool,
    {
        self.doc
            .root
            .remove_child_elements(|e| e.local_name() == FILE && remove(&FileEntry::from_element(e)))
            .iter()
            .map(FileEntry::from_element)
            .collect()
    }

    /// Append a `<file>` element for a payload file with the given rights.
    pub fn append_file(&mut self, file_path: &str, accessible: &str, visible: &str) {
        let indent = self
            .doc
            .root
            .child_indent()
            .unwrap_or_else(|| "\n    ".to_string());
        let inner = format!("{indent}    ");
        let mut file = XmlElement::new(FILE);
        file.set_attribute(FILEPATH, file_path);
        file.children = vec![
            XmlNode::Text(inner.clone()),
            XmlNode::Element(XmlElement::with_text(ACCESSIBLE_TO_RIGHTS, accessible)),
            XmlNode::Text(inner),
            XmlNode::Element(XmlElement::with_text(VISIBLE_TO_RIGHTS, visible)),
            XmlNode::Text(indent),
        ];
        self.doc.root.append_indented(file);
    }

    pub fn to_xml_string(&self) -> String {
        self.doc.to_xml_string()
    }
}
