//! Package and library records.

use serde::{Deserialize, Serialize};

use crate::domain::ResourceHandle;

/// Descriptor file at the root of every package
pub const DESCRIPTOR_FILE: &str = "h5p.json";

/// Directory holding a package's content files
pub const CONTENT_DIR: &str = "content";

/// Content parameters file, relative to the package root
pub const CONTENT_FILE: &str = "content/content.json";

/// Package identifier, assigned once at creation and never reused
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PackageId(u64);

impl PackageId {
    pub fn new(id: u64) -> Self {
        Self(id)
    }
}

impl From<u64> for PackageId {
    fn from(id: u64) -> Self {
        Self(id)
    }
}

impl std::fmt::Display for PackageId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for PackageId {
    type Err = std::num::ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.trim().parse::<u64>().map(Self)
    }
}

/// A content package as seen by the storage engine
///
/// The caller persists the record; the engine only swaps its archive handle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackageRecord {
    /// Package identifier
    pub id: PackageId,

    /// Archived state, absent when the package has no assets
    #[serde(default)]
    pub archive: Option<ResourceHandle>,
}

impl PackageRecord {
    /// Create a record with no archive yet
    pub fn new(id: impl Into<PackageId>) -> Self {
        Self {
            id: id.into(),
            archive: None,
        }
    }
}

/// A library (shared code and assets) registered with the engine
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LibraryRecord {
    /// Library identifier
    pub library_id: u64,

    /// Machine name (e.g. "H5P.MultiChoice")
    pub machine_name: String,

    /// Major version
    pub major_version: u32,

    /// Minor version
    pub minor_version: u32,

    /// Archived library folder
    #[serde(default)]
    pub archive: Option<ResourceHandle>,
}

impl LibraryRecord {
    /// Create a library record with no archive yet
    pub fn new(
        library_id: u64,
        machine_name: impl Into<String>,
        major_version: u32,
        minor_version: u32,
    ) -> Self {
        Self {
            library_id,
            machine_name: machine_name.into(),
            major_version,
            minor_version,
            archive: None,
        }
    }

    /// Folder name used when the library is exported (`Name-Major.Minor`)
    pub fn folder_name(&self) -> String {
        format!(
            "{}-{}.{}",
            self.machine_name, self.major_version, self.minor_version
        )
    }
}

/// Parsed descriptor and parameters of an uploaded package
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PackageDescriptor {
    /// Contents of the package descriptor
    pub descriptor: serde_json::Value,

    /// Contents of the content parameters file
    pub parameters: serde_json::Value,
}

impl PackageDescriptor {
    /// Package title, if the descriptor declares one
    pub fn title(&self) -> Option<&str> {
        self.descriptor.get("title").and_then(|v| v.as_str())
    }

    /// Main library machine name, if declared
    pub fn main_library(&self) -> Option<&str> {
        self.descriptor.get("mainLibrary").and_then(|v| v.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_package_id_parse_and_display() {
        let id: PackageId = " 42 ".parse().unwrap();
        assert_eq!(id, PackageId::new(42));
        assert_eq!(id.to_string(), "42");
        assert!("abc".parse::<PackageId>().is_err());
    }

    #[test]
    fn test_package_id_serializes_as_number() {
        let record = PackageRecord::new(7u64);
        let json = serde_json::to_string(&record).unwrap();
        assert_eq!(json, r#"{"id":7,"archive":null}"#);
    }

    #[test]
    fn test_library_folder_name() {
        let library = LibraryRecord::new(1, "H5P.MultiChoice", 1, 16);
        assert_eq!(library.folder_name(), "H5P.MultiChoice-1.16");
    }

    #[test]
    fn test_descriptor_accessors() {
        let descriptor = PackageDescriptor {
            descriptor: serde_json::json!({"title": "Quiz", "mainLibrary": "H5P.MultiChoice"}),
            parameters: serde_json::json!({}),
        };

        assert_eq!(descriptor.title(), Some("Quiz"));
        assert_eq!(descriptor.main_library(), Some("H5P.MultiChoice"));
    }
}
