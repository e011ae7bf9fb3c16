use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A known agent version and its derived install/active status
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VersionRecord {
    /// Asset name; unique key in the catalog
    pub name: String,
    /// Release label shown to users (e.g. `v0.61.0`)
    pub display_version: String,
    /// Archive size in bytes
    pub size_bytes: u64,
    /// When the release asset was published
    pub created_at: DateTime<Utc>,
    /// Upstream download counter
    #[serde(default)]
    pub usage_count: u64,
    /// Where the archive is downloaded from
    pub source_url: String,
    /// Archive is present locally
    #[serde(default)]
    pub installed: bool,
    /// This version is wired up to run
    #[serde(default)]
    pub active: bool,
}

impl VersionRecord {
    /// Create a record that is neither installed nor active
    pub fn new(
        name: impl Into<String>,
        display_version: impl Into<String>,
        source_url: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            display_version: display_version.into(),
            size_bytes: 0,
            created_at: Utc::now(),
            usage_count: 0,
            source_url: source_url.into(),
            installed: false,
            active: false,
        }
    }

    /// Set the archive size
    pub fn with_size(mut self, size_bytes: u64) -> Self {
        self.size_bytes = size_bytes;
        self
    }

    /// Mark the record as installed
    pub fn installed(mut self) -> Self {
        self.installed = true;
        self
    }

    /// Mark the record as active
    pub fn active(mut self) -> Self {
        self.active = true;
        self
    }
}

/// The backend's record of the currently activated version
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActiveRecord {
    /// Asset name of the active version
    pub name: String,
    /// Absolute path of the downloaded archive
    pub archive_path: String,
    /// Absolute path of the unpacked directory
    pub unpack_dir: String,
    /// Absolute path of the frpc executable
    pub exe_path: String,
    /// When the version was activated
    pub activated_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_camel_case_wire_format() {
        let record = VersionRecord::new("frp_0.61.0_linux_amd64.tar.gz", "v0.61.0", "http://x")
            .with_size(1024)
            .installed();

        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["displayVersion"], "v0.61.0");
        assert_eq!(json["sizeBytes"], 1024);
        assert_eq!(json["installed"], true);
        assert_eq!(json["active"], false);
    }

    #[test]
    fn test_missing_flags_default_to_false() {
        let json = serde_json::json!({
            "name": "v1",
            "displayVersion": "v1",
            "sizeBytes": 10,
            "createdAt": "2025-01-01T00:00:00Z",
            "sourceUrl": "http://x"
        });
        let record: VersionRecord = serde_json::from_value(json).unwrap();
        assert!(!record.installed);
        assert!(!record.active);
        assert_eq!(record.usage_count, 0);
    }
}
