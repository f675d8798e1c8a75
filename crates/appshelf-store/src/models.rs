//! Domain model persisted in the metadata table.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use appshelf_shared::constants::{ICON_FILE_EXTENSION, PACKAGE_FILE_EXTENSION};

/// One managed app.  The id keys the package and icon files on disk.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AppMetadata {
    /// Assigned on insert, never reused.
    pub id: i64,
    pub app_name: String,
    /// Unique across all live records.
    pub package_name: String,
    pub version_code: i64,
    pub version_name: String,
    pub min_api_level: i64,
    pub max_api_level: Option<i64>,
    /// Size of the stored package file in bytes.
    pub apk_file_size: i64,
    /// Set once when the app is added.
    pub added_at: DateTime<Utc>,
    /// Refreshed on every metadata change.
    pub last_updated_at: DateTime<Utc>,
}

impl AppMetadata {
    /// File name offered to clients downloading the package.
    pub fn apk_download_name(&self) -> String {
        format!("{}.{}", self.app_name, PACKAGE_FILE_EXTENSION)
    }

    /// File name offered to clients downloading the icon.
    pub fn icon_download_name(&self) -> String {
        format!("{}.{}", self.app_name, ICON_FILE_EXTENSION)
    }
}
