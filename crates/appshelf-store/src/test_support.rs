//! Test fixtures.  Uploads are JSON descriptions of a package instead of
//! real APKs, read back by [`FixtureParser`].

use std::path::Path;

use appshelf_shared::{PackageParser, ParseError, ParsedPackage};

pub fn package(app_name: &str, package_name: &str, version_code: i64) -> ParsedPackage {
    ParsedPackage {
        app_name: app_name.into(),
        package_name: package_name.into(),
        version_code,
        version_name: format!("{version_code}.0"),
        min_api_level: 21,
        max_api_level: None,
        apk_file_size: 0,
        icon_png: vec![0x89, b'P', b'N', b'G', version_code as u8],
    }
}

/// Reads a JSON-encoded [`ParsedPackage`] from the staged file.
pub struct FixtureParser;

impl PackageParser for FixtureParser {
    fn parse(&self, path: &Path) -> Result<ParsedPackage, ParseError> {
        let bytes = std::fs::read(path).map_err(|e| ParseError::Invalid(e.to_string()))?;
        let mut parsed: ParsedPackage =
            serde_json::from_slice(&bytes).map_err(|e| ParseError::Invalid(e.to_string()))?;
        parsed.apk_file_size = bytes.len() as i64;
        Ok(parsed)
    }
}

pub fn upload(package: &ParsedPackage) -> Vec<u8> {
    serde_json::to_vec(package).unwrap()
}

#[cfg(test)]
pub(crate) use self::local::{open_storage, stage};

#[cfg(test)]
mod local {
    use std::path::PathBuf;
    use std::sync::Arc;

    use appshelf_shared::ParsedPackage;

    use super::{upload, FixtureParser};
    use crate::layout::StorageLayout;
    use crate::storage::AppStorage;

    /// Write `package` to a fresh temp upload path.
    pub fn stage(layout: &StorageLayout, package: &ParsedPackage) -> PathBuf {
        let path = layout.temp_upload_path();
        std::fs::write(&path, upload(package)).unwrap();
        path
    }

    pub fn open_storage() -> (tempfile::TempDir, AppStorage) {
        let dir = tempfile::tempdir().unwrap();
        let layout = StorageLayout::new(dir.path().join("app_data"));
        let storage = AppStorage::open(layout, Arc::new(FixtureParser)).unwrap();
        (dir, storage)
    }
}
