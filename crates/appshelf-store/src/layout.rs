//! Where everything lives under the data root.
//!
//! ```text
//! <root>/
//!   database.sqlite
//!   app_storage.lock
//!   apks/<id>.apk
//!   icons/<id>.png
//!   temp/<random>.apk
//! ```

use std::path::{Path, PathBuf};

use rand::rngs::OsRng;
use rand::Rng;

use appshelf_shared::constants::{ICON_FILE_EXTENSION, PACKAGE_FILE_EXTENSION};

use crate::error::Result;
use crate::lock::StorageLock;

const DATABASE_FILE: &str = "database.sqlite";
const LOCK_FILE: &str = "app_storage.lock";
const APKS_DIRECTORY: &str = "apks";
const ICONS_DIRECTORY: &str = "icons";
const TEMP_DIRECTORY: &str = "temp";

const TEMP_NAME_ALPHABET: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyz";
const TEMP_NAME_LENGTH: usize = 32;

/// Path derivation for one data root.  Fixed at startup.
#[derive(Debug, Clone)]
pub struct StorageLayout {
    root: PathBuf,
}

impl StorageLayout {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Create the data root (owner-only on Unix) and its sub-directories.
    pub fn initialize(&self) -> Result<()> {
        std::fs::create_dir_all(&self.root)?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(&self.root, std::fs::Permissions::from_mode(0o700))?;
        }

        for dir in [self.apks_dir(), self.icons_dir(), self.temp_dir()] {
            std::fs::create_dir_all(dir)?;
        }

        tracing::debug!(root = %self.root.display(), "storage layout ready");
        Ok(())
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn database_path(&self) -> PathBuf {
        self.root.join(DATABASE_FILE)
    }

    pub fn lock_path(&self) -> PathBuf {
        self.root.join(LOCK_FILE)
    }

    pub fn apks_dir(&self) -> PathBuf {
        self.root.join(APKS_DIRECTORY)
    }

    pub fn icons_dir(&self) -> PathBuf {
        self.root.join(ICONS_DIRECTORY)
    }

    pub fn temp_dir(&self) -> PathBuf {
        self.root.join(TEMP_DIRECTORY)
    }

    pub fn apk_path(&self, id: i64) -> PathBuf {
        self.apks_dir().join(format!("{id}.{PACKAGE_FILE_EXTENSION}"))
    }

    pub fn icon_path(&self, id: i64) -> PathBuf {
        self.icons_dir().join(format!("{id}.{ICON_FILE_EXTENSION}"))
    }

    /// A fresh path under `temp/` for staging an upload.  Only meaningful
    /// while the storage lock is held, otherwise two callers may draw the
    /// same free name.
    pub fn temp_upload_path(&self) -> PathBuf {
        loop {
            let name: String = (0..TEMP_NAME_LENGTH)
                .map(|_| TEMP_NAME_ALPHABET[OsRng.gen_range(0..TEMP_NAME_ALPHABET.len())] as char)
                .collect();

            let path = self
                .temp_dir()
                .join(format!("{name}.{PACKAGE_FILE_EXTENSION}"));
            if !path.exists() {
                return path;
            }
        }
    }

    /// A single-use handle on the storage lock: releasing it also closes it,
    /// so every operation acquires its own.
    pub fn storage_lock(&self) -> Result<StorageLock> {
        StorageLock::open(&self.lock_path(), true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn paths_follow_ids() {
        let layout = StorageLayout::new("/srv/appshelf");
        assert_eq!(layout.apk_path(7), Path::new("/srv/appshelf/apks/7.apk"));
        assert_eq!(layout.icon_path(7), Path::new("/srv/appshelf/icons/7.png"));
        assert_eq!(
            layout.database_path(),
            Path::new("/srv/appshelf/database.sqlite")
        );
    }

    #[test]
    fn initialize_creates_directories() {
        let dir = tempfile::tempdir().unwrap();
        let layout = StorageLayout::new(dir.path().join("data"));
        layout.initialize().unwrap();
        layout.initialize().unwrap();

        assert!(layout.apks_dir().is_dir());
        assert!(layout.icons_dir().is_dir());
        assert!(layout.temp_dir().is_dir());

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mode = std::fs::metadata(layout.root()).unwrap().permissions().mode();
            assert_eq!(mode & 0o777, 0o700);
        }
    }

    #[test]
    fn temp_paths_are_random() {
        let dir = tempfile::tempdir().unwrap();
        let layout = StorageLayout::new(dir.path());
        layout.initialize().unwrap();

        let a = layout.temp_upload_path();
        let b = layout.temp_upload_path();
        assert_ne!(a, b);
        assert_eq!(a.parent(), Some(layout.temp_dir().as_path()));

        let stem = a.file_stem().unwrap().to_str().unwrap();
        assert_eq!(stem.len(), TEMP_NAME_LENGTH);
        assert!(stem.bytes().all(|c| TEMP_NAME_ALPHABET.contains(&c)));
        assert_eq!(a.extension().unwrap(), "apk");
    }
}
