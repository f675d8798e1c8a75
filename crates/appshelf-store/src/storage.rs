//! The [`AppStorage`] facade.
//!
//! Every public operation runs inside [`AppStorage::locked`]: a fresh
//! single-use [`StorageLock`](crate::StorageLock) handle is acquired, the
//! operation runs against a [`LockedStorage`] context, and the lock is
//! released (closing the handle) right after.  Orchestrators take the
//! context by `&mut`, so they cannot be called without the lock held.

use std::path::Path;
use std::sync::{Arc, Mutex, PoisonError};

use appshelf_shared::PackageParser;

use crate::consistency::ensure_consistency;
use crate::crud::{adder, deleter, getter, updater};
use crate::database::Database;
use crate::error::{classify, AppStorageError, StoreError};
use crate::layout::StorageLayout;
use crate::models::AppMetadata;

/// What an operation gets to touch while the storage lock is held.
pub struct LockedStorage<'a> {
    pub(crate) db: &'a mut Database,
    pub(crate) layout: &'a StorageLayout,
    pub(crate) parser: &'a dyn PackageParser,
}

impl LockedStorage<'_> {
    /// Write an upload to a fresh temp path.
    fn stage_upload(&self, bytes: &[u8]) -> Result<std::path::PathBuf, StoreError> {
        let path = self.layout.temp_upload_path();
        std::fs::write(&path, bytes)?;
        Ok(path)
    }
}

/// Remove a staged upload unless an orchestrator already moved it away.
fn discard_staged(path: &Path) {
    match std::fs::remove_file(path) {
        Ok(()) => tracing::debug!(path = %path.display(), "removed staged upload"),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => tracing::warn!(path = %path.display(), "failed to remove staged upload: {e}"),
    }
}

pub struct AppStorage {
    layout: StorageLayout,
    db: Mutex<Database>,
    parser: Arc<dyn PackageParser>,
}

impl AppStorage {
    /// Initialize the data root, open the database and heal whatever an
    /// earlier crash may have left behind.
    pub fn open(layout: StorageLayout, parser: Arc<dyn PackageParser>) -> Result<Self, StoreError> {
        layout.initialize()?;
        let db = Database::open_at(&layout.database_path())?;

        let storage = Self {
            layout,
            db: Mutex::new(db),
            parser,
        };
        storage.locked(|ctx| {
            ensure_consistency(ctx);
            Ok::<_, StoreError>(())
        })?;

        tracing::info!(root = %storage.layout.root().display(), "app storage opened");
        Ok(storage)
    }

    pub fn layout(&self) -> &StorageLayout {
        &self.layout
    }

    /// Run `op` with the storage lock held.
    ///
    /// An error from `op` wins over an error releasing the lock.
    pub fn locked<T, E>(&self, op: impl FnOnce(&mut LockedStorage<'_>) -> Result<T, E>) -> Result<T, E>
    where
        E: From<StoreError>,
    {
        let lock = self.layout.storage_lock()?;
        let guard = lock.lock()?;

        let result = {
            let mut db = self.db.lock().unwrap_or_else(PoisonError::into_inner);
            let mut ctx = LockedStorage {
                db: &mut *db,
                layout: &self.layout,
                parser: self.parser.as_ref(),
            };
            op(&mut ctx)
        };

        let released = guard.release();
        let value = result?;
        released?;
        Ok(value)
    }

    pub fn list_all(&self) -> Result<Vec<AppMetadata>, AppStorageError> {
        self.locked(getter::list_all)
    }

    pub fn get_by_id(&self, id: i64) -> Result<AppMetadata, AppStorageError> {
        self.locked(|ctx| getter::get_by_id(ctx, id))
    }

    /// Add the app in the already staged file at `staged`.
    pub fn add(&self, staged: &Path) -> Result<AppMetadata, AppStorageError> {
        self.locked(|ctx| adder::add_app(ctx, staged))
    }

    /// Replace app `id` with the staged file; returns old and new metadata.
    pub fn update(&self, id: i64, staged: &Path) -> Result<(AppMetadata, AppMetadata), AppStorageError> {
        self.locked(|ctx| {
            let existing = getter::get_by_id(ctx, id)?;
            updater::update_app(ctx, &existing, staged)
        })
    }

    pub fn delete(&self, id: i64) -> Result<AppMetadata, AppStorageError> {
        self.locked(|ctx| {
            let existing = getter::get_by_id(ctx, id)?;
            deleter::delete_app(ctx, &existing)
        })
    }

    /// Stage `bytes` and add them, all under one lock acquisition.
    pub fn add_upload(&self, bytes: &[u8]) -> Result<AppMetadata, AppStorageError> {
        self.locked(|ctx| {
            let staged = ctx
                .stage_upload(bytes)
                .map_err(|e| classify(e, AppStorageError::AddFailed))?;
            let result = adder::add_app(ctx, &staged);
            discard_staged(&staged);
            result
        })
    }

    /// Stage `bytes` and update app `id` with them under one lock acquisition.
    pub fn update_upload(
        &self,
        id: i64,
        bytes: &[u8],
    ) -> Result<(AppMetadata, AppMetadata), AppStorageError> {
        self.locked(|ctx| {
            let existing = getter::get_by_id(ctx, id)?;
            let staged = ctx
                .stage_upload(bytes)
                .map_err(|e| classify(e, AppStorageError::UpdateFailed))?;
            let result = updater::update_app(ctx, &existing, &staged);
            discard_staged(&staged);
            result
        })
    }

    /// Metadata and normalized icon of app `id`.
    pub fn read_icon(&self, id: i64) -> Result<(AppMetadata, Vec<u8>), AppStorageError> {
        self.locked(|ctx| getter::read_artifact(ctx, id, StorageLayout::icon_path))
    }

    /// Metadata and package file contents of app `id`.
    pub fn read_apk(&self, id: i64) -> Result<(AppMetadata, Vec<u8>), AppStorageError> {
        self.locked(|ctx| getter::read_artifact(ctx, id, StorageLayout::apk_path))
    }
}
