use std::path::PathBuf;

use crate::error::{AppStorageError, StoreError};
use crate::layout::StorageLayout;
use crate::models::AppMetadata;
use crate::storage::LockedStorage;

/// All apps, ordered by name.
pub fn list_all(ctx: &mut LockedStorage<'_>) -> Result<Vec<AppMetadata>, AppStorageError> {
    Ok(ctx.db.list_apps()?)
}

pub fn get_by_id(ctx: &mut LockedStorage<'_>, id: i64) -> Result<AppMetadata, AppStorageError> {
    ctx.db.get_app(id).map_err(|e| match e {
        StoreError::NotFound => AppStorageError::NotFound(id),
        other => AppStorageError::Unexpected(other),
    })
}

/// Metadata of app `id` together with one of its stored files.
pub fn read_artifact(
    ctx: &mut LockedStorage<'_>,
    id: i64,
    path_of: fn(&StorageLayout, i64) -> PathBuf,
) -> Result<(AppMetadata, Vec<u8>), AppStorageError> {
    let app = get_by_id(ctx, id)?;
    let bytes = std::fs::read(path_of(ctx.layout, id)).map_err(StoreError::from)?;
    Ok((app, bytes))
}
