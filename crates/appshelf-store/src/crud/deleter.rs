use tracing::{info, warn};

use crate::consistency::ensure_consistency;
use crate::error::{classify, AppStorageError, Result};
use crate::models::AppMetadata;
use crate::storage::LockedStorage;

/// Delete `existing` from all three stores.  Returns its last metadata.
pub fn delete_app(
    ctx: &mut LockedStorage<'_>,
    existing: &AppMetadata,
) -> std::result::Result<AppMetadata, AppStorageError> {
    let result = perform_delete(ctx, existing.id)
        .map(|()| existing.clone())
        .map_err(|e| classify(e, AppStorageError::DeleteFailed));
    ensure_consistency(ctx);

    match &result {
        Ok(app) => info!(id = app.id, package = %app.package_name, "app deleted"),
        Err(e) => warn!(id = existing.id, "deleting app failed: {e}"),
    }
    result
}

/// Metadata, then package, then icon.  Also used by the updater to get rid
/// of an app it may have left half-updated.
pub(crate) fn perform_delete(ctx: &mut LockedStorage<'_>, id: i64) -> Result<()> {
    let tx = ctx.db.begin()?;
    tx.delete_app(id)?;
    tx.commit()?;

    std::fs::remove_file(ctx.layout.apk_path(id))?;
    std::fs::remove_file(ctx.layout.icon_path(id))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use crate::error::AppStorageError;
    use crate::test_support::{open_storage, package, stage};

    #[test]
    fn deletes_all_three_parts() {
        let (_dir, storage) = open_storage();
        let app = storage
            .add(&stage(storage.layout(), &package("Notes", "com.n", 1)))
            .unwrap();

        let deleted = storage.delete(app.id).unwrap();
        assert_eq!(deleted, app);

        let layout = storage.layout();
        assert!(!layout.apk_path(app.id).exists());
        assert!(!layout.icon_path(app.id).exists());
        assert!(matches!(
            storage.get_by_id(app.id),
            Err(AppStorageError::NotFound(_))
        ));
    }

    #[test]
    fn missing_package_file_reports_failure_and_is_healed() {
        let (_dir, storage) = open_storage();
        let app = storage
            .add(&stage(storage.layout(), &package("Notes", "com.n", 1)))
            .unwrap();
        std::fs::remove_file(storage.layout().apk_path(app.id)).unwrap();

        let err = storage.delete(app.id).unwrap_err();
        assert!(matches!(err, AppStorageError::DeleteFailed(_)));

        // the icon left behind by the aborted delete is swept up
        assert!(!storage.layout().icon_path(app.id).exists());
        assert!(storage.list_all().unwrap().is_empty());
    }
}
