use std::path::Path;

use chrono::Utc;
use tracing::{info, warn};

use appshelf_shared::ParsedPackage;

use crate::consistency::ensure_consistency;
use crate::crud::deleter::perform_delete;
use crate::error::{classify, AppStorageError, StoreError};
use crate::models::AppMetadata;
use crate::storage::LockedStorage;

/// Replace `existing` with the app in the staged file.  Returns the
/// metadata before and after the update.
///
/// Rejections leave the app untouched.  Any failure past validation deletes
/// the app outright: the consistency pass cannot tell a half-updated app
/// from a healthy one.
pub fn update_app(
    ctx: &mut LockedStorage<'_>,
    existing: &AppMetadata,
    staged: &Path,
) -> Result<(AppMetadata, AppMetadata), AppStorageError> {
    let result = try_update(ctx, existing, staged);
    ensure_consistency(ctx);

    match &result {
        Ok(app) => info!(
            id = app.id,
            from = existing.version_code,
            to = app.version_code,
            "app updated"
        ),
        Err(e) => warn!(id = existing.id, "updating app failed: {e}"),
    }
    result.map(|updated| (existing.clone(), updated))
}

fn try_update(
    ctx: &mut LockedStorage<'_>,
    existing: &AppMetadata,
    staged: &Path,
) -> Result<AppMetadata, AppStorageError> {
    let parsed = ctx.parser.parse(staged)?;
    check_update(existing, &parsed)?;

    match perform_update(ctx, existing.id, staged, &parsed) {
        Ok(updated) => Ok(updated),
        Err(err) => {
            if let Err(e) = perform_delete(ctx, existing.id) {
                warn!(id = existing.id, "removing half-updated app failed: {e}");
            }
            Err(classify(err, AppStorageError::UpdateFailed))
        }
    }
}

fn check_update(existing: &AppMetadata, parsed: &ParsedPackage) -> Result<(), AppStorageError> {
    if parsed.package_name != existing.package_name {
        return Err(AppStorageError::PackageNameMismatch {
            supplied: parsed.package_name.clone(),
            existing: existing.package_name.clone(),
        });
    }
    if parsed.version_code <= existing.version_code {
        return Err(AppStorageError::VersionNotIncreased {
            supplied: parsed.version_code,
            existing: existing.version_code,
        });
    }
    Ok(())
}

/// Metadata, then package, then icon, each replaced in place.
fn perform_update(
    ctx: &mut LockedStorage<'_>,
    id: i64,
    staged: &Path,
    parsed: &ParsedPackage,
) -> Result<AppMetadata, StoreError> {
    let tx = ctx.db.begin()?;
    tx.update_app(id, parsed, Utc::now())?;
    tx.commit()?;

    let updated = ctx.db.get_app(id)?;

    let apk_path = ctx.layout.apk_path(id);
    std::fs::remove_file(&apk_path)?;
    std::fs::rename(staged, &apk_path)?;

    let icon_path = ctx.layout.icon_path(id);
    std::fs::remove_file(&icon_path)?;
    std::fs::write(&icon_path, &parsed.icon_png)?;

    Ok(updated)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{open_storage, package, stage};

    #[test]
    fn replaces_metadata_and_files() {
        let (_dir, storage) = open_storage();
        let old = storage
            .add(&stage(storage.layout(), &package("Notes", "com.n", 1)))
            .unwrap();

        let staged = stage(storage.layout(), &package("Notes Pro", "com.n", 2));
        let (before, after) = storage.update(old.id, &staged).unwrap();

        assert_eq!(before, old);
        assert_eq!(after.id, old.id);
        assert_eq!(after.app_name, "Notes Pro");
        assert_eq!(after.version_code, 2);
        assert_eq!(after.added_at, old.added_at);
        assert_eq!(storage.get_by_id(old.id).unwrap(), after);

        let layout = storage.layout();
        assert!(!staged.exists());
        assert_eq!(
            std::fs::read(layout.icon_path(old.id)).unwrap(),
            package("Notes Pro", "com.n", 2).icon_png
        );
    }

    #[test]
    fn rejects_other_package() {
        let (_dir, storage) = open_storage();
        let old = storage
            .add(&stage(storage.layout(), &package("Notes", "com.n", 1)))
            .unwrap();

        let err = storage
            .update(old.id, &stage(storage.layout(), &package("Notes", "com.m", 2)))
            .unwrap_err();
        assert!(matches!(
            &err,
            AppStorageError::PackageNameMismatch { supplied, existing }
                if supplied == "com.m" && existing == "com.n"
        ));
        assert_eq!(storage.get_by_id(old.id).unwrap(), old);
    }

    #[test]
    fn rejects_non_increasing_versions() {
        let (_dir, storage) = open_storage();
        let old = storage
            .add(&stage(storage.layout(), &package("Notes", "com.n", 5)))
            .unwrap();

        for version in [4, 5] {
            let staged = stage(storage.layout(), &package("Notes", "com.n", version));
            let err = storage.update(old.id, &staged).unwrap_err();
            assert!(matches!(
                err,
                AppStorageError::VersionNotIncreased { supplied, existing: 5 } if supplied == version
            ));
        }
        assert_eq!(storage.get_by_id(old.id).unwrap(), old);
        assert!(storage.layout().apk_path(old.id).exists());
    }

    #[test]
    fn failed_file_replacement_deletes_the_app() {
        let (dir, storage) = open_storage();
        let layout = storage.layout().clone();
        let old = storage
            .add(&stage(&layout, &package("Notes", "com.n", 1)))
            .unwrap();

        // removing the old icon fails once icons/ is no longer a directory
        let icons_aside = dir.path().join("icons-aside");
        std::fs::rename(layout.icons_dir(), &icons_aside).unwrap();
        std::fs::write(layout.icons_dir(), b"").unwrap();

        let staged = stage(&layout, &package("Notes", "com.n", 2));
        let err = storage.update(old.id, &staged).unwrap_err();
        assert!(matches!(err, AppStorageError::UpdateFailed(_)));
        assert!(matches!(
            storage.get_by_id(old.id),
            Err(AppStorageError::NotFound(_))
        ));
        assert!(!layout.apk_path(old.id).exists());

        std::fs::remove_file(layout.icons_dir()).unwrap();
        std::fs::rename(&icons_aside, layout.icons_dir()).unwrap();
        storage
            .locked(|ctx| Ok::<_, StoreError>(ensure_consistency(ctx)))
            .unwrap();

        assert!(!layout.icon_path(old.id).exists());
        assert!(storage.list_all().unwrap().is_empty());
    }

    #[test]
    fn unexpected_errors_delete_the_app_and_keep_their_identity() {
        let (_dir, storage) = open_storage();
        let kept = storage
            .add(&stage(storage.layout(), &package("Notes", "com.n", 1)))
            .unwrap();

        // same package, but its row no longer exists
        let vanished = AppMetadata {
            id: kept.id + 100,
            ..kept.clone()
        };
        let staged = stage(storage.layout(), &package("Notes", "com.n", 2));
        let err = storage
            .locked(|ctx| update_app(ctx, &vanished, &staged))
            .unwrap_err();

        assert!(matches!(err, AppStorageError::Unexpected(StoreError::NotFound)));
        assert_eq!(storage.list_all().unwrap(), vec![kept.clone()]);
        assert!(storage.layout().apk_path(kept.id).is_file());
        assert!(!storage.layout().apk_path(vanished.id).exists());
        assert!(staged.exists());
    }
}
