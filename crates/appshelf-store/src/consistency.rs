//! Reconciliation of the three app stores.
//!
//! The metadata table, `apks/` and `icons/` each yield a set of ids.  Any id
//! missing from at least one of them belongs to a half-added or half-deleted
//! app and is removed from all three.  Stale artifacts of an app present
//! everywhere (say, a new row with the old icon) are not detected; the
//! updater deletes such apps itself.
//!
//! This runs after every add, update and delete, whatever their outcome, so
//! it never fails: problems are logged and the pass moves on.

use std::collections::BTreeSet;
use std::io;
use std::path::Path;

use tracing::{debug, error, info, warn};

use appshelf_shared::constants::{ICON_FILE_EXTENSION, PACKAGE_FILE_EXTENSION};

use crate::error::Result;
use crate::storage::LockedStorage;

/// Make the three id-sets equal.  Returns the ids that were removed.
pub fn ensure_consistency(ctx: &mut LockedStorage<'_>) -> BTreeSet<i64> {
    let (db_ids, apk_ids, icon_ids) = match collect_ids(ctx) {
        Ok(sets) => sets,
        Err(e) => {
            // reconciling against a partial listing would delete healthy apps
            error!("consistency check skipped, could not list app ids: {e}");
            return BTreeSet::new();
        }
    };

    let everywhere: BTreeSet<i64> = db_ids
        .intersection(&apk_ids)
        .copied()
        .filter(|id| icon_ids.contains(id))
        .collect();
    let inconsistent: BTreeSet<i64> = db_ids
        .iter()
        .chain(&apk_ids)
        .chain(&icon_ids)
        .copied()
        .filter(|id| !everywhere.contains(id))
        .collect();

    for &id in &inconsistent {
        delete_everywhere(ctx, id);
    }

    if !inconsistent.is_empty() {
        info!(ids = ?inconsistent, "removed inconsistent apps");
    }
    inconsistent
}

fn collect_ids(ctx: &LockedStorage<'_>) -> Result<(BTreeSet<i64>, BTreeSet<i64>, BTreeSet<i64>)> {
    Ok((
        ctx.db.app_ids()?,
        ids_in_directory(&ctx.layout.apks_dir(), PACKAGE_FILE_EXTENSION)?,
        ids_in_directory(&ctx.layout.icons_dir(), ICON_FILE_EXTENSION)?,
    ))
}

/// Ids of the entries named `<digits>.<extension>`.
fn ids_in_directory(dir: &Path, extension: &str) -> Result<BTreeSet<i64>> {
    let mut ids = BTreeSet::new();
    for entry in std::fs::read_dir(dir)? {
        let name = entry?.file_name();
        if let Some(id) = name.to_str().and_then(|n| id_from_file_name(n, extension)) {
            ids.insert(id);
        }
    }
    Ok(ids)
}

fn id_from_file_name(name: &str, extension: &str) -> Option<i64> {
    let stem = name.strip_suffix(extension)?.strip_suffix('.')?;
    if stem.is_empty() || !stem.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    stem.parse().ok()
}

fn delete_everywhere(ctx: &mut LockedStorage<'_>, id: i64) {
    debug!(id, "removing inconsistent app");

    if let Err(e) = delete_record(ctx, id) {
        error!(id, "failed to delete metadata of inconsistent app: {e}");
    }
    remove_if_present(&ctx.layout.apk_path(id));
    remove_if_present(&ctx.layout.icon_path(id));
}

fn delete_record(ctx: &mut LockedStorage<'_>, id: i64) -> Result<()> {
    let tx = ctx.db.begin()?;
    if tx.delete_app(id)? {
        tx.commit()
    } else {
        tx.rollback()
    }
}

fn remove_if_present(path: &Path) {
    match std::fs::remove_file(path) {
        Ok(()) => {}
        Err(e) if e.kind() == io::ErrorKind::NotFound => {}
        Err(e) => warn!(path = %path.display(), "failed to remove artifact of inconsistent app: {e}"),
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::*;
    use crate::test_support::{open_storage, package};

    fn insert_record(ctx: &mut LockedStorage<'_>, package_name: &str) -> i64 {
        let tx = ctx.db.begin().unwrap();
        let id = tx.insert_app(&package("App", package_name, 1), Utc::now()).unwrap();
        tx.commit().unwrap();
        id
    }

    #[test]
    fn parses_artifact_names() {
        assert_eq!(id_from_file_name("12.apk", "apk"), Some(12));
        assert_eq!(id_from_file_name("0.png", "png"), Some(0));
        assert_eq!(id_from_file_name("12.png", "apk"), None);
        assert_eq!(id_from_file_name(".apk", "apk"), None);
        assert_eq!(id_from_file_name("1a.apk", "apk"), None);
        assert_eq!(id_from_file_name("-1.apk", "apk"), None);
        assert_eq!(id_from_file_name("12apk", "apk"), None);
        assert_eq!(id_from_file_name("12.apk.tmp", "apk"), None);
    }

    #[test]
    fn heals_every_kind_of_partial_app() {
        let (_dir, storage) = open_storage();

        let removed = storage
            .locked(|ctx| {
                let layout = ctx.layout.clone();

                // complete
                let ok = insert_record(ctx, "com.ok");
                std::fs::write(layout.apk_path(ok), b"apk").unwrap();
                std::fs::write(layout.icon_path(ok), b"png").unwrap();

                // record and package, no icon
                let no_icon = insert_record(ctx, "com.no_icon");
                std::fs::write(layout.apk_path(no_icon), b"apk").unwrap();

                // record only
                let bare = insert_record(ctx, "com.bare");

                // orphaned files, no record
                std::fs::write(layout.apk_path(99), b"apk").unwrap();
                std::fs::write(layout.icon_path(98), b"png").unwrap();

                // unrelated files are ignored
                std::fs::write(layout.apks_dir().join("notes.txt"), b"x").unwrap();

                let removed = ensure_consistency(ctx);
                assert_eq!(removed, BTreeSet::from([no_icon, bare, 98, 99]));

                // fixed point
                assert!(ensure_consistency(ctx).is_empty());
                Ok::<_, crate::StoreError>(removed)
            })
            .unwrap();

        assert_eq!(removed.len(), 4);
        let remaining: Vec<_> = storage.list_all().unwrap().into_iter().map(|a| a.package_name).collect();
        assert_eq!(remaining, ["com.ok"]);

        let layout = storage.layout();
        assert!(!layout.apk_path(99).exists());
        assert!(!layout.icon_path(98).exists());
        assert!(layout.apks_dir().join("notes.txt").exists());
    }

    #[test]
    fn unreadable_directory_skips_the_pass() {
        let (_dir, storage) = open_storage();
        let layout = storage.layout().clone();

        storage
            .locked(|ctx| {
                let id = insert_record(ctx, "com.x");
                std::fs::write(layout.apk_path(id), b"apk").unwrap();
                Ok::<_, crate::StoreError>(())
            })
            .unwrap();

        std::fs::remove_dir(layout.icons_dir()).unwrap();
        std::fs::write(layout.icons_dir(), b"not a directory").unwrap();

        let removed = storage.locked(|ctx| Ok::<_, crate::StoreError>(ensure_consistency(ctx)));
        assert!(removed.unwrap().is_empty());
        assert_eq!(storage.list_all().unwrap().len(), 1);
    }
}
