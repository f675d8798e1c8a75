use std::path::Path;

use chrono::Utc;
use tracing::{info, warn};

use appshelf_shared::ParsedPackage;

use crate::consistency::ensure_consistency;
use crate::error::{classify, AppStorageError, StoreError};
use crate::models::AppMetadata;
use crate::storage::LockedStorage;

/// Add the app in the staged file at `staged`, moving the file into the
/// package directory on success.
pub fn add_app(ctx: &mut LockedStorage<'_>, staged: &Path) -> Result<AppMetadata, AppStorageError> {
    let result = try_add(ctx, staged);
    ensure_consistency(ctx);

    match &result {
        Ok(app) => info!(id = app.id, package = %app.package_name, "app added"),
        Err(e) => warn!("adding app failed: {e}"),
    }
    result
}

fn try_add(ctx: &mut LockedStorage<'_>, staged: &Path) -> Result<AppMetadata, AppStorageError> {
    let parsed = ctx.parser.parse(staged)?;

    let existing = ctx
        .db
        .find_app_by_package_name(&parsed.package_name)
        .map_err(|e| classify(e, AppStorageError::AddFailed))?;
    if existing.is_some() {
        return Err(AppStorageError::DuplicatePackageName(parsed.package_name));
    }

    perform_add(ctx, staged, &parsed).map_err(|e| classify(e, AppStorageError::AddFailed))
}

/// Metadata, then package, then icon.  Whatever is left half-done on
/// failure is cleaned up by the consistency pass.
fn perform_add(
    ctx: &mut LockedStorage<'_>,
    staged: &Path,
    parsed: &ParsedPackage,
) -> Result<AppMetadata, StoreError> {
    let tx = ctx.db.begin()?;
    let id = tx.insert_app(parsed, Utc::now())?;
    tx.commit()?;

    let app = ctx.db.get_app(id)?;

    std::fs::rename(staged, ctx.layout.apk_path(id))?;
    std::fs::write(ctx.layout.icon_path(id), &parsed.icon_png)?;

    Ok(app)
}
