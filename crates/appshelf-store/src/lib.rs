//! # appshelf-store
//!
//! The app-storage subsystem.  Every managed app lives in three places at
//! once: a row in the SQLite `app_metadata` table, a package file under
//! `apks/` and a normalized icon under `icons/`, all keyed by the row id.
//!
//! The three stores cannot share a transaction, so mutations are sequenced
//! by the orchestrators in [`crud`] and the id-sets are reconciled after
//! every attempt by [`consistency::ensure_consistency`].  All access goes
//! through [`AppStorage`], which serializes operations across threads and
//! processes with the file-backed [`StorageLock`].

pub mod apps;
pub mod consistency;
pub mod crud;
pub mod database;
pub mod layout;
pub mod lock;
pub mod migrations;
pub mod models;
pub mod storage;

mod error;

#[cfg(any(test, feature = "test-support"))]
pub mod test_support;

pub use database::Database;
pub use error::{AppStorageError, Result, StoreError};
pub use layout::StorageLayout;
pub use lock::{StorageLock, StorageLockGuard};
pub use models::AppMetadata;
pub use storage::{AppStorage, LockedStorage};
