use appshelf_shared::ParseError;
use thiserror::Error;

/// Errors produced by the store layer.
#[derive(Error, Debug)]
pub enum StoreError {
    /// SQLite error.
    #[error("Database error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// Filesystem error while touching the data root.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// A query expected exactly one row but found none.
    #[error("Record not found")]
    NotFound,

    /// Migration failure.
    #[error("Migration error: {0}")]
    Migration(String),

    /// The storage lock handle was used after it had been closed.
    #[error("The lock has been closed!")]
    LockClosed,
}

impl StoreError {
    /// Database and filesystem failures.  These are expected to happen now
    /// and then and get translated to a generic "operation failed" message;
    /// everything else is a bug.
    pub fn is_storage_layer(&self) -> bool {
        matches!(self, StoreError::Sqlite(_) | StoreError::Io(_))
    }
}

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, StoreError>;

/// Outcome of an app-storage operation that did not succeed.
#[derive(Error, Debug)]
pub enum AppStorageError {
    /// The upload was rejected by the package parser.
    #[error(transparent)]
    Parser(#[from] ParseError),

    #[error("An app with the same package name ({0}) is already present on the server! You should update the app instead of adding it!")]
    DuplicatePackageName(String),

    #[error("The package name of the supplied APK file ({supplied}) is not the same as the updated app's ({existing})! You should add the app instead of updating it!")]
    PackageNameMismatch { supplied: String, existing: String },

    #[error("The version of the supplied APK file ({supplied}) is not greater than the version of the APK already present on the server ({existing})! Make sure you're uploading a newer version of the app!")]
    VersionNotIncreased { supplied: i64, existing: i64 },

    #[error("The app with ID {0} does not exist!")]
    NotFound(i64),

    #[error("An error occurred while adding the app!")]
    AddFailed(#[source] StoreError),

    #[error("An error occurred while updating the app!")]
    UpdateFailed(#[source] StoreError),

    #[error("An error occurred while deleting the app!")]
    DeleteFailed(#[source] StoreError),

    /// Not a storage-layer failure; surfaced unchanged to the transport.
    #[error(transparent)]
    Unexpected(#[from] StoreError),
}

impl AppStorageError {
    /// The message to show the user, `None` for unexpected errors.
    pub fn user_message(&self) -> Option<String> {
        match self {
            AppStorageError::Unexpected(_) => None,
            other => Some(other.to_string()),
        }
    }
}

/// Translate a low-level error raised mid-operation: storage-layer errors
/// become the operation's generic failure, anything else stays unexpected.
pub(crate) fn classify(err: StoreError, failed: fn(StoreError) -> AppStorageError) -> AppStorageError {
    if err.is_storage_layer() {
        failed(err)
    } else {
        AppStorageError::Unexpected(err)
    }
}
