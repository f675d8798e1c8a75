/// Application name
pub const APP_NAME: &str = "Appshelf";

/// API versions served by this build
pub const SUPPORTED_API_VERSIONS: &[u32] = &[1];

/// Icons are always square PNG images of this size
pub const ICON_WIDTH_AND_HEIGHT: u32 = 192;

/// Density (dpi) the icon picker aims for when a launcher icon ships in
/// several resolutions
pub const ICON_TARGET_DENSITY: u16 = 640;

/// Column limits of the metadata table
pub const APP_NAME_MAX_LENGTH: usize = 256;
pub const PACKAGE_NAME_MAX_LENGTH: usize = 512;
pub const VERSION_NAME_MAX_LENGTH: usize = 32;

/// Extension of stored package files
pub const PACKAGE_FILE_EXTENSION: &str = "apk";

/// Extension of stored icon files
pub const ICON_FILE_EXTENSION: &str = "png";

/// Default maximum upload size in bytes (64 MiB)
pub const DEFAULT_MAX_UPLOAD_SIZE: usize = 64 * 1024 * 1024;

/// Default HTTP API port
pub const DEFAULT_HTTP_PORT: u16 = 8080;
