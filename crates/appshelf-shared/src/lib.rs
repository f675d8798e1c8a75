//! # appshelf-shared
//!
//! Types shared between the storage engine and the HTTP layer: global
//! constants, the package-parser boundary and the APK parser that implements
//! it.

pub mod apk;
pub mod constants;
pub mod error;
pub mod package;

pub use apk::ApkParser;
pub use error::ParseError;
pub use package::{PackageParser, ParsedPackage};
