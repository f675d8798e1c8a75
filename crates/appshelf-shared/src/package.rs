//! The package-parser boundary.
//!
//! The storage engine never inspects uploaded binaries itself.  It hands the
//! staged file to a [`PackageParser`] and trusts the returned
//! [`ParsedPackage`] to be fully validated: field lengths, package-name
//! format, positive version code and API levels.  Only the relational rules
//! (uniqueness, version monotonicity) are checked by the store.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::constants::{APP_NAME_MAX_LENGTH, PACKAGE_NAME_MAX_LENGTH, VERSION_NAME_MAX_LENGTH};
use crate::error::ParseError;

/// Metadata and normalized icon extracted from an uploaded package.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ParsedPackage {
    pub app_name: String,
    pub package_name: String,
    pub version_code: i64,
    pub version_name: String,
    pub min_api_level: i64,
    /// Most apps don't declare a maximum API level.
    pub max_api_level: Option<i64>,
    /// Size of the uploaded file in bytes, never user-supplied.
    pub apk_file_size: i64,
    /// Square RGBA PNG, already resized to the uniform icon size.
    #[serde(default)]
    pub icon_png: Vec<u8>,
}

/// Turns a staged upload into a [`ParsedPackage`] or rejects it.
pub trait PackageParser: Send + Sync {
    fn parse(&self, path: &Path) -> Result<ParsedPackage, ParseError>;
}

impl<P: PackageParser + ?Sized> PackageParser for std::sync::Arc<P> {
    fn parse(&self, path: &Path) -> Result<ParsedPackage, ParseError> {
        (**self).parse(path)
    }
}

/// Manifest fields as read from the package, before validation.
#[derive(Debug, Default, Clone)]
pub(crate) struct RawManifest {
    pub app_name: Option<String>,
    pub package_name: Option<String>,
    pub version_code: Option<String>,
    pub version_name: Option<String>,
    pub min_api_level: Option<String>,
    pub max_api_level: Option<String>,
}

/// Validated manifest fields.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct ManifestFields {
    pub app_name: String,
    pub package_name: String,
    pub version_code: i64,
    pub version_name: String,
    pub min_api_level: i64,
    pub max_api_level: Option<i64>,
}

impl RawManifest {
    pub fn validate(self) -> Result<ManifestFields, ParseError> {
        Ok(ManifestFields {
            app_name: bounded_text("app name", self.app_name, APP_NAME_MAX_LENGTH)?,
            package_name: package_name(self.package_name)?,
            version_code: positive_int("version code", self.version_code)?,
            version_name: bounded_text("version name", self.version_name, VERSION_NAME_MAX_LENGTH)?,
            // Apps don't have to declare it, but in practice every app does.
            min_api_level: positive_int("min API level", self.min_api_level)?,
            max_api_level: match self.max_api_level {
                None => None,
                some => Some(positive_int("max API level", some)?),
            },
        })
    }
}

fn bounded_text(field: &str, value: Option<String>, max_len: usize) -> Result<String, ParseError> {
    let value = value
        .map(|v| v.trim().to_string())
        .ok_or_else(|| ParseError::Metadata(format!("{field} is missing")))?;

    if value.is_empty() || value.chars().count() > max_len {
        return Err(ParseError::Metadata(format!(
            "{field} must be 1..={max_len} characters long"
        )));
    }
    Ok(value)
}

fn positive_int(field: &str, value: Option<String>) -> Result<i64, ParseError> {
    let raw = value.ok_or_else(|| ParseError::Metadata(format!("{field} is missing")))?;
    let parsed: i64 = raw
        .trim()
        .parse()
        .map_err(|_| ParseError::Metadata(format!("{field} is not an integer: {raw}")))?;

    if parsed < 1 {
        return Err(ParseError::Metadata(format!("{field} must be positive, got {parsed}")));
    }
    Ok(parsed)
}

fn package_name(value: Option<String>) -> Result<String, ParseError> {
    let name = bounded_text("package name", value, PACKAGE_NAME_MAX_LENGTH)?;
    if !is_valid_package_name(&name) {
        return Err(ParseError::Metadata(format!("malformed package name: {name}")));
    }
    Ok(name)
}

/// `^[A-Za-z_][0-9A-Za-z._]+[0-9A-Za-z_]$`
pub fn is_valid_package_name(name: &str) -> bool {
    let bytes = name.as_bytes();
    if bytes.len() < 3 {
        return false;
    }

    let first = bytes[0];
    let last = bytes[bytes.len() - 1];
    let middle = &bytes[1..bytes.len() - 1];

    (first.is_ascii_alphabetic() || first == b'_')
        && middle
            .iter()
            .all(|b| b.is_ascii_alphanumeric() || *b == b'.' || *b == b'_')
        && (last.is_ascii_alphanumeric() || last == b'_')
}
