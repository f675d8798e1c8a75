//! APK implementation of the [`PackageParser`] boundary.
//!
//! An APK is a ZIP archive.  The manifest is stored as compiled XML and most
//! of its interesting attributes (label, icon, sometimes the version name)
//! are references into `resources.arsc`, so both are decoded here.  The
//! launcher icon is normalized to a square RGBA PNG of
//! [`ICON_WIDTH_AND_HEIGHT`] pixels.

mod arsc;
mod axml;
mod res;

use std::fs::File;
use std::io::{Cursor, Read, Seek};
use std::path::Path;

use image::imageops::FilterType;
use image::{DynamicImage, ImageFormat};
use tracing::debug;
use zip::result::ZipError;
use zip::ZipArchive;

use crate::constants::{ICON_TARGET_DENSITY, ICON_WIDTH_AND_HEIGHT};
use crate::error::ParseError;
use crate::package::{PackageParser, ParsedPackage, RawManifest};

use self::arsc::ResourceTable;
use self::axml::XmlElement;
use self::res::ResValue;

const MANIFEST_ENTRY: &str = "AndroidManifest.xml";
const RESOURCES_ENTRY: &str = "resources.arsc";

/// Upper bound for any single archive member read into memory.
const MAX_ENTRY_SIZE: u64 = 32 * 1024 * 1024;

// android.R.attr ids
const ATTR_LABEL: u32 = 0x0101_0001;
const ATTR_ICON: u32 = 0x0101_0002;
const ATTR_MIN_SDK_VERSION: u32 = 0x0101_020c;
const ATTR_VERSION_CODE: u32 = 0x0101_021b;
const ATTR_VERSION_NAME: u32 = 0x0101_021c;
const ATTR_MAX_SDK_VERSION: u32 = 0x0101_0271;

/// Density values that don't denote a raster bucket.
const DENSITY_DEFAULT: u16 = 0;
const DENSITY_MEDIUM: u16 = 160;
const DENSITY_ANY: u16 = 0xFFFE;
const DENSITY_NONE: u16 = 0xFFFF;

#[derive(Debug, Default, Clone, Copy)]
pub struct ApkParser;

impl ApkParser {
    pub fn new() -> Self {
        Self
    }
}

impl PackageParser for ApkParser {
    fn parse(&self, path: &Path) -> Result<ParsedPackage, ParseError> {
        let file = File::open(path).map_err(ParseError::unreadable)?;
        let mut archive = ZipArchive::new(file).map_err(ParseError::unreadable)?;

        let manifest = match read_entry(&mut archive, MANIFEST_ENTRY) {
            Ok(bytes) => bytes,
            Err(ZipError::FileNotFound) => {
                return Err(ParseError::Invalid(format!("{MANIFEST_ENTRY} is missing")));
            }
            Err(e) => return Err(ParseError::unreadable(e)),
        };
        let elements = axml::start_elements(&manifest).map_err(ParseError::unreadable)?;
        if elements.first().map(|e| e.name.as_str()) != Some("manifest") {
            return Err(ParseError::Invalid(format!(
                "{MANIFEST_ENTRY} has no <manifest> root"
            )));
        }

        let table = match read_entry(&mut archive, RESOURCES_ENTRY) {
            Ok(bytes) => Some(ResourceTable::parse(&bytes).map_err(ParseError::unreadable)?),
            Err(ZipError::FileNotFound) => None,
            Err(e) => return Err(ParseError::unreadable(e)),
        };

        let (raw, icon) = read_manifest(&elements, table.as_ref());
        let fields = raw.validate()?;

        let apk_file_size = std::fs::metadata(path).map_err(ParseError::FileSize)?.len() as i64;

        let icon_png = extract_icon(&mut archive, icon, table.as_ref())?;

        debug!(
            package = %fields.package_name,
            version_code = fields.version_code,
            size = apk_file_size,
            "Parsed APK"
        );

        Ok(ParsedPackage {
            app_name: fields.app_name,
            package_name: fields.package_name,
            version_code: fields.version_code,
            version_name: fields.version_name,
            min_api_level: fields.min_api_level,
            max_api_level: fields.max_api_level,
            apk_file_size,
            icon_png,
        })
    }
}

fn read_entry<R: Read + Seek>(archive: &mut ZipArchive<R>, name: &str) -> Result<Vec<u8>, ZipError> {
    let entry = archive.by_name(name)?;
    let mut buf = Vec::with_capacity(entry.size().min(MAX_ENTRY_SIZE) as usize);
    entry.take(MAX_ENTRY_SIZE).read_to_end(&mut buf)?;
    Ok(buf)
}

fn element<'a>(elements: &'a [XmlElement], name: &str) -> Option<&'a XmlElement> {
    elements.iter().find(|e| e.name == name)
}

fn text(value: Option<&ResValue>, table: Option<&ResourceTable>) -> Option<String> {
    match value? {
        ResValue::String(s) => Some(s.clone()),
        ResValue::Int(i) => Some(i.to_string()),
        ResValue::Bool(b) => Some(b.to_string()),
        ResValue::Reference(id) => table?.resolve_string(*id),
        ResValue::Other { .. } => None,
    }
}

fn read_manifest(
    elements: &[XmlElement],
    table: Option<&ResourceTable>,
) -> (RawManifest, Option<ResValue>) {
    let mut raw = RawManifest::default();
    let mut icon = None;

    if let Some(manifest) = element(elements, "manifest") {
        raw.package_name = text(manifest.attribute(None, "package"), table);
        raw.version_code = text(manifest.attribute(Some(ATTR_VERSION_CODE), "versionCode"), table);
        raw.version_name = text(manifest.attribute(Some(ATTR_VERSION_NAME), "versionName"), table);
    }
    if let Some(sdk) = element(elements, "uses-sdk") {
        raw.min_api_level = text(sdk.attribute(Some(ATTR_MIN_SDK_VERSION), "minSdkVersion"), table);
        raw.max_api_level = text(sdk.attribute(Some(ATTR_MAX_SDK_VERSION), "maxSdkVersion"), table);
    }
    if let Some(application) = element(elements, "application") {
        raw.app_name = text(application.attribute(Some(ATTR_LABEL), "label"), table);
        icon = application.attribute(Some(ATTR_ICON), "icon").cloned();
    }

    (raw, icon)
}

/// Rank a density bucket; vector (`anydpi`) and unspecified buckets rank last.
fn density_rank(density: u16) -> u16 {
    match density {
        DENSITY_ANY | DENSITY_NONE => 0,
        DENSITY_DEFAULT => DENSITY_MEDIUM,
        d => d,
    }
}

/// Pick the raster icon closest to [`ICON_TARGET_DENSITY`], preferring
/// larger images on ties.
fn pick_icon(candidates: Vec<(u16, String)>) -> Option<String> {
    candidates
        .into_iter()
        .filter(|(_, path)| !path.ends_with(".xml"))
        .max_by_key(|(density, _)| {
            let rank = density_rank(*density);
            (std::cmp::Reverse(rank.abs_diff(ICON_TARGET_DENSITY)), rank)
        })
        .map(|(_, path)| path)
}

fn extract_icon<R: Read + Seek>(
    archive: &mut ZipArchive<R>,
    icon: Option<ResValue>,
    table: Option<&ResourceTable>,
) -> Result<Vec<u8>, ParseError> {
    let candidates = match icon {
        Some(ResValue::String(path)) => vec![(DENSITY_DEFAULT, path)],
        Some(ResValue::Reference(id)) => table.map(|t| t.resolve_files(id)).unwrap_or_default(),
        _ => Vec::new(),
    };
    let path = pick_icon(candidates).ok_or_else(|| ParseError::icon("no raster launcher icon"))?;

    let bytes = read_entry(archive, &path).map_err(ParseError::icon)?;
    normalize_icon(&bytes)
}

/// Decode any supported raster format and re-encode it as the uniform PNG.
pub fn normalize_icon(bytes: &[u8]) -> Result<Vec<u8>, ParseError> {
    let image = image::load_from_memory(bytes).map_err(ParseError::icon)?;
    let resized = DynamicImage::ImageRgba8(image.to_rgba8()).resize_exact(
        ICON_WIDTH_AND_HEIGHT,
        ICON_WIDTH_AND_HEIGHT,
        FilterType::Lanczos3,
    );

    let mut png = Vec::new();
    resized
        .write_to(&mut Cursor::new(&mut png), ImageFormat::Png)
        .map_err(ParseError::icon)?;
    Ok(png)
}
