use std::collections::{BTreeMap, HashMap};
use std::io::{Cursor, Read, Seek, SeekFrom, Write};

use thiserror::Error;

use crate::content_types::{ensure_content_types_default, override_content_type};
use crate::openxml::{parse_relationships, Relationship};
use crate::path::{rels_for_part, resolve_target};
use crate::sheet_metadata::{parse_workbook_sheets, SheetVisibility, WorkbookSheetInfo};
use crate::zip_util::{read_entry_with_limit, zip_part_name_lookup_key, ZipInflateBudget};

/// Maximum allowed *inflated* bytes for a single ZIP entry in an XLSX package.
///
/// This is a safety limit to prevent loading ZIP bombs into memory when the whole package must
/// be materialized for extraction.
pub const MAX_XLSX_PACKAGE_PART_BYTES: u64 = 256 * 1024 * 1024; // 256 MiB

/// Maximum allowed *inflated* bytes across all ZIP entries in an XLSX package.
pub const MAX_XLSX_PACKAGE_TOTAL_BYTES: u64 = 512 * 1024 * 1024; // 512 MiB

pub(crate) const DEFAULT_WORKBOOK_PART: &str = "xl/workbook.xml";
pub(crate) const CONTENT_TYPES_PART: &str = "[Content_Types].xml";
pub(crate) const ROOT_RELS_PART: &str = "_rels/.rels";

/// Size limits enforced by [`XlsxPackage::from_bytes_limited`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct XlsxPackageLimits {
    /// Maximum allowed uncompressed bytes for any single part.
    pub max_part_bytes: u64,
    /// Maximum allowed uncompressed bytes across the whole package.
    pub max_total_bytes: u64,
}

impl Default for XlsxPackageLimits {
    fn default() -> Self {
        Self {
            max_part_bytes: MAX_XLSX_PACKAGE_PART_BYTES,
            max_total_bytes: MAX_XLSX_PACKAGE_TOTAL_BYTES,
        }
    }
}

/// Excel workbook "kind", as advertised by the workbook part's content type in
/// `[Content_Types].xml`.
///
/// Split outputs keep the kind of their source, so this also drives the output file extension
/// and MIME type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WorkbookKind {
    /// Standard workbook (`.xlsx`).
    #[default]
    Workbook,
    /// Macro-enabled workbook (`.xlsm`).
    MacroEnabledWorkbook,
    /// Workbook template (`.xltx`).
    Template,
    /// Macro-enabled workbook template (`.xltm`).
    MacroEnabledTemplate,
    /// Macro-enabled add-in (`.xlam`).
    MacroEnabledAddIn,
}

impl WorkbookKind {
    pub fn from_extension(ext: &str) -> Option<Self> {
        let ext = ext.trim_start_matches('.');
        [
            Self::Workbook,
            Self::MacroEnabledWorkbook,
            Self::Template,
            Self::MacroEnabledTemplate,
            Self::MacroEnabledAddIn,
        ]
        .into_iter()
        .find(|kind| ext.eq_ignore_ascii_case(kind.extension()))
    }

    /// File extension (without the leading dot) used for documents of this kind.
    pub fn extension(self) -> &'static str {
        match self {
            WorkbookKind::Workbook => "xlsx",
            WorkbookKind::MacroEnabledWorkbook => "xlsm",
            WorkbookKind::Template => "xltx",
            WorkbookKind::MacroEnabledTemplate => "xltm",
            WorkbookKind::MacroEnabledAddIn => "xlam",
        }
    }

    /// MIME type for a whole package of this kind (used when handing files to a download layer).
    pub fn package_mime_type(self) -> &'static str {
        match self {
            WorkbookKind::Workbook => {
                "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet"
            }
            WorkbookKind::MacroEnabledWorkbook => "application/vnd.ms-excel.sheet.macroEnabled.12",
            WorkbookKind::Template => {
                "application/vnd.openxmlformats-officedocument.spreadsheetml.template"
            }
            WorkbookKind::MacroEnabledTemplate => {
                "application/vnd.ms-excel.template.macroEnabled.12"
            }
            WorkbookKind::MacroEnabledAddIn => "application/vnd.ms-excel.addin.macroEnabled.12",
        }
    }

    pub fn workbook_content_type(self) -> &'static str {
        match self {
            WorkbookKind::Workbook => {
                "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet.main+xml"
            }
            WorkbookKind::MacroEnabledWorkbook => {
                "application/vnd.ms-excel.sheet.macroEnabled.main+xml"
            }
            WorkbookKind::Template => {
                "application/vnd.openxmlformats-officedocument.spreadsheetml.template.main+xml"
            }
            WorkbookKind::MacroEnabledTemplate => {
                "application/vnd.ms-excel.template.macroEnabled.main+xml"
            }
            WorkbookKind::MacroEnabledAddIn => {
                "application/vnd.ms-excel.addin.macroEnabled.main+xml"
            }
        }
    }

    pub fn is_macro_enabled(self) -> bool {
        matches!(
            self,
            WorkbookKind::MacroEnabledWorkbook
                | WorkbookKind::MacroEnabledTemplate
                | WorkbookKind::MacroEnabledAddIn
        )
    }

    /// Detect a [`WorkbookKind`] from the workbook "main" content type string.
    pub fn from_workbook_main_content_type(content_type: &str) -> Option<Self> {
        let content_type = content_type.trim();
        [
            Self::Workbook,
            Self::MacroEnabledWorkbook,
            Self::Template,
            Self::MacroEnabledTemplate,
            Self::MacroEnabledAddIn,
        ]
        .into_iter()
        .find(|kind| kind.workbook_content_type() == content_type)
    }
}

#[derive(Debug, Error)]
pub enum XlsxError {
    #[error("zip error: {0}")]
    Zip(#[from] zip::result::ZipError),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("xml error: {0}")]
    Xml(#[from] quick_xml::Error),
    #[error("xml error: {0}")]
    RoXml(#[from] roxmltree::Error),
    #[error("utf-8 error: {0}")]
    Utf8(#[from] std::string::FromUtf8Error),
    #[error("utf-8 error: {0}")]
    Utf8Str(#[from] std::str::Utf8Error),
    #[error("xml attribute error: {0}")]
    Attr(#[from] quick_xml::events::attributes::AttrError),
    #[error("missing required attribute: {0}")]
    MissingAttr(&'static str),
    #[error("missing xlsx part: {0}")]
    MissingPart(String),
    #[error("invalid xlsx: {0}")]
    Invalid(String),
    #[error(
        "xlsx package part is too large to load safely: {part} is {size} bytes (max {max} bytes)"
    )]
    PartTooLarge { part: String, size: u64, max: u64 },
    #[error("xlsx package is too large to load safely: {total} bytes uncompressed (max {max})")]
    PackageTooLarge { total: u64, max: u64 },
    #[error("invalid sheetId value")]
    InvalidSheetId,
}

/// Resolved metadata for a workbook sheet and the part that holds its content.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SheetPartInfo {
    pub name: String,
    pub sheet_id: u32,
    pub rel_id: String,
    pub visibility: SheetVisibility,
    /// ZIP entry name for the sheet XML (e.g. `xl/worksheets/sheet1.xml`); `None` when the
    /// workbook relationship is missing or external.
    pub sheet_part: Option<String>,
}

/// In-memory representation of an XLSX/XLSM package as a map of part name -> bytes.
///
/// Parts are stored under their original ZIP entry names and written back verbatim, so every
/// part an edit does not touch round-trips byte-for-byte.
#[derive(Debug, Clone)]
pub struct XlsxPackage {
    parts: BTreeMap<String, Vec<u8>>,
}

impl XlsxPackage {
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, XlsxError> {
        Self::from_bytes_limited(bytes, XlsxPackageLimits::default())
    }

    pub fn from_bytes_limited(bytes: &[u8], limits: XlsxPackageLimits) -> Result<Self, XlsxError> {
        Self::from_reader_limited(Cursor::new(bytes), limits)
    }

    pub fn from_reader_limited<R: Read + Seek>(
        mut reader: R,
        limits: XlsxPackageLimits,
    ) -> Result<Self, XlsxError> {
        reader.seek(SeekFrom::Start(0))?;
        let mut zip = zip::ZipArchive::new(reader)?;

        let mut parts = BTreeMap::new();
        let mut budget = ZipInflateBudget::new(limits.max_total_bytes);
        for i in 0..zip.len() {
            let file = zip.by_index(i)?;
            if !file.is_file() {
                continue;
            }

            let name = file.name().to_string();
            let declared = file.size();
            let buf =
                read_entry_with_limit(file, declared, &name, limits.max_part_bytes, Some(&mut budget))?;
            parts.insert(name, buf);
        }

        Ok(Self { parts })
    }

    /// Build a package from an already-inflated part map.
    pub fn from_parts(parts: BTreeMap<String, Vec<u8>>) -> Self {
        Self { parts }
    }

    /// Look up the stored entry name for `name`, tolerating leading `/`, `\` separators,
    /// case differences and percent-encoding.
    pub fn resolve_part_name(&self, name: &str) -> Option<&str> {
        if let Some((key, _)) = self.parts.get_key_value(name) {
            return Some(key.as_str());
        }
        let stripped = name.strip_prefix('/').unwrap_or(name);
        if let Some((key, _)) = self.parts.get_key_value(stripped) {
            return Some(key.as_str());
        }
        let wanted = zip_part_name_lookup_key(name);
        self.parts
            .keys()
            .find(|key| zip_part_name_lookup_key(key) == wanted)
            .map(String::as_str)
    }

    pub fn part(&self, name: &str) -> Option<&[u8]> {
        let key = self.resolve_part_name(name)?;
        self.parts.get(key).map(Vec::as_slice)
    }

    pub fn has_part(&self, name: &str) -> bool {
        self.resolve_part_name(name).is_some()
    }

    pub fn parts(&self) -> impl Iterator<Item = (&str, &[u8])> {
        self.parts
            .iter()
            .map(|(name, bytes)| (name.as_str(), bytes.as_slice()))
    }

    pub fn part_names(&self) -> impl Iterator<Item = &str> {
        self.parts.keys().map(String::as_str)
    }

    /// Borrow the raw part map.
    pub fn parts_map(&self) -> &BTreeMap<String, Vec<u8>> {
        &self.parts
    }

    /// Replace (or insert) a part. An existing entry spelled differently (e.g. with a leading
    /// `/`) keeps its original name.
    pub fn set_part(&mut self, name: impl Into<String>, bytes: Vec<u8>) {
        let name = name.into();
        let key = self
            .resolve_part_name(&name)
            .map(str::to_string)
            .unwrap_or(name);
        self.parts.insert(key, bytes);
    }

    /// Remove a part, returning its bytes when it existed.
    pub fn remove_part(&mut self, name: &str) -> Option<Vec<u8>> {
        let key = self.resolve_part_name(name)?.to_string();
        self.parts.remove(&key)
    }

    /// Part name of the main workbook part, resolved from the package-level `officeDocument`
    /// relationship and falling back to `xl/workbook.xml`.
    pub fn workbook_part_name(&self) -> String {
        self.part(ROOT_RELS_PART)
            .and_then(|bytes| parse_relationships(bytes).ok())
            .and_then(|rels| workbook_target_from_root_rels(&rels))
            .and_then(|target| self.resolve_part_name(&target).map(str::to_string))
            .unwrap_or_else(|| DEFAULT_WORKBOOK_PART.to_string())
    }

    /// Detect the workbook kind from `[Content_Types].xml`, defaulting to a plain workbook.
    pub fn workbook_kind(&self) -> WorkbookKind {
        let workbook_part = self.workbook_part_name();
        self.part(CONTENT_TYPES_PART)
            .and_then(|xml| override_content_type(xml, &workbook_part).ok().flatten())
            .and_then(|ct| WorkbookKind::from_workbook_main_content_type(&ct))
            .unwrap_or_default()
    }

    /// Parse the ordered list of workbook sheets from the workbook part.
    pub fn workbook_sheets(&self) -> Result<Vec<WorkbookSheetInfo>, XlsxError> {
        let workbook_part = self.workbook_part_name();
        let workbook_xml = self
            .part(&workbook_part)
            .ok_or(XlsxError::MissingPart(workbook_part))?;
        parse_workbook_sheets(std::str::from_utf8(workbook_xml)?)
    }

    /// Ordered sheet names, as they appear in the workbook's `<sheets>` list.
    pub fn sheet_names(&self) -> Result<Vec<String>, XlsxError> {
        Ok(self
            .workbook_sheets()?
            .into_iter()
            .map(|sheet| sheet.name)
            .collect())
    }

    /// Relationships declared by `part_name`'s `.rels` part (empty when there is none).
    pub fn relationships_of(&self, part_name: &str) -> Result<Vec<Relationship>, XlsxError> {
        match self.part(&rels_for_part(part_name)) {
            Some(bytes) => parse_relationships(bytes),
            None => Ok(Vec::new()),
        }
    }

    /// Return the ordered workbook sheets with their resolved sheet part names.
    pub fn sheet_parts(&self) -> Result<Vec<SheetPartInfo>, XlsxError> {
        let workbook_part = self.workbook_part_name();
        let sheets = self.workbook_sheets()?;
        let rel_by_id: HashMap<String, Relationship> = self
            .relationships_of(&workbook_part)?
            .into_iter()
            .map(|rel| (rel.id.clone(), rel))
            .collect();

        Ok(sheets
            .into_iter()
            .map(|sheet| {
                let sheet_part = rel_by_id
                    .get(&sheet.rel_id)
                    .filter(|rel| !rel.is_external())
                    .map(|rel| resolve_target(&workbook_part, &rel.target))
                    .and_then(|target| self.resolve_part_name(&target).map(str::to_string));
                SheetPartInfo {
                    name: sheet.name,
                    sheet_id: sheet.sheet_id,
                    rel_id: sheet.rel_id,
                    visibility: sheet.visibility,
                    sheet_part,
                }
            })
            .collect())
    }

    pub fn write_to_bytes(&self) -> Result<Vec<u8>, XlsxError> {
        let mut buf = Vec::new();
        self.write_to(&mut buf)?;
        Ok(buf)
    }

    pub fn write_to<W: Write>(&self, mut w: W) -> Result<(), XlsxError> {
        let mut parts = self.parts.clone();

        // Ensure `[Content_Types].xml` has `<Default>` entries for image extensions present in the
        // package. Only extensions that actually appear are added, so packages that are already
        // consistent are written back untouched.
        const IMAGE_DEFAULTS: &[(&str, &str)] = &[
            ("png", "image/png"),
            ("jpg", "image/jpeg"),
            ("jpeg", "image/jpeg"),
            ("gif", "image/gif"),
            ("bmp", "image/bmp"),
            ("emf", "image/x-emf"),
            ("wmf", "image/x-wmf"),
            ("svg", "image/svg+xml"),
            ("tif", "image/tiff"),
            ("tiff", "image/tiff"),
            ("webp", "image/webp"),
        ];
        for (ext, content_type) in IMAGE_DEFAULTS {
            let suffix = format!(".{ext}");
            let present = parts.keys().any(|name| {
                let name = name.as_bytes();
                name.len() >= suffix.len()
                    && name[name.len() - suffix.len()..].eq_ignore_ascii_case(suffix.as_bytes())
            });
            if present {
                ensure_content_types_default(&mut parts, ext, content_type)?;
            }
        }

        let cursor = Cursor::new(Vec::new());
        let mut zip = zip::ZipWriter::new(cursor);
        let options = zip::write::FileOptions::<()>::default()
            .compression_method(zip::CompressionMethod::Deflated);

        // `[Content_Types].xml` goes first; some consumers sniff it from the start of the archive.
        if let Some(bytes) = parts.remove(CONTENT_TYPES_PART) {
            zip.start_file(CONTENT_TYPES_PART, options)?;
            zip.write_all(&bytes)?;
        }
        for (name, bytes) in parts {
            zip.start_file(name, options)?;
            zip.write_all(&bytes)?;
        }

        let cursor = zip.finish()?;
        w.write_all(&cursor.into_inner())?;
        Ok(())
    }
}

pub(crate) fn workbook_target_from_root_rels(rels: &[Relationship]) -> Option<String> {
    rels.iter()
        .find(|rel| rel.is_office_document() && !rel.is_external())
        .map(|rel| resolve_target("", &rel.target))
}
