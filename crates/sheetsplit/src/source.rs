use std::sync::Arc;

use serde::Serialize;
use sheetsplit_xlsx::{ExtractedWorkbook, XlsxPackageLimits};

use crate::error::{Error, FormatError, Result};

const ZIP_MAGIC: &[u8] = b"PK\x03\x04";
const ZIP_EMPTY_MAGIC: &[u8] = b"PK\x05\x06";
const OLE_MAGIC: &[u8] = &[0xD0, 0xCF, 0x11, 0xE0, 0xA1, 0xB1, 0x1A, 0xE1];

/// Container family of an uploaded workbook, detected from its leading bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ContainerFormat {
    /// Open Packaging Convention ZIP (`.xlsx`, `.xlsm`, `.xltx`, `.xltm`, `.xlam`).
    Ooxml,
    /// OLE compound file holding a BIFF workbook (`.xls`).
    Xls,
}

impl ContainerFormat {
    pub fn detect(bytes: &[u8]) -> Option<Self> {
        if bytes.starts_with(ZIP_MAGIC) || bytes.starts_with(ZIP_EMPTY_MAGIC) {
            Some(ContainerFormat::Ooxml)
        } else if bytes.starts_with(OLE_MAGIC) {
            Some(ContainerFormat::Xls)
        } else {
            None
        }
    }
}

/// Immutable bytes of an uploaded workbook plus its original file name.
///
/// Cloning is cheap; the bytes are shared.
#[derive(Debug, Clone)]
pub struct SourceDocument {
    file_name: String,
    bytes: Arc<[u8]>,
    format: ContainerFormat,
}

impl SourceDocument {
    pub fn new(file_name: impl Into<String>, bytes: impl Into<Arc<[u8]>>) -> Result<Self> {
        let file_name = file_name.into();
        let bytes = bytes.into();
        let format = ContainerFormat::detect(&bytes)
            .ok_or_else(|| Error::document_format(&file_name, FormatError::UnrecognizedContainer))?;
        Ok(Self {
            file_name,
            bytes,
            format,
        })
    }

    pub fn file_name(&self) -> &str {
        &self.file_name
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn format(&self) -> ContainerFormat {
        self.format
    }

    /// Base name of the original file without directories or its last extension
    /// (`reports/Q4.xlsx` -> `Q4`). Falls back to `workbook`.
    pub fn stem(&self) -> &str {
        let base = self
            .file_name
            .rsplit(['/', '\\'])
            .next()
            .unwrap_or(&self.file_name);
        let stem = match base.rsplit_once('.') {
            Some((stem, _)) if !stem.is_empty() => stem,
            _ => base,
        };
        if stem.trim().is_empty() {
            "workbook"
        } else {
            stem
        }
    }
}

/// Ordered sheet names of a source document. Duplicates are kept; lookups return the first
/// match.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct SheetCatalog {
    names: Vec<String>,
}

impl SheetCatalog {
    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    pub fn position(&self, sheet: &str) -> Option<usize> {
        self.names.iter().position(|name| name == sheet)
    }

    pub fn contains(&self, sheet: &str) -> bool {
        self.position(sheet).is_some()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.names.iter().map(String::as_str)
    }
}

impl From<Vec<String>> for SheetCatalog {
    fn from(names: Vec<String>) -> Self {
        Self { names }
    }
}

/// Read the sheet list of `doc` with default package limits.
pub fn read_sheet_catalog(doc: &SourceDocument) -> Result<SheetCatalog> {
    read_sheet_catalog_limited(doc, XlsxPackageLimits::default())
}

pub fn read_sheet_catalog_limited(
    doc: &SourceDocument,
    limits: XlsxPackageLimits,
) -> Result<SheetCatalog> {
    let names = match doc.format() {
        ContainerFormat::Ooxml => sheetsplit_xlsx::sheet_names_from_bytes(doc.bytes(), limits)
            .map_err(|err| Error::document_format(doc.file_name(), err))?,
        ContainerFormat::Xls => sheetsplit_xls::xls_sheet_names(doc.bytes())
            .map_err(|err| Error::document_format(doc.file_name(), err))?,
    };
    Ok(SheetCatalog::from(names))
}

/// Produce a standalone workbook holding only `sheet`.
pub fn extract_sheet(
    doc: &SourceDocument,
    sheet: &str,
    limits: XlsxPackageLimits,
) -> Result<ExtractedWorkbook> {
    match doc.format() {
        ContainerFormat::Ooxml => sheetsplit_xlsx::extract_sheet(doc.bytes(), sheet, limits)
            .map_err(|err| Error::from_extract(doc.file_name(), sheet, err)),
        ContainerFormat::Xls => Err(Error::document_format(
            doc.file_name(),
            FormatError::LegacyExtractionUnsupported,
        )),
    }
}
