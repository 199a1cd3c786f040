use std::io::{Cursor, Read, Seek};

use zip::ZipArchive;

use crate::openxml::parse_relationships;
use crate::package::{workbook_target_from_root_rels, DEFAULT_WORKBOOK_PART, ROOT_RELS_PART};
use crate::sheet_metadata::{parse_workbook_sheets, WorkbookSheetInfo};
use crate::zip_util::read_zip_part_optional_with_limit;
use crate::{XlsxError, XlsxPackageLimits};

/// Read the ordered workbook sheet list straight from a ZIP container.
///
/// Only `_rels/.rels` and the workbook part are inflated; worksheets, styles and media are
/// never touched, so this stays cheap on large workbooks.
pub fn workbook_sheets_from_reader<R: Read + Seek>(
    reader: R,
    limits: XlsxPackageLimits,
) -> Result<Vec<WorkbookSheetInfo>, XlsxError> {
    let mut archive = ZipArchive::new(reader)?;

    let workbook_part = read_zip_part_optional_with_limit(
        &mut archive,
        ROOT_RELS_PART,
        limits.max_part_bytes,
    )?
    .and_then(|bytes| parse_relationships(&bytes).ok())
    .and_then(|rels| workbook_target_from_root_rels(&rels))
    .unwrap_or_else(|| DEFAULT_WORKBOOK_PART.to_string());

    let workbook_xml =
        read_zip_part_optional_with_limit(&mut archive, &workbook_part, limits.max_part_bytes)?
            .ok_or_else(|| XlsxError::MissingPart(workbook_part.clone()))?;
    let workbook_xml = String::from_utf8(workbook_xml)?;

    parse_workbook_sheets(&workbook_xml)
}

/// Ordered sheet names of an OOXML workbook held in memory.
pub fn sheet_names_from_bytes(
    bytes: &[u8],
    limits: XlsxPackageLimits,
) -> Result<Vec<String>, XlsxError> {
    let sheets = workbook_sheets_from_reader(Cursor::new(bytes), limits)?;
    log::debug!("workbook lists {} sheet(s)", sheets.len());
    Ok(sheets.into_iter().map(|sheet| sheet.name).collect())
}
