//! Sheet catalog for legacy Excel 97-2003 `.xls` (BIFF) workbooks.
//!
//! Only the sheet list is read; `.xls` documents cannot be split, so nothing here rewrites the
//! compound file.

use std::io::Cursor;

use calamine::{Reader, SheetType, Xls};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum XlsCatalogError {
    #[error("failed to read `.xls`: {0}")]
    Xls(#[from] calamine::XlsError),
}

/// Sheet names of an in-memory `.xls` workbook, in workbook order.
///
/// Worksheets and chart sheets are both listed, matching the tab strip.
pub fn xls_sheet_names(bytes: &[u8]) -> Result<Vec<String>, XlsCatalogError> {
    let workbook: Xls<_> = Xls::new(Cursor::new(bytes))?;

    let names: Vec<String> = workbook
        .sheets_metadata()
        .iter()
        .filter(|sheet| matches!(sheet.typ, SheetType::WorkSheet | SheetType::ChartSheet))
        .map(|sheet| sheet.name.clone())
        .collect();
    log::debug!("`.xls` workbook lists {} sheet(s)", names.len());
    Ok(names)
}
