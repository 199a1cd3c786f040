//! OPC package handling and single-sheet extraction for SpreadsheetML workbooks.
//!
//! - [`XlsxPackage`]: the whole ZIP container inflated into memory (part name -> bytes).
//!   Parts that an edit does not touch are written back byte-for-byte.
//! - [`sheet_names_from_bytes`]: a cheap catalog scan that only inflates the package
//!   relationships and the workbook part.
//! - [`extract_sheet`] / [`XlsxPackage::retain_sheet`]: remove every sheet but one, together
//!   with everything only those sheets reference.

mod app_props;
mod catalog;
mod content_types;
pub mod defined_names;
mod extract;
mod opc_graph;
pub mod openxml;
mod package;
pub mod path;
mod sheet_metadata;
mod workbook_rewrite;
mod zip_util;

#[cfg(test)]
mod test_support;

pub use catalog::{sheet_names_from_bytes, workbook_sheets_from_reader};
pub use extract::{extract_sheet, ExtractError, ExtractedWorkbook, RetainSummary};
pub use package::{
    SheetPartInfo, WorkbookKind, XlsxError, XlsxPackage, XlsxPackageLimits,
    MAX_XLSX_PACKAGE_PART_BYTES, MAX_XLSX_PACKAGE_TOTAL_BYTES,
};
pub use sheet_metadata::{parse_workbook_sheets, SheetVisibility, WorkbookSheetInfo};
