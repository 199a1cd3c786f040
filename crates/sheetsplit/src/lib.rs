//! Split a multi-sheet workbook into one standalone workbook per sheet.
//!
//! Each output keeps the source sheet's formatting (styles, merged cells, drawings, images)
//! because it is produced by removing the other sheets from a copy of the original package
//! rather than by rebuilding the sheet.
//!
//! Typical flow:
//!
//! ```no_run
//! # fn main() -> Result<(), sheetsplit::Error> {
//! let bytes = std::fs::read("data.xlsx")?;
//! let mut session = sheetsplit::SplitSession::open("data.xlsx", bytes)?;
//! println!("{:?}", session.sheet_names());
//!
//! let report = session.split(&sheetsplit::SplitOptions::default());
//! for file in &report.outputs {
//!     println!("{} ({} bytes)", file.file_name, file.bytes.len());
//! }
//! let archive = session.archive()?;
//! # let _ = archive;
//! # Ok(())
//! # }
//! ```

mod archive;
mod error;
mod output;
mod sanitize;
mod session;
mod source;

pub use archive::{archive_file_name, build_archive, ARCHIVE_MIME};
pub use error::{Error, FormatError, Result};
pub use output::{CollisionPolicy, OutputFile, OutputSet};
pub use sanitize::{output_file_name, sanitize_sheet_name, FALLBACK_STEM};
pub use session::{
    split_document, Artifact, ErrorPolicy, SheetFailure, SplitOptions, SplitProgress, SplitReport,
    SplitSession,
};
pub use source::{
    extract_sheet, read_sheet_catalog, read_sheet_catalog_limited, ContainerFormat, SheetCatalog,
    SourceDocument,
};
pub use sheetsplit_xlsx::{ExtractedWorkbook, RetainSummary, WorkbookKind, XlsxPackageLimits};
