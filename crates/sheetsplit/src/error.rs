use sheetsplit_xls::XlsCatalogError;
use sheetsplit_xlsx::{ExtractError, XlsxError};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    /// The source bytes could not be read as a workbook. Raised before any sheet is processed.
    #[error("`{file_name}` is not a readable workbook: {source}")]
    DocumentFormat {
        file_name: String,
        #[source]
        source: FormatError,
    },
    #[error("sheet {sheet:?} not found in `{file_name}`")]
    SheetNotFound { file_name: String, sheet: String },
    #[error("failed to write workbook for sheet {sheet:?}: {source}")]
    Serialization {
        sheet: String,
        #[source]
        source: XlsxError,
    },
    #[error("output file name `{file_name}` is already taken")]
    DuplicateOutputName { file_name: String },
    #[error("failed to build archive: {0}")]
    Archive(#[from] zip::result::ZipError),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Why a source document could not be read.
#[derive(Debug, Error)]
pub enum FormatError {
    #[error(transparent)]
    Xlsx(#[from] XlsxError),
    #[error(transparent)]
    Xls(#[from] XlsCatalogError),
    #[error("failed to rewrite {part}: {source}")]
    Part {
        part: String,
        #[source]
        source: XlsxError,
    },
    #[error("unrecognized container (neither a ZIP package nor an OLE compound file)")]
    UnrecognizedContainer,
    #[error("legacy `.xls` workbooks can be listed but not split")]
    LegacyExtractionUnsupported,
}

impl Error {
    pub(crate) fn document_format(file_name: &str, source: impl Into<FormatError>) -> Self {
        Error::DocumentFormat {
            file_name: file_name.to_string(),
            source: source.into(),
        }
    }

    pub(crate) fn from_extract(file_name: &str, sheet: &str, err: ExtractError) -> Self {
        match err {
            ExtractError::Load(source) => Error::document_format(file_name, source),
            ExtractError::SheetNotFound { sheet } => Error::SheetNotFound {
                file_name: file_name.to_string(),
                sheet,
            },
            ExtractError::Rewrite { part, source } => {
                Error::document_format(file_name, FormatError::Part { part, source })
            }
            ExtractError::Serialize(source) => Error::Serialization {
                sheet: sheet.to_string(),
                source,
            },
        }
    }

    /// Whether this error makes the whole source unusable (as opposed to one sheet).
    pub fn is_document_format(&self) -> bool {
        matches!(self, Error::DocumentFormat { .. })
    }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
