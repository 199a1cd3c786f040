use std::borrow::Cow;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use serde::Serialize;
use sheetsplit_xlsx::XlsxPackageLimits;

use crate::archive::{archive_file_name, build_archive, ARCHIVE_MIME};
use crate::error::{Error, Result};
use crate::output::{CollisionPolicy, OutputFile, OutputSet};
use crate::sanitize::output_file_name;
use crate::source::{extract_sheet, read_sheet_catalog_limited, SheetCatalog, SourceDocument};

/// What a batch does after a sheet fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum ErrorPolicy {
    /// Stop at the first failing sheet.
    #[default]
    AbortBatch,
    /// Record the failure and continue with the next sheet.
    SkipSheet,
}

/// Batch settings for [`SplitSession::split`].
#[derive(Debug, Clone, Default)]
pub struct SplitOptions {
    pub collision: CollisionPolicy,
    pub on_error: ErrorPolicy,
    pub limits: XlsxPackageLimits,
    /// Only split these sheets. Processing still follows catalog order.
    pub sheets: Option<Vec<String>>,
    /// Checked between sheets; setting it stops the batch before the next sheet starts.
    pub cancel: Option<Arc<AtomicBool>>,
}

impl SplitOptions {
    fn is_cancelled(&self) -> bool {
        self.cancel
            .as_ref()
            .is_some_and(|flag| flag.load(Ordering::Relaxed))
    }
}

/// Reported after each processed sheet.
#[derive(Debug, Clone, Copy)]
pub struct SplitProgress<'a> {
    /// Number of sheets processed so far, this one included.
    pub index: usize,
    pub total: usize,
    pub sheet: &'a str,
    /// Stored output name; `None` when the sheet failed.
    pub file_name: Option<&'a str>,
}

#[derive(Debug)]
pub struct SheetFailure {
    pub sheet: String,
    pub error: Error,
}

/// Outcome of one batch.
#[derive(Debug, Default)]
pub struct SplitReport {
    pub outputs: OutputSet,
    pub failures: Vec<SheetFailure>,
    /// The cancellation flag stopped the batch early.
    pub cancelled: bool,
}

impl SplitReport {
    pub fn is_complete(&self) -> bool {
        self.failures.is_empty() && !self.cancelled
    }

    /// The produced outputs, or the first failure.
    pub fn into_result(mut self) -> Result<OutputSet> {
        if self.failures.is_empty() {
            Ok(self.outputs)
        } else {
            Err(self.failures.remove(0).error)
        }
    }
}

/// A downloadable item: one split workbook or the combined archive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Artifact<'a> {
    pub file_name: Cow<'a, str>,
    pub bytes: Cow<'a, [u8]>,
    pub mime_type: &'static str,
}

/// Split `source` sheet by sheet according to `options`.
///
/// Sheets are processed sequentially in catalog order; each extraction reads the shared source
/// bytes independently. Outputs produced before a failure stay in the report.
pub fn split_document(
    source: &SourceDocument,
    catalog: &SheetCatalog,
    options: &SplitOptions,
    mut progress: impl FnMut(SplitProgress<'_>),
) -> SplitReport {
    let mut report = SplitReport::default();

    let plan: Vec<&str> = match &options.sheets {
        None => catalog.iter().collect(),
        Some(selected) => {
            for sheet in selected.iter().filter(|sheet| !catalog.contains(sheet)) {
                log::warn!("sheet {sheet:?} not found in {}", source.file_name());
                report.failures.push(SheetFailure {
                    sheet: sheet.clone(),
                    error: Error::SheetNotFound {
                        file_name: source.file_name().to_string(),
                        sheet: sheet.clone(),
                    },
                });
            }
            if !report.failures.is_empty() && options.on_error == ErrorPolicy::AbortBatch {
                return report;
            }
            catalog
                .iter()
                .filter(|name| selected.iter().any(|s| s.as_str() == *name))
                .collect()
        }
    };

    let total = plan.len();
    for (idx, sheet) in plan.into_iter().enumerate() {
        if options.is_cancelled() {
            log::info!("split cancelled after {idx} of {total} sheet(s)");
            report.cancelled = true;
            break;
        }

        let stored = extract_sheet(source, sheet, options.limits).and_then(|extracted| {
            let file = OutputFile {
                file_name: output_file_name(sheet, extracted.kind.extension()),
                sheet: sheet.to_string(),
                bytes: extracted.bytes,
                mime_type: extracted.kind.package_mime_type(),
            };
            report
                .outputs
                .insert(file, options.collision)
                .map(|stored| stored.file_name.clone())
        });

        match stored {
            Ok(file_name) => {
                log::debug!("sheet {sheet:?} -> {file_name}");
                progress(SplitProgress {
                    index: idx + 1,
                    total,
                    sheet,
                    file_name: Some(file_name.as_str()),
                });
            }
            Err(error) => {
                log::warn!("failed to split sheet {sheet:?}: {error}");
                progress(SplitProgress {
                    index: idx + 1,
                    total,
                    sheet,
                    file_name: None,
                });
                // A source that cannot be read fails every remaining sheet the same way.
                let stop = options.on_error == ErrorPolicy::AbortBatch || error.is_document_format();
                report.failures.push(SheetFailure {
                    sheet: sheet.to_string(),
                    error,
                });
                if stop {
                    break;
                }
            }
        }
    }

    report
}

/// Caller-owned state for one uploaded workbook: the source bytes, its sheet catalog and the
/// outputs of the latest split.
#[derive(Debug)]
pub struct SplitSession {
    source: SourceDocument,
    catalog: SheetCatalog,
    report: SplitReport,
}

impl SplitSession {
    /// Accept an upload. The sheet catalog is read immediately so unreadable documents are
    /// rejected before any sheet is processed.
    pub fn open(file_name: impl Into<String>, bytes: impl Into<Arc<[u8]>>) -> Result<Self> {
        Self::open_with_limits(file_name, bytes, XlsxPackageLimits::default())
    }

    pub fn open_with_limits(
        file_name: impl Into<String>,
        bytes: impl Into<Arc<[u8]>>,
        limits: XlsxPackageLimits,
    ) -> Result<Self> {
        let source = SourceDocument::new(file_name, bytes)?;
        let catalog = read_sheet_catalog_limited(&source, limits)?;
        log::info!(
            "loaded {} with {} sheet(s)",
            source.file_name(),
            catalog.len()
        );
        Ok(Self {
            source,
            catalog,
            report: SplitReport::default(),
        })
    }

    pub fn source(&self) -> &SourceDocument {
        &self.source
    }

    pub fn catalog(&self) -> &SheetCatalog {
        &self.catalog
    }

    pub fn sheet_names(&self) -> &[String] {
        self.catalog.names()
    }

    pub fn split(&mut self, options: &SplitOptions) -> &SplitReport {
        self.split_with_progress(options, |_| {})
    }

    /// Run a batch, replacing the outputs of any previous one.
    pub fn split_with_progress(
        &mut self,
        options: &SplitOptions,
        progress: impl FnMut(SplitProgress<'_>),
    ) -> &SplitReport {
        self.report = split_document(&self.source, &self.catalog, options, progress);
        &self.report
    }

    pub fn report(&self) -> &SplitReport {
        &self.report
    }

    pub fn outputs(&self) -> &OutputSet {
        &self.report.outputs
    }

    pub fn archive_file_name(&self) -> String {
        archive_file_name(self.source.stem())
    }

    /// Combined archive of the current outputs; `None` until something was produced.
    pub fn archive(&self) -> Result<Option<Artifact<'static>>> {
        if self.report.outputs.is_empty() {
            return Ok(None);
        }
        let bytes = build_archive(&self.report.outputs)?;
        Ok(Some(Artifact {
            file_name: Cow::Owned(self.archive_file_name()),
            bytes: Cow::Owned(bytes),
            mime_type: ARCHIVE_MIME,
        }))
    }

    /// One artifact per output file, in output order.
    pub fn artifacts(&self) -> Vec<Artifact<'_>> {
        self.report
            .outputs
            .iter()
            .map(|file| Artifact {
                file_name: Cow::Borrowed(file.file_name.as_str()),
                bytes: Cow::Borrowed(file.bytes.as_slice()),
                mime_type: file.mime_type,
            })
            .collect()
    }

    /// Drop produced outputs; the source and its catalog stay available.
    pub fn reset(&mut self) {
        self.report = SplitReport::default();
    }
}
