use std::collections::{BTreeSet, HashSet};

use thiserror::Error;

use crate::app_props::{rewrite_app_titles, TitleFilter};
use crate::content_types::remove_overrides;
use crate::openxml::remove_relationships;
use crate::opc_graph::{reachable_parts, PACKAGE_ROOT};
use crate::package::CONTENT_TYPES_PART;
use crate::path::{rels_for_part, resolve_target};
use crate::workbook_rewrite::{rewrite_workbook_for_single_sheet, KeptSheet};
use crate::{WorkbookKind, XlsxError, XlsxPackage, XlsxPackageLimits};

const APP_PROPS_PART: &str = "docProps/app.xml";

#[derive(Debug, Error)]
pub enum ExtractError {
    /// The source bytes are not a readable workbook package.
    #[error("failed to read workbook package: {0}")]
    Load(#[source] XlsxError),
    #[error("sheet {sheet:?} not found in workbook")]
    SheetNotFound { sheet: String },
    #[error("failed to rewrite {part}: {source}")]
    Rewrite {
        part: String,
        #[source]
        source: XlsxError,
    },
    /// The trimmed package could not be re-encoded as a ZIP container.
    #[error("failed to serialize workbook package: {0}")]
    Serialize(#[source] XlsxError),
}

/// What [`XlsxPackage::retain_sheet`] removed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RetainSummary {
    pub kept_sheet: String,
    pub removed_sheets: Vec<String>,
    /// Stored names of every deleted part, sorted.
    pub removed_parts: Vec<String>,
    pub dropped_defined_names: Vec<String>,
}

/// A single-sheet workbook produced by [`extract_sheet`].
#[derive(Debug, Clone)]
pub struct ExtractedWorkbook {
    pub bytes: Vec<u8>,
    pub kind: WorkbookKind,
    pub summary: RetainSummary,
}

impl XlsxPackage {
    /// Trim the package down to the first sheet named `sheet`.
    ///
    /// Every other sheet is removed together with its workbook relationship and every part
    /// reachable only through it. Parts still reachable from the package root after the
    /// workbook relationships are pruned are left untouched, which keeps `styles.xml`,
    /// `sharedStrings.xml`, the theme and the kept sheet's drawings byte-for-byte identical.
    pub fn retain_sheet(&mut self, sheet: &str) -> Result<RetainSummary, ExtractError> {
        let sheets = self.sheet_parts().map_err(ExtractError::Load)?;
        let Some(kept_index) = sheets.iter().position(|s| s.name == sheet) else {
            return Err(ExtractError::SheetNotFound {
                sheet: sheet.to_string(),
            });
        };
        let kept = &sheets[kept_index];

        let workbook_part = self.workbook_part_name();
        let workbook_rels_part = rels_for_part(&workbook_part);

        let removed_sheets: Vec<String> = sheets
            .iter()
            .enumerate()
            .filter(|(idx, _)| *idx != kept_index)
            .map(|(_, s)| s.name.clone())
            .collect();

        // Workbook relationships to cut: removed sheets plus the calc chain, which indexes
        // cells across every sheet.
        let mut removed_rel_ids: HashSet<String> = sheets
            .iter()
            .enumerate()
            .filter(|(idx, s)| *idx != kept_index && s.rel_id != kept.rel_id)
            .map(|(_, s)| s.rel_id.clone())
            .collect();
        let mut removed_roots: Vec<String> = sheets
            .iter()
            .enumerate()
            .filter(|(idx, s)| *idx != kept_index && s.sheet_part != kept.sheet_part)
            .filter_map(|(_, s)| s.sheet_part.clone())
            .collect();
        let workbook_rels = self
            .relationships_of(&workbook_part)
            .map_err(|source| ExtractError::Rewrite {
                part: workbook_rels_part.clone(),
                source,
            })?;
        for rel in workbook_rels.iter().filter(|rel| rel.is_calc_chain()) {
            removed_rel_ids.insert(rel.id.clone());
            if !rel.is_external() {
                removed_roots.push(resolve_target(&workbook_part, &rel.target));
            }
        }

        let workbook_xml = self
            .part(&workbook_part)
            .ok_or_else(|| ExtractError::Load(XlsxError::MissingPart(workbook_part.clone())))?;
        let rewrite = rewrite_workbook_for_single_sheet(
            workbook_xml,
            KeptSheet {
                index: kept_index,
                name: &kept.name,
            },
            &removed_sheets,
        )
        .map_err(|source| ExtractError::Rewrite {
            part: workbook_part.clone(),
            source,
        })?;
        self.set_part(workbook_part.clone(), rewrite.xml);
        for name in &rewrite.dropped_names {
            log::debug!("dropped defined name {name:?}");
        }

        if let Some(rels_xml) = self.part(&workbook_rels_part) {
            let updated = remove_relationships(rels_xml, &removed_rel_ids).map_err(|source| {
                ExtractError::Rewrite {
                    part: workbook_rels_part.clone(),
                    source,
                }
            })?;
            if let Some(updated) = updated {
                self.set_part(workbook_rels_part.clone(), updated);
            }
        }

        let kept_closure = reachable_parts(self, [PACKAGE_ROOT.to_string()]);
        let removed_parts: BTreeSet<String> = reachable_parts(self, removed_roots)
            .into_iter()
            .filter(|part| !kept_closure.contains(part))
            .collect();
        for part in &removed_parts {
            log::debug!("removing part {part}");
            self.remove_part(part);
        }

        let removed_set: HashSet<String> = removed_parts.iter().cloned().collect();
        if let Some(ct_xml) = self.part(CONTENT_TYPES_PART) {
            let updated = remove_overrides(ct_xml, &removed_set).map_err(|source| {
                ExtractError::Rewrite {
                    part: CONTENT_TYPES_PART.to_string(),
                    source,
                }
            })?;
            if let Some(updated) = updated {
                self.set_part(CONTENT_TYPES_PART, updated);
            }
        }

        if let Some(app_xml) = self.part(APP_PROPS_PART) {
            let filter = TitleFilter {
                kept_sheet: &kept.name,
                removed_sheets: &removed_sheets,
                dropped_names: &rewrite.dropped_names,
            };
            match rewrite_app_titles(app_xml, filter) {
                Ok(Some(updated)) => self.set_part(APP_PROPS_PART, updated),
                Ok(None) => {}
                Err(err) => log::warn!("leaving {APP_PROPS_PART} unchanged: {err}"),
            }
        }

        Ok(RetainSummary {
            kept_sheet: kept.name.clone(),
            removed_sheets,
            removed_parts: removed_parts.into_iter().collect(),
            dropped_defined_names: rewrite.dropped_names,
        })
    }
}

/// Produce a standalone workbook containing only `sheet`.
///
/// Pure function of its inputs: the source bytes are only read, and each call loads its own
/// package.
pub fn extract_sheet(
    bytes: &[u8],
    sheet: &str,
    limits: XlsxPackageLimits,
) -> Result<ExtractedWorkbook, ExtractError> {
    let mut pkg = XlsxPackage::from_bytes_limited(bytes, limits).map_err(ExtractError::Load)?;
    let summary = pkg.retain_sheet(sheet)?;
    let kind = pkg.workbook_kind();
    let bytes = pkg.write_to_bytes().map_err(ExtractError::Serialize)?;
    log::debug!(
        "extracted sheet {sheet:?}: removed {} sheet(s), {} part(s)",
        summary.removed_sheets.len(),
        summary.removed_parts.len()
    );
    Ok(ExtractedWorkbook {
        bytes,
        kind,
        summary,
    })
}
