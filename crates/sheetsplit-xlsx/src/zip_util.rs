use std::io::{Read, Seek};

use zip::ZipArchive;

use crate::XlsxError;

/// Percent-decode, strip leading separators, normalize `\` to `/` and ASCII-lowercase a part name.
///
/// Producers disagree on how ZIP entry names relate to relationship targets (leading `/`,
/// Windows separators, case, `%20` vs literal spaces). Comparing lookup keys tolerates all of
/// them while the package keeps the original entry names for round-tripping.
pub(crate) fn zip_part_name_lookup_key(name: &str) -> Vec<u8> {
    fn hex_val(b: u8) -> Option<u8> {
        match b {
            b'0'..=b'9' => Some(b - b'0'),
            b'a'..=b'f' => Some(b - b'a' + 10),
            b'A'..=b'F' => Some(b - b'A' + 10),
            _ => None,
        }
    }

    let mut bytes = name.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut in_leading_separators = true;
    while let Some(&b) = bytes.first() {
        let decoded = match (b, bytes.get(1), bytes.get(2)) {
            (b'%', Some(&hi), Some(&lo)) => match (hex_val(hi), hex_val(lo)) {
                (Some(hi), Some(lo)) => {
                    bytes = &bytes[3..];
                    (hi << 4) | lo
                }
                _ => {
                    bytes = &bytes[1..];
                    b
                }
            },
            _ => {
                bytes = &bytes[1..];
                b
            }
        };

        // Skip any number of leading `/` or `\` separators, even when percent-encoded.
        if in_leading_separators && matches!(decoded, b'/' | b'\\') {
            continue;
        }
        in_leading_separators = false;

        out.push(if decoded == b'\\' {
            b'/'
        } else {
            decoded.to_ascii_lowercase()
        });
    }
    out
}

pub(crate) fn zip_part_names_equivalent(a: &str, b: &str) -> bool {
    a == b || zip_part_name_lookup_key(a) == zip_part_name_lookup_key(b)
}

/// Find the archive index for `name`, preferring an exact entry-name match over a
/// leading-slash variant over any other equivalent spelling.
pub(crate) fn find_zip_part<R: Read + Seek>(archive: &ZipArchive<R>, name: &str) -> Option<usize> {
    fn is_alt_slash_variant(entry: &str, name: &str) -> bool {
        if let Some(stripped) = name.strip_prefix('/') {
            entry == stripped
        } else {
            entry.strip_prefix('/').is_some_and(|rest| rest == name)
        }
    }

    let mut best: Option<(&str, u8)> = None;
    for entry in archive.file_names() {
        let score = if entry == name {
            3
        } else if is_alt_slash_variant(entry, name) {
            2
        } else if zip_part_names_equivalent(entry, name) {
            1
        } else {
            0
        };
        if score > best.map_or(0, |(_, best_score)| best_score) {
            best = Some((entry, score));
            if score == 3 {
                break;
            }
        }
    }

    best.and_then(|(entry, _)| archive.index_for_name(entry))
}

#[derive(Debug, Clone)]
pub(crate) struct ZipInflateBudget {
    max_total_bytes: u64,
    used_bytes: u64,
}

impl ZipInflateBudget {
    pub(crate) fn new(max_total_bytes: u64) -> Self {
        Self {
            max_total_bytes,
            used_bytes: 0,
        }
    }

    fn remaining_bytes(&self) -> u64 {
        self.max_total_bytes.saturating_sub(self.used_bytes)
    }

    fn consume(&mut self, bytes: u64) -> Result<(), XlsxError> {
        self.used_bytes = self.used_bytes.saturating_add(bytes);
        if self.used_bytes > self.max_total_bytes {
            return Err(XlsxError::PackageTooLarge {
                total: self.used_bytes,
                max: self.max_total_bytes,
            });
        }
        Ok(())
    }
}

/// Read a ZIP entry into memory with an uncompressed size limit.
///
/// The declared size is only a fast-path rejection; the read itself is capped at `max + 1`
/// bytes so forged size fields cannot force an unbounded allocation.
pub(crate) fn read_entry_with_limit(
    entry: impl Read,
    declared_size: u64,
    part: &str,
    max_part_bytes: u64,
    budget: Option<&mut ZipInflateBudget>,
) -> Result<Vec<u8>, XlsxError> {
    let remaining_total = budget
        .as_ref()
        .map(|b| b.remaining_bytes())
        .unwrap_or(u64::MAX);

    if declared_size > max_part_bytes {
        return Err(XlsxError::PartTooLarge {
            part: part.to_string(),
            size: declared_size,
            max: max_part_bytes,
        });
    }

    let effective_max = max_part_bytes.min(remaining_total);
    let mut buf = Vec::new();
    entry
        .take(effective_max.saturating_add(1))
        .read_to_end(&mut buf)?;

    let observed = buf.len() as u64;
    match budget {
        Some(budget) => {
            if observed > max_part_bytes {
                return Err(XlsxError::PartTooLarge {
                    part: part.to_string(),
                    size: observed,
                    max: max_part_bytes,
                });
            }
            budget.consume(observed)?;
        }
        None if observed > effective_max => {
            return Err(XlsxError::PartTooLarge {
                part: part.to_string(),
                size: observed,
                max: max_part_bytes,
            });
        }
        None => {}
    }

    Ok(buf)
}

/// Read a ZIP part by name, returning `Ok(None)` when the entry does not exist.
pub(crate) fn read_zip_part_optional_with_limit<R: Read + Seek>(
    archive: &mut ZipArchive<R>,
    name: &str,
    max_part_bytes: u64,
) -> Result<Option<Vec<u8>>, XlsxError> {
    let Some(idx) = find_zip_part(archive, name) else {
        return Ok(None);
    };
    let file = archive.by_index(idx)?;
    if file.is_dir() {
        return Ok(None);
    }
    let declared = file.size();
    read_entry_with_limit(file, declared, name, max_part_bytes, None).map(Some)
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::io::{Cursor, Write};

    use zip::write::FileOptions;
    use zip::ZipWriter;

    fn build_zip(entries: &[(&str, &[u8])]) -> Vec<u8> {
        let cursor = Cursor::new(Vec::new());
        let mut zip = ZipWriter::new(cursor);
        let options =
            FileOptions::<()>::default().compression_method(zip::CompressionMethod::Deflated);
        for (name, bytes) in entries {
            zip.start_file(*name, options).unwrap();
            zip.write_all(bytes).unwrap();
        }
        zip.finish().unwrap().into_inner()
    }

    #[test]
    fn equivalent_handles_case_separators_and_leading_slashes() {
        assert!(zip_part_names_equivalent("XL\\Workbook.xml", "xl/workbook.xml"));
        assert!(zip_part_names_equivalent("/xl/workbook.xml", "xl/workbook.xml"));
        assert!(zip_part_names_equivalent("\\xl\\workbook.xml", "xl/workbook.xml"));
        assert!(!zip_part_names_equivalent("xl/workbook2.xml", "xl/workbook.xml"));
    }

    #[test]
    fn equivalent_handles_percent_encoded_names() {
        assert!(zip_part_names_equivalent(
            "xl/worksheets/sheet 1.xml",
            "xl/worksheets/sheet%201.xml"
        ));
        assert!(zip_part_names_equivalent(
            "xl/worksheets/sheet1.xml",
            "%2Fxl%2Fworksheets%2Fsheet1.xml"
        ));
    }

    #[test]
    fn read_part_within_limit() {
        let bytes = build_zip(&[("a.txt", b"hello world")]);
        let mut archive = ZipArchive::new(Cursor::new(bytes)).unwrap();

        let part = read_zip_part_optional_with_limit(&mut archive, "a.txt", 11)
            .unwrap()
            .unwrap();
        assert_eq!(part, b"hello world");
    }

    #[test]
    fn read_part_errors_when_too_large() {
        let bytes = build_zip(&[("a.txt", b"hello world")]);
        let mut archive = ZipArchive::new(Cursor::new(bytes)).unwrap();

        let err = read_zip_part_optional_with_limit(&mut archive, "a.txt", 10).unwrap_err();
        match err {
            XlsxError::PartTooLarge { part, .. } => assert_eq!(part, "a.txt"),
            other => panic!("expected PartTooLarge, got {other:?}"),
        }
    }

    #[test]
    fn read_part_missing_entry_is_none() {
        let bytes = build_zip(&[("a.txt", b"hello")]);
        let mut archive = ZipArchive::new(Cursor::new(bytes)).unwrap();
        assert_eq!(
            read_zip_part_optional_with_limit(&mut archive, "b.txt", 100).unwrap(),
            None
        );
    }

    #[test]
    fn find_part_prefers_exact_over_equivalent() {
        let bytes = build_zip(&[
            ("XL\\Workbook.xml", b"equivalent"),
            ("xl/workbook.xml", b"exact"),
        ]);
        let mut archive = ZipArchive::new(Cursor::new(bytes)).unwrap();
        let part = read_zip_part_optional_with_limit(&mut archive, "xl/workbook.xml", 100)
            .unwrap()
            .unwrap();
        assert_eq!(part, b"exact");
    }

    #[test]
    fn find_part_handles_leading_slash_variant() {
        let bytes = build_zip(&[("/xl/workbook.xml", b"with_slash")]);
        let mut archive = ZipArchive::new(Cursor::new(bytes)).unwrap();
        let part = read_zip_part_optional_with_limit(&mut archive, "xl/workbook.xml", 100)
            .unwrap()
            .unwrap();
        assert_eq!(part, b"with_slash");
    }
}
