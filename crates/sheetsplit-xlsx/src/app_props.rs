use quick_xml::events::{BytesEnd, BytesStart, BytesText, Event};
use quick_xml::{Reader, Writer};

use crate::openxml::local_name;
use crate::XlsxError;

const VT_NS: &str = "http://schemas.openxmlformats.org/officeDocument/2006/docPropsVTypes";

/// Which titles must disappear from `docProps/app.xml`.
#[derive(Debug, Clone, Copy)]
pub(crate) struct TitleFilter<'a> {
    pub kept_sheet: &'a str,
    pub removed_sheets: &'a [String],
    pub dropped_names: &'a [String],
}

impl TitleFilter<'_> {
    fn is_removed_sheet(&self, name: &str) -> bool {
        !name.eq_ignore_ascii_case(self.kept_sheet)
            && self.removed_sheets.iter().any(|s| s.eq_ignore_ascii_case(name))
    }

    fn drops(&self, title: &str) -> bool {
        // Sheet names may contain `!`, so the kept sheet is matched before any `Sheet!Name` split.
        if title.eq_ignore_ascii_case(self.kept_sheet) {
            return false;
        }
        if self.is_removed_sheet(title) {
            return true;
        }
        // Sheet-scoped names are listed as `Sheet!Name` (quoted when needed).
        if let Some((sheet, _)) = title.rsplit_once('!') {
            let sheet = sheet
                .strip_prefix('\'')
                .and_then(|s| s.strip_suffix('\''))
                .map(|s| s.replace("''", "'"))
                .unwrap_or_else(|| sheet.to_string());
            return self.is_removed_sheet(&sheet);
        }
        self.dropped_names.iter().any(|n| n.eq_ignore_ascii_case(title))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct HeadingGroup {
    heading: String,
    titles: Vec<String>,
}

/// Rewrite `<HeadingPairs>` and `<TitlesOfParts>` so they only describe what the trimmed
/// workbook still contains. Groups that end up empty are removed.
///
/// Returns `Ok(None)` when the part has no title list or nothing changed. Inconsistent title
/// lists (counts that do not add up) are reported as [`XlsxError::Invalid`].
pub(crate) fn rewrite_app_titles(
    app_xml: &[u8],
    filter: TitleFilter<'_>,
) -> Result<Option<Vec<u8>>, XlsxError> {
    let text = std::str::from_utf8(app_xml)?;
    let doc = roxmltree::Document::parse(text)?;

    let Some(heading_vector) = vector_under(&doc, "HeadingPairs") else {
        return Ok(None);
    };
    let Some(titles_vector) = vector_under(&doc, "TitlesOfParts") else {
        return Ok(None);
    };

    let variants: Vec<roxmltree::Node<'_, '_>> = heading_vector
        .children()
        .filter(|n| n.is_element() && n.tag_name().name() == "variant")
        .collect();
    let titles: Vec<String> = titles_vector
        .children()
        .filter(|n| n.is_element())
        .map(|n| n.text().unwrap_or_default().to_string())
        .collect();

    let mut groups = Vec::new();
    let mut cursor = 0usize;
    for pair in variants.chunks(2) {
        let [heading, count] = pair else {
            return Err(XlsxError::Invalid(
                "docProps/app.xml HeadingPairs has an odd number of variants".to_string(),
            ));
        };
        let heading = variant_value(heading).unwrap_or_default();
        let count: usize = variant_value(count)
            .and_then(|v| v.trim().parse().ok())
            .ok_or_else(|| {
                XlsxError::Invalid(format!("docProps/app.xml heading {heading:?} has no count"))
            })?;
        let end = cursor.checked_add(count).ok_or_else(|| {
            XlsxError::Invalid(format!("docProps/app.xml heading {heading:?} count overflows"))
        })?;
        let Some(slice) = titles.get(cursor..end) else {
            return Err(XlsxError::Invalid(
                "docProps/app.xml heading counts exceed TitlesOfParts".to_string(),
            ));
        };
        groups.push(HeadingGroup {
            heading,
            titles: slice.to_vec(),
        });
        cursor = end;
    }
    if cursor != titles.len() {
        return Err(XlsxError::Invalid(
            "docProps/app.xml heading counts do not cover TitlesOfParts".to_string(),
        ));
    }

    let filtered: Vec<HeadingGroup> = groups
        .iter()
        .map(|group| HeadingGroup {
            heading: group.heading.clone(),
            titles: group
                .titles
                .iter()
                .filter(|title| !filter.drops(title))
                .cloned()
                .collect(),
        })
        .filter(|group| !group.titles.is_empty())
        .collect();
    if filtered == groups {
        return Ok(None);
    }

    let vt = heading_vector
        .lookup_prefix(VT_NS)
        .filter(|prefix| !prefix.is_empty())
        .unwrap_or("vt")
        .to_string();

    write_titles(app_xml, &vt, &filtered).map(Some)
}

fn vector_under<'a, 'input>(
    doc: &'a roxmltree::Document<'input>,
    container: &str,
) -> Option<roxmltree::Node<'a, 'input>> {
    doc.root_element()
        .children()
        .find(|n| n.is_element() && n.tag_name().name() == container)?
        .children()
        .find(|n| n.is_element() && n.tag_name().name() == "vector")
}

fn variant_value(variant: &roxmltree::Node<'_, '_>) -> Option<String> {
    variant
        .children()
        .find(|n| n.is_element())
        .map(|n| n.text().unwrap_or_default().to_string())
}

fn write_titles(app_xml: &[u8], vt: &str, groups: &[HeadingGroup]) -> Result<Vec<u8>, XlsxError> {
    let mut reader = Reader::from_reader(app_xml);
    reader.config_mut().trim_text(false);
    let mut writer = Writer::new(Vec::with_capacity(app_xml.len()));
    let mut buf = Vec::new();
    let mut skip_depth = 0usize;

    loop {
        let event = reader.read_event_into(&mut buf)?;
        if skip_depth > 0 {
            match event {
                Event::Start(_) => skip_depth += 1,
                Event::End(ref e) => {
                    skip_depth -= 1;
                    if skip_depth == 0 {
                        writer.write_event(Event::End(e.to_owned()))?;
                    }
                }
                Event::Eof => break,
                _ => {}
            }
            buf.clear();
            continue;
        }

        match event {
            Event::Eof => break,
            Event::Start(ref e) if local_name(e.name().as_ref()) == b"HeadingPairs" => {
                writer.write_event(Event::Start(e.to_owned()))?;
                write_heading_pairs(&mut writer, vt, groups)?;
                skip_depth = 1;
            }
            Event::Start(ref e) if local_name(e.name().as_ref()) == b"TitlesOfParts" => {
                writer.write_event(Event::Start(e.to_owned()))?;
                write_titles_of_parts(&mut writer, vt, groups)?;
                skip_depth = 1;
            }
            ev => writer.write_event(ev)?,
        }
        buf.clear();
    }

    Ok(writer.into_inner())
}

fn write_heading_pairs(
    writer: &mut Writer<Vec<u8>>,
    vt: &str,
    groups: &[HeadingGroup],
) -> Result<(), XlsxError> {
    let vector = format!("{vt}:vector");
    let variant = format!("{vt}:variant");
    let lpstr = format!("{vt}:lpstr");
    let i4 = format!("{vt}:i4");

    let size = (groups.len() * 2).to_string();
    let mut start = BytesStart::new(vector.as_str());
    start.push_attribute(("size", size.as_str()));
    start.push_attribute(("baseType", "variant"));
    writer.write_event(Event::Start(start))?;
    for group in groups {
        writer.write_event(Event::Start(BytesStart::new(variant.as_str())))?;
        write_text_element(writer, &lpstr, &group.heading)?;
        writer.write_event(Event::End(BytesEnd::new(variant.as_str())))?;

        writer.write_event(Event::Start(BytesStart::new(variant.as_str())))?;
        write_text_element(writer, &i4, &group.titles.len().to_string())?;
        writer.write_event(Event::End(BytesEnd::new(variant.as_str())))?;
    }
    writer.write_event(Event::End(BytesEnd::new(vector.as_str())))?;
    Ok(())
}

fn write_titles_of_parts(
    writer: &mut Writer<Vec<u8>>,
    vt: &str,
    groups: &[HeadingGroup],
) -> Result<(), XlsxError> {
    let vector = format!("{vt}:vector");
    let lpstr = format!("{vt}:lpstr");

    let size = groups.iter().map(|g| g.titles.len()).sum::<usize>().to_string();
    let mut start = BytesStart::new(vector.as_str());
    start.push_attribute(("size", size.as_str()));
    start.push_attribute(("baseType", "lpstr"));
    writer.write_event(Event::Start(start))?;
    for title in groups.iter().flat_map(|g| g.titles.iter()) {
        write_text_element(writer, &lpstr, title)?;
    }
    writer.write_event(Event::End(BytesEnd::new(vector.as_str())))?;
    Ok(())
}

fn write_text_element(
    writer: &mut Writer<Vec<u8>>,
    tag: &str,
    text: &str,
) -> Result<(), XlsxError> {
    writer.write_event(Event::Start(BytesStart::new(tag)))?;
    writer.write_event(Event::Text(BytesText::new(text)))?;
    writer.write_event(Event::End(BytesEnd::new(tag)))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const APP: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Properties xmlns="http://schemas.openxmlformats.org/officeDocument/2006/extended-properties" xmlns:vt="http://schemas.openxmlformats.org/officeDocument/2006/docPropsVTypes"><Application>Microsoft Excel</Application><HeadingPairs><vt:vector size="4" baseType="variant"><vt:variant><vt:lpstr>Worksheets</vt:lpstr></vt:variant><vt:variant><vt:i4>3</vt:i4></vt:variant><vt:variant><vt:lpstr>Named Ranges</vt:lpstr></vt:variant><vt:variant><vt:i4>2</vt:i4></vt:variant></vt:vector></HeadingPairs><TitlesOfParts><vt:vector size="5" baseType="lpstr"><vt:lpstr>nov</vt:lpstr><vt:lpstr>oc &amp; co</vt:lpstr><vt:lpstr>p</vt:lpstr><vt:lpstr>'oc &amp; co'!Print_Area</vt:lpstr><vt:lpstr>Rates</vt:lpstr></vt:vector></TitlesOfParts><AppVersion>16.0300</AppVersion></Properties>"#;

    fn read_titles(xml: &[u8]) -> (Vec<(String, String)>, Vec<String>) {
        let text = std::str::from_utf8(xml).unwrap();
        let doc = roxmltree::Document::parse(text).unwrap();
        let pairs: Vec<String> = vector_under(&doc, "HeadingPairs")
            .unwrap()
            .children()
            .filter(|n| n.is_element())
            .map(|n| variant_value(&n).unwrap())
            .collect();
        let pairs = pairs
            .chunks(2)
            .map(|c| (c[0].clone(), c[1].clone()))
            .collect();
        let titles = vector_under(&doc, "TitlesOfParts")
            .unwrap()
            .children()
            .filter(|n| n.is_element())
            .map(|n| n.text().unwrap_or_default().to_string())
            .collect();
        (pairs, titles)
    }

    #[test]
    fn removes_sheet_titles_and_empty_groups() {
        let removed = vec!["oc & co".to_string(), "p".to_string()];
        let dropped = vec!["Rates".to_string()];
        let out = rewrite_app_titles(
            APP.as_bytes(),
            TitleFilter {
                kept_sheet: "nov",
                removed_sheets: &removed,
                dropped_names: &dropped,
            },
        )
        .unwrap()
        .expect("changed");

        let (pairs, titles) = read_titles(&out);
        assert_eq!(pairs, vec![("Worksheets".to_string(), "1".to_string())]);
        assert_eq!(titles, vec!["nov".to_string()]);

        let text = std::str::from_utf8(&out).unwrap();
        assert!(text.contains(r#"<vt:vector size="2" baseType="variant">"#), "{text}");
        assert!(text.contains(r#"<vt:vector size="1" baseType="lpstr">"#), "{text}");
        assert!(text.contains("<Application>Microsoft Excel</Application>"));
        assert!(text.ends_with("<AppVersion>16.0300</AppVersion></Properties>"));
    }

    #[test]
    fn keeps_names_scoped_to_the_kept_sheet() {
        let removed = vec!["nov".to_string(), "p".to_string()];
        let out = rewrite_app_titles(
            APP.as_bytes(),
            TitleFilter {
                kept_sheet: "oc & co",
                removed_sheets: &removed,
                dropped_names: &[],
            },
        )
        .unwrap()
        .expect("changed");

        let (pairs, titles) = read_titles(&out);
        assert_eq!(
            pairs,
            vec![
                ("Worksheets".to_string(), "1".to_string()),
                ("Named Ranges".to_string(), "2".to_string()),
            ]
        );
        assert_eq!(titles, vec!["oc & co", "'oc & co'!Print_Area", "Rates"]);
    }

    #[test]
    fn unchanged_lists_report_none() {
        let out = rewrite_app_titles(
            APP.as_bytes(),
            TitleFilter {
                kept_sheet: "nov",
                removed_sheets: &[],
                dropped_names: &[],
            },
        )
        .unwrap();
        assert_eq!(out, None);
    }

    #[test]
    fn inconsistent_counts_are_invalid() {
        let broken = APP.replace("<vt:i4>2</vt:i4>", "<vt:i4>7</vt:i4>");
        let err = rewrite_app_titles(
            broken.as_bytes(),
            TitleFilter {
                kept_sheet: "nov",
                removed_sheets: &[],
                dropped_names: &[],
            },
        )
        .unwrap_err();
        assert!(matches!(err, XlsxError::Invalid(_)), "got {err:?}");
    }

    #[test]
    fn oversized_heading_count_is_invalid() {
        let broken = APP.replace("<vt:i4>2</vt:i4>", "<vt:i4>18446744073709551615</vt:i4>");
        let err = rewrite_app_titles(
            broken.as_bytes(),
            TitleFilter {
                kept_sheet: "nov",
                removed_sheets: &[],
                dropped_names: &[],
            },
        )
        .unwrap_err();
        assert!(matches!(err, XlsxError::Invalid(_)), "got {err:?}");
    }

    #[test]
    fn kept_sheet_with_bang_keeps_its_title() {
        let app = r#"<Properties xmlns="http://schemas.openxmlformats.org/officeDocument/2006/extended-properties" xmlns:vt="http://schemas.openxmlformats.org/officeDocument/2006/docPropsVTypes"><HeadingPairs><vt:vector size="2" baseType="variant"><vt:variant><vt:lpstr>Worksheets</vt:lpstr></vt:variant><vt:variant><vt:i4>2</vt:i4></vt:variant></vt:vector></HeadingPairs><TitlesOfParts><vt:vector size="2" baseType="lpstr"><vt:lpstr>x</vt:lpstr><vt:lpstr>x!y</vt:lpstr></vt:vector></TitlesOfParts></Properties>"#;
        let removed = vec!["x".to_string()];
        let out = rewrite_app_titles(
            app.as_bytes(),
            TitleFilter {
                kept_sheet: "x!y",
                removed_sheets: &removed,
                dropped_names: &[],
            },
        )
        .unwrap()
        .expect("changed");

        let (pairs, titles) = read_titles(&out);
        assert_eq!(pairs, vec![("Worksheets".to_string(), "1".to_string())]);
        assert_eq!(titles, vec!["x!y".to_string()]);
    }
}
