use std::collections::HashSet;

use quick_xml::events::Event;
use quick_xml::{Reader, Writer};

use crate::package::XlsxError;

pub const REL_TYPE_OFFICE_DOCUMENT: &str =
    "http://schemas.openxmlformats.org/officeDocument/2006/relationships/officeDocument";
pub const REL_TYPE_OFFICE_DOCUMENT_STRICT: &str =
    "http://purl.oclc.org/ooxml/officeDocument/relationships/officeDocument";
pub const REL_TYPE_CALC_CHAIN: &str =
    "http://schemas.openxmlformats.org/officeDocument/2006/relationships/calcChain";
pub const REL_TYPE_CALC_CHAIN_STRICT: &str =
    "http://purl.oclc.org/ooxml/officeDocument/relationships/calcChain";

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Relationship {
    pub id: String,
    pub type_uri: String,
    pub target: String,
    pub target_mode: Option<String>,
}

impl Relationship {
    pub fn is_external(&self) -> bool {
        self.target_mode
            .as_deref()
            .is_some_and(|mode| mode.trim().eq_ignore_ascii_case("External"))
    }

    pub fn is_calc_chain(&self) -> bool {
        self.type_uri == REL_TYPE_CALC_CHAIN || self.type_uri == REL_TYPE_CALC_CHAIN_STRICT
    }

    pub fn is_office_document(&self) -> bool {
        self.type_uri == REL_TYPE_OFFICE_DOCUMENT || self.type_uri == REL_TYPE_OFFICE_DOCUMENT_STRICT
    }
}

pub fn parse_relationships(xml: &[u8]) -> Result<Vec<Relationship>, XlsxError> {
    let mut reader = Reader::from_reader(xml);
    reader.config_mut().trim_text(true);
    let mut buf = Vec::new();
    let mut relationships = Vec::new();

    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Start(start) | Event::Empty(start) => {
                if local_name(start.name().as_ref()).eq_ignore_ascii_case(b"Relationship") {
                    let mut id = None;
                    let mut target = None;
                    let mut type_uri = None;
                    let mut target_mode = None;
                    for attr in start.attributes() {
                        let attr = attr?;
                        let key = local_name(attr.key.as_ref());
                        let value = attr.unescape_value()?.into_owned();
                        if key.eq_ignore_ascii_case(b"Id") {
                            id = Some(value);
                        } else if key.eq_ignore_ascii_case(b"Target") {
                            target = Some(value);
                        } else if key.eq_ignore_ascii_case(b"Type") {
                            type_uri = Some(value);
                        } else if key.eq_ignore_ascii_case(b"TargetMode") {
                            target_mode = Some(value);
                        }
                    }
                    if let (Some(id), Some(target), Some(type_uri)) = (id, target, type_uri) {
                        relationships.push(Relationship {
                            id,
                            target,
                            type_uri,
                            target_mode,
                        });
                    }
                }
            }
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }

    Ok(relationships)
}

/// Rewrite a `.rels` payload without the relationships whose `Id` is in `ids`.
///
/// Everything else (declaration, namespace prefixes, whitespace, unknown attributes) is streamed
/// through unchanged. Returns `Ok(None)` when no relationship matched.
pub fn remove_relationships(xml: &[u8], ids: &HashSet<String>) -> Result<Option<Vec<u8>>, XlsxError> {
    let mut reader = Reader::from_reader(xml);
    reader.config_mut().trim_text(false);
    let mut writer = Writer::new(Vec::with_capacity(xml.len()));
    let mut buf = Vec::new();
    let mut skip_depth = 0usize;
    let mut changed = false;

    loop {
        let event = reader.read_event_into(&mut buf)?;
        if skip_depth > 0 {
            match event {
                Event::Start(_) => skip_depth += 1,
                Event::End(_) => skip_depth -= 1,
                Event::Eof => break,
                _ => {}
            }
            buf.clear();
            continue;
        }

        match event {
            Event::Eof => break,
            Event::Empty(ref e)
                if local_name(e.name().as_ref()).eq_ignore_ascii_case(b"Relationship")
                    && relationship_id_matches(e, ids)? =>
            {
                changed = true;
            }
            Event::Start(ref e)
                if local_name(e.name().as_ref()).eq_ignore_ascii_case(b"Relationship")
                    && relationship_id_matches(e, ids)? =>
            {
                changed = true;
                skip_depth = 1;
            }
            other => writer.write_event(other.into_owned())?,
        }
        buf.clear();
    }

    if changed {
        Ok(Some(writer.into_inner()))
    } else {
        Ok(None)
    }
}

fn relationship_id_matches(
    e: &quick_xml::events::BytesStart<'_>,
    ids: &HashSet<String>,
) -> Result<bool, XlsxError> {
    for attr in e.attributes() {
        let attr = attr?;
        if local_name(attr.key.as_ref()).eq_ignore_ascii_case(b"Id") {
            return Ok(ids.contains(attr.unescape_value()?.as_ref()));
        }
    }
    Ok(false)
}

pub fn local_name(name: &[u8]) -> &[u8] {
    match name.iter().rposition(|b| *b == b':') {
        Some(idx) => &name[idx + 1..],
        None => name,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const RELS: &[u8] = br#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships">
  <Relationship Id="rId1" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/worksheet" Target="worksheets/sheet1.xml"/>
  <Relationship Id="rId2" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/worksheet" Target="worksheets/sheet2.xml"/>
  <Relationship Id="rId3" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/hyperlink" Target="https://example.com" TargetMode="External"/>
</Relationships>"#;

    #[test]
    fn parse_relationships_captures_target_mode() {
        let parsed = parse_relationships(RELS).expect("parse relationships");
        assert_eq!(parsed.len(), 3);
        assert_eq!(parsed[0].id, "rId1");
        assert!(!parsed[0].is_external());
        assert_eq!(parsed[2].target_mode.as_deref(), Some("External"));
        assert!(parsed[2].is_external());
    }

    #[test]
    fn remove_relationships_drops_only_matching_ids() {
        let ids = HashSet::from(["rId2".to_string()]);
        let updated = remove_relationships(RELS, &ids)
            .expect("rewrite")
            .expect("changed");
        let parsed = parse_relationships(&updated).expect("parse rewritten");
        let ids: Vec<&str> = parsed.iter().map(|rel| rel.id.as_str()).collect();
        assert_eq!(ids, vec!["rId1", "rId3"]);

        let text = std::str::from_utf8(&updated).unwrap();
        assert!(text.starts_with("<?xml version=\"1.0\""));
        assert!(!text.contains("sheet2.xml"));
    }

    #[test]
    fn remove_relationships_reports_no_change() {
        let ids = HashSet::from(["rId99".to_string()]);
        assert_eq!(remove_relationships(RELS, &ids).expect("rewrite"), None);
    }

    #[test]
    fn remove_relationships_handles_prefixed_elements() {
        let xml = br#"<pr:Relationships xmlns:pr="http://schemas.openxmlformats.org/package/2006/relationships"><pr:Relationship Id="rId1" Type="t" Target="a.xml"/><pr:Relationship Id="rId2" Type="t" Target="b.xml"></pr:Relationship></pr:Relationships>"#;
        let ids = HashSet::from(["rId2".to_string()]);
        let updated = remove_relationships(xml, &ids).unwrap().unwrap();
        assert_eq!(
            std::str::from_utf8(&updated).unwrap(),
            r#"<pr:Relationships xmlns:pr="http://schemas.openxmlformats.org/package/2006/relationships"><pr:Relationship Id="rId1" Type="t" Target="a.xml"/></pr:Relationships>"#
        );
    }
}
