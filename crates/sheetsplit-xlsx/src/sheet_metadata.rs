use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;

use crate::openxml::local_name;
use crate::XlsxError;

/// Workbook-level visibility of a sheet tab (`<sheet state="...">`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SheetVisibility {
    #[default]
    Visible,
    Hidden,
    VeryHidden,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkbookSheetInfo {
    pub name: String,
    pub sheet_id: u32,
    pub rel_id: String,
    pub visibility: SheetVisibility,
}

pub fn parse_workbook_sheets(workbook_xml: &str) -> Result<Vec<WorkbookSheetInfo>, XlsxError> {
    let mut reader = Reader::from_str(workbook_xml);
    reader.config_mut().trim_text(true);

    let mut buf = Vec::new();
    let mut sheets = Vec::new();
    let mut in_sheets = false;

    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Eof => break,
            Event::Start(e) if e.local_name().as_ref() == b"sheets" => in_sheets = true,
            Event::End(e) if e.local_name().as_ref() == b"sheets" => in_sheets = false,
            Event::Empty(e) | Event::Start(e)
                if in_sheets && e.local_name().as_ref() == b"sheet" =>
            {
                sheets.push(parse_sheet_element(&e)?);
            }
            _ => {}
        }
        buf.clear();
    }

    Ok(sheets)
}

impl SheetVisibility {
    /// Maps a `state` attribute value; unknown values are treated as visible.
    pub fn from_state(state: &str) -> Self {
        match state {
            "hidden" => SheetVisibility::Hidden,
            "veryHidden" => SheetVisibility::VeryHidden,
            _ => SheetVisibility::Visible,
        }
    }
}

fn parse_sheet_element(e: &BytesStart<'_>) -> Result<WorkbookSheetInfo, XlsxError> {
    let mut info = WorkbookSheetInfo {
        name: String::new(),
        sheet_id: 0,
        rel_id: String::new(),
        visibility: SheetVisibility::Visible,
    };
    let (mut has_name, mut has_sheet_id) = (false, false);

    for attr in e.attributes() {
        let attr = attr?;
        let value = attr.unescape_value()?;
        match attr.key.as_ref() {
            b"name" => {
                info.name = value.into_owned();
                has_name = true;
            }
            b"sheetId" => {
                info.sheet_id = value.trim().parse().map_err(|_| XlsxError::InvalidSheetId)?;
                has_sheet_id = true;
            }
            b"state" => info.visibility = SheetVisibility::from_state(&value),
            // The relationship id is namespaced (`r:id`); a bare `id` is not it.
            key if key.contains(&b':') && local_name(key) == b"id" => {
                info.rel_id = value.into_owned();
            }
            _ => {}
        }
    }

    if !has_name {
        return Err(XlsxError::MissingAttr("name"));
    }
    if !has_sheet_id {
        return Err(XlsxError::MissingAttr("sheetId"));
    }
    if info.rel_id.is_empty() {
        return Err(XlsxError::MissingAttr("r:id"));
    }
    Ok(info)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn parses_sheets_in_document_order() {
        let xml = r#"<workbook xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main" xmlns:r="http://schemas.openxmlformats.org/officeDocument/2006/relationships">
  <sheets>
    <sheet name="Nov" sheetId="3" r:id="rId1"/>
    <sheet name="Oc &amp; Co" sheetId="1" state="hidden" r:id="rId2"/>
    <sheet name="Secret" sheetId="2" state="veryHidden" r:id="rId3"/>
  </sheets>
</workbook>"#;

        let sheets = parse_workbook_sheets(xml).expect("parse");
        assert_eq!(
            sheets,
            vec![
                WorkbookSheetInfo {
                    name: "Nov".to_string(),
                    sheet_id: 3,
                    rel_id: "rId1".to_string(),
                    visibility: SheetVisibility::Visible,
                },
                WorkbookSheetInfo {
                    name: "Oc & Co".to_string(),
                    sheet_id: 1,
                    rel_id: "rId2".to_string(),
                    visibility: SheetVisibility::Hidden,
                },
                WorkbookSheetInfo {
                    name: "Secret".to_string(),
                    sheet_id: 2,
                    rel_id: "rId3".to_string(),
                    visibility: SheetVisibility::VeryHidden,
                },
            ]
        );
    }

    #[test]
    fn ignores_sheet_elements_outside_sheets_list() {
        let xml = r#"<workbook xmlns:r="r"><customSheetViews><sheet name="nope"/></customSheetViews><sheets><sheet name="A" sheetId="1" r:id="rId1"/></sheets></workbook>"#;
        let sheets = parse_workbook_sheets(xml).expect("parse");
        assert_eq!(sheets.len(), 1);
        assert_eq!(sheets[0].name, "A");
    }

    #[test]
    fn missing_name_is_an_error() {
        let xml = r#"<workbook xmlns:r="r"><sheets><sheet sheetId="1" r:id="rId1"/></sheets></workbook>"#;
        let err = parse_workbook_sheets(xml).unwrap_err();
        assert!(matches!(err, XlsxError::MissingAttr("name")), "got {err:?}");
    }

    #[test]
    fn invalid_sheet_id_is_an_error() {
        let xml = r#"<workbook xmlns:r="r"><sheets><sheet name="A" sheetId="x" r:id="rId1"/></sheets></workbook>"#;
        let err = parse_workbook_sheets(xml).unwrap_err();
        assert!(matches!(err, XlsxError::InvalidSheetId), "got {err:?}");
    }

    #[test]
    fn relationship_id_must_be_namespaced() {
        let xml = r#"<workbook xmlns:r="r"><sheets><sheet name="A" sheetId=" 4 " id="rId1"/></sheets></workbook>"#;
        let err = parse_workbook_sheets(xml).unwrap_err();
        assert!(matches!(err, XlsxError::MissingAttr("r:id")), "got {err:?}");

        let xml = r#"<workbook xmlns:rel="r"><sheets><sheet name="A" sheetId=" 4 " rel:id="rId9" state="bogus"/></sheets></workbook>"#;
        let sheets = parse_workbook_sheets(xml).expect("parse");
        assert_eq!(sheets[0].rel_id, "rId9");
        assert_eq!(sheets[0].sheet_id, 4);
        assert_eq!(sheets[0].visibility, SheetVisibility::Visible);
    }
}
