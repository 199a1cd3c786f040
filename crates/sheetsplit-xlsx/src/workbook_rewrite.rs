use quick_xml::events::attributes::Attribute;
use quick_xml::events::{BytesStart, Event};
use quick_xml::{Reader, Writer};

use crate::defined_names::references_only_removed_sheets;
use crate::openxml::local_name;
use crate::XlsxError;

/// Which `<sheet>` of the workbook survives a rewrite.
#[derive(Debug, Clone, Copy)]
pub(crate) struct KeptSheet<'a> {
    /// Zero-based position in `<sheets>`; also the `localSheetId` space.
    pub index: usize,
    pub name: &'a str,
}

#[derive(Debug, Default)]
pub(crate) struct WorkbookRewrite {
    pub xml: Vec<u8>,
    pub dropped_names: Vec<String>,
}

/// Rewrite the workbook part so it lists only `kept`.
///
/// In one streaming pass this
/// - drops every other `<sheet>` and re-asserts the kept sheet's `name`, removing `state`;
/// - filters `<definedNames>`: names scoped to removed sheets go, names scoped to the kept sheet
///   are re-indexed to `localSheetId="0"`, workbook-scoped names go when every sheet they
///   reference is in `removed_sheets`; an emptied container is removed;
/// - resets `workbookView/@activeTab` and `@firstSheet` to `0`.
///
/// All other markup is streamed through unchanged.
pub(crate) fn rewrite_workbook_for_single_sheet(
    workbook_xml: &[u8],
    kept: KeptSheet<'_>,
    removed_sheets: &[String],
) -> Result<WorkbookRewrite, XlsxError> {
    let is_removed = |name: &str| {
        !name.eq_ignore_ascii_case(kept.name)
            && removed_sheets.iter().any(|r| r.eq_ignore_ascii_case(name))
    };

    let mut reader = Reader::from_reader(workbook_xml);
    reader.config_mut().trim_text(false);
    let mut writer = Writer::new(Vec::with_capacity(workbook_xml.len()));
    let mut buf = Vec::new();

    let mut in_sheets = false;
    let mut sheet_index = 0usize;
    let mut skip_depth = 0usize;

    // `Some` while inside `<definedNames>`: (container start tag, buffered kept children).
    let mut defined_names: Option<(BytesStart<'static>, Vec<Event<'static>>)> = None;
    let mut kept_any_name = false;
    let mut dropped_names = Vec::new();

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

            Event::Start(ref e) if local_name(e.name().as_ref()) == b"sheets" => {
                in_sheets = true;
                writer.write_event(Event::Start(e.to_owned()))?;
            }
            Event::End(ref e) if local_name(e.name().as_ref()) == b"sheets" => {
                in_sheets = false;
                writer.write_event(Event::End(e.to_owned()))?;
            }
            Event::Empty(ref e) if in_sheets && local_name(e.name().as_ref()) == b"sheet" => {
                if sheet_index == kept.index {
                    writer.write_event(Event::Empty(kept_sheet_element(e, kept.name)?))?;
                }
                sheet_index += 1;
            }
            Event::Start(ref e) if in_sheets && local_name(e.name().as_ref()) == b"sheet" => {
                if sheet_index == kept.index {
                    writer.write_event(Event::Start(kept_sheet_element(e, kept.name)?))?;
                } else {
                    skip_depth = 1;
                }
                sheet_index += 1;
            }

            Event::Empty(ref e) if local_name(e.name().as_ref()) == b"workbookView" => {
                writer.write_event(Event::Empty(reset_workbook_view(e)?))?;
            }
            Event::Start(ref e) if local_name(e.name().as_ref()) == b"workbookView" => {
                writer.write_event(Event::Start(reset_workbook_view(e)?))?;
            }

            Event::Start(ref e) if local_name(e.name().as_ref()) == b"definedNames" => {
                defined_names = Some((e.to_owned().into_owned(), Vec::new()));
                kept_any_name = false;
            }
            // An empty container is dropped.
            Event::Empty(ref e) if local_name(e.name().as_ref()) == b"definedNames" => {}
            Event::End(ref e) if local_name(e.name().as_ref()) == b"definedNames" => {
                if let Some((start, children)) = defined_names.take() {
                    if kept_any_name {
                        writer.write_event(Event::Start(start))?;
                        for child in children {
                            writer.write_event(child)?;
                        }
                        writer.write_event(Event::End(e.to_owned()))?;
                    }
                }
            }
            Event::Start(ref e)
                if defined_names.is_some() && local_name(e.name().as_ref()) == b"definedName" =>
            {
                let start = e.to_owned().into_owned();
                let mut inner = Vec::new();
                let mut formula = String::new();
                let mut depth = 1usize;
                let mut inner_buf = Vec::new();
                loop {
                    let ev = reader.read_event_into(&mut inner_buf)?;
                    match &ev {
                        Event::Start(_) => depth += 1,
                        Event::End(_) => depth -= 1,
                        Event::Text(t) => formula.push_str(&t.unescape()?),
                        Event::CData(t) => formula.push_str(&String::from_utf8_lossy(t)),
                        Event::Eof => {
                            return Err(XlsxError::Invalid(
                                "unterminated <definedName> in workbook part".to_string(),
                            ))
                        }
                        _ => {}
                    }
                    inner.push(ev.into_owned());
                    inner_buf.clear();
                    if depth == 0 {
                        break;
                    }
                }

                match filter_defined_name(&start, &formula, kept.index, &is_removed)? {
                    NameDecision::Drop(name) => dropped_names.push(name),
                    NameDecision::Keep(start) => {
                        kept_any_name = true;
                        if let Some((_, children)) = defined_names.as_mut() {
                            children.push(Event::Start(start));
                            children.extend(inner);
                        }
                    }
                }
            }
            Event::Empty(ref e)
                if defined_names.is_some() && local_name(e.name().as_ref()) == b"definedName" =>
            {
                let start = e.to_owned().into_owned();
                match filter_defined_name(&start, "", kept.index, &is_removed)? {
                    NameDecision::Drop(name) => dropped_names.push(name),
                    NameDecision::Keep(start) => {
                        kept_any_name = true;
                        if let Some((_, children)) = defined_names.as_mut() {
                            children.push(Event::Empty(start));
                        }
                    }
                }
            }
            ev => match defined_names.as_mut() {
                Some((_, children)) => children.push(ev.into_owned()),
                None => writer.write_event(ev)?,
            },
        }
        buf.clear();
    }

    Ok(WorkbookRewrite {
        xml: writer.into_inner(),
        dropped_names,
    })
}

fn kept_sheet_element(e: &BytesStart<'_>, name: &str) -> Result<BytesStart<'static>, XlsxError> {
    let qname = String::from_utf8_lossy(e.name().as_ref()).into_owned();
    let mut out = BytesStart::new(qname);
    let mut wrote_name = false;
    for attr in e.attributes() {
        let attr = attr?;
        match attr.key.as_ref() {
            b"state" => {}
            b"name" => {
                out.push_attribute(("name", name));
                wrote_name = true;
            }
            _ => out.push_attribute(attr),
        }
    }
    if !wrote_name {
        out.push_attribute(("name", name));
    }
    Ok(out)
}

fn reset_workbook_view(e: &BytesStart<'_>) -> Result<BytesStart<'static>, XlsxError> {
    let qname = String::from_utf8_lossy(e.name().as_ref()).into_owned();
    let mut out = BytesStart::new(qname);
    for attr in e.attributes() {
        let attr = attr?;
        match attr.key.as_ref() {
            b"activeTab" | b"firstSheet" => out.push_attribute(Attribute {
                key: attr.key,
                value: b"0".as_slice().into(),
            }),
            _ => out.push_attribute(attr),
        }
    }
    Ok(out)
}

enum NameDecision {
    Keep(BytesStart<'static>),
    Drop(String),
}

fn filter_defined_name(
    e: &BytesStart<'_>,
    formula: &str,
    kept_index: usize,
    is_removed: &impl Fn(&str) -> bool,
) -> Result<NameDecision, XlsxError> {
    let mut name = String::new();
    let mut local_sheet_id: Option<String> = None;
    for attr in e.attributes() {
        let attr = attr?;
        match attr.key.as_ref() {
            b"name" => name = attr.unescape_value()?.into_owned(),
            b"localSheetId" => local_sheet_id = Some(attr.unescape_value()?.into_owned()),
            _ => {}
        }
    }

    match local_sheet_id.as_deref().map(|v| v.trim().parse::<usize>()) {
        Some(Ok(id)) if id == kept_index => {
            let qname = String::from_utf8_lossy(e.name().as_ref()).into_owned();
            let mut out = BytesStart::new(qname);
            for attr in e.attributes() {
                let attr = attr?;
                if attr.key.as_ref() == b"localSheetId" {
                    out.push_attribute(("localSheetId", "0"));
                } else {
                    out.push_attribute(attr);
                }
            }
            Ok(NameDecision::Keep(out))
        }
        Some(Ok(_)) => Ok(NameDecision::Drop(name)),
        // An unparseable scope cannot be re-indexed; leave it as written.
        Some(Err(_)) => Ok(NameDecision::Keep(e.to_owned().into_owned())),
        None if references_only_removed_sheets(formula, is_removed) => Ok(NameDecision::Drop(name)),
        None => Ok(NameDecision::Keep(e.to_owned().into_owned())),
    }
}
