use std::collections::{BTreeMap, HashSet};

use quick_xml::events::{BytesStart, Event};
use quick_xml::{Reader, Writer};

use crate::openxml::local_name;
use crate::zip_util::{zip_part_name_lookup_key, zip_part_names_equivalent};
use crate::XlsxError;

const CT_NAME: &str = "[Content_Types].xml";

/// Look up the `<Override>` content type declared for `part_name`.
pub fn override_content_type(ct_xml: &[u8], part_name: &str) -> Result<Option<String>, XlsxError> {
    let wanted = zip_part_name_lookup_key(part_name);
    let mut reader = Reader::from_reader(ct_xml);
    reader.config_mut().trim_text(true);
    let mut buf = Vec::new();

    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Eof => break,
            Event::Start(e) | Event::Empty(e)
                if local_name(e.name().as_ref()).eq_ignore_ascii_case(b"Override") =>
            {
                let mut name = None;
                let mut content_type = None;
                for attr in e.attributes() {
                    let attr = attr?;
                    let key = local_name(attr.key.as_ref());
                    if key.eq_ignore_ascii_case(b"PartName") {
                        name = Some(attr.unescape_value()?.into_owned());
                    } else if key.eq_ignore_ascii_case(b"ContentType") {
                        content_type = Some(attr.unescape_value()?.into_owned());
                    }
                }
                if name.is_some_and(|name| zip_part_name_lookup_key(&name) == wanted) {
                    return Ok(content_type);
                }
            }
            _ => {}
        }
        buf.clear();
    }

    Ok(None)
}

/// Rewrite `[Content_Types].xml` without the `<Override>` entries for `removed` parts.
///
/// `removed` holds part names as stored in the package; override part names are compared with
/// the same separator/case/percent-encoding tolerance used for part lookup. Returns `Ok(None)`
/// when nothing was dropped.
pub fn remove_overrides(
    ct_xml: &[u8],
    removed: &HashSet<String>,
) -> Result<Option<Vec<u8>>, XlsxError> {
    let removed_keys: HashSet<Vec<u8>> = removed
        .iter()
        .map(|name| zip_part_name_lookup_key(name))
        .collect();

    let mut reader = Reader::from_reader(ct_xml);
    reader.config_mut().trim_text(false);
    let mut writer = Writer::new(Vec::with_capacity(ct_xml.len()));
    let mut buf = Vec::new();
    let mut skipping = false;
    let mut changed = false;

    loop {
        let event = reader.read_event_into(&mut buf)?;
        match event {
            Event::Eof => break,
            Event::Start(ref e) if is_override(e) => {
                if override_targets(e, &removed_keys)? {
                    skipping = true;
                    changed = true;
                } else {
                    writer.write_event(Event::Start(e.to_owned()))?;
                }
            }
            Event::Empty(ref e) if is_override(e) => {
                if override_targets(e, &removed_keys)? {
                    changed = true;
                } else {
                    writer.write_event(Event::Empty(e.to_owned()))?;
                }
            }
            Event::End(ref e)
                if skipping && local_name(e.name().as_ref()).eq_ignore_ascii_case(b"Override") =>
            {
                skipping = false;
            }
            ev if skipping => drop(ev),
            ev => writer.write_event(ev.into_owned())?,
        }
        buf.clear();
    }

    if changed {
        Ok(Some(writer.into_inner()))
    } else {
        Ok(None)
    }
}

fn is_override(e: &BytesStart<'_>) -> bool {
    local_name(e.name().as_ref()).eq_ignore_ascii_case(b"Override")
}

fn override_targets(e: &BytesStart<'_>, removed_keys: &HashSet<Vec<u8>>) -> Result<bool, XlsxError> {
    for attr in e.attributes() {
        let attr = attr?;
        if local_name(attr.key.as_ref()).eq_ignore_ascii_case(b"PartName") {
            let value = attr.unescape_value()?;
            return Ok(removed_keys.contains(&zip_part_name_lookup_key(value.as_ref())));
        }
    }
    Ok(false)
}

/// Make sure `[Content_Types].xml` carries a `<Default Extension=ext>` entry.
///
/// Packages without a content types part are left alone; we never synthesize one.
pub(crate) fn ensure_content_types_default(
    parts: &mut BTreeMap<String, Vec<u8>>,
    ext: &str,
    content_type: &str,
) -> Result<(), XlsxError> {
    let Some(ct_key) = parts
        .keys()
        .find(|name| zip_part_names_equivalent(name.as_str(), CT_NAME))
        .cloned()
    else {
        return Ok(());
    };
    let Some(existing) = parts.get(&ct_key) else {
        return Ok(());
    };

    let ext = ext.trim().trim_start_matches('.');
    if ext.is_empty() {
        return Ok(());
    }

    let mut reader = Reader::from_reader(existing.as_slice());
    reader.config_mut().trim_text(false);
    let mut writer = Writer::new(Vec::with_capacity(existing.len() + 128));
    let mut buf = Vec::new();

    let mut default_tag_name: Option<String> = None;
    let mut root_prefix: Option<String> = None;
    let mut found = false;
    let mut changed = false;

    loop {
        let event = reader.read_event_into(&mut buf)?;
        match event {
            Event::Eof => break,
            Event::Start(ref e) if local_name(e.name().as_ref()).eq_ignore_ascii_case(b"Types") => {
                let qname = String::from_utf8_lossy(e.name().as_ref()).into_owned();
                root_prefix = qname.split_once(':').map(|(prefix, _)| prefix.to_string());
                writer.write_event(Event::Start(e.to_owned()))?;
            }
            Event::Start(ref e) | Event::Empty(ref e)
                if local_name(e.name().as_ref()).eq_ignore_ascii_case(b"Default") =>
            {
                if default_tag_name.is_none() {
                    default_tag_name = Some(String::from_utf8_lossy(e.name().as_ref()).into_owned());
                }
                for attr in e.attributes() {
                    let attr = attr?;
                    if local_name(attr.key.as_ref()).eq_ignore_ascii_case(b"Extension")
                        && attr.unescape_value()?.trim().eq_ignore_ascii_case(ext)
                    {
                        found = true;
                    }
                }
                writer.write_event(event.to_owned())?;
            }
            Event::End(ref e) if local_name(e.name().as_ref()).eq_ignore_ascii_case(b"Types") => {
                if !found {
                    let tag = default_tag_name.clone().unwrap_or_else(|| match &root_prefix {
                        Some(prefix) => format!("{prefix}:Default"),
                        None => "Default".to_string(),
                    });
                    let mut default = BytesStart::new(tag.as_str());
                    default.push_attribute(("Extension", ext));
                    default.push_attribute(("ContentType", content_type));
                    writer.write_event(Event::Empty(default))?;
                    found = true;
                    changed = true;
                }
                writer.write_event(Event::End(e.to_owned()))?;
            }
            ev => writer.write_event(ev.into_owned())?,
        }
        buf.clear();
    }

    if changed {
        parts.insert(ct_key, writer.into_inner());
    }
    Ok(())
}
