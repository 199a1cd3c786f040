use std::collections::{BTreeSet, HashSet, VecDeque};

use crate::openxml::parse_relationships;
use crate::path::{rels_for_part, resolve_target};
use crate::XlsxPackage;

/// Package root as a traversal start: its relationships live in `_rels/.rels`.
pub(crate) const PACKAGE_ROOT: &str = "";

/// Collect the stored names of every part reachable from `root_parts` via `.rels` files.
///
/// The closure includes each root part that exists, its `.rels` part, and all internal
/// relationship targets present in the package, recursively. [`PACKAGE_ROOT`] starts from
/// `_rels/.rels`. Missing `.rels` parts, malformed `.rels` XML and `TargetMode="External"`
/// relationships are ignored.
pub(crate) fn reachable_parts(
    pkg: &XlsxPackage,
    root_parts: impl IntoIterator<Item = String>,
) -> BTreeSet<String> {
    let mut out = BTreeSet::new();
    let mut visited: HashSet<String> = HashSet::new();
    let mut queue: VecDeque<String> = root_parts.into_iter().collect();

    while let Some(part_name) = queue.pop_front() {
        if !visited.insert(part_name.clone()) {
            continue;
        }

        // Every non-root part is tracked under its stored entry name.
        if part_name != PACKAGE_ROOT {
            let Some(stored) = pkg.resolve_part_name(&part_name) else {
                continue;
            };
            out.insert(stored.to_string());
        }

        let rels_part_name = if part_name == PACKAGE_ROOT {
            "_rels/.rels".to_string()
        } else {
            rels_for_part(&part_name)
        };
        let Some(rels_stored) = pkg.resolve_part_name(&rels_part_name) else {
            continue;
        };
        out.insert(rels_stored.to_string());
        let Some(rels_bytes) = pkg.part(rels_stored) else {
            continue;
        };

        let Ok(relationships) = parse_relationships(rels_bytes) else {
            log::debug!("ignoring malformed relationships part {rels_stored}");
            continue;
        };

        for rel in relationships {
            if rel.is_external() {
                continue;
            }
            let target_part = resolve_target(&part_name, &rel.target);
            if let Some(stored) = pkg.resolve_part_name(&target_part) {
                queue.push_back(stored.to_string());
            }
        }
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::build_package;

    use pretty_assertions::assert_eq;

    fn load(entries: &[(&str, &[u8])]) -> XlsxPackage {
        XlsxPackage::from_bytes(&build_package(entries)).expect("read test pkg")
    }

    fn set(names: &[&str]) -> BTreeSet<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn external_relationship_is_ignored() {
        let rels = br#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships">
  <Relationship Id="rId1" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/hyperlink" Target="https://example.com" TargetMode="External"/>
</Relationships>"#;

        let pkg = load(&[
            ("xl/worksheets/sheet1.xml", br#"<worksheet/>"#),
            ("xl/worksheets/_rels/sheet1.xml.rels", rels),
        ]);

        assert_eq!(
            reachable_parts(&pkg, ["xl/worksheets/sheet1.xml".to_string()]),
            set(&["xl/worksheets/sheet1.xml", "xl/worksheets/_rels/sheet1.xml.rels"])
        );
    }

    #[test]
    fn follows_drawings_to_charts_and_media() {
        let sheet_rels = br#"<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships"><Relationship Id="rId1" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/drawing" Target="../drawings/drawing1.xml"/></Relationships>"#;
        let drawing_rels = br#"<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships"><Relationship Id="rId1" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/image" Target="../media/image1.png"/><Relationship Id="rId2" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/chart" Target="/xl/charts/chart1.xml"/><Relationship Id="rId3" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/image" Target="../media/missing.png"/></Relationships>"#;

        let pkg = load(&[
            ("xl/worksheets/sheet1.xml", b"<worksheet/>"),
            ("xl/worksheets/_rels/sheet1.xml.rels", sheet_rels),
            ("xl/drawings/drawing1.xml", b"<wsDr/>"),
            ("xl/drawings/_rels/drawing1.xml.rels", drawing_rels),
            ("xl/media/image1.png", b"png"),
            ("xl/charts/chart1.xml", b"<chartSpace/>"),
            ("xl/media/unrelated.png", b"png"),
        ]);

        assert_eq!(
            reachable_parts(&pkg, ["xl/worksheets/sheet1.xml".to_string()]),
            set(&[
                "xl/charts/chart1.xml",
                "xl/drawings/_rels/drawing1.xml.rels",
                "xl/drawings/drawing1.xml",
                "xl/media/image1.png",
                "xl/worksheets/_rels/sheet1.xml.rels",
                "xl/worksheets/sheet1.xml",
            ])
        );
    }

    #[test]
    fn package_root_starts_from_root_rels() {
        let root_rels = br#"<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships"><Relationship Id="rId1" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/officeDocument" Target="xl/workbook.xml"/><Relationship Id="rId2" Type="http://schemas.openxmlformats.org/package/2006/relationships/metadata/core-properties" Target="docProps/core.xml"/></Relationships>"#;
        let pkg = load(&[
            ("_rels/.rels", root_rels),
            ("xl/workbook.xml", b"<workbook/>"),
            ("docProps/core.xml", b"<coreProperties/>"),
        ]);

        assert_eq!(
            reachable_parts(&pkg, [PACKAGE_ROOT.to_string()]),
            set(&["_rels/.rels", "docProps/core.xml", "xl/workbook.xml"])
        );
    }

    #[test]
    fn cycles_terminate() {
        let a_rels = br#"<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships"><Relationship Id="rId1" Type="t" Target="b.xml"/></Relationships>"#;
        let b_rels = br#"<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships"><Relationship Id="rId1" Type="t" Target="a.xml"/></Relationships>"#;
        let pkg = load(&[
            ("xl/a.xml", b"a"),
            ("xl/_rels/a.xml.rels", a_rels),
            ("xl/b.xml", b"b"),
            ("xl/_rels/b.xml.rels", b_rels),
        ]);

        assert_eq!(
            reachable_parts(&pkg, ["xl/a.xml".to_string()]),
            set(&["xl/_rels/a.xml.rels", "xl/_rels/b.xml.rels", "xl/a.xml", "xl/b.xml"])
        );
    }
}
