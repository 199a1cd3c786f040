/// Return the relationships part that belongs to `part` (e.g. `xl/workbook.xml` ->
/// `xl/_rels/workbook.xml.rels`).
pub fn rels_for_part(part: &str) -> String {
    let part = part.strip_prefix('/').unwrap_or(part);
    match part.rsplit_once('/') {
        Some((dir, file_name)) => format!("{dir}/_rels/{file_name}.rels"),
        None => format!("_rels/{part}.rels"),
    }
}

/// Inverse of [`rels_for_part`]: the source part a `.rels` part describes.
///
/// Returns `None` for names that are not relationship parts. The package-level
/// `_rels/.rels` maps to the empty string (the package root).
pub fn source_part_for_rels(rels_part: &str) -> Option<String> {
    let rels_part = rels_part.strip_prefix('/').unwrap_or(rels_part);
    let without_ext = rels_part.strip_suffix(".rels")?;
    let (dir, file_name) = match without_ext.rsplit_once('/') {
        Some((dir, file_name)) => (dir, file_name),
        None => return None,
    };
    if dir == "_rels" {
        return Some(file_name.to_string());
    }
    let parent = dir.strip_suffix("/_rels")?;
    if file_name.is_empty() {
        return Some(parent.to_string());
    }
    Some(format!("{parent}/{file_name}"))
}

/// Resolve a relationship `target` against the part that owns the relationship.
///
/// Passing an empty `source_part` resolves against the package root, which is what the
/// package-level `_rels/.rels` relationships need.
pub fn resolve_target(source_part: &str, target: &str) -> String {
    // Relationship targets are URIs; some producers include a URI fragment (e.g. `../media/img.png#id`).
    // OPC part names do not include fragments, so strip them before resolving.
    let target = target.split('#').next().unwrap_or(target);
    if target.is_empty() {
        // A target of just `#fragment` refers to the source part itself.
        return normalize(source_part);
    }
    if let Some(target) = target.strip_prefix('/') {
        return normalize(target);
    }

    let base_dir = source_part.rsplit_once('/').map(|(dir, _)| dir).unwrap_or("");
    normalize(&format!("{base_dir}/{target}"))
}

fn normalize(path: &str) -> String {
    let mut out: Vec<&str> = Vec::new();
    for part in path.split('/') {
        match part {
            "" | "." => {}
            ".." => {
                out.pop();
            }
            other => out.push(other),
        }
    }
    out.join("/")
}
