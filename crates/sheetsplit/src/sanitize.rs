/// Stem used when a sheet name has no usable characters left.
pub const FALLBACK_STEM: &str = "Sheet";

/// Reduce a sheet name to a file-name-safe stem.
///
/// Keeps alphanumeric characters (any script), spaces, hyphens and underscores; trims the
/// result and turns the remaining spaces into underscores. Can return an empty string.
pub fn sanitize_sheet_name(name: &str) -> String {
    let kept: String = name
        .chars()
        .filter(|c| c.is_alphanumeric() || matches!(c, ' ' | '-' | '_'))
        .collect();
    kept.trim().replace(' ', "_")
}

/// Output file name for `sheet` with the given extension (no leading dot).
pub fn output_file_name(sheet: &str, extension: &str) -> String {
    let stem = sanitize_sheet_name(sheet);
    let stem = if stem.is_empty() { FALLBACK_STEM } else { stem.as_str() };
    format!("{stem}.{extension}")
}
