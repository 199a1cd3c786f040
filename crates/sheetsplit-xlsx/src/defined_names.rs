//! Sheet-reference scanning for workbook defined names.
//!
//! Defined names are stored as formula text (`Sheet1!$A$1:$B$4`, `'Q1 ''24'!A1`,
//! `Jan:Mar!B2`). Extraction only needs to know which worksheets a name points at, so this is a
//! tokenizer for sheet prefixes rather than a formula parser.

/// Return every worksheet name referenced by a sheet-qualified reference in `formula`, in order
/// of appearance.
///
/// - quoted names are unescaped (`''` -> `'`);
/// - 3D references (`Jan:Mar!A1`) yield both ends of the span;
/// - external-workbook references (`[1]Sheet1!A1`, `'C:\x\[Book.xlsx]Data'!A1`) and error
///   literals (`#REF!`) are ignored;
/// - string literals are skipped.
pub fn referenced_sheet_names(formula: &str) -> Vec<String> {
    let chars: Vec<char> = formula.chars().collect();
    let mut out = Vec::new();
    let mut i = 0;

    while i < chars.len() {
        match chars[i] {
            '"' => {
                i += 1;
                while i < chars.len() {
                    if chars[i] == '"' {
                        if chars.get(i + 1) == Some(&'"') {
                            i += 2;
                            continue;
                        }
                        break;
                    }
                    i += 1;
                }
                i += 1;
            }
            '\'' => {
                let mut name = String::new();
                i += 1;
                while i < chars.len() {
                    if chars[i] == '\'' {
                        if chars.get(i + 1) == Some(&'\'') {
                            name.push('\'');
                            i += 2;
                            continue;
                        }
                        break;
                    }
                    name.push(chars[i]);
                    i += 1;
                }
                // Skip the closing quote.
                i += 1;
                if chars.get(i) == Some(&'!') {
                    i += 1;
                    push_sheet_span(&name, &mut out);
                }
            }
            '#' => {
                // Error literal: `#REF!`, `#N/A`, `#DIV/0!`, `#NAME?`.
                i += 1;
                while i < chars.len() && (chars[i].is_alphanumeric() || chars[i] == '/') {
                    i += 1;
                }
                if matches!(chars.get(i), Some('!') | Some('?')) {
                    i += 1;
                }
            }
            c if is_unquoted_name_char(c) => {
                let start = i;
                while i < chars.len() && is_unquoted_name_char(chars[i]) {
                    i += 1;
                }
                if chars.get(i) == Some(&'!') {
                    let name: String = chars[start..i].iter().collect();
                    i += 1;
                    push_sheet_span(&name, &mut out);
                }
            }
            _ => i += 1,
        }
    }

    out
}

fn is_unquoted_name_char(c: char) -> bool {
    c.is_alphanumeric() || matches!(c, '_' | '.' | ':' | '[' | ']' | '\\') || !c.is_ascii()
}

fn push_sheet_span(name: &str, out: &mut Vec<String>) {
    if name.contains(']') {
        return;
    }
    for part in name.split(':') {
        if !part.is_empty() {
            out.push(part.to_string());
        }
    }
}

/// Whether a workbook-scoped name should be dropped: it references at least one sheet and every
/// sheet it references is being removed.
pub fn references_only_removed_sheets(formula: &str, is_removed: impl Fn(&str) -> bool) -> bool {
    let sheets = referenced_sheet_names(formula);
    !sheets.is_empty() && sheets.iter().all(|sheet| is_removed(sheet))
}
