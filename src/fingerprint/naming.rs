//! Deterministic output file names for fingerprint pages.
//!
//! Names must sort usefully in a directory listing and stay legal on
//! common filesystems, so band labels get their frequencies zero-padded
//! and risky characters are rewritten.

/// File name for a single-page layout: `<perm>.<zmode>.<track>.png`.
pub fn layout_file_name(perm_code: &str, zmode_code: &str, track: &str) -> String {
    format!("{perm_code}.{zmode_code}.{track}.png")
}

/// File name for one page of a file-per-Z layout:
/// `<perm>.<zvalue>.<track>.png`, with the Z value sanitized.
pub fn zfile_file_name(perm_code: &str, z_label: &str, track: &str) -> String {
    format!("{}.{}.{}.png", perm_code, sanitize(z_label), track)
}

/// Rewrite a Z-axis label into a filename component. Frequencies in band
/// labels are zero-padded to five digits so lexical order matches numeric
/// order, `::` in metric keys becomes `--`, and characters that are
/// unsafe in file names are substituted.
pub fn sanitize(label: &str) -> String {
    let padded = pad_frequencies(&label.replace("::", "--"));
    padded
        .chars()
        .map(|c| match c {
            ':' => '.',
            '<' | '>' | '|' | '?' | '*' | '/' | '\\' => '_',
            '"' => '\'',
            other => other,
        })
        .collect()
}

/// Zero-pad every digit run that is immediately followed by "Hz".
fn pad_frequencies(label: &str) -> String {
    let chars: Vec<char> = label.chars().collect();
    let mut out = String::with_capacity(label.len());
    let mut i = 0;
    while i < chars.len() {
        if chars[i].is_ascii_digit() {
            let start = i;
            while i < chars.len() && chars[i].is_ascii_digit() {
                i += 1;
            }
            let digits: String = chars[start..i].iter().collect();
            if chars[i..].starts_with(&['H', 'z']) {
                out.push_str(&format!("{digits:0>5}"));
            } else {
                out.push_str(&digits);
            }
        } else {
            out.push(chars[i]);
            i += 1;
        }
    }
    out
}
