//! Filename sanitizing and length bounding.
//!
//! Stored names only ever contain `[A-Za-z0-9_.-]`. The combined stored name
//! (`<object hex>_<sanitized name>`) is capped at [`FILENAME_LIMIT`] characters,
//! keeping the extension whenever it fits.

/// Maximum stored filename length, including the object id prefix.
///
/// Existing stores are laid out with this value. Changing it renames every
/// stored object whose name was truncated.
pub const FILENAME_LIMIT: usize = 75;

fn is_safe(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-')
}

/// Replace each run of unsafe characters with one `_`, then strip `-` from both ends.
///
/// The result may be empty.
pub fn escape(filename: &str) -> String {
    let mut out = String::with_capacity(filename.len());
    let mut in_run = false;

    for c in filename.chars() {
        if is_safe(c) {
            out.push(c);
            in_run = false;
        } else if !in_run {
            out.push('_');
            in_run = true;
        }
    }

    out.trim_matches('-').to_string()
}

/// Join `prefix` and `raw`, truncating to `limit` characters.
///
/// When truncation is needed and the joined name has a `.`, the text after the
/// last `.` is kept as the extension if at least one other character still fits.
pub fn bounded_name(prefix: &str, raw: &str, limit: usize) -> String {
    let name = format!("{prefix}{raw}");
    if name.chars().count() <= limit {
        return name;
    }

    if let Some((_, extension)) = name.rsplit_once('.') {
        let keep = limit.checked_sub(extension.chars().count() + 1);
        if let Some(keep) = keep.filter(|k| *k > 0) {
            let head: String = name.chars().take(keep).collect();
            return format!("{head}.{extension}");
        }
    }

    name.chars().take(limit).collect()
}
