//! Filename sanitization.
//!
//! Output paths are shared between jobs; stripping path separators and
//! control characters keeps a message-supplied or extractor-supplied title
//! from escaping the destination folder or colliding on shell metacharacters.

/// Maximum length of a sanitized filename.
pub const MAX_FILENAME_LEN: usize = 100;

/// Characters never allowed in a filename.
const FORBIDDEN: &[char] = &['<', '>', ':', '"', '/', '\\', '|', '?', '*'];

/// Sanitize a filename: drop `<>:"/\|?*` and control characters, collapse
/// the result to at most 100 characters, and fall back to `download` when
/// nothing survives.
#[must_use]
pub fn sanitize_filename(name: &str) -> String {
    let mut out = String::with_capacity(name.len().min(MAX_FILENAME_LEN));
    for c in name.chars() {
        if c.is_control() || FORBIDDEN.contains(&c) {
            continue;
        }
        out.push(c);
        if out.chars().count() >= MAX_FILENAME_LEN {
            break;
        }
    }

    let trimmed = out.trim();
    if trimmed.is_empty() {
        "download".to_string()
    } else {
        trimmed.to_string()
    }
}

/// Build the initial filename for a URL job: `title[-resolution].ext`,
/// sanitized.
#[must_use]
pub fn url_job_filename(title: &str, resolution: Option<&str>, ext: &str) -> String {
    let base = match resolution {
        Some(res) if res != "best" => format!("{title}-{res}"),
        _ => title.to_string(),
    };
    sanitize_filename(&format!("{base}.{ext}"))
}
