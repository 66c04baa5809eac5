use percent_encoding::{utf8_percent_encode, NON_ALPHANUMERIC};
use std::borrow::Cow;

/// Escape text for use inside HTML/XML element content or quoted attributes.
pub fn escape(text: &str) -> Cow<'_, str> {
    quick_xml::escape::escape(text)
}

/// Reduce an uploaded name to something safe as a relative path inside a package.
pub fn sanitize_file_name(name: &str) -> String {
    // browsers on windows may send the full client path
    let base = name.rsplit(['/', '\\']).next().unwrap_or(name);
    let cleaned: String = base
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') {
                c
            } else {
                '_'
            }
        })
        .collect();
    let cleaned = cleaned.trim_start_matches('.');
    if cleaned.is_empty() {
        "file".to_string()
    } else {
        cleaned.to_string()
    }
}

/// Archive name derived from the course title, `My Course` -> `My_Course`.
pub fn slugify(title: &str) -> String {
    let slug = sanitize_file_name(title.trim());
    let slug = slug.trim_matches('_');
    if slug.is_empty() || slug == "file" {
        "scorm_package".to_string()
    } else {
        slug.to_string()
    }
}

/// Lowercased extension without the dot.
pub fn extension(name: &str) -> Option<String> {
    let (stem, ext) = name.rsplit_once('.')?;
    if stem.is_empty() || ext.is_empty() {
        return None;
    }
    Some(ext.to_ascii_lowercase())
}

pub fn file_stem(name: &str) -> &str {
    match name.rsplit_once('.') {
        Some((stem, _)) if !stem.is_empty() => stem,
        _ => name,
    }
}

/// `Content-Disposition` value carrying both an ASCII and an RFC 5987 name.
pub fn attachment_header(file_name: &str) -> String {
    let ascii = sanitize_file_name(file_name);
    let encoded = utf8_percent_encode(file_name, NON_ALPHANUMERIC);
    format!("attachment; filename=\"{ascii}\"; filename*=UTF-8''{encoded}")
}
