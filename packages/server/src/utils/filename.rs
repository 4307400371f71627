/// Why an uploaded filename was rejected.
#[derive(Debug, PartialEq, Eq)]
pub enum FilenameError {
    /// Filename is empty or whitespace-only.
    Empty,
    /// Filename contains path separators (`/` or `\`).
    ContainsPathSeparator,
    /// Filename is `..`.
    PathTraversal,
    NullByte,
    /// Filename starts with a dot.
    Hidden,
    /// Filename contains control characters (CR, LF, etc.).
    ControlCharacter,
}

impl FilenameError {
    pub fn message(&self) -> &'static str {
        match self {
            Self::Empty => "Filename cannot be empty",
            Self::ContainsPathSeparator => "Invalid filename: path separators are not allowed",
            Self::PathTraversal => "Invalid filename: '..' is not allowed",
            Self::NullByte => "Invalid filename: null bytes are not allowed",
            Self::Hidden => "Invalid filename: hidden files (starting with '.') are not allowed",
            Self::ControlCharacter => "Invalid filename: control characters are not allowed",
        }
    }
}

/// Validate a client-supplied filename with no directory components.
///
/// Returns the trimmed name.
pub fn validate_flat_filename(filename: &str) -> Result<&str, FilenameError> {
    let trimmed = filename.trim();

    if trimmed.is_empty() {
        return Err(FilenameError::Empty);
    }
    if trimmed.contains('\0') {
        return Err(FilenameError::NullByte);
    }
    // CRLF would otherwise leak into Content-Disposition.
    if trimmed.chars().any(|c| c.is_control()) {
        return Err(FilenameError::ControlCharacter);
    }
    if trimmed.contains('/') || trimmed.contains('\\') {
        return Err(FilenameError::ContainsPathSeparator);
    }
    if trimmed == ".." {
        return Err(FilenameError::PathTraversal);
    }
    if trimmed.starts_with('.') {
        return Err(FilenameError::Hidden);
    }

    Ok(trimmed)
}

/// Replace every character a blob key segment cannot hold with `_`.
///
/// A leading dot is replaced too.
pub fn sanitize_key_component(raw: &str) -> String {
    let cleaned: String = raw
        .trim()
        .chars()
        .enumerate()
        .map(|(i, c)| {
            if c.is_ascii_alphanumeric() || matches!(c, '-' | '_') || (c == '.' && i > 0) {
                c
            } else {
                '_'
            }
        })
        .collect();
    if cleaned.is_empty() {
        "_".into()
    } else {
        cleaned
    }
}

/// Shorten a sanitized key component to at most `max` bytes, keeping a
/// short trailing extension intact.
///
/// Input must already be ASCII, as produced by [`sanitize_key_component`].
pub fn truncate_key_component(component: &str, max: usize) -> String {
    if component.len() <= max {
        return component.to_string();
    }
    let (stem, ext) = match component.rsplit_once('.') {
        Some((stem, ext)) if !stem.is_empty() && ext.len() <= MAX_KEPT_EXTENSION_LEN => {
            (stem, Some(ext))
        }
        _ => (component, None),
    };
    match ext {
        Some(ext) if ext.len() + 2 <= max => {
            let keep = max - ext.len() - 1;
            format!("{}.{ext}", &stem[..keep.min(stem.len())])
        }
        _ => component[..max].to_string(),
    }
}

const MAX_KEPT_EXTENSION_LEN: usize = 16;

/// Build a `Content-Disposition: attachment` value with an ASCII fallback
/// and an RFC 5987 `filename*` for the full name.
pub fn content_disposition_value(filename: &str) -> String {
    let ascii_safe: String = filename
        .chars()
        .filter(|c| c.is_ascii_graphic() && !matches!(c, '"' | ';' | '\\'))
        .collect();
    let ascii_name = if ascii_safe.is_empty() {
        "download".to_string()
    } else {
        ascii_safe
    };

    let encoded: String = filename
        .bytes()
        .map(|b| match b {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'.' | b'_' | b'~' => {
                (b as char).to_string()
            }
            _ => format!("%{b:02X}"),
        })
        .collect();

    format!("attachment; filename=\"{ascii_name}\"; filename*=UTF-8''{encoded}")
}
