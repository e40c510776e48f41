//! Shared utility functions for the pagesmith crate.

use sha2::{Digest, Sha256};

/// Turn an arbitrary identifier into a repository/directory-safe name.
///
/// Keeps ASCII alphanumerics, `-`, `_` and `.`; every other run of characters
/// collapses into a single `-`. Leading dots are stripped so the result can
/// never be `.` or `..`. Truncated to `max_len` bytes.
pub fn sanitize_name(raw: &str, max_len: usize) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut last_dash = false;
    for c in raw.trim().chars() {
        if c.is_ascii_alphanumeric() || c == '_' || c == '.' || c == '-' {
            out.push(c);
            last_dash = c == '-';
        } else if !last_dash {
            out.push('-');
            last_dash = true;
        }
    }
    let trimmed = out
        .trim_start_matches(|c| c == '.' || c == '-')
        .trim_end_matches('-');
    let mut name = trimmed.to_string();
    if name.len() > max_len {
        name.truncate(max_len);
        name = name.trim_end_matches('-').to_string();
    }
    if name.is_empty() {
        "app".to_string()
    } else {
        name
    }
}

/// Find every balanced `[...]` region in `text`, outermost first.
///
/// Brackets inside JSON string literals are ignored, so file contents such as
/// `"const xs = [1, 2];"` do not confuse the scan.
pub fn json_array_candidates(text: &str) -> Vec<&str> {
    let mut candidates = Vec::new();
    let bytes = text.as_bytes();
    let mut start_search = 0;

    while let Some(offset) = text[start_search..].find('[') {
        let start = start_search + offset;
        if let Some(end) = matching_bracket(bytes, start) {
            candidates.push(&text[start..=end]);
        }
        start_search = start + 1;
    }

    candidates
}

/// Index of the `]` closing the `[` at `start`, honoring JSON string escapes.
fn matching_bracket(bytes: &[u8], start: usize) -> Option<usize> {
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (i, &b) in bytes.iter().enumerate().skip(start) {
        if in_string {
            match b {
                _ if escaped => escaped = false,
                b'\\' => escaped = true,
                b'"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match b {
            b'"' => in_string = true,
            b'[' => depth += 1,
            b']' => {
                depth = depth.checked_sub(1)?;
                if depth == 0 {
                    return Some(i);
                }
            }
            _ => {}
        }
    }
    None
}

/// Strip a surrounding Markdown code fence (```json ... ```), if present.
pub fn strip_code_fence(text: &str) -> &str {
    let trimmed = text.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let body = match rest.find('\n') {
        Some(idx) => &rest[idx + 1..],
        None => rest,
    };
    body.trim_end().strip_suffix("```").unwrap_or(body).trim()
}

/// Compare two secrets without short-circuiting on the first differing byte.
pub fn secrets_match(provided: &str, expected: &str) -> bool {
    let a = Sha256::digest(provided.as_bytes());
    let b = Sha256::digest(expected.as_bytes());
    a.iter().zip(b.iter()).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

/// Hex-encoded SHA-256 of `data`.
pub fn sha256_hex(data: &[u8]) -> String {
    Sha256::digest(data)
        .iter()
        .map(|b| format!("{:02x}", b))
        .collect()
}
