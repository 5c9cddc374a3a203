//! Logging helpers that keep chunk text on a single log line.
//! Control characters are escaped and long previews are capped so a
//! multi-kilobyte book excerpt never floods the log.

/// Escape a string for single-line logging:
/// - `\n` => `\\n`
/// - `\r` => `\\r`
/// - `\t` => `\\t`
/// - backslash => `\\\\`
///   Strings longer than 300 characters are cut with an ellipsis.
pub fn escape_log(s: &str) -> String {
    preview(s, 300)
}

/// Escaped preview of at most `max_chars` characters, ellipsis appended when cut.
///
/// Used for `[MOCK] Chunk i/n: ...` lines and retry warnings where only the
/// head of a chunk is useful.
pub fn preview(s: &str, max_chars: usize) -> String {
    let mut out = String::with_capacity(s.len().min(max_chars) + 8);
    for (count, ch) in s.chars().enumerate() {
        if count >= max_chars {
            out.push('…');
            break;
        }
        match ch {
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            c if c.is_control() => {
                use std::fmt::Write;
                let _ = write!(&mut out, "\\x{:02X}", c as u32);
            }
            c => out.push(c),
        }
    }
    out
}

/// Hide all but the first four characters of a credential for log output.
pub fn redact(secret: &str) -> String {
    if secret.is_empty() {
        return "<unset>".to_string();
    }
    let head: String = secret.chars().take(4).collect();
    format!("{head}…")
}
