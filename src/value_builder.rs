//! Turns token text into string content: escape processing for quoted and
//! multiline-escaped strings, and dedent computation for both multiline
//! variants (§4.3).
//!
//! The zero-copy-when-possible shape (`Decoded::Borrowed` vs `Owned`) lets a
//! string with no escapes be handed back as a slice of the original token
//! text, while one with escapes must be rebuilt into a fresh `String`.

use crate::error::ErrorKind;
use crate::unicode::{is_newline, is_whitespace};

/// The result of decoding a string token's content.
pub enum Decoded<'a> {
    /// No escapes were present; this is a slice of the original input.
    Borrowed(&'a str),
    /// Escapes were processed, producing a freshly allocated string.
    Owned(String),
}

fn invalid_string(reason: &'static str) -> ErrorKind {
    ErrorKind::InvalidString { reason }
}

fn invalid_escape(reason: &'static str) -> ErrorKind {
    ErrorKind::InvalidEscape { reason }
}

fn is_whitespace_only(s: &str) -> bool {
    s.chars().all(is_whitespace)
}

fn normalize_newlines(s: &str) -> String {
    s.replace("\r\n", "\n").replace('\r', "\n")
}

/// Decode a single-line quoted string's content (the bytes between the
/// opening and closing `"`, exclusive).
pub fn decode_single_line_quoted(content: &str) -> Result<Decoded<'_>, ErrorKind> {
    if content.contains('\\') {
        Ok(Decoded::Owned(decode_escapes(content)?))
    } else if content.chars().any(is_newline) {
        Err(invalid_string("newline not allowed in single-line string"))
    } else {
        Ok(Decoded::Borrowed(content))
    }
}

/// Decode a single-line raw string's content: no escape processing, just a
/// rejection of embedded newlines.
pub fn decode_raw_single_line(content: &str) -> Result<&str, ErrorKind> {
    if content.chars().any(is_newline) {
        Err(invalid_string("newline not allowed in single-line raw string"))
    } else {
        Ok(content)
    }
}

/// Decode a multiline *raw* string's content (the bytes between `"""` and
/// `"""`, exclusive, with `h` matching hashes already stripped by the
/// caller). No escape processing; only line-splitting and dedenting.
pub fn decode_raw_multiline(content: &str) -> Result<String, ErrorKind> {
    let normalized = normalize_newlines(content);
    let mut lines: Vec<&str> = normalized.split('\n').collect();
    if lines.first().is_some_and(|s| !s.is_empty()) {
        return Err(invalid_string(
            "multiline string content must begin with a newline",
        ));
    }
    if !lines.is_empty() {
        lines.remove(0);
    }
    if lines.len() < 2 {
        return Err(invalid_string("multiline string requires at least two lines"));
    }
    let prefix = lines.pop().unwrap();
    if !is_whitespace_only(prefix) {
        return Err(invalid_string(
            "final line of multiline string must be whitespace-only",
        ));
    }
    let mut out = String::new();
    for (i, line) in lines.iter().enumerate() {
        if i > 0 {
            out.push('\n');
        }
        if is_whitespace_only(line) {
            continue;
        }
        match line.strip_prefix(prefix) {
            Some(rest) => out.push_str(rest),
            None => {
                return Err(invalid_string(
                    "content line does not start with the dedent prefix",
                ));
            }
        }
    }
    Ok(out)
}

/// Decode a multiline *escaped* string's content, per the four-step
/// procedure in §4.3: determine which lines are raw-whitespace-only and
/// which are continuation lines, compute the effective dedent prefix
/// (accounting for a trailing continuation into the terminator line), then
/// emit each line dedented and escape-processed.
pub fn decode_multiline_escaped(content: &str) -> Result<String, ErrorKind> {
    let normalized = normalize_newlines(content);
    let mut lines: Vec<&str> = normalized.split('\n').collect();
    if lines.first().is_some_and(|s| !s.is_empty()) {
        return Err(invalid_string(
            "multiline string content must begin with a newline",
        ));
    }
    if !lines.is_empty() {
        lines.remove(0);
    }
    if lines.len() < 2 {
        return Err(invalid_string("multiline string requires at least two lines"));
    }

    let final_line = *lines.last().unwrap();
    let escaped_final = decode_escapes(final_line)?;
    let effective_dedent = if lines.len() >= 2 {
        let content_last = lines[lines.len() - 2];
        match trailing_backslash_pos(content_last) {
            Some(bpos) => format!("{}{}", &content_last[..bpos], escaped_final),
            None => escaped_final,
        }
    } else {
        escaped_final
    };
    if !is_whitespace_only(&effective_dedent) {
        return Err(invalid_string(
            "effective dedent prefix must be whitespace-only",
        ));
    }

    let content_lines = &lines[..lines.len() - 1];
    let mut out_lines: Vec<String> = Vec::with_capacity(content_lines.len());
    let mut i = 0;
    while i < content_lines.len() {
        let line = content_lines[i];
        if is_whitespace_only(line) {
            out_lines.push(String::new());
            i += 1;
            continue;
        }
        if let Some(bpos) = trailing_backslash_pos(line) {
            let dedented = line[..bpos].strip_prefix(effective_dedent.as_str()).ok_or_else(|| {
                invalid_string("content line does not start with the dedent prefix")
            })?;
            let mut joined = decode_escapes(dedented)?;
            if i + 1 < content_lines.len() {
                let next = content_lines[i + 1];
                let next_stripped = next.trim_start_matches(is_whitespace);
                joined.push_str(&decode_escapes(next_stripped)?);
                i += 2;
            } else {
                i += 1;
            }
            out_lines.push(joined);
            continue;
        }
        match line.strip_prefix(effective_dedent.as_str()) {
            Some(rest) => {
                out_lines.push(decode_escapes(rest)?);
                i += 1;
            }
            None => {
                return Err(invalid_string(
                    "content line does not start with the dedent prefix",
                ));
            }
        }
    }
    Ok(out_lines.join("\n"))
}

/// Whether `line`, ignoring any trailing unicode-whitespace, ends in an
/// *unescaped* backslash (an odd run of trailing backslashes). Returns the
/// byte offset of that backslash within `line` if so.
fn trailing_backslash_pos(line: &str) -> Option<usize> {
    let trimmed = line.trim_end_matches(is_whitespace);
    if !trimmed.ends_with('\\') {
        return None;
    }
    let run = trimmed.chars().rev().take_while(|&c| c == '\\').count();
    if run % 2 == 1 {
        Some(trimmed.len() - 1)
    } else {
        None
    }
}

/// Process the escape alphabet (§4.3) over `s`, which must not contain any
/// *unescaped* newline.
fn decode_escapes(s: &str) -> Result<String, ErrorKind> {
    let mut out = String::with_capacity(s.len());
    let mut chars = s.char_indices().peekable();
    while let Some((i, c)) = chars.next() {
        if c == '\\' {
            let rest = &s[i + c.len_utf8()..];
            let (consumed, emitted) = decode_one_escape(rest)?;
            let mut skipped = 0usize;
            while skipped < consumed {
                match chars.next() {
                    Some((_, c2)) => skipped += c2.len_utf8(),
                    None => break,
                }
            }
            if let Some(ch) = emitted {
                out.push(ch);
            }
        } else if is_newline(c) {
            return Err(invalid_string("unescaped newline in string"));
        } else {
            out.push(c);
        }
    }
    Ok(out)
}

/// Decode a single escape sequence starting right after the backslash.
/// Returns the number of bytes of `rest` consumed and the character to
/// emit, or `None` for a whitespace-escape (which emits nothing).
fn decode_one_escape(rest: &str) -> Result<(usize, Option<char>), ErrorKind> {
    let mut it = rest.chars();
    let c = it.next().ok_or_else(|| invalid_escape("unterminated escape"))?;
    match c {
        'n' => Ok((1, Some('\n'))),
        'r' => Ok((1, Some('\r'))),
        't' => Ok((1, Some('\t'))),
        '\\' => Ok((1, Some('\\'))),
        '"' => Ok((1, Some('"'))),
        'b' => Ok((1, Some('\u{8}'))),
        'f' => Ok((1, Some('\u{C}'))),
        's' => Ok((1, Some(' '))),
        'u' => decode_unicode_escape(rest),
        c if is_whitespace(c) || is_newline(c) => {
            let mut consumed = c.len_utf8();
            for c2 in it {
                if is_whitespace(c2) || is_newline(c2) {
                    consumed += c2.len_utf8();
                } else {
                    break;
                }
            }
            Ok((consumed, None))
        }
        _ => Err(invalid_escape("unknown escape sequence")),
    }
}

fn decode_unicode_escape(rest: &str) -> Result<(usize, Option<char>), ErrorKind> {
    let after_u = &rest[1..];
    if !after_u.starts_with('{') {
        return Err(invalid_escape("expected '{' after \\u"));
    }
    let after_brace = &after_u[1..];
    let end = after_brace
        .find('}')
        .ok_or_else(|| invalid_escape("unterminated \\u{...} escape"))?;
    let hex = &after_brace[..end];
    if hex.is_empty() || hex.len() > 6 || !hex.chars().all(|c| c.is_ascii_hexdigit()) {
        return Err(invalid_escape("\\u{...} must contain 1-6 hex digits"));
    }
    let cp = u32::from_str_radix(hex, 16).map_err(|_| invalid_escape("invalid \\u{...} digits"))?;
    if (0xD800..=0xDFFF).contains(&cp) {
        return Err(invalid_escape("\\u{...} may not encode a surrogate"));
    }
    let ch = char::from_u32(cp).ok_or_else(|| invalid_escape("\\u{...} out of codepoint range"))?;
    let consumed = 1 + 1 + hex.len() + 1; // 'u' + '{' + digits + '}'
    Ok((consumed, Some(ch)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn borrows_when_no_escapes() {
        match decode_single_line_quoted("hello").unwrap() {
            Decoded::Borrowed(s) => assert_eq!(s, "hello"),
            Decoded::Owned(_) => panic!("expected borrowed"),
        }
    }

    #[test]
    fn basic_escapes() {
        match decode_single_line_quoted("hello\\nworld").unwrap() {
            Decoded::Owned(s) => assert_eq!(s, "hello\nworld"),
            Decoded::Borrowed(_) => panic!("expected owned"),
        }
    }

    #[test]
    fn unicode_escape() {
        match decode_single_line_quoted("\\u{41}").unwrap() {
            Decoded::Owned(s) => assert_eq!(s, "A"),
            Decoded::Borrowed(_) => panic!("expected owned"),
        }
    }

    #[test]
    fn rejects_surrogate_escape() {
        assert!(decode_single_line_quoted("\\u{D800}").is_err());
    }

    #[test]
    fn whitespace_escape_consumes_run() {
        match decode_single_line_quoted("a\\   b").unwrap() {
            Decoded::Owned(s) => assert_eq!(s, "ab"),
            Decoded::Borrowed(_) => panic!("expected owned"),
        }
    }

    #[test]
    fn raw_multiline_dedent() {
        let content = "\n    hello\n    world\n    ";
        assert_eq!(decode_raw_multiline(content).unwrap(), "hello\nworld");
    }

    #[test]
    fn raw_multiline_requires_two_lines() {
        let content = "\n    only one line    ";
        assert!(decode_raw_multiline(content).is_err());
    }

    #[test]
    fn raw_multiline_rejects_bad_indent() {
        let content = "\n    hello\n  world\n    ";
        assert!(decode_raw_multiline(content).is_err());
    }

    #[test]
    fn escaped_multiline_basic() {
        let content = "\n    hello\\n\n    world\n    ";
        let s = decode_multiline_escaped(content).unwrap();
        assert_eq!(s, "hello\n\nworld");
    }

    #[test]
    fn escaped_multiline_continuation() {
        let content = "\n    hello \\\n    world\n    ";
        let s = decode_multiline_escaped(content).unwrap();
        assert_eq!(s, "hello world");
    }
}
