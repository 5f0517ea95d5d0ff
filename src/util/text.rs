use std::borrow::Cow;

use thiserror::Error;
use unicode_width::{UnicodeWidthChar, UnicodeWidthStr};

/// Longest category name accepted from the prompt, in characters.
pub const MAX_CATEGORY_NAME_CHARS: usize = 120;

const ELLIPSIS: char = '…';

/// Terminal columns taken by `s`.
pub fn display_width(s: &str) -> usize {
    UnicodeWidthStr::width(s)
}

/// Cut `s` to at most `max_width` columns, ending with `…` when shortened.
///
/// Borrowed when nothing had to be cut. Wide characters are never split.
pub fn truncate_to_width(s: &str, max_width: usize) -> Cow<'_, str> {
    if display_width(s) <= max_width {
        return Cow::Borrowed(s);
    }
    if max_width == 0 {
        return Cow::Borrowed("");
    }

    let budget = max_width - 1;
    let mut used = 0;
    let mut out = String::new();
    for c in s.chars() {
        let w = c.width().unwrap_or(0);
        if used + w > budget {
            break;
        }
        used += w;
        out.push(c);
    }
    out.push(ELLIPSIS);
    Cow::Owned(out)
}

fn is_unsafe_control(c: char) -> bool {
    c.is_control() && !matches!(c, '\t' | '\n' | '\r')
}

/// Remove terminal control characters and ANSI escape sequences.
///
/// Category names come straight from the server and are drawn into the
/// terminal, so CSI (`ESC [ ... final`) and OSC (`ESC ] ... BEL|ESC \`)
/// sequences are dropped whole. Tab, newline and carriage return survive.
pub fn strip_control_chars(s: &str) -> Cow<'_, str> {
    if !s.chars().any(is_unsafe_control) {
        return Cow::Borrowed(s);
    }

    let mut out = String::with_capacity(s.len());
    let mut chars = s.chars().peekable();
    while let Some(c) = chars.next() {
        if c != '\x1b' {
            if !is_unsafe_control(c) {
                out.push(c);
            }
            continue;
        }
        match chars.peek() {
            Some('[') => {
                chars.next();
                // Parameters run until a final byte in '@'..='~'
                for p in chars.by_ref() {
                    if ('@'..='~').contains(&p) {
                        break;
                    }
                }
            }
            Some(']') => {
                chars.next();
                while let Some(p) = chars.next() {
                    if p == '\x07' {
                        break;
                    }
                    if p == '\x1b' && chars.peek() == Some(&'\\') {
                        chars.next();
                        break;
                    }
                }
            }
            _ => {}
        }
    }
    Cow::Owned(out)
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum NameError {
    #[error("Category name cannot be empty")]
    Empty,
    #[error("Category name is longer than {max} characters")]
    TooLong { max: usize },
}

/// Clean a user-typed category name before it is sent to the server.
///
/// Control characters are stripped, surrounding whitespace trimmed, and
/// newlines collapsed to single spaces.
pub fn sanitize_category_name(raw: &str) -> Result<String, NameError> {
    let stripped = strip_control_chars(raw);
    let name = stripped.split_whitespace().collect::<Vec<_>>().join(" ");
    if name.is_empty() {
        return Err(NameError::Empty);
    }
    if name.chars().count() > MAX_CATEGORY_NAME_CHARS {
        return Err(NameError::TooLong {
            max: MAX_CATEGORY_NAME_CHARS,
        });
    }
    Ok(name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncate_fits_is_borrowed() {
        let out = truncate_to_width("Laptop", 10);
        assert!(matches!(out, Cow::Borrowed(_)));
        assert_eq!(out, "Laptop");
        assert_eq!(truncate_to_width("Laptop", 6), "Laptop");
    }

    #[test]
    fn test_truncate_adds_ellipsis() {
        assert_eq!(truncate_to_width("Đồng hồ thông minh", 8), "Đồng hồ…");
        assert_eq!(truncate_to_width("abc", 1), "…");
        assert_eq!(truncate_to_width("abc", 0), "");
    }

    #[test]
    fn test_truncate_never_splits_wide_chars() {
        // Each CJK char is two columns
        let out = truncate_to_width("手机配件", 4);
        assert_eq!(out, "手…");
        assert!(display_width(&out) <= 4);
    }

    #[test]
    fn test_strip_clean_text_is_borrowed() {
        let out = strip_control_chars("Phụ kiện\tmobile");
        assert!(matches!(out, Cow::Borrowed(_)));
    }

    #[test]
    fn test_strip_removes_c0_and_del() {
        assert_eq!(strip_control_chars("a\x00b\x07c\x7fd"), "abcd");
    }

    #[test]
    fn test_strip_ansi_sequences() {
        assert_eq!(strip_control_chars("\x1b[31mRed\x1b[0m"), "Red");
        assert_eq!(strip_control_chars("\x1b]0;title\x07safe"), "safe");
        assert_eq!(strip_control_chars("\x1b]0;title\x1b\\safe"), "safe");
        assert_eq!(strip_control_chars("bare\x1bescape"), "bareescape");
    }

    #[test]
    fn test_sanitize_name() {
        assert_eq!(
            sanitize_category_name("  Sạc   nhanh\n "),
            Ok("Sạc nhanh".to_string())
        );
        assert_eq!(
            sanitize_category_name("\x1b[1mBold\x1b[0m"),
            Ok("Bold".to_string())
        );
        assert_eq!(sanitize_category_name(" \t "), Err(NameError::Empty));
        assert_eq!(
            sanitize_category_name(&"x".repeat(MAX_CATEGORY_NAME_CHARS + 1)),
            Err(NameError::TooLong {
                max: MAX_CATEGORY_NAME_CHARS
            })
        );
    }
}
