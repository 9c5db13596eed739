//! Helpers for logging player-supplied text (usernames, chat lines, army names)
//! without letting it break the one-record-per-line log format.

const MAX_PREVIEW: usize = 200;

/// Escape a string for single-line logging.
///
/// Newlines, carriage returns, tabs and backslashes are escaped; other control
/// characters become `\xNN`. Anything beyond `MAX_PREVIEW` characters is cut
/// and replaced by an ellipsis.
pub fn escape_log(s: &str) -> String {
    use std::fmt::Write;

    let mut out = String::with_capacity(s.len().min(MAX_PREVIEW) + 8);
    for (count, ch) in s.chars().enumerate() {
        if count >= MAX_PREVIEW {
            out.push('…');
            break;
        }
        match ch {
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            c if c.is_control() => {
                let _ = write!(&mut out, "\\x{:02X}", c as u32);
            }
            c => out.push(c),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::escape_log;

    #[test]
    fn chat_line_with_newlines_stays_single_line() {
        let esc = escape_log("For the king!\nCharge\tnow\r");
        assert_eq!(esc, "For the king!\\nCharge\\tnow\\r");
    }

    #[test]
    fn long_names_are_truncated() {
        let long = "a".repeat(500);
        let esc = escape_log(&long);
        assert!(esc.ends_with('…'));
        assert_eq!(esc.chars().count(), 201);
    }

    #[test]
    fn other_control_chars_become_hex() {
        assert_eq!(escape_log("x\u{7}y"), "x\\x07y");
    }
}
