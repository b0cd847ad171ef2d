/// Removes escape sequences (SGR, cursor movement, OSC, charset selection), then any
/// stray control bytes left behind. An unterminated sequence is dropped.
pub fn strip_ansi(raw: &str) -> String {
    sanitize_log_text(&strip_ansi_escapes::strip_str(raw))
}

/// Drops control bytes other than tab, including a lone ESC.
pub fn sanitize_log_text(raw: &str) -> String {
    raw.chars()
        .filter(|ch| {
            !matches!(
                ch,
                '\r'
                    | '\u{0000}'..='\u{0008}'
                    | '\u{000B}'
                    | '\u{000C}'
                    | '\u{000E}'..='\u{001F}'
                    | '\u{007F}'
            )
        })
        .collect()
}
