use anstyle::{AnsiColor, Color, RgbColor, Style};

use crate::telemetry::CellTag;

pub const DARK_GREEN: (u8, u8, u8) = (0x20, 0x75, 0x20);
pub const ORANGE: (u8, u8, u8) = (0xd9, 0x7c, 0x13);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputMode {
    Auto,
    Always,
    Never,
}

impl OutputMode {
    pub fn from_env() -> Self {
        Self::parse(std::env::var("CROSSHOST_COLOR").ok().as_deref())
    }

    fn parse(value: Option<&str>) -> Self {
        match value {
            Some("always") => OutputMode::Always,
            Some("never") => OutputMode::Never,
            _ => OutputMode::Auto,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct Theme {
    pub accent: Style,
    pub muted: Style,
    pub success: Style,
    pub warning: Style,
    pub error: Style,
    pub label: Style,
    pub value: Style,
}

impl Default for Theme {
    fn default() -> Self {
        Self {
            accent: Style::new()
                .fg_color(Some(Color::Ansi(AnsiColor::Cyan)))
                .bold(),
            muted: Style::new().fg_color(Some(Color::Ansi(AnsiColor::BrightBlack))),
            success: Style::new()
                .fg_color(Some(Color::Ansi(AnsiColor::Green)))
                .bold(),
            warning: Style::new()
                .fg_color(Some(Color::Ansi(AnsiColor::Yellow)))
                .bold(),
            error: Style::new()
                .fg_color(Some(Color::Ansi(AnsiColor::Red)))
                .bold(),
            label: Style::new()
                .fg_color(Some(Color::Ansi(AnsiColor::Blue)))
                .bold(),
            value: Style::new().fg_color(Some(Color::Ansi(AnsiColor::White))),
        }
    }
}

/// ANSI styling for one segment cell; `None` means the glyph is printed as-is.
pub fn segment_style(tag: CellTag) -> Option<Style> {
    let white = Some(Color::Ansi(AnsiColor::White));
    match tag {
        CellTag::DoneFilled => Some(Style::new().fg_color(Some(rgb(DARK_GREEN)))),
        CellTag::Done => Some(Style::new().bg_color(Some(rgb(DARK_GREEN))).fg_color(white)),
        CellTag::InProgress => Some(Style::new().bg_color(Some(rgb(ORANGE))).fg_color(white)),
        CellTag::Error => Some(
            Style::new()
                .bg_color(Some(Color::Ansi(AnsiColor::Red)))
                .fg_color(white),
        ),
        CellTag::Plain => None,
    }
}

fn rgb((r, g, b): (u8, u8, u8)) -> Color {
    Color::Rgb(RgbColor(r, g, b))
}

pub fn resolve_color_enabled(mode: OutputMode, is_tty: bool) -> bool {
    if std::env::var_os("NO_COLOR").is_some() {
        return false;
    }
    match mode {
        OutputMode::Always => true,
        OutputMode::Never => false,
        OutputMode::Auto => is_tty,
    }
}

pub fn is_ci_environment() -> bool {
    std::env::var_os("CI").is_some()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn output_mode_parses_known_values_only() {
        assert_eq!(OutputMode::parse(Some("always")), OutputMode::Always);
        assert_eq!(OutputMode::parse(Some("never")), OutputMode::Never);
        assert_eq!(OutputMode::parse(Some("sometimes")), OutputMode::Auto);
        assert_eq!(OutputMode::parse(None), OutputMode::Auto);
    }

    #[test]
    fn filled_done_segments_use_foreground_only() {
        let style = segment_style(CellTag::DoneFilled).expect("styled");
        assert_eq!(style.get_bg_color(), None);
        assert_eq!(style.get_fg_color(), Some(rgb(DARK_GREEN)));
    }

    #[test]
    fn background_styles_use_white_text() {
        for tag in [CellTag::Done, CellTag::InProgress, CellTag::Error] {
            let style = segment_style(tag).expect("styled");
            assert!(style.get_bg_color().is_some());
            assert_eq!(style.get_fg_color(), Some(Color::Ansi(AnsiColor::White)));
        }
        assert_eq!(segment_style(CellTag::Plain), None);
    }
}
