//! Human-readable output using rich_rust.
//!
//! Every human view is a bordered panel of styled segment lines. Styling is
//! dropped when stdout is not a terminal or the user opted out of color.

use std::io::IsTerminal;

use rich_rust::prelude::*;
use rich_rust::{Color, ColorSystem, Segment, Style};

/// Decide whether human output carries ANSI styling.
#[must_use]
pub fn use_color(no_color_flag: bool) -> bool {
    if no_color_flag {
        tracing::debug!(reason = "no_color_flag", "Color disabled");
        return false;
    }
    // Any value, including empty, disables color (https://no-color.org/).
    if std::env::var_os("NO_COLOR").is_some() {
        tracing::debug!(reason = "no_color_env", "Color disabled");
        return false;
    }
    if std::env::var("TERM").is_ok_and(|t| t == "dumb") {
        tracing::debug!(reason = "term_dumb", "Color disabled");
        return false;
    }
    if !std::io::stdout().is_terminal() {
        tracing::debug!(reason = "not_tty", "Color disabled");
        return false;
    }
    true
}

fn colored(name: &str) -> Style {
    Color::parse(name).map_or_else(|_| Style::new(), |c| Style::new().color(c))
}

/// Styles for the human views. All styles are null when color is off.
#[derive(Debug, Clone)]
pub struct Theme {
    pub color: bool,
    pub title: Style,
    pub border: Style,
    pub header: Style,
    pub muted: Style,
    pub accent: Style,
    pub warning: Style,
}

impl Theme {
    #[must_use]
    pub fn new(color: bool) -> Self {
        if !color {
            return Self::plain();
        }
        Self {
            color,
            title: colored("cyan").bold(),
            border: colored("blue"),
            header: Style::new().bold(),
            muted: Style::new().dim(),
            accent: colored("green"),
            warning: colored("yellow"),
        }
    }

    #[must_use]
    pub fn plain() -> Self {
        Self {
            color: false,
            title: Style::new(),
            border: Style::new(),
            header: Style::new(),
            muted: Style::new(),
            accent: Style::new(),
            warning: Style::new(),
        }
    }
}

/// Cell alignment within a fixed column width.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Align {
    Left,
    Right,
}

/// A padded table cell.
#[must_use]
pub fn cell(text: &str, width: usize, align: Align, style: &Style) -> Segment<'static> {
    let padded = match align {
        Align::Left => format!("{text:<width$}"),
        Align::Right => format!("{text:>width$}"),
    };
    Segment::styled(padded, style.clone())
}

/// One column gap.
#[must_use]
pub fn gap() -> Segment<'static> {
    Segment::plain(" ".to_string())
}

fn line_width(line: &[Segment<'_>]) -> usize {
    line.iter().map(|seg| seg.text.chars().count()).sum()
}

/// Convert segments to a string, applying styles only when color is on.
fn segments_to_string(segments: &[Segment<'_>], color: bool) -> String {
    segments
        .iter()
        .map(|seg| match &seg.style {
            Some(style) if color => style.render(&seg.text, ColorSystem::TrueColor),
            _ => seg.text.to_string(),
        })
        .collect()
}

/// Render `lines` in a titled panel sized to its widest line.
#[must_use]
pub fn panel(title: &str, lines: Vec<Vec<Segment<'static>>>, theme: &Theme) -> String {
    // Border plus one column of padding on each side.
    let width = lines
        .iter()
        .map(|line| line_width(line))
        .max()
        .unwrap_or(0)
        .max(title.chars().count() + 2)
        + 4;

    let title = if theme.color {
        Text::styled(title, theme.title.clone())
    } else {
        Text::new(title)
    };
    let mut panel = Panel::new(lines).title(title).padding((0, 1));
    if theme.color {
        panel = panel.border_style(theme.border.clone());
    }

    let mut out = segments_to_string(&panel.render(width), theme.color);
    if !out.ends_with('\n') {
        out.push('\n');
    }
    out
}
