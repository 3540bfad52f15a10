use printwall_core::RowColor;
use ratatui::style::{Color, Modifier, Style};

pub const HEADER_STYLE: Style = Style::new()
    .fg(Color::Rgb(142, 192, 124))
    .add_modifier(Modifier::BOLD);
pub const MUTED_STYLE: Style = Style::new().fg(Color::Rgb(148, 163, 184));
pub const TEXT_STYLE: Style = Style::new().fg(Color::Rgb(226, 232, 240));
pub const SELECTED_BORDER: Style = Style::new().fg(Color::Rgb(56, 189, 248));
pub const BORDER: Style = Style::new().fg(Color::Rgb(71, 85, 105));
pub const PAUSED_STYLE: Style = Style::new()
    .fg(Color::Rgb(245, 158, 11))
    .add_modifier(Modifier::BOLD);
pub const FINISHED_STYLE: Style = Style::new()
    .fg(Color::Rgb(100, 116, 139))
    .add_modifier(Modifier::DIM);

pub fn state_style(open: bool) -> Style {
    if open {
        Style::new().fg(Color::Rgb(34, 197, 94))
    } else {
        Style::new().fg(Color::Rgb(239, 68, 68))
    }
}

/// Style for one stored row. Colors that are not `#rrggbb` fall back to the
/// plain text style.
pub fn row_style(color: Option<&RowColor>) -> Style {
    match color.and_then(RowColor::rgb) {
        Some((r, g, b)) => Style::new().fg(Color::Rgb(r, g, b)),
        None => TEXT_STYLE,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn row_color_maps_to_rgb() {
        let color = RowColor("#ff8000".to_string());
        assert_eq!(row_style(Some(&color)).fg, Some(Color::Rgb(255, 128, 0)));
        let named = RowColor("tomato".to_string());
        assert_eq!(row_style(Some(&named)), TEXT_STYLE);
        assert_eq!(row_style(None), TEXT_STYLE);
    }
}
