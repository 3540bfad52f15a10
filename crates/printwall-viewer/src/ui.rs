use crate::app::{App, ColumnView};
use crate::theme;
use printwall_core::{Column, ConnectionState, Group, RingBuffer, Row};
use ratatui::{
    layout::{Constraint, Direction, Layout, Rect},
    text::{Line, Span},
    widgets::{Block, Borders, Clear, Paragraph, Wrap},
    Frame,
};

const MAX_GROUP_PANES: usize = 3;
const TOKEN_PREFIX_LEN: usize = 8;

pub fn render(f: &mut Frame, app: &App) {
    let area = f.size();
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(1),
            Constraint::Min(3),
            Constraint::Length(1),
        ])
        .split(area);

    render_header(f, app, chunks[0]);
    render_columns(f, app, chunks[1]);
    render_footer(f, app, chunks[2]);
    if app.show_help {
        render_help(f, centered(chunks[1], 48, 13));
    }
}

fn render_header(f: &mut Frame, app: &App, area: Rect) {
    let state = app.connection.state();
    let mut spans = vec![
        Span::styled("printwall ", theme::HEADER_STYLE),
        Span::styled(app.url.as_str().to_string(), theme::MUTED_STYLE),
        Span::raw("  "),
        Span::styled(
            state.as_str().to_string(),
            theme::state_style(state == ConnectionState::Open),
        ),
        Span::styled(
            format!(
                "  delivered {}  rejected {}",
                app.connection.delivered(),
                app.connection.rejected()
            ),
            theme::MUTED_STYLE,
        ),
    ];
    spans.push(Span::styled(
        format!(
            "  groups +{} -{}",
            app.view.groups_opened, app.view.groups_closed
        ),
        theme::MUTED_STYLE,
    ));
    if let Some(since) = app.connected_at {
        spans.push(Span::styled(
            format!("  since {}", since.format("%H:%M:%S")),
            theme::MUTED_STYLE,
        ));
    }
    if app.reconnects > 0 {
        spans.push(Span::styled(
            format!("  reconnects {}", app.reconnects),
            theme::MUTED_STYLE,
        ));
    }
    f.render_widget(Paragraph::new(Line::from(spans)), area);
}

fn render_footer(f: &mut Frame, app: &App, area: Rect) {
    let text = app
        .status_note
        .clone()
        .unwrap_or_else(|| "? help  q quit  tab column  f follow".to_string());
    f.render_widget(
        Paragraph::new(Line::from(Span::styled(text, theme::MUTED_STYLE))),
        area,
    );
}

fn render_columns(f: &mut Frame, app: &App, area: Rect) {
    let columns = app.connection.session().columns();
    if columns.is_empty() {
        let waiting = Paragraph::new("waiting for column announcement")
            .style(theme::MUTED_STYLE)
            .block(Block::default().borders(Borders::ALL).border_style(theme::BORDER));
        f.render_widget(waiting, area);
        return;
    }

    let count = columns.len() as u32;
    let constraints: Vec<Constraint> = columns
        .iter()
        .map(|_| Constraint::Ratio(1, count))
        .collect();
    let panes = Layout::default()
        .direction(Direction::Horizontal)
        .constraints(constraints)
        .split(area);

    let fallback = ColumnView::default();
    for (column, pane) in columns.iter().zip(panes.iter()) {
        let view = app.view.columns.get(column.index()).unwrap_or(&fallback);
        render_column(f, column, view, column.index() == app.selected, *pane);
    }
}

fn render_column(f: &mut Frame, column: &Column, view: &ColumnView, selected: bool, area: Rect) {
    let mut title = vec![Span::styled(column.label().to_string(), theme::HEADER_STYLE)];
    if column.follow() {
        title.push(Span::styled(" follow", theme::MUTED_STYLE));
    } else {
        title.push(Span::styled(
            format!(" paused +{}", view.unseen),
            theme::PAUSED_STYLE,
        ));
    }
    let block = Block::default()
        .borders(Borders::ALL)
        .title(Line::from(title))
        .border_style(if selected {
            theme::SELECTED_BORDER
        } else {
            theme::BORDER
        });
    let inner = block.inner(area);
    f.render_widget(block, area);

    if column.group_count() == 0 {
        render_rows(f, column.rows(), view.offset, inner);
        return;
    }
    let split = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Percentage(40), Constraint::Percentage(60)])
        .split(inner);
    render_rows(f, column.rows(), view.offset, split[0]);
    render_groups(f, column, view, split[1]);
}

/// The newest groups, with the active one swapped in while the column follows.
fn shown_groups<'a>(column: &'a Column, view: &ColumnView) -> Vec<&'a Group> {
    let mut shown: Vec<&Group> = column.groups_newest_first().take(MAX_GROUP_PANES).collect();
    let Some(active) = view.active_group.filter(|_| column.follow()) else {
        return shown;
    };
    if shown.iter().any(|group| group.token() == active) {
        return shown;
    }
    if let Some(group) = column.group(active) {
        if shown.len() == MAX_GROUP_PANES {
            shown.pop();
        }
        shown.push(group);
    }
    shown
}

fn render_groups(f: &mut Frame, column: &Column, view: &ColumnView, area: Rect) {
    let shown = shown_groups(column, view);
    let constraints: Vec<Constraint> = shown
        .iter()
        .map(|_| Constraint::Ratio(1, shown.len() as u32))
        .collect();
    let panes = Layout::default()
        .direction(Direction::Vertical)
        .constraints(constraints)
        .split(area);
    for (group, pane) in shown.iter().zip(panes.iter()) {
        let token = group.token().to_string();
        let mut title = format!(" {} ", &token[..TOKEN_PREFIX_LEN]);
        if group.is_finished() {
            title.push_str("done ");
        }
        let border = if group.is_finished() {
            theme::FINISHED_STYLE
        } else if view.active_group == Some(group.token()) {
            theme::SELECTED_BORDER
        } else {
            theme::BORDER
        };
        let block = Block::default()
            .borders(Borders::TOP)
            .title(title)
            .border_style(border);
        let inner = block.inner(*pane);
        f.render_widget(block, *pane);
        render_rows(f, group.rows(), view.group_offset(group.token()), inner);
    }
}

fn render_rows(f: &mut Frame, rows: &RingBuffer, offset: usize, area: Rect) {
    let lines: Vec<Line> = visible_window(rows, usize::from(area.height), offset)
        .into_iter()
        .map(|row| Line::from(Span::styled(row.text.clone(), theme::row_style(row.color.as_ref()))))
        .collect();
    f.render_widget(Paragraph::new(lines), area);
}

fn render_help(f: &mut Frame, area: Rect) {
    let entries = [
        ("tab / l", "next column"),
        ("shift-tab / h", "previous column"),
        ("f / space", "toggle follow"),
        ("k / up", "scroll back"),
        ("j / down", "scroll forward"),
        ("pgup / pgdn", "page"),
        ("G / end", "jump to newest"),
        ("+ / -", "groups per column"),
        ("q", "quit"),
    ];
    let mut lines = vec![Line::from(Span::styled("Keys", theme::HEADER_STYLE)), Line::from("")];
    for (keys, action) in entries {
        lines.push(Line::from(vec![
            Span::styled(format!("{keys:<15}"), theme::SELECTED_BORDER),
            Span::styled(action, theme::TEXT_STYLE),
        ]));
    }
    let block = Block::default()
        .borders(Borders::ALL)
        .title("Help")
        .border_style(theme::PAUSED_STYLE);
    f.render_widget(Clear, area);
    f.render_widget(Paragraph::new(lines).block(block).wrap(Wrap { trim: true }), area);
}

/// Rows that fit in `height` lines, ending `offset` rows before the newest.
pub fn visible_window(rows: &RingBuffer, height: usize, offset: usize) -> Vec<&Row> {
    let len = rows.len();
    let offset = offset.min(len.saturating_sub(1));
    let end = len - offset;
    let start = end.saturating_sub(height);
    rows.iter().skip(start).take(end - start).collect()
}

fn centered(area: Rect, width: u16, height: u16) -> Rect {
    let width = width.min(area.width);
    let height = height.min(area.height);
    Rect {
        x: area.x + (area.width - width) / 2,
        y: area.y + (area.height - height) / 2,
        width,
        height,
    }
}
