use crate::transport::StreamEvent;
use chrono::{DateTime, Local};
use crossterm::event::{KeyCode, KeyEvent, KeyEventKind};
use printwall_core::{
    Connection, ConnectionState, GroupToken, RenderSink, Row, ViewConfig,
};
use std::collections::HashMap;
use tokio::sync::mpsc;
use tracing::{debug, warn};
use url::Url;

const PAGE_ROWS: usize = 10;

/// Scroll position and recent activity of one column on screen.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ColumnView {
    /// Rows scrolled back from the newest one; zero while following.
    pub offset: usize,
    /// Rows appended since the user stopped following.
    pub unseen: usize,
    pub active_group: Option<GroupToken>,
    /// Per group pane, rows appended while the column was paused.
    pub group_offsets: HashMap<GroupToken, usize>,
}

impl ColumnView {
    pub fn group_offset(&self, token: GroupToken) -> usize {
        self.group_offsets.get(&token).copied().unwrap_or(0)
    }

    fn resume(&mut self) {
        self.offset = 0;
        self.unseen = 0;
        self.group_offsets.clear();
    }
}

/// The rendering side of the session: it mirrors scroll state as the core
/// reports appends and group churn.
#[derive(Debug, Default)]
pub struct ViewState {
    pub columns: Vec<ColumnView>,
    pub groups_opened: u64,
    pub groups_closed: u64,
}

impl ViewState {
    fn column_mut(&mut self, index: usize) -> Option<&mut ColumnView> {
        self.columns.get_mut(index)
    }

    fn track_append(&mut self, index: usize, autoscroll: bool) {
        if let Some(view) = self.column_mut(index) {
            if autoscroll {
                view.resume();
            } else {
                view.offset = view.offset.saturating_add(1);
                view.unseen = view.unseen.saturating_add(1);
            }
        }
    }
}

impl RenderSink for ViewState {
    fn on_column_created(&mut self, index: usize, label: &str) {
        debug!("column_created: index={index} label={label}");
        if self.columns.len() <= index {
            self.columns.resize_with(index + 1, ColumnView::default);
        }
    }

    fn on_column_row_appended(&mut self, index: usize, _row: &Row, autoscroll: bool) {
        self.track_append(index, autoscroll);
    }

    fn on_group_created(&mut self, column: usize, token: GroupToken) {
        self.groups_opened += 1;
        if let Some(view) = self.column_mut(column) {
            view.active_group = Some(token);
        }
    }

    fn on_group_row_appended(
        &mut self,
        column: usize,
        token: GroupToken,
        _row: &Row,
        autoscroll: bool,
    ) {
        if let Some(view) = self.column_mut(column) {
            if autoscroll {
                view.active_group = Some(token);
                view.group_offsets.remove(&token);
            } else {
                *view.group_offsets.entry(token).or_insert(0) += 1;
            }
        }
    }

    fn on_group_finished(&mut self, column: usize, token: GroupToken) {
        debug!("group_finished: column={column} token={token}");
    }

    fn on_group_closed(&mut self, column: usize, token: GroupToken) {
        self.groups_closed += 1;
        if let Some(view) = self.column_mut(column) {
            view.group_offsets.remove(&token);
            if view.active_group == Some(token) {
                view.active_group = None;
            }
        }
    }
}

pub struct App {
    pub url: Url,
    pub view_config: ViewConfig,
    pub connection: Connection,
    pub view: ViewState,
    pub selected: usize,
    pub status_note: Option<String>,
    pub connected_at: Option<DateTime<Local>>,
    pub reconnects: u64,
    pub show_help: bool,
    outbound: mpsc::Sender<String>,
}

impl App {
    pub fn new(url: Url, view_config: ViewConfig, outbound: mpsc::Sender<String>) -> Self {
        Self {
            url,
            connection: Connection::new(view_config.clone()),
            view_config,
            view: ViewState::default(),
            selected: 0,
            status_note: None,
            connected_at: None,
            reconnects: 0,
            show_help: false,
            outbound,
        }
    }

    pub fn apply_stream_event(&mut self, event: StreamEvent) {
        match event {
            StreamEvent::Connected => {
                if self.connection.state() != ConnectionState::Connecting {
                    self.connection = Connection::new(self.view_config.clone());
                    self.view = ViewState::default();
                    self.selected = 0;
                    self.reconnects += 1;
                }
                if let Some(greeting) = self.connection.open() {
                    if let Err(err) = self.outbound.try_send(greeting.to_string()) {
                        warn!("greeting_send_error: {err}");
                    }
                }
                let now = Local::now();
                self.connected_at = Some(now);
                self.status_note = Some(format!("connected at {}", now.format("%H:%M:%S")));
            }
            StreamEvent::Frame(text) => {
                if let Err(err) = self.connection.deliver(&text, &mut self.view) {
                    warn!("message_rejected: {err}");
                    self.status_note = Some(format!("rejected: {err}"));
                }
            }
            StreamEvent::Disconnected(reason) => {
                self.connection.fail(reason.clone());
                self.connected_at = None;
                self.status_note = Some(format!(
                    "disconnected at {}: {reason}",
                    Local::now().format("%H:%M:%S")
                ));
            }
        }
    }

    pub fn selected_follow(&self) -> Option<bool> {
        self.connection.session().follow(self.selected)
    }

    /// Returns true when the viewer should exit.
    pub fn handle_key(&mut self, key: KeyEvent) -> bool {
        if key.kind != KeyEventKind::Press {
            return false;
        }
        if matches!(key.code, KeyCode::Char('?')) {
            self.show_help = !self.show_help;
            return false;
        }
        if key.code == KeyCode::Esc && self.show_help {
            self.show_help = false;
            return false;
        }
        match key.code {
            KeyCode::Char('q') | KeyCode::Esc => return true,
            KeyCode::Left | KeyCode::Char('h') | KeyCode::BackTab => self.select_previous(),
            KeyCode::Right | KeyCode::Char('l') | KeyCode::Tab => self.select_next(),
            KeyCode::Char('f') | KeyCode::Char(' ') => {
                if let Some(follow) = self.selected_follow() {
                    self.set_follow(!follow);
                }
            }
            KeyCode::Up | KeyCode::Char('k') => self.scroll_back(1),
            KeyCode::PageUp => self.scroll_back(PAGE_ROWS),
            KeyCode::Down | KeyCode::Char('j') => self.scroll_forward(1),
            KeyCode::PageDown => self.scroll_forward(PAGE_ROWS),
            KeyCode::End | KeyCode::Char('G') => self.set_follow(true),
            KeyCode::Char('+') => self.adjust_max_groups(1),
            KeyCode::Char('-') => self.adjust_max_groups(-1),
            _ => {}
        }
        false
    }

    fn adjust_max_groups(&mut self, delta: isize) {
        let current = self.connection.session().config().max_groups;
        let next = current.saturating_add_signed(delta);
        match self.connection.set_max_groups(next, &mut self.view) {
            Ok(()) => {
                self.view_config.max_groups = next;
                self.status_note = Some(format!("max groups per column: {next}"));
            }
            Err(err) => self.status_note = Some(format!("max groups: {err}")),
        }
    }

    fn select_next(&mut self) {
        let count = self.connection.session().columns().len();
        if count > 0 {
            self.selected = (self.selected + 1) % count;
        }
    }

    fn select_previous(&mut self) {
        let count = self.connection.session().columns().len();
        if count > 0 {
            self.selected = (self.selected + count - 1) % count;
        }
    }

    fn set_follow(&mut self, follow: bool) {
        if let Err(err) = self.connection.set_follow(self.selected, follow) {
            self.status_note = Some(format!("follow: {err}"));
            return;
        }
        if follow {
            if let Some(view) = self.view.column_mut(self.selected) {
                view.resume();
            }
        }
    }

    fn scroll_back(&mut self, rows: usize) {
        let Some(len) = self
            .connection
            .session()
            .column(self.selected)
            .map(|column| column.rows().len())
        else {
            return;
        };
        if self.selected_follow() == Some(true) {
            self.set_follow(false);
        }
        if let Some(view) = self.view.column_mut(self.selected) {
            view.offset = (view.offset + rows).min(len.saturating_sub(1));
        }
    }

    fn scroll_forward(&mut self, rows: usize) {
        let Some(view) = self.view.column_mut(self.selected) else {
            return;
        };
        view.offset = view.offset.saturating_sub(rows);
        if view.offset == 0 {
            self.set_follow(true);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crossterm::event::KeyModifiers;

    fn app() -> (App, mpsc::Receiver<String>) {
        let (tx, rx) = mpsc::channel(4);
        let url = Url::parse("ws://127.0.0.1:8092/ws").expect("url");
        (App::new(url, ViewConfig::new(4).expect("config"), tx), rx)
    }

    fn key(code: KeyCode) -> KeyEvent {
        KeyEvent::new(code, KeyModifiers::NONE)
    }

    fn frame(text: &str) -> StreamEvent {
        StreamEvent::Frame(text.to_string())
    }

    #[test]
    fn connect_sends_greeting_and_applies_frames() {
        let (mut app, mut rx) = app();
        app.apply_stream_event(StreamEvent::Connected);
        assert_eq!(rx.try_recv().expect("greeting"), printwall_core::GREETING);

        app.apply_stream_event(frame(r#"{"cmd":"init_info","val":["a","b"]}"#));
        app.apply_stream_event(frame(r#"{"cmd":"print","val":{"col_idx":1,"data":"hi"}}"#));
        assert_eq!(app.view.columns.len(), 2);
        assert_eq!(app.connection.session().columns()[1].label(), "b");
        assert_eq!(app.connection.session().columns()[1].rows().len(), 1);
    }

    #[test]
    fn rejected_frame_sets_status_note() {
        let (mut app, _rx) = app();
        app.apply_stream_event(StreamEvent::Connected);
        app.apply_stream_event(frame(r#"{"cmd":"print","val":{"col_idx":0,"data":"x"}}"#));
        let note = app.status_note.clone().expect("note");
        assert!(note.starts_with("rejected:"), "{note}");
        assert_eq!(app.connection.rejected(), 1);
    }

    #[test]
    fn reconnect_starts_fresh_connection() {
        let (mut app, mut rx) = app();
        app.apply_stream_event(StreamEvent::Connected);
        app.apply_stream_event(frame(r#"{"cmd":"init_info","val":["a"]}"#));
        app.apply_stream_event(StreamEvent::Disconnected("reset".to_string()));
        assert_eq!(app.connection.state(), ConnectionState::Closed);
        assert_eq!(app.connection.session().columns().len(), 1);

        app.apply_stream_event(StreamEvent::Connected);
        assert_eq!(app.connection.state(), ConnectionState::Open);
        assert!(!app.connection.session().is_initialized());
        assert!(app.view.columns.is_empty());
        assert_eq!(app.reconnects, 1);
        assert!(rx.try_recv().is_ok());
        assert!(rx.try_recv().is_ok());
    }

    #[test]
    fn scrolling_back_stops_follow_and_counts_unseen() {
        let (mut app, _rx) = app();
        app.apply_stream_event(StreamEvent::Connected);
        app.apply_stream_event(frame(r#"{"cmd":"init_info","val":["a"]}"#));
        for idx in 0..5 {
            app.apply_stream_event(frame(&format!(
                r#"{{"cmd":"print","val":{{"col_idx":0,"data":"row {idx}"}}}}"#
            )));
        }
        app.handle_key(key(KeyCode::Up));
        assert_eq!(app.selected_follow(), Some(false));
        assert_eq!(app.view.columns[0].offset, 1);

        app.apply_stream_event(frame(r#"{"cmd":"print","val":{"col_idx":0,"data":"late"}}"#));
        assert_eq!(app.view.columns[0].offset, 2);
        assert_eq!(app.view.columns[0].unseen, 1);

        app.handle_key(key(KeyCode::End));
        assert_eq!(app.selected_follow(), Some(true));
        assert_eq!(app.view.columns[0], ColumnView::default());
    }

    #[test]
    fn follow_toggle_targets_selected_column() {
        let (mut app, _rx) = app();
        app.apply_stream_event(StreamEvent::Connected);
        app.apply_stream_event(frame(r#"{"cmd":"init_info","val":["a","b"]}"#));
        app.handle_key(key(KeyCode::Tab));
        app.handle_key(key(KeyCode::Char('f')));
        assert_eq!(app.connection.session().follow(0), Some(true));
        assert_eq!(app.connection.session().follow(1), Some(false));
        app.handle_key(key(KeyCode::Tab));
        assert_eq!(app.selected, 0);
    }

    #[test]
    fn group_activity_tracks_latest_token() {
        let (mut app, _rx) = app();
        app.apply_stream_event(StreamEvent::Connected);
        app.apply_stream_event(frame(r#"{"cmd":"init_info","val":["a"]}"#));
        let id = "ab".repeat(16);
        app.apply_stream_event(frame(&format!(
            r#"{{"cmd":"open_group","val":{{"col_idx":0,"special_id":"{id}"}}}}"#
        )));
        let token: GroupToken = id.parse().expect("token");
        assert_eq!(app.view.columns[0].active_group, Some(token));
        assert_eq!(app.view.groups_opened, 1);
    }

    #[test]
    fn paused_group_rows_hold_that_pane_still() {
        let (mut app, _rx) = app();
        app.apply_stream_event(StreamEvent::Connected);
        app.apply_stream_event(frame(r#"{"cmd":"init_info","val":["a"]}"#));
        let (first, second) = ("1".repeat(32), "2".repeat(32));
        for id in [&first, &second] {
            app.apply_stream_event(frame(&format!(
                r#"{{"cmd":"open_group","val":{{"col_idx":0,"special_id":"{id}"}}}}"#
            )));
        }
        app.handle_key(key(KeyCode::Char('f')));
        for _ in 0..3 {
            app.apply_stream_event(frame(&format!(
                r#"{{"cmd":"print","val":{{"col_idx":0,"special_id":"{first}","data":"late"}}}}"#
            )));
        }
        let first: GroupToken = first.parse().expect("token");
        let second: GroupToken = second.parse().expect("token");
        assert_eq!(app.view.columns[0].group_offset(first), 3);
        assert_eq!(app.view.columns[0].group_offset(second), 0);
        assert_eq!(app.view.columns[0].active_group, Some(second));

        app.handle_key(key(KeyCode::Char('f')));
        assert_eq!(app.view.columns[0].group_offset(first), 0);
        app.apply_stream_event(frame(&format!(
            r#"{{"cmd":"print","val":{{"col_idx":0,"special_id":"{first}","data":"now"}}}}"#
        )));
        assert_eq!(app.view.columns[0].active_group, Some(first));
    }

    #[test]
    fn max_groups_keys_evict_and_survive_reconnect() {
        let (mut app, _rx) = app();
        app.apply_stream_event(StreamEvent::Connected);
        app.apply_stream_event(frame(r#"{"cmd":"init_info","val":["a"]}"#));
        for id in ["1", "2"] {
            let special_id = id.repeat(32);
            app.apply_stream_event(frame(&format!(
                r#"{{"cmd":"open_group","val":{{"col_idx":0,"special_id":"{special_id}"}}}}"#
            )));
        }
        for _ in 0..3 {
            app.handle_key(key(KeyCode::Char('-')));
        }
        assert_eq!(app.connection.session().live_group_count(), 1);
        assert_eq!(app.view.groups_closed, 1);
        assert_eq!(app.view_config.max_groups, 1);

        app.apply_stream_event(StreamEvent::Disconnected("bye".to_string()));
        app.apply_stream_event(StreamEvent::Connected);
        assert_eq!(app.connection.session().config().max_groups, 1);
    }

    #[test]
    fn quit_keys() {
        let (mut app, _rx) = app();
        assert!(app.handle_key(key(KeyCode::Char('q'))));
        app.handle_key(key(KeyCode::Char('?')));
        assert!(!app.handle_key(key(KeyCode::Esc)));
        assert!(!app.show_help);
    }
}
