use crate::column::{Column, Group};
use crate::config::{GroupClosePolicy, ViewConfig};
use crate::error::{AddressingError, ConfigError, DispatchError, ProtocolError};
use crate::protocol::{CloseGroup, Command, InitInfo, OpenGroup, PrintLine};
use crate::ring::Row;
use crate::token::GroupToken;
use std::collections::HashMap;
use tracing::debug;

/// Rendering collaborator notified after every state change.
///
/// The session is the only writer; sinks read whatever else they need
/// through [`Session`] accessors.
pub trait RenderSink {
    fn on_column_created(&mut self, _index: usize, _label: &str) {}

    fn on_column_row_appended(&mut self, _index: usize, _row: &Row, _autoscroll: bool) {}

    fn on_group_created(&mut self, _column: usize, _token: GroupToken) {}

    /// `autoscroll` also asks the view to keep this group visible inside
    /// its column.
    fn on_group_row_appended(
        &mut self,
        _column: usize,
        _token: GroupToken,
        _row: &Row,
        _autoscroll: bool,
    ) {
    }

    fn on_group_finished(&mut self, _column: usize, _token: GroupToken) {}

    fn on_group_closed(&mut self, _column: usize, _token: GroupToken) {}
}

/// Sink for callers that only read state after the fact.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullSink;

impl RenderSink for NullSink {}

/// All columns and groups of one connection.
#[derive(Debug, Clone)]
pub struct Session {
    config: ViewConfig,
    columns: Vec<Column>,
    initialized: bool,
    group_owners: HashMap<GroupToken, usize>,
}

impl Session {
    pub fn new(config: ViewConfig) -> Self {
        Self {
            config,
            columns: Vec::new(),
            initialized: false,
            group_owners: HashMap::new(),
        }
    }

    pub fn config(&self) -> &ViewConfig {
        &self.config
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    pub fn column(&self, index: usize) -> Option<&Column> {
        self.columns.get(index)
    }

    /// Looks a live group up by token, whichever column owns it.
    pub fn group(&self, token: GroupToken) -> Option<&Group> {
        let owner = self.group_owners.get(&token)?;
        self.columns.get(*owner)?.group(token)
    }

    pub fn live_group_count(&self) -> usize {
        self.group_owners.len()
    }

    pub fn follow(&self, index: usize) -> Option<bool> {
        self.columns.get(index).map(Column::follow)
    }

    pub fn set_follow(&mut self, index: usize, follow: bool) -> Result<(), AddressingError> {
        self.column_mut(index)?.set_follow(follow);
        Ok(())
    }

    /// Changes the per-column group cap; excess groups are evicted oldest
    /// first and reported to `sink`.
    pub fn set_max_groups<S: RenderSink + ?Sized>(
        &mut self,
        max_groups: usize,
        sink: &mut S,
    ) -> Result<(), ConfigError> {
        let config = ViewConfig {
            max_groups,
            ..self.config.clone()
        }
        .validated()?;
        self.config = config;
        for column in &mut self.columns {
            let evicted = column.set_max_groups(max_groups);
            for token in evicted {
                self.group_owners.remove(&token);
                debug!(
                    "group_evicted: column={} token={token} cap={max_groups}",
                    column.index()
                );
                sink.on_group_closed(column.index(), token);
            }
        }
        Ok(())
    }

    /// Decodes and applies one text frame.
    pub fn handle_text<S: RenderSink + ?Sized>(
        &mut self,
        text: &str,
        sink: &mut S,
    ) -> Result<(), DispatchError> {
        let command = Command::decode(text)?;
        self.apply(command, sink)
    }

    /// Applies one command. On error nothing has been mutated.
    pub fn apply<S: RenderSink + ?Sized>(
        &mut self,
        command: Command,
        sink: &mut S,
    ) -> Result<(), DispatchError> {
        match command {
            Command::InitInfo(info) => self.init_columns(info, sink),
            Command::Print(line) => self.print(line, sink),
            Command::OpenGroup(open) => self.open_group(open, sink),
            Command::CloseGroup(close) => self.close_group(close, sink),
        }
    }

    /// Creation on first use: makes `token` live under `index` unless it is
    /// live already (anywhere), and returns the owning column.
    pub fn ensure_group<S: RenderSink + ?Sized>(
        &mut self,
        index: usize,
        token: GroupToken,
        sink: &mut S,
    ) -> Result<usize, AddressingError> {
        if let Some(owner) = self.group_owners.get(&token) {
            return Ok(*owner);
        }
        let column = self.column_mut(index)?;
        let Some(evicted) = column.open_group(token) else {
            return Ok(index);
        };
        let cap = column.max_groups();
        self.group_owners.insert(token, index);
        sink.on_group_created(index, token);
        for oldest in evicted {
            self.group_owners.remove(&oldest);
            debug!("group_evicted: column={index} token={oldest} cap={cap}");
            sink.on_group_closed(index, oldest);
        }
        Ok(index)
    }

    fn init_columns<S: RenderSink + ?Sized>(
        &mut self,
        info: InitInfo,
        sink: &mut S,
    ) -> Result<(), DispatchError> {
        if self.initialized {
            return Err(ProtocolError::AlreadyInitialized.into());
        }
        self.initialized = true;
        for (index, label) in info.labels.into_iter().enumerate() {
            let label = label.unwrap_or_else(|| format!("column-{index}"));
            let column = Column::new(
                index,
                label,
                self.config.column_capacity,
                self.config.group_capacity,
                self.config.max_groups,
            );
            sink.on_column_created(index, column.label());
            self.columns.push(column);
        }
        debug!("columns_initialized: count={}", self.columns.len());
        Ok(())
    }

    fn print<S: RenderSink + ?Sized>(
        &mut self,
        line: PrintLine,
        sink: &mut S,
    ) -> Result<(), DispatchError> {
        let token = line.group_token()?;
        self.column_mut(line.col_idx)?;
        let row = Row::new(line.data, line.color);

        let Some(token) = token else {
            let index = line.col_idx;
            let column = self.column_mut(index)?;
            let outcome = column.append(row);
            if let Some(row) = column.rows().last() {
                sink.on_column_row_appended(index, row, outcome.autoscroll);
            }
            return Ok(());
        };

        let owner = self.ensure_group(line.col_idx, token, sink)?;
        let column = self.column_mut(owner)?;
        if let Some(outcome) = column.append_to_group(token, row) {
            if let Some(row) = column.group(token).and_then(|group| group.rows().last()) {
                sink.on_group_row_appended(owner, token, row, outcome.autoscroll);
            }
        }
        Ok(())
    }

    fn open_group<S: RenderSink + ?Sized>(
        &mut self,
        open: OpenGroup,
        sink: &mut S,
    ) -> Result<(), DispatchError> {
        let token = open.group_token()?.ok_or_else(|| ProtocolError::MalformedPayload {
            cmd: "open_group",
            reason: "special_id is the no-group sentinel".to_string(),
        })?;
        self.ensure_group(open.col_idx, token, sink)?;
        Ok(())
    }

    fn close_group<S: RenderSink + ?Sized>(
        &mut self,
        close: CloseGroup,
        sink: &mut S,
    ) -> Result<(), DispatchError> {
        let token = close.group_token()?.ok_or_else(|| ProtocolError::MalformedPayload {
            cmd: "close_group",
            reason: "special_id is the no-group sentinel".to_string(),
        })?;
        let Some(owner) = self.group_owners.get(&token).copied() else {
            debug!("close_group_ignored: token={token} not live");
            return Ok(());
        };
        let policy = self.config.close_policy;
        let column = self.column_mut(owner)?;
        match policy {
            GroupClosePolicy::Keep => {
                if column.finish_group(token) {
                    sink.on_group_finished(owner, token);
                }
            }
            GroupClosePolicy::Evict => {
                if column.close_group(token).is_some() {
                    self.group_owners.remove(&token);
                    sink.on_group_closed(owner, token);
                }
            }
        }
        Ok(())
    }

    fn column_mut(&mut self, index: usize) -> Result<&mut Column, AddressingError> {
        let available = self.columns.len();
        self.columns
            .get_mut(index)
            .ok_or(AddressingError::UnknownColumn { index, available })
    }
}
