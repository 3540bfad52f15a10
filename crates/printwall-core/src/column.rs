use crate::registry::GroupRegistry;
use crate::ring::{RingBuffer, Row};
use crate::token::GroupToken;
use std::collections::HashMap;

/// Result of appending a row to a column or group.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AppendOutcome {
    /// The view showing this sink should jump to the newest row.
    pub autoscroll: bool,
    /// The oldest row was dropped to honor the capacity.
    pub dropped_oldest: bool,
}

/// Output sink for one worker.
#[derive(Debug, Clone)]
pub struct Column {
    index: usize,
    label: String,
    follow: bool,
    rows: RingBuffer,
    groups: HashMap<GroupToken, Group>,
    registry: GroupRegistry,
    group_capacity: usize,
}

impl Column {
    pub fn new(
        index: usize,
        label: impl Into<String>,
        column_capacity: usize,
        group_capacity: usize,
        max_groups: usize,
    ) -> Self {
        Self {
            index,
            label: label.into(),
            follow: true,
            rows: RingBuffer::new(column_capacity),
            groups: HashMap::new(),
            registry: GroupRegistry::new(max_groups),
            group_capacity,
        }
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn follow(&self) -> bool {
        self.follow
    }

    pub fn set_follow(&mut self, follow: bool) {
        self.follow = follow;
    }

    pub fn rows(&self) -> &RingBuffer {
        &self.rows
    }

    pub fn append(&mut self, row: Row) -> AppendOutcome {
        let dropped_oldest = self.rows.push(row).is_some();
        AppendOutcome {
            autoscroll: self.follow,
            dropped_oldest,
        }
    }

    pub fn group(&self, token: GroupToken) -> Option<&Group> {
        self.groups.get(&token)
    }

    pub fn group_count(&self) -> usize {
        self.groups.len()
    }

    pub fn max_groups(&self) -> usize {
        self.registry.max_groups()
    }

    /// Live groups, most recently created first.
    pub fn groups_newest_first(&self) -> impl Iterator<Item = &Group> + '_ {
        self.registry
            .newest_first()
            .filter_map(|token| self.groups.get(&token))
    }

    /// Creates the group if `token` is not live yet. Returns `None` for an
    /// already-live token (order and rows untouched), otherwise the tokens
    /// evicted to make room, oldest first.
    pub(crate) fn open_group(&mut self, token: GroupToken) -> Option<Vec<GroupToken>> {
        if self.groups.contains_key(&token) {
            return None;
        }
        self.groups
            .insert(token, Group::new(token, self.index, self.group_capacity));
        let evicted = self.registry.insert(token);
        for oldest in &evicted {
            self.groups.remove(oldest);
        }
        Some(evicted)
    }

    /// Removes a live group and discards its rows. `None` if not live.
    pub(crate) fn close_group(&mut self, token: GroupToken) -> Option<Group> {
        self.registry.remove(token);
        self.groups.remove(&token)
    }

    pub(crate) fn finish_group(&mut self, token: GroupToken) -> bool {
        match self.groups.get_mut(&token) {
            Some(group) if !group.finished => {
                group.finished = true;
                true
            }
            _ => false,
        }
    }

    /// Appends to a live group. Groups follow their column's scroll lock.
    pub(crate) fn append_to_group(&mut self, token: GroupToken, row: Row) -> Option<AppendOutcome> {
        let follow = self.follow;
        let group = self.groups.get_mut(&token)?;
        let dropped_oldest = group.rows.push(row).is_some();
        Some(AppendOutcome {
            autoscroll: follow,
            dropped_oldest,
        })
    }

    pub(crate) fn set_max_groups(&mut self, max_groups: usize) -> Vec<GroupToken> {
        let evicted = self.registry.set_max_groups(max_groups);
        for oldest in &evicted {
            self.groups.remove(oldest);
        }
        evicted
    }
}

/// Short-lived sink nested in a column, one per unit of work.
#[derive(Debug, Clone)]
pub struct Group {
    token: GroupToken,
    column: usize,
    rows: RingBuffer,
    finished: bool,
}

impl Group {
    fn new(token: GroupToken, column: usize, capacity: usize) -> Self {
        Self {
            token,
            column,
            rows: RingBuffer::new(capacity),
            finished: false,
        }
    }

    pub fn token(&self) -> GroupToken {
        self.token
    }

    pub fn column(&self) -> usize {
        self.column
    }

    pub fn rows(&self) -> &RingBuffer {
        &self.rows
    }

    /// The server closed this group but it is still within the cap.
    pub fn is_finished(&self) -> bool {
        self.finished
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn token(value: u128) -> GroupToken {
        GroupToken::from_u128(value)
    }

    #[test]
    fn new_column_follows_and_is_empty() {
        let column = Column::new(3, "worker-d", 8, 8, 2);
        assert_eq!(column.index(), 3);
        assert_eq!(column.label(), "worker-d");
        assert!(column.follow());
        assert!(column.rows().is_empty());
        assert_eq!(column.group_count(), 0);
    }

    #[test]
    fn append_reports_follow_and_drops() {
        let mut column = Column::new(0, "a", 1, 8, 2);
        let first = column.append(Row::new("one", None));
        assert!(first.autoscroll);
        assert!(!first.dropped_oldest);

        column.set_follow(false);
        let second = column.append(Row::new("two", None));
        assert!(!second.autoscroll);
        assert!(second.dropped_oldest);
    }

    #[test]
    fn reopening_live_group_keeps_rows_and_position() {
        let mut column = Column::new(0, "a", 8, 8, 3);
        column.open_group(token(1)).expect("created");
        column.open_group(token(2)).expect("created");
        column.append_to_group(token(1), Row::new("kept", None));

        assert!(column.open_group(token(1)).is_none());
        let order: Vec<_> = column
            .groups_newest_first()
            .map(|group| group.token())
            .collect();
        assert_eq!(order, vec![token(2), token(1)]);
        assert_eq!(column.group(token(1)).map(|group| group.rows().len()), Some(1));
    }

    #[test]
    fn group_append_follows_column_lock() {
        let mut column = Column::new(0, "a", 8, 8, 3);
        column.open_group(token(7));
        column.set_follow(false);
        let outcome = column
            .append_to_group(token(7), Row::new("x", None))
            .expect("live group");
        assert!(!outcome.autoscroll);
        assert!(column.append_to_group(token(8), Row::new("y", None)).is_none());
    }

    #[test]
    fn eviction_drops_group_rows() {
        let mut column = Column::new(0, "a", 8, 8, 1);
        column.open_group(token(1));
        column.append_to_group(token(1), Row::new("old", None));
        let evicted = column.open_group(token(2)).expect("created");
        assert_eq!(evicted, vec![token(1)]);
        assert!(column.group(token(1)).is_none());
        assert_eq!(column.group_count(), 1);
    }
}
