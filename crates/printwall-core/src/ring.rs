use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::fmt;

/// Opaque color tag attached to a row by the server.
///
/// The core never interprets it; renderers decide how (or whether) to map it
/// onto a concrete color.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RowColor(pub String);

impl RowColor {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Parses `#rrggbb` / `rrggbb` into components.
    pub fn rgb(&self) -> Option<(u8, u8, u8)> {
        let hex = self.0.trim().trim_start_matches('#');
        if hex.len() != 6 || !hex.is_ascii() {
            return None;
        }
        let r = u8::from_str_radix(&hex[0..2], 16).ok()?;
        let g = u8::from_str_radix(&hex[2..4], 16).ok()?;
        let b = u8::from_str_radix(&hex[4..6], 16).ok()?;
        Some((r, g, b))
    }
}

impl fmt::Display for RowColor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Row {
    pub text: String,
    pub color: Option<RowColor>,
}

impl Row {
    pub fn new(text: impl Into<String>, color: Option<RowColor>) -> Self {
        Self {
            text: text.into(),
            color,
        }
    }
}

/// Fixed-capacity row store that drops the oldest row once full.
#[derive(Debug, Clone)]
pub struct RingBuffer {
    capacity: usize,
    rows: VecDeque<Row>,
    total_appended: u64,
}

impl RingBuffer {
    /// `capacity` is validated by [`crate::ViewConfig`]; a zero capacity keeps
    /// nothing.
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            rows: VecDeque::with_capacity(capacity.min(1024)),
            total_appended: 0,
        }
    }

    /// Appends `row`, returning the evicted oldest row if the bound was hit.
    pub fn push(&mut self, row: Row) -> Option<Row> {
        self.rows.push_back(row);
        self.total_appended += 1;
        if self.rows.len() > self.capacity {
            return self.rows.pop_front();
        }
        None
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn total_appended(&self) -> u64 {
        self.total_appended
    }

    /// Rows discarded so far to honor the capacity.
    pub fn dropped(&self) -> u64 {
        self.total_appended - self.rows.len() as u64
    }

    pub fn iter(&self) -> impl DoubleEndedIterator<Item = &Row> + ExactSizeIterator {
        self.rows.iter()
    }

    pub fn last(&self) -> Option<&Row> {
        self.rows.back()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn texts(buffer: &RingBuffer) -> Vec<String> {
        buffer.iter().map(|row| row.text.clone()).collect()
    }

    #[test]
    fn keeps_most_recent_rows_in_order() {
        let mut buffer = RingBuffer::new(3);
        for idx in 1..=5 {
            buffer.push(Row::new(format!("row-{idx}"), None));
            assert!(buffer.len() <= 3);
        }
        assert_eq!(texts(&buffer), vec!["row-3", "row-4", "row-5"]);
        assert_eq!(buffer.total_appended(), 5);
        assert_eq!(buffer.dropped(), 2);
    }

    #[test]
    fn push_reports_evicted_row() {
        let mut buffer = RingBuffer::new(1);
        assert!(buffer.push(Row::new("a", None)).is_none());
        let evicted = buffer.push(Row::new("b", None)).expect("evicted");
        assert_eq!(evicted.text, "a");
        assert_eq!(buffer.last().map(|row| row.text.as_str()), Some("b"));
    }

    #[test]
    fn overflow_by_one_at_default_capacity() {
        let mut buffer = RingBuffer::new(8192);
        for idx in 1..=8193 {
            buffer.push(Row::new(idx.to_string(), None));
        }
        assert_eq!(buffer.len(), 8192);
        assert_eq!(buffer.iter().next().map(|row| row.text.as_str()), Some("2"));
        assert_eq!(buffer.last().map(|row| row.text.as_str()), Some("8193"));
    }

    #[test]
    fn row_color_parses_hex() {
        assert_eq!(RowColor("#ff8000".to_string()).rgb(), Some((255, 128, 0)));
        assert_eq!(RowColor("00ff00".to_string()).rgb(), Some((0, 255, 0)));
        assert_eq!(RowColor("red".to_string()).rgb(), None);
    }
}
