use chrono::{DateTime, Local};
use std::collections::VecDeque;

use crate::utils::format_clock_label;

#[derive(Debug, Clone, PartialEq)]
pub struct LogEntry {
    pub at: DateTime<Local>,
    pub message: String,
}

impl LogEntry {
    /// `[HH:MM:SS] message`
    pub fn display(&self) -> String {
        format!("[{}] {}", format_clock_label(&self.at), self.message)
    }
}

/// Operator-facing log. Oldest entries are dropped past `max_entries`.
#[derive(Debug, Clone)]
pub struct OperatorLog {
    entries: VecDeque<LogEntry>,
    max_entries: usize,
    dropped: u64,
}

impl OperatorLog {
    pub fn new(max_entries: usize) -> Self {
        let max_entries = max_entries.max(1);
        Self {
            entries: VecDeque::with_capacity(max_entries.min(1024)),
            max_entries,
            dropped: 0,
        }
    }

    pub fn push(&mut self, message: impl Into<String>) {
        self.push_at(Local::now(), message);
    }

    pub fn push_at(&mut self, at: DateTime<Local>, message: impl Into<String>) {
        self.entries.push_back(LogEntry {
            at,
            message: message.into(),
        });
        while self.entries.len() > self.max_entries {
            self.entries.pop_front();
            self.dropped += 1;
        }
    }

    pub fn entries(&self) -> impl Iterator<Item = &LogEntry> {
        self.entries.iter()
    }

    pub fn last(&self) -> Option<&LogEntry> {
        self.entries.back()
    }

    /// Entries rotated out since startup.
    pub fn dropped(&self) -> u64 {
        self.dropped
    }

    /// Number of entries whose message starts with `prefix`.
    pub fn count_prefixed(&self, prefix: &str) -> usize {
        self.entries.iter().filter(|e| e.message.starts_with(prefix)).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn caps_entries() {
        let mut log = OperatorLog::new(3);
        for i in 0..5 {
            log.push(format!("m{i}"));
        }
        let messages: Vec<&str> = log.entries().map(|e| e.message.as_str()).collect();
        assert_eq!(messages, vec!["m2", "m3", "m4"]);
        assert_eq!(log.dropped(), 2);
    }

    #[test]
    fn display_has_clock_prefix() {
        let mut log = OperatorLog::new(10);
        let at = Local::now();
        log.push_at(at, "Connected");
        let line = log.last().unwrap().display();
        assert_eq!(line, format!("[{}] Connected", at.format("%H:%M:%S")));
    }
}
