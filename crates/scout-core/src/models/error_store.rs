use std::collections::HashMap;
use std::time::SystemTime;

use parking_lot::Mutex;

#[derive(Clone, Debug, PartialEq)]
pub enum ErrorLevel {
    Warning,
    Error,
}

/// One captured warning/error event, with the structured fields it carried.
#[derive(Clone, Debug)]
pub struct ErrorEntry {
    pub timestamp: SystemTime,
    pub level: ErrorLevel,
    pub message: String,
    pub target: String,
    pub file: Option<String>,
    pub line: Option<u32>,
    pub fields: HashMap<String, String>,
}

/// Capped FIFO log of warnings and errors raised anywhere in the core
/// (failed generations, reconciliation misses, dropped streams). Fed by the
/// error-collector tracing layer; read by whatever surface wants to show a
/// diagnostics log.
pub struct ErrorStore {
    entries: Mutex<Vec<ErrorEntry>>,
    max_entries: usize,
}

impl ErrorStore {
    pub fn new(max_entries: usize) -> Self {
        Self {
            entries: Mutex::new(Vec::new()),
            max_entries,
        }
    }

    pub fn add_entry(&self, entry: ErrorEntry) {
        let mut entries = self.entries.lock();
        entries.push(entry);

        // FIFO eviction when exceeding max
        if entries.len() > self.max_entries {
            entries.remove(0);
        }
    }

    pub fn entries(&self) -> Vec<ErrorEntry> {
        self.entries.lock().clone()
    }

    pub fn error_count(&self) -> usize {
        self.entries
            .lock()
            .iter()
            .filter(|e| e.level == ErrorLevel::Error)
            .count()
    }

    pub fn warning_count(&self) -> usize {
        self.entries
            .lock()
            .iter()
            .filter(|e| e.level == ErrorLevel::Warning)
            .count()
    }

    pub fn clear(&self) {
        self.entries.lock().clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(level: ErrorLevel, message: &str) -> ErrorEntry {
        ErrorEntry {
            timestamp: SystemTime::now(),
            level,
            message: message.to_string(),
            target: "scout_core::tests".to_string(),
            file: None,
            line: None,
            fields: HashMap::new(),
        }
    }

    #[test]
    fn test_counts_by_level() {
        let store = ErrorStore::new(10);
        store.add_entry(entry(ErrorLevel::Error, "e1"));
        store.add_entry(entry(ErrorLevel::Warning, "w1"));
        store.add_entry(entry(ErrorLevel::Error, "e2"));

        assert_eq!(store.error_count(), 2);
        assert_eq!(store.warning_count(), 1);
    }

    #[test]
    fn test_fifo_eviction_at_capacity() {
        let store = ErrorStore::new(2);
        store.add_entry(entry(ErrorLevel::Error, "first"));
        store.add_entry(entry(ErrorLevel::Error, "second"));
        store.add_entry(entry(ErrorLevel::Error, "third"));

        let entries = store.entries();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].message, "second");
        assert_eq!(entries[1].message, "third");
    }

    #[test]
    fn test_clear() {
        let store = ErrorStore::new(10);
        store.add_entry(entry(ErrorLevel::Warning, "w"));
        store.clear();
        assert!(store.entries().is_empty());
    }
}
