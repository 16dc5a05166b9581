use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::storage::{self, LocalStore};

pub const HISTORY_KEY: &str = "request_history";
pub const MAX_HISTORY: usize = 50;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RequestHistoryEntry {
    pub operation: String,
    pub method: String,
    pub url: String,
    pub status: u16,
    pub success: bool,
    pub latency_ms: u64,
    pub timestamp: DateTime<Utc>,
}

/// Executed calls, newest first. Write-only from the explorer's point of
/// view: nothing here feeds back into form synthesis.
#[derive(Debug, Default)]
pub struct RequestHistory {
    store: Option<LocalStore>,
    entries: Vec<RequestHistoryEntry>,
}

impl RequestHistory {
    pub fn open(store: LocalStore) -> Self {
        let mut entries: Vec<RequestHistoryEntry> =
            storage::load_list_or_empty(&store, HISTORY_KEY);
        entries.truncate(MAX_HISTORY);
        Self {
            store: Some(store),
            entries,
        }
    }

    pub fn in_memory() -> Self {
        Self::default()
    }

    pub fn record(&mut self, entry: RequestHistoryEntry) {
        self.entries.insert(0, entry);
        self.entries.truncate(MAX_HISTORY);
        if let Some(store) = &self.store {
            storage::save_best_effort(store, HISTORY_KEY, &self.entries);
        }
    }

    pub fn recent(&self, limit: usize) -> &[RequestHistoryEntry] {
        &self.entries[..limit.min(self.entries.len())]
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        if let Some(store) = &self.store {
            if let Err(err) = store.remove(HISTORY_KEY) {
                log::warn!("could not clear {HISTORY_KEY}: {err}");
            }
        }
    }
}
