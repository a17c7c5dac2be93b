//! The app's persisted `localStorage` record and the polling helpers that
//! wait on it.
//!
//! The record is owned by the app under test. It is a JSON array of
//! `{ "title": ..., "completed": ... }` objects stored under a single key.
//! The helpers render `page.waitForFunction` calls that poll the record
//! inside the page until a condition holds or the timeout fails the test.

use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::error::{E2eError, E2eResult};

/// Storage key the React TodoMVC implementation writes to
pub const DEFAULT_STORAGE_KEY: &str = "react-todos";

/// One persisted item
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TodoRecord {
    pub title: String,
    #[serde(default)]
    pub completed: bool,
}

/// Parse the raw storage value. A missing key reads as an empty list.
pub fn parse_records(raw: Option<&str>) -> E2eResult<Vec<TodoRecord>> {
    match raw {
        None => Ok(Vec::new()),
        Some(raw) => serde_json::from_str(raw)
            .map_err(|e| E2eError::Storage(format!("{}: {}", e, raw))),
    }
}

pub fn completed_count(records: &[TodoRecord]) -> usize {
    records.iter().filter(|r| r.completed).count()
}

pub fn contains_title(records: &[TodoRecord], title: &str) -> bool {
    records.iter().any(|r| r.title == title)
}

/// Renders in-page storage polls for one storage key
#[derive(Debug, Clone)]
pub struct StorageProbe {
    key: String,
}

impl StorageProbe {
    pub fn new(key: impl Into<String>) -> Self {
        Self { key: key.into() }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    /// Block until exactly `expected` items are marked completed.
    pub fn wait_for_completed_count(&self, expected: usize, timeout_ms: u64) -> String {
        self.wait_for(
            "JSON.parse(localStorage[key] ?? '[]').filter(i => i.completed).length === value",
            json!(expected),
            timeout_ms,
        )
    }

    /// Block until an item titled `title` has been persisted.
    pub fn wait_for_title(&self, title: &str, timeout_ms: u64) -> String {
        self.wait_for(
            "JSON.parse(localStorage[key] ?? '[]').map(i => i.title).includes(value)",
            json!(title),
            timeout_ms,
        )
    }

    /// Expression evaluating to the raw stored string, or `null`
    pub fn snapshot(&self) -> String {
        format!(
            "page.evaluate((key) => localStorage.getItem(key), {})",
            json!(self.key)
        )
    }

    fn wait_for(&self, predicate: &str, value: serde_json::Value, timeout_ms: u64) -> String {
        let arg = json!({ "key": self.key, "value": value });
        format!(
            "await page.waitForFunction(({{ key, value }}) => {}, {}, {{ timeout: {} }});",
            predicate, arg, timeout_ms
        )
    }
}

impl Default for StorageProbe {
    fn default() -> Self {
        Self::new(DEFAULT_STORAGE_KEY)
    }
}
