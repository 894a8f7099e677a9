//! Calendar service seam.
//!
//! Authentication is not handled here: implementations receive an
//! already-authorised handle (for Google, an OAuth access token).

pub mod google;
#[cfg(test)]
pub(crate) mod testing;

use async_trait::async_trait;

use crate::{CalendarEventPayload, Result, SubmitError};

/// One event-insert sub-request of a batch
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchItem {
    pub id: String,
    pub payload: CalendarEventPayload,
}

/// Ordered set of event inserts sent as a single operation
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EventBatch {
    items: Vec<BatchItem>,
}

impl EventBatch {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue an insert and return its sub-request id
    pub fn add(&mut self, payload: CalendarEventPayload) -> String {
        let id = format!("event-{}", self.items.len() + 1);
        self.items.push(BatchItem {
            id: id.clone(),
            payload,
        });
        id
    }

    pub fn items(&self) -> &[BatchItem] {
        &self.items
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

impl FromIterator<CalendarEventPayload> for EventBatch {
    fn from_iter<I: IntoIterator<Item = CalendarEventPayload>>(iter: I) -> Self {
        let mut batch = Self::new();
        for payload in iter {
            batch.add(payload);
        }
        batch
    }
}

/// Result of one sub-request, in whatever order the service reports it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ItemOutcome {
    pub id: String,
    pub result: std::result::Result<(), String>,
}

impl ItemOutcome {
    pub fn created(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            result: Ok(()),
        }
    }

    pub fn failed(id: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            result: Err(reason.into()),
        }
    }
}

/// Calendar backend trait
#[async_trait]
pub trait CalendarService: Send + Sync {
    /// Service name
    fn name(&self) -> &str;

    /// Return the id of the calendar named `summary`, creating it if needed
    async fn ensure_calendar(&self, summary: &str, time_zone: &str) -> Result<String>;

    /// Send all inserts of `batch` as one operation.
    ///
    /// `Err` means no per-item outcome is known. Outcomes may come back in
    /// any order and may miss items.
    async fn execute_batch(
        &self,
        calendar_id: &str,
        batch: &EventBatch,
    ) -> std::result::Result<Vec<ItemOutcome>, SubmitError>;

    /// Cosmetic: give the calendar a random colour
    async fn randomize_color(&self, calendar_id: &str) -> Result<()> {
        let _ = calendar_id;
        Ok(())
    }
}
