//! Best-effort batched event creation.
//!
//! A failing sub-request is reported and the rest of the batch stands. Only a
//! batch that could not be dispatched at all is returned as an error.

use std::{collections::HashMap, time::Duration};

use serde::Serialize;

use crate::{
    CalendarEventPayload, SubmitError,
    calendar::{CalendarService, EventBatch},
};

/// A sub-request the calendar service rejected (or never answered)
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ItemFailure {
    /// Position of the payload in the submitted sequence
    pub index: usize,
    pub id: String,
    pub reason: String,
}

impl From<ItemFailure> for SubmitError {
    fn from(failure: ItemFailure) -> Self {
        Self::ItemFailure {
            id: failure.id,
            reason: failure.reason,
        }
    }
}

/// Outcome of a dispatched batch
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BatchReport {
    pub submitted: usize,
    pub succeeded: usize,
    /// In submission order
    pub failures: Vec<ItemFailure>,
}

impl BatchReport {
    pub fn is_complete_success(&self) -> bool {
        self.failures.is_empty() && self.succeeded == self.submitted
    }
}

pub struct BatchSubmitter<'a> {
    service: &'a dyn CalendarService,
    deadline: Option<Duration>,
}

impl<'a> BatchSubmitter<'a> {
    pub fn new(service: &'a dyn CalendarService) -> Self {
        Self {
            service,
            deadline: None,
        }
    }

    /// Bound the whole batch; expiry is a dispatch failure
    #[must_use]
    pub const fn with_deadline(mut self, deadline: Option<Duration>) -> Self {
        self.deadline = deadline;
        self
    }

    /// Create every payload in `calendar_id` through one batch operation.
    pub async fn submit_batch(
        &self,
        payloads: Vec<CalendarEventPayload>,
        calendar_id: &str,
    ) -> Result<BatchReport, SubmitError> {
        let batch: EventBatch = payloads.into_iter().collect();
        if batch.is_empty() {
            return Ok(BatchReport::default());
        }

        tracing::info!(
            "Submitting {} events to calendar {} via {}",
            batch.len(),
            calendar_id,
            self.service.name()
        );
        let dispatch = self.service.execute_batch(calendar_id, &batch);
        let outcomes = match self.deadline {
            Some(deadline) => tokio::time::timeout(deadline, dispatch)
                .await
                .unwrap_or_else(|_| {
                    Err(SubmitError::DispatchFailure(format!(
                        "deadline of {}s exceeded",
                        deadline.as_secs_f64()
                    )))
                }),
            None => dispatch.await,
        }
        .inspect_err(|e| tracing::warn!("{e}"))?;

        let mut by_id: HashMap<String, Result<(), String>> = HashMap::with_capacity(outcomes.len());
        for outcome in outcomes {
            by_id.entry(outcome.id).or_insert(outcome.result);
        }

        let mut report = BatchReport {
            submitted: batch.len(),
            ..BatchReport::default()
        };
        for (index, item) in batch.items().iter().enumerate() {
            let reason = match by_id.remove(&item.id) {
                Some(Ok(())) => {
                    report.succeeded += 1;
                    continue;
                }
                Some(Err(reason)) => reason,
                None => "no outcome reported for this sub-request".to_string(),
            };
            tracing::warn!(
                "Failed to create event {} ('{}'): {}",
                item.id,
                item.payload.title,
                reason
            );
            report.failures.push(ItemFailure {
                index,
                id: item.id.clone(),
                reason,
            });
        }
        for unknown in by_id.keys() {
            tracing::debug!("Ignoring outcome for unknown sub-request {unknown}");
        }

        tracing::info!(
            "Batch done: {}/{} events created",
            report.succeeded,
            report.submitted
        );
        Ok(report)
    }
}
