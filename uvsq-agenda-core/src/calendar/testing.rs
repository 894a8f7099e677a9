use std::{
    collections::HashSet,
    sync::{
        Mutex,
        atomic::{AtomicUsize, Ordering},
    },
    time::Duration,
};

use async_trait::async_trait;

use super::{CalendarService, EventBatch, ItemOutcome};
use crate::{Error, Result, SubmitError};

/// In-memory calendar used by the batch and pipeline tests
#[derive(Default)]
pub struct StubCalendar {
    pub fail_ids: HashSet<String>,
    pub drop_ids: HashSet<String>,
    pub dispatch_error: Option<String>,
    pub ensure_error: Option<String>,
    pub color_error: Option<String>,
    pub reverse_outcomes: bool,
    pub delay: Option<Duration>,
    pub created: AtomicUsize,
    pub batches: AtomicUsize,
    pub ensured: Mutex<Vec<String>>,
    pub colored: AtomicUsize,
}

impl StubCalendar {
    pub fn failing(ids: &[&str]) -> Self {
        Self {
            fail_ids: ids.iter().map(|id| (*id).to_string()).collect(),
            ..Self::default()
        }
    }

    pub fn created(&self) -> usize {
        self.created.load(Ordering::SeqCst)
    }

    pub fn batches(&self) -> usize {
        self.batches.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CalendarService for StubCalendar {
    fn name(&self) -> &str {
        "stub"
    }

    async fn ensure_calendar(&self, summary: &str, _time_zone: &str) -> Result<String> {
        if let Some(message) = &self.ensure_error {
            return Err(Error::Calendar {
                service: "stub".to_string(),
                message: message.clone(),
            });
        }
        self.ensured
            .lock()
            .map_err(|e| Error::Internal(e.to_string()))?
            .push(summary.to_string());
        Ok(format!("{summary}@stub"))
    }

    async fn execute_batch(
        &self,
        _calendar_id: &str,
        batch: &EventBatch,
    ) -> std::result::Result<Vec<ItemOutcome>, SubmitError> {
        self.batches.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if let Some(reason) = &self.dispatch_error {
            return Err(SubmitError::DispatchFailure(reason.clone()));
        }

        let mut outcomes: Vec<ItemOutcome> = batch
            .items()
            .iter()
            .filter(|item| !self.drop_ids.contains(&item.id))
            .map(|item| {
                if self.fail_ids.contains(&item.id) {
                    ItemOutcome::failed(&item.id, "403 Forbidden: Rate Limit Exceeded")
                } else {
                    self.created.fetch_add(1, Ordering::SeqCst);
                    ItemOutcome::created(&item.id)
                }
            })
            .collect();
        if self.reverse_outcomes {
            outcomes.reverse();
        }
        Ok(outcomes)
    }

    async fn randomize_color(&self, _calendar_id: &str) -> Result<()> {
        self.colored.fetch_add(1, Ordering::SeqCst);
        match &self.color_error {
            Some(message) => Err(Error::Calendar {
                service: "stub".to_string(),
                message: message.clone(),
            }),
            None => Ok(()),
        }
    }
}
