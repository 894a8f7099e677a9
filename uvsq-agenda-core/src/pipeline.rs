//! One timetable → calendar run.
//!
//! `Idle → Fetching → Mapping → Submitting → Done`, or `Fetching → Failed`
//! when the timetable cannot be fetched. A failed fetch happens before any
//! calendar mutation; a batch that cannot be dispatched is reported in the
//! [`SyncReport`] and the run still ends in `Done`.

use std::{fmt, future::Future};

use serde::Serialize;

use crate::{
    CalendarEventPayload, CleanedScheduleEntry, Result, SubmitError, SyncOptions, SyncRequest,
    batch::{BatchSubmitter, ItemFailure},
    calendar::CalendarService,
    mapper::EventMapper,
    palette::ColorPalette,
    providers::ScheduleProvider,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum RunState {
    Idle,
    Fetching,
    Mapping,
    Submitting,
    Done,
    Failed,
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Summary of a finished run
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SyncReport {
    pub calendar_id: String,
    pub calendar_name: String,
    pub fetched: usize,
    pub submitted: usize,
    pub succeeded: usize,
    pub failures: Vec<ItemFailure>,
    /// Set when the batch never produced per-item outcomes
    pub dispatch_failure: Option<String>,
    pub state: RunState,
}

impl SyncReport {
    /// Item and dispatch failures, as the submission errors the caller reports
    pub fn warnings(&self) -> impl Iterator<Item = SubmitError> + '_ {
        self.dispatch_failure
            .iter()
            .cloned()
            .map(SubmitError::DispatchFailure)
            .chain(self.failures.iter().cloned().map(SubmitError::from))
    }
}

/// Await a step whose failure must never fail the run; errors are logged.
pub async fn best_effort<T, F>(step: &str, fut: F) -> Option<T>
where
    F: Future<Output = Result<T>>,
{
    match fut.await {
        Ok(value) => Some(value),
        Err(e) => {
            tracing::warn!("Best-effort step '{}' failed: {}", step, e);
            None
        }
    }
}

pub struct SyncPipeline<'a> {
    provider: &'a dyn ScheduleProvider,
    palette: &'a ColorPalette,
    options: SyncOptions,
}

impl<'a> SyncPipeline<'a> {
    pub fn new(
        provider: &'a dyn ScheduleProvider,
        palette: &'a ColorPalette,
        options: SyncOptions,
    ) -> Self {
        Self {
            provider,
            palette,
            options,
        }
    }

    fn transition(state: &mut RunState, next: RunState) {
        tracing::debug!("run state {} -> {}", state, next);
        *state = next;
    }

    async fn fetch(
        &self,
        request: &SyncRequest,
        state: &mut RunState,
    ) -> Result<Vec<CleanedScheduleEntry>> {
        request.validate()?;
        Self::transition(state, RunState::Fetching);
        tracing::debug!(
            "Timetable source: {} ({})",
            self.provider.name(),
            self.provider.description()
        );
        match self
            .provider
            .fetch(&request.group_id, request.start, request.end)
            .await
        {
            Ok(entries) => Ok(entries),
            Err(e) => {
                Self::transition(state, RunState::Failed);
                tracing::warn!("Fetching timetable of '{}' failed: {}", request.group_id, e);
                Err(e.into())
            }
        }
    }

    fn map(&self, entries: &[CleanedScheduleEntry]) -> Vec<CalendarEventPayload> {
        EventMapper::new(self.palette, self.options.time_zone.clone()).map_all(entries)
    }

    /// Fetch and map without touching any calendar
    pub async fn preview(&self, request: &SyncRequest) -> Result<Vec<CalendarEventPayload>> {
        let mut state = RunState::Idle;
        let entries = self.fetch(request, &mut state).await?;
        Ok(self.map(&entries))
    }

    /// Full run against `calendar`
    pub async fn run(
        &self,
        request: &SyncRequest,
        calendar: &dyn CalendarService,
    ) -> Result<SyncReport> {
        let mut state = RunState::Idle;
        let entries = self.fetch(request, &mut state).await?;
        let fetched = entries.len();

        let calendar_name = self.options.calendar_name(&request.group_id);
        let calendar_id = calendar
            .ensure_calendar(&calendar_name, &self.options.time_zone)
            .await?;
        tracing::info!("Target calendar '{}' resolved to {}", calendar_name, calendar_id);
        if self.options.randomize_calendar_color {
            best_effort("randomize calendar colour", calendar.randomize_color(&calendar_id)).await;
        }

        Self::transition(&mut state, RunState::Mapping);
        let payloads = self.map(&entries);

        Self::transition(&mut state, RunState::Submitting);
        let submitted = payloads.len();
        let submitter = BatchSubmitter::new(calendar).with_deadline(self.options.submit_deadline);
        let (succeeded, failures, dispatch_failure) =
            match submitter.submit_batch(payloads, &calendar_id).await {
                Ok(report) => {
                    if report.is_complete_success() {
                        tracing::info!("All {} events created", report.submitted);
                    } else {
                        tracing::warn!(
                            "{} of {} events could not be created",
                            report.failures.len(),
                            report.submitted
                        );
                    }
                    (report.succeeded, report.failures, None)
                }
                Err(SubmitError::DispatchFailure(reason)) => (0, Vec::new(), Some(reason)),
                Err(e) => (0, Vec::new(), Some(e.to_string())),
            };
        Self::transition(&mut state, RunState::Done);

        Ok(SyncReport {
            calendar_id,
            calendar_name,
            fetched,
            submitted,
            succeeded,
            failures,
            dispatch_failure,
            state,
        })
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;
    use chrono::NaiveDate;
    use reqwest::StatusCode;
    use serde_json::json;

    use super::*;
    use crate::{
        ColorToken, Error, FetchError, calendar::testing::StubCalendar,
        providers::celcat::parse_response,
    };

    /// Serves a canned `GetCalendarData` answer through the real cleaning path
    struct CannedProvider {
        status: StatusCode,
        body: Vec<u8>,
        calls: AtomicUsize,
    }

    impl CannedProvider {
        fn new(status: StatusCode, body: &serde_json::Value) -> Self {
            Self {
                status,
                body: serde_json::to_vec(body).unwrap(),
                calls: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl ScheduleProvider for CannedProvider {
        fn name(&self) -> &str {
            "canned"
        }

        fn description(&self) -> &str {
            "canned responses"
        }

        async fn fetch(
            &self,
            _group_id: &str,
            _start: NaiveDate,
            _end: NaiveDate,
        ) -> std::result::Result<Vec<CleanedScheduleEntry>, FetchError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            parse_response(self.status, &self.body)
        }
    }

    fn request() -> SyncRequest {
        SyncRequest {
            group_id: "L3 INFO".to_string(),
            start: NaiveDate::from_ymd_opt(2024, 1, 8).unwrap(),
            end: NaiveDate::from_ymd_opt(2024, 1, 12).unwrap(),
        }
    }

    fn timetable() -> serde_json::Value {
        json!([
            {
                "eventCategory": "TP",
                "description": "TP<br />Salle 12<br />[IN999]",
                "start": "2024-01-08T13:30",
                "end": "2024-01-08T16:30",
                "faculty": "CampusA"
            },
            {
                "eventCategory": "CM",
                "description": "Cours<br />Room 101<br />Info[L3INFO]",
                "start": "2024-01-08T08:00",
                "end": "2024-01-08T10:00",
                "faculty": "CampusA"
            },
            {
                "eventCategory": "TD",
                "description": "TD<br />G 105",
                "start": "2024-01-09T10:00",
                "end": "2024-01-09T12:00",
                "faculty": "CampusB"
            }
        ])
    }

    #[tokio::test]
    async fn end_to_end_filters_cleans_and_maps() {
        let provider = CannedProvider::new(StatusCode::OK, &timetable());
        let pipeline =
            SyncPipeline::new(&provider, ColorPalette::builtin(), SyncOptions::default());

        let payloads = pipeline.preview(&request()).await.unwrap();
        assert_eq!(payloads.len(), 2);

        let cours = &payloads[0];
        assert_eq!(cours.title, "L3INFO");
        assert_eq!(cours.location, "Room 101, CampusA");
        assert!(cours.description.contains("Cours"));
        assert_eq!(&cours.color, ColorPalette::builtin().default_color());
        assert_eq!(cours.start.time_zone, "Europe/Paris");

        let td = &payloads[1];
        assert_eq!(td.title, "No title");
        assert_eq!(td.location, "G 105, CampusB");
        assert_eq!(td.color, ColorToken::Id("8".to_string()));
    }

    #[tokio::test]
    async fn run_creates_calendar_and_submits_every_event() {
        let provider = CannedProvider::new(StatusCode::OK, &timetable());
        let pipeline =
            SyncPipeline::new(&provider, ColorPalette::builtin(), SyncOptions::default());
        let calendar = StubCalendar::default();

        let report = pipeline.run(&request(), &calendar).await.unwrap();
        assert_eq!(report.state, RunState::Done);
        assert_eq!(report.calendar_name, "UVSQ Agenda L3 INFO");
        assert_eq!(report.calendar_id, "UVSQ Agenda L3 INFO@stub");
        assert_eq!(report.fetched, 2);
        assert_eq!(report.submitted, 2);
        assert_eq!(report.succeeded, 2);
        assert!(report.failures.is_empty());
        assert_eq!(report.dispatch_failure, None);
        assert_eq!(calendar.created(), 2);
        assert_eq!(calendar.colored.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn fetch_failure_aborts_before_calendar_mutation() {
        let provider = CannedProvider::new(StatusCode::BAD_GATEWAY, &json!([]));
        let pipeline =
            SyncPipeline::new(&provider, ColorPalette::builtin(), SyncOptions::default());
        let calendar = StubCalendar::default();

        let err = pipeline.run(&request(), &calendar).await.unwrap_err();
        assert!(matches!(err, Error::Fetch(FetchError::HttpStatus(502))));
        assert!(calendar.ensured.lock().unwrap().is_empty());
        assert_eq!(calendar.batches(), 0);
    }

    #[tokio::test]
    async fn only_practical_sessions_is_reported_as_empty() {
        let provider = CannedProvider::new(
            StatusCode::OK,
            &json!([{
                "eventCategory": "TP",
                "description": "TP",
                "start": "2024-01-08T13:30",
                "end": "2024-01-08T16:30"
            }]),
        );
        let pipeline =
            SyncPipeline::new(&provider, ColorPalette::builtin(), SyncOptions::default());
        let calendar = StubCalendar::default();

        let err = pipeline.run(&request(), &calendar).await.unwrap_err();
        assert!(matches!(err, Error::Fetch(FetchError::Empty)));
        assert_eq!(calendar.batches(), 0);
    }

    #[tokio::test]
    async fn invalid_request_is_rejected_before_fetching() {
        let provider = CannedProvider::new(StatusCode::OK, &timetable());
        let pipeline =
            SyncPipeline::new(&provider, ColorPalette::builtin(), SyncOptions::default());
        let reversed = SyncRequest {
            start: NaiveDate::from_ymd_opt(2024, 2, 1).unwrap(),
            ..request()
        };

        let err = pipeline.preview(&reversed).await.unwrap_err();
        assert!(matches!(err, Error::Config(_)));
        assert_eq!(provider.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn dispatch_failure_still_ends_in_done() {
        let provider = CannedProvider::new(StatusCode::OK, &timetable());
        let pipeline =
            SyncPipeline::new(&provider, ColorPalette::builtin(), SyncOptions::default());
        let calendar = StubCalendar {
            dispatch_error: Some("connection refused".to_string()),
            ..StubCalendar::default()
        };

        let report = pipeline.run(&request(), &calendar).await.unwrap();
        assert_eq!(report.state, RunState::Done);
        assert_eq!(report.submitted, 2);
        assert_eq!(report.succeeded, 0);
        assert_eq!(report.dispatch_failure.as_deref(), Some("connection refused"));
        assert_eq!(
            report.warnings().collect::<Vec<_>>(),
            vec![SubmitError::DispatchFailure("connection refused".to_string())]
        );
    }

    #[tokio::test]
    async fn item_failures_are_reported_not_raised() {
        let provider = CannedProvider::new(StatusCode::OK, &timetable());
        let pipeline =
            SyncPipeline::new(&provider, ColorPalette::builtin(), SyncOptions::default());
        let calendar = StubCalendar::failing(&["event-2"]);

        let report = pipeline.run(&request(), &calendar).await.unwrap();
        assert_eq!(report.succeeded, 1);
        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].index, 1);
        assert_eq!(
            report.warnings().collect::<Vec<_>>(),
            vec![SubmitError::ItemFailure {
                id: "event-2".to_string(),
                reason: "403 Forbidden: Rate Limit Exceeded".to_string(),
            }]
        );
    }

    #[tokio::test]
    async fn colour_failure_is_only_logged() {
        let provider = CannedProvider::new(StatusCode::OK, &timetable());
        let pipeline =
            SyncPipeline::new(&provider, ColorPalette::builtin(), SyncOptions::default());
        let calendar = StubCalendar {
            color_error: Some("quota".to_string()),
            ..StubCalendar::default()
        };

        let report = pipeline.run(&request(), &calendar).await.unwrap();
        assert_eq!(report.succeeded, 2);
    }

    #[tokio::test]
    async fn colour_step_can_be_disabled() {
        let provider = CannedProvider::new(StatusCode::OK, &timetable());
        let options = SyncOptions {
            randomize_calendar_color: false,
            ..SyncOptions::default()
        };
        let pipeline = SyncPipeline::new(&provider, ColorPalette::builtin(), options);
        let calendar = StubCalendar::default();

        pipeline.run(&request(), &calendar).await.unwrap();
        assert_eq!(calendar.colored.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn container_failure_is_propagated() {
        let provider = CannedProvider::new(StatusCode::OK, &timetable());
        let pipeline =
            SyncPipeline::new(&provider, ColorPalette::builtin(), SyncOptions::default());
        let calendar = StubCalendar {
            ensure_error: Some("insufficient scope".to_string()),
            ..StubCalendar::default()
        };

        let err = pipeline.run(&request(), &calendar).await.unwrap_err();
        assert!(matches!(err, Error::Calendar { .. }));
        assert_eq!(calendar.batches(), 0);
    }

    #[tokio::test]
    async fn best_effort_swallows_errors() {
        let ok = best_effort("ok", async { Ok::<_, Error>(3) }).await;
        assert_eq!(ok, Some(3));
        let failed = best_effort("boom", async {
            Err::<u8, _>(Error::Internal("boom".to_string()))
        })
        .await;
        assert_eq!(failed, None);
    }
}
