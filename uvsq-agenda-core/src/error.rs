use thiserror::Error;

/// Failures while pulling the timetable from the Celcat endpoint.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FetchError {
    #[error("Timetable request failed with status code: {0}")]
    HttpStatus(u16),

    #[error("Timetable response is not valid JSON")]
    InvalidFormat,

    #[error("No event was found for the requested group")]
    Empty,

    #[error("Timetable request could not be sent: {0}")]
    Transport(String),

    #[error("Timetable request timed out")]
    Timeout,
}

/// Failures while submitting events to the calendar service.
///
/// `ItemFailure` is collected per sub-request and never aborts the batch;
/// `DispatchFailure` means the batch itself never produced per-item outcomes.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SubmitError {
    #[error("Event {id} could not be created: {reason}")]
    ItemFailure { id: String, reason: String },

    #[error("Batch could not be dispatched: {0}")]
    DispatchFailure(String),
}

#[derive(Error, Debug)]
pub enum Error {
    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error(transparent)]
    Submit(#[from] SubmitError),

    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON parsing failed: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Calendar service error: {service} - {message}")]
    Calendar { service: String, message: String },

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

pub type Result<T> = std::result::Result<T, Error>;
