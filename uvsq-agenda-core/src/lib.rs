//! UVSQ Agenda Core Library
//!
//! This library pulls a group's timetable from the UVSQ Celcat endpoint,
//! turns every session into a Google Calendar event and submits them in a
//! single batch.

pub mod batch;
pub mod calendar;
pub mod description;
pub mod error;
pub mod mapper;
pub mod palette;
pub mod pipeline;
pub mod providers;
pub mod types;

// Re-export core types and error handling
pub use error::{Error, FetchError, Result, SubmitError};
pub use types::*;

/// Commonly used items
pub mod prelude {
    pub use crate::{
        batch::*, calendar::*, mapper::*, palette::*, pipeline::*, providers::*, types::*,
    };
}
