pub mod base;
pub mod celcat;

use async_trait::async_trait;
use chrono::NaiveDate;

use crate::{CleanedScheduleEntry, FetchError};

pub use base::*;
pub use celcat::CelcatProvider;

/// Timetable source
#[async_trait]
pub trait ScheduleProvider: Send + Sync {
    /// Provider name
    fn name(&self) -> &str;

    /// Provider description
    fn description(&self) -> &str;

    /// Fetch the cleaned events of `group_id` between `start` and `end`.
    ///
    /// An empty result is reported as [`FetchError::Empty`], never as `Ok`.
    async fn fetch(
        &self,
        group_id: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<CleanedScheduleEntry>, FetchError>;
}
