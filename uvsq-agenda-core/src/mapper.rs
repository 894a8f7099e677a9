use crate::{CalendarEventPayload, CleanedScheduleEntry, EventTime, palette::ColorPalette};

pub const UNTITLED: &str = "No title";
pub const UNSPECIFIED_TYPE: &str = "Not specified";

/// Turns cleaned timetable entries into calendar events
pub struct EventMapper<'a> {
    palette: &'a ColorPalette,
    time_zone: String,
}

impl<'a> EventMapper<'a> {
    pub fn new(palette: &'a ColorPalette, time_zone: impl Into<String>) -> Self {
        Self {
            palette,
            time_zone: time_zone.into(),
        }
    }

    /// Map one entry. Total: missing fields fall back to placeholders.
    pub fn map(&self, entry: &CleanedScheduleEntry, site: &str) -> CalendarEventPayload {
        let fields = &entry.description;
        let event_type = fields.event_type.as_deref();

        CalendarEventPayload {
            title: fields
                .course_code
                .clone()
                .unwrap_or_else(|| UNTITLED.to_string()),
            location: format!("{}, {}", fields.room.as_deref().unwrap_or(""), site),
            start: self.event_time(entry.start),
            end: self.event_time(entry.end),
            description: format!("Type: {}", event_type.unwrap_or(UNSPECIFIED_TYPE)),
            color: event_type.map_or_else(
                || self.palette.default_color().clone(),
                |t| self.palette.get_color(t).clone(),
            ),
        }
    }

    /// Map every entry with its own faculty as site, order preserved
    pub fn map_all(&self, entries: &[CleanedScheduleEntry]) -> Vec<CalendarEventPayload> {
        entries
            .iter()
            .map(|entry| self.map(entry, entry.faculty.as_deref().unwrap_or("")))
            .collect()
    }

    fn event_time(&self, date_time: chrono::NaiveDateTime) -> EventTime {
        EventTime {
            date_time,
            time_zone: self.time_zone.clone(),
        }
    }
}
