use std::{collections::BTreeMap, time::Duration};

use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Category tag of practical sessions; such entries never reach the calendar.
pub const EXCLUDED_CATEGORY: &str = "TP";

/// Celcat fields that carry nothing useful downstream.
pub const DENYLISTED_FIELDS: [&str; 13] = [
    "registerStatus",
    "studentMark",
    "custom1",
    "custom2",
    "custom3",
    "department",
    "textColor",
    "backgroundColor",
    "allDay",
    "id",
    "sites",
    "eventCategory",
    "modules",
];

const TIMESTAMP_FORMATS: [&str; 2] = ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%dT%H:%M"];
const TIMESTAMP_OUTPUT_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";

/// Parse the local, zone-less timestamps Celcat emits (`2024-01-08T08:00[:00]`).
pub fn parse_timestamp(value: &str) -> Option<NaiveDateTime> {
    let value = value.trim();
    TIMESTAMP_FORMATS
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(value, format).ok())
}

fn de_timestamp<'de, D>(de: D) -> std::result::Result<NaiveDateTime, D::Error>
where
    D: Deserializer<'de>,
{
    let s = String::deserialize(de)?;
    parse_timestamp(&s)
        .ok_or_else(|| serde::de::Error::custom(format!("invalid timestamp '{s}'")))
}

fn ser_timestamp<S>(value: &NaiveDateTime, ser: S) -> std::result::Result<S::Ok, S::Error>
where
    S: Serializer,
{
    ser.serialize_str(&value.format(TIMESTAMP_OUTPUT_FORMAT).to_string())
}

/// Structured content of a Celcat description.
///
/// Every field is optional; a missing line simply leaves the field unset.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DescriptionFields {
    /// Event kind, first non-empty line (`CM`, `TD`, ...)
    #[serde(rename = "Type", skip_serializing_if = "Option::is_none")]
    pub event_type: Option<String>,
    /// Room, second non-empty line
    #[serde(rename = "Salle", skip_serializing_if = "Option::is_none")]
    pub room: Option<String>,
    /// Course unit code, first `[CODE]` token from the third line on
    #[serde(rename = "UE", skip_serializing_if = "Option::is_none")]
    pub course_code: Option<String>,
}

impl DescriptionFields {
    pub const fn is_empty(&self) -> bool {
        self.event_type.is_none() && self.room.is_none() && self.course_code.is_none()
    }
}

/// One event as returned by `GetCalendarData`.
#[derive(Debug, Clone, Deserialize)]
pub struct RawScheduleEntry {
    #[serde(rename = "eventCategory", default)]
    pub event_category: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(deserialize_with = "de_timestamp")]
    pub start: NaiveDateTime,
    #[serde(deserialize_with = "de_timestamp")]
    pub end: NaiveDateTime,
    #[serde(default)]
    pub faculty: Option<String>,
    /// Fields this crate does not interpret
    #[serde(flatten)]
    pub other: BTreeMap<String, serde_json::Value>,
}

/// A retained entry: description parsed, denylisted fields dropped.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CleanedScheduleEntry {
    pub description: DescriptionFields,
    #[serde(serialize_with = "ser_timestamp")]
    pub start: NaiveDateTime,
    #[serde(serialize_with = "ser_timestamp")]
    pub end: NaiveDateTime,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub faculty: Option<String>,
    #[serde(flatten)]
    pub other: BTreeMap<String, serde_json::Value>,
}

/// Colour assigned to an event.
///
/// `Inherit` leaves the colour unset so the event takes the calendar colour.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "Option<String>", into = "Option<String>")]
pub enum ColorToken {
    Inherit,
    Id(String),
}

impl ColorToken {
    pub const fn is_inherit(&self) -> bool {
        matches!(self, Self::Inherit)
    }

    pub fn as_id(&self) -> Option<&str> {
        match self {
            Self::Inherit => None,
            Self::Id(id) => Some(id.as_str()),
        }
    }
}

impl From<Option<String>> for ColorToken {
    fn from(value: Option<String>) -> Self {
        match value {
            Some(id) if !id.trim().is_empty() => Self::Id(id.trim().to_string()),
            _ => Self::Inherit,
        }
    }
}

impl From<ColorToken> for Option<String> {
    fn from(value: ColorToken) -> Self {
        match value {
            ColorToken::Inherit => None,
            ColorToken::Id(id) => Some(id),
        }
    }
}

/// Local date-time tagged with an IANA zone, as Google Calendar expects it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EventTime {
    #[serde(serialize_with = "ser_timestamp")]
    pub date_time: NaiveDateTime,
    pub time_zone: String,
}

/// Event resource sent to the calendar service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CalendarEventPayload {
    #[serde(rename = "summary")]
    pub title: String,
    pub location: String,
    pub start: EventTime,
    pub end: EventTime,
    pub description: String,
    #[serde(rename = "colorId", skip_serializing_if = "ColorToken::is_inherit")]
    pub color: ColorToken,
}

/// Timetable endpoint configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    /// provider name
    pub name: String,
    /// `GetCalendarData` URL
    pub base_url: String,
    /// request timeout in seconds
    pub timeout: Option<u64>,
}

impl ProviderConfig {
    pub const DEFAULT_URL: &'static str = "https://edt.uvsq.fr/Home/GetCalendarData";
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            name: "celcat".to_string(),
            base_url: Self::DEFAULT_URL.to_string(),
            timeout: Some(30),
        }
    }
}

/// Options of one sync run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncOptions {
    /// Calendar name, `{group}` is replaced by the group id
    pub calendar_name_template: String,
    /// Zone every event is tagged with
    pub time_zone: String,
    /// Upper bound for the batch submission, none means the transport default
    pub submit_deadline: Option<Duration>,
    /// Give the target calendar a random colour once resolved
    pub randomize_calendar_color: bool,
}

impl SyncOptions {
    pub fn calendar_name(&self, group_id: &str) -> String {
        self.calendar_name_template.replace("{group}", group_id)
    }
}

impl Default for SyncOptions {
    fn default() -> Self {
        Self {
            calendar_name_template: "UVSQ Agenda {group}".to_string(),
            time_zone: "Europe/Paris".to_string(),
            submit_deadline: None,
            randomize_calendar_color: true,
        }
    }
}

/// Input of a sync run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncRequest {
    pub group_id: String,
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl SyncRequest {
    pub fn validate(&self) -> crate::Result<()> {
        if self.group_id.trim().is_empty() {
            return Err(crate::Error::Config("group id must not be empty".to_string()));
        }
        if self.start > self.end {
            return Err(crate::Error::Config(format!(
                "start date {} is after end date {}",
                self.start, self.end
            )));
        }
        Ok(())
    }
}
