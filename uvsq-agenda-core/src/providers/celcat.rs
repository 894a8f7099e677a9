use async_trait::async_trait;
use chrono::NaiveDate;
use reqwest::StatusCode;
use serde_json::Value;

use crate::{
    CleanedScheduleEntry, DENYLISTED_FIELDS, EXCLUDED_CATEGORY, FetchError, ProviderConfig,
    RawScheduleEntry, Result, description,
    providers::{BaseProvider, BaseProviderBuilder, ScheduleProvider},
};

/// Celcat resource type of student groups
const RES_TYPE: &str = "103";
const CAL_VIEW: &str = "agendaWeek";
const COLOUR_SCHEME: &str = "3";
const DATE_FORMAT: &str = "%Y-%m-%d";

/// Celcat `GetCalendarData` client (UVSQ timetable)
pub struct CelcatProvider {
    base: BaseProvider,
    url: String,
}

impl CelcatProvider {
    pub fn new() -> Result<Self> {
        Self::with_config(&ProviderConfig::default())
    }

    pub fn with_config(config: &ProviderConfig) -> Result<Self> {
        let base = BaseProviderBuilder::from_config(config, "UVSQ Celcat timetable").build()?;
        Ok(Self {
            base,
            url: config.base_url.clone(),
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    fn form(group_id: &str, start: NaiveDate, end: NaiveDate) -> [(&'static str, String); 6] {
        [
            ("start", start.format(DATE_FORMAT).to_string()),
            ("end", end.format(DATE_FORMAT).to_string()),
            ("resType", RES_TYPE.to_string()),
            ("calView", CAL_VIEW.to_string()),
            ("federationIds[]", group_id.to_string()),
            ("colourScheme", COLOUR_SCHEME.to_string()),
        ]
    }
}

/// Turn a `GetCalendarData` response into cleaned entries.
pub fn parse_response(
    status: StatusCode,
    body: &[u8],
) -> std::result::Result<Vec<CleanedScheduleEntry>, FetchError> {
    if status != StatusCode::OK {
        return Err(FetchError::HttpStatus(status.as_u16()));
    }
    let raw: Vec<Value> = serde_json::from_slice(body).map_err(|e| {
        tracing::debug!("unparseable timetable body: {e}");
        FetchError::InvalidFormat
    })?;
    clean_entries(raw)
}

fn category(record: &Value) -> Option<&str> {
    record.get("eventCategory")?.as_str()
}

/// Drop excluded categories, strip denylisted fields and parse descriptions.
///
/// Excluded records are dropped before their fields are read. A retained
/// record that does not decode (missing or malformed timestamps) is skipped
/// on its own. Order is preserved. No retained entry is an error.
pub fn clean_entries(
    raw: Vec<Value>,
) -> std::result::Result<Vec<CleanedScheduleEntry>, FetchError> {
    let total = raw.len();
    let mut excluded = 0;
    let mut cleaned = Vec::with_capacity(total);
    for record in raw {
        if category(&record) == Some(EXCLUDED_CATEGORY) {
            excluded += 1;
            continue;
        }
        match serde_json::from_value::<RawScheduleEntry>(record) {
            Ok(entry) => cleaned.push(clean_entry(entry)),
            Err(e) => tracing::warn!("Skipping undecodable timetable entry: {e}"),
        }
    }

    tracing::debug!(
        "kept {} of {} timetable entries ({} excluded, {} skipped)",
        cleaned.len(),
        total,
        excluded,
        total - excluded - cleaned.len()
    );

    if cleaned.is_empty() {
        return Err(FetchError::Empty);
    }
    Ok(cleaned)
}

fn clean_entry(entry: RawScheduleEntry) -> CleanedScheduleEntry {
    let RawScheduleEntry {
        description,
        start,
        end,
        faculty,
        mut other,
        ..
    } = entry;
    other.retain(|key, _| !DENYLISTED_FIELDS.contains(&key.as_str()));

    CleanedScheduleEntry {
        description: description
            .as_deref()
            .map(description::extract)
            .unwrap_or_default(),
        start,
        end,
        faculty,
        other,
    }
}

#[async_trait]
impl ScheduleProvider for CelcatProvider {
    fn name(&self) -> &str {
        &self.base.info.name
    }

    fn description(&self) -> &str {
        &self.base.info.description
    }

    async fn fetch(
        &self,
        group_id: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> std::result::Result<Vec<CleanedScheduleEntry>, FetchError> {
        tracing::info!(
            "Fetching timetable of group '{}' from {} to {}",
            group_id,
            start,
            end
        );

        let response = self
            .base
            .client
            .post(&self.url)
            .form(&Self::form(group_id, start, end))
            .send()
            .await
            .map_err(|e| self.base.handle_error_req(&e))?;

        let status = response.status();
        if status != StatusCode::OK {
            tracing::warn!("Timetable request for '{}' answered {}", group_id, status);
            return Err(FetchError::HttpStatus(status.as_u16()));
        }

        let body = response
            .bytes()
            .await
            .map_err(|e| self.base.handle_error_req(&e))?;
        let entries = parse_response(status, &body)?;

        tracing::info!(
            "Fetched {} events for group '{}'",
            entries.len(),
            group_id
        );
        Ok(entries)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn body(value: &serde_json::Value) -> Vec<u8> {
        serde_json::to_vec(value).unwrap()
    }

    fn celcat_event(category: &str, description: &str) -> serde_json::Value {
        json!({
            "id": "-1234",
            "start": "2024-01-08T08:00:00",
            "end": "2024-01-08T10:00:00",
            "allDay": false,
            "description": description,
            "backgroundColor": "#FF8080",
            "textColor": "#000000",
            "department": "UFR des Sciences",
            "faculty": "Versailles",
            "eventCategory": category,
            "sites": ["Versailles"],
            "modules": ["IN301"],
            "registerStatus": 0,
            "studentMark": 0,
            "custom1": null,
            "custom2": null,
            "custom3": null
        })
    }

    #[test]
    fn non_200_status_carries_exact_code() {
        let err = parse_response(StatusCode::SERVICE_UNAVAILABLE, b"[]").unwrap_err();
        assert_eq!(err, FetchError::HttpStatus(503));

        let err = parse_response(StatusCode::NOT_FOUND, b"not json").unwrap_err();
        assert_eq!(err, FetchError::HttpStatus(404));
    }

    #[test]
    fn non_json_body_is_invalid_format() {
        let err = parse_response(StatusCode::OK, b"<html>maintenance</html>").unwrap_err();
        assert_eq!(err, FetchError::InvalidFormat);

        let err = parse_response(StatusCode::OK, br#"{"error": "x"}"#).unwrap_err();
        assert_eq!(err, FetchError::InvalidFormat);
    }

    #[test]
    fn only_practical_sessions_is_empty() {
        let payload = json!([
            celcat_event("TP", "TP<br />Salle 12"),
            celcat_event("TP", "TP<br />Salle 13"),
        ]);
        let err = parse_response(StatusCode::OK, &body(&payload)).unwrap_err();
        assert_eq!(err, FetchError::Empty);

        let err = parse_response(StatusCode::OK, b"[]").unwrap_err();
        assert_eq!(err, FetchError::Empty);
    }

    #[test]
    fn retained_entries_are_cleaned_in_order() {
        let payload = json!([
            celcat_event("CM", "CM<br />Amphi A<br />Algo [IN301]"),
            celcat_event("TP", "TP<br />Salle 12"),
            celcat_event("TD", "TD<br />G 105"),
        ]);
        let entries = parse_response(StatusCode::OK, &body(&payload)).unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].description.event_type.as_deref(), Some("CM"));
        assert_eq!(entries[0].description.course_code.as_deref(), Some("IN301"));
        assert_eq!(entries[1].description.event_type.as_deref(), Some("TD"));
        assert_eq!(entries[1].faculty.as_deref(), Some("Versailles"));
    }

    #[test]
    fn denylisted_fields_are_stripped_and_others_kept() {
        let mut event = celcat_event("CM", "CM");
        event["title"] = json!("Algorithmique");
        let entries = parse_response(StatusCode::OK, &body(&json!([event]))).unwrap();

        let other = &entries[0].other;
        assert_eq!(other.get("title"), Some(&json!("Algorithmique")));
        for field in DENYLISTED_FIELDS {
            assert!(!other.contains_key(field), "{field} should be stripped");
        }
    }

    #[test]
    fn excluded_record_is_dropped_before_its_timestamps_are_read() {
        let mut all_day = celcat_event("TP", "TP<br />Salle 12");
        all_day["allDay"] = json!(true);
        all_day["end"] = Value::Null;
        let payload = json!([celcat_event("CM", "CM<br />Amphi A<br />Algo [IN301]"), all_day]);

        let entries = parse_response(StatusCode::OK, &body(&payload)).unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].description.course_code.as_deref(), Some("IN301"));
    }

    #[test]
    fn undecodable_retained_record_is_skipped_alone() {
        let mut no_end = celcat_event("TD", "TD<br />G 105");
        no_end["end"] = Value::Null;
        let mut odd_start = celcat_event("CM", "CM");
        odd_start["start"] = json!("lundi 8h");
        let payload = json!([
            no_end,
            celcat_event("CM", "CM<br />Amphi A<br />Algo [IN301]"),
            odd_start,
            42
        ]);

        let entries = parse_response(StatusCode::OK, &body(&payload)).unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].description.room.as_deref(), Some("Amphi A"));
    }

    #[test]
    fn only_undecodable_records_is_empty() {
        let mut no_end = celcat_event("CM", "CM");
        no_end["end"] = Value::Null;
        let err = parse_response(StatusCode::OK, &body(&json!([no_end]))).unwrap_err();
        assert_eq!(err, FetchError::Empty);
    }

    #[test]
    fn missing_description_gives_empty_fields() {
        let payload = json!([{
            "start": "2024-01-08T08:00",
            "end": "2024-01-08T10:00",
            "eventCategory": "CM"
        }]);
        let entries = parse_response(StatusCode::OK, &body(&payload)).unwrap();
        assert!(entries[0].description.is_empty());
        assert_eq!(entries[0].faculty, None);
    }

    #[test]
    fn form_matches_celcat_parameters() {
        let start = NaiveDate::from_ymd_opt(2024, 1, 8).unwrap();
        let end = NaiveDate::from_ymd_opt(2024, 1, 14).unwrap();
        let form = CelcatProvider::form("M1 Info gr. 1", start, end);
        let expected = [
            ("start", "2024-01-08"),
            ("end", "2024-01-14"),
            ("resType", "103"),
            ("calView", "agendaWeek"),
            ("federationIds[]", "M1 Info gr. 1"),
            ("colourScheme", "3"),
        ];
        for ((key, value), (expected_key, expected_value)) in form.iter().zip(expected) {
            assert_eq!(*key, expected_key);
            assert_eq!(value, expected_value);
        }
    }
}
