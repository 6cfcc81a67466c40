use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::{convert::TryFrom, fmt};

use crate::error::ValidationError;

/// Wire format for calendar dates in requests and responses.
pub const DATE_FORMAT: &str = "%Y-%m-%d";

/// Inclusive calendar date range with `start <= end`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct DateRange {
    start: NaiveDate,
    end: NaiveDate,
}

impl DateRange {
    pub fn new(start: NaiveDate, end: NaiveDate) -> Result<Self, ValidationError> {
        if start > end {
            return Err(ValidationError::StartAfterEnd {
                start: start.format(DATE_FORMAT).to_string(),
                end: end.format(DATE_FORMAT).to_string(),
            });
        }

        Ok(Self { start, end })
    }

    /// Parse a range from two `YYYY-MM-DD` strings.
    pub fn parse(start: &str, end: &str) -> Result<Self, ValidationError> {
        let start = parse_date("startdate", start)?;
        let end = parse_date("enddate", end)?;
        Self::new(start, end)
    }

    pub fn start(&self) -> NaiveDate {
        self.start
    }

    pub fn end(&self) -> NaiveDate {
        self.end
    }

    /// Whole days between `start` and `end`. Zero for a single-day range.
    pub fn span_days(&self) -> i64 {
        (self.end - self.start).num_days()
    }

    /// Reject ranges that end after `today`.
    pub fn ensure_not_after(&self, today: NaiveDate) -> Result<(), ValidationError> {
        if self.end > today {
            return Err(ValidationError::EndInFuture {
                end: self.end.format(DATE_FORMAT).to_string(),
                today: today.format(DATE_FORMAT).to_string(),
            });
        }
        Ok(())
    }
}

impl fmt::Display for DateRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}..{}",
            self.start.format(DATE_FORMAT),
            self.end.format(DATE_FORMAT)
        )
    }
}

/// Parse a single `YYYY-MM-DD` value, naming `field` on failure.
pub fn parse_date(field: &'static str, value: &str) -> Result<NaiveDate, ValidationError> {
    NaiveDate::parse_from_str(value.trim(), DATE_FORMAT).map_err(|_| {
        ValidationError::InvalidDate {
            field,
            value: value.to_string(),
        }
    })
}

/// Measurement system requested from the observations provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Units {
    #[default]
    Metric,
    Standard,
}

impl Units {
    pub fn as_str(&self) -> &'static str {
        match self {
            Units::Metric => "metric",
            Units::Standard => "standard",
        }
    }
}

impl fmt::Display for Units {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl TryFrom<&str> for Units {
    type Error = anyhow::Error;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        match value.to_lowercase().as_str() {
            "metric" => Ok(Units::Metric),
            "standard" => Ok(Units::Standard),
            _ => Err(anyhow::anyhow!(
                "Unknown units '{value}'. Supported units: metric, standard."
            )),
        }
    }
}

/// Unit label attached to normalized records of `datatype_id`.
pub fn unit_label(datatype_id: &str, units: Units) -> &'static str {
    let metric = units == Units::Metric;
    match datatype_id.to_uppercase().as_str() {
        "TMAX" | "TMIN" | "TAVG" | "TOBS" => {
            if metric {
                "°C"
            } else {
                "°F"
            }
        }
        "PRCP" | "SNOW" | "SNWD" => {
            if metric {
                "mm"
            } else {
                "in"
            }
        }
        "AWND" | "WSF2" | "WSF5" => {
            if metric {
                "m/s"
            } else {
                "mph"
            }
        }
        _ => units.as_str(),
    }
}

/// Parameters shared by every window of one observations request.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Query {
    pub datatype_id: String,
    pub location_id: String,
    pub units: Units,
}

impl Query {
    pub fn new(datatype_id: impl Into<String>, location_id: impl Into<String>, units: Units) -> Self {
        Self {
            datatype_id: datatype_id.into(),
            location_id: location_id.into(),
            units,
        }
    }

    pub fn unit_label(&self) -> &'static str {
        unit_label(&self.datatype_id, self.units)
    }
}

/// Observation value as the provider sent it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RawValue {
    Number(f64),
    Text(String),
}

/// One observation in the provider's own shape.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawObservation {
    pub date: String,
    #[serde(default)]
    pub datatype: Option<String>,
    pub station: String,
    #[serde(default)]
    pub attributes: Option<String>,
    pub value: RawValue,
}

/// Normalized observation returned to callers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObservationRecord {
    pub date: NaiveDate,
    pub value: f64,
    #[serde(rename = "station")]
    pub station_id: String,
    pub unit: String,
}

/// Document search parameters for the World Bank WDS API.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentQuery {
    pub topic: String,
    pub region: Option<String>,
    pub start_year: Option<i32>,
    pub end_year: Option<i32>,
    pub rows: u32,
    /// Zero-based index of the first document to return.
    pub offset: u32,
}

impl DocumentQuery {
    /// Select 1-based `page` of `page_size` documents.
    pub fn page(mut self, page: u32, page_size: u32) -> Self {
        self.rows = page_size;
        self.offset = page.saturating_sub(1).saturating_mul(page_size);
        self
    }
}

impl Default for DocumentQuery {
    fn default() -> Self {
        Self {
            topic: "climate change".to_string(),
            region: None,
            start_year: None,
            end_year: None,
            rows: 50,
            offset: 0,
        }
    }
}

/// A page of documents. `documents` is keyed by the provider's document id
/// and passed through untouched.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentPage {
    pub documents: serde_json::Map<String, serde_json::Value>,
    pub total: u64,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OverviewMetadata {
    pub region: Option<String>,
    pub timeframe: String,
    pub query_params: String,
}

/// Recent economy-related climate documents, with the query that produced them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OverviewPage {
    #[serde(flatten)]
    pub page: DocumentPage,
    pub metadata: OverviewMetadata,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, DATE_FORMAT).unwrap()
    }

    #[test]
    fn parse_rejects_malformed_dates() {
        let err = DateRange::parse("2021-13-01", "2021-12-31").unwrap_err();
        assert_eq!(
            err,
            ValidationError::InvalidDate { field: "startdate", value: "2021-13-01".into() }
        );

        let err = DateRange::parse("2021-01-01", "yesterday").unwrap_err();
        assert!(matches!(err, ValidationError::InvalidDate { field: "enddate", .. }));
    }

    #[test]
    fn parse_rejects_start_after_end() {
        let err = DateRange::parse("2022-01-02", "2022-01-01").unwrap_err();
        assert!(matches!(err, ValidationError::StartAfterEnd { .. }));
    }

    #[test]
    fn single_day_range_has_zero_span() {
        let range = DateRange::parse("2021-06-01", "2021-06-01").unwrap();
        assert_eq!(range.span_days(), 0);
        assert_eq!(range.to_string(), "2021-06-01..2021-06-01");
    }

    #[test]
    fn ensure_not_after_today() {
        let range = DateRange::parse("2024-01-01", "2024-03-01").unwrap();
        assert!(range.ensure_not_after(date("2024-03-01")).is_ok());

        let err = range.ensure_not_after(date("2024-02-29")).unwrap_err();
        assert!(matches!(err, ValidationError::EndInFuture { .. }));
    }

    #[test]
    fn unit_labels_follow_datatype_and_units() {
        assert_eq!(unit_label("TMAX", Units::Metric), "°C");
        assert_eq!(unit_label("tmin", Units::Standard), "°F");
        assert_eq!(unit_label("PRCP", Units::Metric), "mm");
        assert_eq!(unit_label("AWND", Units::Standard), "mph");
        assert_eq!(unit_label("EVAP", Units::Metric), "metric");
    }

    #[test]
    fn units_parse_case_insensitively() {
        assert_eq!(Units::try_from("Metric").unwrap(), Units::Metric);
        assert_eq!(Units::try_from("STANDARD").unwrap(), Units::Standard);
        assert!(Units::try_from("kelvin").unwrap_err().to_string().contains("Unknown units"));
    }

    #[test]
    fn raw_value_accepts_numbers_and_strings() {
        let raw: RawObservation = serde_json::from_str(
            r#"{"date":"2021-01-01T00:00:00","datatype":"TMAX","station":"GHCND:USW1","attributes":",,W,","value":12.5}"#,
        )
        .unwrap();
        assert_eq!(raw.value, RawValue::Number(12.5));

        let raw: RawObservation =
            serde_json::from_str(r#"{"date":"2021-01-01","station":"S","value":"3.4"}"#).unwrap();
        assert_eq!(raw.value, RawValue::Text("3.4".into()));
        assert_eq!(raw.datatype, None);
    }

    #[test]
    fn document_pages_translate_to_offsets() {
        let query = DocumentQuery::default().page(1, 10);
        assert_eq!((query.rows, query.offset), (10, 0));

        let query = DocumentQuery::default().page(4, 10);
        assert_eq!(query.offset, 30);

        let query = DocumentQuery::default().page(0, 10);
        assert_eq!(query.offset, 0);
    }

    #[test]
    fn observation_record_serializes_station_field() {
        let record = ObservationRecord {
            date: date("2021-01-02"),
            value: -1.5,
            station_id: "GHCND:USW1".into(),
            unit: "°C".into(),
        };
        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["date"], "2021-01-02");
        assert_eq!(json["station"], "GHCND:USW1");
    }
}
