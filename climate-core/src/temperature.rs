//! Temperature lookups: raw request validation and the report handed back
//! to callers.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::{
    error::{FetchError, ProviderError, ValidationError},
    fetcher::{RangeChunkingFetcher, WindowFetcher, split_into_windows},
    model::{DateRange, ObservationRecord, Query, Units},
};

pub const DEFAULT_DATATYPE: &str = "TMAX";
pub const NO_DATA_MESSAGE: &str = "No data available for the specified criteria";

/// Temperature request as received from the user, before validation.
#[derive(Debug, Clone, Default)]
pub struct TemperatureRequest {
    pub start_date: Option<String>,
    pub end_date: Option<String>,
    pub location_id: Option<String>,
    /// Defaults to `TMAX`.
    pub datatype_id: Option<String>,
    pub units: Units,
}

impl TemperatureRequest {
    /// Check required parameters, date format and range against `today`.
    pub fn validate(&self, today: NaiveDate) -> Result<(DateRange, Query), ValidationError> {
        let start = required("startdate", self.start_date.as_deref())?;
        let end = required("enddate", self.end_date.as_deref())?;
        let location = required("locationId", self.location_id.as_deref())?;

        let range = DateRange::parse(start, end)?;
        range.ensure_not_after(today)?;

        let datatype = self
            .datatype_id
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .unwrap_or(DEFAULT_DATATYPE);

        Ok((range, Query::new(datatype, location, self.units)))
    }
}

fn required<'a>(name: &'static str, value: Option<&'a str>) -> Result<&'a str, ValidationError> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .ok_or(ValidationError::MissingParameter(name))
}

/// Query parameters echoed back with the results.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportParams {
    #[serde(rename = "locationId")]
    pub location_id: String,
    pub datatypeid: String,
    pub startdate: NaiveDate,
    pub enddate: NaiveDate,
    pub units: Units,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportMetadata {
    pub params: ReportParams,
    /// Number of provider windows the range was split into.
    pub windows: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TemperatureReport {
    pub results: Vec<ObservationRecord>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    pub metadata: ReportMetadata,
}

impl TemperatureReport {
    pub fn new(
        range: DateRange,
        query: &Query,
        windows: usize,
        results: Vec<ObservationRecord>,
    ) -> Self {
        let message = results.is_empty().then(|| NO_DATA_MESSAGE.to_string());

        Self {
            results,
            message,
            metadata: ReportMetadata {
                params: ReportParams {
                    location_id: query.location_id.clone(),
                    datatypeid: query.datatype_id.clone(),
                    startdate: range.start(),
                    enddate: range.end(),
                    units: query.units,
                },
                windows,
            },
        }
    }

    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }
}

/// Validate `request` and fetch its observations through `fetcher`.
pub async fn fetch_temperature<S: WindowFetcher>(
    fetcher: &RangeChunkingFetcher<S>,
    request: &TemperatureRequest,
    max_window_days: u32,
) -> Result<TemperatureReport, FetchError> {
    let (range, query) = request.validate(fetcher.today())?;
    let windows = split_into_windows(range, max_window_days)?.len();
    let results = fetcher.fetch_range(range, &query, max_window_days).await?;

    Ok(TemperatureReport::new(range, &query, windows, results))
}

/// JSON error body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorPayload {
    pub error: String,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

impl ErrorPayload {
    fn new(error: &str, message: impl Into<String>) -> Self {
        Self {
            error: error.to_string(),
            message: message.into(),
            details: None,
        }
    }

    pub fn from_validation(err: &ValidationError) -> Self {
        let error = match err {
            ValidationError::MissingParameter(_) => "Missing required parameters",
            ValidationError::InvalidDate { .. } => "Invalid date format",
            ValidationError::StartAfterEnd { .. } | ValidationError::EndInFuture { .. } => {
                "Invalid date range"
            }
            ValidationError::InvalidWindowSize | ValidationError::WindowTooLarge { .. } => {
                "Invalid window size"
            }
        };
        Self::new(error, err.to_string())
    }

    /// `error` names the failed operation, e.g. "Failed to fetch climate documents".
    pub fn from_provider(error: &str, err: &ProviderError) -> Self {
        match err {
            ProviderError::RateLimited { .. } => {
                Self::new("Rate limit exceeded", "Please try again later")
            }
            ProviderError::Status { message, .. } => Self {
                details: Some(err.to_string()),
                ..Self::new(error, message.clone())
            },
            _ => Self::new(error, err.to_string()),
        }
    }

    pub fn from_fetch(err: &FetchError) -> Self {
        const FAILED: &str = "Failed to fetch temperature data";
        match err {
            FetchError::Validation(v) => Self::from_validation(v),
            FetchError::Provider { source, .. } => Self::from_provider(FAILED, source),
            FetchError::InvalidRecord { .. } => Self::new(FAILED, err.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 6, 1).unwrap()
    }

    fn request(start: &str, end: &str) -> TemperatureRequest {
        TemperatureRequest {
            start_date: Some(start.into()),
            end_date: Some(end.into()),
            location_id: Some("FIPS:37".into()),
            ..Default::default()
        }
    }

    #[test]
    fn validate_fills_default_datatype() {
        let (range, query) = request("2021-01-01", "2021-03-01").validate(today()).unwrap();

        assert_eq!(range.to_string(), "2021-01-01..2021-03-01");
        assert_eq!(query.datatype_id, "TMAX");
        assert_eq!(query.location_id, "FIPS:37");
        assert_eq!(query.units, Units::Metric);
    }

    #[test]
    fn validate_reports_missing_parameters() {
        let mut req = request("2021-01-01", "2021-03-01");
        req.location_id = Some("  ".into());
        assert_eq!(
            req.validate(today()).unwrap_err(),
            ValidationError::MissingParameter("locationId")
        );

        let req = TemperatureRequest::default();
        assert_eq!(
            req.validate(today()).unwrap_err(),
            ValidationError::MissingParameter("startdate")
        );
    }

    #[test]
    fn validate_rejects_future_end() {
        let err = request("2024-05-01", "2024-06-02").validate(today()).unwrap_err();
        assert!(matches!(err, ValidationError::EndInFuture { .. }));
    }

    #[test]
    fn empty_report_carries_message() {
        let (range, query) = request("2021-01-01", "2021-03-01").validate(today()).unwrap();
        let report = TemperatureReport::new(range, &query, 1, Vec::new());

        assert!(report.is_empty());
        assert_eq!(report.message.as_deref(), Some(NO_DATA_MESSAGE));

        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["metadata"]["params"]["locationId"], "FIPS:37");
        assert_eq!(json["metadata"]["params"]["startdate"], "2021-01-01");
        assert_eq!(json["results"], serde_json::json!([]));
    }

    #[test]
    fn rate_limit_gets_its_own_payload() {
        let err = ProviderError::RateLimited { message: "quota".into() };
        let payload = ErrorPayload::from_provider("Failed to fetch temperature data", &err);
        assert_eq!(payload.error, "Rate limit exceeded");
        assert_eq!(payload.message, "Please try again later");
    }

    #[test]
    fn validation_payloads_name_the_problem() {
        let payload = ErrorPayload::from_validation(&ValidationError::InvalidDate {
            field: "startdate",
            value: "2021/01/01".into(),
        });
        assert_eq!(payload.error, "Invalid date format");
        assert!(payload.message.contains("YYYY-MM-DD"));
    }
}
