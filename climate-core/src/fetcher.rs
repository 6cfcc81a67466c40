//! Chunked retrieval of observations over long date ranges.
//!
//! The observations provider rejects ranges longer than one year, so a long
//! range is split into windows, each window is fetched through a
//! [`WindowFetcher`], and the results are merged back into one series
//! ordered by date.

use async_trait::async_trait;
use chrono::{Days, Months, NaiveDate, NaiveDateTime, Utc};
use futures::{StreamExt, TryStreamExt, stream};
use std::fmt::Debug;
use tracing::{debug, info};

use crate::{
    error::{FetchError, ProviderError, ValidationError},
    model::{DATE_FORMAT, DateRange, ObservationRecord, Query, RawObservation, RawValue},
};

pub const DEFAULT_MAX_WINDOW_DAYS: u32 = 365;
/// Longest window the observations provider accepts.
pub const PROVIDER_MAX_WINDOW_DAYS: u32 = 365;
pub const DEFAULT_MAX_CONCURRENCY: usize = 4;

/// Fetches the raw observations of a single window.
#[async_trait]
pub trait WindowFetcher: Send + Sync + Debug {
    async fn fetch_window(
        &self,
        window: &DateRange,
        query: &Query,
    ) -> Result<Vec<RawObservation>, ProviderError>;
}

/// Split `range` into contiguous windows whose span never exceeds
/// `max_window_days` (at most [`PROVIDER_MAX_WINDOW_DAYS`]).
///
/// A range that already fits is returned as the only window. Otherwise every
/// window spans `max_window_days` but stops short of its start date's
/// anniversary, and the last one is clipped to `range.end()`.
pub fn split_into_windows(
    range: DateRange,
    max_window_days: u32,
) -> Result<Vec<DateRange>, ValidationError> {
    if max_window_days == 0 {
        return Err(ValidationError::InvalidWindowSize);
    }
    if max_window_days > PROVIDER_MAX_WINDOW_DAYS {
        return Err(ValidationError::WindowTooLarge {
            requested: max_window_days,
            limit: PROVIDER_MAX_WINDOW_DAYS,
        });
    }

    if range.span_days() <= i64::from(max_window_days) {
        return Ok(vec![range]);
    }

    let mut windows = Vec::new();
    let mut start = range.start();

    loop {
        let end = window_end(start, max_window_days).min(range.end());
        windows.push(DateRange::new(start, end)?);

        if end >= range.end() {
            break;
        }

        match end.succ_opt() {
            Some(next) => start = next,
            None => break,
        }
    }

    Ok(windows)
}

fn window_end(start: NaiveDate, max_window_days: u32) -> NaiveDate {
    let by_days = start
        .checked_add_days(Days::new(u64::from(max_window_days)))
        .unwrap_or(NaiveDate::MAX);
    let by_year = start
        .checked_add_months(Months::new(12))
        .and_then(|d| d.pred_opt())
        .unwrap_or(NaiveDate::MAX);

    by_days.min(by_year)
}

/// Turn a provider record into an [`ObservationRecord`] carrying `unit`.
pub fn normalize(raw: RawObservation, unit: &str) -> Result<ObservationRecord, FetchError> {
    let invalid = |reason: String| FetchError::InvalidRecord {
        station: raw.station.clone(),
        reason,
    };

    let date = parse_record_date(&raw.date)
        .ok_or_else(|| invalid(format!("unrecognized date '{}'", raw.date)))?;

    let value = match &raw.value {
        RawValue::Number(v) => *v,
        RawValue::Text(s) => s
            .trim()
            .parse::<f64>()
            .map_err(|_| invalid(format!("non-numeric value '{s}'")))?,
    };

    if !value.is_finite() {
        return Err(invalid(format!("non-finite value {value}")));
    }

    Ok(ObservationRecord {
        date,
        value,
        station_id: raw.station,
        unit: unit.to_string(),
    })
}

fn parse_record_date(value: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(value, DATE_FORMAT)
        .ok()
        .or_else(|| {
            NaiveDateTime::parse_from_str(value, "%Y-%m-%dT%H:%M:%S%.f")
                .ok()
                .map(|dt| dt.date())
        })
}

/// Fetches a date range window by window and merges the results.
#[derive(Debug, Clone)]
pub struct RangeChunkingFetcher<S> {
    source: S,
    today: NaiveDate,
    max_concurrency: usize,
}

impl<S: WindowFetcher> RangeChunkingFetcher<S> {
    pub fn new(source: S) -> Self {
        Self {
            source,
            today: Utc::now().date_naive(),
            max_concurrency: DEFAULT_MAX_CONCURRENCY,
        }
    }

    /// Reference date used to reject ranges ending in the future.
    pub fn with_today(mut self, today: NaiveDate) -> Self {
        self.today = today;
        self
    }

    /// Upper bound on window requests in flight at once (at least 1).
    pub fn with_max_concurrency(mut self, max_concurrency: usize) -> Self {
        self.max_concurrency = max_concurrency.max(1);
        self
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    pub fn today(&self) -> NaiveDate {
        self.today
    }

    /// Fetch every observation in `range`, ascending by date.
    ///
    /// Fails as a whole if any window fails; an empty result is not an error.
    pub async fn fetch_range(
        &self,
        range: DateRange,
        query: &Query,
        max_window_days: u32,
    ) -> Result<Vec<ObservationRecord>, FetchError> {
        range.ensure_not_after(self.today)?;
        let windows = split_into_windows(range, max_window_days)?;

        info!(
            range = %range,
            windows = windows.len(),
            location = %query.location_id,
            datatype = %query.datatype_id,
            "fetching observations"
        );

        let source = &self.source;
        let batches: Vec<Vec<RawObservation>> = stream::iter(windows)
            .map(|window| async move {
                debug!(
                    window_start = %window.start(),
                    window_end = %window.end(),
                    "fetching window"
                );
                source
                    .fetch_window(&window, query)
                    .await
                    .map_err(|err| FetchError::Provider { window, source: err })
            })
            .buffered(self.max_concurrency)
            .try_collect()
            .await?;

        let unit = query.unit_label();
        let mut records = batches
            .into_iter()
            .flatten()
            .map(|raw| normalize(raw, unit))
            .collect::<Result<Vec<_>, _>>()?;

        // Stable: records sharing a date keep their arrival order.
        records.sort_by_key(|record| record.date);

        debug!(count = records.len(), "merged observations");
        Ok(records)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn range(start: &str, end: &str) -> DateRange {
        DateRange::parse(start, end).unwrap()
    }

    fn raw(date: &str, value: RawValue) -> RawObservation {
        RawObservation {
            date: date.to_string(),
            datatype: Some("TMAX".into()),
            station: "GHCND:USW00013874".into(),
            attributes: None,
            value,
        }
    }

    #[test]
    fn multi_year_range_splits_into_calendar_years() {
        let windows = split_into_windows(range("2020-01-01", "2022-06-15"), 365).unwrap();

        assert_eq!(
            windows,
            vec![
                range("2020-01-01", "2020-12-31"),
                range("2021-01-01", "2021-12-31"),
                range("2022-01-01", "2022-06-15"),
            ]
        );
    }

    #[test]
    fn short_range_is_a_single_window() {
        let input = range("2021-01-01", "2021-03-01");
        assert_eq!(split_into_windows(input, 365).unwrap(), vec![input]);

        let exact = range("2021-01-01", "2022-01-01");
        assert_eq!(exact.span_days(), 365);
        assert_eq!(split_into_windows(exact, 365).unwrap(), vec![exact]);
    }

    #[test]
    fn zero_window_size_is_rejected() {
        let err = split_into_windows(range("2021-01-01", "2021-03-01"), 0).unwrap_err();
        assert_eq!(err, ValidationError::InvalidWindowSize);
    }

    #[test]
    fn window_size_above_provider_limit_is_rejected() {
        for input in [range("2015-01-01", "2018-12-31"), range("2015-01-01", "2016-02-04")] {
            let err = split_into_windows(input, 400).unwrap_err();
            assert_eq!(err, ValidationError::WindowTooLarge { requested: 400, limit: 365 });
        }
    }

    #[test]
    fn shorter_window_size_is_honored_exactly() {
        let windows = split_into_windows(range("2015-01-01", "2016-12-31"), 200).unwrap();

        assert_eq!(windows.len(), 4);
        for window in &windows[..3] {
            assert_eq!(window.span_days(), 200);
        }
        assert_eq!(windows[0], range("2015-01-01", "2015-07-20"));
        assert_eq!(windows[1].start(), NaiveDate::from_ymd_opt(2015, 7, 21).unwrap());
        assert_eq!(windows[3].end(), NaiveDate::from_ymd_opt(2016, 12, 31).unwrap());
    }

    #[test]
    fn windows_are_contiguous_and_cover_the_range() {
        let cases = [
            ("2000-02-29", "2009-07-04", 365),
            ("2019-03-15", "2021-03-16", 365),
            ("2021-01-01", "2021-02-15", 10),
            ("2021-01-01", "2021-01-12", 1),
            ("2015-12-31", "2024-01-01", 300),
        ];

        for (start, end, max) in cases {
            let input = range(start, end);
            let windows = split_into_windows(input, max).unwrap();

            assert!(windows.len() > 1, "{input} should be chunked");
            assert_eq!(windows.first().unwrap().start(), input.start());
            assert_eq!(windows.last().unwrap().end(), input.end());

            for window in &windows {
                assert!(window.span_days() <= i64::from(max), "{window} exceeds {max} days");
            }
            for pair in windows.windows(2) {
                assert_eq!(pair[0].end().succ_opt(), Some(pair[1].start()));
            }
        }
    }

    #[test]
    fn leap_day_window_stops_before_anniversary() {
        let windows = split_into_windows(range("2020-02-29", "2022-01-01"), 365).unwrap();
        assert_eq!(windows[0], range("2020-02-29", "2021-02-27"));
        assert_eq!(windows[1].start(), NaiveDate::from_ymd_opt(2021, 2, 28).unwrap());
    }

    #[test]
    fn normalize_parses_values_and_dates() {
        let record = normalize(raw("2021-01-02T00:00:00", RawValue::Number(4.4)), "°C").unwrap();
        assert_eq!(record.date, NaiveDate::from_ymd_opt(2021, 1, 2).unwrap());
        assert_eq!(record.value, 4.4);
        assert_eq!(record.station_id, "GHCND:USW00013874");
        assert_eq!(record.unit, "°C");

        let record = normalize(raw("2021-01-03", RawValue::Text(" -2.5 ".into())), "°F").unwrap();
        assert_eq!(record.value, -2.5);
        assert_eq!(record.unit, "°F");
    }

    #[test]
    fn normalize_rejects_garbage() {
        let err = normalize(raw("2021-01-02", RawValue::Text("n/a".into())), "°C").unwrap_err();
        assert!(err.to_string().contains("non-numeric value 'n/a'"));

        let err = normalize(raw("01/02/2021", RawValue::Number(1.0)), "°C").unwrap_err();
        assert!(err.to_string().contains("unrecognized date"));
    }
}
