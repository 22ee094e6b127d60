//! Log Filtering
//!
//! Translates the `period` / `date` / `start` / `end` query parameters into
//! a window of local wall-clock timestamps. Stored timestamps are compared
//! as strings, so the window bounds use the same `YYYY-MM-DDTHH:MM:SS`
//! layout the detector emits.

use chrono::{Days, NaiveDate, NaiveDateTime, NaiveTime};

use super::error::{StoreError, StoreResult};

/// Wall-clock layout used for window bounds
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";

const DATE_FORMAT: &str = "%Y-%m-%d";

/// Which days to select
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogPeriod {
    /// The current local day
    Today,
    /// One calendar day
    Date(NaiveDate),
    /// An inclusive range of calendar days
    Range { start: NaiveDate, end: NaiveDate },
}

impl LogPeriod {
    /// Build a period from raw query parameters.
    ///
    /// `period=date` needs `date`, `period=range` needs `start` and `end`;
    /// any other value (or none) means today.
    pub fn from_query(
        period: Option<&str>,
        date: Option<&str>,
        start: Option<&str>,
        end: Option<&str>,
    ) -> StoreResult<Self> {
        match period {
            Some("range") => {
                let (Some(start), Some(end)) = (non_empty(start), non_empty(end)) else {
                    return Err(StoreError::Validation(
                        "Start and end date parameters are required for 'range' period"
                            .to_string(),
                    ));
                };
                let start = parse_date(start, "start date")?;
                let end = parse_date(end, "end date")?;
                if end < start {
                    return Err(StoreError::Validation(
                        "End date must not be before start date".to_string(),
                    ));
                }
                Ok(LogPeriod::Range { start, end })
            }
            Some("date") => {
                let Some(date) = non_empty(date) else {
                    return Err(StoreError::Validation(
                        "Date parameter is required for 'date' period".to_string(),
                    ));
                };
                Ok(LogPeriod::Date(parse_date(date, "date")?))
            }
            _ => Ok(LogPeriod::Today),
        }
    }

    /// Resolve the period against the current local date
    pub fn window(&self, today: NaiveDate) -> TimeWindow {
        let (first, last) = match *self {
            LogPeriod::Today => (today, today),
            LogPeriod::Date(date) => (date, date),
            LogPeriod::Range { start, end } => (start, end),
        };

        let start = first.and_time(NaiveTime::MIN);
        // 23:59:59 plus one second, i.e. midnight after the last day
        let end = last
            .checked_add_days(Days::new(1))
            .map(|d| d.and_time(NaiveTime::MIN))
            .unwrap_or(NaiveDateTime::MAX);

        TimeWindow {
            start: start.format(TIMESTAMP_FORMAT).to_string(),
            end: end.format(TIMESTAMP_FORMAT).to_string(),
        }
    }
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.filter(|v| !v.is_empty())
}

fn parse_date(value: &str, what: &str) -> StoreResult<NaiveDate> {
    NaiveDate::parse_from_str(value, DATE_FORMAT).map_err(|_| {
        StoreError::Validation(format!("Invalid {} format. Use YYYY-MM-DD", what))
    })
}

/// Inclusive bounds on the stored `timestamp` column
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimeWindow {
    pub start: String,
    pub end: String,
}

/// A resolved log query
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogFilter {
    pub window: TimeWindow,
    /// Exact name match
    pub name: Option<String>,
}
