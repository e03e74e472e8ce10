//! Calendar attributes derived from interval timestamps.
//!
//! Attributes are read in each timestamp's own UTC offset, i.e. the local wall
//! clock the meter reported in. TOU calendars are defined on that clock.

use tariff_model::{domain::Interval, ModelError};
use time::{Date, OffsetDateTime, Time};

use crate::error::BillingResult;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CalendarRow {
    pub ts: OffsetDateTime,
    /// 1..=12
    pub month: u8,
    pub date: Date,
    /// Monday = 0 .. Sunday = 6
    pub weekday: u8,
    pub time: Time,
}

impl CalendarRow {
    pub fn from_timestamp(ts: OffsetDateTime) -> Self {
        Self {
            ts,
            month: u8::from(ts.month()),
            date: ts.date(),
            weekday: ts.weekday().number_days_from_monday(),
            time: ts.time(),
        }
    }
}

/// Inclusive timestamp range used to restrict classification and bucketing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Window {
    pub start: OffsetDateTime,
    pub end: OffsetDateTime,
}

impl Window {
    pub fn new(start: OffsetDateTime, end: OffsetDateTime) -> Self {
        Self { start, end }
    }

    pub fn contains(&self, ts: OffsetDateTime) -> bool {
        self.start <= ts && ts <= self.end
    }
}

/// Whether `ts` falls in the optional window; no window admits everything.
pub fn in_window(window: Option<&Window>, ts: OffsetDateTime) -> bool {
    window.map_or(true, |w| w.contains(ts))
}

pub fn derive<I>(timestamps: I) -> BillingResult<Vec<CalendarRow>>
where
    I: IntoIterator<Item = OffsetDateTime>,
{
    let mut rows: Vec<CalendarRow> = Vec::new();
    for (index, ts) in timestamps.into_iter().enumerate() {
        if rows.last().is_some_and(|prev| prev.ts >= ts) {
            return Err(ModelError::NonMonotonic { index }.into());
        }
        rows.push(CalendarRow::from_timestamp(ts));
    }
    Ok(rows)
}

pub fn for_interval(interval: &Interval) -> BillingResult<Vec<CalendarRow>> {
    derive(interval.timestamps())
}
