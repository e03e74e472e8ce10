use time::{Date, OffsetDateTime};

use crate::{
    calendar::{in_window, CalendarRow, Window},
    tou::TouTable,
};

/// TOU bucket of one timestamp. `None` season/period means no rule covers it,
/// which is a valid outcome rather than an error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassifiedRow {
    pub ts: OffsetDateTime,
    pub date: Date,
    pub season: Option<String>,
    pub period: Option<String>,
    pub day_off: bool,
}

impl ClassifiedRow {
    pub fn is_classified(&self) -> bool {
        self.season.is_some() && self.period.is_some()
    }
}

pub fn classify(
    calendar: &[CalendarRow],
    table: &TouTable,
    window: Option<&Window>,
) -> Vec<ClassifiedRow> {
    let rows: Vec<ClassifiedRow> = calendar
        .iter()
        .filter(|row| in_window(window, row.ts))
        .map(|row| classify_row(row, table))
        .collect();

    let unclassified = rows.iter().filter(|r| !r.is_classified()).count();
    if unclassified > 0 {
        metrics::counter!("tou_unclassified_rows_total").increment(unclassified as u64);
        tracing::debug!(
            sub_tou = table.sub_tou(),
            unclassified,
            total = rows.len(),
            "timestamps outside TOU rule coverage"
        );
    }

    rows
}

fn classify_row(row: &CalendarRow, table: &TouTable) -> ClassifiedRow {
    let day_off = table.is_day_off(row.weekday, row.date);
    let season = table.season_for(row.date, row.month);
    let period = season.and_then(|s| table.period_for(s, day_off, row.date, row.time));

    ClassifiedRow {
        ts: row.ts,
        date: row.date,
        season: season.map(str::to_string),
        period: period.map(str::to_string),
        day_off,
    }
}
