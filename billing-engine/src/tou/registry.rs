use tariff_model::TableRecord;

use crate::{
    error::{BillingError, BillingResult},
    sources::scope_to_utility,
    tou::TouTable,
};

/// Raw TOU rule tables for one utility, as delivered by the table source.
///
/// Expected columns:
/// - seasons: season, start (month), optional effective (coverage start)
/// - periods: season, dayoff, start (time), period
/// - days_off: weekday, dayoff
/// - holidays: date, dayoff
/// - dst: start (date), end (date), shift (minutes)
///
/// Any table may carry `subTOU` and `schedule` selector columns and a
/// `utility` column.
#[derive(Debug, Clone, Default)]
pub struct TouRecords {
    pub seasons: Vec<TableRecord>,
    pub periods: Vec<TableRecord>,
    pub days_off: Vec<TableRecord>,
    pub holidays: Vec<TableRecord>,
    pub dst: Vec<TableRecord>,
}

/// Utility-scoped source of [`TouTable`]s keyed by sub-tariff and schedule.
#[derive(Debug, Clone)]
pub struct TouRegistry {
    utility: String,
    records: TouRecords,
    observe_holidays: bool,
}

impl TouRegistry {
    pub fn from_records(utility: &str, records: TouRecords, observe_holidays: bool) -> Self {
        let records = TouRecords {
            seasons: scope_to_utility(records.seasons, utility),
            periods: scope_to_utility(records.periods, utility),
            days_off: scope_to_utility(records.days_off, utility),
            holidays: scope_to_utility(records.holidays, utility),
            dst: scope_to_utility(records.dst, utility),
        };
        Self {
            utility: utility.to_string(),
            records,
            observe_holidays,
        }
    }

    pub fn utility(&self) -> &str {
        &self.utility
    }

    pub fn table(&self, sub_tou: &str, schedule: Option<&str>) -> BillingResult<TouTable> {
        let seasons = pick(&self.records.seasons, sub_tou, schedule);
        let periods = pick(&self.records.periods, sub_tou, schedule);
        if seasons.is_empty() && periods.is_empty() {
            return Err(BillingError::UnknownTouTable {
                sub_tou: sub_tou.to_string(),
                schedule: schedule.unwrap_or_default().to_string(),
            });
        }

        let mut builder =
            TouTable::builder(sub_tou, schedule).observe_holidays(self.observe_holidays);
        let mut covers_from = None;

        for r in seasons {
            builder = builder.season(
                &r.require_text("season")?,
                required(r.month("start")?, "seasons", "start")?,
            );
            if let Some(effective) = r.date("effective")? {
                covers_from = Some(covers_from.map_or(effective, |c: time::Date| c.min(effective)));
            }
        }
        if let Some(from) = covers_from {
            builder = builder.covers_from(from);
        }

        for r in periods {
            builder = builder.period(
                &r.require_text("season")?,
                r.flag("dayoff")?.unwrap_or(false),
                required(r.time_of_day("start")?, "periods", "start")?,
                &r.require_text("period")?,
            );
        }

        for r in pick(&self.records.days_off, sub_tou, schedule) {
            builder = builder.day_off(
                required(r.weekday("weekday")?, "daysoff", "weekday")?,
                r.flag("dayoff")?.unwrap_or(false),
            );
        }

        for r in pick(&self.records.holidays, sub_tou, schedule) {
            builder = builder.holiday(
                required(r.date("date")?, "holidays", "date")?,
                r.flag("dayoff")?.unwrap_or(true),
            );
        }

        for r in pick(&self.records.dst, sub_tou, schedule) {
            let shift = required(r.number("shift")?, "dstadj", "shift")?;
            builder = builder.dst_adjustment(
                required(r.date("start")?, "dstadj", "start")?,
                required(r.date("end")?, "dstadj", "end")?,
                shift.round() as i64,
            );
        }

        let table = builder.build()?;
        tracing::debug!(
            utility = %self.utility,
            sub_tou,
            schedule = schedule.unwrap_or_default(),
            seasons = table.seasons().len(),
            "built TOU table"
        );
        Ok(table)
    }
}

fn pick<'a>(
    rows: &'a [TableRecord],
    sub_tou: &str,
    schedule: Option<&str>,
) -> Vec<&'a TableRecord> {
    rows.iter().filter(|r| selects(r, sub_tou, schedule)).collect()
}

// Blank selector cells apply to every key. A row pinned to a schedule never
// applies to an agreement without one.
fn selects(r: &TableRecord, sub_tou: &str, schedule: Option<&str>) -> bool {
    let sub_ok = r.text("subTOU").map_or(true, |v| v == sub_tou);
    let schedule_ok = match (r.text("schedule"), schedule) {
        (None, _) => true,
        (Some(v), Some(s)) => v == s,
        (Some(_), None) => false,
    };
    sub_ok && schedule_ok
}

fn required<T>(value: Option<T>, table: &'static str, column: &str) -> BillingResult<T> {
    value.ok_or_else(|| BillingError::InvalidTable {
        table,
        message: format!("missing '{column}'"),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::{date, time};

    fn records() -> TouRecords {
        TouRecords {
            seasons: vec![
                TableRecord::new()
                    .with("utility", "SCE")
                    .with("season", "summer")
                    .with("start", "Jun"),
                TableRecord::new()
                    .with("utility", "SCE")
                    .with("season", "winter")
                    .with("start", 10),
                TableRecord::new()
                    .with("utility", "PG&E")
                    .with("season", "summer")
                    .with("start", 5),
            ],
            periods: vec![
                TableRecord::new()
                    .with("season", "summer")
                    .with("dayoff", false)
                    .with("start", "0:00")
                    .with("period", "offpeak"),
                TableRecord::new()
                    .with("season", "summer")
                    .with("dayoff", false)
                    .with("start", "12:00")
                    .with("period", "onpeak"),
                TableRecord::new()
                    .with("subTOU", "I")
                    .with("schedule", "B")
                    .with("season", "summer")
                    .with("dayoff", false)
                    .with("start", "16:00")
                    .with("period", "criticalpeak"),
                TableRecord::new()
                    .with("subTOU", "II")
                    .with("season", "winter")
                    .with("dayoff", false)
                    .with("start", "0:00")
                    .with("period", "offpeak"),
            ],
            days_off: vec![
                TableRecord::new().with("weekday", "Saturday").with("dayoff", "Y"),
                TableRecord::new().with("weekday", 6).with("dayoff", "Y"),
            ],
            holidays: vec![TableRecord::new().with("date", "2024-07-04").with("dayoff", true)],
            dst: Vec::new(),
        }
    }

    #[test]
    fn builds_table_scoped_to_utility_and_key() {
        let registry = TouRegistry::from_records("SCE", records(), true);
        let t = registry.table("I", None).unwrap();

        assert_eq!(t.seasons().len(), 2);
        assert_eq!(t.season_for(date!(2024-05-01), 5), Some("winter"));
        assert_eq!(t.period_for("summer", false, date!(2024-07-02), time!(16:30)), Some("onpeak"));
        assert!(t.is_day_off(6, date!(2024-07-07)));
        assert!(t.is_day_off(3, date!(2024-07-04)));
    }

    #[test]
    fn schedule_specific_rows_apply_only_to_that_schedule() {
        let registry = TouRegistry::from_records("SCE", records(), true);
        let t = registry.table("I", Some("B")).unwrap();
        assert_eq!(
            t.period_for("summer", false, date!(2024-07-02), time!(16:30)),
            Some("criticalpeak")
        );

        let other = registry.table("II", None).unwrap();
        assert_eq!(
            other.period_for("summer", false, date!(2024-07-02), time!(16:30)),
            Some("onpeak")
        );
        assert_eq!(
            other.period_for("winter", false, date!(2024-01-02), time!(16:30)),
            Some("offpeak")
        );
    }

    #[test]
    fn unknown_key_without_rules_is_an_error() {
        let recs = TouRecords {
            seasons: records().seasons,
            ..Default::default()
        };
        let registry = TouRegistry::from_records("SDG&E", recs, true);
        assert!(matches!(
            registry.table("I", None),
            Err(BillingError::UnknownTouTable { .. })
        ));
    }

    #[test]
    fn season_effective_column_sets_coverage_start() {
        let mut recs = records();
        recs.seasons[0].insert("effective", "2024-03-01");
        let t = TouRegistry::from_records("SCE", recs, true).table("I", None).unwrap();
        assert_eq!(t.season_for(date!(2024-01-10), 1), None);
        assert_eq!(t.season_for(date!(2024-04-10), 4), Some("winter"));
    }
}
