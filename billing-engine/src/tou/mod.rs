//! Time-of-use calendars: seasons, periods, days off and DST shifts.

pub mod registry;

pub use registry::{TouRecords, TouRegistry};

use std::collections::{BTreeMap, BTreeSet};

use time::{Date, Duration, Time};

use crate::error::{BillingError, BillingResult};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SeasonRule {
    pub season: String,
    pub start_month: u8,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PeriodRule {
    pub season: String,
    pub day_off: bool,
    pub start: Time,
    pub period: String,
}

/// Shift applied to the time of day on dates in `first..=last` before period
/// lookup, for calendars written in standard time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DstAdjustment {
    pub first: Date,
    pub last: Date,
    pub shift_minutes: i64,
}

/// Period starts of one season, split by day type, each sorted by start.
#[derive(Debug, Clone, Default, PartialEq)]
struct PeriodSet {
    working: Vec<(Time, String)>,
    off: Vec<(Time, String)>,
}

impl PeriodSet {
    fn starts(&self, day_off: bool) -> &[(Time, String)] {
        if day_off {
            &self.off
        } else {
            &self.working
        }
    }
}

/// Immutable TOU calendar for one (sub-tariff, schedule) key of a utility.
#[derive(Debug, Clone, PartialEq)]
pub struct TouTable {
    sub_tou: String,
    schedule: Option<String>,
    seasons: Vec<SeasonRule>,
    periods: BTreeMap<String, PeriodSet>,
    weekdays_off: [bool; 7],
    holidays: BTreeMap<Date, bool>,
    observe_holidays: bool,
    dst: Vec<DstAdjustment>,
    covers_from: Option<Date>,
}

impl TouTable {
    pub fn builder(sub_tou: &str, schedule: Option<&str>) -> TouTableBuilder {
        TouTableBuilder {
            sub_tou: sub_tou.to_string(),
            schedule: schedule.map(str::to_string),
            seasons: Vec::new(),
            periods: Vec::new(),
            weekdays_off: Vec::new(),
            holidays: Vec::new(),
            observe_holidays: false,
            dst: Vec::new(),
            covers_from: None,
        }
    }

    pub fn sub_tou(&self) -> &str {
        &self.sub_tou
    }

    pub fn schedule(&self) -> Option<&str> {
        self.schedule.as_deref()
    }

    pub fn seasons(&self) -> &[SeasonRule] {
        &self.seasons
    }

    pub fn observes_holidays(&self) -> bool {
        self.observe_holidays
    }

    /// Weekday rule OR holiday rule; the holiday term only when observed.
    pub fn is_day_off(&self, weekday: u8, date: Date) -> bool {
        let weekday_off = self.weekdays_off.get(usize::from(weekday)).copied().unwrap_or(false);
        let holiday_off =
            self.observe_holidays && self.holidays.get(&date).copied().unwrap_or(false);
        weekday_off || holiday_off
    }

    /// Season whose start is the latest start not after `month`, wrapping to
    /// the latest season of the year for months before the first start.
    pub fn season_for(&self, date: Date, month: u8) -> Option<&str> {
        if self.covers_from.is_some_and(|from| date < from) {
            return None;
        }
        self.seasons
            .iter()
            .rev()
            .find(|s| s.start_month <= month)
            .or_else(|| self.seasons.last())
            .map(|s| s.season.as_str())
    }

    /// Period whose start is the latest start not after the (DST adjusted)
    /// time of day, among rules of the same season and day type.
    pub fn period_for(&self, season: &str, day_off: bool, date: Date, time: Time) -> Option<&str> {
        let starts = self.periods.get(season)?.starts(day_off);
        let t = self.adjusted_time(date, time);
        let idx = starts.partition_point(|(start, _)| *start <= t);
        idx.checked_sub(1).map(|i| starts[i].1.as_str())
    }

    fn adjusted_time(&self, date: Date, time: Time) -> Time {
        self.dst
            .iter()
            .find(|adj| adj.first <= date && date <= adj.last)
            .map_or(time, |adj| time + Duration::minutes(adj.shift_minutes))
    }
}

#[derive(Debug, Clone)]
pub struct TouTableBuilder {
    sub_tou: String,
    schedule: Option<String>,
    seasons: Vec<SeasonRule>,
    periods: Vec<PeriodRule>,
    weekdays_off: Vec<(u8, bool)>,
    holidays: Vec<(Date, bool)>,
    observe_holidays: bool,
    dst: Vec<DstAdjustment>,
    covers_from: Option<Date>,
}

impl TouTableBuilder {
    pub fn season(mut self, season: &str, start_month: u8) -> Self {
        self.seasons.push(SeasonRule {
            season: season.to_string(),
            start_month,
        });
        self
    }

    pub fn period(mut self, season: &str, day_off: bool, start: Time, period: &str) -> Self {
        self.periods.push(PeriodRule {
            season: season.to_string(),
            day_off,
            start,
            period: period.to_string(),
        });
        self
    }

    pub fn day_off(mut self, weekday: u8, off: bool) -> Self {
        self.weekdays_off.push((weekday, off));
        self
    }

    pub fn holiday(mut self, date: Date, off: bool) -> Self {
        self.holidays.push((date, off));
        self
    }

    pub fn observe_holidays(mut self, observe: bool) -> Self {
        self.observe_holidays = observe;
        self
    }

    pub fn dst_adjustment(mut self, first: Date, last: Date, shift_minutes: i64) -> Self {
        self.dst.push(DstAdjustment {
            first,
            last,
            shift_minutes,
        });
        self
    }

    pub fn covers_from(mut self, date: Date) -> Self {
        self.covers_from = Some(date);
        self
    }

    pub fn build(self) -> BillingResult<TouTable> {
        let mut seasons = self.seasons;
        if let Some(bad) = seasons.iter().find(|s| !(1..=12).contains(&s.start_month)) {
            return Err(invalid(
                "seasons",
                format!("season '{}' starts in month {}", bad.season, bad.start_month),
            ));
        }
        seasons.sort_by_key(|s| s.start_month);
        if let Some(w) = seasons.windows(2).find(|w| w[0].start_month == w[1].start_month) {
            return Err(invalid(
                "seasons",
                format!(
                    "'{}' and '{}' both start in month {}",
                    w[0].season, w[1].season, w[0].start_month
                ),
            ));
        }

        let mut periods: BTreeMap<String, PeriodSet> = BTreeMap::new();
        for rule in self.periods {
            let set = periods.entry(rule.season).or_default();
            let starts = if rule.day_off { &mut set.off } else { &mut set.working };
            starts.push((rule.start, rule.period));
        }
        for (season, set) in periods.iter_mut() {
            for starts in [&mut set.working, &mut set.off] {
                starts.sort_by_key(|(start, _)| *start);
                let mut seen = BTreeSet::new();
                if let Some((start, _)) = starts.iter().find(|(start, _)| !seen.insert(*start)) {
                    return Err(invalid(
                        "periods",
                        format!("season '{season}' has two periods starting at {start}"),
                    ));
                }
            }
        }

        let mut weekdays_off = [false; 7];
        for (weekday, off) in self.weekdays_off {
            let slot = weekdays_off
                .get_mut(usize::from(weekday))
                .ok_or_else(|| {
                    invalid("daysoff", format!("weekday index {weekday} out of range"))
                })?;
            *slot = off;
        }

        if let Some(adj) = self.dst.iter().find(|adj| adj.first > adj.last) {
            return Err(invalid(
                "dstadj",
                format!("adjustment {} ends before it starts", adj.first),
            ));
        }

        Ok(TouTable {
            sub_tou: self.sub_tou,
            schedule: self.schedule,
            seasons,
            periods,
            weekdays_off,
            holidays: self.holidays.into_iter().collect(),
            observe_holidays: self.observe_holidays,
            dst: self.dst,
            covers_from: self.covers_from,
        })
    }
}

fn invalid(table: &'static str, message: String) -> BillingError {
    BillingError::InvalidTable { table, message }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use time::macros::{date, time};

    /// Summer Jun-Sep, winter Oct-May. Weekdays: off-peak from midnight,
    /// mid-peak 08:00, on-peak 12:00-18:00. Weekends off-peak all day.
    pub(crate) fn summer_winter_table() -> TouTable {
        TouTable::builder("I", None)
            .season("summer", 6)
            .season("winter", 10)
            .period("summer", false, time!(0:00), "offpeak")
            .period("summer", false, time!(8:00), "partpeak")
            .period("summer", false, time!(12:00), "onpeak")
            .period("summer", false, time!(18:00), "partpeak")
            .period("summer", false, time!(23:00), "offpeak")
            .period("summer", true, time!(0:00), "offpeak")
            .period("winter", false, time!(0:00), "offpeak")
            .period("winter", false, time!(8:00), "partpeak")
            .period("winter", false, time!(21:00), "offpeak")
            .period("winter", true, time!(0:00), "offpeak")
            .day_off(5, true)
            .day_off(6, true)
            .holiday(date!(2024-07-04), true)
            .observe_holidays(true)
            .build()
            .unwrap()
    }

    #[test]
    fn season_lookup_wraps_at_year_boundary() {
        let t = summer_winter_table();
        assert_eq!(t.season_for(date!(2024-01-15), 1), Some("winter"));
        assert_eq!(t.season_for(date!(2024-05-31), 5), Some("winter"));
        assert_eq!(t.season_for(date!(2024-06-01), 6), Some("summer"));
        assert_eq!(t.season_for(date!(2024-09-30), 9), Some("summer"));
        assert_eq!(t.season_for(date!(2024-10-01), 10), Some("winter"));
    }

    #[test]
    fn period_lookup_uses_latest_start_not_after_time() {
        let t = summer_winter_table();
        let d = date!(2024-07-02);
        assert_eq!(t.period_for("summer", false, d, time!(7:59)), Some("offpeak"));
        assert_eq!(t.period_for("summer", false, d, time!(12:00)), Some("onpeak"));
        assert_eq!(t.period_for("summer", false, d, time!(17:45)), Some("onpeak"));
        assert_eq!(t.period_for("summer", false, d, time!(18:00)), Some("partpeak"));
        assert_eq!(t.period_for("summer", true, d, time!(14:00)), Some("offpeak"));
        assert_eq!(t.period_for("spring", false, d, time!(14:00)), None);
    }

    #[test]
    fn time_before_first_period_start_has_no_period() {
        let t = TouTable::builder("I", None)
            .season("summer", 6)
            .period("summer", false, time!(12:00), "onpeak")
            .build()
            .unwrap();
        assert_eq!(t.period_for("summer", false, date!(2024-07-02), time!(11:59)), None);
    }

    #[test]
    fn day_off_combines_weekday_and_observed_holiday() {
        let t = summer_winter_table();
        // Thursday holiday
        assert!(t.is_day_off(3, date!(2024-07-04)));
        assert!(!t.is_day_off(3, date!(2024-07-11)));
        assert!(t.is_day_off(5, date!(2024-07-06)));

        let ignoring = TouTable::builder("I", None)
            .holiday(date!(2024-07-04), true)
            .observe_holidays(false)
            .build()
            .unwrap();
        assert!(!ignoring.is_day_off(3, date!(2024-07-04)));
    }

    #[test]
    fn dst_adjustment_shifts_time_within_its_dates() {
        let t = TouTable::builder("I", None)
            .season("summer", 6)
            .period("summer", false, time!(0:00), "offpeak")
            .period("summer", false, time!(12:00), "onpeak")
            .dst_adjustment(date!(2024-03-10), date!(2024-11-02), -60)
            .build()
            .unwrap();
        // 12:30 daylight time reads as 11:30 standard time.
        assert_eq!(t.period_for("summer", false, date!(2024-07-02), time!(12:30)), Some("offpeak"));
        assert_eq!(t.period_for("summer", false, date!(2024-11-05), time!(12:30)), Some("onpeak"));
    }

    #[test]
    fn coverage_start_leaves_earlier_dates_unclassified() {
        let t = TouTable::builder("I", None)
            .season("summer", 6)
            .covers_from(date!(2024-03-01))
            .build()
            .unwrap();
        assert_eq!(t.season_for(date!(2024-02-28), 2), None);
        assert_eq!(t.season_for(date!(2024-03-01), 3), Some("summer"));
    }

    #[test]
    fn build_rejects_duplicate_starts() {
        let seasons = TouTable::builder("I", None).season("summer", 6).season("hot", 6).build();
        assert!(matches!(seasons, Err(BillingError::InvalidTable { table: "seasons", .. })));

        let periods = TouTable::builder("I", None)
            .period("summer", false, time!(12:00), "onpeak")
            .period("summer", false, time!(12:00), "midpeak")
            .build();
        assert!(matches!(periods, Err(BillingError::InvalidTable { table: "periods", .. })));

        let weekday = TouTable::builder("I", None).day_off(7, true).build();
        assert!(matches!(weekday, Err(BillingError::InvalidTable { table: "daysoff", .. })));
    }
}
