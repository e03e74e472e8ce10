//! Aggregation of classified interval samples into billing quantities.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use tariff_model::domain::{Interval, Unit};
use time::OffsetDateTime;

use crate::{
    calendar::{in_window, Window},
    classify::ClassifiedRow,
    error::{BillingError, BillingResult},
};

/// `(season, period)` bucket. Unclassified samples land in the `None` key so
/// the buckets always partition the window.
#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct BucketKey {
    pub season: Option<String>,
    pub period: Option<String>,
}

impl BucketKey {
    pub fn new(season: &str, period: &str) -> Self {
        Self {
            season: Some(season.to_string()),
            period: Some(period.to_string()),
        }
    }

    pub fn unclassified() -> Self {
        Self::default()
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct BillingQuantities {
    pub days: usize,
    pub energy: BTreeMap<BucketKey, f64>,
    pub demand: BTreeMap<BucketKey, f64>,
    /// Sum of the positive samples in the window, in the interval's native unit.
    pub net_export: f64,
}

impl BillingQuantities {
    pub fn energy_for(&self, key: &BucketKey) -> f64 {
        self.energy.get(key).copied().unwrap_or(0.0)
    }

    pub fn demand_for(&self, key: &BucketKey) -> f64 {
        self.demand.get(key).copied().unwrap_or(0.0)
    }

    pub fn total_energy(&self) -> f64 {
        self.energy.values().sum()
    }

    /// Highest demand across all buckets.
    pub fn peak_demand(&self) -> f64 {
        self.demand.values().copied().fold(0.0, f64::max)
    }

    pub fn keys(&self) -> impl Iterator<Item = &BucketKey> {
        self.energy.keys()
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Multipliers {
    pub energy: f64,
    pub demand: f64,
}

/// Conversion factors from native samples to kWh (energy) and kW (demand).
pub fn multipliers(unit: Unit, sample_minutes: Option<f64>) -> BillingResult<Multipliers> {
    if !matches!(unit, Unit::Kwh | Unit::Kw) {
        return Err(BillingError::UnitMismatch(unit));
    }
    let minutes = sample_minutes
        .filter(|m| *m > 0.0)
        .ok_or(BillingError::UnknownFrequency(unit))?;

    Ok(match unit {
        Unit::Kwh => Multipliers {
            energy: 1.0,
            demand: 60.0 / minutes,
        },
        _ => Multipliers {
            energy: minutes / 60.0,
            demand: 1.0,
        },
    })
}

pub fn bucket(
    interval: &Interval,
    classified: &[ClassifiedRow],
    window: Option<&Window>,
) -> BillingResult<BillingQuantities> {
    let unit = interval.unit();
    if !matches!(unit, Unit::Kwh | Unit::Kw) {
        return Err(BillingError::UnitMismatch(unit));
    }
    if interval.is_empty() {
        return Ok(BillingQuantities::default());
    }
    let m = multipliers(unit, interval.sample_minutes())?;

    let keys: HashMap<OffsetDateTime, BucketKey> = classified
        .iter()
        .map(|r| {
            (
                r.ts,
                BucketKey {
                    season: r.season.clone(),
                    period: r.period.clone(),
                },
            )
        })
        .collect();

    let mut out = BillingQuantities::default();
    let mut dates = BTreeSet::new();
    let mut peaks: BTreeMap<BucketKey, f64> = BTreeMap::new();

    for s in interval.samples().iter().filter(|s| in_window(window, s.ts)) {
        dates.insert(s.ts.date());
        let key = keys.get(&s.ts).cloned().unwrap_or_default();

        *out.energy.entry(key.clone()).or_insert(0.0) += s.value * m.energy;
        peaks
            .entry(key)
            .and_modify(|p| *p = p.max(s.value))
            .or_insert(s.value);
        if s.value > 0.0 {
            out.net_export += s.value;
        }
    }

    out.demand = peaks.into_iter().map(|(k, v)| (k, v * m.demand)).collect();
    out.days = dates.len();
    Ok(out)
}
