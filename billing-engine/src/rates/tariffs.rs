use std::collections::{HashMap, HashSet};

use tariff_model::{domain::RateTariff, TableRecord};
use time::Date;

use crate::{
    error::{BillingError, BillingResult},
    sources::scope_to_utility,
};

/// Tariffs of one utility, keyed by name.
#[derive(Debug, Clone, Default)]
pub struct TariffRegistry {
    tariffs: HashMap<String, RateTariff>,
}

impl TariffRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Columns: rate, class, schedule, min_kw, max_kw, max_kw_cumulative,
    /// max_kw_contracted, default_option, protect_option, levels, tou, close,
    /// superseded_by. Only `rate` is required.
    pub fn from_records(utility: &str, records: Vec<TableRecord>) -> BillingResult<Self> {
        let mut registry = Self::new();
        for r in scope_to_utility(records, utility) {
            let mut t =
                RateTariff::new(r.require_text("rate")?, r.text("class").unwrap_or_default());
            t.tou_schedule = r.text("schedule");
            t.min_kw = r.number("min_kw")?.unwrap_or(0.0);
            t.max_kw = r.number("max_kw")?;
            t.max_kw_cumulative = r.number("max_kw_cumulative")?.unwrap_or(0.0);
            t.max_kw_contracted = r.number("max_kw_contracted")?.unwrap_or(0.0);
            t.default_option = r.text("default_option");
            t.protect_option = r.text("protect_option");
            t.charge_levels = r.small_int("levels")?;
            t.time_of_use = r.flag("tou")?.unwrap_or(true);
            t.close = r.date("close")?;
            t.superseded_by = r.text("superseded_by");
            registry.add(t);
        }
        tracing::debug!(utility, tariffs = registry.len(), "loaded tariff registry");
        Ok(registry)
    }

    pub fn add(&mut self, tariff: RateTariff) {
        self.tariffs.insert(tariff.name.clone(), tariff);
    }

    pub fn get(&self, name: &str) -> Option<&RateTariff> {
        self.tariffs.get(name)
    }

    pub fn len(&self) -> usize {
        self.tariffs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tariffs.is_empty()
    }

    /// The tariff that applies under `name` on `date`, following supersession
    /// links past closed tariffs.
    pub fn active(&self, name: &str, date: Date) -> BillingResult<&RateTariff> {
        let mut current = self
            .get(name)
            .ok_or_else(|| BillingError::UnknownTariff(name.to_string()))?;
        let mut seen = HashSet::new();

        while let Some(close) = current.close.filter(|_| current.is_closed_on(date)) {
            let closed = || BillingError::ClosedTariff {
                tariff: current.name.clone(),
                close,
            };
            if !seen.insert(current.name.as_str()) {
                return Err(closed());
            }
            let Some(next) = current.superseded_by.as_deref() else {
                return Err(closed());
            };
            tracing::debug!(
                tariff = %current.name,
                superseded_by = next,
                %date,
                "following tariff supersession"
            );
            current = self
                .get(next)
                .ok_or_else(|| BillingError::UnknownTariff(next.to_string()))?;
        }
        Ok(current)
    }
}
