use std::{collections::HashMap, sync::RwLock};

use tariff_model::domain::ServiceAgreement;
use time::Date;

use crate::{
    rates::Category,
    resolve::{AxisFilter, ChargeOutcome, ChargeQuery},
};

const DEFAULT_MAX_ENTRIES: usize = 65_536;

/// Memoised charge resolutions for one billing run.
///
/// Keys fingerprint the whole agreement, the category, the date and every
/// query filter, so a hit is always the outcome an uncached call would give.
/// Entries are never evicted; once `max_entries` is reached new outcomes are
/// no longer stored. Build a fresh cache (or engine) per run.
#[derive(Debug)]
pub struct ResolutionCache {
    entries: RwLock<HashMap<String, ChargeOutcome>>,
    max_entries: usize,
}

impl Default for ResolutionCache {
    fn default() -> Self {
        Self::bounded(DEFAULT_MAX_ENTRIES)
    }
}

impl ResolutionCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn bounded(max_entries: usize) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            max_entries,
        }
    }

    pub fn get(
        &self,
        agreement: &ServiceAgreement,
        category: Category,
        date: Date,
        query: &ChargeQuery,
    ) -> Option<ChargeOutcome> {
        let key = fingerprint(agreement, category, date, query);
        let hit = self.entries.read().ok()?.get(&key).cloned();
        if hit.is_some() {
            metrics::counter!("resolution_cache_hits_total").increment(1);
        }
        hit
    }

    pub fn insert(
        &self,
        agreement: &ServiceAgreement,
        category: Category,
        date: Date,
        query: &ChargeQuery,
        outcome: ChargeOutcome,
    ) {
        let key = fingerprint(agreement, category, date, query);
        // A poisoned lock only disables caching.
        if let Ok(mut entries) = self.entries.write() {
            if entries.len() >= self.max_entries && !entries.contains_key(&key) {
                metrics::counter!("resolution_cache_full_total").increment(1);
                return;
            }
            entries.insert(key, outcome);
        }
    }

    pub fn len(&self) -> usize {
        self.entries.read().map(|e| e.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn hash_str(hasher: &mut blake3::Hasher, s: &str) {
    let len = s.len() as u32;
    hasher.update(&len.to_le_bytes());
    hasher.update(s.as_bytes());
}

fn hash_opt_str(hasher: &mut blake3::Hasher, s: Option<&str>) {
    match s {
        Some(v) => {
            hasher.update(&[1]);
            hash_str(hasher, v);
        }
        None => {
            hasher.update(&[0]);
        }
    }
}

fn hash_flag(hasher: &mut blake3::Hasher, b: bool) {
    hasher.update(&[b as u8]);
}

fn hash_filter(hasher: &mut blake3::Hasher, f: &AxisFilter<String>) {
    match f {
        AxisFilter::Any => {
            hasher.update(&[0]);
        }
        AxisFilter::Blank => {
            hasher.update(&[1]);
        }
        AxisFilter::Is(v) => {
            hasher.update(&[2]);
            hash_str(hasher, v);
        }
    }
}

fn fingerprint(sa: &ServiceAgreement, category: Category, date: Date, q: &ChargeQuery) -> String {
    let mut h = blake3::Hasher::new();

    h.update(&sa.start.to_julian_day().to_le_bytes());
    hash_str(&mut h, &sa.utility);
    hash_str(&mut h, &sa.tariff);
    hash_opt_str(&mut h, sa.option.as_deref());
    hash_str(&mut h, &sa.connection);
    hash_str(&mut h, &sa.sub_tou);
    hash_opt_str(&mut h, sa.schedule.as_deref());
    hash_opt_str(&mut h, sa.provider.as_ref().map(|p| p.name.as_str()));
    hash_opt_str(&mut h, sa.provider.as_ref().map(|p| p.surcharge_type()));
    hash_flag(&mut h, sa.standby);
    hash_flag(&mut h, sa.force_surcharge);
    hash_opt_str(&mut h, sa.surcharge.as_ref().map(|v| v.group.as_str()));
    hash_opt_str(&mut h, sa.surcharge.as_ref().map(|v| v.vintage.as_str()));
    hash_opt_str(&mut h, sa.interrupt.as_ref().map(|t| t.incentive.as_str()));
    hash_opt_str(&mut h, sa.interrupt.as_ref().map(|t| t.option.as_str()));
    hash_opt_str(&mut h, sa.shift.as_ref().map(|t| t.incentive.as_str()));
    hash_opt_str(&mut h, sa.shift.as_ref().map(|t| t.option.as_str()));
    hash_opt_str(&mut h, sa.shift.as_ref().map(|t| t.cycling.as_str()));

    hash_str(&mut h, category.as_str());
    h.update(&date.to_julian_day().to_le_bytes());

    hash_str(&mut h, q.unit.as_str());
    hash_filter(&mut h, &q.season);
    hash_filter(&mut h, &q.period);
    match &q.components {
        Some(set) => {
            h.update(&(set.len() as u32 + 1).to_le_bytes());
            for c in set {
                hash_str(&mut h, c);
            }
        }
        None => {
            h.update(&0u32.to_le_bytes());
        }
    }
    match &q.level {
        AxisFilter::Any => h.update(&[0]),
        AxisFilter::Blank => h.update(&[1]),
        AxisFilter::Is(l) => h.update(&[2, *l]),
    };
    hash_filter(&mut h, &q.surcharge_type);

    h.finalize().to_hex().to_string()
}
