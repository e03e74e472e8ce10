//! Charge resolution with placeholder substitution.
//!
//! Resolving a charge runs, in order: tariff activation, category extraction,
//! host-tariff substitution (outside the utility category), surcharge
//! substitution (utility rows with a nonbypass unit), query filtering and
//! summation. Placeholders that cannot be substituted are dropped from the
//! total and reported back on the [`ChargeOutcome`].

use std::collections::BTreeSet;

use tariff_model::domain::ServiceAgreement;
use time::Date;

use crate::{
    bucket::BucketKey,
    cache::ResolutionCache,
    config::SurchargeConfig,
    error::{BillingError, BillingResult},
    rates::{
        Axis, Category, ChargeRow, ChargeValue, Placeholder, RateScheduleStore, TariffRegistry,
        UnitClass,
    },
};

/// Filter on one charge axis.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub enum AxisFilter<T> {
    /// Do not filter on this axis.
    #[default]
    Any,
    /// Row must not carry a value on this axis.
    Blank,
    Is(T),
}

impl<T: PartialEq> AxisFilter<T> {
    fn admits(&self, value: Option<&T>) -> bool {
        match self {
            AxisFilter::Any => true,
            AxisFilter::Blank => value.is_none(),
            AxisFilter::Is(want) => value == Some(want),
        }
    }
}

impl<T> From<Option<T>> for AxisFilter<T> {
    fn from(v: Option<T>) -> Self {
        v.map_or(AxisFilter::Blank, AxisFilter::Is)
    }
}

/// Which rows of a resolved schedule to sum.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ChargeQuery {
    pub unit: UnitClass,
    pub season: AxisFilter<String>,
    pub period: AxisFilter<String>,
    pub components: Option<BTreeSet<String>>,
    pub level: AxisFilter<u8>,
    pub surcharge_type: AxisFilter<String>,
}

impl ChargeQuery {
    pub fn new(unit: UnitClass) -> Self {
        Self {
            unit,
            season: AxisFilter::Any,
            period: AxisFilter::Any,
            components: None,
            level: AxisFilter::Any,
            surcharge_type: AxisFilter::Any,
        }
    }

    /// Query pinned to one `(season, period)` bucket; unclassified bucket
    /// halves select rows without that axis.
    pub fn for_bucket(unit: UnitClass, key: &BucketKey) -> Self {
        Self::new(unit).in_bucket(key)
    }

    /// Same filters, with season and period replaced by the bucket's.
    pub fn in_bucket(mut self, key: &BucketKey) -> Self {
        self.season = key.season.clone().into();
        self.period = key.period.clone().into();
        self
    }

    pub fn season(mut self, season: &str) -> Self {
        self.season = AxisFilter::Is(season.to_string());
        self
    }

    pub fn period(mut self, period: &str) -> Self {
        self.period = AxisFilter::Is(period.to_string());
        self
    }

    pub fn components<I, S>(mut self, components: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.components = Some(components.into_iter().map(Into::into).collect());
        self
    }

    pub fn level(mut self, level: u8) -> Self {
        self.level = AxisFilter::Is(level);
        self
    }

    pub fn surcharge_type(mut self, surcharge_type: &str) -> Self {
        self.surcharge_type = AxisFilter::Is(surcharge_type.to_string());
        self
    }

    // An axis is only filtered when the query sets it and the rows can carry it.
    fn admits(&self, row: &ChargeRow, axes: &[Axis]) -> bool {
        let has = |a: Axis| axes.contains(&a);
        row.unit == self.unit
            && (!has(Axis::Season) || self.season.admits(row.season.as_ref()))
            && (!has(Axis::Period) || self.period.admits(row.period.as_ref()))
            && (!has(Axis::Component)
                || self
                    .components
                    .as_ref()
                    .map_or(true, |set| row.component.as_ref().is_some_and(|c| set.contains(c))))
            && (!has(Axis::Level) || self.level.admits(row.level.as_ref()))
            && (!has(Axis::SurchargeType)
                || self.surcharge_type.admits(row.surcharge_type.as_ref()))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnresolvedReason {
    /// The referenced schedule has no row for the placeholder's key.
    NoOverrideRows,
    /// The agreement has neither a provider nor a standby/override flag.
    UndefinedSurchargeType,
    /// The placeholder kind is not substituted for rows of this category.
    NotApplicable,
}

/// A placeholder row dropped from a total.
#[derive(Debug, Clone, PartialEq)]
pub struct UnresolvedPlaceholder {
    pub category: Category,
    pub placeholder: Placeholder,
    pub unit: UnitClass,
    pub season: Option<String>,
    pub period: Option<String>,
    pub component: Option<String>,
    pub reason: UnresolvedReason,
}

impl UnresolvedPlaceholder {
    fn from_row(row: &ChargeRow, placeholder: Placeholder, reason: UnresolvedReason) -> Self {
        Self {
            category: row.category,
            placeholder,
            unit: row.unit,
            season: row.season.clone(),
            period: row.period.clone(),
            component: row.component.clone(),
            reason,
        }
    }
}

/// Best-effort total plus the placeholders that could not be substituted.
#[derive(Debug, Clone, PartialEq)]
pub struct ChargeOutcome {
    pub total: f64,
    pub unresolved: Vec<UnresolvedPlaceholder>,
}

impl ChargeOutcome {
    pub fn is_partial(&self) -> bool {
        !self.unresolved.is_empty()
    }

    /// The total, or `UnresolvedPlaceholder` if any placeholder was dropped.
    pub fn into_complete(self) -> BillingResult<f64> {
        if self.is_partial() {
            Err(BillingError::UnresolvedPlaceholder {
                count: self.unresolved.len(),
            })
        } else {
            Ok(self.total)
        }
    }
}

pub struct ChargeResolver<'a> {
    store: &'a RateScheduleStore,
    tariffs: &'a TariffRegistry,
    surcharge: &'a SurchargeConfig,
    cache: Option<&'a ResolutionCache>,
}

impl<'a> ChargeResolver<'a> {
    pub fn new(
        store: &'a RateScheduleStore,
        tariffs: &'a TariffRegistry,
        surcharge: &'a SurchargeConfig,
    ) -> Self {
        Self {
            store,
            tariffs,
            surcharge,
            cache: None,
        }
    }

    pub fn with_cache(mut self, cache: &'a ResolutionCache) -> Self {
        self.cache = Some(cache);
        self
    }

    /// Surcharge type owed by the agreement: the provider's type, else the
    /// configured standby type for standby or force-flagged agreements.
    pub fn surcharge_type(&self, agreement: &ServiceAgreement) -> Option<String> {
        match &agreement.provider {
            Some(p) => Some(p.surcharge_type().to_string()),
            None if agreement.standby || agreement.force_surcharge => {
                Some(self.surcharge.standby_type.clone())
            }
            None => None,
        }
    }

    /// The agreement as billed on `date`: the active tariff after following
    /// supersession, with the tariff's defaults filled in for an absent option
    /// or TOU schedule.
    pub fn effective_agreement(
        &self,
        agreement: &ServiceAgreement,
        date: Date,
    ) -> BillingResult<ServiceAgreement> {
        let tariff = self.tariffs.active(&agreement.tariff, date)?;
        let mut sa = agreement.clone();
        if sa.tariff != tariff.name {
            sa.tariff = tariff.name.clone();
        }
        if sa.option.is_none() {
            sa.option = tariff.default_option.clone();
        }
        if sa.schedule.is_none() {
            sa.schedule = tariff.tou_schedule.clone();
        }
        Ok(sa)
    }

    pub fn resolve(
        &self,
        agreement: &ServiceAgreement,
        category: Category,
        date: Date,
        query: &ChargeQuery,
    ) -> BillingResult<ChargeOutcome> {
        if let Some(cache) = self.cache {
            if let Some(hit) = cache.get(agreement, category, date, query) {
                return Ok(hit);
            }
        }

        let outcome = self.resolve_uncached(agreement, category, date, query)?;

        if let Some(cache) = self.cache {
            cache.insert(agreement, category, date, query, outcome.clone());
        }
        Ok(outcome)
    }

    fn resolve_uncached(
        &self,
        agreement: &ServiceAgreement,
        category: Category,
        date: Date,
        query: &ChargeQuery,
    ) -> BillingResult<ChargeOutcome> {
        let sa = self.effective_agreement(agreement, date)?;
        let rows = self.store.extract(category, &sa, date)?;

        let mut gaps = Vec::new();
        let rows = self.substitute_host_tariff(category, &sa, date, rows, &mut gaps)?;
        let rows = self.substitute_surcharge(&sa, date, rows, &mut gaps)?;

        let mut priced = Vec::with_capacity(rows.len());
        for row in rows {
            match row.value.placeholder() {
                Some(p) => gaps.push(UnresolvedPlaceholder::from_row(
                    &row,
                    p,
                    UnresolvedReason::NotApplicable,
                )),
                None => priced.push(row),
            }
        }

        let axes = axes_of(category, &priced);
        let total = priced
            .iter()
            .filter(|r| query.admits(r, &axes))
            .map(|r| r.value.amount())
            .sum();

        let unresolved: Vec<UnresolvedPlaceholder> = gaps
            .into_iter()
            .filter(|g| query.admits(&gap_row(g, date), &axes_with(&axes, g.category)))
            .collect();
        for gap in &unresolved {
            metrics::counter!("charge_placeholders_unresolved_total").increment(1);
            tracing::warn!(
                tariff = %sa.tariff,
                category = %category,
                source = %gap.category,
                unit = %gap.unit,
                season = gap.season.as_deref().unwrap_or(""),
                period = gap.period.as_deref().unwrap_or(""),
                reason = ?gap.reason,
                "placeholder charge left unresolved"
            );
        }

        Ok(ChargeOutcome { total, unresolved })
    }

    fn substitute_host_tariff(
        &self,
        category: Category,
        sa: &ServiceAgreement,
        date: Date,
        rows: Vec<ChargeRow>,
        gaps: &mut Vec<UnresolvedPlaceholder>,
    ) -> BillingResult<Vec<ChargeRow>> {
        let has_host = rows
            .iter()
            .any(|r| r.value.placeholder() == Some(Placeholder::HostTariff));
        if category == Category::Utility || !has_host {
            return Ok(rows);
        }
        let host = self.store.extract(Category::Utility, sa, date)?;

        let mut out = Vec::with_capacity(rows.len());
        for row in rows {
            if row.value.placeholder() != Some(Placeholder::HostTariff) {
                out.push(row);
                continue;
            }
            let matches: Vec<ChargeRow> = host
                .iter()
                .filter(|h| {
                    h.unit == row.unit
                        && h.season == row.season
                        && h.period == row.period
                        && h.component == row.component
                        && h.level == row.level
                })
                .cloned()
                .collect();
            if matches.is_empty() {
                gaps.push(UnresolvedPlaceholder::from_row(
                    &row,
                    Placeholder::HostTariff,
                    UnresolvedReason::NoOverrideRows,
                ));
            }
            out.extend(matches);
        }
        Ok(out)
    }

    fn substitute_surcharge(
        &self,
        sa: &ServiceAgreement,
        date: Date,
        rows: Vec<ChargeRow>,
        gaps: &mut Vec<UnresolvedPlaceholder>,
    ) -> BillingResult<Vec<ChargeRow>> {
        let eligible = |r: &ChargeRow| {
            r.category == Category::Utility
                && r.unit == UnitClass::Nonbypass
                && r.value.placeholder() == Some(Placeholder::Surcharge)
        };
        if !rows.iter().any(eligible) {
            return Ok(rows);
        }

        let surcharge_type = self.surcharge_type(sa);
        let overrides: Vec<ChargeRow> = match &surcharge_type {
            Some(t) => self
                .store
                .extract(Category::Surcharge, sa, date)?
                .into_iter()
                .filter(|r| r.surcharge_type.as_deref() == Some(t.as_str()))
                .collect(),
            None => Vec::new(),
        };

        let mut out = Vec::with_capacity(rows.len());
        for row in rows {
            if !eligible(&row) {
                out.push(row);
                continue;
            }
            if surcharge_type.is_none() {
                gaps.push(UnresolvedPlaceholder::from_row(
                    &row,
                    Placeholder::Surcharge,
                    UnresolvedReason::UndefinedSurchargeType,
                ));
                continue;
            }
            let matches: Vec<ChargeRow> = overrides
                .iter()
                .filter(|o: &&ChargeRow| o.unit == row.unit && o.component == row.component)
                .cloned()
                .collect();
            if matches.is_empty() {
                gaps.push(UnresolvedPlaceholder::from_row(
                    &row,
                    Placeholder::Surcharge,
                    UnresolvedReason::NoOverrideRows,
                ));
            }
            out.extend(matches);
        }
        Ok(out)
    }
}

fn axes_of(category: Category, rows: &[ChargeRow]) -> Vec<Axis> {
    let mut axes = category.schema().to_vec();
    for row in rows {
        for a in row.category.schema() {
            if !axes.contains(a) {
                axes.push(*a);
            }
        }
    }
    axes
}

fn axes_with(axes: &[Axis], category: Category) -> Vec<Axis> {
    let mut out = axes.to_vec();
    out.extend(category.schema().iter().filter(|a| !axes.contains(a)));
    out
}

// Placeholder rows are matched against the query like any other row so that
// only gaps relevant to the requested charge are reported.
fn gap_row(gap: &UnresolvedPlaceholder, date: Date) -> ChargeRow {
    let mut row = ChargeRow::new(
        gap.category,
        gap.unit,
        date,
        ChargeValue::Placeholder(gap.placeholder),
    );
    row.season = gap.season.clone();
    row.period = gap.period.clone();
    row.component = gap.component.clone();
    row
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{config::PlaceholderConfig, rates::store::tests::agreement};
    use tariff_model::{
        domain::{Provider, ProviderKind, RateTariff},
        TableRecord,
    };
    use time::macros::date;

    const DAY: Date = date!(2024-07-15);

    fn rec(
        unit: &str,
        season: &str,
        period: &str,
        value: impl Into<tariff_model::Cell>,
    ) -> TableRecord {
        TableRecord::new()
            .with("rate", "TOU-8")
            .with("option", "B")
            .with("connection", "secondary")
            .with("subTOU", "I")
            .with("unit", unit)
            .with("season", season)
            .with("period", period)
            .with("effective", "2024-01-01")
            .with("value", value)
    }

    fn crs(surcharge_type: &str, component: &str, value: f64) -> TableRecord {
        TableRecord::new()
            .with("group", "bundled")
            .with("vintage", "2017")
            .with("unit", "nonbypass")
            .with("component", component)
            .with("surcharge-type", surcharge_type)
            .with("effective", "2024-01-01")
            .with("value", value)
    }

    fn tariffs() -> TariffRegistry {
        let mut t = TariffRegistry::new();
        t.add(RateTariff::new("TOU-8", "large").with_default_option("B"));
        t.add(RateTariff::new("TOU-8-OLD", "large").with_closure(date!(2024-03-31), Some("TOU-8")));
        t.add(RateTariff::new("GS-1", "small").with_closure(date!(2024-03-31), None));
        t
    }

    fn store() -> RateScheduleStore {
        let mut s = RateScheduleStore::new("SCE", PlaceholderConfig::default());
        s.load_records(
            Category::Utility,
            vec![
                rec("demand", "summer", "onpeak", 5.0),
                rec("energy", "summer", "onpeak", 0.20),
                rec("energy", "winter", "offpeak", 0.10),
                rec("nonbypass", "", "", "CRS").with("component", "u"),
                rec("fixed", "", "", 300.0).with("level", 1),
                rec("fixed", "", "", 500.0).with("level", 2),
            ],
        )
        .unwrap();
        s.load_records(
            Category::Standby,
            vec![
                rec("demand", "summer", "onpeak", 2.0),
                rec("energy", "summer", "onpeak", "OAT"),
                rec("energy", "winter", "offpeak", "OAT"),
                rec("demand", "winter", "offpeak", "OAT"),
            ],
        )
        .unwrap();
        s.load_records(
            Category::Surcharge,
            vec![crs("pcia", "u", 0.03), crs("cca", "u", 0.025), crs("da", "u", 0.04)],
        )
        .unwrap();
        s
    }

    fn demand_onpeak() -> ChargeQuery {
        ChargeQuery::new(UnitClass::Demand).season("summer").period("onpeak")
    }

    #[test]
    fn categories_are_isolated_before_substitution() {
        let (store, tariffs, cfg) = (store(), tariffs(), SurchargeConfig::default());
        let resolver = ChargeResolver::new(&store, &tariffs, &cfg);
        let sa = agreement().with_standby();

        let standby = resolver.resolve(&sa, Category::Standby, DAY, &demand_onpeak()).unwrap();
        let utility = resolver.resolve(&sa, Category::Utility, DAY, &demand_onpeak()).unwrap();
        assert_eq!(standby.total, 2.0);
        assert_eq!(utility.total, 5.0);
        assert!(!standby.is_partial());
    }

    #[test]
    fn host_tariff_placeholder_takes_utility_rows() {
        let (store, tariffs, cfg) = (store(), tariffs(), SurchargeConfig::default());
        let resolver = ChargeResolver::new(&store, &tariffs, &cfg);
        let sa = agreement().with_standby();

        let q = ChargeQuery::new(UnitClass::Energy).season("summer").period("onpeak");
        let out = resolver.resolve(&sa, Category::Standby, DAY, &q).unwrap();
        assert_eq!(out.total, 0.20);

        let all_energy = resolver
            .resolve(&sa, Category::Standby, DAY, &ChargeQuery::new(UnitClass::Energy))
            .unwrap();
        assert!((all_energy.total - 0.30).abs() < 1e-12);
    }

    #[test]
    fn host_tariff_placeholder_without_utility_row_is_reported() {
        let (store, tariffs, cfg) = (store(), tariffs(), SurchargeConfig::default());
        let resolver = ChargeResolver::new(&store, &tariffs, &cfg);

        let q = ChargeQuery::new(UnitClass::Demand).season("winter");
        let out = resolver.resolve(&agreement(), Category::Standby, DAY, &q).unwrap();
        assert_eq!(out.total, 0.0);
        assert_eq!(out.unresolved.len(), 1);
        assert_eq!(out.unresolved[0].reason, UnresolvedReason::NoOverrideRows);
        assert_eq!(out.unresolved[0].placeholder, Placeholder::HostTariff);
        assert!(matches!(
            out.into_complete(),
            Err(BillingError::UnresolvedPlaceholder { count: 1 })
        ));
    }

    #[test]
    fn surcharge_type_follows_provider_then_standby() {
        let (store, tariffs, cfg) = (store(), tariffs(), SurchargeConfig::default());
        let resolver = ChargeResolver::new(&store, &tariffs, &cfg);
        let base = agreement().with_surcharge_vintage("bundled", "2017");
        let q = ChargeQuery::new(UnitClass::Nonbypass);

        let cca = base
            .clone()
            .with_provider(Provider::new("Clean Power Alliance", ProviderKind::Cca))
            .with_standby();
        assert_eq!(resolver.surcharge_type(&cca).as_deref(), Some("cca"));
        assert_eq!(resolver.resolve(&cca, Category::Utility, DAY, &q).unwrap().total, 0.025);

        let standby = base.clone().with_standby();
        assert_eq!(resolver.resolve(&standby, Category::Utility, DAY, &q).unwrap().total, 0.03);

        let mut forced = base.clone();
        forced.force_surcharge = true;
        assert_eq!(resolver.surcharge_type(&forced).as_deref(), Some("pcia"));
    }

    #[test]
    fn aggregator_account_runs_both_passes_with_provider_precedence() {
        let mut s = store();
        let cpa = |r: TableRecord| r.with("provider", "Clean Power Alliance");
        s.load_records(
            Category::Aggregator,
            vec![
                cpa(rec("energy", "summer", "onpeak", 0.07)),
                cpa(rec("nonbypass", "", "", "OAT").with("component", "u")),
            ],
        )
        .unwrap();
        let (tariffs, cfg) = (tariffs(), SurchargeConfig::default());
        let resolver = ChargeResolver::new(&s, &tariffs, &cfg);
        let base = agreement().with_surcharge_vintage("bundled", "2017").with_standby();
        let q = ChargeQuery::new(UnitClass::Nonbypass);

        // The provider's type wins over the standby relationship.
        let cca = base
            .clone()
            .with_provider(Provider::new("Clean Power Alliance", ProviderKind::Cca));
        let out = resolver.resolve(&cca, Category::Aggregator, DAY, &q).unwrap();
        assert_eq!(out.total, 0.025);
        assert!(!out.is_partial());

        let direct = base
            .clone()
            .with_provider(Provider::new("Clean Power Alliance", ProviderKind::Direct));
        assert_eq!(resolver.resolve(&direct, Category::Aggregator, DAY, &q).unwrap().total, 0.04);

        let energy = ChargeQuery::new(UnitClass::Energy).season("summer").period("onpeak");
        assert_eq!(resolver.resolve(&cca, Category::Aggregator, DAY, &energy).unwrap().total, 0.07);

        // Without a provider the aggregator table does not apply at all.
        let none = resolver.resolve(&base, Category::Aggregator, DAY, &q).unwrap();
        assert_eq!(none.total, 0.0);
        assert!(!none.is_partial());
    }

    #[test]
    fn undefined_surcharge_type_drops_the_row_and_flags_it() {
        let (store, tariffs, cfg) = (store(), tariffs(), SurchargeConfig::default());
        let resolver = ChargeResolver::new(&store, &tariffs, &cfg);
        let sa = agreement().with_surcharge_vintage("bundled", "2017");

        let out = resolver
            .resolve(&sa, Category::Utility, DAY, &ChargeQuery::new(UnitClass::Nonbypass))
            .unwrap();
        assert_eq!(out.total, 0.0);
        assert_eq!(out.unresolved[0].reason, UnresolvedReason::UndefinedSurchargeType);

        // Gaps on other units are not reported against an energy query.
        let energy = resolver
            .resolve(&sa, Category::Utility, DAY, &ChargeQuery::new(UnitClass::Energy))
            .unwrap();
        assert!(!energy.is_partial());
    }

    #[test]
    fn surcharge_substitution_applies_to_rows_imported_from_host_tariff() {
        let mut s = store();
        s.insert_row(ChargeRow {
            selector: crate::rates::RowSelector {
                rate: Some("TOU-8".into()),
                option: Some("B".into()),
                connection: Some("secondary".into()),
                sub_tou: Some("I".into()),
                ..Default::default()
            },
            component: Some("u".into()),
            ..ChargeRow::new(
                Category::Standby,
                UnitClass::Nonbypass,
                date!(2024-01-01),
                ChargeValue::Placeholder(Placeholder::HostTariff),
            )
        });
        let (tariffs, cfg) = (tariffs(), SurchargeConfig::default());
        let resolver = ChargeResolver::new(&s, &tariffs, &cfg);
        let sa = agreement().with_standby().with_surcharge_vintage("bundled", "2017");

        let out = resolver
            .resolve(&sa, Category::Standby, DAY, &ChargeQuery::new(UnitClass::Nonbypass))
            .unwrap();
        assert_eq!(out.total, 0.03);
        assert!(!out.is_partial());
    }

    #[test]
    fn query_filters_components_levels_and_blank_axes() {
        let (store, tariffs, cfg) = (store(), tariffs(), SurchargeConfig::default());
        let resolver = ChargeResolver::new(&store, &tariffs, &cfg);
        let sa = agreement();

        let fixed = ChargeQuery::new(UnitClass::Fixed);
        assert_eq!(resolver.resolve(&sa, Category::Utility, DAY, &fixed).unwrap().total, 800.0);
        assert_eq!(
            resolver.resolve(&sa, Category::Utility, DAY, &fixed.clone().level(2)).unwrap().total,
            500.0
        );

        let blank = ChargeQuery::for_bucket(UnitClass::Fixed, &BucketKey::unclassified());
        assert_eq!(resolver.resolve(&sa, Category::Utility, DAY, &blank).unwrap().total, 800.0);

        let standby = sa.clone().with_standby().with_surcharge_vintage("bundled", "2017");
        let nbc = ChargeQuery::new(UnitClass::Nonbypass).components(["d"]);
        assert_eq!(resolver.resolve(&standby, Category::Utility, DAY, &nbc).unwrap().total, 0.0);
        let nbc = ChargeQuery::new(UnitClass::Nonbypass).components(["d", "u"]);
        assert_eq!(resolver.resolve(&standby, Category::Utility, DAY, &nbc).unwrap().total, 0.03);
    }

    #[test]
    fn text_values_count_as_zero() {
        let mut s = store();
        s.load_records(
            Category::PartialPeak,
            vec![
                rec("energy", "summer", "onpeak", "n/a"),
                rec("energy", "summer", "onpeak", 0.5),
            ],
        )
            .unwrap();
        let (tariffs, cfg) = (tariffs(), SurchargeConfig::default());
        let resolver = ChargeResolver::new(&s, &tariffs, &cfg);
        let out = resolver
            .resolve(&agreement(), Category::PartialPeak, DAY, &ChargeQuery::new(UnitClass::Energy))
            .unwrap();
        assert_eq!(out.total, 0.5);
    }

    #[test]
    fn tariff_lifecycle_errors_and_supersession() {
        let (store, tariffs, cfg) = (store(), tariffs(), SurchargeConfig::default());
        let resolver = ChargeResolver::new(&store, &tariffs, &cfg);

        let old = ServiceAgreement::new(date!(2023-01-01), "SCE", "TOU-8-OLD", "secondary", "I");
        let out = resolver.resolve(&old, Category::Utility, DAY, &demand_onpeak()).unwrap();
        assert_eq!(out.total, 5.0);

        let closed = ServiceAgreement::new(date!(2023-01-01), "SCE", "GS-1", "secondary", "I");
        assert!(matches!(
            resolver.resolve(&closed, Category::Utility, DAY, &demand_onpeak()),
            Err(BillingError::ClosedTariff { .. })
        ));

        let unknown = ServiceAgreement::new(date!(2023-01-01), "SCE", "TOU-9", "secondary", "I");
        assert!(matches!(
            resolver.resolve(&unknown, Category::Utility, DAY, &demand_onpeak()),
            Err(BillingError::UnknownTariff(_))
        ));

        assert!(matches!(
            resolver.resolve(&agreement(), Category::LoadShift, DAY, &demand_onpeak()),
            Err(BillingError::UnknownCategory(Category::LoadShift))
        ));
    }

    #[test]
    fn resolution_is_repeatable() {
        let (store, tariffs, cfg) = (store(), tariffs(), SurchargeConfig::default());
        let cache = ResolutionCache::new();
        let plain = ChargeResolver::new(&store, &tariffs, &cfg);
        let cached = ChargeResolver::new(&store, &tariffs, &cfg).with_cache(&cache);
        let sa = agreement().with_surcharge_vintage("bundled", "2017");

        for q in [
            ChargeQuery::new(UnitClass::Nonbypass),
            demand_onpeak(),
            ChargeQuery::new(UnitClass::Energy),
        ] {
            let first = plain.resolve(&sa, Category::Utility, DAY, &q).unwrap();
            let second = plain.resolve(&sa, Category::Utility, DAY, &q).unwrap();
            let third = cached.resolve(&sa, Category::Utility, DAY, &q).unwrap();
            let fourth = cached.resolve(&sa, Category::Utility, DAY, &q).unwrap();
            assert_eq!(first, second);
            assert_eq!(first, third);
            assert_eq!(first, fourth);
        }
        assert_eq!(cache.len(), 3);
    }
}
