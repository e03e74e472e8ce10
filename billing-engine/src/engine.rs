//! One meter's bill: calendar, TOU classification, bucketing and charge
//! resolution for every requested charge.

use std::sync::Arc;

use tariff_model::domain::{Interval, ServiceAgreement};
use time::Date;

use crate::{
    bucket::{bucket, BillingQuantities, BucketKey},
    cache::ResolutionCache,
    calendar::{self, Window},
    classify::classify,
    config::EngineConfig,
    error::{BillingError, BillingResult},
    programs::DemandResponse,
    rates::{Category, RateScheduleStore, TariffRegistry},
    resolve::{ChargeQuery, ChargeResolver, UnresolvedPlaceholder},
    tou::{TouRecords, TouRegistry},
};

/// Quantity a resolved rate is multiplied by.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChargeBasis {
    /// Rate × distinct days in the window.
    PerDay,
    /// Rate per `(season, period)` energy bucket × that bucket's energy.
    PerEnergyBucket,
    /// Rate per `(season, period)` demand bucket × that bucket's demand.
    PerDemandBucket,
    /// Rate × positive-sample total.
    NetExport,
    /// Rate charged once.
    Flat,
}

#[derive(Debug, Clone)]
pub struct ChargeRequest {
    pub label: String,
    pub category: Category,
    pub query: ChargeQuery,
    pub basis: ChargeBasis,
}

impl ChargeRequest {
    pub fn new(label: &str, category: Category, query: ChargeQuery, basis: ChargeBasis) -> Self {
        Self {
            label: label.to_string(),
            category,
            query,
            basis,
        }
    }
}

/// A (meter, billing period) unit of work.
#[derive(Debug, Clone)]
pub struct MeterJob {
    pub meter_id: String,
    pub interval: Interval,
    pub agreement: ServiceAgreement,
    /// Date the rate schedules are read at.
    pub date: Date,
    pub window: Option<Window>,
    pub programs: Vec<String>,
    pub charges: Vec<ChargeRequest>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct StatementLine {
    pub label: String,
    pub category: Category,
    pub bucket: Option<BucketKey>,
    pub quantity: f64,
    pub rate: f64,
    pub amount: f64,
    pub unresolved: Vec<UnresolvedPlaceholder>,
}

impl StatementLine {
    /// Needs manual review: part of the rate could not be resolved.
    pub fn is_partial(&self) -> bool {
        !self.unresolved.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct MeterStatement {
    pub meter_id: String,
    pub tariff: String,
    pub date: Date,
    pub quantities: BillingQuantities,
    pub lines: Vec<StatementLine>,
}

impl MeterStatement {
    pub fn total(&self) -> f64 {
        self.lines.iter().map(|l| l.amount).sum()
    }

    pub fn is_partial(&self) -> bool {
        self.lines.iter().any(StatementLine::is_partial)
    }
}

/// Read-only reference data for one utility and billing run.
pub struct BillingEngine {
    config: EngineConfig,
    tou: Arc<TouRegistry>,
    rates: Arc<RateScheduleStore>,
    tariffs: Arc<TariffRegistry>,
    programs: Option<Arc<DemandResponse>>,
    cache: Option<ResolutionCache>,
}

impl BillingEngine {
    pub fn new(
        config: EngineConfig,
        tou: Arc<TouRegistry>,
        rates: Arc<RateScheduleStore>,
        tariffs: Arc<TariffRegistry>,
    ) -> Self {
        Self {
            config,
            tou,
            rates,
            tariffs,
            programs: None,
            cache: None,
        }
    }

    /// Build the reference data from raw tables, taking holiday observance and
    /// placeholder tokens from `config`.
    pub fn from_config<F>(
        config: EngineConfig,
        utility: &str,
        tou: TouRecords,
        tariffs: TariffRegistry,
        load_rates: F,
    ) -> BillingResult<Self>
    where
        F: FnOnce(&mut RateScheduleStore) -> BillingResult<()>,
    {
        let registry = TouRegistry::from_records(utility, tou, config.tou.observe_holidays);
        let mut rates = RateScheduleStore::new(utility, config.placeholders.clone());
        load_rates(&mut rates)?;
        tracing::info!(
            utility,
            tariffs = tariffs.len(),
            observe_holidays = config.tou.observe_holidays,
            "billing engine ready"
        );
        Ok(Self::new(config, Arc::new(registry), Arc::new(rates), Arc::new(tariffs)))
    }

    pub fn with_programs(mut self, programs: Arc<DemandResponse>) -> Self {
        self.programs = Some(programs);
        self
    }

    /// Memoise charge resolutions across jobs of this run.
    pub fn with_cache(mut self) -> Self {
        self.cache = Some(ResolutionCache::new());
        self
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn tou(&self) -> &TouRegistry {
        &self.tou
    }

    pub fn rates(&self) -> &RateScheduleStore {
        &self.rates
    }

    pub fn resolver(&self) -> ChargeResolver<'_> {
        let resolver = ChargeResolver::new(&self.rates, &self.tariffs, &self.config.surcharge);
        match &self.cache {
            Some(cache) => resolver.with_cache(cache),
            None => resolver,
        }
    }

    pub fn bill(&self, job: &MeterJob) -> BillingResult<MeterStatement> {
        let resolver = self.resolver();
        let tariff = self.tariffs.active(&job.agreement.tariff, job.date)?;
        let sa = resolver.effective_agreement(&job.agreement, job.date)?;
        let window = job.window.as_ref();

        let classified = if tariff.time_of_use {
            let table = self.tou.table(&sa.sub_tou, sa.schedule.as_deref())?;
            let cal = calendar::for_interval(&job.interval)?;
            classify(&cal, &table, window)
        } else {
            Vec::new()
        };
        let quantities = bucket(&job.interval, &classified, window)?;

        let peak = quantities.peak_demand();
        if !quantities.demand.is_empty() && !tariff.admits_demand(peak) {
            return Err(BillingError::DemandOutOfRange {
                tariff: tariff.name.clone(),
                kw: peak,
            });
        }
        if let Some(dr) = self.programs.as_ref().filter(|_| !job.programs.is_empty()) {
            dr.check_enrollment(&job.programs, tariff, peak)?;
        }

        let mut lines = Vec::new();
        for req in &job.charges {
            match req.basis {
                ChargeBasis::PerEnergyBucket | ChargeBasis::PerDemandBucket => {
                    let buckets = if req.basis == ChargeBasis::PerEnergyBucket {
                        &quantities.energy
                    } else {
                        &quantities.demand
                    };
                    for (key, quantity) in buckets {
                        let query = req.query.clone().in_bucket(key);
                        let outcome =
                            resolver.resolve(&job.agreement, req.category, job.date, &query)?;
                        lines.push(StatementLine {
                            label: req.label.clone(),
                            category: req.category,
                            bucket: Some(key.clone()),
                            quantity: *quantity,
                            rate: outcome.total,
                            amount: outcome.total * quantity,
                            unresolved: outcome.unresolved,
                        });
                    }
                }
                basis => {
                    let quantity = match basis {
                        ChargeBasis::PerDay => quantities.days as f64,
                        ChargeBasis::NetExport => quantities.net_export,
                        _ => 1.0,
                    };
                    let outcome =
                        resolver.resolve(&job.agreement, req.category, job.date, &req.query)?;
                    lines.push(StatementLine {
                        label: req.label.clone(),
                        category: req.category,
                        bucket: None,
                        quantity,
                        rate: outcome.total,
                        amount: outcome.total * quantity,
                        unresolved: outcome.unresolved,
                    });
                }
            }
        }

        let statement = MeterStatement {
            meter_id: job.meter_id.clone(),
            tariff: sa.tariff,
            date: job.date,
            quantities,
            lines,
        };
        tracing::debug!(
            meter_id = %statement.meter_id,
            tariff = %statement.tariff,
            lines = statement.lines.len(),
            total = statement.total(),
            partial = statement.is_partial(),
            "billed meter"
        );
        Ok(statement)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::{
        config::PlaceholderConfig,
        programs::EnrollmentError,
        rates::UnitClass,
    };
    use tariff_model::{
        domain::{Direction, RateTariff, Unit},
        TableRecord,
    };
    use time::{
        macros::{date, datetime},
        Duration, OffsetDateTime,
    };

    fn tou() -> TouRegistry {
        TouRegistry::from_records("SCE", tou_records(), true)
    }

    fn tou_records() -> TouRecords {
        let season =
            |name: &str, start: i32| TableRecord::new().with("season", name).with("start", start);
        let period = |season: &str, start: &str, name: &str| {
            TableRecord::new()
                .with("season", season)
                .with("dayoff", false)
                .with("start", start)
                .with("period", name)
        };
        TouRecords {
            seasons: vec![season("summer", 6), season("winter", 10)],
            periods: vec![
                period("summer", "0:00", "offpeak"),
                period("summer", "12:00", "onpeak"),
                period("summer", "18:00", "offpeak"),
                period("winter", "0:00", "offpeak"),
            ],
            days_off: vec![
                TableRecord::new().with("weekday", 5).with("dayoff", true),
                TableRecord::new().with("weekday", 6).with("dayoff", true),
            ],
            ..Default::default()
        }
    }

    fn rates() -> RateScheduleStore {
        let rec = |unit: &str, season: &str, period: &str, value: f64| {
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
        };
        let mut store = RateScheduleStore::new("SCE", PlaceholderConfig::default());
        store
            .load_records(
                Category::Utility,
                vec![
                    rec("energy", "summer", "onpeak", 0.25),
                    rec("energy", "summer", "offpeak", 0.10),
                    rec("demand", "summer", "onpeak", 5.0),
                    rec("fixed", "", "", 1.5),
                    rec("nonbypass", "", "", 0.0).with("value", "CRS"),
                ],
            )
            .unwrap();
        store
    }

    fn tariffs() -> TariffRegistry {
        let mut t = TariffRegistry::new();
        t.add(RateTariff::new("TOU-8", "large").with_default_option("B"));
        let mut flat = RateTariff::new("TOU-8-FLAT", "large").with_default_option("B");
        flat.time_of_use = false;
        t.add(flat);
        t.add(RateTariff::new("TOU-8-XL", "large").with_demand_range(500.0, None));
        t
    }

    pub(crate) fn engine() -> BillingEngine {
        BillingEngine::new(
            EngineConfig::default(),
            Arc::new(tou()),
            Arc::new(rates()),
            Arc::new(tariffs()),
        )
    }

    pub(crate) fn job(meter_id: &str) -> MeterJob {
        let start: OffsetDateTime = datetime!(2024-07-02 13:00:00 UTC);
        let interval = Interval::from_pairs(
            [0.0, 10.0, 10.0, 0.0]
                .into_iter()
                .enumerate()
                .map(|(i, v)| (start + Duration::minutes(15 * i as i64), v)),
            Direction::Import,
            Unit::Kwh,
        )
        .unwrap();
        MeterJob {
            meter_id: meter_id.to_string(),
            interval,
            agreement: ServiceAgreement::new(date!(2023-01-01), "SCE", "TOU-8", "secondary", "I"),
            date: date!(2024-07-31),
            window: None,
            programs: Vec::new(),
            charges: vec![
                ChargeRequest::new(
                    "energy",
                    Category::Utility,
                    ChargeQuery::new(UnitClass::Energy),
                    ChargeBasis::PerEnergyBucket,
                ),
                ChargeRequest::new(
                    "demand",
                    Category::Utility,
                    ChargeQuery::new(UnitClass::Demand),
                    ChargeBasis::PerDemandBucket,
                ),
                ChargeRequest::new(
                    "customer",
                    Category::Utility,
                    ChargeQuery::new(UnitClass::Fixed),
                    ChargeBasis::PerDay,
                ),
            ],
        }
    }

    #[test]
    fn bills_buckets_and_daily_charges() {
        let statement = engine().bill(&job("m-1")).unwrap();

        assert_eq!(statement.tariff, "TOU-8");
        assert_eq!(statement.quantities.days, 1);
        assert_eq!(statement.lines.len(), 3);

        let energy = &statement.lines[0];
        assert_eq!(energy.bucket, Some(BucketKey::new("summer", "onpeak")));
        assert_eq!(energy.quantity, 20.0);
        assert_eq!(energy.amount, 5.0);

        let demand = &statement.lines[1];
        assert_eq!(demand.quantity, 40.0);
        assert_eq!(demand.amount, 200.0);

        assert_eq!(statement.lines[2].amount, 1.5);
        assert_eq!(statement.total(), 206.5);
        assert!(!statement.is_partial());
    }

    #[test]
    fn unsubstituted_surcharge_marks_statement_partial() {
        let mut j = job("m-2");
        j.charges.push(ChargeRequest::new(
            "nbc",
            Category::Utility,
            ChargeQuery::new(UnitClass::Nonbypass),
            ChargeBasis::NetExport,
        ));
        let statement = engine().bill(&j).unwrap();
        assert!(statement.is_partial());
        assert_eq!(statement.lines[3].amount, 0.0);
        assert_eq!(statement.total(), 206.5);
    }

    #[test]
    fn non_tou_tariff_bills_everything_unclassified() {
        let mut j = job("m-3");
        j.agreement.tariff = "TOU-8-FLAT".to_string();
        let statement = engine().bill(&j).unwrap();
        assert_eq!(statement.quantities.energy_for(&BucketKey::unclassified()), 20.0);
        // The rate tables carry no rows for this tariff.
        assert_eq!(statement.lines[0].amount, 0.0);
    }

    #[test]
    fn program_rules_are_enforced() {
        let mut dr = DemandResponse::new("SCE", ["BIP"]);
        dr.add_minimum("BIP", 100.0);
        let engine = engine().with_programs(Arc::new(dr));

        let mut j = job("m-4");
        j.programs = vec!["BIP".to_string()];
        assert!(matches!(
            engine.bill(&j),
            Err(BillingError::Enrollment(EnrollmentError::BelowMinimum { .. }))
        ));
    }

    #[test]
    fn cached_engine_gives_identical_statements() {
        let plain = engine().bill(&job("m-5")).unwrap();
        let cached_engine = engine().with_cache();
        let first = cached_engine.bill(&job("m-5")).unwrap();
        let second = cached_engine.bill(&job("m-5")).unwrap();
        assert_eq!(plain, first);
        assert_eq!(first, second);
    }

    #[test]
    fn missing_tou_rules_fail_the_job() {
        let mut j = job("m-6");
        j.agreement.sub_tou = "II".to_string();
        let empty = BillingEngine::new(
            EngineConfig::default(),
            Arc::new(TouRegistry::from_records("SCE", TouRecords::default(), true)),
            Arc::new(rates()),
            Arc::new(tariffs()),
        );
        assert!(matches!(empty.bill(&j), Err(BillingError::UnknownTouTable { .. })));
    }

    #[test]
    fn from_config_applies_holiday_and_placeholder_settings() {
        let config = EngineConfig::from_toml(
            r#"
            [placeholders]
            host_tariff = "HOST"

            [tou]
            observe_holidays = false
            "#,
        )
        .unwrap();
        let mut records = tou_records();
        records.holidays = vec![TableRecord::new().with("date", "2024-07-04").with("dayoff", true)];

        let engine = BillingEngine::from_config(config, "SCE", records, tariffs(), |store| {
            store.load_records(
                Category::Standby,
                vec![TableRecord::new()
                    .with("rate", "TOU-8")
                    .with("connection", "secondary")
                    .with("subTOU", "I")
                    .with("unit", "energy")
                    .with("effective", "2024-01-01")
                    .with("value", "HOST")],
            )?;
            Ok(())
        })
        .unwrap();

        let table = engine.tou().table("I", None).unwrap();
        assert!(!table.observes_holidays());
        assert!(!table.is_day_off(3, date!(2024-07-04)));
        assert!(engine.rates().rows(Category::Standby)[0].is_placeholder());
    }

    #[test]
    fn peak_demand_outside_tariff_range_fails_the_job() {
        let mut j = job("m-7");
        j.agreement.tariff = "TOU-8-XL".to_string();
        assert!(matches!(
            engine().bill(&j),
            Err(BillingError::DemandOutOfRange { kw, .. }) if kw == 40.0
        ));
    }
}
