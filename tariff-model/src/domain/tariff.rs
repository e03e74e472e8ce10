use serde::Deserialize;
use time::Date;

/// Basic eligibility and lifecycle rules of a utility rate tariff.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct RateTariff {
    pub name: String,
    pub class: String,
    /// TOU schedule key used when the agreement does not name one.
    #[serde(default)]
    pub tou_schedule: Option<String>,
    #[serde(default)]
    pub min_kw: f64,
    #[serde(default)]
    pub max_kw: Option<f64>,
    #[serde(default)]
    pub max_kw_cumulative: f64,
    #[serde(default)]
    pub max_kw_contracted: f64,
    #[serde(default)]
    pub default_option: Option<String>,
    #[serde(default)]
    pub protect_option: Option<String>,
    #[serde(default)]
    pub charge_levels: Option<u8>,
    #[serde(default = "default_time_of_use")]
    pub time_of_use: bool,
    #[serde(default)]
    pub close: Option<Date>,
    #[serde(default)]
    pub superseded_by: Option<String>,
}

fn default_time_of_use() -> bool {
    true
}

impl RateTariff {
    pub fn new(name: impl Into<String>, class: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            class: class.into(),
            tou_schedule: None,
            min_kw: 0.0,
            max_kw: None,
            max_kw_cumulative: 0.0,
            max_kw_contracted: 0.0,
            default_option: None,
            protect_option: None,
            charge_levels: None,
            time_of_use: default_time_of_use(),
            close: None,
            superseded_by: None,
        }
    }

    pub fn with_demand_range(mut self, min_kw: f64, max_kw: Option<f64>) -> Self {
        self.min_kw = min_kw;
        self.max_kw = max_kw;
        self
    }

    pub fn with_default_option(mut self, option: impl Into<String>) -> Self {
        self.default_option = Some(option.into());
        self
    }

    pub fn with_closure(mut self, close: Date, superseded_by: Option<&str>) -> Self {
        self.close = Some(close);
        self.superseded_by = superseded_by.map(str::to_string);
        self
    }

    /// Closed once the query date is past the closure date.
    pub fn is_closed_on(&self, date: Date) -> bool {
        self.close.is_some_and(|close| close < date)
    }

    pub fn admits_demand(&self, kw: f64) -> bool {
        kw >= self.min_kw && self.max_kw.map_or(true, |max| kw <= max)
    }
}
