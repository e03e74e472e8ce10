//! Charge rows and the rate categories they belong to.

pub mod label;
pub mod store;
pub mod tariffs;

use std::{fmt, str::FromStr};

use time::Date;

pub use label::ChargeLabel;
pub use store::RateScheduleStore;
pub use tariffs::TariffRegistry;

/// Rate table family. Each category has a fixed table name, a set of charge
/// axes its rows may carry and an extraction rule (see [`RateScheduleStore::extract`]).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Category {
    Utility,
    Standby,
    Surcharge,
    Aggregator,
    PartialPeak,
    Interruptible,
    LoadShift,
}

/// Charge axis a row of some category may carry besides its unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Axis {
    Season,
    Period,
    Component,
    Level,
    SurchargeType,
}

impl Category {
    pub const ALL: [Category; 7] = [
        Category::Utility,
        Category::Standby,
        Category::Surcharge,
        Category::Aggregator,
        Category::PartialPeak,
        Category::Interruptible,
        Category::LoadShift,
    ];

    pub fn table_name(&self) -> &'static str {
        match self {
            Category::Utility => "utilityrates",
            Category::Standby => "standbyrates",
            Category::Surcharge => "crsrates",
            Category::Aggregator => "daccarates",
            Category::PartialPeak => "pkprates",
            Category::Interruptible => "interruptrates",
            Category::LoadShift => "apsrates",
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Utility => "utility",
            Category::Standby => "standby",
            Category::Surcharge => "surcharge",
            Category::Aggregator => "aggregator",
            Category::PartialPeak => "partial_peak",
            Category::Interruptible => "interruptible",
            Category::LoadShift => "load_shift",
        }
    }

    pub fn from_table_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|c| c.table_name() == name)
    }

    pub fn schema(&self) -> &'static [Axis] {
        use Axis::*;
        match self {
            Category::Utility | Category::Standby => &[Season, Period, Component, Level],
            Category::Surcharge => &[Season, Period, Component, SurchargeType],
            Category::Aggregator | Category::PartialPeak | Category::Interruptible => {
                &[Season, Period, Component]
            }
            Category::LoadShift => &[],
        }
    }

    pub fn has_axis(&self, axis: Axis) -> bool {
        self.schema().contains(&axis)
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum UnitClass {
    Fixed,
    Energy,
    Demand,
    Nonbypass,
}

impl UnitClass {
    pub fn as_str(&self) -> &'static str {
        match self {
            UnitClass::Fixed => "fixed",
            UnitClass::Energy => "energy",
            UnitClass::Demand => "demand",
            UnitClass::Nonbypass => "nonbypass",
        }
    }
}

impl fmt::Display for UnitClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for UnitClass {
    type Err = String;

    /// Accepts the class names and the short tokens used in charge labels.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "fixed" | "customer" => Ok(UnitClass::Fixed),
            "energy" | "kwh" => Ok(UnitClass::Energy),
            "demand" | "kw" => Ok(UnitClass::Demand),
            "nonbypass" | "nonbypassable" | "nbc" => Ok(UnitClass::Nonbypass),
            other => Err(other.to_string()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Placeholder {
    /// Take the matching charge from the agreement's own utility tariff.
    HostTariff,
    /// Take the matching charge from the agreement's surcharge schedule.
    Surcharge,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ChargeValue {
    Amount(f64),
    Placeholder(Placeholder),
    /// Non-numeric cell; contributes nothing to a sum.
    Text(String),
}

impl ChargeValue {
    pub fn amount(&self) -> f64 {
        match self {
            ChargeValue::Amount(v) => *v,
            _ => 0.0,
        }
    }

    pub fn placeholder(&self) -> Option<Placeholder> {
        match self {
            ChargeValue::Placeholder(p) => Some(*p),
            _ => None,
        }
    }
}

/// Agreement-matching keys of a charge row. Blank cells are `None`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct RowSelector {
    pub rate: Option<String>,
    pub option: Option<String>,
    pub connection: Option<String>,
    pub sub_tou: Option<String>,
    pub group: Option<String>,
    pub vintage: Option<String>,
    pub provider: Option<String>,
    pub incentive: Option<String>,
    pub cycling: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ChargeRow {
    pub category: Category,
    pub selector: RowSelector,
    pub unit: UnitClass,
    pub season: Option<String>,
    pub period: Option<String>,
    pub component: Option<String>,
    pub level: Option<u8>,
    pub surcharge_type: Option<String>,
    pub effective: Date,
    pub value: ChargeValue,
}

impl ChargeRow {
    /// A literal row with no selector keys; mostly useful to build fixtures.
    pub fn new(category: Category, unit: UnitClass, effective: Date, value: ChargeValue) -> Self {
        Self {
            category,
            selector: RowSelector::default(),
            unit,
            season: None,
            period: None,
            component: None,
            level: None,
            surcharge_type: None,
            effective,
            value,
        }
    }

    pub fn is_placeholder(&self) -> bool {
        self.value.placeholder().is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn table_names_round_trip() {
        for c in Category::ALL {
            assert_eq!(Category::from_table_name(c.table_name()), Some(c));
        }
        assert_eq!(Category::from_table_name("gasrates"), None);
    }

    #[test]
    fn unit_class_accepts_label_tokens() {
        assert_eq!("kwh".parse::<UnitClass>(), Ok(UnitClass::Energy));
        assert_eq!("NBC".parse::<UnitClass>(), Ok(UnitClass::Nonbypass));
        assert_eq!("customer".parse::<UnitClass>(), Ok(UnitClass::Fixed));
        assert!("kvar".parse::<UnitClass>().is_err());
    }

    #[test]
    fn only_surcharge_rows_carry_a_surcharge_type() {
        let with_type: Vec<_> = Category::ALL
            .into_iter()
            .filter(|c| c.has_axis(Axis::SurchargeType))
            .collect();
        assert_eq!(with_type, vec![Category::Surcharge]);
        assert!(!Category::LoadShift.has_axis(Axis::Season));
    }
}
