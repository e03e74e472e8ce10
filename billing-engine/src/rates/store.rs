use std::collections::HashMap;

use tariff_model::{domain::ServiceAgreement, Cell, TableRecord};
use time::Date;

use super::{label, Category, ChargeRow, ChargeValue, Placeholder, RowSelector, UnitClass};
use crate::{
    config::PlaceholderConfig,
    error::{BillingError, BillingResult},
    sources::scope_to_utility,
};

/// Columns that identify a row in a wide table; every other column is a
/// charge label.
const ID_COLUMNS: &[&str] = &[
    "utility",
    "rate",
    "option",
    "connection",
    "subTOU",
    "effective",
    "group",
    "vintage",
    "provider",
    "incentive",
    "cycling",
    "surcharge-type",
    "type",
];

/// Charge rows of one utility, per rate category.
///
/// Loaded once before a billing run and shared read-only afterwards.
#[derive(Debug, Clone)]
pub struct RateScheduleStore {
    utility: String,
    placeholders: PlaceholderConfig,
    tables: HashMap<Category, Vec<ChargeRow>>,
}

impl RateScheduleStore {
    pub fn new(utility: &str, placeholders: PlaceholderConfig) -> Self {
        Self {
            utility: utility.to_string(),
            placeholders,
            tables: HashMap::new(),
        }
    }

    pub fn utility(&self) -> &str {
        &self.utility
    }

    /// Load long-format rows: one charge per record with explicit `unit`,
    /// `season`, `period`, `component`, `level`, `surcharge-type`, `effective`
    /// and `value` columns. Rows with an empty value are skipped.
    pub fn load_records(
        &mut self,
        category: Category,
        records: Vec<TableRecord>,
    ) -> BillingResult<usize> {
        let mut loaded = Vec::new();
        for r in scope_to_utility(records, &self.utility) {
            let Some(value) = self.charge_value(r.cell("value"), &r.text("value")) else {
                continue;
            };
            let unit_text = r.require_text("unit")?;
            let unit = unit_text.parse::<UnitClass>().map_err(|u| BillingError::InvalidTable {
                table: category.table_name(),
                message: format!("unknown unit '{u}'"),
            })?;
            loaded.push(ChargeRow {
                category,
                selector: selector(&r),
                unit,
                season: r.text("season"),
                period: r.text("period"),
                component: r.text("component"),
                level: r.small_int("level")?,
                surcharge_type: surcharge_type(&r),
                effective: effective(&r, category)?,
                value,
            });
        }
        Ok(self.append(category, loaded))
    }

    /// Load wide rows: identification columns followed by one column per
    /// charge label (see [`label::decode`]). Zero and empty cells are dropped.
    pub fn load_wide_records(
        &mut self,
        category: Category,
        records: Vec<TableRecord>,
    ) -> BillingResult<usize> {
        let mut loaded = Vec::new();
        for r in scope_to_utility(records, &self.utility) {
            let base_selector = selector(&r);
            let effective = effective(&r, category)?;
            let surcharge_type = surcharge_type(&r);

            for column in r.columns().filter(|c| !ID_COLUMNS.contains(c)) {
                let Some(value) = self.charge_value(r.cell(column), &r.text(column)) else {
                    continue;
                };
                if value == ChargeValue::Amount(0.0) {
                    continue;
                }
                let decoded = label::decode(column).ok_or_else(|| BillingError::InvalidTable {
                    table: category.table_name(),
                    message: format!("unrecognised charge label '{column}'"),
                })?;
                loaded.push(ChargeRow {
                    category,
                    selector: base_selector.clone(),
                    unit: decoded.unit,
                    season: decoded.season,
                    period: decoded.period,
                    component: decoded.component,
                    level: decoded.level,
                    surcharge_type: surcharge_type.clone(),
                    effective,
                    value,
                });
            }
        }
        Ok(self.append(category, loaded))
    }

    pub fn insert_row(&mut self, row: ChargeRow) {
        self.tables.entry(row.category).or_default().push(row);
    }

    pub fn has_category(&self, category: Category) -> bool {
        self.tables.contains_key(&category)
    }

    pub fn rows(&self, category: Category) -> &[ChargeRow] {
        self.tables.get(&category).map(Vec::as_slice).unwrap_or_default()
    }

    /// Rows of `category` that apply to `agreement` on `date`, in load order.
    ///
    /// Only rows at the most recent effective date not after `date` are kept.
    /// A category whose agreement terms are absent (no provider, no surcharge
    /// vintage, no program enrolment) yields no rows.
    pub fn extract(
        &self,
        category: Category,
        agreement: &ServiceAgreement,
        date: Date,
    ) -> BillingResult<Vec<ChargeRow>> {
        let rows = self
            .tables
            .get(&category)
            .ok_or(BillingError::UnknownCategory(category))?;

        let matching: Vec<&ChargeRow> = match category {
            Category::Utility | Category::PartialPeak => rows
                .iter()
                .filter(|r| matches_tariff(&r.selector, agreement))
                .collect(),
            Category::Standby => {
                let (rate, option) = standby_keys(rows, agreement);
                rows.iter()
                    .filter(|r| {
                        let s = &r.selector;
                        eq(&s.sub_tou, &agreement.sub_tou)
                            && eq(&s.connection, &agreement.connection)
                            && s.rate.as_deref() == rate
                            && s.option.as_deref() == option
                    })
                    .collect()
            }
            Category::Surcharge => match &agreement.surcharge {
                Some(v) => rows
                    .iter()
                    .filter(|r| {
                        eq(&r.selector.group, &v.group) && eq(&r.selector.vintage, &v.vintage)
                    })
                    .collect(),
                None => Vec::new(),
            },
            Category::Aggregator => match &agreement.provider {
                Some(p) => rows
                    .iter()
                    .filter(|r| {
                        eq(&r.selector.provider, &p.name) && matches_tariff(&r.selector, agreement)
                    })
                    .collect(),
                None => Vec::new(),
            },
            Category::Interruptible => match &agreement.interrupt {
                Some(t) => rows
                    .iter()
                    .filter(|r| {
                        let s = &r.selector;
                        eq(&s.incentive, &t.incentive)
                            && eq(&s.option, &t.option)
                            && eq(&s.sub_tou, &agreement.sub_tou)
                            && eq(&s.connection, &agreement.connection)
                    })
                    .collect(),
                None => Vec::new(),
            },
            Category::LoadShift => match &agreement.shift {
                Some(t) => rows
                    .iter()
                    .filter(|r| {
                        let s = &r.selector;
                        eq(&s.incentive, &t.incentive)
                            && eq(&s.option, &t.option)
                            && eq(&s.cycling, &t.cycling)
                    })
                    .collect(),
                None => Vec::new(),
            },
        };

        let latest = matching.iter().map(|r| r.effective).filter(|e| *e <= date).max();
        let out: Vec<ChargeRow> = match latest {
            Some(latest) => matching
                .into_iter()
                .filter(|r| r.effective == latest)
                .cloned()
                .collect(),
            None => Vec::new(),
        };

        tracing::trace!(
            category = %category,
            tariff = %agreement.tariff,
            %date,
            rows = out.len(),
            "extracted charge rows"
        );
        Ok(out)
    }

    fn append(&mut self, category: Category, rows: Vec<ChargeRow>) -> usize {
        let count = rows.len();
        self.tables.entry(category).or_default().extend(rows);
        tracing::debug!(
            utility = %self.utility,
            table = category.table_name(),
            rows = count,
            "loaded rate table"
        );
        count
    }

    fn charge_value(&self, cell: &Cell, text: &Option<String>) -> Option<ChargeValue> {
        if let Cell::Number(n) = cell {
            return Some(ChargeValue::Amount(*n));
        }
        let text = text.as_deref()?;
        let value = if text == self.placeholders.host_tariff {
            ChargeValue::Placeholder(Placeholder::HostTariff)
        } else if text == self.placeholders.surcharge {
            ChargeValue::Placeholder(Placeholder::Surcharge)
        } else {
            match text.replace(',', "").parse::<f64>() {
                Ok(n) => ChargeValue::Amount(n),
                Err(_) => ChargeValue::Text(text.to_string()),
            }
        };
        Some(value)
    }
}

fn selector(r: &TableRecord) -> RowSelector {
    RowSelector {
        rate: r.text("rate"),
        option: r.text("option"),
        connection: r.text("connection"),
        sub_tou: r.text("subTOU"),
        group: r.text("group"),
        vintage: r.text("vintage"),
        provider: r.text("provider"),
        incentive: r.text("incentive"),
        cycling: r.text("cycling"),
    }
}

fn surcharge_type(r: &TableRecord) -> Option<String> {
    r.text("surcharge-type").or_else(|| r.text("type"))
}

fn effective(r: &TableRecord, category: Category) -> BillingResult<Date> {
    r.date("effective")?.ok_or_else(|| BillingError::InvalidTable {
        table: category.table_name(),
        message: "missing 'effective'".to_string(),
    })
}

fn eq(cell: &Option<String>, want: &str) -> bool {
    cell.as_deref() == Some(want)
}

fn matches_tariff(s: &RowSelector, a: &ServiceAgreement) -> bool {
    eq(&s.rate, &a.tariff)
        && s.option.as_deref() == a.option.as_deref()
        && eq(&s.connection, &a.connection)
        && eq(&s.sub_tou, &a.sub_tou)
}

// Standby rows fall back to the rate-independent (blank rate) default when no
// row names the tariff, and to the option-independent default when no row for
// that tariff names the option.
fn standby_keys<'a>(
    rows: &[ChargeRow],
    a: &'a ServiceAgreement,
) -> (Option<&'a str>, Option<&'a str>) {
    if !rows.iter().any(|r| eq(&r.selector.rate, &a.tariff)) {
        return (None, None);
    }
    let option = a.option.as_deref().filter(|opt| {
        rows.iter()
            .any(|r| eq(&r.selector.rate, &a.tariff) && eq(&r.selector.option, opt))
    });
    (Some(a.tariff.as_str()), option)
}
