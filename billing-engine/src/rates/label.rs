//! Column labels of wide rate tables.
//!
//! A label reads `<unit>[<season>-<period>][_<component>]`, e.g. `kwh1-3_d`
//! for the summer on-peak distribution energy charge, or `customer<level>` for
//! a fixed customer charge.

use super::UnitClass;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChargeLabel {
    pub unit: UnitClass,
    pub season: Option<String>,
    pub period: Option<String>,
    pub component: Option<String>,
    pub level: Option<u8>,
}

pub fn decode(label: &str) -> Option<ChargeLabel> {
    let label = label.trim().to_ascii_lowercase();

    if let Some(rest) = label.strip_prefix("customer") {
        let level = rest.chars().last().and_then(|c| c.to_digit(10)).map(|d| d as u8);
        return Some(ChargeLabel {
            unit: UnitClass::Fixed,
            season: None,
            period: None,
            component: None,
            level,
        });
    }

    // `kwh` must be tried before its prefix `kw`.
    let (token, rest) = ["kwh", "kw", "nbc"]
        .into_iter()
        .find_map(|t| label.strip_prefix(t).map(|rest| (t, rest)))?;
    let unit: UnitClass = token.parse().ok()?;

    let (tou, component) = match rest.split_once('_') {
        Some((tou, comp)) => (tou, Some(comp)),
        None => (rest, None),
    };

    let (season, period) = match tou.split_once('-') {
        Some((s, p)) => (Some(season_name(s)?), Some(period_name(p)?)),
        None if tou.is_empty() => (None, None),
        None => return None,
    };

    Some(ChargeLabel {
        unit,
        season,
        period,
        component: component.filter(|c| !c.is_empty()).map(component_name),
        level: None,
    })
}

fn season_name(code: &str) -> Option<String> {
    let name = match code.chars().last()? {
        '1' => "summer",
        '2' => "winter",
        '3' => "spring",
        '4' => "fall",
        _ => return None,
    };
    Some(name.to_string())
}

fn period_name(code: &str) -> Option<String> {
    let name = match code.chars().next()? {
        '1' => "offpeak",
        '2' => "partpeak",
        '3' => "onpeak",
        '4' => "superoffpeak",
        _ => return None,
    };
    Some(name.to_string())
}

// Unrecognised codes are kept verbatim.
fn component_name(code: &str) -> String {
    match code {
        "d" => "dist",
        "u" => "urg",
        "t" => "bypass",
        "cr" => "credit",
        "max" => "maximum",
        other => other,
    }
    .to_string()
}
