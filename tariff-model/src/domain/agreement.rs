use serde::Deserialize;
use time::Date;

use crate::{
    domain::{Provider, ProviderKind},
    ModelError,
};

/// Vintage bucket used to select cost responsibility surcharges.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SurchargeVintage {
    pub group: String,
    pub vintage: String,
}

/// Incentive/option pair for an interruptible program.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ProgramTerms {
    pub incentive: String,
    pub option: String,
}

/// Load shifting program enrolment.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ShiftTerms {
    pub incentive: String,
    pub option: String,
    pub cycling: String,
}

/// Binding of one customer meter to a tariff, option and connection.
///
/// Agreements are never mutated; a change of terms produces a new agreement
/// with a later `start`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ServiceAgreement {
    pub start: Date,
    pub utility: String,
    pub tariff: String,
    pub option: Option<String>,
    pub connection: String,
    pub sub_tou: String,
    pub schedule: Option<String>,
    pub provider: Option<Provider>,
    #[serde(default)]
    pub standby: bool,
    /// Forces the standby surcharge type even without a standby relationship.
    #[serde(default)]
    pub force_surcharge: bool,
    pub surcharge: Option<SurchargeVintage>,
    pub interrupt: Option<ProgramTerms>,
    pub shift: Option<ShiftTerms>,
}

impl ServiceAgreement {
    pub fn new(
        start: Date,
        utility: impl Into<String>,
        tariff: impl Into<String>,
        connection: impl Into<String>,
        sub_tou: impl Into<String>,
    ) -> Self {
        Self {
            start,
            utility: utility.into(),
            tariff: tariff.into(),
            option: None,
            connection: connection.into(),
            sub_tou: sub_tou.into(),
            schedule: None,
            provider: None,
            standby: false,
            force_surcharge: false,
            surcharge: None,
            interrupt: None,
            shift: None,
        }
    }

    pub fn with_option(mut self, option: impl Into<String>) -> Self {
        self.option = Some(option.into());
        self
    }

    pub fn with_schedule(mut self, schedule: impl Into<String>) -> Self {
        self.schedule = Some(schedule.into());
        self
    }

    pub fn with_provider(mut self, provider: Provider) -> Self {
        self.provider = Some(provider);
        self
    }

    pub fn with_standby(mut self) -> Self {
        self.standby = true;
        self
    }

    pub fn with_surcharge_vintage(
        mut self,
        group: impl Into<String>,
        vintage: impl Into<String>,
    ) -> Self {
        self.surcharge = Some(SurchargeVintage {
            group: group.into(),
            vintage: vintage.into(),
        });
        self
    }

    pub fn with_interrupt(
        mut self,
        incentive: impl Into<String>,
        option: impl Into<String>,
    ) -> Self {
        self.interrupt = Some(ProgramTerms {
            incentive: incentive.into(),
            option: option.into(),
        });
        self
    }

    pub fn with_shift(
        mut self,
        incentive: impl Into<String>,
        option: impl Into<String>,
        cycling: impl Into<String>,
    ) -> Self {
        self.shift = Some(ShiftTerms {
            incentive: incentive.into(),
            option: option.into(),
            cycling: cycling.into(),
        });
        self
    }

    /// Build an agreement from flat key/value parameters.
    ///
    /// Every key must be known; partial program terms (e.g. `group` without
    /// `vintage`) are reported as missing parameters.
    pub fn from_parameters<'a, I>(start: Date, params: I) -> Result<Self, ModelError>
    where
        I: IntoIterator<Item = (&'a str, &'a str)>,
    {
        let mut p = Params::default();
        for (key, value) in params {
            let value = value.trim().to_string();
            let slot = match key {
                "utility" => &mut p.utility,
                "tariff" => &mut p.tariff,
                "option" => &mut p.option,
                "connection" => &mut p.connection,
                "sub_tou" => &mut p.sub_tou,
                "schedule" => &mut p.schedule,
                "provider" => &mut p.provider,
                "provider_kind" => &mut p.provider_kind,
                "standby" => &mut p.standby,
                "force_surcharge" => &mut p.force_surcharge,
                "group" => &mut p.group,
                "vintage" => &mut p.vintage,
                "interrupt_incentive" => &mut p.interrupt_incentive,
                "interrupt_option" => &mut p.interrupt_option,
                "shift_incentive" => &mut p.shift_incentive,
                "shift_option" => &mut p.shift_option,
                "cycling" => &mut p.cycling,
                other => return Err(ModelError::UnknownParameter(other.to_string())),
            };
            *slot = Some(value);
        }

        let provider = match (p.provider, p.provider_kind) {
            (None, None) => None,
            (Some(name), Some(kind)) => Some(Provider::new(name, parse_provider_kind(&kind)?)),
            (Some(_), None) => return Err(ModelError::MissingParameter("provider_kind")),
            (None, Some(_)) => return Err(ModelError::MissingParameter("provider")),
        };

        Ok(Self {
            start,
            utility: p.utility.ok_or(ModelError::MissingParameter("utility"))?,
            tariff: p.tariff.ok_or(ModelError::MissingParameter("tariff"))?,
            option: p.option,
            connection: p.connection.ok_or(ModelError::MissingParameter("connection"))?,
            sub_tou: p.sub_tou.ok_or(ModelError::MissingParameter("sub_tou"))?,
            schedule: p.schedule,
            provider,
            standby: parse_flag("standby", p.standby)?,
            force_surcharge: parse_flag("force_surcharge", p.force_surcharge)?,
            surcharge: pair(p.group, p.vintage, "group", "vintage")?
                .map(|(group, vintage)| SurchargeVintage { group, vintage }),
            interrupt: pair(
                p.interrupt_incentive,
                p.interrupt_option,
                "interrupt_incentive",
                "interrupt_option",
            )?
            .map(|(incentive, option)| ProgramTerms { incentive, option }),
            shift: match (
                pair(p.shift_incentive, p.shift_option, "shift_incentive", "shift_option")?,
                p.cycling,
            ) {
                (None, None) => None,
                (Some((incentive, option)), Some(cycling)) => Some(ShiftTerms {
                    incentive,
                    option,
                    cycling,
                }),
                (Some(_), None) => return Err(ModelError::MissingParameter("cycling")),
                (None, Some(_)) => return Err(ModelError::MissingParameter("shift_incentive")),
            },
        })
    }
}

#[derive(Default)]
struct Params {
    utility: Option<String>,
    tariff: Option<String>,
    option: Option<String>,
    connection: Option<String>,
    sub_tou: Option<String>,
    schedule: Option<String>,
    provider: Option<String>,
    provider_kind: Option<String>,
    standby: Option<String>,
    force_surcharge: Option<String>,
    group: Option<String>,
    vintage: Option<String>,
    interrupt_incentive: Option<String>,
    interrupt_option: Option<String>,
    shift_incentive: Option<String>,
    shift_option: Option<String>,
    cycling: Option<String>,
}

fn pair(
    a: Option<String>,
    b: Option<String>,
    a_name: &'static str,
    b_name: &'static str,
) -> Result<Option<(String, String)>, ModelError> {
    match (a, b) {
        (None, None) => Ok(None),
        (Some(a), Some(b)) => Ok(Some((a, b))),
        (Some(_), None) => Err(ModelError::MissingParameter(b_name)),
        (None, Some(_)) => Err(ModelError::MissingParameter(a_name)),
    }
}

fn parse_flag(name: &str, value: Option<String>) -> Result<bool, ModelError> {
    let Some(value) = value else {
        return Ok(false);
    };
    match value.to_ascii_lowercase().as_str() {
        "true" | "yes" | "y" | "1" => Ok(true),
        "false" | "no" | "n" | "0" | "" => Ok(false),
        _ => Err(ModelError::Cell {
            column: name.to_string(),
            value,
            expected: "flag",
        }),
    }
}

fn parse_provider_kind(value: &str) -> Result<ProviderKind, ModelError> {
    match value.to_ascii_lowercase().as_str() {
        "da" | "direct" => Ok(ProviderKind::Direct),
        "cca" => Ok(ProviderKind::Cca),
        _ => Err(ModelError::Cell {
            column: "provider_kind".to_string(),
            value: value.to_string(),
            expected: "provider kind (da|cca)",
        }),
    }
}
