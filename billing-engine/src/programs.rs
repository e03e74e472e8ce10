//! Demand response program eligibility.

use std::collections::{BTreeSet, HashMap, HashSet};

use tariff_model::domain::RateTariff;

#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum EnrollmentError {
    #[error("unknown demand response program '{0}'")]
    UnknownProgram(String),
    #[error("programs '{0}' and '{1}' cannot be combined")]
    MutuallyExcluded(String, String),
    #[error("program '{program}' is not offered on tariff '{tariff}'")]
    NotAllowed { program: String, tariff: String },
    #[error("program '{program}' requires at least {minimum_kw} kW, meter peaks at {kw} kW")]
    BelowMinimum { program: String, minimum_kw: f64, kw: f64 },
}

/// Demand response programs a utility offers and how they combine with
/// tariffs and each other.
///
/// A program without an allow list is open to every tariff.
#[derive(Debug, Clone, Default)]
pub struct DemandResponse {
    utility: String,
    programs: BTreeSet<String>,
    exclusions: HashSet<(String, String)>,
    allowed: HashMap<String, HashSet<String>>,
    minimum_kw: HashMap<String, f64>,
}

impl DemandResponse {
    pub fn new<I, S>(utility: &str, programs: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            utility: utility.to_string(),
            programs: programs.into_iter().map(Into::into).collect(),
            ..Default::default()
        }
    }

    pub fn utility(&self) -> &str {
        &self.utility
    }

    pub fn programs(&self) -> impl Iterator<Item = &str> {
        self.programs.iter().map(String::as_str)
    }

    pub fn add_mutual_exclusion(&mut self, a: &str, b: &str) {
        self.exclusions.insert((a.to_string(), b.to_string()));
    }

    pub fn mutually_excluded(&self, a: &str, b: &str) -> bool {
        self.exclusions.contains(&(a.to_string(), b.to_string()))
            || self.exclusions.contains(&(b.to_string(), a.to_string()))
    }

    pub fn add_allowed(&mut self, program: &str, tariff: &str) {
        self.allowed
            .entry(program.to_string())
            .or_default()
            .insert(tariff.to_string());
    }

    pub fn is_allowed(&self, program: &str, tariff: &RateTariff) -> bool {
        self.allowed
            .get(program)
            .map_or(true, |tariffs| tariffs.contains(&tariff.name))
    }

    pub fn add_minimum(&mut self, program: &str, min_kw: f64) {
        self.minimum_kw.insert(program.to_string(), min_kw);
    }

    pub fn minimum_kw(&self, program: &str) -> Option<f64> {
        self.minimum_kw.get(program).copied()
    }

    /// Check that a meter on `tariff` peaking at `kw` may enrol in all of
    /// `programs` together.
    pub fn check_enrollment(
        &self,
        programs: &[String],
        tariff: &RateTariff,
        kw: f64,
    ) -> Result<(), EnrollmentError> {
        for (i, program) in programs.iter().enumerate() {
            if !self.programs.contains(program) {
                return Err(EnrollmentError::UnknownProgram(program.clone()));
            }
            if let Some(other) =
                programs[i + 1..].iter().find(|o| self.mutually_excluded(program, o))
            {
                return Err(EnrollmentError::MutuallyExcluded(program.clone(), other.clone()));
            }
            if !self.is_allowed(program, tariff) {
                return Err(EnrollmentError::NotAllowed {
                    program: program.clone(),
                    tariff: tariff.name.clone(),
                });
            }
            if let Some(minimum_kw) = self.minimum_kw(program).filter(|min| kw < *min) {
                return Err(EnrollmentError::BelowMinimum {
                    program: program.clone(),
                    minimum_kw,
                    kw,
                });
            }
        }
        Ok(())
    }
}
