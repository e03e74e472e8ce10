use tariff_model::{domain::Unit, ModelError};
use time::Date;

use crate::rates::Category;

/// Failures of a single classification, bucketing or resolution call.
#[derive(thiserror::Error, Debug)]
pub enum BillingError {
    #[error("no bucketing multiplier defined for unit {0}")]
    UnitMismatch(Unit),
    #[error("cannot infer sampling frequency for {0} data with fewer than two samples")]
    UnknownFrequency(Unit),
    #[error("tariff '{0}' is not in the tariff registry")]
    UnknownTariff(String),
    #[error("tariff '{tariff}' closed on {close} with no superseding tariff")]
    ClosedTariff { tariff: String, close: Date },
    #[error("peak demand {kw} kW is outside the range of tariff '{tariff}'")]
    DemandOutOfRange { tariff: String, kw: f64 },
    #[error("no {0} rate table loaded")]
    UnknownCategory(Category),
    #[error("no TOU rules for sub-tariff '{sub_tou}' schedule '{schedule}'")]
    UnknownTouTable { sub_tou: String, schedule: String },
    #[error("{count} placeholder charge(s) left unresolved")]
    UnresolvedPlaceholder { count: usize },
    #[error("invalid {table} table: {message}")]
    InvalidTable { table: &'static str, message: String },
    #[error(transparent)]
    Model(#[from] ModelError),
    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Enrollment(#[from] crate::programs::EnrollmentError),
}

pub type BillingResult<T> = Result<T, BillingError>;
