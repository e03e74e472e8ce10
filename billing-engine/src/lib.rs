//! Time-of-use classification and charge resolution for utility billing.

pub mod bucket;
pub mod cache;
pub mod calendar;
pub mod classify;
pub mod config;
pub mod engine;
pub mod error;
pub mod observability;
pub mod pipeline;
pub mod programs;
pub mod rates;
pub mod resolve;
pub mod sinks;
pub mod sources;
pub mod tou;
pub mod transform;

pub use bucket::{BillingQuantities, BucketKey};
pub use config::EngineConfig;
pub use engine::{
    BillingEngine, ChargeBasis, ChargeRequest, MeterJob, MeterStatement, StatementLine,
};
pub use error::{BillingError, BillingResult};
pub use pipeline::{Envelope, Pipeline, PipelineError, RunSummary};
pub use resolve::{ChargeOutcome, ChargeQuery, ChargeResolver};
