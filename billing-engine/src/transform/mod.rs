use crate::{
    engine::MeterJob,
    pipeline::{Envelope, PipelineError, Transform},
};
use time::{macros::datetime, OffsetDateTime};

const MIN_TS: OffsetDateTime = datetime!(2000-01-01 00:00:00 UTC);
const MAX_TS: OffsetDateTime = datetime!(2100-01-01 00:00:00 UTC);

/// Pure validation of a `MeterJob` before it is handed to a billing worker.
///
/// Rules:
/// - meter id must be non-empty.
/// - interval must carry at least one sample, all within [2000-01-01, 2100-01-01].
/// - window start must not be after window end.
/// - agreement must have started on or before the rating date.
pub fn validate_job(env: Envelope<MeterJob>) -> Result<Envelope<MeterJob>, PipelineError> {
    let job = &env.payload;

    if job.meter_id.trim().is_empty() {
        return Err(PipelineError::Transform("meter id must be non-empty".to_string()));
    }

    let samples = job.interval.samples();
    let (Some(first), Some(last)) = (samples.first(), samples.last()) else {
        return Err(PipelineError::Transform(format!("meter {}: interval is empty", job.meter_id)));
    };
    if first.ts < MIN_TS || last.ts > MAX_TS {
        return Err(PipelineError::Transform(format!(
            "meter {}: timestamp out of allowed range",
            job.meter_id
        )));
    }

    if let Some(w) = &job.window {
        if w.start > w.end {
            return Err(PipelineError::Transform(format!(
                "meter {}: window starts after it ends",
                job.meter_id
            )));
        }
    }

    if job.agreement.start > job.date {
        return Err(PipelineError::Transform(format!(
            "meter {}: agreement starts {} after rating date {}",
            job.meter_id, job.agreement.start, job.date
        )));
    }

    Ok(env)
}

#[derive(Clone, Default)]
pub struct JobValidation;

#[async_trait::async_trait]
impl Transform<MeterJob, MeterJob> for JobValidation {
    async fn apply(&self, input: Envelope<MeterJob>) -> Result<Envelope<MeterJob>, PipelineError> {
        match validate_job(input) {
            Ok(env) => Ok(env),
            Err(e) => {
                metrics::counter!("validation_meter_job_rejected_total").increment(1);
                Err(e)
            }
        }
    }
}
