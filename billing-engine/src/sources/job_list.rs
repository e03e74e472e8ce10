use std::pin::Pin;

use futures::{stream, Stream};
use tokio::sync::Mutex;

use crate::{
    engine::MeterJob,
    pipeline::{Envelope, PipelineError, Source},
};

/// In-memory batch of meter jobs, handed out once.
pub struct JobListSource {
    jobs: Mutex<Option<Vec<MeterJob>>>,
}

impl JobListSource {
    pub fn new(jobs: Vec<MeterJob>) -> Self {
        Self {
            jobs: Mutex::new(Some(jobs)),
        }
    }
}

#[async_trait::async_trait]
impl Source<MeterJob> for JobListSource {
    async fn stream(
        &self,
    ) -> Pin<Box<dyn Stream<Item = Result<Envelope<MeterJob>, PipelineError>> + Send>> {
        match self.jobs.lock().await.take() {
            Some(jobs) => {
                tracing::info!(jobs = jobs.len(), "streaming meter jobs");
                Box::pin(stream::iter(jobs.into_iter().map(|job| Ok(Envelope::new(job)))))
            }
            None => Box::pin(stream::once(async {
                Err(PipelineError::Source("job list already consumed".to_string()))
            })),
        }
    }
}
