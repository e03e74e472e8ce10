use std::{
    pin::Pin,
    sync::Arc,
    time::{Instant, SystemTime},
};

use futures::{Stream, StreamExt};
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;

use crate::engine::{BillingEngine, MeterJob, MeterStatement};

#[derive(Debug, Clone)]
pub struct Envelope<T> {
    pub payload: T,
    pub received_at: SystemTime,
}

impl<T> Envelope<T> {
    pub fn new(payload: T) -> Self {
        Self {
            payload,
            received_at: SystemTime::now(),
        }
    }
}

#[derive(thiserror::Error, Debug)]
pub enum PipelineError {
    #[error("source error: {0}")]
    Source(String),
    #[error("transform error: {0}")]
    Transform(String),
    #[error("sink error: {0}")]
    Sink(String),
    #[error("worker error: {0}")]
    Worker(String),
}

#[async_trait::async_trait]
pub trait Source<T>: Send + Sync {
    async fn stream(
        &self,
    ) -> Pin<Box<dyn Stream<Item = Result<Envelope<T>, PipelineError>> + Send>>;
}

#[async_trait::async_trait]
pub trait Transform<I, O>: Send + Sync {
    async fn apply(&self, input: Envelope<I>) -> Result<Envelope<O>, PipelineError>;
}

#[async_trait::async_trait]
pub trait Sink<T>: Send + Sync {
    async fn run<S>(&self, input: S) -> Result<(), PipelineError>
    where
        S: Stream<Item = Result<Envelope<T>, PipelineError>> + Send + Unpin + 'static;
}

/// Job counts of one pipeline run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub received: usize,
    /// Dropped by the source or a transform before billing.
    pub rejected: usize,
    pub billed: usize,
    pub failed: usize,
}

fn shard_index(key: &str, workers: usize) -> usize {
    use std::hash::{Hash, Hasher};

    let mut h = std::collections::hash_map::DefaultHasher::new();
    key.hash(&mut h);
    (h.finish() as usize) % workers.max(1)
}

/// Bills a stream of meter jobs on `run.workers` shards.
///
/// Jobs of one meter always land on the same worker, so a meter's statements
/// reach the sink in source order. A job that fails to bill is logged and
/// counted; it never stops the run.
pub struct Pipeline<S, K> {
    pub source: S,
    pub transforms: Vec<Arc<dyn Transform<MeterJob, MeterJob>>>,
    pub engine: Arc<BillingEngine>,
    pub sink: K,
}

impl<S, K> Pipeline<S, K>
where
    S: Source<MeterJob> + 'static,
    K: Sink<MeterStatement> + 'static,
{
    pub fn new(source: S, engine: Arc<BillingEngine>, sink: K) -> Self {
        Self {
            source,
            transforms: Vec::new(),
            engine,
            sink,
        }
    }

    pub fn with_transform(mut self, t: Arc<dyn Transform<MeterJob, MeterJob>>) -> Self {
        self.transforms.push(t);
        self
    }

    pub async fn run(self) -> Result<RunSummary, PipelineError> {
        let run = self.engine.config().run.clone();
        let workers = run.workers.max(1);
        let capacity = run.channel_capacity.max(1);

        let (out_tx, out_rx) = mpsc::channel::<Envelope<MeterStatement>>(capacity);
        let sink = self.sink;
        let sink_task =
            tokio::spawn(async move { sink.run(ReceiverStream::new(out_rx).map(Ok)).await });

        let mut txs = Vec::with_capacity(workers);
        let mut joins = Vec::with_capacity(workers);
        for worker in 0..workers {
            let (tx, rx) = mpsc::channel::<Envelope<MeterJob>>(capacity);
            txs.push(tx);
            joins.push(tokio::spawn(bill_shard(
                worker,
                ReceiverStream::new(rx),
                self.engine.clone(),
                out_tx.clone(),
            )));
        }
        drop(out_tx);

        let mut stream = self.source.stream().await;
        for t in self.transforms {
            stream = Box::pin(stream.then(move |item| {
                let t = t.clone();
                async move {
                    match item {
                        Ok(env) => t.apply(env).await,
                        Err(e) => Err(e),
                    }
                }
            }));
        }

        let mut summary = RunSummary::default();
        while let Some(item) = stream.next().await {
            summary.received += 1;
            let env = match item {
                Ok(env) => env,
                Err(e) => {
                    summary.rejected += 1;
                    tracing::warn!(error = %e, "meter job rejected before billing");
                    continue;
                }
            };

            let idx = shard_index(&env.payload.meter_id, workers);
            if txs[idx].send(env).await.is_err() {
                return Err(PipelineError::Worker(format!("billing worker {idx} stopped")));
            }
        }
        drop(txs);

        for j in joins {
            match j.await {
                Ok(Ok((billed, failed))) => {
                    summary.billed += billed;
                    summary.failed += failed;
                }
                Ok(Err(e)) => return Err(e),
                Err(e) => {
                    return Err(PipelineError::Worker(format!("billing worker join error: {e}")))
                }
            }
        }

        match sink_task.await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => return Err(e),
            Err(e) => return Err(PipelineError::Sink(format!("sink task join error: {e}"))),
        }

        tracing::info!(
            received = summary.received,
            rejected = summary.rejected,
            billed = summary.billed,
            failed = summary.failed,
            "billing run finished"
        );
        Ok(summary)
    }
}

async fn bill_shard(
    worker: usize,
    mut jobs: ReceiverStream<Envelope<MeterJob>>,
    engine: Arc<BillingEngine>,
    out: mpsc::Sender<Envelope<MeterStatement>>,
) -> Result<(usize, usize), PipelineError> {
    let (mut billed, mut failed) = (0, 0);

    while let Some(env) = jobs.next().await {
        let job = env.payload;
        let meter_id = job.meter_id.clone();
        let engine = engine.clone();
        let started = Instant::now();

        let result = tokio::task::spawn_blocking(move || engine.bill(&job)).await;
        metrics::histogram!("billing_job_duration_seconds").record(started.elapsed().as_secs_f64());

        match result {
            Ok(Ok(statement)) => {
                billed += 1;
                metrics::counter!("billing_jobs_completed_total").increment(1);
                if out.send(Envelope::new(statement)).await.is_err() {
                    return Err(PipelineError::Sink("statement channel closed".to_string()));
                }
            }
            Ok(Err(e)) => {
                failed += 1;
                metrics::counter!("billing_jobs_failed_total").increment(1);
                tracing::error!(worker, meter_id = %meter_id, error = %e, "meter job failed");
            }
            Err(e) => {
                failed += 1;
                metrics::counter!("billing_jobs_failed_total").increment(1);
                tracing::error!(worker, meter_id = %meter_id, error = %e, "billing task panicked");
            }
        }
    }

    Ok((billed, failed))
}
