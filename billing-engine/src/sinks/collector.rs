use std::sync::Arc;

use futures::StreamExt;
use tokio::sync::Mutex;

use crate::{
    engine::MeterStatement,
    pipeline::{Envelope, PipelineError, Sink},
};

/// Gathers statements in memory. Clones share the same buffer, so a clone
/// kept by the caller can read what the pipeline's copy collected.
#[derive(Clone, Default)]
pub struct StatementCollector {
    statements: Arc<Mutex<Vec<Envelope<MeterStatement>>>>,
}

impl StatementCollector {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.statements.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.statements.lock().await.is_empty()
    }

    /// Drain everything collected so far.
    pub async fn take(&self) -> Vec<Envelope<MeterStatement>> {
        std::mem::take(&mut *self.statements.lock().await)
    }
}

#[async_trait::async_trait]
impl Sink<MeterStatement> for StatementCollector {
    async fn run<S>(&self, mut input: S) -> Result<(), PipelineError>
    where
        S: futures::Stream<Item = Result<Envelope<MeterStatement>, PipelineError>>
            + Send
            + Unpin
            + 'static,
    {
        while let Some(item) = input.next().await {
            let env = match item {
                Ok(env) => env,
                Err(e) => {
                    tracing::error!(error = %e, "upstream error before statement sink");
                    continue;
                }
            };

            if env.payload.is_partial() {
                metrics::counter!("billing_statements_partial_total").increment(1);
            }
            if let Ok(dur) = std::time::SystemTime::now().duration_since(env.received_at) {
                metrics::histogram!("statement_sink_latency_seconds").record(dur.as_secs_f64());
            }
            self.statements.lock().await.push(env);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::tests::{engine, job};

    #[tokio::test]
    async fn clones_share_collected_statements() {
        let collector = StatementCollector::new();
        let handle = collector.clone();

        let engine = engine();
        let items: Vec<Result<Envelope<MeterStatement>, PipelineError>> = vec![
            Ok(Envelope::new(engine.bill(&job("m-1")).unwrap())),
            Err(PipelineError::Worker("lost".to_string())),
            Ok(Envelope::new(engine.bill(&job("m-2")).unwrap())),
        ];
        collector.run(futures::stream::iter(items)).await.unwrap();

        assert_eq!(handle.len().await, 2);
        let taken = handle.take().await;
        assert_eq!(taken[0].payload.meter_id, "m-1");
        assert_eq!(taken[1].payload.meter_id, "m-2");
        assert!(collector.is_empty().await);
    }
}
