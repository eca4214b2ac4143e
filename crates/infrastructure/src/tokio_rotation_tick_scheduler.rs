//! Process-local tick queue backed by Tokio timers.

use std::time::Duration;

use async_trait::async_trait;
use qrotate_application::{RotationService, RotationTickJob, RotationTickScheduler, TickOutcome};
use qrotate_core::{AppError, AppResult};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// Creates a connected scheduler and runner pair.
#[must_use]
pub fn tokio_tick_channel() -> (TokioRotationTickScheduler, TokioRotationTickRunner) {
    let (sender, receiver) = mpsc::unbounded_channel();
    (
        TokioRotationTickScheduler { sender },
        TokioRotationTickRunner { receiver },
    )
}

/// Scheduler half: delays jobs with Tokio timers before queueing them.
#[derive(Clone)]
pub struct TokioRotationTickScheduler {
    sender: mpsc::UnboundedSender<RotationTickJob>,
}

#[async_trait]
impl RotationTickScheduler for TokioRotationTickScheduler {
    async fn schedule_tick(&self, job: RotationTickJob, delay: Duration) -> AppResult<()> {
        if self.sender.is_closed() {
            return Err(AppError::Internal(
                "rotation tick runner is not running".to_owned(),
            ));
        }

        if delay.is_zero() {
            return self.sender.send(job).map_err(|error| {
                AppError::Internal(format!("failed to enqueue rotation tick: {error}"))
            });
        }

        let sender = self.sender.clone();
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            if let Err(error) = sender.send(job) {
                warn!(
                    business_id = %error.0.key.business_id(),
                    company_id = %error.0.key.company_id(),
                    "dropped delayed rotation tick because the runner stopped"
                );
            }
        });

        Ok(())
    }
}

/// Runner half: executes queued ticks against a rotation service.
pub struct TokioRotationTickRunner {
    receiver: mpsc::UnboundedReceiver<RotationTickJob>,
}

impl TokioRotationTickRunner {
    /// Processes queued ticks until every scheduler handle is dropped.
    pub async fn run(mut self, service: RotationService) {
        info!("in-process rotation tick runner started");

        while let Some(job) = self.receiver.recv().await {
            let service = service.clone();
            tokio::spawn(async move {
                let business_id = job.key.business_id().to_owned();
                let company_id = job.key.company_id().to_owned();
                let sequence = job.sequence;
                let outcome = service.process_tick(job).await;
                log_outcome(&business_id, &company_id, sequence, &outcome);
            });
        }

        info!("in-process rotation tick runner stopped");
    }
}

fn log_outcome(business_id: &str, company_id: &str, sequence: u64, outcome: &TickOutcome) {
    match outcome {
        TickOutcome::Failed { error } => warn!(
            business_id = %business_id,
            company_id = %company_id,
            sequence,
            error = %error,
            "rotation tick failed"
        ),
        _ => debug!(
            business_id = %business_id,
            company_id = %company_id,
            sequence,
            outcome = %outcome.as_str(),
            "rotation tick processed"
        ),
    }
}
