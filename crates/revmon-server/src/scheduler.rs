use revmon_alert::{AlertRunner, RunReport, RunRequest};
use std::time::Duration;
use tokio::time::{self, MissedTickBehavior};

/// Periodically evaluates every enabled rule.
///
/// Runs never overlap within one process: a slow run delays the next tick
/// instead of stacking. Concurrent runs from other triggers are harmless
/// because instances are deduplicated by fingerprint.
pub struct AlertRunScheduler {
    runner: AlertRunner,
    tick_interval: Duration,
}

impl AlertRunScheduler {
    pub fn new(runner: AlertRunner, tick_interval: Duration) -> Self {
        Self {
            runner,
            tick_interval: tick_interval.max(Duration::from_secs(1)),
        }
    }

    pub async fn run(self) {
        let mut ticker = time::interval(self.tick_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        tracing::info!(
            interval_secs = self.tick_interval.as_secs(),
            "Alert run scheduler started"
        );

        loop {
            ticker.tick().await;
            let _ = self.tick().await;
        }
    }

    /// One scheduled run. Errors are logged, never propagated.
    pub async fn tick(&self) -> Option<RunReport> {
        match self.runner.run(&RunRequest::default()).await {
            Ok(report) => {
                tracing::info!(
                    evaluated = report.evaluated,
                    triggered = report.triggered,
                    inserted = report.inserted,
                    failed = report.failed,
                    "Scheduled alert run finished"
                );
                Some(report)
            }
            Err(e) => {
                tracing::error!(error = %e, "Scheduled alert run failed");
                None
            }
        }
    }
}
