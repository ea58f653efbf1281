use std::{future::Future, time::Duration};

use tokio::{sync::watch, time::MissedTickBehavior};
use tracing::{error, info, warn};

use crate::{Config, error::RunError, model::RunResult, pipeline};

/// How often a failed run is re-executed before giving up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub retries: u32,
    pub delay: Duration,
}

impl RetryPolicy {
    pub const NONE: RetryPolicy = RetryPolicy {
        retries: 0,
        delay: Duration::ZERO,
    };

    pub fn from_config(config: &Config) -> Self {
        Self {
            retries: config.schedule.retries,
            delay: Duration::from_secs(config.schedule.retry_delay_secs),
        }
    }

    /// Call `attempt` until it succeeds or `retries` extra attempts have failed.
    pub async fn run<F, Fut>(&self, mut attempt: F) -> Result<RunResult, RunError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<RunResult, RunError>>,
    {
        let mut tries = 0;
        loop {
            match attempt().await {
                Ok(result) => return Ok(result),
                Err(e) if tries < self.retries => {
                    tries += 1;
                    warn!(error = %e, attempt = tries, of = self.retries, "run failed, retrying");
                    tokio::time::sleep(self.delay).await;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

/// Run immediately, then once per `schedule.interval_secs`, until `shutdown` flips to true.
///
/// Ticks missed while a run is in progress are skipped rather than replayed.
/// Shutdown also interrupts a run in progress, including a retry delay; an
/// append that has not committed yet is rolled back.
pub async fn run_every(config: &Config, shutdown: watch::Receiver<bool>) {
    let policy = RetryPolicy::from_config(config);
    let period = Duration::from_secs(config.schedule.interval_secs.max(1));

    run_every_with(period, policy, shutdown, || pipeline::run(config)).await;
}

async fn run_every_with<F, Fut>(
    period: Duration,
    policy: RetryPolicy,
    mut shutdown: watch::Receiver<bool>,
    mut attempt: F,
) where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<RunResult, RunError>>,
{
    let mut interval = tokio::time::interval(period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

    info!(every_secs = period.as_secs(), retries = policy.retries, "scheduler started");
    loop {
        tokio::select! {
            _ = interval.tick() => {}
            _ = shutdown_requested(&mut shutdown) => break,
        }

        tokio::select! {
            outcome = policy.run(&mut attempt) => match outcome {
                Ok(result) => info!(%result, "scheduled run finished"),
                Err(e) => error!(error = %e, "scheduled run failed after retries"),
            },
            _ = shutdown_requested(&mut shutdown) => {
                warn!("run interrupted by shutdown");
                break;
            }
        }
    }
    info!("scheduler shutting down");
}

/// Resolves once `shutdown` holds `true`; never resolves if the sender is gone first.
async fn shutdown_requested(shutdown: &mut watch::Receiver<bool>) {
    while !*shutdown.borrow_and_update() {
        if shutdown.changed().await.is_err() {
            std::future::pending::<()>().await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SinkError;
    use std::cell::Cell;

    fn sink_failure() -> RunError {
        RunError::Sink(SinkError::Database(rusqlite::Error::InvalidQuery))
    }

    fn policy(retries: u32) -> RetryPolicy {
        RetryPolicy {
            retries,
            delay: Duration::ZERO,
        }
    }

    #[tokio::test]
    async fn success_on_first_attempt_does_not_retry() {
        let calls = &Cell::new(0);
        let result = policy(3)
            .run(|| async move {
                calls.set(calls.get() + 1);
                Ok(RunResult {
                    succeeded: 3,
                    failed: 0,
                })
            })
            .await
            .unwrap();

        assert_eq!(result.succeeded, 3);
        assert_eq!(calls.get(), 1);
    }

    #[tokio::test]
    async fn retries_until_success() {
        let calls = &Cell::new(0);
        let result = policy(1)
            .run(|| async move {
                calls.set(calls.get() + 1);
                if calls.get() == 1 {
                    Err(sink_failure())
                } else {
                    Ok(RunResult::default())
                }
            })
            .await;

        assert!(result.is_ok());
        assert_eq!(calls.get(), 2);
    }

    #[tokio::test]
    async fn gives_up_after_retries_exhausted() {
        let calls = &Cell::new(0);
        let err = policy(2)
            .run(|| async move {
                calls.set(calls.get() + 1);
                Err(sink_failure())
            })
            .await
            .unwrap_err();

        assert!(matches!(err, RunError::Sink(_)));
        assert_eq!(calls.get(), 3);
    }

    #[tokio::test]
    async fn no_retry_policy_tries_once() {
        let calls = &Cell::new(0);
        let _ = RetryPolicy::NONE
            .run(|| async move {
                calls.set(calls.get() + 1);
                Err(sink_failure())
            })
            .await;

        assert_eq!(calls.get(), 1);
    }

    #[test]
    fn policy_follows_config() {
        let policy = RetryPolicy::from_config(&Config::default());
        assert_eq!(
            policy,
            RetryPolicy {
                retries: 1,
                delay: Duration::from_secs(300),
            }
        );
    }

    #[tokio::test]
    async fn shutdown_interrupts_a_run_in_progress() {
        let started = &Cell::new(false);
        let (tx, rx) = watch::channel(false);

        let scheduler = run_every_with(Duration::from_secs(3600), policy(0), rx, || async move {
            started.set(true);
            tokio::time::sleep(Duration::from_secs(3600)).await;
            Ok(RunResult::default())
        });
        let signal = async {
            tokio::time::sleep(Duration::from_millis(50)).await;
            tx.send(true).unwrap();
        };

        tokio::time::timeout(Duration::from_secs(5), async { tokio::join!(scheduler, signal) })
            .await
            .expect("scheduler should stop while the run is still going");
        assert!(started.get());
    }

    #[tokio::test]
    async fn shutdown_interrupts_a_retry_delay() {
        let calls = &Cell::new(0);
        let (tx, rx) = watch::channel(false);
        let slow_retry = RetryPolicy {
            retries: 3,
            delay: Duration::from_secs(300),
        };

        let scheduler = run_every_with(Duration::from_secs(3600), slow_retry, rx, || async move {
            calls.set(calls.get() + 1);
            Err(sink_failure())
        });
        let signal = async {
            tokio::time::sleep(Duration::from_millis(50)).await;
            tx.send(true).unwrap();
        };

        tokio::time::timeout(Duration::from_secs(5), async { tokio::join!(scheduler, signal) })
            .await
            .expect("scheduler should not wait out the retry delay");
        assert_eq!(calls.get(), 1);
    }

    #[tokio::test]
    async fn dropped_sender_without_shutdown_keeps_running() {
        let calls = &Cell::new(0);
        let (tx, rx) = watch::channel(false);
        drop(tx);

        let scheduler = run_every_with(Duration::from_millis(10), policy(0), rx, || async move {
            calls.set(calls.get() + 1);
            Ok(RunResult::default())
        });

        assert!(tokio::time::timeout(Duration::from_millis(100), scheduler).await.is_err());
        assert!(calls.get() >= 2);
    }

    #[tokio::test]
    async fn run_every_stops_on_shutdown() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = Config {
            database_path: Some(dir.path().join("weather.db")),
            ..Config::default()
        };
        // No provider configured: each run fails fast without touching the network.
        config.schedule.retries = 0;

        let (tx, rx) = watch::channel(false);
        tx.send(true).unwrap();

        tokio::time::timeout(Duration::from_secs(5), run_every(&config, rx))
            .await
            .expect("scheduler should stop once shutdown is signalled");
    }
}
