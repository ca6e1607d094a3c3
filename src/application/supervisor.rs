//! TaskSupervisor - keeps process-wide loops alive.
//!
//! Each supervised task is described by a factory that produces one *run*
//! of the task. The supervisor spawns every run on its own tokio task, so a
//! panic inside a run surfaces as a `JoinError` instead of unwinding through
//! the supervisor, and starts a fresh run after a backoff.
//!
//! ## Restart Policy
//!
//! | Setting | Default | Description |
//! |---------|---------|-------------|
//! | `initial_backoff` | 100ms | Delay before the first restart |
//! | `max_backoff` | 5s | Upper bound of the doubling delay |
//!
//! A run that stayed up for at least `max_backoff` resets the delay back to
//! `initial_backoff`.
//!
//! ## Graceful Shutdown
//!
//! Runs receive a clone of the shared `CancellationToken` and are expected
//! to return once it fires. The supervisor never restarts a run that ended
//! after cancellation.

use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// Backoff between consecutive restarts of one task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RestartPolicy {
    /// Delay before the first restart.
    pub initial_backoff: Duration,

    /// Upper bound of the delay.
    pub max_backoff: Duration,
}

impl Default for RestartPolicy {
    fn default() -> Self {
        Self {
            initial_backoff: Duration::from_millis(100),
            max_backoff: Duration::from_secs(5),
        }
    }
}

impl RestartPolicy {
    pub fn with_initial_backoff(mut self, backoff: Duration) -> Self {
        self.initial_backoff = backoff;
        self
    }

    pub fn with_max_backoff(mut self, backoff: Duration) -> Self {
        self.max_backoff = backoff;
        self
    }

    /// Delay before restart number `attempt` (zero based).
    pub fn backoff_for(&self, attempt: u32) -> Duration {
        let factor = 2u32.checked_pow(attempt).unwrap_or(u32::MAX);
        self.initial_backoff
            .saturating_mul(factor)
            .min(self.max_backoff)
    }
}

/// Owns the long-running tasks of the process.
pub struct TaskSupervisor {
    policy: RestartPolicy,
    shutdown: CancellationToken,
    tasks: Vec<(&'static str, JoinHandle<()>)>,
}

impl TaskSupervisor {
    pub fn new(policy: RestartPolicy, shutdown: CancellationToken) -> Self {
        Self {
            policy,
            shutdown,
            tasks: Vec::new(),
        }
    }

    /// Token handed to every run; cancelling it stops supervision.
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// Number of supervised tasks.
    pub fn task_count(&self) -> usize {
        self.tasks.len()
    }

    /// Start supervising the task produced by `factory`.
    ///
    /// A run that returns an error, panics, or returns `Ok(())` before
    /// shutdown is restarted.
    pub fn supervise<F, Fut, E>(&mut self, name: &'static str, factory: F)
    where
        F: FnMut(CancellationToken) -> Fut + Send + 'static,
        Fut: Future<Output = Result<(), E>> + Send + 'static,
        E: Display + Send + 'static,
    {
        let handle = tokio::spawn(supervise_loop(
            name,
            self.policy,
            self.shutdown.clone(),
            factory,
        ));
        self.tasks.push((name, handle));
    }

    /// Cancel all tasks and wait up to `timeout` for them to finish.
    ///
    /// Returns `false` when some task was still running at the deadline.
    pub async fn graceful_shutdown(self, timeout: Duration) -> bool {
        self.shutdown.cancel();
        tracing::info!(
            task_count = self.tasks.len(),
            timeout_secs = timeout.as_secs(),
            "Waiting for supervised tasks to stop"
        );

        let names: Vec<&'static str> = self.tasks.iter().map(|(name, _)| *name).collect();
        let drain = futures::future::join_all(self.tasks.into_iter().map(|(_, handle)| handle));

        match tokio::time::timeout(timeout, drain).await {
            Ok(_) => {
                tracing::info!("All supervised tasks stopped");
                true
            }
            Err(_) => {
                tracing::warn!(
                    tasks = ?names,
                    "Shutdown timed out after {timeout:?}, some tasks may still be running"
                );
                false
            }
        }
    }
}

async fn supervise_loop<F, Fut, E>(
    name: &'static str,
    policy: RestartPolicy,
    shutdown: CancellationToken,
    mut factory: F,
) where
    F: FnMut(CancellationToken) -> Fut + Send + 'static,
    Fut: Future<Output = Result<(), E>> + Send + 'static,
    E: Display + Send + 'static,
{
    let mut attempt: u32 = 0;

    while !shutdown.is_cancelled() {
        let started = Instant::now();
        let outcome = tokio::spawn(factory(shutdown.clone())).await;

        if shutdown.is_cancelled() {
            if let Ok(Err(e)) = &outcome {
                tracing::warn!(task = name, error = %e, "Task failed during shutdown");
            }
            break;
        }

        match outcome {
            Ok(Ok(())) => tracing::warn!(task = name, "Task exited before shutdown"),
            Ok(Err(e)) => tracing::error!(task = name, error = %e, "Task failed"),
            Err(e) => tracing::error!(task = name, error = %e, "Task panicked"),
        }

        if started.elapsed() >= policy.max_backoff {
            attempt = 0;
        }
        let delay = policy.backoff_for(attempt);
        attempt = attempt.saturating_add(1);

        tracing::error!(
            task = name,
            attempt,
            delay_ms = delay.as_millis() as u64,
            "Restarting task"
        );

        tokio::select! {
            _ = shutdown.cancelled() => break,
            _ = tokio::time::sleep(delay) => {}
        }
    }

    tracing::info!(task = name, "Task stopped");
}
