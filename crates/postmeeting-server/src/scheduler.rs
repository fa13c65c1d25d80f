//! In-process periodic jobs.
//!
//! When `[scheduler] enabled = true` the server polls bots and joins
//! upcoming meetings itself instead of waiting for an external cron to hit
//! the cron routes. Each job loop sleeps for its interval plus jitter,
//! backs off exponentially while the job keeps failing, and listens for
//! [`SchedulerCommand`]s on an `mpsc` channel.

use std::future::Future;
use std::time::Duration;

use chrono::{DateTime, Utc};
use rand::Rng;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// Timing of one periodic job.
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    pub interval: Duration,
    /// Fraction of `interval` added or removed at random, 0.0 to 1.0.
    pub jitter_fraction: f64,
    /// Delay after the first failure; doubles per further failure.
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
    pub run_on_start: bool,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(300),
            jitter_fraction: 0.1,
            initial_backoff: Duration::from_secs(5),
            max_backoff: Duration::from_secs(300),
            run_on_start: true,
        }
    }
}

impl SchedulerConfig {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            ..Default::default()
        }
    }

    pub fn with_jitter(mut self, fraction: f64) -> Self {
        self.jitter_fraction = fraction.clamp(0.0, 1.0);
        self
    }

    pub fn with_backoff(mut self, initial: Duration, max: Duration) -> Self {
        self.initial_backoff = initial;
        self.max_backoff = max;
        self
    }

    /// Sleep before the next run, given how many runs failed in a row.
    pub fn delay_after(&self, consecutive_failures: u32) -> Duration {
        if consecutive_failures == 0 {
            return self.jittered_interval();
        }
        let factor = 2u32.saturating_pow(consecutive_failures - 1);
        self.initial_backoff
            .saturating_mul(factor)
            .min(self.max_backoff)
    }

    fn jittered_interval(&self) -> Duration {
        let spread = self.interval.mul_f64(self.jitter_fraction);
        if spread.is_zero() {
            return self.interval;
        }
        let offset = rand::rng().random_range(Duration::ZERO..=spread * 2);
        (self.interval + offset).saturating_sub(spread)
    }
}

/// Commands accepted by a running job loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerCommand {
    RunNow,
    Stop,
}

/// Run history of one job.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct JobStats {
    pub runs: u64,
    pub consecutive_failures: u32,
    pub last_success: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
}

impl JobStats {
    fn record(&mut self, result: &Result<(), String>) {
        self.runs += 1;
        match result {
            Ok(()) => {
                self.consecutive_failures = 0;
                self.last_success = Some(Utc::now());
                self.last_error = None;
            }
            Err(e) => {
                self.consecutive_failures += 1;
                self.last_error = Some(e.clone());
            }
        }
    }
}

/// Sends commands to a running job loop and reads its stats.
#[derive(Clone, Debug)]
pub struct SchedulerHandle {
    name: &'static str,
    commands: mpsc::Sender<SchedulerCommand>,
    stats: watch::Receiver<JobStats>,
}

impl SchedulerHandle {
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Returns false when the loop has already exited.
    pub async fn send(&self, command: SchedulerCommand) -> bool {
        self.commands.send(command).await.is_ok()
    }

    pub fn stats(&self) -> JobStats {
        self.stats.borrow().clone()
    }
}

async fn run_once<F, Fut>(name: &'static str, job: &F, stats: &watch::Sender<JobStats>)
where
    F: Fn() -> Fut,
    Fut: Future<Output = Result<(), String>>,
{
    let result = job().await;
    if let Err(e) = &result {
        let failures = stats.borrow().consecutive_failures + 1;
        if failures > 1 {
            error!(job = name, failures, error = %e, "run failed again");
        } else {
            warn!(job = name, error = %e, "run failed");
        }
    }
    stats.send_modify(|s| s.record(&result));
}

async fn run_loop<F, Fut>(
    name: &'static str,
    config: SchedulerConfig,
    job: F,
    mut commands: mpsc::Receiver<SchedulerCommand>,
    stats: watch::Sender<JobStats>,
) where
    F: Fn() -> Fut,
    Fut: Future<Output = Result<(), String>>,
{
    info!(job = name, interval_secs = config.interval.as_secs(), "scheduler started");
    if config.run_on_start {
        run_once(name, &job, &stats).await;
    }

    loop {
        let delay = config.delay_after(stats.borrow().consecutive_failures);
        debug!(job = name, delay_ms = delay.as_millis() as u64, "next run scheduled");

        tokio::select! {
            () = tokio::time::sleep(delay) => run_once(name, &job, &stats).await,
            command = commands.recv() => match command {
                Some(SchedulerCommand::RunNow) => run_once(name, &job, &stats).await,
                Some(SchedulerCommand::Stop) | None => break,
            },
        }
    }
    info!(job = name, "scheduler stopped");
}

/// Spawns `job` on its own loop. The job returns an error message on failure.
pub fn spawn_periodic<F, Fut>(
    name: &'static str,
    config: SchedulerConfig,
    job: F,
) -> (SchedulerHandle, JoinHandle<()>)
where
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<(), String>> + Send + 'static,
{
    let (command_tx, command_rx) = mpsc::channel(8);
    let (stats_tx, stats_rx) = watch::channel(JobStats::default());
    let task = tokio::spawn(run_loop(name, config, job, command_rx, stats_tx));
    let handle = SchedulerHandle {
        name,
        commands: command_tx,
        stats: stats_rx,
    };
    (handle, task)
}

#[derive(Default)]
pub struct BackgroundJobs {
    jobs: Vec<(SchedulerHandle, JoinHandle<()>)>,
}

impl BackgroundJobs {
    pub fn push(&mut self, job: (SchedulerHandle, JoinHandle<()>)) {
        self.jobs.push(job);
    }

    /// Stops every loop and waits for it to exit.
    pub async fn shutdown(self) {
        for (handle, task) in self.jobs {
            if !handle.send(SchedulerCommand::Stop).await {
                debug!(job = handle.name(), "scheduler already stopped");
            }
            if let Err(e) = task.await {
                warn!(job = handle.name(), error = %e, "scheduler task ended abnormally");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU32, Ordering};

    type JobFuture = std::pin::Pin<Box<dyn Future<Output = Result<(), String>> + Send>>;

    fn counting_job(
        counter: Arc<AtomicU32>,
        fail_first: u32,
    ) -> impl Fn() -> JobFuture + Send + Sync + 'static {
        move || {
            let counter = counter.clone();
            Box::pin(async move {
                let n = counter.fetch_add(1, Ordering::SeqCst);
                if n < fail_first {
                    Err(format!("failure {}", n))
                } else {
                    Ok(())
                }
            })
        }
    }

    #[test]
    fn jitter_stays_in_range() {
        let config = SchedulerConfig::new(Duration::from_secs(60)).with_jitter(0.1);
        for _ in 0..50 {
            let delay = config.delay_after(0).as_secs_f64();
            assert!((54.0..=66.0).contains(&delay), "delay {delay} out of range");
        }
        let exact = SchedulerConfig::new(Duration::from_secs(60)).with_jitter(0.0);
        assert_eq!(exact.delay_after(0), Duration::from_secs(60));
    }

    #[test]
    fn backoff_doubles_up_to_max() {
        let config = SchedulerConfig::default()
            .with_backoff(Duration::from_secs(5), Duration::from_secs(300));
        assert_eq!(config.delay_after(1), Duration::from_secs(5));
        assert_eq!(config.delay_after(2), Duration::from_secs(10));
        assert_eq!(config.delay_after(3), Duration::from_secs(20));
        assert_eq!(config.delay_after(10), Duration::from_secs(300));
        assert_eq!(config.delay_after(64), Duration::from_secs(300));
    }

    #[test]
    fn stats_reset_on_success() {
        let mut stats = JobStats::default();
        stats.record(&Err("boom".into()));
        stats.record(&Err("boom again".into()));
        assert_eq!(stats.consecutive_failures, 2);
        assert_eq!(stats.last_error.as_deref(), Some("boom again"));

        stats.record(&Ok(()));
        assert_eq!(stats.runs, 3);
        assert_eq!(stats.consecutive_failures, 0);
        assert!(stats.last_success.is_some());
        assert!(stats.last_error.is_none());
    }

    #[tokio::test]
    async fn run_now_and_stop() {
        let count = Arc::new(AtomicU32::new(0));
        let (handle, task) = spawn_periodic(
            "test",
            SchedulerConfig::new(Duration::from_secs(60)),
            counting_job(count.clone(), 0),
        );

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(count.load(Ordering::SeqCst), 1);

        assert!(handle.send(SchedulerCommand::RunNow).await);
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(count.load(Ordering::SeqCst), 2);
        assert_eq!(handle.stats().runs, 2);

        let mut jobs = BackgroundJobs::default();
        jobs.push((handle.clone(), task));
        jobs.shutdown().await;
        assert!(!handle.send(SchedulerCommand::RunNow).await);
    }

    #[tokio::test]
    async fn failures_back_off_then_recover() {
        let attempts = Arc::new(AtomicU32::new(0));
        let config = SchedulerConfig::new(Duration::from_secs(60))
            .with_backoff(Duration::from_millis(10), Duration::from_millis(40));
        let (handle, task) = spawn_periodic("flaky", config, counting_job(attempts.clone(), 3));

        tokio::time::sleep(Duration::from_millis(300)).await;
        assert_eq!(attempts.load(Ordering::SeqCst), 4);
        let stats = handle.stats();
        assert_eq!(stats.consecutive_failures, 0);
        assert!(stats.last_success.is_some());

        assert!(handle.send(SchedulerCommand::Stop).await);
        task.await.unwrap();
    }
}
