//! Recurring prediction and validation jobs.
//!
//! Both loops sleep until their next trigger, run the job through the shared
//! bounded backoff and go back to sleep. `stop()` flips a watch channel that
//! interrupts any sleep; a job already running finishes first.

use anyhow::Result;
use chrono::{DateTime, Duration as ChronoDuration, NaiveDate, NaiveTime, TimeZone, Utc};
use chrono_tz::Tz;
use std::future::Future;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::clock::league_today;
use crate::service::PredictionService;
use crate::validation::validate_pending;

#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    /// Delay before the second attempt; doubles after each failure
    pub base_delay: Duration,
}

#[derive(Debug, Clone)]
pub struct ScheduleConfig {
    pub league_tz: Tz,
    /// Local hour of the daily prediction run
    pub daily_run_hour: u32,
    pub validation_interval_hours: u32,
    pub validation_lookback_days: i64,
    pub retry: RetryPolicy,
}

#[derive(Debug, PartialEq, Eq)]
pub enum JobOutcome<T> {
    Completed(T),
    GaveUp { attempts: u32 },
    Stopped,
}

/// `base · 2^attempt`, attempt counted from zero.
pub fn backoff_delay(base: Duration, attempt: u32) -> Duration {
    base.saturating_mul(2u32.saturating_pow(attempt))
}

/// Run `job` until it succeeds, `max_attempts` is reached or shutdown is signalled.
pub async fn retry_with_backoff<T, F, Fut>(
    name: &str,
    policy: &RetryPolicy,
    shutdown: &mut watch::Receiver<bool>,
    mut job: F,
) -> JobOutcome<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let max_attempts = policy.max_attempts.max(1);

    for attempt in 0..max_attempts {
        match job().await {
            Ok(value) => {
                if attempt > 0 {
                    info!("{} succeeded on attempt {}", name, attempt + 1);
                }
                return JobOutcome::Completed(value);
            }
            Err(e) if attempt + 1 == max_attempts => {
                error!("{} failed after {} attempts, giving up: {:#}", name, max_attempts, e);
            }
            Err(e) => {
                let delay = backoff_delay(policy.base_delay, attempt);
                warn!(
                    "{} failed (attempt {}/{}): {:#}; retrying in {:?}",
                    name,
                    attempt + 1,
                    max_attempts,
                    e,
                    delay
                );
                if !wait_or_stop(delay, shutdown).await {
                    info!("{} retry cancelled by shutdown", name);
                    return JobOutcome::Stopped;
                }
            }
        }
    }

    JobOutcome::GaveUp {
        attempts: max_attempts,
    }
}

/// Sleep for `delay`. Returns false if shutdown was signalled first.
async fn wait_or_stop(delay: Duration, shutdown: &mut watch::Receiver<bool>) -> bool {
    if *shutdown.borrow() {
        return false;
    }
    tokio::select! {
        _ = tokio::time::sleep(delay) => true,
        _ = shutdown.changed() => false,
    }
}

/// Next `hour:00` in the league's local time strictly after `now`.
pub fn next_daily_run(now: DateTime<Utc>, tz: Tz, hour: u32) -> DateTime<Utc> {
    let at = NaiveTime::from_hms_opt(hour.min(23), 0, 0).unwrap_or(NaiveTime::MIN);
    let local_day = now.with_timezone(&tz).date_naive();

    (0..=2)
        .filter_map(|d| local_run(tz, local_day + ChronoDuration::days(d), at))
        .find(|run| *run > now)
        .unwrap_or(now + ChronoDuration::days(1))
}

/// `day at` in `tz`. A time skipped by a daylight-saving jump runs an hour later.
fn local_run(tz: Tz, day: NaiveDate, at: NaiveTime) -> Option<DateTime<Utc>> {
    let local = day.and_time(at);
    tz.from_local_datetime(&local)
        .earliest()
        .or_else(|| tz.from_local_datetime(&(local + ChronoDuration::hours(1))).earliest())
        .map(|t| t.with_timezone(&Utc))
}

/// Next multiple of `interval_hours` since UTC midnight, strictly after `now`.
pub fn next_interval_run(now: DateTime<Utc>, interval_hours: u32) -> DateTime<Utc> {
    let period = i64::from(interval_hours.clamp(1, 24)) * 3600;
    let midnight = now.date_naive().and_time(NaiveTime::MIN).and_utc();
    let elapsed = (now - midnight).num_seconds();
    midnight + ChronoDuration::seconds((elapsed / period + 1) * period)
}

fn until(at: DateTime<Utc>) -> Duration {
    (at - Utc::now()).to_std().unwrap_or(Duration::ZERO)
}

pub struct Scheduler {
    service: PredictionService,
    config: ScheduleConfig,
    shutdown: watch::Sender<bool>,
    tasks: Vec<JoinHandle<()>>,
}

impl Scheduler {
    pub fn new(service: PredictionService, config: ScheduleConfig) -> Self {
        let (shutdown, _) = watch::channel(false);
        Scheduler {
            service,
            config,
            shutdown,
            tasks: Vec::new(),
        }
    }

    /// Spawn the daily prediction loop and the validation loop.
    pub fn start(&mut self) {
        if !self.tasks.is_empty() {
            warn!("Scheduler already running");
            return;
        }
        info!(
            "Scheduler started: predictions daily at {:02}:00 ({}), validation every {}h",
            self.config.daily_run_hour, self.config.league_tz, self.config.validation_interval_hours
        );
        self.tasks.push(tokio::spawn(daily_loop(
            self.service.clone(),
            self.config.clone(),
            self.shutdown.subscribe(),
        )));
        self.tasks.push(tokio::spawn(validation_loop(
            self.service.clone(),
            self.config.clone(),
            self.shutdown.subscribe(),
        )));
    }

    /// Stop scheduling new runs and wait for both loops to exit.
    pub async fn stop(&mut self) {
        let _ = self.shutdown.send(true);
        for task in self.tasks.drain(..) {
            if let Err(e) = task.await {
                error!("Scheduler task ended abnormally: {}", e);
            }
        }
        info!("Scheduler stopped");
    }
}

async fn daily_loop(
    service: PredictionService,
    config: ScheduleConfig,
    mut shutdown: watch::Receiver<bool>,
) {
    loop {
        let next = next_daily_run(Utc::now(), config.league_tz, config.daily_run_hour);
        info!("Next prediction run at {}", next);
        if !wait_or_stop(until(next), &mut shutdown).await {
            break;
        }

        let today = league_today(Utc::now(), config.league_tz);
        let outcome = retry_with_backoff("Daily predictions", &config.retry, &mut shutdown, || {
            service.run_and_store_all_models(today)
        })
        .await;
        info!("Upstream requests so far: {}", service.source().request_count());

        match outcome {
            JobOutcome::Completed(summary) => info!(
                "Daily predictions for {}: {} games, {} predictions",
                today, summary.games, summary.predictions_stored
            ),
            JobOutcome::GaveUp { .. } => {}
            JobOutcome::Stopped => break,
        }
    }
}

async fn validation_loop(
    service: PredictionService,
    config: ScheduleConfig,
    mut shutdown: watch::Receiver<bool>,
) {
    loop {
        let next = next_interval_run(Utc::now(), config.validation_interval_hours);
        info!("Next validation run at {}", next);
        if !wait_or_stop(until(next), &mut shutdown).await {
            break;
        }

        let today = league_today(Utc::now(), config.league_tz);
        let outcome = retry_with_backoff("Prediction validation", &config.retry, &mut shutdown, || {
            validate_pending(
                service.source(),
                service.database(),
                today,
                config.validation_lookback_days,
            )
        })
        .await;
        info!("Upstream requests so far: {}", service.source().request_count());

        match outcome {
            JobOutcome::Completed(summary) => info!(
                "Validated {} predictions across {} final games",
                summary.validated, summary.games_final
            ),
            JobOutcome::GaveUp { .. } => {}
            JobOutcome::Stopped => break,
        }
    }
}
