use chrono::NaiveDate;
use clap::Parser;
use std::time::Duration;

use crate::nhl::{FetchOptions, FetchPolicy};
use crate::scheduler::{RetryPolicy, ScheduleConfig};

/// NHL shots-on-goal prediction service
#[derive(Parser, Debug, Clone)]
#[command(name = "shot-forecaster", version, about)]
pub struct Config {
    /// SQLite database path
    #[arg(long, env = "DATABASE_PATH", default_value = "shot_predictions.db")]
    pub database_path: String,

    /// NHL web API base URL
    #[arg(long, env = "NHL_API_URL", default_value = "https://api-web.nhle.com/v1")]
    pub nhl_api_url: String,

    /// NHL stats API base URL (team summaries)
    #[arg(
        long,
        env = "NHL_STATS_URL",
        default_value = "https://api.nhle.com/stats/rest/en"
    )]
    pub nhl_stats_url: String,

    /// Per-request timeout for upstream calls, in seconds
    #[arg(long, env = "HTTP_TIMEOUT_SECS", default_value = "10")]
    pub http_timeout_secs: u64,

    /// Upper bound on concurrent upstream requests
    #[arg(long, env = "MAX_CONCURRENT_FETCHES", default_value = "16")]
    pub max_concurrent_fetches: usize,

    /// Per-game result channel capacity for the roster fan-out
    #[arg(long, env = "FETCH_CHANNEL_CAPACITY", default_value = "50")]
    pub fetch_channel_capacity: usize,

    /// What to do when some roster or player lookups for a game fail
    #[arg(long, env = "FETCH_POLICY", value_enum, default_value = "best-effort")]
    pub fetch_policy: FetchPolicy,

    /// Model version used for single-model predictions
    #[arg(long, env = "ACTIVE_MODEL_VERSION", default_value = "1")]
    pub active_model_version: i64,

    /// League time zone (IANA name); daily runs and "today" follow its daylight saving
    #[arg(
        long,
        env = "LEAGUE_TIMEZONE",
        default_value = crate::clock::DEFAULT_LEAGUE_TIMEZONE
    )]
    pub league_timezone: String,

    /// Local hour of the daily prediction run
    #[arg(long, env = "DAILY_RUN_HOUR", default_value = "5")]
    pub daily_run_hour: u32,

    /// Hours between validation runs
    #[arg(long, env = "VALIDATION_INTERVAL_HOURS", default_value = "6")]
    pub validation_interval_hours: u32,

    /// How many days back validation looks for pending predictions
    #[arg(long, env = "VALIDATION_LOOKBACK_DAYS", default_value = "7")]
    pub validation_lookback_days: i64,

    /// Attempts per scheduled job before giving up until the next trigger
    #[arg(long, env = "RETRY_MAX_ATTEMPTS", default_value = "5")]
    pub retry_max_attempts: u32,

    /// First retry delay in seconds; doubles on each further failure
    #[arg(long, env = "RETRY_BASE_DELAY_SECS", default_value = "60")]
    pub retry_base_delay_secs: u64,

    /// API listen address
    #[arg(long, env = "API_ADDR", default_value = "0.0.0.0:8080")]
    pub api_addr: String,

    /// Serve the API without running scheduled jobs
    #[arg(long, env = "DISABLE_SCHEDULER", default_value = "false")]
    pub disable_scheduler: bool,

    /// Run and store every model for this date (YYYY-MM-DD), then exit
    #[arg(long, env = "PREDICT_DATE")]
    pub predict_date: Option<NaiveDate>,
}

impl Config {
    pub fn validate(&self) -> anyhow::Result<()> {
        for (name, value) in [
            ("nhl_api_url", &self.nhl_api_url),
            ("nhl_stats_url", &self.nhl_stats_url),
        ] {
            let parsed = url::Url::parse(value)
                .map_err(|e| anyhow::anyhow!("{} is not a valid URL ({}): {}", name, value, e))?;
            if !matches!(parsed.scheme(), "http" | "https") {
                anyhow::bail!("{} must be an http(s) URL, got {}", name, value);
            }
        }
        if self.http_timeout_secs == 0 {
            anyhow::bail!("http_timeout_secs must be positive");
        }
        if self.max_concurrent_fetches == 0 {
            anyhow::bail!("max_concurrent_fetches must be at least 1");
        }
        if self.fetch_channel_capacity == 0 {
            anyhow::bail!("fetch_channel_capacity must be at least 1");
        }
        crate::clock::league_timezone(&self.league_timezone)?;
        if self.daily_run_hour > 23 {
            anyhow::bail!("daily_run_hour must be between 0 and 23");
        }
        if !(1..=24).contains(&self.validation_interval_hours) {
            anyhow::bail!("validation_interval_hours must be between 1 and 24");
        }
        if self.validation_lookback_days < 1 {
            anyhow::bail!("validation_lookback_days must be at least 1");
        }
        if self.retry_max_attempts == 0 {
            anyhow::bail!("retry_max_attempts must be at least 1");
        }
        Ok(())
    }

    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.http_timeout_secs)
    }

    pub fn fetch_options(&self) -> FetchOptions {
        FetchOptions {
            policy: self.fetch_policy,
            max_concurrent: self.max_concurrent_fetches,
            channel_capacity: self.fetch_channel_capacity,
        }
    }

    pub fn schedule(&self) -> anyhow::Result<ScheduleConfig> {
        Ok(ScheduleConfig {
            league_tz: crate::clock::league_timezone(&self.league_timezone)?,
            daily_run_hour: self.daily_run_hour,
            validation_interval_hours: self.validation_interval_hours,
            validation_lookback_days: self.validation_lookback_days,
            retry: RetryPolicy {
                max_attempts: self.retry_max_attempts,
                base_delay: Duration::from_secs(self.retry_base_delay_secs),
            },
        })
    }
}
