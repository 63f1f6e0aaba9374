use anyhow::anyhow;
use chrono::{DateTime, NaiveDate, Utc};
use chrono_tz::Tz;

/// The league schedules and reports games in US Eastern time.
pub const DEFAULT_LEAGUE_TIMEZONE: &str = "America/New_York";

/// Parse an IANA zone name such as "America/New_York".
pub fn league_timezone(name: &str) -> anyhow::Result<Tz> {
    name.parse::<Tz>()
        .map_err(|e| anyhow!("unknown time zone {:?}: {}", name, e))
}

/// Calendar date in the league's time zone, daylight saving included.
pub fn league_today(now: DateTime<Utc>, tz: Tz) -> NaiveDate {
    now.with_timezone(&tz).date_naive()
}
