use chrono::{Duration, NaiveDate};
use std::collections::HashMap;
use tracing::debug;

use super::source::StatsSource;
use super::types::Game;
use crate::error::FetchError;

/// Rest assumed for a team with no game in the trailing window.
pub const DEFAULT_REST_DAYS: i32 = 7;

/// Days of trailing schedule scanned before the target date.
const WINDOW_DAYS: i64 = 6;

/// Rest days before `date` for every team playing in `games`.
pub async fn teams_rest(
    source: &dyn StatsSource,
    date: NaiveDate,
    games: &[Game],
) -> Result<HashMap<i64, i32>, FetchError> {
    let window = source
        .fetch_schedule_week(date - Duration::days(WINDOW_DAYS))
        .await?;
    debug!("Rest window from {}: {} games", date - Duration::days(WINDOW_DAYS), window.len());
    Ok(compute_rest_days(games, &window))
}

/// For each team in `targets`, find its latest window game that started strictly
/// before the target game and count the full calendar days in between.
pub fn compute_rest_days(targets: &[Game], window: &[Game]) -> HashMap<i64, i32> {
    let mut rest = HashMap::new();

    for target in targets {
        for team_id in [target.away_team.id, target.home_team.id] {
            if rest.contains_key(&team_id) {
                continue;
            }
            let last = window
                .iter()
                .filter(|g| g.involves(team_id) && g.start_time_utc < target.start_time_utc)
                .max_by_key(|g| g.start_time_utc);

            let days = match last {
                Some(prev) => ((target.date - prev.date).num_days() - 1).max(0) as i32,
                None => DEFAULT_REST_DAYS,
            };
            rest.insert(team_id, days);
        }
    }

    rest
}
