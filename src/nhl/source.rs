use async_trait::async_trait;
use chrono::NaiveDate;

use super::types::{BoxScore, Game, PlayerDetail, PlayerRef, TeamStats};
use crate::error::FetchError;

/// Everything the prediction pipeline reads from upstream.
#[async_trait]
pub trait StatsSource: Send + Sync {
    /// Games scheduled on exactly `date`.
    async fn fetch_schedule(&self, date: NaiveDate) -> Result<Vec<Game>, FetchError>;

    /// Every game in the seven-day week starting at `start`.
    async fn fetch_schedule_week(&self, start: NaiveDate) -> Result<Vec<Game>, FetchError>;

    /// Forwards and defensemen on a team's current roster.
    async fn fetch_roster(&self, team_abbrev: &str) -> Result<Vec<PlayerRef>, FetchError>;

    async fn fetch_player_detail(&self, player_id: i64) -> Result<PlayerDetail, FetchError>;

    async fn fetch_team_stats(&self, season: &str) -> Result<Vec<TeamStats>, FetchError>;

    async fn fetch_box_score(&self, game_id: i64) -> Result<BoxScore, FetchError>;

    /// Human-readable name for logging.
    fn name(&self) -> &str;

    /// Upstream requests issued so far.
    fn request_count(&self) -> u64 {
        0
    }
}
