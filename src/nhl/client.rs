use anyhow::Context;
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use reqwest::Client;
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

use super::source::StatsSource;
use super::types::{
    parse_time_on_ice, BoxScore, Game, GameLogEntry, GameStatus, PlayerDetail, PlayerRef, Team,
    TeamStats,
};
use crate::error::FetchError;

/// Client for the public NHL web API (schedule, rosters, players, box scores)
/// and the NHL stats API (team summaries).
///
/// Clones share the HTTP connection pool and the request counter.
#[derive(Clone)]
pub struct NhlClient {
    http: Client,
    api_url: String,
    stats_url: String,
    requests: Arc<AtomicU64>,
}

impl NhlClient {
    pub fn new(api_url: &str, stats_url: &str, timeout: Duration) -> anyhow::Result<Self> {
        let http = Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to build HTTP client")?;
        Ok(NhlClient {
            http,
            api_url: api_url.trim_end_matches('/').to_string(),
            stats_url: stats_url.trim_end_matches('/').to_string(),
            requests: Arc::new(AtomicU64::new(0)),
        })
    }

    async fn get_body(&self, url: &str) -> Result<String, FetchError> {
        self.requests.fetch_add(1, Ordering::Relaxed);
        debug!("GET {}", url);

        let resp = self
            .http
            .get(url)
            .send()
            .await
            .map_err(|source| FetchError::Transport {
                url: url.to_string(),
                source,
            })?;

        if !resp.status().is_success() {
            return Err(FetchError::Status {
                url: url.to_string(),
                status: resp.status().as_u16(),
            });
        }

        resp.text().await.map_err(|source| FetchError::Transport {
            url: url.to_string(),
            source,
        })
    }
}

#[async_trait]
impl StatsSource for NhlClient {
    fn name(&self) -> &str {
        "nhl-api"
    }

    /// Shared by every clone of this client.
    fn request_count(&self) -> u64 {
        self.requests.load(Ordering::Relaxed)
    }

    async fn fetch_schedule(&self, date: NaiveDate) -> Result<Vec<Game>, FetchError> {
        let games = self.fetch_schedule_week(date).await?;
        Ok(games.into_iter().filter(|g| g.date == date).collect())
    }

    async fn fetch_schedule_week(&self, start: NaiveDate) -> Result<Vec<Game>, FetchError> {
        let url = format!("{}/schedule/{}", self.api_url, start.format("%Y-%m-%d"));
        let body = self.get_body(&url).await?;
        parse_schedule(&body)
    }

    async fn fetch_roster(&self, team_abbrev: &str) -> Result<Vec<PlayerRef>, FetchError> {
        let url = format!("{}/roster/{}/current", self.api_url, team_abbrev);
        let body = self.get_body(&url).await?;
        parse_roster(&body)
    }

    async fn fetch_player_detail(&self, player_id: i64) -> Result<PlayerDetail, FetchError> {
        let url = format!("{}/player/{}/landing", self.api_url, player_id);
        let body = self.get_body(&url).await?;
        parse_player_landing(&body)
    }

    async fn fetch_team_stats(&self, season: &str) -> Result<Vec<TeamStats>, FetchError> {
        let url = format!(
            "{}/team/summary?cayenneExp=seasonId={}",
            self.stats_url, season
        );
        let body = self.get_body(&url).await?;
        parse_team_summary(&body)
    }

    async fn fetch_box_score(&self, game_id: i64) -> Result<BoxScore, FetchError> {
        let url = format!("{}/gamecenter/{}/boxscore", self.api_url, game_id);
        let body = self.get_body(&url).await?;
        parse_box_score(&body)
    }
}

// ── Wire shapes ────────────────────────────────────────────────────────────────

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawSchedule {
    #[serde(default)]
    game_week: Vec<RawGameDay>,
}

#[derive(Deserialize)]
struct RawGameDay {
    date: NaiveDate,
    #[serde(default)]
    games: Vec<RawScheduledGame>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawScheduledGame {
    id: i64,
    season: i64,
    #[serde(rename = "startTimeUTC")]
    start_time_utc: DateTime<Utc>,
    #[serde(default)]
    game_state: String,
    away_team: Team,
    home_team: Team,
}

#[derive(Deserialize, Default)]
struct RawName {
    #[serde(default)]
    default: String,
}

#[derive(Deserialize)]
struct RawRoster {
    #[serde(default)]
    forwards: Vec<RawRosterPlayer>,
    #[serde(default)]
    defensemen: Vec<RawRosterPlayer>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawRosterPlayer {
    id: i64,
    #[serde(default)]
    first_name: RawName,
    #[serde(default)]
    last_name: RawName,
    #[serde(default)]
    position_code: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawPlayerLanding {
    player_id: i64,
    #[serde(default)]
    first_name: RawName,
    #[serde(default)]
    last_name: RawName,
    #[serde(default)]
    position: String,
    #[serde(default)]
    current_team_id: i64,
    #[serde(default)]
    current_team_abbrev: String,
    #[serde(default)]
    featured_stats: RawFeaturedStats,
    #[serde(default)]
    last5_games: Vec<RawGameLog>,
    #[serde(default)]
    headshot: String,
}

#[derive(Deserialize, Default)]
#[serde(rename_all = "camelCase")]
struct RawFeaturedStats {
    #[serde(default)]
    regular_season: RawRegularSeason,
}

#[derive(Deserialize, Default)]
#[serde(rename_all = "camelCase")]
struct RawRegularSeason {
    #[serde(default)]
    sub_season: RawSubSeason,
}

#[derive(Deserialize, Default)]
#[serde(rename_all = "camelCase")]
struct RawSubSeason {
    #[serde(default)]
    shots: i32,
    #[serde(default)]
    games_played: i32,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawGameLog {
    #[serde(default)]
    shots: i32,
    #[serde(default)]
    toi: String,
    game_date: NaiveDate,
}

#[derive(Deserialize)]
struct RawTeamSummary {
    #[serde(default)]
    data: Vec<RawTeamStats>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawTeamStats {
    team_id: i64,
    #[serde(default)]
    team_full_name: String,
    #[serde(default)]
    games_played: i32,
    #[serde(default)]
    shots_for_per_game: Option<f64>,
    #[serde(default)]
    shots_against_per_game: Option<f64>,
    #[serde(default)]
    goals_for_per_game: Option<f64>,
    #[serde(default)]
    goals_against_per_game: Option<f64>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawBoxScore {
    id: i64,
    #[serde(default)]
    game_state: String,
    #[serde(default)]
    player_by_game_stats: RawPlayerByGameStats,
}

#[derive(Deserialize, Default)]
#[serde(rename_all = "camelCase")]
struct RawPlayerByGameStats {
    #[serde(default)]
    away_team: RawBoxTeam,
    #[serde(default)]
    home_team: RawBoxTeam,
}

#[derive(Deserialize, Default)]
struct RawBoxTeam {
    #[serde(default)]
    forwards: Vec<RawBoxSkater>,
    #[serde(default)]
    defense: Vec<RawBoxSkater>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawBoxSkater {
    player_id: i64,
    #[serde(default)]
    sog: i32,
}

// ── Parsing helpers ────────────────────────────────────────────────────────────

fn decode<T: for<'de> Deserialize<'de>>(body: &str, what: &str) -> Result<T, FetchError> {
    serde_json::from_str(body).map_err(|source| FetchError::Decode {
        what: what.to_string(),
        source,
    })
}

fn parse_schedule(body: &str) -> Result<Vec<Game>, FetchError> {
    let raw: RawSchedule = decode(body, "schedule")?;
    let games = raw
        .game_week
        .into_iter()
        .flat_map(|day| {
            let date = day.date;
            day.games.into_iter().map(move |g| Game {
                game_id: g.id,
                title: format!("{} @ {}", g.away_team.abbrev, g.home_team.abbrev),
                date,
                season: g.season.to_string(),
                start_time_utc: g.start_time_utc,
                status: GameStatus::from_game_state(&g.game_state),
                away_team: g.away_team,
                home_team: g.home_team,
            })
        })
        .collect();
    Ok(games)
}

fn parse_roster(body: &str) -> Result<Vec<PlayerRef>, FetchError> {
    let raw: RawRoster = decode(body, "roster")?;
    let skaters = raw
        .forwards
        .into_iter()
        .chain(raw.defensemen)
        .map(|p| PlayerRef {
            id: p.id,
            first_name: p.first_name.default,
            last_name: p.last_name.default,
            position: p.position_code,
        })
        .collect();
    Ok(skaters)
}

fn parse_player_landing(body: &str) -> Result<PlayerDetail, FetchError> {
    let raw: RawPlayerLanding = decode(body, "player landing")?;
    let season = raw.featured_stats.regular_season.sub_season;
    Ok(PlayerDetail {
        player_id: raw.player_id,
        first_name: raw.first_name.default,
        last_name: raw.last_name.default,
        position: raw.position,
        current_team_id: raw.current_team_id,
        current_team_abbrev: raw.current_team_abbrev,
        opposing_team_id: 0,
        opposing_team_abbrev: String::new(),
        is_home: false,
        season_shots: season.shots,
        season_games_played: season.games_played,
        last5_games: raw
            .last5_games
            .into_iter()
            .map(|g| GameLogEntry {
                shots: g.shots,
                toi_minutes: parse_time_on_ice(&g.toi),
                game_date: g.game_date,
            })
            .collect(),
        headshot: raw.headshot,
    })
}

fn parse_team_summary(body: &str) -> Result<Vec<TeamStats>, FetchError> {
    let raw: RawTeamSummary = decode(body, "team summary")?;
    Ok(raw
        .data
        .into_iter()
        .map(|t| TeamStats {
            team_id: t.team_id,
            team_full_name: t.team_full_name,
            games_played: t.games_played,
            shots_for_per_game: t.shots_for_per_game.unwrap_or(0.0),
            shots_against_per_game: t.shots_against_per_game.unwrap_or(0.0),
            goals_for_per_game: t.goals_for_per_game.unwrap_or(0.0),
            goals_against_per_game: t.goals_against_per_game.unwrap_or(0.0),
        })
        .collect())
}

fn parse_box_score(body: &str) -> Result<BoxScore, FetchError> {
    let raw: RawBoxScore = decode(body, "box score")?;
    let stats = raw.player_by_game_stats;
    let shots: HashMap<i64, i32> = stats
        .away_team
        .forwards
        .into_iter()
        .chain(stats.away_team.defense)
        .chain(stats.home_team.forwards)
        .chain(stats.home_team.defense)
        .map(|p| (p.player_id, p.sog))
        .collect();
    Ok(BoxScore {
        game_id: raw.id,
        status: GameStatus::from_game_state(&raw.game_state),
        shots,
    })
}
