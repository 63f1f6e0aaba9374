//! In-memory `StatsSource` and builders shared by unit tests.

use async_trait::async_trait;
use chrono::{Duration, NaiveDate, TimeZone, Utc};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};

use super::source::StatsSource;
use super::types::{
    BoxScore, Game, GameLogEntry, GameStatus, PlayerDetail, PlayerRef, Team, TeamStats,
};
use crate::error::FetchError;

pub fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

pub fn team(id: i64, abbrev: &str) -> Team {
    Team {
        id,
        abbrev: abbrev.to_string(),
        logo: String::new(),
    }
}

/// A game starting at 00:00 UTC the day after `on` (7pm Eastern on `on`).
pub fn game(game_id: i64, on: NaiveDate, away: &Team, home: &Team) -> Game {
    let start = on + Duration::days(1);
    Game {
        game_id,
        title: format!("{} @ {}", away.abbrev, home.abbrev),
        date: on,
        away_team: away.clone(),
        home_team: home.clone(),
        season: "20242025".to_string(),
        start_time_utc: Utc
            .from_utc_datetime(&start.and_hms_opt(0, 0, 0).unwrap()),
        status: GameStatus::Scheduled,
    }
}

pub fn team_stats(team_id: i64, shots_for: f64, shots_against: f64) -> TeamStats {
    TeamStats {
        team_id,
        team_full_name: format!("Team {}", team_id),
        games_played: 40,
        shots_for_per_game: shots_for,
        shots_against_per_game: shots_against,
        goals_for_per_game: 3.0,
        goals_against_per_game: 3.0,
    }
}

/// A player whose five logged games end on `last_game` and step back two days each.
/// `shots` is most recent first.
pub fn player(
    player_id: i64,
    team: &Team,
    position: &str,
    shots: &[i32],
    toi_minutes: f64,
    last_game: NaiveDate,
) -> PlayerDetail {
    PlayerDetail {
        player_id,
        first_name: "Player".to_string(),
        last_name: player_id.to_string(),
        position: position.to_string(),
        current_team_id: team.id,
        current_team_abbrev: team.abbrev.clone(),
        opposing_team_id: 0,
        opposing_team_abbrev: String::new(),
        is_home: false,
        season_shots: shots.iter().sum::<i32>() * 8,
        season_games_played: shots.len() as i32 * 8,
        last5_games: shots
            .iter()
            .enumerate()
            .map(|(i, &s)| GameLogEntry {
                shots: s,
                toi_minutes,
                game_date: last_game - Duration::days(2 * i as i64),
            })
            .collect(),
        headshot: String::new(),
    }
}

fn failure(target: &str) -> FetchError {
    FetchError::Status {
        url: format!("fake://{}", target),
        status: 503,
    }
}

#[derive(Default)]
pub struct FakeSource {
    pub games: Vec<Game>,
    pub rosters: HashMap<String, Vec<PlayerRef>>,
    pub players: HashMap<i64, PlayerDetail>,
    pub team_stats: Vec<TeamStats>,
    pub box_scores: HashMap<i64, BoxScore>,
    pub failing_rosters: HashSet<String>,
    pub failing_players: HashSet<i64>,
    /// Players whose landing payload does not decode
    pub malformed_players: HashSet<i64>,
    pub failing_box_scores: HashSet<i64>,
    pub fail_schedule: bool,
    pub calls: AtomicU64,
}

impl FakeSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a player on their team's roster.
    pub fn add_player(&mut self, detail: PlayerDetail) {
        self.rosters
            .entry(detail.current_team_abbrev.clone())
            .or_default()
            .push(PlayerRef {
                id: detail.player_id,
                first_name: detail.first_name.clone(),
                last_name: detail.last_name.clone(),
                position: detail.position.clone(),
            });
        self.players.insert(detail.player_id, detail);
    }

    pub fn call_count(&self) -> u64 {
        self.calls.load(Ordering::SeqCst)
    }

    fn count(&self) {
        self.calls.fetch_add(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl StatsSource for FakeSource {
    fn name(&self) -> &str {
        "fake"
    }

    fn request_count(&self) -> u64 {
        self.call_count()
    }

    async fn fetch_schedule(&self, date: NaiveDate) -> Result<Vec<Game>, FetchError> {
        self.count();
        if self.fail_schedule {
            return Err(failure("schedule"));
        }
        Ok(self.games.iter().filter(|g| g.date == date).cloned().collect())
    }

    async fn fetch_schedule_week(&self, start: NaiveDate) -> Result<Vec<Game>, FetchError> {
        self.count();
        if self.fail_schedule {
            return Err(failure("schedule"));
        }
        let end = start + Duration::days(6);
        Ok(self
            .games
            .iter()
            .filter(|g| g.date >= start && g.date <= end)
            .cloned()
            .collect())
    }

    async fn fetch_roster(&self, team_abbrev: &str) -> Result<Vec<PlayerRef>, FetchError> {
        self.count();
        tokio::task::yield_now().await;
        if self.failing_rosters.contains(team_abbrev) {
            return Err(failure(team_abbrev));
        }
        Ok(self.rosters.get(team_abbrev).cloned().unwrap_or_default())
    }

    async fn fetch_player_detail(&self, player_id: i64) -> Result<PlayerDetail, FetchError> {
        self.count();
        tokio::task::yield_now().await;
        if self.failing_players.contains(&player_id) {
            return Err(failure(&player_id.to_string()));
        }
        if self.malformed_players.contains(&player_id) {
            return Err(FetchError::Decode {
                what: "player landing".to_string(),
                source: serde_json::from_str::<serde_json::Value>("{").unwrap_err(),
            });
        }
        self.players
            .get(&player_id)
            .cloned()
            .ok_or_else(|| failure(&player_id.to_string()))
    }

    async fn fetch_team_stats(&self, _season: &str) -> Result<Vec<TeamStats>, FetchError> {
        self.count();
        Ok(self.team_stats.clone())
    }

    async fn fetch_box_score(&self, game_id: i64) -> Result<BoxScore, FetchError> {
        self.count();
        if self.failing_box_scores.contains(&game_id) {
            return Err(failure("boxscore"));
        }
        Ok(self.box_scores.get(&game_id).cloned().unwrap_or(BoxScore {
            game_id,
            status: GameStatus::Scheduled,
            shots: HashMap::new(),
        }))
    }
}
