use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Team {
    pub id: i64,
    pub abbrev: String,
    #[serde(default)]
    pub logo: String,
}

/// "scheduled" | "live" | "final"
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GameStatus {
    Scheduled,
    Live,
    Final,
}

impl GameStatus {
    /// Map the upstream `gameState` code.
    pub fn from_game_state(state: &str) -> Self {
        match state.to_uppercase().as_str() {
            "OFF" | "FINAL" => GameStatus::Final,
            "LIVE" | "CRIT" => GameStatus::Live,
            _ => GameStatus::Scheduled,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            GameStatus::Scheduled => "scheduled",
            GameStatus::Live => "live",
            GameStatus::Final => "final",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Game {
    pub game_id: i64,
    /// "AWAY @ HOME"
    pub title: String,
    /// League-local calendar date the game is scheduled on
    pub date: NaiveDate,
    pub away_team: Team,
    pub home_team: Team,
    /// e.g. "20242025"
    pub season: String,
    pub start_time_utc: DateTime<Utc>,
    pub status: GameStatus,
}

impl Game {
    pub fn involves(&self, team_id: i64) -> bool {
        self.away_team.id == team_id || self.home_team.id == team_id
    }
}

/// A skater listed on a team's current roster.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlayerRef {
    pub id: i64,
    pub first_name: String,
    pub last_name: String,
    /// "C" | "L" | "R" | "D"
    pub position: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GameLogEntry {
    pub shots: i32,
    /// Time on ice in minutes
    pub toi_minutes: f64,
    pub game_date: NaiveDate,
}

/// Per-player facts from the player landing endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlayerDetail {
    pub player_id: i64,
    pub first_name: String,
    pub last_name: String,
    pub position: String,
    pub current_team_id: i64,
    pub current_team_abbrev: String,
    /// Filled in by the roster fetcher from the game pairing
    pub opposing_team_id: i64,
    pub opposing_team_abbrev: String,
    /// Whether the player's team is the home side of the game being predicted
    pub is_home: bool,
    pub season_shots: i32,
    pub season_games_played: i32,
    /// Most recent first, as delivered upstream
    pub last5_games: Vec<GameLogEntry>,
    pub headshot: String,
}

impl PlayerDetail {
    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
    }

    pub fn is_defense(&self) -> bool {
        self.position == "D"
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TeamStats {
    pub team_id: i64,
    pub team_full_name: String,
    pub games_played: i32,
    pub shots_for_per_game: f64,
    pub shots_against_per_game: f64,
    pub goals_for_per_game: f64,
    pub goals_against_per_game: f64,
}

/// Post-game shots on goal per player.
#[derive(Debug, Clone, PartialEq)]
pub struct BoxScore {
    pub game_id: i64,
    pub status: GameStatus,
    pub shots: HashMap<i64, i32>,
}

/// Parse an "mm:ss" time-on-ice string into minutes. Malformed values count as 0.
pub fn parse_time_on_ice(toi: &str) -> f64 {
    let Some((minutes, seconds)) = toi.split_once(':') else {
        return 0.0;
    };
    match (minutes.trim().parse::<f64>(), seconds.trim().parse::<f64>()) {
        (Ok(m), Ok(s)) => m + s / 60.0,
        _ => 0.0,
    }
}
