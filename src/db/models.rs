use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// A stored per-player, per-model prediction
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PredictionRecord {
    pub id: i64,
    pub game_date: NaiveDate,
    pub game_id: i64,
    /// "AWAY @ HOME"
    pub game_title: String,
    pub away_team_abbrev: String,
    pub away_team_id: i64,
    pub home_team_abbrev: String,
    pub home_team_id: i64,
    pub player_id: i64,
    pub player_name: String,
    pub player_team_abbrev: String,
    pub player_team_id: i64,
    pub predicted_shots: f64,
    /// 0.0–10.0
    pub confidence: f64,
    /// Filled in by validation
    pub actual_shots: Option<i32>,
    /// actual_shots >= predicted_shots
    pub successful: Option<bool>,
    pub created_at: DateTime<Utc>,
    pub validated_at: Option<DateTime<Utc>>,
    pub model_version_id: i64,
}

/// A game as tracked by the store
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GameRecord {
    pub game_id: i64,
    pub game_date: NaiveDate,
    pub title: String,
    pub away_team_id: i64,
    pub away_team_abbrev: String,
    pub home_team_id: i64,
    pub home_team_abbrev: String,
    pub season: String,
    pub start_time_utc: DateTime<Utc>,
    /// "scheduled" | "live" | "final"
    pub status: String,
    /// Predictions have been stored for this game
    pub processed: bool,
}

/// Validated-prediction aggregate for one model version
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ModelAccuracyStats {
    pub total: i64,
    pub successful: i64,
    pub accuracy: f64,
    pub avg_absolute_error: f64,
}
