use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::debug;

use super::confidence::calculate_confidence;
use super::params::ModelVersion;
use super::strategy::{predict_shots, ShotInput, MIN_SHOTS};
use crate::nhl::rest::DEFAULT_REST_DAYS;
use crate::nhl::types::{Game, PlayerDetail, TeamStats};

/// Games a player must have logged to be predicted.
pub const REQUIRED_GAMES: usize = 5;

/// A player whose latest logged game is older than this is considered inactive.
pub const MAX_DAYS_SINCE_LAST_GAME: i64 = 7;

/// One player's prediction under one model.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlayerPrediction {
    pub player_id: i64,
    pub name: String,
    pub position: String,
    pub team_abbrev: String,
    pub team_id: i64,
    pub opposing_team_id: i64,
    /// Most recent game first
    pub shots_last5: Vec<i32>,
    pub avg_shots_last5: f64,
    /// The three most recent of the five logged games, oldest first. Not the
    /// three oldest entries of `shots_last5`, which would trail by two games.
    pub shot_trend: Vec<i32>,
    pub avg_toi: f64,
    pub season_shots_per_game: f64,
    pub predicted_shots: f64,
    /// 0.0–10.0
    pub confidence: f64,
    pub rest_days: i32,
    pub headshot: String,
    pub model_version_id: i64,
    /// Share of this player's validated predictions that succeeded
    pub past_accuracy: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GameWithPlayers {
    pub game: Game,
    pub players: Vec<PlayerPrediction>,
}

/// Sort by confidence, highest first.
pub fn sort_by_confidence(players: &mut [PlayerPrediction]) {
    players.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));
}

/// Predict every eligible player under `model`.
///
/// Players with fewer than five logged games, no game in the last week before
/// `as_of`, or a prediction under the minimum are left out. The result is sorted
/// by confidence, highest first.
pub fn calculate_shooting_stats(
    players: &[PlayerDetail],
    team_stats: &[TeamStats],
    rest_days: &HashMap<i64, i32>,
    model: &ModelVersion,
    as_of: NaiveDate,
) -> Vec<PlayerPrediction> {
    let mut predictions = Vec::new();

    for player in players {
        if player.last5_games.len() < REQUIRED_GAMES {
            continue;
        }
        let games = &player.last5_games[..REQUIRED_GAMES];

        let latest = games.iter().map(|g| g.game_date).max();
        if latest.map_or(true, |d| (as_of - d).num_days() > MAX_DAYS_SINCE_LAST_GAME) {
            debug!("Skipping {}: no recent games", player.full_name());
            continue;
        }

        let shots_last5: Vec<i32> = games.iter().map(|g| g.shots).collect();
        let avg_shots_last5 = shots_last5.iter().sum::<i32>() as f64 / REQUIRED_GAMES as f64;
        let shot_trend: Vec<i32> = shots_last5[..3].iter().rev().copied().collect();
        let avg_toi = games.iter().map(|g| g.toi_minutes).sum::<f64>() / REQUIRED_GAMES as f64;
        let season_shots_per_game = if player.season_games_played > 0 {
            player.season_shots as f64 / player.season_games_played as f64
        } else {
            0.0
        };

        let input = ShotInput {
            player,
            recent_avg: avg_shots_last5,
            season_avg: season_shots_per_game,
            avg_toi,
        };
        let predicted_shots = predict_shots(&input, team_stats, rest_days, model);
        if predicted_shots < MIN_SHOTS {
            continue;
        }

        let confidence = calculate_confidence(
            predicted_shots,
            avg_toi,
            &shot_trend,
            &player.position,
            &model.parameters,
        );

        predictions.push(PlayerPrediction {
            player_id: player.player_id,
            name: player.full_name(),
            position: player.position.clone(),
            team_abbrev: player.current_team_abbrev.clone(),
            team_id: player.current_team_id,
            opposing_team_id: player.opposing_team_id,
            shots_last5,
            avg_shots_last5,
            shot_trend,
            avg_toi,
            season_shots_per_game,
            predicted_shots,
            confidence,
            rest_days: rest_days
                .get(&player.current_team_id)
                .copied()
                .unwrap_or(DEFAULT_REST_DAYS),
            headshot: player.headshot.clone(),
            model_version_id: model.id,
            past_accuracy: None,
        });
    }

    sort_by_confidence(&mut predictions);
    predictions
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::params::default_catalog;
    use crate::nhl::testing::{date, player, team, team_stats};

    fn setup() -> (Vec<TeamStats>, HashMap<i64, i32>) {
        (
            vec![team_stats(10, 31.0, 29.0), team_stats(6, 29.0, 31.0)],
            HashMap::from([(10, 2), (6, 2)]),
        )
    }

    fn skater(id: i64, shots: &[i32], toi: f64, last: NaiveDate) -> PlayerDetail {
        let mut p = player(id, &team(10, "TOR"), "C", shots, toi, last);
        p.opposing_team_id = 6;
        p.opposing_team_abbrev = "BOS".to_string();
        p
    }

    #[test]
    fn test_excludes_short_logs_stale_players_and_low_volume() {
        let (stats, rest) = setup();
        let as_of = date(2025, 1, 10);
        let players = vec![
            skater(1, &[4, 4, 4, 4, 4], 20.0, date(2025, 1, 9)),
            skater(2, &[4, 4, 4, 4], 20.0, date(2025, 1, 9)),
            skater(3, &[4, 4, 4, 4, 4], 20.0, date(2025, 1, 2)),
            skater(4, &[1, 0, 1, 0, 1], 12.0, date(2025, 1, 9)),
        ];

        let out = calculate_shooting_stats(&players, &stats, &rest, &default_catalog()[0], as_of);
        let ids: Vec<i64> = out.iter().map(|p| p.player_id).collect();
        assert_eq!(ids, vec![1]);
    }

    #[test]
    fn test_exactly_seven_days_is_still_active() {
        let (stats, rest) = setup();
        let players = vec![skater(1, &[4, 4, 4, 4, 4], 20.0, date(2025, 1, 3))];
        let out =
            calculate_shooting_stats(&players, &stats, &rest, &default_catalog()[0], date(2025, 1, 10));
        assert_eq!(out.len(), 1);
    }

    #[test]
    fn test_prediction_fields() {
        let (stats, rest) = setup();
        let players = vec![skater(7, &[5, 4, 3, 2, 1], 19.0, date(2025, 1, 9))];
        let out =
            calculate_shooting_stats(&players, &stats, &rest, &default_catalog()[1], date(2025, 1, 10));

        let p = &out[0];
        assert_eq!(p.shots_last5, vec![5, 4, 3, 2, 1]);
        // most recent three, not the trailing [3, 2, 1]
        assert_eq!(p.shot_trend, vec![3, 4, 5]);
        assert!((p.avg_shots_last5 - 3.0).abs() < 1e-9);
        assert!((p.avg_toi - 19.0).abs() < 1e-9);
        assert!((p.season_shots_per_game - 3.0).abs() < 1e-9);
        assert_eq!(p.rest_days, 2);
        assert_eq!(p.model_version_id, 2);
        assert_eq!(p.team_abbrev, "TOR");
        assert!(p.predicted_shots >= MIN_SHOTS);
        assert!(p.past_accuracy.is_none());
    }

    #[test]
    fn test_sorted_by_confidence_descending() {
        let (stats, rest) = setup();
        let last = date(2025, 1, 9);
        let players = vec![
            skater(1, &[3, 3, 3, 3, 3], 14.0, last),
            skater(2, &[6, 5, 4, 4, 4], 22.0, last),
            skater(3, &[4, 4, 4, 4, 4], 18.0, last),
        ];

        for model in default_catalog() {
            let out = calculate_shooting_stats(&players, &stats, &rest, &model, date(2025, 1, 10));
            assert!(!out.is_empty());
            assert!(out.windows(2).all(|w| w[0].confidence >= w[1].confidence));
            assert!(out.iter().all(|p| (0.0..=10.0).contains(&p.confidence)));
        }
    }
}
