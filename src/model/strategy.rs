//! Shot prediction formulas, one pure function per calculation strategy.

use std::collections::HashMap;

use super::params::{CalculationStrategy, ModelParameters, ModelVersion};
use crate::nhl::types::{PlayerDetail, TeamStats};

/// Predictions below this many shots are dropped from the output.
pub const MIN_SHOTS: f64 = 2.0;

/// Ice time treated as a full top-line shift load, in minutes.
const FULL_TOI_MINUTES: f64 = 20.0;

/// TOI-driven strategy: tier baselines and how strongly they dominate history.
const TOI_TIERS: [(f64, f64); 3] = [(20.0, 3.5), (15.0, 2.5), (10.0, 1.5)];
const TOI_FLOOR_BASELINE: f64 = 0.8;
const TOI_TIER_BLEND: f64 = 0.7;
const TOI_EXPONENT_SCALE: f64 = 0.8;
const TOI_REST_DAMPING: f64 = 0.7;

/// Matchup strategy exponent amplification.
const MATCHUP_PACE_SCALE: f64 = 1.2;
const MATCHUP_OFFENSE_SCALE: f64 = 1.1;
const MATCHUP_DEFENSE_SCALE: f64 = 1.2;

/// Per-player facts derived from the game log.
#[derive(Debug, Clone, Copy)]
pub struct ShotInput<'a> {
    pub player: &'a PlayerDetail,
    pub recent_avg: f64,
    pub season_avg: f64,
    pub avg_toi: f64,
}

/// Raw matchup ratios against the league average shot rate.
struct Matchup {
    pace: f64,
    offense: f64,
    defense: f64,
}

impl Matchup {
    fn factor(&self, pace_exp: f64, offense_exp: f64, defense_exp: f64) -> f64 {
        self.pace.powf(pace_exp) * self.offense.powf(offense_exp) * self.defense.powf(defense_exp)
    }
}

fn league_shot_average(team_stats: &[TeamStats]) -> Option<f64> {
    if team_stats.is_empty() {
        return None;
    }
    let total: f64 = team_stats.iter().map(|t| t.shots_for_per_game).sum();
    Some(total / team_stats.len() as f64)
}

fn matchup(player: &PlayerDetail, team_stats: &[TeamStats]) -> Option<Matchup> {
    let team = team_stats.iter().find(|t| t.team_id == player.current_team_id)?;
    let opponent = team_stats.iter().find(|t| t.team_id == player.opposing_team_id)?;
    let league = league_shot_average(team_stats).filter(|avg| *avg > 0.0)?;

    Some(Matchup {
        pace: (team.shots_for_per_game + opponent.shots_against_per_game) / (2.0 * league),
        offense: team.shots_for_per_game / league,
        defense: opponent.shots_against_per_game / league,
    })
}

fn rest_factor(rest_days: Option<i32>, params: &ModelParameters) -> f64 {
    match rest_days {
        Some(0) => params.back_to_back_factor,
        Some(1) => params.one_rest_day_factor,
        Some(d) if d >= 4 => params.four_plus_rest_day_factor,
        _ => 1.0,
    }
}

fn position_factor(player: &PlayerDetail, params: &ModelParameters) -> f64 {
    if player.is_defense() {
        params.defense_position_factor
    } else {
        1.0
    }
}

fn ice_time_factor(avg_toi: f64) -> f64 {
    (avg_toi / FULL_TOI_MINUTES).min(1.0)
}

fn history_base(recent_avg: f64, season_avg: f64, params: &ModelParameters) -> f64 {
    recent_avg * params.recent_performance_weight + season_avg * params.season_performance_weight
}

/// Weighted mean of the logged games (most recent first), normalized by the
/// weights actually used. `None` when those weights do not sum to a positive value.
pub fn weighted_recent_average(shots: &[i32], weights: &[f64; 5]) -> Option<f64> {
    let used = shots.len().min(weights.len());
    let weight_sum: f64 = weights[..used].iter().sum();
    if used == 0 || weight_sum <= 0.0 {
        return None;
    }
    let weighted: f64 = shots
        .iter()
        .zip(weights.iter())
        .map(|(&s, &w)| s as f64 * w)
        .sum();
    Some(weighted / weight_sum)
}

fn toi_tier_baseline(avg_toi: f64) -> f64 {
    TOI_TIERS
        .iter()
        .find(|(minutes, _)| avg_toi >= *minutes)
        .map(|(_, baseline)| *baseline)
        .unwrap_or(TOI_FLOOR_BASELINE)
}

fn standard(
    input: &ShotInput,
    recent_avg: f64,
    matchup: &Matchup,
    rest: f64,
    params: &ModelParameters,
) -> f64 {
    history_base(recent_avg, input.season_avg, params)
        * matchup.factor(
            params.game_pace_exponent,
            params.team_offense_exponent,
            params.team_defense_exponent,
        )
        * position_factor(input.player, params)
        * ice_time_factor(input.avg_toi)
        * rest
}

fn toi_driven(input: &ShotInput, matchup: &Matchup, rest: f64, params: &ModelParameters) -> f64 {
    let base = TOI_TIER_BLEND * toi_tier_baseline(input.avg_toi)
        + (1.0 - TOI_TIER_BLEND) * history_base(input.recent_avg, input.season_avg, params);

    base * matchup.factor(
        params.game_pace_exponent * TOI_EXPONENT_SCALE,
        params.team_offense_exponent * TOI_EXPONENT_SCALE,
        params.team_defense_exponent * TOI_EXPONENT_SCALE,
    ) * position_factor(input.player, params)
        * rest.powf(TOI_REST_DAMPING)
}

fn matchup_focused(
    input: &ShotInput,
    matchup: &Matchup,
    rest: f64,
    params: &ModelParameters,
) -> f64 {
    let home_ice = if input.player.is_home && params.home_ice_advantage_factor > 0.0 {
        params.home_ice_advantage_factor
    } else {
        1.0
    };
    // Streaks are not modelled yet; the factor stays neutral.
    let streak = 1.0;

    history_base(input.recent_avg, input.season_avg, params)
        * matchup.factor(
            params.game_pace_exponent * MATCHUP_PACE_SCALE,
            params.team_offense_exponent * MATCHUP_OFFENSE_SCALE,
            params.team_defense_exponent * MATCHUP_DEFENSE_SCALE,
        )
        * position_factor(input.player, params)
        * ice_time_factor(input.avg_toi)
        * rest
        * home_ice
        * streak
}

fn round_tenth(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

/// Predicted shots on goal for one player, rounded to one decimal.
///
/// Without stats for both teams (or a usable league average) every strategy
/// falls back to the mean of the recent and season rates.
pub fn predict_shots(
    input: &ShotInput,
    team_stats: &[TeamStats],
    rest_days: &HashMap<i64, i32>,
    model: &ModelVersion,
) -> f64 {
    let params = &model.parameters;

    let recent_avg = match model.strategy {
        CalculationStrategy::WeightedRecency => {
            let shots: Vec<i32> = input.player.last5_games.iter().map(|g| g.shots).collect();
            weighted_recent_average(&shots, &params.recency_weights).unwrap_or(input.recent_avg)
        }
        _ => input.recent_avg,
    };

    let Some(ratios) = matchup(input.player, team_stats) else {
        return round_tenth((recent_avg + input.season_avg) / 2.0);
    };
    let rest = rest_factor(rest_days.get(&input.player.current_team_id).copied(), params);

    let predicted = match model.strategy {
        CalculationStrategy::Standard | CalculationStrategy::WeightedRecency => {
            standard(input, recent_avg, &ratios, rest, params)
        }
        CalculationStrategy::ToiDriven => toi_driven(input, &ratios, rest, params),
        CalculationStrategy::MatchupFocused => matchup_focused(input, &ratios, rest, params),
    };

    round_tenth(predicted)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::params::default_catalog;
    use crate::nhl::testing::{date, player, team, team_stats};
    use approx::assert_relative_eq;

    fn league() -> Vec<TeamStats> {
        // league average shots for = 30.0
        vec![team_stats(10, 33.0, 29.0), team_stats(6, 27.0, 31.0)]
    }

    fn forward(shots: &[i32], toi: f64) -> PlayerDetail {
        let mut p = player(1, &team(10, "TOR"), "C", shots, toi, date(2025, 1, 9));
        p.opposing_team_id = 6;
        p
    }

    fn input(p: &PlayerDetail, recent: f64, season: f64, toi: f64) -> ShotInput<'_> {
        ShotInput {
            player: p,
            recent_avg: recent,
            season_avg: season,
            avg_toi: toi,
        }
    }

    #[test]
    fn test_standard_formula() {
        let p = forward(&[4, 3, 3, 3, 2], 20.0);
        let model = &default_catalog()[0];
        let rest = HashMap::from([(10, 2)]);

        let predicted = predict_shots(&input(&p, 3.0, 3.0, 20.0), &league(), &rest, model);

        // pace (33+31)/60, offense 33/30 ^0.8, defense 31/30 ^0.6
        let expected = 3.0
            * (64.0f64 / 60.0)
            * (33.0f64 / 30.0).powf(0.8)
            * (31.0f64 / 30.0).powf(0.6);
        assert_relative_eq!(predicted, (expected * 10.0).round() / 10.0);
    }

    #[test]
    fn test_missing_team_stats_falls_back_to_average() {
        let p = forward(&[4, 3, 3, 3, 2], 20.0);
        let model = &default_catalog()[0];
        let predicted = predict_shots(&input(&p, 3.0, 2.0, 20.0), &[], &HashMap::new(), model);
        assert_relative_eq!(predicted, 2.5);
    }

    #[test]
    fn test_zero_league_average_falls_back() {
        let p = forward(&[4, 3, 3, 3, 2], 20.0);
        let model = &default_catalog()[0];
        let stats = vec![team_stats(10, 0.0, 29.0), team_stats(6, 0.0, 31.0)];
        let predicted = predict_shots(&input(&p, 3.0, 2.0, 20.0), &stats, &HashMap::new(), model);
        assert_relative_eq!(predicted, 2.5);
    }

    #[test]
    fn test_rest_factor_tiers() {
        let params = &default_catalog()[0].parameters;
        assert_relative_eq!(rest_factor(Some(0), params), 0.9);
        assert_relative_eq!(rest_factor(Some(1), params), 0.95);
        assert_relative_eq!(rest_factor(Some(2), params), 1.0);
        assert_relative_eq!(rest_factor(Some(3), params), 1.0);
        assert_relative_eq!(rest_factor(Some(7), params), 1.1);
        assert_relative_eq!(rest_factor(None, params), 1.0);
    }

    #[test]
    fn test_defense_and_low_toi_reduce_prediction() {
        let model = &default_catalog()[0];
        let rest = HashMap::new();
        let f = forward(&[4, 4, 4, 4, 4], 20.0);
        let mut d = f.clone();
        d.position = "D".to_string();

        let fwd = predict_shots(&input(&f, 4.0, 4.0, 20.0), &league(), &rest, model);
        let def = predict_shots(&input(&d, 4.0, 4.0, 20.0), &league(), &rest, model);
        let short = predict_shots(&input(&f, 4.0, 4.0, 10.0), &league(), &rest, model);
        assert!(def < fwd);
        assert!(short < fwd);
    }

    #[test]
    fn test_weighted_average_normalizes_by_weight_sum() {
        let weights = [0.4, 0.25, 0.15, 0.1, 0.1];
        let avg = weighted_recent_average(&[5, 4, 3, 2, 1], &weights).unwrap();
        assert_relative_eq!(avg, 2.0 + 1.0 + 0.45 + 0.2 + 0.1, epsilon = 1e-9);

        // Doubling every weight yields the same mean
        let doubled = weights.map(|w| w * 2.0);
        let avg2 = weighted_recent_average(&[5, 4, 3, 2, 1], &doubled).unwrap();
        assert_relative_eq!(avg, avg2, epsilon = 1e-9);

        assert!(weighted_recent_average(&[5, 4, 3, 2, 1], &[0.0; 5]).is_none());
    }

    #[test]
    fn test_weighted_recency_favours_latest_game() {
        let catalog = default_catalog();
        let model = &catalog[2];
        let rest = HashMap::new();
        let hot = forward(&[8, 2, 2, 2, 2], 20.0);
        let cold = forward(&[2, 2, 2, 2, 8], 20.0);

        let hot_pred = predict_shots(&input(&hot, 3.2, 3.0, 20.0), &league(), &rest, model);
        let cold_pred = predict_shots(&input(&cold, 3.2, 3.0, 20.0), &league(), &rest, model);
        assert!(hot_pred > cold_pred);
    }

    #[test]
    fn test_toi_tiers() {
        assert_relative_eq!(toi_tier_baseline(22.0), 3.5);
        assert_relative_eq!(toi_tier_baseline(20.0), 3.5);
        assert_relative_eq!(toi_tier_baseline(15.0), 2.5);
        assert_relative_eq!(toi_tier_baseline(12.0), 1.5);
        assert_relative_eq!(toi_tier_baseline(9.9), 0.8);
    }

    #[test]
    fn test_toi_driven_formula() {
        let catalog = default_catalog();
        let model = &catalog[4];
        let p = forward(&[2, 2, 2, 2, 2], 21.0);
        let rest = HashMap::from([(10, 0)]);

        let predicted = predict_shots(&input(&p, 2.0, 2.0, 21.0), &league(), &rest, model);

        let base = 0.7 * 3.5 + 0.3 * 2.0;
        let expected = base
            * (64.0f64 / 60.0).powf(0.7 * 0.8)
            * (33.0f64 / 30.0).powf(0.5 * 0.8)
            * (31.0f64 / 30.0).powf(0.4 * 0.8)
            * 0.92f64.powf(0.7);
        assert_relative_eq!(predicted, (expected * 10.0).round() / 10.0);
    }

    #[test]
    fn test_matchup_home_ice_applies_only_at_home() {
        let catalog = default_catalog();
        let model = &catalog[3];
        let rest = HashMap::new();
        let away = forward(&[5, 5, 5, 5, 5], 20.0);
        let mut home = away.clone();
        home.is_home = true;

        let away_pred = predict_shots(&input(&away, 5.0, 5.0, 20.0), &league(), &rest, model);
        let home_pred = predict_shots(&input(&home, 5.0, 5.0, 20.0), &league(), &rest, model);
        assert!(home_pred > away_pred);

        let mut no_home_ice = model.clone();
        no_home_ice.parameters.home_ice_advantage_factor = 0.0;
        let neutral = predict_shots(&input(&home, 5.0, 5.0, 20.0), &league(), &rest, &no_home_ice);
        assert_relative_eq!(neutral, away_pred);
    }
}
