use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// Model used when nothing else resolves.
pub const DEFAULT_MODEL_VERSION: i64 = 1;

/// How a model turns player and team facts into a shot prediction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CalculationStrategy {
    Standard,
    WeightedRecency,
    ToiDriven,
    MatchupFocused,
}

impl CalculationStrategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            CalculationStrategy::Standard => "standard",
            CalculationStrategy::WeightedRecency => "weighted_recency",
            CalculationStrategy::ToiDriven => "toi_driven",
            CalculationStrategy::MatchupFocused => "matchup_focused",
        }
    }
}

/// Tunable constants of one model version.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelParameters {
    pub recent_performance_weight: f64,
    pub season_performance_weight: f64,

    pub game_pace_exponent: f64,
    pub team_offense_exponent: f64,
    pub team_defense_exponent: f64,

    /// Multiplier applied to defensemen's predictions
    pub defense_position_factor: f64,

    pub back_to_back_factor: f64,
    pub one_rest_day_factor: f64,
    pub four_plus_rest_day_factor: f64,

    // Confidence scoring
    pub shot_score_multiplier: f64,
    pub toi_base_multiplier: f64,
    /// Minutes above which the TOI bonus starts
    pub toi_bonus_threshold: f64,
    pub toi_bonus_multiplier: f64,
    pub trend_upward_score: f64,
    pub trend_improvement_score: f64,
    pub defense_confidence_factor: f64,

    /// Per-game weights, most recent game first
    pub recency_weights: [f64; 5],
    pub opposing_goalie_quality_factor: f64,
    pub home_ice_advantage_factor: f64,
    pub streak_impact_factor: f64,
}

impl ModelParameters {
    pub const ORIGINAL: ModelParameters = ModelParameters {
        recent_performance_weight: 0.7,
        season_performance_weight: 0.3,
        game_pace_exponent: 1.0,
        team_offense_exponent: 0.8,
        team_defense_exponent: 0.6,
        defense_position_factor: 0.75,
        back_to_back_factor: 0.9,
        one_rest_day_factor: 0.95,
        four_plus_rest_day_factor: 1.1,
        shot_score_multiplier: 4.0,
        toi_base_multiplier: 3.0,
        toi_bonus_threshold: 18.0,
        toi_bonus_multiplier: 1.0,
        trend_upward_score: 1.5,
        trend_improvement_score: 0.75,
        defense_confidence_factor: 0.9,
        recency_weights: [0.0; 5],
        opposing_goalie_quality_factor: 0.0,
        home_ice_advantage_factor: 0.0,
        streak_impact_factor: 0.0,
    };

    pub fn recency_weight_sum(&self) -> f64 {
        self.recency_weights.iter().sum()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelVersion {
    pub id: i64,
    pub name: String,
    pub description: String,
    pub strategy: CalculationStrategy,
    pub parameters: ModelParameters,
    pub active: bool,
    pub created_at: DateTime<Utc>,
}

fn catalog_date(y: i32, m: u32, d: u32) -> DateTime<Utc> {
    NaiveDate::from_ymd_opt(y, m, d)
        .and_then(|day| day.and_hms_opt(0, 0, 0))
        .map(|dt| dt.and_utc())
        .unwrap_or_default()
}

fn version(
    id: i64,
    name: &str,
    description: &str,
    strategy: CalculationStrategy,
    parameters: ModelParameters,
    created_at: DateTime<Utc>,
) -> ModelVersion {
    ModelVersion {
        id,
        name: name.to_string(),
        description: description.to_string(),
        strategy,
        parameters,
        active: id == DEFAULT_MODEL_VERSION,
        created_at,
    }
}

/// The built-in model catalog, ids 1 to 5.
pub fn default_catalog() -> Vec<ModelVersion> {
    let launch = catalog_date(2025, 3, 11);
    let revision = catalog_date(2025, 3, 27);

    vec![
        version(
            1,
            "Original Model",
            "The initial shot prediction model",
            CalculationStrategy::Standard,
            ModelParameters::ORIGINAL,
            launch,
        ),
        version(
            2,
            "Enhanced Recent Performance",
            "Increased weight on recent performance and rest factors",
            CalculationStrategy::Standard,
            ModelParameters {
                recent_performance_weight: 0.8,
                season_performance_weight: 0.2,
                team_offense_exponent: 0.9,
                team_defense_exponent: 0.7,
                defense_position_factor: 0.8,
                back_to_back_factor: 0.85,
                four_plus_rest_day_factor: 1.15,
                toi_base_multiplier: 3.2,
                toi_bonus_multiplier: 1.1,
                trend_upward_score: 1.6,
                trend_improvement_score: 0.8,
                ..ModelParameters::ORIGINAL
            },
            revision,
        ),
        version(
            3,
            "Weighted Recency Model",
            "Weighs individual games based on recency",
            CalculationStrategy::WeightedRecency,
            ModelParameters {
                recent_performance_weight: 0.85,
                season_performance_weight: 0.15,
                game_pace_exponent: 1.1,
                team_defense_exponent: 0.7,
                four_plus_rest_day_factor: 1.08,
                recency_weights: [0.4, 0.25, 0.15, 0.1, 0.1],
                ..ModelParameters::ORIGINAL
            },
            revision,
        ),
        version(
            4,
            "Matchup-Focused Model",
            "Emphasizes team matchups and contextual factors",
            CalculationStrategy::MatchupFocused,
            ModelParameters {
                recent_performance_weight: 0.6,
                season_performance_weight: 0.4,
                game_pace_exponent: 1.2,
                team_offense_exponent: 1.0,
                team_defense_exponent: 0.9,
                defense_position_factor: 0.8,
                back_to_back_factor: 0.85,
                one_rest_day_factor: 0.92,
                four_plus_rest_day_factor: 1.15,
                shot_score_multiplier: 3.5,
                toi_bonus_threshold: 17.5,
                trend_upward_score: 1.2,
                trend_improvement_score: 0.6,
                opposing_goalie_quality_factor: 1.1,
                home_ice_advantage_factor: 1.05,
                streak_impact_factor: 0.05,
                ..ModelParameters::ORIGINAL
            },
            revision,
        ),
        version(
            5,
            "TOI-Driven Model",
            "Uses ice time as primary predictor with minimal adjustment factors",
            CalculationStrategy::ToiDriven,
            ModelParameters {
                recent_performance_weight: 0.5,
                season_performance_weight: 0.5,
                game_pace_exponent: 0.7,
                team_offense_exponent: 0.5,
                team_defense_exponent: 0.4,
                defense_position_factor: 0.8,
                back_to_back_factor: 0.92,
                one_rest_day_factor: 0.97,
                four_plus_rest_day_factor: 1.05,
                shot_score_multiplier: 3.0,
                toi_base_multiplier: 4.5,
                toi_bonus_threshold: 16.0,
                toi_bonus_multiplier: 1.5,
                trend_upward_score: 1.0,
                trend_improvement_score: 0.5,
                defense_confidence_factor: 0.95,
                ..ModelParameters::ORIGINAL
            },
            revision,
        ),
    ]
}

/// Last-resort model returned when the registry has nothing to offer.
pub fn minimal_model() -> ModelVersion {
    ModelVersion {
        id: DEFAULT_MODEL_VERSION,
        name: "Default Model".to_string(),
        description: "Basic shot prediction model".to_string(),
        strategy: CalculationStrategy::Standard,
        parameters: ModelParameters::ORIGINAL,
        active: true,
        created_at: DateTime::<Utc>::default(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_catalog_has_five_models_with_one_active() {
        let catalog = default_catalog();
        let ids: Vec<i64> = catalog.iter().map(|m| m.id).collect();
        assert_eq!(ids, vec![1, 2, 3, 4, 5]);
        let active: Vec<i64> = catalog.iter().filter(|m| m.active).map(|m| m.id).collect();
        assert_eq!(active, vec![1]);
    }

    #[test]
    fn test_catalog_strategies() {
        let catalog = default_catalog();
        assert_eq!(catalog[0].strategy, CalculationStrategy::Standard);
        assert_eq!(catalog[1].strategy, CalculationStrategy::Standard);
        assert_eq!(catalog[2].strategy, CalculationStrategy::WeightedRecency);
        assert_eq!(catalog[3].strategy, CalculationStrategy::MatchupFocused);
        assert_eq!(catalog[4].strategy, CalculationStrategy::ToiDriven);
    }

    #[test]
    fn test_weighted_recency_weights_sum_to_one() {
        let catalog = default_catalog();
        assert_relative_eq!(catalog[2].parameters.recency_weight_sum(), 1.0, epsilon = 1e-9);
    }

    #[test]
    fn test_strategy_serializes_snake_case() {
        let json = serde_json::to_string(&CalculationStrategy::WeightedRecency).unwrap();
        assert_eq!(json, "\"weighted_recency\"");
        assert_eq!(CalculationStrategy::ToiDriven.as_str(), "toi_driven");
    }

    #[test]
    fn test_minimal_model_matches_original_parameters() {
        let minimal = minimal_model();
        assert_eq!(minimal.id, DEFAULT_MODEL_VERSION);
        assert_eq!(minimal.parameters, default_catalog()[0].parameters);
    }
}
