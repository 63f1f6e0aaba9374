use super::params::ModelParameters;

const MAX_CONFIDENCE: f64 = 10.0;

/// Population variance.
pub fn variance(values: &[i32]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let n = values.len() as f64;
    let mean = values.iter().map(|&v| v as f64).sum::<f64>() / n;
    values
        .iter()
        .map(|&v| {
            let d = v as f64 - mean;
            d * d
        })
        .sum::<f64>()
        / n
}

/// Confidence score on a 0–10 scale, rounded to one decimal.
///
/// `trend` holds the three most recent games, oldest first.
pub fn calculate_confidence(
    predicted_shots: f64,
    avg_toi: f64,
    trend: &[i32],
    position: &str,
    params: &ModelParameters,
) -> f64 {
    let mut score = (predicted_shots / 4.0).min(1.0) * params.shot_score_multiplier;

    score += (avg_toi / 20.0).min(1.0) * params.toi_base_multiplier;
    if avg_toi > params.toi_bonus_threshold {
        score += ((avg_toi - params.toi_bonus_threshold) / 4.0).min(1.0) * params.toi_bonus_multiplier;
    }

    let trend_variance = (trend.len() >= 3).then(|| variance(trend));

    if let Some(var) = trend_variance {
        let trend_score = if trend[2] > trend[1] && trend[1] > trend[0] {
            params.trend_upward_score
        } else if trend[2] > trend[0] {
            params.trend_improvement_score
        } else {
            0.0
        };
        score += trend_score * (1.0 - var / 4.0).max(0.5);
    }

    if position == "D" {
        score *= params.defense_confidence_factor;
    }

    if let Some(var) = trend_variance {
        score += (0.5 - var / 6.0).max(0.0);
    }

    (score.clamp(0.0, MAX_CONFIDENCE) * 10.0).round() / 10.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::params::default_catalog;
    use approx::assert_relative_eq;

    #[test]
    fn test_variance() {
        assert_relative_eq!(variance(&[2, 2, 2]), 0.0);
        assert_relative_eq!(variance(&[1, 2, 3]), 2.0 / 3.0, epsilon = 1e-12);
        assert_relative_eq!(variance(&[]), 0.0);
    }

    #[test]
    fn test_top_line_forward_with_rising_trend() {
        let params = &default_catalog()[0].parameters;
        // shot 4.0 + toi 3.0 + bonus 1.0 + trend 1.5·max(.5, 1-(2/3)/4) + consistency .5-(2/3)/6
        let score = calculate_confidence(4.5, 22.0, &[1, 2, 3], "C", params);
        let var = 2.0 / 3.0;
        let expected = 4.0 + 3.0 + 1.0 + 1.5 * (1.0 - var / 4.0) + (0.5 - var / 6.0);
        assert_relative_eq!(score, (expected * 10.0f64).round() / 10.0);
    }

    #[test]
    fn test_defense_discount_precedes_consistency_bonus() {
        let params = &default_catalog()[0].parameters;
        let forward = calculate_confidence(2.0, 20.0, &[2, 2, 2], "C", params);
        let defense = calculate_confidence(2.0, 20.0, &[2, 2, 2], "D", params);
        // forward: 2 + 3 + 0.5 bonus + 0.5 consistency = 6.0
        assert_relative_eq!(forward, 6.0);
        // defense: (2 + 3 + 0.5) * 0.9 + 0.5 = 5.45 before rounding
        assert!(defense < forward);
        assert!((defense - 5.45).abs() <= 0.051);
    }

    #[test]
    fn test_improvement_without_strict_rise() {
        let params = &default_catalog()[0].parameters;
        let improving = calculate_confidence(3.0, 15.0, &[2, 1, 4], "L", params);
        let flat_end = calculate_confidence(3.0, 15.0, &[4, 1, 2], "L", params);
        assert!(improving > flat_end);
    }

    #[test]
    fn test_short_trend_skips_trend_terms() {
        let params = &default_catalog()[0].parameters;
        // shot 4.0 + toi 3.0 + bonus 0.5, nothing for trend or consistency
        let score = calculate_confidence(4.0, 20.0, &[3, 4], "C", params);
        assert_relative_eq!(score, 7.5);
    }

    #[test]
    fn test_always_in_range_and_deterministic() {
        for model in default_catalog() {
            for predicted in [0.0, 1.0, 2.5, 6.0, 40.0] {
                for toi in [0.0, 8.0, 18.5, 25.0, 60.0] {
                    for trend in [[0, 0, 0], [1, 2, 3], [9, 0, 9], [0, 10, 20]] {
                        for pos in ["C", "D"] {
                            let a = calculate_confidence(predicted, toi, &trend, pos, &model.parameters);
                            let b = calculate_confidence(predicted, toi, &trend, pos, &model.parameters);
                            assert!((0.0..=10.0).contains(&a), "confidence {} out of range", a);
                            assert_eq!(a, b);
                        }
                    }
                }
            }
        }
    }

    #[test]
    fn test_extreme_inputs_are_clamped() {
        let mut params = default_catalog()[0].parameters.clone();
        params.shot_score_multiplier = 50.0;
        assert_relative_eq!(calculate_confidence(10.0, 25.0, &[1, 2, 3], "C", &params), 10.0);
    }
}
