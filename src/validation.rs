//! Reconciles stored predictions with final box scores.

use anyhow::{bail, Result};
use chrono::{Duration, NaiveDate};
use futures_util::future::join_all;
use serde::Serialize;
use std::collections::BTreeMap;
use tracing::{debug, info, warn};

use crate::db::models::PredictionRecord;
use crate::db::Database;
use crate::nhl::source::StatsSource;
use crate::nhl::types::GameStatus;

#[derive(Debug, Default, Clone, Serialize)]
pub struct ValidationSummary {
    /// Unvalidated predictions inside the lookback window
    pub pending: usize,
    pub games_checked: usize,
    pub games_final: usize,
    pub validated: usize,
    /// Predictions whose player is absent from a final box score
    pub missing_players: usize,
    pub failures: usize,
}

/// Fill in actual shots for pending predictions from `today - lookback_days`
/// up to (not including) `today`.
///
/// Games that are not final yet are left for a later run, as are players missing
/// from the box score. Fetch and store failures do not stop the remaining games;
/// they are reported as an error once everything reachable has been written.
pub async fn validate_pending(
    source: &dyn StatsSource,
    db: &Database,
    today: NaiveDate,
    lookback_days: i64,
) -> Result<ValidationSummary> {
    let since = today - Duration::days(lookback_days);
    let pending = db.pending_validation(since, today)?;

    let mut summary = ValidationSummary {
        pending: pending.len(),
        ..Default::default()
    };
    if pending.is_empty() {
        debug!("No predictions pending validation since {}", since);
        return Ok(summary);
    }

    let mut by_game: BTreeMap<i64, Vec<PredictionRecord>> = BTreeMap::new();
    for record in pending {
        by_game.entry(record.game_id).or_default().push(record);
    }
    summary.games_checked = by_game.len();

    let box_scores = join_all(by_game.keys().map(|&id| source.fetch_box_score(id))).await;

    for ((game_id, records), fetched) in by_game.iter().zip(box_scores) {
        let box_score = match fetched {
            Ok(b) => b,
            Err(e) => {
                if e.is_decode() {
                    warn!("Box score for game {} is malformed: {}", game_id, e);
                } else {
                    warn!("Failed to fetch box score for game {}: {}", game_id, e);
                }
                summary.failures += 1;
                continue;
            }
        };

        if box_score.status != GameStatus::Final {
            debug!("Game {} is {}, skipping", game_id, box_score.status.as_str());
            continue;
        }
        summary.games_final += 1;

        if let Err(e) = db.set_game_status(*game_id, GameStatus::Final) {
            warn!("Failed to mark game {} final: {}", game_id, e);
            summary.failures += 1;
        }

        for record in records {
            let Some(&actual) = box_score.shots.get(&record.player_id) else {
                summary.missing_players += 1;
                continue;
            };
            match db.store_actual_shots(record, actual) {
                Ok(true) => summary.validated += 1,
                Ok(false) => {}
                Err(e) => {
                    warn!(
                        "Failed to store actual shots for player {} in game {}: {}",
                        record.player_id, game_id, e
                    );
                    summary.failures += 1;
                }
            }
        }
    }

    info!(
        "Validation: {} pending, {} of {} games final, {} validated, {} players missing",
        summary.pending,
        summary.games_final,
        summary.games_checked,
        summary.validated,
        summary.missing_players
    );

    if summary.failures > 0 {
        bail!(
            "validation incomplete: {} failure(s) across {} games",
            summary.failures,
            summary.games_checked
        );
    }
    Ok(summary)
}
