//! Per-date prediction pipeline: schedule → rosters → rest → model → store.

use anyhow::{bail, Context, Result};
use chrono::NaiveDate;
use futures_util::future::join_all;
use serde::Serialize;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;
use tracing::{error, info, warn};

use crate::db::models::PredictionRecord;
use crate::db::Database;
use crate::model::shooting::sort_by_confidence;
use crate::model::{
    calculate_shooting_stats, GameWithPlayers, ModelRegistry, ModelVersion, PlayerPrediction,
};
use crate::nhl::rest::teams_rest;
use crate::nhl::{Game, PlayerDetail, RosterFetcher, StatsSource, Team, TeamStats};

/// Everything fetched for one date, shared by every model run.
#[derive(Default)]
struct DateInputs {
    games: Vec<Game>,
    team_stats: Vec<TeamStats>,
    rest_days: HashMap<i64, i32>,
    /// game_id → fetched skaters
    players: HashMap<i64, Vec<PlayerDetail>>,
    /// Games with roster or player fetches that failed in transit
    incomplete: HashSet<i64>,
}

#[derive(Debug, Default, Clone, Serialize)]
pub struct RunSummary {
    pub date: Option<NaiveDate>,
    pub games: usize,
    pub models: usize,
    pub predictions_stored: usize,
}

#[derive(Clone)]
pub struct PredictionService {
    source: Arc<dyn StatsSource>,
    fetcher: RosterFetcher,
    registry: ModelRegistry,
    db: Database,
}

impl PredictionService {
    pub fn new(
        source: Arc<dyn StatsSource>,
        fetcher: RosterFetcher,
        registry: ModelRegistry,
        db: Database,
    ) -> Self {
        PredictionService {
            source,
            fetcher,
            registry,
            db,
        }
    }

    pub fn registry(&self) -> &ModelRegistry {
        &self.registry
    }

    pub fn database(&self) -> &Database {
        &self.db
    }

    pub fn source(&self) -> &dyn StatsSource {
        self.source.as_ref()
    }

    /// Active-model predictions for every game on `date`, annotated with each
    /// player's past accuracy. No games is an empty result.
    pub async fn predictions_for_date(&self, date: NaiveDate) -> Result<Vec<GameWithPlayers>> {
        let model = self.registry.active_model().await;
        let inputs = self.gather(date).await?;
        let mut games = predict_games(&inputs, &model, date);
        self.annotate_past_accuracy(&mut games);
        Ok(games)
    }

    /// Every registered model over the same fetched data.
    pub async fn run_all_models(&self, date: NaiveDate) -> Result<BTreeMap<i64, Vec<GameWithPlayers>>> {
        let models = self.registry.all_models().await;
        let inputs = self.gather(date).await?;
        Ok(run_models(&inputs, &models, date))
    }

    /// Run every model for `date`, store the predictions and mark the games processed.
    ///
    /// Each game's predictions across all models are written in one transaction.
    /// A game whose batch fails to store is rolled back and skipped. A game whose
    /// roster or player fetches hit transport failures is stored as far as it got
    /// but left unprocessed. Either case is returned as an error once the other
    /// games are written, so the caller can retry the whole run.
    pub async fn run_and_store_all_models(&self, date: NaiveDate) -> Result<RunSummary> {
        let models = self.registry.all_models().await;
        let inputs = self.gather(date).await?;
        let results = run_models(&inputs, &models, date);

        let mut summary = RunSummary {
            date: Some(date),
            games: inputs.games.len(),
            models: results.len(),
            predictions_stored: 0,
        };
        let mut failed: HashSet<i64> = HashSet::new();

        for game in &inputs.games {
            if let Err(e) = self.db.insert_game(game) {
                error!("Failed to record game {}: {}", game.game_id, e);
                failed.insert(game.game_id);
                continue;
            }

            let players: Vec<PlayerPrediction> = results
                .values()
                .filter_map(|games| games.iter().find(|g| g.game.game_id == game.game_id))
                .flat_map(|g| g.players.iter().cloned())
                .collect();
            let batch = GameWithPlayers {
                game: game.clone(),
                players,
            };
            match self.db.store_game_predictions(&batch) {
                Ok(n) => summary.predictions_stored += n,
                Err(e) => {
                    error!("Failed to store predictions for game {}: {}", game.game_id, e);
                    failed.insert(game.game_id);
                    continue;
                }
            }

            if inputs.incomplete.contains(&game.game_id) {
                warn!("Leaving {} unprocessed until its fetches succeed", game.title);
                continue;
            }
            if let Err(e) = self.db.mark_game_processed(game.game_id) {
                error!("Failed to mark game {} processed: {}", game.game_id, e);
                failed.insert(game.game_id);
            }
        }

        info!(
            "Stored {} predictions for {} games across {} models on {}",
            summary.predictions_stored, summary.games, summary.models, date
        );

        if !failed.is_empty() {
            bail!("failed to store predictions for {} of {} games", failed.len(), summary.games);
        }
        if !inputs.incomplete.is_empty() {
            bail!(
                "upstream fetches failed for {} of {} games",
                inputs.incomplete.len(),
                summary.games
            );
        }
        Ok(summary)
    }

    pub fn prediction_records_for_date(&self, date: NaiveDate) -> Result<Vec<PredictionRecord>> {
        self.db
            .predictions_for_date(date)
            .with_context(|| format!("Failed to load predictions for {}", date))
    }

    async fn gather(&self, date: NaiveDate) -> Result<DateInputs> {
        let games = self
            .source
            .fetch_schedule(date)
            .await
            .with_context(|| format!("Failed to fetch schedule for {}", date))?;
        if games.is_empty() {
            info!("No NHL games on {}", date);
            return Ok(DateInputs::default());
        }

        let team_stats = self
            .source
            .fetch_team_stats(&games[0].season)
            .await
            .with_context(|| format!("Failed to fetch team stats for season {}", games[0].season))?;
        let rest_days = teams_rest(self.source.as_ref(), date, &games)
            .await
            .context("Failed to compute rest days")?;

        let pairs: Vec<[Team; 2]> = games
            .iter()
            .map(|g| [g.away_team.clone(), g.home_team.clone()])
            .collect();
        let fetched = join_all(
            games
                .iter()
                .zip(&pairs)
                .map(|(g, teams)| self.fetcher.fetch_game_players(g.game_id, teams)),
        )
        .await;

        let mut players = HashMap::new();
        let mut incomplete = HashSet::new();
        for (game, result) in games.iter().zip(fetched) {
            let (fetched_players, failures) = match result {
                Ok(fetch) => (fetch.players, fetch.failures),
                Err(e) => {
                    warn!("Skipping players for {}: {}", game.title, e);
                    (Vec::new(), e.failures)
                }
            };
            let malformed = failures.iter().filter(|f| f.error.is_decode()).count();
            if malformed > 0 {
                warn!("{}: {} malformed upstream responses", game.title, malformed);
            }
            if malformed < failures.len() {
                incomplete.insert(game.game_id);
            }
            players.insert(game.game_id, fetched_players);
        }

        info!(
            "Fetched {} games, {} teams with stats, {} players for {}",
            games.len(),
            team_stats.len(),
            players.values().map(Vec::len).sum::<usize>(),
            date
        );

        Ok(DateInputs {
            games,
            team_stats,
            rest_days,
            players,
            incomplete,
        })
    }

    fn annotate_past_accuracy(&self, games: &mut [GameWithPlayers]) {
        let ids: Vec<i64> = games
            .iter()
            .flat_map(|g| g.players.iter().map(|p| p.player_id))
            .collect();
        match self.db.past_accuracies(&ids) {
            Ok(accuracy) => {
                for player in games.iter_mut().flat_map(|g| g.players.iter_mut()) {
                    player.past_accuracy = accuracy.get(&player.player_id).copied();
                }
            }
            Err(e) => warn!("Past accuracy unavailable: {}", e),
        }
    }
}

fn run_models(
    inputs: &DateInputs,
    models: &[ModelVersion],
    date: NaiveDate,
) -> BTreeMap<i64, Vec<GameWithPlayers>> {
    if inputs.games.is_empty() {
        return BTreeMap::new();
    }
    models
        .iter()
        .map(|m| (m.id, predict_games(inputs, m, date)))
        .collect()
}

fn predict_games(inputs: &DateInputs, model: &ModelVersion, date: NaiveDate) -> Vec<GameWithPlayers> {
    inputs
        .games
        .iter()
        .map(|game| {
            let fetched = inputs
                .players
                .get(&game.game_id)
                .map(Vec::as_slice)
                .unwrap_or_default();
            let mut players =
                calculate_shooting_stats(fetched, &inputs.team_stats, &inputs.rest_days, model, date);
            players.retain(|p| game.involves(p.team_id));
            sort_by_confidence(&mut players);
            GameWithPlayers {
                game: game.clone(),
                players,
            }
        })
        .collect()
}
