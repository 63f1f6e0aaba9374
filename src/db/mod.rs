use chrono::{NaiveDate, Utc};
use rusqlite::{params, params_from_iter, Connection, OptionalExtension};
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::debug;

use crate::error::StoreError;
use crate::model::GameWithPlayers;
use crate::nhl::types::{Game, GameStatus};

pub mod models;
use models::*;

pub type Result<T> = std::result::Result<T, StoreError>;

/// Thread-safe SQLite connection pool (single connection with mutex)
#[derive(Clone)]
pub struct Database {
    conn: Arc<Mutex<Connection>>,
}

impl Database {
    /// Open (or create) the SQLite database at the given path
    pub fn open(path: &str) -> Result<Self> {
        let conn = Connection::open(path)?;
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA foreign_keys=ON;")?;
        let db = Database {
            conn: Arc::new(Mutex::new(conn)),
        };
        db.run_migrations()?;
        Ok(db)
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(|_| StoreError::LockPoisoned)
    }

    #[cfg(test)]
    pub(crate) fn execute_batch(&self, sql: &str) -> Result<()> {
        self.conn()?.execute_batch(sql)?;
        Ok(())
    }

    /// Run schema migrations (idempotent)
    fn run_migrations(&self) -> Result<()> {
        self.conn()?.execute_batch(SCHEMA_SQL)?;
        Ok(())
    }

    // ── Games ─────────────────────────────────────────────────────────────────

    /// Upsert a scheduled game. A final status and the processed flag are never
    /// walked back.
    pub fn insert_game(&self, game: &Game) -> Result<()> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO games (game_id, game_date, title, away_team_id, away_team_abbrev,
                                home_team_id, home_team_abbrev, season, start_time_utc, status,
                                processed, updated_at)
             VALUES (?1,?2,?3,?4,?5,?6,?7,?8,?9,?10,0,?11)
             ON CONFLICT(game_id) DO UPDATE SET
                game_date=excluded.game_date,
                title=excluded.title,
                start_time_utc=excluded.start_time_utc,
                status=CASE WHEN games.status='final' THEN games.status ELSE excluded.status END,
                updated_at=excluded.updated_at",
            params![
                game.game_id,
                game.date,
                game.title,
                game.away_team.id,
                game.away_team.abbrev,
                game.home_team.id,
                game.home_team.abbrev,
                game.season,
                game.start_time_utc,
                game.status.as_str(),
                Utc::now(),
            ],
        )?;
        Ok(())
    }

    pub fn mark_game_processed(&self, game_id: i64) -> Result<()> {
        let conn = self.conn()?;
        conn.execute(
            "UPDATE games SET processed=1, updated_at=?1 WHERE game_id=?2",
            params![Utc::now(), game_id],
        )?;
        Ok(())
    }

    pub fn set_game_status(&self, game_id: i64, status: GameStatus) -> Result<()> {
        let conn = self.conn()?;
        conn.execute(
            "UPDATE games SET status=?1, updated_at=?2 WHERE game_id=?3",
            params![status.as_str(), Utc::now(), game_id],
        )?;
        Ok(())
    }

    pub fn get_game(&self, game_id: i64) -> Result<Option<GameRecord>> {
        let conn = self.conn()?;
        let game = conn
            .query_row(
                "SELECT game_id, game_date, title, away_team_id, away_team_abbrev,
                        home_team_id, home_team_abbrev, season, start_time_utc, status, processed
                 FROM games WHERE game_id=?1",
                params![game_id],
                map_game,
            )
            .optional()?;
        Ok(game)
    }

    // ── Predictions ───────────────────────────────────────────────────────────

    /// Upsert every player's prediction for one game in a single transaction.
    /// `game.players` may span model versions; a failed row rolls back all of them.
    /// Rows are keyed by (game_id, player_id, model_version_id); `created_at`
    /// keeps the first write.
    pub fn store_game_predictions(&self, game: &GameWithPlayers) -> Result<usize> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        let now = Utc::now();
        let g = &game.game;
        {
            let mut stmt = tx.prepare(
                "INSERT INTO game_predictions (
                    game_date, game_id, game_title, away_team_abbrev, away_team_id,
                    home_team_abbrev, home_team_id, player_id, player_name,
                    player_team_abbrev, player_team_id, predicted_shots, confidence,
                    created_at, model_version_id
                 ) VALUES (?1,?2,?3,?4,?5,?6,?7,?8,?9,?10,?11,?12,?13,?14,?15)
                 ON CONFLICT(game_id, player_id, model_version_id) DO UPDATE SET
                    game_date=excluded.game_date,
                    game_title=excluded.game_title,
                    player_name=excluded.player_name,
                    player_team_abbrev=excluded.player_team_abbrev,
                    player_team_id=excluded.player_team_id,
                    predicted_shots=excluded.predicted_shots,
                    confidence=excluded.confidence,
                    successful=CASE
                        WHEN game_predictions.actual_shots IS NULL THEN NULL
                        ELSE game_predictions.actual_shots >= excluded.predicted_shots
                    END",
            )?;
            for p in &game.players {
                stmt.execute(params![
                    g.date,
                    g.game_id,
                    g.title,
                    g.away_team.abbrev,
                    g.away_team.id,
                    g.home_team.abbrev,
                    g.home_team.id,
                    p.player_id,
                    p.name,
                    p.team_abbrev,
                    p.team_id,
                    p.predicted_shots,
                    p.confidence,
                    now,
                    p.model_version_id,
                ])?;
            }
        }
        tx.commit()?;
        debug!("Stored {} predictions for game {}", game.players.len(), g.game_id);
        Ok(game.players.len())
    }

    /// Record the actual shots for one prediction. Returns false when the row
    /// was already validated.
    pub fn store_actual_shots(&self, record: &PredictionRecord, actual_shots: i32) -> Result<bool> {
        let conn = self.conn()?;
        let changed = conn.execute(
            "UPDATE game_predictions
             SET actual_shots=?1, successful=(?1 >= predicted_shots), validated_at=?2
             WHERE id=?3 AND actual_shots IS NULL",
            params![actual_shots, Utc::now(), record.id],
        )?;
        Ok(changed == 1)
    }

    /// Unvalidated predictions with `since <= game_date < before`.
    pub fn pending_validation(
        &self,
        since: NaiveDate,
        before: NaiveDate,
    ) -> Result<Vec<PredictionRecord>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {PREDICTION_COLUMNS} FROM game_predictions
             WHERE actual_shots IS NULL AND game_date >= ?1 AND game_date < ?2
             ORDER BY game_id, player_id"
        ))?;
        let records = stmt
            .query_map(params![since, before], map_prediction)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(records)
    }

    pub fn predictions_for_date(&self, date: NaiveDate) -> Result<Vec<PredictionRecord>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {PREDICTION_COLUMNS} FROM game_predictions
             WHERE game_date=?1
             ORDER BY game_id, model_version_id, confidence DESC"
        ))?;
        let records = stmt
            .query_map(params![date], map_prediction)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(records)
    }

    // ── Accuracy ──────────────────────────────────────────────────────────────

    /// Share of validated predictions that succeeded; 0.0 when none are validated.
    pub fn total_accuracy(&self) -> Result<f64> {
        let conn = self.conn()?;
        let accuracy = conn.query_row(
            "SELECT COALESCE(AVG(CAST(successful AS REAL)), 0.0)
             FROM game_predictions WHERE successful IS NOT NULL",
            [],
            |r| r.get(0),
        )?;
        Ok(accuracy)
    }

    pub fn player_past_accuracy(&self, player_id: i64) -> Result<f64> {
        let conn = self.conn()?;
        let accuracy = conn.query_row(
            "SELECT COALESCE(AVG(CAST(successful AS REAL)), 0.0)
             FROM game_predictions WHERE successful IS NOT NULL AND player_id=?1",
            params![player_id],
            |r| r.get(0),
        )?;
        Ok(accuracy)
    }

    /// Past accuracy for each of `player_ids` that has at least one validated
    /// prediction. Players without history are absent from the map.
    pub fn past_accuracies(&self, player_ids: &[i64]) -> Result<HashMap<i64, f64>> {
        if player_ids.is_empty() {
            return Ok(HashMap::new());
        }
        let conn = self.conn()?;
        let placeholders = vec!["?"; player_ids.len()].join(",");
        let mut stmt = conn.prepare(&format!(
            "SELECT player_id, AVG(CAST(successful AS REAL))
             FROM game_predictions
             WHERE successful IS NOT NULL AND player_id IN ({placeholders})
             GROUP BY player_id"
        ))?;
        let rows = stmt
            .query_map(params_from_iter(player_ids.iter()), |r| {
                Ok((r.get::<_, i64>(0)?, r.get::<_, f64>(1)?))
            })?
            .collect::<rusqlite::Result<HashMap<_, _>>>()?;
        Ok(rows)
    }

    pub fn model_accuracy(&self, model_version_id: i64) -> Result<f64> {
        let conn = self.conn()?;
        let accuracy = conn.query_row(
            "SELECT COALESCE(AVG(CAST(successful AS REAL)), 0.0)
             FROM game_predictions WHERE successful IS NOT NULL AND model_version_id=?1",
            params![model_version_id],
            |r| r.get(0),
        )?;
        Ok(accuracy)
    }

    /// Side-by-side accuracy for every model with validated predictions.
    pub fn model_comparison_stats(&self) -> Result<BTreeMap<i64, ModelAccuracyStats>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT model_version_id,
                    COUNT(*),
                    COALESCE(SUM(successful), 0),
                    COALESCE(AVG(CAST(successful AS REAL)), 0.0),
                    COALESCE(AVG(ABS(actual_shots - predicted_shots)), 0.0)
             FROM game_predictions
             WHERE actual_shots IS NOT NULL
             GROUP BY model_version_id",
        )?;
        let stats = stmt
            .query_map([], |r| {
                Ok((
                    r.get::<_, i64>(0)?,
                    ModelAccuracyStats {
                        total: r.get(1)?,
                        successful: r.get(2)?,
                        accuracy: r.get(3)?,
                        avg_absolute_error: r.get(4)?,
                    },
                ))
            })?
            .collect::<rusqlite::Result<BTreeMap<_, _>>>()?;
        Ok(stats)
    }
}

// ── SQL helpers ────────────────────────────────────────────────────────────────

const PREDICTION_COLUMNS: &str = "id, game_date, game_id, game_title, away_team_abbrev, away_team_id,
    home_team_abbrev, home_team_id, player_id, player_name, player_team_abbrev, player_team_id,
    predicted_shots, confidence, actual_shots, successful, created_at, validated_at,
    model_version_id";

fn map_prediction(row: &rusqlite::Row) -> rusqlite::Result<PredictionRecord> {
    Ok(PredictionRecord {
        id: row.get(0)?,
        game_date: row.get(1)?,
        game_id: row.get(2)?,
        game_title: row.get(3)?,
        away_team_abbrev: row.get(4)?,
        away_team_id: row.get(5)?,
        home_team_abbrev: row.get(6)?,
        home_team_id: row.get(7)?,
        player_id: row.get(8)?,
        player_name: row.get(9)?,
        player_team_abbrev: row.get(10)?,
        player_team_id: row.get(11)?,
        predicted_shots: row.get(12)?,
        confidence: row.get(13)?,
        actual_shots: row.get(14)?,
        successful: row.get(15)?,
        created_at: row.get(16)?,
        validated_at: row.get(17)?,
        model_version_id: row.get(18)?,
    })
}

fn map_game(row: &rusqlite::Row) -> rusqlite::Result<GameRecord> {
    Ok(GameRecord {
        game_id: row.get(0)?,
        game_date: row.get(1)?,
        title: row.get(2)?,
        away_team_id: row.get(3)?,
        away_team_abbrev: row.get(4)?,
        home_team_id: row.get(5)?,
        home_team_abbrev: row.get(6)?,
        season: row.get(7)?,
        start_time_utc: row.get(8)?,
        status: row.get(9)?,
        processed: row.get(10)?,
    })
}

/// SQLite schema (idempotent CREATE IF NOT EXISTS)
pub const SCHEMA_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS games (
    game_id          INTEGER PRIMARY KEY,
    game_date        TEXT    NOT NULL,
    title            TEXT    NOT NULL,
    away_team_id     INTEGER NOT NULL,
    away_team_abbrev TEXT    NOT NULL,
    home_team_id     INTEGER NOT NULL,
    home_team_abbrev TEXT    NOT NULL,
    season           TEXT    NOT NULL,
    start_time_utc   TEXT    NOT NULL,
    status           TEXT    NOT NULL DEFAULT 'scheduled',
    processed        INTEGER NOT NULL DEFAULT 0,
    updated_at       TEXT    NOT NULL
);

CREATE TABLE IF NOT EXISTS game_predictions (
    id                 INTEGER PRIMARY KEY AUTOINCREMENT,
    game_date          TEXT    NOT NULL,
    game_id            INTEGER NOT NULL,
    game_title         TEXT    NOT NULL,
    away_team_abbrev   TEXT    NOT NULL,
    away_team_id       INTEGER NOT NULL,
    home_team_abbrev   TEXT    NOT NULL,
    home_team_id       INTEGER NOT NULL,
    player_id          INTEGER NOT NULL,
    player_name        TEXT    NOT NULL,
    player_team_abbrev TEXT    NOT NULL,
    player_team_id     INTEGER NOT NULL,
    predicted_shots    REAL    NOT NULL,
    confidence         REAL    NOT NULL,
    actual_shots       INTEGER,
    successful         INTEGER,
    created_at         TEXT    NOT NULL,
    validated_at       TEXT,
    model_version_id   INTEGER NOT NULL DEFAULT 1,
    UNIQUE (game_id, player_id, model_version_id)
);

CREATE INDEX IF NOT EXISTS idx_predictions_game ON game_predictions(game_id);
CREATE INDEX IF NOT EXISTS idx_predictions_date ON game_predictions(game_date);
CREATE INDEX IF NOT EXISTS idx_predictions_player ON game_predictions(player_id);
CREATE INDEX IF NOT EXISTS idx_games_date ON games(game_date);
"#;
