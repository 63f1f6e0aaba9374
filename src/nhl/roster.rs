//! Concurrent roster → player-detail fan-out for one game.
//!
//! ```text
//!  fetch_game_players ──spawn──▶ team task (away) ──spawn──▶ player task × N
//!          │                    team task (home) ──spawn──▶ player task × N
//!          │                                                   │
//!          ◀───────────── mpsc<FetchEvent> (bounded) ──────────┘
//! ```
//!
//! Every upstream call first takes a permit from a semaphore shared by all
//! games, which caps concurrent requests against the NHL API. Producers await
//! channel capacity while the caller drains concurrently, so results are never
//! dropped. The channel closes once every producer is done, which means the
//! caller sees every failure before applying the [`FetchPolicy`].

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::{mpsc, Semaphore};
use tokio::task::JoinSet;
use tracing::{debug, error, warn};

use super::source::StatsSource;
use super::types::{PlayerDetail, Team};
use crate::error::{FetchError, FetchFailure, RosterFetchError};

/// What to do when some roster or player lookups fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum FetchPolicy {
    /// Any failure fails the whole game.
    FailFast,
    /// Return whatever was fetched together with the failure list.
    BestEffort,
}

#[derive(Debug, Clone)]
pub struct FetchOptions {
    pub policy: FetchPolicy,
    /// Upper bound on in-flight upstream requests across all games
    pub max_concurrent: usize,
    /// Result channel capacity per game (sized for a typical roster)
    pub channel_capacity: usize,
}

impl Default for FetchOptions {
    fn default() -> Self {
        FetchOptions {
            policy: FetchPolicy::BestEffort,
            max_concurrent: 16,
            channel_capacity: 50,
        }
    }
}

/// Players fetched for one game, plus anything that could not be fetched.
#[derive(Debug, Default)]
pub struct PlayerFetch {
    pub players: Vec<PlayerDetail>,
    /// Always empty under `FetchPolicy::FailFast`
    pub failures: Vec<FetchFailure>,
}

enum FetchEvent {
    Player(PlayerDetail),
    Failed(FetchFailure),
}

#[derive(Clone)]
pub struct RosterFetcher {
    source: Arc<dyn StatsSource>,
    permits: Arc<Semaphore>,
    policy: FetchPolicy,
    channel_capacity: usize,
}

impl RosterFetcher {
    pub fn new(source: Arc<dyn StatsSource>, options: &FetchOptions) -> Self {
        RosterFetcher {
            source,
            permits: Arc::new(Semaphore::new(options.max_concurrent.max(1))),
            policy: options.policy,
            channel_capacity: options.channel_capacity.max(1),
        }
    }

    pub fn policy(&self) -> FetchPolicy {
        self.policy
    }

    /// Fetch both rosters of a game and every skater's detail record.
    ///
    /// `teams` is `[away, home]`. Each player comes back tagged with the opposing
    /// team and whether they play at home. Result order is unspecified.
    pub async fn fetch_game_players(
        &self,
        game_id: i64,
        teams: &[Team; 2],
    ) -> Result<PlayerFetch, RosterFetchError> {
        let (tx, mut rx) = mpsc::channel::<FetchEvent>(self.channel_capacity);

        let mut team_tasks = JoinSet::new();
        for team in teams.iter() {
            let opponent = if team.id == teams[0].id {
                teams[1].clone()
            } else {
                teams[0].clone()
            };
            let is_home = team.id == teams[1].id;
            team_tasks.spawn(fetch_team(
                Arc::clone(&self.source),
                Arc::clone(&self.permits),
                tx.clone(),
                team.clone(),
                opponent,
                is_home,
            ));
        }
        drop(tx);

        let mut fetch = PlayerFetch::default();
        while let Some(event) = rx.recv().await {
            match event {
                FetchEvent::Player(p) => fetch.players.push(p),
                FetchEvent::Failed(f) => fetch.failures.push(f),
            }
        }

        while let Some(joined) = team_tasks.join_next().await {
            if let Err(e) = joined {
                error!("Roster task for game {} aborted: {}", game_id, e);
                fetch.failures.push(FetchFailure {
                    target: "roster task".to_string(),
                    error: FetchError::Aborted(e.to_string()),
                });
            }
        }

        debug!(
            "Game {}: fetched {} players, {} failure(s)",
            game_id,
            fetch.players.len(),
            fetch.failures.len()
        );

        if fetch.failures.is_empty() {
            return Ok(fetch);
        }
        match self.policy {
            FetchPolicy::FailFast => Err(RosterFetchError {
                game_id,
                failures: fetch.failures,
            }),
            FetchPolicy::BestEffort => {
                for f in &fetch.failures {
                    warn!("Game {}: skipping {}", game_id, f);
                }
                Ok(fetch)
            }
        }
    }
}

async fn fetch_team(
    source: Arc<dyn StatsSource>,
    permits: Arc<Semaphore>,
    tx: mpsc::Sender<FetchEvent>,
    team: Team,
    opponent: Team,
    is_home: bool,
) {
    let roster = {
        let _permit = permits.clone().acquire_owned().await.ok();
        source.fetch_roster(&team.abbrev).await
    };
    let roster = match roster {
        Ok(r) => r,
        Err(error) => {
            let failure = FetchFailure {
                target: format!("roster {}", team.abbrev),
                error,
            };
            if tx.send(FetchEvent::Failed(failure)).await.is_err() {
                error!("Result channel closed before roster failure for {} was reported", team.abbrev);
            }
            return;
        }
    };

    let mut player_tasks = JoinSet::new();
    for skater in roster {
        let source = Arc::clone(&source);
        let permits = Arc::clone(&permits);
        let tx = tx.clone();
        let team = team.clone();
        let opponent = opponent.clone();
        player_tasks.spawn(async move {
            let result = {
                let _permit = permits.acquire_owned().await.ok();
                source.fetch_player_detail(skater.id).await
            };
            let event = match result {
                Ok(mut detail) => {
                    if detail.current_team_id == 0 {
                        detail.current_team_id = team.id;
                        detail.current_team_abbrev = team.abbrev.clone();
                    }
                    detail.opposing_team_id = opponent.id;
                    detail.opposing_team_abbrev = opponent.abbrev.clone();
                    detail.is_home = is_home;
                    FetchEvent::Player(detail)
                }
                Err(error) => FetchEvent::Failed(FetchFailure {
                    target: format!("player {}", skater.id),
                    error,
                }),
            };
            if tx.send(event).await.is_err() {
                error!("Result channel closed, player {} result lost", skater.id);
            }
        });
    }

    while let Some(joined) = player_tasks.join_next().await {
        if let Err(e) = joined {
            let failure = FetchFailure {
                target: format!("player task ({})", team.abbrev),
                error: FetchError::Aborted(e.to_string()),
            };
            let _ = tx.send(FetchEvent::Failed(failure)).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::nhl::testing::{date, player, team, FakeSource};
    use crate::nhl::types::{BoxScore, Game, PlayerRef, TeamStats};
    use async_trait::async_trait;
    use chrono::NaiveDate;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    fn two_team_source(per_team: i64) -> (FakeSource, [Team; 2]) {
        let away = team(10, "TOR");
        let home = team(6, "BOS");
        let mut source = FakeSource::new();
        let last = date(2025, 1, 9);
        for i in 0..per_team {
            source.add_player(player(1000 + i, &away, "C", &[3, 3, 3, 3, 3], 18.0, last));
            source.add_player(player(2000 + i, &home, "D", &[2, 2, 2, 2, 2], 21.0, last));
        }
        (source, [away, home])
    }

    fn options(policy: FetchPolicy) -> FetchOptions {
        FetchOptions {
            policy,
            ..FetchOptions::default()
        }
    }

    #[tokio::test]
    async fn test_fetches_both_rosters_and_tags_opponents() {
        let (source, teams) = two_team_source(20);
        let fetcher = RosterFetcher::new(Arc::new(source), &options(FetchPolicy::FailFast));

        let fetch = fetcher.fetch_game_players(1, &teams).await.unwrap();
        assert_eq!(fetch.players.len(), 40);
        assert!(fetch.failures.is_empty());

        for p in &fetch.players {
            if p.current_team_id == 10 {
                assert_eq!(p.opposing_team_id, 6);
                assert_eq!(p.opposing_team_abbrev, "BOS");
                assert!(!p.is_home);
            } else {
                assert_eq!(p.current_team_id, 6);
                assert_eq!(p.opposing_team_id, 10);
                assert!(p.is_home);
            }
        }
    }

    #[tokio::test]
    async fn test_fail_fast_rejects_game_when_one_roster_fails() {
        let (mut source, teams) = two_team_source(20);
        source.failing_rosters.insert("BOS".to_string());
        let fetcher = RosterFetcher::new(Arc::new(source), &options(FetchPolicy::FailFast));

        let err = fetcher.fetch_game_players(7, &teams).await.unwrap_err();
        assert_eq!(err.game_id, 7);
        assert_eq!(err.failures.len(), 1);
        assert_eq!(err.failures[0].target, "roster BOS");
    }

    #[tokio::test]
    async fn test_best_effort_returns_other_team_with_failure_list() {
        let (mut source, teams) = two_team_source(20);
        source.failing_rosters.insert("BOS".to_string());
        let fetcher = RosterFetcher::new(Arc::new(source), &options(FetchPolicy::BestEffort));

        let fetch = fetcher.fetch_game_players(7, &teams).await.unwrap();
        assert_eq!(fetch.players.len(), 20);
        assert!(fetch.players.iter().all(|p| p.current_team_id == 10));
        assert_eq!(fetch.failures.len(), 1);
        assert_eq!(fetch.failures[0].target, "roster BOS");
    }

    #[tokio::test]
    async fn test_every_player_failure_is_collected() {
        let (mut source, teams) = two_team_source(20);
        source.failing_players.extend([1003, 1007, 2011]);
        let source = Arc::new(source);

        let best = RosterFetcher::new(source.clone(), &options(FetchPolicy::BestEffort));
        let fetch = best.fetch_game_players(1, &teams).await.unwrap();
        assert_eq!(fetch.players.len(), 37);
        let mut targets: Vec<_> = fetch.failures.iter().map(|f| f.target.clone()).collect();
        targets.sort();
        assert_eq!(targets, vec!["player 1003", "player 1007", "player 2011"]);

        let strict = RosterFetcher::new(source, &options(FetchPolicy::FailFast));
        let err = strict.fetch_game_players(1, &teams).await.unwrap_err();
        assert_eq!(err.failures.len(), 3);
    }

    #[tokio::test]
    async fn test_small_channel_does_not_drop_results() {
        let (source, teams) = two_team_source(30);
        let opts = FetchOptions {
            policy: FetchPolicy::FailFast,
            max_concurrent: 64,
            channel_capacity: 1,
        };
        let fetcher = RosterFetcher::new(Arc::new(source), &opts);
        let fetch = fetcher.fetch_game_players(1, &teams).await.unwrap();
        assert_eq!(fetch.players.len(), 60);
    }

    /// Wraps the fake source and records peak concurrency of player lookups.
    struct PeakTracking {
        inner: FakeSource,
        in_flight: AtomicUsize,
        peak: AtomicUsize,
    }

    #[async_trait]
    impl StatsSource for PeakTracking {
        fn name(&self) -> &str {
            "peak-tracking"
        }

        async fn fetch_schedule(&self, d: NaiveDate) -> Result<Vec<Game>, FetchError> {
            self.inner.fetch_schedule(d).await
        }

        async fn fetch_schedule_week(&self, d: NaiveDate) -> Result<Vec<Game>, FetchError> {
            self.inner.fetch_schedule_week(d).await
        }

        async fn fetch_roster(&self, abbrev: &str) -> Result<Vec<PlayerRef>, FetchError> {
            self.inner.fetch_roster(abbrev).await
        }

        async fn fetch_player_detail(&self, id: i64) -> Result<PlayerDetail, FetchError> {
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(5)).await;
            self.in_flight.fetch_sub(1, Ordering::SeqCst);
            self.inner.fetch_player_detail(id).await
        }

        async fn fetch_team_stats(&self, season: &str) -> Result<Vec<TeamStats>, FetchError> {
            self.inner.fetch_team_stats(season).await
        }

        async fn fetch_box_score(&self, id: i64) -> Result<BoxScore, FetchError> {
            self.inner.fetch_box_score(id).await
        }
    }

    #[tokio::test]
    async fn test_semaphore_caps_in_flight_requests() {
        let (inner, teams) = two_team_source(12);
        let source = Arc::new(PeakTracking {
            inner,
            in_flight: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
        });
        let opts = FetchOptions {
            policy: FetchPolicy::FailFast,
            max_concurrent: 3,
            channel_capacity: 50,
        };
        let fetcher = RosterFetcher::new(source.clone(), &opts);
        let fetch = fetcher.fetch_game_players(1, &teams).await.unwrap();

        assert_eq!(fetch.players.len(), 24);
        let peak = source.peak.load(Ordering::SeqCst);
        assert!(peak <= 3, "peak in-flight was {}", peak);
        assert!(peak >= 1);
    }
}
