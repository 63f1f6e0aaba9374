use thiserror::Error;

/// Failure of a single upstream NHL API call.
#[derive(Debug, Error)]
pub enum FetchError {
    /// Network failure, connection reset or per-request timeout.
    #[error("request to {url} failed: {source}")]
    Transport {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("{url} returned HTTP {status}")]
    Status { url: String, status: u16 },

    /// The body arrived but did not match the expected shape.
    #[error("failed to decode {what}: {source}")]
    Decode {
        what: String,
        #[source]
        source: serde_json::Error,
    },

    /// The task running the fetch panicked or was cancelled.
    #[error("fetch task aborted: {0}")]
    Aborted(String),
}

impl FetchError {
    pub fn is_decode(&self) -> bool {
        matches!(self, FetchError::Decode { .. })
    }
}

/// One failed roster or player lookup inside a game's fan-out.
#[derive(Debug)]
pub struct FetchFailure {
    /// "roster TOR" or "player 8478402"
    pub target: String,
    pub error: FetchError,
}

impl std::fmt::Display for FetchFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.target, self.error)
    }
}

/// Aggregate error returned by the fail-fast roster policy.
#[derive(Debug, Error)]
#[error("{} upstream fetch(es) failed for game {game_id}: {}", .failures.len(), summarize(.failures))]
pub struct RosterFetchError {
    pub game_id: i64,
    pub failures: Vec<FetchFailure>,
}

fn summarize(failures: &[FetchFailure]) -> String {
    failures
        .iter()
        .map(|f| f.to_string())
        .collect::<Vec<_>>()
        .join("; ")
}

/// Persistence failure in the prediction store.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("database connection lock poisoned")]
    LockPoisoned,
}
