pub mod client;
pub mod rest;
pub mod roster;
pub mod source;
pub mod types;

#[cfg(test)]
pub mod testing;

pub use client::NhlClient;
pub use roster::{FetchOptions, FetchPolicy, RosterFetcher};
pub use source::StatsSource;
pub use types::{Game, PlayerDetail, Team, TeamStats};
