pub mod confidence;
pub mod params;
pub mod registry;
pub mod shooting;
pub mod strategy;

pub use params::ModelVersion;
pub use registry::ModelRegistry;
pub use shooting::{calculate_shooting_stats, GameWithPlayers, PlayerPrediction};
