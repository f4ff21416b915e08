pub mod artifact_store;
pub mod persistence;
pub mod repositories;

pub use artifact_store::FileArtifactLoader;
pub use repositories::{InMemoryBarStore, InMemoryModelRepository, InMemoryPredictionRepository};
