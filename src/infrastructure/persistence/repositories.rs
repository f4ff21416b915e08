pub mod bar_repository;
pub mod model_repository;
pub mod prediction_repository;

pub use bar_repository::SqliteBarRepository;
pub use model_repository::SqliteModelRepository;
pub use prediction_repository::SqlitePredictionRepository;
