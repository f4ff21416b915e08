use crate::application::ml::artifact::{ArtifactLoader, parse_artifact};
use crate::application::ml::predictor::ForecastModel;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, warn};

/// Loads JSON artifacts from the filesystem.
///
/// Relative locations resolve against `model_dir`; absolute ones are used as is.
pub struct FileArtifactLoader {
    model_dir: PathBuf,
}

impl FileArtifactLoader {
    pub fn new(model_dir: impl Into<PathBuf>) -> Self {
        Self {
            model_dir: model_dir.into(),
        }
    }

    pub fn resolve(&self, location: &str) -> PathBuf {
        let path = Path::new(location.strip_prefix("file://").unwrap_or(location));
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.model_dir.join(path)
        }
    }
}

impl ArtifactLoader for FileArtifactLoader {
    fn exists(&self, location: &str) -> bool {
        let path = self.resolve(location);
        let found = path.is_file();
        if !found {
            warn!("Artifact not found at {:?}", path);
        }
        found
    }

    fn load(&self, location: &str) -> Result<Arc<dyn ForecastModel>, String> {
        let path = self.resolve(location);
        let bytes =
            std::fs::read(&path).map_err(|e| format!("Failed to read {:?}: {}", path, e))?;
        debug!("Read {} byte artifact from {:?}", bytes.len(), path);
        parse_artifact(&bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_dir() -> PathBuf {
        let dir = std::env::temp_dir().join(format!("criptify-artifacts-{}", uuid::Uuid::new_v4()));
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[test]
    fn test_resolve_relative_and_absolute() {
        let loader = FileArtifactLoader::new("/srv/models");
        assert_eq!(loader.resolve("lr.json"), PathBuf::from("/srv/models/lr.json"));
        assert_eq!(loader.resolve("/tmp/x.json"), PathBuf::from("/tmp/x.json"));
        assert_eq!(loader.resolve("file:///tmp/y.json"), PathBuf::from("/tmp/y.json"));
    }

    #[test]
    fn test_load_from_disk() {
        let dir = temp_dir();
        let doc = serde_json::json!({
            "family": "linear",
            "target": "price",
            "heads": [{ "horizon": 3, "estimator": { "weights": [1.0], "intercept": 2.0 } }]
        });
        std::fs::write(dir.join("lr.json"), doc.to_string()).unwrap();

        let loader = FileArtifactLoader::new(&dir);
        assert!(loader.exists("lr.json"));
        assert!(!loader.exists("missing.json"));

        let model = loader.load("lr.json").unwrap();
        assert_eq!(model.predict(3, &[5.0]).unwrap(), 7.0);

        let err = loader.load("missing.json").err().unwrap();
        assert!(err.contains("Failed to read"));

        std::fs::remove_dir_all(dir).ok();
    }
}
