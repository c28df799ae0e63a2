//! On-disk copy of the sentence encoder used for event descriptions.
//!
//! Files live in `<root>/<repo with '/' replaced by '_'>/`, where `root` is
//! `embedding.model_cache_dir` when configured and the platform cache
//! directory otherwise. A zero-length file counts as missing. Downloads are
//! written to `<name>.part` and renamed into place, so an interrupted fetch
//! is repeated on the next start instead of being loaded half-written.

use std::fs;
use std::path::{Path, PathBuf};

use disaster_types::EmbeddingSettings;
use tracing::{debug, info, warn};

use crate::error::EmbeddingError;

/// HuggingFace repository of the description encoder.
pub const MODEL_REPO: &str = "sentence-transformers/all-MiniLM-L6-v2";

/// One of the three files the encoder is loaded from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModelFile {
    Config,
    Tokenizer,
    Weights,
}

impl ModelFile {
    pub const ALL: [ModelFile; 3] = [ModelFile::Config, ModelFile::Tokenizer, ModelFile::Weights];

    pub fn file_name(self) -> &'static str {
        match self {
            ModelFile::Config => "config.json",
            ModelFile::Tokenizer => "tokenizer.json",
            ModelFile::Weights => "model.safetensors",
        }
    }
}

/// Resolved locations of a complete local model.
#[derive(Debug, Clone)]
pub struct ModelPaths {
    pub config: PathBuf,
    pub tokenizer: PathBuf,
    pub weights: PathBuf,
}

/// Directory holding one repository's model files.
#[derive(Debug, Clone, PartialEq)]
pub struct ModelDir {
    root: PathBuf,
    repo: String,
}

impl ModelDir {
    /// Directory for [`MODEL_REPO`] under the configured cache root.
    pub fn from_settings(settings: &EmbeddingSettings) -> Self {
        let root = match settings.model_cache_dir.as_deref() {
            Some(dir) => expand_home(dir),
            None => dirs::cache_dir()
                .unwrap_or_else(|| PathBuf::from(".cache"))
                .join("disaster-watch")
                .join("models"),
        };
        Self::at(root, MODEL_REPO)
    }

    pub fn at(root: impl Into<PathBuf>, repo: impl Into<String>) -> Self {
        Self {
            root: root.into(),
            repo: repo.into(),
        }
    }

    pub fn path(&self) -> PathBuf {
        self.root.join(self.repo.replace('/', "_"))
    }

    pub fn file(&self, file: ModelFile) -> PathBuf {
        self.path().join(file.file_name())
    }

    /// Files absent or empty on disk.
    pub fn missing(&self) -> Vec<ModelFile> {
        ModelFile::ALL
            .into_iter()
            .filter(|f| {
                fs::metadata(self.file(*f))
                    .map(|m| m.len() == 0)
                    .unwrap_or(true)
            })
            .collect()
    }

    /// Fetch missing files, then check the encoder emits `dimension` values.
    pub fn ensure(&self, dimension: usize) -> Result<ModelPaths, EmbeddingError> {
        let missing = self.missing();
        if missing.is_empty() {
            debug!(path = ?self.path(), "Model files present");
        } else {
            info!(repo = %self.repo, dir = ?self.path(), files = missing.len(), "Fetching model files");
            self.fetch(&missing)?;
        }

        let paths = ModelPaths {
            config: self.file(ModelFile::Config),
            tokenizer: self.file(ModelFile::Tokenizer),
            weights: self.file(ModelFile::Weights),
        };
        check_hidden_size(&paths.config, dimension)?;
        Ok(paths)
    }

    fn fetch(&self, files: &[ModelFile]) -> Result<(), EmbeddingError> {
        use hf_hub::api::sync::Api;

        let api = Api::new().map_err(|e| EmbeddingError::Download(e.to_string()))?;
        let repo = api.model(self.repo.clone());
        fs::create_dir_all(self.path())?;

        for file in files {
            let name = file.file_name();
            let fetched = repo
                .get(name)
                .map_err(|e| EmbeddingError::Download(format!("{}: {}", name, e)))?;

            let dest = self.file(*file);
            let partial = dest.with_extension("part");
            if let Err(e) = fs::copy(&fetched, &partial).and_then(|_| fs::rename(&partial, &dest)) {
                warn!(file = name, error = %e, "Could not store model file");
                let _ = fs::remove_file(&partial);
                return Err(e.into());
            }
            debug!(file = name, dest = ?dest, "Stored model file");
        }
        Ok(())
    }
}

/// The encoder's `hidden_size` must equal the store's embedding dimension.
fn check_hidden_size(config: &Path, dimension: usize) -> Result<(), EmbeddingError> {
    let text = fs::read_to_string(config)?;
    let value: serde_json::Value = serde_json::from_str(&text)
        .map_err(|e| EmbeddingError::ModelNotFound(format!("invalid config.json: {}", e)))?;
    let hidden = value
        .get("hidden_size")
        .and_then(serde_json::Value::as_u64)
        .ok_or_else(|| EmbeddingError::ModelNotFound("config.json has no hidden_size".into()))?;

    if hidden as usize != dimension {
        return Err(EmbeddingError::DimensionMismatch {
            expected: dimension,
            actual: hidden as usize,
        });
    }
    Ok(())
}

fn expand_home(dir: &str) -> PathBuf {
    match dir.strip_prefix("~/") {
        Some(rest) => dirs::home_dir()
            .map(|home| home.join(rest))
            .unwrap_or_else(|| PathBuf::from(dir)),
        None => PathBuf::from(dir),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn write_model(dir: &ModelDir, hidden_size: usize) {
        fs::create_dir_all(dir.path()).unwrap();
        fs::write(
            dir.file(ModelFile::Config),
            format!(r#"{{"hidden_size": {}}}"#, hidden_size),
        )
        .unwrap();
        fs::write(dir.file(ModelFile::Tokenizer), "{}").unwrap();
        fs::write(dir.file(ModelFile::Weights), b"weights").unwrap();
    }

    #[test]
    fn test_settings_choose_root() {
        let temp = TempDir::new().unwrap();
        let settings = EmbeddingSettings {
            model_cache_dir: Some(temp.path().to_string_lossy().into_owned()),
            ..Default::default()
        };
        let dir = ModelDir::from_settings(&settings);
        assert_eq!(dir.path(), temp.path().join("sentence-transformers_all-MiniLM-L6-v2"));

        let default = ModelDir::from_settings(&EmbeddingSettings::default());
        assert!(default.path().to_string_lossy().contains("disaster-watch"));
    }

    #[test]
    fn test_empty_files_count_as_missing() {
        let temp = TempDir::new().unwrap();
        let dir = ModelDir::at(temp.path(), "test/encoder");
        assert_eq!(dir.missing(), ModelFile::ALL.to_vec());

        write_model(&dir, 384);
        fs::write(dir.file(ModelFile::Weights), b"").unwrap();
        assert_eq!(dir.missing(), vec![ModelFile::Weights]);
    }

    #[test]
    fn test_ensure_uses_local_files() {
        let temp = TempDir::new().unwrap();
        let dir = ModelDir::at(temp.path(), "test/encoder");
        write_model(&dir, 384);

        let paths = dir.ensure(384).unwrap();
        assert_eq!(paths.weights, dir.path().join("model.safetensors"));
    }

    #[test]
    fn test_ensure_rejects_other_width() {
        let temp = TempDir::new().unwrap();
        let dir = ModelDir::at(temp.path(), "test/encoder");
        write_model(&dir, 768);

        assert!(matches!(
            dir.ensure(384),
            Err(EmbeddingError::DimensionMismatch {
                expected: 384,
                actual: 768
            })
        ));
    }

    #[test]
    fn test_expand_home() {
        assert_eq!(expand_home("/srv/models"), PathBuf::from("/srv/models"));
        assert!(expand_home("~/models").ends_with("models"));
    }
}
