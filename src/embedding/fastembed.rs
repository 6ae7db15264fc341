//! Local embedding through the fastembed library.
//!
//! The default model produces 768-dimensional vectors, the size the paper
//! index is built with. Model files are downloaded into the cache directory on
//! first use.
//!
//! Questions must be embedded by the same model that produced the stored
//! vectors. Two models of equal width pass every dimension check while their
//! vector spaces are unrelated, so pick the model with [`parse_model`] when
//! the data was built with something other than [`DEFAULT_MODEL`].

use super::{EmbeddingError, EmbeddingProvider, EmbeddingResult};
use async_trait::async_trait;
use fastembed::{EmbeddingModel, InitOptions, TextEmbedding};
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info};

/// Model used when none is specified.
pub const DEFAULT_MODEL: EmbeddingModel = EmbeddingModel::BGEBaseENV15;

/// Output width of a fastembed model, from the library's model table.
pub fn model_dimension(model: &EmbeddingModel) -> Option<usize> {
    TextEmbedding::list_supported_models()
        .into_iter()
        .find(|info| info.model == *model)
        .map(|info| info.dim)
}

/// Find a model by variant name (`BGEBaseENV15`) or by the repository code
/// fastembed downloads it from, ignoring case.
pub fn parse_model(name: &str) -> EmbeddingResult<EmbeddingModel> {
    let wanted = name.trim();
    TextEmbedding::list_supported_models()
        .into_iter()
        .find(|info| {
            info.model_code.eq_ignore_ascii_case(wanted)
                || format!("{:?}", info.model).eq_ignore_ascii_case(wanted)
        })
        .map(|info| info.model)
        .ok_or_else(|| EmbeddingError::ConfigError(format!("unknown embedding model {wanted:?}")))
}

/// Embedder backed by an in-process ONNX model.
///
/// Clones share the loaded model. Inference needs `&mut`, so calls are
/// serialized behind an async mutex.
#[derive(Clone)]
pub struct FastEmbedProvider {
    engine: Arc<Mutex<TextEmbedding>>,
    name: String,
    width: usize,
}

impl FastEmbedProvider {
    /// Load `model` (or [`DEFAULT_MODEL`]), caching files under `cache_dir`
    /// when given.
    ///
    /// # Errors
    /// `EmbeddingError::ConfigError` when the model cannot be fetched or loaded.
    pub fn new(model: Option<EmbeddingModel>, cache_dir: Option<PathBuf>) -> EmbeddingResult<Self> {
        let model = model.unwrap_or(DEFAULT_MODEL);
        let name = format!("{model:?}");
        let width = model_dimension(&model)
            .ok_or_else(|| EmbeddingError::ConfigError(format!("no dimension known for {name}")))?;

        let options = match cache_dir {
            Some(dir) => {
                debug!("fastembed cache: {}", dir.display());
                InitOptions::new(model).with_cache_dir(dir)
            }
            None => InitOptions::new(model),
        };
        let engine = TextEmbedding::try_new(options)
            .map_err(|e| EmbeddingError::ConfigError(format!("could not load {name}: {e}")))?;
        info!("Loaded embedding model {} ({} dims)", name, width);

        Ok(Self {
            engine: Arc::new(Mutex::new(engine)),
            name,
            width,
        })
    }

    /// Load the model called `name` (see [`parse_model`]), or the default
    /// when `None`.
    pub fn from_name(name: Option<&str>, cache_dir: Option<PathBuf>) -> EmbeddingResult<Self> {
        let model = name.map(parse_model).transpose()?;
        Self::new(model, cache_dir)
    }

    /// [`DEFAULT_MODEL`] with fastembed's own cache location.
    pub fn with_default_model() -> EmbeddingResult<Self> {
        Self::new(None, None)
    }

    async fn run(&self, texts: Vec<String>) -> EmbeddingResult<Vec<Vec<f32>>> {
        if texts.iter().any(|t| t.trim().is_empty()) {
            return Err(EmbeddingError::InvalidInput("text is empty".to_string()));
        }
        let count = texts.len();
        let vectors = self
            .engine
            .lock()
            .await
            .embed(texts, None)
            .map_err(|e| EmbeddingError::Other(format!("inference failed: {e}")))?;
        if vectors.len() != count {
            return Err(EmbeddingError::Other(format!(
                "expected {count} vectors, model returned {}",
                vectors.len()
            )));
        }
        Ok(vectors)
    }
}

#[async_trait]
impl EmbeddingProvider for FastEmbedProvider {
    async fn embed(&self, text: &str) -> EmbeddingResult<Vec<f32>> {
        let mut vectors = self.run(vec![text.to_owned()]).await?;
        vectors
            .pop()
            .ok_or_else(|| EmbeddingError::Other("model returned no vector".to_string()))
    }

    async fn embed_batch(&self, texts: &[&str]) -> EmbeddingResult<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        self.run(texts.iter().map(|t| (*t).to_owned()).collect()).await
    }

    fn dimension(&self) -> usize {
        self.width
    }

    fn model_name(&self) -> &str {
        &self.name
    }
}

impl fmt::Debug for FastEmbedProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FastEmbedProvider")
            .field("model", &self.name)
            .field("dimension", &self.width)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_model_matches_index_dimension() {
        assert_eq!(model_dimension(&DEFAULT_MODEL), Some(crate::DEFAULT_EMBEDDING_DIMENSION));
        assert_eq!(model_dimension(&EmbeddingModel::AllMiniLML6V2), Some(384));
        assert_eq!(model_dimension(&EmbeddingModel::BGELargeENV15), Some(1024));
    }

    #[test]
    fn test_every_listed_model_has_its_own_dimension() {
        for info in TextEmbedding::list_supported_models() {
            assert_eq!(model_dimension(&info.model), Some(info.dim));
        }
    }

    #[test]
    fn test_parse_model_by_variant_or_code() {
        assert_eq!(parse_model("BGEBaseENV15").unwrap(), EmbeddingModel::BGEBaseENV15);
        assert_eq!(parse_model(" bgebaseenv15 ").unwrap(), EmbeddingModel::BGEBaseENV15);
        for info in TextEmbedding::list_supported_models() {
            assert!(parse_model(&info.model_code).is_ok(), "{}", info.model_code);
        }
        assert!(matches!(
            parse_model("word2vec"),
            Err(EmbeddingError::ConfigError(_))
        ));
    }

    #[tokio::test]
    #[ignore = "downloads the embedding model"]
    async fn test_question_embedding_has_model_width() {
        let provider = FastEmbedProvider::with_default_model().unwrap();
        let vector = provider
            .embed("Which methods estimate the Hubble constant?")
            .await
            .unwrap();

        assert_eq!(vector.len(), provider.dimension());
        assert!(vector.iter().all(|x| x.is_finite()));
    }

    #[tokio::test]
    #[ignore = "downloads the embedding model"]
    async fn test_blank_question_rejected() {
        let provider = FastEmbedProvider::with_default_model().unwrap();
        assert!(matches!(
            provider.embed("   \n\t ").await,
            Err(EmbeddingError::InvalidInput(_))
        ));
    }

    #[tokio::test]
    #[ignore = "downloads the embedding model"]
    async fn test_batch_matches_single() {
        let provider = FastEmbedProvider::with_default_model().unwrap();
        let text = "Spectral graph theory";

        let single = provider.embed(text).await.unwrap();
        let batch = provider.embed_batch(&[text, "dark matter halos"]).await.unwrap();
        assert_eq!(batch.len(), 2);
        assert_eq!(single, batch[0]);
    }
}
