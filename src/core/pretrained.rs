//! Pretrained tokenizer resolution.
//!
//! A pretrained model is addressed by name (`bert-base-uncased`,
//! `org/model`). Turning that name into the bytes of a tokenizer description
//! is the job of a [`ModelResolver`]; the crate itself never talks to the
//! network. Two resolvers ship with it:
//!
//! - [`CacheResolver`] reads `<cache_dir>/<name>/tokenizer.json` from a local
//!   cache populated by some other tool
//! - [`MemoryResolver`] serves descriptions registered in memory
//!
//! # Example
//!
//! ```rust,no_run
//! use tokenbind::core::{CacheResolver, Tokenizer};
//!
//! let resolver = CacheResolver::new("/var/cache/tokenizers");
//! let tokenizer = Tokenizer::from_pretrained_with("bert-base-uncased", &resolver).unwrap();
//! ```

use rustc_hash::FxHashMap;
use std::env;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// File name of a description inside a model's cache directory.
pub const TOKENIZER_FILE_NAME: &str = "tokenizer.json";

/// Environment variable overriding the cache directory.
pub const CACHE_DIR_ENV: &str = "TOKENIZERS_CACHE";

#[derive(Error, Debug)]
pub enum ResolveError {
    #[error("pretrained model {name:?} not found (looked for {})", path.display())]
    NotFound { name: String, path: PathBuf },
    #[error("invalid pretrained model name {0:?}")]
    InvalidName(String),
    #[error("network error: {0}")]
    Network(String),
    #[error("I/O error while resolving a pretrained model: {0}")]
    Io(#[from] std::io::Error),
}

/// Source of serialized tokenizer descriptions for named models.
pub trait ModelResolver: Send + Sync {
    fn resolve(&self, model_name: &str) -> Result<Vec<u8>, ResolveError>;
}

/// Check that `name` is `name` or `org/name`, each segment made of
/// `[A-Za-z0-9._-]` and neither `.` nor `..`.
pub fn validate_model_name(name: &str) -> Result<(), ResolveError> {
    let invalid = || ResolveError::InvalidName(name.to_string());
    let segments: Vec<&str> = name.split('/').collect();
    if segments.len() > 2 {
        return Err(invalid());
    }
    for segment in segments {
        let allowed = segment
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-'));
        if segment.is_empty() || !allowed || segment == "." || segment == ".." {
            return Err(invalid());
        }
    }
    Ok(())
}

/// Reads descriptions from a local directory tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheResolver {
    cache_dir: PathBuf,
}

impl CacheResolver {
    pub fn new(cache_dir: impl Into<PathBuf>) -> Self {
        Self {
            cache_dir: cache_dir.into(),
        }
    }

    pub fn cache_dir(&self) -> &Path {
        &self.cache_dir
    }

    /// Where the description of `model_name` is expected.
    pub fn model_path(&self, model_name: &str) -> PathBuf {
        self.cache_dir.join(model_name).join(TOKENIZER_FILE_NAME)
    }
}

impl ModelResolver for CacheResolver {
    fn resolve(&self, model_name: &str) -> Result<Vec<u8>, ResolveError> {
        validate_model_name(model_name)?;
        let path = self.model_path(model_name);
        match std::fs::read(&path) {
            Ok(bytes) => {
                log::debug!("resolved {model_name:?} from {}", path.display());
                Ok(bytes)
            }
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Err(ResolveError::NotFound {
                name: model_name.to_string(),
                path,
            }),
            Err(err) => Err(ResolveError::Io(err)),
        }
    }
}

/// Serves descriptions registered ahead of time.
#[derive(Debug, Clone, Default)]
pub struct MemoryResolver {
    models: FxHashMap<String, Vec<u8>>,
}

impl MemoryResolver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register (or replace) the description for `name`.
    pub fn insert(&mut self, name: impl Into<String>, description: impl Into<Vec<u8>>) {
        self.models.insert(name.into(), description.into());
    }

    pub fn with_model(mut self, name: impl Into<String>, description: impl Into<Vec<u8>>) -> Self {
        self.insert(name, description);
        self
    }
}

impl ModelResolver for MemoryResolver {
    fn resolve(&self, model_name: &str) -> Result<Vec<u8>, ResolveError> {
        validate_model_name(model_name)?;
        self.models
            .get(model_name)
            .cloned()
            .ok_or_else(|| ResolveError::NotFound {
                name: model_name.to_string(),
                path: PathBuf::from(model_name),
            })
    }
}

/// Where pretrained descriptions are looked up by default.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PretrainedConfig {
    pub cache_dir: PathBuf,
}

impl PretrainedConfig {
    /// `$TOKENIZERS_CACHE`, else `$XDG_CACHE_HOME/tokenizers`, else
    /// `$HOME/.cache/tokenizers`, else `.cache/tokenizers` in the working directory.
    pub fn from_env() -> Self {
        let var = |key: &str| env::var_os(key).filter(|v| !v.is_empty()).map(PathBuf::from);
        let cache_dir = var(CACHE_DIR_ENV)
            .or_else(|| var("XDG_CACHE_HOME").map(|p| p.join("tokenizers")))
            .or_else(|| var("HOME").map(|p| p.join(".cache").join("tokenizers")))
            .unwrap_or_else(|| PathBuf::from(".cache").join("tokenizers"));
        Self { cache_dir }
    }

    pub fn with_cache_dir(cache_dir: impl Into<PathBuf>) -> Self {
        Self {
            cache_dir: cache_dir.into(),
        }
    }

    pub fn resolver(&self) -> CacheResolver {
        CacheResolver::new(self.cache_dir.clone())
    }
}

impl Default for PretrainedConfig {
    fn default() -> Self {
        Self::from_env()
    }
}
