//! Parsing of serialized tokenizer descriptions.
//!
//! The format is the `tokenizer.json` layout written by HuggingFace
//! `tokenizers`, restricted to the components this crate implements. Parsing
//! only checks the shape of the document; [`Tokenizer::from_description`]
//! checks the vocabulary invariants and compiles regexes.
//!
//! [`Tokenizer::from_description`]: super::Tokenizer::from_description

use serde::Deserialize;
use std::collections::HashMap;
use thiserror::Error;

use super::added_vocab::AddedToken;
use super::decoder::Decoder;
use super::encoding::TruncationParams;
use super::normalizer::Normalizer;
use super::post_processor::PostProcessor;
use super::pre_tokenizer::PreTokenizerConfig;
use super::vocab::VocabError;

/// Everything that can be wrong with a description.
#[derive(Error, Debug)]
pub enum ParseError {
    #[error("invalid tokenizer description: {0}")]
    Json(#[from] serde_json::Error),
    #[error("invalid merge entry {0:?}: expected \"left right\" or [left, right]")]
    Merge(String),
    #[error("invalid vocabulary: {0}")]
    Vocab(#[from] VocabError),
    #[error("unknown token {0:?} is not in the vocabulary")]
    UnknownUnkToken(String),
    #[error("invalid post-processor: {0}")]
    PostProcessor(String),
    #[error("regex compilation error: {0}")]
    Regex(#[from] regexr::Error),
    #[error("added token matcher error: {0}")]
    AddedTokens(#[from] aho_corasick::BuildError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub enum ModelKind {
    #[serde(rename = "BPE")]
    Bpe,
    WordPiece,
    WordLevel,
}

/// A merge rule as serialized: `"a b"` in older files, `["a", "b"]` in newer ones.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum MergeEntry {
    Joined(String),
    Pair(String, String),
}

impl MergeEntry {
    pub fn into_pair(self) -> Result<(String, String), ParseError> {
        match self {
            MergeEntry::Pair(left, right) => Ok((left, right)),
            MergeEntry::Joined(joined) => match joined.split_once(' ') {
                Some((left, right)) if !left.is_empty() && !right.is_empty() => {
                    Ok((left.to_string(), right.to_string()))
                }
                _ => Err(ParseError::Merge(joined)),
            },
        }
    }
}

/// The `"model"` node.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct ModelConfig {
    #[serde(rename = "type")]
    pub kind: Option<ModelKind>,
    #[serde(default)]
    pub vocab: HashMap<String, u32>,
    pub merges: Option<Vec<MergeEntry>>,
    pub unk_token: Option<String>,
    pub continuing_subword_prefix: Option<String>,
    pub end_of_word_suffix: Option<String>,
    #[serde(default)]
    pub byte_fallback: bool,
    #[serde(default)]
    pub fuse_unk: bool,
    #[serde(default)]
    pub ignore_merges: bool,
    pub max_input_chars_per_word: Option<usize>,
}

impl ModelConfig {
    /// The declared model type, or the one implied by the fields present.
    pub fn resolved_kind(&self) -> ModelKind {
        match self.kind {
            Some(kind) => kind,
            None if self.merges.is_some() => ModelKind::Bpe,
            None if self.continuing_subword_prefix.is_some() => ModelKind::WordPiece,
            None => ModelKind::WordLevel,
        }
    }
}

/// A parsed, not yet compiled, tokenizer description.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct TokenizerDescription {
    #[serde(default)]
    pub truncation: Option<TruncationParams>,
    #[serde(default)]
    pub added_tokens: Vec<AddedToken>,
    #[serde(default)]
    pub normalizer: Option<Normalizer>,
    #[serde(default)]
    pub pre_tokenizer: Option<PreTokenizerConfig>,
    #[serde(default)]
    pub post_processor: Option<PostProcessor>,
    #[serde(default)]
    pub decoder: Option<Decoder>,
    pub model: ModelConfig,
}

/// Parse a description from raw bytes.
pub fn parse(bytes: &[u8]) -> Result<TokenizerDescription, ParseError> {
    Ok(serde_json::from_slice(bytes)?)
}
