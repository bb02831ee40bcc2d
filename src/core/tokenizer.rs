use lru::LruCache;
use rayon::prelude::*;
use rustc_hash::{FxHashSet, FxHasher};
use std::hash::{Hash, Hasher};
use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use thiserror::Error;

use super::added_vocab::{AddedVocabulary, Segment};
use super::bpe::{Bpe, BpeOptions};
use super::decoder::Decoder;
use super::encoding::{EncodeOptions, Encoding, EncodingBuilder, TruncationParams};
use super::loader::{self, MergeEntry, ModelKind, ParseError, TokenizerDescription};
use super::model::{Model, Token, WordLevel};
use super::normalizer::{NormalizedString, Normalizer, Offsets};
use super::post_processor::PostProcessor;
use super::pre_tokenizer::PreTokenizer;
use super::pretrained::{ModelResolver, PretrainedConfig, ResolveError};
use super::vocab::Vocabulary;
use super::wordpiece::WordPiece;

#[derive(Error, Debug)]
pub enum TokenizerError {
    #[error("tokenizer file not found: {}", .0.display())]
    FileNotFound(PathBuf),
    #[error("failed to read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("parse error: {0}")]
    Parse(#[from] ParseError),
    #[error("resolution error: {0}")]
    Resolution(#[from] ResolveError),
    #[error("invalid input: {0}")]
    InvalidInput(String),
    #[error("tokenizer handle used after close")]
    UseAfterClose,
}

/// Coarse classification of a [`TokenizerError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// The file or pretrained model does not exist.
    NotFound,
    /// It exists but could not be read.
    Io,
    /// It was read but is not a valid description.
    Parse,
    /// A remote resolver could not be reached.
    Network,
    /// The caller passed a bad argument (model name, token id, bytes).
    InvalidInput,
    /// The handle was already closed.
    Closed,
}

impl TokenizerError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            TokenizerError::FileNotFound(_) => ErrorKind::NotFound,
            TokenizerError::Io { .. } => ErrorKind::Io,
            TokenizerError::Parse(_) => ErrorKind::Parse,
            TokenizerError::Resolution(err) => match err {
                ResolveError::NotFound { .. } => ErrorKind::NotFound,
                ResolveError::InvalidName(_) => ErrorKind::InvalidInput,
                ResolveError::Network(_) => ErrorKind::Network,
                ResolveError::Io(_) => ErrorKind::Io,
            },
            TokenizerError::InvalidInput(_) => ErrorKind::InvalidInput,
            TokenizerError::UseAfterClose => ErrorKind::Closed,
        }
    }
}

/// Default number of pieces kept in the tokenization cache.
const DEFAULT_CACHE_SIZE: usize = 4096;

/// The immutable part of a tokenizer, shared between clones.
struct TokenizerCore {
    vocab: Vocabulary,
    model: Model,
    added: AddedVocabulary,
    normalizer: Option<Normalizer>,
    pre_tokenizer: Option<PreTokenizer>,
    post_processor: Option<PostProcessor>,
    // IDs the post-processor inserts; skipped by `decode` like special added tokens.
    processor_special_ids: FxHashSet<u32>,
    decoder: Option<Decoder>,
}

/// A loaded tokenizer: normalizer, pre-tokenizer, model, post-processor and
/// decoder over one vocabulary.
///
/// # Performance Characteristics
///
/// - All tables are immutable after load and shared through an `Arc`, so
///   [`Clone`] is cheap; a clone starts with an empty cache
/// - Model output for each pre-tokenized piece is memoized in an LRU cache
///   keyed by an `FxHasher` hash of the piece
/// - Added tokens are found with a single Aho-Corasick pass
/// - [`encode_batch`](Self::encode_batch) and [`decode_batch`](Self::decode_batch)
///   parallelize across inputs with Rayon
///
/// `Tokenizer` is `Send + Sync`; every encode and decode method takes `&self`.
pub struct Tokenizer {
    core: Arc<TokenizerCore>,
    truncation: Option<TruncationParams>,
    piece_cache: Mutex<LruCache<u64, Vec<Token>>>,
    cache_size: usize,
}

fn new_cache(size: usize) -> Mutex<LruCache<u64, Vec<Token>>> {
    let size = NonZeroUsize::new(size).unwrap_or(NonZeroUsize::MIN);
    Mutex::new(LruCache::new(size))
}

impl Tokenizer {
    /// Compile a parsed description.
    ///
    /// This is where the vocabulary invariants are checked, regexes are
    /// compiled and the added-token matcher is built.
    pub fn from_description(desc: TokenizerDescription) -> Result<Self, ParseError> {
        let TokenizerDescription {
            truncation,
            added_tokens,
            normalizer,
            pre_tokenizer,
            post_processor,
            decoder,
            model,
        } = desc;

        let added_pairs: Vec<(String, u32)> = added_tokens
            .iter()
            .map(|t| (t.content.clone(), t.id))
            .collect();
        let vocab = Vocabulary::build(&model.vocab, &added_pairs)?;
        if let Some(unk) = &model.unk_token {
            if vocab.token_to_id(unk).is_none() {
                return Err(ParseError::UnknownUnkToken(unk.clone()));
            }
        }

        let kind = model.resolved_kind();
        let model = match kind {
            ModelKind::Bpe => {
                let merges = model
                    .merges
                    .unwrap_or_default()
                    .into_iter()
                    .map(MergeEntry::into_pair)
                    .collect::<Result<Vec<_>, _>>()?;
                Model::Bpe(Bpe::new(
                    &vocab,
                    &merges,
                    BpeOptions {
                        unk_token: model.unk_token,
                        continuing_subword_prefix: model.continuing_subword_prefix,
                        end_of_word_suffix: model.end_of_word_suffix,
                        byte_fallback: model.byte_fallback,
                        fuse_unk: model.fuse_unk,
                        ignore_merges: model.ignore_merges,
                    },
                ))
            }
            ModelKind::WordPiece => Model::WordPiece(WordPiece::new(
                &vocab,
                model.unk_token,
                model.continuing_subword_prefix,
                model.max_input_chars_per_word,
            )),
            ModelKind::WordLevel => Model::WordLevel(WordLevel::new(&vocab, model.unk_token)),
        };

        let pre_tokenizer = pre_tokenizer
            .as_ref()
            .map(PreTokenizer::from_config)
            .transpose()?;
        if let Some(processor) = &post_processor {
            processor
                .validate(&vocab)
                .map_err(ParseError::PostProcessor)?;
        }
        let processor_special_ids: FxHashSet<u32> = post_processor
            .as_ref()
            .map(|p| p.special_ids().into_iter().collect())
            .unwrap_or_default();
        let added = AddedVocabulary::new(added_tokens)?;

        log::debug!(
            "loaded {} tokenizer: {} tokens, {} added",
            model.kind(),
            vocab.len(),
            added.tokens().len()
        );

        Ok(Self {
            core: Arc::new(TokenizerCore {
                vocab,
                model,
                added,
                normalizer,
                pre_tokenizer,
                post_processor,
                processor_special_ids,
                decoder,
            }),
            truncation,
            piece_cache: new_cache(DEFAULT_CACHE_SIZE),
            cache_size: DEFAULT_CACHE_SIZE,
        })
    }

    /// Load a tokenizer from a serialized description held in memory.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, TokenizerError> {
        let desc = loader::parse(bytes)?;
        Ok(Self::from_description(desc)?)
    }

    /// Load a tokenizer from a description file.
    ///
    /// # Errors
    /// `FileNotFound` if `path` does not exist, `Io` if it cannot be read,
    /// `Parse` if its content is not a valid description.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, TokenizerError> {
        let path = path.as_ref();
        let bytes = std::fs::read(path).map_err(|source| {
            if source.kind() == std::io::ErrorKind::NotFound {
                TokenizerError::FileNotFound(path.to_path_buf())
            } else {
                TokenizerError::Io {
                    path: path.to_path_buf(),
                    source,
                }
            }
        })?;
        log::debug!("read tokenizer description from {}", path.display());
        Self::from_bytes(&bytes)
    }

    /// Load a named model through the default [`PretrainedConfig`] cache.
    pub fn from_pretrained(model_name: &str) -> Result<Self, TokenizerError> {
        Self::from_pretrained_with(model_name, &PretrainedConfig::from_env().resolver())
    }

    /// Load a named model through `resolver`.
    pub fn from_pretrained_with(
        model_name: &str,
        resolver: &dyn ModelResolver,
    ) -> Result<Self, TokenizerError> {
        let bytes = resolver.resolve(model_name)?;
        Self::from_bytes(&bytes)
    }

    /// Replace the piece cache with one of `cache_size` entries.
    pub fn with_cache_size(mut self, cache_size: usize) -> Self {
        self.cache_size = cache_size;
        self.piece_cache = new_cache(cache_size);
        self
    }

    /// Override the truncation settings of the description.
    pub fn with_truncation(mut self, truncation: Option<TruncationParams>) -> Self {
        self.truncation = truncation;
        self
    }

    pub fn truncation(&self) -> Option<&TruncationParams> {
        self.truncation.as_ref()
    }

    #[inline]
    fn hash_piece(piece: &str) -> u64 {
        let mut hasher = FxHasher::default();
        piece.hash(&mut hasher);
        hasher.finish()
    }

    /// Run the model on one piece, memoized.
    fn tokenize_piece(&self, piece: &str) -> Vec<Token> {
        let hash = Self::hash_piece(piece);
        if let Ok(mut cache) = self.piece_cache.lock() {
            if let Some(cached) = cache.get(&hash) {
                return cached.clone();
            }
        }

        let tokens = self.core.model.tokenize(&self.core.vocab, piece);

        if let Ok(mut cache) = self.piece_cache.lock() {
            cache.put(hash, tokens.clone());
        }
        tokens
    }

    /// Normalize and pre-tokenize `text[start..end]`.
    fn split_segment(&self, text: &str, start: usize, end: usize) -> Vec<NormalizedString> {
        let mut normalized = NormalizedString::with_base(&text[start..end], start);
        if let Some(normalizer) = &self.core.normalizer {
            normalizer.normalize(&mut normalized);
        }
        match &self.core.pre_tokenizer {
            Some(pre_tokenizer) => pre_tokenizer.pre_tokenize(normalized, start == 0),
            None if normalized.is_empty() => Vec::new(),
            None => vec![normalized],
        }
    }

    /// Added tokens, normalization, pre-tokenization and model; no truncation
    /// or special tokens yet.
    fn encode_sequence(&self, text: &str) -> EncodingBuilder {
        let mut encoding = EncodingBuilder::default();
        for segment in self.core.added.split(text) {
            match segment {
                Segment::Added { index, start, end } => {
                    if let Some(token) = self.core.added.get(index) {
                        encoding.push(token.id, token.content.clone(), (start, end), token.special);
                    }
                }
                Segment::Text { start, end } => {
                    for piece in self.split_segment(text, start, end) {
                        for token in self.tokenize_piece(piece.as_str()) {
                            let (s, e) = token.offsets;
                            encoding.push(token.id, token.value, piece.offsets_of(s..e), false);
                        }
                    }
                }
            }
        }
        encoding
    }

    /// Encode `text` into IDs and token strings.
    pub fn encode(&self, text: &str, add_special_tokens: bool) -> Result<Encoding, TokenizerError> {
        self.encode_with_options(text, add_special_tokens, &EncodeOptions::default())
    }

    /// Encode `text`, filling the optional attributes requested in `options`.
    ///
    /// # Arguments
    /// * `text` - Input text
    /// * `add_special_tokens` - Whether the post-processor adds its special tokens
    /// * `options` - Which of type ids, attention mask, special tokens mask and
    ///   offsets to return
    pub fn encode_with_options(
        &self,
        text: &str,
        add_special_tokens: bool,
        options: &EncodeOptions,
    ) -> Result<Encoding, TokenizerError> {
        let mut encoding = self.encode_sequence(text);

        let processor = self
            .core
            .post_processor
            .as_ref()
            .filter(|_| add_special_tokens);
        if let Some(truncation) = &self.truncation {
            let reserved = processor.map_or(0, PostProcessor::added_tokens);
            encoding.truncate(
                truncation.max_length.saturating_sub(reserved),
                truncation.direction,
            );
        }
        if let Some(processor) = processor {
            encoding = processor.apply(encoding);
        }
        Ok(encoding.finish(options))
    }

    /// Encode raw bytes from a host; they must be valid UTF-8.
    pub fn encode_bytes(
        &self,
        bytes: &[u8],
        add_special_tokens: bool,
        options: &EncodeOptions,
    ) -> Result<Encoding, TokenizerError> {
        let text = std::str::from_utf8(bytes)
            .map_err(|e| TokenizerError::InvalidInput(format!("input is not valid UTF-8: {e}")))?;
        self.encode_with_options(text, add_special_tokens, options)
    }

    /// Encode multiple texts in parallel.
    pub fn encode_batch<S: AsRef<str> + Sync>(
        &self,
        texts: &[S],
        add_special_tokens: bool,
        options: &EncodeOptions,
    ) -> Result<Vec<Encoding>, TokenizerError> {
        texts
            .par_iter()
            .map(|text| self.encode_with_options(text.as_ref(), add_special_tokens, options))
            .collect()
    }

    /// Decode IDs back to text.
    ///
    /// # Errors
    /// `InvalidInput` if any ID is not below [`vocab_size`](Self::vocab_size).
    pub fn decode(&self, ids: &[u32], skip_special_tokens: bool) -> Result<String, TokenizerError> {
        let mut tokens = Vec::with_capacity(ids.len());
        for &id in ids {
            let token = self.core.vocab.id_to_token(id).ok_or_else(|| {
                TokenizerError::InvalidInput(format!(
                    "token id {id} is out of range for a vocabulary of {} tokens",
                    self.vocab_size()
                ))
            })?;
            if skip_special_tokens && self.is_special(id) {
                continue;
            }
            tokens.push(token.to_string());
        }
        Ok(match &self.core.decoder {
            Some(decoder) => decoder.decode(tokens),
            None => tokens.join(" "),
        })
    }

    fn is_special(&self, id: u32) -> bool {
        self.core.added.is_special(id) || self.core.processor_special_ids.contains(&id)
    }

    /// Decode multiple ID sequences in parallel.
    pub fn decode_batch(
        &self,
        sequences: &[Vec<u32>],
        skip_special_tokens: bool,
    ) -> Result<Vec<String>, TokenizerError> {
        sequences
            .par_iter()
            .map(|ids| self.decode(ids, skip_special_tokens))
            .collect()
    }

    /// Normalized pieces of `text` with their original byte ranges.
    pub fn pre_tokenize_str(&self, text: &str) -> Vec<(String, Offsets)> {
        self.split_segment(text, 0, text.len())
            .into_iter()
            .map(|piece| (piece.as_str().to_string(), piece.offsets()))
            .collect()
    }

    /// Number of tokens, added tokens included.
    pub fn vocab_size(&self) -> usize {
        self.core.vocab.len()
    }

    pub fn token_to_id(&self, token: &str) -> Option<u32> {
        self.core.vocab.token_to_id(token)
    }

    pub fn id_to_token(&self, id: u32) -> Option<&str> {
        self.core.vocab.id_to_token(id)
    }

    pub fn model(&self) -> &Model {
        &self.core.model
    }

    /// Clear the piece cache.
    pub fn clear_cache(&self) {
        if let Ok(mut cache) = self.piece_cache.lock() {
            cache.clear();
        }
    }

    /// Number of cached pieces.
    pub fn cache_len(&self) -> usize {
        self.piece_cache.lock().map(|c| c.len()).unwrap_or(0)
    }
}

impl Clone for Tokenizer {
    fn clone(&self) -> Self {
        Self {
            core: Arc::clone(&self.core),
            truncation: self.truncation,
            piece_cache: new_cache(self.cache_size),
            cache_size: self.cache_size,
        }
    }
}

impl std::fmt::Debug for Tokenizer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Tokenizer")
            .field("model", &self.core.model.kind())
            .field("vocab_size", &self.vocab_size())
            .field("truncation", &self.truncation)
            .finish()
    }
}
