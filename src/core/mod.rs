//! Core tokenization engine for tokenbind.
//!
//! # Architecture
//!
//! Encoding runs through a fixed pipeline, each stage in its own module:
//!
//! - [`added_vocab`]: added tokens matched verbatim with Aho-Corasick
//! - [`normalizer`]: offset-tracking text normalization
//! - [`pre_tokenizer`]: splitting into pieces (whitespace, punctuation,
//!   regex, Metaspace, ByteLevel)
//! - [`model`]: BPE ([`bpe`]), WordPiece ([`wordpiece`]) or WordLevel over a
//!   [`vocab::Vocabulary`]
//! - [`post_processor`]: special tokens around the sequence
//! - [`decoder`]: token strings back to text
//!
//! [`Tokenizer`] ties the stages together. [`TokenizerHandle`] adds an
//! explicit `close`, and [`pretrained`] resolves model names to descriptions.
//! Descriptions are parsed by [`loader`].

pub mod added_vocab;
pub mod bpe;
pub mod byte_level;
pub mod decoder;
pub mod encoding;
pub mod handle;
pub mod loader;
pub mod model;
pub mod normalizer;
pub mod pre_tokenizer;
pub mod post_processor;
pub mod pretrained;
mod tokenizer;
pub mod vocab;
pub mod wordpiece;

pub use encoding::{EncodeOptions, Encoding, TruncationDirection, TruncationParams};
pub use handle::TokenizerHandle;
pub use loader::{parse, ParseError, TokenizerDescription};
pub use normalizer::Offsets;
pub use pretrained::{CacheResolver, MemoryResolver, ModelResolver, PretrainedConfig, ResolveError};
pub use tokenizer::{ErrorKind, Tokenizer, TokenizerError};
pub use vocab::{VocabError, Vocabulary};
