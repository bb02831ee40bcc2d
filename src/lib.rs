//! tokenbind - tokenizer handles over HuggingFace-style `tokenizer.json` descriptions.
//!
//! ```rust
//! use tokenbind::TokenizerHandle;
//!
//! let json = br#"{"pre_tokenizer":{"type":"Whitespace"},
//!   "model":{"vocab":{"hello":0,",":1,"world":2,"!":3,"[UNK]":4},"unk_token":"[UNK]"}}"#;
//! let mut handle = TokenizerHandle::from_bytes(json).unwrap();
//! let encoding = handle.encode("hello, world!", false).unwrap();
//! assert_eq!(encoding.ids, vec![0, 1, 2, 3]);
//! handle.close().unwrap();
//! ```

pub mod core;
#[cfg(feature = "python")]
mod python;

pub use crate::core::{
    CacheResolver, EncodeOptions, Encoding, ErrorKind, MemoryResolver, ModelResolver, ParseError,
    PretrainedConfig, ResolveError, Tokenizer, TokenizerError, TokenizerHandle,
    TruncationDirection, TruncationParams,
};
