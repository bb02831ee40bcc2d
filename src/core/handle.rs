//! Explicit lifecycle around a [`Tokenizer`].
//!
//! Hosts that manage resources by hand (C callers, garbage-collected
//! runtimes) need a value they can release deterministically and that keeps
//! failing cleanly afterwards. A [`TokenizerHandle`] owns its tokenizer until
//! [`close`](TokenizerHandle::close); every later call returns
//! [`TokenizerError::UseAfterClose`].

use std::path::Path;

use super::encoding::{EncodeOptions, Encoding, TruncationDirection, TruncationParams};
use super::pretrained::ModelResolver;
use super::tokenizer::{Tokenizer, TokenizerError};

#[derive(Debug)]
pub struct TokenizerHandle {
    inner: Option<Tokenizer>,
}

impl TokenizerHandle {
    /// Wrap an already loaded tokenizer.
    pub fn new(tokenizer: Tokenizer) -> Self {
        Self {
            inner: Some(tokenizer),
        }
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, TokenizerError> {
        Tokenizer::from_file(path).map(Self::new)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, TokenizerError> {
        Tokenizer::from_bytes(bytes).map(Self::new)
    }

    /// Like [`from_bytes`](Self::from_bytes), with truncation overriding the description's.
    pub fn from_bytes_with_truncation(
        bytes: &[u8],
        max_length: usize,
        direction: TruncationDirection,
    ) -> Result<Self, TokenizerError> {
        let tokenizer = Tokenizer::from_bytes(bytes)?
            .with_truncation(Some(TruncationParams::new(max_length, direction)));
        Ok(Self::new(tokenizer))
    }

    pub fn from_pretrained(model_name: &str) -> Result<Self, TokenizerError> {
        Tokenizer::from_pretrained(model_name).map(Self::new)
    }

    pub fn from_pretrained_with(
        model_name: &str,
        resolver: &dyn ModelResolver,
    ) -> Result<Self, TokenizerError> {
        Tokenizer::from_pretrained_with(model_name, resolver).map(Self::new)
    }

    /// The live tokenizer, or `UseAfterClose`.
    pub fn tokenizer(&self) -> Result<&Tokenizer, TokenizerError> {
        self.inner.as_ref().ok_or(TokenizerError::UseAfterClose)
    }

    pub fn encode(&self, text: &str, add_special_tokens: bool) -> Result<Encoding, TokenizerError> {
        self.tokenizer()?.encode(text, add_special_tokens)
    }

    pub fn encode_with_options(
        &self,
        text: &str,
        add_special_tokens: bool,
        options: &EncodeOptions,
    ) -> Result<Encoding, TokenizerError> {
        self.tokenizer()?
            .encode_with_options(text, add_special_tokens, options)
    }

    pub fn encode_bytes(
        &self,
        bytes: &[u8],
        add_special_tokens: bool,
        options: &EncodeOptions,
    ) -> Result<Encoding, TokenizerError> {
        self.tokenizer()?
            .encode_bytes(bytes, add_special_tokens, options)
    }

    pub fn decode(&self, ids: &[u32], skip_special_tokens: bool) -> Result<String, TokenizerError> {
        self.tokenizer()?.decode(ids, skip_special_tokens)
    }

    pub fn vocab_size(&self) -> Result<usize, TokenizerError> {
        Ok(self.tokenizer()?.vocab_size())
    }

    pub fn is_closed(&self) -> bool {
        self.inner.is_none()
    }

    /// Release the tokenizer. Closing an already closed handle does nothing.
    pub fn close(&mut self) -> Result<(), TokenizerError> {
        if self.inner.take().is_some() {
            log::debug!("tokenizer handle closed");
        }
        Ok(())
    }
}

impl From<Tokenizer> for TokenizerHandle {
    fn from(tokenizer: Tokenizer) -> Self {
        Self::new(tokenizer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::tokenizer::ErrorKind;

    const DESC: &[u8] = br#"{"pre_tokenizer":{"type":"WhitespaceSplit"},
        "model":{"vocab":{"a":0,"b":1,"c":2,"<unk>":3},"unk_token":"<unk>"}}"#;

    #[test]
    fn test_close_then_use() {
        let mut handle = TokenizerHandle::from_bytes(DESC).unwrap();
        assert_eq!(handle.vocab_size().unwrap(), 4);
        handle.close().unwrap();
        assert!(handle.is_closed());
        assert!(matches!(
            handle.encode("a", false),
            Err(TokenizerError::UseAfterClose)
        ));
        assert_eq!(handle.decode(&[0], false).unwrap_err().kind(), ErrorKind::Closed);
        assert!(handle.vocab_size().is_err());
        // A second close is a no-op.
        assert!(handle.close().is_ok());
    }

    #[test]
    fn test_truncating_constructor() {
        let handle =
            TokenizerHandle::from_bytes_with_truncation(DESC, 2, TruncationDirection::Left).unwrap();
        assert_eq!(handle.encode("a b c", false).unwrap().ids, vec![1, 2]);
    }
}
