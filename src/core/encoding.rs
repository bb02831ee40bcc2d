//! Encoding results, encode options and truncation.

use serde::Deserialize;

use super::normalizer::Offsets;

/// Which optional attributes an encode call fills in.
///
/// IDs and token strings are always returned.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EncodeOptions {
    pub return_type_ids: bool,
    pub return_attention_mask: bool,
    pub return_special_tokens_mask: bool,
    pub return_offsets: bool,
}

impl EncodeOptions {
    /// IDs and tokens only.
    pub fn new() -> Self {
        Self::default()
    }

    /// Every optional attribute.
    pub fn all() -> Self {
        Self {
            return_type_ids: true,
            return_attention_mask: true,
            return_special_tokens_mask: true,
            return_offsets: true,
        }
    }

    pub fn with_type_ids(mut self) -> Self {
        self.return_type_ids = true;
        self
    }

    pub fn with_attention_mask(mut self) -> Self {
        self.return_attention_mask = true;
        self
    }

    pub fn with_special_tokens_mask(mut self) -> Self {
        self.return_special_tokens_mask = true;
        self
    }

    pub fn with_offsets(mut self) -> Self {
        self.return_offsets = true;
        self
    }
}

/// The result of encoding one text.
///
/// Every present sequence has the same length as `ids`. Offsets are byte
/// ranges into the original text and never decrease.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Encoding {
    pub ids: Vec<u32>,
    pub tokens: Vec<String>,
    pub type_ids: Option<Vec<u32>>,
    pub attention_mask: Option<Vec<u32>>,
    pub special_tokens_mask: Option<Vec<u32>>,
    pub offsets: Option<Vec<Offsets>>,
}

impl Encoding {
    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }
}

/// Which end of an over-long sequence is cut.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
pub enum TruncationDirection {
    /// Keep the head, drop the tail.
    #[default]
    Right,
    /// Keep the tail, drop the head.
    Left,
}

/// Truncation settings (`"truncation"` node of a description).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct TruncationParams {
    pub max_length: usize,
    #[serde(default)]
    pub direction: TruncationDirection,
}

impl TruncationParams {
    pub fn new(max_length: usize, direction: TruncationDirection) -> Self {
        Self {
            max_length,
            direction,
        }
    }
}

/// Fully populated encoding, trimmed to an [`Encoding`] at the end of a call.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub(crate) struct EncodingBuilder {
    pub ids: Vec<u32>,
    pub tokens: Vec<String>,
    pub type_ids: Vec<u32>,
    pub special: Vec<u32>,
    pub offsets: Vec<Offsets>,
}

impl EncodingBuilder {
    pub fn push(&mut self, id: u32, token: String, offsets: Offsets, special: bool) {
        self.ids.push(id);
        self.tokens.push(token);
        self.type_ids.push(0);
        self.special.push(u32::from(special));
        self.offsets.push(offsets);
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    /// Cut down to `max_length` entries from the configured end.
    pub fn truncate(&mut self, max_length: usize, direction: TruncationDirection) {
        let len = self.len();
        if len <= max_length {
            return;
        }
        match direction {
            TruncationDirection::Right => {
                self.ids.truncate(max_length);
                self.tokens.truncate(max_length);
                self.type_ids.truncate(max_length);
                self.special.truncate(max_length);
                self.offsets.truncate(max_length);
            }
            TruncationDirection::Left => {
                let cut = len - max_length;
                self.ids.drain(..cut);
                self.tokens.drain(..cut);
                self.type_ids.drain(..cut);
                self.special.drain(..cut);
                self.offsets.drain(..cut);
            }
        }
    }

    pub fn finish(self, options: &EncodeOptions) -> Encoding {
        let attention_mask = options
            .return_attention_mask
            .then(|| vec![1; self.ids.len()]);
        Encoding {
            type_ids: options.return_type_ids.then_some(self.type_ids),
            special_tokens_mask: options.return_special_tokens_mask.then_some(self.special),
            offsets: options.return_offsets.then_some(self.offsets),
            attention_mask,
            ids: self.ids,
            tokens: self.tokens,
        }
    }
}
