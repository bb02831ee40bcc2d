//! Offset-tracking text normalization.
//!
//! Every stage after normalization reports offsets into the *original* input,
//! so [`NormalizedString`] carries, for each byte of the normalized text, the
//! byte span of the original text it was produced from. Transforms rebuild the
//! text character by character and propagate those spans:
//!
//! - a character that expands (lowercasing `İ`, decomposing `é`) gives every
//!   produced character the span of its source
//! - characters that fuse (composition, literal replacement) get the union of
//!   the spans they cover
//! - removed characters simply disappear
//!
//! Spans therefore stay non-decreasing across the normalized text, which is
//! what keeps `Encoding` offsets ordered.

use serde::Deserialize;
use std::ops::Range;
use unicode_normalization::char::{canonical_combining_class, is_combining_mark};
use unicode_normalization::UnicodeNormalization;

/// A `(start, end)` byte range into the original input.
pub type Offsets = (usize, usize);

/// Normalized text plus the original span of each of its bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NormalizedString {
    normalized: String,
    alignments: Vec<Offsets>,
}

impl NormalizedString {
    /// Wrap `original` with identity alignments.
    pub fn new(original: &str) -> Self {
        Self::with_base(original, 0)
    }

    /// Wrap `original`, a slice starting at byte `base` of a larger input.
    pub fn with_base(original: &str, base: usize) -> Self {
        let mut alignments = Vec::with_capacity(original.len());
        for (i, ch) in original.char_indices() {
            let span = (base + i, base + i + ch.len_utf8());
            alignments.extend(std::iter::repeat(span).take(ch.len_utf8()));
        }
        Self {
            normalized: original.to_string(),
            alignments,
        }
    }

    fn from_spanned<I: IntoIterator<Item = (char, Offsets)>>(chars: I) -> Self {
        let mut normalized = String::new();
        let mut alignments = Vec::new();
        for (ch, span) in chars {
            normalized.push(ch);
            alignments.extend(std::iter::repeat(span).take(ch.len_utf8()));
        }
        Self {
            normalized,
            alignments,
        }
    }

    pub fn as_str(&self) -> &str {
        &self.normalized
    }

    pub fn len(&self) -> usize {
        self.normalized.len()
    }

    pub fn is_empty(&self) -> bool {
        self.normalized.is_empty()
    }

    fn spanned_chars(&self) -> impl Iterator<Item = (char, Offsets)> + '_ {
        self.normalized
            .char_indices()
            .map(|(i, ch)| (ch, self.alignments[i]))
    }

    /// Original span covered by the normalized byte range `range`.
    ///
    /// `range` must lie on character boundaries of the normalized text.
    pub fn offsets_of(&self, range: Range<usize>) -> Offsets {
        if range.start >= range.end || range.end > self.alignments.len() {
            let at = self
                .alignments
                .get(range.start)
                .map(|s| s.0)
                .or_else(|| self.alignments.last().map(|s| s.1))
                .unwrap_or(0);
            return (at, at);
        }
        (self.alignments[range.start].0, self.alignments[range.end - 1].1)
    }

    /// Original span of the whole string.
    pub fn offsets(&self) -> Offsets {
        self.offsets_of(0..self.len())
    }

    /// Sub-string for the normalized byte range `range`, keeping its alignments.
    pub fn slice(&self, range: Range<usize>) -> NormalizedString {
        NormalizedString {
            normalized: self.normalized[range.clone()].to_string(),
            alignments: self.alignments[range].to_vec(),
        }
    }

    /// Replace every character with the characters `f` yields for it.
    pub fn map_chars<F, I>(&mut self, mut f: F)
    where
        F: FnMut(char) -> I,
        I: IntoIterator<Item = char>,
    {
        let rebuilt = Self::from_spanned(
            self.spanned_chars()
                .flat_map(|(ch, span)| f(ch).into_iter().map(move |c| (c, span)))
                .collect::<Vec<_>>(),
        );
        *self = rebuilt;
    }

    /// Keep only the characters for which `keep` returns true.
    pub fn filter<F: FnMut(char) -> bool>(&mut self, mut keep: F) {
        let rebuilt = Self::from_spanned(
            self.spanned_chars()
                .filter(|&(ch, _)| keep(ch))
                .collect::<Vec<_>>(),
        );
        *self = rebuilt;
    }

    pub fn lowercase(&mut self) {
        self.map_chars(|c| c.to_lowercase());
    }

    pub fn nfd(&mut self) {
        self.map_chars(|c| std::iter::once(c).nfd());
    }

    pub fn nfkd(&mut self) {
        self.map_chars(|c| std::iter::once(c).nfkd());
    }

    pub fn nfc(&mut self) {
        self.compose(false);
    }

    pub fn nfkc(&mut self) {
        self.compose(true);
    }

    /// Compose each starter together with the combining characters that follow it.
    fn compose(&mut self, compatibility: bool) {
        let chars: Vec<(char, Offsets)> = self.spanned_chars().collect();
        let mut out = Vec::with_capacity(chars.len());
        let mut i = 0;
        while i < chars.len() {
            let mut j = i + 1;
            while j < chars.len() && canonical_combining_class(chars[j].0) != 0 {
                j += 1;
            }
            let group = &chars[i..j];
            let span = (group[0].1 .0, group[group.len() - 1].1 .1);
            let iter = group.iter().map(|&(c, _)| c);
            if compatibility {
                out.extend(iter.nfkc().map(|c| (c, span)));
            } else {
                out.extend(iter.nfc().map(|c| (c, span)));
            }
            i = j;
        }
        *self = Self::from_spanned(out);
    }

    pub fn strip_accents(&mut self) {
        self.filter(|c| !is_combining_mark(c));
    }

    /// Trim whitespace from the requested ends.
    pub fn strip(&mut self, left: bool, right: bool) {
        let mut start = 0;
        let mut end = self.len();
        if left {
            start = self.normalized.len() - self.normalized.trim_start().len();
        }
        if right {
            end = self.normalized.trim_end().len().max(start);
        }
        *self = self.slice(start..end);
    }

    /// Replace every occurrence of the literal `pattern` with `content`.
    pub fn replace(&mut self, pattern: &str, content: &str) {
        if pattern.is_empty() || !self.normalized.contains(pattern) {
            return;
        }
        let mut out = Vec::with_capacity(self.len());
        let mut last = 0;
        for (start, matched) in self.normalized.match_indices(pattern) {
            let end = start + matched.len();
            out.extend(self.slice(last..start).spanned_chars().collect::<Vec<_>>());
            let span = self.offsets_of(start..end);
            out.extend(content.chars().map(|c| (c, span)));
            last = end;
        }
        out.extend(self.slice(last..self.len()).spanned_chars().collect::<Vec<_>>());
        *self = Self::from_spanned(out);
    }

    /// Prepend `prefix` to non-empty text; the prefix borrows the first character's span.
    pub fn prepend(&mut self, prefix: &str) {
        let Some(&span) = self.alignments.first() else {
            return;
        };
        let mut out: Vec<(char, Offsets)> = prefix.chars().map(|c| (c, span)).collect();
        out.extend(self.spanned_chars());
        *self = Self::from_spanned(out);
    }
}

/// Literal pattern of a `Replace` normalizer (`{"String": "..."}`).
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub enum ReplacePattern {
    String(String),
}

fn default_true() -> bool {
    true
}

/// A normalizer from the serialized description.
///
/// Deserialized straight from the `"normalizer"` node; unknown `type`s fail
/// to parse.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "type")]
pub enum Normalizer {
    Sequence {
        normalizers: Vec<Normalizer>,
    },
    Lowercase,
    #[serde(rename = "NFC")]
    Nfc,
    #[serde(rename = "NFD")]
    Nfd,
    #[serde(rename = "NFKC")]
    Nfkc,
    #[serde(rename = "NFKD")]
    Nfkd,
    StripAccents,
    Strip {
        #[serde(default = "default_true")]
        strip_left: bool,
        #[serde(default = "default_true")]
        strip_right: bool,
    },
    Replace {
        pattern: ReplacePattern,
        content: String,
    },
    Prepend {
        prepend: String,
    },
    BertNormalizer {
        #[serde(default = "default_true")]
        clean_text: bool,
        #[serde(default = "default_true")]
        handle_chinese_chars: bool,
        #[serde(default)]
        strip_accents: Option<bool>,
        #[serde(default = "default_true")]
        lowercase: bool,
    },
}

impl Normalizer {
    /// Apply this normalizer in place.
    pub fn normalize(&self, text: &mut NormalizedString) {
        match self {
            Normalizer::Sequence { normalizers } => {
                for n in normalizers {
                    n.normalize(text);
                }
            }
            Normalizer::Lowercase => text.lowercase(),
            Normalizer::Nfc => text.nfc(),
            Normalizer::Nfd => text.nfd(),
            Normalizer::Nfkc => text.nfkc(),
            Normalizer::Nfkd => text.nfkd(),
            Normalizer::StripAccents => text.strip_accents(),
            Normalizer::Strip {
                strip_left,
                strip_right,
            } => text.strip(*strip_left, *strip_right),
            Normalizer::Replace {
                pattern: ReplacePattern::String(pattern),
                content,
            } => text.replace(pattern, content),
            Normalizer::Prepend { prepend } => text.prepend(prepend),
            Normalizer::BertNormalizer {
                clean_text,
                handle_chinese_chars,
                strip_accents,
                lowercase,
            } => {
                if *clean_text {
                    text.filter(|c| !(c == '\0' || c == '\u{fffd}' || is_bert_control(c)));
                    text.map_chars(|c| std::iter::once(if is_bert_whitespace(c) { ' ' } else { c }));
                }
                if *handle_chinese_chars {
                    text.map_chars(|c| {
                        if is_chinese_char(c) {
                            vec![' ', c, ' ']
                        } else {
                            vec![c]
                        }
                    });
                }
                if strip_accents.unwrap_or(*lowercase) {
                    text.nfd();
                    text.strip_accents();
                }
                if *lowercase {
                    text.lowercase();
                }
            }
        }
    }
}

fn is_bert_whitespace(c: char) -> bool {
    matches!(c, ' ' | '\t' | '\n' | '\r') || c.is_whitespace()
}

fn is_bert_control(c: char) -> bool {
    !matches!(c, '\t' | '\n' | '\r') && c.is_control()
}

/// CJK Unified Ideograph blocks, as treated by the BERT basic tokenizer.
fn is_chinese_char(c: char) -> bool {
    matches!(
        c as u32,
        0x4E00..=0x9FFF
            | 0x3400..=0x4DBF
            | 0x20000..=0x2A6DF
            | 0x2A700..=0x2B73F
            | 0x2B740..=0x2B81F
            | 0x2B820..=0x2CEAF
            | 0xF900..=0xFAFF
            | 0x2F800..=0x2FA1F
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identity_alignments() {
        let n = NormalizedString::new("héllo");
        assert_eq!(n.offsets(), (0, 6));
        assert_eq!(n.offsets_of(1..3), (1, 3));
    }

    #[test]
    fn test_with_base_shifts_offsets() {
        let n = NormalizedString::with_base("abc", 10);
        assert_eq!(n.offsets_of(1..2), (11, 12));
    }

    #[test]
    fn test_lowercase_keeps_spans() {
        let mut n = NormalizedString::new("HeLLo");
        n.lowercase();
        assert_eq!(n.as_str(), "hello");
        assert_eq!(n.offsets_of(2..4), (2, 4));
    }

    #[test]
    fn test_strip_accents_maps_back_to_source_char() {
        let mut n = NormalizedString::new("café!");
        n.nfd();
        n.strip_accents();
        assert_eq!(n.as_str(), "cafe!");
        // 'e' came from the two-byte 'é' at 3..5, '!' sits at 5..6.
        assert_eq!(n.offsets_of(3..4), (3, 5));
        assert_eq!(n.offsets_of(4..5), (5, 6));
    }

    #[test]
    fn test_nfc_composes_with_union_span() {
        let mut n = NormalizedString::new("e\u{0301}x");
        n.nfc();
        assert_eq!(n.as_str(), "\u{00e9}x");
        assert_eq!(n.offsets_of(0..2), (0, 3));
        assert_eq!(n.offsets_of(2..3), (3, 4));
    }

    #[test]
    fn test_replace_and_prepend() {
        let mut n = NormalizedString::new("a b");
        n.replace(" ", "▁");
        n.prepend("▁");
        assert_eq!(n.as_str(), "▁a▁b");
        // Prepended marker borrows 'a''s span; the inner marker is the space.
        assert_eq!(n.offsets_of(0..3), (0, 1));
        assert_eq!(n.offsets_of(4..7), (1, 2));
    }

    #[test]
    fn test_strip() {
        let mut n = NormalizedString::new("  hi  ");
        n.strip(true, true);
        assert_eq!(n.as_str(), "hi");
        assert_eq!(n.offsets(), (2, 4));
    }

    #[test]
    fn test_bert_normalizer() {
        let norm = Normalizer::BertNormalizer {
            clean_text: true,
            handle_chinese_chars: true,
            strip_accents: None,
            lowercase: true,
        };
        let mut n = NormalizedString::new("Héllo\t世");
        norm.normalize(&mut n);
        assert_eq!(n.as_str(), "hello  世 ");
    }

    #[test]
    fn test_deserialize_sequence() {
        let json = r#"{"type":"Sequence","normalizers":[{"type":"NFD"},{"type":"Lowercase"},
            {"type":"Replace","pattern":{"String":" "},"content":"▁"}]}"#;
        let norm: Normalizer = serde_json::from_str(json).unwrap();
        let mut n = NormalizedString::new("A B");
        norm.normalize(&mut n);
        assert_eq!(n.as_str(), "a▁b");
    }

    #[test]
    fn test_unknown_type_is_rejected() {
        let json = r#"{"type":"Precompiled","precompiled_charsmap":""}"#;
        assert!(serde_json::from_str::<Normalizer>(json).is_err());
    }
}
