//! Added tokens: strings matched verbatim in the raw input before any
//! normalization, each emitted as a single token.

use aho_corasick::{AhoCorasick, MatchKind};
use rustc_hash::FxHashSet;
use serde::Deserialize;

/// An entry of the description's `added_tokens` list.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct AddedToken {
    pub id: u32,
    pub content: String,
    #[serde(default)]
    pub special: bool,
    /// Only match when not surrounded by word characters.
    #[serde(default)]
    pub single_word: bool,
    /// Swallow whitespace on the left of a match.
    #[serde(default)]
    pub lstrip: bool,
    /// Swallow whitespace on the right of a match.
    #[serde(default)]
    pub rstrip: bool,
}

impl AddedToken {
    pub fn new(id: u32, content: impl Into<String>, special: bool) -> Self {
        Self {
            id,
            content: content.into(),
            special,
            single_word: false,
            lstrip: false,
            rstrip: false,
        }
    }
}

/// A contiguous slice of the input: either plain text or one added token.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Segment {
    Text { start: usize, end: usize },
    Added { index: usize, start: usize, end: usize },
}

#[derive(Debug, Clone, Default)]
pub struct AddedVocabulary {
    tokens: Vec<AddedToken>,
    // Pattern i of the automaton is `tokens[patterns[i]]`.
    patterns: Vec<usize>,
    matcher: Option<AhoCorasick>,
    special_ids: FxHashSet<u32>,
}

impl AddedVocabulary {
    pub fn new(tokens: Vec<AddedToken>) -> Result<Self, aho_corasick::BuildError> {
        let patterns: Vec<usize> = tokens
            .iter()
            .enumerate()
            .filter(|(_, t)| !t.content.is_empty())
            .map(|(i, _)| i)
            .collect();
        let matcher = if patterns.is_empty() {
            None
        } else {
            Some(
                AhoCorasick::builder()
                    .match_kind(MatchKind::LeftmostLongest)
                    .build(patterns.iter().map(|&i| tokens[i].content.as_str()))?,
            )
        };
        let special_ids = tokens.iter().filter(|t| t.special).map(|t| t.id).collect();
        Ok(Self {
            tokens,
            patterns,
            matcher,
            special_ids,
        })
    }

    pub fn tokens(&self) -> &[AddedToken] {
        &self.tokens
    }

    pub fn get(&self, index: usize) -> Option<&AddedToken> {
        self.tokens.get(index)
    }

    pub fn is_special(&self, id: u32) -> bool {
        self.special_ids.contains(&id)
    }

    /// Split `text` into plain segments and added-token matches, covering it fully.
    pub fn split(&self, text: &str) -> Vec<Segment> {
        let Some(matcher) = &self.matcher else {
            return if text.is_empty() {
                Vec::new()
            } else {
                vec![Segment::Text {
                    start: 0,
                    end: text.len(),
                }]
            };
        };

        let mut segments = Vec::new();
        let mut last = 0;
        for m in matcher.find_iter(text) {
            let index = self.patterns[m.pattern().as_usize()];
            let token = &self.tokens[index];
            let (mut start, mut end) = (m.start(), m.end());
            if start < last {
                continue;
            }
            if token.single_word && !is_word_boundary(text, start, end) {
                continue;
            }
            if token.lstrip {
                start = last + text[last..start].trim_end().len();
            }
            if token.rstrip {
                end = text.len() - text[end..].trim_start().len();
            }
            if start > last {
                segments.push(Segment::Text { start: last, end: start });
            }
            segments.push(Segment::Added { index, start, end });
            last = end;
        }
        if last < text.len() {
            segments.push(Segment::Text {
                start: last,
                end: text.len(),
            });
        }
        segments
    }
}

fn is_word_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_'
}

fn is_word_boundary(text: &str, start: usize, end: usize) -> bool {
    let before = text[..start].chars().next_back().map_or(false, is_word_char);
    let after = text[end..].chars().next().map_or(false, is_word_char);
    !before && !after
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spans(vocab: &AddedVocabulary, text: &str) -> Vec<(String, bool)> {
        vocab
            .split(text)
            .into_iter()
            .map(|s| match s {
                Segment::Text { start, end } => (text[start..end].to_string(), false),
                Segment::Added { start, end, .. } => (text[start..end].to_string(), true),
            })
            .collect()
    }

    #[test]
    fn test_split_leftmost_longest() {
        let vocab = AddedVocabulary::new(vec![
            AddedToken::new(10, "<s>", true),
            AddedToken::new(11, "<s>x", false),
        ])
        .unwrap();
        assert_eq!(
            spans(&vocab, "a<s>xb<s>"),
            vec![
                ("a".to_string(), false),
                ("<s>x".to_string(), true),
                ("b".to_string(), false),
                ("<s>".to_string(), true),
            ]
        );
        assert!(vocab.is_special(10));
        assert!(!vocab.is_special(11));
    }

    #[test]
    fn test_no_tokens_is_one_segment() {
        let vocab = AddedVocabulary::new(Vec::new()).unwrap();
        assert_eq!(vocab.split("abc"), vec![Segment::Text { start: 0, end: 3 }]);
        assert!(vocab.split("").is_empty());
    }

    #[test]
    fn test_lstrip_rstrip() {
        let mut token = AddedToken::new(0, "[MASK]", true);
        token.lstrip = true;
        token.rstrip = true;
        let vocab = AddedVocabulary::new(vec![token]).unwrap();
        assert_eq!(
            spans(&vocab, "a  [MASK] b"),
            vec![("a".to_string(), false), ("  [MASK] ".to_string(), true), ("b".to_string(), false)]
        );
    }

    #[test]
    fn test_single_word() {
        let mut token = AddedToken::new(0, "yes", false);
        token.single_word = true;
        let vocab = AddedVocabulary::new(vec![token]).unwrap();
        let matched: Vec<bool> = spans(&vocab, "eyes yes").into_iter().map(|(_, a)| a).collect();
        assert_eq!(matched, vec![false, true]);
    }
}
