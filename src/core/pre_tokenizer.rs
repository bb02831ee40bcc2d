//! Pre-tokenizers: split normalized text into the pieces the model sees.
//!
//! Splitting never copies offsets by hand: every piece is a
//! [`NormalizedString::slice`] of its parent, so the original spans survive.

use regexr::{Regex as RegexrRegex, RegexBuilder};
use serde::Deserialize;
use std::ops::Range;
use unicode_normalization::char::is_combining_mark;

use super::byte_level::{byte_level_char, GPT2_PATTERN};
use super::normalizer::NormalizedString;

/// What happens to the delimiters a splitter finds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
pub enum SplitBehavior {
    Removed,
    #[default]
    Isolated,
    MergedWithPrevious,
    MergedWithNext,
    Contiguous,
}

/// When a Metaspace pre-tokenizer prepends its replacement character.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PrependScheme {
    #[default]
    Always,
    First,
    Never,
}

/// Pattern of a `Split` pre-tokenizer.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub enum SplitPattern {
    String(String),
    Regex(String),
}

fn default_true() -> bool {
    true
}

fn default_replacement() -> char {
    '▁'
}

/// Serialized form of a pre-tokenizer (`"pre_tokenizer"` node).
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "type")]
pub enum PreTokenizerConfig {
    Sequence {
        pretokenizers: Vec<PreTokenizerConfig>,
    },
    Whitespace,
    WhitespaceSplit,
    BertPreTokenizer,
    Punctuation {
        #[serde(default)]
        behavior: SplitBehavior,
    },
    Digits {
        #[serde(default)]
        individual_digits: bool,
    },
    Split {
        pattern: SplitPattern,
        behavior: SplitBehavior,
        #[serde(default)]
        invert: bool,
    },
    Metaspace {
        #[serde(default = "default_replacement")]
        replacement: char,
        #[serde(default)]
        prepend_scheme: Option<PrependScheme>,
        #[serde(default)]
        add_prefix_space: Option<bool>,
        #[serde(default = "default_true")]
        split: bool,
    },
    ByteLevel {
        #[serde(default = "default_true")]
        add_prefix_space: bool,
        #[serde(default = "default_true")]
        use_regex: bool,
    },
}

/// Delimiter matcher of a `Split` pre-tokenizer.
pub enum Matcher {
    Literal(String),
    Regex(Box<RegexrRegex>),
}

impl Matcher {
    fn find_ranges(&self, text: &str) -> Vec<Range<usize>> {
        match self {
            Matcher::Literal(lit) if lit.is_empty() => vec![],
            Matcher::Literal(lit) => text
                .match_indices(lit.as_str())
                .map(|(start, m)| start..start + m.len())
                .collect(),
            Matcher::Regex(regex) => regex
                .find_iter(text)
                .map(|m| m.start()..m.end())
                .filter(|r| !r.is_empty())
                .collect(),
        }
    }
}

fn compile(pattern: &str) -> Result<Matcher, regexr::Error> {
    let regex = RegexBuilder::new(pattern).jit(true).build()?;
    Ok(Matcher::Regex(Box::new(regex)))
}

/// A compiled pre-tokenizer.
pub enum PreTokenizer {
    Sequence(Vec<PreTokenizer>),
    Whitespace,
    WhitespaceSplit,
    Bert,
    Punctuation(SplitBehavior),
    Digits {
        individual: bool,
    },
    Split {
        matcher: Matcher,
        behavior: SplitBehavior,
        invert: bool,
    },
    Metaspace {
        replacement: char,
        prepend_scheme: PrependScheme,
        split: bool,
    },
    ByteLevel {
        add_prefix_space: bool,
        regex: Option<Matcher>,
    },
}

impl PreTokenizer {
    /// Compile a serialized pre-tokenizer, building any regexes it needs.
    pub fn from_config(config: &PreTokenizerConfig) -> Result<Self, regexr::Error> {
        Ok(match config {
            PreTokenizerConfig::Sequence { pretokenizers } => PreTokenizer::Sequence(
                pretokenizers
                    .iter()
                    .map(Self::from_config)
                    .collect::<Result<_, _>>()?,
            ),
            PreTokenizerConfig::Whitespace => PreTokenizer::Whitespace,
            PreTokenizerConfig::WhitespaceSplit => PreTokenizer::WhitespaceSplit,
            PreTokenizerConfig::BertPreTokenizer => PreTokenizer::Bert,
            PreTokenizerConfig::Punctuation { behavior } => PreTokenizer::Punctuation(*behavior),
            PreTokenizerConfig::Digits { individual_digits } => PreTokenizer::Digits {
                individual: *individual_digits,
            },
            PreTokenizerConfig::Split {
                pattern,
                behavior,
                invert,
            } => PreTokenizer::Split {
                matcher: match pattern {
                    SplitPattern::String(s) => Matcher::Literal(s.clone()),
                    SplitPattern::Regex(r) => compile(r)?,
                },
                behavior: *behavior,
                invert: *invert,
            },
            PreTokenizerConfig::Metaspace {
                replacement,
                prepend_scheme,
                add_prefix_space,
                split,
            } => {
                // The legacy flag only ever turned prepending off.
                let prepend_scheme = match (prepend_scheme, add_prefix_space) {
                    (_, Some(false)) => PrependScheme::Never,
                    (Some(scheme), _) => *scheme,
                    (None, _) => PrependScheme::Always,
                };
                PreTokenizer::Metaspace {
                    replacement: *replacement,
                    prepend_scheme,
                    split: *split,
                }
            }
            PreTokenizerConfig::ByteLevel {
                add_prefix_space,
                use_regex,
            } => PreTokenizer::ByteLevel {
                add_prefix_space: *add_prefix_space,
                regex: if *use_regex {
                    Some(compile(GPT2_PATTERN)?)
                } else {
                    None
                },
            },
        })
    }

    /// Split `text` into pieces.
    ///
    /// `is_first` tells whether `text` starts the input (nothing but added
    /// tokens before it), which matters for `PrependScheme::First`.
    pub fn pre_tokenize(&self, text: NormalizedString, is_first: bool) -> Vec<NormalizedString> {
        self.pre_tokenize_all(vec![text], is_first)
    }

    fn pre_tokenize_all(
        &self,
        pieces: Vec<NormalizedString>,
        is_first: bool,
    ) -> Vec<NormalizedString> {
        if let PreTokenizer::Sequence(steps) = self {
            return steps
                .iter()
                .fold(pieces, |acc, step| step.pre_tokenize_all(acc, is_first));
        }
        pieces
            .into_iter()
            .enumerate()
            .flat_map(|(i, piece)| self.split_piece(piece, is_first && i == 0))
            .filter(|p| !p.is_empty())
            .collect()
    }

    fn split_piece(&self, mut piece: NormalizedString, is_first: bool) -> Vec<NormalizedString> {
        match self {
            PreTokenizer::Sequence(_) => self.pre_tokenize_all(vec![piece], is_first),
            PreTokenizer::Whitespace => {
                let ranges = char_runs(piece.as_str(), |c| {
                    if c.is_whitespace() {
                        None
                    } else if is_word_char(c) {
                        Some(0)
                    } else {
                        Some(1)
                    }
                });
                ranges.into_iter().map(|r| piece.slice(r)).collect()
            }
            PreTokenizer::WhitespaceSplit => {
                let ranges = char_runs(piece.as_str(), |c| (!c.is_whitespace()).then_some(0));
                ranges.into_iter().map(|r| piece.slice(r)).collect()
            }
            PreTokenizer::Bert => {
                let words = char_runs(piece.as_str(), |c| (!c.is_whitespace()).then_some(0));
                words
                    .into_iter()
                    .flat_map(|r| {
                        let word = piece.slice(r);
                        let puncts = char_matches(word.as_str(), is_punctuation);
                        split_with(&word, puncts, SplitBehavior::Isolated, false)
                    })
                    .collect()
            }
            PreTokenizer::Punctuation(behavior) => {
                let matches = char_matches(piece.as_str(), is_punctuation);
                split_with(&piece, matches, *behavior, false)
            }
            PreTokenizer::Digits { individual } => {
                let matches = char_matches(piece.as_str(), |c| c.is_ascii_digit());
                let behavior = if *individual {
                    SplitBehavior::Isolated
                } else {
                    SplitBehavior::Contiguous
                };
                split_with(&piece, matches, behavior, false)
            }
            PreTokenizer::Split {
                matcher,
                behavior,
                invert,
            } => {
                let matches = matcher.find_ranges(piece.as_str());
                split_with(&piece, matches, *behavior, *invert)
            }
            PreTokenizer::Metaspace {
                replacement,
                prepend_scheme,
                split,
            } => {
                let mut buf = [0u8; 4];
                let rep: &str = replacement.encode_utf8(&mut buf);
                piece.replace(" ", rep);
                let prepend = match prepend_scheme {
                    PrependScheme::Always => true,
                    PrependScheme::First => is_first,
                    PrependScheme::Never => false,
                };
                if prepend && !piece.as_str().starts_with(*replacement) {
                    piece.prepend(rep);
                }
                if *split {
                    let matches = char_matches(piece.as_str(), |c| c == *replacement);
                    split_with(&piece, matches, SplitBehavior::MergedWithNext, false)
                } else {
                    vec![piece]
                }
            }
            PreTokenizer::ByteLevel {
                add_prefix_space,
                regex,
            } => {
                if *add_prefix_space && !piece.as_str().starts_with(' ') {
                    piece.prepend(" ");
                }
                let mut pieces = match regex {
                    Some(matcher) => {
                        let matches = matcher.find_ranges(piece.as_str());
                        split_with(&piece, matches, SplitBehavior::Isolated, false)
                    }
                    None => vec![piece],
                };
                for p in pieces.iter_mut() {
                    p.map_chars(|c| {
                        let mut buf = [0u8; 4];
                        c.encode_utf8(&mut buf)
                            .bytes()
                            .map(byte_level_char)
                            .collect::<Vec<_>>()
                    });
                }
                pieces
            }
        }
    }
}

fn is_word_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_' || is_combining_mark(c)
}

/// ASCII punctuation plus the common Unicode punctuation blocks.
pub(crate) fn is_punctuation(c: char) -> bool {
    if c.is_ascii() {
        return c.is_ascii_punctuation();
    }
    matches!(
        c as u32,
        0x00A1..=0x00BF
            | 0x2010..=0x2027
            | 0x2030..=0x205E
            | 0x2E00..=0x2E7F
            | 0x3001..=0x3003
            | 0x3008..=0x3011
            | 0x3014..=0x301F
            | 0xFE30..=0xFE4F
            | 0xFE50..=0xFE6F
            | 0xFF01..=0xFF0F
            | 0xFF1A..=0xFF20
            | 0xFF3B..=0xFF40
            | 0xFF5B..=0xFF65
    )
}

/// Byte ranges of maximal runs of characters sharing the same class.
/// Characters classified `None` separate runs and are dropped.
fn char_runs<F: Fn(char) -> Option<u8>>(text: &str, class: F) -> Vec<Range<usize>> {
    let mut runs = Vec::new();
    let mut current: Option<(usize, u8)> = None;
    for (i, ch) in text.char_indices() {
        let cls = class(ch);
        match (current, cls) {
            (Some((_, prev)), Some(c)) if prev == c => {}
            (Some((start, _)), _) => {
                runs.push(start..i);
                current = cls.map(|c| (i, c));
            }
            (None, _) => current = cls.map(|c| (i, c)),
        }
    }
    if let Some((start, _)) = current {
        runs.push(start..text.len());
    }
    runs
}

/// One byte range per character satisfying `pred`.
fn char_matches<F: Fn(char) -> bool>(text: &str, pred: F) -> Vec<Range<usize>> {
    text.char_indices()
        .filter(|&(_, c)| pred(c))
        .map(|(i, c)| i..i + c.len_utf8())
        .collect()
}

/// Split `text` around the sorted, non-overlapping `matches`.
fn split_with(
    text: &NormalizedString,
    matches: Vec<Range<usize>>,
    behavior: SplitBehavior,
    invert: bool,
) -> Vec<NormalizedString> {
    // Cover the whole string with alternating (range, is_delimiter) spans.
    let mut spans: Vec<(Range<usize>, bool)> = Vec::with_capacity(matches.len() * 2 + 1);
    let mut last = 0;
    for m in matches {
        if m.start > last {
            spans.push((last..m.start, invert));
        }
        last = m.end;
        spans.push((m, !invert));
    }
    if last < text.len() {
        spans.push((last..text.len(), invert));
    }

    let mut merged: Vec<Range<usize>> = Vec::with_capacity(spans.len());
    match behavior {
        SplitBehavior::Removed => {
            merged.extend(spans.into_iter().filter(|(_, d)| !d).map(|(r, _)| r));
        }
        SplitBehavior::Isolated => merged.extend(spans.into_iter().map(|(r, _)| r)),
        SplitBehavior::Contiguous => {
            let mut prev_delim = false;
            for (r, d) in spans {
                match merged.last_mut() {
                    Some(last) if d && prev_delim => last.end = r.end,
                    _ => merged.push(r),
                }
                prev_delim = d;
            }
        }
        SplitBehavior::MergedWithPrevious => {
            let mut prev_delim = false;
            for (r, d) in spans {
                match merged.last_mut() {
                    Some(last) if d && !prev_delim => last.end = r.end,
                    _ => merged.push(r),
                }
                prev_delim = d;
            }
        }
        SplitBehavior::MergedWithNext => {
            let mut prev_delim = false;
            for (r, d) in spans.into_iter().rev() {
                match merged.last_mut() {
                    Some(last) if d && !prev_delim => last.start = r.start,
                    _ => merged.push(r),
                }
                prev_delim = d;
            }
            merged.reverse();
        }
    }

    merged
        .into_iter()
        .filter(|r| !r.is_empty())
        .map(|r| text.slice(r))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run(pre: &PreTokenizer, text: &str) -> Vec<(String, (usize, usize))> {
        pre.pre_tokenize(NormalizedString::new(text), true)
            .into_iter()
            .map(|p| (p.as_str().to_string(), p.offsets()))
            .collect()
    }

    fn parse(json: &str) -> PreTokenizer {
        let config: PreTokenizerConfig = serde_json::from_str(json).unwrap();
        PreTokenizer::from_config(&config).unwrap()
    }

    #[test]
    fn test_whitespace() {
        let pieces = run(&PreTokenizer::Whitespace, "hello, world!");
        assert_eq!(
            pieces,
            vec![
                ("hello".to_string(), (0, 5)),
                (",".to_string(), (5, 6)),
                ("world".to_string(), (7, 12)),
                ("!".to_string(), (12, 13)),
            ]
        );
    }

    #[test]
    fn test_bert_isolates_each_punctuation() {
        let pieces: Vec<String> = run(&PreTokenizer::Bert, "wait...what?")
            .into_iter()
            .map(|(s, _)| s)
            .collect();
        assert_eq!(pieces, vec!["wait", ".", ".", ".", "what", "?"]);
    }

    #[test]
    fn test_whitespace_split() {
        let pieces: Vec<String> = run(&PreTokenizer::WhitespaceSplit, "  a  b,c ")
            .into_iter()
            .map(|(s, _)| s)
            .collect();
        assert_eq!(pieces, vec!["a", "b,c"]);
    }

    #[test]
    fn test_split_behaviors() {
        let text = NormalizedString::new("a--b-c");
        let matches = vec![1..2, 2..3, 4..5];
        let strs = |b| -> Vec<String> {
            split_with(&text, matches.clone(), b, false)
                .into_iter()
                .map(|p| p.as_str().to_string())
                .collect()
        };
        assert_eq!(strs(SplitBehavior::Removed), vec!["a", "b", "c"]);
        assert_eq!(strs(SplitBehavior::Isolated), vec!["a", "-", "-", "b", "-", "c"]);
        assert_eq!(strs(SplitBehavior::Contiguous), vec!["a", "--", "b", "-", "c"]);
        assert_eq!(strs(SplitBehavior::MergedWithPrevious), vec!["a-", "-", "b-", "c"]);
        assert_eq!(strs(SplitBehavior::MergedWithNext), vec!["a", "-", "-b", "-c"]);
    }

    #[test]
    fn test_split_invert_keeps_matches() {
        let pre = parse(r#"{"type":"Split","pattern":{"String":"ab"},"behavior":"Removed","invert":true}"#);
        let pieces: Vec<String> = run(&pre, "xxabyab").into_iter().map(|(s, _)| s).collect();
        assert_eq!(pieces, vec!["ab", "ab"]);
    }

    #[test]
    fn test_digits() {
        let grouped = run(&PreTokenizer::Digits { individual: false }, "a123b");
        assert_eq!(grouped[1], ("123".to_string(), (1, 4)));
        let single = run(&PreTokenizer::Digits { individual: true }, "12");
        assert_eq!(single.len(), 2);
    }

    #[test]
    fn test_metaspace() {
        let pre = parse(r#"{"type":"Metaspace","replacement":"▁","prepend_scheme":"always"}"#);
        let pieces = run(&pre, "hey there");
        assert_eq!(
            pieces,
            vec![("▁hey".to_string(), (0, 3)), ("▁there".to_string(), (3, 9))]
        );
    }

    #[test]
    fn test_metaspace_first_scheme() {
        let pre = PreTokenizer::Metaspace {
            replacement: '▁',
            prepend_scheme: PrependScheme::First,
            split: false,
        };
        let first = pre.pre_tokenize(NormalizedString::new("hi"), true);
        let later = pre.pre_tokenize(NormalizedString::new("hi"), false);
        assert_eq!(first[0].as_str(), "▁hi");
        assert_eq!(later[0].as_str(), "hi");
    }

    #[test]
    fn test_byte_level() {
        let pre = parse(r#"{"type":"ByteLevel","add_prefix_space":false,"use_regex":true}"#);
        let pieces = run(&pre, "Hello world");
        assert_eq!(
            pieces,
            vec![("Hello".to_string(), (0, 5)), ("Ġworld".to_string(), (5, 11))]
        );
    }

    #[test]
    fn test_byte_level_multibyte_offsets() {
        let pre = parse(r#"{"type":"ByteLevel","add_prefix_space":false,"use_regex":false}"#);
        let pieces = pre.pre_tokenize(NormalizedString::new("é"), true);
        // Two byte-level characters, both pointing at the source 'é'.
        assert_eq!(pieces[0].as_str().chars().count(), 2);
        assert_eq!(pieces[0].offsets_of(0..2), (0, 2));
    }

    #[test]
    fn test_sequence() {
        let pre = parse(
            r#"{"type":"Sequence","pretokenizers":[{"type":"WhitespaceSplit"},{"type":"Digits","individual_digits":true}]}"#,
        );
        let pieces: Vec<String> = run(&pre, "ab12 c").into_iter().map(|(s, _)| s).collect();
        assert_eq!(pieces, vec!["ab", "1", "2", "c"]);
    }
}
