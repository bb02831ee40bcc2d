//! Decoders: turn the token strings of a sequence back into text.
//!
//! Each decoder maps a list of token strings to a new list, so they chain.
//! The final list is concatenated.

use serde::Deserialize;

use super::byte_level::byte_level_decode_token;
use super::normalizer::ReplacePattern;
use super::pre_tokenizer::PrependScheme;

fn default_true() -> bool {
    true
}

fn default_wordpiece_prefix() -> String {
    "##".to_string()
}

fn default_bpe_suffix() -> String {
    "</w>".to_string()
}

fn default_replacement() -> char {
    '▁'
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "type")]
pub enum Decoder {
    ByteLevel,
    WordPiece {
        #[serde(default = "default_wordpiece_prefix")]
        prefix: String,
        #[serde(default = "default_true")]
        cleanup: bool,
    },
    Metaspace {
        #[serde(default = "default_replacement")]
        replacement: char,
        #[serde(default)]
        prepend_scheme: Option<PrependScheme>,
        #[serde(default)]
        add_prefix_space: Option<bool>,
    },
    ByteFallback,
    Fuse,
    Strip {
        content: char,
        #[serde(default)]
        start: usize,
        #[serde(default)]
        stop: usize,
    },
    Replace {
        pattern: ReplacePattern,
        content: String,
    },
    #[serde(rename = "BPEDecoder")]
    Bpe {
        #[serde(default = "default_bpe_suffix")]
        suffix: String,
    },
    Sequence {
        decoders: Vec<Decoder>,
    },
}

impl Decoder {
    pub fn decode(&self, tokens: Vec<String>) -> String {
        self.decode_chain(tokens).concat()
    }

    pub fn decode_chain(&self, tokens: Vec<String>) -> Vec<String> {
        match self {
            Decoder::ByteLevel => {
                let bytes: Vec<u8> = tokens
                    .iter()
                    .flat_map(|t| byte_level_decode_token(t))
                    .collect();
                vec![String::from_utf8_lossy(&bytes).into_owned()]
            }
            Decoder::WordPiece { prefix, cleanup } => tokens
                .into_iter()
                .enumerate()
                .map(|(i, token)| {
                    let token = if i == 0 {
                        token
                    } else if let Some(rest) = token.strip_prefix(prefix.as_str()) {
                        rest.to_string()
                    } else {
                        format!(" {token}")
                    };
                    if *cleanup {
                        cleanup_spacing(&token)
                    } else {
                        token
                    }
                })
                .collect(),
            Decoder::Metaspace {
                replacement,
                prepend_scheme,
                add_prefix_space,
            } => {
                let strip_first = match (prepend_scheme, add_prefix_space) {
                    (_, Some(false)) => false,
                    (Some(scheme), _) => *scheme != PrependScheme::Never,
                    (None, _) => true,
                };
                tokens
                    .into_iter()
                    .enumerate()
                    .map(|(i, token)| {
                        let text: String = token
                            .chars()
                            .map(|c| if c == *replacement { ' ' } else { c })
                            .collect();
                        match text.strip_prefix(' ') {
                            Some(rest) if i == 0 && strip_first => rest.to_string(),
                            _ => text,
                        }
                    })
                    .collect()
            }
            Decoder::ByteFallback => {
                let mut out = Vec::with_capacity(tokens.len());
                let mut pending: Vec<u8> = Vec::new();
                for token in tokens {
                    match parse_byte_token(&token) {
                        Some(byte) => pending.push(byte),
                        None => {
                            flush_bytes(&mut pending, &mut out);
                            out.push(token);
                        }
                    }
                }
                flush_bytes(&mut pending, &mut out);
                out
            }
            Decoder::Fuse => vec![tokens.concat()],
            Decoder::Strip {
                content,
                start,
                stop,
            } => tokens
                .into_iter()
                .map(|token| {
                    let chars: Vec<char> = token.chars().collect();
                    let lead = chars.iter().take(*start).take_while(|&&c| c == *content).count();
                    let trail = chars[lead..]
                        .iter()
                        .rev()
                        .take(*stop)
                        .take_while(|&&c| c == *content)
                        .count();
                    chars[lead..chars.len() - trail].iter().collect()
                })
                .collect(),
            Decoder::Replace {
                pattern: ReplacePattern::String(pattern),
                content,
            } => tokens
                .into_iter()
                .map(|token| {
                    if pattern.is_empty() {
                        token
                    } else {
                        token.replace(pattern.as_str(), content)
                    }
                })
                .collect(),
            Decoder::Bpe { suffix } => {
                let last = tokens.len().saturating_sub(1);
                tokens
                    .into_iter()
                    .enumerate()
                    .map(|(i, token)| {
                        if suffix.is_empty() {
                            token
                        } else {
                            token.replace(suffix.as_str(), if i == last { "" } else { " " })
                        }
                    })
                    .collect()
            }
            Decoder::Sequence { decoders } => decoders
                .iter()
                .fold(tokens, |acc, decoder| decoder.decode_chain(acc)),
        }
    }
}

/// `<0xHH>` -> the byte `0xHH`.
fn parse_byte_token(token: &str) -> Option<u8> {
    let hex = token.strip_prefix("<0x")?.strip_suffix('>')?;
    if hex.len() != 2 {
        return None;
    }
    u8::from_str_radix(hex, 16).ok()
}

/// Invalid UTF-8 yields one U+FFFD per byte.
fn flush_bytes(pending: &mut Vec<u8>, out: &mut Vec<String>) {
    if pending.is_empty() {
        return;
    }
    match String::from_utf8(std::mem::take(pending)) {
        Ok(text) => out.push(text),
        Err(err) => {
            let count = err.as_bytes().len();
            out.extend(std::iter::repeat("\u{FFFD}".to_string()).take(count));
        }
    }
}

/// Undo the spaces WordPiece joining leaves before punctuation and English contractions.
fn cleanup_spacing(text: &str) -> String {
    text.replace(" .", ".")
        .replace(" ?", "?")
        .replace(" !", "!")
        .replace(" ,", ",")
        .replace(" ' ", "'")
        .replace(" n't", "n't")
        .replace(" 'm", "'m")
        .replace(" do not", " don't")
        .replace(" 's", "'s")
        .replace(" 've", "'ve")
        .replace(" 're", "'re")
}
