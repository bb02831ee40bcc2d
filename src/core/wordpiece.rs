//! WordPiece: greedy longest-prefix matching.
//!
//! A word is consumed left to right. At each position the longest vocabulary
//! entry that matches is emitted; every piece after the first is looked up
//! with the continuation prefix (`##` by default). If some position has no
//! match at all, the whole word becomes the unknown token.

use super::model::Token;
use super::vocab::Vocabulary;

pub const DEFAULT_CONTINUING_SUBWORD_PREFIX: &str = "##";
pub const DEFAULT_MAX_INPUT_CHARS_PER_WORD: usize = 100;

#[derive(Debug, Clone)]
pub struct WordPiece {
    unk_token: Option<String>,
    unk_id: Option<u32>,
    prefix: String,
    max_input_chars_per_word: usize,
}

impl WordPiece {
    pub fn new(
        vocab: &Vocabulary,
        unk_token: Option<String>,
        continuing_subword_prefix: Option<String>,
        max_input_chars_per_word: Option<usize>,
    ) -> Self {
        let unk_id = unk_token.as_deref().and_then(|t| vocab.token_to_id(t));
        Self {
            unk_token,
            unk_id,
            prefix: continuing_subword_prefix
                .unwrap_or_else(|| DEFAULT_CONTINUING_SUBWORD_PREFIX.to_string()),
            max_input_chars_per_word: max_input_chars_per_word
                .unwrap_or(DEFAULT_MAX_INPUT_CHARS_PER_WORD),
        }
    }

    pub fn unk_token(&self) -> Option<&str> {
        self.unk_token.as_deref()
    }

    pub fn continuing_subword_prefix(&self) -> &str {
        &self.prefix
    }

    /// Tokenize one word. Offsets are byte ranges within `word`.
    pub fn tokenize(&self, vocab: &Vocabulary, word: &str) -> Vec<Token> {
        if word.is_empty() {
            return Vec::new();
        }
        if word.chars().count() > self.max_input_chars_per_word {
            return self.unknown(vocab, word);
        }

        // Candidate end positions, longest first.
        let boundaries: Vec<usize> = word
            .char_indices()
            .map(|(i, _)| i)
            .skip(1)
            .chain(std::iter::once(word.len()))
            .collect();

        let mut tokens = Vec::new();
        let mut start = 0;
        let mut candidate = String::with_capacity(word.len() + self.prefix.len());
        while start < word.len() {
            let mut found = None;
            for &end in boundaries.iter().rev().take_while(|&&end| end > start) {
                candidate.clear();
                if start > 0 {
                    candidate.push_str(&self.prefix);
                }
                candidate.push_str(&word[start..end]);
                if let Some(id) = vocab.token_to_id(&candidate) {
                    found = Some((id, end));
                    break;
                }
            }
            match found {
                Some((id, end)) => {
                    tokens.push(Token::new(id, candidate.clone(), (start, end)));
                    start = end;
                }
                None => return self.unknown(vocab, word),
            }
        }
        tokens
    }

    fn unknown(&self, vocab: &Vocabulary, word: &str) -> Vec<Token> {
        match self.unk_id {
            Some(id) => {
                let value = vocab.id_to_token(id).unwrap_or_default().to_string();
                vec![Token::new(id, value, (0, word.len()))]
            }
            None => {
                log::debug!("dropping word {word:?}: no WordPiece match and no unknown token");
                Vec::new()
            }
        }
    }
}
