//! The tokenization model: turns one pre-tokenized piece into tokens.

use super::bpe::Bpe;
use super::normalizer::Offsets;
use super::vocab::Vocabulary;
use super::wordpiece::WordPiece;

/// A token produced by the model.
///
/// `offsets` are byte offsets into the piece the model was given; the
/// tokenizer maps them back to the original text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    pub id: u32,
    pub value: String,
    pub offsets: Offsets,
}

impl Token {
    pub fn new(id: u32, value: String, offsets: Offsets) -> Self {
        Self { id, value, offsets }
    }
}

/// Whole-piece lookup, else the unknown token.
#[derive(Debug, Clone)]
pub struct WordLevel {
    unk_token: Option<String>,
    unk_id: Option<u32>,
}

impl WordLevel {
    pub fn new(vocab: &Vocabulary, unk_token: Option<String>) -> Self {
        let unk_id = unk_token.as_deref().and_then(|t| vocab.token_to_id(t));
        Self { unk_token, unk_id }
    }

    pub fn tokenize(&self, vocab: &Vocabulary, word: &str) -> Vec<Token> {
        if word.is_empty() {
            return Vec::new();
        }
        let span = (0, word.len());
        if let Some(id) = vocab.token_to_id(word) {
            return vec![Token::new(id, word.to_string(), span)];
        }
        match self.unk_id {
            Some(id) => {
                let value = vocab.id_to_token(id).unwrap_or_default().to_string();
                vec![Token::new(id, value, span)]
            }
            None => {
                log::debug!("dropping word {word:?}: not in the vocabulary and no unknown token");
                Vec::new()
            }
        }
    }
}

#[derive(Debug, Clone)]
pub enum Model {
    Bpe(Bpe),
    WordPiece(WordPiece),
    WordLevel(WordLevel),
}

impl Model {
    /// Tokenize one piece; never fails, unmatched fragments become the unknown token or vanish.
    pub fn tokenize(&self, vocab: &Vocabulary, piece: &str) -> Vec<Token> {
        match self {
            Model::Bpe(bpe) => bpe.tokenize(vocab, piece),
            Model::WordPiece(wp) => wp.tokenize(vocab, piece),
            Model::WordLevel(wl) => wl.tokenize(vocab, piece),
        }
    }

    pub fn unk_token(&self) -> Option<&str> {
        match self {
            Model::Bpe(bpe) => bpe.unk_token(),
            Model::WordPiece(wp) => wp.unk_token(),
            Model::WordLevel(wl) => wl.unk_token.as_deref(),
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Model::Bpe(_) => "BPE",
            Model::WordPiece(_) => "WordPiece",
            Model::WordLevel(_) => "WordLevel",
        }
    }
}
