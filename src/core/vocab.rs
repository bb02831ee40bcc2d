//! Vocabulary store: the dense, immutable `token <-> id` table.
//!
//! The model vocabulary and the added tokens of a description are merged into
//! one table at load time. After that the table never changes, so lookups in
//! both directions are plain reads.
//!
//! # Invariants
//!
//! - IDs cover `[0, len)` with no gaps
//! - every token string appears once and every ID maps to exactly one token
//!
//! Anything else is rejected with a [`VocabError`].

use rustc_hash::FxHashMap;
use std::collections::HashMap;
use thiserror::Error;

/// Errors raised while assembling a vocabulary.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum VocabError {
    #[error("token id {id} is assigned to both {first:?} and {second:?}")]
    DuplicateId {
        id: u32,
        first: String,
        second: String,
    },
    #[error("token {token:?} is assigned to both id {first} and id {second}")]
    DuplicateToken {
        token: String,
        first: u32,
        second: u32,
    },
    #[error("token ids are not dense: id {0} is missing")]
    MissingId(u32),
}

/// Bidirectional token table.
#[derive(Debug, Clone, Default)]
pub struct Vocabulary {
    token_to_id: FxHashMap<String, u32>,
    id_to_token: Vec<String>,
}

impl Vocabulary {
    /// Build a vocabulary from the model's token map plus added tokens.
    ///
    /// An added token that repeats a model entry exactly (same content, same
    /// id) is accepted; every other collision is an error.
    ///
    /// # Arguments
    /// * `model` - Token map from the model section
    /// * `added` - `(content, id)` pairs from the added tokens section
    pub fn build(model: &HashMap<String, u32>, added: &[(String, u32)]) -> Result<Self, VocabError> {
        let mut token_to_id: FxHashMap<String, u32> =
            FxHashMap::with_capacity_and_hasher(model.len() + added.len(), Default::default());
        let mut by_id: FxHashMap<u32, String> =
            FxHashMap::with_capacity_and_hasher(model.len() + added.len(), Default::default());

        let entries = model
            .iter()
            .map(|(token, &id)| (token.as_str(), id, false))
            .chain(added.iter().map(|(token, id)| (token.as_str(), *id, true)));

        for (token, id, is_added) in entries {
            match (token_to_id.get(token), by_id.get(&id)) {
                (Some(&existing), Some(owner)) if is_added && existing == id && owner == token => {
                    continue;
                }
                (Some(&existing), _) => {
                    return Err(VocabError::DuplicateToken {
                        token: token.to_string(),
                        first: existing,
                        second: id,
                    });
                }
                (None, Some(owner)) => {
                    return Err(VocabError::DuplicateId {
                        id,
                        first: owner.clone(),
                        second: token.to_string(),
                    });
                }
                (None, None) => {
                    token_to_id.insert(token.to_string(), id);
                    by_id.insert(id, token.to_string());
                }
            }
        }

        let len = by_id.len() as u32;
        let mut id_to_token = Vec::with_capacity(by_id.len());
        for id in 0..len {
            match by_id.remove(&id) {
                Some(token) => id_to_token.push(token),
                None => return Err(VocabError::MissingId(id)),
            }
        }

        Ok(Self {
            token_to_id,
            id_to_token,
        })
    }

    #[inline]
    pub fn token_to_id(&self, token: &str) -> Option<u32> {
        self.token_to_id.get(token).copied()
    }

    #[inline]
    pub fn id_to_token(&self, id: u32) -> Option<&str> {
        self.id_to_token.get(id as usize).map(String::as_str)
    }

    /// Number of entries, model and added tokens together.
    #[inline]
    pub fn len(&self) -> usize {
        self.id_to_token.len()
    }

    pub fn is_empty(&self) -> bool {
        self.id_to_token.is_empty()
    }
}
