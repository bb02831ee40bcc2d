//! Post-processors: wrap an encoded sequence in its special tokens.

use serde::Deserialize;
use std::collections::HashMap;

use super::encoding::EncodingBuilder;
use super::vocab::Vocabulary;

/// One element of a `TemplateProcessing` template.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub enum TemplatePiece {
    SpecialToken {
        id: String,
        #[serde(default)]
        type_id: u32,
    },
    Sequence {
        id: String,
        #[serde(default)]
        type_id: u32,
    },
}

/// A named special token of a template; it may expand to several IDs.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct TemplateSpecialToken {
    pub id: String,
    pub ids: Vec<u32>,
    pub tokens: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "type")]
pub enum PostProcessor {
    BertProcessing {
        cls: (String, u32),
        sep: (String, u32),
    },
    RobertaProcessing {
        cls: (String, u32),
        sep: (String, u32),
    },
    TemplateProcessing {
        single: Vec<TemplatePiece>,
        #[serde(default)]
        special_tokens: HashMap<String, TemplateSpecialToken>,
    },
    ByteLevel,
    Sequence {
        processors: Vec<PostProcessor>,
    },
}

impl PostProcessor {
    /// Check that the processor only references tokens it can emit: every
    /// special token ID exists in `vocab` and names the same string there.
    pub fn validate(&self, vocab: &Vocabulary) -> Result<(), String> {
        let check = |token: &str, id: u32| match vocab.id_to_token(id) {
            Some(found) if found == token => Ok(()),
            Some(found) => Err(format!(
                "post-processor token {token:?} has id {id}, which the vocabulary assigns to {found:?}"
            )),
            None => Err(format!("post-processor token id {id} is outside the vocabulary")),
        };
        match self {
            PostProcessor::BertProcessing { cls, sep }
            | PostProcessor::RobertaProcessing { cls, sep } => {
                check(&cls.0, cls.1)?;
                check(&sep.0, sep.1)
            }
            PostProcessor::TemplateProcessing {
                single,
                special_tokens,
            } => {
                for piece in single {
                    if let TemplatePiece::SpecialToken { id, .. } = piece {
                        let token = special_tokens
                            .get(id)
                            .ok_or_else(|| format!("template references unknown special token {id:?}"))?;
                        if token.ids.len() != token.tokens.len() {
                            return Err(format!(
                                "special token {id:?} has {} ids but {} tokens",
                                token.ids.len(),
                                token.tokens.len()
                            ));
                        }
                        token
                            .ids
                            .iter()
                            .zip(&token.tokens)
                            .try_for_each(|(&i, t)| check(t, i))?;
                    }
                }
                Ok(())
            }
            PostProcessor::ByteLevel => Ok(()),
            PostProcessor::Sequence { processors } => {
                processors.iter().try_for_each(|p| p.validate(vocab))
            }
        }
    }

    /// IDs of every special token [`apply`](Self::apply) can insert.
    pub fn special_ids(&self) -> Vec<u32> {
        match self {
            PostProcessor::BertProcessing { cls, sep }
            | PostProcessor::RobertaProcessing { cls, sep } => vec![cls.1, sep.1],
            PostProcessor::TemplateProcessing {
                single,
                special_tokens,
            } => single
                .iter()
                .filter_map(|piece| match piece {
                    TemplatePiece::SpecialToken { id, .. } => special_tokens.get(id),
                    TemplatePiece::Sequence { .. } => None,
                })
                .flat_map(|token| token.ids.iter().copied())
                .collect(),
            PostProcessor::ByteLevel => Vec::new(),
            PostProcessor::Sequence { processors } => processors
                .iter()
                .flat_map(PostProcessor::special_ids)
                .collect(),
        }
    }

    /// Number of tokens [`apply`](Self::apply) adds to a single sequence.
    pub fn added_tokens(&self) -> usize {
        match self {
            PostProcessor::BertProcessing { .. } | PostProcessor::RobertaProcessing { .. } => 2,
            PostProcessor::TemplateProcessing {
                single,
                special_tokens,
            } => single
                .iter()
                .map(|piece| match piece {
                    TemplatePiece::SpecialToken { id, .. } => {
                        special_tokens.get(id).map_or(0, |t| t.ids.len())
                    }
                    TemplatePiece::Sequence { .. } => 0,
                })
                .sum(),
            PostProcessor::ByteLevel => 0,
            PostProcessor::Sequence { processors } => {
                processors.iter().map(PostProcessor::added_tokens).sum()
            }
        }
    }

    /// Add the special tokens around `encoding`.
    ///
    /// Tokens placed before the sequence get offsets `(0, 0)`; tokens after it
    /// get `(end, end)` with `end` the last offset end so far.
    pub(crate) fn apply(&self, encoding: EncodingBuilder) -> EncodingBuilder {
        match self {
            PostProcessor::BertProcessing { cls, sep }
            | PostProcessor::RobertaProcessing { cls, sep } => {
                let mut out = EncodingBuilder::default();
                out.push(cls.1, cls.0.clone(), (0, 0), true);
                append(&mut out, encoding, 0);
                let end = last_end(&out);
                out.push(sep.1, sep.0.clone(), (end, end), true);
                out
            }
            PostProcessor::TemplateProcessing {
                single,
                special_tokens,
            } => {
                let mut out = EncodingBuilder::default();
                let mut sequence = Some(encoding);
                for piece in single {
                    match piece {
                        TemplatePiece::SpecialToken { id, type_id } => {
                            let Some(token) = special_tokens.get(id) else {
                                continue;
                            };
                            let at = if sequence.is_some() { 0 } else { last_end(&out) };
                            for (&tid, value) in token.ids.iter().zip(&token.tokens) {
                                out.push(tid, value.clone(), (at, at), true);
                                if let Some(last) = out.type_ids.last_mut() {
                                    *last = *type_id;
                                }
                            }
                        }
                        TemplatePiece::Sequence { type_id, .. } => {
                            if let Some(seq) = sequence.take() {
                                append(&mut out, seq, *type_id);
                            }
                        }
                    }
                }
                out
            }
            PostProcessor::ByteLevel => encoding,
            PostProcessor::Sequence { processors } => processors
                .iter()
                .fold(encoding, |enc, processor| processor.apply(enc)),
        }
    }
}

fn append(out: &mut EncodingBuilder, seq: EncodingBuilder, type_id: u32) {
    out.ids.extend(seq.ids);
    out.tokens.extend(seq.tokens);
    out.type_ids.extend(std::iter::repeat(type_id).take(seq.type_ids.len()));
    out.special.extend(seq.special);
    out.offsets.extend(seq.offsets);
}

fn last_end(enc: &EncodingBuilder) -> usize {
    enc.offsets.last().map_or(0, |o| o.1)
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Vocabulary whose IDs are the positions in `tokens`.
    fn vocab(tokens: &[&str]) -> Vocabulary {
        let map: HashMap<String, u32> = tokens
            .iter()
            .enumerate()
            .map(|(i, t)| (t.to_string(), i as u32))
            .collect();
        Vocabulary::build(&map, &[]).unwrap()
    }

    fn sequence() -> EncodingBuilder {
        let mut b = EncodingBuilder::default();
        b.push(5, "hi".into(), (0, 2), false);
        b.push(6, "there".into(), (3, 8), false);
        b
    }

    #[test]
    fn test_bert_processing() {
        let json = r#"{"type":"BertProcessing","sep":["[SEP]",102],"cls":["[CLS]",101]}"#;
        let processor: PostProcessor = serde_json::from_str(json).unwrap();
        assert_eq!(processor.added_tokens(), 2);
        let out = processor.apply(sequence());
        assert_eq!(out.ids, vec![101, 5, 6, 102]);
        assert_eq!(out.special, vec![1, 0, 0, 1]);
        assert_eq!(out.offsets, vec![(0, 0), (0, 2), (3, 8), (8, 8)]);
        assert_eq!(out.type_ids, vec![0, 0, 0, 0]);
    }

    #[test]
    fn test_template_processing() {
        let json = r#"{
            "type": "TemplateProcessing",
            "single": [
                {"SpecialToken": {"id": "<s>", "type_id": 0}},
                {"Sequence": {"id": "A", "type_id": 1}}
            ],
            "pair": [],
            "special_tokens": {"<s>": {"id": "<s>", "ids": [1], "tokens": ["<s>"]}}
        }"#;
        let processor: PostProcessor = serde_json::from_str(json).unwrap();
        assert!(processor.validate(&vocab(&["<unk>", "<s>", "a"])).is_ok());
        assert!(processor.validate(&vocab(&["<unk>"])).is_err());
        assert_eq!(processor.special_ids(), vec![1]);
        assert_eq!(processor.added_tokens(), 1);
        let out = processor.apply(sequence());
        assert_eq!(out.ids, vec![1, 5, 6]);
        assert_eq!(out.tokens[0], "<s>");
        assert_eq!(out.type_ids, vec![0, 1, 1]);
    }

    #[test]
    fn test_template_with_missing_special_token_is_invalid() {
        let processor = PostProcessor::TemplateProcessing {
            single: vec![TemplatePiece::SpecialToken {
                id: "[CLS]".into(),
                type_id: 0,
            }],
            special_tokens: HashMap::new(),
        };
        assert!(processor.validate(&vocab(&["[CLS]"])).is_err());
    }

    #[test]
    fn test_validate_rejects_mismatched_token_string() {
        let processor = PostProcessor::BertProcessing {
            cls: ("[CLS]".into(), 0),
            sep: ("[SEP]".into(), 1),
        };
        assert!(processor.validate(&vocab(&["[CLS]", "[SEP]"])).is_ok());
        let err = processor.validate(&vocab(&["[CLS]", "hello"])).unwrap_err();
        assert!(err.contains("\"hello\""), "{err}");
    }

    #[test]
    fn test_special_ids_of_sequence() {
        let processor = PostProcessor::Sequence {
            processors: vec![
                PostProcessor::ByteLevel,
                PostProcessor::RobertaProcessing {
                    cls: ("<s>".into(), 0),
                    sep: ("</s>".into(), 2),
                },
            ],
        };
        assert_eq!(processor.special_ids(), vec![0, 2]);
    }

    #[test]
    fn test_byte_level_is_identity() {
        let json = r#"{"type":"ByteLevel","add_prefix_space":true,"trim_offsets":false,"use_regex":true}"#;
        let processor: PostProcessor = serde_json::from_str(json).unwrap();
        assert_eq!(processor.apply(sequence()), sequence());
    }

    #[test]
    fn test_empty_sequence_gets_zero_offsets() {
        let processor = PostProcessor::BertProcessing {
            cls: ("[CLS]".into(), 0),
            sep: ("[SEP]".into(), 1),
        };
        let out = processor.apply(EncodingBuilder::default());
        assert_eq!(out.offsets, vec![(0, 0), (0, 0)]);
    }
}
