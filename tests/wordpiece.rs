//! BERT-style tokenizer: BertNormalizer, BertPreTokenizer, WordPiece and
//! BertProcessing.

use std::sync::LazyLock;
use tokenbind::core::model::Model;
use tokenbind::{EncodeOptions, Tokenizer, TokenizerHandle, TruncationDirection};

const DESCRIPTION: &str = r###"{
    "version": "1.0",
    "truncation": null,
    "padding": null,
    "added_tokens": [
        {"id": 0, "content": "[PAD]", "single_word": false, "lstrip": false, "rstrip": false, "normalized": false, "special": true},
        {"id": 1, "content": "[UNK]", "single_word": false, "lstrip": false, "rstrip": false, "normalized": false, "special": true},
        {"id": 2, "content": "[CLS]", "single_word": false, "lstrip": false, "rstrip": false, "normalized": false, "special": true},
        {"id": 3, "content": "[SEP]", "single_word": false, "lstrip": false, "rstrip": false, "normalized": false, "special": true}
    ],
    "normalizer": {
        "type": "BertNormalizer",
        "clean_text": true,
        "handle_chinese_chars": true,
        "strip_accents": null,
        "lowercase": true
    },
    "pre_tokenizer": {"type": "BertPreTokenizer"},
    "post_processor": {
        "type": "BertProcessing",
        "sep": ["[SEP]", 3],
        "cls": ["[CLS]", 2]
    },
    "decoder": {"type": "WordPiece", "prefix": "##", "cleanup": true},
    "model": {
        "type": "WordPiece",
        "unk_token": "[UNK]",
        "continuing_subword_prefix": "##",
        "max_input_chars_per_word": 100,
        "vocab": {
            "[PAD]": 0, "[UNK]": 1, "[CLS]": 2, "[SEP]": 3,
            "hello": 4, "world": 5, ",": 6, "!": 7,
            "play": 8, "##ing": 9, "##ed": 10
        }
    }
}"###;

static BERT: LazyLock<Tokenizer> =
    LazyLock::new(|| Tokenizer::from_bytes(DESCRIPTION.as_bytes()).unwrap());

#[test]
fn test_model_kind() {
    assert!(matches!(BERT.model(), Model::WordPiece(_)));
    assert_eq!(BERT.vocab_size(), 11);
}

#[test]
fn test_bert_sentence() {
    let text = "Hello, PLAYING world!";
    let encoding = BERT
        .encode_with_options(text, true, &EncodeOptions::all())
        .unwrap();
    assert_eq!(encoding.ids, vec![2, 4, 6, 8, 9, 5, 7, 3]);
    assert_eq!(
        encoding.tokens,
        vec!["[CLS]", "hello", ",", "play", "##ing", "world", "!", "[SEP]"]
    );
    assert_eq!(
        encoding.offsets,
        Some(vec![
            (0, 0),
            (0, 5),
            (5, 6),
            (7, 11),
            (11, 14),
            (15, 20),
            (20, 21),
            (21, 21)
        ])
    );
    assert_eq!(encoding.special_tokens_mask, Some(vec![1, 0, 0, 0, 0, 0, 0, 1]));
    assert_eq!(encoding.type_ids, Some(vec![0; 8]));

    assert_eq!(
        BERT.decode(&encoding.ids, true).unwrap(),
        "hello, playing world!"
    );
}

#[test]
fn test_unknown_words() {
    let encoding = BERT.encode("hello xyz played", false).unwrap();
    assert_eq!(encoding.ids, vec![4, 1, 8, 10]);

    let long_word = "play".repeat(30);
    assert_eq!(BERT.encode(&long_word, false).unwrap().ids, vec![1]);
}

#[test]
fn test_accents_are_stripped() {
    let encoding = BERT
        .encode_with_options("Héllo", false, &EncodeOptions::new().with_offsets())
        .unwrap();
    assert_eq!(encoding.ids, vec![4]);
    assert_eq!(encoding.offsets, Some(vec![(0, 6)]));
}

#[test]
fn test_special_tokens_in_text() {
    let encoding = BERT
        .encode_with_options("hello [SEP] world", false, &EncodeOptions::all())
        .unwrap();
    assert_eq!(encoding.ids, vec![4, 3, 5]);
    assert_eq!(encoding.special_tokens_mask, Some(vec![0, 1, 0]));
    assert_eq!(encoding.offsets, Some(vec![(0, 5), (6, 11), (12, 17)]));
}

#[test]
fn test_empty_with_special_tokens() {
    let encoding = BERT
        .encode_with_options("", true, &EncodeOptions::new().with_offsets())
        .unwrap();
    assert_eq!(encoding.ids, vec![2, 3]);
    assert_eq!(encoding.offsets, Some(vec![(0, 0), (0, 0)]));
}

#[test]
fn test_truncation_keeps_special_tokens() {
    let handle =
        TokenizerHandle::from_bytes_with_truncation(DESCRIPTION.as_bytes(), 4, TruncationDirection::Right)
            .unwrap();
    let encoding = handle.encode("hello, playing world!", true).unwrap();
    assert_eq!(encoding.ids, vec![2, 4, 6, 3]);

    let handle =
        TokenizerHandle::from_bytes_with_truncation(DESCRIPTION.as_bytes(), 4, TruncationDirection::Left)
            .unwrap();
    let encoding = handle.encode("hello, playing world!", true).unwrap();
    assert_eq!(encoding.ids, vec![2, 5, 7, 3]);
}

#[test]
fn test_decode_keeps_special_tokens_when_asked() {
    assert_eq!(BERT.decode(&[2, 4, 3], false).unwrap(), "[CLS] hello [SEP]");
}
