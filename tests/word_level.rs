//! Integration tests for a whitespace + WordLevel tokenizer.
//!
//! These tests pin the basic encode/decode contract: exact IDs for a known
//! input, determinism, attribute lengths and error behavior.

use std::sync::LazyLock;
use tokenbind::{EncodeOptions, ErrorKind, Tokenizer, TokenizerError};

const DESCRIPTION: &str = r#"{
    "version": "1.0",
    "truncation": null,
    "padding": null,
    "added_tokens": [],
    "normalizer": null,
    "pre_tokenizer": {"type": "Whitespace"},
    "post_processor": null,
    "decoder": null,
    "model": {
        "type": "WordLevel",
        "vocab": {"hello": 0, ",": 1, "world": 2, "!": 3, "[UNK]": 4},
        "unk_token": "[UNK]"
    }
}"#;

/// Shared tokenizer instance to avoid re-parsing per test.
static TOKENIZER: LazyLock<Tokenizer> =
    LazyLock::new(|| Tokenizer::from_bytes(DESCRIPTION.as_bytes()).unwrap());

#[test]
fn test_hello_world_ids() {
    let encoding = TOKENIZER.encode("hello, world!", false).unwrap();
    assert_eq!(encoding.ids, vec![0, 1, 2, 3]);
    assert_eq!(encoding.tokens, vec!["hello", ",", "world", "!"]);
    assert_eq!(encoding.type_ids, None);
    assert_eq!(encoding.offsets, None);
}

#[test]
fn test_hello_world_decode() {
    // No decoder in the description: tokens are joined with single spaces.
    let text = TOKENIZER.decode(&[0, 1, 2, 3], false).unwrap();
    assert_eq!(text, "hello , world !");
}

#[test]
fn test_vocab_size() {
    assert_eq!(TOKENIZER.vocab_size(), 5);
}

#[test]
fn test_unknown_words_never_fail() {
    let encoding = TOKENIZER.encode("hello mars", false).unwrap();
    assert_eq!(encoding.ids, vec![0, 4]);
}

#[test]
fn test_repeated_encodes_are_identical() {
    let text = "hello, world! hello mars, hello world";
    let first = TOKENIZER
        .encode_with_options(text, true, &EncodeOptions::all())
        .unwrap();
    for _ in 0..1000 {
        let again = TOKENIZER
            .encode_with_options(text, true, &EncodeOptions::all())
            .unwrap();
        assert_eq!(again, first);
    }
}

#[test]
fn test_decode_is_deterministic() {
    let ids = [0, 1, 2, 3, 4, 0];
    let first = TOKENIZER.decode(&ids, false).unwrap();
    for _ in 0..100 {
        assert_eq!(TOKENIZER.decode(&ids, false).unwrap(), first);
    }
}

#[test]
fn test_all_attributes_have_the_same_length() {
    let texts = ["", "hello", "hello, world!", "  mars   venus!! ", "hello\tworld\n"];
    for text in texts {
        let encoding = TOKENIZER
            .encode_with_options(text, true, &EncodeOptions::all())
            .unwrap();
        let n = encoding.ids.len();
        assert_eq!(encoding.tokens.len(), n, "{text:?}");
        assert_eq!(encoding.type_ids.as_ref().map(Vec::len), Some(n));
        assert_eq!(encoding.attention_mask.as_ref().map(Vec::len), Some(n));
        assert_eq!(encoding.special_tokens_mask.as_ref().map(Vec::len), Some(n));
        assert_eq!(encoding.offsets.as_ref().map(Vec::len), Some(n));
        assert!(encoding.attention_mask.unwrap().iter().all(|&m| m == 1));
    }
}

#[test]
fn test_offsets_are_ordered_and_in_range() {
    let text = "hello,   world!mars";
    let encoding = TOKENIZER
        .encode_with_options(text, false, &EncodeOptions::new().with_offsets())
        .unwrap();
    let offsets = encoding.offsets.unwrap();
    assert_eq!(offsets, vec![(0, 5), (5, 6), (9, 14), (14, 15), (15, 19)]);
    for pair in offsets.windows(2) {
        assert!(pair[0].0 <= pair[1].0 && pair[0].1 <= pair[1].1);
    }
    assert!(offsets.iter().all(|&(s, e)| s <= e && e <= text.len()));
}

#[test]
fn test_empty_input() {
    let encoding = TOKENIZER
        .encode_with_options("", false, &EncodeOptions::all())
        .unwrap();
    assert!(encoding.is_empty());
    assert_eq!(encoding.offsets, Some(vec![]));
    assert_eq!(TOKENIZER.decode(&[], true).unwrap(), "");
}

#[test]
fn test_out_of_range_decode() {
    let err = TOKENIZER.decode(&[0, 5], false).unwrap_err();
    assert!(matches!(err, TokenizerError::InvalidInput(_)));
    assert_eq!(err.kind(), ErrorKind::InvalidInput);
    assert!(TOKENIZER.decode(&[u32::MAX], false).is_err());
}

#[test]
fn test_shared_across_threads() {
    let handles: Vec<_> = (0..8)
        .map(|_| {
            std::thread::spawn(|| {
                (0..100)
                    .map(|_| TOKENIZER.encode("hello, world!", false).unwrap().ids)
                    .collect::<Vec<_>>()
            })
        })
        .collect();
    for handle in handles {
        for ids in handle.join().unwrap() {
            assert_eq!(ids, vec![0, 1, 2, 3]);
        }
    }
}
