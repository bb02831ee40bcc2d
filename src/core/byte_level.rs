//! ByteLevel byte <-> character mapping.
//!
//! ByteLevel tokenizers (GPT-2, RoBERTa, Llama 3) never feed raw bytes to the
//! model. Every byte of the input is first replaced with a printable Unicode
//! character, so vocabulary entries are ordinary strings such as `Ġhello`
//! (`Ġ` is the stand-in for a space).
//!
//! # Mapping Strategy
//!
//! - Bytes 33-126, 161-172 and 174-255 map to the character with the same code point
//! - The remaining 68 bytes (control characters, space, 127-160, 173) map to
//!   U+0100 onwards, in byte order
//!
//! The table is identical to the one used by HuggingFace `tokenizers`, so
//! vocabularies exported from it load unchanged.

use rustc_hash::FxHashMap;
use std::sync::LazyLock;

/// Splitting pattern applied by the ByteLevel pre-tokenizer when `use_regex` is set.
pub const GPT2_PATTERN: &str =
    r"'s|'t|'re|'ve|'m|'ll|'d| ?\p{L}+| ?\p{N}+| ?[^\s\p{L}\p{N}]+|\s+(?!\S)|\s+";

const fn is_direct_byte(b: u8) -> bool {
    matches!(b, 33..=126 | 161..=172 | 174..=255)
}

static BYTE_TO_CHAR: LazyLock<[char; 256]> = LazyLock::new(|| {
    let mut mapping = ['\0'; 256];
    let mut next = 256u32;
    for b in 0u8..=255 {
        mapping[b as usize] = if is_direct_byte(b) {
            b as char
        } else {
            let ch = char::from_u32(next).unwrap_or(char::REPLACEMENT_CHARACTER);
            next += 1;
            ch
        };
    }
    mapping
});

static CHAR_TO_BYTE: LazyLock<FxHashMap<char, u8>> = LazyLock::new(|| {
    BYTE_TO_CHAR
        .iter()
        .enumerate()
        .map(|(byte, &ch)| (ch, byte as u8))
        .collect()
});

/// The printable character standing in for `byte`.
#[inline]
pub fn byte_level_char(byte: u8) -> char {
    BYTE_TO_CHAR[byte as usize]
}

/// Map every byte of `bytes` to its ByteLevel character.
pub fn byte_level_encode(bytes: &[u8]) -> String {
    bytes.iter().map(|&b| byte_level_char(b)).collect()
}

/// Map a ByteLevel string back to raw bytes.
///
/// Returns `None` as soon as a character outside the ByteLevel alphabet is
/// seen, which happens for added tokens written in plain text (`▁`, CJK).
pub fn byte_level_decode(text: &str) -> Option<Vec<u8>> {
    text.chars()
        .map(|ch| CHAR_TO_BYTE.get(&ch).copied())
        .collect()
}

/// Decode a ByteLevel token, falling back to the token's own UTF-8 bytes when
/// it is not made of ByteLevel characters.
pub fn byte_level_decode_token(token: &str) -> Vec<u8> {
    byte_level_decode(token).unwrap_or_else(|| token.as_bytes().to_vec())
}
