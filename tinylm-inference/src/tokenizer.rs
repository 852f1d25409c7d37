//! Byte-level tokenizer.
//!
//! Every byte of the input is one token with the byte's value (0..=255). There is
//! no vocabulary and no merging; ids outside the byte range are dropped on decode.

/// Number of distinct byte tokens.
pub const BYTE_VOCAB_SIZE: u32 = 256;

/// Maps each byte of `text` to its value.
pub fn tokenize(text: &str) -> Vec<u32> {
    text.bytes().map(u32::from).collect()
}

/// Maps tokens back to bytes, silently skipping ids `>= 256`.
pub fn detokenize_bytes(tokens: &[u32]) -> Vec<u8> {
    tokens.iter().filter_map(|&token| u8::try_from(token).ok()).collect()
}

/// Decodes tokens to text. Byte sequences which are not valid UTF-8 are replaced
/// with `U+FFFD`.
pub fn detokenize(tokens: &[u32]) -> String {
    String::from_utf8_lossy(&detokenize_bytes(tokens)).into_owned()
}

#[cfg(test)]
#[path = "../tests/unit/tokenizer_test.rs"]
mod tokenizer_test;
