use super::*;

#[test]
fn test_tokenize_maps_bytes() {
    assert_eq!(tokenize("Hi!"), vec![72, 105, 33]);
    assert!(tokenize("").is_empty());
}

#[test]
fn test_tokenize_multibyte_is_one_token_per_byte() {
    // 'é' is two bytes in UTF-8.
    assert_eq!(tokenize("é"), vec![0xC3, 0xA9]);
}

#[test]
fn test_round_trip() {
    for text in ["", "A", "hello world", "tab\tnewline\n", "naïve café ✓", "\u{0}\u{7f}"] {
        assert_eq!(detokenize(&tokenize(text)), text);
    }
}

#[test]
fn test_detokenize_drops_out_of_range_tokens() {
    assert_eq!(detokenize(&[72, 256, 105, 1000]), "Hi");
    assert_eq!(detokenize_bytes(&[0, 255, 256]), vec![0, 255]);
}

#[test]
fn test_all_byte_values_round_trip_as_bytes() {
    let tokens = (0..BYTE_VOCAB_SIZE).collect::<Vec<_>>();
    let bytes = detokenize_bytes(&tokens);
    assert_eq!(bytes.len(), 256);
    assert!(bytes.iter().enumerate().all(|(i, &b)| b as usize == i));
}
