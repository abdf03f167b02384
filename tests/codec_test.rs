//! Token codec tests
//!
//! Covers the round trip, tamper detection and the exact token format, which
//! must stay stable so previously issued links keep working.

use linkproxy::codec::{TokenCodec, SIGNATURE_LEN};
use linkproxy::error::TokenError;

const SECRET: &str = "test-secret";

#[test]
fn test_round_trip_preserves_url() {
    let codec = TokenCodec::new(SECRET);

    let urls = [
        "https://www.google.com",
        "https://example.com/path?query=value&param=123",
        "https://example.com/a b/c?d=e f#frag",
        "http://127.0.0.1:8080/~user/index.html",
        "https://日本語.com/こんにちは?検索=世界",
        "https://example.com/already%20escaped",
        "data:text/html,<h1>hi</h1>",
    ];

    for url in urls {
        let token = codec.encode(url);
        assert_eq!(codec.decode(&token).unwrap(), url, "round trip failed for {url}");
    }
}

#[test]
fn test_known_token_format() {
    let codec = TokenCodec::new("mySecretKey123");

    assert_eq!(
        codec.encode("https://example.com"),
        "3eed359baHR0cHMlM0EvL2V4YW1wbGUuY29t"
    );
    assert_eq!(
        codec.encode("https://example.com/c.png"),
        "d588e24aaHR0cHMlM0EvL2V4YW1wbGUuY29tL2MucG5n"
    );
}

#[test]
fn test_token_is_url_safe() {
    let codec = TokenCodec::new(SECRET);
    let token = codec.encode("https://example.com/?q=~!@#$%^&*()+=/?><");

    assert!(token
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_'));
    assert!(!token.ends_with('='));
}

#[test]
fn test_single_character_tampering_is_rejected() {
    let codec = TokenCodec::new(SECRET);
    let token = codec.encode("https://example.com/path?query=value&param=123");
    assert_eq!(token, "65040058aHR0cHMlM0EvL2V4YW1wbGUuY29tL3BhdGglM0ZxdWVyeSUzRHZhbHVlJTI2cGFyYW0lM0QxMjM");

    for (i, c) in token.char_indices() {
        let replacement = if i < SIGNATURE_LEN {
            if c == '0' { '1' } else { '0' }
        } else if c == 'b' {
            'c'
        } else {
            'b'
        };

        let mut tampered = token.clone();
        tampered.replace_range(i..i + 1, &replacement.to_string());

        assert!(
            codec.decode(&tampered).is_err(),
            "tampered token at position {i} was accepted"
        );
    }
}

#[test]
fn test_signature_mismatch_reported() {
    let codec = TokenCodec::new(SECRET);
    let token = codec.encode("https://example.com");
    let forged = format!("00000000{}", &token[SIGNATURE_LEN..]);

    assert_eq!(codec.decode(&forged), Err(TokenError::SignatureMismatch));
}

#[test]
fn test_short_tokens_rejected() {
    let codec = TokenCodec::new(SECRET);

    for token in ["", "a", "invalid", "1234567"] {
        assert_eq!(codec.decode(token), Err(TokenError::TooShort));
    }
}

#[test]
fn test_multibyte_prefix_rejected_without_panic() {
    let codec = TokenCodec::new(SECRET);

    assert!(codec.decode("ééééé").is_err());
    assert!(codec.decode("1234567éabc").is_err());
}

#[test]
fn test_other_key_rejects_token() {
    let issuer = TokenCodec::new(SECRET);
    let other = TokenCodec::new("another-secret");
    let token = issuer.encode("https://example.com");

    assert_eq!(other.decode(&token), Err(TokenError::SignatureMismatch));
}

#[test]
fn test_appended_garbage_rejected() {
    let codec = TokenCodec::new(SECRET);
    let token = codec.encode("https://www.google.com");

    assert!(codec.decode(&format!("{token}corrupted")).is_err());
    assert!(codec.decode("00000000aaaaaaaaaaaa").is_err());
}

#[test]
fn test_empty_url_is_just_a_signature() {
    let codec = TokenCodec::new(SECRET);
    let token = codec.encode("");

    assert_eq!(token.len(), SIGNATURE_LEN);
    assert_eq!(codec.decode(&token).unwrap(), "");
}
