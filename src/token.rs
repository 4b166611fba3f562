use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use rand::RngCore;

/// Random bytes behind an email verification token (48 base64 chars).
const VERIFICATION_TOKEN_BYTES: usize = 36;

/// Generate an unguessable, URL-safe verification token
pub fn generate_verification_token() -> String {
    let mut bytes = [0u8; VERIFICATION_TOKEN_BYTES];
    rand::thread_rng().fill_bytes(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

/// Cheap shape check before hitting the database
pub fn looks_like_verification_token(token: &str) -> bool {
    token.len() == VERIFICATION_TOKEN_BYTES / 3 * 4
        && URL_SAFE_NO_PAD
            .decode(token)
            .is_ok_and(|bytes| bytes.len() == VERIFICATION_TOKEN_BYTES)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_token_length_and_alphabet() {
        let token = generate_verification_token();
        assert_eq!(token.len(), 48);
        assert!(token
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_'));
        assert!(looks_like_verification_token(&token));
    }

    #[test]
    fn test_tokens_are_unique() {
        assert_ne!(generate_verification_token(), generate_verification_token());
    }

    #[test]
    fn test_rejects_malformed_tokens() {
        assert!(!looks_like_verification_token(""));
        assert!(!looks_like_verification_token("short"));
        assert!(!looks_like_verification_token(&"!".repeat(48)));
    }
}
