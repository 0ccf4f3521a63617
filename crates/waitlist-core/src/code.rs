//! # Verification Codes
//!
//! Short human-readable codes handed to the customer at join time and checked
//! by the host when seating.
//!
//! The alphabet leaves out `0 O 1 I` so a code read aloud or off a phone
//! screen cannot be mistyped into another valid code.

use rand::Rng;

/// Length of a generated code.
pub const VERIFICATION_CODE_LEN: usize = 6;

const ALPHABET: &[u8; 32] = b"ABCDEFGHJKLMNPQRSTUVWXYZ23456789";

/// Generates a new verification code.
///
/// ## Example
/// ```rust
/// use waitlist_core::code::{generate_verification_code, VERIFICATION_CODE_LEN};
///
/// let code = generate_verification_code();
/// assert_eq!(code.len(), VERIFICATION_CODE_LEN);
/// ```
pub fn generate_verification_code() -> String {
    let mut rng = rand::thread_rng();
    (0..VERIFICATION_CODE_LEN)
        .map(|_| ALPHABET[rng.gen_range(0..ALPHABET.len())] as char)
        .collect()
}

/// Compares a supplied code against the stored one.
///
/// Surrounding whitespace is ignored and the comparison is ASCII
/// case-insensitive.
///
/// ```rust
/// use waitlist_core::code::codes_match;
///
/// assert!(codes_match("K7QX2M", " k7qx2m "));
/// assert!(!codes_match("K7QX2M", "K7QX2N"));
/// ```
pub fn codes_match(stored: &str, supplied: &str) -> bool {
    let supplied = supplied.trim();
    !supplied.is_empty() && stored.trim().eq_ignore_ascii_case(supplied)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generated_code_uses_alphabet() {
        for _ in 0..100 {
            let code = generate_verification_code();
            assert_eq!(code.len(), VERIFICATION_CODE_LEN);
            assert!(code.bytes().all(|b| ALPHABET.contains(&b)));
        }
    }

    #[test]
    fn test_generated_codes_differ() {
        let codes: std::collections::HashSet<String> =
            (0..50).map(|_| generate_verification_code()).collect();
        // 32^6 possibilities; 50 draws colliding down to a handful means no randomness
        assert!(codes.len() > 45);
    }

    #[test]
    fn test_codes_match_case_insensitive() {
        assert!(codes_match("ABC234", "abc234"));
        assert!(codes_match("ABC234", "AbC234"));
        assert!(!codes_match("ABC234", "ABC235"));
        assert!(!codes_match("ABC234", ""));
        assert!(!codes_match("ABC234", "   "));
    }
}
