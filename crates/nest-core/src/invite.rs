//! Invite Codes
//!
//! Short human-shareable codes that let a second partner join an
//! existing couple. Codes are 6 uppercase alphanumeric characters,
//! generated from UUID entropy; matching is always case-insensitive.

use uuid::Uuid;

/// Length of an invite code.
pub const CODE_LEN: usize = 6;

const ALPHABET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";

/// Generate a fresh invite code.
pub fn generate() -> String {
    let id = Uuid::new_v4();
    id.as_bytes()
        .iter()
        .take(CODE_LEN)
        .map(|b| ALPHABET[usize::from(*b) % ALPHABET.len()] as char)
        .collect()
}

/// Normalize user input before lookup: trim and uppercase.
pub fn normalize(code: &str) -> String {
    code.trim().to_uppercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_code_shape() {
        for _ in 0..100 {
            let code = generate();
            assert_eq!(code.len(), CODE_LEN);
            assert!(code.chars().all(|c| c.is_ascii_uppercase() || c.is_ascii_digit()));
        }
    }

    #[test]
    fn test_normalize() {
        assert_eq!(normalize("  ab12cd "), "AB12CD");
        assert_eq!(normalize("XY99ZZ"), "XY99ZZ");
    }
}
