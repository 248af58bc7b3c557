//! Backup codes for when the authenticator is gone.
//!
//! Codes are eight characters from an alphabet without lookalike glyphs
//! (no 0/O, 1/I/L), shown once as `XXXX-XXXX` and stored Argon2-hashed.

use rand::Rng;
use rand::rngs::OsRng;

use crate::error::AuthResult;
use crate::identity::password;

const CODE_ALPHABET: &[u8] = b"ABCDEFGHJKMNPQRSTUVWXYZ23456789";
const CODE_LEN: usize = 8;
const GROUP_LEN: usize = 4;

/// A freshly generated set of backup codes. `plain` is shown to the user
/// exactly once; only `hashes` is ever persisted.
pub struct BackupCodeBatch {
    pub plain: Vec<String>,
    pub hashes: Vec<String>,
}

impl BackupCodeBatch {
    /// Generates `count` codes and hashes them. CPU-bound; run it through
    /// `spawn_blocking` on the request path.
    pub fn generate(count: usize) -> AuthResult<Self> {
        let mut plain = Vec::with_capacity(count);
        let mut hashes = Vec::with_capacity(count);
        for _ in 0..count {
            let code = random_code();
            hashes.push(password::hash(&code)?);
            plain.push(format_code(&code));
        }
        Ok(Self { plain, hashes })
    }
}

fn random_code() -> String {
    let mut rng = OsRng;
    (0..CODE_LEN)
        .map(|_| CODE_ALPHABET[rng.gen_range(0..CODE_ALPHABET.len())] as char)
        .collect()
}

fn format_code(raw: &str) -> String {
    format!("{}-{}", &raw[..GROUP_LEN], &raw[GROUP_LEN..])
}

/// Canonical form for comparison: uppercase, separators stripped. Accepts
/// whatever spacing or hyphenation the user typed.
#[must_use]
pub fn normalize(input: &str) -> String {
    input
        .chars()
        .filter(char::is_ascii_alphanumeric)
        .map(|c| c.to_ascii_uppercase())
        .collect()
}

/// Checks a presented code against a stored hash.
#[must_use]
pub fn verify(presented: &str, hash: &str) -> bool {
    let normalized = normalize(presented);
    if normalized.len() != CODE_LEN {
        return false;
    }
    password::verify(&normalized, hash)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_are_grouped_and_unambiguous() {
        let batch = BackupCodeBatch::generate(3).unwrap();
        assert_eq!(batch.plain.len(), 3);
        assert_eq!(batch.hashes.len(), 3);
        for code in &batch.plain {
            assert_eq!(code.len(), CODE_LEN + 1);
            assert_eq!(code.as_bytes()[GROUP_LEN], b'-');
            for c in code.chars().filter(|c| *c != '-') {
                assert!(CODE_ALPHABET.contains(&(c as u8)), "unexpected char {c}");
            }
        }
    }

    #[test]
    fn normalize_is_forgiving_about_input_shape() {
        assert_eq!(normalize("abcd-efgh"), "ABCDEFGH");
        assert_eq!(normalize(" AB CD EF GH "), "ABCDEFGH");
        assert_eq!(normalize("ABCDEFGH"), "ABCDEFGH");
    }

    #[test]
    fn verify_accepts_displayed_form() {
        let batch = BackupCodeBatch::generate(1).unwrap();
        assert!(verify(&batch.plain[0], &batch.hashes[0]));
        assert!(verify(&batch.plain[0].to_lowercase(), &batch.hashes[0]));
        assert!(!verify("ZZZZ-ZZZZ", &batch.hashes[0]));
    }

    #[test]
    fn verify_rejects_wrong_length() {
        let batch = BackupCodeBatch::generate(1).unwrap();
        assert!(!verify("ABC", &batch.hashes[0]));
        assert!(!verify("", &batch.hashes[0]));
    }
}
