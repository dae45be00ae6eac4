//! Random authorization code generation.

use rand::{RngCore, rngs::OsRng};

use crate::errors::CodeGenError;

/// Alphabet authorization codes are drawn from.
pub const CODE_ALPHABET: &[u8; 62] =
    b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789";

/// Largest multiple of the alphabet size that fits in a byte. Bytes at or
/// above it are rejected so every symbol is equally likely.
const REJECTION_BOUND: u8 = (256 / CODE_ALPHABET.len() * CODE_ALPHABET.len()) as u8;

/// Generate `length` characters drawn uniformly from [`CODE_ALPHABET`].
///
/// Bytes come straight from the operating system CSPRNG. A failing source is
/// reported as [`CodeGenError::EntropyUnavailable`].
pub fn generate(length: usize) -> Result<String, CodeGenError> {
    let mut code = String::with_capacity(length);
    let mut buffer = [0u8; 64];

    while code.len() < length {
        OsRng
            .try_fill_bytes(&mut buffer)
            .map_err(|e| CodeGenError::EntropyUnavailable(e.to_string()))?;

        for byte in buffer {
            if byte >= REJECTION_BOUND {
                continue;
            }
            code.push(CODE_ALPHABET[usize::from(byte) % CODE_ALPHABET.len()] as char);
            if code.len() == length {
                break;
            }
        }
    }

    Ok(code)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_rejection_bound() {
        assert_eq!(REJECTION_BOUND, 248);
    }

    #[test]
    fn test_generate_length_and_alphabet() {
        for length in [0, 1, 32, 42, 200] {
            let code = generate(length).unwrap();
            assert_eq!(code.len(), length);
            assert!(code.bytes().all(|b| CODE_ALPHABET.contains(&b)));
        }
    }

    #[test]
    fn test_generate_does_not_repeat() {
        let codes: HashSet<String> = (0..1000).map(|_| generate(42).unwrap()).collect();
        assert_eq!(codes.len(), 1000);
    }

    #[test]
    fn test_generate_uses_whole_alphabet() {
        let sample = generate(20_000).unwrap();
        let seen: HashSet<u8> = sample.bytes().collect();
        assert_eq!(seen.len(), CODE_ALPHABET.len());
    }
}
