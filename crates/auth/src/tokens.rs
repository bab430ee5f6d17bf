use crate::error::{AuthError, Result};
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use chrono::Utc;
use rand::{rngs::OsRng, Rng, RngCore};

pub const TOKEN_LENGTH: usize = 32;
pub const VERIFICATION_CODE_LENGTH: usize = 8;

/// 32 random bytes from the OS RNG, URL-safe base64, cut to 32 characters.
pub fn generate_token() -> String {
    let mut bytes = [0u8; 32];
    OsRng.fill_bytes(&mut bytes);
    let mut token = URL_SAFE_NO_PAD.encode(bytes);
    token.truncate(TOKEN_LENGTH);
    token
}

/// An 8-digit decimal code.
pub fn verification_code() -> Result<String> {
    let code = format!("{:08}", OsRng.gen_range(0..100_000_000u32));
    check_code(&code)?;
    Ok(code)
}

fn check_code(code: &str) -> Result<()> {
    if code.len() != VERIFICATION_CODE_LENGTH || !code.bytes().all(|b| b.is_ascii_digit()) {
        return Err(AuthError::Internal(format!(
            "generated verification code has invalid length {}",
            code.len()
        )));
    }
    Ok(())
}

/// Support reference embedded in outgoing mail, e.g. `CNF-4821-317`.
pub fn ticket_reference(prefix: &str) -> String {
    let suffix = Utc::now().timestamp().rem_euclid(10_000);
    format!("{}-{}-{}", prefix, suffix, rand::thread_rng().gen_range(100..=999))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_token_shape() {
        let tokens: HashSet<String> = (0..64).map(|_| generate_token()).collect();
        assert_eq!(tokens.len(), 64);
        for token in &tokens {
            assert_eq!(token.len(), TOKEN_LENGTH);
            assert!(token
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_'));
        }
    }

    #[test]
    fn test_verification_code_is_eight_digits() {
        for _ in 0..100 {
            let code = verification_code().unwrap();
            assert_eq!(code.len(), 8);
            assert!(code.chars().all(|c| c.is_ascii_digit()));
        }
    }

    #[test]
    fn test_check_code_rejects_wrong_length() {
        assert!(check_code("1234567").is_err());
        assert!(check_code("123456789").is_err());
        assert!(check_code("1234a678").is_err());
        assert!(check_code("00000042").is_ok());
    }

    #[test]
    fn test_ticket_reference_format() {
        let reference = ticket_reference("RST");
        let parts: Vec<&str> = reference.split('-').collect();
        assert_eq!(parts.len(), 3);
        assert_eq!(parts[0], "RST");
        assert!(parts[1].parse::<u32>().unwrap() < 10_000);
        let tail: u32 = parts[2].parse().unwrap();
        assert!((100..=999).contains(&tail));
    }
}
