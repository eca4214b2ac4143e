use qrotate_core::{AppError, AppResult};
use qrotate_domain::{SESSION_TOKEN_ALPHABET, SESSION_TOKEN_LENGTH, SessionToken};

// Largest multiple of the alphabet size that fits in a byte; bytes at or
// above it are rejected so every character is equally likely.
const ACCEPTED_BYTE_LIMIT: u8 = 248;

/// Generates a fresh session token from the operating system CSPRNG.
pub fn generate_session_token() -> AppResult<SessionToken> {
    let mut token = String::with_capacity(SESSION_TOKEN_LENGTH);
    let mut bytes = [0u8; SESSION_TOKEN_LENGTH * 2];

    while token.len() < SESSION_TOKEN_LENGTH {
        getrandom::fill(&mut bytes).map_err(|error| {
            AppError::Internal(format!("failed to generate session token: {error}"))
        })?;

        for byte in bytes.iter().copied().filter(|byte| *byte < ACCEPTED_BYTE_LIMIT) {
            if token.len() == SESSION_TOKEN_LENGTH {
                break;
            }

            let index = usize::from(byte) % SESSION_TOKEN_ALPHABET.len();
            token.push(char::from(SESSION_TOKEN_ALPHABET[index]));
        }
    }

    SessionToken::new(token)
}
