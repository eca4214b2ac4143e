use std::fmt::{Display, Formatter};

use qrotate_core::{AppError, AppResult, NonEmptyString};
use serde::{Deserialize, Serialize};

/// Number of characters in one session token.
pub const SESSION_TOKEN_LENGTH: usize = 16;

/// Characters a session token is drawn from.
pub const SESSION_TOKEN_ALPHABET: &[u8; 62] =
    b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789";

/// Long-lived secret issued to one company.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompanyToken(NonEmptyString);

impl CompanyToken {
    /// Creates a validated company token.
    pub fn new(value: impl Into<String>) -> AppResult<Self> {
        NonEmptyString::new(value)
            .map(Self)
            .map_err(|_| AppError::Validation("company token must not be empty".to_owned()))
    }

    /// Returns the underlying string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }
}

impl std::fmt::Debug for CompanyToken {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> std::fmt::Result {
        formatter.write_str("CompanyToken(<redacted>)")
    }
}

/// Short random value generated fresh on every tick.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionToken(String);

impl SessionToken {
    /// Creates a validated session token.
    pub fn new(value: impl Into<String>) -> AppResult<Self> {
        let value = value.into();
        if value.len() != SESSION_TOKEN_LENGTH {
            return Err(AppError::Validation(format!(
                "session token must be exactly {SESSION_TOKEN_LENGTH} characters"
            )));
        }

        if !value.bytes().all(|byte| SESSION_TOKEN_ALPHABET.contains(&byte)) {
            return Err(AppError::Validation(
                "session token must be alphanumeric".to_owned(),
            ));
        }

        Ok(Self(value))
    }

    /// Returns the underlying string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }
}

/// Value broadcast to subscribers: `{company_token}-{session_token}`.
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CompositeToken(String);

impl CompositeToken {
    /// Joins a company token with a session token.
    #[must_use]
    pub fn compose(company_token: &CompanyToken, session_token: &SessionToken) -> Self {
        Self(format!(
            "{}-{}",
            company_token.as_str(),
            session_token.as_str()
        ))
    }

    /// Returns the underlying string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }

    /// Returns the session part; company tokens may contain dashes themselves.
    #[must_use]
    pub fn session_part(&self) -> &str {
        self.0
            .rsplit_once('-')
            .map_or(self.0.as_str(), |(_, session)| session)
    }
}

impl std::fmt::Debug for CompositeToken {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> std::fmt::Result {
        write!(formatter, "CompositeToken(<redacted>-{})", self.session_part())
    }
}

impl Display for CompositeToken {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> std::fmt::Result {
        formatter.write_str(self.0.as_str())
    }
}

impl From<CompositeToken> for String {
    fn from(value: CompositeToken) -> Self {
        value.0
    }
}
