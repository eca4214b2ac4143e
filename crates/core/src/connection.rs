use std::fmt::{Display, Formatter};

use serde::{Deserialize, Serialize};

use crate::{AppError, AppResult};

const CONNECTION_ID_MAX_LENGTH: usize = 128;

/// Identifier of one realtime subscriber connection.
///
/// Broadcasts carry the originating connection so subscribers can skip
/// their own echo.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ConnectionId(String);

impl ConnectionId {
    /// Creates a validated connection identifier.
    pub fn new(value: impl Into<String>) -> AppResult<Self> {
        let value = value.into().trim().to_owned();
        if value.is_empty() {
            return Err(AppError::Validation(
                "connection id must not be empty".to_owned(),
            ));
        }

        if value.len() > CONNECTION_ID_MAX_LENGTH {
            return Err(AppError::Validation(format!(
                "connection id must be at most {CONNECTION_ID_MAX_LENGTH} characters"
            )));
        }

        if value.chars().any(char::is_control) {
            return Err(AppError::Validation(
                "connection id must not contain control characters".to_owned(),
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

impl TryFrom<String> for ConnectionId {
    type Error = AppError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<ConnectionId> for String {
    fn from(value: ConnectionId) -> Self {
        value.0
    }
}

impl Display for ConnectionId {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> std::fmt::Result {
        formatter.write_str(self.0.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::ConnectionId;

    #[test]
    fn connection_id_is_trimmed() {
        let connection_id = ConnectionId::new("  1234.5678 ");
        assert!(connection_id.is_ok());
        assert_eq!(
            connection_id
                .unwrap_or_else(|_| unreachable!())
                .as_str(),
            "1234.5678"
        );
    }

    #[test]
    fn connection_id_rejects_blank_and_oversized_values() {
        assert!(ConnectionId::new("   ").is_err());
        assert!(ConnectionId::new("x".repeat(129)).is_err());
        assert!(ConnectionId::new("a\nb").is_err());
    }
}
