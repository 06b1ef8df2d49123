use keyring::Entry;
use thiserror::Error;

const SERVICE_NAME: &str = "com.camup.agent";
const TOKEN_KEY: &str = "camup_token";
const TOKEN_ENV: &str = "CAMUP_TOKEN";

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("keyring error: {0}")]
    KeyringError(#[from] keyring::Error),
    #[error("token not found")]
    TokenNotFound,
}

/// Credential saved by the interactive login. The agent only reads it.
pub struct TokenStorage {
    entry: Entry,
    env_override: Option<String>,
}

impl TokenStorage {
    pub fn new() -> Result<Self, StorageError> {
        Ok(Self {
            entry: Entry::new(SERVICE_NAME, TOKEN_KEY)?,
            env_override: std::env::var(TOKEN_ENV).ok(),
        })
    }

    pub fn get_token(&self) -> Result<String, StorageError> {
        if let Some(token) = self.env_override.as_deref() {
            return token_or_missing(token);
        }
        match self.entry.get_password() {
            Ok(token) => token_or_missing(&token),
            Err(keyring::Error::NoEntry) => Err(StorageError::TokenNotFound),
            Err(err) => Err(StorageError::KeyringError(err)),
        }
    }

    pub fn save_token(&self, token: &str) -> Result<(), StorageError> {
        self.entry.set_password(token)?;
        Ok(())
    }

    pub fn delete_token(&self) -> Result<(), StorageError> {
        match self.entry.delete_credential() {
            Ok(()) | Err(keyring::Error::NoEntry) => Ok(()),
            Err(err) => Err(StorageError::KeyringError(err)),
        }
    }
}

fn token_or_missing(token: &str) -> Result<String, StorageError> {
    let token = token.trim();
    if token.is_empty() {
        Err(StorageError::TokenNotFound)
    } else {
        Ok(token.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blank_token_counts_as_missing() {
        assert!(matches!(
            token_or_missing("  \n"),
            Err(StorageError::TokenNotFound)
        ));
    }

    #[test]
    fn token_is_trimmed() {
        assert_eq!(token_or_missing(" abc\n").unwrap(), "abc");
    }
}
