//! Broker authenticators.
//!
//! Mirrors the credential schemes a downstream broker connection can be
//! configured with. Kept as a closed enum rather than a trait object: the
//! set of schemes is small, config-driven, and callers (brokers) need to
//! match on the concrete variant to build transport-specific connect options.

use crate::error::AuthError;

/// Raw `auth:` block as it appears in configuration, before validation.
#[derive(Debug, Clone, serde::Deserialize, serde::Serialize)]
pub struct AuthConfig {
    /// `"plain"` or `"token"`.
    pub method: String,
    /// Username, required when `method == "plain"`.
    #[serde(default)]
    pub user: String,
    /// Password, required when `method == "plain"`.
    #[serde(default)]
    pub password: String,
    /// Bearer token, required when `method == "token"`.
    #[serde(default)]
    pub token: String,
}

/// A validated broker credential.
#[derive(Debug, Clone)]
pub enum Authenticator {
    /// Username/password credential.
    Basic {
        /// Username.
        user: String,
        /// Password.
        password: String,
    },
    /// Bearer token credential.
    Token {
        /// The token value.
        token: String,
    },
}

impl Authenticator {
    /// Stable identifier for the credential scheme, e.g. for logging.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Basic { .. } => "plain",
            Self::Token { .. } => "token",
        }
    }

    /// Build and validate an [`Authenticator`] from its config representation.
    pub fn from_config(config: &AuthConfig) -> Result<Self, AuthError> {
        let auth = match config.method.as_str() {
            "plain" => Self::Basic {
                user: config.user.clone(),
                password: config.password.clone(),
            },
            "token" => Self::Token {
                token: config.token.clone(),
            },
            other => return Err(AuthError::Unsupported(other.to_string())),
        };
        auth.validate()?;
        Ok(auth)
    }

    /// Validate that required fields are present and non-blank.
    pub fn validate(&self) -> Result<(), AuthError> {
        match self {
            Self::Basic { user, password } => {
                if user.trim().is_empty() {
                    return Err(AuthError::Invalid("username cannot be empty".to_string()));
                }
                if password.trim().is_empty() {
                    return Err(AuthError::Invalid("password cannot be empty".to_string()));
                }
                Ok(())
            }
            Self::Token { token } => {
                if token.trim().is_empty() {
                    return Err(AuthError::Invalid("token cannot be empty".to_string()));
                }
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn plain(user: &str, password: &str) -> AuthConfig {
        AuthConfig {
            method: "plain".to_string(),
            user: user.to_string(),
            password: password.to_string(),
            token: String::new(),
        }
    }

    fn token(token: &str) -> AuthConfig {
        AuthConfig {
            method: "token".to_string(),
            user: String::new(),
            password: String::new(),
            token: token.to_string(),
        }
    }

    #[test]
    fn valid_basic_auth() {
        let auth = Authenticator::from_config(&plain("alice", "hunter2")).unwrap();
        assert_eq!(auth.kind(), "plain");
    }

    #[test]
    fn valid_token_auth() {
        let auth = Authenticator::from_config(&token("abc123")).unwrap();
        assert_eq!(auth.kind(), "token");
    }

    #[test]
    fn empty_username_rejected() {
        let err = Authenticator::from_config(&plain("", "hunter2")).unwrap_err();
        assert!(matches!(err, AuthError::Invalid(ref m) if m.contains("username cannot be empty")));
    }

    #[test]
    fn empty_password_rejected() {
        let err = Authenticator::from_config(&plain("alice", "")).unwrap_err();
        assert!(matches!(err, AuthError::Invalid(ref m) if m.contains("password cannot be empty")));
    }

    #[test]
    fn whitespace_only_password_rejected() {
        let err = Authenticator::from_config(&plain("alice", "   ")).unwrap_err();
        assert!(matches!(err, AuthError::Invalid(_)));
    }

    #[test]
    fn empty_token_rejected() {
        let err = Authenticator::from_config(&token("")).unwrap_err();
        assert!(matches!(err, AuthError::Invalid(ref m) if m.contains("token cannot be empty")));
    }

    #[test]
    fn unsupported_method_rejected() {
        let err = Authenticator::from_config(&AuthConfig {
            method: "oauth2".to_string(),
            user: String::new(),
            password: String::new(),
            token: String::new(),
        })
        .unwrap_err();
        assert!(matches!(err, AuthError::Unsupported(ref m) if m == "oauth2"));
    }
}
