//! Password-based SSH authentication.

use async_trait::async_trait;
use russh::client;

use crate::mcp::credentials::Secret;
use crate::mcp::error::TransportError;
use crate::mcp::session::SshClientHandler;

use super::traits::AuthStrategy;

/// Password authentication strategy.
pub struct PasswordAuth {
    password: Secret,
}

impl PasswordAuth {
    pub fn new(password: Secret) -> Self {
        Self { password }
    }
}

#[async_trait]
impl AuthStrategy for PasswordAuth {
    async fn authenticate(
        &self,
        handle: &mut client::Handle<SshClientHandler>,
        username: &str,
    ) -> Result<bool, TransportError> {
        let password = self
            .password
            .expose_str()
            .map_err(|_| TransportError::Auth("password is not valid UTF-8".to_string()))?;

        let result = handle
            .authenticate_password(username, password)
            .await
            .map_err(|e| TransportError::Auth(format!("password authentication failed: {}", e)))?;

        Ok(result.success())
    }

    fn name(&self) -> &'static str {
        "password"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_password_auth_name() {
        let auth = PasswordAuth::new(Secret::from("secret"));
        assert_eq!(auth.name(), "password");
    }

    #[test]
    fn test_password_held_as_secret() {
        let auth = PasswordAuth::new(Secret::from("my-password"));
        assert_eq!(auth.password.expose(), b"my-password");
        assert!(!format!("{:?}", auth.password).contains("my-password"));
    }
}
