//! Session token slot.

use cinq_sync_engine::AccessTokenProvider;
use std::sync::RwLock;
use tracing::info;

/// Process-wide slot for the session's access token.
///
/// Set after authentication, cleared on logout. While empty, every sync
/// attempt records a recoverable per-item failure instead of sending.
#[derive(Debug, Default)]
pub struct SessionTokens {
    token: RwLock<Option<String>>,
}

impl SessionTokens {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_access_token(&self, token: impl Into<String>) {
        *self.token.write().expect("lock poisoned") = Some(token.into());
        info!("Session token set");
    }

    pub fn clear(&self) {
        *self.token.write().expect("lock poisoned") = None;
        info!("Session token cleared");
    }

    pub fn is_authenticated(&self) -> bool {
        self.token.read().expect("lock poisoned").is_some()
    }
}

impl AccessTokenProvider for SessionTokens {
    fn access_token(&self) -> Option<String> {
        self.token.read().expect("lock poisoned").clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_and_clear() {
        let tokens = SessionTokens::new();
        assert!(!tokens.is_authenticated());
        assert!(tokens.access_token().is_none());

        tokens.set_access_token("jwt-123");
        assert!(tokens.is_authenticated());
        assert_eq!(tokens.access_token().as_deref(), Some("jwt-123"));

        // Replacing is allowed (token refresh)
        tokens.set_access_token("jwt-456");
        assert_eq!(tokens.access_token().as_deref(), Some("jwt-456"));

        tokens.clear();
        assert!(!tokens.is_authenticated());
    }
}
