//! Access-token collaborator.

/// Session-layer capability the engine asks for a bearer token.
///
/// `None` means no active session; the engine treats that as a recoverable
/// per-item failure, never a fatal error, so the rest of a pass still runs.
pub trait AccessTokenProvider: Send + Sync {
    fn access_token(&self) -> Option<String>;
}

/// A fixed token, for tools and tests.
#[derive(Debug, Clone)]
pub struct StaticToken(pub String);

impl AccessTokenProvider for StaticToken {
    fn access_token(&self) -> Option<String> {
        Some(self.0.clone())
    }
}

/// No active session.
#[derive(Debug, Default)]
pub struct NoSession;

impl AccessTokenProvider for NoSession {
    fn access_token(&self) -> Option<String> {
        None
    }
}
