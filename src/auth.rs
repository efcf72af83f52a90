// Auth context shared by every component that needs the caller's identity

use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tracing::debug;

#[derive(Debug, Default)]
struct TokenRecord {
    access: Option<String>,
}

/// Cloneable handle over a single token record. All reads and writes of the
/// caller's credentials go through this type.
#[derive(Debug, Clone, Default)]
pub struct AuthContext {
    inner: Arc<RwLock<TokenRecord>>,
}

impl AuthContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Context already holding a bearer token (e.g. forwarded from a request).
    pub fn with_access_token(token: impl Into<String>) -> Self {
        let ctx = Self::new();
        ctx.write().access = Some(token.into());
        ctx
    }

    pub fn clear(&self) {
        *self.write() = TokenRecord::default();
        debug!("Auth tokens cleared");
    }

    pub fn access_token(&self) -> Option<String> {
        self.read().access.clone()
    }

    pub fn is_authenticated(&self) -> bool {
        self.read().access.is_some()
    }

    fn read(&self) -> RwLockReadGuard<'_, TokenRecord> {
        self.inner.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, TokenRecord> {
        self.inner.write().unwrap_or_else(|e| e.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_with_access_token() {
        let ctx = AuthContext::with_access_token("abc");
        assert!(ctx.is_authenticated());
        assert_eq!(ctx.access_token().as_deref(), Some("abc"));
        assert!(!AuthContext::new().is_authenticated());
    }

    #[test]
    fn test_clear_is_visible_through_clones() {
        let ctx = AuthContext::with_access_token("abc");
        let other = ctx.clone();
        other.clear();
        assert!(!ctx.is_authenticated());
        assert_eq!(ctx.access_token(), None);
    }
}
