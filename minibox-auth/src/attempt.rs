use crate::error::Result;
use crate::pkce::PkceContext;
use async_trait::async_trait;
use std::sync::{Arc, RwLock};

/// Storage for the single in-flight login attempt.
///
/// The attempt must survive the redirect to the provider and back, so it
/// lives outside the gate. At most one attempt is pending; saving a new one
/// replaces the old.
#[async_trait]
pub trait LoginAttemptStore: Send + Sync {
    /// Replace any pending attempt with `pkce`
    async fn save(&self, pkce: PkceContext) -> Result<()>;

    /// The pending attempt, if any
    async fn load(&self) -> Result<Option<PkceContext>>;

    /// Forget the pending attempt
    async fn clear(&self) -> Result<()>;

    /// Load and forget the pending attempt. A callback consumes its attempt
    /// whatever the outcome, so a state value is never honored twice.
    async fn take(&self) -> Result<Option<PkceContext>> {
        let pending = self.load().await?;
        self.clear().await?;
        Ok(pending)
    }
}

/// In-memory attempt store
#[derive(Debug, Clone, Default)]
pub struct MemoryAttemptStore {
    pending: Arc<RwLock<Option<PkceContext>>>,
}

impl MemoryAttemptStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl LoginAttemptStore for MemoryAttemptStore {
    async fn save(&self, pkce: PkceContext) -> Result<()> {
        // Poisoning only means another holder panicked; the Option is still valid.
        let mut pending = self.pending.write().unwrap_or_else(|e| e.into_inner());
        *pending = Some(pkce);
        Ok(())
    }

    async fn load(&self) -> Result<Option<PkceContext>> {
        let pending = self.pending.read().unwrap_or_else(|e| e.into_inner());
        Ok(pending.clone())
    }

    async fn clear(&self) -> Result<()> {
        let mut pending = self.pending.write().unwrap_or_else(|e| e.into_inner());
        *pending = None;
        Ok(())
    }

    async fn take(&self) -> Result<Option<PkceContext>> {
        let mut pending = self.pending.write().unwrap_or_else(|e| e.into_inner());
        Ok(pending.take())
    }
}
