//! The authenticated session: the current token set, the user's profile,
//! and change notification for anything that renders them.

use crate::userinfo::{ProfileSource, UserProfile};
use crate::verifier::VerifiedTokenSet;
use std::sync::{Arc, Mutex};
use tokio::sync::watch;
use tokio::task::JoinHandle;

/// Snapshot of the session as published to subscribers
#[derive(Debug, Clone, Default)]
pub struct Session {
    tokens: Option<Arc<VerifiedTokenSet>>,
    profile: Option<Arc<UserProfile>>,
    generation: u64,
}

impl Session {
    pub fn tokens(&self) -> Option<&Arc<VerifiedTokenSet>> {
        self.tokens.as_ref()
    }

    pub fn profile(&self) -> Option<&Arc<UserProfile>> {
        self.profile.as_ref()
    }

    pub fn is_authenticated(&self) -> bool {
        self.tokens.is_some()
    }

    /// Bumped on every `set_tokens` and `clear`.
    pub fn generation(&self) -> u64 {
        self.generation
    }
}

/// Holds the verified token set and derived profile, publishing every change.
pub struct SessionStore {
    tx: Arc<watch::Sender<Session>>,
    profiles: Arc<dyn ProfileSource>,
    profile_task: Mutex<Option<JoinHandle<()>>>,
}

impl SessionStore {
    pub fn new(profiles: Arc<dyn ProfileSource>) -> Self {
        let (tx, _) = watch::channel(Session::default());
        Self {
            tx: Arc::new(tx),
            profiles,
            profile_task: Mutex::new(None),
        }
    }

    /// Current snapshot
    pub fn current(&self) -> Session {
        self.tx.borrow().clone()
    }

    pub fn tokens(&self) -> Option<Arc<VerifiedTokenSet>> {
        self.tx.borrow().tokens.clone()
    }

    pub fn profile(&self) -> Option<Arc<UserProfile>> {
        self.tx.borrow().profile.clone()
    }

    /// Receiver that sees the current session and every later change.
    pub fn subscribe(&self) -> watch::Receiver<Session> {
        self.tx.subscribe()
    }

    /// Replace the whole session with `tokens` and fetch the matching profile
    /// in the background.
    ///
    /// Any profile fetch still running for an earlier token set is aborted.
    /// Must be called from within a Tokio runtime.
    pub fn set_tokens(&self, tokens: VerifiedTokenSet) {
        let tokens = Arc::new(tokens);
        let mut generation = 0;
        self.tx.send_modify(|session| {
            session.generation += 1;
            session.tokens = Some(tokens.clone());
            session.profile = None;
            generation = session.generation;
        });
        tracing::debug!("session replaced (generation {})", generation);

        let tx = self.tx.clone();
        let profiles = self.profiles.clone();
        let task = tokio::spawn(async move {
            match profiles.fetch_profile(&tokens.tokens().access_token).await {
                Ok(profile) => {
                    let profile = Arc::new(profile);
                    tx.send_if_modified(|session| {
                        // A newer login or a logout won the race.
                        if session.generation != generation {
                            return false;
                        }
                        session.profile = Some(profile);
                        true
                    });
                }
                Err(e) => {
                    tracing::warn!("profile fetch failed, keeping session without profile: {}", e);
                }
            }
        });
        self.replace_profile_task(Some(task));
    }

    /// Drop the token set and profile.
    pub fn clear(&self) {
        self.replace_profile_task(None);
        self.tx.send_modify(|session| {
            session.generation += 1;
            session.tokens = None;
            session.profile = None;
        });
        tracing::debug!("session cleared");
    }

    fn replace_profile_task(&self, task: Option<JoinHandle<()>>) {
        let mut slot = self.profile_task.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(previous) = slot.take() {
            previous.abort();
        }
        *slot = task;
    }
}

impl Drop for SessionStore {
    fn drop(&mut self) {
        self.replace_profile_task(None);
    }
}

impl std::fmt::Debug for SessionStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionStore")
            .field("session", &*self.tx.borrow())
            .finish_non_exhaustive()
    }
}
