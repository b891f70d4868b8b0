//! Session Manager
//!
//! Owns the authoritative `Session` for one context and the bootstrap that
//! reconciles cached identity with the backend. Every mutation publishes a
//! fresh `SessionView` to watchers.

use parking_lot::{Mutex, RwLock};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use tokio::sync::watch;

use civic_api::{AuthApi, ProfileUpdate, UserProfile};
use civic_storage::{KeyValueStore, StoreEvent, Subscription};

use crate::reconcile::{
    cancel_pair, reconcile, CancelHandle, CancelSignal, ReconcileOutcome, RetryPolicy,
};
use crate::session::{Session, SessionStatus, SessionView};
use crate::Result;

/// Store key holding the bearer token.
pub const TOKEN_KEY: &str = "authToken";
/// Store key holding the JSON-encoded cached profile.
pub const USER_KEY: &str = "authUser";

pub struct SessionManager {
    inner: Arc<Inner>,
}

/// How phase 1 of the bootstrap left the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Bootstrap {
    /// A login landed first; nothing to restore
    Established,
    SignedOut,
    Restore,
}

struct Inner {
    store: Arc<dyn KeyValueStore>,
    api: Arc<dyn AuthApi>,
    policy: RetryPolicy,
    session: RwLock<Session>,
    updates: watch::Sender<SessionView>,
    /// Guards against a second bootstrap
    initialized: AtomicBool,
    cancel: CancelHandle,
    cancel_signal: CancelSignal,
    subscription: Mutex<Option<Subscription>>,
}

impl SessionManager {
    pub fn new(store: Arc<dyn KeyValueStore>, api: Arc<dyn AuthApi>) -> Self {
        Self::with_policy(store, api, RetryPolicy::default())
    }

    /// Build a manager and start listening for other contexts' changes.
    pub fn with_policy(
        store: Arc<dyn KeyValueStore>,
        api: Arc<dyn AuthApi>,
        policy: RetryPolicy,
    ) -> Self {
        let session = Session::new();
        let (updates, _) = watch::channel(session.view());
        let (cancel, cancel_signal) = cancel_pair();

        let inner = Arc::new(Inner {
            store,
            api,
            policy,
            session: RwLock::new(session),
            updates,
            initialized: AtomicBool::new(false),
            cancel,
            cancel_signal,
            subscription: Mutex::new(None),
        });

        let weak: Weak<Inner> = Arc::downgrade(&inner);
        let subscription = inner.store.subscribe(Arc::new(move |event: &StoreEvent| {
            if let Some(inner) = weak.upgrade() {
                inner.apply_store_event(event);
            }
        }));
        *inner.subscription.lock() = Some(subscription);

        Self { inner }
    }

    /// Restore the session at startup.
    ///
    /// Runs once per manager; later calls return the current view. Never
    /// fails: storage trouble is logged and treated as an empty store, and
    /// transient backend trouble leaves the cached identity in place.
    pub async fn initialize(&self) -> SessionView {
        if self.inner.initialized.swap(true, Ordering::AcqRel) {
            tracing::warn!("Session already initialized; ignoring repeated bootstrap");
            return self.view();
        }
        if self.inner.is_torn_down() {
            return self.view();
        }

        let token = self.inner.read_key(TOKEN_KEY).filter(|t| !t.is_empty());
        let cached = self.inner.load_cached_user();

        // Phase 1: cached identity is visible before anything is awaited
        let start = self.inner.mutate(|session| {
            if session.status == SessionStatus::Ready {
                return Bootstrap::Established;
            }
            match &token {
                Some(token) => {
                    if let Some(user) = &cached {
                        session.user = Some(user.clone());
                    }
                    session.token = Some(token.clone());
                    session.transition(SessionStatus::Restoring);
                    Bootstrap::Restore
                }
                None => {
                    session.clear();
                    session.transition(SessionStatus::Ready);
                    Bootstrap::SignedOut
                }
            }
        });

        let token = match (start, token) {
            (Bootstrap::Restore, Some(token)) => token,
            (Bootstrap::Established, _) => {
                tracing::info!("Session established before bootstrap; skipping restore");
                return self.view();
            }
            _ => {
                tracing::info!(cached_user = cached.is_some(), "No stored token; starting signed out");
                return self.view();
            }
        };

        tracing::info!(cached_user = cached.is_some(), "Restoring session from stored token");

        // Phase 2: confirm against the backend
        let api = Arc::clone(&self.inner.api);
        let outcome = reconcile(
            &token,
            &self.inner.policy,
            move |token: String| {
                let api = Arc::clone(&api);
                async move { api.fetch_profile(&token).await }
            },
            tokio::time::sleep,
            &self.inner.cancel_signal,
        )
        .await;

        self.inner.apply_outcome(&token, outcome);
        self.view()
    }

    /// Record a session obtained from a successful login or registration.
    pub fn login(&self, token: &str, profile: UserProfile) -> Result<()> {
        let encoded = serde_json::to_string(&profile)?;
        self.inner.store.set(TOKEN_KEY, token)?;
        self.inner.store.set(USER_KEY, &encoded)?;

        let user_id = profile.id;
        self.inner.mutate(|session| {
            session.token = Some(token.to_string());
            session.user = Some(profile);
            session.transition(SessionStatus::Ready);
        });

        tracing::info!(user_id, "Signed in");
        Ok(())
    }

    /// Sign out. The local session is cleared even when the backend call
    /// fails; only storage errors are returned.
    pub async fn logout(&self) -> Result<()> {
        let token = self
            .inner
            .session
            .read()
            .token
            .clone()
            .or_else(|| self.inner.read_key(TOKEN_KEY))
            .unwrap_or_default();

        if let Err(err) = self.inner.api.logout(&token).await {
            tracing::warn!(error = %err, "Logout request failed; clearing local session anyway");
        }

        let token_removed = self.inner.store.remove(TOKEN_KEY);
        let user_removed = self.inner.store.remove(USER_KEY);

        self.inner.mutate(|session| {
            session.clear();
            session.transition(SessionStatus::Ready);
        });

        tracing::info!("Signed out");
        token_removed.and(user_removed)?;
        Ok(())
    }

    /// Merge server-side changes (e.g. a new point total) into the current
    /// user without a full refetch. No-op when signed out.
    pub fn update_user(&self, update: ProfileUpdate) -> Result<()> {
        let merged = self.inner.mutate(|session| {
            session.user.as_mut().map(|user| {
                user.merge(update);
                user.clone()
            })
        });

        match merged {
            Some(user) => {
                self.inner
                    .store
                    .set(USER_KEY, &serde_json::to_string(&user)?)?;
                tracing::debug!(user_id = user.id, "Updated cached user");
                Ok(())
            }
            None => Ok(()),
        }
    }

    /// Stop the bootstrap and stop listening to other contexts. After this
    /// returns neither can mutate the session.
    pub fn teardown(&self) {
        self.inner.cancel.cancel();
        if self.inner.subscription.lock().take().is_some() {
            tracing::debug!("Session manager torn down");
        }
    }

    pub fn view(&self) -> SessionView {
        self.inner.session.read().view()
    }

    pub fn session(&self) -> Session {
        self.inner.session.read().clone()
    }

    pub fn user(&self) -> Option<UserProfile> {
        self.inner.session.read().user.clone()
    }

    pub fn is_authenticated(&self) -> bool {
        self.inner.session.read().is_authenticated()
    }

    pub fn is_loading(&self) -> bool {
        self.inner.session.read().status.is_loading()
    }

    pub fn status(&self) -> SessionStatus {
        self.inner.session.read().status
    }

    /// Receive every view published from now on.
    pub fn watch(&self) -> watch::Receiver<SessionView> {
        self.inner.updates.subscribe()
    }
}

impl Clone for SessionManager {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl Inner {
    fn is_torn_down(&self) -> bool {
        self.cancel_signal.is_cancelled()
    }

    /// Apply `f` and publish the resulting view under one lock.
    fn mutate<R>(&self, f: impl FnOnce(&mut Session) -> R) -> R {
        let mut session = self.session.write();
        let result = f(&mut session);
        self.updates.send_replace(session.view());
        result
    }

    fn read_key(&self, key: &str) -> Option<String> {
        match self.store.get(key) {
            Ok(value) => value,
            Err(err) => {
                tracing::warn!(key, error = %err, "Failed to read from store");
                None
            }
        }
    }

    fn remove_key(&self, key: &str) {
        if let Err(err) = self.store.remove(key) {
            tracing::warn!(key, error = %err, "Failed to remove from store");
        }
    }

    fn load_cached_user(&self) -> Option<UserProfile> {
        let raw = self.read_key(USER_KEY)?;

        match serde_json::from_str::<UserProfile>(&raw) {
            Ok(user) => Some(user),
            Err(err) => {
                tracing::warn!(error = %err, "Discarding malformed cached user");
                self.remove_key(USER_KEY);
                None
            }
        }
    }

    /// Persist a verified profile while `token` is still the stored token.
    ///
    /// A logout from another context removes the token before the user
    /// key, so a token missing after the write means the write raced that
    /// logout and is undone.
    fn cache_verified_user(&self, token: &str, profile: &UserProfile) {
        let encoded = match serde_json::to_string(profile) {
            Ok(encoded) => encoded,
            Err(err) => {
                tracing::warn!(error = %err, "Failed to encode verified user");
                return;
            }
        };

        if let Err(err) = self.store.set(USER_KEY, &encoded) {
            tracing::warn!(error = %err, "Failed to cache verified user");
            return;
        }

        if self.read_key(TOKEN_KEY).as_deref() != Some(token) {
            tracing::info!("Token removed while caching verified user; dropping cache entry");
            self.remove_key(USER_KEY);
        }
    }

    fn apply_outcome(&self, token: &str, outcome: ReconcileOutcome) {
        if self.is_torn_down() {
            tracing::debug!("Session restore finished after teardown; discarding result");
            return;
        }

        match outcome {
            ReconcileOutcome::Verified(profile) => {
                let adopted = self.mutate(|session| {
                    let current = session.token.as_deref() == Some(token);
                    if current {
                        session.user = Some(profile.clone());
                    }
                    current
                });

                if adopted {
                    self.cache_verified_user(token, &profile);
                } else {
                    tracing::info!("Token changed during restore; keeping newer session");
                }
            }
            ReconcileOutcome::Rejected(err) => {
                let cleared = self.mutate(|session| {
                    let current = session.token.as_deref() == Some(token);
                    if current {
                        session.clear();
                    }
                    current
                });

                if !cleared {
                    tracing::info!("Rejected token already replaced; keeping newer session");
                } else if self.read_key(TOKEN_KEY).as_deref() == Some(token) {
                    tracing::info!(status = ?err.status(), "Stored token rejected; clearing session");
                    self.remove_key(TOKEN_KEY);
                    self.remove_key(USER_KEY);
                }
            }
            ReconcileOutcome::Unreachable {
                attempts,
                last_error,
            } => {
                tracing::warn!(
                    attempts,
                    error = %last_error,
                    "Backend unreachable; keeping cached identity"
                );
            }
            ReconcileOutcome::Cancelled => {
                tracing::debug!("Session restore cancelled");
                return;
            }
        }

        self.mutate(|session| {
            session.transition(SessionStatus::Ready);
        });
    }

    fn apply_store_event(&self, event: &StoreEvent) {
        if self.is_torn_down() {
            return;
        }

        match event.key.as_str() {
            TOKEN_KEY => match event.new_value.as_deref().filter(|v| !v.is_empty()) {
                None => {
                    tracing::info!("Token removed by another context; signing out");
                    self.mutate(Session::clear);
                }
                Some(token) => {
                    tracing::debug!("Token replaced by another context");
                    self.mutate(|session| session.token = Some(token.to_string()));
                }
            },
            USER_KEY => {
                let Some(raw) = event.new_value.as_deref() else {
                    return;
                };
                match serde_json::from_str::<UserProfile>(raw) {
                    Ok(user) => {
                        tracing::debug!(user_id = user.id, "Adopting user from another context");
                        self.mutate(|session| session.user = Some(user));
                    }
                    Err(err) => {
                        tracing::debug!(error = %err, "Ignoring malformed user from another context");
                    }
                }
            }
            _ => {}
        }
    }
}
