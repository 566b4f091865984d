//! Authentication session state.
//!
//! Credential checks belong to the external auth provider; this module only
//! tracks who is signed in, persists the session marker, assigns a sample on
//! sign-up, and notifies subscribers whenever the signed-in user changes.

use std::{
    collections::BTreeMap,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc, Mutex, PoisonError, RwLock, Weak,
    },
};

use anyhow::{bail, Result};
use chrono::Utc;
use rand::seq::SliceRandom;
use tracing::{info, warn};

use crate::cache::{LocalCache, ASSIGNED_SAMPLE_KEY, AUTH_TOKEN_KEY};
use crate::models::UserProfile;
use crate::store::DocumentStore;

// ---

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct User {
    pub uid: String,
    pub email: Option<String>,
}

type AuthHandler = Arc<dyn Fn(Option<&User>) + Send + Sync>;

pub struct SessionState {
    cache: Arc<dyn LocalCache>,
    current: RwLock<Option<User>>,
    handlers: Mutex<BTreeMap<u64, AuthHandler>>,
    next_id: AtomicU64,
}

/// Handle returned by [`SessionState::on_auth_state_changed`].
///
/// Dropping it unsubscribes the handler.
pub struct Subscription {
    id: u64,
    session: Weak<SessionState>,
}

impl Subscription {
    pub fn unsubscribe(self) {
        drop(self);
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(session) = self.session.upgrade() {
            session
                .handlers
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .remove(&self.id);
        }
    }
}

impl SessionState {
    // ---
    pub fn new(cache: Arc<dyn LocalCache>) -> Arc<Self> {
        Arc::new(Self {
            cache,
            current: RwLock::new(None),
            handlers: Mutex::new(BTreeMap::new()),
            next_id: AtomicU64::new(0),
        })
    }

    pub fn current_user(&self) -> Option<User> {
        self.current
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Register `handler`; it is called immediately with the current user and
    /// again after every sign-in or sign-out.
    pub fn on_auth_state_changed<F>(self: &Arc<Self>, handler: F) -> Subscription
    where
        F: Fn(Option<&User>) + Send + Sync + 'static,
    {
        // ---
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let handler: AuthHandler = Arc::new(handler);
        self.handlers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(id, handler.clone());

        handler(self.current_user().as_ref());

        Subscription {
            id,
            session: Arc::downgrade(self),
        }
    }

    /// Record `user` as signed in and persist the session marker.
    pub async fn sign_in(&self, user: User) -> Result<()> {
        // ---
        info!("User authenticated: {}", user.uid);
        self.cache.set(AUTH_TOKEN_KEY, &user.uid).await?;
        self.set_current(Some(user));
        Ok(())
    }

    /// Clear the whole local cache, assignment included, and sign out.
    pub async fn sign_out(&self) -> Result<()> {
        // ---
        info!("User signing out");
        let cleared = self.cache.clear().await;
        // the in-memory session ends even if the cache could not be cleared
        self.set_current(None);
        cleared
    }

    /// Create the profile for a freshly registered user, assign one sample at
    /// random, and sign the user in. Returns the assigned sample id.
    ///
    /// A user whose profile already carries an assignment keeps it: the
    /// profile is not rewritten and the existing id is returned.
    pub async fn sign_up(&self, user: User, store: &dyn DocumentStore) -> Result<String> {
        // ---
        let existing = store.get_user_profile(&user.uid).await?;
        let assigned = match existing {
            Some(UserProfile {
                assigned_sample: Some(assigned),
                ..
            }) => {
                info!("User {} already has sample {}", user.uid, assigned);
                assigned
            }
            profile => {
                let assigned = pick_sample(store, &user.uid).await?;
                store
                    .put_user_profile(&UserProfile {
                        uid: user.uid.clone(),
                        email: user.email.clone(),
                        assigned_sample: Some(assigned.clone()),
                        created_at: profile.map_or_else(Utc::now, |p| p.created_at),
                    })
                    .await?;
                info!("Assigned sample {} to new user {}", assigned, user.uid);
                assigned
            }
        };

        if let Err(e) = self.cache.set(ASSIGNED_SAMPLE_KEY, &assigned).await {
            warn!("Failed to cache assigned sample id: {:#}", e);
        }
        self.sign_in(user).await?;
        Ok(assigned)
    }

    fn set_current(&self, user: Option<User>) {
        // ---
        *self
            .current
            .write()
            .unwrap_or_else(PoisonError::into_inner) = user.clone();

        // call outside the lock so handlers may subscribe or unsubscribe
        let handlers: Vec<AuthHandler> = self
            .handlers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .cloned()
            .collect();
        for handler in handlers {
            handler(user.as_ref());
        }
    }
}

async fn pick_sample(store: &dyn DocumentStore, uid: &str) -> Result<String> {
    // ---
    let samples = store.list_samples().await?;
    let mut rng = rand::thread_rng();
    match samples.choose(&mut rng) {
        Some(sample) => Ok(sample.id.clone()),
        None => bail!("no samples available to assign to {}", uid),
    }
}

#[cfg(test)]
mod tests {
    // ---
    use super::*;
    use crate::cache::MemoryCache;
    use crate::models::Sample;
    use crate::store::MemoryStore;

    fn user(uid: &str) -> User {
        User {
            uid: uid.to_string(),
            email: Some(format!("{uid}@example.com")),
        }
    }

    fn recorder(session: &Arc<SessionState>) -> (Arc<Mutex<Vec<Option<String>>>>, Subscription) {
        // ---
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let sub = session.on_auth_state_changed(move |u| {
            sink.lock().unwrap().push(u.map(|u| u.uid.clone()));
        });
        (seen, sub)
    }

    #[tokio::test]
    async fn test_subscriber_sees_initial_state_and_changes() {
        // ---
        let session = SessionState::new(Arc::new(MemoryCache::default()));
        let (seen, _sub) = recorder(&session);

        session.sign_in(user("u-1")).await.unwrap();
        session.sign_out().await.unwrap();

        assert_eq!(
            *seen.lock().unwrap(),
            vec![None, Some("u-1".to_string()), None]
        );
    }

    #[tokio::test]
    async fn test_unsubscribe_stops_notifications() {
        // ---
        let session = SessionState::new(Arc::new(MemoryCache::default()));
        let (seen, sub) = recorder(&session);

        sub.unsubscribe();
        session.sign_in(user("u-1")).await.unwrap();

        assert_eq!(*seen.lock().unwrap(), vec![None]);
    }

    #[tokio::test]
    async fn test_sign_in_and_out_manage_cache() {
        // ---
        let cache = Arc::new(MemoryCache::default());
        let session = SessionState::new(cache.clone());

        session.sign_in(user("u-7")).await.unwrap();
        cache.set(ASSIGNED_SAMPLE_KEY, "s-1").await.unwrap();
        assert_eq!(cache.get(AUTH_TOKEN_KEY).await.unwrap().as_deref(), Some("u-7"));
        assert_eq!(session.current_user(), Some(user("u-7")));

        session.sign_out().await.unwrap();
        assert_eq!(cache.get(AUTH_TOKEN_KEY).await.unwrap(), None);
        assert_eq!(cache.get(ASSIGNED_SAMPLE_KEY).await.unwrap(), None);
        assert_eq!(session.current_user(), None);
    }

    fn store_with_samples(count: usize) -> MemoryStore {
        // ---
        let samples: Vec<Sample> = (1..=count)
            .map(|n| Sample {
                id: format!("s-{n}"),
                label: format!("S-{n:03}"),
                engine: Default::default(),
                brake: Default::default(),
                battery: Default::default(),
            })
            .collect();
        MemoryStore::with_samples(samples)
    }

    #[tokio::test]
    async fn test_sign_up_assigns_existing_sample() {
        // ---
        let store = store_with_samples(3);
        let cache = Arc::new(MemoryCache::default());
        let session = SessionState::new(cache.clone());

        let assigned = session.sign_up(user("u-new"), &store).await.unwrap();

        assert!(["s-1", "s-2", "s-3"].contains(&assigned.as_str()));
        let profile = store.get_user_profile("u-new").await.unwrap().unwrap();
        assert_eq!(profile.assigned_sample.as_deref(), Some(assigned.as_str()));
        assert_eq!(
            cache.get(ASSIGNED_SAMPLE_KEY).await.unwrap(),
            Some(assigned)
        );
        assert_eq!(session.current_user().map(|u| u.uid), Some("u-new".to_string()));
    }

    #[tokio::test]
    async fn test_repeated_sign_up_keeps_assignment() {
        // ---
        let store = store_with_samples(50);
        let session = SessionState::new(Arc::new(MemoryCache::default()));

        let first = session.sign_up(user("u-again"), &store).await.unwrap();
        let created_at = store
            .get_user_profile("u-again")
            .await
            .unwrap()
            .unwrap()
            .created_at;

        for _ in 0..10 {
            session.sign_out().await.unwrap();
            let again = session.sign_up(user("u-again"), &store).await.unwrap();
            assert_eq!(again, first);
        }

        let profile = store.get_user_profile("u-again").await.unwrap().unwrap();
        assert_eq!(profile.assigned_sample, Some(first));
        assert_eq!(profile.created_at, created_at);
    }

    #[tokio::test]
    async fn test_sign_up_fills_profile_without_assignment() {
        // ---
        let store = store_with_samples(2);
        let created_at = Utc::now() - chrono::Duration::days(3);
        store
            .put_user_profile(&UserProfile {
                uid: "u-old".to_string(),
                email: None,
                assigned_sample: None,
                created_at,
            })
            .await
            .unwrap();
        let session = SessionState::new(Arc::new(MemoryCache::default()));

        let assigned = session.sign_up(user("u-old"), &store).await.unwrap();

        let profile = store.get_user_profile("u-old").await.unwrap().unwrap();
        assert_eq!(profile.assigned_sample, Some(assigned));
        assert_eq!(profile.created_at, created_at);
    }

    #[tokio::test]
    async fn test_sign_up_without_samples_fails() {
        // ---
        let store = MemoryStore::default();
        let session = SessionState::new(Arc::new(MemoryCache::default()));

        assert!(session.sign_up(user("u-new"), &store).await.is_err());
        assert_eq!(session.current_user(), None);
    }
}
