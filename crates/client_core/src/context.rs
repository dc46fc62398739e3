//! Application context: the operator session and UI preferences.
//!
//! State is read from the client store exactly once in [`AppContext::init`]
//! and written through on every change. Logging out is the only way a live
//! session is dropped.

use std::{collections::HashMap, sync::Arc};

use async_trait::async_trait;
use chrono::Utc;
use shared::domain::{Identity, Language, Session};
use storage::Storage;
use thiserror::Error;
use tokio::sync::{Mutex, RwLock};
use tracing::{info, warn};

use crate::gateway::IdentitySource;

pub const DARK_MODE_KEY: &str = "darkMode";
pub const LANGUAGE_KEY: &str = "language";
pub const SESSION_KEY: &str = "user";

#[derive(Debug, Error)]
pub enum ContextError {
    #[error("client state store failed: {0}")]
    Store(#[from] anyhow::Error),
    #[error("failed to encode session: {0}")]
    Encode(#[from] serde_json::Error),
}

#[async_trait]
pub trait StateStore: Send + Sync {
    async fn load(&self, key: &str) -> anyhow::Result<Option<String>>;
    async fn save(&self, key: &str, value: &str) -> anyhow::Result<()>;
    async fn remove(&self, key: &str) -> anyhow::Result<()>;
}

#[async_trait]
impl StateStore for Storage {
    async fn load(&self, key: &str) -> anyhow::Result<Option<String>> {
        self.get_value(key).await
    }

    async fn save(&self, key: &str, value: &str) -> anyhow::Result<()> {
        self.set_value(key, value).await
    }

    async fn remove(&self, key: &str) -> anyhow::Result<()> {
        self.remove_value(key).await.map(|_| ())
    }
}

#[derive(Default)]
pub struct MemoryStateStore {
    values: Mutex<HashMap<String, String>>,
}

impl MemoryStateStore {
    pub fn with_values<I, K, V>(values: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            values: Mutex::new(
                values
                    .into_iter()
                    .map(|(k, v)| (k.into(), v.into()))
                    .collect(),
            ),
        }
    }

    pub async fn snapshot(&self) -> HashMap<String, String> {
        self.values.lock().await.clone()
    }
}

#[async_trait]
impl StateStore for MemoryStateStore {
    async fn load(&self, key: &str) -> anyhow::Result<Option<String>> {
        Ok(self.values.lock().await.get(key).cloned())
    }

    async fn save(&self, key: &str, value: &str) -> anyhow::Result<()> {
        self.values
            .lock()
            .await
            .insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn remove(&self, key: &str) -> anyhow::Result<()> {
        self.values.lock().await.remove(key);
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Preferences {
    pub dark_mode: bool,
    pub language: Language,
}

#[derive(Default)]
struct ContextState {
    session: Option<Session>,
    preferences: Preferences,
}

pub struct AppContext {
    store: Arc<dyn StateStore>,
    state: RwLock<ContextState>,
}

impl AppContext {
    pub async fn init(store: Arc<dyn StateStore>) -> Result<Arc<Self>, ContextError> {
        Self::init_at(store, now_ms()).await
    }

    /// Reads persisted state as of `now_ms`. An expired or unreadable
    /// session is removed from the store and not restored.
    pub async fn init_at(
        store: Arc<dyn StateStore>,
        now_ms: i64,
    ) -> Result<Arc<Self>, ContextError> {
        let dark_mode = match store.load(DARK_MODE_KEY).await?.as_deref() {
            None => false,
            Some("true") => true,
            Some("false") => false,
            Some(other) => {
                warn!(value = other, "ignoring unreadable dark mode flag");
                false
            }
        };

        let language = match store.load(LANGUAGE_KEY).await? {
            None => Language::default(),
            Some(raw) => Language::parse(raw.trim_matches('"')).unwrap_or_else(|| {
                warn!(value = %raw, "ignoring unknown language code");
                Language::default()
            }),
        };

        let session = match store.load(SESSION_KEY).await? {
            None => None,
            Some(raw) => match serde_json::from_str::<Session>(&raw) {
                Ok(session) if session.is_expired_at(now_ms) => {
                    info!(expires_at = session.expires_at, "stored session expired; clearing");
                    store.remove(SESSION_KEY).await?;
                    None
                }
                Ok(session) => Some(session),
                Err(err) => {
                    warn!(error = %err, "stored session unreadable; clearing");
                    store.remove(SESSION_KEY).await?;
                    None
                }
            },
        };

        Ok(Arc::new(Self {
            store,
            state: RwLock::new(ContextState {
                session,
                preferences: Preferences {
                    dark_mode,
                    language,
                },
            }),
        }))
    }

    pub async fn login(&self, identity: Identity) -> Result<Session, ContextError> {
        self.login_at(identity, now_ms()).await
    }

    pub async fn login_at(&self, identity: Identity, now_ms: i64) -> Result<Session, ContextError> {
        let session = Session::issue(identity, now_ms);
        let encoded = serde_json::to_string(&session)?;
        self.store.save(SESSION_KEY, &encoded).await?;
        self.state.write().await.session = Some(session.clone());
        info!(user = ?session.identity.id, "session started");
        Ok(session)
    }

    pub async fn logout(&self) -> Result<(), ContextError> {
        self.store.remove(SESSION_KEY).await?;
        let previous = self.state.write().await.session.take();
        if let Some(previous) = previous {
            info!(user = ?previous.identity.id, "session ended");
        }
        Ok(())
    }

    pub async fn session(&self) -> Option<Session> {
        self.state.read().await.session.clone()
    }

    pub async fn identity(&self) -> Option<Identity> {
        self.state
            .read()
            .await
            .session
            .as_ref()
            .map(|session| session.identity.clone())
    }

    pub async fn is_authenticated(&self) -> bool {
        self.state.read().await.session.is_some()
    }

    pub async fn preferences(&self) -> Preferences {
        self.state.read().await.preferences
    }

    pub async fn set_dark_mode(&self, enabled: bool) -> Result<(), ContextError> {
        self.store
            .save(DARK_MODE_KEY, if enabled { "true" } else { "false" })
            .await?;
        self.state.write().await.preferences.dark_mode = enabled;
        Ok(())
    }

    pub async fn set_language(&self, language: Language) -> Result<(), ContextError> {
        self.store.save(LANGUAGE_KEY, language.as_str()).await?;
        self.state.write().await.preferences.language = language;
        Ok(())
    }
}

#[async_trait]
impl IdentitySource for AppContext {
    async fn current_identity(&self) -> Option<Identity> {
        self.identity().await
    }
}

fn now_ms() -> i64 {
    Utc::now().timestamp_millis()
}

#[cfg(test)]
#[path = "tests/context_tests.rs"]
mod tests;
