use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::RwLock;

use crate::error::OverlayError;
use crate::overlay::{ApiSession, Overlay};

/// Per-peer API sessions, created on first use and then reused.
pub struct ApiClientRegistry {
    overlay: Arc<dyn Overlay>,
    sessions: RwLock<HashMap<String, Arc<dyn ApiSession>>>,
}

impl ApiClientRegistry {
    pub fn new(overlay: Arc<dyn Overlay>) -> Self {
        Self {
            overlay,
            sessions: RwLock::new(HashMap::new()),
        }
    }

    /// Return the session for `address`, opening one if needed.
    ///
    /// The write lock is held across session setup, so concurrent callers for
    /// one peer open exactly one session. A failed setup caches nothing.
    pub async fn get_or_create(&self, address: &str) -> Result<Arc<dyn ApiSession>, OverlayError> {
        let mut sessions = self.sessions.write().await;
        if let Some(session) = sessions.get(address) {
            return Ok(Arc::clone(session));
        }

        let session = self.overlay.new_api_session(address).await?;
        sessions.insert(address.to_string(), Arc::clone(&session));
        tracing::debug!(peer = address, "api session opened");
        Ok(session)
    }

    pub async fn exists(&self, address: &str) -> bool {
        self.sessions.read().await.contains_key(address)
    }

    pub async fn get(&self, address: &str) -> Option<Arc<dyn ApiSession>> {
        self.sessions.read().await.get(address).cloned()
    }

    /// Drop the session for `address`.
    pub async fn remove(&self, address: &str) -> bool {
        self.sessions.write().await.remove(address).is_some()
    }

    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.sessions.read().await.is_empty()
    }
}
