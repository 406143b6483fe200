//! Registry of live sessions, keyed by device id

use std::collections::HashMap;
use std::sync::Arc;

use keepkey_transport::{DeviceFamily, DeviceId, HidLink, Transport};
use parking_lot::Mutex;
use tracing::{info, warn};

use crate::config::ClientConfig;
use crate::error::ClientError;
use crate::features::FeaturesStore;
use crate::session::ClientSession;

/// At most one session per device id
///
/// Sessions created here start polling immediately. Removing a session stops
/// its polling and closes its link before the entry goes away.
pub struct SessionRegistry {
    sessions: Mutex<HashMap<DeviceId, Arc<ClientSession>>>,
    features: FeaturesStore,
    config: ClientConfig,
}

impl Default for SessionRegistry {
    fn default() -> Self {
        Self::new(ClientConfig::default())
    }
}

impl SessionRegistry {
    pub fn new(config: ClientConfig) -> Self {
        Self {
            sessions: Mutex::new(HashMap::new()),
            features: FeaturesStore::new(),
            config,
        }
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Features reported by every registered device
    pub fn features(&self) -> &FeaturesStore {
        &self.features
    }

    /// Create and start a session for `link`, or return the existing one
    ///
    /// Must be called within a tokio runtime.
    pub fn create(&self, link: Arc<dyn HidLink>, family: DeviceFamily) -> Arc<ClientSession> {
        let id = link.id().clone();
        let mut sessions = self.sessions.lock();
        if let Some(existing) = sessions.get(&id) {
            return Arc::clone(existing);
        }

        let transport = Transport::new(link, family)
            .with_timeouts(self.config.read_timeout(), self.config.segment_timeout());
        let session = Arc::new(ClientSession::new(
            transport,
            self.features.clone(),
            self.config.event_capacity,
        ));
        session.start_polling(self.config.poll_interval());

        info!("{}: {} session created", id, family);
        sessions.insert(id, Arc::clone(&session));
        session
    }

    pub fn find(&self, id: &DeviceId) -> Option<Arc<ClientSession>> {
        self.sessions.lock().get(id).cloned()
    }

    /// Like [`find`](Self::find), as an error
    pub fn get(&self, id: &DeviceId) -> Result<Arc<ClientSession>, ClientError> {
        self.find(id).ok_or_else(|| ClientError::NotFound(id.clone()))
    }

    /// Every session, ordered by device id
    pub fn find_all(&self) -> Vec<Arc<ClientSession>> {
        let mut all: Vec<_> = self.sessions.lock().values().cloned().collect();
        all.sort_by(|a, b| a.device_id().cmp(b.device_id()));
        all
    }

    /// First session by device id, if any
    pub fn first(&self) -> Option<Arc<ClientSession>> {
        self.find_all().into_iter().next()
    }

    pub fn ids(&self) -> Vec<DeviceId> {
        let mut ids: Vec<_> = self.sessions.lock().keys().cloned().collect();
        ids.sort();
        ids
    }

    /// Close the session and drop it from the registry
    pub async fn remove(&self, id: &DeviceId) -> Option<Arc<ClientSession>> {
        let session = self.sessions.lock().remove(id)?;
        self.retire(id, &session).await;
        info!("{}: session removed", id);
        Some(session)
    }

    /// Remove every session
    pub async fn clear(&self) {
        let drained: Vec<_> = self.sessions.lock().drain().collect();
        for (id, session) in drained {
            self.retire(&id, &session).await;
        }
    }

    async fn retire(&self, id: &DeviceId, session: &ClientSession) {
        if let Err(e) = session.close().await {
            warn!("{}: close failed: {}", id, e);
        }
        self.features.remove(id);
    }

    pub fn len(&self) -> usize {
        self.sessions.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.lock().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use keepkey_transport::mock::MockLink;

    #[tokio::test(start_paused = true)]
    async fn test_create_is_idempotent() {
        let registry = SessionRegistry::default();
        let link = MockLink::keepkey("dev-1");

        let a = registry.create(link.clone(), DeviceFamily::KeepKey);
        let b = registry.create(link.clone(), DeviceFamily::KeepKey);
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(registry.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_remove_closes_session() {
        let registry = SessionRegistry::default();
        let link = MockLink::keepkey("dev-1");
        let session = registry.create(link.clone(), DeviceFamily::KeepKey);
        assert!(session.is_polling());

        let removed = registry.remove(session.device_id()).await.unwrap();
        assert!(Arc::ptr_eq(&removed, &session));
        assert!(!session.is_polling());
        assert!(registry.find(session.device_id()).is_none());
        assert!(registry.remove(session.device_id()).await.is_none());
        assert!(link.is_closed());
    }

    #[tokio::test(start_paused = true)]
    async fn test_ids_sorted_and_clear() {
        let registry = SessionRegistry::default();
        registry.create(MockLink::keepkey("b"), DeviceFamily::KeepKey);
        registry.create(MockLink::keepkey("a"), DeviceFamily::Trezor);
        assert_eq!(registry.ids(), vec![DeviceId::from("a"), DeviceId::from("b")]);
        assert_eq!(registry.first().unwrap().family(), DeviceFamily::Trezor);

        let all = registry.find_all();
        registry.clear().await;
        assert!(registry.is_empty());
        assert!(all.iter().all(|s| !s.is_polling()));
    }

    #[tokio::test(start_paused = true)]
    async fn test_get_missing() {
        let registry = SessionRegistry::default();
        assert!(matches!(
            registry.get(&DeviceId::from("nope")),
            Err(ClientError::NotFound(_))
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_registries_independent() {
        let r1 = SessionRegistry::default();
        let r2 = SessionRegistry::default();
        r1.create(MockLink::keepkey("dev"), DeviceFamily::KeepKey);
        assert!(r2.is_empty());
    }
}
