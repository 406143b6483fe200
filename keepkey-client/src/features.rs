//! Last reported `Features` per device

use std::collections::HashMap;
use std::sync::Arc;

use keepkey_transport::messages::Features;
use keepkey_transport::DeviceId;
use parking_lot::RwLock;

/// Shared map of device id to the most recent `Features` it sent
///
/// Cloning shares the underlying map.
#[derive(Debug, Clone, Default)]
pub struct FeaturesStore {
    inner: Arc<RwLock<HashMap<DeviceId, Features>>>,
}

impl FeaturesStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, id: DeviceId, features: Features) {
        self.inner.write().insert(id, features);
    }

    pub fn get(&self, id: &DeviceId) -> Option<Features> {
        self.inner.read().get(id).cloned()
    }

    pub fn all(&self) -> Vec<(DeviceId, Features)> {
        let mut all: Vec<_> = self
            .inner
            .read()
            .iter()
            .map(|(id, f)| (id.clone(), f.clone()))
            .collect();
        all.sort_by(|a, b| a.0.cmp(&b.0));
        all
    }

    pub fn remove(&self, id: &DeviceId) -> Option<Features> {
        self.inner.write().remove(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_latest_wins() {
        let store = FeaturesStore::new();
        let id = DeviceId::from("a");
        store.insert(
            id.clone(),
            Features {
                label: Some("old".into()),
                ..Default::default()
            },
        );
        store.insert(
            id.clone(),
            Features {
                label: Some("new".into()),
                ..Default::default()
            },
        );
        assert_eq!(store.get(&id).unwrap().label.as_deref(), Some("new"));
        assert_eq!(store.all().len(), 1);
        assert!(store.remove(&id).is_some());
        assert!(store.get(&id).is_none());
    }

    #[test]
    fn test_clones_share_state() {
        let a = FeaturesStore::new();
        let b = a.clone();
        a.insert(DeviceId::from("x"), Features::default());
        assert!(b.get(&DeviceId::from("x")).is_some());
    }
}
