//! Concrete comment sources and the platform registry

pub mod youtube;

pub use youtube::{YoutubeConfig, YoutubeConnector, YoutubeSource};

use crate::domain::Platform;
use crate::ports::SourceConnector;
use std::collections::HashMap;
use std::sync::Arc;

/// Platform tag -> connector. Platforms with no entry are unsupported.
#[derive(Default)]
pub struct SourceRegistry {
    connectors: HashMap<Platform, Arc<dyn SourceConnector>>,
}

impl SourceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a connector under the platform it reports
    pub fn register(&mut self, connector: Arc<dyn SourceConnector>) {
        self.connectors.insert(connector.platform(), connector);
    }

    pub fn with(mut self, connector: Arc<dyn SourceConnector>) -> Self {
        self.register(connector);
        self
    }

    pub fn get(&self, platform: Platform) -> Option<Arc<dyn SourceConnector>> {
        self.connectors.get(&platform).cloned()
    }

    pub fn supports(&self, platform: Platform) -> bool {
        self.connectors.contains_key(&platform)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ports::{MockSource, MockSourceConnector};

    #[test]
    fn test_registry_lookup() {
        let source = Arc::new(MockSource::new());
        let registry = SourceRegistry::new().with(Arc::new(MockSourceConnector::new(Platform::Youtube, source)));

        assert!(registry.supports(Platform::Youtube));
        assert!(registry.get(Platform::Youtube).is_some());
        assert!(!registry.supports(Platform::Tiktok));
        assert!(registry.get(Platform::Tiktok).is_none());
    }
}
