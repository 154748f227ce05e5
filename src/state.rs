use std::sync::Arc;
use std::time::Instant;

use crate::classifier::{Classifier, RecommendationLookup};
use crate::config::ServerConfig;
use crate::storage::SessionStore;
use crate::streaming::{SessionDeps, SessionManager, ViewerRegistry};

/// Main server state shared across all handlers
pub struct ServerState {
    pub config: ServerConfig,
    pub sessions: SessionManager,
    pub start_time: Instant,
}

impl ServerState {
    pub fn new(
        config: ServerConfig,
        store: Arc<dyn SessionStore>,
        classifier: Option<Arc<dyn Classifier>>,
        recommendations: Arc<dyn RecommendationLookup>,
    ) -> Self {
        let deps = SessionDeps {
            store,
            classifier,
            recommendations,
            viewers: ViewerRegistry::new(),
        };
        let sessions = SessionManager::new(config.session_settings(), deps);

        Self {
            config,
            sessions,
            start_time: Instant::now(),
        }
    }

    pub fn viewers(&self) -> &ViewerRegistry {
        self.sessions.viewers()
    }

    /// Get uptime in seconds
    pub fn uptime_seconds(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }
}
