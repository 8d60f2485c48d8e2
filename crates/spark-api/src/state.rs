use std::sync::Arc;

use spark_chat::backend::LocalBackend;
use spark_chat::matching::MatchEngine;

pub type AppState = Arc<AppStateInner>;

pub struct AppStateInner {
    pub backend: LocalBackend,
    pub matches: MatchEngine<LocalBackend>,
    pub jwt_secret: String,
    /// Used when a request gives no `page_size`.
    pub default_page_size: u32,
    /// Requested page sizes are clamped to this.
    pub max_page_size: u32,
}

impl AppStateInner {
    pub fn new(
        backend: LocalBackend,
        jwt_secret: String,
        default_page_size: u32,
        max_page_size: u32,
    ) -> AppState {
        Arc::new(Self {
            matches: MatchEngine::new(backend.clone()),
            backend,
            jwt_secret,
            default_page_size,
            max_page_size,
        })
    }

    pub fn page_size(&self, requested: Option<u32>) -> u32 {
        requested
            .unwrap_or(self.default_page_size)
            .min(self.max_page_size)
    }
}
