use crate::config::Settings;
use crate::extractor::Extractor;
use crate::progress::ProgressRegistry;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

#[derive(Clone)]
pub struct AppState {
    pub settings: Settings,
    pub registry: ProgressRegistry,
    pub extractor: Arc<dyn Extractor>,
    /// Cancelled on shutdown; every transfer runs on a child token.
    pub shutdown: CancellationToken,
}

impl AppState {
    pub fn new(settings: Settings, extractor: Arc<dyn Extractor>) -> Self {
        let registry = ProgressRegistry::new(settings.progress_grace());
        Self {
            settings,
            registry,
            extractor,
            shutdown: CancellationToken::new(),
        }
    }
}
