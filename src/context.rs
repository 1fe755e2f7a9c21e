use crate::config::AppConfig;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Shared handles for one process: configuration and the cancel switch.
#[derive(Clone)]
pub struct AppContext {
    pub config: Arc<AppConfig>,
    pub cancel: CancellationToken,
}

impl AppContext {
    pub fn new(config: AppConfig) -> Self {
        Self {
            config: Arc::new(config),
            cancel: CancellationToken::new(),
        }
    }
}
