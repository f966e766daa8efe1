use std::sync::Arc;

use crate::config::Config;
use crate::coordinator::Coordinator;
use crate::observability::Metrics;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub coordinator: Arc<Coordinator>,
    pub metrics: Arc<Metrics>,
}

impl AppState {
    pub fn new(config: Config, coordinator: Arc<Coordinator>, metrics: Arc<Metrics>) -> Self {
        Self {
            config: Arc::new(config),
            coordinator,
            metrics,
        }
    }
}
