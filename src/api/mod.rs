pub mod handlers;
pub mod routes;

pub use routes::*;

use crate::config::ServerConfig;
use crate::ml::Predictor;
use crate::notifications::NotificationService;
use std::sync::Arc;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub predictor: Arc<Predictor>,
    pub notifications: Arc<NotificationService>,
    pub server: Arc<ServerConfig>,
}

impl AppState {
    pub fn new(
        predictor: Arc<Predictor>,
        notifications: Arc<NotificationService>,
        server: ServerConfig,
    ) -> Self {
        Self {
            predictor,
            notifications,
            server: Arc::new(server),
        }
    }
}
