//! Application State

use std::sync::Arc;

use nest_payments::PixGateway;
use nest_store::NestStore;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    /// Row store for users, couples and rewards
    pub store: Arc<dyn NestStore>,

    /// Which store backend is in use ("rest" or "memory")
    pub store_kind: &'static str,

    /// Pix gateway client (optional - None if not configured)
    pub gateway: Option<Arc<dyn PixGateway>>,
}
