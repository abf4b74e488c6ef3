use std::sync::Arc;
use std::time::Duration;

use tracing::error;

use greenlight_db::Database;
use greenlight_gateway::Dispatcher;

use crate::error::{ApiError, ApiResult};

pub type AppState = Arc<AppStateInner>;

pub struct AppStateInner {
    pub db: Arc<Database>,
    pub dispatcher: Dispatcher,
    pub jwt_secret: String,
    pub token_ttl_days: i64,
    /// Bearer token for cron/admin/diagnostic routes; `None` leaves them open.
    pub service_token: Option<String>,
    /// Width of the lead-time scan window, normally the sweep period.
    pub sweep_window: Duration,
}

impl AppStateInner {
    pub fn new(db: Arc<Database>, jwt_secret: impl Into<String>) -> Self {
        Self {
            db,
            dispatcher: Dispatcher::new(),
            jwt_secret: jwt_secret.into(),
            token_ttl_days: 30,
            service_token: None,
            sweep_window: Duration::from_secs(300),
        }
    }
}

/// Run a store closure off the async runtime.
pub async fn blocking<F, T>(state: &AppState, f: F) -> ApiResult<T>
where
    F: FnOnce(&Database) -> ApiResult<T> + Send + 'static,
    T: Send + 'static,
{
    let db = state.db.clone();
    tokio::task::spawn_blocking(move || f(&db))
        .await
        .map_err(|e| {
            error!("spawn_blocking join error: {}", e);
            ApiError::Internal(anyhow::anyhow!("blocking task failed"))
        })?
}
