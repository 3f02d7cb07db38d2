use std::sync::Arc;

use parley_db::Database;
use parley_llm::LlmClient;

use crate::error::ApiError;
use crate::storage::UploadStore;

pub type AppState = Arc<AppStateInner>;

pub struct AppStateInner {
    pub db: Database,
    pub store: UploadStore,
    pub llm: LlmClient,
    /// Externally reachable base URL of this deployment; image references
    /// handed to the model API are derived from it.
    pub public_base_url: String,
}

impl AppStateInner {
    pub fn public_upload_url(&self, stored_name: &str) -> String {
        format!(
            "{}/uploads/{}",
            self.public_base_url.trim_end_matches('/'),
            stored_name
        )
    }
}

/// Run a blocking DB closure off the async runtime (rusqlite calls hold a
/// mutex and must not block a worker thread).
pub(crate) async fn blocking<T, F>(f: F) -> Result<T, ApiError>
where
    F: FnOnce() -> anyhow::Result<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| ApiError::Internal(anyhow::anyhow!("blocking task join error: {}", e)))?
        .map_err(ApiError::Internal)
}
