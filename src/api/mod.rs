pub mod riot;

use async_trait::async_trait;
use serde_json::Value;

use crate::models::error::FetchError;

/// Anything that can answer a GET against the static-data service.
#[async_trait]
pub trait StaticDataSource: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<Value, FetchError>;
}
