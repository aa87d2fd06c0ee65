use crate::api::riot::Endpoints;
use crate::models::error::FetchError;
use crate::models::resource::Resource;
use crate::services::freshness::FreshnessCache;
use serde_json::Value;
use std::sync::Arc;
use tracing::debug;

/// Resolves each resource to its upstream URL and reads it through the cache.
pub struct PassthroughService {
    cache: FreshnessCache,
    endpoints: Endpoints,
}

impl PassthroughService {
    pub fn new(cache: FreshnessCache, endpoints: Endpoints) -> Self {
        Self { cache, endpoints }
    }

    pub async fn fetch(&self, resource: Resource) -> Result<Arc<Value>, FetchError> {
        debug!("Fetching {}", resource);
        let url = self.endpoints.resource_url(resource);
        self.cache.get(resource.key(), &url).await
    }

    pub fn cache(&self) -> &FreshnessCache {
        &self.cache
    }
}

/// The part of an upstream payload a route responds with.
pub fn served_view(resource: Resource, payload: &Value) -> Result<&Value, FetchError> {
    if !resource.serves_data_field() {
        return Ok(payload);
    }
    payload
        .get("data")
        .ok_or_else(|| FetchError::Malformed(format!("{} response has no data field", resource)))
}
