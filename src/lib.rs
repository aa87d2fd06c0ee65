pub mod api;
pub mod config;
pub mod http;
pub mod models;
pub mod services;
pub mod utils;

// Re-export commonly used items
pub use api::StaticDataSource;
pub use http::handler::{create_router, AppState};
pub use models::error::FetchError;
pub use models::resource::Resource;
pub use services::freshness::{FreshnessCache, StalenessPolicy};
pub use services::passthrough::PassthroughService;
