use crate::api::StaticDataSource;
use crate::models::error::FetchError;
use crate::models::resource::Resource;
use async_trait::async_trait;
use reqwest::Client;
use serde_json::Value;
use std::time::Duration;
use tracing::debug;

pub const DEFAULT_BASE_URL: &str = "https://global.api.pvp.net";
const USER_AGENT: &str =
    "LoLStaticDataPassthrough/0.1 <https://github.com/AKPWebDesign/LoLStaticDataPassthrough>";

/// Builds fully qualified static-data URLs for one region and API version.
#[derive(Debug, Clone)]
pub struct Endpoints {
    base: String,
    api_key: String,
}

impl Endpoints {
    pub fn new(base_url: &str, region: &str, version: &str, api_key: &str) -> Self {
        Self {
            base: format!(
                "{}/api/lol/static-data/{}/{}",
                base_url.trim_end_matches('/'),
                region,
                version
            ),
            api_key: api_key.to_string(),
        }
    }

    pub fn resource_url(&self, resource: Resource) -> String {
        match resource.query() {
            Some(query) => format!(
                "{}/{}?{}&api_key={}",
                self.base,
                resource.upstream_path(),
                query,
                self.api_key
            ),
            None => format!(
                "{}/{}?api_key={}",
                self.base,
                resource.upstream_path(),
                self.api_key
            ),
        }
    }

    /// URL of the lightweight realm call used as a version probe.
    pub fn realm_url(&self) -> String {
        self.resource_url(Resource::Version)
    }
}

pub struct StaticDataApi {
    client: Client,
}

impl StaticDataApi {
    pub fn new(timeout: Duration) -> Result<Self, FetchError> {
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .timeout(timeout)
            .build()?;
        Ok(Self { client })
    }
}

#[async_trait]
impl StaticDataSource for StaticDataApi {
    async fn fetch(&self, url: &str) -> Result<Value, FetchError> {
        debug!("Sending request to {}", without_query(url));
        let response = self.client.get(url).send().await?;
        let status = response.status().as_u16();
        let body = response.text().await?;
        parse_response(status, &body)
    }
}

/// Interprets an upstream response. The service reports failures inside the
/// body (`status.status_code`) as well as on the status line, so both are
/// checked.
pub fn parse_response(http_status: u16, body: &str) -> Result<Value, FetchError> {
    let json: Value = match serde_json::from_str(body) {
        Ok(json) => json,
        Err(e) => {
            return Err(FetchError::Upstream {
                status_code: http_status,
                message: format!("response body is not JSON: {}", e),
            })
        }
    };

    if let Some(status) = json.get("status") {
        let code = status.get("status_code").and_then(|c| c.as_u64());
        if let Some(code) = code.filter(|c| *c != 200) {
            let message = status
                .get("message")
                .and_then(|m| m.as_str())
                .unwrap_or("no message")
                .to_string();
            return Err(FetchError::Upstream {
                status_code: u16::try_from(code).unwrap_or(u16::MAX),
                message,
            });
        }
    }

    if !(200..300).contains(&http_status) {
        return Err(FetchError::Upstream {
            status_code: http_status,
            message: "non-success HTTP status".to_string(),
        });
    }

    Ok(json)
}

fn without_query(url: &str) -> &str {
    url.split('?').next().unwrap_or(url)
}
