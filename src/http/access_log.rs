//! One Apache "combined" line per request, emitted on the [`ACCESS_TARGET`]
//! tracing target so the logging setup can route it to the access-log files.

use std::fmt;
use std::net::SocketAddr;

use axum::{
    body::HttpBody,
    extract::{ConnectInfo, Request},
    http::{header, HeaderMap},
    middleware::Next,
    response::Response,
};
use chrono::{DateTime, Utc};
use tracing::info;

pub const ACCESS_TARGET: &str = "access";

#[derive(Debug, Clone)]
pub struct AccessRecord {
    pub remote_addr: Option<String>,
    pub time: DateTime<Utc>,
    pub request_line: String,
    pub status: u16,
    pub content_length: Option<u64>,
    pub referrer: Option<String>,
    pub user_agent: Option<String>,
}

impl fmt::Display for AccessRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} - - [{}] \"{}\" {} {} \"{}\" \"{}\"",
            self.remote_addr.as_deref().unwrap_or("-"),
            self.time.format("%d/%b/%Y:%H:%M:%S %z"),
            self.request_line,
            self.status,
            self.content_length
                .map(|len| len.to_string())
                .unwrap_or_else(|| "-".to_string()),
            self.referrer.as_deref().unwrap_or("-"),
            self.user_agent.as_deref().unwrap_or("-"),
        )
    }
}

/// Axum middleware logging every request after its response is produced.
pub async fn log_request(req: Request, next: Next) -> Response {
    let time = Utc::now();
    let remote_addr = req
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip().to_string());
    let request_line = format!("{} {} {:?}", req.method(), req.uri(), req.version());
    let referrer = header_value(req.headers(), header::REFERER);
    let user_agent = header_value(req.headers(), header::USER_AGENT);

    let response = next.run(req).await;

    let content_length = response.body().size_hint().exact().or_else(|| {
        header_value(response.headers(), header::CONTENT_LENGTH).and_then(|v| v.parse().ok())
    });
    let record = AccessRecord {
        remote_addr,
        time,
        request_line,
        status: response.status().as_u16(),
        content_length,
        referrer,
        user_agent,
    };
    info!(target: ACCESS_TARGET, "{}", record);
    response
}

fn header_value(headers: &HeaderMap, name: header::HeaderName) -> Option<String> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.to_string())
}
