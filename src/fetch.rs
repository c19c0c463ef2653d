//! HTTP fetching: one GET per candidate hostname, HTTPS first with HTTP
//! fallback, bounded body read, streaming extraction.
//!
//! The client accepts any certificate and disables keep-alive: crawl
//! targets are almost always distinct hosts, so a pooled connection would
//! never be reused anyway.

use crate::extract::{self, DomainScanner, TitleScanner};
use crate::metrics::Metrics;
use crate::output::JsonlWriter;
use anyhow::{bail, Result};
use async_trait::async_trait;
use reqwest::header::CONTENT_LENGTH;
use serde::Serialize;
use std::sync::Arc;
use std::time::{Duration, Instant};

#[async_trait]
pub trait Fetch: Send + Sync {
    /// Try each protocol in order and return on the first readable
    /// response; a total failure carries a non-empty `error`.
    async fn fetch(&self, domain: &str, root: &str, protocols: &[String]) -> FetchResult;
}

#[derive(Debug, Clone, Default)]
pub struct FetchResult {
    pub domain: String,
    pub root: String,
    /// In-scope candidates from body and headers, deduped, discovery order.
    pub subdomains: Vec<String>,
    pub title: String,
    /// Content-Length header verbatim, -1 when unknown.
    pub content_length: i64,
    pub status_code: u16,
    pub response_time_ms: i64,
    pub error: String,
}

impl FetchResult {
    pub fn new(domain: &str, root: &str) -> Self {
        FetchResult {
            domain: domain.to_string(),
            root: root.to_string(),
            content_length: -1,
            ..Default::default()
        }
    }
}

#[derive(Serialize)]
struct HttpLogRequest<'a> {
    method: &'static str,
    url: &'a str,
    request_at: i64,
}

#[derive(Serialize)]
struct HttpLogResponse<'a> {
    status_code: u16,
    content_length: i64,
    body_size: u64,
    title: &'a str,
    error: &'a str,
    rtt_ms: i64,
}

#[derive(Serialize)]
struct HttpLogRecord<'a> {
    request: HttpLogRequest<'a>,
    response: HttpLogResponse<'a>,
}

pub(crate) fn unix_millis() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}

fn parse_content_length(headers: &reqwest::header::HeaderMap) -> i64 {
    headers
        .get(CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.trim().parse::<i64>().ok())
        .unwrap_or(-1)
}

pub struct HttpFetcher {
    client: reqwest::Client,
    max_response_size: u64,
    metrics: Arc<Metrics>,
    http_log: Option<Arc<JsonlWriter>>,
}

impl HttpFetcher {
    pub fn new(
        timeout_secs: u64,
        max_response_size: u64,
        user_agent: &str,
        metrics: Arc<Metrics>,
        http_log: Option<Arc<JsonlWriter>>,
    ) -> Result<Self> {
        let timeout = Duration::from_secs(timeout_secs.max(1));
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .connect_timeout(timeout)
            .redirect(reqwest::redirect::Policy::limited(8))
            .danger_accept_invalid_certs(true)
            .pool_max_idle_per_host(0)
            .user_agent(user_agent)
            .build()?;
        Ok(HttpFetcher {
            client,
            max_response_size: max_response_size.max(1),
            metrics,
            http_log,
        })
    }

    fn log_http(&self, url: &str, request_at: i64, result: &FetchResult, body_size: u64) {
        if let Some(log) = &self.http_log {
            let record = HttpLogRecord {
                request: HttpLogRequest {
                    method: "GET",
                    url,
                    request_at,
                },
                response: HttpLogResponse {
                    status_code: result.status_code,
                    content_length: result.content_length,
                    body_size,
                    title: &result.title,
                    error: &result.error,
                    rtt_ms: result.response_time_ms,
                },
            };
            let _ = log.log(&record);
        }
    }

    async fn fetch_url(&self, url: &str, root: &str, result: &mut FetchResult) -> Result<()> {
        let start = Instant::now();
        let request_at = unix_millis();
        Metrics::incr(&self.metrics.http_requests);

        let resp = match self.client.get(url).send().await {
            Ok(r) => r,
            Err(e) => {
                result.error = e.to_string();
                result.response_time_ms = start.elapsed().as_millis() as i64;
                self.log_http(url, request_at, result, 0);
                return Err(e.into());
            }
        };

        let status = resp.status().as_u16();
        result.status_code = status;
        result.content_length = parse_content_length(resp.headers());

        if status >= 500 {
            result.error = format!("server error: {}", status);
            result.response_time_ms = start.elapsed().as_millis() as i64;
            self.log_http(url, request_at, result, 0);
            bail!("server error: {}", status);
        }

        // headers are a subdomain source too (CSP, Link, Set-Cookie, ...)
        let mut scanner = DomainScanner::new();
        for value in resp.headers().values() {
            scanner.push_bytes(value.as_bytes());
            scanner.push_bytes(b"\n");
        }

        let mut titles = TitleScanner::new();
        let mut body_size: u64 = 0;
        let mut resp = resp;
        let read_err = loop {
            match resp.chunk().await {
                Ok(Some(chunk)) => {
                    let room = self.max_response_size - body_size;
                    let take = (chunk.len() as u64).min(room) as usize;
                    scanner.push_bytes(&chunk[..take]);
                    titles.push_bytes(&chunk[..take]);
                    body_size += take as u64;
                    if body_size >= self.max_response_size {
                        break None; // cap reached, excess discarded
                    }
                }
                Ok(None) => break None,
                Err(e) => break Some(e),
            }
        };
        scanner.finish();
        result.title = titles.title();
        result.subdomains = extract::filter_by_suffix(scanner.take_found(), root);
        result.response_time_ms = start.elapsed().as_millis() as i64;

        if let Some(e) = read_err {
            result.error = format!("read body: {}", e);
            self.log_http(url, request_at, result, body_size);
            bail!("read body: {}", e);
        }

        result.error.clear();
        self.log_http(url, request_at, result, body_size);
        Ok(())
    }
}

#[async_trait]
impl Fetch for HttpFetcher {
    async fn fetch(&self, domain: &str, root: &str, protocols: &[String]) -> FetchResult {
        let mut result = FetchResult::new(domain, root);
        for proto in protocols {
            let url = format!("{}://{}/", proto, domain);
            if self.fetch_url(&url, root, &mut result).await.is_ok() {
                return result;
            }
        }
        if result.error.is_empty() {
            result.error = "failed to fetch".into();
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::header::{HeaderMap, HeaderValue};

    #[test]
    fn content_length_parsing() {
        let mut headers = HeaderMap::new();
        assert_eq!(parse_content_length(&headers), -1);
        headers.insert(CONTENT_LENGTH, HeaderValue::from_static("1256"));
        assert_eq!(parse_content_length(&headers), 1256);
        headers.insert(CONTENT_LENGTH, HeaderValue::from_static("junk"));
        assert_eq!(parse_content_length(&headers), -1);
    }

    #[test]
    fn fresh_result_has_unknown_length() {
        let r = FetchResult::new("www.example.com", "example.com");
        assert_eq!(r.content_length, -1);
        assert_eq!(r.status_code, 0);
        assert!(r.error.is_empty());
    }
}
