//! HTTP client for the gateway admin API

use async_trait::async_trait;
use reqwest::{Method, StatusCode, Url};
use router_core::dataplane::{DataPlane, RouteObject, UpstreamObject};
use router_core::{CoreError, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

const API_KEY_HEADER: &str = "X-API-KEY";

/// Connection settings for the admin API
#[derive(Clone, Debug)]
pub struct AdminConfig {
    /// Base URL, e.g. `http://apisix-admin:9180/apisix/admin`
    pub base_url: String,
    pub api_key: Option<String>,
    /// Bound on every request, connect included
    pub timeout: Duration,
}

impl Default for AdminConfig {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:9180/apisix/admin".to_string(),
            api_key: None,
            timeout: Duration::from_secs(10),
        }
    }
}

#[derive(Deserialize)]
struct ErrorBody {
    error_msg: Option<String>,
    message: Option<String>,
}

/// AdminClient applies routes and upstreams through the admin REST API
#[derive(Clone, Debug)]
pub struct AdminClient {
    http: reqwest::Client,
    base_url: Url,
    api_key: Option<String>,
}

impl AdminClient {
    pub fn new(config: AdminConfig) -> Result<Self> {
        let mut base_url = Url::parse(&config.base_url).map_err(|e| {
            CoreError::config(format!("invalid admin URL {:?}: {}", config.base_url, e))
        })?;
        if base_url.cannot_be_a_base() {
            return Err(CoreError::config(format!(
                "admin URL {:?} cannot be used as a base",
                config.base_url
            )));
        }
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }

        let http = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| CoreError::config(format!("failed to build admin client: {}", e)))?;

        Ok(Self {
            http,
            base_url,
            api_key: config.api_key,
        })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    async fn put<T: Serialize + ?Sized>(&self, collection: &str, id: &str, body: &T) -> Result<()> {
        let url = self.url(collection, id)?;
        let response = self.send(Method::PUT, url.clone(), Some(body)).await?;
        check(Method::PUT, &url, response, false).await
    }

    async fn delete(&self, collection: &str, id: &str) -> Result<()> {
        let url = self.url(collection, id)?;
        let response = self.send::<()>(Method::DELETE, url.clone(), None).await?;
        check(Method::DELETE, &url, response, true).await
    }

    fn url(&self, collection: &str, id: &str) -> Result<Url> {
        self.base_url
            .join(&format!("{}/{}", collection, id))
            .map_err(|e| {
                CoreError::sync(format!("invalid object path {}/{}: {}", collection, id, e))
            })
    }

    async fn send<T: Serialize + ?Sized>(
        &self,
        method: Method,
        url: Url,
        body: Option<&T>,
    ) -> Result<reqwest::Response> {
        debug!("{} {}", method, url);
        let mut request = self.http.request(method.clone(), url.clone());
        if let Some(key) = &self.api_key {
            request = request.header(API_KEY_HEADER, key);
        }
        if let Some(body) = body {
            request = request.json(body);
        }
        request
            .send()
            .await
            .map_err(|e| CoreError::sync(format!("{} {} failed: {}", method, url, e)))
    }
}

async fn check(
    method: Method,
    url: &Url,
    response: reqwest::Response,
    missing_ok: bool,
) -> Result<()> {
    let status = response.status();
    if status.is_success() || (missing_ok && status == StatusCode::NOT_FOUND) {
        return Ok(());
    }

    let text = response.text().await.unwrap_or_default();
    let detail = serde_json::from_str::<ErrorBody>(&text)
        .ok()
        .and_then(|body| body.error_msg.or(body.message))
        .unwrap_or(text);
    Err(CoreError::sync(format!(
        "{} {} returned {}: {}",
        method,
        url.path(),
        status.as_u16(),
        detail.trim()
    )))
}

#[async_trait]
impl DataPlane for AdminClient {
    async fn apply_route(&self, route: &RouteObject) -> Result<()> {
        self.put("routes", &route.id, route).await
    }

    async fn apply_upstream(&self, upstream: &UpstreamObject) -> Result<()> {
        self.put("upstreams", &upstream.id, upstream).await
    }

    async fn delete_route(&self, id: &str) -> Result<()> {
        self.delete("routes", id).await
    }

    async fn delete_upstream(&self, id: &str) -> Result<()> {
        self.delete("upstreams", id).await
    }
}
