use reqwest::header::{HeaderMap, HeaderValue, CONTENT_TYPE};
use reqwest::{Client, RequestBuilder, StatusCode};
use std::time::Duration;
use tracing::debug;
use url::Url;

use super::retry::RetryPolicy;
use crate::{BatchError, Result};

/// Header carrying the subscription key
pub const SUBSCRIPTION_KEY_HEADER: &str = "Ocp-Apim-Subscription-Key";

/// Per-call timeout; batch operations on the service side can be slow
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(25 * 60);

/// Host serving the speech API for a region
pub fn regional_base_url(region: &str) -> Result<Url> {
    Ok(Url::parse(&format!("https://{}.api.cognitive.microsoft.com/", region))?)
}

/// A response read to the end
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reply {
    pub status: StatusCode,
    pub body: Vec<u8>,
}

/// Send one request and buffer its body, so a stall mid-body counts as a failed attempt
async fn fetch(request: RequestBuilder) -> std::result::Result<Reply, reqwest::Error> {
    let response = request.send().await?;
    let status = response.status();
    let body = response.bytes().await?;
    Ok(Reply {
        status,
        body: body.to_vec(),
    })
}

/// Long-lived HTTP connection to one speech service host.
///
/// Every call goes through the retry policy; the returned response may still
/// carry a non-success status for the caller to interpret.
#[derive(Debug, Clone)]
pub struct Transport {
    client: Client,
    base_url: Url,
    retry: RetryPolicy,
}

impl Transport {
    pub fn new(base_url: Url, api_key: &str, timeout: Duration, retry: RetryPolicy) -> Result<Self> {
        let mut key = HeaderValue::from_str(api_key)
            .map_err(|_| BatchError::Config("API key contains invalid header characters".to_string()))?;
        key.set_sensitive(true);

        let mut headers = HeaderMap::new();
        headers.insert(SUBSCRIPTION_KEY_HEADER, key);

        let client = Client::builder()
            .timeout(timeout)
            .default_headers(headers)
            .user_agent(format!("{}/{}", crate::NAME, crate::VERSION))
            .build()?;

        Ok(Self {
            client,
            base_url,
            retry,
        })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Resolve a path relative to the base host
    pub fn resolve(&self, path: &str) -> Result<Url> {
        Ok(self.base_url.join(path)?)
    }

    /// Re-home a service-issued link onto the base host, keeping its path and query
    pub fn rebase(&self, link: &Url) -> Url {
        let mut url = self.base_url.clone();
        url.set_path(link.path());
        url.set_query(link.query());
        url
    }

    pub async fn get(&self, url: Url) -> std::result::Result<Reply, reqwest::Error> {
        debug!("GET {}", url);
        let client = &self.client;
        self.retry.execute(move || fetch(client.get(url.clone()))).await
    }

    pub async fn post_json(&self, url: Url, body: String) -> std::result::Result<Reply, reqwest::Error> {
        debug!("POST {}", url);
        let client = &self.client;
        self.retry
            .execute(move || {
                fetch(
                    client
                        .post(url.clone())
                        .header(CONTENT_TYPE, "application/json")
                        .body(body.clone()),
                )
            })
            .await
    }

    pub async fn delete(&self, url: Url) -> std::result::Result<Reply, reqwest::Error> {
        debug!("DELETE {}", url);
        let client = &self.client;
        self.retry.execute(move || fetch(client.delete(url.clone()))).await
    }
}
