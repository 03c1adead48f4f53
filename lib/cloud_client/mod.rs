pub mod error;
mod fetcher;
pub mod retry;
mod scopes;

pub use error::{CloudClientErr, FetchError, FetchErrorKind};
pub use fetcher::{GlobalRateLimiter, HttpRawFetcher, RawFetcher};
pub use retry::RetryPolicy;
pub use scopes::{HttpScopeSource, ScopeSource, StaticScopeSource};

use log::debug;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use serde::Deserialize;
use std::time::Duration;

use crate::inventory::RawRecord;

/// One page of a cloud API listing.
#[derive(Deserialize, Debug, Clone, PartialEq)]
pub struct ListPage {
    #[serde(default)]
    pub value: Vec<RawRecord>,
    #[serde(rename = "nextLink", default)]
    pub next_link: Option<String>,
}

/// Thin HTTP client for the cloud control plane.
pub struct CloudApiClient {
    client: reqwest::Client,
    base_url: String,
}

impl CloudApiClient {
    pub fn new(
        base_url: &str,
        token: Option<&str>,
        timeout: Duration,
    ) -> Result<Self, CloudClientErr> {
        let mut headers = HeaderMap::new();
        if let Some(token) = token {
            let value = HeaderValue::from_str(&format!("Bearer {token}")).map_err(|_| {
                CloudClientErr::ConnectError("cloud API token is not a valid header value".into())
            })?;
            headers.insert(AUTHORIZATION, value);
        }

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(timeout)
            .build()?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    /// URL of the first page listing `resource_path` inside one subscription.
    pub fn resource_url(&self, scope_id: &str, resource_path: &str, api_version: &str) -> String {
        format!(
            "{}/subscriptions/{}/{}?api-version={}",
            self.base_url,
            scope_id,
            resource_path.trim_start_matches('/'),
            api_version
        )
    }

    pub fn subscriptions_url(&self, api_version: &str) -> String {
        format!("{}/subscriptions?api-version={}", self.base_url, api_version)
    }

    /// Fetches one listing page. `url` is either a first-page URL or a `nextLink`.
    pub async fn get_page(&self, url: &str) -> Result<ListPage, CloudClientErr> {
        debug!("GET {}", url);
        let response = self.client.get(url).send().await?;

        if !response.status().is_success() {
            return Err(CloudClientErr::UnexpectedStatus {
                resource: strip_query(url).to_string(),
                status: response.status().as_u16(),
            });
        }

        let body = response.bytes().await?;
        Ok(serde_json::from_slice::<ListPage>(&body)?)
    }
}

fn strip_query(url: &str) -> &str {
    url.split('?').next().unwrap_or(url)
}

#[cfg(test)]
mod tests {
    use super::CloudApiClient;
    use std::time::Duration;

    #[test]
    fn resource_url_joins_scope_and_path() {
        let client = CloudApiClient::new("https://cloud.test/", None, Duration::from_secs(5))
            .expect("client should build");

        assert_eq!(
            client.resource_url(
                "sub-1",
                "/providers/Microsoft.Compute/virtualMachines",
                "2023-03-01"
            ),
            "https://cloud.test/subscriptions/sub-1/providers/Microsoft.Compute/virtualMachines?api-version=2023-03-01"
        );
        assert_eq!(
            client.subscriptions_url("2022-12-01"),
            "https://cloud.test/subscriptions?api-version=2022-12-01"
        );
    }
}
