use std::sync::Arc;

use futures::future::BoxFuture;
use serde_json::Value;
use tracing::{debug, warn};

use super::error::{map_cloud_error, FetchError};
use super::fetcher::GlobalRateLimiter;
use super::retry::{run_with_retry, RetryPolicy};
use super::{CloudApiClient, ListPage};
use crate::inventory::Scope;

const SUBSCRIPTIONS_API_VERSION: &str = "2022-12-01";

/// Enumerates the scopes one cycle collects over.
///
/// Called once per cycle, so newly added or removed subscriptions take effect
/// on the next cycle without restarting the collector.
pub trait ScopeSource: Send + Sync {
    fn scopes<'a>(&'a self) -> BoxFuture<'a, Result<Vec<Scope>, FetchError>>;
}

/// Fixed scope list, from `COLLECTOR_SCOPES` or tests.
pub struct StaticScopeSource {
    scopes: Vec<Scope>,
}

impl StaticScopeSource {
    pub fn new(scopes: Vec<Scope>) -> Self {
        Self { scopes }
    }

    pub fn from_ids<I, S>(ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::new(ids.into_iter().map(Scope::new).collect())
    }
}

impl ScopeSource for StaticScopeSource {
    fn scopes<'a>(&'a self) -> BoxFuture<'a, Result<Vec<Scope>, FetchError>> {
        Box::pin(async move { Ok(self.scopes.clone()) })
    }
}

/// Lists the enabled subscriptions visible to the configured credentials.
pub struct HttpScopeSource {
    client: Arc<CloudApiClient>,
    rate_limiter: GlobalRateLimiter,
    retry_policy: RetryPolicy,
}

impl HttpScopeSource {
    pub fn new(
        client: Arc<CloudApiClient>,
        rate_limiter: GlobalRateLimiter,
        retry_policy: RetryPolicy,
    ) -> Self {
        Self {
            client,
            rate_limiter,
            retry_policy,
        }
    }

    async fn fetch_page(&self, url: &str, page: u64) -> Result<ListPage, FetchError> {
        run_with_retry(
            &self.retry_policy,
            page,
            |attempt| async move {
                self.rate_limiter.until_ready().await;
                let result = self.client.get_page(url).await.map_err(map_cloud_error);
                if let Err(err) = &result {
                    if err.is_retryable() {
                        warn!(
                            event = "scope_listing_failed",
                            page,
                            attempt,
                            error = %err,
                            "subscription listing request failed"
                        );
                    }
                }
                result
            },
            FetchError::is_retryable,
        )
        .await
        .map(|(page, _attempts)| page)
        .map_err(|terminal| terminal.error)
    }
}

impl ScopeSource for HttpScopeSource {
    fn scopes<'a>(&'a self) -> BoxFuture<'a, Result<Vec<Scope>, FetchError>> {
        Box::pin(async move {
            let mut scopes = Vec::new();
            let mut next_url = Some(self.client.subscriptions_url(SUBSCRIPTIONS_API_VERSION));
            let mut pages_read = 0u64;

            while let Some(url) = next_url.take() {
                let page = self.fetch_page(&url, pages_read).await?;
                pages_read += 1;
                scopes.extend(page.value.iter().filter_map(subscription_scope));
                next_url = page.next_link.filter(|link| !link.is_empty());
            }

            debug!(
                event = "scopes_listed",
                scope_count = scopes.len(),
                "listed subscriptions"
            );
            Ok(scopes)
        })
    }
}

/// Maps one subscription listing entry into a scope; disabled ones are skipped.
fn subscription_scope(raw: &Value) -> Option<Scope> {
    let id = raw.get("subscriptionId")?.as_str()?;
    let state = raw.get("state").and_then(Value::as_str).unwrap_or("Enabled");
    if !state.eq_ignore_ascii_case("enabled") {
        return None;
    }

    let mut scope = Scope::new(id);
    for (field, key) in [("displayName", "name"), ("tenantId", "tenant_id")] {
        if let Some(value) = raw.get(field).and_then(Value::as_str) {
            scope = scope.with_attribute(key, value);
        }
    }
    Some(scope)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cloud_client::FetchErrorKind;
    use governor::{Quota, RateLimiter};
    use nonzero_ext::nonzero;
    use serde_json::json;
    use std::time::Duration;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn http_scopes(server: &MockServer, max_attempts: u32) -> HttpScopeSource {
        let client = CloudApiClient::new(&server.uri(), None, Duration::from_secs(5))
            .expect("client should build");
        HttpScopeSource::new(
            Arc::new(client),
            Arc::new(RateLimiter::direct(Quota::per_second(nonzero!(1000u32)))),
            RetryPolicy {
                max_attempts,
                ..RetryPolicy::none()
            },
        )
    }

    #[tokio::test]
    async fn transient_listing_failure_is_retried() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/subscriptions"))
            .respond_with(ResponseTemplate::new(503))
            .up_to_n_times(1)
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/subscriptions"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "value": [{"subscriptionId": "sub-1", "state": "Enabled"}]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let scopes = http_scopes(&server, 3)
            .scopes()
            .await
            .expect("second attempt should list subscriptions");

        assert_eq!(scopes.len(), 1);
        assert_eq!(scopes[0].id, "sub-1");
    }

    #[tokio::test]
    async fn listing_failure_surfaces_after_last_attempt() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/subscriptions"))
            .respond_with(ResponseTemplate::new(503))
            .expect(2)
            .mount(&server)
            .await;

        let err = http_scopes(&server, 2)
            .scopes()
            .await
            .expect_err("listing should fail once retries are spent");

        assert_eq!(err.kind, FetchErrorKind::UpstreamUnavailable);
    }

    #[test]
    fn subscription_entry_becomes_scope() {
        let scope = subscription_scope(&json!({
            "subscriptionId": "sub-1",
            "displayName": "Production",
            "tenantId": "tenant-a",
            "state": "Enabled"
        }))
        .expect("enabled subscription should map");

        assert_eq!(scope.id, "sub-1");
        assert_eq!(scope.attribute("name"), Some("Production"));
        assert_eq!(scope.attribute("tenant_id"), Some("tenant-a"));
    }

    #[test]
    fn disabled_or_malformed_subscriptions_are_skipped() {
        assert!(subscription_scope(&json!({"subscriptionId": "s", "state": "Disabled"})).is_none());
        assert!(subscription_scope(&json!({"displayName": "no id"})).is_none());
    }
}
