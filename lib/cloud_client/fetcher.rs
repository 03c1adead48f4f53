use std::sync::Arc;

use futures::stream::{self, BoxStream, StreamExt};
use governor::clock::DefaultClock;
use governor::state::{InMemoryState, NotKeyed};
use governor::RateLimiter;
use tracing::warn;

use super::error::{map_cloud_error, FetchError};
use super::retry::{run_with_retry, RetryPolicy};
use super::{CloudApiClient, ListPage};
use crate::inventory::{RawRecord, Scope};
use crate::registry::{Domain, EntityType};

/// Process-wide request budget shared by every fetcher family.
pub type GlobalRateLimiter = Arc<RateLimiter<NotKeyed, InMemoryState, DefaultClock>>;

/// Lists raw provider records of one entity type inside one scope.
///
/// The returned stream is lazy: pages are requested only as the collector
/// consumes records, so memory stays bounded by one page plus the current
/// batch. The stream ends after the first error it yields.
pub trait RawFetcher: Send + Sync {
    fn fetch<'a>(
        &'a self,
        entity: &'a EntityType,
        scope: &'a Scope,
    ) -> BoxStream<'a, Result<RawRecord, FetchError>>;
}

/// Cloud API fetcher for one connection family (domain).
pub struct HttpRawFetcher {
    client: Arc<CloudApiClient>,
    domain: Domain,
    rate_limiter: GlobalRateLimiter,
    retry_policy: RetryPolicy,
}

impl HttpRawFetcher {
    pub fn new(
        client: Arc<CloudApiClient>,
        domain: Domain,
        rate_limiter: GlobalRateLimiter,
        retry_policy: RetryPolicy,
    ) -> Self {
        Self {
            client,
            domain,
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
                            event = "cloud_page_fetch_failed",
                            domain = self.domain.as_str(),
                            page,
                            attempt,
                            error = %err,
                            "cloud API page request failed"
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

struct PageCursor {
    buffered: std::vec::IntoIter<RawRecord>,
    next_url: Option<String>,
    pages_read: u64,
}

impl RawFetcher for HttpRawFetcher {
    fn fetch<'a>(
        &'a self,
        entity: &'a EntityType,
        scope: &'a Scope,
    ) -> BoxStream<'a, Result<RawRecord, FetchError>> {
        let first_url =
            self.client
                .resource_url(&scope.id, entity.resource_path(), self.domain.api_version());
        let cursor = PageCursor {
            buffered: Vec::new().into_iter(),
            next_url: Some(first_url),
            pages_read: 0,
        };

        stream::unfold(cursor, move |mut cursor| async move {
            loop {
                if let Some(record) = cursor.buffered.next() {
                    return Some((Ok(record), cursor));
                }

                let url = cursor.next_url.take()?;
                cursor.pages_read += 1;
                match self.fetch_page(&url, cursor.pages_read).await {
                    Ok(page) => {
                        cursor.buffered = page.value.into_iter();
                        cursor.next_url = page.next_link.filter(|link| !link.is_empty());
                    }
                    Err(err) => return Some((Err(err), cursor)),
                }
            }
        })
        .boxed()
    }
}
