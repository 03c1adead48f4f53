use std::collections::BTreeMap;
use std::num::NonZeroUsize;
use std::time::Duration;

use futures::future::BoxFuture;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{InventorySink, SinkError};
use crate::inventory::{Collections, CycleId, PartId, Record};

type CollectionSlices<'a> = BTreeMap<&'a str, &'a [Record]>;

#[derive(Serialize)]
struct PartPayload<'a> {
    collections: &'a CollectionSlices<'a>,
}

#[derive(Deserialize)]
struct PartResponse {
    parts_written: usize,
}

#[derive(Serialize)]
struct SweepPayload<'a> {
    total_parts: usize,
    collections: &'a [String],
}

/// Inventory store reached over its HTTP API.
pub struct HttpInventorySink {
    client: reqwest::Client,
    base_url: String,
    max_records_per_request: Option<NonZeroUsize>,
}

impl HttpInventorySink {
    pub fn new(base_url: &str, token: Option<&str>, timeout: Duration) -> Result<Self, SinkError> {
        let mut headers = HeaderMap::new();
        if let Some(token) = token {
            let value = HeaderValue::from_str(&format!("Bearer {token}")).map_err(|_| {
                SinkError::Unavailable("inventory API token is not a valid header value".into())
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
            max_records_per_request: None,
        })
    }

    /// Splits batches larger than `limit` records into several sub-parts.
    pub fn with_max_records_per_request(mut self, limit: NonZeroUsize) -> Self {
        self.max_records_per_request = Some(limit);
        self
    }

    fn part_url(&self, cycle_id: CycleId, part_id: PartId) -> String {
        format!(
            "{}/refresh_cycles/{}/parts/{}",
            self.base_url, cycle_id, part_id
        )
    }

    fn sweep_url(&self, cycle_id: CycleId) -> String {
        format!("{}/refresh_cycles/{}/sweep", self.base_url, cycle_id)
    }

    async fn post_part(
        &self,
        chunk: &CollectionSlices<'_>,
        cycle_id: CycleId,
        part_id: PartId,
    ) -> Result<usize, SinkError> {
        let response = self
            .client
            .post(self.part_url(cycle_id, part_id))
            .json(&PartPayload { collections: chunk })
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(SinkError::UnexpectedStatus {
                operation: "upload",
                status: response.status().as_u16(),
            });
        }

        let body = response.bytes().await?;
        let parsed: PartResponse =
            serde_json::from_slice(&body).map_err(|err| SinkError::InvalidResponse {
                operation: "upload",
                message: err.to_string(),
            })?;
        Ok(parsed.parts_written)
    }
}

/// Splits a snapshot into chunks of at most `limit` records.
///
/// Collections keep their order and may span chunks; empty collections ride
/// along in the first chunk so they are still declared to the store.
fn split_collections(collections: &Collections, limit: usize) -> Vec<CollectionSlices<'_>> {
    let limit = limit.max(1);
    let mut chunks = vec![CollectionSlices::new()];
    let mut room = limit;

    for (name, records) in collections {
        if records.is_empty() {
            chunks[0].insert(name.as_str(), &records[..]);
            continue;
        }
        let mut rest = &records[..];
        while !rest.is_empty() {
            if room == 0 {
                chunks.push(CollectionSlices::new());
                room = limit;
            }
            let take = room.min(rest.len());
            let (head, tail) = rest.split_at(take);
            if let Some(chunk) = chunks.last_mut() {
                chunk.insert(name.as_str(), head);
            }
            room -= take;
            rest = tail;
        }
    }

    chunks
}

impl InventorySink for HttpInventorySink {
    fn upload<'a>(
        &'a self,
        collections: &'a Collections,
        cycle_id: CycleId,
        part_id: PartId,
    ) -> BoxFuture<'a, Result<usize, SinkError>> {
        Box::pin(async move {
            let total_records: usize = collections.values().map(Vec::len).sum();
            let chunks = match self.max_records_per_request {
                Some(limit) if total_records > limit.get() => {
                    split_collections(collections, limit.get())
                }
                _ => vec![collections
                    .iter()
                    .map(|(name, records)| (name.as_str(), &records[..]))
                    .collect()],
            };

            if chunks.len() == 1 {
                return self.post_part(&chunks[0], cycle_id, part_id).await;
            }

            debug!(
                event = "part_subdivided",
                cycle_id = %cycle_id,
                part_id = %part_id,
                subparts = chunks.len(),
                total_records,
                "splitting oversized part"
            );
            let mut written = 0;
            for (index, chunk) in chunks.iter().enumerate() {
                written += self
                    .post_part(chunk, cycle_id, part_id.subpart(index))
                    .await?;
            }
            Ok(written)
        })
    }

    fn sweep<'a>(
        &'a self,
        cycle_id: CycleId,
        total_parts: usize,
        collections: &'a [String],
    ) -> BoxFuture<'a, Result<(), SinkError>> {
        Box::pin(async move {
            let response = self
                .client
                .post(self.sweep_url(cycle_id))
                .json(&SweepPayload {
                    total_parts,
                    collections,
                })
                .send()
                .await?;

            match response.status() {
                status if status.is_success() => Ok(()),
                StatusCode::CONFLICT => Err(SinkError::SweepRefused {
                    cycle_id,
                    reason: response.text().await.unwrap_or_default(),
                }),
                status => Err(SinkError::UnexpectedStatus {
                    operation: "sweep",
                    status: status.as_u16(),
                }),
            }
        })
    }
}
