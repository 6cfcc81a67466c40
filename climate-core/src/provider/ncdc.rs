use anyhow::Context;
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use std::{future::Future, time::Duration};
use tracing::{debug, warn};

use crate::{
    error::ProviderError,
    fetcher::WindowFetcher,
    model::{DATE_FORMAT, DateRange, Query, RawObservation},
    provider::error_message,
};

pub const NCDC_API: &str = "https://www.ncdc.noaa.gov/cdo-web/api/v2";

/// Largest page the CDO API will serve.
const PAGE_LIMIT: u32 = 1000;
const MAX_PAGES: u32 = 50;
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// NOAA Climate Data Online (CDO v2) client for daily GHCN observations.
#[derive(Debug, Clone)]
pub struct NcdcClient {
    token: String,
    base_url: String,
    dataset_id: String,
    http: Client,
}

impl NcdcClient {
    pub fn new(token: String) -> anyhow::Result<Self> {
        let http = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .context("Failed to build HTTP client for NCDC")?;

        Ok(Self {
            token,
            base_url: NCDC_API.to_string(),
            dataset_id: "GHCND".to_string(),
            http,
        })
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn with_dataset(mut self, dataset_id: impl Into<String>) -> Self {
        self.dataset_id = dataset_id.into();
        self
    }

    pub fn dataset(&self) -> &str {
        &self.dataset_id
    }

    async fn fetch_page(
        &self,
        window: &DateRange,
        query: &Query,
        offset: u32,
    ) -> Result<NcdcResponse, ProviderError> {
        let url = format!("{}/data", self.base_url);

        debug!(window = %window, offset, location = %query.location_id, "requesting NCDC page");

        let res = self
            .http
            .get(&url)
            .header("token", &self.token)
            .query(&[
                ("datasetid", self.dataset_id.clone()),
                ("datatypeid", query.datatype_id.clone()),
                ("locationid", query.location_id.clone()),
                ("startdate", window.start().format(DATE_FORMAT).to_string()),
                ("enddate", window.end().format(DATE_FORMAT).to_string()),
                ("units", query.units.as_str().to_string()),
                ("limit", PAGE_LIMIT.to_string()),
                ("offset", offset.to_string()),
            ])
            .send()
            .await?;

        let status = res.status();
        let body = res.text().await?;

        if !status.is_success() {
            return Err(ProviderError::from_status(status.as_u16(), error_message(&body)));
        }

        parse_page(&body)
    }
}

#[derive(Debug, Default, Deserialize)]
struct NcdcResultSet {
    offset: u32,
    count: u32,
    limit: u32,
}

#[derive(Debug, Default, Deserialize)]
struct NcdcMetadata {
    resultset: NcdcResultSet,
}

/// One page of `/data`. CDO answers `{}` when nothing matches.
#[derive(Debug, Default, Deserialize)]
struct NcdcResponse {
    #[serde(default)]
    metadata: Option<NcdcMetadata>,
    #[serde(default)]
    results: Vec<RawObservation>,
}

impl NcdcResponse {
    /// 1-based offset of the next page, if the result set has more records.
    fn next_offset(&self) -> Option<u32> {
        if self.results.is_empty() {
            return None;
        }

        let rs = &self.metadata.as_ref()?.resultset;
        let next = rs.offset.checked_add(rs.limit.max(1))?;
        (next <= rs.count).then_some(next)
    }
}

fn parse_page(body: &str) -> Result<NcdcResponse, ProviderError> {
    if body.trim().is_empty() {
        return Ok(NcdcResponse::default());
    }

    serde_json::from_str(body)
        .map_err(|e| ProviderError::Decode(format!("Failed to parse NCDC data JSON: {e}")))
}

/// Read every page of one window, starting at offset 1.
///
/// Fails with [`ProviderError::TooManyResults`] when the result set is larger
/// than `MAX_PAGES` pages, so a window is never returned half-read.
async fn collect_pages<F, Fut>(mut fetch_page: F) -> Result<Vec<RawObservation>, ProviderError>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<NcdcResponse, ProviderError>>,
{
    const MAX_RECORDS: u32 = PAGE_LIMIT * MAX_PAGES;

    let mut records = Vec::new();
    let mut offset = 1;

    for _ in 0..MAX_PAGES {
        let mut page = fetch_page(offset).await?;

        if let Some(meta) = &page.metadata {
            if meta.resultset.count > MAX_RECORDS {
                return Err(ProviderError::TooManyResults {
                    count: meta.resultset.count,
                    limit: MAX_RECORDS,
                });
            }
        }

        let next = page.next_offset();
        records.append(&mut page.results);

        match next {
            Some(n) => offset = n,
            None => return Ok(records),
        }
    }

    Err(ProviderError::TooManyResults {
        count: records.len() as u32,
        limit: MAX_RECORDS,
    })
}

#[async_trait]
impl WindowFetcher for NcdcClient {
    async fn fetch_window(
        &self,
        window: &DateRange,
        query: &Query,
    ) -> Result<Vec<RawObservation>, ProviderError> {
        let records = collect_pages(|offset| self.fetch_page(window, query, offset)).await;

        if let Err(ProviderError::TooManyResults { count, .. }) = &records {
            warn!(window = %window, count, "NCDC result set too large for one window");
        }
        records
    }
}
