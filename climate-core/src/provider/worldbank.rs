use anyhow::Context;
use chrono::Utc;
use reqwest::{Client, Url, header::ACCEPT};
use serde::{Deserialize, Deserializer};
use std::time::Duration;
use tracing::debug;

use crate::{
    error::ProviderError,
    model::{DocumentPage, DocumentQuery, OverviewMetadata, OverviewPage},
    provider::error_message,
};

pub const WORLDBANK_API: &str = "https://search.worldbank.org/api/v2/wds";

const OVERVIEW_QUERY: &str = "climate change AND (economic OR economy OR financial OR market)";
const OVERVIEW_ROWS: u32 = 100;
const OVERVIEW_YEARS_BACK: i32 = 2;
const USER_AGENT: &str = "Mozilla/5.0 (compatible; ClimateApp/1.0;)";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// World Bank Documents & Reports (WDS) search client.
#[derive(Debug, Clone)]
pub struct WorldBankClient {
    base_url: String,
    http: Client,
}

impl WorldBankClient {
    pub fn new() -> anyhow::Result<Self> {
        let http = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .user_agent(USER_AGENT)
            .build()
            .context("Failed to build HTTP client for World Bank")?;

        Ok(Self {
            base_url: WORLDBANK_API.to_string(),
            http,
        })
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    /// Search documents, newest first.
    pub async fn search(&self, query: &DocumentQuery) -> Result<DocumentPage, ProviderError> {
        let url = self.request_url(&search_params(query))?;
        let body = self.get(url).await?;
        parse_page(&body)
    }

    /// Economy-related climate documents from the last two years up to `current_year`.
    pub async fn overview(
        &self,
        region: Option<&str>,
        current_year: i32,
    ) -> Result<OverviewPage, ProviderError> {
        let url = self.request_url(&overview_params(region, current_year))?;
        let query_params = url.query().unwrap_or_default().to_string();
        let body = self.get(url).await?;
        let page = parse_page(&body)?;

        Ok(OverviewPage {
            page,
            metadata: OverviewMetadata {
                region: region.map(str::to_owned),
                timeframe: format!("{} to {}", current_year - OVERVIEW_YEARS_BACK, current_year),
                query_params,
            },
        })
    }

    /// Forward arbitrary WDS parameters and return the response untouched.
    ///
    /// `format=json` is added unless the caller set a format.
    pub async fn search_raw(
        &self,
        params: &[(String, String)],
    ) -> Result<serde_json::Value, ProviderError> {
        let mut params = params.to_vec();
        if !params.iter().any(|(k, _)| k == "format") {
            params.push(("format".to_string(), "json".to_string()));
        }

        let url = self.request_url(&params)?;
        let body = self.get(url).await?;
        serde_json::from_str(&body)
            .map_err(|e| ProviderError::Decode(format!("Failed to parse World Bank JSON: {e}")))
    }

    /// Full request URL with `params` form-encoded into the query string.
    fn request_url(&self, params: &[(String, String)]) -> Result<Url, ProviderError> {
        Url::parse_with_params(&self.base_url, params).map_err(|e| {
            ProviderError::Transport(format!("Invalid World Bank URL '{}': {e}", self.base_url))
        })
    }

    async fn get(&self, url: Url) -> Result<String, ProviderError> {
        debug!(url = %url, "requesting World Bank API");

        let res = self
            .http
            .get(url)
            .header(ACCEPT, "application/json")
            .send()
            .await?;

        let status = res.status();
        let body = res.text().await?;

        if !status.is_success() {
            return Err(ProviderError::from_status(status.as_u16(), error_message(&body)));
        }

        Ok(body)
    }
}

fn search_params(query: &DocumentQuery) -> Vec<(String, String)> {
    let mut params = vec![
        ("format".to_string(), "json".to_string()),
        ("qterm".to_string(), query.topic.clone()),
        ("rows".to_string(), query.rows.to_string()),
        ("order".to_string(), "desc".to_string()),
        ("srt".to_string(), "docdt".to_string()),
    ];

    if query.offset > 0 {
        params.push(("os".to_string(), query.offset.to_string()));
    }
    if let Some(region) = &query.region {
        params.push(("admreg_exact".to_string(), region.clone()));
    }
    if let Some(year) = query.start_year {
        params.push(("strdate".to_string(), format!("{year}-01-01")));
    }
    if let Some(year) = query.end_year {
        params.push(("enddate".to_string(), format!("{year}-12-31")));
    }

    params
}

fn overview_params(region: Option<&str>, current_year: i32) -> Vec<(String, String)> {
    let mut params = vec![
        ("format".to_string(), "json".to_string()),
        ("qterm".to_string(), OVERVIEW_QUERY.to_string()),
        ("rows".to_string(), OVERVIEW_ROWS.to_string()),
        (
            "strdate".to_string(),
            format!("{}-01-01", current_year - OVERVIEW_YEARS_BACK),
        ),
        ("order".to_string(), "desc".to_string()),
        ("srt".to_string(), "docdt".to_string()),
    ];

    if let Some(region) = region {
        params.push(("admreg_exact".to_string(), region.to_string()));
    }

    params
}

#[derive(Debug, Deserialize)]
struct WdsResponse {
    #[serde(default)]
    documents: serde_json::Map<String, serde_json::Value>,
    #[serde(default, deserialize_with = "lenient_total")]
    total: u64,
}

/// WDS reports `total` as a number or as a numeric string.
fn lenient_total<'de, D>(deserializer: D) -> Result<u64, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Total {
        Number(u64),
        Text(String),
        Missing(Option<()>),
    }

    match Total::deserialize(deserializer)? {
        Total::Number(n) => Ok(n),
        Total::Text(s) => s
            .trim()
            .parse()
            .map_err(|_| serde::de::Error::custom(format!("Invalid total: {s}"))),
        Total::Missing(_) => Ok(0),
    }
}

fn parse_page(body: &str) -> Result<DocumentPage, ProviderError> {
    let parsed: WdsResponse = serde_json::from_str(body)
        .map_err(|e| ProviderError::Decode(format!("Failed to parse World Bank JSON: {e}")))?;

    Ok(DocumentPage {
        documents: parsed.documents,
        total: parsed.total,
        timestamp: Utc::now(),
    })
}
