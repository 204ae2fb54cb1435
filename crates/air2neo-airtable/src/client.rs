//! Airtable REST client.
//!
//! Lists records page by page from `/v0/{base}/{table}`, narrowing the
//! result with a modification-window formula.

use air2neo_core::source::{LinkError, LinkTarget};
use air2neo_core::{LinkResolver, SourceClient, SourceRow};
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use tracing::debug;

use crate::formula::window_formula;
use crate::links::resolve_record_links;
use crate::record::RecordPage;

/// Default Airtable API URL.
pub const DEFAULT_API_URL: &str = "https://api.airtable.com";

/// Records per page; the API maximum.
const PAGE_SIZE: &str = "100";

/// Connection settings.
#[derive(Debug, Clone)]
pub struct AirtableConfig {
    pub api_key: String,
    pub base_id: String,
    pub api_url: String,
    /// Field carrying each record's last-modified time.
    pub last_modified_field: String,
    pub timeout_secs: u64,
}

impl AirtableConfig {
    pub fn new(api_key: impl Into<String>, base_id: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            base_id: base_id.into(),
            api_url: DEFAULT_API_URL.to_string(),
            last_modified_field: "Last Modified".to_string(),
            timeout_secs: 30,
        }
    }
}

/// Airtable source client.
#[derive(Clone)]
pub struct AirtableClient {
    config: AirtableConfig,
    client: reqwest::Client,
}

impl AirtableClient {
    pub fn new(config: AirtableConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(config.timeout_secs))
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self { config, client })
    }

    fn table_url(&self, table: &str) -> Result<reqwest::Url> {
        let mut url = reqwest::Url::parse(self.config.api_url.trim_end_matches('/'))
            .with_context(|| format!("Invalid Airtable API URL '{}'", self.config.api_url))?;
        url.path_segments_mut()
            .map_err(|_| anyhow::anyhow!("Airtable API URL cannot be a base"))?
            .pop_if_empty()
            .extend(["v0", self.config.base_id.as_str(), table]);
        Ok(url)
    }

    async fn fetch_page(
        &self,
        url: &reqwest::Url,
        formula: Option<&str>,
        offset: Option<&str>,
    ) -> Result<RecordPage> {
        let mut query: Vec<(&str, &str)> = vec![("pageSize", PAGE_SIZE)];
        if let Some(formula) = formula {
            query.push(("filterByFormula", formula));
        }
        if let Some(offset) = offset {
            query.push(("offset", offset));
        }

        let response = self
            .client
            .get(url.clone())
            .bearer_auth(&self.config.api_key)
            .query(&query)
            .send()
            .await
            .context("Failed to connect to Airtable")?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("Airtable API error ({}): {}", status, body);
        }

        response
            .json()
            .await
            .context("Failed to parse Airtable response")
    }
}

impl LinkResolver for AirtableClient {
    fn resolve_link(&self, value: &Value) -> Result<Vec<LinkTarget>, LinkError> {
        resolve_record_links(value)
    }
}

#[async_trait]
impl SourceClient for AirtableClient {
    async fn list_rows(
        &self,
        table: &str,
        modified_since: Option<DateTime<Utc>>,
        modified_before: Option<DateTime<Utc>>,
    ) -> Result<Vec<SourceRow>> {
        let url = self.table_url(table)?;
        let formula = window_formula(
            &self.config.last_modified_field,
            modified_since,
            modified_before,
        );

        let mut rows = Vec::new();
        let mut offset: Option<String> = None;
        let mut pages = 0u32;

        loop {
            let page = self
                .fetch_page(&url, formula.as_deref(), offset.as_deref())
                .await
                .with_context(|| format!("Listing records of '{}'", table))?;
            pages += 1;

            rows.extend(
                page.records
                    .into_iter()
                    .map(|r| r.into_source_row(&self.config.last_modified_field)),
            );

            match page.offset {
                Some(next) => offset = Some(next),
                None => break,
            }
        }

        debug!(table = %table, pages, rows = rows.len(), "Listed Airtable records");
        Ok(rows)
    }
}
