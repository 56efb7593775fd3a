use std::time::Duration;

use reqwest::blocking::Client;
use reqwest::header::{HeaderMap, HeaderValue, USER_AGENT};
use serde_json::Value;

use crate::domain::{ArticleRecord, Issn, MonthEnd, QueryWindow};
use crate::error::HarvestError;

pub const CROSSREF_BASE: &str = "https://api.crossref.org";
pub const DEFAULT_ROWS: usize = 50;
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// One works query per call; `rows` caps the single result page.
pub trait WorksClient: Send + Sync {
    fn fetch_works(
        &self,
        issn: &Issn,
        window: &QueryWindow,
        rows: usize,
    ) -> Result<Vec<ArticleRecord>, HarvestError>;
}

#[derive(Debug, Clone)]
pub struct CrossrefSettings {
    pub base_url: String,
    pub timeout: Duration,
    pub mailto: Option<String>,
    pub month_end: MonthEnd,
}

impl Default for CrossrefSettings {
    fn default() -> Self {
        Self {
            base_url: CROSSREF_BASE.to_string(),
            timeout: DEFAULT_TIMEOUT,
            mailto: None,
            month_end: MonthEnd::default(),
        }
    }
}

#[derive(Clone)]
pub struct CrossrefHttpClient {
    client: Client,
    base_url: String,
    month_end: MonthEnd,
}

impl CrossrefHttpClient {
    pub fn new(settings: CrossrefSettings) -> Result<Self, HarvestError> {
        let mut headers = HeaderMap::new();
        headers.insert(
            USER_AGENT,
            HeaderValue::from_str(&user_agent(settings.mailto.as_deref()))
                .map_err(|err| HarvestError::InvalidConfig(err.to_string()))?,
        );
        let mut builder = Client::builder()
            .default_headers(headers)
            .timeout(settings.timeout);
        // Local mirrors are reached directly even when a system proxy is set.
        if is_loopback(&settings.base_url) {
            builder = builder.no_proxy();
        }
        let client = builder
            .build()
            .map_err(|err| HarvestError::CrossrefHttp(err.to_string()))?;
        Ok(Self {
            client,
            base_url: settings.base_url.trim_end_matches('/').to_string(),
            month_end: settings.month_end,
        })
    }

    pub fn works_url(&self) -> String {
        format!("{}/works", self.base_url)
    }
}

impl WorksClient for CrossrefHttpClient {
    fn fetch_works(
        &self,
        issn: &Issn,
        window: &QueryWindow,
        rows: usize,
    ) -> Result<Vec<ArticleRecord>, HarvestError> {
        let filter = build_filter(issn, window, self.month_end);
        let rows = rows.to_string();
        let response = self
            .client
            .get(self.works_url())
            .query(&[("filter", filter.as_str()), ("rows", rows.as_str())])
            .send()
            .map_err(|err| HarvestError::CrossrefHttp(err.to_string()))?;
        if !response.status().is_success() {
            let status = response.status().as_u16();
            let message = response
                .text()
                .unwrap_or_else(|_| "Crossref request failed".to_string());
            return Err(HarvestError::CrossrefStatus { status, message });
        }
        let payload: Value = response
            .json()
            .map_err(|err| HarvestError::CrossrefParse(err.to_string()))?;
        parse_works(&payload)
    }
}

fn is_loopback(base_url: &str) -> bool {
    let host = base_url
        .split_once("://")
        .map(|(_, rest)| rest)
        .unwrap_or(base_url);
    host.starts_with("127.") || host.starts_with("localhost") || host.starts_with("[::1]")
}

pub fn user_agent(mailto: Option<&str>) -> String {
    let base = format!("issn-harvester/{}", env!("CARGO_PKG_VERSION"));
    match mailto {
        Some(mailto) if !mailto.trim().is_empty() => format!("{base} (mailto:{})", mailto.trim()),
        _ => base,
    }
}

pub fn build_filter(issn: &Issn, window: &QueryWindow, month_end: MonthEnd) -> String {
    let (from, until) = window.bounds(month_end);
    format!(
        "issn:{},from-pub-date:{from},until-pub-date:{until}",
        issn.as_str()
    )
}

/// Maps `message.items` of a works response. Missing fields stay `None`.
pub fn parse_works(payload: &Value) -> Result<Vec<ArticleRecord>, HarvestError> {
    let items = payload
        .get("message")
        .and_then(|message| message.get("items"))
        .and_then(|items| items.as_array())
        .ok_or_else(|| HarvestError::CrossrefParse("missing message.items".to_string()))?;

    Ok(items
        .iter()
        .map(|item| ArticleRecord {
            doi: text_field(item, "DOI"),
            title: first_of(item, "title"),
            volume: text_field(item, "volume"),
            issue: text_field(item, "issue"),
            page: text_field(item, "page"),
            journal_title: first_of(item, "container-title"),
            publisher: text_field(item, "publisher"),
        })
        .collect())
}

fn text_field(item: &Value, key: &str) -> Option<String> {
    match item.get(key)? {
        Value::String(value) => Some(value.clone()),
        Value::Number(value) => Some(value.to_string()),
        _ => None,
    }
}

fn first_of(item: &Value, key: &str) -> Option<String> {
    item.get(key)
        .and_then(|value| value.as_array())
        .and_then(|array| array.first())
        .and_then(|value| value.as_str())
        .map(|value| value.to_string())
}
