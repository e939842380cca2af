use crate::config::PipelineConfig;
use crate::error::{PipelineError, PipelineResult};
use async_trait::async_trait;
use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{debug, info, warn};

const ALPHA_VANTAGE: &str = "Alpha Vantage";
const NEWS_API: &str = "NewsAPI";

/// Timestamp layout of the intraday series keys, e.g. `2024-01-05 19:59:00`.
pub const INTRADAY_TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// One intraday bar for the configured symbol.
///
/// Timestamps are kept exactly as the provider labels them (exchange-local,
/// no zone), matching the `TIMESTAMP` column they are stored in.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct StockQuote {
    pub timestamp: NaiveDateTime,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

/// One article from the news search. Every field may be absent upstream.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct NewsArticle {
    pub title: Option<String>,
    pub description: Option<String>,
    pub content: Option<String>,
    #[serde(rename = "publishedAt")]
    pub published_at: Option<DateTime<Utc>>,
}

/// Source of the raw records the ingestion job stores.
#[async_trait]
pub trait MarketFeed: Send + Sync {
    /// Fetches one page of intraday quotes, oldest first.
    async fn fetch_stock_quotes(&self) -> PipelineResult<Vec<StockQuote>>;

    /// Fetches one page of news articles for the configured query.
    async fn fetch_news_articles(&self) -> PipelineResult<Vec<NewsArticle>>;
}

/// HTTP client for the quote provider (Alpha Vantage) and the news
/// provider (NewsAPI).
pub struct DataIngestion {
    alpha_vantage_api_key: String,
    news_api_key: String,
    symbol: String,
    interval: String,
    news_query: String,
    alpha_vantage_base_url: String,
    news_api_base_url: String,
    client: reqwest::Client,
}

impl DataIngestion {
    /// Creates a client from the pipeline configuration.
    ///
    /// # Errors
    /// Returns an error if the underlying HTTP client cannot be built.
    pub fn new(config: &PipelineConfig) -> PipelineResult<Self> {
        // NewsAPI rejects requests without a User-Agent.
        let client = reqwest::Client::builder()
            .user_agent(concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            alpha_vantage_api_key: config.alpha_vantage_api_key.clone(),
            news_api_key: config.news_api_key.clone(),
            symbol: config.stock_symbol.clone(),
            interval: config.stock_interval.clone(),
            news_query: config.news_query.clone(),
            alpha_vantage_base_url: config.alpha_vantage_base_url.trim_end_matches('/').to_string(),
            news_api_base_url: config.news_api_base_url.trim_end_matches('/').to_string(),
            client,
        })
    }
}

#[async_trait]
impl MarketFeed for DataIngestion {
    async fn fetch_stock_quotes(&self) -> PipelineResult<Vec<StockQuote>> {
        info!(
            "Fetching {} intraday quotes for {}",
            self.interval, self.symbol
        );

        let response = self
            .client
            .get(format!("{}/query", self.alpha_vantage_base_url))
            .query(&[
                ("function", "TIME_SERIES_INTRADAY"),
                ("symbol", self.symbol.as_str()),
                ("interval", self.interval.as_str()),
                ("apikey", self.alpha_vantage_api_key.as_str()),
            ])
            .send()
            .await?
            .json::<Value>()
            .await?;

        parse_intraday_response(&response, &self.interval)
    }

    async fn fetch_news_articles(&self) -> PipelineResult<Vec<NewsArticle>> {
        info!("Fetching news articles for query {:?}", self.news_query);

        let response = self
            .client
            .get(format!("{}/v2/everything", self.news_api_base_url))
            .query(&[
                ("q", self.news_query.as_str()),
                ("apiKey", self.news_api_key.as_str()),
            ])
            .send()
            .await?
            .json::<Value>()
            .await?;

        parse_news_response(&response)
    }
}

/// Extracts the quotes from a `TIME_SERIES_INTRADAY` body.
///
/// # Errors
/// - the provider reported an error, a rate limit or an informational notice
///   instead of data
/// - `Time Series (<interval>)` is missing or not an object
/// - an entry has an unparseable timestamp or a missing/non-numeric field
pub fn parse_intraday_response(response: &Value, interval: &str) -> PipelineResult<Vec<StockQuote>> {
    if let Some(error_message) = response.get("Error Message") {
        return Err(PipelineError::provider(
            ALPHA_VANTAGE,
            error_message.as_str().unwrap_or("Unknown error"),
        ));
    }

    let series_key = format!("Time Series ({})", interval);
    let time_series = match response.get(&series_key) {
        Some(ts) => ts.as_object().ok_or_else(|| {
            PipelineError::malformed(ALPHA_VANTAGE, format!("{} is not an object", series_key))
        })?,
        None => {
            // Rate limiting and key problems come back as 200 with a notice.
            for notice in ["Note", "Information"] {
                if let Some(message) = response.get(notice) {
                    return Err(PipelineError::provider(
                        ALPHA_VANTAGE,
                        message.as_str().unwrap_or("Unknown notice"),
                    ));
                }
            }
            return Err(PipelineError::malformed(
                ALPHA_VANTAGE,
                format!("{} not found in response", series_key),
            ));
        }
    };

    let mut quotes = Vec::with_capacity(time_series.len());

    for (timestamp_str, data) in time_series {
        let data = data.as_object().ok_or_else(|| {
            PipelineError::malformed(
                ALPHA_VANTAGE,
                format!("invalid data format for timestamp {}", timestamp_str),
            )
        })?;

        let timestamp = NaiveDateTime::parse_from_str(timestamp_str, INTRADAY_TIMESTAMP_FORMAT)
            .map_err(|e| {
                PipelineError::malformed(
                    ALPHA_VANTAGE,
                    format!("invalid timestamp {:?}: {}", timestamp_str, e),
                )
            })?;

        quotes.push(StockQuote {
            timestamp,
            open: ohlcv_field(data, "1. open", timestamp_str)?,
            high: ohlcv_field(data, "2. high", timestamp_str)?,
            low: ohlcv_field(data, "3. low", timestamp_str)?,
            close: ohlcv_field(data, "4. close", timestamp_str)?,
            volume: ohlcv_field(data, "5. volume", timestamp_str)?,
        });
    }

    quotes.sort_by(|a, b| a.timestamp.cmp(&b.timestamp));
    debug!("Parsed {} intraday quotes", quotes.len());

    Ok(quotes)
}

/// Values arrive as decimal strings; plain JSON numbers are accepted too.
fn ohlcv_field(data: &Map<String, Value>, key: &str, timestamp: &str) -> PipelineResult<f64> {
    let value = data.get(key).ok_or_else(|| {
        PipelineError::malformed(ALPHA_VANTAGE, format!("{} missing at {}", key, timestamp))
    })?;

    let parsed = match value {
        Value::String(s) => s.trim().parse::<f64>().ok(),
        Value::Number(n) => n.as_f64(),
        _ => None,
    };

    parsed.ok_or_else(|| {
        PipelineError::malformed(
            ALPHA_VANTAGE,
            format!("{} at {} is not numeric: {}", key, timestamp, value),
        )
    })
}

/// Extracts the articles from a NewsAPI `/v2/everything` body.
///
/// # Errors
/// - the body carries `"status": "error"`
/// - `articles` is missing or not a list
/// - an article is not an object or has an unparseable `publishedAt`
pub fn parse_news_response(response: &Value) -> PipelineResult<Vec<NewsArticle>> {
    if response.get("status").and_then(Value::as_str) == Some("error") {
        let code = response
            .get("code")
            .and_then(Value::as_str)
            .unwrap_or("unknown");
        let message = response
            .get("message")
            .and_then(Value::as_str)
            .unwrap_or("Unknown error");
        return Err(PipelineError::provider(NEWS_API, format!("{}: {}", code, message)));
    }

    let articles = response
        .get("articles")
        .ok_or_else(|| PipelineError::malformed(NEWS_API, "articles not found in response"))?
        .as_array()
        .ok_or_else(|| PipelineError::malformed(NEWS_API, "articles is not a list"))?;

    let mut parsed = Vec::with_capacity(articles.len());

    for (index, article) in articles.iter().enumerate() {
        let article = article.as_object().ok_or_else(|| {
            PipelineError::malformed(NEWS_API, format!("article {} is not an object", index))
        })?;

        let published_at = match article.get("publishedAt").and_then(Value::as_str) {
            Some(raw) => Some(
                DateTime::parse_from_rfc3339(raw)
                    .map_err(|e| {
                        PipelineError::malformed(
                            NEWS_API,
                            format!("article {} has invalid publishedAt {:?}: {}", index, raw, e),
                        )
                    })?
                    .with_timezone(&Utc),
            ),
            None => {
                warn!("Article {} has no publishedAt", index);
                None
            }
        };

        parsed.push(NewsArticle {
            title: text_field(article, "title"),
            description: text_field(article, "description"),
            content: text_field(article, "content"),
            published_at,
        });
    }

    debug!("Parsed {} news articles", parsed.len());
    Ok(parsed)
}

fn text_field(article: &Map<String, Value>, key: &str) -> Option<String> {
    article.get(key).and_then(Value::as_str).map(str::to_string)
}
