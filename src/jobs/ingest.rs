use super::connect_with_retry;
use crate::config::PipelineConfig;
use crate::data::{DataIngestion, MarketFeed};
use crate::error::PipelineResult;
use crate::retry::RetryPolicy;
use crate::storage::{PgStore, RawStore};
use std::future::Future;
use tracing::info;

/// Rows appended by one ingestion run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IngestSummary {
    pub stock_rows: u64,
    pub news_rows: u64,
}

/// Connects to PostgreSQL and runs one ingestion pass against the live
/// providers.
pub async fn run(config: &PipelineConfig, policy: &RetryPolicy) -> PipelineResult<IngestSummary> {
    let feed = DataIngestion::new(config)?;
    let options = config.connect_options();

    run_with(policy, || PgStore::open(options.clone()), &feed).await
}

/// Connects through `connect`, then fetches and stores. Nothing is fetched or
/// written unless the connection succeeds.
pub async fn run_with<S, F, Fut>(
    policy: &RetryPolicy,
    connect: F,
    feed: &dyn MarketFeed,
) -> PipelineResult<IngestSummary>
where
    S: RawStore,
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<S, sqlx::Error>>,
{
    let store = connect_with_retry(policy, connect).await?;
    ingest(feed, &store).await
}

/// Ensures the raw tables, then appends one page of quotes and one page of
/// articles.
///
/// Rows are appended as-is: re-running inserts the same records again, and
/// the transformation job removes the duplicates.
pub async fn ingest<S>(feed: &dyn MarketFeed, store: &S) -> PipelineResult<IngestSummary>
where
    S: RawStore + ?Sized,
{
    store.ensure_raw_schema().await?;

    let quotes = feed.fetch_stock_quotes().await?;
    let stock_rows = store.insert_stock_quotes(&quotes).await?;
    info!("Stored {} of {} fetched stock quotes", stock_rows, quotes.len());

    let articles = feed.fetch_news_articles().await?;
    let news_rows = store.insert_news_articles(&articles).await?;
    info!("Stored {} of {} fetched news articles", news_rows, articles.len());

    Ok(IngestSummary {
        stock_rows,
        news_rows,
    })
}
