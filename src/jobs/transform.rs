use super::connect_with_retry;
use crate::config::PipelineConfig;
use crate::data::{BatchReport, DataProcessor};
use crate::error::PipelineResult;
use crate::retry::RetryPolicy;
use crate::storage::{CleanedStore, PgStore};
use tracing::info;

/// Outcome of one transformation run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TransformSummary {
    pub stock: BatchReport,
    pub news: BatchReport,
    pub stock_rows_written: usize,
    pub news_rows_written: usize,
}

/// Connects to PostgreSQL and rebuilds both cleaned tables.
pub async fn run(config: &PipelineConfig, policy: &RetryPolicy) -> PipelineResult<TransformSummary> {
    let options = config.connect_options();
    let store = connect_with_retry(policy, || PgStore::open(options.clone())).await?;

    transform(&store, &DataProcessor::new()).await
}

/// Reads both raw tables in full, cleans them and replaces the cleaned
/// tables. Any store failure aborts the run with the previous cleaned tables
/// left in place.
pub async fn transform<S>(store: &S, processor: &DataProcessor) -> PipelineResult<TransformSummary>
where
    S: CleanedStore + ?Sized,
{
    let raw_stock = store.load_raw_stock().await?;
    let raw_news = store.load_raw_news().await?;

    let (stock, stock_report) = processor.process_stock_batch(raw_stock);
    info!(
        "Cleaned stock data: {} raw rows, {} duplicates removed, {} nulls filled",
        stock_report.raw_rows, stock_report.duplicates_removed, stock_report.nulls_filled
    );

    let (news, news_report) = processor.process_news_batch(raw_news);
    info!(
        "Cleaned news data: {} raw rows, {} duplicates removed, {} nulls filled",
        news_report.raw_rows, news_report.duplicates_removed, news_report.nulls_filled
    );

    store.replace_cleaned(&stock, &news).await?;

    Ok(TransformSummary {
        stock: stock_report,
        news: news_report,
        stock_rows_written: stock.len(),
        news_rows_written: news.len(),
    })
}
