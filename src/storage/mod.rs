pub mod postgres;

#[cfg(test)]
pub mod memory;

use crate::data::{
    CleanedNewsArticle, CleanedStockQuote, NewsArticle, RawNewsRow, RawStockRow, StockQuote,
};
use crate::error::PipelineResult;
use async_trait::async_trait;

pub use postgres::PgStore;

pub const STOCK_TABLE: &str = "stock_data";
pub const NEWS_TABLE: &str = "news_data";
pub const STOCK_CLEANED_TABLE: &str = "stock_data_cleaned";
pub const NEWS_CLEANED_TABLE: &str = "news_data_cleaned";

/// Append-only access to the raw tables, used by the ingestion job.
#[async_trait]
pub trait RawStore: Send + Sync {
    /// Creates `stock_data` and `news_data` if they do not exist yet.
    async fn ensure_raw_schema(&self) -> PipelineResult<()>;

    /// Appends every quote in one transaction and returns the rows written.
    async fn insert_stock_quotes(&self, quotes: &[StockQuote]) -> PipelineResult<u64>;

    /// Appends every article in one transaction and returns the rows written.
    async fn insert_news_articles(&self, articles: &[NewsArticle]) -> PipelineResult<u64>;
}

/// Bulk read of the raw tables and wholesale replacement of the cleaned
/// tables, used by the transformation job.
#[async_trait]
pub trait CleanedStore: Send + Sync {
    async fn load_raw_stock(&self) -> PipelineResult<Vec<RawStockRow>>;

    async fn load_raw_news(&self) -> PipelineResult<Vec<RawNewsRow>>;

    /// Drops and recreates both cleaned tables with the given rows. Either
    /// both tables are replaced or neither is.
    async fn replace_cleaned(
        &self,
        stock: &[CleanedStockQuote],
        news: &[CleanedNewsArticle],
    ) -> PipelineResult<()>;
}
