pub mod ingestion;
pub mod processing;

pub use ingestion::{DataIngestion, MarketFeed, NewsArticle, StockQuote};
pub use processing::{
    BatchReport, CleanedNewsArticle, CleanedStockQuote, DataProcessor,
    RawNewsRow, RawStockRow,
};
