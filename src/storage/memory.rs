//! In-memory store used by the job tests.

use super::{CleanedStore, RawStore};
use crate::data::processing::to_storage_timestamp;
use crate::data::{
    CleanedNewsArticle, CleanedStockQuote, NewsArticle, RawNewsRow, RawStockRow, StockQuote,
};
use crate::error::{PipelineError, PipelineResult};
use async_trait::async_trait;
use std::sync::Mutex;

#[derive(Debug, Default)]
pub struct Tables {
    pub raw_schema_created: bool,
    pub schema_ensure_calls: usize,
    pub stock: Vec<RawStockRow>,
    pub news: Vec<RawNewsRow>,
    pub stock_cleaned: Option<Vec<CleanedStockQuote>>,
    pub news_cleaned: Option<Vec<CleanedNewsArticle>>,
    last_id: i32,
}

impl Tables {
    fn next_id(&mut self) -> i32 {
        self.last_id += 1;
        self.last_id
    }
}

#[derive(Debug, Default)]
pub struct MemoryStore {
    pub tables: Mutex<Tables>,
    pub fail_writes: bool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing_writes() -> Self {
        Self {
            fail_writes: true,
            ..Self::default()
        }
    }

    pub fn with_raw(stock: Vec<RawStockRow>, news: Vec<RawNewsRow>) -> Self {
        let store = Self::default();
        {
            let mut tables = store.tables.lock().unwrap();
            tables.raw_schema_created = true;
            tables.last_id = stock.len().max(news.len()) as i32;
            tables.stock = stock;
            tables.news = news;
        }
        store
    }

    fn check_writable(&self) -> PipelineResult<()> {
        if self.fail_writes {
            return Err(PipelineError::Store(sqlx::Error::PoolClosed));
        }
        Ok(())
    }
}

#[async_trait]
impl RawStore for MemoryStore {
    async fn ensure_raw_schema(&self) -> PipelineResult<()> {
        let mut tables = self.tables.lock().unwrap();
        tables.schema_ensure_calls += 1;
        tables.raw_schema_created = true;
        Ok(())
    }

    async fn insert_stock_quotes(&self, quotes: &[StockQuote]) -> PipelineResult<u64> {
        self.check_writable()?;
        let mut tables = self.tables.lock().unwrap();
        for quote in quotes {
            let id = tables.next_id();
            tables.stock.push(RawStockRow {
                id,
                timestamp: Some(quote.timestamp),
                open: Some(quote.open),
                high: Some(quote.high),
                low: Some(quote.low),
                close: Some(quote.close),
                volume: Some(quote.volume),
            });
        }
        Ok(quotes.len() as u64)
    }

    async fn insert_news_articles(&self, articles: &[NewsArticle]) -> PipelineResult<u64> {
        self.check_writable()?;
        let mut tables = self.tables.lock().unwrap();
        for article in articles {
            let id = tables.next_id();
            tables.news.push(RawNewsRow {
                id,
                title: article.title.clone(),
                description: article.description.clone(),
                content: article.content.clone(),
                published_at: article.published_at.as_ref().map(to_storage_timestamp),
            });
        }
        Ok(articles.len() as u64)
    }
}

#[async_trait]
impl CleanedStore for MemoryStore {
    async fn load_raw_stock(&self) -> PipelineResult<Vec<RawStockRow>> {
        Ok(self.tables.lock().unwrap().stock.clone())
    }

    async fn load_raw_news(&self) -> PipelineResult<Vec<RawNewsRow>> {
        Ok(self.tables.lock().unwrap().news.clone())
    }

    async fn replace_cleaned(
        &self,
        stock: &[CleanedStockQuote],
        news: &[CleanedNewsArticle],
    ) -> PipelineResult<()> {
        self.check_writable()?;
        let mut tables = self.tables.lock().unwrap();
        tables.stock_cleaned = Some(stock.to_vec());
        tables.news_cleaned = Some(news.to_vec());
        Ok(())
    }
}
