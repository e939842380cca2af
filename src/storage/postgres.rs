use super::{
    CleanedStore, RawStore, NEWS_CLEANED_TABLE, NEWS_TABLE, STOCK_CLEANED_TABLE, STOCK_TABLE,
};
use crate::data::processing::to_storage_timestamp;
use crate::data::{
    CleanedNewsArticle, CleanedStockQuote, NewsArticle, RawNewsRow, RawStockRow, StockQuote,
};
use crate::error::PipelineResult;
use async_trait::async_trait;
use sqlx::postgres::{PgConnectOptions, PgPoolOptions, PgRow};
use sqlx::{PgPool, Postgres, QueryBuilder, Row, Transaction};
use tracing::{debug, info};

// Keeps every statement well below the 65535 bind-parameter limit.
const MAX_BATCH_SIZE: usize = 1000;

/// PostgreSQL-backed store for both the raw and the cleaned tables.
///
/// Raw tables are append-only and written in batched multi-row inserts, one
/// transaction per call. Cleaned tables are dropped and recreated inside a
/// single transaction on every transformation run.
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    /// Wraps an already-open pool.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Opens a pool and checks out one connection to prove the database is
    /// reachable.
    ///
    /// Makes a single attempt; callers wrap it in a retry policy.
    ///
    /// # Arguments
    /// * `options`: Host, port, credentials and database name
    ///
    /// # Errors
    /// Returns the driver error if the handshake or authentication fails
    pub async fn open(options: PgConnectOptions) -> Result<Self, sqlx::Error> {
        let pool = PgPoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await?;
        Ok(Self::new(pool))
    }
}

#[async_trait]
impl RawStore for PgStore {
    async fn ensure_raw_schema(&self) -> PipelineResult<()> {
        sqlx::query(&format!(
            r#"
            CREATE TABLE IF NOT EXISTS {} (
                id SERIAL PRIMARY KEY,
                timestamp TIMESTAMP,
                open NUMERIC,
                high NUMERIC,
                low NUMERIC,
                close NUMERIC,
                volume NUMERIC
            )
            "#,
            STOCK_TABLE
        ))
        .execute(&self.pool)
        .await?;

        sqlx::query(&format!(
            r#"
            CREATE TABLE IF NOT EXISTS {} (
                id SERIAL PRIMARY KEY,
                title TEXT,
                description TEXT,
                content TEXT,
                published_at TIMESTAMP
            )
            "#,
            NEWS_TABLE
        ))
        .execute(&self.pool)
        .await?;

        debug!("Raw tables ensured");
        Ok(())
    }

    async fn insert_stock_quotes(&self, quotes: &[StockQuote]) -> PipelineResult<u64> {
        if quotes.is_empty() {
            return Ok(0);
        }

        let mut tx = self.pool.begin().await?;
        let mut written = 0;

        for chunk in quotes.chunks(MAX_BATCH_SIZE) {
            let mut query_builder: QueryBuilder<Postgres> = QueryBuilder::new(format!(
                "INSERT INTO {} (timestamp, open, high, low, close, volume) ",
                STOCK_TABLE
            ));

            query_builder.push_values(chunk, |mut b, quote| {
                b.push_bind(quote.timestamp)
                    .push_bind(quote.open)
                    .push_bind(quote.high)
                    .push_bind(quote.low)
                    .push_bind(quote.close)
                    .push_bind(quote.volume);
            });

            written += query_builder.build().execute(&mut *tx).await?.rows_affected();
        }

        tx.commit().await?;
        debug!("Inserted {} rows into {}", written, STOCK_TABLE);
        Ok(written)
    }

    async fn insert_news_articles(&self, articles: &[NewsArticle]) -> PipelineResult<u64> {
        if articles.is_empty() {
            return Ok(0);
        }

        let mut tx = self.pool.begin().await?;
        let mut written = 0;

        for chunk in articles.chunks(MAX_BATCH_SIZE) {
            let mut query_builder: QueryBuilder<Postgres> = QueryBuilder::new(format!(
                "INSERT INTO {} (title, description, content, published_at) ",
                NEWS_TABLE
            ));

            query_builder.push_values(chunk, |mut b, article| {
                b.push_bind(article.title.as_deref())
                    .push_bind(article.description.as_deref())
                    .push_bind(article.content.as_deref())
                    .push_bind(article.published_at.as_ref().map(to_storage_timestamp));
            });

            written += query_builder.build().execute(&mut *tx).await?.rows_affected();
        }

        tx.commit().await?;
        debug!("Inserted {} rows into {}", written, NEWS_TABLE);
        Ok(written)
    }
}

#[async_trait]
impl CleanedStore for PgStore {
    async fn load_raw_stock(&self) -> PipelineResult<Vec<RawStockRow>> {
        let rows = sqlx::query(&format!(
            r#"
            SELECT id, timestamp,
                   open::float8 AS open, high::float8 AS high, low::float8 AS low,
                   close::float8 AS close, volume::float8 AS volume
            FROM {}
            ORDER BY id
            "#,
            STOCK_TABLE
        ))
        .fetch_all(&self.pool)
        .await?;

        let rows = rows
            .iter()
            .map(raw_stock_from_row)
            .collect::<Result<Vec<_>, sqlx::Error>>()?;

        info!("Loaded {} rows from {}", rows.len(), STOCK_TABLE);
        Ok(rows)
    }

    async fn load_raw_news(&self) -> PipelineResult<Vec<RawNewsRow>> {
        let rows = sqlx::query(&format!(
            "SELECT id, title, description, content, published_at FROM {} ORDER BY id",
            NEWS_TABLE
        ))
        .fetch_all(&self.pool)
        .await?;

        let rows = rows
            .iter()
            .map(raw_news_from_row)
            .collect::<Result<Vec<_>, sqlx::Error>>()?;

        info!("Loaded {} rows from {}", rows.len(), NEWS_TABLE);
        Ok(rows)
    }

    async fn replace_cleaned(
        &self,
        stock: &[CleanedStockQuote],
        news: &[CleanedNewsArticle],
    ) -> PipelineResult<()> {
        let mut tx = self.pool.begin().await?;

        recreate_stock_cleaned(&mut tx).await?;
        for chunk in stock.chunks(MAX_BATCH_SIZE) {
            insert_stock_cleaned(&mut tx, chunk).await?;
        }

        recreate_news_cleaned(&mut tx).await?;
        for chunk in news.chunks(MAX_BATCH_SIZE) {
            insert_news_cleaned(&mut tx, chunk).await?;
        }

        tx.commit().await?;
        info!(
            "Replaced {} ({} rows) and {} ({} rows)",
            STOCK_CLEANED_TABLE,
            stock.len(),
            NEWS_CLEANED_TABLE,
            news.len()
        );
        Ok(())
    }
}

fn raw_stock_from_row(row: &PgRow) -> Result<RawStockRow, sqlx::Error> {
    Ok(RawStockRow {
        id: row.try_get("id")?,
        timestamp: row.try_get("timestamp")?,
        open: row.try_get("open")?,
        high: row.try_get("high")?,
        low: row.try_get("low")?,
        close: row.try_get("close")?,
        volume: row.try_get("volume")?,
    })
}

fn raw_news_from_row(row: &PgRow) -> Result<RawNewsRow, sqlx::Error> {
    Ok(RawNewsRow {
        id: row.try_get("id")?,
        title: row.try_get("title")?,
        description: row.try_get("description")?,
        content: row.try_get("content")?,
        published_at: row.try_get("published_at")?,
    })
}

async fn recreate_stock_cleaned(tx: &mut Transaction<'_, Postgres>) -> Result<(), sqlx::Error> {
    sqlx::query(&format!("DROP TABLE IF EXISTS {}", STOCK_CLEANED_TABLE))
        .execute(&mut **tx)
        .await?;

    sqlx::query(&format!(
        r#"
        CREATE TABLE {} (
            raw_id INTEGER NOT NULL,
            timestamp TIMESTAMP,
            open DOUBLE PRECISION NOT NULL,
            high DOUBLE PRECISION NOT NULL,
            low DOUBLE PRECISION NOT NULL,
            close DOUBLE PRECISION NOT NULL,
            volume DOUBLE PRECISION NOT NULL,
            year INTEGER,
            month INTEGER,
            day INTEGER,
            hour INTEGER,
            minute INTEGER,
            open_normalized DOUBLE PRECISION NOT NULL,
            high_normalized DOUBLE PRECISION NOT NULL,
            low_normalized DOUBLE PRECISION NOT NULL,
            close_normalized DOUBLE PRECISION NOT NULL,
            volume_normalized DOUBLE PRECISION NOT NULL
        )
        "#,
        STOCK_CLEANED_TABLE
    ))
    .execute(&mut **tx)
    .await?;

    Ok(())
}

async fn insert_stock_cleaned(
    tx: &mut Transaction<'_, Postgres>,
    quotes: &[CleanedStockQuote],
) -> Result<(), sqlx::Error> {
    if quotes.is_empty() {
        return Ok(());
    }

    let mut query_builder: QueryBuilder<Postgres> = QueryBuilder::new(format!(
        "INSERT INTO {} (raw_id, timestamp, open, high, low, close, volume, \
         year, month, day, hour, minute, \
         open_normalized, high_normalized, low_normalized, close_normalized, volume_normalized) ",
        STOCK_CLEANED_TABLE
    ));

    query_builder.push_values(quotes, |mut b, quote| {
        let calendar = quote.calendar;
        b.push_bind(quote.raw_id)
            .push_bind(quote.timestamp)
            .push_bind(quote.open)
            .push_bind(quote.high)
            .push_bind(quote.low)
            .push_bind(quote.close)
            .push_bind(quote.volume)
            .push_bind(calendar.map(|c| c.year))
            .push_bind(calendar.map(|c| c.month))
            .push_bind(calendar.map(|c| c.day))
            .push_bind(calendar.map(|c| c.hour))
            .push_bind(calendar.map(|c| c.minute))
            .push_bind(quote.normalized.open)
            .push_bind(quote.normalized.high)
            .push_bind(quote.normalized.low)
            .push_bind(quote.normalized.close)
            .push_bind(quote.normalized.volume);
    });

    query_builder.build().execute(&mut **tx).await?;
    Ok(())
}

async fn recreate_news_cleaned(tx: &mut Transaction<'_, Postgres>) -> Result<(), sqlx::Error> {
    sqlx::query(&format!("DROP TABLE IF EXISTS {}", NEWS_CLEANED_TABLE))
        .execute(&mut **tx)
        .await?;

    sqlx::query(&format!(
        r#"
        CREATE TABLE {} (
            raw_id INTEGER NOT NULL,
            title TEXT NOT NULL,
            description TEXT NOT NULL,
            content TEXT NOT NULL,
            published_at TIMESTAMP,
            year INTEGER,
            month INTEGER,
            day INTEGER,
            hour INTEGER,
            minute INTEGER
        )
        "#,
        NEWS_CLEANED_TABLE
    ))
    .execute(&mut **tx)
    .await?;

    Ok(())
}

async fn insert_news_cleaned(
    tx: &mut Transaction<'_, Postgres>,
    articles: &[CleanedNewsArticle],
) -> Result<(), sqlx::Error> {
    if articles.is_empty() {
        return Ok(());
    }

    let mut query_builder: QueryBuilder<Postgres> = QueryBuilder::new(format!(
        "INSERT INTO {} (raw_id, title, description, content, published_at, \
         year, month, day, hour, minute) ",
        NEWS_CLEANED_TABLE
    ));

    query_builder.push_values(articles, |mut b, article| {
        let calendar = article.calendar;
        b.push_bind(article.raw_id)
            .push_bind(article.title.as_str())
            .push_bind(article.description.as_str())
            .push_bind(article.content.as_str())
            .push_bind(article.published_at)
            .push_bind(calendar.map(|c| c.year))
            .push_bind(calendar.map(|c| c.month))
            .push_bind(calendar.map(|c| c.day))
            .push_bind(calendar.map(|c| c.hour))
            .push_bind(calendar.map(|c| c.minute));
    });

    query_builder.build().execute(&mut **tx).await?;
    Ok(())
}
