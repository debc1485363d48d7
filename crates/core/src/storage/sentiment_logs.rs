use crate::domain::sentiment::{SentimentReading, SentimentSource};
use anyhow::Context;
use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

type ReadingRow = (Uuid, String, f64, DateTime<Utc>, Option<String>, Option<String>);

#[derive(Debug, Clone, Serialize)]
pub struct SentimentLogEntry {
    pub id: Uuid,
    pub ticker: String,
    pub company_name: String,
    #[serde(flatten)]
    pub reading: SentimentReading,
}

fn reading_from_row(row: ReadingRow) -> anyhow::Result<SentimentReading> {
    let (stock_id, source, score, observed_at, headline, summary) = row;
    Ok(SentimentReading {
        stock_id,
        source: source.parse::<SentimentSource>()?,
        score,
        observed_at,
        headline,
        summary,
    })
}

pub async fn insert_readings(
    pool: &sqlx::PgPool,
    readings: &[SentimentReading],
) -> anyhow::Result<u64> {
    if readings.is_empty() {
        return Ok(0);
    }

    let mut qb = sqlx::QueryBuilder::new(
        "INSERT INTO sentiment_logs (stock_id, source, sentiment_score, analyzed_at, headline, summary) ",
    );
    qb.push_values(readings, |mut b, r| {
        b.push_bind(r.stock_id)
            .push_bind(r.source.as_str())
            .push_bind(r.score)
            .push_bind(r.observed_at)
            .push_bind(r.headline.as_deref())
            .push_bind(r.summary.as_deref());
    });

    let res = qb
        .build()
        .persistent(false)
        .execute(pool)
        .await
        .context("insert sentiment_logs failed")?;
    Ok(res.rows_affected())
}

/// The `window` most recent readings of each requested stock, newest first.
pub async fn recent_readings_for_stocks(
    pool: &sqlx::PgPool,
    stock_ids: &[Uuid],
    window: usize,
) -> anyhow::Result<Vec<SentimentReading>> {
    if stock_ids.is_empty() {
        return Ok(Vec::new());
    }

    let rows = sqlx::query_as::<_, ReadingRow>(
        "SELECT stock_id, source, sentiment_score, analyzed_at, headline, summary \
         FROM ( \
           SELECT *, row_number() OVER (PARTITION BY stock_id ORDER BY analyzed_at DESC) AS rn \
           FROM sentiment_logs \
           WHERE stock_id = ANY($1) \
         ) ranked \
         WHERE rn <= $2 \
         ORDER BY stock_id, analyzed_at DESC",
    )
    .persistent(false)
    .bind(stock_ids)
    .bind(window as i64)
    .fetch_all(pool)
    .await
    .context("select recent sentiment_logs failed")?;

    rows.into_iter().map(reading_from_row).collect()
}

pub async fn list_recent(pool: &sqlx::PgPool, limit: i64) -> anyhow::Result<Vec<SentimentLogEntry>> {
    let rows = sqlx::query_as::<
        _,
        (
            Uuid,
            String,
            String,
            Uuid,
            String,
            f64,
            DateTime<Utc>,
            Option<String>,
            Option<String>,
        ),
    >(
        "SELECT l.id, s.ticker, s.company_name, l.stock_id, l.source, l.sentiment_score, \
                l.analyzed_at, l.headline, l.summary \
         FROM sentiment_logs l \
         JOIN stocks s ON s.id = l.stock_id \
         ORDER BY l.analyzed_at DESC \
         LIMIT $1",
    )
    .bind(limit)
    .fetch_all(pool)
    .await
    .context("select sentiment_logs failed")?;

    let mut out = Vec::with_capacity(rows.len());
    for (id, ticker, company_name, stock_id, source, score, observed_at, headline, summary) in rows {
        out.push(SentimentLogEntry {
            id,
            ticker,
            company_name,
            reading: reading_from_row((stock_id, source, score, observed_at, headline, summary))?,
        });
    }
    Ok(out)
}
