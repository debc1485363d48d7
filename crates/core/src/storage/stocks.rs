use anyhow::Context;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Stock {
    pub id: Uuid,
    pub ticker: String,
    pub company_name: String,
    pub sector: Option<String>,
    pub current_price: Option<f64>,
    pub price_change_pct: Option<f64>,
    pub last_updated: Option<DateTime<Utc>>,
}

const STOCK_COLUMNS: &str =
    "id, ticker, company_name, sector, current_price, price_change_pct, last_updated";

pub async fn list_stocks(pool: &sqlx::PgPool) -> anyhow::Result<Vec<Stock>> {
    sqlx::query_as::<_, Stock>(&format!(
        "SELECT {STOCK_COLUMNS} FROM stocks ORDER BY ticker ASC"
    ))
    .fetch_all(pool)
    .await
    .context("select stocks failed")
}

pub async fn get_stock(pool: &sqlx::PgPool, stock_id: Uuid) -> anyhow::Result<Option<Stock>> {
    sqlx::query_as::<_, Stock>(&format!("SELECT {STOCK_COLUMNS} FROM stocks WHERE id = $1"))
        .bind(stock_id)
        .fetch_optional(pool)
        .await
        .with_context(|| format!("select stock failed (id={stock_id})"))
}

/// Random subset, used to keep a sentiment pass within provider rate limits.
pub async fn sample_stocks(pool: &sqlx::PgPool, size: usize) -> anyhow::Result<Vec<Stock>> {
    sqlx::query_as::<_, Stock>(&format!(
        "SELECT {STOCK_COLUMNS} FROM stocks ORDER BY random() LIMIT $1"
    ))
    .persistent(false)
    .bind(size as i64)
    .fetch_all(pool)
    .await
    .context("sample stocks failed")
}
