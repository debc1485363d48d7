use crate::domain::portfolio::{Holding, HoldingView};
use anyhow::Context;
use uuid::Uuid;

type HoldingRow = (Uuid, Uuid, String, String, Option<f64>, Option<f64>, i32, f64);

pub async fn list_holdings(pool: &sqlx::PgPool, user_id: Uuid) -> anyhow::Result<Vec<HoldingView>> {
    let rows = sqlx::query_as::<_, HoldingRow>(
        "SELECT p.id, p.stock_id, s.ticker, s.company_name, s.current_price, s.price_change_pct, \
                p.quantity, p.avg_buy_price \
         FROM portfolios p \
         JOIN stocks s ON s.id = p.stock_id \
         WHERE p.user_id = $1 \
         ORDER BY s.ticker ASC",
    )
    .bind(user_id)
    .fetch_all(pool)
    .await
    .with_context(|| format!("select portfolio failed (user_id={user_id})"))?;

    let mut out = Vec::with_capacity(rows.len());
    for (holding_id, stock_id, ticker, company_name, current_price, price_change_pct, quantity, avg) in
        rows
    {
        let holding = Holding::new(stock_id, quantity, avg)
            .with_context(|| format!("invalid holding row in DB (id={holding_id})"))?;
        out.push(HoldingView {
            holding_id,
            ticker,
            company_name,
            current_price,
            price_change_pct,
            holding,
            sentiment: None,
        });
    }
    Ok(out)
}

/// Sets the position to `quantity` shares at the stock's current price. Returns `None` when
/// the stock does not exist.
pub async fn upsert_holding(
    pool: &sqlx::PgPool,
    user_id: Uuid,
    stock_id: Uuid,
    quantity: i32,
) -> anyhow::Result<Option<Uuid>> {
    anyhow::ensure!(quantity >= 0, "quantity must be >= 0 (got {quantity})");

    sqlx::query_scalar::<_, Uuid>(
        "INSERT INTO portfolios (user_id, stock_id, quantity, avg_buy_price) \
         SELECT $1, s.id, $3, COALESCE(s.current_price, 0) FROM stocks s WHERE s.id = $2 \
         ON CONFLICT (user_id, stock_id) DO UPDATE \
           SET quantity = EXCLUDED.quantity, avg_buy_price = EXCLUDED.avg_buy_price, updated_at = now() \
         RETURNING id",
    )
    .bind(user_id)
    .bind(stock_id)
    .bind(quantity)
    .fetch_optional(pool)
    .await
    .context("upsert portfolios failed")
}

pub async fn remove_holding(
    pool: &sqlx::PgPool,
    user_id: Uuid,
    holding_id: Uuid,
) -> anyhow::Result<bool> {
    let res = sqlx::query("DELETE FROM portfolios WHERE id = $1 AND user_id = $2")
        .bind(holding_id)
        .bind(user_id)
        .execute(pool)
        .await
        .context("delete portfolios failed")?;
    Ok(res.rows_affected() > 0)
}
